//! Common test utilities for integration tests.

use std::sync::Arc;

use satchel_session::{ManualClock, RegistryConfig, SessionRegistry};

/// Registry used by most tests: string keys, JSON values, manual time.
pub type TestRegistry = SessionRegistry<String, serde_json::Value>;

/// Route registry logs to the test harness. Safe to call more than once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("satchel_session=trace"))
        .with_test_writer()
        .try_init();
}

/// A registry on a frozen clock, plus the clock to move it.
pub fn registry_with_clock(config: RegistryConfig) -> (TestRegistry, Arc<ManualClock>) {
    init_tracing();
    let clock = Arc::new(ManualClock::starting_now());
    let registry = TestRegistry::with_clock(config, clock.clone());
    (registry, clock)
}

/// Move the clock forward by whole seconds.
pub fn age(clock: &ManualClock, secs: i64) {
    clock.advance(chrono::Duration::seconds(secs));
}

pub fn key(name: &str) -> String {
    name.to_string()
}
