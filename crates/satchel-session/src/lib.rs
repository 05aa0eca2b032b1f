//! In-process session store with idle expiry.
//!
//! This crate provides the server-side half of a session abstraction:
//! - A registry mapping opaque session ids to key/value bags
//! - Recency ordering so idle collection only walks the stale tail
//! - Explicit, caller-driven garbage collection (no background timer)
//!
//! Cookie handling, id generation and persistence belong to the layer that
//! consumes the [`SessionProvider`] contract.
//!
//! # Example
//!
//! ```rust
//! use satchel_session::{RegistryConfig, SessionRegistry};
//! use serde_json::json;
//!
//! let registry: SessionRegistry = SessionRegistry::new(RegistryConfig::default());
//!
//! let session = registry.read("cookie-value").unwrap();
//! session.set("user".to_string(), json!("alice")).unwrap();
//! assert_eq!(session.get(&"user".to_string()), Some(json!("alice")));
//!
//! // Later, on the caller's own schedule:
//! registry.sweep();
//! ```

mod clock;
mod config;
mod error;
mod provider;
mod record;
mod registry;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    DEFAULT_GC_INTERVAL_SECS, DEFAULT_MAX_IDLE_SECS, DuplicatePolicy, HasSessionConfig,
    RegistryConfig,
};
pub use error::{Error, Result};
pub use provider::{Session, SessionProvider};
pub use record::SessionRecord;
pub use registry::{RegistryStats, SessionRegistry};
