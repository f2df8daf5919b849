//! Subscription registry and channel multiplexer.
//!
//! Consolidates arbitrarily many logical subscriptions onto one live
//! connection:
//! - one fan-out group per distinct (table, event, filter) key
//! - one low-level listener per group, shared by all its subscribers
//! - reconnect-and-replay on channel failure, transparent to callers
//!
//! # Example
//!
//! ```ignore
//! let registry = SubscriptionRegistry::new(transport);
//!
//! let handle = registry.subscribe(
//!     "sessions",
//!     EventKind::Insert,
//!     Some("user_id=eq.42"),
//!     |event| println!("new session: {:?}", event),
//! );
//!
//! // Later: stops this callback, leaves everyone else untouched.
//! registry.unsubscribe(handle);
//! ```

mod manager;
mod types;

pub use manager::SubscriptionRegistry;
pub use types::{
    EventCallback, FanoutKey, RegistryConfig, SubscriptionHandle, SubscriptionId,
};

pub(crate) use manager::RegistryShared;
