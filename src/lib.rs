//! # livemux
//!
//! Consolidates many logical change subscriptions onto a single live
//! connection to a realtime backend, with automatic reconnection and
//! listener replay.
//!
//! ## Core Concepts
//!
//! - **Subscriptions**: callback registrations identified by opaque handles
//! - **Fan-out groups**: all callbacks sharing one (table, event, filter) key
//! - **Live connection**: the single shared channel, rebuilt entirely on failure
//!
//! ## Example
//!
//! ```ignore
//! use livemux::{EventKind, SubscriptionRegistry};
//!
//! let registry = SubscriptionRegistry::new(transport);
//!
//! let handle = registry.subscribe(
//!     "sessions",
//!     EventKind::Insert,
//!     Some("user_id=eq.42"),
//!     |event| println!("new session: {:?}", event),
//! );
//!
//! // Connection loss is handled internally: the registry reconnects with
//! // a fixed backoff and re-attaches one listener per distinct key.
//!
//! registry.unsubscribe(handle);
//! ```

pub mod connection;
pub mod error;
pub mod registry;
pub mod transport;
pub mod types;

// Re-exports
pub use connection::ConnectionState;
pub use error::{RealtimeError, Result};
pub use registry::{
    EventCallback, FanoutKey, RegistryConfig, SubscriptionHandle, SubscriptionId,
    SubscriptionRegistry,
};
pub use transport::{
    ChannelStatus, EventDescriptor, EventHandler, RealtimeConnection, RealtimeTransport,
    StatusHandler,
};
pub use types::{ChangeEvent, EventKind, Row};
