//! Subscription bookkeeping types.

use crate::transport::EventDescriptor;
use crate::types::{ChangeEvent, EventKind};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default delay between reconnect attempts.
const DEFAULT_RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

/// Unique identifier for a subscription.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

impl fmt::Debug for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriptionId({})", self.0)
    }
}

/// Opaque handle returned by `subscribe`, used later to `unsubscribe`.
///
/// Handles remain semantically valid across reconnects: the registry
/// replays the underlying listeners, the caller never re-registers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(pub(crate) SubscriptionId);

/// Callback invoked with each matching change event.
pub type EventCallback = Arc<dyn Fn(&ChangeEvent) + Send + Sync + 'static>;

/// Derived key of a fan-out group.
///
/// All subscriptions sharing one key share a single low-level listener on
/// the live connection; fan-out happens at the callback level.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FanoutKey {
    pub table: String,
    pub event: EventKind,
    pub filter: Option<String>,
}

impl FanoutKey {
    pub fn new(table: impl Into<String>, event: EventKind, filter: Option<String>) -> Self {
        Self {
            table: table.into(),
            event,
            filter,
        }
    }

    /// The low-level listener registration for this key.
    pub(crate) fn descriptor(&self, schema: &str) -> EventDescriptor {
        EventDescriptor {
            schema: schema.to_string(),
            table: self.table.clone(),
            event: self.event,
            filter: self.filter.clone(),
        }
    }
}

impl fmt::Display for FanoutKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.table, self.event)?;
        if let Some(filter) = &self.filter {
            write!(f, ":{filter}")?;
        }
        Ok(())
    }
}

/// Configuration for the subscription registry.
#[derive(Clone, Debug)]
pub struct RegistryConfig {
    /// Database schema all subscriptions target.
    pub schema: String,

    /// Prefix for generated channel identifiers. Each physical connection
    /// attempt appends a unique suffix.
    pub channel_prefix: String,

    /// Fixed delay before retrying after a channel error or timeout.
    pub reconnect_backoff: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            schema: "public".to_string(),
            channel_prefix: "realtime".to_string(),
            reconnect_backoff: DEFAULT_RECONNECT_BACKOFF,
        }
    }
}
