//! Transport abstraction over the realtime backend.
//!
//! The registry owns at most one live channel at a time and talks to it
//! through these traits. A production backend plugs in here; tests inject a
//! scripted fake, which is what makes reconnect replay testable without
//! real network timing.
//!
//! Listener attachment is decoupled from opening: `attach` may be called
//! both before and after `open`.

use crate::error::Result;
use crate::types::{ChangeEvent, EventKind};
use std::fmt;

/// Handler invoked with every change matching one attached descriptor.
pub type EventHandler = Box<dyn Fn(ChangeEvent) + Send + Sync>;

/// Handler invoked with channel lifecycle transitions.
pub type StatusHandler = Box<dyn Fn(ChannelStatus) + Send + Sync>;

/// Identifies one low-level listener registration on a channel.
///
/// The registry attaches exactly one descriptor per distinct
/// (table, event, filter) combination; `schema` comes from configuration.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EventDescriptor {
    pub schema: String,
    pub table: String,
    pub event: EventKind,
    pub filter: Option<String>,
}

impl EventDescriptor {
    /// Whether a change at the given coordinates falls under this
    /// descriptor. The filter string is opaque and compared verbatim.
    pub fn covers(&self, table: &str, kind: EventKind, filter: Option<&str>) -> bool {
        self.table == table && self.event.covers(kind) && self.filter.as_deref() == filter
    }
}

/// Lifecycle states reported by the transport for one channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelStatus {
    /// Channel established; events are flowing.
    Subscribed,
    /// Transport-side failure.
    ChannelError,
    /// Establishment did not complete within the transport's window.
    TimedOut,
    /// Channel released after an explicit close.
    Closed,
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChannelStatus::Subscribed => "SUBSCRIBED",
            ChannelStatus::ChannelError => "CHANNEL_ERROR",
            ChannelStatus::TimedOut => "TIMED_OUT",
            ChannelStatus::Closed => "CLOSED",
        })
    }
}

/// Factory for live channels, one implementation per backend.
pub trait RealtimeTransport: Send + Sync + 'static {
    /// Open a new logical channel.
    ///
    /// `channel_id` is unique per physical connection attempt so a
    /// lingering, possibly-not-yet-closed previous channel cannot collide
    /// with the new one.
    fn connect(&self, channel_id: &str) -> Result<Box<dyn RealtimeConnection>>;
}

/// One live channel. Owned exclusively by the connection supervisor; no
/// other component may hold it across a reconnect.
pub trait RealtimeConnection: Send {
    /// Register a low-level listener.
    fn attach(&mut self, descriptor: EventDescriptor, handler: EventHandler);

    /// Begin establishing the channel. `status` receives every lifecycle
    /// transition and may be invoked from a transport-owned thread.
    fn open(&mut self, status: StatusHandler);

    /// Release the channel.
    fn close(self: Box<Self>);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(event: EventKind, filter: Option<&str>) -> EventDescriptor {
        EventDescriptor {
            schema: "public".to_string(),
            table: "sessions".to_string(),
            event,
            filter: filter.map(str::to_string),
        }
    }

    #[test]
    fn test_descriptor_covers_exact_key() {
        let desc = descriptor(EventKind::Insert, Some("user_id=eq.42"));
        assert!(desc.covers("sessions", EventKind::Insert, Some("user_id=eq.42")));
        assert!(!desc.covers("sessions", EventKind::Insert, Some("user_id=eq.7")));
        assert!(!desc.covers("sessions", EventKind::Update, Some("user_id=eq.42")));
        assert!(!desc.covers("workouts", EventKind::Insert, Some("user_id=eq.42")));
    }

    #[test]
    fn test_wildcard_descriptor_covers_all_kinds() {
        let desc = descriptor(EventKind::Any, None);
        assert!(desc.covers("sessions", EventKind::Insert, None));
        assert!(desc.covers("sessions", EventKind::Delete, None));
        assert!(!desc.covers("sessions", EventKind::Insert, Some("user_id=eq.42")));
    }
}
