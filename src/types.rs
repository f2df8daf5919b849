//! Core event types for the multiplexer.

use crate::error::{RealtimeError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// A row as delivered by the change feed: column name to JSON value.
pub type Row = Map<String, Value>;

/// Kind of row change a subscription listens for.
///
/// `Any` is only meaningful on the subscription side; delivered events
/// always carry a concrete kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "INSERT")]
    Insert,
    #[serde(rename = "UPDATE")]
    Update,
    #[serde(rename = "DELETE")]
    Delete,
    #[serde(rename = "*")]
    Any,
}

impl EventKind {
    /// Wire representation used by the transport.
    pub fn as_wire(&self) -> &'static str {
        match self {
            EventKind::Insert => "INSERT",
            EventKind::Update => "UPDATE",
            EventKind::Delete => "DELETE",
            EventKind::Any => "*",
        }
    }

    /// Parse the wire representation.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "INSERT" => Some(EventKind::Insert),
            "UPDATE" => Some(EventKind::Update),
            "DELETE" => Some(EventKind::Delete),
            "*" => Some(EventKind::Any),
            _ => None,
        }
    }

    /// Whether a concrete emitted kind falls under this subscription kind.
    pub fn covers(&self, emitted: EventKind) -> bool {
        *self == EventKind::Any || *self == emitted
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// A single row-change notification, tagged by change kind.
///
/// Consumers pattern-match on the variant instead of probing an untyped
/// payload. `old_row` carries whatever the backend includes for the
/// previous row image, which may be only the primary key columns.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeEvent {
    Insert {
        table: String,
        schema: String,
        commit_timestamp: Option<String>,
        new_row: Row,
    },
    Update {
        table: String,
        schema: String,
        commit_timestamp: Option<String>,
        old_row: Row,
        new_row: Row,
    },
    Delete {
        table: String,
        schema: String,
        commit_timestamp: Option<String>,
        old_row: Row,
    },
}

impl ChangeEvent {
    /// Table the change belongs to.
    pub fn table(&self) -> &str {
        match self {
            ChangeEvent::Insert { table, .. }
            | ChangeEvent::Update { table, .. }
            | ChangeEvent::Delete { table, .. } => table,
        }
    }

    /// Schema the change belongs to.
    pub fn schema(&self) -> &str {
        match self {
            ChangeEvent::Insert { schema, .. }
            | ChangeEvent::Update { schema, .. }
            | ChangeEvent::Delete { schema, .. } => schema,
        }
    }

    /// Concrete kind of this change (never `Any`).
    pub fn kind(&self) -> EventKind {
        match self {
            ChangeEvent::Insert { .. } => EventKind::Insert,
            ChangeEvent::Update { .. } => EventKind::Update,
            ChangeEvent::Delete { .. } => EventKind::Delete,
        }
    }

    /// Parse a raw change payload from the transport.
    ///
    /// Expects the shape emitted by the change feed:
    /// `{"eventType": "INSERT", "schema": ..., "table": ...,
    ///   "commit_timestamp": ..., "new": {...}, "old": {...}}`.
    pub fn from_wire(payload: Value) -> Result<Self> {
        let obj = payload.as_object().ok_or_else(|| {
            RealtimeError::Deserialization("change payload is not an object".to_string())
        })?;

        let event_type = obj
            .get("eventType")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                RealtimeError::Deserialization("change payload missing eventType".to_string())
            })?;

        let table = obj
            .get("table")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                RealtimeError::Deserialization("change payload missing table".to_string())
            })?
            .to_string();

        let schema = obj
            .get("schema")
            .and_then(Value::as_str)
            .unwrap_or("public")
            .to_string();

        let commit_timestamp = obj
            .get("commit_timestamp")
            .and_then(Value::as_str)
            .map(str::to_string);

        let row_field = |name: &str| -> Row {
            obj.get(name)
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default()
        };

        match event_type {
            "INSERT" => Ok(ChangeEvent::Insert {
                table,
                schema,
                commit_timestamp,
                new_row: row_field("new"),
            }),
            "UPDATE" => Ok(ChangeEvent::Update {
                table,
                schema,
                commit_timestamp,
                old_row: row_field("old"),
                new_row: row_field("new"),
            }),
            "DELETE" => Ok(ChangeEvent::Delete {
                table,
                schema,
                commit_timestamp,
                old_row: row_field("old"),
            }),
            other => Err(RealtimeError::Deserialization(format!(
                "unknown event type: {other}"
            ))),
        }
    }
}
