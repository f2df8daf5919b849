//! Scripted in-memory transport shared by the integration tests.
//!
//! Tests drive channel status by hand (`resolve`) and emit change events
//! at explicit key coordinates (`emit`), so reconnect behavior is
//! exercised without real network timing.

#![allow(dead_code)]

use livemux::{
    ChangeEvent, ChannelStatus, EventDescriptor, EventHandler, EventKind, RealtimeConnection,
    RealtimeTransport, RegistryConfig, Result, Row, StatusHandler,
};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// One channel handed out by the mock, inspectable by tests.
pub struct MockChannel {
    pub id: String,
    listeners: Mutex<Vec<(EventDescriptor, EventHandler)>>,
    status: Mutex<Option<StatusHandler>>,
    opened: AtomicBool,
    closed: AtomicBool,
}

impl MockChannel {
    fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            listeners: Mutex::new(Vec::new()),
            status: Mutex::new(None),
            opened: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn is_opened(&self) -> bool {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Drive the status callback, as the transport would. A status can
    /// only be reported after `open` registered the callback, so this
    /// briefly waits for the supervisor thread to get there.
    pub fn resolve(&self, status: ChannelStatus) {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            {
                let guard = self.status.lock();
                if let Some(callback) = guard.as_ref() {
                    callback(status);
                    return;
                }
            }
            if Instant::now() >= deadline {
                return;
            }
            thread::sleep(Duration::from_millis(2));
        }
    }

    /// Emit a change at the given key coordinates. Returns the number of
    /// low-level listeners hit. A closed channel delivers nothing: there
    /// is no live connection for the event to arrive on.
    pub fn emit(
        &self,
        table: &str,
        kind: EventKind,
        filter: Option<&str>,
        event: ChangeEvent,
    ) -> usize {
        if self.closed.load(Ordering::SeqCst) {
            return 0;
        }

        let listeners = self.listeners.lock();
        let mut hits = 0;
        for (descriptor, handler) in listeners.iter() {
            if descriptor.covers(table, kind, filter) {
                handler(event.clone());
                hits += 1;
            }
        }
        hits
    }
}

struct MockConnection {
    channel: Arc<MockChannel>,
}

impl RealtimeConnection for MockConnection {
    fn attach(&mut self, descriptor: EventDescriptor, handler: EventHandler) {
        self.channel.listeners.lock().push((descriptor, handler));
    }

    fn open(&mut self, status: StatusHandler) {
        *self.channel.status.lock() = Some(status);
        self.channel.opened.store(true, Ordering::SeqCst);
    }

    fn close(self: Box<Self>) {
        self.channel.closed.store(true, Ordering::SeqCst);
        self.channel.listeners.lock().clear();
        *self.channel.status.lock() = None;
    }
}

/// Records every channel it hands out.
#[derive(Default)]
pub struct MockTransport {
    channels: Mutex<Vec<Arc<MockChannel>>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn connect_count(&self) -> usize {
        self.channels.lock().len()
    }

    pub fn channel(&self, index: usize) -> Arc<MockChannel> {
        Arc::clone(&self.channels.lock()[index])
    }

    pub fn last_channel(&self) -> Arc<MockChannel> {
        Arc::clone(self.channels.lock().last().expect("no channel created"))
    }

    pub fn channel_ids(&self) -> Vec<String> {
        self.channels.lock().iter().map(|c| c.id.clone()).collect()
    }
}

impl RealtimeTransport for MockTransport {
    fn connect(&self, channel_id: &str) -> Result<Box<dyn RealtimeConnection>> {
        let channel = MockChannel::new(channel_id);
        self.channels.lock().push(Arc::clone(&channel));
        Ok(Box::new(MockConnection { channel }))
    }
}

/// Registry config with a backoff short enough for tests.
pub fn quick_config() -> RegistryConfig {
    RegistryConfig {
        reconnect_backoff: Duration::from_millis(40),
        ..Default::default()
    }
}

/// Poll until `predicate` holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, predicate: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if predicate() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    predicate()
}

/// A callback that counts its invocations.
pub fn counting_callback() -> (
    Arc<AtomicUsize>,
    impl Fn(&ChangeEvent) + Send + Sync + 'static,
) {
    let count = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&count);
    (count, move |_: &ChangeEvent| {
        counter.fetch_add(1, Ordering::SeqCst);
    })
}

pub fn insert_event(table: &str) -> ChangeEvent {
    let mut row = Row::new();
    row.insert("id".to_string(), json!(1));
    ChangeEvent::Insert {
        table: table.to_string(),
        schema: "public".to_string(),
        commit_timestamp: None,
        new_row: row,
    }
}

pub fn update_event(table: &str) -> ChangeEvent {
    let mut row = Row::new();
    row.insert("id".to_string(), json!(1));
    ChangeEvent::Update {
        table: table.to_string(),
        schema: "public".to_string(),
        commit_timestamp: None,
        old_row: row.clone(),
        new_row: row,
    }
}

pub fn delete_event(table: &str) -> ChangeEvent {
    let mut row = Row::new();
    row.insert("id".to_string(), json!(1));
    ChangeEvent::Delete {
        table: table.to_string(),
        schema: "public".to_string(),
        commit_timestamp: None,
        old_row: row,
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}
