//! Live connection supervisor.
//!
//! A dedicated thread owns the single channel to the realtime transport
//! and drives its state machine: absent → connecting → connected, back to
//! absent on error or timeout, then connecting again after a fixed
//! backoff. Retries are unbounded; only a full teardown stops the loop.
//!
//! On every (re)connect the supervisor snapshots the distinct fan-out keys
//! currently recorded in the registry and attaches one low-level listener
//! per key. Listeners resolve their callback set at dispatch time, so
//! subscriptions added or removed between snapshot and delivery are
//! honored.

use crate::registry::{FanoutKey, RegistryShared};
use crate::transport::{
    ChannelStatus, EventHandler, RealtimeConnection, RealtimeTransport, StatusHandler,
};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

/// Observable state of the live connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection exists (initial state, after teardown, or during the
    /// backoff window between attempts).
    Absent,
    /// A connection is being established.
    Connecting,
    /// The channel is established and events are flowing.
    Connected,
}

/// Commands processed by the supervisor thread.
pub(crate) enum SupervisorMsg {
    /// A fan-out group was created; attach its listener, creating the
    /// connection lazily if none exists.
    KeyAdded(FanoutKey),
    /// Status report from the transport, tagged with the epoch of the
    /// connection it belongs to.
    Status { epoch: u64, status: ChannelStatus },
    /// Drop the connection and cancel any pending retry.
    Teardown,
    /// Registry is being dropped.
    Shutdown,
}

/// Exclusive owner of the live connection.
pub(crate) struct ConnectionSupervisor {
    shared: Arc<RegistryShared>,
    transport: Arc<dyn RealtimeTransport>,
    tx: Sender<SupervisorMsg>,
    rx: Receiver<SupervisorMsg>,
    conn: Option<Box<dyn RealtimeConnection>>,
    /// Keys with a listener on the current connection.
    attached: HashSet<FanoutKey>,
    /// Deadline of the pending reconnect attempt, if any.
    retry_at: Option<Instant>,
}

impl ConnectionSupervisor {
    pub(crate) fn spawn(
        shared: Arc<RegistryShared>,
        transport: Arc<dyn RealtimeTransport>,
        tx: Sender<SupervisorMsg>,
        rx: Receiver<SupervisorMsg>,
    ) -> JoinHandle<()> {
        let supervisor = Self {
            shared,
            transport,
            tx,
            rx,
            conn: None,
            attached: HashSet::new(),
            retry_at: None,
        };

        thread::Builder::new()
            .name("livemux-connection".to_string())
            .spawn(move || supervisor.run())
            .expect("failed to spawn connection supervisor")
    }

    fn run(mut self) {
        loop {
            let msg = match self.retry_at {
                Some(deadline) => match self.rx.recv_deadline(deadline) {
                    Ok(msg) => msg,
                    Err(RecvTimeoutError::Timeout) => {
                        self.retry_at = None;
                        self.connect();
                        continue;
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                },
                None => match self.rx.recv() {
                    Ok(msg) => msg,
                    Err(_) => break,
                },
            };

            match msg {
                SupervisorMsg::KeyAdded(key) => self.on_key_added(key),
                SupervisorMsg::Status { epoch, status } => self.on_status(epoch, status),
                SupervisorMsg::Teardown => self.teardown(),
                SupervisorMsg::Shutdown => break,
            }
        }

        self.discard_connection();
    }

    fn on_key_added(&mut self, key: FanoutKey) {
        if self.conn.is_some() {
            self.attach_listener(key);
        } else if self.retry_at.is_none() {
            // Lazy creation on first subscription (and after teardown).
            // The connect snapshot picks the new key up.
            self.connect();
        }
        // Otherwise a reconnect is pending; replay will attach the key.
    }

    fn on_status(&mut self, epoch: u64, status: ChannelStatus) {
        if epoch != self.shared.conn_epoch.load(Ordering::SeqCst) {
            tracing::trace!(%status, epoch, "ignoring status from stale channel");
            return;
        }

        match status {
            ChannelStatus::Subscribed => {
                *self.shared.conn_state.write() = ConnectionState::Connected;
                tracing::info!("realtime channel established");
            }
            ChannelStatus::ChannelError | ChannelStatus::TimedOut => {
                tracing::warn!(
                    %status,
                    backoff = ?self.shared.config.reconnect_backoff,
                    "realtime channel lost, scheduling reconnect"
                );
                self.discard_connection();
                self.retry_at = Some(Instant::now() + self.shared.config.reconnect_backoff);
            }
            ChannelStatus::Closed => {
                // Follows our own close; the state transition already
                // happened when the connection was discarded.
                tracing::debug!("realtime channel closed");
            }
        }
    }

    fn teardown(&mut self) {
        self.retry_at = None;
        self.discard_connection();
        tracing::info!("realtime channel torn down");
    }

    /// Create a fresh connection and replay one listener per distinct key.
    fn connect(&mut self) {
        self.discard_connection();

        let epoch = self.shared.conn_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let channel_id = format!("{}-{}", self.shared.config.channel_prefix, epoch);
        let keys = self.shared.distinct_keys();

        *self.shared.conn_state.write() = ConnectionState::Connecting;

        let conn = match self.transport.connect(&channel_id) {
            Ok(conn) => conn,
            Err(err) => {
                tracing::warn!(channel = %channel_id, "transport connect failed: {err}");
                *self.shared.conn_state.write() = ConnectionState::Absent;
                self.retry_at = Some(Instant::now() + self.shared.config.reconnect_backoff);
                return;
            }
        };

        tracing::info!(
            channel = %channel_id,
            listeners = keys.len(),
            "opening realtime channel"
        );

        self.conn = Some(conn);
        for key in keys {
            self.attach_listener(key);
        }

        let status = Self::status_handler(&self.tx, epoch);
        if let Some(conn) = &mut self.conn {
            conn.open(status);
        }
    }

    /// Attach the low-level listener for one key to the current
    /// connection. Idempotent per connection: a key that already has a
    /// listener (possibly inert) is left alone.
    fn attach_listener(&mut self, key: FanoutKey) {
        if !self.attached.insert(key.clone()) {
            return;
        }

        let epoch = self.shared.conn_epoch.load(Ordering::SeqCst);
        let descriptor = key.descriptor(&self.shared.config.schema);
        let handler = Self::event_handler(&self.shared, key, epoch);
        if let Some(conn) = &mut self.conn {
            conn.attach(descriptor, handler);
        }
    }

    /// Handler wired into the transport for one key. Resolves the callback
    /// set at dispatch time and drops events from a discarded connection.
    fn event_handler(shared: &Arc<RegistryShared>, key: FanoutKey, epoch: u64) -> EventHandler {
        let shared = Arc::clone(shared);
        Box::new(move |event| {
            if shared.conn_epoch.load(Ordering::SeqCst) != epoch {
                return;
            }
            shared.dispatch(&key, &event);
        })
    }

    fn status_handler(tx: &Sender<SupervisorMsg>, epoch: u64) -> StatusHandler {
        let tx = tx.clone();
        Box::new(move |status| {
            let _ = tx.send(SupervisorMsg::Status { epoch, status });
        })
    }

    /// Drop the current connection, invalidating its handlers, without
    /// touching subscription or group state.
    fn discard_connection(&mut self) {
        if let Some(conn) = self.conn.take() {
            // Advance the epoch first so in-flight events from this
            // channel are rejected at dispatch.
            self.shared.conn_epoch.fetch_add(1, Ordering::SeqCst);
            conn.close();
        }
        self.attached.clear();
        *self.shared.conn_state.write() = ConnectionState::Absent;
    }
}
