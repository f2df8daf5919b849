//! Subscription registry and callback fan-out.

use crate::connection::{ConnectionState, ConnectionSupervisor, SupervisorMsg};
use crate::transport::RealtimeTransport;
use crate::types::{ChangeEvent, EventKind};
use crossbeam_channel::{unbounded, Sender};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use super::types::{
    EventCallback, FanoutKey, RegistryConfig, SubscriptionHandle, SubscriptionId,
};

/// Metadata for one registration, kept independently of its group so
/// reconnect replay can reconstruct every distinct key.
pub(crate) struct SubscriptionRecord {
    pub(crate) key: FanoutKey,
}

/// Callbacks currently interested in one exact key, in registration order.
#[derive(Default)]
pub(crate) struct FanoutGroup {
    pub(crate) callbacks: Vec<(SubscriptionId, EventCallback)>,
}

#[derive(Default)]
pub(crate) struct RegistryState {
    pub(crate) subscriptions: HashMap<SubscriptionId, SubscriptionRecord>,
    pub(crate) groups: HashMap<FanoutKey, FanoutGroup>,
}

/// State shared between the registry front end and the connection
/// supervisor thread.
pub(crate) struct RegistryShared {
    pub(crate) config: RegistryConfig,
    pub(crate) state: RwLock<RegistryState>,
    pub(crate) conn_state: RwLock<ConnectionState>,
    /// Epoch of the current physical connection. Handlers wired to an
    /// older epoch drop their events instead of dispatching.
    pub(crate) conn_epoch: AtomicU64,
}

impl RegistryShared {
    /// Fan an event out to every callback currently registered for `key`.
    ///
    /// The callback set is snapshotted under the read lock and invoked
    /// outside it, so callbacks may themselves subscribe or unsubscribe.
    /// A panicking callback is logged and never stops the others.
    pub(crate) fn dispatch(&self, key: &FanoutKey, event: &ChangeEvent) {
        let callbacks: Vec<EventCallback> = {
            let state = self.state.read();
            match state.groups.get(key) {
                Some(group) => group.callbacks.iter().map(|(_, cb)| Arc::clone(cb)).collect(),
                // Listener went inert: every subscriber for this key left.
                None => return,
            }
        };

        tracing::trace!(key = %key, callbacks = callbacks.len(), "dispatching change event");
        for callback in callbacks {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback(event))) {
                tracing::error!(
                    key = %key,
                    "subscriber callback panicked: {}",
                    panic_message(&panic)
                );
            }
        }
    }

    /// Distinct fan-out keys derived from recorded subscription metadata.
    /// This is the set replayed onto a fresh connection.
    pub(crate) fn distinct_keys(&self) -> BTreeSet<FanoutKey> {
        self.state
            .read()
            .subscriptions
            .values()
            .map(|record| record.key.clone())
            .collect()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

/// Consolidates many logical subscriptions onto one live connection.
///
/// Owns all subscriptions, all fan-out groups, and the connection
/// supervisor. Construct one per process at startup and pass it by
/// reference to consumers; dropping it tears everything down.
pub struct SubscriptionRegistry {
    shared: Arc<RegistryShared>,
    next_id: AtomicU64,
    tx: Sender<SupervisorMsg>,
    supervisor: Option<JoinHandle<()>>,
}

impl SubscriptionRegistry {
    /// Create a registry over the given transport with default config.
    pub fn new(transport: Arc<dyn RealtimeTransport>) -> Self {
        Self::with_config(transport, RegistryConfig::default())
    }

    /// Create a registry over the given transport.
    pub fn with_config(transport: Arc<dyn RealtimeTransport>, config: RegistryConfig) -> Self {
        let shared = Arc::new(RegistryShared {
            config,
            state: RwLock::new(RegistryState::default()),
            conn_state: RwLock::new(ConnectionState::Absent),
            conn_epoch: AtomicU64::new(0),
        });

        let (tx, rx) = unbounded();
        let supervisor =
            ConnectionSupervisor::spawn(Arc::clone(&shared), transport, tx.clone(), rx);

        Self {
            shared,
            next_id: AtomicU64::new(1),
            tx,
            supervisor: Some(supervisor),
        }
    }

    /// Register a callback for changes on `table` matching `event` and
    /// `filter`.
    ///
    /// Returns synchronously; the live connection is created lazily in the
    /// background, so events start flowing only once it reaches
    /// `Connected`. Subscriptions sharing one (table, event, filter) key
    /// share a single low-level listener but each callback is invoked
    /// independently per event.
    pub fn subscribe<F>(
        &self,
        table: impl Into<String>,
        event: EventKind,
        filter: Option<&str>,
        callback: F,
    ) -> SubscriptionHandle
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let key = FanoutKey::new(table, event, filter.map(str::to_string));
        let callback: EventCallback = Arc::new(callback);

        let first_for_key = {
            let mut state = self.shared.state.write();
            state
                .subscriptions
                .insert(id, SubscriptionRecord { key: key.clone() });
            let group = state.groups.entry(key.clone()).or_default();
            group.callbacks.push((id, callback));
            group.callbacks.len() == 1
        };

        if first_for_key {
            tracing::debug!(key = %key, "first subscriber for key");
            let _ = self.tx.send(SupervisorMsg::KeyAdded(key));
        }

        SubscriptionHandle(id)
    }

    /// Remove a subscription. Unknown or already-removed handles are a
    /// no-op. The live connection is never affected; the last subscriber
    /// for a key only leaves its listener inert.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) {
        let mut state = self.shared.state.write();
        let Some(record) = state.subscriptions.remove(&handle.0) else {
            return;
        };

        let group_empty = match state.groups.get_mut(&record.key) {
            Some(group) => {
                group.callbacks.retain(|(id, _)| *id != handle.0);
                group.callbacks.is_empty()
            }
            None => false,
        };
        if group_empty {
            state.groups.remove(&record.key);
            tracing::debug!(key = %record.key, "last subscriber gone, group removed");
        }
    }

    /// Tear down the live connection and clear every subscription and
    /// group. No automatic reconnection follows. Idempotent.
    pub fn unsubscribe_all(&self) {
        {
            let mut state = self.shared.state.write();
            state.subscriptions.clear();
            state.groups.clear();
        }
        let _ = self.tx.send(SupervisorMsg::Teardown);
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.shared.state.read().subscriptions.len()
    }

    /// Number of fan-out groups, i.e. distinct (table, event, filter) keys.
    pub fn group_count(&self) -> usize {
        self.shared.state.read().groups.len()
    }

    /// Current state of the live connection.
    pub fn connection_state(&self) -> ConnectionState {
        *self.shared.conn_state.read()
    }
}

impl Drop for SubscriptionRegistry {
    fn drop(&mut self) {
        let _ = self.tx.send(SupervisorMsg::Shutdown);
        if let Some(handle) = self.supervisor.take() {
            let _ = handle.join();
        }
    }
}
