use dashmap::DashMap;
use flowctl_protocol::{Dpid, Role};
use tracing::{error, info, warn};

use crate::event::{Event, EventSender};

/// Identity-keyed registry of live connections.
///
/// Three maps track a connection's lifecycle: `connected` from identity
/// registration until close, and `active_master`/`active_equal` once the
/// handshake completes in the corresponding role. A connection appears in at
/// most one of the active maps. The maps store the connection's
/// [`EventSender`] so cross-connection signals can be routed without sharing
/// any connection state.
///
/// All methods are callable from any thread; each map is internally sharded.
#[derive(Debug, Default)]
pub struct ConnectionDirectory {
    connected: DashMap<Dpid, EventSender>,
    active_master: DashMap<Dpid, EventSender>,
    active_equal: DashMap<Dpid, EventSender>,
}

impl ConnectionDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `dpid` for a connection that just learned its identity.
    ///
    /// Returns false when another live connection already holds the identity;
    /// the caller must close itself without disturbing the existing entry.
    pub fn register(&self, dpid: Dpid, events: EventSender) -> bool {
        if self.connected.contains_key(&dpid) {
            error!(%dpid, "identity already connected; rejecting the newer connection");
            return false;
        }
        self.connected.insert(dpid, events);
        info!(%dpid, "switch connected");
        true
    }

    /// Marks a connection active as MASTER after a completed handshake.
    ///
    /// Returns false when the connection is no longer the registered owner of
    /// `dpid` (it raced with its own close) or when an active entry already
    /// exists; activation must then be abandoned.
    pub fn activate_master(&self, dpid: Dpid, events: &EventSender) -> bool {
        if !self.valid_activation(dpid) {
            return false;
        }
        self.active_master.insert(dpid, events.clone());
        info!(%dpid, role = %Role::Master, "switch activated");
        true
    }

    /// Marks a connection active as EQUAL after a completed handshake.
    pub fn activate_equal(&self, dpid: Dpid, events: &EventSender) -> bool {
        if !self.valid_activation(dpid) {
            return false;
        }
        self.active_equal.insert(dpid, events.clone());
        info!(%dpid, role = %Role::Equal, "switch activated");
        true
    }

    /// Moves an already-active connection from the EQUAL to the MASTER table.
    pub fn transition_to_master(&self, dpid: Dpid) {
        if let Some((_, events)) = self.active_equal.remove(&dpid) {
            self.active_master.insert(dpid, events);
            info!(%dpid, "transitioned EQUAL -> MASTER");
        } else {
            warn!(%dpid, "transition to MASTER for a switch not active as EQUAL");
        }
    }

    /// Moves an already-active connection from the MASTER to the EQUAL table.
    pub fn transition_to_equal(&self, dpid: Dpid) {
        if let Some((_, events)) = self.active_master.remove(&dpid) {
            self.active_equal.insert(dpid, events);
            info!(%dpid, "transitioned MASTER -> EQUAL");
        } else {
            warn!(%dpid, "transition to EQUAL for a switch not active as MASTER");
        }
    }

    /// Removes every trace of `dpid`; called exactly once per registered
    /// connection when it closes.
    pub fn remove(&self, dpid: Dpid) {
        self.connected.remove(&dpid);
        self.active_master.remove(&dpid);
        self.active_equal.remove(&dpid);
        info!(%dpid, "switch disconnected");
    }

    /// Posts an event to the connection currently registered for `dpid`.
    /// Returns false when no such connection exists or its queue is gone.
    pub fn post(&self, dpid: Dpid, event: Event) -> bool {
        self.connected
            .get(&dpid)
            .is_some_and(|events| events.post(event))
    }

    /// True while a connection holds the identity (registered, whether or not
    /// it is active yet).
    #[must_use]
    pub fn is_connected(&self, dpid: Dpid) -> bool {
        self.connected.contains_key(&dpid)
    }

    /// True once the connection for `dpid` is active as MASTER.
    #[must_use]
    pub fn is_active_master(&self, dpid: Dpid) -> bool {
        self.active_master.contains_key(&dpid)
    }

    /// True once the connection for `dpid` is active as EQUAL.
    #[must_use]
    pub fn is_active_equal(&self, dpid: Dpid) -> bool {
        self.active_equal.contains_key(&dpid)
    }

    fn valid_activation(&self, dpid: Dpid) -> bool {
        if !self.connected.contains_key(&dpid) {
            error!(%dpid, "activation for a switch that is no longer connected");
            return false;
        }
        if self.active_master.contains_key(&dpid) || self.active_equal.contains_key(&dpid) {
            error!(%dpid, "activation for a switch that is already active");
            return false;
        }
        true
    }
}
