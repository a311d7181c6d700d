use flowctl_protocol::{Dpid, Role};
use tracing::debug;

use crate::event::{Event, EventSender};

/// Seam to the external mastership arbiter.
///
/// A connection submits a request once, when it reaches role negotiation,
/// and may be told about later reassignments at any time. Implementations
/// answer asynchronously by posting [`Event::RegistryRole`] on the sender
/// they were handed; they must never mutate connection state directly.
pub trait MastershipRegistry: Send + Sync {
    /// Asks the arbiter which role this instance should take for `dpid`.
    /// The answer, and any future reassignment, arrives as
    /// [`Event::RegistryRole`] on `events`.
    fn request_mastership(&self, dpid: Dpid, events: EventSender);

    /// Tells the arbiter the connection for `dpid` is gone and its claim
    /// should be released.
    fn release(&self, dpid: Dpid);
}

/// Registry for single-instance deployments: every request is granted
/// MASTER immediately.
#[derive(Clone, Copy, Debug, Default)]
pub struct StandaloneRegistry;

impl MastershipRegistry for StandaloneRegistry {
    fn request_mastership(&self, dpid: Dpid, events: EventSender) {
        debug!(%dpid, "no arbiter configured; granting MASTER");
        events.post(Event::RegistryRole(Role::Master));
    }

    fn release(&self, _dpid: Dpid) {}
}
