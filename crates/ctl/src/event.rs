use crossbeam_channel::{Receiver, Sender, TryRecvError, unbounded};
use flowctl_protocol::{Message, Role};

/// One unit of work for a connection's single worker.
///
/// Transport events and parsed messages arrive in receipt order; registry
/// callbacks are funneled through the same queue instead of mutating
/// connection state from an arbitrary thread.
#[derive(Clone, Debug)]
pub enum Event {
    /// The transport session is up; start the handshake.
    Connected,
    /// A parsed inbound message.
    Message(Message),
    /// The transport saw no traffic for the idle window.
    Idle,
    /// The mastership registry resolved the role this instance should take.
    RegistryRole(Role),
    /// The transport session ended.
    Disconnected,
}

/// Cloneable posting half of a connection's event queue.
///
/// Held by the registry adapter and the connection directory so that
/// cross-connection signals (mastership grants, demotions) re-enter the
/// owning worker as ordinary events.
#[derive(Clone, Debug)]
pub struct EventSender {
    tx: Sender<Event>,
}

impl EventSender {
    /// Posts an event, returning false when the connection's queue is gone
    /// (the connection closed and its receiver was dropped). A failed post is
    /// always safe to ignore: by definition nobody is processing events for
    /// that connection anymore.
    pub fn post(&self, event: Event) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Consuming half of a connection's event queue; owned by its single worker.
#[derive(Debug)]
pub struct EventReceiver {
    rx: Receiver<Event>,
}

impl EventReceiver {
    /// Blocks until the next event, or returns `None` once every sender is
    /// dropped.
    pub fn recv(&self) -> Option<Event> {
        self.rx.recv().ok()
    }

    /// Returns the next event without blocking, if one is queued.
    pub fn try_recv(&self) -> Option<Event> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }
}

/// Factory for per-connection event queues.
#[derive(Debug)]
pub struct EventQueue;

impl EventQueue {
    /// Creates an unbounded sender/receiver pair for one connection.
    #[must_use]
    pub fn unbounded() -> (EventSender, EventReceiver) {
        let (tx, rx) = unbounded();
        (EventSender { tx }, EventReceiver { rx })
    }
}
