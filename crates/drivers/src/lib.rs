#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `flowctl-drivers` defines the contract between the handshake engine and
//! per-model switch drivers, plus the selection machinery that binds a driver
//! to a connection once the switch has described itself.
//!
//! After the main handshake learns a switch's vendor/hardware/software
//! identity, the engine asks a [`DriverSelector`] for a [`SwitchDriver`] and
//! runs the driver's *sub-handshake*: the driver may send model-specific
//! configuration, sees every message the switch sends until it declares
//! itself complete, and then never sees another message. A driver must
//! tolerate completing with zero inbound messages; the [`DefaultDriver`]
//! bound to unrecognized switches does exactly that.
//!
//! # Invariants
//!
//! - A driver is bound exactly once per connection.
//! - Once [`SwitchDriver::is_complete`] first returns true, forwarding
//!   another message to [`SwitchDriver::handle`] is a local programming
//!   error surfaced as [`DriverError::HandshakeAlreadyComplete`].
//! - Driver-originated messages draw transaction ids from the connection's
//!   own [`HandshakeXids`] counter, so ids stay globally decreasing per
//!   connection.

mod default;
mod selector;

pub use default::{DefaultDriver, TableMissDriver};
pub use selector::{DriverConstructor, DriverMatcher, DriverSelector};

use flowctl_protocol::{HandshakeXids, Message};
use thiserror::Error;

/// Error raised by a driver during its sub-handshake.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum DriverError {
    /// A message was forwarded after the driver reported completion.
    #[error("driver sub-handshake already complete; no further messages may be forwarded")]
    HandshakeAlreadyComplete,
}

/// The sub-handshake lifecycle every per-model driver implements.
///
/// The engine calls [`start`](Self::start) once, forwards messages through
/// [`handle`](Self::handle) until [`is_complete`](Self::is_complete) turns
/// true, and sends whatever messages the driver returns. Completion must be
/// reached deterministically from the forwarded messages alone.
pub trait SwitchDriver: Send {
    /// Begins the sub-handshake, returning any messages to transmit.
    fn start(&mut self, xids: &mut HandshakeXids) -> Vec<Message>;

    /// Handles one message forwarded during the sub-handshake, returning any
    /// follow-up messages to transmit.
    fn handle(
        &mut self,
        message: Message,
        xids: &mut HandshakeXids,
    ) -> Result<Vec<Message>, DriverError>;

    /// Reports whether the sub-handshake has finished.
    fn is_complete(&self) -> bool;

    /// Reports whether the switch understands role-request messages.
    ///
    /// On the 1.0 dialect this gates the vendor role extension; when false,
    /// the engine assigns roles purely from registry callbacks.
    fn supports_role_messages(&self) -> bool;

    /// Short driver name for logging.
    fn name(&self) -> &'static str;
}
