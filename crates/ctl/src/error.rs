use std::io;

use flowctl_drivers::DriverError;
use flowctl_protocol::{Dpid, ErrorKind, MessageKind, Role, RoleErrorCode, RoleParseError};
use thiserror::Error;

use crate::channel::HandshakeState;

/// Fatal control-plane errors.
///
/// Every variant closes the connection that raised it; none is retried. The
/// non-fatal outcomes of the taxonomy (stale replies, benign out-of-place
/// messages, switches without role-message support) never surface here —
/// they are dropped or degraded in place.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The switch sent a message that is never legal in the current state.
    #[error("{kind} is illegal in state {state:?}")]
    IllegalMessage {
        /// The offending message kind.
        kind: MessageKind,
        /// The state that received it.
        state: HandshakeState,
    },
    /// The peer's hello advertised a version this controller does not speak.
    #[error("peer advertised unsupported protocol version {0:#04x}")]
    UnsupportedVersion(u8),
    /// Another connection already owns this identity.
    #[error("duplicate identity {0}; closing the newer connection")]
    DuplicateIdentity(Dpid),
    /// The switch explicitly rejected a role request. Stale generation ids,
    /// bad role values, and unsupported role values all land here.
    #[error("switch rejected role request for {role}: {code}")]
    RoleRefused {
        /// Rejection code from the switch.
        code: RoleErrorCode,
        /// The role that was being requested.
        role: Role,
    },
    /// A role reply contradicted the role the connection requested, or
    /// arrived unsolicited with a role that contradicts the settled one.
    #[error("role reply {reply} contradicts expected role {expected}")]
    UnexpectedRoleReply {
        /// Role carried by the reply.
        reply: Role,
        /// The role the connection requested or currently holds.
        expected: Role,
    },
    /// A role reply carried a value that does not map onto any role.
    #[error(transparent)]
    RoleParse(#[from] RoleParseError),
    /// The switch answered a handshake request with an error.
    #[error("switch reported {kind:?} during handshake state {state:?}")]
    PeerError {
        /// Classified error payload.
        kind: ErrorKind,
        /// The handshake state that received it.
        state: HandshakeState,
    },
    /// The bound driver failed its sub-handshake contract.
    #[error(transparent)]
    Driver(#[from] DriverError),
    /// Transport-level failure while transmitting.
    #[error(transparent)]
    Io(#[from] io::Error),
}
