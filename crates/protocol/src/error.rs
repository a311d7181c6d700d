use thiserror::Error;

/// Error raised when a wire role discriminant cannot be mapped onto a
/// controller role.
///
/// A reply carrying an unknown or unusable role value is a protocol violation
/// for the connection that received it; the control plane converts this into
/// its fatal error taxonomy rather than guessing a role.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum RoleParseError {
    /// The native role message carried `NOCHANGE`, which a switch must never
    /// send in a reply.
    #[error("native role reply carried NOCHANGE, which is only valid in queries")]
    NoChangeInReply,
    /// The discriminant did not name any known role.
    #[error("unknown role discriminant {0:#x}")]
    UnknownDiscriminant(u32),
}
