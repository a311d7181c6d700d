use core::fmt;

use crate::error::RoleParseError;

/// The role a controller instance plays for one switch.
///
/// `Master` may program the switch exclusively, `Equal` may program it
/// alongside others, and `Slave` is read-only. On the 1.0 vendor-extension
/// dialect there is no well-defined EQUAL, so an EQUAL intent is folded into
/// SLAVE before it reaches the wire (see [`VendorRole::from_role`]).
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Role {
    /// May program the switch; at most one active master per switch.
    Master,
    /// May program the switch, but not exclusively.
    Equal,
    /// Read-only.
    Slave,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Master => f.write_str("MASTER"),
            Self::Equal => f.write_str("EQUAL"),
            Self::Slave => f.write_str("SLAVE"),
        }
    }
}

/// Role value carried by the vendor/experimenter role envelope (1.0 only).
///
/// The tri-state wire encoding has no EQUAL: `Other` exists but its behavior
/// is undefined, so it is only ever sent for queries.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum VendorRole {
    /// The undefined third state; sent only when querying.
    Other,
    /// Exclusive control.
    Master,
    /// Read-only.
    Slave,
}

impl VendorRole {
    /// Maps a controller role onto the vendor encoding for a role request.
    ///
    /// EQUAL folds into SLAVE because `Other` has no defined switch-side
    /// behavior and cannot be trusted to act like either.
    #[must_use]
    pub const fn from_role(role: Role) -> Self {
        match role {
            Role::Master => Self::Master,
            Role::Equal | Role::Slave => Self::Slave,
        }
    }

    /// Maps a vendor role reply back onto a controller role.
    ///
    /// `Other` reads back as EQUAL, mirroring how the engine internally names
    /// the not-master state on 1.0 switches.
    #[must_use]
    pub const fn into_role(self) -> Role {
        match self {
            Self::Master => Role::Master,
            Self::Other => Role::Equal,
            Self::Slave => Role::Slave,
        }
    }

    /// Parses the wire discriminant used by the experimenter envelope.
    pub const fn from_wire(value: u32) -> Result<Self, RoleParseError> {
        match value {
            0 => Ok(Self::Other),
            1 => Ok(Self::Master),
            2 => Ok(Self::Slave),
            other => Err(RoleParseError::UnknownDiscriminant(other)),
        }
    }
}

/// Role value carried by the native role message (1.3 only).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NativeRole {
    /// Query the current role without changing it. Requests only.
    NoChange,
    /// May program the switch alongside other controllers.
    Equal,
    /// Exclusive control.
    Master,
    /// Read-only.
    Slave,
}

impl NativeRole {
    /// Maps a controller role onto the native encoding for a role request.
    #[must_use]
    pub const fn from_role(role: Role) -> Self {
        match role {
            Role::Master => Self::Master,
            Role::Equal => Self::Equal,
            Role::Slave => Self::Slave,
        }
    }

    /// Maps a native role reply back onto a controller role.
    ///
    /// `NoChange` is only legal in requests; a reply carrying it is a
    /// protocol violation surfaced as [`RoleParseError::NoChangeInReply`].
    pub const fn into_role(self) -> Result<Role, RoleParseError> {
        match self {
            Self::Master => Ok(Role::Master),
            Self::Equal => Ok(Role::Equal),
            Self::Slave => Ok(Role::Slave),
            Self::NoChange => Err(RoleParseError::NoChangeInReply),
        }
    }
}

/// Generation id carried by native role requests.
///
/// A monotonically increasing value the switch uses to reject role requests
/// that arrive out of order across controller instances.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GenerationId(pub u64);

impl fmt::Display for GenerationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-connection generation-id allocator.
///
/// Single-writer like everything else owned by a connection, so a plain
/// counter suffices.
#[derive(Debug, Default)]
pub struct GenerationIds {
    next: u64,
}

impl GenerationIds {
    /// Creates an allocator starting at generation zero.
    #[must_use]
    pub const fn new() -> Self {
        Self { next: 0 }
    }

    /// Returns the next generation id, strictly greater than all earlier ones.
    pub fn next(&mut self) -> GenerationId {
        let id = GenerationId(self.next);
        self.next += 1;
        id
    }
}
