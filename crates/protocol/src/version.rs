use core::fmt;

/// A negotiated OpenFlow protocol version.
///
/// The engine speaks exactly two versions of the protocol. The hello exchange
/// advertises both through [`ProtocolVersion::hello_bitmap`]; a peer that
/// announces anything else is rejected during the handshake.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ProtocolVersion {
    /// OpenFlow 1.0 (wire byte `0x01`).
    V1_0,
    /// OpenFlow 1.3 (wire byte `0x04`).
    V1_3,
}

impl ProtocolVersion {
    /// Supported versions, ordered from newest to oldest as advertised in the
    /// hello exchange.
    pub const SUPPORTED: [Self; 2] = [Self::V1_3, Self::V1_0];

    /// The version bitmap carried in our hello element: bits `0x01` (1.0) and
    /// `0x04` (1.3) set, nothing else.
    pub const HELLO_BITMAP: u32 = 0x0000_0012;

    /// Converts a peer-advertised wire byte into a supported version.
    ///
    /// Returns `None` for every version this controller does not speak; the
    /// caller treats that as a fatal handshake failure rather than clamping,
    /// because the two supported dialects are not adjacent on the wire.
    #[must_use]
    pub const fn from_wire(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::V1_0),
            0x04 => Some(Self::V1_3),
            _ => None,
        }
    }

    /// Returns the wire byte for this version.
    #[must_use]
    pub const fn as_wire(self) -> u8 {
        match self {
            Self::V1_0 => 0x01,
            Self::V1_3 => 0x04,
        }
    }

    /// Reports whether the handshake must run an explicit port-description
    /// round-trip before configuration.
    ///
    /// 1.0 switches enumerate their ports inside the features reply; 1.3
    /// switches require a separate port-description request.
    #[must_use]
    pub const fn requires_port_description(self) -> bool {
        matches!(self, Self::V1_3)
    }

    /// Reports whether role negotiation uses the vendor/experimenter envelope
    /// instead of the native role message.
    ///
    /// The native role message only exists on 1.3; on 1.0 the only option is
    /// the vendor extension, and only when the bound driver says the switch
    /// understands it.
    #[must_use]
    pub const fn uses_vendor_role_messages(self) -> bool {
        matches!(self, Self::V1_0)
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V1_0 => f.write_str("1.0"),
            Self::V1_3 => f.write_str("1.3"),
        }
    }
}
