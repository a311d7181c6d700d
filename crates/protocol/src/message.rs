use core::fmt;

use crate::role::{GenerationId, NativeRole, VendorRole};
use crate::xid::Xid;

/// A switch's self-reported datapath id, discovered from the features reply.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Dpid(pub u64);

impl fmt::Display for Dpid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Description of a single switch port.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PortDesc {
    /// Port number, unique per switch.
    pub number: u32,
    /// Human-readable port name as reported by the switch.
    pub name: String,
    /// Whether the link is up.
    pub live: bool,
}

/// Reason attached to a port-status notice.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PortStatusReason {
    /// The port was added.
    Add,
    /// The port was removed.
    Delete,
    /// The port configuration or state changed.
    Modify,
}

/// Payload of a features reply, cached by the connection for its lifetime.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SwitchFeatures {
    /// The switch's datapath id.
    pub dpid: Dpid,
    /// Number of packet buffers the switch can hold.
    pub num_buffers: u32,
    /// Number of flow tables.
    pub num_tables: u8,
    /// Raw capability bits.
    pub capabilities: u32,
    /// Ports enumerated inline (1.0 only; empty on 1.3, which enumerates
    /// ports through a separate port-description round-trip).
    pub ports: Vec<PortDesc>,
}

/// The identity strings a switch reports in its description reply.
///
/// The driver selector matches on these to bind a per-model switch driver.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceDescription {
    /// Manufacturer string.
    pub vendor: String,
    /// Hardware revision string.
    pub hardware: String,
    /// Software revision string.
    pub software: String,
    /// Serial number.
    pub serial: String,
}

/// Code carried by a role-request-failed error.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RoleErrorCode {
    /// The request's generation id is older than one the switch has seen.
    Stale,
    /// The requested role value was malformed.
    BadRole,
    /// The switch cannot support the requested role.
    Unsupported,
}

impl fmt::Display for RoleErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stale => f.write_str("stale generation id"),
            Self::BadRole => f.write_str("bad role"),
            Self::Unsupported => f.write_str("unsupported role"),
        }
    }
}

/// Classified error payloads the engine distinguishes.
///
/// Everything else arrives as `Other` and is either dispatched to the owner
/// (post-activation) or logged, depending on the state.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ErrorKind {
    /// The switch did not understand the request. When this answers a role
    /// request it means the switch cannot do role messaging at all.
    BadRequest,
    /// The switch refused an operation for permission reasons; seen from
    /// switches that believe this controller is a slave.
    PermissionDenied,
    /// An explicit role-request rejection. Always fatal for the connection.
    RoleRequestFailed(RoleErrorCode),
    /// Any other (type, code) pair, carried through untyped.
    Other {
        /// Raw error type.
        error_type: u16,
        /// Raw error code.
        code: u16,
    },
}

/// A parsed control-channel message.
///
/// One variant per message the engine sends or receives. The external codec
/// owns framing and byte layout; by the time a message reaches the state
/// machine it is one of these values.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Message {
    /// Version negotiation opener, sent by both sides.
    Hello {
        /// Transaction id.
        xid: Xid,
        /// Highest version the sender speaks, as a wire byte.
        version: u8,
        /// Bitmap of every version the sender speaks.
        bitmap: u32,
    },
    /// Liveness probe.
    EchoRequest {
        /// Transaction id, echoed in the reply.
        xid: Xid,
        /// Opaque payload, echoed in the reply.
        data: Vec<u8>,
    },
    /// Liveness probe answer.
    EchoReply {
        /// Transaction id of the request being answered.
        xid: Xid,
        /// Payload copied from the request.
        data: Vec<u8>,
    },
    /// Asks the switch for its datapath id and capabilities.
    FeaturesRequest {
        /// Transaction id.
        xid: Xid,
    },
    /// Identity and capabilities of the switch.
    FeaturesReply {
        /// Transaction id.
        xid: Xid,
        /// Cached payload.
        features: SwitchFeatures,
    },
    /// Asks a 1.3 switch to enumerate its ports.
    PortDescRequest {
        /// Transaction id.
        xid: Xid,
    },
    /// Port enumeration from a 1.3 switch.
    PortDescReply {
        /// Transaction id.
        xid: Xid,
        /// The enumerated ports.
        ports: Vec<PortDesc>,
        /// Whether the switch will send further parts. The engine warns and
        /// proceeds with what it has.
        more: bool,
    },
    /// Pushes packet-in buffering configuration to the switch.
    SetConfig {
        /// Transaction id.
        xid: Xid,
        /// Bytes of each packet the switch should send to the controller;
        /// `0xffff` means full packets.
        miss_send_len: u16,
    },
    /// Fences preceding messages.
    BarrierRequest {
        /// Transaction id.
        xid: Xid,
    },
    /// Confirms a barrier.
    BarrierReply {
        /// Transaction id.
        xid: Xid,
    },
    /// Reads the switch configuration back.
    GetConfigRequest {
        /// Transaction id.
        xid: Xid,
    },
    /// The switch's current configuration.
    GetConfigReply {
        /// Transaction id.
        xid: Xid,
        /// Accepted miss-send length.
        miss_send_len: u16,
    },
    /// Asks for the vendor/hardware/software description.
    DescriptionRequest {
        /// Transaction id.
        xid: Xid,
    },
    /// The switch's self-description, used to bind a driver.
    DescriptionReply {
        /// Transaction id.
        xid: Xid,
        /// Identity strings.
        description: DeviceDescription,
    },
    /// Native role request (1.3 only).
    RoleRequest {
        /// Transaction id.
        xid: Xid,
        /// Requested role.
        role: NativeRole,
        /// Monotonically increasing generation id.
        generation_id: GenerationId,
    },
    /// Native role reply (1.3 only).
    RoleReply {
        /// Transaction id of the request being answered.
        xid: Xid,
        /// Granted role.
        role: NativeRole,
        /// Generation id echoed by the switch.
        generation_id: GenerationId,
    },
    /// Vendor-extension role request (1.0 only).
    VendorRoleRequest {
        /// Transaction id.
        xid: Xid,
        /// Requested role in the tri-state vendor encoding.
        role: VendorRole,
    },
    /// Vendor-extension role reply (1.0 only).
    VendorRoleReply {
        /// Transaction id of the request being answered.
        xid: Xid,
        /// Granted role in the tri-state vendor encoding.
        role: VendorRole,
    },
    /// An experimenter message that is not a role reply.
    Experimenter {
        /// Transaction id.
        xid: Xid,
        /// Experimenter id.
        experimenter: u32,
        /// Raw payload.
        data: Vec<u8>,
    },
    /// An error from the switch.
    Error {
        /// Transaction id of the request that failed.
        xid: Xid,
        /// Classified payload.
        kind: ErrorKind,
    },
    /// A port appeared, disappeared, or changed.
    PortStatus {
        /// Transaction id.
        xid: Xid,
        /// What happened.
        reason: PortStatusReason,
        /// The affected port.
        port: PortDesc,
    },
    /// A packet missed the flow tables and was punted to the controller.
    PacketIn {
        /// Transaction id.
        xid: Xid,
        /// Buffer id on the switch, if buffered there.
        buffer_id: u32,
        /// Ingress port.
        in_port: u32,
        /// Packet bytes (possibly truncated to the miss-send length).
        data: Vec<u8>,
    },
    /// A flow entry expired or was evicted.
    FlowRemoved {
        /// Transaction id.
        xid: Xid,
        /// Cookie of the removed flow.
        cookie: u64,
        /// Raw removal reason.
        reason: u8,
    },
    /// A statistics reply other than port-description or description, opaque
    /// to the handshake engine.
    StatsReply {
        /// Transaction id.
        xid: Xid,
        /// Raw multipart subtype.
        subtype: u16,
    },
}

impl Message {
    /// Returns the transaction id carried by this message.
    #[must_use]
    pub const fn xid(&self) -> Xid {
        match self {
            Self::Hello { xid, .. }
            | Self::EchoRequest { xid, .. }
            | Self::EchoReply { xid, .. }
            | Self::FeaturesRequest { xid }
            | Self::FeaturesReply { xid, .. }
            | Self::PortDescRequest { xid }
            | Self::PortDescReply { xid, .. }
            | Self::SetConfig { xid, .. }
            | Self::BarrierRequest { xid }
            | Self::BarrierReply { xid }
            | Self::GetConfigRequest { xid }
            | Self::GetConfigReply { xid, .. }
            | Self::DescriptionRequest { xid }
            | Self::DescriptionReply { xid, .. }
            | Self::RoleRequest { xid, .. }
            | Self::RoleReply { xid, .. }
            | Self::VendorRoleRequest { xid, .. }
            | Self::VendorRoleReply { xid, .. }
            | Self::Experimenter { xid, .. }
            | Self::Error { xid, .. }
            | Self::PortStatus { xid, .. }
            | Self::PacketIn { xid, .. }
            | Self::FlowRemoved { xid, .. }
            | Self::StatsReply { xid, .. } => *xid,
        }
    }

    /// Returns the discriminant used for logging and illegal-message errors.
    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        match self {
            Self::Hello { .. } => MessageKind::Hello,
            Self::EchoRequest { .. } => MessageKind::EchoRequest,
            Self::EchoReply { .. } => MessageKind::EchoReply,
            Self::FeaturesRequest { .. } => MessageKind::FeaturesRequest,
            Self::FeaturesReply { .. } => MessageKind::FeaturesReply,
            Self::PortDescRequest { .. } => MessageKind::PortDescRequest,
            Self::PortDescReply { .. } => MessageKind::PortDescReply,
            Self::SetConfig { .. } => MessageKind::SetConfig,
            Self::BarrierRequest { .. } => MessageKind::BarrierRequest,
            Self::BarrierReply { .. } => MessageKind::BarrierReply,
            Self::GetConfigRequest { .. } => MessageKind::GetConfigRequest,
            Self::GetConfigReply { .. } => MessageKind::GetConfigReply,
            Self::DescriptionRequest { .. } => MessageKind::DescriptionRequest,
            Self::DescriptionReply { .. } => MessageKind::DescriptionReply,
            Self::RoleRequest { .. } => MessageKind::RoleRequest,
            Self::RoleReply { .. } => MessageKind::RoleReply,
            Self::VendorRoleRequest { .. } => MessageKind::VendorRoleRequest,
            Self::VendorRoleReply { .. } => MessageKind::VendorRoleReply,
            Self::Experimenter { .. } => MessageKind::Experimenter,
            Self::Error { .. } => MessageKind::Error,
            Self::PortStatus { .. } => MessageKind::PortStatus,
            Self::PacketIn { .. } => MessageKind::PacketIn,
            Self::FlowRemoved { .. } => MessageKind::FlowRemoved,
            Self::StatsReply { .. } => MessageKind::StatsReply,
        }
    }
}

/// Fieldless discriminant of [`Message`], for diagnostics.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[allow(missing_docs)]
pub enum MessageKind {
    Hello,
    EchoRequest,
    EchoReply,
    FeaturesRequest,
    FeaturesReply,
    PortDescRequest,
    PortDescReply,
    SetConfig,
    BarrierRequest,
    BarrierReply,
    GetConfigRequest,
    GetConfigReply,
    DescriptionRequest,
    DescriptionReply,
    RoleRequest,
    RoleReply,
    VendorRoleRequest,
    VendorRoleReply,
    Experimenter,
    Error,
    PortStatus,
    PacketIn,
    FlowRemoved,
    StatsReply,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
