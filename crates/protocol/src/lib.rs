#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `flowctl-protocol` is the parsed message model shared across the flowctl
//! workspace. The control-plane engine in `flowctl-ctl` never touches wire
//! bytes; an external codec parses frames into the [`Message`] values defined
//! here and serializes the messages the engine originates. What this crate
//! owns is everything the handshake logic needs to reason about:
//!
//! - the two supported protocol versions and the hello version bitmap
//!   ([`ProtocolVersion`]),
//! - controller roles and their two incompatible wire encodings
//!   ([`Role`], [`VendorRole`], [`NativeRole`], [`GenerationId`]),
//! - connection-local transaction-id allocation ([`Xid`], [`HandshakeXids`]),
//! - switch identity ([`Dpid`]) and the cached handshake payloads
//!   ([`SwitchFeatures`], [`DeviceDescription`], [`PortDesc`]).
//!
//! # Invariants
//!
//! - Controller-originated handshake messages draw their transaction ids from
//!   a single per-connection [`HandshakeXids`] counter that only decreases.
//! - Generation ids handed to native role requests only increase for the
//!   lifetime of a connection ([`GenerationIds`]).
//! - Only the two versions in [`ProtocolVersion::SUPPORTED`] are ever
//!   negotiated; everything else fails [`ProtocolVersion::from_wire`].

mod error;
mod message;
mod role;
mod version;
mod xid;

pub use error::RoleParseError;
pub use message::{
    DeviceDescription, Dpid, ErrorKind, Message, MessageKind, PortDesc, PortStatusReason,
    RoleErrorCode, SwitchFeatures,
};
pub use role::{GenerationId, GenerationIds, NativeRole, Role, VendorRole};
pub use version::ProtocolVersion;
pub use xid::{HandshakeXids, Xid};
