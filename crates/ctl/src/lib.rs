#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `flowctl-ctl` is the control-plane handshake engine: for every switch that
//! opens a control channel it drives the wire handshake (hello/version
//! selection, feature discovery, configuration, description), negotiates
//! which controller instance may program the switch (MASTER/EQUAL, arbitrated
//! by an external mastership registry), runs the bound driver's sub-handshake,
//! and only then registers the connection as active.
//!
//! The central type is [`Connection`]: one per transport session, driven by a
//! strictly ordered stream of [`Event`]s. Everything a connection owns is
//! single-writer; the only shared structures are the
//! [`ConnectionDirectory`] (identity → active connection) and the
//! [`MastershipRegistry`] seam, both internally thread-safe. Registry
//! callbacks never touch connection state directly — they post a
//! [`Event::RegistryRole`] back into the connection's own queue.
//!
//! # Concurrency
//!
//! - One logical worker per connection; events are handled one at a time.
//! - Cross-connection work is fully parallel.
//! - Closing a connection invalidates every pending expectation: events
//!   delivered afterwards are no-ops.
//!
//! # Errors
//!
//! Fatal conditions ([`ChannelError`]) close the connection exactly once and
//! are returned to the worker loop for logging. Stale role replies and
//! benign out-of-place messages are dropped, never fatal.

mod channel;
mod config;
mod directory;
mod error;
mod event;
mod registry;
mod role;

pub use channel::{Connection, Dispatcher, HandshakeState, MessageSink};
pub use config::ChannelConfig;
pub use directory::ConnectionDirectory;
pub use error::ChannelError;
pub use event::{Event, EventQueue, EventReceiver, EventSender};
pub use registry::{MastershipRegistry, StandaloneRegistry};
pub use role::{RoleExpectation, RoleNegotiator, RoleOutcome, RoleReplyInfo};
