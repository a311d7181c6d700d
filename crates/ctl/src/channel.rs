//! Per-connection handshake state machine.
//!
//! A [`Connection`] owns everything about one switch's control channel: the
//! handshake state, the negotiated version, the cached features and
//! description, the port table, the role negotiator, and the bound driver.
//! It is driven exclusively through [`Connection::handle_event`] by a single
//! worker; nothing here is shared.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::time::Instant;

use flowctl_drivers::{DriverSelector, SwitchDriver};
use flowctl_protocol::{
    DeviceDescription, Dpid, ErrorKind, GenerationIds, HandshakeXids, Message, MessageKind,
    PortDesc, PortStatusReason, ProtocolVersion, Role, SwitchFeatures, Xid,
};
use rustc_hash::FxHashMap;
use tracing::{debug, error, info, warn};

use crate::config::ChannelConfig;
use crate::directory::ConnectionDirectory;
use crate::error::ChannelError;
use crate::event::{Event, EventSender};
use crate::registry::MastershipRegistry;
use crate::role::{RoleExpectation, RoleNegotiator, RoleOutcome, RoleReplyInfo};

/// Where a connection is in its lifecycle.
///
/// The wire handshake runs `Init` through `WaitInitialRole`; the driver
/// sub-handshake follows; `Master` and `Equal` are the steady states.
/// `Equal` covers both the EQUAL and SLAVE roles, matching the two
/// activation tables in [`ConnectionDirectory`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HandshakeState {
    /// Created, transport not yet confirmed up.
    Init,
    /// Our hello is out; waiting for the peer's.
    WaitHello,
    /// Features request is out; identity not yet known.
    WaitFeaturesReply,
    /// Port enumeration in flight (1.3 only).
    WaitPortDescReply,
    /// Configuration pushed; waiting for the read-back.
    WaitConfigReply,
    /// Description request is out; no driver bound yet.
    WaitDescriptionReply,
    /// Waiting for the registry's role assignment and its acknowledgment.
    WaitInitialRole,
    /// The bound driver's sub-handshake is running.
    WaitDriverSubHandshake,
    /// Active with exclusive programming rights.
    Master,
    /// Active without exclusive rights (EQUAL or SLAVE).
    Equal,
}

impl HandshakeState {
    /// True once the wire handshake is done and only driver work or steady
    /// state remains.
    #[must_use]
    pub const fn is_handshake_complete(self) -> bool {
        matches!(
            self,
            Self::WaitDriverSubHandshake | Self::Master | Self::Equal
        )
    }

    /// True once the connection is registered in an activation table.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Master | Self::Equal)
    }
}

/// Outbound half of the transport session.
///
/// Implementations serialize and transmit; they never reorder. `close`
/// tears the session down and must be idempotent.
pub trait MessageSink {
    /// Queues one message for transmission.
    fn send(&mut self, message: Message) -> io::Result<()>;

    /// Tears the transport session down.
    fn close(&mut self);
}

/// Consumer of post-activation traffic.
///
/// Once a connection is active, data-plane notifications and replies the
/// engine does not own are handed here, tagged with the switch identity.
pub trait Dispatcher {
    /// Delivers one message from an active switch.
    fn dispatch(&mut self, dpid: Dpid, message: Message);
}

/// One switch's control channel.
///
/// Constructed per transport session and driven by [`handle_event`]
/// (`Connection::handle_event`) until [`Event::Disconnected`] or a fatal
/// error closes it. After close every further event is a no-op.
pub struct Connection<S, D> {
    state: HandshakeState,
    version: Option<ProtocolVersion>,
    dpid: Option<Dpid>,
    features: Option<SwitchFeatures>,
    description: Option<DeviceDescription>,
    ports: FxHashMap<u32, PortDesc>,
    pending_port_status: VecDeque<(PortStatusReason, PortDesc)>,
    xids: HandshakeXids,
    generations: GenerationIds,
    negotiator: RoleNegotiator,
    current_role: Role,
    target_role: Option<Role>,
    driver: Option<Box<dyn SwitchDriver>>,
    duplicate_identity: bool,
    closed: bool,
    config: ChannelConfig,
    directory: Arc<ConnectionDirectory>,
    selector: Arc<DriverSelector>,
    registry: Arc<dyn MastershipRegistry>,
    events: EventSender,
    sink: S,
    dispatcher: D,
    peer: String,
}

impl<S: MessageSink, D: Dispatcher> Connection<S, D> {
    /// Creates a connection for a freshly accepted transport session.
    ///
    /// `events` must be the sender of the queue this connection is driven
    /// from; it is what the registry and directory use to reach back in.
    /// `peer` is a transport-level label (typically the remote address) used
    /// in logs until the switch identity is known.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: ChannelConfig,
        directory: Arc<ConnectionDirectory>,
        selector: Arc<DriverSelector>,
        registry: Arc<dyn MastershipRegistry>,
        events: EventSender,
        sink: S,
        dispatcher: D,
        peer: String,
    ) -> Self {
        Self {
            state: HandshakeState::Init,
            version: None,
            dpid: None,
            features: None,
            description: None,
            ports: FxHashMap::default(),
            pending_port_status: VecDeque::new(),
            xids: HandshakeXids::new(),
            generations: GenerationIds::new(),
            negotiator: RoleNegotiator::new(config.role_timeout),
            current_role: Role::Equal,
            target_role: None,
            driver: None,
            duplicate_identity: false,
            closed: false,
            config,
            directory,
            selector,
            registry,
            events,
            sink,
            dispatcher,
            peer,
        }
    }

    /// Handles the next event in this connection's queue.
    ///
    /// Fatal errors close the connection before they are returned; the
    /// worker loop only logs them. Events delivered after close are no-ops.
    pub fn handle_event(&mut self, event: Event) -> Result<(), ChannelError> {
        if self.closed {
            debug!(peer = %self.peer, ?event, "event after close; dropped");
            return Ok(());
        }
        self.negotiator.check_timeout(Instant::now());
        let result = self.process(event);
        if let Err(error) = &result {
            error!(peer = %self.peer, %error, "closing connection");
            self.close();
        }
        result
    }

    /// The connection's current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> HandshakeState {
        self.state
    }

    /// The role this instance currently holds for the switch.
    #[must_use]
    pub const fn current_role(&self) -> Role {
        self.current_role
    }

    /// The switch identity, once the features reply has arrived.
    #[must_use]
    pub const fn dpid(&self) -> Option<Dpid> {
        self.dpid
    }

    /// The negotiated protocol version, once the hello exchange is done.
    #[must_use]
    pub const fn version(&self) -> Option<ProtocolVersion> {
        self.version
    }

    /// The cached features reply.
    #[must_use]
    pub const fn features(&self) -> Option<&SwitchFeatures> {
        self.features.as_ref()
    }

    /// The cached switch description.
    #[must_use]
    pub const fn description(&self) -> Option<&DeviceDescription> {
        self.description.as_ref()
    }

    /// The port table, keyed by port number.
    #[must_use]
    pub const fn ports(&self) -> &FxHashMap<u32, PortDesc> {
        &self.ports
    }

    /// True once the connection has been torn down.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// The outbound sink, for embedding and inspection.
    pub const fn sink(&self) -> &S {
        &self.sink
    }

    /// The post-activation dispatcher, for embedding and inspection.
    pub const fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    fn process(&mut self, event: Event) -> Result<(), ChannelError> {
        match event {
            Event::Connected => self.start_handshake(),
            Event::Message(message) => self.handle_message(message),
            Event::Idle => self.send_echo_probe(),
            Event::RegistryRole(role) => self.handle_registry_role(role),
            Event::Disconnected => {
                self.close();
                Ok(())
            }
        }
    }

    fn start_handshake(&mut self) -> Result<(), ChannelError> {
        let xid = self.xids.next();
        self.send(Message::Hello {
            xid,
            version: ProtocolVersion::V1_3.as_wire(),
            bitmap: ProtocolVersion::HELLO_BITMAP,
        })?;
        self.state = HandshakeState::WaitHello;
        debug!(peer = %self.peer, "hello sent");
        Ok(())
    }

    fn send_echo_probe(&mut self) -> Result<(), ChannelError> {
        let xid = self.xids.next();
        self.send(Message::EchoRequest {
            xid,
            data: Vec::new(),
        })
    }

    fn handle_message(&mut self, message: Message) -> Result<(), ChannelError> {
        match message {
            // Liveness is answered in every state, including mid-handshake.
            Message::EchoRequest { xid, data } => self.send(Message::EchoReply { xid, data }),
            Message::EchoReply { .. } => {
                debug!(peer = %self.peer, "echo reply");
                Ok(())
            }
            Message::RoleReply {
                xid,
                role,
                generation_id,
            } => {
                debug!(peer = %self.peer, %generation_id, "native role reply");
                let role = role.into_role()?;
                self.handle_role_reply(RoleReplyInfo { xid, role })
            }
            Message::VendorRoleReply { xid, role } => {
                let role = role.into_role();
                self.handle_role_reply(RoleReplyInfo { xid, role })
            }
            Message::Error { xid, kind } => self.handle_error(xid, kind),
            Message::Hello { version, bitmap, .. } => self.handle_hello(version, bitmap),
            Message::FeaturesReply { features, .. } => self.handle_features_reply(features),
            Message::PortStatus { xid, reason, port } => self.handle_port_status(xid, reason, port),
            other => self.handle_state_message(other),
        }
    }

    fn handle_hello(&mut self, version: u8, bitmap: u32) -> Result<(), ChannelError> {
        if self.state != HandshakeState::WaitHello {
            return Err(ChannelError::IllegalMessage {
                kind: MessageKind::Hello,
                state: self.state,
            });
        }
        let negotiated = negotiate_version(version, bitmap)?;
        self.version = Some(negotiated);
        info!(peer = %self.peer, %negotiated, "version negotiated");
        let xid = self.xids.next();
        self.send(Message::FeaturesRequest { xid })?;
        self.state = HandshakeState::WaitFeaturesReply;
        Ok(())
    }

    fn handle_features_reply(&mut self, features: SwitchFeatures) -> Result<(), ChannelError> {
        if self.state != HandshakeState::WaitFeaturesReply {
            return Err(ChannelError::IllegalMessage {
                kind: MessageKind::FeaturesReply,
                state: self.state,
            });
        }
        let dpid = features.dpid;
        if !self.directory.register(dpid, self.events.clone()) {
            // The existing connection keeps its entry; only this one dies.
            self.duplicate_identity = true;
            return Err(ChannelError::DuplicateIdentity(dpid));
        }
        self.dpid = Some(dpid);
        for port in &features.ports {
            self.ports.insert(port.number, port.clone());
        }
        info!(peer = %self.peer, %dpid, "identity learned");
        self.features = Some(features);
        let version = self.version.unwrap_or(ProtocolVersion::V1_3);
        if version.requires_port_description() {
            let xid = self.xids.next();
            self.send(Message::PortDescRequest { xid })?;
            self.state = HandshakeState::WaitPortDescReply;
        } else {
            self.send_config_requests()?;
        }
        Ok(())
    }

    fn send_config_requests(&mut self) -> Result<(), ChannelError> {
        let set = Message::SetConfig {
            xid: self.xids.next(),
            miss_send_len: self.config.miss_send_len,
        };
        let barrier = Message::BarrierRequest {
            xid: self.xids.next(),
        };
        let get = Message::GetConfigRequest {
            xid: self.xids.next(),
        };
        self.send(set)?;
        self.send(barrier)?;
        self.send(get)?;
        self.state = HandshakeState::WaitConfigReply;
        Ok(())
    }

    fn handle_port_status(
        &mut self,
        xid: Xid,
        reason: PortStatusReason,
        port: PortDesc,
    ) -> Result<(), ChannelError> {
        match self.state {
            HandshakeState::Master | HandshakeState::Equal => {
                self.apply_port_status(reason, &port);
                if let Some(dpid) = self.dpid {
                    self.dispatcher
                        .dispatch(dpid, Message::PortStatus { xid, reason, port });
                }
                Ok(())
            }
            HandshakeState::WaitConfigReply
            | HandshakeState::WaitDescriptionReply
            | HandshakeState::WaitInitialRole
            | HandshakeState::WaitDriverSubHandshake => {
                debug!(peer = %self.peer, port = port.number, "buffering port status until activation");
                self.pending_port_status.push_back((reason, port));
                Ok(())
            }
            _ => {
                // Before the port table exists there is nothing to update.
                debug!(peer = %self.peer, port = port.number, "port status before port table; dropped");
                Ok(())
            }
        }
    }

    fn apply_port_status(&mut self, reason: PortStatusReason, port: &PortDesc) {
        match reason {
            PortStatusReason::Add | PortStatusReason::Modify => {
                self.ports.insert(port.number, port.clone());
            }
            PortStatusReason::Delete => {
                self.ports.remove(&port.number);
            }
        }
    }

    fn handle_state_message(&mut self, message: Message) -> Result<(), ChannelError> {
        match self.state {
            HandshakeState::WaitPortDescReply => match message {
                Message::PortDescReply { ports, more, .. } => {
                    if more {
                        warn!(peer = %self.peer, "truncated port description; proceeding with what arrived");
                    }
                    for port in ports {
                        self.ports.insert(port.number, port);
                    }
                    self.send_config_requests()
                }
                other => self.absorb_or_reject(other),
            },
            HandshakeState::WaitConfigReply => match message {
                Message::BarrierReply { .. } => {
                    debug!(peer = %self.peer, "configuration fenced");
                    Ok(())
                }
                Message::GetConfigReply { miss_send_len, .. } => {
                    if miss_send_len != self.config.miss_send_len {
                        warn!(
                            peer = %self.peer,
                            requested = self.config.miss_send_len,
                            accepted = miss_send_len,
                            "switch did not accept the requested miss-send length"
                        );
                    }
                    let xid = self.xids.next();
                    self.send(Message::DescriptionRequest { xid })?;
                    self.state = HandshakeState::WaitDescriptionReply;
                    Ok(())
                }
                other => self.absorb_or_reject(other),
            },
            HandshakeState::WaitDescriptionReply => match message {
                Message::DescriptionReply { description, .. } => {
                    self.handle_description_reply(description)
                }
                other => self.absorb_or_reject(other),
            },
            HandshakeState::WaitInitialRole => self.absorb_or_reject(message),
            HandshakeState::WaitDriverSubHandshake => self.forward_to_driver(message),
            HandshakeState::Master | HandshakeState::Equal => self.dispatch_active(message),
            HandshakeState::Init | HandshakeState::WaitHello | HandshakeState::WaitFeaturesReply => {
                self.absorb_or_reject(message)
            }
        }
    }

    fn handle_description_reply(
        &mut self,
        description: DeviceDescription,
    ) -> Result<(), ChannelError> {
        let driver = self.selector.select(&description);
        info!(
            peer = %self.peer,
            vendor = %description.vendor,
            hardware = %description.hardware,
            driver = driver.name(),
            "driver bound"
        );
        self.driver = Some(driver);
        self.description = Some(description);
        self.state = HandshakeState::WaitInitialRole;

        // Confirm the assumed role while the registry decides; its matched
        // reply never advances the state.
        if self.role_messages_supported() {
            if let Some(version) = self.version {
                let probe = self.negotiator.send_role_request(
                    self.current_role,
                    RoleExpectation::MatchedCurrentRole,
                    version,
                    &mut self.xids,
                    &mut self.generations,
                );
                if let Some(probe) = probe {
                    self.send(probe)?;
                }
            }
        }
        if let Some(dpid) = self.dpid {
            self.registry.request_mastership(dpid, self.events.clone());
        }
        Ok(())
    }

    fn handle_registry_role(&mut self, role: Role) -> Result<(), ChannelError> {
        self.target_role = Some(role);
        if !self.state.is_handshake_complete() && self.state != HandshakeState::WaitInitialRole {
            debug!(peer = %self.peer, %role, "registry role before negotiation; recorded");
            return Ok(());
        }
        info!(peer = %self.peer, %role, "registry assigned role");
        if self.role_messages_supported() {
            if let Some(version) = self.version {
                let request = self.negotiator.send_role_request(
                    role,
                    RoleExpectation::MatchedSetRole,
                    version,
                    &mut self.xids,
                    &mut self.generations,
                );
                if let Some(request) = request {
                    return self.send(request);
                }
            }
        }
        self.adopt_role(role)
    }

    fn handle_role_reply(&mut self, info: RoleReplyInfo) -> Result<(), ChannelError> {
        let outcome = self
            .negotiator
            .deliver_role_reply(info, self.current_role)?;
        self.apply_role_outcome(outcome)
    }

    fn handle_error(&mut self, xid: Xid, kind: ErrorKind) -> Result<(), ChannelError> {
        let outcome = self.negotiator.deliver_error(xid, kind)?;
        if outcome != RoleOutcome::Unrelated {
            return self.apply_role_outcome(outcome);
        }
        match self.state {
            HandshakeState::Master | HandshakeState::Equal => {
                if kind == ErrorKind::PermissionDenied {
                    // The switch believes this instance is a slave; the
                    // registry will reconcile the disagreement.
                    warn!(peer = %self.peer, "switch denied an operation for permission reasons");
                    return Ok(());
                }
                if let Some(dpid) = self.dpid {
                    self.dispatcher.dispatch(dpid, Message::Error { xid, kind });
                }
                Ok(())
            }
            HandshakeState::WaitDriverSubHandshake => {
                self.forward_to_driver(Message::Error { xid, kind })
            }
            state => Err(ChannelError::PeerError { kind, state }),
        }
    }

    fn apply_role_outcome(&mut self, outcome: RoleOutcome) -> Result<(), ChannelError> {
        match outcome {
            RoleOutcome::MatchedCurrentRole(role) => {
                debug!(peer = %self.peer, %role, "switch confirmed current role");
                Ok(())
            }
            RoleOutcome::MatchedSetRole(role) => self.adopt_role(role),
            RoleOutcome::Query(role) => {
                debug!(peer = %self.peer, %role, "switch reports role");
                Ok(())
            }
            RoleOutcome::Stale | RoleOutcome::Unrelated => Ok(()),
            RoleOutcome::Unsupported => {
                if let Some(role) = self.target_role {
                    self.adopt_role(role)
                } else {
                    // The registry has not answered yet; its assignment will
                    // be adopted directly when it arrives.
                    Ok(())
                }
            }
        }
    }

    fn adopt_role(&mut self, role: Role) -> Result<(), ChannelError> {
        self.target_role = None;
        let previous = self.current_role;
        self.current_role = role;
        match self.state {
            HandshakeState::WaitInitialRole => {
                info!(peer = %self.peer, %role, "initial role settled");
                self.begin_driver_subhandshake()
            }
            HandshakeState::Master | HandshakeState::Equal => {
                let Some(dpid) = self.dpid else {
                    return Ok(());
                };
                let was_master = previous == Role::Master;
                let is_master = role == Role::Master;
                if was_master && !is_master {
                    self.directory.transition_to_equal(dpid);
                    self.state = HandshakeState::Equal;
                    info!(peer = %self.peer, %dpid, %role, "demoted");
                } else if !was_master && is_master {
                    self.directory.transition_to_master(dpid);
                    self.state = HandshakeState::Master;
                    info!(peer = %self.peer, %dpid, "promoted to MASTER");
                }
                Ok(())
            }
            // Mid-sub-handshake reassignment takes effect at activation.
            _ => Ok(()),
        }
    }

    fn begin_driver_subhandshake(&mut self) -> Result<(), ChannelError> {
        let Some(driver) = self.driver.as_mut() else {
            return Ok(());
        };
        let messages = driver.start(&mut self.xids);
        let complete = driver.is_complete();
        for message in messages {
            self.send(message)?;
        }
        if complete {
            self.activate()
        } else {
            self.state = HandshakeState::WaitDriverSubHandshake;
            Ok(())
        }
    }

    fn forward_to_driver(&mut self, message: Message) -> Result<(), ChannelError> {
        let Some(driver) = self.driver.as_mut() else {
            return Ok(());
        };
        let messages = driver.handle(message, &mut self.xids)?;
        let complete = driver.is_complete();
        for message in messages {
            self.send(message)?;
        }
        if complete {
            self.activate()
        } else {
            Ok(())
        }
    }

    fn activate(&mut self) -> Result<(), ChannelError> {
        let Some(dpid) = self.dpid else {
            return Ok(());
        };
        // Port changes that raced the tail of the handshake are applied to
        // the table without being dispatched; the owner reads the table.
        while let Some((reason, port)) = self.pending_port_status.pop_front() {
            self.apply_port_status(reason, &port);
        }
        let activated = match self.current_role {
            Role::Master => self.directory.activate_master(dpid, &self.events),
            Role::Equal | Role::Slave => self.directory.activate_equal(dpid, &self.events),
        };
        if !activated {
            error!(peer = %self.peer, %dpid, "activation refused; closing");
            self.close();
            return Ok(());
        }
        self.state = if self.current_role == Role::Master {
            HandshakeState::Master
        } else {
            HandshakeState::Equal
        };
        info!(
            peer = %self.peer,
            %dpid,
            role = %self.current_role,
            ports = self.ports.len(),
            "handshake complete; switch active"
        );
        Ok(())
    }

    fn dispatch_active(&mut self, message: Message) -> Result<(), ChannelError> {
        let Some(dpid) = self.dpid else {
            return Ok(());
        };
        if matches!(message, Message::PacketIn { .. }) && self.current_role == Role::Slave {
            warn!(peer = %self.peer, %dpid, "packet-in while SLAVE; dropped");
            return Ok(());
        }
        self.dispatcher.dispatch(dpid, message);
        Ok(())
    }

    /// Absorbs asynchronous traffic the handshake cannot use yet; anything
    /// else out of place is a protocol violation.
    fn absorb_or_reject(&mut self, message: Message) -> Result<(), ChannelError> {
        match message {
            Message::PacketIn { .. }
            | Message::FlowRemoved { .. }
            | Message::StatsReply { .. }
            | Message::Experimenter { .. } => {
                debug!(
                    peer = %self.peer,
                    kind = %message.kind(),
                    state = ?self.state,
                    "asynchronous message during handshake; dropped"
                );
                Ok(())
            }
            other => Err(ChannelError::IllegalMessage {
                kind: other.kind(),
                state: self.state,
            }),
        }
    }

    fn role_messages_supported(&self) -> bool {
        if self.negotiator.is_unsupported() {
            return false;
        }
        match self.version {
            Some(version) if version.uses_vendor_role_messages() => self
                .driver
                .as_ref()
                .is_some_and(|driver| driver.supports_role_messages()),
            Some(_) => true,
            None => false,
        }
    }

    fn send(&mut self, message: Message) -> Result<(), ChannelError> {
        self.sink.send(message).map_err(ChannelError::from)
    }

    /// Tears the connection down exactly once.
    ///
    /// A connection that lost the duplicate-identity race never touches the
    /// directory or the registry on its way out; that state belongs to the
    /// surviving connection.
    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.sink.close();
        if self.duplicate_identity {
            return;
        }
        if let Some(dpid) = self.dpid {
            self.directory.remove(dpid);
            self.registry.release(dpid);
        }
    }
}

/// Picks the highest mutually supported version from the peer's hello.
///
/// A nonzero bitmap is authoritative; without one the peer's version byte is
/// negotiated down (a peer advertising something newer than 1.3 still speaks
/// 1.3 by the protocol's own rules).
fn negotiate_version(version: u8, bitmap: u32) -> Result<ProtocolVersion, ChannelError> {
    if bitmap != 0 {
        let common = bitmap & ProtocolVersion::HELLO_BITMAP;
        for candidate in ProtocolVersion::SUPPORTED {
            if common & (1 << u32::from(candidate.as_wire())) != 0 {
                return Ok(candidate);
            }
        }
        return Err(ChannelError::UnsupportedVersion(version));
    }
    if version >= ProtocolVersion::V1_3.as_wire() {
        return Ok(ProtocolVersion::V1_3);
    }
    ProtocolVersion::from_wire(version).ok_or(ChannelError::UnsupportedVersion(version))
}
