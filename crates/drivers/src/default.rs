use flowctl_protocol::{HandshakeXids, Message, MessageKind};
use tracing::debug;

use crate::{DriverError, SwitchDriver};

/// The driver bound to switches nothing else matched.
///
/// Sends nothing, completes immediately, and reports no role-message support,
/// so the engine relies purely on registry callbacks for such switches.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultDriver;

impl DefaultDriver {
    /// Creates the default driver.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl SwitchDriver for DefaultDriver {
    fn start(&mut self, _xids: &mut HandshakeXids) -> Vec<Message> {
        Vec::new()
    }

    fn handle(
        &mut self,
        _message: Message,
        _xids: &mut HandshakeXids,
    ) -> Result<Vec<Message>, DriverError> {
        // Complete from birth, so any handoff is a violation.
        Err(DriverError::HandshakeAlreadyComplete)
    }

    fn is_complete(&self) -> bool {
        true
    }

    fn supports_role_messages(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "default"
    }
}

/// A driver with a bounded one-round sub-handshake.
///
/// On start it emits a barrier probe to fence any model-specific setup the
/// switch may still be applying; the matching barrier reply completes the
/// sub-handshake. Messages other than the probe reply are absorbed without
/// affecting completion.
#[derive(Debug)]
pub struct TableMissDriver {
    probe_sent: bool,
    complete: bool,
    supports_role_messages: bool,
}

impl TableMissDriver {
    /// Creates the driver; `supports_role_messages` reflects whether the
    /// modeled switch understands role requests.
    #[must_use]
    pub const fn new(supports_role_messages: bool) -> Self {
        Self {
            probe_sent: false,
            complete: false,
            supports_role_messages,
        }
    }
}

impl SwitchDriver for TableMissDriver {
    fn start(&mut self, xids: &mut HandshakeXids) -> Vec<Message> {
        self.probe_sent = true;
        vec![Message::BarrierRequest { xid: xids.next() }]
    }

    fn handle(
        &mut self,
        message: Message,
        _xids: &mut HandshakeXids,
    ) -> Result<Vec<Message>, DriverError> {
        if self.complete {
            return Err(DriverError::HandshakeAlreadyComplete);
        }
        match message.kind() {
            MessageKind::BarrierReply if self.probe_sent => {
                self.complete = true;
                Ok(Vec::new())
            }
            kind => {
                debug!(%kind, "table-miss driver absorbing message during sub-handshake");
                Ok(Vec::new())
            }
        }
    }

    fn is_complete(&self) -> bool {
        self.complete
    }

    fn supports_role_messages(&self) -> bool {
        self.supports_role_messages
    }

    fn name(&self) -> &'static str {
        "table-miss"
    }
}
