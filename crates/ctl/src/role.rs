use std::time::{Duration, Instant};

use flowctl_protocol::{
    ErrorKind, GenerationIds, HandshakeXids, Message, NativeRole, ProtocolVersion, Role,
    VendorRole, Xid,
};
use tracing::{debug, info, warn};

use crate::error::ChannelError;

/// What the caller intends a role request to establish.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RoleExpectation {
    /// Confirm the role this instance believes it already holds; used for
    /// the initial request after the handshake.
    MatchedCurrentRole,
    /// Change the switch-side role to a newly assigned one.
    MatchedSetRole,
    /// Ask which role the switch currently has recorded, without changing it.
    Query,
}

/// The one role reply a connection may be waiting for.
#[derive(Debug)]
struct PendingRoleRequest {
    xid: Xid,
    role: Role,
    expectation: RoleExpectation,
    version: ProtocolVersion,
    submitted_at: Instant,
}

/// A role reply decoded back to the controller's role vocabulary.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RoleReplyInfo {
    /// Transaction id of the request the switch is answering.
    pub xid: Xid,
    /// The role the switch granted or reported.
    pub role: Role,
}

/// How an inbound role reply or error relates to the pending request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RoleOutcome {
    /// The reply confirmed the role the connection already holds.
    MatchedCurrentRole(Role),
    /// The reply acknowledged a role change; the connection now holds it.
    MatchedSetRole(Role),
    /// The reply answered a query; carries the switch's recorded role.
    Query(Role),
    /// The reply answered a request that has already been superseded or
    /// timed out. Dropped.
    Stale,
    /// The message had nothing to do with role negotiation. Dropped.
    Unrelated,
    /// The switch answered the role request with bad-request: it cannot do
    /// role messaging at all. The connection degrades to assumed roles.
    Unsupported,
}

/// Builds role requests and correlates replies against the single pending
/// request slot.
///
/// At most one role request is outstanding per connection; sending a new one
/// overwrites the slot and makes the reply to the superseded request stale.
/// Timeout is checked opportunistically from [`RoleNegotiator::check_timeout`]
/// when the next event arrives.
#[derive(Debug)]
pub struct RoleNegotiator {
    pending: Option<PendingRoleRequest>,
    timeout: Duration,
    unsupported: bool,
}

impl RoleNegotiator {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            pending: None,
            timeout,
            unsupported: false,
        }
    }

    /// True while a role reply is expected.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// True once the switch has demonstrated it cannot do role messaging.
    #[must_use]
    pub const fn is_unsupported(&self) -> bool {
        self.unsupported
    }

    /// Builds the next role request and arms the pending slot.
    ///
    /// Returns `None` without arming anything when the switch has already
    /// proven it does not support role messages; the caller then proceeds on
    /// assumed roles. On the vendor dialect an EQUAL intent is folded into
    /// SLAVE before it reaches the wire.
    pub fn send_role_request(
        &mut self,
        role: Role,
        expectation: RoleExpectation,
        version: ProtocolVersion,
        xids: &mut HandshakeXids,
        generations: &mut GenerationIds,
    ) -> Option<Message> {
        if self.unsupported {
            debug!(%role, "switch does not support role messages; skipping request");
            return None;
        }
        let xid = xids.next();
        let message = if version.uses_vendor_role_messages() {
            let wire_role = match expectation {
                RoleExpectation::Query => VendorRole::Other,
                RoleExpectation::MatchedCurrentRole | RoleExpectation::MatchedSetRole => {
                    VendorRole::from_role(role)
                }
            };
            Message::VendorRoleRequest {
                xid,
                role: wire_role,
            }
        } else {
            let wire_role = match expectation {
                RoleExpectation::Query => NativeRole::NoChange,
                RoleExpectation::MatchedCurrentRole | RoleExpectation::MatchedSetRole => {
                    NativeRole::from_role(role)
                }
            };
            Message::RoleRequest {
                xid,
                role: wire_role,
                generation_id: generations.next(),
            }
        };
        if let Some(old) = self.pending.take() {
            debug!(
                superseded = %old.role,
                by = %role,
                "new role request supersedes the pending one"
            );
        }
        self.pending = Some(PendingRoleRequest {
            xid,
            role,
            expectation,
            version,
            submitted_at: Instant::now(),
        });
        info!(%role, %xid, ?expectation, "sending role request");
        Some(message)
    }

    /// Correlates a decoded role reply against the pending slot.
    ///
    /// A matched reply clears the slot. A reply whose transaction id is not
    /// the pending one is stale and dropped; one whose id matches but whose
    /// role does not carry the requested one is ignored and leaves the slot
    /// armed (unless the request was a query, which reports any role). A
    /// reply with no request pending is tolerated only if it agrees with
    /// `settled`; otherwise the switch and controller disagree about who is
    /// in charge and the connection must go down.
    pub fn deliver_role_reply(
        &mut self,
        info: RoleReplyInfo,
        settled: Role,
    ) -> Result<RoleOutcome, ChannelError> {
        let Some(pending) = self.pending.as_ref() else {
            if info.role == settled {
                debug!(role = %info.role, "unsolicited role reply agrees with settled role");
                return Ok(RoleOutcome::Unrelated);
            }
            return Err(ChannelError::UnexpectedRoleReply {
                reply: info.role,
                expected: settled,
            });
        };
        if info.xid != pending.xid {
            debug!(
                reply_xid = %info.xid,
                pending_xid = %pending.xid,
                "stale role reply"
            );
            return Ok(RoleOutcome::Stale);
        }
        match pending.expectation {
            RoleExpectation::Query => {
                self.pending = None;
                Ok(RoleOutcome::Query(info.role))
            }
            RoleExpectation::MatchedCurrentRole | RoleExpectation::MatchedSetRole => {
                if !roles_equivalent(pending.version, pending.role, info.role) {
                    debug!(
                        requested = %pending.role,
                        granted = %info.role,
                        "role reply does not carry the requested role; ignored"
                    );
                    return Ok(RoleOutcome::Unrelated);
                }
                // Settle on the requested role so EQUAL survives the vendor
                // dialect's SLAVE fold.
                let expectation = pending.expectation;
                let role = pending.role;
                self.pending = None;
                Ok(match expectation {
                    RoleExpectation::MatchedCurrentRole => RoleOutcome::MatchedCurrentRole(role),
                    _ => RoleOutcome::MatchedSetRole(role),
                })
            }
        }
    }

    /// Correlates a switch error against the pending slot.
    ///
    /// Bad-request answering a role request means the switch cannot do role
    /// messaging; the slot is cleared and the connection degrades. An
    /// explicit role rejection is fatal. Errors that do not answer the
    /// pending request pass through as unrelated.
    pub fn deliver_error(&mut self, xid: Xid, kind: ErrorKind) -> Result<RoleOutcome, ChannelError> {
        let Some(pending) = self.pending.as_ref() else {
            return Ok(RoleOutcome::Unrelated);
        };
        if xid != pending.xid {
            return Ok(RoleOutcome::Unrelated);
        }
        match kind {
            ErrorKind::BadRequest => {
                let pending = self.pending.take();
                self.unsupported = true;
                if let Some(pending) = pending {
                    warn!(
                        role = %pending.role,
                        "switch rejected role request as bad-request; assuming no role support"
                    );
                }
                Ok(RoleOutcome::Unsupported)
            }
            ErrorKind::RoleRequestFailed(code) => {
                let role = pending.role;
                self.pending = None;
                Err(ChannelError::RoleRefused { code, role })
            }
            ErrorKind::PermissionDenied | ErrorKind::Other { .. } => {
                let pending = self.pending.take();
                if let Some(pending) = pending {
                    warn!(
                        role = %pending.role,
                        ?kind,
                        "switch answered role request with an unclassified error; dropping request"
                    );
                }
                Ok(RoleOutcome::Unrelated)
            }
        }
    }

    /// Drops the pending request if it has outlived the timeout.
    ///
    /// Returns true when a request was dropped. Called opportunistically on
    /// event arrival, so a completely silent connection keeps its pending
    /// request until traffic resumes.
    pub fn check_timeout(&mut self, now: Instant) -> bool {
        let expired = self
            .pending
            .as_ref()
            .is_some_and(|p| now.duration_since(p.submitted_at) > self.timeout);
        if expired {
            if let Some(pending) = self.pending.take() {
                warn!(
                    role = %pending.role,
                    xid = %pending.xid,
                    "role request timed out; any late reply will be stale"
                );
            }
        }
        expired
    }
}

/// Whether a granted role satisfies a requested one under the version's wire
/// encoding. On the vendor dialect EQUAL and SLAVE share an encoding, so a
/// SLAVE grant satisfies an EQUAL request.
fn roles_equivalent(version: ProtocolVersion, requested: Role, granted: Role) -> bool {
    if version.uses_vendor_role_messages() {
        VendorRole::from_role(requested) == VendorRole::from_role(granted)
    } else {
        requested == granted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowctl_protocol::RoleErrorCode;

    fn negotiator() -> (RoleNegotiator, HandshakeXids, GenerationIds) {
        (
            RoleNegotiator::new(Duration::from_secs(2)),
            HandshakeXids::new(),
            GenerationIds::new(),
        )
    }

    fn sent_xid(message: &Message) -> Xid {
        message.xid()
    }

    #[test]
    fn matched_set_reply_clears_the_slot() {
        let (mut neg, mut xids, mut gens) = negotiator();
        let request = neg
            .send_role_request(
                Role::Master,
                RoleExpectation::MatchedSetRole,
                ProtocolVersion::V1_3,
                &mut xids,
                &mut gens,
            )
            .expect("request built");
        assert!(neg.has_pending());

        let outcome = neg
            .deliver_role_reply(
                RoleReplyInfo {
                    xid: sent_xid(&request),
                    role: Role::Master,
                },
                Role::Equal,
            )
            .expect("reply accepted");
        assert_eq!(outcome, RoleOutcome::MatchedSetRole(Role::Master));
        assert!(!neg.has_pending());
    }

    #[test]
    fn reply_with_a_superseded_xid_is_stale() {
        let (mut neg, mut xids, mut gens) = negotiator();
        let first = neg
            .send_role_request(
                Role::Equal,
                RoleExpectation::MatchedCurrentRole,
                ProtocolVersion::V1_3,
                &mut xids,
                &mut gens,
            )
            .expect("first request");
        let _second = neg
            .send_role_request(
                Role::Master,
                RoleExpectation::MatchedSetRole,
                ProtocolVersion::V1_3,
                &mut xids,
                &mut gens,
            )
            .expect("second request");

        let outcome = neg
            .deliver_role_reply(
                RoleReplyInfo {
                    xid: sent_xid(&first),
                    role: Role::Equal,
                },
                Role::Equal,
            )
            .expect("stale replies are not fatal");
        assert_eq!(outcome, RoleOutcome::Stale);
        assert!(neg.has_pending());
    }

    #[test]
    fn vendor_dialect_folds_equal_and_accepts_a_slave_grant() {
        let (mut neg, mut xids, mut gens) = negotiator();
        let request = neg
            .send_role_request(
                Role::Equal,
                RoleExpectation::MatchedCurrentRole,
                ProtocolVersion::V1_0,
                &mut xids,
                &mut gens,
            )
            .expect("request built");
        assert!(matches!(
            request,
            Message::VendorRoleRequest {
                role: VendorRole::Slave,
                ..
            }
        ));

        let outcome = neg
            .deliver_role_reply(
                RoleReplyInfo {
                    xid: sent_xid(&request),
                    role: Role::Slave,
                },
                Role::Equal,
            )
            .expect("slave grant satisfies a folded equal");
        assert_eq!(outcome, RoleOutcome::MatchedCurrentRole(Role::Equal));
    }

    #[test]
    fn mismatched_reply_role_is_ignored_and_keeps_the_slot() {
        let (mut neg, mut xids, mut gens) = negotiator();
        let request = neg
            .send_role_request(
                Role::Master,
                RoleExpectation::MatchedSetRole,
                ProtocolVersion::V1_3,
                &mut xids,
                &mut gens,
            )
            .expect("request built");

        let outcome = neg
            .deliver_role_reply(
                RoleReplyInfo {
                    xid: sent_xid(&request),
                    role: Role::Slave,
                },
                Role::Equal,
            )
            .expect("mismatch is ignored, not fatal");
        assert_eq!(outcome, RoleOutcome::Unrelated);
        assert!(neg.has_pending());

        let outcome = neg
            .deliver_role_reply(
                RoleReplyInfo {
                    xid: sent_xid(&request),
                    role: Role::Master,
                },
                Role::Equal,
            )
            .expect("the real grant still matches");
        assert_eq!(outcome, RoleOutcome::MatchedSetRole(Role::Master));
    }

    #[test]
    fn unsolicited_contradicting_reply_is_fatal() {
        let (mut neg, _xids, _gens) = negotiator();
        let err = neg
            .deliver_role_reply(
                RoleReplyInfo {
                    xid: Xid(1),
                    role: Role::Slave,
                },
                Role::Master,
            )
            .expect_err("contradiction must be fatal");
        assert!(matches!(
            err,
            ChannelError::UnexpectedRoleReply {
                reply: Role::Slave,
                expected: Role::Master,
            }
        ));
    }

    #[test]
    fn unsolicited_agreeing_reply_is_dropped() {
        let (mut neg, _xids, _gens) = negotiator();
        let outcome = neg
            .deliver_role_reply(
                RoleReplyInfo {
                    xid: Xid(1),
                    role: Role::Master,
                },
                Role::Master,
            )
            .expect("agreement is benign");
        assert_eq!(outcome, RoleOutcome::Unrelated);
    }

    #[test]
    fn bad_request_marks_the_switch_unsupported() {
        let (mut neg, mut xids, mut gens) = negotiator();
        let request = neg
            .send_role_request(
                Role::Master,
                RoleExpectation::MatchedCurrentRole,
                ProtocolVersion::V1_0,
                &mut xids,
                &mut gens,
            )
            .expect("request built");

        let outcome = neg
            .deliver_error(sent_xid(&request), ErrorKind::BadRequest)
            .expect("bad-request degrades, not fails");
        assert_eq!(outcome, RoleOutcome::Unsupported);
        assert!(neg.is_unsupported());

        // Further requests are skipped entirely.
        assert!(
            neg.send_role_request(
                Role::Master,
                RoleExpectation::MatchedSetRole,
                ProtocolVersion::V1_0,
                &mut xids,
                &mut gens,
            )
            .is_none()
        );
    }

    #[test]
    fn explicit_role_rejection_is_fatal() {
        let (mut neg, mut xids, mut gens) = negotiator();
        let request = neg
            .send_role_request(
                Role::Master,
                RoleExpectation::MatchedSetRole,
                ProtocolVersion::V1_3,
                &mut xids,
                &mut gens,
            )
            .expect("request built");

        let err = neg
            .deliver_error(
                sent_xid(&request),
                ErrorKind::RoleRequestFailed(RoleErrorCode::Stale),
            )
            .expect_err("rejection is fatal");
        assert!(matches!(
            err,
            ChannelError::RoleRefused {
                code: RoleErrorCode::Stale,
                role: Role::Master,
            }
        ));
    }

    #[test]
    fn errors_for_other_xids_pass_through() {
        let (mut neg, mut xids, mut gens) = negotiator();
        let _request = neg.send_role_request(
            Role::Master,
            RoleExpectation::MatchedSetRole,
            ProtocolVersion::V1_3,
            &mut xids,
            &mut gens,
        );

        let outcome = neg
            .deliver_error(Xid(42), ErrorKind::BadRequest)
            .expect("unrelated errors are not role outcomes");
        assert_eq!(outcome, RoleOutcome::Unrelated);
        assert!(neg.has_pending());
    }

    // Expiry only ever happens inside check_timeout; a connection that goes
    // silent keeps its pending request, and a late reply still matches.
    #[test]
    fn pending_request_survives_until_the_next_timeout_check() {
        let mut neg = RoleNegotiator::new(Duration::from_millis(0));
        let mut xids = HandshakeXids::new();
        let mut gens = GenerationIds::new();
        let request = neg
            .send_role_request(
                Role::Master,
                RoleExpectation::MatchedSetRole,
                ProtocolVersion::V1_3,
                &mut xids,
                &mut gens,
            )
            .expect("request built");

        let outcome = neg
            .deliver_role_reply(
                RoleReplyInfo {
                    xid: sent_xid(&request),
                    role: Role::Master,
                },
                Role::Equal,
            )
            .expect("reply still matches");
        assert_eq!(outcome, RoleOutcome::MatchedSetRole(Role::Master));
    }

    #[test]
    fn pending_request_expires_after_the_timeout() {
        let mut neg = RoleNegotiator::new(Duration::from_millis(0));
        let mut xids = HandshakeXids::new();
        let mut gens = GenerationIds::new();
        let _request = neg.send_role_request(
            Role::Master,
            RoleExpectation::MatchedCurrentRole,
            ProtocolVersion::V1_3,
            &mut xids,
            &mut gens,
        );

        let later = Instant::now() + Duration::from_millis(10);
        assert!(neg.check_timeout(later));
        assert!(!neg.has_pending());
        assert!(!neg.check_timeout(later));
    }
}
