use std::time::Duration;

/// Tunables for one control channel.
///
/// The defaults mirror the constants the handshake has always shipped with;
/// embedding controllers override them per deployment.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChannelConfig {
    /// How long a role request may stay unanswered before it is dropped.
    ///
    /// Checked opportunistically when the next event for the connection
    /// arrives, not by a timer; a connection that goes completely silent
    /// keeps its pending request until traffic resumes.
    pub role_timeout: Duration,
    /// Miss-send length pushed in the set-config step; `0xffff` asks the
    /// switch to send full packets. A config reply that reads back a
    /// different value is logged and tolerated.
    pub miss_send_len: u16,
    /// Idle window after which the transport is expected to post
    /// [`Event::Idle`](crate::Event::Idle), triggering an echo probe.
    pub idle_probe_interval: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            role_timeout: Duration::from_secs(2),
            miss_send_len: 0xffff,
            idle_probe_interval: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_protocol_constants() {
        let config = ChannelConfig::default();
        assert_eq!(config.role_timeout, Duration::from_secs(2));
        assert_eq!(config.miss_send_len, 0xffff);
    }
}
