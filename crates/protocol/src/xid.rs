use core::fmt;

/// A protocol transaction id.
///
/// Replies echo the transaction id of the request they answer; the engine
/// matches role replies (and only role replies) against the id it recorded
/// when the request went out.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Xid(pub u32);

impl fmt::Display for Xid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Connection-local allocator for controller-originated transaction ids.
///
/// Handshake messages count *down* from `u32::MAX` so they can never collide
/// with the ids a switch or an upper layer counts up from. Only one worker
/// ever touches a connection, so no atomics are involved.
#[derive(Debug)]
pub struct HandshakeXids {
    next: u32,
}

impl Default for HandshakeXids {
    fn default() -> Self {
        Self::new()
    }
}

impl HandshakeXids {
    /// Creates an allocator whose first id is `u32::MAX`.
    #[must_use]
    pub const fn new() -> Self {
        Self { next: u32::MAX }
    }

    /// Returns the next transaction id, strictly smaller than all earlier
    /// ones (wrapping only after 2^32 handshake messages, which no handshake
    /// approaches).
    pub fn next(&mut self) -> Xid {
        let id = Xid(self.next);
        self.next = self.next.wrapping_sub(1);
        id
    }
}
