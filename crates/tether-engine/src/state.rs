//! Endpoint state bits
//!
//! AMQP endpoints (connection, session, link) carry independent local and
//! remote lifecycle states. The engine reports them as a small bit set;
//! the adapter only ever tests individual bits.

use serde::{Deserialize, Serialize};

/// Combined local/remote state of an engine endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EndpointState(u8);

impl EndpointState {
    /// Local end has not been opened yet.
    pub const LOCAL_UNINIT: EndpointState = EndpointState(1);
    /// Local end is open.
    pub const LOCAL_ACTIVE: EndpointState = EndpointState(1 << 1);
    /// Local end has been closed.
    pub const LOCAL_CLOSED: EndpointState = EndpointState(1 << 2);
    /// Remote end has not been opened yet.
    pub const REMOTE_UNINIT: EndpointState = EndpointState(1 << 3);
    /// Remote end is open.
    pub const REMOTE_ACTIVE: EndpointState = EndpointState(1 << 4);
    /// Remote end has been closed.
    pub const REMOTE_CLOSED: EndpointState = EndpointState(1 << 5);

    /// Build a state from raw bits.
    pub const fn from_bits(bits: u8) -> Self {
        EndpointState(bits)
    }

    /// Raw bit representation.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Union of two states.
    pub const fn union(self, other: EndpointState) -> Self {
        EndpointState(self.0 | other.0)
    }

    /// True if every bit of `other` is set in `self`.
    pub const fn contains(self, other: EndpointState) -> bool {
        self.0 & other.0 == other.0
    }

    /// Local end not yet opened.
    pub const fn is_local_uninit(self) -> bool {
        self.contains(Self::LOCAL_UNINIT)
    }

    /// Local end open.
    pub const fn is_local_active(self) -> bool {
        self.contains(Self::LOCAL_ACTIVE)
    }

    /// Local end closed.
    pub const fn is_local_closed(self) -> bool {
        self.contains(Self::LOCAL_CLOSED)
    }

    /// Remote end closed.
    pub const fn is_remote_closed(self) -> bool {
        self.contains(Self::REMOTE_CLOSED)
    }

    /// Both ends closed; the endpoint can be reclaimed.
    pub const fn is_fully_closed(self) -> bool {
        self.is_local_closed() && self.is_remote_closed()
    }
}

impl std::ops::BitOr for EndpointState {
    type Output = EndpointState;

    fn bitor(self, rhs: EndpointState) -> EndpointState {
        self.union(rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_predicates() {
        let s = EndpointState::LOCAL_ACTIVE | EndpointState::REMOTE_UNINIT;
        assert!(s.is_local_active());
        assert!(!s.is_local_uninit());
        assert!(!s.is_remote_closed());
        assert!(!s.is_fully_closed());
    }

    #[test]
    fn fully_closed_requires_both_ends() {
        let local_only = EndpointState::LOCAL_CLOSED;
        assert!(!local_only.is_fully_closed());
        let both = EndpointState::LOCAL_CLOSED | EndpointState::REMOTE_CLOSED;
        assert!(both.is_fully_closed());
    }
}
