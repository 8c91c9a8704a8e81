//! Bridge lifecycle states.

use std::fmt;

/// Lifecycle of a `Bridge`.
///
/// ```text
/// Uninitialized ──initialize──▶ Ready ──execute──▶ InFlight ──▶ Ready
///                                 │
///                                 └──cleanup──▶ Closed (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum BridgeState {
    #[default]
    Uninitialized = 0,
    Ready = 1,
    InFlight = 2,
    Closed = 3,
}

impl BridgeState {
    /// Returns the compact representation used for atomic storage.
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Decodes a value produced by [`BridgeState::as_u8`].
    ///
    /// Unknown values map to `Closed` so a corrupted state never reads as usable.
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Uninitialized,
            1 => Self::Ready,
            2 => Self::InFlight,
            _ => Self::Closed,
        }
    }

    /// Returns true if the bridge can accept or is serving requests.
    #[must_use]
    pub fn is_usable(self) -> bool {
        matches!(self, Self::Ready | Self::InFlight)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Ready => "ready",
            Self::InFlight => "in-flight",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for BridgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_u8_roundtrip() {
        for state in [
            BridgeState::Uninitialized,
            BridgeState::Ready,
            BridgeState::InFlight,
            BridgeState::Closed,
        ] {
            assert_eq!(BridgeState::from_u8(state.as_u8()), state);
        }
    }

    #[test]
    fn test_unknown_value_is_closed() {
        assert_eq!(BridgeState::from_u8(200), BridgeState::Closed);
    }

    #[test]
    fn test_usable_states() {
        assert!(BridgeState::Ready.is_usable());
        assert!(BridgeState::InFlight.is_usable());
        assert!(!BridgeState::Uninitialized.is_usable());
        assert!(!BridgeState::Closed.is_usable());
    }
}
