//! Per-connection stream state machine.
//!
//! `Idle -> HandshakePending -> Streaming <-> Paused -> Closed`
//!
//! `Paused` releases the capture source but keeps the session key and
//! socket alive. `Closed` is terminal.

use serde::{Deserialize, Serialize};

use crate::{ProtocolError, ProtocolResult};

/// Stream state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamState {
    /// Initial state, no handshake started
    Idle,
    /// Waiting for the key-exchange datagram
    HandshakePending,
    /// Frames are flowing
    Streaming,
    /// Capture released, session key and socket retained
    Paused,
    /// Terminal, all resources released
    Closed,
}

impl StreamState {
    /// Whether a transition to `to` is legal.
    pub fn can_transition(self, to: StreamState) -> bool {
        use StreamState::*;
        matches!(
            (self, to),
            (Idle, HandshakePending)
                | (HandshakePending, Streaming)
                | (Streaming, Paused)
                | (Paused, Streaming)
                | (Idle, Closed)
                | (HandshakePending, Closed)
                | (Streaming, Closed)
                | (Paused, Closed)
        )
    }

    /// Apply a transition, rejecting illegal ones.
    pub fn transition(&mut self, to: StreamState) -> ProtocolResult<()> {
        if !self.can_transition(to) {
            return Err(ProtocolError::InvalidStateTransition { from: *self, to });
        }
        *self = to;
        Ok(())
    }

    /// Quality and parameter changes are only allowed while the session
    /// key exists and the connection is not torn down.
    pub fn allows_reconfigure(self) -> bool {
        matches!(self, StreamState::Streaming | StreamState::Paused)
    }
}
