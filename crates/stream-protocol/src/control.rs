//! Control messages, receiver -> sender.
//!
//! Commands travel over the same UDP socket as the stream, sealed with the
//! session cipher so an on-path observer cannot pause or reconfigure the
//! stream. The sender's control loop consumes them between frames.

use serde::{Deserialize, Serialize};

/// Command consumed by the sender pipeline's control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlCommand {
    /// Release the capture source but keep the session alive
    Pause,
    /// Re-acquire the capture source and continue streaming
    Resume,
    /// Adjust compression quality (1-100)
    SetQuality { value: u8 },
    /// End the session gracefully
    Terminate,
}

impl ControlCommand {
    /// Serialize to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize from bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_round_trip() {
        for cmd in [
            ControlCommand::Pause,
            ControlCommand::Resume,
            ControlCommand::SetQuality { value: 85 },
            ControlCommand::Terminate,
        ] {
            let bytes = cmd.to_bytes().unwrap();
            assert_eq!(ControlCommand::from_bytes(&bytes).unwrap(), cmd);
        }
    }

    #[test]
    fn garbage_is_not_a_command() {
        assert!(ControlCommand::from_bytes(&[0xFF; 3]).is_err());
    }
}
