use super::HandshakeState;
use thiserror::Error;

/// Errors that can occur while driving the RTMP handshake
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// The peer's version byte (C0 or S0) did not match the plain RTMP protocol version
    #[error("Peer requested RTMP version {version} but only version 3 is supported")]
    BadVersionId { version: u8 },

    /// Bytes arrived while the handshake was in a state that has no step for them
    #[error("Received handshake data while in the {state:?} state")]
    UnexpectedData { state: HandshakeState },

    /// The outbound C0/C1 was requested after the handshake had already started
    #[error("The handshake was already started (current state {state:?})")]
    AlreadyStarted { state: HandshakeState },
}
