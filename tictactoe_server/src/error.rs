// Error types for the lobby server.
//
// Two families, handled very differently:
// - `ConnectionLost` is terminal for one session. Protocol violations,
//   transport failures, and client-side quits all land here; the connection
//   handler catches it once at the top, removes the session from the roster,
//   and never retries.
// - `JoinError` and `RegisterError` are terminal for a single request only.
//   They are reported back to the client as a `ResponseCode` and the session
//   stays connected.

use std::time::Duration;

use thiserror::Error;

use tictactoe_protocol::{CodecError, PlayerId, ResponseCode};

/// Why a session's connection is being torn down.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ConnectionLost {
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
    #[error("transport lost: {0}")]
    TransportLost(String),
    #[error("client quit: {0}")]
    ClientQuit(String),
    #[error("no opponent joined within {0:?}")]
    WaitExpired(Duration),
}

impl From<CodecError> for ConnectionLost {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Io(e) => ConnectionLost::TransportLost(e.to_string()),
            CodecError::ConnectionTerminated(reason) => ConnectionLost::ClientQuit(reason),
            other => ConnectionLost::ProtocolViolation(other.to_string()),
        }
    }
}

/// A join request that could not be honored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum JoinError {
    #[error("game is already full")]
    GameFull,
    #[error("no game with that id")]
    GameNotFound,
}

impl JoinError {
    pub fn response_code(self) -> ResponseCode {
        match self {
            JoinError::GameFull => ResponseCode::GameFull,
            JoinError::GameNotFound => ResponseCode::GameNotFound,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum RegisterError {
    #[error("display name must not be empty")]
    InvalidName,
}

impl RegisterError {
    pub fn response_code(self) -> ResponseCode {
        match self {
            RegisterError::InvalidName => ResponseCode::InvalidName,
        }
    }
}

/// Match setup failed because one side dropped during the handshake.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("pairing aborted, player {player} lost: {cause}")]
pub struct PairingFailed {
    pub player: PlayerId,
    pub cause: ConnectionLost,
}
