//! SDK error types

use semver::Version;
use thiserror::Error;

/// Errors surfaced to callers of the public SDK operations.
///
/// Transport failures (connection refused, broken pipe, end-of-stream) are
/// never represented here: they are recovered internally by the connection
/// supervisor. Malformed inbound frames are dropped, and errors raised by
/// user callbacks are converted into outbound error signals.
#[derive(Error, Debug)]
pub enum SdkError {
    /// An argument of the wrong shape was passed to a public operation
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The payload could not be encoded as JSON
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A version-gated operation was attempted before the agent announced
    /// its version (agents < 1.8.0 never do)
    #[error(
        "Operation requires agent >= {required} but no version was announced; \
         the connected agent is probably older than 1.8.0"
    )]
    UnknownAgentVersion {
        /// Minimum version required by the operation
        required: Version,
    },

    /// A version-gated operation was attempted against an agent that is too
    /// old to support it
    #[error("Operation requires agent >= {required} but {current} is connected")]
    AgentVersionTooLow {
        /// Minimum version required by the operation
        required: Version,
        /// Version announced by the connected agent
        current: Version,
    },

    /// A synchronous operation was attempted while the agent link was down
    #[error("Not connected to the agent")]
    NotConnected,
}

impl From<sidecar_protocol::ProtocolError> for SdkError {
    fn from(err: sidecar_protocol::ProtocolError) -> Self {
        match err {
            sidecar_protocol::ProtocolError::Serialization(e) => SdkError::Serialization(e),
            // Frame builders never do I/O; a transport failure at a public
            // boundary means the link is gone
            sidecar_protocol::ProtocolError::Io(_) => SdkError::NotConnected,
        }
    }
}
