//! Error taxonomy for a hub session.
//!
//! Two variants are answers from the hub rather than faults: the hub rejecting
//! the token ([`Error::AuthInvalid`]) and the hub reporting a failed command
//! ([`Error::CommandFailed`]). Everything else means the exchange broke.

use serde_json::Value;

/// Errors produced while talking to the hub.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The base URL could not be turned into an endpoint.
    #[error("invalid hub URL: {0}")]
    InvalidUrl(String),

    /// Name resolution, TCP connect, or the connect timeout failed.
    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The TLS client could not be set up for the server name.
    #[error("tls setup failed: {0}")]
    Tls(#[from] rustls::Error),

    /// The upgrade response was not `101`, or never completed.
    #[error("websocket handshake failed: {response}")]
    Handshake { response: String },

    /// The server answered `101` with the wrong `Sec-WebSocket-Accept`.
    #[error("websocket handshake accept key mismatch: expected {expected}, got {actual}")]
    AcceptMismatch { expected: String, actual: String },

    /// Frame-level failure, including the peer closing the connection.
    #[error("websocket transport failed: {0}")]
    Codec(#[from] frames::CodecError),

    /// A message could not be encoded or decoded as JSON.
    #[error("invalid JSON message: {0}")]
    Json(#[from] serde_json::Error),

    /// The hub sent a message type that is not valid at this point.
    #[error("expected {expected}, got: {actual}")]
    Protocol {
        expected: &'static str,
        actual: String,
    },

    /// The hub answered `auth_invalid`.
    #[error("authentication rejected: {message}")]
    AuthInvalid { message: String },

    /// The hub answered the command with `success: false`.
    #[error("command failed: {error}")]
    CommandFailed { error: Value },

    /// Extra command fields were not a JSON object.
    #[error("command data must be a JSON object, got: {0}")]
    InvalidExtraFields(Value),
}

impl Error {
    /// Grepable code for diagnostics.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidUrl(_) => "E_INVALID_URL",
            Self::Connect { .. } => "E_CONNECT",
            Self::Tls(_) => "E_TLS",
            Self::Handshake { .. } => "E_HANDSHAKE",
            Self::AcceptMismatch { .. } => "E_ACCEPT_MISMATCH",
            Self::Codec(frames::CodecError::ConnectionClosed) => "E_CONNECTION_CLOSED",
            Self::Codec(_) => "E_TRANSPORT",
            Self::Json(_) => "E_JSON",
            Self::Protocol { .. } => "E_PROTOCOL",
            Self::AuthInvalid { .. } => "E_AUTH_INVALID",
            Self::CommandFailed { .. } => "E_COMMAND_FAILED",
            Self::InvalidExtraFields(_) => "E_INVALID_DATA",
        }
    }

    /// Auth rejection and command failure are answers from the hub, not breakage.
    #[must_use]
    pub fn is_expected(&self) -> bool {
        matches!(self, Self::AuthInvalid { .. } | Self::CommandFailed { .. })
    }
}
