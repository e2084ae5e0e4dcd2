use std::fmt;

use crate::api::ApiError;
use crate::socket::SocketError;

/// Failure of a session operation. Every operation returns one of these
/// instead of panicking; the controller's state stays consistent either way.
#[derive(Debug)]
pub enum ChatError {
    /// Rejected locally before any network call.
    Validation(String),
    /// The server answered 401 just now.
    Unauthorized,
    /// An earlier 401 invalidated the session; nothing was sent.
    SessionInvalid,
    Network(String),
    Server { status: u16, message: String },
    Parse(String),
    Socket(SocketError),
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatError::Validation(msg) => write!(f, "{}", msg),
            ChatError::Unauthorized => write!(f, "{}", ApiError::Unauthorized),
            ChatError::SessionInvalid => write!(f, "Session is no longer valid. Sign in again to continue."),
            ChatError::Network(msg) => write!(f, "Network error: {}", msg),
            ChatError::Server { message, .. } => write!(f, "{}", message),
            ChatError::Parse(msg) => write!(f, "Unexpected response from server: {}", msg),
            ChatError::Socket(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ChatError {}

impl From<ApiError> for ChatError {
    fn from(e: ApiError) -> Self {
        match e {
            ApiError::Unauthorized => ChatError::Unauthorized,
            ApiError::Network(msg) => ChatError::Network(msg),
            ApiError::Server { status, message } => ChatError::Server { status, message },
            ApiError::Parse(msg) => ChatError::Parse(msg),
        }
    }
}

impl From<SocketError> for ChatError {
    fn from(e: SocketError) -> Self {
        ChatError::Socket(e)
    }
}

impl ChatError {
    /// True for both a fresh 401 and a session already invalidated by one.
    pub fn is_auth(&self) -> bool {
        matches!(self, ChatError::Unauthorized | ChatError::SessionInvalid)
    }
}
