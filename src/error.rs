use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

/// Main error type for the Turnstile rate limiting service
#[derive(Debug)]
pub enum TurnstileError {
    /// Configuration or CLI argument errors
    Config(String),

    /// Singleton directory errors
    Registry(RegistryError),

    /// Lifecycle errors for the singleton limiter instance
    Singleton(String),

    /// Node networking and communication errors
    Transport(String),

    /// A peer or local call did not complete within its deadline
    Timeout(String),

    /// API/HTTP related errors
    Api(String),

    /// System I/O errors
    Io(std::io::Error),

    /// Serialization/deserialization errors
    Serialization(serde_json::Error),
}

/// Singleton registry specific errors
#[derive(Debug)]
pub enum RegistryError {
    /// No registered owner for the given singleton name
    NotFound(String),

    /// A request carried an incarnation that no longer matches the live instance
    StaleIncarnation { expected: u64, got: u64 },

    /// Two registrations claimed the same name and the offered one lost
    ConflictingOwner { held: String, offered: String },
}

impl fmt::Display for TurnstileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnstileError::Config(msg) => write!(f, "Configuration error: {}", msg),
            TurnstileError::Registry(err) => write!(f, "Registry error: {}", err),
            TurnstileError::Singleton(msg) => write!(f, "Singleton error: {}", msg),
            TurnstileError::Transport(msg) => write!(f, "Transport error: {}", msg),
            TurnstileError::Timeout(msg) => write!(f, "Timeout: {}", msg),
            TurnstileError::Api(msg) => write!(f, "API error: {}", msg),
            TurnstileError::Io(err) => write!(f, "I/O error: {}", err),
            TurnstileError::Serialization(err) => write!(f, "Serialization error: {}", err),
        }
    }
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::NotFound(name) => write!(f, "no registered owner for '{}'", name),
            RegistryError::StaleIncarnation { expected, got } => write!(
                f,
                "stale incarnation: live instance is {}, request carried {}",
                expected, got
            ),
            RegistryError::ConflictingOwner { held, offered } => write!(
                f,
                "conflicting registration: holding {}, refused {}",
                held, offered
            ),
        }
    }
}

impl std::error::Error for TurnstileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TurnstileError::Io(err) => Some(err),
            TurnstileError::Serialization(err) => Some(err),
            TurnstileError::Registry(err) => Some(err),
            _ => None,
        }
    }
}

impl std::error::Error for RegistryError {}

// Convenient type alias for Results using our error type
pub type Result<T> = std::result::Result<T, TurnstileError>;

impl TurnstileError {
    /// Get the appropriate HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            TurnstileError::Config(_) => StatusCode::BAD_REQUEST,
            TurnstileError::Registry(RegistryError::NotFound(_)) => StatusCode::NOT_FOUND,
            TurnstileError::Registry(_) => StatusCode::CONFLICT,
            TurnstileError::Singleton(_) => StatusCode::SERVICE_UNAVAILABLE,
            TurnstileError::Transport(_) => StatusCode::SERVICE_UNAVAILABLE,
            TurnstileError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            TurnstileError::Api(_) => StatusCode::BAD_REQUEST,
            TurnstileError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            TurnstileError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error type identifier
    pub fn error_type(&self) -> &'static str {
        match self {
            TurnstileError::Config(_) => "configuration_error",
            TurnstileError::Registry(RegistryError::NotFound(_)) => "owner_not_found",
            TurnstileError::Registry(RegistryError::StaleIncarnation { .. }) => "stale_incarnation",
            TurnstileError::Registry(RegistryError::ConflictingOwner { .. }) => "conflicting_owner",
            TurnstileError::Singleton(_) => "singleton_error",
            TurnstileError::Transport(_) => "transport_error",
            TurnstileError::Timeout(_) => "timeout",
            TurnstileError::Api(_) => "api_error",
            TurnstileError::Io(_) => "io_error",
            TurnstileError::Serialization(_) => "serialization_error",
        }
    }
}

// Axum IntoResponse implementation for HTTP error responses
impl IntoResponse for TurnstileError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();
        let error_response = json!({
            "error": {
                "code": status_code.as_u16(),
                "message": self.to_string(),
                "type": self.error_type(),
            }
        });
        (status_code, Json(error_response)).into_response()
    }
}

// Conversions from common error types
impl From<std::io::Error> for TurnstileError {
    fn from(err: std::io::Error) -> Self {
        TurnstileError::Io(err)
    }
}

impl From<serde_json::Error> for TurnstileError {
    fn from(err: serde_json::Error) -> Self {
        TurnstileError::Serialization(err)
    }
}

impl From<RegistryError> for TurnstileError {
    fn from(err: RegistryError) -> Self {
        TurnstileError::Registry(err)
    }
}

impl From<reqwest::Error> for TurnstileError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TurnstileError::Timeout(err.to_string())
        } else {
            TurnstileError::Transport(err.to_string())
        }
    }
}
