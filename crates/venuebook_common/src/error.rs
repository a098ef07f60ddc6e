// --- File: crates/venuebook_common/src/error.rs ---
use std::fmt;
use thiserror::Error;

/// The base error type for all Venuebook errors.
///
/// Every crate in the workspace converts its own error enum into this one with
/// a `From` implementation, so call sites can surface a single error kind.
#[derive(Error, Debug)]
pub enum VenuebookError {
    /// The request never produced a response (connection refused, DNS, TLS).
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    /// Error occurred while parsing data
    #[error("Failed to parse data: {0}")]
    ParseError(String),

    /// Error occurred due to missing or invalid configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Missing or rejected bearer token.
    #[error("Authentication error: {0}")]
    AuthError(String),

    /// Role or ownership does not permit the action.
    #[error("Forbidden: {0}")]
    ForbiddenError(String),

    /// Field errors, either reported by the server or detected locally.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Error occurred due to a conflict (e.g., overlapping booking)
    #[error("Conflict: {0}")]
    ConflictError(String),

    /// Error occurred due to a resource not being found
    #[error("Not found: {0}")]
    NotFoundError(String),

    /// Error occurred during external service call
    #[error("External service error: {service_name} - {message}")]
    ExternalServiceError {
        service_name: String,
        message: String,
    },

    /// Error occurred due to a timeout
    #[error("Timeout: {0}")]
    TimeoutError(String),

    /// Local durable storage could not be read or written
    #[error("Storage error: {0}")]
    StorageError(String),

    /// The payment result carried none of the recognized references.
    #[error("No payment reference found in result parameters")]
    MissingPaymentReference,

    /// Error occurred due to an internal error
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Where the user should be sent after an error, if anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redirect {
    Login,
    Forbidden,
}

impl VenuebookError {
    /// Authentication failures go to the login view, authorization failures
    /// to the forbidden view. Everything else stays where it is.
    pub fn redirect(&self) -> Option<Redirect> {
        match self {
            VenuebookError::AuthError(_) => Some(Redirect::Login),
            VenuebookError::ForbiddenError(_) => Some(Redirect::Forbidden),
            _ => None,
        }
    }

    /// The transient message shown to the user.
    ///
    /// Validation messages come from the server and are shown verbatim.
    pub fn notice(&self) -> String {
        match self {
            VenuebookError::ValidationError(msg) | VenuebookError::ConflictError(msg) => {
                msg.clone()
            }
            VenuebookError::AuthError(_) => "Your session has expired, please sign in again".to_string(),
            VenuebookError::ForbiddenError(_) => "You are not allowed to do that".to_string(),
            VenuebookError::NotFoundError(_) => "The booking no longer exists".to_string(),
            VenuebookError::HttpError(_) | VenuebookError::TimeoutError(_) => {
                "Could not reach the booking service".to_string()
            }
            VenuebookError::MissingPaymentReference => {
                "The payment result did not include a reference to verify".to_string()
            }
            other => other.to_string(),
        }
    }

    /// Transport-level failures that may succeed when the user retries.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            VenuebookError::HttpError(_)
                | VenuebookError::TimeoutError(_)
                | VenuebookError::ExternalServiceError { .. }
        )
    }
}

/// A trait for converting errors to HTTP status codes.
///
/// Used to classify errors consistently when logging and when mapping remote
/// responses back into `VenuebookError`.
pub trait HttpStatusCode {
    /// Returns the HTTP status code for this error.
    fn status_code(&self) -> u16;
}

impl HttpStatusCode for VenuebookError {
    fn status_code(&self) -> u16 {
        match self {
            VenuebookError::HttpError(_) => 503,
            VenuebookError::ParseError(_) => 400,
            VenuebookError::ConfigError(_) => 500,
            VenuebookError::AuthError(_) => 401,
            VenuebookError::ForbiddenError(_) => 403,
            VenuebookError::ValidationError(_) => 400,
            VenuebookError::ConflictError(_) => 409,
            VenuebookError::NotFoundError(_) => 404,
            VenuebookError::ExternalServiceError { .. } => 502,
            VenuebookError::TimeoutError(_) => 504,
            VenuebookError::StorageError(_) => 500,
            VenuebookError::MissingPaymentReference => 400,
            VenuebookError::InternalError(_) => 500,
        }
    }
}

/// A trait for adding context to errors.
pub trait Context<T, E> {
    /// Adds context to an error.
    fn context<C>(self, context: C) -> Result<T, VenuebookError>
    where
        C: fmt::Display + Send + Sync + 'static;

    /// Adds context to an error with a lazy context provider.
    fn with_context<C, F>(self, f: F) -> Result<T, VenuebookError>
    where
        C: fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl<T, E: std::error::Error + Send + Sync + 'static> Context<T, E> for Result<T, E> {
    fn context<C>(self, context: C) -> Result<T, VenuebookError>
    where
        C: fmt::Display + Send + Sync + 'static,
    {
        self.map_err(|error| VenuebookError::InternalError(format!("{}: {}", context, error)))
    }

    fn with_context<C, F>(self, f: F) -> Result<T, VenuebookError>
    where
        C: fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.map_err(|error| VenuebookError::InternalError(format!("{}: {}", f(), error)))
    }
}

// Common error conversions
impl From<reqwest::Error> for VenuebookError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            VenuebookError::TimeoutError(err.to_string())
        } else if err.is_decode() {
            VenuebookError::ParseError(err.to_string())
        } else {
            VenuebookError::HttpError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for VenuebookError {
    fn from(err: serde_json::Error) -> Self {
        VenuebookError::ParseError(err.to_string())
    }
}

impl From<std::io::Error> for VenuebookError {
    fn from(err: std::io::Error) -> Self {
        VenuebookError::StorageError(err.to_string())
    }
}

impl From<venuebook_config::ConfigError> for VenuebookError {
    fn from(err: venuebook_config::ConfigError) -> Self {
        VenuebookError::ConfigError(err.to_string())
    }
}

// Utility functions for error handling
pub fn config_error<T: fmt::Display>(message: T) -> VenuebookError {
    VenuebookError::ConfigError(message.to_string())
}

pub fn validation_error<T: fmt::Display>(message: T) -> VenuebookError {
    VenuebookError::ValidationError(message.to_string())
}

pub fn forbidden<T: fmt::Display>(message: T) -> VenuebookError {
    VenuebookError::ForbiddenError(message.to_string())
}

pub fn not_found<T: fmt::Display>(message: T) -> VenuebookError {
    VenuebookError::NotFoundError(message.to_string())
}

pub fn external_service_error<T: fmt::Display>(service_name: &str, message: T) -> VenuebookError {
    VenuebookError::ExternalServiceError {
        service_name: service_name.to_string(),
        message: message.to_string(),
    }
}

pub fn internal_error<T: fmt::Display>(message: T) -> VenuebookError {
    VenuebookError::InternalError(message.to_string())
}
