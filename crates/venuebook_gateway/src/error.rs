use reqwest::StatusCode;
use thiserror::Error;
use venuebook_common::{config_error, error_from_status, VenuebookError};

/// Gateway-specific error types.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// The request could not be sent or the response not received
    #[error("Booking API request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    /// Non-success status returned by the booking API
    #[error("Booking API returned an error: {body} (Status: {status})")]
    ApiError { status: StatusCode, body: String },

    /// Error parsing a booking API response
    #[error("Failed to parse booking API response: {0}")]
    ParseError(#[from] serde_json::Error),

    /// Base URL or client settings are unusable
    #[error("Gateway configuration invalid: {0}")]
    ConfigError(String),
}

/// Convert GatewayError to VenuebookError
impl From<GatewayError> for VenuebookError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::RequestError(e) => VenuebookError::from(e),
            GatewayError::ApiError { status, body } => error_from_status(status, &body),
            GatewayError::ParseError(e) => VenuebookError::from(e),
            GatewayError::ConfigError(msg) => config_error(msg),
        }
    }
}
