use reqwest::{Client, Error as ReqwestError};
use std::time::Duration;
use venuebook_config::ApiConfig;

/// Default timeout for HTTP requests in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Creates a new HTTP client with custom configuration.
///
/// # Arguments
///
/// * `timeout_secs` - The timeout in seconds for the client
/// * `follow_redirects` - Whether the client should follow redirects
pub fn create_client(timeout_secs: u64, follow_redirects: bool) -> Result<Client, ReqwestError> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .redirect(if follow_redirects {
            reqwest::redirect::Policy::default()
        } else {
            reqwest::redirect::Policy::none()
        })
        .build()
}

/// Creates the client used for the booking API.
pub fn client_from_config(config: &ApiConfig) -> Result<Client, ReqwestError> {
    let timeout = if config.timeout_secs == 0 {
        DEFAULT_TIMEOUT_SECS
    } else {
        config.timeout_secs
    };
    create_client(timeout, true)
}
