// --- File: crates/venuebook_common/src/lib.rs ---

// Declare modules within this crate
pub mod error; // Error handling
pub mod http; // HTTP utilities
pub mod logging; // Logging utilities
pub mod models; // Wire and domain types
pub mod services; // Service abstractions
pub mod time; // Display timezone helpers

// Re-export error types and utilities for easier access
pub use error::{
    config_error, external_service_error, forbidden, internal_error, not_found, validation_error,
    Context, HttpStatusCode, Redirect, VenuebookError,
};

// Re-export HTTP utilities for easier access
pub use http::{
    bearer, error_from_status, server_message,
    client::{client_from_config, create_client},
};

// Re-export logging utilities for easier access
pub use logging::{init, init_with_file, init_with_level, log_error, log_result};

pub use services::{
    AuthGateway, BookingGateway, BoxFuture, PaymentGateway, ReportsGateway, StaticToken,
    TokenSource,
};
