//! Sign-in and sign-out.

use std::sync::Arc;

use tracing::warn;
use venuebook_common::models::{LoginRequest, Session};
use venuebook_common::services::AuthGateway;
use venuebook_common::{validation_error, VenuebookError};
use venuebook_store::SessionStore;

pub struct Authenticator {
    gateway: Arc<dyn AuthGateway>,
    sessions: Arc<SessionStore>,
}

impl Authenticator {
    pub fn new(gateway: Arc<dyn AuthGateway>, sessions: Arc<SessionStore>) -> Self {
        Self { gateway, sessions }
    }

    /// Exchanges credentials for a session and stores token and user together.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, VenuebookError> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(validation_error("Email and password are required"));
        }
        let response = self
            .gateway
            .login(LoginRequest {
                email: email.to_string(),
                password: password.to_string(),
            })
            .await
            .inspect_err(|e| warn!("sign-in for {} failed: {}", email, e))?;

        let session = Session::from(response);
        self.sessions.sign_in(session.clone())?;
        Ok(session)
    }

    pub fn sign_out(&self) -> Result<(), VenuebookError> {
        Ok(self.sessions.sign_out()?)
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }
}
