//! Admin reporting, guarded locally before any request is made.

use std::sync::Arc;

use venuebook_common::models::{Overview, OverviewQuery, Role};
use venuebook_common::services::ReportsGateway;
use venuebook_common::{forbidden, VenuebookError};
use venuebook_store::SessionStore;

use crate::permissions::{guard, Access};

const REPORT_ROLES: &[Role] = &[Role::Admin];

pub struct Reports {
    gateway: Arc<dyn ReportsGateway>,
    sessions: Arc<SessionStore>,
}

impl Reports {
    pub fn new(gateway: Arc<dyn ReportsGateway>, sessions: Arc<SessionStore>) -> Self {
        Self { gateway, sessions }
    }

    fn authorize(&self) -> Result<(), VenuebookError> {
        match guard(self.sessions.session().as_ref(), REPORT_ROLES) {
            Access::Granted => Ok(()),
            Access::Login => Err(VenuebookError::AuthError("sign in required".to_string())),
            Access::Forbidden => Err(forbidden("reports are restricted to administrators")),
        }
    }

    pub async fn overview(&self, query: OverviewQuery) -> Result<Overview, VenuebookError> {
        self.authorize()?;
        self.gateway.overview(query).await
    }

    pub async fn admin_stats(&self) -> Result<serde_json::Value, VenuebookError> {
        self.authorize()?;
        self.gateway.admin_stats().await
    }
}
