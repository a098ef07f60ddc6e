use reqwest::Method;
use tracing::info;
use venuebook_common::models::{LoginRequest, LoginResponse};
use venuebook_common::services::{AuthGateway, BoxFuture};

use crate::client::RestGateway;

impl AuthGateway for RestGateway {
    fn login(&self, request: LoginRequest) -> BoxFuture<'_, LoginResponse> {
        Box::pin(async move {
            let response: LoginResponse = self
                .send_json(self.request(Method::POST, "/auth/login").json(&request))
                .await?;
            info!(
                "signed in as {} ({})",
                response.user.email, response.user.role
            );
            Ok(response)
        })
    }
}
