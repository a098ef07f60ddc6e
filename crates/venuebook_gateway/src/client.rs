//! REST client for the booking service.
//!
//! `RestGateway` wraps a `reqwest::Client`, prefixes every path with the
//! configured base URL and attaches the current bearer token taken from a
//! [`TokenSource`]. The service traits of `venuebook_common::services` are
//! implemented here (bookings, venues) and in the sibling modules (auth,
//! payments, reports).

use std::sync::Arc;

use reqwest::{header, Client, Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use venuebook_common::models::{Booking, BookingPatch, BookingQuery, NewBooking, Venue};
use venuebook_common::services::{BookingGateway, BoxFuture, TokenSource};
use venuebook_common::{bearer, client_from_config};
use venuebook_config::ApiConfig;

use crate::error::GatewayError;

/// Client for the booking service REST API.
#[derive(Clone)]
pub struct RestGateway {
    /// HTTP client for making requests
    client: Client,

    /// Base URL without trailing slash, e.g. `http://localhost:3001`
    base_url: String,

    /// Read on every request so a re-login takes effect immediately
    tokens: Arc<dyn TokenSource>,
}

impl RestGateway {
    /// Creates a gateway from the API section of the configuration.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::ConfigError` when the base URL is not an
    /// absolute http(s) URL, or `RequestError` if the client cannot be built.
    pub fn new(config: &ApiConfig, tokens: Arc<dyn TokenSource>) -> Result<Self, GatewayError> {
        let client = client_from_config(config)?;
        Self::with_client(client, &config.base_url, tokens)
    }

    /// Creates a gateway around an existing client.
    pub fn with_client(
        client: Client,
        base_url: &str,
        tokens: Arc<dyn TokenSource>,
    ) -> Result<Self, GatewayError> {
        let parsed = reqwest::Url::parse(base_url)
            .map_err(|e| GatewayError::ConfigError(format!("invalid base_url '{}': {}", base_url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(GatewayError::ConfigError(format!(
                "base_url must be http(s), got '{}'",
                parsed.scheme()
            )));
        }
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// URL of `/{collection}/{id}` with `id` percent-encoded as one segment.
    pub(crate) fn item_url(&self, collection: &str, id: &str) -> Result<Url, GatewayError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| GatewayError::ConfigError(format!("invalid base_url '{}': {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|()| GatewayError::ConfigError(format!("base_url '{}' cannot take a path", self.base_url)))?
            .pop_if_empty()
            .push(collection)
            .push(id);
        Ok(url)
    }

    /// Starts a request with the bearer token attached when one is present.
    pub(crate) fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.authorize(self.client.request(method.clone(), self.url(path)), &method, path)
    }

    pub(crate) fn request_url(&self, method: Method, url: Url) -> RequestBuilder {
        let path = url.path().to_string();
        self.authorize(self.client.request(method.clone(), url), &method, &path)
    }

    fn authorize(&self, builder: RequestBuilder, method: &Method, path: &str) -> RequestBuilder {
        match self.tokens.bearer_token() {
            Some(token) => builder.header(header::AUTHORIZATION, bearer(&token)),
            None => {
                debug!("{} {} sent without bearer token", method, path);
                builder
            }
        }
    }

    /// Sends the request and turns non-success statuses into `ApiError`.
    pub(crate) async fn send(&self, builder: RequestBuilder) -> Result<Response, GatewayError> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        warn!("booking API responded {}: {}", status, body);
        Err(GatewayError::ApiError { status, body })
    }

    /// Sends the request and decodes a JSON body.
    pub(crate) async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<T, GatewayError> {
        let response = self.send(builder).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn fetch_venues(&self) -> Result<Vec<Venue>, GatewayError> {
        self.send_json(self.request(Method::GET, "/venues")).await
    }

    async fn fetch_bookings(&self, query: &BookingQuery) -> Result<Vec<Booking>, GatewayError> {
        debug!(
            "listing bookings for venue {} in [{}, {})",
            query.venue_id, query.from, query.to
        );
        self.send_json(self.request(Method::GET, "/bookings").query(query))
            .await
    }

    async fn post_booking(&self, booking: &NewBooking) -> Result<Booking, GatewayError> {
        self.send_json(self.request(Method::POST, "/bookings").json(booking))
            .await
    }

    async fn patch_booking(
        &self,
        booking_id: &str,
        patch: &BookingPatch,
    ) -> Result<Booking, GatewayError> {
        let url = self.item_url("bookings", booking_id)?;
        self.send_json(self.request_url(Method::PATCH, url).json(patch))
            .await
    }

    async fn remove_booking(&self, booking_id: &str) -> Result<(), GatewayError> {
        let url = self.item_url("bookings", booking_id)?;
        self.send(self.request_url(Method::DELETE, url)).await?;
        Ok(())
    }
}

impl BookingGateway for RestGateway {
    fn list_venues(&self) -> BoxFuture<'_, Vec<Venue>> {
        Box::pin(async move { Ok(self.fetch_venues().await?) })
    }

    fn list_bookings(&self, query: BookingQuery) -> BoxFuture<'_, Vec<Booking>> {
        Box::pin(async move { Ok(self.fetch_bookings(&query).await?) })
    }

    fn create_booking(&self, booking: NewBooking) -> BoxFuture<'_, Booking> {
        Box::pin(async move { Ok(self.post_booking(&booking).await?) })
    }

    fn update_booking(&self, booking_id: &str, patch: BookingPatch) -> BoxFuture<'_, Booking> {
        let booking_id = booking_id.to_string();
        Box::pin(async move { Ok(self.patch_booking(&booking_id, &patch).await?) })
    }

    fn delete_booking(&self, booking_id: &str) -> BoxFuture<'_, ()> {
        let booking_id = booking_id.to_string();
        Box::pin(async move { Ok(self.remove_booking(&booking_id).await?) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use venuebook_common::StaticToken;

    fn tokens() -> Arc<dyn TokenSource> {
        Arc::new(StaticToken(None))
    }

    #[test]
    fn test_base_url_is_normalized() {
        let gateway =
            RestGateway::with_client(Client::new(), "http://localhost:3001/", tokens()).unwrap();
        assert_eq!(gateway.base_url(), "http://localhost:3001");
        assert_eq!(gateway.url("/venues"), "http://localhost:3001/venues");
    }

    #[test]
    fn test_item_id_is_a_single_encoded_segment() {
        let gateway =
            RestGateway::with_client(Client::new(), "http://localhost:3001/api/", tokens()).unwrap();
        let url = gateway.item_url("bookings", "a/b?c#d").unwrap();
        assert_eq!(url.as_str(), "http://localhost:3001/api/bookings/a%2Fb%3Fc%23d");
        assert_eq!(
            gateway.item_url("bookings", "50%").unwrap().path(),
            "/api/bookings/50%25"
        );
    }

    #[test]
    fn test_rejects_non_http_base_url() {
        assert!(matches!(
            RestGateway::with_client(Client::new(), "ftp://example.com", tokens()),
            Err(GatewayError::ConfigError(_))
        ));
        assert!(matches!(
            RestGateway::with_client(Client::new(), "not a url", tokens()),
            Err(GatewayError::ConfigError(_))
        ));
    }
}
