use reqwest::Method;
use venuebook_common::models::{Overview, OverviewQuery};
use venuebook_common::services::{BoxFuture, ReportsGateway};

use crate::client::RestGateway;

impl ReportsGateway for RestGateway {
    fn overview(&self, query: OverviewQuery) -> BoxFuture<'_, Overview> {
        Box::pin(async move {
            Ok(self
                .send_json(self.request(Method::GET, "/reports/overview").query(&query))
                .await?)
        })
    }

    fn admin_stats(&self) -> BoxFuture<'_, serde_json::Value> {
        Box::pin(async move {
            Ok(self
                .send_json(self.request(Method::GET, "/venues/admin-stats"))
                .await?)
        })
    }
}
