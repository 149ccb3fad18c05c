//! Mock upstream API for exercising polling units
//!
//! Responds on `/status` so tests can script healthy, throttled and failing
//! upstreams without a real remote service.

use serde_json::json;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

pub struct MockApiServer {
    pub server: MockServer,
    pub base_url: String,
}

impl MockApiServer {
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let base_url = server.uri();
        Self { server, base_url }
    }

    /// URL polled by the units under test
    pub fn status_url(&self) -> String {
        format!("{}/status", self.base_url)
    }

    /// Healthy upstream answering 200 with a small JSON body
    pub async fn mock_healthy(&self) {
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "ok"
            })))
            .mount(&self.server)
            .await;
    }

    /// Upstream answering every request with `code`
    pub async fn mock_status(&self, code: u16) {
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(ResponseTemplate::new(code))
            .mount(&self.server)
            .await;
    }

    /// Throttling upstream (429)
    pub async fn mock_throttled(&self) {
        self.mock_status(429).await;
    }

    pub async fn request_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|requests| requests.len())
            .unwrap_or(0)
    }
}
