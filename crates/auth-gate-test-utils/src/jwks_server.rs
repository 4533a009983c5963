//! Mock key set endpoint
//!
//! Wraps a wiremock server serving `/.well-known/jwks.json`, with call
//! count expectations verified when the server is dropped.

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path the remote issuer publishes its key set under.
pub const JWKS_PATH: &str = "/.well-known/jwks.json";

/// Mocked remote key set endpoint.
pub struct MockJwksServer {
    server: MockServer,
}

impl MockJwksServer {
    /// Start a server with no mounted responses.
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Full URL of the key set document.
    pub fn jwks_url(&self) -> String {
        format!("{}{}", self.server.uri(), JWKS_PATH)
    }

    /// Serve `document` for every request and expect exactly `calls` of them.
    pub async fn serve(&self, document: serde_json::Value, calls: u64) {
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(document))
            .expect(calls)
            .mount(&self.server)
            .await;
    }

    /// Serve `document` for the next `times` requests only.
    ///
    /// Later mounts take over once this one is exhausted.
    pub async fn serve_times(&self, document: serde_json::Value, times: u64) {
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(document))
            .up_to_n_times(times)
            .expect(times)
            .mount(&self.server)
            .await;
    }

    /// Serve `document` after `delay`, expecting exactly `calls` requests.
    pub async fn serve_slowly(
        &self,
        document: serde_json::Value,
        delay: std::time::Duration,
        calls: u64,
    ) {
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(document)
                    .set_delay(delay),
            )
            .expect(calls)
            .mount(&self.server)
            .await;
    }

    /// Answer every request with `status` and expect exactly `calls` of them.
    pub async fn fail_with(&self, status: u16, calls: u64) {
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(status))
            .expect(calls)
            .mount(&self.server)
            .await;
    }

    /// Number of requests received so far.
    pub async fn request_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|requests| requests.len())
            .unwrap_or(0)
    }
}
