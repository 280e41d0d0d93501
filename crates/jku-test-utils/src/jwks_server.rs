//! Mock JWKS server for integration tests
//!
//! Wraps a wiremock `MockServer` serving a key set at a fixed path. Mounted
//! mocks carry an expected call count that wiremock verifies on drop.

use crate::crypto_fixtures::TestKeypair;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate, Times};

/// Path the key set is served under.
pub const JWKS_PATH: &str = "/token_keys";

/// Wiremock-backed JWKS endpoint.
pub struct TestJwksServer {
    mock_server: MockServer,
}

impl TestJwksServer {
    /// Start a server with nothing mounted.
    pub async fn start() -> Self {
        Self {
            mock_server: MockServer::start().await,
        }
    }

    /// Full URL of the key-set endpoint.
    pub fn jwks_url(&self) -> String {
        format!("{}{}", self.mock_server.uri(), JWKS_PATH)
    }

    /// Host the server listens on (e.g. `127.0.0.1`).
    pub fn host(&self) -> String {
        self.mock_server.address().ip().to_string()
    }

    /// Serve a JWKS with the given keypairs, expecting `expected_calls`
    /// requests (a count or a range).
    pub async fn mount_jwks(&self, keypairs: &[&TestKeypair], expected_calls: impl Into<Times>) {
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(TestKeypair::jwks_json(keypairs)),
            )
            .expect(expected_calls)
            .mount(&self.mock_server)
            .await;
    }

    /// Answer the key-set endpoint with a bare status code.
    pub async fn mount_status(&self, status: u16, expected_calls: impl Into<Times>) {
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(status))
            .expect(expected_calls)
            .mount(&self.mock_server)
            .await;
    }

    /// Serve an arbitrary body with status 200.
    pub async fn mount_raw(&self, body: &str, expected_calls: impl Into<Times>) {
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .expect(expected_calls)
            .mount(&self.mock_server)
            .await;
    }

    /// Drop all mounted mocks (e.g. to simulate key rotation).
    pub async fn reset(&self) {
        self.mock_server.reset().await;
    }

    /// Number of requests received so far.
    pub async fn request_count(&self) -> usize {
        self.mock_server
            .received_requests()
            .await
            .map(|requests| requests.len())
            .unwrap_or(0)
    }
}
