//! Thin `reqwest` wrapper around the Cortex HTTP surface, plus the
//! auto-launch-if-unreachable dance §6 calls for.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{CliError, CliResult};

#[derive(Clone)]
pub struct CortexClient {
    http: reqwest::Client,
    base_url: String,
}

impl CortexClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { http: reqwest::Client::new(), base_url: base_url.into() }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn is_reachable(&self) -> bool {
        self.http
            .get(format!("{}/healthz", self.base_url))
            .timeout(Duration::from_millis(500))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> CliResult<T> {
        let response = self.http.get(format!("{}{path}", self.base_url)).send().await?;
        Self::decode(response).await
    }

    pub async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> CliResult<T> {
        let response = self.http.post(format!("{}{path}", self.base_url)).json(body).send().await?;
        Self::decode(response).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> CliResult<T> {
        let response = self.http.delete(format!("{}{path}", self.base_url)).send().await?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> CliResult<T> {
        if response.status().is_success() {
            response.json().await.map_err(|e| CliError::runtime(format!("invalid response from cortex-server: {e}")))
        } else if let Ok(envelope) = response.json::<cortex_core::ErrorEnvelope>().await {
            Err(envelope.into())
        } else {
            Err(CliError::runtime("cortex-server returned an error with no envelope body"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Debug, Deserialize, PartialEq)]
    struct Ping {
        ok: bool,
    }

    #[tokio::test]
    async fn is_reachable_reflects_healthz_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/healthz"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = CortexClient::new(server.uri());
        assert!(client.is_reachable().await);
    }

    #[tokio::test]
    async fn get_decodes_success_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .mount(&server)
            .await;

        let client = CortexClient::new(server.uri());
        let ping: Ping = client.get("/ping").await.unwrap();
        assert_eq!(ping, Ping { ok: true });
    }

    #[tokio::test]
    async fn get_surfaces_error_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "message": "engine llama-cpp not found",
                "kind": "not_found",
            })))
            .mount(&server)
            .await;

        let client = CortexClient::new(server.uri());
        let err = client.get::<Ping>("/missing").await.unwrap_err();
        assert!(err.message.contains("not found"));
    }
}
