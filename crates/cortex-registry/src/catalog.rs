//! HTTP catalog client: lists upstream releases and variants for a family.
//! The catalog's base URL is configurable so tests can point it at a
//! `wiremock` server instead of a real upstream.

use crate::types::{Release, Variant};
use cortex_core::{Error, Result};

#[derive(Clone)]
pub struct CatalogClient {
    client: reqwest::Client,
    base_url: String,
}

impl CatalogClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    pub async fn releases(&self, family: &str) -> Result<Vec<Release>> {
        let url = format!("{}/{family}/releases", self.base_url);
        self.get_json(&url).await
    }

    pub async fn variants(&self, family: &str, version: &str) -> Result<Vec<Variant>> {
        let url = format!("{}/{family}/releases/{version}/variants", self.base_url);
        self.get_json(&url).await
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::download_failed(format!("catalog request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::download_failed(format!(
                "catalog returned {} for {url}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| Error::internal(format!("catalog returned invalid JSON: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn releases_parses_catalog_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/llama-cpp/releases"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"version": "0.1.0"},
                {"version": "0.2.0"},
            ])))
            .mount(&server)
            .await;

        let client = CatalogClient::new(server.uri());
        let releases = client.releases("llama-cpp").await.unwrap();
        assert_eq!(releases.len(), 2);
        assert_eq!(releases[1].version, "0.2.0");
    }

    #[tokio::test]
    async fn non_success_status_is_download_failed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/llama-cpp/releases"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = CatalogClient::new(server.uri());
        let err = client.releases("llama-cpp").await.unwrap_err();
        assert_eq!(err.kind, cortex_core::ErrorKind::DownloadFailed);
    }
}
