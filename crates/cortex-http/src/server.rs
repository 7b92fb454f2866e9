//! The HTTP server: router assembly, middleware layering, and the
//! listen/serve lifecycle. Mirrors `dashflow-registry/src/api/server.rs`'s
//! `ApiConfig`/`ApiServer` shape almost verbatim.

use axum::{middleware, Router};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::middleware as mw;
use crate::routes;
use crate::state::{AppState, ServerConfig};
use cortex_core::Result;

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    pub server: ServerConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 39281)),
            server: ServerConfig::default(),
        }
    }
}

impl ApiConfig {
    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.bind_addr.set_port(port);
        self
    }
}

pub struct ApiServer {
    config: ApiConfig,
    state: AppState,
    router: Router,
}

impl ApiServer {
    pub fn new(state: AppState, config: ApiConfig) -> Self {
        let state = state.with_server_config(config.server.clone());
        let router = Self::build_router(&state);
        Self { config, state, router }
    }

    pub fn with_state(state: AppState, config: ApiConfig) -> Self {
        Self::new(state, config)
    }

    /// Builds the complete router: the authenticated/CORS'd API surface
    /// merged with the unauthenticated `/healthz`, then layered with
    /// middleware in the order that runs request-id first and the body
    /// size limit outermost (first to see the request).
    fn build_router(state: &AppState) -> Router {
        let api = routes::api_router()
            .layer(middleware::from_fn(mw::error_handler_noop))
            .layer(middleware::from_fn_with_state(state.clone(), mw::cors_middleware))
            .layer(middleware::from_fn_with_state(state.clone(), mw::auth_middleware))
            .layer(middleware::from_fn(mw::request_id_middleware));

        let router = Router::new().merge(routes::health_router()).merge(api).with_state(state.clone());

        router
            .layer(RequestBodyLimitLayer::new(state.server.max_body_size))
            .layer(TraceLayer::new_for_http())
    }

    pub fn addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub async fn run(self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(addr = %self.config.bind_addr, "cortex HTTP surface listening");
        axum::serve(listener, self.router).await?;
        Ok(())
    }

    pub async fn run_until<F>(self, shutdown_signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(addr = %self.config.bind_addr, "cortex HTTP surface listening");
        axum::serve(listener, self.router).with_graceful_shutdown(shutdown_signal).await?;
        tracing::info!("cortex HTTP surface shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::util::ServiceExt;

    fn test_state() -> AppState {
        crate::test_support::in_memory_state()
    }

    #[tokio::test]
    async fn healthz_is_reachable_without_auth() {
        let state = test_state();
        let server = ApiServer::new(state, ApiConfig::default());
        let router = server.router();

        let response = router
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_bearer_token_is_rejected_when_tokens_configured() {
        let state = test_state();
        state
            .config
            .update(Box::new(|c| c.tokens = vec!["secret".to_string()]))
            .unwrap();
        let server = ApiServer::new(state, ApiConfig::default());
        let router = server.router();

        let response = router
            .oneshot(Request::builder().uri("/v1/threads").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn cors_mirrors_allowed_origin() {
        let state = test_state();
        let server = ApiServer::new(state, ApiConfig::default());
        let router = server.router();

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/v1/threads")
                    .header("origin", "https://example.test")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "https://example.test"
        );
    }
}
