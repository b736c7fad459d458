//! Control API server

use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::config::UiConfig;
use crate::error::{Error, Result};
use crate::intercom::Intercom;
use crate::ui::handlers;

/// Shared state for request handlers
pub struct AppState {
    pub intercom: Arc<Intercom>,
}

/// HTTP control server
pub struct WebServer {
    config: UiConfig,
    state: Arc<AppState>,
}

impl WebServer {
    pub fn new(config: UiConfig, intercom: Arc<Intercom>) -> Self {
        Self {
            config,
            state: Arc::new(AppState { intercom }),
        }
    }

    /// Build the router.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/status", get(handlers::get_status))
            .route("/config", post(handlers::update_config))
            .route("/restart", post(handlers::restart))
            .route("/start/tx", post(handlers::start_tx))
            .route("/start/rx", post(handlers::start_rx))
            .route("/stop/tx", post(handlers::stop_tx))
            .route("/stop/rx", post(handlers::stop_rx))
            .route("/rx/metrics", get(handlers::rx_metrics))
            .route("/rx/peers", get(handlers::rx_peers))
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.config.bind_address, self.config.http_port)
            .parse()
            .map_err(|e| Error::Config(format!("invalid UI bind address: {}", e)))
    }

    /// Serve until the process exits.
    pub async fn run(self) -> Result<()> {
        let addr = self.bind_addr()?;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Control API listening on http://{}", addr);
        axum::serve(listener, self.router()).await?;
        Ok(())
    }

    /// Serve on a background task.
    pub fn start_background(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(self.run())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[test]
    fn test_bind_addr() {
        let node = Arc::new(Intercom::in_memory(AppConfig::default()));
        let server = WebServer::new(UiConfig::default(), node.clone());
        assert_eq!(server.bind_addr().unwrap().to_string(), "0.0.0.0:8080");

        let bad = WebServer::new(
            UiConfig {
                bind_address: "not an address".to_string(),
                http_port: 1,
            },
            node,
        );
        assert!(bad.bind_addr().is_err());
    }

    #[tokio::test]
    async fn test_serves_status() {
        let node = Arc::new(Intercom::in_memory(AppConfig::default()));
        let server = WebServer::new(UiConfig::default(), node);
        let app = server.router();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /status HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("\"tx_running\":false"));
        assert!(response.contains("\"rx_running\":false"));
    }
}
