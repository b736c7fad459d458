//! HTTP API handlers
//!
//! Every handler goes through the blocking pool: start/stop join worker
//! threads while holding the controller's locks, and queries take the same
//! locks.

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::config::{AppConfig, ConfigUpdate};
use crate::intercom::Intercom;
use crate::protocol::{NodeStatus, PeersResponse, TrafficSnapshot};
use crate::ui::server::AppState;

/// API response wrapper
#[derive(serde::Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

type ApiResult<T> = (StatusCode, Json<ApiResponse<T>>);

/// Run a controller call on the blocking pool and wrap its outcome.
async fn blocking<T, F>(state: Arc<AppState>, f: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce(&Intercom) -> crate::Result<T> + Send + 'static,
{
    let joined = tokio::task::spawn_blocking(move || f(&state.intercom)).await;
    match joined {
        Ok(Ok(data)) => (StatusCode::OK, Json(ApiResponse::ok(data))),
        Ok(Err(e)) => {
            tracing::warn!("Control request failed: {}", e);
            (StatusCode::BAD_REQUEST, Json(ApiResponse::error(e.to_string())))
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(e.to_string())),
        ),
    }
}

/// Get node status
pub async fn get_status(State(state): State<Arc<AppState>>) -> ApiResult<NodeStatus> {
    blocking(state, |node| Ok(node.status())).await
}

/// Update and persist configuration
pub async fn update_config(
    State(state): State<Arc<AppState>>,
    Json(update): Json<ConfigUpdate>,
) -> ApiResult<AppConfig> {
    blocking(state, move |node| node.update_config(update)).await
}

pub async fn restart(State(state): State<Arc<AppState>>) -> ApiResult<()> {
    blocking(state, |node| node.restart()).await
}

pub async fn start_tx(State(state): State<Arc<AppState>>) -> ApiResult<()> {
    blocking(state, |node| node.start_tx()).await
}

pub async fn start_rx(State(state): State<Arc<AppState>>) -> ApiResult<()> {
    blocking(state, |node| node.start_rx()).await
}

pub async fn stop_tx(State(state): State<Arc<AppState>>) -> ApiResult<()> {
    blocking(state, |node| {
        node.stop_tx();
        Ok(())
    })
    .await
}

pub async fn stop_rx(State(state): State<Arc<AppState>>) -> ApiResult<()> {
    blocking(state, |node| {
        node.stop_rx();
        Ok(())
    })
    .await
}

/// Traffic monitor statistics
pub async fn rx_metrics(State(state): State<Arc<AppState>>) -> ApiResult<TrafficSnapshot> {
    blocking(state, |node| Ok(node.metrics())).await
}

/// Active talkers and mix loudness
pub async fn rx_peers(State(state): State<Arc<AppState>>) -> ApiResult<PeersResponse> {
    blocking(state, |node| Ok(node.peers())).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use std::time::{Duration, Instant};

    fn app_state() -> Arc<AppState> {
        Arc::new(AppState {
            intercom: Arc::new(Intercom::in_memory(AppConfig::default())),
        })
    }

    #[tokio::test]
    async fn test_queries_answer_through_blocking_pool() {
        let state = app_state();
        let (code, Json(status)) = get_status(State(state.clone())).await;
        assert_eq!(code, StatusCode::OK);
        assert!(!status.data.unwrap().rx_running);

        let (code, Json(peers)) = rx_peers(State(state.clone())).await;
        assert_eq!(code, StatusCode::OK);
        assert!(peers.data.unwrap().peers.is_empty());

        let (code, Json(metrics)) = rx_metrics(State(state)).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(metrics.data.unwrap().packets_total, 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_query_does_not_block_runtime_while_controller_busy() {
        let state = app_state();
        let busy = state.clone();
        let held = std::thread::spawn(move || {
            busy.intercom.hold_locks_for(Duration::from_millis(300));
        });
        std::thread::sleep(Duration::from_millis(20));

        let query = tokio::spawn(get_status(State(state)));
        let ticker = Instant::now();
        tokio::time::sleep(Duration::from_millis(10)).await;
        // The runtime's only thread stayed free while the query waited.
        assert!(ticker.elapsed() < Duration::from_millis(200));

        let (code, _) = query.await.unwrap();
        assert_eq!(code, StatusCode::OK);
        held.join().unwrap();
    }
}
