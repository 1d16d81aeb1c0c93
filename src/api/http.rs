//! HTTP API Server
//!
//! REST API exposing node, peer, lease and snapshot status.

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::node::{Node, NodeStatus};
use crate::state::LeaseRecord;

/// HTTP API server
pub struct HttpServer {
    config: ApiConfig,
    node: Arc<Node>,
}

impl HttpServer {
    /// Create a new HTTP server
    pub fn new(config: ApiConfig, node: Arc<Node>) -> Self {
        Self { config, node }
    }

    /// Create the router
    fn create_router(node: Arc<Node>, cors_enabled: bool) -> Router {
        let router = Router::new()
            .route("/status", get(handle_status))
            .route("/peers", get(handle_peers))
            .route("/lease", get(handle_lease))
            .route("/health", get(handle_health));

        let router = if cors_enabled {
            router.layer(CorsLayer::permissive())
        } else {
            router
        };

        router.layer(TraceLayer::new_for_http()).with_state(node)
    }

    /// Start the HTTP server
    pub async fn start(&self) -> Result<()> {
        if !self.config.enabled {
            tracing::info!("HTTP API disabled");
            return Ok(());
        }

        let app = Self::create_router(Arc::clone(&self.node), self.config.cors_enabled);

        let listener = tokio::net::TcpListener::bind(&self.config.bind_address).await?;
        tracing::info!("HTTP API listening on {}", self.config.bind_address);

        axum::serve(listener, app)
            .await
            .map_err(|e| Error::Network(format!("HTTP server error: {}", e)))?;

        Ok(())
    }
}

/// GET /status - full node status
async fn handle_status(State(node): State<Arc<Node>>) -> Json<NodeStatus> {
    Json(node.status().await)
}

/// GET /peers - known peer endpoints
async fn handle_peers(State(node): State<Arc<Node>>) -> Json<Vec<String>> {
    let peers = node.registry().peers().await;
    Json(peers.iter().map(|p| p.to_string()).collect())
}

/// GET /lease - the lease record as this node last saw it
async fn handle_lease(State(node): State<Arc<Node>>) -> Json<Option<LeaseRecord>> {
    Json(node.status().await.lease)
}

/// GET /health - liveness probe
async fn handle_health() -> &'static str {
    "ok"
}
