//! Dashboard: read-only Axum REST surface over the latest tick.
//!
//! CORS allows GET from any origin for local monitoring tools.

pub mod routes;

use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderValue, Method},
    routing::get,
    Router,
};
use tower_http::cors::CorsLayer;
use tracing::{error, info};

pub use routes::{AppState, DashboardState, DashboardUpdate, TickStatus};

/// Start the dashboard web server.
///
/// Binds before returning so a port conflict surfaces at startup; serving
/// then continues on a background task.
pub async fn spawn_dashboard(state: AppState, port: u16) -> Result<()> {
    let app = build_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind dashboard port {port}"))?;
    info!(port, "Dashboard server starting on http://localhost:{port}");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "Dashboard server error");
        }
    });

    Ok(())
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_static("*"))
        .allow_methods([Method::GET])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/api/status", get(routes::get_status))
        .route("/api/portfolio", get(routes::get_portfolio))
        .route("/api/strategies", get(routes::get_strategies))
        .route("/api/chains", get(routes::get_chains))
        .route("/api/opportunities", get(routes::get_opportunities))
        .route("/health", get(routes::health))
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChainDescriptor;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        Arc::new(DashboardState::new(vec![ChainDescriptor::sample(196, "X Layer Mainnet")]))
    }

    async fn get_json(uri: &str) -> serde_json::Value {
        let app = build_router(test_state());
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = axum::body::to_bytes(resp.into_body(), 100_000).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = build_router(test_state());
        let resp = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_status_endpoint() {
        let json = get_json("/api/status").await;
        assert_eq!(json["tick_count"], 0);
        assert_eq!(json["chains_registered"], 1);
        assert!(json["snapshot_age_secs"].is_null());
    }

    #[tokio::test]
    async fn test_portfolio_endpoint() {
        let json = get_json("/api/portfolio").await;
        assert!(json["chains"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_strategies_endpoint() {
        let json = get_json("/api/strategies").await;
        assert!(json.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_chains_endpoint() {
        let json = get_json("/api/chains").await;
        assert_eq!(json[0]["chain_id"], 196);
        assert_eq!(json[0]["name"], "X Layer Mainnet");
    }

    #[tokio::test]
    async fn test_opportunities_endpoint() {
        let json = get_json("/api/opportunities").await;
        assert!(json.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_route_404() {
        let app = build_router(test_state());
        let resp = app
            .oneshot(Request::builder().uri("/api/trades").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_cors_headers() {
        let app = build_router(test_state());
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/api/status")
                    .header(header::ORIGIN, "http://localhost:3000")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "*"
        );
    }
}
