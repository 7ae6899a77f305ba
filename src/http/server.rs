//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the management and realtime routes
//! - Wire up middleware (tracing, timeout, CORS)
//! - Serve until shutdown is signalled

use axum::{
    routing::{delete, get},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::ApiConfig;
use crate::fanout::BroadcastSink;
use crate::http::handlers::*;
use crate::http::websocket::events_handler;
use crate::registry::ServiceStore;
use crate::resilience::BreakerBank;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: ServiceStore,
    pub breakers: Arc<BreakerBank>,
    pub sink: BroadcastSink,
}

/// HTTP server for the management API.
pub struct ApiServer {
    router: Router,
}

impl ApiServer {
    pub fn new(config: &ApiConfig, state: AppState) -> Self {
        Self {
            router: Self::build_router(config, state),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    pub fn build_router(config: &ApiConfig, state: AppState) -> Router {
        Router::new()
            .route(
                "/services",
                get(list_services).post(create_service).put(update_service),
            )
            .route("/services/{id}", delete(delete_service))
            .route("/breakers", get(list_breakers))
            .route("/status", get(get_status))
            .route("/events", get(events_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(CorsLayer::permissive())
                    .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs))),
            )
    }

    /// Serve on `listener` until shutdown.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "API server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("API server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn router() -> Router {
        let state = AppState {
            store: ServiceStore::new(None),
            breakers: Arc::new(BreakerBank::new(Default::default())),
            sink: BroadcastSink::new(8),
        };
        ApiServer::build_router(&ApiConfig::default(), state)
    }

    #[tokio::test]
    async fn test_malformed_json_is_bad_request() {
        let res = router()
            .oneshot(
                Request::post("/services")
                    .header("content-type", "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_create_then_list() {
        let app = router();
        let res = app
            .clone()
            .oneshot(
                Request::post("/services")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"name":"A","url":"http://localhost:9090/health"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);

        let res = app
            .oneshot(Request::get("/services").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = axum::body::to_bytes(res.into_body(), 64 * 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["services"][0]["name"], "A");
        assert_eq!(json["services"][0]["currentStatus"], "UNKNOWN");
    }

    #[tokio::test]
    async fn test_delete_unknown_is_not_found() {
        let res = router()
            .oneshot(Request::delete("/services/42").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
}
