use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    bucket_counts, flush, health_check, list_events, list_keys, record_event, stats, total_count,
    AppState,
};
use crate::recorder::{Recorder, RecorderConfig};
use crate::scheduler::DEFAULT_FLUSH_INTERVAL;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_file: PathBuf,
    pub flush_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            data_file: PathBuf::from("./tally_data/events.bin"),
            flush_interval: DEFAULT_FLUSH_INTERVAL,
        }
    }
}

/// Build the application router
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Events
        .route("/events", post(record_event))
        .route("/events", get(list_keys))
        .route("/events/:key", get(list_events))
        .route("/events/:key/count", get(total_count))
        .route("/events/:key/buckets/:granularity", get(bucket_counts))
        // Persistence & stats
        .route("/flush", post(flush))
        .route("/stats", get(stats))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the HTTP server
pub async fn run_server(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let recorder_config =
        RecorderConfig::new(&config.data_file).with_flush_interval(config.flush_interval);
    let recorder = Arc::new(Recorder::open(recorder_config)?);

    if recorder.load_outcome().is_discarded() {
        tracing::warn!(
            "Previous data in {} could not be loaded: {:?}",
            config.data_file.display(),
            recorder.load_outcome()
        );
    }

    let state = Arc::new(AppState {
        recorder: Arc::clone(&recorder),
    });
    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("Starting Tally server on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(Arc::clone(&recorder)))
        .await?;

    // Persist whatever the worker has not flushed yet
    let final_recorder = Arc::clone(&recorder);
    match tokio::task::spawn_blocking(move || final_recorder.flush_now()).await? {
        Ok(outcome) => tracing::info!("Final flush: {:?}", outcome),
        Err(e) => tracing::error!("Final flush failed: {}", e),
    }

    tracing::info!("Tally server stopped");
    Ok(())
}

async fn shutdown_signal(recorder: Arc<Recorder>) {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C signal handler");

    tracing::info!("Shutdown signal received, stopping flush worker...");
    recorder.stop();
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use crate::data::Value;
    use tempfile::TempDir;
    use tower::util::ServiceExt;

    fn create_test_app(dir: &TempDir) -> (Router, Arc<Recorder>) {
        let config = RecorderConfig::new(dir.path().join("events.bin"));
        let recorder = Arc::new(Recorder::open(config).unwrap());
        let state = Arc::new(AppState {
            recorder: Arc::clone(&recorder),
        });
        (build_router(state), recorder)
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let temp_dir = TempDir::new().unwrap();
        let (app, _) = create_test_app(&temp_dir);

        let response = app.oneshot(get_request("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_record_and_count() {
        let temp_dir = TempDir::new().unwrap();
        let (app, recorder) = create_test_app(&temp_dir);

        for ts in [1_700_000_000, 1_700_086_400] {
            let body = serde_json::json!({
                "key": "login",
                "timestamp": ts,
                "value": {"type": "int", "value": 1}
            });
            let response = app.clone().oneshot(post_json("/events", body)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app.clone().oneshot(get_request("/events/login/count")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["total"], 2);

        let response = app
            .clone()
            .oneshot(get_request("/events/login/buckets/day?at=1700000000"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["buckets"][0]["count"], 1);

        let response = app.oneshot(get_request("/events/login")).await.unwrap();
        let json = body_json(response).await;
        assert_eq!(json["events"].as_array().unwrap().len(), 2);
        assert_eq!(json["events"][0]["timestamp"], 1_700_000_000);
        assert_eq!(json["events"][0]["value"]["type"], "int");

        assert_eq!(recorder.total_count("login"), 2);
    }

    #[tokio::test]
    async fn test_type_mismatch_conflict() {
        let temp_dir = TempDir::new().unwrap();
        let (app, _) = create_test_app(&temp_dir);

        let first = serde_json::json!({"key": "k", "timestamp": 1, "value": {"type": "bool", "value": true}});
        let response = app.clone().oneshot(post_json("/events", first)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let second = serde_json::json!({"key": "k", "timestamp": 2, "value": {"type": "string", "value": "x"}});
        let response = app.oneshot(post_json("/events", second)).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_unknown_key() {
        let temp_dir = TempDir::new().unwrap();
        let (app, _) = create_test_app(&temp_dir);

        let response = app.clone().oneshot(get_request("/events/missing")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app.oneshot(get_request("/events/missing/count")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["total"], 0);
    }

    #[tokio::test]
    async fn test_bad_granularity() {
        let temp_dir = TempDir::new().unwrap();
        let (app, _) = create_test_app(&temp_dir);

        let response = app
            .oneshot(get_request("/events/login/buckets/week"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_flush_endpoint() {
        let temp_dir = TempDir::new().unwrap();
        let (app, recorder) = create_test_app(&temp_dir);

        recorder.record_event("k", 1000, Value::I64(1)).unwrap();

        let response = app
            .clone()
            .oneshot(Request::builder().method("POST").uri("/flush").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["written"], true);
        assert!(temp_dir.path().join("events.bin").exists());

        let response = app.oneshot(get_request("/stats")).await.unwrap();
        let json = body_json(response).await;
        assert_eq!(json["keys"], 1);
        assert_eq!(json["dirty"], false);
        assert_eq!(json["load"]["status"], "missing");
    }
}
