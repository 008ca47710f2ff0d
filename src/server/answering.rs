// AnsweringService - local HTTP endpoint the panel sends questions to.
//
// The provider API key stays on this side of the boundary: clients only
// ever see the answer text or a generic error.

use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tower_http::cors::{Any, CorsLayer};

use super::llm::CompletionProvider;
use crate::browser::youtube::VideoContext;
use crate::error::AppError;

const DEFAULT_PORT: u16 = 8787;

struct ServiceState {
    provider: Arc<dyn CompletionProvider>,
}

/// HTTP service exposing POST /api for answering questions.
pub struct AnsweringService {
    port: u16,
    provider: Arc<dyn CompletionProvider>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl AnsweringService {
    pub fn new(port: u16, provider: Arc<dyn CompletionProvider>) -> Self {
        Self {
            port,
            provider,
            shutdown_tx: None,
        }
    }

    pub fn with_defaults(provider: Arc<dyn CompletionProvider>) -> Self {
        Self::new(DEFAULT_PORT, provider)
    }

    /// The endpoint clients should post to.
    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}/api", self.port)
    }

    pub fn is_running(&self) -> bool {
        self.shutdown_tx.is_some()
    }

    /// Bind and start serving. Returns an error if already running or if
    /// the port cannot be bound.
    pub async fn start(&mut self) -> Result<(), AppError> {
        if self.shutdown_tx.is_some() {
            return Err(AppError::AlreadyRunning("Answering service"));
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let state = Arc::new(ServiceState {
            provider: self.provider.clone(),
        });

        // Loopback only; the service is not meant to be reachable off-box.
        let addr = SocketAddr::from(([127, 0, 0, 1], self.port));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| AppError::ServerStartFailed(format!("bind {}: {}", addr, e)))?;

        let app = Router::new()
            .route("/api", post(answer))
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            )
            .with_state(state);

        eprintln!("AnsweringService: Listening on http://{}", addr);

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                    eprintln!("AnsweringService: Shutting down");
                })
                .await
                .ok();
        });

        self.shutdown_tx = Some(shutdown_tx);
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
            eprintln!("AnsweringService: Stopped");
        }
    }
}

/// POST /api handler.
///
/// Body fields are pulled out by hand so one missing or malformed field
/// maps to a 400 rather than an extractor rejection.
async fn answer(
    State(state): State<Arc<ServiceState>>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    let query = body.get("query").and_then(|q| q.as_str());
    let video_data = body
        .get("videoData")
        .cloned()
        .and_then(|v| serde_json::from_value::<VideoContext>(v).ok());

    let (query, context) = match (query, video_data) {
        (Some(query), Some(context)) if !query.is_empty() => (query.to_string(), context),
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": "Missing required parameters" })),
            )
                .into_response();
        }
    };

    match state.provider.complete(&query, &context).await {
        Ok(answer) => (StatusCode::OK, Json(serde_json::json!({ "answer": answer }))).into_response(),
        Err(detail) => {
            // Provider failures are logged here and nowhere else; the
            // client gets a fixed generic body.
            eprintln!("AnsweringService: Completion failed: {}", detail);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "Internal server error" })),
            )
                .into_response()
        }
    }
}
