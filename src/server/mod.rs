// Server module
// HTTP front end: POST /api/ (or /api) answers a question, every failure becomes `{"error": ...}`


use anyhow::{Context, Result};
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderValue, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Deserializer, Serialize};
use std::net::SocketAddr;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{error, info, warn};

use crate::answer::{Answer, Assistant, Link, QueryError};
use crate::config::Config;

#[derive(Clone)]
pub struct AppState {
    assistant: Assistant,
}

impl AppState {
    #[inline]
    pub fn new(assistant: Assistant) -> Self {
        Self { assistant }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuestionRequest {
    pub question: String,
    /// Accepted for compatibility with the course front end; not used
    #[serde(default, deserialize_with = "null_as_empty")]
    pub attachments: Vec<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Vec<String>>::deserialize(deserializer).map(Option::unwrap_or_default)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnswerResponse {
    pub answer: String,
    pub links: Vec<Link>,
}

impl From<Answer> for AnswerResponse {
    #[inline]
    fn from(answer: Answer) -> Self {
        Self {
            answer: answer.text,
            links: answer.links,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub entries: usize,
}

/// An error response: a status code and an `{"error": message}` body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl From<QueryError> for ApiError {
    #[inline]
    fn from(error: QueryError) -> Self {
        let status = match error {
            QueryError::EmptyQuestion => StatusCode::BAD_REQUEST,
            QueryError::Embedding(_) | QueryError::Generation(_) => StatusCode::BAD_GATEWAY,
            QueryError::Search(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: error.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    #[inline]
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(format!("invalid request body: {}", rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    #[inline]
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

/// Routes plus CORS for the given origins
#[inline]
pub fn router(state: AppState, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/api/", post(answer_question))
        .route("/api", post(answer_question))
        .route("/healthz", get(healthz))
        .fallback(not_found)
        .layer(cors_layer(allowed_origins))
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if allowed_origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(AllowOrigin::any());
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

/// `POST /api/`
#[inline]
pub async fn answer_question(
    State(state): State<AppState>,
    request: Result<Json<QuestionRequest>, JsonRejection>,
) -> Result<Json<AnswerResponse>, ApiError> {
    let Json(request) = request?;
    if !request.attachments.is_empty() {
        info!("Ignoring {} attachments", request.attachments.len());
    }

    match state.assistant.ask(&request.question).await {
        Ok(answer) => Ok(Json(answer.into())),
        Err(e) => {
            error!("Failed to answer question: {}", e);
            Err(e.into())
        }
    }
}

async fn not_found(uri: Uri) -> ApiError {
    ApiError::not_found(format!("no route for {}", uri.path()))
}

/// `GET /healthz`
#[inline]
pub async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        entries: state.assistant.retriever().knowledge().len(),
    })
}

/// Bind to `server.bind` and serve until Ctrl-C
#[inline]
pub async fn serve(config: &Config, assistant: Assistant) -> Result<()> {
    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("Invalid bind address {}", config.server.bind))?;
    let app = router(AppState::new(assistant), &config.server.allowed_origins);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
