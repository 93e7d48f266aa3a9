//! HTTP surface over [`Pipeline`].
//!
//! | Method | Path | Response |
//! |--------|------|----------|
//! | `GET`  | `/health`  | `200 OK` plain text |
//! | `POST` | `/convert` | `200` + [`ConversionResult`] JSON, or an error envelope |
//!
//! Error envelope:
//!
//! ```json
//! {"success": false, "error": "validation", "message": "Invalid request: editionId is required"}
//! ```
//!
//! The status code comes from [`ErrorKind::status_code`]. When an API secret
//! is configured every `/convert` call must carry it in `x-api-secret`.

use crate::convert::Pipeline;
use crate::error::{ConversionError, ErrorKind};
use crate::output::ConversionResult;
use crate::request::ConversionRequest;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Header carrying the shared secret.
pub const SECRET_HEADER: &str = "x-api-secret";

/// Shared, immutable server state.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    /// `None` disables the secret check.
    pub api_secret: Option<String>,
}

impl AppState {
    pub fn new(pipeline: Pipeline, api_secret: Option<String>) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            api_secret: api_secret.filter(|s| !s.is_empty()),
        }
    }
}

/// Build the router with tracing attached.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/convert", post(convert))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

async fn convert(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ConversionResult>, ApiError> {
    authorize(state.api_secret.as_deref(), &headers)?;

    // Parsed by hand so malformed bodies share the error envelope.
    let request: ConversionRequest = serde_json::from_slice(&body)
        .map_err(|e| ConversionError::Validation(format!("malformed JSON body: {e}")))?;

    let result = state.pipeline.convert(&request).await?;
    info!(
        edition_id = %result.edition_id,
        pages = result.total_pages,
        "Conversion request served"
    );
    Ok(Json(result))
}

fn authorize(expected: Option<&str>, headers: &HeaderMap) -> Result<(), ConversionError> {
    let Some(expected) = expected else {
        return Ok(());
    };
    match headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok()) {
        Some(given) if given == expected => Ok(()),
        Some(_) => Err(ConversionError::Authorization(format!("{SECRET_HEADER} does not match"))),
        None => Err(ConversionError::Authorization(format!("missing {SECRET_HEADER} header"))),
    }
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: ErrorKind,
    message: String,
}

/// [`ConversionError`] rendered as the JSON error envelope.
pub struct ApiError(pub ConversionError);

impl From<ConversionError> for ApiError {
    fn from(e: ConversionError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status =
            StatusCode::from_u16(kind.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            error!("Conversion failed ({}): {}", kind, self.0);
        } else {
            warn!("Conversion rejected ({}): {}", kind, self.0);
        }

        let body = Json(ErrorBody {
            success: false,
            error: kind,
            message: self.0.to_string(),
        });
        (status, body).into_response()
    }
}
