use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio_stream::StreamExt;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::error::MonitorError;
use crate::monitor::service::{parse_date, parse_product_index};
use crate::monitor::{BulletinMonitor, BulletinStatus, LogSummary, StyledLine};

#[derive(Clone)]
pub struct DashboardState {
    pub monitor: Arc<BulletinMonitor>,
}

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    message: String,
}

/// JSON error body with a status code derived from the error kind.
pub struct ApiError(pub MonitorError);

impl From<MonitorError> for ApiError {
    fn from(e: MonitorError) -> Self {
        Self(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            MonitorError::NotFound(_) => StatusCode::NOT_FOUND,
            MonitorError::BadRequest(_) | MonitorError::Template(_) => StatusCode::BAD_REQUEST,
            MonitorError::SessionInactive(_)
            | MonitorError::Connectivity(_)
            | MonitorError::Authentication(_) => StatusCode::SERVICE_UNAVAILABLE,
            MonitorError::Remote(_) => StatusCode::BAD_GATEWAY,
            MonitorError::Configuration(_) | MonitorError::Io(_) | MonitorError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self.0 {
            MonitorError::NotFound(m) | MonitorError::BadRequest(m) => m.clone(),
            other => other.to_string(),
        };
        tracing::warn!(status = %status, error = %self.0, "API request failed");
        (
            status,
            Json(ErrorResponse {
                success: false,
                message,
            }),
        )
            .into_response()
    }
}

#[derive(Serialize)]
struct SessionResponse {
    active: bool,
    target: String,
}

#[derive(Serialize)]
struct FullLogResponse {
    bulletin_id: String,
    name: String,
    full_log: String,
    lines: Vec<StyledLine>,
}

#[derive(Serialize)]
struct RerunResponse {
    success: bool,
    message: String,
    output: String,
    error: Option<String>,
}

#[derive(Deserialize)]
struct DownloadParams {
    index: Option<String>,
    date: Option<String>,
}

pub fn router(state: DashboardState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(index_handler))
        .route("/api/session", get(session_handler))
        .route("/api/bulletins", get(list_bulletins_handler))
        .route("/api/bulletins/{id}/log", get(log_summary_handler))
        .route("/api/bulletins/{id}/full_log", get(full_log_handler))
        .route("/api/bulletins/{id}/rerun", post(rerun_handler))
        .route(
            "/api/bulletins/{id}/download_product",
            get(download_product_handler),
        )
        .layer(cors)
        .with_state(state)
}

pub async fn run_dashboard(addr: SocketAddr, state: DashboardState, shutdown: CancellationToken) {
    let app = router(state);

    tracing::info!(addr = %addr, "Starting dashboard server");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "Failed to bind dashboard server");
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
    {
        tracing::error!(error = %e, "Dashboard server failed");
    }
}

async fn index_handler() -> Html<&'static str> {
    Html(include_str!("index.html"))
}

async fn session_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    let session = state.monitor.session();
    Json(SessionResponse {
        active: session.is_active().await,
        target: session.target().to_string(),
    })
}

async fn list_bulletins_handler(State(state): State<DashboardState>) -> Json<Vec<BulletinStatus>> {
    tracing::info!("Listing bulletin statuses");
    Json(state.monitor.list_bulletin_statuses().await)
}

async fn log_summary_handler(
    State(state): State<DashboardState>,
    Path(id): Path<String>,
) -> Result<Json<LogSummary>, ApiError> {
    Ok(Json(state.monitor.get_log_summary(&id).await?))
}

async fn full_log_handler(
    State(state): State<DashboardState>,
    Path(id): Path<String>,
) -> Result<Json<FullLogResponse>, ApiError> {
    let full = state.monitor.get_full_log(&id).await?;
    Ok(Json(FullLogResponse {
        full_log: full.log.to_html(),
        bulletin_id: full.bulletin_id,
        name: full.name,
        lines: full.log.lines,
    }))
}

async fn rerun_handler(
    State(state): State<DashboardState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<RerunResponse>), ApiError> {
    let result = state.monitor.trigger_rerun(&id).await?;
    let name = state
        .monitor
        .config()
        .find_bulletin(&id)
        .map(|b| b.name.clone())
        .unwrap_or(id);

    if result.success {
        Ok((
            StatusCode::OK,
            Json(RerunResponse {
                success: true,
                message: format!("Bulletin '{}' re-run command sent successfully.", name),
                output: result.stdout,
                error: None,
            }),
        ))
    } else {
        Ok((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(RerunResponse {
                success: false,
                message: format!("Failed to send re-run command for '{}'.", name),
                output: result.stdout,
                error: Some(result.stderr),
            }),
        ))
    }
}

async fn download_product_handler(
    State(state): State<DashboardState>,
    Path(id): Path<String>,
    Query(params): Query<DownloadParams>,
) -> Result<Response, ApiError> {
    let index = parse_product_index(params.index.as_deref())?;
    let date = parse_date(params.date.as_deref())?;

    let product = state.monitor.download_product(&id, index, date).await?;
    let disposition = format!(
        "attachment; filename=\"{}\"",
        product.file_name.replace(['"', '\\'], "_")
    );

    // The temp dir moves into the stream and is removed once the body is dropped.
    let temp_dir = product.temp_dir;
    let stream = ReaderStream::new(product.file).map(move |chunk| {
        let _keep = &temp_dir;
        chunk
    });

    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_LENGTH, product.size.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}
