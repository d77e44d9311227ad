// 🌐 REST API - two-phase upload/finalize over axum
//
//   POST /api/upload     multipart: file-funding, file-chick, [file-registry]
//                        → { file }                         report ready
//                        → { token, unmatched, possibleMatches }
//   POST /api/finalize   { token, matches: [{ name, id }] } → { file }
//   GET  /api/files/:name                                   download
//   GET  /api/health

use crate::error::FundingError;
use crate::ingest::Table;
use crate::pipeline::{Pipeline, PipelineOutcome};
use crate::reconciliation::{CorrectionRequest, ManualMatch};
use crate::report::{write_xlsx_file, ReportTable};
use crate::session::{InMemoryScratchStore, ScratchStore};
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;
const DOWNLOAD_NAME: &str = "funding_data_summary.xlsx";
const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Pipeline,
    pub store: Arc<Mutex<InMemoryScratchStore<ReportTable>>>,
    pub output_dir: PathBuf,
    /// Rendered workbooks older than this are deleted on the next render
    pub file_ttl: Duration,
}

impl AppState {
    pub fn new(pipeline: Pipeline, store: InMemoryScratchStore<ReportTable>, output_dir: PathBuf) -> Self {
        AppState {
            pipeline,
            file_ttl: store.ttl().to_std().unwrap_or_default(),
            store: Arc::new(Mutex::new(store)),
            output_dir,
        }
    }
}

// ============================================================================
// Responses & errors
// ============================================================================

/// API Response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum UploadResponse {
    Complete {
        file: String,
    },
    NeedsCorrection {
        token: Uuid,
        #[serde(flatten)]
        request: CorrectionRequest,
    },
}

#[derive(Debug, Deserialize)]
pub struct FinalizeRequest {
    pub token: Uuid,
    #[serde(default)]
    pub matches: Vec<ManualMatch>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Funding(#[from] FundingError),
    #[error("Not Found")]
    NotFound,
    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Funding(FundingError::SessionNotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Funding(e) if e.is_data_quality() => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Funding(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!("request failed: {}", self);
        } else {
            warn!("request rejected: {}", self);
        }

        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(self.to_string()),
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// POST /api/upload - Build the report, or ask for name corrections
async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<ApiResponse<UploadResponse>>> {
    let mut funding: Option<Table> = None;
    let mut claims: Option<Table> = None;
    let mut registry: Option<Table> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Failed to read multipart field: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        let default_name = format!("{}.xlsx", name);
        let file_name = field
            .file_name()
            .map(str::to_string)
            .unwrap_or(default_name);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read file content: {}", e)))?;

        match name.as_str() {
            "file-funding" => funding = Some(Table::from_bytes(&file_name, &bytes)?),
            "file-chick" => claims = Some(Table::from_bytes(&file_name, &bytes)?),
            "file-registry" if !bytes.is_empty() => {
                registry = Some(Table::from_bytes(&file_name, &bytes)?)
            }
            _ => {}
        }
    }

    let funding = funding.ok_or_else(|| ApiError::BadRequest("Missing file-funding upload".to_string()))?;
    let claims = claims.ok_or_else(|| ApiError::BadRequest("Missing file-chick upload".to_string()))?;

    let response = match state.pipeline.run(&funding, &claims, registry.as_ref())? {
        PipelineOutcome::Complete(table) => UploadResponse::Complete {
            file: render(&state, &table)?,
        },
        PipelineOutcome::NeedsCorrection { table, request } => {
            let mut store = state
                .store
                .lock()
                .map_err(|_| ApiError::Internal("scratch store unavailable".to_string()))?;
            let token = store.put(table, Utc::now());
            info!(%token, unmatched = request.unmatched.len(), "upload awaiting name corrections");
            UploadResponse::NeedsCorrection { token, request }
        }
    };

    Ok(Json(ApiResponse::ok(response)))
}

/// POST /api/finalize - Apply manual matches to a pending upload
async fn finalize(
    State(state): State<AppState>,
    Json(request): Json<FinalizeRequest>,
) -> ApiResult<Json<ApiResponse<UploadResponse>>> {
    let table = {
        let mut store = state
            .store
            .lock()
            .map_err(|_| ApiError::Internal("scratch store unavailable".to_string()))?;
        store.take(&request.token, Utc::now())?
    };

    let table = Pipeline::finalize(table, &request.matches);
    let file = render(&state, &table)?;

    Ok(Json(ApiResponse::ok(UploadResponse::Complete { file })))
}

/// GET /api/files/:name - Download a rendered workbook
async fn download(State(state): State<AppState>, Path(name): Path<String>) -> ApiResult<Response> {
    // Decode URL-encoded filename
    let name = urlencoding::decode(&name)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| name.clone());

    let valid = name.ends_with(".xlsx")
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains("..");
    if !valid {
        return Err(ApiError::NotFound);
    }

    let bytes = std::fs::read(state.output_dir.join(&name)).map_err(|_| ApiError::NotFound)?;

    Ok((
        [
            (header::CONTENT_TYPE, XLSX_CONTENT_TYPE.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", DOWNLOAD_NAME),
            ),
        ],
        bytes,
    )
        .into_response())
}

/// GET / - Serve the upload page
async fn serve_index() -> impl IntoResponse {
    Html(include_str!("../web/index.html"))
}

/// Write the workbook under a fresh name and return its download path
fn render(state: &AppState, table: &ReportTable) -> ApiResult<String> {
    std::fs::create_dir_all(&state.output_dir)
        .map_err(|e| ApiError::Internal(format!("Failed to create output directory: {}", e)))?;
    purge_rendered(&state.output_dir, state.file_ttl, SystemTime::now());

    let file_name = format!("{}.xlsx", Uuid::new_v4());
    write_xlsx_file(table, Local::now().naive_local(), &state.output_dir.join(&file_name))?;
    info!(file = %file_name, rows = table.rows.len(), "report written");

    Ok(format!("/api/files/{}", file_name))
}

/// Delete `.xlsx` files in `dir` last modified more than `max_age` before `now`
fn purge_rendered(dir: &std::path::Path, max_age: Duration, now: SystemTime) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("xlsx") {
            continue;
        }

        let expired = entry
            .metadata()
            .and_then(|meta| meta.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .map(|age| age > max_age)
            .unwrap_or(false);
        if !expired {
            continue;
        }

        match std::fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) => warn!(file = %path.display(), "failed to remove expired workbook: {}", e),
        }
    }

    if removed > 0 {
        info!(removed, "purged expired workbooks");
    }
    removed
}

// ============================================================================
// Router
// ============================================================================

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/upload", post(upload))
        .route("/finalize", post(finalize))
        .route("/files/:name", get(download))
        .with_state(state);

    Router::new()
        .route("/", get(serve_index))
        .nest("/api", api_routes)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
}

// ============================================================================
// Tests
// ============================================================================
