//! HTTP interface of the export service.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::catalog::{DatasetDescriptor, FormatDescriptor};
use crate::jobs::ExportService;
use crate::records::Facility;
use crate::schema::{
    EstimateRequest, ExportEstimate, ExportHistoryEntry, ExportJob, ExportRequest, ExportStatus,
};

type HandlerError = (StatusCode, String);

/// Build the router with tracing and permissive CORS for the browser console.
pub fn router(service: ExportService) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/datasets", get(list_datasets))
        .route("/datasets/:id", get(get_dataset))
        .route("/formats", get(list_formats))
        .route("/formats/:id", get(get_format))
        .route("/facilities", get(list_facilities))
        .route("/estimates", post(estimate))
        .route("/exports", get(recent_exports).post(request_export))
        .route("/exports/:id", get(get_export))
        .route("/exports/:id/download", get(download_export))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(service)
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

async fn list_datasets(State(service): State<ExportService>) -> Json<Vec<DatasetDescriptor>> {
    Json(service.list_datasets())
}

async fn get_dataset(
    State(service): State<ExportService>,
    Path(id): Path<String>,
) -> Result<Json<DatasetDescriptor>, HandlerError> {
    service
        .catalog()
        .dataset(&id)
        .cloned()
        .map(Json)
        .map_err(HandlerError::from)
}

async fn list_formats(State(service): State<ExportService>) -> Json<Vec<FormatDescriptor>> {
    Json(service.list_formats())
}

async fn get_format(
    State(service): State<ExportService>,
    Path(id): Path<String>,
) -> Result<Json<FormatDescriptor>, HandlerError> {
    service
        .catalog()
        .format(&id)
        .map(Json)
        .map_err(|e| (StatusCode::NOT_FOUND, e.to_string()))
}

async fn list_facilities(State(service): State<ExportService>) -> Json<Vec<Facility>> {
    Json(service.facilities())
}

async fn estimate(
    State(service): State<ExportService>,
    Json(request): Json<EstimateRequest>,
) -> Result<Json<ExportEstimate>, HandlerError> {
    service.estimate(&request).await.map(Json).map_err(|e| {
        warn!("Estimate for {} rejected: {}", request.dataset_id, e);
        HandlerError::from(e)
    })
}

/// Submit an export; answers 202 with the `processing` job.
async fn request_export(
    State(service): State<ExportService>,
    Json(request): Json<ExportRequest>,
) -> Result<(StatusCode, Json<ExportJob>), HandlerError> {
    let dataset_id = request.dataset_id.clone();
    match service.request_export(request) {
        Ok(job) => Ok((StatusCode::ACCEPTED, Json(job))),
        Err(e) => {
            warn!("Export request for {} rejected: {}", dataset_id, e);
            Err(e.into())
        }
    }
}

async fn get_export(
    State(service): State<ExportService>,
    Path(id): Path<String>,
) -> Result<Json<ExportJob>, HandlerError> {
    service.job(&id).map(Json).map_err(HandlerError::from)
}

async fn download_export(
    State(service): State<ExportService>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, HandlerError> {
    let job = service.job(&id)?;
    match job.status {
        ExportStatus::Completed => {}
        ExportStatus::Processing => {
            return Err((
                StatusCode::CONFLICT,
                format!("Export {} is still processing", id),
            ))
        }
        ExportStatus::Failed => {
            return Err((
                StatusCode::GONE,
                format!("Export {} failed: {}", id, job.error.unwrap_or_default()),
            ))
        }
    }

    let artifact = service.artifact(&id).map_err(|e| {
        error!("Completed export {} has no artifact", id);
        HandlerError::from(e)
    })?;

    info!("Serving export {} ({} bytes)", id, artifact.size());
    Ok((
        [
            (header::CONTENT_TYPE, artifact.mime_type.clone()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", artifact.file_name),
            ),
        ],
        artifact.bytes.to_vec(),
    ))
}

async fn recent_exports(State(service): State<ExportService>) -> Json<Vec<ExportHistoryEntry>> {
    Json(service.recent_exports())
}

