//! Queue-wide and per-job handlers.

use super::{AddJobRequest, SetPriorityRequest};
use crate::api::AppState;
use crate::error::Error;
use crate::types::JobId;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use std::path::PathBuf;

const FOLDER_PREFIX: &str = "FOLDER:";

/// GET /queue - List every job across pending/running/completed/errored
#[utoipa::path(
    get,
    path = "/api/v1/queue",
    tag = "queue",
    responses(
        (status = 200, description = "All known jobs", body = [crate::types::QueueItem]),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn list_queue(State(state): State<AppState>) -> impl IntoResponse {
    match state.processor.queue_items().await {
        Ok(items) => Json(items).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /queue/stats - Row counts per queue state
#[utoipa::path(
    get,
    path = "/api/v1/queue/stats",
    tag = "queue",
    responses(
        (status = 200, description = "Queue statistics", body = crate::queue::QueueStats),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn queue_stats(State(state): State<AppState>) -> impl IntoResponse {
    match state.processor.queue_stats().await {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /queue/running - Detail on jobs currently processing
#[utoipa::path(
    get,
    path = "/api/v1/queue/running",
    tag = "queue",
    responses(
        (status = 200, description = "Running job details", body = [crate::types::RunningJobDetails])
    )
)]
pub async fn list_running(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.processor.running_jobs().await)
}

/// POST /queue - Enqueue a file or folder by path
#[utoipa::path(
    post,
    path = "/api/v1/queue",
    tag = "queue",
    request_body = AddJobRequest,
    responses(
        (status = 201, description = "Job enqueued", body = crate::types::JobId),
        (status = 400, description = "Path does not exist or is not a regular file/directory"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn add_job(
    State(state): State<AppState>,
    Json(request): Json<AddJobRequest>,
) -> impl IntoResponse {
    let source = PathBuf::from(&request.path);

    let size = if request.folder {
        match fold_size(&source).await {
            Ok(size) => size,
            Err(e) => return e.into_response(),
        }
    } else {
        match tokio::fs::metadata(&source).await {
            Ok(metadata) if metadata.is_file() => metadata.len(),
            Ok(_) => {
                return Error::InvalidJob(format!("{} is not a regular file", source.display()))
                    .into_response();
            }
            Err(e) => return Error::Io(e).into_response(),
        }
    };

    let enqueue_path = if request.folder {
        PathBuf::from(format!("{FOLDER_PREFIX}{}", source.display()))
    } else {
        source
    };

    match state
        .processor
        .add_file(enqueue_path, size, request.priority)
        .await
    {
        Ok(id) => (StatusCode::CREATED, Json(id)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn fold_size(dir: &std::path::Path) -> crate::error::Result<u64> {
    let mut total = 0u64;
    let mut entries = tokio::fs::read_dir(dir).await.map_err(Error::Io)?;
    while let Some(entry) = entries.next_entry().await.map_err(Error::Io)? {
        let metadata = entry.metadata().await.map_err(Error::Io)?;
        if metadata.is_file() {
            total += metadata.len();
        }
    }
    Ok(total)
}

/// POST /queue/:id/retry - Move an errored job back to pending
#[utoipa::path(
    post,
    path = "/api/v1/queue/{id}/retry",
    tag = "queue",
    params(("id" = i64, Path, description = "Job id")),
    responses(
        (status = 204, description = "Job requeued"),
        (status = 404, description = "Job not found in errored state"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn retry_job(State(state): State<AppState>, Path(id): Path<i64>) -> impl IntoResponse {
    match state.processor.retry_job(JobId::new(id)).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}

/// DELETE /queue/:id - Remove a job from whichever table holds it
#[utoipa::path(
    delete,
    path = "/api/v1/queue/{id}",
    tag = "queue",
    params(("id" = i64, Path, description = "Job id")),
    responses(
        (status = 204, description = "Job removed"),
        (status = 404, description = "Job not found"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn remove_job(State(state): State<AppState>, Path(id): Path<i64>) -> impl IntoResponse {
    match state.processor.remove_job(JobId::new(id)).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}

/// PATCH /queue/:id/priority - Change a pending job's priority
#[utoipa::path(
    patch,
    path = "/api/v1/queue/{id}/priority",
    tag = "queue",
    params(("id" = i64, Path, description = "Job id")),
    request_body = SetPriorityRequest,
    responses(
        (status = 204, description = "Priority updated"),
        (status = 404, description = "Job not found in pending state"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn set_priority(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<SetPriorityRequest>,
) -> impl IntoResponse {
    match state
        .processor
        .set_priority(JobId::new(id), request.priority)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /queue/pause - Pause dequeuing of new jobs
#[utoipa::path(
    post,
    path = "/api/v1/queue/pause",
    tag = "queue",
    responses((status = 204, description = "Dequeuing paused"))
)]
pub async fn pause_queue(State(state): State<AppState>) -> impl IntoResponse {
    state.processor.pause();
    StatusCode::NO_CONTENT
}

/// POST /queue/resume - Resume dequeuing
#[utoipa::path(
    post,
    path = "/api/v1/queue/resume",
    tag = "queue",
    responses((status = 204, description = "Dequeuing resumed"))
)]
pub async fn resume_queue(State(state): State<AppState>) -> impl IntoResponse {
    state.processor.resume();
    StatusCode::NO_CONTENT
}
