use axum::body::Body;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use serde_json::{json, Value};
use tracing::info;

use super::api_key;
use crate::agents::{AnalysisOutcome, IntakeOutcome, ReportOutcome};
use crate::models::{AppState, IntakeRequest, StageResponse};
use crate::pipeline::artifacts::{CLEANED_DATA, JIRA_TICKET, PRESENTATION, PROJECT_PLAN};
use crate::pipeline::{Artifacts, Session};
use crate::types::{AppError, AppResult};

const PPTX_MIME: &str = "application/vnd.openxmlformats-officedocument.presentationml.presentation";

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/session", get(get_session))
        .route("/api/session/reset", post(reset_session))
        .route("/api/intake", post(run_intake))
        .route("/api/data", post(run_data))
        .route("/api/analysis", post(run_analysis))
        .route("/api/report", post(run_report))
        .route("/api/report/download", get(download_report))
        .route("/api/artifacts/{name}", get(get_artifact))
        .with_state(state)
}

/// Served from the published snapshot so it answers while a stage is running
async fn get_session(State(state): State<AppState>) -> Json<Session> {
    let snapshot = state.session.read().unwrap_or_else(|e| e.into_inner()).clone();
    Json(snapshot)
}

async fn reset_session(State(state): State<AppState>) -> Json<Session> {
    let mut driver = state.driver.lock().await;
    driver.reset();
    Json(driver.session().clone())
}

async fn run_intake(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<IntakeRequest>,
) -> AppResult<Json<StageResponse<IntakeOutcome>>> {
    info!(request_len = body.request.len(), "Intake requested");
    let key = api_key(&headers);
    let mut driver = state.driver.lock().await;
    let outcome = driver.intake(key.as_deref(), &body.request).await?;
    Ok(Json(StageResponse::success(driver.session().state, outcome)))
}

/// Multipart upload (field `file`) followed by the Data Engineering stage.
/// Without a file the previously uploaded dataset is cleaned again.
async fn run_data(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> AppResult<Json<StageResponse<Value>>> {
    let mut upload: Option<Bytes> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidRequest(format!("bad multipart body: {}", e)))?
    {
        if field.name() == Some("file") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::InvalidRequest(format!("failed to read upload: {}", e)))?;
            upload = Some(bytes);
        }
    }

    let key = api_key(&headers);
    let mut driver = state.driver.lock().await;
    let uploaded = match upload {
        Some(bytes) => Some(driver.upload_data(&bytes)?),
        None => None,
    };
    let outcome = driver.clean_data(key.as_deref()).await?;

    let result = json!({ "upload": uploaded, "data": outcome });
    Ok(Json(StageResponse::success(driver.session().state, result)))
}

async fn run_analysis(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<StageResponse<AnalysisOutcome>>> {
    let key = api_key(&headers);
    let mut driver = state.driver.lock().await;
    let outcome = driver.analyze(key.as_deref()).await?;
    Ok(Json(StageResponse::success(driver.session().state, outcome)))
}

async fn run_report(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<StageResponse<ReportOutcome>>> {
    let key = api_key(&headers);
    let mut driver = state.driver.lock().await;
    let outcome = driver.report(key.as_deref()).await?;
    Ok(Json(StageResponse::success(driver.session().state, outcome)))
}

async fn download_report(State(state): State<AppState>) -> AppResult<Response> {
    let path = workspace(&state)
        .require(PRESENTATION)
        .map_err(|_| AppError::NotFound("no presentation has been generated yet".to_string()))?;
    let bytes = tokio::fs::read(&path).await?;

    let disposition = format!("attachment; filename=\"{}\"", PRESENTATION);
    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(PPTX_MIME)),
            (
                header::CONTENT_DISPOSITION,
                HeaderValue::from_str(&disposition).map_err(|e| AppError::Internal(e.to_string()))?,
            ),
        ],
        Body::from(bytes),
    )
        .into_response())
}

/// Text artifacts by short name or file name
async fn get_artifact(State(state): State<AppState>, Path(name): Path<String>) -> AppResult<Response> {
    let (file, mime) = match name.as_str() {
        "ticket" | JIRA_TICKET => (JIRA_TICKET, "text/plain; charset=utf-8"),
        "plan" | PROJECT_PLAN => (PROJECT_PLAN, "text/markdown; charset=utf-8"),
        "cleaned" | CLEANED_DATA => (CLEANED_DATA, "text/csv; charset=utf-8"),
        other => return Err(AppError::NotFound(format!("unknown artifact '{}'", other))),
    };
    let artifacts = workspace(&state);
    if !artifacts.exists(file) {
        return Err(AppError::NotFound(format!("{} has not been produced yet", file)));
    }
    let text = artifacts.read_text(file)?;
    Ok(([(header::CONTENT_TYPE, mime)], text).into_response())
}

fn workspace(state: &AppState) -> Artifacts {
    Artifacts::new(&state.config.pipeline.workspace_dir)
}
