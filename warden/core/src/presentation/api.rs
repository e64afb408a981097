// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! HTTP API
//!
//! JSON endpoints over the warden services. Every failure is returned as
//! `{"error": <message>, "kind": <error kind>}`.

use crate::application::WardenServices;
use crate::domain::certificate::CertificateError;
use crate::domain::error::ErrorKind;
use crate::domain::issuance::{IssuanceError, IssuanceRequest};
use crate::domain::storage::StorageError;
use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

pub struct AppState {
    pub services: WardenServices,
    pub start_time: Instant,
}

pub fn app(services: WardenServices) -> Router {
    let state = Arc::new(AppState {
        services,
        start_time: Instant::now(),
    });

    Router::new()
        .route("/health", get(health))
        .route("/api/files", get(list_files))
        .route("/api/file/read", get(read_file))
        .route("/api/file/write", post(write_file))
        .route("/api/file/create", post(create_file))
        .route("/api/file/delete", post(delete_file))
        .route("/api/file/rename", post(rename_file))
        .route("/api/file/move", post(move_file))
        .route("/api/file/symlink", post(create_symlink))
        .route("/api/nginx/test", post(nginx_test))
        .route("/api/nginx/reload", post(nginx_reload))
        .route("/api/logs/access", get(access_log))
        .route("/api/logs/error", get(error_log))
        .route("/api/logs/cert-obtain", get(operation_log))
        .route("/api/certificates", get(list_certificates))
        .route("/api/certificates/obtain", post(obtain_certificate))
        .route("/api/certificates/delete", post(delete_certificate))
        .with_state(state)
}

/// Error response carrying a machine-readable kind
#[derive(Debug)]
pub struct ApiError {
    kind: ErrorKind,
    message: String,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    fn status(&self) -> StatusCode {
        match self.kind {
            ErrorKind::SandboxViolation | ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
            ErrorKind::ExternalProcessTimeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::ExternalProcessFailure
            | ErrorKind::PartialArtifactFailure
            | ErrorKind::IoError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(kind = %self.kind, "Request failed: {}", self.message);
        }
        (
            status,
            Json(json!({ "error": self.message, "kind": self.kind })),
        )
            .into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        Self::new(e.kind(), e.to_string())
    }
}

impl From<CertificateError> for ApiError {
    fn from(e: CertificateError) -> Self {
        Self::new(e.kind(), e.to_string())
    }
}

impl From<IssuanceError> for ApiError {
    fn from(e: IssuanceError) -> Self {
        Self::new(e.kind(), e.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        Self::new(ErrorKind::InvalidRequest, format!("Invalid request: {}", e.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(e: QueryRejection) -> Self {
        Self::new(ErrorKind::InvalidRequest, format!("Invalid query: {}", e.body_text()))
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn ok() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

fn plain_text(body: impl Into<axum::body::Body>) -> Response {
    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body.into()).into_response()
}

#[derive(Deserialize)]
struct PathQuery {
    #[serde(default)]
    path: Option<String>,
}

#[derive(Deserialize)]
struct LinesQuery {
    #[serde(default)]
    lines: Option<usize>,
}

#[derive(Deserialize)]
struct WriteRequest {
    path: String,
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateRequest {
    path: String,
    #[serde(default)]
    is_dir: bool,
}

#[derive(Deserialize)]
struct DeleteRequest {
    path: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenameRequest {
    old_path: String,
    new_path: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MoveRequest {
    source_path: String,
    target_path: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymlinkRequest {
    link_path: String,
    target_path: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteCertificateRequest {
    #[serde(default)]
    cert_file: String,
    #[serde(default)]
    key_file: Option<String>,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "uptime_seconds": state.start_time.elapsed().as_secs(),
    }))
}

async fn list_files(
    State(state): State<Arc<AppState>>,
    query: Result<Query<PathQuery>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let Query(query) = query?;
    let path = query.path.filter(|p| !p.is_empty()).unwrap_or_else(|| "/".to_string());
    let entries = state.services.files.list(&path).await?;
    Ok(Json(entries))
}

async fn read_file(
    State(state): State<Arc<AppState>>,
    query: Result<Query<PathQuery>, QueryRejection>,
) -> ApiResult<Response> {
    let Query(query) = query?;
    let path = query
        .path
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::new(ErrorKind::InvalidRequest, "Path is required"))?;
    let content = state.services.files.read(&path).await?;
    Ok(plain_text(content))
}

async fn write_file(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<WriteRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = payload?;
    state
        .services
        .files
        .write(&req.path, req.content.as_bytes())
        .await?;
    Ok(ok())
}

async fn create_file(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = payload?;
    state.services.files.create(&req.path, req.is_dir).await?;
    Ok(ok())
}

async fn delete_file(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<DeleteRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = payload?;
    state.services.files.delete(&req.path).await?;
    Ok(ok())
}

async fn rename_file(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RenameRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = payload?;
    state
        .services
        .files
        .rename(&req.old_path, &req.new_path)
        .await?;
    Ok(ok())
}

async fn move_file(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<MoveRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = payload?;
    let landed = state
        .services
        .files
        .move_entry(&req.source_path, &req.target_path)
        .await?;
    Ok(Json(json!({ "status": "ok", "path": landed })))
}

async fn create_symlink(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SymlinkRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = payload?;
    state
        .services
        .files
        .create_symlink(&req.link_path, &req.target_path)
        .await?;
    Ok(ok())
}

async fn nginx_test(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.services.nginx.test().await)
}

async fn nginx_reload(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.services.nginx.reload().await)
}

async fn access_log(
    State(state): State<Arc<AppState>>,
    query: Result<Query<LinesQuery>, QueryRejection>,
) -> ApiResult<Response> {
    let Query(query) = query?;
    Ok(plain_text(state.services.logs.access_log(query.lines).await))
}

async fn error_log(
    State(state): State<Arc<AppState>>,
    query: Result<Query<LinesQuery>, QueryRejection>,
) -> ApiResult<Response> {
    let Query(query) = query?;
    Ok(plain_text(state.services.logs.error_log(query.lines).await))
}

async fn operation_log(
    State(state): State<Arc<AppState>>,
    query: Result<Query<LinesQuery>, QueryRejection>,
) -> ApiResult<Response> {
    let Query(query) = query?;
    Ok(plain_text(state.services.logs.operation_log(query.lines).await))
}

async fn list_certificates(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let records = state.services.inventory.scan().await?;
    Ok(Json(records))
}

async fn obtain_certificate(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<IssuanceRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = payload?;
    let outcome = state.services.issuer.obtain(req).await?;
    Ok(Json(outcome))
}

async fn delete_certificate(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<DeleteCertificateRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = payload?;
    let report = state
        .services
        .inventory
        .delete(&req.cert_file, req.key_file.as_deref())
        .await?;
    Ok(Json(report))
}
