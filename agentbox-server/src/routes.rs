//! HTTP route handlers for the agent API.

use std::convert::Infallible;

use agentbox::core::types::{ChangeSet, ModifiedFile};
use agentbox::error::{PipelineError, ValidationError};
use agentbox::io::commit::{CommitReport, commit};
use agentbox::io::pipeline::RunRequest;
use agentbox::io::process::{CommandSpec, ProcessRunner};
use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::state::AppState;
use crate::stream;

/// Build the API router.
pub fn api_router<R: ProcessRunner>() -> Router<AppState<R>> {
    Router::new()
        .route("/health", get(health))
        .route("/run-agent", post(run_agent::<R>))
        .route("/commit-changes", post(commit_changes::<R>))
        .route("/run-raw-command", post(run_raw_command::<R>))
}

/// Error response sent before any body bytes: `{"error": "..."}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        let status = if err.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            warn!(err = %err, "run could not be started");
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self::new(status, err.to_string())
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self::new(StatusCode::BAD_REQUEST, err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(StatusCode::BAD_REQUEST, rejection.body_text())
    }
}

async fn health() -> &'static str {
    "ok"
}

/// POST /run-agent - stream agent progress, then the change set.
async fn run_agent<R: ProcessRunner>(
    State(state): State<AppState<R>>,
    payload: Result<Json<RunRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;
    let invocation = state.pipeline.start(request).await?;
    info!(invocation = %invocation.workspace().name(), "streaming agent output");
    Ok(streaming_response(
        "application/json",
        stream::agent_records(invocation),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommitRequest {
    changes: Vec<ModifiedFile>,
    #[serde(default)]
    deletions: Vec<String>,
}

/// POST /commit-changes - apply an approved change set to the store.
///
/// Always 200 once the body parses; per-path failures are in the report.
async fn commit_changes<R: ProcessRunner>(
    State(state): State<AppState<R>>,
    payload: Result<Json<CommitRequest>, JsonRejection>,
) -> Result<Json<CommitReport>, ApiError> {
    let Json(request) = payload?;
    let changes = ChangeSet {
        modified_files: request.changes,
        deleted_files: request.deletions,
    };
    let store_root = state.store_root.clone();
    let report = tokio::task::spawn_blocking(move || commit(&store_root, &changes))
        .await
        .map_err(|err| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
struct RawCommandRequest {
    command: String,
}

/// POST /run-raw-command - run `sh -c <command>` in the store root.
async fn run_raw_command<R: ProcessRunner>(
    State(state): State<AppState<R>>,
    payload: Result<Json<RawCommandRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    if !state.raw_command_enabled {
        return Err(ApiError::new(
            StatusCode::FORBIDDEN,
            "raw commands are disabled",
        ));
    }
    let Json(request) = payload?;
    if request.command.trim().is_empty() {
        return Err(ValidationError::EmptyCommand.into());
    }

    let spec = CommandSpec::new("sh", &state.store_root).args(["-c", request.command.as_str()]);
    let process = state
        .pipeline
        .runner()
        .spawn(&spec)
        .map_err(|err| ApiError::from(PipelineError::from(err)))?;
    info!("streaming raw command output");
    Ok(streaming_response(
        "text/plain; charset=utf-8",
        stream::raw_output(process, state.pipeline.limits()),
    ))
}

fn streaming_response<S>(content_type: &'static str, body: S) -> Response
where
    S: Stream<Item = Result<Vec<u8>, Infallible>> + Send + 'static,
{
    ([(header::CONTENT_TYPE, content_type)], Body::from_stream(body)).into_response()
}
