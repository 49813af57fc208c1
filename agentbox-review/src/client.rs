//! HTTP client for the agentbox server.

use std::time::Duration;

use agentbox::core::ndjson::LineDecoder;
use agentbox::core::types::{ChangeSet, FailureDetail, StreamRecord};
use agentbox::io::commit::CommitReport;
use agentbox::io::pipeline::RunRequest;
use anyhow::{Context, Result, anyhow, bail};
use futures_util::{Stream, StreamExt};
use serde_json::{Value, json};
use tracing::{debug, warn};

/// Terminal outcome of a `run-agent` stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunResult {
    Completed(ChangeSet),
    Failed(FailureDetail),
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        // No overall timeout: agent runs stream for as long as the server allows.
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("build HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    /// Submit a run and follow its stream, calling `on_progress` per stdout line.
    pub async fn run_agent(
        &self,
        request: &RunRequest,
        on_progress: impl FnMut(&str),
    ) -> Result<RunResult> {
        let response = self
            .http
            .post(self.url("run-agent"))
            .json(request)
            .send()
            .await
            .context("send run-agent request")?;
        let response = ensure_success(response).await?;
        read_run_stream(response.bytes_stream(), on_progress).await
    }

    pub async fn commit(&self, changes: &ChangeSet) -> Result<CommitReport> {
        let body = json!({
            "changes": changes.modified_files,
            "deletions": changes.deleted_files,
        });
        let response = self
            .http
            .post(self.url("commit-changes"))
            .json(&body)
            .send()
            .await
            .context("send commit-changes request")?;
        let response = ensure_success(response).await?;
        response.json().await.context("parse commit report")
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response
        .text()
        .await
        .unwrap_or_else(|_| "unknown error".to_string());
    let message = serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|body| body.get("error").and_then(Value::as_str).map(str::to_string))
        .unwrap_or(text);
    bail!("server returned {status}: {message}")
}

/// Decode an NDJSON record stream delivered in arbitrary chunks.
///
/// Progress records go to `on_progress`; the first terminal record is the
/// result. A stream that ends without one is an error.
pub async fn read_run_stream<S, B, E>(stream: S, mut on_progress: impl FnMut(&str)) -> Result<RunResult>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::error::Error + Send + Sync + 'static,
{
    let mut stream = std::pin::pin!(stream);
    let mut decoder = LineDecoder::new();
    let mut result = None;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("read response chunk")?;
        for record in decoder.push(chunk.as_ref()) {
            let record = record.context("decode stream record")?;
            accept(record, &mut result, &mut on_progress);
        }
    }
    if decoder.pending() > 0 {
        debug!(bytes = decoder.pending(), "stream ended without a trailing newline");
    }
    if let Some(record) = decoder.finish() {
        let record = record.context("decode stream record")?;
        accept(record, &mut result, &mut on_progress);
    }

    result.ok_or_else(|| anyhow!("stream ended without a result"))
}

fn accept(record: StreamRecord, result: &mut Option<RunResult>, on_progress: &mut impl FnMut(&str)) {
    if result.is_some() {
        warn!("ignoring record after terminal record");
        return;
    }
    match record {
        StreamRecord::Progress(progress) => on_progress(&progress.stdout),
        StreamRecord::Completed(changes) => *result = Some(RunResult::Completed(changes)),
        StreamRecord::Failed(failed) => *result = Some(RunResult::Failed(failed.error)),
    }
}
