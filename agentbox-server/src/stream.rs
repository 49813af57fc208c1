//! Response bodies that are written while a child process runs.

use std::convert::Infallible;

use agentbox::core::ndjson::encode_line;
use agentbox::core::types::{FailureDetail, FailureKind, StreamRecord};
use agentbox::io::pipeline::RunningInvocation;
use agentbox::io::process::{OutputSinks, RunLimits, RunningProcess};
use futures::stream::Stream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Progress lines buffered between the child and a slow client.
const LINE_BUFFER: usize = 64;

/// Aborts the driving task when the response body is dropped (client gone).
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// NDJSON records for one agent run: progress lines, then one terminal record.
pub fn agent_records<P: RunningProcess>(
    invocation: RunningInvocation<P>,
) -> impl Stream<Item = Result<Vec<u8>, Infallible>> + Send + 'static {
    let name = invocation.workspace().name().to_string();
    let (line_tx, mut line_rx) = mpsc::channel::<String>(LINE_BUFFER);
    let (done_tx, done_rx) = oneshot::channel();
    let task = AbortOnDrop(tokio::spawn(async move {
        let result = invocation.drive(line_tx).await;
        let _ = done_tx.send(result);
    }));

    async_stream::stream! {
        let _task = task;
        while let Some(line) = line_rx.recv().await {
            if let Some(bytes) = encode(&StreamRecord::progress(line)) {
                yield Ok(bytes);
            }
        }

        let terminal = match done_rx.await {
            Ok(Ok(changes)) => StreamRecord::Completed(changes),
            Ok(Err(err)) => {
                warn!(invocation = %name, err = %err, "invocation failed after streaming began");
                StreamRecord::failed(err.failure_detail())
            }
            Err(_) => StreamRecord::failed(FailureDetail::new(
                FailureKind::Internal,
                "invocation ended without a result",
            )),
        };
        if let Some(bytes) = encode(&terminal) {
            yield Ok(bytes);
        }
    }
}

/// Plain-text stdout and stderr lines of a raw command, interleaved as they arrive.
pub fn raw_output<P: RunningProcess>(
    process: P,
    limits: RunLimits,
) -> impl Stream<Item = Result<Vec<u8>, Infallible>> + Send + 'static {
    let (tx, mut rx) = mpsc::channel::<String>(LINE_BUFFER);
    let sinks = OutputSinks {
        stdout: Some(tx.clone()),
        stderr: Some(tx),
    };
    let task = AbortOnDrop(tokio::spawn(async move {
        match process.drive(limits, sinks).await {
            Ok(outcome) => info!(
                exit_code = ?outcome.exit_code,
                timed_out = outcome.timed_out,
                "raw command finished"
            ),
            Err(err) => warn!(err = %err, "raw command failed"),
        }
    }));

    async_stream::stream! {
        let _task = task;
        while let Some(mut line) = rx.recv().await {
            line.push('\n');
            yield Ok(line.into_bytes());
        }
    }
}

fn encode(record: &StreamRecord) -> Option<Vec<u8>> {
    match encode_line(record) {
        Ok(bytes) => Some(bytes),
        Err(err) => {
            warn!(err = %err, "failed to encode stream record");
            None
        }
    }
}
