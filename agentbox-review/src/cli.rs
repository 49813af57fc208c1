//! CLI command implementations.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use agentbox::core::reveal::Revealer;
use agentbox::core::snapshot::Snapshot;
use agentbox::io::pipeline::RunRequest;
use anyhow::{Context, Result, bail};
use tracing::{debug, info};

use crate::client::{ApiClient, RunResult};
use crate::plan::{Plan, read_file};
use crate::render::{active_diff, reveal, status_lines};
use crate::store::ReviewStore;

/// Where the review CLI finds its server, state, and working copy.
#[derive(Debug, Clone)]
pub struct Session {
    pub server: String,
    pub store: ReviewStore,
    /// Root that plan entries and path arguments are read from.
    pub root: PathBuf,
}

/// Inputs for `run`.
#[derive(Debug, Clone, Default)]
pub struct RunArgs {
    pub plan: Option<PathBuf>,
    pub instruction: Option<String>,
    pub agent: Option<String>,
    pub trim: bool,
    pub paths: Vec<String>,
}

/// Submit a run, stream its progress, and store the result for review.
pub async fn run(session: &Session, args: RunArgs) -> Result<()> {
    let mut state = session.store.load()?;
    if let Some(pending) = state.pending() {
        bail!(
            "{} pending change(s) must be committed or discarded first",
            pending.len()
        );
    }

    let request = build_request(&session.root, args)?;
    let submitted =
        Snapshot::capture(&request.files, request.trim).context("invalid file list")?;
    info!(files = request.files.len(), "submitting run");
    let client = ApiClient::new(&session.server)?;
    let result = client
        .run_agent(&request, |line| println!("│ {line}"))
        .await?;

    match result {
        RunResult::Completed(changes) => {
            if !state.propose(changes, &submitted)? {
                println!("run: no changes");
                return Ok(());
            }
            session.store.save(&state)?;
            for line in status_lines(&state) {
                println!("{line}");
            }
            Ok(())
        }
        RunResult::Failed(detail) => {
            if let Some(stderr) = detail.stderr.as_deref() {
                for line in stderr.lines() {
                    eprintln!("stderr: {line}");
                }
            }
            bail!("run failed ({:?}): {}", detail.kind, detail.message)
        }
    }
}

fn build_request(root: &Path, args: RunArgs) -> Result<RunRequest> {
    let mut request = match &args.plan {
        Some(path) => Plan::load(path)?.into_request(root)?,
        None => RunRequest::new(String::new(), Vec::new()),
    };
    if let Some(instruction) = args.instruction {
        request.instruction = instruction;
    }
    if args.agent.is_some() {
        request.agent_kind = args.agent;
    }
    request.trim |= args.trim;
    for path in &args.paths {
        request.files.push(read_file(root, path)?);
    }
    if request.instruction.trim().is_empty() {
        bail!("an instruction is required (--instruction or a plan file)");
    }
    Ok(request)
}

/// Print the pending paths.
pub fn status(session: &Session) -> Result<()> {
    let state = session.store.load()?;
    for line in status_lines(&state) {
        println!("{line}");
    }
    Ok(())
}

/// Show the diff of the active path against its submitted content,
/// optionally switching to `path` first.
pub async fn show(session: &Session, path: Option<String>, delay: Duration) -> Result<()> {
    let mut state = session.store.load()?;
    if let Some(path) = path {
        state.select(&path)?;
        session.store.save(&state)?;
    }
    let Some((active, diff)) = active_diff(&state) else {
        println!("no pending changes");
        return Ok(());
    };
    debug!(path = active, lines = diff.lines().count(), "rendering diff");

    let revealer = Revealer::new();
    let token = revealer.start(active);
    let mut stdout = std::io::stdout().lock();
    reveal(&revealer, &token, &diff, delay, &mut stdout).await?;
    stdout.flush()?;
    Ok(())
}

/// Apply the pending set through the server. The set is cleared either way.
pub async fn commit(session: &Session) -> Result<()> {
    let mut state = session.store.load()?;
    let changes = state.begin_commit()?;
    session.store.save(&state)?;

    let client = ApiClient::new(&session.server)?;
    let report = client.commit(&changes).await?;
    for result in &report.results {
        match &result.error {
            None => println!("ok     {}", result.path),
            Some(error) => println!("failed {}: {error}", result.path),
        }
    }
    println!("commit: applied={} failed={}", report.applied, report.failed);
    if report.failed > 0 {
        bail!("{} path(s) failed to commit", report.failed);
    }
    Ok(())
}

/// Drop the pending set without writing anything.
pub fn discard(session: &Session) -> Result<()> {
    let mut state = session.store.load()?;
    let changes = state.discard()?;
    session.store.save(&state)?;
    println!("discard: dropped {} change(s)", changes.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use agentbox::core::review::ReviewState;
    use agentbox::core::types::{ChangeSet, ModifiedFile};

    fn test_session(root: &Path) -> Session {
        Session {
            server: "http://127.0.0.1:9".to_string(),
            store: ReviewStore::new(&root.join(".agentbox")),
            root: root.to_path_buf(),
        }
    }

    fn propose(session: &Session) {
        let mut state = ReviewState::Empty;
        state
            .propose(
                ChangeSet {
                    modified_files: vec![ModifiedFile {
                        path: "a.txt".to_string(),
                        modified_content: "new".to_string(),
                    }],
                    deleted_files: Vec::new(),
                },
                &Snapshot::default(),
            )
            .expect("propose");
        session.store.save(&state).expect("save");
    }

    #[test]
    fn build_request_merges_flags_and_paths() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("a.txt"), "hello").expect("write");
        let request = build_request(
            temp.path(),
            RunArgs {
                instruction: Some("append".to_string()),
                agent: Some("codex".to_string()),
                paths: vec!["a.txt".to_string()],
                ..RunArgs::default()
            },
        )
        .expect("request");
        assert_eq!(request.instruction, "append");
        assert_eq!(request.agent_kind.as_deref(), Some("codex"));
        assert_eq!(request.files.len(), 1);
    }

    #[test]
    fn inline_plan_entries_diff_against_submitted_content() {
        let temp = tempfile::tempdir().expect("tempdir");
        let plan = temp.path().join("plan.json");
        fs::write(
            &plan,
            r#"{"instruction": "edit", "trim": true, "files": [{"path": "notes.txt", "content": "  old\n"}]}"#,
        )
        .expect("write plan");
        let request = build_request(
            temp.path(),
            RunArgs {
                plan: Some(plan),
                ..RunArgs::default()
            },
        )
        .expect("request");
        let submitted = Snapshot::capture(&request.files, request.trim).expect("snapshot");

        let mut state = ReviewState::Empty;
        state
            .propose(
                ChangeSet {
                    modified_files: vec![ModifiedFile {
                        path: "notes.txt".to_string(),
                        modified_content: "new".to_string(),
                    }],
                    deleted_files: Vec::new(),
                },
                &submitted,
            )
            .expect("propose");

        let (path, diff) = active_diff(&state).expect("diff");
        assert_eq!(path, "notes.txt");
        assert!(diff.starts_with("--- a/notes.txt\n+++ b/notes.txt\n"), "{diff}");
        assert!(diff.contains("-old"));
        assert!(diff.contains("+new"));
        assert!(!diff.contains("/dev/null"));
    }

    #[test]
    fn build_request_requires_instruction() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert!(build_request(temp.path(), RunArgs::default()).is_err());
    }

    #[tokio::test]
    async fn run_refuses_while_changes_are_pending() {
        let temp = tempfile::tempdir().expect("tempdir");
        let session = test_session(temp.path());
        propose(&session);

        let err = run(
            &session,
            RunArgs {
                instruction: Some("x".to_string()),
                ..RunArgs::default()
            },
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("pending"));
    }

    #[test]
    fn discard_clears_state_without_writing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let session = test_session(temp.path());
        propose(&session);

        discard(&session).expect("discard");
        assert_eq!(session.store.load().expect("load"), ReviewState::Empty);
        assert!(!temp.path().join("a.txt").exists());
        assert!(discard(&session).is_err());
    }

    #[tokio::test]
    async fn commit_clears_state_even_when_server_is_unreachable() {
        let temp = tempfile::tempdir().expect("tempdir");
        let session = test_session(temp.path());
        propose(&session);

        assert!(commit(&session).await.is_err());
        assert_eq!(session.store.load().expect("load"), ReviewState::Empty);
    }
}
