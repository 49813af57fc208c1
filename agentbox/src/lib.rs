//! Agent invocation and change reconciliation.
//!
//! A caller hands over a set of files plus an instruction; the pipeline copies
//! the files into a private workspace, runs an external coding agent there,
//! and reports exactly which files the agent changed. Nothing touches the
//! caller's real files until an explicit commit.
//!
//! - **[`core`]**: Pure logic (path rules, snapshots, change classification,
//!   NDJSON framing, review state machine). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (workspaces, process execution,
//!   commits to the true store, configuration).
//!
//! [`io::pipeline`] ties the two together for the server.

pub mod core;
pub mod error;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
