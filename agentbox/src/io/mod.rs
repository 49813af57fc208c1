//! Side-effecting operations: workspaces, agent processes, commits, config.

pub mod agent;
pub mod commit;
pub mod config;
pub mod detect;
pub mod pipeline;
pub mod process;
pub mod workspace;
