//! Shared application state for the agent server.

use std::path::PathBuf;

use agentbox::io::config::AgentboxConfig;
use agentbox::io::pipeline::Pipeline;
use agentbox::io::process::{ProcessRunner, TokioProcessRunner};

/// Shared state accessible from all request handlers.
#[derive(Debug)]
pub struct AppState<R: ProcessRunner = TokioProcessRunner> {
    pub pipeline: Pipeline<R>,
    /// Root of the true store (commits and raw commands operate here).
    pub store_root: PathBuf,
    pub raw_command_enabled: bool,
}

impl<R: ProcessRunner> Clone for AppState<R> {
    fn clone(&self) -> Self {
        Self {
            pipeline: self.pipeline.clone(),
            store_root: self.store_root.clone(),
            raw_command_enabled: self.raw_command_enabled,
        }
    }
}

impl<R: ProcessRunner> AppState<R> {
    pub fn new(config: &AgentboxConfig, runner: R) -> Self {
        Self {
            pipeline: Pipeline::new(config, runner),
            store_root: config.store_root.clone(),
            raw_command_enabled: config.raw_command_enabled,
        }
    }
}
