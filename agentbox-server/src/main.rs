//! Agentbox server - runs coding agents in isolated workspaces and streams
//! their progress and changes as NDJSON.

mod routes;
mod state;
mod stream;

use std::net::SocketAddr;
use std::path::PathBuf;

use agentbox::io::config::load_config;
use agentbox::io::process::TokioProcessRunner;
use anyhow::Context;
use axum::Router;
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::state::AppState;

#[derive(Parser)]
#[command(name = "agentbox-server")]
#[command(about = "Run coding agents against submitted files and report what they changed")]
struct Args {
    /// Address to bind the server to
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    /// Port to listen on
    #[arg(long, default_value = "3001")]
    port: u16,

    /// Config file (defaults apply when it does not exist)
    #[arg(long, default_value = "agentbox.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    agentbox::logging::init("agentbox_server=info,agentbox=info");

    let args = Args::parse();
    let config = load_config(&args.config)
        .with_context(|| format!("load config {}", args.config.display()))?;
    info!(
        config = %args.config.display(),
        store_root = %config.store_root.display(),
        workspace_root = %config.workspace_root.display(),
        default_agent = %config.default_agent,
        max_concurrent_runs = config.max_concurrent_runs,
        "starting agentbox-server"
    );

    let state = AppState::new(&config, TokioProcessRunner);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app: Router = routes::api_router().layer(cors).with_state(state);

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;
    info!(addr = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
