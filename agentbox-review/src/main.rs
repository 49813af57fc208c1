mod cli;
mod client;
mod plan;
mod render;
mod store;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::cli::{RunArgs, Session};
use crate::store::ReviewStore;

#[derive(Parser)]
#[command(
    name = "agentbox-review",
    version,
    about = "Run agents through an agentbox server and review their changes"
)]
struct Cli {
    /// Server base URL
    #[arg(long, default_value = "http://127.0.0.1:3001", global = true)]
    server: String,

    /// Directory holding the pending review state
    #[arg(long, default_value = ".agentbox", global = true)]
    state_dir: PathBuf,

    /// Working copy that file paths are read from
    #[arg(long, default_value = ".", global = true)]
    root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Submit files and an instruction; keep the result for review
    Run {
        /// Plan file (JSON, optionally inside a Markdown code fence)
        #[arg(long)]
        plan: Option<PathBuf>,
        #[arg(long, short)]
        instruction: Option<String>,
        /// Agent kind configured on the server
        #[arg(long)]
        agent: Option<String>,
        /// Strip surrounding whitespace from files before the run
        #[arg(long)]
        trim: bool,
        /// Files to submit, relative to --root
        paths: Vec<String>,
    },
    /// List pending paths
    Status,
    /// Show the diff of the active path
    Show {
        /// Switch the active path first
        #[arg(long)]
        path: Option<String>,
        /// Pause between diff lines, in milliseconds
        #[arg(long, default_value_t = 0)]
        delay_ms: u64,
    },
    /// Apply the pending changes through the server
    Commit,
    /// Drop the pending changes
    Discard,
}

#[tokio::main]
async fn main() -> Result<()> {
    agentbox::logging::init("agentbox_review=warn");

    let cli = Cli::parse();
    let session = Session {
        server: cli.server,
        store: ReviewStore::new(&cli.state_dir),
        root: cli.root,
    };
    match cli.command {
        Command::Run {
            plan,
            instruction,
            agent,
            trim,
            paths,
        } => {
            let args = RunArgs {
                plan,
                instruction,
                agent,
                trim,
                paths,
            };
            cli::run(&session, args).await
        }
        Command::Status => cli::status(&session),
        Command::Show { path, delay_ms } => {
            cli::show(&session, path, Duration::from_millis(delay_ms)).await
        }
        Command::Commit => cli::commit(&session).await,
        Command::Discard => cli::discard(&session),
    }
}
