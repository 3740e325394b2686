//! `dispatchd`: the Dispatch server and CLI binary (spec.md §1 — "a
//! long-running binary exposing the webhook endpoint and a background
//! reconciliation scheduler, plus a thin `clap`-based CLI for one-shot
//! operator commands").

use anyhow::Result;
use clap::{Parser, Subcommand};
use dispatch_core::config::DispatchConfig;
use dispatch_core::{IssueId, IssueStatus};
use dispatch_server::{agents, server, token_provider};
use dispatch_store::{IssueFilter, IssueStore, SqliteIssueStore};
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "dispatchd")]
#[command(about = "Dispatch: an issue-orchestration platform", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the configuration file.
    #[arg(long, global = true, default_value = "dispatch.toml")]
    config: PathBuf,

    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server: webhook endpoint, read API, and the
    /// background reconciliation scheduler.
    Serve {
        /// Path to the agent registry TOML file.
        #[arg(long, default_value = "agents.toml")]
        agents: PathBuf,
        /// Base URL of the sandbox agent execution backend.
        #[arg(long, env = "DISPATCH_SANDBOX_URL", default_value = "http://127.0.0.1:9000")]
        sandbox_url: String,
        /// GitHub personal access token used to authenticate remote calls.
        #[arg(long, env = "DISPATCH_GITHUB_TOKEN", default_value = "")]
        github_token: String,
    },
    /// Trigger a one-shot sync of a single repo.
    Sync {
        owner: String,
        repo: String,
        installation_id: i64,
    },
    /// Show a single issue.
    Issue { id: String },
    /// List issues, optionally filtered by status.
    Issues {
        #[arg(long)]
        status: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = DispatchConfig::load(&cli.config)?;

    match cli.command {
        Commands::Serve { agents: agents_path, sandbox_url, github_token } => {
            let registry = agents::load_registry(agents_path)?;
            let opts = server::ServerOptions { config, agents: registry, github_token, sandbox_url };
            server::start_server(opts).await?;
        }
        Commands::Sync { owner, repo, installation_id } => {
            let store = SqliteIssueStore::connect(&config.database_url).await?;
            let provider = std::sync::Arc::new(token_provider::StaticTokenProvider::new(
                std::env::var("DISPATCH_GITHUB_TOKEN").unwrap_or_default(),
            ));
            let tracker = dispatch_sync::GithubTracker::new(provider, config.retry)?;
            let result = dispatch_sync::sync(&owner, &repo, installation_id, config.sync_strategy, &tracker, &store, &config.conventions, &config.retry).await?;
            println!("created={} updated={} conflicts={} errors={}", result.created.len(), result.updated.len(), result.conflicts.len(), result.errors.len());
        }
        Commands::Issue { id } => {
            let store = SqliteIssueStore::connect(&config.database_url).await?;
            let issue = store.get_issue(&IssueId::new(id)).await?;
            println!("{}", serde_json::to_string_pretty(&issue)?);
        }
        Commands::Issues { status } => {
            let store = SqliteIssueStore::connect(&config.database_url).await?;
            let filter = IssueFilter {
                status: status.as_deref().map(parse_status).transpose()?,
                ..Default::default()
            };
            let issues = store.list_issues(&filter).await?;
            for issue in issues {
                println!("{}\t{}\t{:?}\t{}", issue.id, issue.title, issue.status, issue.assignee.as_deref().unwrap_or("-"));
            }
        }
    }
    Ok(())
}

fn parse_status(raw: &str) -> Result<IssueStatus> {
    match raw {
        "open" => Ok(IssueStatus::Open),
        "in_progress" => Ok(IssueStatus::InProgress),
        "blocked" => Ok(IssueStatus::Blocked),
        "closed" => Ok(IssueStatus::Closed),
        other => Err(anyhow::anyhow!("unknown status '{other}'")),
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("dispatch_server=debug,dispatch_orchestrator=debug,dispatch_sync=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dispatch_server=info,warn"))
    };

    tracing_subscriber::registry().with(filter).with(tracing_subscriber::fmt::layer().with_target(false)).init();
}
