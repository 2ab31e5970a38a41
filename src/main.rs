use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use reposcope_core::{Analyzer, Config};
use reposcope_gateway::GatewayServer;
use reposcope_index::{CloneOutcome, IndexReport, RepositoryManager};
use reposcope_llm::openai::OpenAiProvider;

#[derive(Debug, Parser)]
#[command(name = "reposcope", version, about)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true, env = "REPOSCOPE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP API (default).
    Serve,
    /// Index a directory into the vector store.
    Index {
        /// Directory to index instead of the configured checkout.
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Clone the configured repository.
    Clone,
    /// Print the chunks closest to a query.
    Search {
        query: String,
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Ask the assistant a question about the indexed repository.
    Ask { query: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_subscriber();

    let cli = Cli::parse();
    let config_path = cli
        .config
        .unwrap_or_else(|| PathBuf::from("config/default.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    let cancel = CancellationToken::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e:#}");
            return;
        }
        tracing::info!("received shutdown signal");
        trigger.cancel();
        let _ = shutdown_tx.send(true);
    });

    match cli.command.unwrap_or(Command::Serve) {
        Command::Clone => clone(&config).await,
        command => {
            let analyzer = Analyzer::from_config(&config, cancel).await?;
            run(command, analyzer, &config, shutdown_rx).await
        }
    }
}

async fn clone(config: &Config) -> anyhow::Result<()> {
    let repository = RepositoryManager::new(config.repository.url.clone(), &config.repository.path);
    match repository.clone_repository().await? {
        CloneOutcome::Cloned => println!("cloned into {}", repository.path().display()),
        CloneOutcome::AlreadyPresent => {
            println!("{} already exists, nothing to do", repository.path().display());
        }
    }
    Ok(())
}

async fn run(
    command: Command,
    analyzer: Analyzer<OpenAiProvider>,
    config: &Config,
    shutdown_rx: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    match command {
        Command::Serve => {
            let server = GatewayServer::new(
                &config.gateway.bind,
                config.gateway.port,
                Arc::new(analyzer),
                shutdown_rx,
            )
            .with_max_body_size(config.gateway.max_body_size);
            server.serve().await?;
        }
        Command::Index { path } => {
            let report = match path {
                Some(root) => analyzer.index_path(&root).await?,
                None => analyzer.index_repository().await?,
            };
            print_report(&report);
        }
        Command::Search { query, top_k } => {
            let hits = analyzer
                .search(&query, top_k.unwrap_or_else(|| analyzer.top_k()))
                .await?;
            if hits.is_empty() {
                println!("no results");
            }
            for hit in hits {
                println!("--- {} (distance {:.4}) ---", hit.chunk.label(), hit.distance);
                println!("{}", hit.chunk.text);
            }
        }
        Command::Ask { query } => {
            let answer = analyzer.ask(&query).await?;
            println!("{answer}");
        }
        Command::Clone => clone(config).await?,
    }
    Ok(())
}

fn print_report(report: &IndexReport) {
    println!(
        "indexed {} of {} files ({} chunks) in {} ms",
        report.files_indexed, report.files_attempted, report.chunks_indexed, report.duration_ms
    );
    for failure in &report.failures {
        println!("  failed: {}: {}", failure.path.display(), failure.error);
    }
    if report.cancelled {
        println!("indexing was cancelled before completion");
    }
}

fn init_subscriber() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
