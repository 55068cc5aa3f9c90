//! kgraph - cached graph queries and text ingestion
//!
//! Main entry point for the kgraph CLI.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use kgraph::config::KgraphConfig;
use kgraph::graph::{Label, NodeId};
use kgraph::ingest::EndpointIdPolicy;
use kgraph::server::QueryServer;
use kgraph::App;
use std::path::{Path, PathBuf};
use std::process;

/// kgraph - Knowledge graph query service and ingestion pipeline
#[derive(Parser, Debug)]
#[command(name = "kgraph")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: ~/.config/kgraph/config.yaml)
    #[arg(short, long, env = "KGRAPH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Run the HTTP query server
    Serve {
        /// Override the configured port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Ingest a JSON array of {"raw_text": ...} records
    Ingest {
        /// Input file
        file: PathBuf,

        /// Override the configured endpoint id policy
        #[arg(long, value_enum)]
        policy: Option<PolicyArg>,
    },

    /// Look up a node (or every node with a label)
    Query {
        /// Node label
        #[arg(short, long)]
        label: String,

        /// Node id; omit to list the label
        #[arg(short, long)]
        id: Option<String>,
    },

    /// Delete a node and its relationships
    Delete {
        /// Node label
        #[arg(short, long)]
        label: String,

        /// Node id
        #[arg(short, long)]
        id: String,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum PolicyArg {
    ReuseByName,
    Fresh,
}

impl From<PolicyArg> for EndpointIdPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::ReuseByName => EndpointIdPolicy::ReuseByName,
            PolicyArg::Fresh => EndpointIdPolicy::Fresh,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.clone().unwrap_or_else(KgraphConfig::default_path);

    // Handle init command first (creates config)
    if let Commands::Init { force } = cli.command {
        return handle_init_command(&config_path, force);
    }

    let mut config = KgraphConfig::load_or_default(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    config.apply_env_overrides()?;

    if let Err(e) = kgraph::logging::init(&config.log) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    match cli.command {
        Commands::Init { .. } => Ok(()),
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            handle_serve_command(config).await
        }
        Commands::Ingest { file, policy } => {
            if let Some(policy) = policy {
                config.ingest.endpoint_id_policy = policy.into();
            }
            handle_ingest_command(config, &file).await
        }
        Commands::Query { label, id } => handle_query_command(config, &label, id).await,
        Commands::Delete { label, id } => handle_delete_command(config, &label, &id).await,
    }
}

fn handle_init_command(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "Config already exists at {} (use --force to overwrite)",
            path.display()
        );
    }

    KgraphConfig::default().save(path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

async fn handle_serve_command(config: KgraphConfig) -> anyhow::Result<()> {
    let addr = config.server.bind_addr();
    let app = App::open(config).await.context("opening graph store")?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
        }
        tracing::info!("Shutdown signal received");
    };

    let result = QueryServer::new(app.service()).run(&addr, shutdown).await;
    app.shutdown().await;
    Ok(result?)
}

async fn handle_ingest_command(config: KgraphConfig, file: &Path) -> anyhow::Result<()> {
    let app = App::open(config).await.context("opening graph store")?;

    let result = app.pipeline().ingest_file(file).await;
    app.shutdown().await;

    let report = result.with_context(|| format!("ingesting {}", file.display()))?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn handle_query_command(
    config: KgraphConfig,
    label: &str,
    id: Option<String>,
) -> anyhow::Result<()> {
    let label = Label::new(label)?;
    let id = id.map(NodeId::new).transpose()?;

    let app = App::open(config).await.context("opening graph store")?;
    let result = app.service().query_node(&label, id.as_ref()).await;
    app.shutdown().await;

    println!("{}", serde_json::to_string_pretty(&result?)?);
    Ok(())
}

async fn handle_delete_command(config: KgraphConfig, label: &str, id: &str) -> anyhow::Result<()> {
    let label = Label::new(label)?;
    let id = NodeId::new(id)?;

    let app = App::open(config).await.context("opening graph store")?;
    let result = app.service().delete_node(&label, &id).await;
    app.shutdown().await;

    if result? {
        println!("Deleted {}:{}", label, id);
    } else {
        println!("No such node {}:{}", label, id);
    }
    Ok(())
}
