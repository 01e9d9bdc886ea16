mod pipelines;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use conflux_core::config::AppConfig;
use conflux_engine::store::{MemoryRunStore, RunStore};
use conflux_engine::{WorkflowEngine, WorkflowGraph};
use conflux_gateway::GatewayServer;
use conflux_store::SqliteStore;
use conflux_tools::ToolRegistry;

#[derive(Parser)]
#[command(
    name = "conflux",
    version,
    about = "Workflow coordination server for chained AI research systems"
)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "conflux.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP/WebSocket gateway server
    Serve,
    /// Execute one workflow locally and stream its events to stdout
    Run {
        /// Published pipeline name (e.g. research-proposal) or a graph file
        graph: String,
        /// Initial input as a JSON object
        #[arg(long, default_value = "{}")]
        input: String,
    },
    /// Validate a workflow graph file
    Validate {
        /// Path to a .json or .toml graph definition
        graph: PathBuf,
    },
    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve => serve(&cli.config).await,
        Commands::Run { graph, input } => run_once(&cli.config, &graph, &input).await,
        Commands::Validate { graph } => validate_graph(&graph),
        Commands::Config => show_config(&cli.config),
    }
}

fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    if path.exists() {
        Ok(AppConfig::load(path)?)
    } else {
        info!(path = %path.display(), "No config file, using defaults");
        Ok(AppConfig::default())
    }
}

fn build_engine(config: &AppConfig) -> anyhow::Result<WorkflowEngine> {
    let registry = Arc::new(ToolRegistry::with_systems(&config.systems)?);
    let store: Arc<dyn RunStore> = match &config.store {
        Some(store_config) => Arc::new(SqliteStore::open(Path::new(&store_config.path))?),
        None => Arc::new(MemoryRunStore::new()),
    };
    Ok(WorkflowEngine::with_store(
        config.engine.clone(),
        registry,
        store,
    ))
}

async fn serve(config_path: &Path) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let engine = build_engine(&config)?;

    let published = pipelines::publish_presets(&engine).await?;
    info!(
        tools = engine.registry().list().len(),
        presets = published,
        "Engine ready"
    );

    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutdown requested");
        token.cancel();
    });

    let gateway_config = config.gateway.unwrap_or_default();
    GatewayServer::new(gateway_config, engine).run(shutdown).await
}

async fn run_once(config_path: &Path, graph_ref: &str, input: &str) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let engine = build_engine(&config)?;
    pipelines::publish_presets(&engine).await?;

    // A path argument publishes the file's graph; otherwise the name must
    // match a published pipeline.
    let graph_path = Path::new(graph_ref);
    let name = if graph_path.exists() {
        let graph = load_graph_file(graph_path)?;
        let name = graph.name.clone();
        engine.publish(graph).await?;
        name
    } else {
        graph_ref.to_string()
    };

    let input: serde_json::Map<String, serde_json::Value> = serde_json::from_str(input)?;

    let run_id = engine.submit(&name, None, input).await?;
    let mut rx = engine.subscribe(&run_id)?;
    engine.start(&run_id)?;

    while let Ok(event) = rx.recv().await {
        println!("{}", serde_json::to_string(&event)?);
        if event.kind.is_terminal() {
            break;
        }
    }

    let snapshot = engine.snapshot(&run_id).await?;
    eprintln!(
        "run {} finished: {} ({} steps)",
        run_id,
        snapshot.status,
        snapshot.history.len()
    );
    println!("{}", serde_json::to_string_pretty(snapshot.context.data())?);

    if snapshot.status != conflux_core::types::RunStatus::Succeeded {
        std::process::exit(1);
    }
    Ok(())
}

fn validate_graph(path: &Path) -> anyhow::Result<()> {
    let graph = load_graph_file(path)?;
    match graph.validate() {
        Ok(()) => {
            println!(
                "{} ok: {} nodes, {} edges",
                graph.reference(),
                graph.nodes.len(),
                graph.edges.len()
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}

fn show_config(path: &Path) -> anyhow::Result<()> {
    let config = load_config(path)?;
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

fn load_graph_file(path: &Path) -> anyhow::Result<WorkflowGraph> {
    let content = std::fs::read_to_string(path)?;
    let graph = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => toml::from_str(&content)?,
        _ => serde_json::from_str(&content)?,
    };
    Ok(graph)
}
