use std::net::SocketAddr;
use std::path::PathBuf;

use agent_service::make_app;
use clap::Parser;
use dungeon_core::create_agent_with_config;
use dungeon_env::register_default_env;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// HTTP front for the dungeon environment and the per-turn agent.
#[derive(Parser, Debug)]
#[command(name = "agent_service")]
struct Args {
    #[arg(long, default_value = "127.0.0.1:8080")]
    addr: SocketAddr,
    /// JSON file with the agent's controller config; defaults apply when absent.
    #[arg(long)]
    agent_config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();

    // Pre-register environments and agents for /envs, /agents and factory-based init
    register_default_env();
    let agent_config = match &args.agent_config {
        Some(path) => Some(serde_json::from_str(&std::fs::read_to_string(path)?)?),
        None => None,
    };
    let agent = create_agent_with_config("GoldDungeon", agent_config)?;
    let app = make_app(agent);

    let listener = tokio::net::TcpListener::bind(args.addr).await?;
    info!(addr = %args.addr, "agent service listening");
    axum::serve(listener, app).await?;
    Ok(())
}
