use std::path::PathBuf;

use clap::Parser;
use dungeon_core::{Environment, ToolCall};
use dungeon_env::{Config, DungeonEnvironment, DEFAULT_MAP};
use dungeon_rs::Movement;
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Play one episode with the policy-iteration agent and print the dungeon after every turn.
#[derive(Parser, Debug)]
#[command(name = "dungeon_demo")]
struct Args {
    /// Map file (`X` wall, `S` start, `G` gold, `B` bridge, `P` pit); a built-in map otherwise.
    #[arg(long)]
    map: Option<PathBuf>,
    #[arg(long, default_value_t = 42)]
    seed: u64,
    /// Slip sideways 20% of the time instead of moving exactly.
    #[arg(long)]
    drift: bool,
    #[arg(long, default_value_t = 200)]
    max_turns: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();
    let args = Args::parse();

    let map = match &args.map {
        Some(path) => std::fs::read_to_string(path)?,
        None => DEFAULT_MAP.to_string(),
    };
    let movement = if args.drift { Movement::Drift } else { Movement::Deterministic };
    let mut env = DungeonEnvironment::new(Config { map, seed: args.seed, movement, max_turns: args.max_turns, ..Default::default() })?;
    let mut obs = env.initialize().await?;
    println!("{}\n", obs.data["map_text"].as_str().unwrap_or_default());

    while !(obs.terminated || obs.truncated) {
        let suggested = env.step(vec![ToolCall { tool: "suggest".into(), args: json!({}) }]).await?;
        let suggestion = suggested.data["extra"]["suggestion"].clone();
        obs = match suggestion.as_str() {
            Some(action) => {
                info!(action, "agent moves");
                env.step(vec![ToolCall { tool: "interact".into(), args: json!({ "action": action }) }]).await?
            }
            None => {
                println!("Skill allocation: {suggestion}");
                env.step(vec![ToolCall { tool: "allocate".into(), args: json!({ "skills": suggestion }) }]).await?
            }
        };
        let data = &obs.data;
        if let Some(hazard) = data["extra"]["hazard"].as_str() {
            println!("Bridge crossing {hazard}");
        }
        println!(
            "Turn {} | gold {}/{} | reward {:.1} (total {:.1})\n{}\n",
            data["turns"],
            data["gold_collected"].as_array().map_or(0, |g| g.len()),
            data["gold_total"],
            data["reward_last"].as_f64().unwrap_or_default(),
            data["total_reward"].as_f64().unwrap_or_default(),
            data["map_text"].as_str().unwrap_or_default(),
        );
    }

    match obs.data["ending"].as_str() {
        Some("exited") => println!("Escaped with {} gold.", obs.data["gold_collected"].as_array().map_or(0, |g| g.len())),
        Some("fell_in_pit") => println!("Fell into a pit."),
        _ => println!("Out of turns."),
    }
    Ok(())
}
