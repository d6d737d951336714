use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use mcp_demo_bridge::config::load_config;
use mcp_demo_bridge::logging::init_tracing;
use mcp_demo_bridge::server::{self, AppState};

#[derive(Debug, Parser)]
#[command(name = "mcp-demo-bridge", version, about = "Chat bridge between a browser, Claude and a stdio MCP server")]
struct Args {
    /// YAML config file (defaults to $MCP_DEMO_CONFIG or ./mcp-demo.yaml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen address, overriding `server.bind`.
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = load_config(args.config.as_deref()).context("failed to load configuration")?;
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }

    init_tracing(&config.logging)?;

    let state = Arc::new(AppState::from_config(&config));
    server::serve(state, &config.server).await?;
    Ok(())
}
