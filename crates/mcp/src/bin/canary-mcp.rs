//! canary-mcp: serves the Canary historian tools to an MCP client over stdio.
//!
//! stdout carries the protocol; all logging goes to stderr.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use canary_catalog::TagCatalogIndex;
use canary_core::config::{self, Config};
use canary_mcp::{McpServer, StdioTransport};
use canary_tool_runtime::{register_all, CanaryServices, ToolRegistry};

// ── CLI ─────────────────────────────────────────────────────────────

/// Canary historian MCP server.
#[derive(Parser, Debug)]
#[command(name = "canary-mcp", version, about)]
struct Cli {
    /// Config profile; keys are read as `{PROFILE}_{KEY}` before `{KEY}`.
    #[arg(long, env = "CANARY_PROFILE", default_value = "")]
    profile: String,

    /// Tag catalog JSON file, overriding CANARY_CATALOG_PATH.
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Print the redacted configuration and exit.
    #[arg(long)]
    check_config: bool,
}

const INSTRUCTIONS: &str = "Resolve natural-language tag descriptions with resolve_tag or \
search_catalog before calling query_timeseries. Every result is a JSON envelope with a \
`success` flag; on failure follow `error.remediation`.";

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    config::load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = Config::for_profile(&cli.profile);
    if let Some(path) = cli.catalog {
        config.catalog.path = path;
    }

    if cli.check_config {
        println!("{}", serde_json::to_string_pretty(&config.redacted_summary())?);
        config.validate().context("invalid configuration")?;
        return Ok(());
    }

    config.validate().context("invalid configuration")?;
    config.log_summary();

    let catalog = TagCatalogIndex::load_or_empty(&config.catalog.path);
    let services = Arc::new(
        CanaryServices::connect(config, catalog).context("failed to build historian client")?,
    );

    let mut registry = ToolRegistry::new();
    register_all(&mut registry, services).context("failed to register tools")?;
    info!(tools = registry.len(), "tools registered");

    let mut server = McpServer::new(registry).with_instructions(INSTRUCTIONS);
    let mut transport = StdioTransport::new();
    server.run(&mut transport).await?;

    info!("canary-mcp stopped");
    Ok(())
}
