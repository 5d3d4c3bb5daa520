use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use orchestrator::{
    config::AppConfig,
    context::ContextManager,
    http::{router, AppState},
    orchestration::Orchestrator,
    reasoner::ReasonerRegistry,
};
use orchestrator_mcp::{HttpMcpClient, McpCoordinator, ServerRegistry};

#[derive(Parser, Debug)]
#[command(name = "tool-orchestrator", about = "AI-mediated MCP tool orchestrator", version)]
struct Args {
    /// Path to the YAML configuration file.
    #[arg(long, env = "ORCHESTRATOR_CONFIG")]
    config: Option<PathBuf>,

    /// Bind host override.
    #[arg(long, env = "ORCHESTRATOR_HOST")]
    host: Option<String>,

    /// Bind port override.
    #[arg(long, env = "ORCHESTRATOR_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => AppConfig::from_file(path)
            .await
            .with_context(|| format!("load config from {}", path.display()))?,
        None => AppConfig::default(),
    };
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let registry = Arc::new(ServerRegistry::new(config.mcp.servers.clone()));
    let coordinator = Arc::new(McpCoordinator::new(
        registry,
        Arc::new(HttpMcpClient::new()),
        &config.mcp,
    ));
    let contexts = Arc::new(ContextManager::new(config.context.clone()));
    let reasoners = Arc::new(ReasonerRegistry::from_config(&config.ai));
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&coordinator),
        Arc::clone(&contexts),
        reasoners,
        config.orchestration.clone(),
    ));

    let _health_task = Arc::clone(&coordinator).spawn_health_check_task();
    let _cleanup_task = Arc::clone(&contexts).spawn_cleanup_task();

    let app = router(AppState {
        orchestrator,
        coordinator,
        contexts,
    });

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("invalid bind address")?;
    info!("tool-orchestrator listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
