use rmcp::{ServiceExt, transport::stdio};

use proofpane::config::Config;
use proofpane::server::ProofpaneServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    // MCP hosts may start the server from any CWD: prefer a .env next to the
    // binary, then the cargo project root, then the CWD.
    if let Ok(exe) = std::env::current_exe()
        && let Some(dir) = exe.parent()
    {
        let beside_binary = dir.join(".env");
        let project_root = dir.join("../../.env");
        if beside_binary.exists() {
            dotenvy::from_path(&beside_binary).ok();
        } else if project_root.exists() {
            dotenvy::from_path(&project_root).ok();
        } else {
            dotenvy::dotenv().ok();
        }
    } else {
        dotenvy::dotenv().ok();
    }

    tracing::info!("proofpane starting");

    let config = Config::load();
    tracing::info!(
        api_base = %config.api_base,
        strategy = config.strategy.as_str(),
        settings = %config.settings_path.display(),
        "config loaded"
    );
    let server = ProofpaneServer::new(config);

    let service = server
        .serve(stdio())
        .await
        .inspect_err(|e| tracing::error!("serving error: {e:?}"))?;

    service.waiting().await?;

    tracing::info!("proofpane shutting down");
    Ok(())
}
