use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Use JSON logs in production (STUDIO_LOG_JSON=1), human-readable otherwise
    let json_logs = std::env::var("STUDIO_LOG_JSON").unwrap_or_default() == "1";
    let filter = EnvFilter::from_default_env()
        .add_directive("studio_server=info".parse()?)
        .add_directive("studio_agents=info".parse()?);
    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .init();
    }

    let config = studio_server::config::ServerConfig::parse();
    tracing::info!("Starting studio server on {}", config.listen_addr);
    if config.github_token.is_none() {
        tracing::info!("No GitHub token configured; private repositories will be unreadable");
    }
    let server = studio_server::server::Server::new(config);
    server.run().await
}
