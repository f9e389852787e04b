//! Shared state and the HTTP listener.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use studio_agents::github::{GithubRepo, RepoCoordinate};
use studio_agents::llm::{ChatModel, LlmClient};

use crate::config::ServerConfig;
use crate::db::Db;

/// Status written to runs a previous process never finished.
const INTERRUPTED: &str = "run interrupted by server restart";

/// State shared by every request handler and background run.
pub struct SharedState {
    pub config: ServerConfig,
    pub db: Mutex<Db>,
    pub model: Arc<dyn ChatModel>,
    pub http: reqwest::Client,
}

impl SharedState {
    /// Run a closure against the database under the lock.
    pub fn with_db<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&Db) -> R,
    {
        let db = self.db.lock();
        f(&db)
    }

    /// GitHub accessor for one repository, using the configured token.
    pub fn github(&self, coordinate: &RepoCoordinate) -> GithubRepo {
        GithubRepo::new(
            self.http.clone(),
            &self.config.github_api_url,
            self.config.github_token.clone(),
            coordinate.clone(),
        )
    }
}

pub struct Server {
    config: ServerConfig,
    model: Arc<dyn ChatModel>,
}

impl Server {
    /// Server talking to Anthropic with the configured key and model.
    pub fn new(config: ServerConfig) -> Self {
        let model = LlmClient::new(config.anthropic_api_key.clone())
            .with_api_base(&config.anthropic_api_url)
            .with_model(&config.model)
            .with_max_tokens(config.max_tokens)
            .with_temperature(config.temperature);
        Self::with_model(config, Arc::new(model))
    }

    /// Server with a custom chat model (for testing).
    pub fn with_model(config: ServerConfig, model: Arc<dyn ChatModel>) -> Self {
        Self { config, model }
    }

    fn build_state(&self) -> Result<Arc<SharedState>> {
        tracing::info!("Opening database: {}", self.config.db_path);
        let db = if self.config.db_path == ":memory:" {
            Db::open_memory()
        } else {
            Db::open(&self.config.db_path)
        }
        .map_err(|e| anyhow::anyhow!("Failed to open database: {e}"))?;

        let interrupted = db
            .fail_interrupted_runs(INTERRUPTED)
            .map_err(|e| anyhow::anyhow!("Failed to reset interrupted runs: {e}"))?;
        if interrupted > 0 {
            tracing::warn!("Marked {interrupted} interrupted run(s) as failed");
        }

        Ok(Arc::new(SharedState {
            config: self.config.clone(),
            db: Mutex::new(db),
            model: Arc::clone(&self.model),
            http: reqwest::Client::new(),
        }))
    }

    /// Serve until the process is stopped.
    pub async fn run(self) -> Result<()> {
        let (_addr, handle) = self.start().await?;
        handle.await?
    }

    /// Start the server and return the bound address + task handle (for testing).
    pub async fn start(self) -> Result<(SocketAddr, JoinHandle<Result<()>>)> {
        let listener = TcpListener::bind(&self.config.listen_addr).await?;
        let addr = listener.local_addr()?;
        tracing::info!("HTTP API listening on {addr}");

        let state = self.build_state()?;
        let app = crate::web::router(state);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await?;
            Ok(())
        });

        Ok((addr, handle))
    }
}
