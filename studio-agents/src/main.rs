//! studio-crew: run the architecture team from the command line.
//!
//!   studio-crew --idea "A real estate site you can chat with"
//!   studio-crew --requirements requirements.md --repo octo/widgets
//!   studio-crew --idea "..." --wiring audit
//!
//! Requires ANTHROPIC_API_KEY. GITHUB_PERSONAL_ACCESS_TOKEN is used when
//! reading a private repository.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use studio_agents::github::{self, GithubRepo};
use studio_agents::llm::{self, LlmClient};
use studio_agents::pipeline::{self, PipelineBuilder, RepoMode, TaskOutput, Wiring};

#[derive(Parser)]
#[command(name = "studio-crew", about = "Draft an architecture report with an LLM agent team")]
struct Args {
    /// Project idea, inline
    #[arg(long, conflicts_with = "requirements")]
    idea: Option<String>,

    /// File holding the raw requirements
    #[arg(long)]
    requirements: Option<PathBuf>,

    /// GitHub repository to analyze (owner/name or URL)
    #[arg(long)]
    repo: Option<String>,

    /// Task list to run
    #[arg(long, value_enum, default_value_t = Wiring::Full)]
    wiring: Wiring,

    /// Claude model to use
    #[arg(long, default_value = llm::DEFAULT_MODEL)]
    model: String,

    /// Token cap for each model turn
    #[arg(long, default_value_t = llm::DEFAULT_MAX_TOKENS)]
    max_tokens: u32,

    /// Anthropic API base URL
    #[arg(long, env = "ANTHROPIC_API_URL", default_value = llm::DEFAULT_API_BASE)]
    anthropic_api: String,

    /// Sampling temperature for every agent
    #[arg(long, default_value_t = llm::DEFAULT_TEMPERATURE)]
    temperature: f32,

    /// Tool rounds the architect gets before it must answer
    #[arg(long, default_value_t = pipeline::DEFAULT_MAX_TOOL_ROUNDS)]
    max_tool_rounds: usize,

    /// Anthropic API key (or set ANTHROPIC_API_KEY env var)
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    api_key: String,

    /// GitHub token (or set GITHUB_PERSONAL_ACCESS_TOKEN env var)
    #[arg(long, env = "GITHUB_PERSONAL_ACCESS_TOKEN", hide_env_values = true)]
    github_token: Option<String>,

    /// GitHub API base URL
    #[arg(long, default_value = github::DEFAULT_API_BASE)]
    github_api: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "studio_agents=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let brief = match (&args.idea, &args.requirements) {
        (Some(idea), _) => idea.clone(),
        (None, Some(path)) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?,
        (None, None) => anyhow::bail!("Give the team something to work on: --idea or --requirements"),
    };

    let repo_mode = match args.repo.as_deref() {
        Some(raw) => RepoMode::WithRepository(
            github::RepoCoordinate::parse(raw)
                .with_context(|| format!("Not a GitHub repository: {raw}"))?,
        ),
        None => RepoMode::WithoutRepository,
    };
    let accessor = repo_mode.coordinate().map(|c| {
        GithubRepo::new(
            reqwest::Client::new(),
            &args.github_api,
            args.github_token.clone(),
            c.clone(),
        )
    });

    let llm = LlmClient::new(args.api_key.clone())
        .with_api_base(&args.anthropic_api)
        .with_model(&args.model)
        .with_max_tokens(args.max_tokens)
        .with_temperature(args.temperature);

    let pipeline = PipelineBuilder::new(&brief)
        .wiring(args.wiring)
        .repo(repo_mode)
        .max_tool_rounds(args.max_tool_rounds)
        .build();

    tracing::info!(
        wiring = ?args.wiring,
        tasks = pipeline.tasks().len(),
        repo = ?args.repo,
        model = %llm.model(),
        "Starting the architecture team"
    );

    let mut print_task = |out: &TaskOutput| -> Result<()> {
        println!("\n==========================================");
        println!("{}", out.role.name());
        println!("==========================================\n");
        println!("{}", out.output);
        Ok(())
    };
    let outputs = pipeline
        .run(&llm, accessor.as_ref(), &mut print_task)
        .await?;

    println!("\n\nFINAL ARCHITECTURE REPORT:");
    println!("==========================================\n");
    println!("{}", pipeline::render_report(&outputs));
    Ok(())
}
