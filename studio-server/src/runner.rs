//! Background runs: gather a project's inputs, drive the team, persist results.

use std::sync::Arc;

use anyhow::{Context, Result};

use studio_agents::pipeline::{NO_REQUIREMENTS, PipelineBuilder, RepoMode, TaskOutput, Wiring};

use crate::db::ProjectStatus;
use crate::server::SharedState;

/// Start a claimed run in the background. The caller has already moved the
/// project to `starting` and bumped its run count.
pub fn spawn(state: Arc<SharedState>, project_id: i64, run: i64) {
    tokio::spawn(async move {
        let inner = tokio::spawn(execute(Arc::clone(&state), project_id, run));
        if let Err(e) = inner.await {
            tracing::error!(project_id, run, "Run aborted: {e}");
            let status = ProjectStatus::Error(format!("run aborted: {e}"));
            if let Err(e) = state.with_db(|db| db.set_status(project_id, &status)) {
                tracing::error!(project_id, "Failed to record aborted run: {e}");
            }
        }
    });
}

/// Run the full team for one project and record the final status.
pub async fn execute(state: Arc<SharedState>, project_id: i64, run: i64) {
    let status = match drive(&state, project_id, run).await {
        Ok(completed) => {
            tracing::info!(project_id, run, completed, "Run completed");
            ProjectStatus::Completed
        }
        Err(e) => {
            tracing::warn!(project_id, run, "Run failed: {e:#}");
            ProjectStatus::Error(format!("{e:#}"))
        }
    };
    if let Err(e) = state.with_db(|db| db.set_status(project_id, &status)) {
        tracing::error!(project_id, "Failed to record run status: {e}");
    }
}

async fn drive(state: &Arc<SharedState>, project_id: i64, run: i64) -> Result<usize> {
    let (project, requirements, guidelines) = state
        .with_db(|db| -> rusqlite::Result<_> {
            let project = db.get_project(project_id)?;
            db.set_status(project_id, &ProjectStatus::Running)?;
            let requirements = db.requirements(project_id)?;
            let kb = db.knowledge_base(project_id)?;
            Ok((project, requirements, kb.map(|kb| kb.guidelines).unwrap_or_default()))
        })
        .context("loading project inputs")?;
    let project = project.with_context(|| format!("project {project_id} no longer exists"))?;

    let requirements: Vec<&str> = requirements
        .iter()
        .map(|r| r.content.trim())
        .filter(|c| !c.is_empty())
        .collect();
    let requirements = if requirements.is_empty() {
        NO_REQUIREMENTS.to_string()
    } else {
        requirements.join("\n\n")
    };
    let brief = match project.description.as_deref().map(str::trim) {
        Some(desc) if !desc.is_empty() => {
            format!("Project: {}\n{desc}\n\n{requirements}", project.title)
        }
        _ => requirements,
    };

    let repo_mode = RepoMode::from_url(project.repo_url.as_deref());
    let accessor = repo_mode.coordinate().map(|c| state.github(c));

    let pipeline = PipelineBuilder::new(&brief)
        .wiring(Wiring::Full)
        .repo(repo_mode)
        .guidelines(guidelines)
        .max_tool_rounds(state.config.max_tool_rounds)
        .build();

    tracing::info!(
        project_id,
        run,
        tasks = pipeline.tasks().len(),
        repo = ?project.repo_url,
        "Run started"
    );

    let mut persist = |out: &TaskOutput| -> Result<()> {
        state
            .with_db(|db| {
                db.add_output(project_id, run, out.role.name(), &out.task_name, &out.output)
            })
            .context("saving agent output")?;
        Ok(())
    };
    let outputs = pipeline
        .run(state.model.as_ref(), accessor.as_ref(), &mut persist)
        .await?;
    Ok(outputs.len())
}
