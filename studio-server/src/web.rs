//! REST API over projects, their inputs and agent outputs.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{FromRequest, FromRequestParts, Path, Query, Request, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use studio_agents::agents::Guidelines;
use studio_agents::github::RepoCoordinate;

use crate::db::{
    AgentOutputRow, Db, Guarded, KnowledgeBaseRow, ProjectRow, RequirementRow,
};
use crate::error::{ApiError, ApiResult};
use crate::runner;
use crate::server::SharedState;

const DEFAULT_PAGE: i64 = 100;
const MAX_PAGE: i64 = 500;

// ── Request / response bodies ──────────────────────────────────────────

#[derive(Deserialize)]
struct CreateProject {
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    repo_url: Option<String>,
}

#[derive(Deserialize)]
struct CreateRequirement {
    content: String,
}

#[derive(Deserialize)]
struct PageQuery {
    skip: Option<i64>,
    limit: Option<i64>,
}

#[derive(Deserialize)]
struct OutputsQuery {
    run: Option<i64>,
}

/// A project with everything attached to it.
#[derive(Serialize)]
struct ProjectDetail {
    #[serde(flatten)]
    project: ProjectRow,
    requirements: Vec<RequirementRow>,
    knowledge_base: Option<KnowledgeBaseRow>,
    agent_outputs: Vec<AgentOutputRow>,
}

#[derive(Serialize)]
struct RunAccepted {
    status: &'static str,
    message: &'static str,
    run: i64,
}

// ── Extractors ─────────────────────────────────────────────────────────

/// `{id}` path segment; a non-numeric id is a validation error.
struct ProjectId(i64);

impl<S: Send + Sync> FromRequestParts<S> for ProjectId {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, ApiError> {
        let Path(id) = Path::<i64>::from_request_parts(parts, state).await?;
        Ok(ProjectId(id))
    }
}

/// JSON body whose rejections are reported as `{"detail": ...}`.
struct Body<T>(T);

impl<T, S> FromRequest<S> for Body<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, ApiError> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Body(value))
    }
}

/// Query string whose rejections are reported as `{"detail": ...}`.
struct Params<T>(T);

impl<T, S> FromRequestParts<S> for Params<T>
where
    Query<T>: FromRequestParts<S, Rejection = QueryRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, ApiError> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        Ok(Params(value))
    }
}

// ── Axum router ────────────────────────────────────────────────────────

pub fn router(state: Arc<SharedState>) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/projects", get(list_projects).post(create_project))
        .route("/projects/{id}", get(get_project).delete(delete_project))
        .route("/projects/{id}/requirements", post(add_requirement))
        .route("/projects/{id}/knowledge_base", put(put_knowledge_base))
        .route("/projects/{id}/outputs", get(list_outputs))
        .route("/projects/{id}/run", post(trigger_run))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn detail(db: &Db, project: ProjectRow) -> rusqlite::Result<ProjectDetail> {
    Ok(ProjectDetail {
        requirements: db.requirements(project.id)?,
        knowledge_base: db.knowledge_base(project.id)?,
        agent_outputs: db.outputs(project.id, None)?,
        project,
    })
}

fn require_project(db: &Db, id: i64) -> ApiResult<ProjectRow> {
    db.get_project(id)?.ok_or(ApiError::NotFound("Project"))
}

/// Trimmed text, or `None` when blank.
fn non_blank(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

async fn ping() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn create_project(
    State(state): State<Arc<SharedState>>,
    Body(body): Body<CreateProject>,
) -> ApiResult<(StatusCode, Json<ProjectDetail>)> {
    let title = body.title.trim();
    if title.is_empty() {
        return Err(ApiError::Validation("title must not be empty".into()));
    }
    let repo_url = non_blank(body.repo_url);
    if let Some(url) = &repo_url {
        if RepoCoordinate::parse(url).is_none() {
            return Err(ApiError::Validation(format!(
                "repo_url is not a GitHub repository: {url}"
            )));
        }
    }
    let description = non_blank(body.description);

    let created = state.with_db(|db| {
        let project = db.create_project(title, description.as_deref(), repo_url.as_deref())?;
        detail(db, project)
    })?;
    tracing::info!(project_id = created.project.id, "Project created");
    Ok((StatusCode::CREATED, Json(created)))
}

async fn list_projects(
    Params(page): Params<PageQuery>,
    State(state): State<Arc<SharedState>>,
) -> ApiResult<Json<Vec<ProjectDetail>>> {
    let skip = page.skip.unwrap_or(0).max(0);
    let limit = page.limit.unwrap_or(DEFAULT_PAGE).clamp(0, MAX_PAGE);
    let projects = state.with_db(|db| {
        db.list_projects(skip, limit)?
            .into_iter()
            .map(|p| detail(db, p))
            .collect::<rusqlite::Result<Vec<_>>>()
    })?;
    Ok(Json(projects))
}

async fn get_project(
    ProjectId(id): ProjectId,
    State(state): State<Arc<SharedState>>,
) -> ApiResult<Json<ProjectDetail>> {
    let project = state.with_db(|db| {
        let project = require_project(db, id)?;
        Ok::<_, ApiError>(detail(db, project)?)
    })?;
    Ok(Json(project))
}

async fn delete_project(
    ProjectId(id): ProjectId,
    State(state): State<Arc<SharedState>>,
) -> ApiResult<StatusCode> {
    match state.with_db(|db| db.delete_project(id))? {
        Guarded::Done(()) => {
            tracing::info!(project_id = id, "Project deleted");
            Ok(StatusCode::NO_CONTENT)
        }
        Guarded::Busy => Err(ApiError::Conflict(
            "Project has a run in progress; wait for it to finish".into(),
        )),
        Guarded::Missing => Err(ApiError::NotFound("Project")),
    }
}

async fn add_requirement(
    ProjectId(id): ProjectId,
    State(state): State<Arc<SharedState>>,
    Body(body): Body<CreateRequirement>,
) -> ApiResult<(StatusCode, Json<RequirementRow>)> {
    let content = body.content.trim();
    if content.is_empty() {
        return Err(ApiError::Validation("content must not be empty".into()));
    }
    let requirement = state.with_db(|db| {
        require_project(db, id)?;
        Ok::<_, ApiError>(db.add_requirement(id, content)?)
    })?;
    Ok((StatusCode::CREATED, Json(requirement)))
}

async fn put_knowledge_base(
    ProjectId(id): ProjectId,
    State(state): State<Arc<SharedState>>,
    Body(body): Body<Guidelines>,
) -> ApiResult<Json<KnowledgeBaseRow>> {
    let kb = state.with_db(|db| {
        require_project(db, id)?;
        Ok::<_, ApiError>(db.upsert_knowledge_base(id, &body)?)
    })?;
    Ok(Json(kb))
}

async fn list_outputs(
    ProjectId(id): ProjectId,
    Params(query): Params<OutputsQuery>,
    State(state): State<Arc<SharedState>>,
) -> ApiResult<Json<Vec<AgentOutputRow>>> {
    let outputs = state.with_db(|db| {
        require_project(db, id)?;
        Ok::<_, ApiError>(db.outputs(id, query.run)?)
    })?;
    Ok(Json(outputs))
}

async fn trigger_run(
    ProjectId(id): ProjectId,
    State(state): State<Arc<SharedState>>,
) -> ApiResult<(StatusCode, Json<RunAccepted>)> {
    match state.with_db(|db| db.begin_run(id))? {
        Guarded::Done(run) => {
            tracing::info!(project_id = id, run, "Run accepted");
            runner::spawn(Arc::clone(&state), id, run);
            Ok((
                StatusCode::ACCEPTED,
                Json(RunAccepted {
                    status: "accepted",
                    message: "Pipeline execution started in background.",
                    run,
                }),
            ))
        }
        Guarded::Busy => Err(ApiError::Conflict("Project is already running".into())),
        Guarded::Missing => Err(ApiError::NotFound("Project")),
    }
}
