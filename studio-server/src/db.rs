//! SQLite persistence layer.
//!
//! Stores projects with their requirements, knowledge base and the agent
//! outputs of every run. Child rows are removed with their project.
//! Uses WAL mode for concurrent reads during writes.

use std::fmt;
use std::path::Path;

use rusqlite::{Connection, OptionalExtension, Result as SqlResult, Row, params};
use serde::{Serialize, Serializer};

use studio_agents::agents::Guidelines;

const STARTING: &str = "starting";
const RUNNING: &str = "running";
const ERROR_PREFIX: &str = "error: ";

/// Lifecycle of a project's most recent run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectStatus {
    Draft,
    Starting,
    Running,
    Completed,
    Error(String),
}

impl ProjectStatus {
    fn parse(raw: &str) -> Self {
        match raw {
            "draft" => ProjectStatus::Draft,
            STARTING => ProjectStatus::Starting,
            RUNNING => ProjectStatus::Running,
            "completed" => ProjectStatus::Completed,
            other => ProjectStatus::Error(
                other.strip_prefix(ERROR_PREFIX).unwrap_or(other).to_string(),
            ),
        }
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectStatus::Draft => f.write_str("draft"),
            ProjectStatus::Starting => f.write_str(STARTING),
            ProjectStatus::Running => f.write_str(RUNNING),
            ProjectStatus::Completed => f.write_str("completed"),
            ProjectStatus::Error(msg) => write!(f, "{ERROR_PREFIX}{msg}"),
        }
    }
}

impl Serialize for ProjectStatus {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

/// Outcome of an update that only applies while no run is in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guarded<T> {
    Done(T),
    Busy,
    Missing,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectRow {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub repo_url: Option<String>,
    pub status: ProjectStatus,
    pub run_count: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequirementRow {
    pub id: i64,
    pub project_id: i64,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeBaseRow {
    pub id: i64,
    pub project_id: i64,
    #[serde(flatten)]
    pub guidelines: Guidelines,
}

/// One agent's deliverable from one run.
#[derive(Debug, Clone, Serialize)]
pub struct AgentOutputRow {
    pub id: i64,
    pub project_id: i64,
    pub run: i64,
    pub agent_name: String,
    pub task_name: String,
    pub output_content: String,
    pub created_at: String,
}

/// Database handle wrapping a SQLite connection.
pub struct Db {
    conn: Connection,
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn project_from_row(row: &Row<'_>) -> SqlResult<ProjectRow> {
    let status: String = row.get(4)?;
    Ok(ProjectRow {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        repo_url: row.get(3)?,
        status: ProjectStatus::parse(&status),
        run_count: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn requirement_from_row(row: &Row<'_>) -> SqlResult<RequirementRow> {
    Ok(RequirementRow {
        id: row.get(0)?,
        project_id: row.get(1)?,
        content: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn knowledge_base_from_row(row: &Row<'_>) -> SqlResult<KnowledgeBaseRow> {
    Ok(KnowledgeBaseRow {
        id: row.get(0)?,
        project_id: row.get(1)?,
        guidelines: Guidelines {
            pm_guidelines: row.get(2)?,
            architect_guidelines: row.get(3)?,
            systems_guidelines: row.get(4)?,
            ai_guidelines: row.get(5)?,
            ux_guidelines: row.get(6)?,
            security_standards: row.get(7)?,
        },
    })
}

fn output_from_row(row: &Row<'_>) -> SqlResult<AgentOutputRow> {
    Ok(AgentOutputRow {
        id: row.get(0)?,
        project_id: row.get(1)?,
        run: row.get(2)?,
        agent_name: row.get(3)?,
        task_name: row.get(4)?,
        output_content: row.get(5)?,
        created_at: row.get(6)?,
    })
}

const PROJECT_COLUMNS: &str = "id, title, description, repo_url, status, run_count, created_at";
const KNOWLEDGE_BASE_COLUMNS: &str = "id, project_id, pm_guidelines, architect_guidelines, \
     systems_guidelines, ai_guidelines, ux_guidelines, security_standards";
const OUTPUT_COLUMNS: &str =
    "id, project_id, run, agent_name, task_name, output_content, created_at";

impl Db {
    /// Open (or create) the database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> SqlResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_memory() -> SqlResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> SqlResult<()> {
        self.conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        self.conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS projects (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                title       TEXT NOT NULL,
                description TEXT,
                repo_url    TEXT,
                status      TEXT NOT NULL DEFAULT 'draft',
                run_count   INTEGER NOT NULL DEFAULT 0,
                created_at  TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS requirements (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id  INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                content     TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_requirements_project
                ON requirements(project_id, id);
            CREATE TABLE IF NOT EXISTS knowledge_bases (
                id                   INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id           INTEGER NOT NULL UNIQUE
                                     REFERENCES projects(id) ON DELETE CASCADE,
                pm_guidelines        TEXT,
                architect_guidelines TEXT,
                systems_guidelines   TEXT,
                ai_guidelines        TEXT,
                ux_guidelines        TEXT,
                security_standards   TEXT
            );
            CREATE TABLE IF NOT EXISTS agent_outputs (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id      INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                run             INTEGER NOT NULL,
                agent_name      TEXT NOT NULL,
                task_name       TEXT NOT NULL,
                output_content  TEXT NOT NULL,
                created_at      TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_outputs_project
                ON agent_outputs(project_id, run, id);
            ",
        )?;
        Ok(())
    }

    // ── Projects ────────────────────────────────────────────────────────

    /// Insert a project in `draft` along with its empty knowledge base.
    pub fn create_project(
        &self,
        title: &str,
        description: Option<&str>,
        repo_url: Option<&str>,
    ) -> SqlResult<ProjectRow> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO projects (title, description, repo_url, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![title, description, repo_url, now()],
        )?;
        let id = tx.last_insert_rowid();
        tx.execute(
            "INSERT INTO knowledge_bases (project_id) VALUES (?1)",
            params![id],
        )?;
        tx.commit()?;
        self.get_project(id)?
            .ok_or(rusqlite::Error::QueryReturnedNoRows)
    }

    pub fn get_project(&self, id: i64) -> SqlResult<Option<ProjectRow>> {
        self.conn
            .query_row(
                &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1"),
                params![id],
                project_from_row,
            )
            .optional()
    }

    pub fn list_projects(&self, skip: i64, limit: i64) -> SqlResult<Vec<ProjectRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects ORDER BY id LIMIT ?1 OFFSET ?2"
        ))?;
        let rows = stmt.query_map(params![limit, skip], project_from_row)?;
        rows.collect()
    }

    /// Delete a project and everything hanging off it, unless a run is in flight.
    pub fn delete_project(&self, id: i64) -> SqlResult<Guarded<()>> {
        let n = self.conn.execute(
            &format!(
                "DELETE FROM projects WHERE id = ?1 AND status NOT IN ('{STARTING}', '{RUNNING}')"
            ),
            params![id],
        )?;
        if n > 0 {
            return Ok(Guarded::Done(()));
        }
        self.missing_or_busy(id)
    }

    /// Claim a new run: `starting`, run_count + 1. Returns the run number.
    ///
    /// Check and update happen in a single statement, so of two concurrent
    /// triggers only one can see a non-busy status.
    pub fn begin_run(&self, id: i64) -> SqlResult<Guarded<i64>> {
        let n = self.conn.execute(
            &format!(
                "UPDATE projects SET status = '{STARTING}', run_count = run_count + 1
                 WHERE id = ?1 AND status NOT IN ('{STARTING}', '{RUNNING}')"
            ),
            params![id],
        )?;
        if n == 0 {
            return self.missing_or_busy(id);
        }
        let run = self.conn.query_row(
            "SELECT run_count FROM projects WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        Ok(Guarded::Done(run))
    }

    fn missing_or_busy<T>(&self, id: i64) -> SqlResult<Guarded<T>> {
        Ok(match self.get_project(id)? {
            Some(_) => Guarded::Busy,
            None => Guarded::Missing,
        })
    }

    pub fn set_status(&self, id: i64, status: &ProjectStatus) -> SqlResult<()> {
        self.conn.execute(
            "UPDATE projects SET status = ?1 WHERE id = ?2",
            params![status.to_string(), id],
        )?;
        Ok(())
    }

    /// Mark runs left in flight by a previous process as failed.
    pub fn fail_interrupted_runs(&self, reason: &str) -> SqlResult<usize> {
        let status = ProjectStatus::Error(reason.to_string());
        self.conn.execute(
            &format!("UPDATE projects SET status = ?1 WHERE status IN ('{STARTING}', '{RUNNING}')"),
            params![status.to_string()],
        )
    }

    // ── Requirements ────────────────────────────────────────────────────

    pub fn add_requirement(&self, project_id: i64, content: &str) -> SqlResult<RequirementRow> {
        let created_at = now();
        self.conn.execute(
            "INSERT INTO requirements (project_id, content, created_at) VALUES (?1, ?2, ?3)",
            params![project_id, content, created_at],
        )?;
        Ok(RequirementRow {
            id: self.conn.last_insert_rowid(),
            project_id,
            content: content.to_string(),
            created_at,
        })
    }

    /// Requirements in insertion order.
    pub fn requirements(&self, project_id: i64) -> SqlResult<Vec<RequirementRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, project_id, content, created_at FROM requirements
             WHERE project_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![project_id], requirement_from_row)?;
        rows.collect()
    }

    // ── Knowledge base ──────────────────────────────────────────────────

    pub fn knowledge_base(&self, project_id: i64) -> SqlResult<Option<KnowledgeBaseRow>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {KNOWLEDGE_BASE_COLUMNS} FROM knowledge_bases WHERE project_id = ?1"
                ),
                params![project_id],
                knowledge_base_from_row,
            )
            .optional()
    }

    /// Replace every guideline field of the project's knowledge base.
    pub fn upsert_knowledge_base(
        &self,
        project_id: i64,
        g: &Guidelines,
    ) -> SqlResult<KnowledgeBaseRow> {
        self.conn.execute(
            "INSERT INTO knowledge_bases (project_id, pm_guidelines, architect_guidelines,
                 systems_guidelines, ai_guidelines, ux_guidelines, security_standards)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(project_id) DO UPDATE SET
                 pm_guidelines = excluded.pm_guidelines,
                 architect_guidelines = excluded.architect_guidelines,
                 systems_guidelines = excluded.systems_guidelines,
                 ai_guidelines = excluded.ai_guidelines,
                 ux_guidelines = excluded.ux_guidelines,
                 security_standards = excluded.security_standards",
            params![
                project_id,
                g.pm_guidelines,
                g.architect_guidelines,
                g.systems_guidelines,
                g.ai_guidelines,
                g.ux_guidelines,
                g.security_standards,
            ],
        )?;
        self.knowledge_base(project_id)?
            .ok_or(rusqlite::Error::QueryReturnedNoRows)
    }

    // ── Agent outputs ───────────────────────────────────────────────────

    pub fn add_output(
        &self,
        project_id: i64,
        run: i64,
        agent_name: &str,
        task_name: &str,
        content: &str,
    ) -> SqlResult<AgentOutputRow> {
        let created_at = now();
        self.conn.execute(
            "INSERT INTO agent_outputs
                 (project_id, run, agent_name, task_name, output_content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![project_id, run, agent_name, task_name, content, created_at],
        )?;
        Ok(AgentOutputRow {
            id: self.conn.last_insert_rowid(),
            project_id,
            run,
            agent_name: agent_name.to_string(),
            task_name: task_name.to_string(),
            output_content: content.to_string(),
            created_at,
        })
    }

    /// Outputs in the order they were produced, optionally for a single run.
    pub fn outputs(&self, project_id: i64, run: Option<i64>) -> SqlResult<Vec<AgentOutputRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {OUTPUT_COLUMNS} FROM agent_outputs
             WHERE project_id = ?1 AND (?2 IS NULL OR run = ?2) ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![project_id, run], output_from_row)?;
        rows.collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project(db: &Db) -> ProjectRow {
        db.create_project("Chat real estate", Some("Listings you can talk to"), None)
            .unwrap()
    }

    #[test]
    fn new_project_is_draft_with_empty_knowledge_base() {
        let db = Db::open_memory().unwrap();
        let p = project(&db);
        assert_eq!(p.status, ProjectStatus::Draft);
        assert_eq!(p.run_count, 0);

        let kb = db.knowledge_base(p.id).unwrap().unwrap();
        assert_eq!(kb.guidelines, Guidelines::default());
    }

    #[test]
    fn list_pages_in_creation_order() {
        let db = Db::open_memory().unwrap();
        for i in 0..5 {
            db.create_project(&format!("p{i}"), None, None).unwrap();
        }
        let titles: Vec<_> = db
            .list_projects(1, 2)
            .unwrap()
            .into_iter()
            .map(|p| p.title)
            .collect();
        assert_eq!(titles, ["p1", "p2"]);
    }

    #[test]
    fn begin_run_claims_once() {
        let db = Db::open_memory().unwrap();
        let p = project(&db);

        assert_eq!(db.begin_run(p.id).unwrap(), Guarded::Done(1));
        assert_eq!(db.begin_run(p.id).unwrap(), Guarded::Busy);

        db.set_status(p.id, &ProjectStatus::Running).unwrap();
        assert_eq!(db.begin_run(p.id).unwrap(), Guarded::Busy);

        db.set_status(p.id, &ProjectStatus::Error("boom".into())).unwrap();
        assert_eq!(db.begin_run(p.id).unwrap(), Guarded::Done(2));

        assert_eq!(db.begin_run(999).unwrap(), Guarded::<i64>::Missing);
    }

    #[test]
    fn status_round_trips_through_storage() {
        let db = Db::open_memory().unwrap();
        let p = project(&db);
        let failed = ProjectStatus::Error("task 3 (CISO) failed: rate limited".into());
        db.set_status(p.id, &failed).unwrap();

        let stored = db.get_project(p.id).unwrap().unwrap();
        assert_eq!(stored.status, failed);
        assert_eq!(
            serde_json::to_value(&stored).unwrap()["status"],
            "error: task 3 (CISO) failed: rate limited"
        );
    }

    #[test]
    fn delete_cascades_and_refuses_in_flight() {
        let db = Db::open_memory().unwrap();
        let p = project(&db);
        db.add_requirement(p.id, "Search by voice").unwrap();
        db.add_output(p.id, 1, "Lead Product Manager", "Break it down", "Features")
            .unwrap();

        db.begin_run(p.id).unwrap();
        assert_eq!(db.delete_project(p.id).unwrap(), Guarded::Busy);

        db.set_status(p.id, &ProjectStatus::Completed).unwrap();
        assert_eq!(db.delete_project(p.id).unwrap(), Guarded::Done(()));
        assert_eq!(db.delete_project(p.id).unwrap(), Guarded::<()>::Missing);

        assert!(db.requirements(p.id).unwrap().is_empty());
        assert!(db.outputs(p.id, None).unwrap().is_empty());
        assert!(db.knowledge_base(p.id).unwrap().is_none());
    }

    #[test]
    fn requirement_needs_existing_project() {
        let db = Db::open_memory().unwrap();
        assert!(db.add_requirement(42, "orphan").is_err());
    }

    #[test]
    fn upsert_replaces_every_field() {
        let db = Db::open_memory().unwrap();
        let p = project(&db);
        let first = Guidelines {
            pm_guidelines: Some("MoSCoW".into()),
            security_standards: Some("OWASP ASVS L2".into()),
            ..Default::default()
        };
        db.upsert_knowledge_base(p.id, &first).unwrap();

        let second = Guidelines {
            ux_guidelines: Some("WCAG AA".into()),
            ..Default::default()
        };
        let kb = db.upsert_knowledge_base(p.id, &second).unwrap();
        assert_eq!(kb.guidelines, second);
    }

    #[test]
    fn outputs_filter_by_run() {
        let db = Db::open_memory().unwrap();
        let p = project(&db);
        db.add_output(p.id, 1, "A", "t1", "first").unwrap();
        db.add_output(p.id, 2, "A", "t1", "second").unwrap();
        db.add_output(p.id, 2, "B", "t2", "third").unwrap();

        let all: Vec<_> = db
            .outputs(p.id, None)
            .unwrap()
            .into_iter()
            .map(|o| o.output_content)
            .collect();
        assert_eq!(all, ["first", "second", "third"]);
        assert_eq!(db.outputs(p.id, Some(2)).unwrap().len(), 2);
    }

    #[test]
    fn interrupted_runs_fail_on_restart() {
        let db = Db::open_memory().unwrap();
        let a = project(&db);
        let b = project(&db);
        db.begin_run(a.id).unwrap();

        assert_eq!(db.fail_interrupted_runs("server restarted").unwrap(), 1);
        assert_eq!(
            db.get_project(a.id).unwrap().unwrap().status,
            ProjectStatus::Error("server restarted".into())
        );
        assert_eq!(db.get_project(b.id).unwrap().unwrap().status, ProjectStatus::Draft);
    }
}
