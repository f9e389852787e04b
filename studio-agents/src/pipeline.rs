//! Sequential task pipeline.
//!
//! A [`Pipeline`] is an ordered list of tasks, each executed by one agent.
//! Tasks run strictly one after another; every completed task's output is
//! appended to the context log that later tasks see. The first failure
//! ends the run.

use anyhow::{Context, Result};

use crate::agents::{Agent, Guidelines, Role};
use crate::github::{GithubRepo, RepoCoordinate};
use crate::llm::{ChatModel, ContentBlock, Message, ToolChoice, ToolResultBlock};
use crate::tools;

/// Placeholder brief when a project has no requirement text.
pub const NO_REQUIREMENTS: &str = "No specific requirements provided.";

/// Tool rounds an agent gets before it must answer without tools.
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 20;

const LABEL_CHARS: usize = 50;

/// Whether the team may read a remote repository during the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoMode {
    WithRepository(RepoCoordinate),
    WithoutRepository,
}

impl RepoMode {
    /// `WithRepository` when `url` parses as a repository coordinate.
    pub fn from_url(url: Option<&str>) -> Self {
        url.and_then(RepoCoordinate::parse)
            .map(RepoMode::WithRepository)
            .unwrap_or(RepoMode::WithoutRepository)
    }

    pub fn is_available(&self) -> bool {
        matches!(self, RepoMode::WithRepository(_))
    }

    pub fn coordinate(&self) -> Option<&RepoCoordinate> {
        match self {
            RepoMode::WithRepository(c) => Some(c),
            RepoMode::WithoutRepository => None,
        }
    }
}

/// Which task list the run assembles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Wiring {
    /// Requirements breakdown, architecture, infrastructure, AI, UX, security.
    #[default]
    Full,
    /// Architecture, infrastructure, AI, security.
    Audit,
}

/// One step of the pipeline.
#[derive(Debug, Clone)]
pub struct Task {
    /// Stable identifier used in logs.
    pub name: &'static str,
    pub agent: Agent,
    pub description: String,
    pub expected_output: String,
}

impl Task {
    fn new(name: &'static str, agent: Agent, description: String, expected_output: &str) -> Self {
        Self {
            name,
            agent,
            description,
            expected_output: expected_output.to_string(),
        }
    }

    /// Truncated description stored with the task's output.
    pub fn label(&self) -> String {
        let head: String = self.description.chars().take(LABEL_CHARS).collect();
        format!("{head}...")
    }

    /// User prompt for this task given the outputs of earlier tasks.
    pub fn prompt(&self, context: &[TaskOutput]) -> String {
        let mut prompt = format!(
            "{}\n\nThis is the expected criteria for your final answer: {}",
            self.description, self.expected_output
        );
        if !context.is_empty() {
            prompt.push_str("\n\n# Context from previous tasks");
            for prior in context {
                prompt.push_str(&format!("\n\n## {}\n{}", prior.role.name(), prior.output));
            }
        }
        prompt
    }
}

/// The text a completed task produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutput {
    pub role: Role,
    pub task_name: String,
    pub output: String,
}

/// Assembles the task list for one run.
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    brief: String,
    wiring: Wiring,
    repo: RepoMode,
    guidelines: Guidelines,
    max_tool_rounds: usize,
}

impl PipelineBuilder {
    /// `brief` is the project idea or the concatenated requirements.
    pub fn new(brief: &str) -> Self {
        let brief = brief.trim();
        Self {
            brief: if brief.is_empty() {
                NO_REQUIREMENTS.to_string()
            } else {
                brief.to_string()
            },
            wiring: Wiring::default(),
            repo: RepoMode::WithoutRepository,
            guidelines: Guidelines::default(),
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }

    pub fn wiring(mut self, wiring: Wiring) -> Self {
        self.wiring = wiring;
        self
    }

    pub fn repo(mut self, repo: RepoMode) -> Self {
        self.repo = repo;
        self
    }

    pub fn guidelines(mut self, guidelines: Guidelines) -> Self {
        self.guidelines = guidelines;
        self
    }

    pub fn max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    pub fn build(self) -> Pipeline {
        let agent = |role| Agent::new(role, &self.guidelines, &self.repo);
        let brief = &self.brief;

        let tasks = match self.wiring {
            Wiring::Full => vec![
                Task::new(
                    "deconstruct_requirements",
                    agent(Role::ProductManager),
                    format!(
                        "Analyze the following raw product requirements:\n{brief}\n\nIdentify the core, distinct features of the application and create a structured breakdown."
                    ),
                    "A structured markdown document listing each atomic feature and its core user stories.",
                ),
                full_architecture_task(agent(Role::Architect), &self.repo),
                Task::new(
                    "plan_infrastructure",
                    agent(Role::SystemsEngineer),
                    "Analyze the architecture drafted by the Lead Architect. Determine the necessary cloud resources (compute, databases, caching). Outline a deployment strategy.".to_string(),
                    "A bulleted list of required infrastructure components and a step-by-step deployment guide.",
                ),
                Task::new(
                    "design_ai_features",
                    agent(Role::AiSpecialist),
                    "Review the architecture and identify where LLMs or AI agents can provide the most value. Define the required prompts, data pipelines, and API integrations.".to_string(),
                    "A detailed specification for the AI features, including suggested model choices and data flow diagrams.",
                ),
                Task::new(
                    "design_user_experience",
                    agent(Role::UxDesigner),
                    "Critique the technical architecture from the end-user's perspective. Identify potential friction points. Suggest UI components and user flows that simplify complex interactions.".to_string(),
                    "A UX review document outlining potential usability issues in the architecture and concrete suggestions for an intuitive user interface layout and flow.",
                ),
                Task::new(
                    "audit_security",
                    agent(Role::SecurityOfficer),
                    "Review the architecture, infrastructure plan, and AI design. Identify potential vulnerabilities, ensure proper data encryption strategies are implemented, and verify compliance with standard privacy regulations (e.g., GDPR/CCPA concepts).".to_string(),
                    "A security audit report detailing identified risks and mandatory changes required to secure the architecture before deployment.",
                ),
            ],
            Wiring::Audit => vec![
                audit_architecture_task(agent(Role::Architect), &self.repo, brief),
                Task::new(
                    "plan_infrastructure",
                    agent(Role::SystemsEngineer),
                    "Review the architecture blueprint. Decide what database to use (like PostgreSQL or MongoDB) and suggest where to host the application (like AWS or Vercel). Explain why.".to_string(),
                    "A summary of the recommended database and cloud hosting setup.",
                ),
                Task::new(
                    "design_ai_features",
                    agent(Role::AiSpecialist),
                    "Review the architecture and infrastructure plans. Suggest 2 specific ways AI can be integrated into this application to improve the user experience, and explain technically how to build them.".to_string(),
                    "A short report detailing 2 AI features and the required tools/APIs to build them.",
                ),
                Task::new(
                    "audit_security",
                    agent(Role::SecurityOfficer),
                    "Review the proposed architecture, infrastructure, and AI features. Identify the top 3 security or compliance risks (like prompt injection, data leaks, or regulatory issues) and how to mitigate them.".to_string(),
                    "A security audit report listing 3 major risks, categorized by severity, with clear technical mitigation strategies.",
                ),
            ],
        };

        Pipeline {
            tasks,
            repo: self.repo,
            max_tool_rounds: self.max_tool_rounds,
        }
    }
}

fn full_architecture_task(architect: Agent, repo: &RepoMode) -> Task {
    match repo {
        RepoMode::WithRepository(coordinate) => Task::new(
            "draft_architecture",
            architect,
            format!(
                "1. READ the feature breakdown produced by the Product Manager to understand the scope.\n2. Before drafting anything, USE your GitHub tools to LIST the contents of the {coordinate} repository (start at the root with an empty path) and READ its key files to understand the current state of the codebase.\n3. Identify the core components required to build this system and integrate the new features.\n4. Draft a high-level architecture diagram (text-based or Mermaid) showing the relations between systems."
            ),
            "A comprehensive, technical blueprint of the application architecture, referencing existing code structure and integrating the new feature requests.",
        ),
        RepoMode::WithoutRepository => Task::new(
            "draft_architecture",
            architect,
            "1. READ the feature breakdown produced by the Product Manager to understand the scope.\n2. Identify the core components required to build this system from scratch based on the requirements.\n3. Draft a high-level architecture diagram (text-based or Mermaid) showing the relations between systems.".to_string(),
            "A comprehensive, technical blueprint of the application architecture from scratch.",
        ),
    }
}

fn audit_architecture_task(architect: Agent, repo: &RepoMode, brief: &str) -> Task {
    match repo {
        RepoMode::WithRepository(coordinate) => Task::new(
            "draft_architecture",
            architect,
            format!(
                "Analyze the following project idea:\n{brief}\n\n1. Before drafting anything, USE your GitHub tools to LIST the contents of the {coordinate} repository (start at the root with an empty path) and READ its key files to understand the existing codebase.\n2. Create a step-by-step technical blueprint explaining how to build the idea on top of that codebase, including which programming languages and frameworks to use."
            ),
            "A clear, bulleted blueprint document of the architecture, explicitly referencing the existing codebase constraints.",
        ),
        RepoMode::WithoutRepository => Task::new(
            "draft_architecture",
            architect,
            format!(
                "Analyze the following project idea:\n{brief}\n\nCreate a step-by-step technical blueprint explaining what programming languages and frameworks should be used to build it."
            ),
            "A clear, bulleted blueprint document of the application architecture.",
        ),
    }
}

/// An assembled, ready-to-run task list.
#[derive(Debug, Clone)]
pub struct Pipeline {
    tasks: Vec<Task>,
    repo: RepoMode,
    max_tool_rounds: usize,
}

impl Pipeline {
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Run every task in order.
    ///
    /// `on_complete` sees each task's output before the next task starts;
    /// an error from it aborts the run like a task failure would.
    pub async fn run(
        &self,
        model: &dyn ChatModel,
        repo: Option<&GithubRepo>,
        on_complete: &mut (dyn FnMut(&TaskOutput) -> Result<()> + Send),
    ) -> Result<Vec<TaskOutput>> {
        let needs_repo = self.tasks.iter().any(|t| !t.agent.tools.is_empty());
        if needs_repo && repo.is_none() {
            anyhow::bail!(
                "pipeline reads {} but no repository accessor was supplied",
                self.repo.coordinate().map(|c| c.to_string()).unwrap_or_default()
            );
        }

        let total = self.tasks.len();
        let mut log: Vec<TaskOutput> = Vec::with_capacity(total);

        for (idx, task) in self.tasks.iter().enumerate() {
            let role = task.agent.role;
            tracing::info!(task = task.name, step = idx + 1, total, role = %role, "Task started");

            let output = self
                .execute(model, task, &task.prompt(&log), repo)
                .await
                .with_context(|| format!("task {} ({}) failed", idx + 1, role))?;

            tracing::info!(task = task.name, step = idx + 1, chars = output.len(), "Task complete");
            let done = TaskOutput {
                role,
                task_name: task.label(),
                output,
            };
            on_complete(&done)?;
            log.push(done);
        }

        Ok(log)
    }

    /// One task: a single turn, or a tool loop for agents that have tools.
    async fn execute(
        &self,
        model: &dyn ChatModel,
        task: &Task,
        prompt: &str,
        repo: Option<&GithubRepo>,
    ) -> Result<String> {
        let system = task.agent.system_prompt();
        let mut messages = vec![Message::user(prompt)];

        let mut round = 0;
        loop {
            // Past the limit the tools stay defined but calls are refused.
            let choice = if round < self.max_tool_rounds {
                ToolChoice::Auto
            } else {
                ToolChoice::None
            };
            let resp = model
                .chat(&system, &messages, &task.agent.tools, choice)
                .await?;
            let tool_uses = resp.tool_uses();

            if tool_uses.is_empty() || choice == ToolChoice::None || task.agent.tools.is_empty() {
                return Ok(resp.joined_text().trim().to_string());
            }

            let Some(repo) = repo else {
                anyhow::bail!("agent requested repository tools without an accessor");
            };

            messages.push(Message::blocks("assistant", resp.content.clone()));

            let mut results = Vec::with_capacity(tool_uses.len());
            for tu in &tool_uses {
                tracing::debug!(task = task.name, tool = %tu.name, input = %tu.input, "Tool call");
                let reply = tools::execute_tool(repo, &tu.name, &tu.input)
                    .await
                    .with_context(|| format!("tool {} failed", tu.name))?;
                results.push(ContentBlock::ToolResult(ToolResultBlock {
                    tool_use_id: tu.id.clone(),
                    content: reply.content,
                    is_error: reply.is_error.then_some(true),
                }));
            }
            messages.push(Message::blocks("user", results));
            round += 1;
        }
    }
}

/// Final report: every task output under its role heading.
pub fn render_report(outputs: &[TaskOutput]) -> String {
    outputs
        .iter()
        .map(|o| format!("## {}\n\n{}", o.role.name(), o.output))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ApiResponse, ToolDef};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Answers each turn with the role taken from the system prompt,
    /// failing on one chosen call.
    struct Scripted {
        prompts: Mutex<Vec<String>>,
        fail_on: Option<usize>,
    }

    impl Scripted {
        fn new(fail_on: Option<usize>) -> Self {
            Self {
                prompts: Mutex::new(Vec::new()),
                fail_on,
            }
        }
    }

    #[async_trait]
    impl ChatModel for Scripted {
        async fn chat(
            &self,
            system: &str,
            messages: &[Message],
            _tools: &[ToolDef],
            _choice: ToolChoice,
        ) -> Result<ApiResponse> {
            let mut prompts = self.prompts.lock().unwrap();
            prompts.push(messages[0].content.text());
            let call = prompts.len();
            if Some(call) == self.fail_on {
                anyhow::bail!("model unavailable");
            }
            let role = system.trim_start_matches("You are ").split('.').next().unwrap_or("");
            Ok(ApiResponse::text(format!("output {call} from {role}")))
        }
    }

    fn ignore(_: &TaskOutput) -> Result<()> {
        Ok(())
    }

    #[test]
    fn full_wiring_has_six_roles_in_order() {
        let p = PipelineBuilder::new("A todo app").build();
        let roles: Vec<Role> = p.tasks().iter().map(|t| t.agent.role).collect();
        assert_eq!(roles, Role::ALL.to_vec());
        assert!(p.tasks()[0].description.contains("A todo app"));
    }

    #[test]
    fn audit_wiring_has_four_tasks() {
        let p = PipelineBuilder::new("idea").wiring(Wiring::Audit).build();
        let roles: Vec<Role> = p.tasks().iter().map(|t| t.agent.role).collect();
        assert_eq!(
            roles,
            vec![Role::Architect, Role::SystemsEngineer, Role::AiSpecialist, Role::SecurityOfficer]
        );
    }

    #[test]
    fn empty_brief_gets_placeholder() {
        let p = PipelineBuilder::new("   ").build();
        assert!(p.tasks()[0].description.contains(NO_REQUIREMENTS));
    }

    #[test]
    fn architecture_instruction_depends_on_repo_mode() {
        let repo = RepoMode::from_url(Some("https://github.com/octo/widgets"));
        for wiring in [Wiring::Full, Wiring::Audit] {
            let without = PipelineBuilder::new("idea").wiring(wiring).build();
            let with = PipelineBuilder::new("idea").wiring(wiring).repo(repo.clone()).build();
            let arch = |p: &Pipeline| {
                p.tasks()
                    .iter()
                    .find(|t| t.name == "draft_architecture")
                    .unwrap()
                    .description
                    .clone()
            };

            let plain = arch(&without).to_lowercase();
            assert!(!plain.contains("github"));
            assert!(!plain.contains("repositor"));
            assert!(!plain.contains("list"));

            let reading = arch(&with);
            assert!(reading.contains("octo/widgets"));
            assert!(reading.contains("LIST"));
            assert!(reading.contains("READ its key files"));
            assert!(reading.contains("Before drafting anything"));
        }
        let audit = PipelineBuilder::new("idea").wiring(Wiring::Audit).build();
        assert_eq!(audit.tasks()[0].name, "draft_architecture");
    }

    #[test]
    fn label_truncates_on_char_boundary() {
        let p = PipelineBuilder::new("é".repeat(80).as_str()).build();
        let label = p.tasks()[0].label();
        assert!(label.ends_with("..."));
        assert_eq!(label.chars().count(), LABEL_CHARS + 3);
    }

    #[tokio::test]
    async fn context_accumulates_in_execution_order() {
        let model = Scripted::new(None);
        let p = PipelineBuilder::new("idea").build();
        let mut sink = ignore;
        let outputs = p.run(&model, None, &mut sink).await.unwrap();

        assert_eq!(outputs.len(), 6);
        for (i, (out, role)) in outputs.iter().zip(Role::ALL).enumerate() {
            assert_eq!(out.role, role);
            assert_eq!(out.output, format!("output {} from {}", i + 1, role.name()));
        }

        let prompts = model.prompts.lock().unwrap();
        assert!(!prompts[0].contains("Context from previous tasks"));
        let third = &prompts[2];
        let first_at = third.find("output 1 from").unwrap();
        let second_at = third.find("output 2 from").unwrap();
        assert!(first_at < second_at);
        assert!(!third.contains("output 3 from"));
    }

    #[tokio::test]
    async fn failure_stops_run_after_reporting_earlier_tasks() {
        let model = Scripted::new(Some(3));
        let p = PipelineBuilder::new("idea").build();
        let mut seen: Vec<Role> = Vec::new();
        let mut sink = |o: &TaskOutput| -> Result<()> {
            seen.push(o.role);
            Ok(())
        };
        let err = p.run(&model, None, &mut sink).await.unwrap_err();

        assert_eq!(seen, vec![Role::ProductManager, Role::Architect]);
        let msg = format!("{err:#}");
        assert!(msg.contains("task 3 (Senior Systems Engineer) failed"));
        assert!(msg.contains("model unavailable"));
        assert_eq!(model.prompts.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn sink_error_aborts_run() {
        let model = Scripted::new(None);
        let p = PipelineBuilder::new("idea").build();
        let mut sink = |_: &TaskOutput| -> Result<()> { anyhow::bail!("disk full") };
        assert!(p.run(&model, None, &mut sink).await.is_err());
        assert_eq!(model.prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn repo_wiring_without_accessor_is_rejected() {
        let model = Scripted::new(None);
        let p = PipelineBuilder::new("idea")
            .repo(RepoMode::from_url(Some("octo/widgets")))
            .build();
        let mut sink = ignore;
        assert!(p.run(&model, None, &mut sink).await.is_err());
        assert!(model.prompts.lock().unwrap().is_empty());
    }

    #[test]
    fn report_joins_sections() {
        let report = render_report(&[
            TaskOutput { role: Role::Architect, task_name: "a...".into(), output: "A".into() },
            TaskOutput { role: Role::SecurityOfficer, task_name: "b...".into(), output: "B".into() },
        ]);
        assert!(report.starts_with("## Lead AI Systems Architect\n\nA"));
        assert!(report.ends_with("## Chief Information Security Officer (CISO)\n\nB"));
    }
}
