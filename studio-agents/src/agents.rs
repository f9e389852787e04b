//! The six personas of the architecture team.
//!
//! Each role has a fixed goal and backstory. A project's knowledge base
//! contributes one guideline block per role, appended to the backstory as
//! mandatory instructions.

use serde::{Deserialize, Serialize};

use crate::llm::ToolDef;
use crate::pipeline::RepoMode;
use crate::tools;

/// Placeholder for a guideline field the project left empty.
pub const NO_GUIDELINES: &str = "None provided.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    ProductManager,
    Architect,
    SystemsEngineer,
    AiSpecialist,
    UxDesigner,
    SecurityOfficer,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::ProductManager,
        Role::Architect,
        Role::SystemsEngineer,
        Role::AiSpecialist,
        Role::UxDesigner,
        Role::SecurityOfficer,
    ];

    /// Exact role name recorded with every output.
    pub fn name(self) -> &'static str {
        match self {
            Role::ProductManager => "Lead Product Manager",
            Role::Architect => "Lead AI Systems Architect",
            Role::SystemsEngineer => "Senior Systems Engineer",
            Role::AiSpecialist => "AI Integration Specialist",
            Role::UxDesigner => "Lead UX/UI Designer",
            Role::SecurityOfficer => "Chief Information Security Officer (CISO)",
        }
    }

    fn goal(self) -> &'static str {
        match self {
            Role::ProductManager => {
                "Read the raw product requirements and break it down into strict, atomic features."
            }
            Role::Architect => {
                "Design scalable, robust, and forward-looking solutions mapping business requirements to technical architecture."
            }
            Role::SystemsEngineer => {
                "Ensure the architecture translates into a solid, deployable infrastructure, focusing on databases, CI/CD, and cloud services."
            }
            Role::AiSpecialist => {
                "Identify and design the integration points for Large Language Models and other AI functionalities."
            }
            Role::UxDesigner => {
                "Ensure the final software architecture and product design provide an intuitive, seamless, and visually stunning user experience."
            }
            Role::SecurityOfficer => {
                "Audit the architecture, infrastructure, and workflows to ensure maximum security, compliance, and data privacy."
            }
        }
    }

    fn persona(self, reads_repo: bool) -> String {
        match self {
            Role::ProductManager => "You are a methodical Product Manager who prevents scope creep. You read messy human ideas and turn them into beautifully structured specs.".to_string(),
            Role::Architect => {
                let codebase = if reads_repo {
                    "You thoroughly analyze the existing codebase before rendering decisions. "
                } else {
                    ""
                };
                format!(
                    "You are a pragmatic, battle-tested software architect. You favor simplicity over complexity but know when to use advanced design patterns. {codebase}You prefer Python and Next.js."
                )
            }
            Role::SystemsEngineer => "You live in the terminal. You believe everything should be \"infrastructure as code\" and despise manual deployment steps. You are deeply familiar with AWS, Docker, and Kubernetes.".to_string(),
            Role::AiSpecialist => "You are obsessed with the latest AI models. You know the strengths and weaknesses of Gemini, Claude, and GPT-4.".to_string(),
            Role::UxDesigner => "You are a militant advocate for the end-user. You despise convoluted workflows.".to_string(),
            Role::SecurityOfficer => "You are paranoid by profession. You assume every system will be breached.".to_string(),
        }
    }

    fn guideline_heading(self) -> &'static str {
        match self {
            Role::UxDesigner => "MANDATORY UX GUIDELINES TO FOLLOW",
            Role::SecurityOfficer => "MANDATORY SECURITY STANDARDS TO FOLLOW",
            _ => "MANDATORY GUIDELINES",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-role guideline text from a project's knowledge base.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guidelines {
    #[serde(default)]
    pub pm_guidelines: Option<String>,
    #[serde(default)]
    pub architect_guidelines: Option<String>,
    #[serde(default)]
    pub systems_guidelines: Option<String>,
    #[serde(default)]
    pub ai_guidelines: Option<String>,
    #[serde(default)]
    pub ux_guidelines: Option<String>,
    #[serde(default)]
    pub security_standards: Option<String>,
}

impl Guidelines {
    /// The guideline text for a role, or [`NO_GUIDELINES`].
    pub fn for_role(&self, role: Role) -> &str {
        let field = match role {
            Role::ProductManager => &self.pm_guidelines,
            Role::Architect => &self.architect_guidelines,
            Role::SystemsEngineer => &self.systems_guidelines,
            Role::AiSpecialist => &self.ai_guidelines,
            Role::UxDesigner => &self.ux_guidelines,
            Role::SecurityOfficer => &self.security_standards,
        };
        field
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(NO_GUIDELINES)
    }
}

/// A role bound to its persona text and tools for one run.
#[derive(Debug, Clone)]
pub struct Agent {
    pub role: Role,
    pub goal: String,
    pub backstory: String,
    pub tools: Vec<ToolDef>,
}

impl Agent {
    pub fn new(role: Role, guidelines: &Guidelines, repo: &RepoMode) -> Self {
        let reads_repo = role == Role::Architect && repo.is_available();
        let backstory = format!(
            "{}\n\n{}:\n{}",
            role.persona(reads_repo),
            role.guideline_heading(),
            guidelines.for_role(role)
        );
        let tools = if reads_repo {
            tools::repo_tools()
        } else {
            Vec::new()
        };
        Self {
            role,
            goal: role.goal().to_string(),
            backstory,
            tools,
        }
    }

    /// System prompt for every turn this agent takes.
    pub fn system_prompt(&self) -> String {
        format!(
            "You are {}. {}\n\nYour personal goal is: {}",
            self.role.name(),
            self.backstory,
            self.goal
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::RepoCoordinate;

    #[test]
    fn blank_guidelines_fall_back_to_placeholder() {
        let g = Guidelines {
            pm_guidelines: Some("  ".into()),
            ux_guidelines: Some("Mobile first".into()),
            ..Default::default()
        };
        assert_eq!(g.for_role(Role::ProductManager), NO_GUIDELINES);
        assert_eq!(g.for_role(Role::Architect), NO_GUIDELINES);
        assert_eq!(g.for_role(Role::UxDesigner), "Mobile first");
    }

    #[test]
    fn guidelines_land_in_backstory() {
        let g = Guidelines {
            security_standards: Some("SOC2 only".into()),
            ..Default::default()
        };
        let agent = Agent::new(Role::SecurityOfficer, &g, &RepoMode::WithoutRepository);
        assert!(agent.backstory.ends_with("MANDATORY SECURITY STANDARDS TO FOLLOW:\nSOC2 only"));
        assert!(agent.system_prompt().starts_with("You are Chief Information Security Officer (CISO)."));
    }

    #[test]
    fn only_architect_with_repo_gets_tools() {
        let repo = RepoMode::WithRepository(RepoCoordinate::parse("octo/widgets").unwrap());
        let g = Guidelines::default();
        for role in Role::ALL {
            let with = Agent::new(role, &g, &repo);
            let without = Agent::new(role, &g, &RepoMode::WithoutRepository);
            assert!(without.tools.is_empty());
            assert_eq!(with.tools.is_empty(), role != Role::Architect);
        }
        let architect = Agent::new(Role::Architect, &g, &repo);
        assert!(architect.backstory.contains("existing codebase"));
        let plain = Agent::new(Role::Architect, &g, &RepoMode::WithoutRepository);
        assert!(!plain.backstory.contains("codebase"));
    }
}
