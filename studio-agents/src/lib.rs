//! studio-agents: the LLM architecture team.
//!
//! Six fixed personas run a sequential pipeline over a project brief:
//! - Product Manager breaks requirements into features
//! - Architect drafts the system, reading a GitHub repo when one is given
//! - Systems Engineer, AI Specialist, UX Designer and CISO review in turn

pub mod agents;
pub mod github;
pub mod llm;
pub mod pipeline;
pub mod tools;
