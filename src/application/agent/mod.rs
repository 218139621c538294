mod models;
mod runner;

#[cfg(test)]
mod tests;

pub use models::{AgentError, AgentEvent, AgentOutcome, AgentStep, DEFAULT_MAX_TOOL_STEPS};
pub use runner::Agent;
