use clap::Parser;
use mcp_agent::agent::Agent;
use mcp_agent::chat;
use mcp_agent::config::AgentDefinition;
use serde_json::json;
use std::error::Error;
use std::path::Path;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser, Debug)]
#[command(
    name = "mcp-agent",
    version,
    about = "Configuration-driven MCP chat agent backed by a local Ollama endpoint"
)]
struct Cli {
    /// Path to the agent definition JSON
    #[arg(long)]
    config: Option<String>,
    /// Override the inference host from the definition
    #[arg(long)]
    host: Option<String>,
    /// Override the model identifier from the definition
    #[arg(long)]
    model: Option<String>,
    /// Override the system message from the definition
    #[arg(long)]
    system: Option<String>,
    /// One-shot prompt; without it an interactive chat loop starts
    prompt: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();
    info!("Starting mcp-agent");
    let cli = Cli::parse();
    debug!(config = ?cli.config, host = ?cli.host, model = ?cli.model, "CLI arguments parsed");

    let config_path = cli.config.as_deref().map(Path::new);
    let mut definition = AgentDefinition::load(config_path)?;
    if let Some(host) = cli.host {
        definition.host = host;
    }
    if let Some(model) = cli.model {
        definition.ai_model_id = model;
    }
    if let Some(system) = cli.system {
        definition.system_message = system;
    }

    let agent = Agent::create(&definition).await;
    info!(tools = agent.tool_count(), "Agent ready");

    if cli.prompt.is_empty() {
        chat::run(&agent).await?;
    } else {
        let prompt = cli.prompt.join(" ");
        info!("Dispatching single prompt");
        let outcome = agent.run_agent(prompt).await?;
        let output = json!({
            "response": outcome.response,
            "thinking": outcome.thinking,
            "tool_steps": outcome.steps,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    }
    info!("Agent execution finished");
    Ok(())
}

fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_level(true)
            .init();
    });
}
