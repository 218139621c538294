use crate::agent::{Agent, AgentEvent};
use crate::model::ModelProvider;
use thiserror::Error;
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("stdin/stdout I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Interactive loop: read a line, run the agent, echo the streamed reply.
/// The literal input `exit` terminates the loop.
pub async fn run<P: ModelProvider>(agent: &Agent<P>) -> Result<(), ChatError> {
    let stdin = BufReader::new(io::stdin());
    let mut lines = stdin.lines();
    let mut stdout = io::stdout();

    write_line(
        &mut stdout,
        &format!(
            "Assistant ready. {} tools registered from the configured servers.",
            agent.tool_count()
        ),
    )
    .await?;
    write_line(&mut stdout, "Type 'exit' to quit.\n").await?;

    loop {
        stdout.write_all(b"User > ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "exit" {
            info!("User requested exit");
            break;
        }

        let (events, receiver) = mpsc::unbounded_channel();
        let printer = tokio::spawn(print_events(receiver));
        let result = agent.run_agent_streaming(input.to_string(), events).await;
        let _ = printer.await;

        match result {
            Ok(_) => {
                stdout.write_all(b"\n\n").await?;
                stdout.flush().await?;
            }
            Err(error) => {
                error!(%error, "Agent run failed");
                write_line(&mut stdout, &format!("\n{}\n", error.user_message())).await?;
            }
        }
    }

    stdout.flush().await?;
    Ok(())
}

#[derive(PartialEq)]
enum Section {
    None,
    Thoughts,
    Tools,
    Message,
}

/// Renders streamed events, opening a section header whenever the kind of
/// output changes.
async fn print_events(mut receiver: mpsc::UnboundedReceiver<AgentEvent>) {
    let mut stdout = io::stdout();
    let mut section = Section::None;

    while let Some(event) = receiver.recv().await {
        let mut out = String::new();
        match event {
            AgentEvent::Thinking(delta) => {
                if section != Section::Thoughts {
                    out.push_str("\n--- Agent Thoughts ---\n");
                    section = Section::Thoughts;
                }
                out.push_str(&delta);
            }
            AgentEvent::MessageDelta(delta) => {
                if section != Section::Message {
                    out.push_str("\n--- Agent Message ---\n");
                    section = Section::Message;
                }
                out.push_str(&delta);
            }
            AgentEvent::ToolCall { tool, arguments } => {
                if section != Section::Tools {
                    out.push_str("\n--- Agent Tools ---\n");
                    section = Section::Tools;
                }
                out.push_str(&format!("Tool: {tool}\nArguments: {arguments}\n"));
            }
            AgentEvent::ToolResult {
                tool,
                success,
                message,
            } => {
                if section != Section::Tools {
                    out.push_str("\n--- Agent Tools ---\n");
                    section = Section::Tools;
                }
                let status = if success { "ok" } else { "error" };
                let text = message.unwrap_or_else(|| "no text output".to_string());
                out.push_str(&format!("Result ({tool}, {status}): {text}\n"));
            }
        }
        if stdout.write_all(out.as_bytes()).await.is_err() {
            break;
        }
        let _ = stdout.flush().await;
    }
}

async fn write_line(stdout: &mut io::Stdout, line: &str) -> Result<(), ChatError> {
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(())
}
