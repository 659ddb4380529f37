// src/cli.rs
// Admin verbs on top of the turn pipeline: serve HTTP, reload prompt
// templates, and inspect/clear a session from the command line.

use clap::{Parser, Subcommand};

use crate::error::CoreError;
use crate::turn::CorePipeline;

#[derive(Debug, Parser)]
#[command(name = "assistant-core", about = "Multi-agent conversational core")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP turn entrypoint.
    Serve {
        #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8787")]
        listen_addr: String,
    },
    /// Tell a running `serve` process to reload its prompt templates from
    /// disk, without restarting it. Hits that process's own admin route,
    /// not a standalone registry of this CLI invocation's own.
    ReloadPrompts {
        #[arg(long, env = "ADMIN_ADDR", default_value = "http://127.0.0.1:8787")]
        admin_addr: String,
    },
    /// Print session metadata without full content.
    DescribeSession {
        session_id: String,
    },
    /// Remove all persisted state for a session.
    ClearSession {
        session_id: String,
    },
}

pub async fn describe_session(pipeline: &CorePipeline, session_id: &str) -> Result<String, CoreError> {
    match pipeline.describe_session(session_id).await? {
        Some(summary) => Ok(serde_json::to_string_pretty(&summary).unwrap_or_default()),
        None => Ok(format!("no session found for id {session_id}")),
    }
}

pub async fn clear_session(pipeline: &CorePipeline, session_id: &str) -> Result<String, CoreError> {
    pipeline.clear_session(session_id).await?;
    Ok(format!("cleared session {session_id}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_serve_with_default_listen_addr() {
        let cli = Cli::try_parse_from(["assistant-core", "serve"]).unwrap();
        match cli.command {
            Command::Serve { listen_addr } => assert_eq!(listen_addr, "0.0.0.0:8787"),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_reload_prompts_with_default_admin_addr() {
        let cli = Cli::try_parse_from(["assistant-core", "reload-prompts"]).unwrap();
        match cli.command {
            Command::ReloadPrompts { admin_addr } => assert_eq!(admin_addr, "http://127.0.0.1:8787"),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_describe_session() {
        let cli = Cli::try_parse_from(["assistant-core", "describe-session", "S1"]).unwrap();
        match cli.command {
            Command::DescribeSession { session_id } => assert_eq!(session_id, "S1"),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
