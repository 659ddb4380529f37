// src/bin/server.rs
// Process entrypoint: parse CLI args, wire capabilities, dispatch to the
// requested admin verb or serve HTTP.

use std::process::ExitCode;

use assistant_core::config::CoreConfig;
use assistant_core::error::CoreError;
use assistant_core::{api, bootstrap, cli};
use clap::Parser;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = cli::Cli::parse();
    let config = CoreConfig::from_env();
    assistant_core::observability::init(&config.observability);

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "fatal error");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: cli::Cli, config: CoreConfig) -> Result<(), CoreError> {
    match cli.command {
        cli::Command::Serve { listen_addr } => {
            let pipeline = std::sync::Arc::new(bootstrap(config).await?);
            let app = api::router(pipeline);

            info!(listen_addr = %listen_addr, "starting server");
            let listener = tokio::net::TcpListener::bind(&listen_addr)
                .await
                .map_err(|e| CoreError::configuration(format!("failed to bind {listen_addr}: {e}")))?;
            axum::serve(listener, app)
                .await
                .map_err(|e| CoreError::internal(format!("server error: {e}")))?;
            Ok(())
        }
        cli::Command::ReloadPrompts { admin_addr } => {
            let url = format!("{}/admin/reload-prompts", admin_addr.trim_end_matches('/'));
            let client = reqwest::Client::new();
            let response = client
                .post(&url)
                .send()
                .await
                .map_err(|e| CoreError::Transient(format!("failed to reach {url}: {e}")))?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(CoreError::Transient(format!(
                    "reload-prompts request to {url} failed: {status} {body}"
                )));
            }

            println!("prompts reloaded on {admin_addr}");
            Ok(())
        }
        cli::Command::DescribeSession { session_id } => {
            let pipeline = bootstrap(config).await?;
            let output = cli::describe_session(&pipeline, &session_id).await?;
            println!("{output}");
            Ok(())
        }
        cli::Command::ClearSession { session_id } => {
            let pipeline = bootstrap(config).await?;
            let output = cli::clear_session(&pipeline, &session_id).await?;
            println!("{output}");
            Ok(())
        }
    }
}
