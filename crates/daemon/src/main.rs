// SPDX-License-Identifier: MIT

//! wfed: the workflow engine daemon binary. Loads configuration, wires the
//! engine's collaborators together and drains the dispatch queues until a
//! shutdown signal arrives.

use std::path::PathBuf;
use std::sync::Arc;

use wfe_daemon::pid_guard::{PidGuard, PidGuardError};
use wfe_daemon::settings::Settings;
use wfe_graph::BpmnParser;

/// BPMN XML parsing is an external collaborator this daemon does not
/// implement (§1 "Out of scope"). Until one is wired in, the daemon accepts
/// `process.started` events for definitions it already has a parsed graph
/// for via the fixture contract, the same stand-in the test suite uses.
struct UnimplementedParser;

impl BpmnParser for UnimplementedParser {
    fn parse(&self, _bpmn_xml: &str) -> Result<wfe_graph::Graph, wfe_graph::ParseError> {
        Err(wfe_graph::ParseError::Malformed(
            "this build has no BPMN XML parser wired in; inject a real wfe_graph::BpmnParser".to_string(),
        ))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("wfed {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" => {
                println!("wfed {}", env!("CARGO_PKG_VERSION"));
                println!("Workflow engine daemon. Configure via a config file (WFE_CONFIG_FILE) and");
                println!("WFE_-prefixed environment variables (see settings.rs for the recognized keys).");
                return Ok(());
            }
            other => {
                eprintln!("error: unexpected argument '{other}'");
                std::process::exit(1);
            }
        }
    }

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let state_dir = wfe_daemon::state_dir();
    std::fs::create_dir_all(&state_dir)?;

    let config_path = std::env::var("WFE_CONFIG_FILE").ok().map(PathBuf::from);
    let settings = Settings::load(config_path.as_deref())?;

    let pid_path = state_dir.join("wfed.pid");
    let guard = match PidGuard::acquire(&pid_path) {
        Ok(guard) => guard,
        Err(PidGuardError::AlreadyRunning(pid)) => {
            eprintln!("wfed is already running (pid {pid})");
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };

    tracing::info!(pid = std::process::id(), "starting wfed");

    let daemon = wfe_daemon::build(settings, Arc::new(UnimplementedParser)).await?;
    let result = wfe_daemon::run(daemon).await;

    guard.release();
    tracing::info!("wfed stopped");
    result
}
