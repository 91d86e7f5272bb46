// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::unwrap_used))]

//! `wfe`: the operator-facing CLI for lifecycle operations against a
//! running `wfed` daemon (§2 "CLI").

mod client;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use wfe_core::{ProcessDefinitionId, ProcessInstanceId, RawVariable, RawVariables};
use wfe_daemon::protocol::{InstanceView, Request, Response};

use client::DaemonClient;

#[derive(Parser)]
#[command(name = "wfe", version, about = "Operate a running workflow engine daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check that the daemon is reachable.
    Ping,
    /// Start a new process instance.
    Create {
        /// The process definition to instantiate.
        #[arg(long)]
        definition: ProcessDefinitionId,
        /// A process variable, as `name=type:value` (e.g. `amount=integer:500`).
        /// Repeatable.
        #[arg(long = "var", value_parser = parse_variable)]
        var: Vec<(String, RawVariable)>,
    },
    /// Show a process instance's current state.
    Get {
        instance: ProcessInstanceId,
    },
    /// Suspend a running process instance.
    Suspend {
        instance: ProcessInstanceId,
    },
    /// Resume a suspended process instance.
    Resume {
        instance: ProcessInstanceId,
    },
    /// Terminate a process instance.
    Terminate {
        instance: ProcessInstanceId,
    },
}

/// Parse `name=type:value`, e.g. `amount=integer:500` or `note=string:hello`.
/// The value half is parsed as JSON first so numbers, booleans and quoted
/// strings all round-trip; anything that doesn't parse as JSON is kept as a
/// bare string (so `note=string:hello` doesn't need to be `"hello"`).
fn parse_variable(s: &str) -> Result<(String, RawVariable), String> {
    let (name, rest) = s.split_once('=').ok_or_else(|| {
        format!("invalid variable '{s}': expected name=type:value")
    })?;
    let (type_tag, value) = rest
        .split_once(':')
        .ok_or_else(|| format!("invalid variable '{s}': expected name=type:value"))?;
    let value = serde_json::from_str(value).unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((name.to_string(), RawVariable { type_tag: type_tag.to_string(), value }))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut client = DaemonClient::connect().await?;

    let request = match cli.command {
        Command::Ping => Request::Ping,
        Command::Create { definition, var } => {
            let variables: RawVariables = var.into_iter().collect();
            Request::CreateInstance {
                instance_id: ProcessInstanceId::new(),
                definition_id: definition,
                variables,
            }
        }
        Command::Get { instance } => Request::GetInstance { instance_id: instance },
        Command::Suspend { instance } => Request::SuspendInstance { instance_id: instance },
        Command::Resume { instance } => Request::ResumeInstance { instance_id: instance },
        Command::Terminate { instance } => Request::TerminateInstance { instance_id: instance },
    };

    match client.call(request).await? {
        Response::Pong => println!("pong"),
        Response::Instance(view) => print_instance(&view),
        Response::Error { message } => return Err(anyhow!(message)),
    }

    Ok(())
}

fn print_instance(view: &InstanceView) {
    println!("instance:   {}", view.id);
    println!("definition: {}", view.definition_id);
    println!("status:     {:?}", view.status);
    println!("started:    {}", view.start_time);
    if let Some(end_time) = view.end_time {
        println!("ended:      {end_time}");
    }
    if let Some(error) = &view.error {
        println!("error:      {error}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_an_integer_variable() {
        let (name, raw) = parse_variable("amount=integer:500").unwrap();
        assert_eq!(name, "amount");
        assert_eq!(raw.type_tag, "integer");
        assert_eq!(raw.value, serde_json::json!(500));
    }

    #[test]
    fn parses_a_bare_string_value_without_quotes() {
        let (name, raw) = parse_variable("note=string:hello world").unwrap();
        assert_eq!(name, "note");
        assert_eq!(raw.type_tag, "string");
        assert_eq!(raw.value, serde_json::json!("hello world"));
    }

    #[test]
    fn rejects_a_variable_missing_the_type_separator() {
        assert!(parse_variable("amount=500").is_err());
    }

    #[test]
    fn rejects_a_variable_missing_the_name_separator() {
        assert!(parse_variable("amount:integer:500").is_err());
    }
}
