//! Command-line interface for durafn.
//!
//! Provides commands for running the workflow in the foreground, checking
//! instance status, listing instances, resuming interrupted instances and
//! serving the HTTP trigger gateway.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use uuid::Uuid;

use crate::activities::{ActivityRegistry, FailureInjection, HelloActivity};
use crate::config::{self, ResolvedConfig};
use crate::core::{Orchestrator, Termination, WorkflowDefinition};
use crate::domain::WorkflowInstance;
use crate::gateway::{self, TriggerGateway};

/// durafn - Durable workflow runner
#[derive(Parser, Debug)]
#[command(name = "durafn")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one instance in the foreground and print its response
    Run {
        /// Optional payload recorded with the instance (JSON or plain text)
        payload: Option<String>,

        /// Workflow file to use instead of the configured workflow
        #[arg(short, long)]
        workflow: Option<PathBuf>,
    },

    /// Check the status of an instance
    Status {
        /// Instance ID (UUID)
        instance_id: String,
    },

    /// List recent instances
    Instances {
        /// Maximum number of instances to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Resume an interrupted instance from its history
    Resume {
        /// Instance ID to resume
        instance_id: String,
    },

    /// Serve the HTTP trigger gateway
    Serve {
        /// Address to bind to (overrides config and DURAFN_BIND)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Run { payload, workflow } => run_workflow(payload, workflow).await,
            Commands::Status { instance_id } => show_status(&instance_id).await,
            Commands::Instances { limit } => list_instances(limit).await,
            Commands::Resume { instance_id } => resume_instance(&instance_id).await,
            Commands::Serve { bind } => serve(bind).await,
            Commands::Config => show_config(),
        }
    }
}

/// Build an orchestrator from resolved configuration
pub fn build_orchestrator(cfg: &ResolvedConfig, workflow: WorkflowDefinition) -> Orchestrator {
    let failure = FailureInjection::from_settings(cfg.failure.one_in, cfg.failure.seed);
    let activities = ActivityRegistry::new().register(HelloActivity::new(failure));

    Orchestrator::new(workflow, activities, cfg.instances_dir())
}

/// Parse a CLI payload; JSON is kept as-is, anything else as a string
pub fn parse_payload(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

fn parse_instance_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).with_context(|| format!("Invalid instance ID: {}", raw))
}

/// Cancellation token that fires on Ctrl+C
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received Ctrl+C, cancelling instance");
            token.cancel();
        }
    });

    cancel
}

/// Run a new instance to completion
async fn run_workflow(payload: Option<String>, workflow_file: Option<PathBuf>) -> Result<()> {
    let cfg = config::config()?;

    let workflow = match workflow_file {
        Some(path) => {
            let workflow = WorkflowDefinition::from_file(&path)?;
            workflow.validate()?;
            workflow
        }
        None => cfg.workflow.clone(),
    };

    let orchestrator = build_orchestrator(cfg, workflow);
    let instance_id = orchestrator
        .create_instance(payload.as_deref().map(parse_payload))
        .await?;
    eprintln!("[Started orchestration with ID = '{}']", instance_id);

    let termination = orchestrator
        .drive_instance(instance_id, cancel_on_ctrl_c())
        .await?;

    report(instance_id, &termination)
}

/// Print the outward response; non-200 outcomes exit with status 1
fn report(instance_id: Uuid, termination: &Termination) -> Result<()> {
    match termination.response() {
        Some(response) => {
            println!("{}", response.body_string());
            eprintln!("\n[Instance {} returned {}]", instance_id, response.status_code);
            if !response.is_success() {
                std::process::exit(1);
            }
        }
        None => {
            eprintln!("\n[Instance {} was cancelled]", instance_id);
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Show the status of an instance
async fn show_status(instance_id_str: &str) -> Result<()> {
    let instance_id = parse_instance_id(instance_id_str)?;

    let cfg = config::config()?;
    let orchestrator = build_orchestrator(cfg, cfg.workflow.clone());
    let instance = orchestrator
        .status(instance_id)
        .await?
        .with_context(|| format!("Instance {} not found", instance_id))?;

    print_instance(&instance);
    Ok(())
}

fn print_instance(instance: &WorkflowInstance) {
    println!("Instance ID: {}", instance.id);
    println!("Workflow: {}", instance.workflow_name);
    println!("Status: {}", instance.runtime_status.as_str());
    if let Some(label) = &instance.custom_status {
        println!("Custom status: {}", label);
    }
    println!("Created: {}", instance.created_at);
    println!("Last updated: {}", instance.last_updated_at);
    if let Some(completed) = instance.completed_at {
        println!("Completed: {}", completed);
    }

    println!("\nOutputs:");
    if instance.outputs.is_empty() {
        println!("  (none)");
    }
    for (i, output) in instance.outputs.iter().enumerate() {
        println!("  {}: {}", i, output);
    }

    if let Some(response) = instance.response() {
        println!("\nResponse: {} {}", response.status_code, response.body_string());
    }
}

/// List recent instances
async fn list_instances(limit: usize) -> Result<()> {
    let cfg = config::config()?;
    let orchestrator = build_orchestrator(cfg, cfg.workflow.clone());
    let instances = orchestrator.list_instances(limit).await?;

    if instances.is_empty() {
        println!("No instances found");
        return Ok(());
    }

    println!("{:<38} {:<18} {:<20} {:<18}", "INSTANCE ID", "WORKFLOW", "STATUS", "CUSTOM STATUS");
    println!("{}", "-".repeat(94));

    for instance in instances {
        let label = instance
            .custom_status
            .map(|l| l.as_str())
            .unwrap_or("-");
        println!(
            "{:<38} {:<18} {:<20} {:<18}",
            instance.id,
            instance.workflow_name,
            instance.runtime_status.as_str(),
            label
        );
    }

    Ok(())
}

/// Resume an instance left unfinished by an earlier process
async fn resume_instance(instance_id_str: &str) -> Result<()> {
    let instance_id = parse_instance_id(instance_id_str)?;

    let cfg = config::config()?;
    let orchestrator = build_orchestrator(cfg, cfg.workflow.clone());
    let termination = orchestrator
        .drive_instance(instance_id, cancel_on_ctrl_c())
        .await?;

    report(instance_id, &termination)
}

/// Serve the trigger gateway until Ctrl+C
async fn serve(bind: Option<String>) -> Result<()> {
    let cfg = config::config()?;
    let bind = bind.unwrap_or_else(|| cfg.server.bind.clone());

    let orchestrator = build_orchestrator(cfg, cfg.workflow.clone());
    let gateway = Arc::new(TriggerGateway::new(orchestrator, cfg.server.base_url.clone()));

    let resumed = gateway.recover().await?;
    if resumed > 0 {
        eprintln!("[Resumed {} unfinished instance(s)]", resumed);
    }

    gateway::serve(gateway, &bind).await
}

/// Show resolved configuration
fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!("durafn configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home (engine state): {}", cfg.home.display());
    println!("  Instances:           {}", cfg.instances_dir().display());
    println!();
    println!("Workflow:");
    println!("  Name:     {}", cfg.workflow.name);
    println!("  Delay:    {}s", cfg.workflow.delay_seconds);
    println!("  Activity: {}", cfg.workflow.activity);
    println!("  Inputs:   {}", cfg.workflow.inputs.join(", "));
    println!();
    println!("Failure injection:");
    match cfg.failure.one_in {
        0 => println!("  Disabled"),
        n => println!("  One in {}", n),
    }
    if let Some(seed) = cfg.failure.seed {
        println!("  Seed: {}", seed);
    }
    println!();
    println!("Server:");
    println!("  Bind:     {}", cfg.server.bind);
    println!("  Base URL: {}", cfg.server.base_url);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::try_parse_from(["durafn", "run", "{\"user\":\"a\"}", "--workflow", "wf.yaml"]).unwrap();

        match cli.command {
            Commands::Run { payload, workflow } => {
                assert_eq!(payload.as_deref(), Some("{\"user\":\"a\"}"));
                assert_eq!(workflow, Some(PathBuf::from("wf.yaml")));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_parses_serve_and_instances() {
        let cli = Cli::try_parse_from(["durafn", "serve", "--bind", "0.0.0.0:9000"]).unwrap();
        assert!(matches!(cli.command, Commands::Serve { bind: Some(ref b) } if b == "0.0.0.0:9000"));

        let cli = Cli::try_parse_from(["durafn", "instances"]).unwrap();
        assert!(matches!(cli.command, Commands::Instances { limit: 10 }));
    }

    #[test]
    fn test_parse_payload() {
        assert_eq!(parse_payload("{\"a\":1}"), serde_json::json!({"a": 1}));
        assert_eq!(parse_payload("hello"), serde_json::json!("hello"));
        assert_eq!(parse_payload("42"), serde_json::json!(42));
    }

    #[test]
    fn test_invalid_instance_id() {
        assert!(parse_instance_id("not-a-uuid").is_err());
        assert!(parse_instance_id("550e8400-e29b-41d4-a716-446655440000").is_ok());
    }
}
