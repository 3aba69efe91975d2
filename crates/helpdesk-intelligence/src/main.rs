// helpdesk-intelligence/src/main.rs

#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};
#[cfg(feature = "cli")]
use helpdesk_intelligence::{
    config::Config, run_server, shared_state::AppState, PipelineResult, Resolution,
};

#[cfg(feature = "cli")]
#[derive(Parser)]
#[command(name = "helpdesk-intelligence", about = "AI ticket pipeline for the helpdesk")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[cfg(feature = "cli")]
#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API
    Serve,
    #[command(flatten)]
    Pipeline(PipelineCommand),
}

#[cfg(feature = "cli")]
#[derive(Subcommand)]
enum PipelineCommand {
    /// Run intake for a stored ticket
    Intake { ticket_id: String },
    /// Resolve a ticket and update the knowledge base
    Resolve {
        ticket_id: String,
        #[arg(long)]
        resolution: String,
        #[arg(long, default_value = "cli")]
        resolved_by: String,
    },
    /// Draft a support reply for a ticket
    Draft {
        ticket_id: String,
        #[arg(long)]
        message: String,
    },
}

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = Config::from_env()?;

    let command = match cli.command {
        Command::Serve => return run_server(cfg).await,
        Command::Pipeline(command) => command,
    };

    helpdesk_intelligence::telemetry::init_tracing();
    helpdesk_intelligence::metrics::init_metrics();
    let state = AppState::from_config(cfg)?;

    let output = match command {
        PipelineCommand::Intake { ticket_id } => {
            let ticket = state
                .database
                .tickets
                .get_ticket(&ticket_id)?
                .ok_or_else(|| anyhow::anyhow!("ticket {} not found", ticket_id))?;
            let outcome = state.pipeline.process_new_ticket(&ticket, &[]).await?;
            serde_json::to_string_pretty(&PipelineResult::from(outcome))?
        }
        PipelineCommand::Resolve {
            ticket_id,
            resolution,
            resolved_by,
        } => {
            let resolution = Resolution {
                content: resolution,
                resolved_by,
            };
            let outcome = state
                .pipeline
                .process_ticket_resolution(&ticket_id, &resolution)
                .await?;
            serde_json::to_string_pretty(&PipelineResult::from(outcome))?
        }
        PipelineCommand::Draft { ticket_id, message } => {
            let drafted = state
                .pipeline
                .draft_support_response(&ticket_id, &message)
                .await?;
            serde_json::to_string_pretty(&drafted)?
        }
    };
    println!("{}", output);
    Ok(())
}

#[cfg(not(feature = "cli"))]
fn main() {
    println!("CLI feature not enabled. Enable with --features cli");
}
