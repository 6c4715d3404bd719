//! cmdbus CLI - post movie commands and operate the queues

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cmdbus_core::application::{ConsumeReport, DispatchOutcome};
use cmdbus_core::domain::DeadLetterRecord;
use cmdbus_core::AppError;
use cmdbus_movies::{Action, MovieBus, Settings, StdoutSink};
use colored::Colorize;
use std::collections::BTreeSet;
use std::process::ExitCode;
use std::sync::Arc;
use tabled::{Table, Tabled};

/// Quiet by default: only warnings reach stderr unless RUST_LOG says otherwise
const DEFAULT_LOG_DIRECTIVE: &str = "cmdbus=warn";

#[derive(Parser)]
#[command(name = "cmdbus")]
#[command(about = "Movie rental demo on a command bus with durable queues", long_about = None)]
#[command(version)]
#[command(args_conflicts_with_subcommands = true, subcommand_negates_reqs = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// What to do with the movie (rent, buy)
    #[arg(required = true)]
    action: Option<Action>,

    /// Movie title
    #[arg(required = true)]
    title: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Drain the queues once (stop when empty)
    Work {
        /// Only drain this queue
        #[arg(short, long)]
        queue: Option<String>,
    },

    /// Inspect or replay dead-lettered envelopes
    DeadLetters {
        #[command(subcommand)]
        command: DeadLetterCommands,
    },

    /// Show queue depths
    Queues,
}

#[derive(Subcommand)]
enum DeadLetterCommands {
    /// List dead-lettered envelopes
    List,

    /// Put a dead-lettered envelope back on its queue
    Replay {
        /// Envelope ID
        #[arg(required_unless_present = "all")]
        id: Option<String>,

        /// Replay every dead-lettered envelope
        #[arg(long, conflicts_with = "id")]
        all: bool,
    },
}

#[derive(Tabled)]
struct DeadLetterRow {
    id: String,
    queue: String,
    command: String,
    attempts: u32,
    class: String,
    failed_at: String,
    error: String,
}

impl From<&DeadLetterRecord> for DeadLetterRow {
    fn from(record: &DeadLetterRecord) -> Self {
        let failed_at = chrono::DateTime::from_timestamp_millis(record.failed_at)
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| record.failed_at.to_string());

        Self {
            id: record.envelope.id.clone(),
            queue: record.envelope.queue.clone(),
            command: record.envelope.name.clone(),
            attempts: record.envelope.attempts,
            class: record.error_class.to_string(),
            failed_at,
            error: record.last_error.clone(),
        }
    }
}

#[derive(Tabled)]
struct QueueRow {
    queue: String,
    depth: usize,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report_error(&e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let settings = Settings::load().context("Failed to load settings")?;
    cmdbus_movies::logging::init_tracing(DEFAULT_LOG_DIRECTIVE);
    tracing::debug!(settings = ?settings, "Settings loaded");

    let bus = MovieBus::build(&settings, Arc::new(StdoutSink))
        .await
        .context("Failed to initialize command bus")?;

    match cli.command {
        Some(Commands::Work { queue }) => {
            let queues = match queue {
                Some(queue) => vec![queue],
                None => bus.queues(),
            };
            let report = work_queues(&bus, &queues).await?;
            print_report(&report);
        }
        Some(Commands::DeadLetters { command }) => dead_letters(&bus, command).await?,
        Some(Commands::Queues) => show_queues(&bus).await?,
        None => {
            let action = cli.action.context("ACTION is required")?;
            let title = cli.title.context("TITLE is required")?;

            // Work the queues, then post
            work_queues(&bus, &bus.queues()).await?;
            post(&bus, action, &title).await?;
        }
    }

    Ok(())
}

async fn work_queues(bus: &MovieBus, queues: &[String]) -> Result<ConsumeReport> {
    bus.work(queues, |queue| {
        println!("{}", format!("checking queue {}", queue).cyan())
    })
    .await
    .context("Failed to drain queues")
}

async fn post(bus: &MovieBus, action: Action, title: &str) -> Result<()> {
    let command = action.command(title);
    let name = cmdbus_core::domain::Command::name(&command).to_string();

    match bus
        .dispatcher()
        .dispatch(command)
        .await
        .with_context(|| format!("Failed to dispatch {}", name))?
    {
        DispatchOutcome::Executed => {}
        DispatchOutcome::Enqueued(id) => {
            println!(
                "{}",
                format!("✓ {} queued (envelope {})", name, id).green().bold()
            );
        }
    }
    Ok(())
}

fn print_report(report: &ConsumeReport) {
    println!();
    println!("  {} {}", "Processed:".bold(), report.processed);
    println!("  {} {}", "Succeeded:".bold(), report.succeeded.to_string().green());
    println!("  {} {}", "Retried:".bold(), report.retried.to_string().yellow());
    println!(
        "  {} {}",
        "Dead-lettered:".bold(),
        report.dead_lettered.to_string().red()
    );
    if report.unsettled > 0 {
        println!(
            "  {} {}",
            "Left on lease:".bold(),
            report.unsettled.to_string().red().bold()
        );
    }
}

async fn dead_letters(bus: &MovieBus, command: DeadLetterCommands) -> Result<()> {
    match command {
        DeadLetterCommands::List => {
            let records = bus
                .dead_letters()
                .list()
                .await
                .context("Failed to list dead letters")?;

            if records.is_empty() {
                println!("{}", "No dead-lettered envelopes".yellow());
                return Ok(());
            }

            let rows: Vec<DeadLetterRow> = records.iter().map(DeadLetterRow::from).collect();
            println!("{}", Table::new(rows));
        }
        DeadLetterCommands::Replay { id: Some(id), .. } => {
            let envelope = bus
                .replayer()
                .replay(&id)
                .await
                .with_context(|| format!("Failed to replay {}", id))?;
            println!(
                "{}",
                format!("✓ Envelope {} replayed onto {}", envelope.id, envelope.queue)
                    .green()
                    .bold()
            );
        }
        DeadLetterCommands::Replay { id: None, .. } => {
            let ids = bus
                .replayer()
                .replay_all()
                .await
                .context("Failed to replay dead letters")?;
            println!(
                "{}",
                format!("✓ {} envelope(s) replayed", ids.len()).green().bold()
            );
        }
    }
    Ok(())
}

async fn show_queues(bus: &MovieBus) -> Result<()> {
    let mut names: BTreeSet<String> = bus.queues().into_iter().collect();
    names.extend(
        bus.backend()
            .queues()
            .await
            .context("Failed to list queues")?,
    );

    let mut rows = Vec::with_capacity(names.len());
    for queue in names {
        let depth = bus
            .backend()
            .len(&queue)
            .await
            .with_context(|| format!("Failed to read depth of {}", queue))?;
        rows.push(QueueRow { queue, depth });
    }

    println!("{}", Table::new(rows));

    let dead = bus
        .dead_letters()
        .len()
        .await
        .context("Failed to count dead letters")?;
    println!("  {} {}", "Dead-lettered:".bold(), dead);
    Ok(())
}

/// Print kind, message and context chain to stderr
fn report_error(err: &anyhow::Error) {
    let kind = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<AppError>())
        .map(AppError::kind)
        .unwrap_or("Error");

    eprintln!("{} [{}] {}", "error:".red().bold(), kind, err);
    for cause in err.chain().skip(1) {
        eprintln!("  {} {}", "caused by:".dimmed(), cause);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn test_positional_action_and_title() {
        let cli = Cli::try_parse_from(["cmdbus", "rent", "Inception"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.action, Some(Action::Rent));
        assert_eq!(cli.title.as_deref(), Some("Inception"));
    }

    #[test]
    fn test_unknown_action_is_usage_error() {
        let err = match Cli::try_parse_from(["cmdbus", "stream", "Inception"]) {
            Ok(_) => panic!("unknown action should not parse"),
            Err(e) => e,
        };
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_missing_title_is_usage_error() {
        assert!(Cli::try_parse_from(["cmdbus", "buy"]).is_err());
    }

    #[test]
    fn test_subcommands_parse() {
        let cli = Cli::try_parse_from(["cmdbus", "work", "--queue", "rent-movie"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Work { queue: Some(ref q) }) if q == "rent-movie"
        ));

        let cli = Cli::try_parse_from(["cmdbus", "dead-letters", "replay", "--all"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::DeadLetters {
                command: DeadLetterCommands::Replay { id: None, all: true }
            })
        ));

        assert!(Cli::try_parse_from(["cmdbus", "dead-letters", "replay"]).is_err());
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
