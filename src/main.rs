use anyhow::Result;
use clap::{Parser, Subcommand};
use runway::config::{LOGS_DIR, RunwayConfig};
use runway::errors::RunwayError;
use runway::workflow::DEFAULT_WORKFLOW;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

mod cmd;

/// Environment variable holding a tracing filter directive, e.g. `runway=debug`.
const ENV_LOG: &str = "RUNWAY_LOG";

#[derive(Parser)]
#[command(name = "runway")]
#[command(version, about = "Run lifecycle engine for phased development workflows")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Answer yes to confirmations and never prompt
    #[arg(long, global = true)]
    pub yes: bool,

    /// Print machine-readable JSON on stdout
    #[arg(long, global = true)]
    pub json: bool,

    /// State root (defaults to $RUNWAY_HOME, ./.runway, then ~/.runway)
    #[arg(long, global = true)]
    pub home: Option<PathBuf>,

    /// Organization for new runs and run lookups
    #[arg(long, global = true)]
    pub org: Option<String>,

    /// Project for new runs and run lookups
    #[arg(long, global = true)]
    pub project: Option<String>,

    /// Log format on stderr: text or json
    #[arg(long, default_value = "text", global = true)]
    pub log_format: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start a new run of a workflow
    Start {
        /// Workflow definition to run
        #[arg(short, long, default_value = DEFAULT_WORKFLOW)]
        workflow: String,
        /// Work item the run implements
        #[arg(long)]
        work_item: Option<String>,
        /// Autonomy level: dry-run, assist, guarded, autonomous
        #[arg(long)]
        autonomy: Option<String>,
    },
    /// Report the outcome of the current phase
    Advance {
        /// Run id (organization/project/uuid); defaults to the active run
        run: Option<String>,
        /// Phase outcome: completed, no-go, failed
        #[arg(long, default_value = "completed")]
        outcome: String,
        /// NO-GO reason or failure message
        #[arg(long)]
        reason: Option<String>,
        /// Error code for a failed outcome
        #[arg(long)]
        code: Option<String>,
    },
    /// Mark a run failed
    Fail {
        run: Option<String>,
        #[arg(long)]
        message: String,
        #[arg(long, default_value = "manual_failure")]
        code: String,
        /// Whether recovery is expected to succeed
        #[arg(long)]
        recoverable: bool,
    },
    /// Pause an in-progress run
    Pause { run: Option<String> },
    /// Resume a paused run, approving a pending autonomy gate
    Resume { run: Option<String> },
    /// Cancel a run (cannot be undone)
    Cancel { run: Option<String> },
    /// Resume a failed or paused run from a phase or a checkpoint
    Recover {
        run: Option<String>,
        /// Phase to restart from
        #[arg(long, conflicts_with = "checkpoint", required_unless_present = "checkpoint")]
        from_phase: Option<String>,
        /// Phases to mark skipped (comma-separated)
        #[arg(long, value_delimiter = ',', requires = "from_phase")]
        skip: Vec<String>,
        /// Checkpoint id to restore
        #[arg(long)]
        checkpoint: Option<String>,
    },
    /// Show a run
    Status {
        run: Option<String>,
        /// Include the number of logged events
        #[arg(long)]
        events: bool,
    },
    /// List runs, most recently updated first
    List {
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        work_item: Option<String>,
        #[arg(long)]
        workflow: Option<String>,
        /// List runs of every organization and project. With `--org` alone,
        /// every project of that organization is listed.
        #[arg(long)]
        all: bool,
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Delete or archive finished runs older than the retention threshold
    Cleanup {
        #[arg(long)]
        max_age_days: Option<u32>,
        /// Cleanup mode: delete or archive
        #[arg(long)]
        mode: Option<String>,
        /// Show what would be removed without removing it
        #[arg(long)]
        dry_run: bool,
    },
    /// Append an event to a run's log
    Emit {
        run: String,
        /// Event type (snake_case)
        #[arg(long = "type")]
        event_type: Option<String>,
        #[arg(long)]
        phase: Option<String>,
        #[arg(long)]
        step: Option<String>,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        message: Option<String>,
        /// Metadata entry as key=value; value is parsed as JSON when possible
        #[arg(long = "meta", value_name = "KEY=VALUE")]
        meta: Vec<String>,
        /// Full event as JSON, or '-' to read it from stdin; flags override its fields
        #[arg(long)]
        data: Option<String>,
    },
    /// Read a run's events
    Events {
        run: Option<String>,
        #[arg(long)]
        phase: Option<String>,
        #[arg(long = "type")]
        event_type: Option<String>,
        /// Only events at or after this RFC 3339 timestamp
        #[arg(long)]
        since: Option<String>,
        /// Only events at or before this RFC 3339 timestamp
        #[arg(long)]
        until: Option<String>,
        /// Only events with a larger sequence number
        #[arg(long)]
        after: Option<u64>,
    },
    /// Merge a run's events into one ordered JSONL file
    Consolidate { run: Option<String> },
    /// Capture, show or list checkpoints
    Checkpoint {
        #[command(subcommand)]
        command: CheckpointCommands,
    },
    /// Execute phases with the configured command until the run stops
    Drive {
        run: Option<String>,
        /// Phase command (overrides [executor] command)
        #[arg(long)]
        command: Option<String>,
        /// Per-phase timeout in seconds (overrides [executor] timeout_secs)
        #[arg(long)]
        timeout_secs: Option<u64>,
        /// Stop after this many phases
        #[arg(long)]
        max_phases: Option<usize>,
    },
    /// List available workflow definitions
    Workflows,
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
    /// Manage work items through the configured provider
    Item {
        #[command(subcommand)]
        command: ItemCommands,
    },
}

#[derive(Subcommand, Clone)]
pub enum CheckpointCommands {
    /// Snapshot a run mid-phase
    Capture {
        run: Option<String>,
        #[arg(long)]
        phase: Option<String>,
        #[arg(long)]
        step: Option<String>,
        /// State as JSON (defaults to the current run record)
        #[arg(long)]
        state: Option<String>,
    },
    /// Show one checkpoint
    Show {
        checkpoint_id: String,
        /// Look the checkpoint up in this run only
        #[arg(long)]
        run: Option<String>,
    },
    /// List a run's checkpoints, oldest first
    List { run: Option<String> },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default runway.toml file
    Init,
}

#[derive(Subcommand, Clone)]
pub enum ItemCommands {
    /// Create a work item
    Create {
        title: String,
        #[arg(long, default_value = "")]
        body: String,
    },
    /// Show a work item
    Show { id: String },
    /// Change a work item's title or body
    Edit {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        body: Option<String>,
    },
    /// Add a comment
    Comment { id: String, body: String },
    /// Add a label
    Label { id: String, label: String },
    /// Set the milestone
    Milestone { id: String, milestone: String },
    /// Close a work item
    Close { id: String },
}

/// Install stderr and rolling-file logging.
///
/// The returned guard flushes the file writer on drop.
fn init_tracing(cli: &Cli, home: &Path) -> Option<WorkerGuard> {
    let default_directive = if cli.verbose { "runway=debug" } else { "warn" };
    let stderr_filter = EnvFilter::try_from_env(ENV_LOG)
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let stderr_layer = if cli.log_format == "json" {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed()
    };

    let log_dir = home.join(LOGS_DIR);
    let (file_layer, guard) = match std::fs::create_dir_all(&log_dir) {
        Ok(()) => {
            let appender = tracing_appender::rolling::daily(&log_dir, "runway.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_filter(EnvFilter::new("runway=info"));
            (Some(layer), Some(guard))
        }
        Err(_) => (None, None),
    };

    let _ = tracing_subscriber::registry()
        .with(stderr_layer.with_filter(stderr_filter))
        .with(file_layer)
        .try_init();
    guard
}

fn print_json_error(err: &anyhow::Error) {
    let code = err
        .downcast_ref::<RunwayError>()
        .map(|e| e.code())
        .unwrap_or("error");
    let body = serde_json::json!({
        "error": {
            "code": code,
            "message": format!("{:#}", err),
        }
    });
    println!("{}", body);
}

async fn dispatch(cli: &Cli, home: PathBuf) -> Result<()> {
    let session = cmd::Session::load(cli, home)?;

    match &cli.command {
        Commands::Start {
            workflow,
            work_item,
            autonomy,
        } => cmd::cmd_start(&session, workflow, work_item.clone(), autonomy.as_deref())?,
        Commands::Advance {
            run,
            outcome,
            reason,
            code,
        } => cmd::cmd_advance(
            &session,
            run.as_deref(),
            outcome,
            reason.clone(),
            code.as_deref(),
        )?,
        Commands::Fail {
            run,
            message,
            code,
            recoverable,
        } => cmd::cmd_fail(&session, run.as_deref(), code, message, *recoverable)?,
        Commands::Pause { run } => cmd::cmd_pause(&session, run.as_deref())?,
        Commands::Resume { run } => cmd::cmd_resume(&session, run.as_deref())?,
        Commands::Cancel { run } => cmd::cmd_cancel(&session, run.as_deref())?,
        Commands::Recover {
            run,
            from_phase,
            skip,
            checkpoint,
        } => cmd::cmd_recover(
            &session,
            run.as_deref(),
            from_phase.as_deref(),
            skip,
            checkpoint.as_deref(),
        )?,
        Commands::Status { run, events } => cmd::cmd_status(&session, run.as_deref(), *events)?,
        Commands::List {
            status,
            work_item,
            workflow,
            all,
            limit,
        } => cmd::cmd_list(
            &session,
            cmd::ListArgs {
                status: status.clone(),
                work_item: work_item.clone(),
                workflow: workflow.clone(),
                all: *all,
                whole_organization: cli.org.is_some() && cli.project.is_none(),
                limit: *limit,
            },
        )?,
        Commands::Cleanup {
            max_age_days,
            mode,
            dry_run,
        } => cmd::cmd_cleanup(&session, *max_age_days, mode.as_deref(), *dry_run)?,
        Commands::Emit {
            run,
            event_type,
            phase,
            step,
            status,
            message,
            meta,
            data,
        } => cmd::cmd_emit(
            &session,
            run,
            cmd::EmitArgs {
                event_type: event_type.clone(),
                phase: phase.clone(),
                step: step.clone(),
                status: status.clone(),
                message: message.clone(),
                meta: meta.clone(),
                data: data.clone(),
            },
        )?,
        Commands::Events {
            run,
            phase,
            event_type,
            since,
            until,
            after,
        } => cmd::cmd_events(
            &session,
            run.as_deref(),
            cmd::EventQuery {
                phase: phase.clone(),
                event_type: event_type.clone(),
                since: since.clone(),
                until: until.clone(),
                after: *after,
            },
        )?,
        Commands::Consolidate { run } => cmd::cmd_consolidate(&session, run.as_deref())?,
        Commands::Checkpoint { command } => cmd::cmd_checkpoint(&session, command.clone())?,
        Commands::Drive {
            run,
            command,
            timeout_secs,
            max_phases,
        } => {
            cmd::cmd_drive(
                &session,
                run.as_deref(),
                command.clone(),
                *timeout_secs,
                *max_phases,
            )
            .await?
        }
        Commands::Workflows => cmd::cmd_workflows(&session)?,
        Commands::Config { command } => cmd::cmd_config(&session, command.clone())?,
        Commands::Item { command } => cmd::cmd_item(&session, command.clone())?,
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let home = RunwayConfig::resolve_home(cli.home.clone());
    let log_guard = init_tracing(&cli, &home);

    match dispatch(&cli, home).await {
        Err(err) if cli.json => {
            print_json_error(&err);
            drop(log_guard);
            std::process::exit(1);
        }
        result => result,
    }
}
