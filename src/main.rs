use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use agent_integrity::TaskInput;

mod commands;

#[derive(Parser)]
#[command(name = "integrity")]
#[command(about = "Track agent task ratings and how honestly agents rate themselves")]
#[command(version)]
struct Cli {
    /// Path to the data directory (default: .integrity in current dir)
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Output as JSON for machine consumption
    #[arg(long, global = true)]
    json: bool,

    /// Log at debug level (overridden by RUST_LOG)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default config and seed the default agents
    Init,

    /// Record a completed task for an agent
    Record {
        /// Agent that performed the task
        #[arg(long)]
        agent: String,

        /// Task category (e.g. resume_generation, cover_letter)
        #[arg(long)]
        task_type: String,

        /// Task ID (generated if not provided)
        #[arg(long)]
        task_id: Option<String>,

        /// Client rating, 1.0 to 5.0
        #[arg(long)]
        rating: Option<f64>,

        /// Client feedback text
        #[arg(long)]
        feedback: Option<String>,

        /// The agent's own rating of its work, 1.0 to 5.0
        #[arg(long)]
        self_rating: Option<f64>,

        /// Execution time in milliseconds
        #[arg(long, default_value_t = 0)]
        execution_ms: u64,

        /// Error encountered during the task (can specify multiple)
        #[arg(long = "error")]
        errors: Vec<String>,
    },

    /// Show agents ranked by rating, worst first
    Dashboard,

    /// Show the system-wide integrity score
    System,

    /// List learning sessions from the learning queue
    Sessions {
        /// Only show sessions for this agent
        #[arg(long)]
        agent: Option<String>,
    },

    /// Record synthetic feedback on a timer and log integrity checks
    Simulate {
        /// Stop after this many synthetic tasks (default: run until Ctrl-C)
        #[arg(long)]
        ticks: Option<u64>,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "agent_integrity=debug,integrity=debug"
    } else {
        "agent_integrity=info,integrity=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let dir = cli.dir.unwrap_or_else(|| PathBuf::from(".integrity"));

    match cli.command {
        Commands::Init => commands::init::run(&dir),
        Commands::Record {
            agent,
            task_type,
            task_id,
            rating,
            feedback,
            self_rating,
            execution_ms,
            errors,
        } => {
            let input = TaskInput {
                agent_id: agent,
                task_id,
                task_type,
                client_rating: rating,
                client_feedback: feedback,
                agent_self_rating: self_rating,
                execution_time_ms: execution_ms,
                errors,
            };
            commands::record::run(&dir, input, cli.json)
        }
        Commands::Dashboard => commands::dashboard::run(&dir, cli.json),
        Commands::System => commands::system::run(&dir, cli.json),
        Commands::Sessions { agent } => commands::sessions::run(&dir, agent.as_deref(), cli.json),
        Commands::Simulate { ticks } => commands::simulate::run(&dir, ticks),
    }
}
