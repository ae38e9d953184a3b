use clap::{Parser, Subcommand};
use commands::control::{self, Control};
use geotask_core::Config;
use tracing_subscriber::EnvFilter;

mod commands;
mod context;

#[derive(Parser)]
#[command(name = "geotask", version, about = "Location- and time-triggered task scheduler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Task management
    Task {
        #[command(subcommand)]
        action: commands::task::TaskAction,
    },
    /// Propose a task for the active slot
    Start {
        /// Task ID
        id: i64,
    },
    /// Pause the active task's clock
    Pause,
    /// Resume the active task's clock
    Resume,
    /// Stop the active task and record its session
    Stop,
    /// Snooze a task for the default duration
    Later {
        /// Task ID
        id: i64,
    },
    /// Mark a task complete
    Complete {
        /// Task ID
        id: i64,
    },
    /// Bring a paused task back through arbitration
    ResumePaused {
        /// Task ID
        id: i64,
    },
    /// Print scheduler state as JSON
    Status,
    /// Re-arbitrate expired snoozes and time out stale switch requests
    Tick,
    /// Report that the OS alarm for a task fired
    Alarm {
        /// Task ID
        id: i64,
    },
    /// Feed a notification-action payload, e.g. '{"notificationId":1,"geofenceIds":["home"]}'
    Trigger {
        /// JSON payload
        payload: String,
    },
    /// Outstanding switch requests
    Switch {
        #[command(subcommand)]
        action: commands::switch::SwitchAction,
    },
    /// Recorded sessions
    History {
        /// Only sessions of this task
        #[arg(long)]
        task: Option<i64>,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Run the scheduler loop, reading payloads and "yes <id>" / "no <id>" from stdin
    Run,
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("GEOTASK_LOG")
        .or_else(|_| EnvFilter::try_new(Config::load_or_default().logging.filter))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    init_logging();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Task { action } => commands::task::run(action).await,
        Commands::Start { id } => control::run(Control::Start(id)).await,
        Commands::Pause => control::run(Control::Pause).await,
        Commands::Resume => control::run(Control::Resume).await,
        Commands::Stop => control::run(Control::Stop).await,
        Commands::Later { id } => control::run(Control::Later(id)).await,
        Commands::Complete { id } => control::run(Control::Complete(id)).await,
        Commands::ResumePaused { id } => control::run(Control::ResumePaused(id)).await,
        Commands::Status => control::run(Control::Status).await,
        Commands::Tick => control::run(Control::Tick).await,
        Commands::Alarm { id } => control::run(Control::Alarm(id)).await,
        Commands::Trigger { payload } => control::run(Control::Trigger(payload)).await,
        Commands::Switch { action } => commands::switch::run(action).await,
        Commands::History { task } => commands::history::run(task),
        Commands::Config { action } => commands::config::run(action),
        Commands::Run => commands::run::run().await,
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
