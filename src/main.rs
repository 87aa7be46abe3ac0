use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(name = "dronetrack", about = "Reconcile live drone position reports into tracks")]
struct Cli {
    /// Tracker config (TOML). Falls back to $DRONETRACK_CONFIG, then built-in defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay newline-delimited transport messages through the tracker
    Replay {
        /// Input file, or `-` for stdin
        #[arg(long, default_value = "-")]
        input: String,

        /// Messages carry no stable ids; assign them by nearest neighbor
        #[arg(long, default_value_t = false)]
        anonymous: bool,

        /// Render tick interval in milliseconds
        #[arg(long, default_value_t = 250)]
        tick_ms: u64,

        /// Write the final views here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = cli
        .config
        .or_else(|| std::env::var("DRONETRACK_CONFIG").ok().map(PathBuf::from));
    let config = commands::load_config(config_path.as_deref())?;

    match cli.command {
        Commands::Replay {
            input,
            anonymous,
            tick_ms,
            output,
        } => {
            commands::handle_replay(commands::ReplayConfig {
                tracker: config,
                input,
                anonymous,
                tick_ms,
                output,
            })
            .await
        }
    }
}
