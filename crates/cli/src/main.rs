use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "perp-scalper")]
#[command(about = "Single-position perp scalper for Bitget futures", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the controller daemon with the operator API
    Run {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
    /// Print the current position record from a running daemon
    Status {
        /// Operator API address
        #[arg(short, long, default_value = "http://127.0.0.1:8080")]
        addr: String,
    },
    /// Pause trading (the daemon keeps reconciling)
    Pause {
        /// Operator API address
        #[arg(short, long, default_value = "http://127.0.0.1:8080")]
        addr: String,
    },
    /// Resume trading
    Resume {
        /// Operator API address
        #[arg(short, long, default_value = "http://127.0.0.1:8080")]
        addr: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => {
            commands::run_controller(&config).await?;
        }
        Commands::Status { addr } => {
            commands::show_status(&addr).await?;
        }
        Commands::Pause { addr } => {
            commands::set_paused(&addr, true).await?;
        }
        Commands::Resume { addr } => {
            commands::set_paused(&addr, false).await?;
        }
    }

    Ok(())
}
