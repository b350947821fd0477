use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand};
use fxhistory::core::log::init_logging;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args)]
struct HistoryArgs {
    /// Source currency code, e.g. USD
    #[arg(long)]
    from: String,
    /// Target currency code, e.g. EUR
    #[arg(long)]
    to: String,
    /// First day of the range (YYYY-MM-DD)
    #[arg(long)]
    start_date: String,
    /// Last day of the range (YYYY-MM-DD), clamped to today
    #[arg(long)]
    end_date: String,
    /// Print the JSON array instead of a table
    #[arg(long)]
    json: bool,
}

impl From<Commands> for fxhistory::AppCommand {
    fn from(cmd: Commands) -> fxhistory::AppCommand {
        match cmd {
            Commands::Serve => fxhistory::AppCommand::Serve,
            Commands::History(args) => fxhistory::AppCommand::History(fxhistory::HistoryRequest {
                from: args.from,
                to: args.to,
                start_date: args.start_date,
                end_date: args.end_date,
                json: args.json,
            }),
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Start the HTTP service
    Serve,
    /// Fetch the daily rates of a currency pair over a date range
    History(HistoryArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => setup(),
        Some(cmd) => fxhistory::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}

fn setup() -> anyhow::Result<()> {
    use anyhow::Context;

    let path = fxhistory::config::AppConfig::default_config_path()?;

    if path.exists() {
        anyhow::bail!("Configuration file already exists at {}", path.display());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    std::fs::write(&path, fxhistory::config::DEFAULT_CONFIG)
        .with_context(|| format!("Failed to write config file to {}", path.display()))?;

    tracing::info!("Created default configuration at {}", path.display());
    Ok(())
}
