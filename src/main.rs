use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use folio::log::init_logging;

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

impl From<Commands> for folio::AppCommand {
    fn from(cmd: Commands) -> folio::AppCommand {
        match cmd {
            Commands::Summary => folio::AppCommand::Summary,
            Commands::Chart => folio::AppCommand::Chart,
            Commands::List => folio::AppCommand::List,
            Commands::Add {
                asset,
                quantity,
                date,
                price,
            } => folio::AppCommand::Add {
                asset_id: asset,
                quantity,
                date,
                price,
            },
            Commands::Remove { id } => folio::AppCommand::Remove { id },
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Display portfolio valuation
    Summary,
    /// Display the daily deployed-vs-value history
    Chart,
    /// List recorded transactions
    List,
    /// Record a buy transaction
    Add {
        /// Asset id from the configuration, e.g. "btc"
        #[arg(long)]
        asset: String,
        /// Units bought
        #[arg(long)]
        quantity: f64,
        /// Acquisition date ("2024-03-01") or instant ("2024-03-01T15:30:00Z")
        #[arg(long)]
        date: String,
        /// Unit price in EUR; resolved from the quote provider at the given
        /// date when omitted
        #[arg(long)]
        price: Option<f64>,
    },
    /// Delete a transaction by id
    Remove {
        #[arg(long)]
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => setup(),
        Some(cmd) => folio::run_command(cmd.into(), cli.config_path.as_deref()).await,
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

    let path = folio::config::AppConfig::default_config_path()?;

    if path.exists() {
        anyhow::bail!("Configuration file already exists at {}", path.display());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let default_config = folio::config::AppConfig {
        assets: folio::config::AppConfig::default_assets(),
        providers: Default::default(),
        data_dir: None,
    };
    let yaml = serde_yaml::to_string(&default_config).context("Failed to serialize config")?;

    std::fs::write(&path, yaml)
        .with_context(|| format!("Failed to write config file to {}", path.display()))?;

    tracing::info!("Created default configuration at {}", path.display());
    Ok(())
}
