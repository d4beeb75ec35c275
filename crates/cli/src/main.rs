use std::path::Path;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use optrade_core::{ConfigLoader, ConfigProfile, Credentials};
use optrade_engine::{Engine, ShutdownHandle};
use optrade_execution::{PaperPlatform, StateStore};

#[derive(Parser)]
#[command(name = "optrade")]
#[command(about = "Options trading decision engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the live decision loop
    Run {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
        /// Symbols to trade (overrides the config's list)
        #[arg(long)]
        symbols: Vec<String>,
        /// Bearer token for the trading platform
        #[arg(long, env = "OPTRADE_AUTH_TOKEN")]
        auth_token: Option<String>,
    },
    /// Load, validate, and print the effective configuration
    CheckConfig {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
    /// Print the persisted position snapshot
    Positions {
        /// State directory
        #[arg(long, default_value = "state")]
        state_dir: String,
    },
}

fn load_profile(path: &str) -> anyhow::Result<ConfigProfile> {
    let path = Path::new(path);
    if path.exists() {
        Ok(ConfigLoader::load(path)?)
    } else {
        info!(path = %path.display(), "config file not found, using defaults");
        Ok(ConfigLoader::load_default()?)
    }
}

async fn run(config: &str, symbols: Vec<String>, auth_token: Option<String>) -> anyhow::Result<()> {
    let mut profile = load_profile(config)?;
    if !symbols.is_empty() {
        profile.engine.symbols = symbols;
    }
    profile.validate()?;

    let credentials = match auth_token {
        Some(token) => Credentials::Bearer { token },
        None => Credentials::None,
    };
    let router = optrade_data::build_router(&profile.data)?;
    let platform = PaperPlatform::new(profile.backtest.commission_per_contract);

    let mut engine = Engine::bootstrap(profile, router, platform, &credentials)
        .await
        .context("engine bootstrap failed")?;

    let (handle, shutdown) = ShutdownHandle::new();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received");
            handle.shutdown();
        }
    });

    optrade_engine::run(&mut engine, shutdown).await
}

fn check_config(config: &str) -> anyhow::Result<()> {
    let profile = load_profile(config)?;
    println!("{}", serde_json::to_string_pretty(&profile)?);
    Ok(())
}

fn show_positions(state_dir: &str) -> anyhow::Result<()> {
    let store = StateStore::open(Path::new(state_dir))?;
    let Some(snapshot) = store.load()? else {
        println!("no state snapshot at {state_dir}");
        return Ok(());
    };
    if snapshot.positions.is_empty() {
        println!("no positions");
        return Ok(());
    }
    for position in &snapshot.positions {
        println!(
            "{} {} {} x{} opened {} status {:?} pnl {}",
            position.id,
            position.plan.symbol,
            position.plan.kind,
            position.plan.contracts(),
            position.opened_at.format("%Y-%m-%d %H:%M"),
            position.status,
            position.realized_pnl,
        );
    }
    Ok(())
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
        Commands::Run {
            config,
            symbols,
            auth_token,
        } => run(&config, symbols, auth_token).await,
        Commands::CheckConfig { config } => check_config(&config),
        Commands::Positions { state_dir } => show_positions(&state_dir),
    }
}
