//! nodeagent - main entry point

use clap::{Parser, Subcommand};
use nodeagent::config::AgentConfig;
use nodeagent::error::STARTUP_FAILURE_EXIT_CODE;
use nodeagent::observability::init_default_logging;
use nodeagent::publisher::HostProbe;
use nodeagent::reboot::ProcessRestarter;
use nodeagent::transport::link::HostLink;
use nodeagent::transport::mqtt::MqttSession;
use nodeagent::transport::NoUpdates;
use nodeagent::{Collaborators, NodeAgent, SignalFlags, SystemClock};
use std::path::{Path, PathBuf};
use std::process;
use tracing::{error, info, Level};

/// Always-on device agent
#[derive(Parser)]
#[command(name = "nodeagent")]
#[command(about = "Keeps link and MQTT session alive, reports state, runs remote commands")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "NODEAGENT_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent until SIGINT/SIGTERM
    Run,
    /// Validate the configuration
    Config {
        /// Print the effective configuration
        #[arg(long)]
        show: bool,
    },
}

const DEFAULT_CONFIG_PATHS: [&str; 3] = [
    "nodeagent.toml",
    "config/nodeagent.toml",
    "/etc/nodeagent/nodeagent.toml",
];

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => None,
        1 => Some(Level::DEBUG),
        _ => Some(Level::TRACE),
    };
    init_default_logging(level);

    info!("Starting nodeagent v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(STARTUP_FAILURE_EXIT_CODE);
        }
    };

    let result = match cli.command {
        Commands::Run => run_agent(config).await,
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(STARTUP_FAILURE_EXIT_CODE);
    }

    info!("Application shutdown complete");
}

fn load_configuration(path: Option<&Path>) -> Result<AgentConfig, Box<dyn std::error::Error>> {
    if let Some(path) = path {
        info!("Loading configuration from: {}", path.display());
        return Ok(AgentConfig::load_from_file(path)?);
    }

    for candidate in DEFAULT_CONFIG_PATHS {
        let path = Path::new(candidate);
        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            return Ok(AgentConfig::load_from_file(path)?);
        }
    }

    Err(format!(
        "No configuration file found; pass -c/--config or create one of {}",
        DEFAULT_CONFIG_PATHS.join(", ")
    )
    .into())
}

async fn run_agent(config: AgentConfig) -> Result<(), Box<dyn std::error::Error>> {
    let signals = SignalFlags::register()?;

    let parts = Collaborators {
        link: HostLink::new(&config.link),
        session: MqttSession::new(config.mqtt.clone()),
        updates: NoUpdates,
        clock: SystemClock::new(),
        restarter: ProcessRestarter,
        probe: HostProbe::new(),
        signals,
    };

    let mut agent = NodeAgent::new(config, parts)?;
    agent.setup().await?;
    agent.run().await?;
    Ok(())
}

fn handle_config_command(config: &AgentConfig, show: bool) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("{}", toml::to_string_pretty(config)?);
    }

    info!("Configuration validation complete");
    Ok(())
}
