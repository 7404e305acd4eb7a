//! slotctl - warehouse slotting command-line tool
//!
//! - zone lookups against the configured zone table
//! - an in-memory run of the receive, consolidate and address flow

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;
use slotting_engine::{EngineConfig, ZoneResolver};
use slotting_types::PositionCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod demo;

/// Slotting CLI
#[derive(Parser)]
#[command(name = "slotctl")]
#[command(about = "Warehouse slotting and consolidation tool", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "SLOTTING_CONFIG")]
    config: Option<String>,

    /// Log level
    #[arg(long, env = "SLOTTING_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long, env = "SLOTTING_LOG_JSON")]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a destination abbreviation to its canonical name
    Resolve {
        /// Abbreviation such as RP or CPS
        abbreviation: String,
    },

    /// Check whether a position lies in a destination's preferential zone
    Zone {
        /// Position code such as PD-097-03
        code: String,

        /// Canonical destination or abbreviation
        destination: String,
    },

    /// Print the zone table
    Zones,

    /// Seed an in-memory warehouse and run a cargo through it
    Demo {
        /// Volumes on the demo invoice
        #[arg(long, default_value_t = 5)]
        volumes: u32,

        /// Positions the demo pallet occupies
        #[arg(long, default_value_t = 1)]
        slots: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| cli.log_level.clone().into());

    if cli.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    let config = EngineConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    let resolver = config
        .zones
        .clone()
        .map(ZoneResolver::new)
        .unwrap_or_default();

    let output = match cli.command {
        Commands::Resolve { abbreviation } => json!({
            "abbreviation": abbreviation,
            "destination": resolver.resolve_destination(&abbreviation),
        }),
        Commands::Zone { code, destination } => {
            let parsed = PositionCode::parse(&code)?;
            let canonical = resolver
                .resolve_destination(&destination)
                .unwrap_or(destination.as_str());
            json!({
                "code": parsed.to_string(),
                "destination": canonical,
                "preferential": resolver.is_preferential_code(&parsed, canonical),
                "zone": resolver.preferred_destination(&code),
            })
        }
        Commands::Zones => serde_json::to_value(resolver.table())?,
        Commands::Demo { volumes, slots } => demo::run(&config, volumes, slots).await?,
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
