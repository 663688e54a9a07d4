#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line front end for the land impact engine.
//!
//! Runs one-off simulations from request files, estimates industrial
//! emissions, or starts the API server. Results are printed as JSON on
//! stdout; logs go to stderr and follow `RUST_LOG`.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use land_impact_provider::config::ProviderConfig;
use land_impact_simulation::batch::ImpactEngine;
use land_impact_simulation_models::{EmissionsAttributes, SimulationRequest};
use serde::Serialize;

/// Estimate the environmental impact of land-use scenarios.
#[derive(Parser)]
#[command(name = "land_impact_cli")]
#[command(about = "Estimate the environmental impact of land-use scenarios")]
struct Cli {
    /// Pretrained industry model (defaults to `INDUSTRY_MODEL_PATH`).
    #[arg(long, global = true)]
    model_path: Option<PathBuf>,

    /// Treat this date (YYYY-MM-DD) as today.
    #[arg(long, global = true)]
    today: Option<NaiveDate>,

    /// Subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Simulate a request holding exactly one geometry.
    Simulate {
        /// Request JSON file.
        request: PathBuf,

        /// Override the request's preset.
        #[arg(long)]
        preset: Option<String>,
    },

    /// Simulate every geometry of a request.
    Batch {
        /// Request JSON file.
        request: PathBuf,

        /// Include simulated-layer tile URLs.
        #[arg(long)]
        tiles: bool,
    },

    /// Estimate the emissions index and temperature delta of a facility.
    Emissions {
        #[arg(long, allow_negative_numbers = true)]
        latitude: f64,

        #[arg(long, allow_negative_numbers = true)]
        longitude: f64,

        /// CO2 mass.
        #[arg(long, default_value_t = 0.0)]
        co2: f64,

        /// CH4 mass.
        #[arg(long, default_value_t = 0.0)]
        ch4: f64,

        /// N2O mass.
        #[arg(long, default_value_t = 0.0)]
        n2o: f64,

        /// Industry category; repeat for several.
        #[arg(long = "industry")]
        industries: Vec<String>,
    },

    /// Start the API server.
    Serve,
}

fn load_request(path: &Path) -> Result<SimulationRequest, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
    Ok(serde_json::from_str(&text)
        .map_err(|e| format!("Failed to parse {}: {e}", path.display()))?)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn build_engine(cli: &Cli) -> Result<ImpactEngine, Box<dyn std::error::Error>> {
    let provider = ProviderConfig::from_env()?.connect()?;
    log::info!("Using {} compute provider", provider.name());
    let model_path = cli
        .model_path
        .clone()
        .unwrap_or_else(land_impact_industry::model_path_from_env);
    let engine = ImpactEngine::from_provider(provider, model_path);
    Ok(match cli.today {
        Some(today) => engine.with_today(today),
        None => engine,
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if matches!(cli.command, Commands::Serve) {
        // The server installs its own logger and uses actix-web's runtime,
        // so it runs on a blocking thread to avoid nesting tokio runtimes.
        tokio::task::spawn_blocking(|| {
            actix_web::rt::System::new().block_on(land_impact_server::run_server())
        })
        .await??;
        return Ok(());
    }

    pretty_env_logger::init_custom_env("RUST_LOG");
    let engine = build_engine(&cli)?;

    match cli.command {
        Commands::Simulate { request, preset } => {
            let mut request = load_request(&request)?;
            if preset.is_some() {
                request.preset = preset;
            }
            print_json(&engine.simulate(&request).await?)?;
        }
        Commands::Batch { request, tiles } => {
            let request = load_request(&request)?;
            if tiles {
                print_json(&engine.simulate_tiles(&request).await?)?;
            } else {
                print_json(&engine.simulate_batch(&request).await?)?;
            }
        }
        Commands::Emissions {
            latitude,
            longitude,
            co2,
            ch4,
            n2o,
            industries,
        } => {
            let attributes = EmissionsAttributes {
                co2,
                ch4,
                n2o,
                industries,
            };
            let estimate = engine
                .industry()
                .estimate(latitude, longitude, &attributes, engine.today())
                .await;
            print_json(&estimate)?;
        }
        Commands::Serve => {}
    }

    Ok(())
}
