#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the air quality sync tool.

use air_sync_database::postgres::PgDatabase;
use air_sync_database::queries;
use air_sync_ingest::{register_purpleair, sync_kind, update_purpleair_locations};
use air_sync_source::HttpFetcher;
use air_sync_source::registry::all_vendors;
use air_sync_source_models::{SQL_TIMESTAMP_FMT, SensorKind};
use chrono::Utc;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "air_sync_ingest", about = "Air quality data sync tool")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync every time-series vendor
    SyncAll,
    /// Sync one vendor kind (e.g. "thingspeak", "atmotube")
    Sync {
        /// Vendor kind
        kind: String,
    },
    /// Register new sensors from the `PurpleAir` registry
    Register {
        /// `PurpleAir` API key; falls back to the `PURPLEAIR_API_KEY`
        /// environment variable
        #[arg(long)]
        api_key: Option<String>,
    },
    /// Update the location history of `PurpleAir` sensors that moved
    UpdateLocations {
        /// `PurpleAir` API key; falls back to the `PURPLEAIR_API_KEY`
        /// environment variable
        #[arg(long)]
        api_key: Option<String>,
    },
    /// List the acquisition channels of one vendor kind
    Channels {
        /// Vendor kind
        kind: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::SyncAll => {
            let db = PgDatabase::connect_from_env().await?;
            let fetcher = HttpFetcher::new();
            for vendor in all_vendors() {
                if vendor.measure_table.is_none() {
                    continue;
                }
                if let Err(e) = sync_kind(&db, &fetcher, vendor.kind, Utc::now()).await {
                    log::error!("failed to sync '{}': {e}", vendor.kind);
                }
            }
        }
        Commands::Sync { kind } => {
            let kind = kind.parse::<SensorKind>()?;
            let db = PgDatabase::connect_from_env().await?;
            let fetcher = HttpFetcher::new();
            sync_kind(&db, &fetcher, kind, Utc::now()).await?;
        }
        Commands::Register { api_key } => {
            let api_key = api_key
                .or_else(|| std::env::var("PURPLEAIR_API_KEY").ok())
                .ok_or("missing PurpleAir API key: pass --api-key or set PURPLEAIR_API_KEY")?;
            let db = PgDatabase::connect_from_env().await?;
            let fetcher = HttpFetcher::new();
            register_purpleair(&db, &fetcher, &api_key, Utc::now()).await?;
        }
        Commands::UpdateLocations { api_key } => {
            let api_key = api_key
                .or_else(|| std::env::var("PURPLEAIR_API_KEY").ok())
                .ok_or("missing PurpleAir API key: pass --api-key or set PURPLEAIR_API_KEY")?;
            let db = PgDatabase::connect_from_env().await?;
            let fetcher = HttpFetcher::new();
            update_purpleair_locations(&db, &fetcher, &api_key, Utc::now()).await?;
        }
        Commands::Channels { kind } => {
            let kind = kind.parse::<SensorKind>()?;
            let db = PgDatabase::connect_from_env().await?;
            let channels = queries::channels(&db, kind).await?;
            println!("{:<10} {:<15} {:<20} LAST ACQUISITION", "SENSOR", "CHANNEL", "API ID");
            println!("{}", "-".repeat(70));
            for channel in &channels {
                println!(
                    "{:<10} {:<15} {:<20} {}",
                    channel.sensor_id,
                    channel.channel_name,
                    channel.api_id,
                    channel.last_acquisition.format(SQL_TIMESTAMP_FMT)
                );
            }
        }
    }

    Ok(())
}
