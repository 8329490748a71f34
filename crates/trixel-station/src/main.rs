//! Trixel Station binary
//!
//! Runs a measurement station against the discovery and management services
//! and administers its stored configuration.

mod cli;

use std::path::{Path, PathBuf};

use cli::Command;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use trixel_client::{
    Client, ClientConfig, ConfigPersister, Coordinate, JsonFilePersister, TransportOptions,
};

type BoxError = Box<dyn std::error::Error>;

fn config_path() -> PathBuf {
    std::env::var("TRIXEL_STATION_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./station.json"))
}

fn open(path: &Path) -> Result<Client, BoxError> {
    let config = ClientConfig::load(path)?;
    let client = Client::http(
        config,
        TransportOptions::default(),
        JsonFilePersister::new(path),
    )?;
    Ok(client)
}

fn init(
    path: &Path,
    location: Coordinate,
    k: std::num::NonZeroU32,
    discovery_host: String,
    use_tls: bool,
) -> Result<(), BoxError> {
    if path.exists() {
        return Err(format!("{} already exists", path.display()).into());
    }
    let config = ClientConfig::new(location, k, discovery_host).with_tls(use_tls);
    config.validate()?;
    JsonFilePersister::new(path).persist(&config)?;
    tracing::info!(path = %path.display(), "wrote station configuration");
    Ok(())
}

async fn run(path: &Path) -> Result<(), BoxError> {
    let client = open(path)?;
    client.start().await?;

    for (measurement_type, trixel) in client.trixels().await.iter() {
        tracing::info!(%measurement_type, trixel = %trixel.name(), "contributing");
    }

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("Shutting down");
        }
        _ = client.wait_dead() => {
            tracing::info!("Station was deleted");
        }
    }
    Ok(())
}

async fn delete(path: &Path) -> Result<(), BoxError> {
    let client = open(path)?;
    // The authority is only known after resolution
    client.start().await?;
    client.delete().await?;
    println!("Station deleted");
    Ok(())
}

fn show(path: &Path) -> Result<(), BoxError> {
    let mut config = ClientConfig::load(path)?;
    if let Some(station) = config.station.as_mut() {
        station.token = "<redacted>".into();
    }
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trixel_station=info,trixel_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().collect();
    let command = match cli::parse(&args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!();
            cli::print_usage();
            std::process::exit(1);
        }
    };

    let path = config_path();
    match command {
        Command::Init {
            location,
            k,
            discovery_host,
            use_tls,
        } => init(&path, location, k, discovery_host, use_tls)?,
        Command::Run => run(&path).await?,
        // Offline changes are only persisted, the next run applies them
        Command::SetLocation(location) => {
            open(&path)?.set_location(location).await?;
            println!("Location set to {location}");
        }
        Command::SetK(k) => {
            open(&path)?.set_k(k).await?;
            println!("k requirement set to {k}");
        }
        Command::Delete => delete(&path).await?,
        Command::Show => show(&path)?,
    }

    Ok(())
}
