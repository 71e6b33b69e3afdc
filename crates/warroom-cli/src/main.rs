use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use warroom_adapters::MetaAdLibraryClient;
use warroom_ingest::{BrandBook, IngestService};
use warroom_storage::AdStore;

#[derive(Debug, Parser)]
#[command(name = "warroom-cli")]
#[command(about = "Competitor ad war room command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the dashboard API server.
    Serve {
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run one ingestion batch, optionally scoped to a single brand.
    Fetch {
        #[arg(long)]
        brand: Option<String>,
    },
    /// Wipe stored ads and seed fresh sample data.
    Reseed,
    /// Generate and store a weekly brief for a brand.
    Brief { brand: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let service = Arc::new(build_service().await?);

    match cli.command.unwrap_or(Commands::Serve { port: None }) {
        Commands::Serve { port } => {
            let port = match port {
                Some(port) => port,
                None => env_port()?,
            };
            if service.seed_if_empty().await? {
                info!("seeded sample data on first start");
            }
            warroom_web::serve(service, port).await?;
        }
        Commands::Fetch { brand } => {
            let outcome = service.fetch(brand.as_deref()).await?;
            println!(
                "fetch complete: status={:?} source={:?} ads_loaded={} errors={}",
                outcome.status,
                outcome.source,
                outcome.ads_loaded,
                outcome.errors.len()
            );
            for error in &outcome.errors {
                eprintln!("  {error}");
            }
        }
        Commands::Reseed => {
            let outcome = service.reseed().await?;
            println!("reseed complete: ads_seeded={}", outcome.ads_seeded);
        }
        Commands::Brief { brand } => {
            let outcome = service.generate_brief(&brand).await?;
            println!("{}", outcome.brief_text);
        }
    }

    Ok(())
}

async fn build_service() -> Result<IngestService> {
    let database_url =
        std::env::var("WARROOM_DATABASE_URL").unwrap_or_else(|_| "sqlite://warroom.db".into());
    let store = AdStore::connect(&database_url).await?;

    let brands = match std::env::var("WARROOM_BRANDS_FILE") {
        Ok(path) => BrandBook::from_yaml_path(&path)?,
        Err(_) => BrandBook::builtin(),
    };

    let mut service = IngestService::new(brands, store);
    match std::env::var("META_ACCESS_TOKEN") {
        Ok(token) if !token.trim().is_empty() => {
            service = service.with_live_source(Arc::new(MetaAdLibraryClient::new(token.trim())?));
        }
        _ => {
            info!("META_ACCESS_TOKEN not set, running on sample data");
        }
    }
    Ok(service)
}

fn env_port() -> Result<u16> {
    match std::env::var("WARROOM_PORT") {
        Ok(raw) => Ok(raw.parse()?),
        Err(_) => Ok(8000),
    }
}
