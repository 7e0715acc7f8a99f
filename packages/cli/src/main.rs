#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line front end for the toponym map engine.
//!
//! ```text
//! toponym_map resolve <boundary-id> --lat <lat> --lon <lon> [--administrative]
//! toponym_map preview --lat <lat> --lon <lon> [--boundary-id <id>] [--administrative]
//! toponym_map dms <lat> <lon>
//! toponym_map search --lat <lat> --lon <lon> [--radius 5000] [--term <text>]
//! toponym_map config
//! ```
//!
//! `preview` drives a recording surface through the same camera and
//! render sequence an interactive map would receive and prints it.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use toponym_map_engine::{CliOverrides, Engine, EngineConfig};
use toponym_map_geometry_models::{FeatureKind, LatLng};
use toponym_map_search::{CoordinateQuery, DmsPair, SearchFilters, SearchOutcome};
use toponym_map_surface::{Generation, RecordingSurface, SurfaceHandle};
use toponym_map_toponym_models::{LocalizedText, Toponym};

#[derive(Parser)]
#[command(
    name = "toponym_map",
    about = "Resolve, frame and search toponyms from the command line"
)]
struct Cli {
    /// TOML file layered over the built-in defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Geodata interpreter endpoint
    #[arg(long, global = true)]
    overpass_url: Option<String>,
    /// Content API base URL
    #[arg(long, global = true)]
    content_api_url: Option<String>,
    /// Display language for names and ranking
    #[arg(long, global = true)]
    language: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Position {
    /// Latitude in decimal degrees
    #[arg(long, allow_negative_numbers = true)]
    lat: f64,
    /// Longitude in decimal degrees
    #[arg(long, allow_negative_numbers = true)]
    lon: f64,
}

impl Position {
    fn to_lat_lng(&self) -> Result<LatLng, String> {
        let point = LatLng::new(self.lat, self.lon);
        if point.is_valid() {
            Ok(point)
        } else {
            Err(format!("Invalid position: {point}"))
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a boundary identifier into classified geometry and its viewport
    Resolve {
        /// External geodata identifier
        boundary_id: i64,
        /// Query the identifier as an administrative relation
        #[arg(long)]
        administrative: bool,
        #[command(flatten)]
        position: Position,
    },
    /// Print the surface commands presenting a toponym would issue
    Preview {
        /// External geodata identifier
        #[arg(long)]
        boundary_id: Option<i64>,
        /// Query the identifier as an administrative relation
        #[arg(long)]
        administrative: bool,
        #[command(flatten)]
        position: Position,
    },
    /// Format a position in degrees, minutes and seconds
    Dms {
        /// Latitude in decimal degrees
        #[arg(allow_negative_numbers = true)]
        lat: f64,
        /// Longitude in decimal degrees
        #[arg(allow_negative_numbers = true)]
        lon: f64,
    },
    /// Search toponyms within a radius of a point
    Search {
        #[command(flatten)]
        position: Position,
        /// Radius in meters (defaults to the configured radius)
        #[arg(long)]
        radius: Option<u32>,
        /// Free-text term used to rank the page
        #[arg(long)]
        term: Option<String>,
        /// Region filter
        #[arg(long)]
        region: Option<i64>,
        /// Category filter
        #[arg(long)]
        category: Option<i64>,
        /// Result page (1-based)
        #[arg(long)]
        page: Option<u32>,
        /// Only print the results view URL
        #[arg(long)]
        url_only: bool,
    },
    /// Print the effective configuration
    Config,
}

fn cli_toponym(boundary_id: Option<i64>, administrative: bool, position: LatLng) -> Toponym {
    Toponym {
        id: 0,
        name: LocalizedText::default(),
        description: LocalizedText::default(),
        position,
        boundary_id,
        feature_kind: Some(FeatureKind::from_hint(administrative)),
        duplicate_count: None,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init_custom_env("RUST_LOG");
    let cli = Cli::parse();

    let mut config = EngineConfig::load(cli.config.as_deref())?;
    config.apply_cli(CliOverrides {
        overpass_url: cli.overpass_url,
        content_api_url: cli.content_api_url,
        language: cli.language,
    });

    match cli.command {
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Dms { lat, lon } => {
            println!("{}", DmsPair::from(LatLng::new(lat, lon)));
        }
        Commands::Resolve {
            boundary_id,
            administrative,
            position,
        } => {
            let engine = Engine::from_config(config)?;
            let toponym = cli_toponym(Some(boundary_id), administrative, position.to_lat_lng()?);

            if let Some(presentation) = engine.presenter().resolve(&toponym).await {
                println!("{}", serde_json::to_string_pretty(&presentation)?);
            }
        }
        Commands::Preview {
            boundary_id,
            administrative,
            position,
        } => {
            let engine = Engine::from_config(config)?;
            let toponym = cli_toponym(boundary_id, administrative, position.to_lat_lng()?);

            let surface = RecordingSurface::ready(Generation::default());
            let handle = SurfaceHandle::new(surface.clone());
            engine.presenter().present(&handle, &toponym).await?;

            println!("{}", serde_json::to_string_pretty(&surface.commands())?);
        }
        Commands::Search {
            position,
            radius,
            term,
            region,
            category,
            page,
            url_only,
        } => {
            let radius = radius.unwrap_or(config.search.radius_meters);
            let query = CoordinateQuery::new(position.to_lat_lng()?, radius).with_filters(
                SearchFilters {
                    region,
                    category,
                    term,
                    page,
                    ..SearchFilters::default()
                },
            );
            println!("{}", query.navigation_url(&config.search.results_url)?);
            if url_only {
                return Ok(());
            }

            let language = config.language.clone();
            let engine = Engine::from_config(config)?;
            let session = engine.search();
            let outcome = session.search(query).await;
            log::debug!("Search finished: {outcome:?}");

            if let SearchOutcome::Failed { notice } = outcome {
                eprintln!("{notice}");
                std::process::exit(1);
            }
            let Some(results) = session.displayed() else {
                return Ok(());
            };

            println!();
            println!("{:<10} {:<40} POSITION", "ID", "NAME");
            println!("{}", "-".repeat(80));
            for toponym in &results.page.results {
                println!(
                    "{:<10} {:<40} {}",
                    toponym.id,
                    toponym.display_name(&language),
                    DmsPair::from(toponym.position)
                );
            }
            println!(
                "\n{} of {} toponym(s)",
                results.page.results.len(),
                results.page.count
            );
        }
    }

    Ok(())
}
