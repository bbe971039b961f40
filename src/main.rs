pub mod types;
pub mod config;
pub mod data;
pub mod colormap;
pub mod processing;
pub mod charts;
pub mod render;
pub mod dashboard;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the pollution map and write the dashboard artifacts
    Generate {
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
    /// Print the data table and summary statistics
    Describe {
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Generate { config } => {
            let app_config = config::AppConfig::load(config.as_deref())?;

            // 1. Load data
            let records = data::load_records(&app_config)?;

            // 2. Resolve the base map once for this session
            let session = data::Session::new(&app_config.input.base_map);
            let notice = match session.map_state() {
                data::MapState::MapAvailable => String::new(),
                data::MapState::MapUnavailable => {
                    let reason = session.base_map().err().map(|e| e.to_string()).unwrap_or_default();
                    tracing::warn!("Map cannot be displayed without the base map: {}", reason);
                    format!("Map cannot be displayed without the base map ({}).", reason)
                }
            };

            // 3. Build and write artifacts
            let dashboard = dashboard::generate(&records, session.base_map().ok(), &app_config.map);
            let written = dashboard::write_artifacts(&dashboard, &app_config, &notice)?;

            println!("Pollution Data Table");
            print!("{}", dashboard::format_table(&dashboard.table));
            println!();
            println!("Summary Statistics");
            print!("{}", dashboard.statistics);

            match written.map_png {
                Some(path) => println!("\nMap generated successfully: {}", path.display()),
                None => println!("\n{}", notice),
            }
            println!("Dashboard written to {}", written.dashboard_json.display());
        }
        Commands::Describe { config } => {
            let app_config = config::AppConfig::load(config.as_deref())?;
            let records = data::load_records(&app_config)?;

            let table = charts::render_styled_table(&records);
            print!("{}", dashboard::format_table(&table));
            println!();
            print!("{}", processing::compute_summary_statistics(&records));
        }
    }

    Ok(())
}
