use std::{env, error::Error, path::Path};

use aqueduct::db::prod_db::ProdDb;
use aqueduct::gis::Gis;
use clap::Parser;
use log::{info, warn};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Environment name, e.g., test, prod
    #[arg(short, long, default_value = "prod")]
    env: String,
    /// Use the pinned JHU county history as the merge base instead of the
    /// published layer.  Only needed when (re)seeding the layer.
    #[arg(long)]
    seed: bool,
}

/// Run this job every hour
fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();
    dotenvy::from_path(Path::new(format!(".env/{}.env", args.env).as_str())).unwrap();

    let layers = ProdDb::covid19_feature_layers();
    let archive = ProdDb::jhu_covid();
    let gis = Gis::connect(
        &layers.portal_url,
        &env::var("ARCGIS_USER")?,
        &env::var("ARCGIS_PASSWORD")?,
    )?;

    // the two jobs are isolated: a bad county scrape must not block the
    // state/province refresh, and vice versa
    if let Err(e) = layers.sync_county_data(&gis, &archive, args.seed) {
        warn!("Failed to load county-level data with error: {}", e);
    }
    if let Err(e) = layers.sync_state_data(&gis, &archive) {
        warn!("Failed to load state-level data with error: {}", e);
    }
    info!("Done");

    Ok(())
}
