use std::{env, error::Error, path::Path};

use aqueduct::db::dockless::trips_archive::html_report;
use aqueduct::db::prod_db::ProdDb;
use aqueduct::utils::send_email::send_email;
use chrono::{Duration, Utc};
use chrono_tz::America::Los_Angeles;
use clap::Parser;
use log::info;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Environment name, e.g., test, prod
    #[arg(short, long, default_value = "prod")]
    env: String,
}

/// Run this job every day, shortly after midnight
#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();
    dotenvy::from_path(Path::new(format!(".env/{}.env", args.env).as_str())).unwrap();

    let archive = ProdDb::dockless_trips();
    let pool = archive.connect(&env::var("POSTGRES_URL")?).await?;
    archive.refresh_views(&pool).await?;

    let today = Utc::now().with_timezone(&Los_Angeles).date_naive();
    let yesterday = today - Duration::days(1);
    let stats = archive.daily_stats(&pool, yesterday, today).await?;
    info!(
        "{} trips across {} devices between {} and {}",
        stats.trips, stats.devices, yesterday, today
    );

    let html = html_report(&stats);
    let response = send_email(
        &env::var("EMAIL_FROM")?,
        &[env::var("EMAIL_MAIN")?],
        &format!("Scooter stat {}", today),
        &format!(
            "In the last 24 hours, the number of trips observed was {} across {} devices.",
            stats.trips, stats.devices
        ),
        Some(html),
    )
    .await?;

    if response.status().is_success() {
        info!("Email sent successfully!");
    } else {
        info!("Failed to send email. Status: {:?}", response.status());
        let body = response.text().await?;
        info!("Response body: {}", body);
    }

    Ok(())
}
