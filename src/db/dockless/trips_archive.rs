use std::error::Error;

use build_html::Html;
use chrono::NaiveDate;
use log::info;
use num_format::{Locale, ToFormattedString};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

/// The dockless trip dataset: a `trips` table fed by the provider feeds, and
/// two materialized views kept fresh for the dashboards.
pub struct DocklessTripsArchive {
    pub trips_view: String,
    pub status_changes_view: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderStats {
    pub provider_name: String,
    pub trips: i64,
    pub devices: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TripStats {
    pub start_day: NaiveDate,
    pub end_day: NaiveDate,
    pub trips: i64,
    pub devices: i64,
    pub by_provider: Vec<ProviderStats>,
}

impl DocklessTripsArchive {
    pub async fn connect(&self, url: &str) -> Result<PgPool, Box<dyn Error>> {
        let pool = PgPoolOptions::new().max_connections(2).connect(url).await?;
        Ok(pool)
    }

    /// Rebuild the materialized views before reporting from them.
    pub async fn refresh_views(&self, pool: &PgPool) -> Result<(), Box<dyn Error>> {
        for view in [&self.status_changes_view, &self.trips_view] {
            info!("refreshing materialized view {}", view);
            sqlx::query(&format!("REFRESH MATERIALIZED VIEW {}", view))
                .execute(pool)
                .await?;
        }
        Ok(())
    }

    /// Trip and device counts for trips ending in [start_day, end_day], in
    /// total and per provider.
    pub async fn daily_stats(
        &self,
        pool: &PgPool,
        start_day: NaiveDate,
        end_day: NaiveDate,
    ) -> Result<TripStats, Box<dyn Error>> {
        let totals = sqlx::query(
            "SELECT count(*) AS trips, count(DISTINCT device_id) AS devices \
             FROM trips WHERE end_time BETWEEN $1 AND $2",
        )
        .bind(start_day)
        .bind(end_day)
        .fetch_one(pool)
        .await?;

        let by_provider = sqlx::query(
            "SELECT provider_name, count(trip_id) AS trips, count(DISTINCT device_id) AS devices \
             FROM trips WHERE end_time BETWEEN $1 AND $2 \
             GROUP BY provider_name ORDER BY provider_name",
        )
        .bind(start_day)
        .bind(end_day)
        .fetch_all(pool)
        .await?
        .iter()
        .map(|row| ProviderStats {
            provider_name: row.get("provider_name"),
            trips: row.get("trips"),
            devices: row.get("devices"),
        })
        .collect();

        Ok(TripStats {
            start_day,
            end_day,
            trips: totals.get("trips"),
            devices: totals.get("devices"),
            by_provider,
        })
    }
}

/// The daily email body.
pub fn html_report(stats: &TripStats) -> String {
    let mut trips_table = build_html::Table::new();
    trips_table.add_header_row(vec!["Provider", "Trips"]);
    for p in &stats.by_provider {
        trips_table.add_body_row(vec![
            p.provider_name.clone(),
            p.trips.to_formatted_string(&Locale::en),
        ]);
    }

    let mut device_table = build_html::Table::new();
    device_table.add_header_row(vec!["Provider", "Devices"]);
    for p in &stats.by_provider {
        device_table.add_body_row(vec![
            p.provider_name.clone(),
            p.devices.to_formatted_string(&Locale::en),
        ]);
    }

    format!(
        r#"
    <html>
        <head>
            <style>
                table {{
                    border-collapse: collapse;
                }}
                thead tr {{
                    background: #eceff4;
                }}
                th, td {{
                    padding: 4px;
                    text-align: right;
                }}
            </style>
        </head>
        <body>
            <p>In the last 24 hours, the number of trips observed was {} across {} devices.</p>
            <h3>Trips by provider</h3>
            {}
            <h3>Devices by provider</h3>
            {}
        </body>
    </html>"#,
        stats.trips.to_formatted_string(&Locale::en),
        stats.devices.to_formatted_string(&Locale::en),
        trips_table.to_html_string(),
        device_table.to_html_string(),
    )
}

#[cfg(test)]
mod tests {
    use std::{env, error::Error, path::Path};

    use chrono::NaiveDate;

    use crate::db::prod_db::ProdDb;

    use super::*;

    fn stats() -> TripStats {
        TripStats {
            start_day: NaiveDate::from_ymd_opt(2020, 3, 19).unwrap(),
            end_day: NaiveDate::from_ymd_opt(2020, 3, 20).unwrap(),
            trips: 12456,
            devices: 1873,
            by_provider: vec![
                ProviderStats {
                    provider_name: "bird".to_string(),
                    trips: 7400,
                    devices: 1100,
                },
                ProviderStats {
                    provider_name: "lime".to_string(),
                    trips: 5056,
                    devices: 773,
                },
            ],
        }
    }

    #[test]
    fn test_html_report() {
        let html = html_report(&stats());
        assert!(html.contains("12,456"));
        assert!(html.contains("1,873"));
        assert!(html.contains("bird"));
        assert!(html.contains("lime"));
        assert!(html.contains("<table>"));
    }

    #[ignore]
    #[tokio::test]
    async fn refresh_and_count() -> Result<(), Box<dyn Error>> {
        dotenvy::from_path(Path::new(".env/test.env")).unwrap();
        let archive = ProdDb::dockless_trips();
        let pool = archive.connect(&env::var("POSTGRES_URL").unwrap()).await?;
        archive.refresh_views(&pool).await?;
        let stats = archive
            .daily_stats(
                &pool,
                NaiveDate::from_ymd_opt(2020, 3, 19).unwrap(),
                NaiveDate::from_ymd_opt(2020, 3, 20).unwrap(),
            )
            .await?;
        println!("{:?}", stats);
        Ok(())
    }
}
