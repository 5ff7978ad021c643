use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use itertools::Itertools;
use jiff::Timestamp;
use log::warn;
use serde::Serialize;
use serde_json::Value;

use crate::gis::Gis;

use super::county_health;
use super::jhu_archive::JhuCovidArchive;
use super::observation::{dedupe_latest, integrify, Observation};

/// Item ids and scratch space for the hosted COVID-19 layers.
pub struct CovidFeatureLayers {
    pub portal_url: String,
    /// county-level time series and current snapshot
    pub county_time_series_id: String,
    pub county_current_id: String,
    /// state/province-level time series and current snapshot
    pub state_time_series_id: String,
    pub state_current_id: String,
    pub tmp_dir: String,
}

impl CovidFeatureLayers {
    /// Read the published county time series back from the portal.  This is
    /// the merge base of every run after the initial seed.
    pub fn load_published_time_series(&self, gis: &Gis) -> Result<Vec<Observation>, Box<dyn Error>> {
        let features = gis.query_features(&self.county_time_series_id)?;
        let mut observations = Vec::new();
        for attributes in &features {
            match observation_from_attributes(attributes) {
                Ok(obs) => observations.push(obs),
                Err(e) => warn!("Skipping malformed feature: {}", e),
            }
        }
        Ok(dedupe_latest(observations))
    }

    /// Merge the history with today's scraped county snapshots and push the
    /// result back to the two county layers.  With `seed`, the history comes
    /// from the pinned JHU county series instead of the published layer.
    pub fn sync_county_data(
        &self,
        gis: &Gis,
        archive: &JhuCovidArchive,
        seed: bool,
    ) -> Result<(), Box<dyn Error>> {
        let mut merged = if seed {
            archive.county_time_series()?
        } else {
            self.load_published_time_series(gis)?
        };
        // scraped snapshots go last so they win the dedupe
        merged.extend(county_health::scrape_all());
        let mut rows = dedupe_latest(merged);

        // placeholder aggregates expected by the published schema
        for row in rows.iter_mut() {
            row.ca_total = Some(0);
            row.non_scag_total = Some(0);
        }

        let time_series_path = self.tmp_path("covid19_time_series.csv");
        let current_path = self.tmp_path("covid19_current.csv");
        write_csv(&time_series_path, &rows)?;
        write_csv(&current_path, &latest_rows(&rows, |o| o.date))?;

        let result = self.overwrite_pair(
            gis,
            &self.county_time_series_id,
            &time_series_path,
            &self.county_current_id,
            &current_path,
        );
        // the temp files go away no matter how the publish went
        remove_files(&[&time_series_path, &current_path]);
        result
    }

    /// Rebuild the state/province layers from the live JHU series.
    pub fn sync_state_data(&self, gis: &Gis, archive: &JhuCovidArchive) -> Result<(), Box<dyn Error>> {
        let rows = archive.state_time_series()?;
        if rows.is_empty() {
            return Err("state/province series came back empty".into());
        }

        let time_series_path = self.tmp_path("jhu_covid19_time_series.csv");
        let current_path = self.tmp_path("jhu_covid19_current.csv");
        write_csv(&time_series_path, &rows)?;
        write_csv(&current_path, &latest_rows(&rows, |r| r.date))?;

        let result = self.overwrite_pair(
            gis,
            &self.state_time_series_id,
            &time_series_path,
            &self.state_current_id,
            &current_path,
        );
        remove_files(&[&time_series_path, &current_path]);
        result
    }

    fn tmp_path(&self, file: &str) -> PathBuf {
        Path::new(&self.tmp_dir).join(file)
    }

    /// No transactional guarantee here: if the first overwrite succeeds and
    /// the second fails, the layers disagree until the next run.
    fn overwrite_pair(
        &self,
        gis: &Gis,
        series_id: &str,
        series_path: &Path,
        current_id: &str,
        current_path: &Path,
    ) -> Result<(), Box<dyn Error>> {
        gis.overwrite_layer(series_id, series_path)?;
        gis.overwrite_layer(current_id, current_path)?;
        Ok(())
    }
}

/// Only the rows carrying the most recent date, for the "current" layer.
pub fn latest_rows<T: Clone, D: Ord + Copy>(rows: &[T], date: impl Fn(&T) -> D) -> Vec<T> {
    let last = match rows.iter().map(&date).max() {
        Some(d) => d,
        None => return Vec::new(),
    };
    rows.iter().filter(|r| date(r) == last).cloned().collect_vec()
}

fn observation_from_attributes(attributes: &Value) -> Result<Observation, Box<dyn Error>> {
    let date_ms = attributes["date"]
        .as_i64()
        .ok_or("missing date attribute")?;
    Ok(Observation {
        state: attributes["state"].as_str().unwrap_or("CA").to_string(),
        county: attributes["county"]
            .as_str()
            .ok_or("missing county attribute")?
            .to_string(),
        date: Timestamp::from_millisecond(date_ms)?,
        latitude: attributes["latitude"].as_f64().unwrap_or(0.0),
        longitude: attributes["longitude"].as_f64().unwrap_or(0.0),
        cases: count_field(attributes, "cases"),
        deaths: count_field(attributes, "deaths"),
        recovered: count_field(attributes, "recovered"),
        travel_based: count_field(attributes, "travel_based"),
        locally_acquired: count_field(attributes, "locally_acquired"),
        ca_total: count_field(attributes, "ca_total"),
        non_scag_total: count_field(attributes, "non_scag_total"),
    })
}

/// The portal hands counts back as json numbers, strings, or nulls.  Unknown
/// stays `None`.
fn count_field(attributes: &Value, name: &str) -> Option<i64> {
    match &attributes[name] {
        Value::Number(n) => n.as_f64().and_then(|x| if x.is_nan() { None } else { Some(x as i64) }),
        Value::String(s) => integrify(s),
        _ => None,
    }
}

fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), Box<dyn Error>> {
    let mut wtr = csv::Writer::from_path(path)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

fn remove_files(paths: &[&Path]) {
    for path in paths {
        if let Err(e) = fs::remove_file(path) {
            warn!("Failed to remove {:?}: {}", path, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use jiff::civil::date;
    use serde_json::json;

    use crate::db::covid19::observation::local_midnight;

    use super::*;

    #[test]
    fn test_observation_from_attributes() -> Result<(), Box<dyn Error>> {
        // 2020-03-20T07:00:00Z, i.e. local midnight during daylight saving
        let attributes = json!({
            "ObjectId": 12,
            "state": "CA",
            "county": "Los Angeles",
            "date": 1584687600000i64,
            "latitude": 34.05,
            "longitude": -118.25,
            "cases": 292.0,
            "deaths": 4,
            "recovered": null,
            "travel_based": null,
            "locally_acquired": null,
            "ca_total": 0,
            "non_scag_total": 0
        });
        let obs = observation_from_attributes(&attributes)?;
        assert_eq!(obs.date, local_midnight(date(2020, 3, 20))?);
        assert_eq!(obs.cases, Some(292));
        assert_eq!(obs.deaths, Some(4));
        // null is unknown, not zero
        assert_eq!(obs.recovered, None);
        assert_eq!(obs.ca_total, Some(0));
        Ok(())
    }

    #[test]
    fn test_observation_from_attributes_missing_date() {
        let attributes = json!({"county": "Ventura"});
        assert!(observation_from_attributes(&attributes).is_err());
    }

    #[test]
    fn test_latest_rows() -> Result<(), Box<dyn Error>> {
        let rows = vec![
            (local_midnight(date(2020, 3, 19))?, "Los Angeles"),
            (local_midnight(date(2020, 3, 20))?, "Los Angeles"),
            (local_midnight(date(2020, 3, 20))?, "Ventura"),
        ];
        let current = latest_rows(&rows, |r| r.0);
        assert_eq!(current.len(), 2);
        assert!(current.iter().all(|r| r.0 == local_midnight(date(2020, 3, 20)).unwrap()));
        Ok(())
    }
}
