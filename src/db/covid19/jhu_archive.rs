use std::collections::HashMap;
use std::error::Error;

use itertools::Itertools;
use jiff::civil::{date, Date};
use log::info;
use serde::{Deserialize, Serialize};

use super::observation::{integrify, local_midnight, Observation};

/// Last JHU commit that still carried US county-level rows.  The hosted
/// county layer was seeded from it; the live series dropped counties.
pub const JHU_COUNTY_REF: &str = "a3e83c7bafdb2c3f310e2a0f6651126d9fe0936f";

const CASES_FILE: &str = "time_series_19-covid-Confirmed.csv";
const DEATHS_FILE: &str = "time_series_19-covid-Deaths.csv";
const RECOVERED_FILE: &str = "time_series_19-covid-Recovered.csv";

fn series_url(file: &str, git_ref: &str) -> String {
    format!(
        "https://github.com/CSSEGISandData/COVID-19/raw/{}/csse_covid_19_data/csse_covid_19_time_series/{}",
        git_ref, file
    )
}

/// A wide-format time series: one row per region, one value column per date.
#[derive(Debug, Clone)]
pub struct WideSeries {
    pub dates: Vec<Date>,
    pub rows: Vec<WideRow>,
}

#[derive(Debug, Clone)]
pub struct WideRow {
    pub province_state: String,
    pub country_region: String,
    pub latitude: f64,
    pub longitude: f64,
    /// aligned with `WideSeries::dates`
    pub values: Vec<Option<i64>>,
}

/// One cell of a melted wide table.
#[derive(Debug, Clone, PartialEq)]
pub struct MeltedRow {
    pub province_state: String,
    pub country_region: String,
    pub latitude: f64,
    pub longitude: f64,
    pub date: Date,
    pub value: Option<i64>,
}

/// One row of the joined cases/deaths/recovered series.
#[derive(Debug, Clone)]
pub struct SeriesRow {
    pub province_state: String,
    pub country_region: String,
    pub latitude: f64,
    pub longitude: f64,
    pub date: Date,
    pub cases: Option<i64>,
    pub deaths: Option<i64>,
    pub recovered: Option<i64>,
}

/// State/province row in the legacy export schema of the hosted layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateRow {
    #[serde(rename = "Province/State")]
    pub province_state: String,
    #[serde(rename = "Country/Region")]
    pub country_region: String,
    #[serde(rename = "Lat")]
    pub latitude: f64,
    #[serde(rename = "Long")]
    pub longitude: f64,
    pub date: Date,
    pub number_of_cases: Option<i64>,
    pub number_of_deaths: Option<i64>,
    pub number_of_recovered: Option<i64>,
}

/// Read a wide CSV.  A header cell that parses as %m/%d/%y is a date column,
/// everything else is an id column.
pub fn read_wide_csv<R: std::io::Read>(reader: R) -> Result<WideSeries, Box<dyn Error>> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = rdr.headers()?.clone();

    let mut date_cols: Vec<(usize, Date)> = Vec::new();
    let mut id_cols: HashMap<String, usize> = HashMap::new();
    for (i, h) in headers.iter().enumerate() {
        match Date::strptime("%m/%d/%y", h) {
            Ok(d) => date_cols.push((i, d)),
            Err(_) => {
                id_cols.insert(h.to_string(), i);
            }
        }
    }
    let province = *id_cols
        .get("Province/State")
        .ok_or("missing Province/State column")?;
    let country = *id_cols
        .get("Country/Region")
        .ok_or("missing Country/Region column")?;
    let lat = *id_cols.get("Lat").ok_or("missing Lat column")?;
    let long = *id_cols.get("Long").ok_or("missing Long column")?;

    let mut rows: Vec<WideRow> = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let values = date_cols
            .iter()
            .map(|(i, _)| integrify(record.get(*i).unwrap_or("")))
            .collect();
        rows.push(WideRow {
            province_state: record.get(province).unwrap_or("").to_string(),
            country_region: record.get(country).unwrap_or("").to_string(),
            latitude: record.get(lat).unwrap_or("").trim().parse().unwrap_or(0.0),
            longitude: record.get(long).unwrap_or("").trim().parse().unwrap_or(0.0),
            values,
        });
    }

    Ok(WideSeries {
        dates: date_cols.iter().map(|(_, d)| *d).collect(),
        rows,
    })
}

/// Pivot the date columns into one (region, date, value) row per cell.
pub fn melt(series: &WideSeries) -> Vec<MeltedRow> {
    let mut out = Vec::with_capacity(series.rows.len() * series.dates.len());
    for row in &series.rows {
        for (i, date) in series.dates.iter().enumerate() {
            out.push(MeltedRow {
                province_state: row.province_state.clone(),
                country_region: row.country_region.clone(),
                latitude: row.latitude,
                longitude: row.longitude,
                date: *date,
                value: row.values[i],
            });
        }
    }
    out
}

/// Join the three series into one row per (region, date).  The lookup is by
/// (province, country, date) key, so row order and date coverage of the
/// deaths/recovered tables do not matter; a missing entry stays unknown.
pub fn join_series(
    cases: &WideSeries,
    deaths: &WideSeries,
    recovered: &WideSeries,
) -> Vec<SeriesRow> {
    let index = |series: &WideSeries| -> HashMap<(String, String, Date), Option<i64>> {
        melt(series)
            .into_iter()
            .map(|r| ((r.province_state, r.country_region, r.date), r.value))
            .collect()
    };
    let deaths_idx = index(deaths);
    let recovered_idx = index(recovered);

    melt(cases)
        .into_iter()
        .map(|r| {
            let key = (r.province_state.clone(), r.country_region.clone(), r.date);
            SeriesRow {
                province_state: r.province_state,
                country_region: r.country_region,
                latitude: r.latitude,
                longitude: r.longitude,
                date: r.date,
                cases: r.value,
                deaths: deaths_idx.get(&key).copied().flatten(),
                recovered: recovered_idx.get(&key).copied().flatten(),
            }
        })
        .collect()
}

/// SCAG county name for a JHU `Province/State` label, if tracked.
fn county_name(province_state: &str) -> Option<&'static str> {
    match province_state {
        "Los Angeles, CA" => Some("Los Angeles"),
        "Riverside County, CA" => Some("Riverside"),
        "Orange County, CA" => Some("Orange"),
        "Ventura, CA" => Some("Ventura"),
        _ => None,
    }
}

/// JHU CSSE COVID-19 time-series source.
pub struct JhuCovidArchive {
    /// git ref used for the state/province series, normally "master"
    pub git_ref: String,
}

impl JhuCovidArchive {
    fn fetch_series(&self, file: &str, git_ref: &str) -> Result<WideSeries, Box<dyn Error>> {
        let url = series_url(file, git_ref);
        info!("downloading {}", url);
        let body = reqwest::blocking::get(&url)?.error_for_status()?.text()?;
        read_wide_csv(body.as_bytes())
    }

    /// Download and join the three series at `git_ref`.
    pub fn load_time_series(&self, git_ref: &str) -> Result<Vec<SeriesRow>, Box<dyn Error>> {
        let cases = self.fetch_series(CASES_FILE, git_ref)?;
        let deaths = self.fetch_series(DEATHS_FILE, git_ref)?;
        let recovered = self.fetch_series(RECOVERED_FILE, git_ref)?;
        Ok(join_series(&cases, &deaths, &recovered))
    }

    /// The state/province level series in the legacy export schema.  US
    /// county rows (a Province/State with a comma) are dropped.
    pub fn state_time_series(&self) -> Result<Vec<StateRow>, Box<dyn Error>> {
        let rows = self.load_time_series(&self.git_ref)?;
        let out = rows
            .into_iter()
            .filter(|r| !(r.country_region == "US" && r.province_state.contains(',')))
            .map(|r| StateRow {
                province_state: r.province_state,
                country_region: r.country_region,
                latitude: r.latitude,
                longitude: r.longitude,
                date: r.date,
                number_of_cases: r.cases,
                number_of_deaths: r.deaths,
                number_of_recovered: r.recovered,
            })
            .sorted_by(|a, b| {
                (a.date, &a.country_region, &a.province_state)
                    .cmp(&(b.date, &b.country_region, &b.province_state))
            })
            .collect();
        Ok(out)
    }

    /// The historical county-level series for the SCAG counties, from the
    /// pinned commit.  Used to seed the hosted layer; the live run reads its
    /// history back from the layer itself.
    pub fn county_time_series(&self) -> Result<Vec<Observation>, Box<dyn Error>> {
        let rows = self.load_time_series(JHU_COUNTY_REF)?;
        let mut out: Vec<Observation> = Vec::new();
        for r in rows {
            let county = match county_name(&r.province_state) {
                Some(c) => c,
                None => continue,
            };
            out.push(Observation {
                state: "CA".to_string(),
                county: county.to_string(),
                date: local_midnight(r.date)?,
                latitude: r.latitude,
                longitude: r.longitude,
                cases: r.cases,
                deaths: r.deaths,
                recovered: r.recovered,
                travel_based: None,
                locally_acquired: None,
                ca_total: None,
                non_scag_total: None,
            });
        }
        check_known_values(&out)?;
        out.sort_by(|a, b| (a.date, &a.county).cmp(&(b.date, &b.county)));
        Ok(out)
    }
}

/// Pin a couple of known historical values so a silent format change in the
/// upstream files fails loudly instead of publishing garbage.
fn check_known_values(rows: &[Observation]) -> Result<(), Box<dyn Error>> {
    let day = local_midnight(date(2020, 3, 11))?;
    let la = rows
        .iter()
        .find(|o| o.county == "Los Angeles" && o.date == day)
        .ok_or("Los Angeles 2020-03-11 row missing from JHU county history")?;
    if la.cases != Some(27) || la.deaths != Some(1) {
        return Err("JHU county history changed under us".into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use jiff::civil::date;

    use super::*;

    const CASES_CSV: &str = "\
Province/State,Country/Region,Lat,Long,3/10/20,3/11/20
\"Los Angeles, CA\",US,34.05,-118.25,20,27
\"Ventura, CA\",US,34.275,-119.228,,2
British Columbia,Canada,49.28,-123.12,32,39
";

    const DEATHS_CSV: &str = "\
Province/State,Country/Region,Lat,Long,3/10/20,3/11/20
British Columbia,Canada,49.28,-123.12,1,1
\"Ventura, CA\",US,34.275,-119.228,0,0
\"Los Angeles, CA\",US,34.05,-118.25,0,1
";

    const RECOVERED_CSV: &str = "\
Province/State,Country/Region,Lat,Long,3/10/20
British Columbia,Canada,49.28,-123.12,4
\"Los Angeles, CA\",US,34.05,-118.25,1
";

    #[test]
    fn test_read_wide_csv() -> Result<(), Box<dyn Error>> {
        let series = read_wide_csv(CASES_CSV.as_bytes())?;
        assert_eq!(series.dates, vec![date(2020, 3, 10), date(2020, 3, 11)]);
        assert_eq!(series.rows.len(), 3);
        assert_eq!(series.rows[0].province_state, "Los Angeles, CA");
        assert_eq!(series.rows[0].latitude, 34.05);
        // the empty cell stays unknown, it is not a zero
        assert_eq!(series.rows[1].values, vec![None, Some(2)]);
        Ok(())
    }

    #[test]
    fn test_melt() -> Result<(), Box<dyn Error>> {
        let series = read_wide_csv(CASES_CSV.as_bytes())?;
        let rows = melt(&series);
        assert_eq!(rows.len(), 6);
        assert_eq!(rows[0].province_state, "Los Angeles, CA");
        assert_eq!(rows[0].country_region, "US");
        assert_eq!(rows[0].date, date(2020, 3, 10));
        assert_eq!(rows[0].value, Some(20));
        assert_eq!(rows[2].value, None);
        Ok(())
    }

    #[test]
    fn test_join_series_is_keyed() -> Result<(), Box<dyn Error>> {
        // the deaths table is in a different row order than the cases table,
        // and the recovered table is missing a region and a date
        let cases = read_wide_csv(CASES_CSV.as_bytes())?;
        let deaths = read_wide_csv(DEATHS_CSV.as_bytes())?;
        let recovered = read_wide_csv(RECOVERED_CSV.as_bytes())?;
        let rows = join_series(&cases, &deaths, &recovered);
        assert_eq!(rows.len(), 6);

        let la = rows
            .iter()
            .find(|r| r.province_state == "Los Angeles, CA" && r.date == date(2020, 3, 11))
            .unwrap();
        assert_eq!(la.cases, Some(27));
        assert_eq!(la.deaths, Some(1));
        assert_eq!(la.recovered, None);

        let ventura = rows
            .iter()
            .find(|r| r.province_state == "Ventura, CA" && r.date == date(2020, 3, 10))
            .unwrap();
        assert_eq!(ventura.cases, None);
        assert_eq!(ventura.deaths, Some(0));
        assert_eq!(ventura.recovered, None);
        Ok(())
    }

    #[test]
    fn test_county_name() {
        assert_eq!(county_name("Los Angeles, CA"), Some("Los Angeles"));
        assert_eq!(county_name("Riverside County, CA"), Some("Riverside"));
        assert_eq!(county_name("British Columbia"), None);
    }

    #[ignore]
    #[test]
    fn download_state_series() -> Result<(), Box<dyn Error>> {
        let archive = JhuCovidArchive {
            git_ref: "master".to_string(),
        };
        let rows = archive.state_time_series()?;
        assert!(!rows.is_empty());
        Ok(())
    }
}
