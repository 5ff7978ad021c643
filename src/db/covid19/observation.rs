use std::collections::HashMap;
use std::error::Error;

use jiff::civil::Date;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// Timezone the health departments report in.  A report day is midnight in
/// this zone, published as the corresponding UTC instant.
pub const REPORTING_TZ: &str = "America/Los_Angeles";

/// One county-level observation.  Count fields are optional: `None` means the
/// source did not report the number, which is not the same as zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub state: String,
    pub county: String,
    pub date: Timestamp,
    pub latitude: f64,
    pub longitude: f64,
    pub cases: Option<i64>,
    pub deaths: Option<i64>,
    pub recovered: Option<i64>,
    pub travel_based: Option<i64>,
    pub locally_acquired: Option<i64>,
    pub ca_total: Option<i64>,
    pub non_scag_total: Option<i64>,
}

/// Midnight of `date` in the reporting timezone, as a UTC instant.
pub fn local_midnight(date: Date) -> Result<Timestamp, Box<dyn Error>> {
    Ok(date.at(0, 0, 0, 0).in_tz(REPORTING_TZ)?.timestamp())
}

/// Today's report date, i.e. the most recent local midnight.
pub fn report_date_now() -> Result<Timestamp, Box<dyn Error>> {
    let now = Timestamp::now().in_tz(REPORTING_TZ)?;
    Ok(now.start_of_day()?.timestamp())
}

/// Parse a scraped count.  Pages decorate numbers with footnote asterisks and
/// thousands separators, e.g. "123*" or "1,234".
pub fn parse_count(s: &str) -> Result<i64, Box<dyn Error>> {
    let cleaned = s.trim().trim_matches('*').replace(',', "");
    if cleaned.is_empty() {
        return Err(format!("no digits in {:?}", s).into());
    }
    Ok(cleaned.parse::<i64>()?)
}

/// Coerce a CSV cell to a count.  Empty cells and NaN stay unknown; they must
/// never collapse to zero.  Sources occasionally write counts as floats
/// ("27.0"), so go through f64.
pub fn integrify(s: &str) -> Option<i64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    match s.parse::<f64>() {
        Ok(x) if x.is_nan() => None,
        Ok(x) => Some(x as i64),
        Err(_) => None,
    }
}

/// Deduplicate by (date, state, county), keeping the last occurrence, so a
/// freshly scraped snapshot overrides whatever was published before it.
/// Rows come back sorted by (date, state, county).
pub fn dedupe_latest(observations: Vec<Observation>) -> Vec<Observation> {
    let mut latest: HashMap<(Timestamp, String, String), Observation> = HashMap::new();
    for obs in observations {
        latest.insert((obs.date, obs.state.clone(), obs.county.clone()), obs);
    }
    let mut rows: Vec<Observation> = latest.into_values().collect();
    rows.sort_by(|a, b| {
        (a.date, &a.state, &a.county).cmp(&(b.date, &b.state, &b.county))
    });
    rows
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use jiff::civil::date;

    use super::*;

    fn observation(county: &str, date: Timestamp, cases: Option<i64>) -> Observation {
        Observation {
            state: "CA".to_string(),
            county: county.to_string(),
            date,
            latitude: 0.0,
            longitude: 0.0,
            cases,
            deaths: None,
            recovered: None,
            travel_based: None,
            locally_acquired: None,
            ca_total: None,
            non_scag_total: None,
        }
    }

    #[test]
    fn test_parse_count() -> Result<(), Box<dyn Error>> {
        assert_eq!(parse_count("123*")?, 123);
        assert_eq!(parse_count("1,234")?, 1234);
        assert_eq!(parse_count(" 27 ")?, 27);
        assert_eq!(parse_count("**5**")?, 5);
        assert!(parse_count("").is_err());
        assert!(parse_count("n/a").is_err());
        Ok(())
    }

    #[test]
    fn test_integrify() {
        assert_eq!(integrify(""), None);
        assert_eq!(integrify("  "), None);
        assert_eq!(integrify("NaN"), None);
        assert_eq!(integrify("0"), Some(0));
        assert_eq!(integrify("27"), Some(27));
        assert_eq!(integrify("27.0"), Some(27));
    }

    #[test]
    fn test_local_midnight() -> Result<(), Box<dyn Error>> {
        // the same local midnight maps to different UTC instants on the two
        // sides of a daylight-saving transition, deterministically
        assert_eq!(
            local_midnight(date(2020, 1, 15))?.to_string(),
            "2020-01-15T08:00:00Z"
        );
        assert_eq!(
            local_midnight(date(2020, 7, 15))?.to_string(),
            "2020-07-15T07:00:00Z"
        );
        // spring-forward day still has a well defined local midnight
        assert_eq!(
            local_midnight(date(2020, 3, 8))?.to_string(),
            "2020-03-08T08:00:00Z"
        );
        Ok(())
    }

    #[test]
    fn test_dedupe_latest() -> Result<(), Box<dyn Error>> {
        let day = local_midnight(date(2020, 3, 20))?;
        let next = local_midnight(date(2020, 3, 21))?;
        // the published history says 231 cases, the fresh scrape says 292
        let rows = dedupe_latest(vec![
            observation("Los Angeles", day, Some(231)),
            observation("Ventura", day, Some(17)),
            observation("Los Angeles", next, Some(292)),
            observation("Los Angeles", day, Some(292)),
        ]);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].county, "Los Angeles");
        assert_eq!(rows[0].cases, Some(292));
        assert_eq!(rows[1].county, "Ventura");
        assert_eq!(rows[2].date, next);
        Ok(())
    }

    #[test]
    fn test_dedupe_keeps_unknown_distinct() -> Result<(), Box<dyn Error>> {
        let day = local_midnight(date(2020, 3, 20))?;
        // the later snapshot did not report a count; it must stay unknown
        let rows = dedupe_latest(vec![
            observation("Riverside", day, Some(15)),
            observation("Riverside", day, None),
        ]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].cases, None);
        Ok(())
    }
}
