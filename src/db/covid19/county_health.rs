use std::error::Error;

use log::{info, warn};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use super::observation::{parse_count, report_date_now, Observation};

fn get_html(url: &str) -> Result<String, Box<dyn Error>> {
    Ok(reqwest::blocking::get(url)?.error_for_status()?.text()?)
}

/// An empty snapshot for today, stamped with the county's fixed coordinates.
fn snapshot(county: &str, latitude: f64, longitude: f64) -> Result<Observation, Box<dyn Error>> {
    Ok(Observation {
        state: "CA".to_string(),
        county: county.to_string(),
        date: report_date_now()?,
        latitude,
        longitude,
        cases: None,
        deaths: None,
        recovered: None,
        travel_based: None,
        locally_acquired: None,
        ca_total: None,
        non_scag_total: None,
    })
}

fn cell_text(cell: ElementRef) -> String {
    cell.text().collect::<String>().trim().to_string()
}

/// All (label, value) cell pairs of a table, one pair per two-cell row.
fn table_rows(table: ElementRef) -> Vec<(String, String)> {
    let tr = Selector::parse("tr").unwrap();
    let td = Selector::parse("td").unwrap();
    table
        .select(&tr)
        .filter_map(|row| {
            let cells: Vec<String> = row.select(&td).map(cell_text).collect();
            match cells.len() {
                2.. => Some((cells[0].clone(), cells[1].clone())),
                _ => None,
            }
        })
        .collect()
}

/// Los Angeles County Department of Public Health.  Cases and deaths are the
/// first two counter blocks on the media page.
pub fn parse_la_county(html: &str) -> Result<Observation, Box<dyn Error>> {
    let document = Html::parse_document(html);
    let counter = Selector::parse("div.counter-block.counter-text").unwrap();
    let counts = document
        .select(&counter)
        .map(|div| parse_count(&div.text().collect::<String>()))
        .collect::<Result<Vec<_>, _>>()?;
    if counts.len() != 2 {
        return Err(format!("expected 2 counter blocks, found {}", counts.len()).into());
    }
    let mut obs = snapshot("Los Angeles", 34.05, -118.25)?;
    obs.cases = Some(counts[0]);
    obs.deaths = Some(counts[1]);
    Ok(obs)
}

pub fn scrape_la_county() -> Result<Observation, Box<dyn Error>> {
    parse_la_county(&get_html("http://publichealth.lacounty.gov/media/Coronavirus/")?)
}

/// Imperial County Department of Public Health.  The first table on the page
/// has a row whose label contains "confirmed"; its second cell is the count.
pub fn parse_imperial_county(html: &str) -> Result<Observation, Box<dyn Error>> {
    let document = Html::parse_document(html);
    let table = Selector::parse("table").unwrap();
    let first = document.select(&table).next().ok_or("no table on page")?;
    let cases = table_rows(first)
        .into_iter()
        .find(|(label, _)| label.to_lowercase().contains("confirmed"))
        .map(|(_, value)| parse_count(&value))
        .ok_or("confirmed case row not found")??;
    let mut obs = snapshot("Imperial", 32.8, -115.57)?;
    obs.cases = Some(cases);
    Ok(obs)
}

pub fn scrape_imperial_county() -> Result<Observation, Box<dyn Error>> {
    parse_imperial_county(&get_html(
        "http://www.icphd.org/health-information-and-resources/healthy-facts/covid-19/",
    )?)
}

/// Orange County Department of Public Health.  The case-count table rows are
/// located by label; locally acquired is the sum of the person-to-person and
/// community rows.
pub fn parse_orange_county(html: &str) -> Result<Observation, Box<dyn Error>> {
    let document = Html::parse_document(html);
    let table = Selector::parse("table").unwrap();
    let counts = document
        .select(&table)
        .find(|t| t.text().collect::<String>().contains("Case Counts"))
        .ok_or("case count table not found")?;
    let rows = table_rows(counts);
    let find = |needle: &str| -> Result<i64, Box<dyn Error>> {
        let (_, value) = rows
            .iter()
            .find(|(label, _)| label.to_lowercase().contains(needle))
            .ok_or_else(|| format!("row {:?} not found", needle))?;
        parse_count(value)
    };

    let mut obs = snapshot("Orange", 33.74, -117.88)?;
    obs.cases = Some(find("cases")?);
    obs.deaths = Some(find("death")?);
    obs.travel_based = Some(find("travel")?);
    obs.locally_acquired = Some(find("person to person")? + find("community")?);
    Ok(obs)
}

pub fn scrape_orange_county() -> Result<Observation, Box<dyn Error>> {
    parse_orange_county(&get_html(
        "http://www.ochealthinfo.com/phs/about/epidasmt/epi/dip/prevention/novel_coronavirus",
    )?)
}

/// San Bernardino County Department of Public Health.  The case count lives
/// in the data-number-value attribute of the first animated counter.
pub fn parse_san_bernardino_county(html: &str) -> Result<Observation, Box<dyn Error>> {
    let document = Html::parse_document(html);
    let counter = Selector::parse("div.et_pb_number_counter").unwrap();
    let div = document
        .select(&counter)
        .next()
        .ok_or("number counter not found")?;
    let value = div
        .value()
        .attr("data-number-value")
        .ok_or("data-number-value attribute missing")?;
    let mut obs = snapshot("San Bernardino", 34.1, -117.3)?;
    obs.cases = Some(parse_count(value)?);
    Ok(obs)
}

pub fn scrape_san_bernardino_county() -> Result<Observation, Box<dyn Error>> {
    parse_san_bernardino_county(&get_html("http://wp.sbcounty.gov/dph/coronavirus/")?)
}

/// Riverside County Department of Public Health.  Counts follow <strong>
/// labels as loose text, e.g. `<strong>Confirmed cases</strong>: 107`.  A
/// label with no parseable count stays unknown.
pub fn parse_riverside_county(html: &str) -> Result<Observation, Box<dyn Error>> {
    let document = Html::parse_document(html);
    let strong = Selector::parse("strong").unwrap();
    let re = Regex::new(r"^:?\s*([0-9,]+)").unwrap();

    let value_after = |needle: &str| -> Option<i64> {
        for el in document.select(&strong) {
            let label = el.text().collect::<String>().to_lowercase();
            if !label.contains(needle) {
                continue;
            }
            let mut sibling = el.next_sibling();
            while let Some(node) = sibling {
                if let Some(text) = node.value().as_text() {
                    let cleaned = text.replace('\u{a0}', "");
                    if let Some(caps) = re.captures(&cleaned) {
                        return parse_count(&caps[1]).ok();
                    }
                }
                sibling = node.next_sibling();
            }
        }
        None
    };

    let mut obs = snapshot("Riverside", 33.948, -117.396)?;
    obs.cases = value_after("confirmed cases");
    obs.travel_based = value_after("travel associated");
    obs.locally_acquired = value_after("locally acquired");
    Ok(obs)
}

pub fn scrape_riverside_county() -> Result<Observation, Box<dyn Error>> {
    parse_riverside_county(&get_html("https://www.rivcoph.org/coronavirus")?)
}

/// Ventura County Department of Public Health.  tblStats1 holds cases and
/// tblStats2 holds deaths, value cell first and label cell second.
pub fn parse_ventura_county(html: &str) -> Result<Observation, Box<dyn Error>> {
    let document = Html::parse_document(html);
    let td = Selector::parse("td").unwrap();

    let stat = |table_id: &str, label: &str| -> Result<i64, Box<dyn Error>> {
        let selector = Selector::parse(&format!("table#{}", table_id)).unwrap();
        let table = document
            .select(&selector)
            .next()
            .ok_or_else(|| format!("{} not found", table_id))?;
        let cells: Vec<String> = table.select(&td).map(cell_text).collect();
        if cells.len() < 2 || !cells[1].to_lowercase().contains(label) {
            return Err(format!("unexpected {} layout", table_id).into());
        }
        parse_count(&cells[0])
    };

    let mut obs = snapshot("Ventura", 34.275, -119.228)?;
    obs.cases = Some(stat("tblStats1", "covid-19 cases")?);
    obs.deaths = Some(stat("tblStats2", "death")?);
    Ok(obs)
}

pub fn scrape_ventura_county() -> Result<Observation, Box<dyn Error>> {
    parse_ventura_county(&get_html("https://www.vcemergency.com/")?)
}

/// Scrape every county page.  A failing source is logged and skipped so the
/// remaining counties still make it into the run.  No retries.
pub fn scrape_all() -> Vec<Observation> {
    let scrapers: [(&str, fn() -> Result<Observation, Box<dyn Error>>); 6] = [
        ("Los Angeles", scrape_la_county),
        ("Imperial", scrape_imperial_county),
        ("Orange", scrape_orange_county),
        ("San Bernardino", scrape_san_bernardino_county),
        ("Riverside", scrape_riverside_county),
        ("Ventura", scrape_ventura_county),
    ];
    let mut observations = Vec::new();
    for (county, scrape) in scrapers {
        info!("Loading data from {} County", county);
        match scrape() {
            Ok(obs) => observations.push(obs),
            Err(e) => warn!("Failed to load data from {} County: {}", county, e),
        }
    }
    observations
}
