//! Minimal client for an ArcGIS Online style portal: sign in, read a hosted
//! feature layer back, and overwrite one from a CSV file.

use std::path::Path;

use log::info;
use reqwest::blocking::{multipart, Client};
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GisError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("portal error: {0}")]
    Portal(String),
    #[error("missing field `{0}` in portal response")]
    MissingField(&'static str),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct Gis {
    portal_url: String,
    token: String,
    client: Client,
}

impl Gis {
    /// Sign in to the portal and obtain a request token.  The portal expects
    /// this before anything else; tokens are short lived, one per run.
    pub fn connect(portal_url: &str, username: &str, password: &str) -> Result<Gis, GisError> {
        let client = Client::new();
        let url = format!("{}/sharing/rest/generateToken", portal_url);
        let params = [
            ("username", username),
            ("password", password),
            ("referer", portal_url),
            ("expiration", "60"),
            ("f", "json"),
        ];
        let v: Value = client.post(&url).form(&params).send()?.json()?;
        if let Some(err) = v.get("error") {
            return Err(GisError::Portal(err.to_string()));
        }
        let token = v["token"]
            .as_str()
            .ok_or(GisError::MissingField("token"))?
            .to_string();
        info!("Signed in to {}", portal_url);
        Ok(Gis {
            portal_url: portal_url.to_string(),
            token,
            client,
        })
    }

    fn get_json(&self, url: &str, params: &[(&str, &str)]) -> Result<Value, GisError> {
        let mut query: Vec<(&str, &str)> = vec![("f", "json"), ("token", &self.token)];
        query.extend_from_slice(params);
        let v: Value = self.client.get(url).query(&query).send()?.json()?;
        if let Some(err) = v.get("error") {
            return Err(GisError::Portal(err.to_string()));
        }
        Ok(v)
    }

    fn post_form(&self, url: &str, params: &[(&str, &str)]) -> Result<Value, GisError> {
        let mut form: Vec<(&str, &str)> = vec![("f", "json"), ("token", &self.token)];
        form.extend_from_slice(params);
        let v: Value = self.client.post(url).form(&form).send()?.json()?;
        if let Some(err) = v.get("error") {
            return Err(GisError::Portal(err.to_string()));
        }
        Ok(v)
    }

    /// Item metadata for a hosted item.
    fn item_info(&self, item_id: &str) -> Result<Value, GisError> {
        self.get_json(
            &format!("{}/sharing/rest/content/items/{}", self.portal_url, item_id),
            &[],
        )
    }

    /// Query every feature of layer 0 of a hosted feature service, paging
    /// through the transfer limit.  Returns the raw attribute maps; date
    /// fields come back as UTC epoch milliseconds.
    pub fn query_features(&self, item_id: &str) -> Result<Vec<Value>, GisError> {
        let info = self.item_info(item_id)?;
        let service_url = info["url"]
            .as_str()
            .ok_or(GisError::MissingField("url"))?
            .to_string();
        let query_url = format!("{}/0/query", service_url);

        let mut features: Vec<Value> = Vec::new();
        let mut offset = 0usize;
        loop {
            let offset_s = offset.to_string();
            let v = self.get_json(
                &query_url,
                &[
                    ("where", "1=1"),
                    ("outFields", "*"),
                    ("returnGeometry", "false"),
                    ("resultOffset", &offset_s),
                ],
            )?;
            let page = v["features"]
                .as_array()
                .ok_or(GisError::MissingField("features"))?;
            offset += page.len();
            features.extend(page.iter().map(|f| f["attributes"].clone()));
            if page.is_empty() || !v["exceededTransferLimit"].as_bool().unwrap_or(false) {
                break;
            }
        }
        info!("Read {} features from item {}", features.len(), item_id);
        Ok(features)
    }

    /// Replace the contents of a hosted feature layer with a CSV file.
    ///
    /// The portal publishes a feature service from a source CSV item, so an
    /// overwrite is an update of that source item followed by a re-publish
    /// with overwrite=true.  There is no partial update.
    pub fn overwrite_layer(&self, item_id: &str, csv_path: &Path) -> Result<(), GisError> {
        let info = self.item_info(item_id)?;
        let owner = info["owner"]
            .as_str()
            .ok_or(GisError::MissingField("owner"))?
            .to_string();
        let title = info["title"]
            .as_str()
            .ok_or(GisError::MissingField("title"))?
            .to_string();

        // the CSV item the service was published from
        let related = self.get_json(
            &format!(
                "{}/sharing/rest/content/items/{}/relatedItems",
                self.portal_url, item_id
            ),
            &[("relationshipType", "Service2Data"), ("direction", "forward")],
        )?;
        let source_id = related["relatedItems"]
            .as_array()
            .and_then(|items| items.first())
            .and_then(|item| item["id"].as_str())
            .ok_or(GisError::MissingField("relatedItems"))?
            .to_string();

        // upload the new file over the source item
        let update_url = format!(
            "{}/sharing/rest/content/users/{}/items/{}/update",
            self.portal_url, owner, source_id
        );
        let form = multipart::Form::new()
            .text("f", "json")
            .text("token", self.token.clone())
            .file("file", csv_path)?;
        let v: Value = self.client.post(&update_url).multipart(form).send()?.json()?;
        if let Some(err) = v.get("error") {
            return Err(GisError::Portal(err.to_string()));
        }

        // republish over the existing service
        let publish_url = format!(
            "{}/sharing/rest/content/users/{}/publish",
            self.portal_url, owner
        );
        let publish_params = json!({ "name": title }).to_string();
        self.post_form(
            &publish_url,
            &[
                ("itemId", &source_id),
                ("filetype", "csv"),
                ("overwrite", "true"),
                ("publishParameters", &publish_params),
            ],
        )?;
        info!("Overwrote feature layer {} from {:?}", item_id, csv_path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{env, path::Path};

    use super::*;
    use crate::db::prod_db::ProdDb;

    #[ignore]
    #[test]
    fn connect_to_portal() -> Result<(), GisError> {
        dotenvy::from_path(Path::new(".env/test.env")).unwrap();
        let layers = ProdDb::covid19_feature_layers();
        let gis = Gis::connect(
            &layers.portal_url,
            &env::var("ARCGIS_USER").unwrap(),
            &env::var("ARCGIS_PASSWORD").unwrap(),
        )?;
        let features = gis.query_features(&layers.county_time_series_id)?;
        assert!(!features.is_empty());
        Ok(())
    }
}
