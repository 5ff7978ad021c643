use crate::db::covid19::feature_layers::CovidFeatureLayers;
use crate::db::covid19::jhu_archive::JhuCovidArchive;
use crate::db::dockless::trips_archive::DocklessTripsArchive;

/// Production wiring for the hosted datasets.
pub struct ProdDb {}

impl ProdDb {
    pub fn covid19_feature_layers() -> CovidFeatureLayers {
        CovidFeatureLayers {
            portal_url: "https://lahub.maps.arcgis.com".to_string(),
            county_time_series_id: "d61924e1d8344a09a1298707cfff388c".to_string(),
            county_current_id: "523a372d71014bd491064d74e3eba2c7".to_string(),
            state_time_series_id: "20271474d3c3404d9c79bed0dbd48580".to_string(),
            state_current_id: "191df200230642099002039816dc8c59".to_string(),
            tmp_dir: "/tmp".to_string(),
        }
    }

    pub fn jhu_covid() -> JhuCovidArchive {
        JhuCovidArchive {
            git_ref: "master".to_string(),
        }
    }

    pub fn dockless_trips() -> DocklessTripsArchive {
        DocklessTripsArchive {
            trips_view: "v_trips".to_string(),
            status_changes_view: "v_status_changes".to_string(),
        }
    }
}
