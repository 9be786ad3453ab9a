//! Query construction for the geo observation endpoints and species pages.
//!
//! Everything here is pure: identical inputs give byte-identical requests.

use crate::error::{BirdError, Result};
use crate::transport::HttpRequest;
use log::error;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_OBSERVATION_BASE: &str = "https://api.ebird.org/v2/data/obs/geo";
pub const DEFAULT_SPECIES_SITE_BASE: &str = "https://ebird.org/species";
pub const DEFAULT_ASSET_CDN_BASE: &str = "https://cdn.download.ams.birds.cornell.edu/api/v1/asset";
pub const API_TOKEN_HEADER: &str = "X-eBirdApiToken";

/// Server-side cap on the number of returned observations.
pub const DEFAULT_MAX_RESULTS: u32 = 100;

/// A point in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.lat, self.lng)
    }
}

/// The two logical observation endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObservationKind {
    Recent,
    Notable,
}

impl ObservationKind {
    fn path_suffix(self) -> &'static str {
        match self {
            ObservationKind::Recent => "/recent",
            ObservationKind::Notable => "/recent/notable",
        }
    }
}

impl fmt::Display for ObservationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObservationKind::Recent => f.write_str("recent"),
            ObservationKind::Notable => f.write_str("notable"),
        }
    }
}

/// Base URLs of the external collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub observation_base: String,
    pub species_site_base: String,
    pub asset_cdn_base: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            observation_base: DEFAULT_OBSERVATION_BASE.to_string(),
            species_site_base: DEFAULT_SPECIES_SITE_BASE.to_string(),
            asset_cdn_base: DEFAULT_ASSET_CDN_BASE.to_string(),
        }
    }
}

impl Endpoints {
    /// Point every collaborator at one host, used with local stub servers.
    pub fn with_host(host: &str) -> Self {
        let host = host.trim_end_matches('/');
        Self {
            observation_base: format!("{}/v2/data/obs/geo", host),
            species_site_base: format!("{}/species", host),
            asset_cdn_base: format!("{}/api/v1/asset", host),
        }
    }

    /// Build the observation query for `kind` around `coordinate`.
    pub fn observation_request(
        &self,
        kind: ObservationKind,
        coordinate: Coordinate,
        radius: u32,
        max_results: u32,
        api_token: &str,
    ) -> Result<HttpRequest> {
        if !coordinate.is_finite() {
            error!("Refusing to build {} request for {}", kind, coordinate);
            return Err(BirdError::InvalidCoordinate {
                lat: coordinate.lat,
                lng: coordinate.lng,
            });
        }

        let raw = format!(
            "{}{}",
            self.observation_base.trim_end_matches('/'),
            kind.path_suffix()
        );
        let mut url = parse_base(&raw)?;
        url.query_pairs_mut()
            .append_pair("lat", &coordinate.lat.to_string())
            .append_pair("lng", &coordinate.lng.to_string())
            .append_pair("sort", "date")
            .append_pair("maxResults", &max_results.to_string())
            .append_pair("dist", &radius.to_string());

        Ok(HttpRequest::get(url.into()).with_header(API_TOKEN_HEADER, api_token))
    }

    /// `GET <species-site-base>/<urlEncodedSpeciesCode>`.
    pub fn species_page_request(&self, species_code: &str) -> Result<HttpRequest> {
        let code = species_code.trim();
        if code.is_empty() {
            error!("Refusing to build species page request for empty code");
            return Err(BirdError::InvalidSpeciesCode(species_code.to_string()));
        }
        let raw = format!(
            "{}/{}",
            self.species_site_base.trim_end_matches('/'),
            urlencoding::encode(code)
        );
        let url = parse_base(&raw)?;
        Ok(HttpRequest::get(url.into()))
    }

    /// Direct download URL for an asset id.
    pub fn asset_url(&self, identifier: u64) -> String {
        format!("{}/{}", self.asset_cdn_base.trim_end_matches('/'), identifier)
    }
}

fn parse_base(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| {
        error!("Malformed endpoint URL {}: {}", raw, e);
        BirdError::InvalidUrl {
            url: raw.to_string(),
            reason: e.to_string(),
        }
    })
}
