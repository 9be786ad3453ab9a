use serde::{Deserialize, Serialize};

/// One observation as returned by the geo observation endpoints.
///
/// The upstream API has no per-report id, so identity is structural: two
/// sightings with the same field values are the same sighting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Sighting {
    #[serde(default)]
    pub sub_id: String,
    pub species_code: String,
    pub com_name: String,
    pub sci_name: String,
    #[serde(default)]
    pub loc_id: String,
    #[serde(default)]
    pub loc_name: String,
    #[serde(default)]
    pub obs_dt: String,
    #[serde(default)]
    pub how_many: Option<u32>,
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub obs_valid: bool,
    #[serde(default)]
    pub obs_reviewed: bool,
    #[serde(default)]
    pub location_private: bool,
    #[serde(default)]
    pub user_display_name: Option<String>,
}

impl Sighting {
    /// Composite natural key built from every field.
    pub fn id(&self) -> String {
        format!(
            "{}{}{}{}{}{}{}{}{}{}{}{}{}{}",
            self.sub_id,
            self.species_code,
            self.com_name,
            self.sci_name,
            self.loc_id,
            self.loc_name,
            self.obs_dt,
            self.how_many.map(|n| n.to_string()).unwrap_or_default(),
            self.lat,
            self.lng,
            self.obs_valid,
            self.obs_reviewed,
            self.location_private,
            self.user_display_name.as_deref().unwrap_or_default(),
        )
    }

    /// One-line human description, e.g. `3 × American Robin at Central Park (2024-05-01 08:15)`.
    pub fn description(&self) -> String {
        let count = match self.how_many {
            Some(n) => format!("{} × ", n),
            None => String::new(),
        };
        let place = if self.loc_name.is_empty() {
            format!("{:.4}, {:.4}", self.lat, self.lng)
        } else {
            self.loc_name.clone()
        };
        if self.obs_dt.is_empty() {
            format!("{}{} at {}", count, self.com_name, place)
        } else {
            format!("{}{} at {} ({})", count, self.com_name, place, self.obs_dt)
        }
    }

    fn same_place_and_species(&self, other: &Sighting) -> bool {
        self.species_code == other.species_code
            && self.loc_id == other.loc_id
            && self.loc_name == other.loc_name
    }
}

/// Collapse a raw notable-sightings response to the most recent report per
/// (species, location), keeping survivors in their original order.
///
/// The scan walks the list backwards so the last occurrence of each group wins.
pub fn dedupe_notable(raw: &[Sighting]) -> Vec<Sighting> {
    let mut accepted: Vec<Sighting> = Vec::with_capacity(raw.len());
    for candidate in raw.iter().rev() {
        if !accepted.iter().any(|s| s.same_place_and_species(candidate)) {
            accepted.push(candidate.clone());
        }
    }
    accepted.reverse();
    accepted
}

/// One photo or audio recording attached to a species page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct AssetMetadata {
    pub identifier: u64,
    /// Display ordinal among the species' assets of the same format, starting at 1.
    pub expected_index: usize,
    pub species_code: String,
    pub asset_format_code: String,
    pub url: String,
    pub uploaded_by: String,
    pub citation_url: String,
    pub base_url: Option<String>,
    pub com_name: String,
    pub sci_name: String,
}

impl AssetMetadata {
    pub fn is_photo(&self) -> bool {
        self.asset_format_code == "photo"
    }

    pub fn is_audio(&self) -> bool {
        self.asset_format_code == "audio"
    }

    /// Download URL, preferring the page-supplied base URL when one was scraped.
    pub fn download_url(&self) -> String {
        match &self.base_url {
            Some(base) if !base.is_empty() => {
                format!("{}/{}", base.trim_end_matches('/'), self.identifier)
            }
            _ => self.url.clone(),
        }
    }
}
