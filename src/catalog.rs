use crate::record::AssetMetadata;

/// Append-only collection of scraped assets, shared by every species.
///
/// No two entries are ever structurally equal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaCatalog {
    assets: Vec<AssetMetadata>,
}

impl MediaCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn assets(&self) -> &[AssetMetadata] {
        &self.assets
    }

    pub fn contains_species(&self, species_code: &str) -> bool {
        self.assets.iter().any(|a| a.species_code == species_code)
    }

    pub fn contains_com_name(&self, com_name: &str) -> bool {
        self.assets.iter().any(|a| a.com_name == com_name)
    }

    pub fn for_species(&self, species_code: &str) -> Vec<AssetMetadata> {
        self.assets
            .iter()
            .filter(|a| a.species_code == species_code)
            .cloned()
            .collect()
    }

    /// The catalogued asset `identifier` of `species_code`, if any.
    pub fn find(&self, species_code: &str, identifier: u64) -> Option<&AssetMetadata> {
        self.assets
            .iter()
            .find(|a| a.species_code == species_code && a.identifier == identifier)
    }

    /// Catalogued assets of `species_code` in `format_code`.
    pub fn count_format(&self, species_code: &str, format_code: &str) -> usize {
        self.assets
            .iter()
            .filter(|a| a.species_code == species_code && a.asset_format_code == format_code)
            .count()
    }

    /// Append every asset of `batch` not already present. Returns how many were added.
    ///
    /// A batch that is already fully catalogued leaves the catalog unchanged.
    pub fn merge(&mut self, batch: &[AssetMetadata]) -> usize {
        if batch.iter().all(|a| self.assets.contains(a)) {
            return 0;
        }
        let mut added = 0;
        for asset in batch {
            if !self.assets.contains(asset) {
                self.assets.push(asset.clone());
                added += 1;
            }
        }
        added
    }

    pub fn clear(&mut self) {
        self.assets.clear();
    }
}
