//! Asset metadata scraping from species web pages.
//!
//! The species page embeds asset records in script blocks that are not valid
//! JSON as a whole, so values are pulled out by splitting on fixed field
//! markers. Each marker yields one value per asset, in page order, and the
//! resulting arrays are zipped by index after checking their lengths agree.

use crate::catalog::MediaCatalog;
use crate::error::{BirdError, Result};
use crate::record::AssetMetadata;
use crate::request::Endpoints;
use crate::transport::HttpTransport;
use log::{debug, info, warn};
use scraper::{Html, Selector};
use std::borrow::Cow;
use tokio::sync::Semaphore;

pub const ASSET_ID_MARKER: &str = "\"assetId\" : ";
pub const ASSET_FORMAT_MARKER: &str = "\"assetFormatCode\" : ";
pub const USER_DISPLAY_NAME_MARKER: &str = "\"userDisplayName\" : ";
pub const BASE_DOWNLOAD_URL_MARKER: &str = "\"mlBaseDownloadUrl\" : ";
pub const CITATION_NAME_MARKER: &str = "\"citationName\" : ";
pub const CITATION_URL_MARKER: &str = "\"citationUrl\" : ";

/// Names attached to every asset scraped for a species.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeciesRef {
    pub species_code: String,
    pub com_name: String,
    pub sci_name: String,
}

impl SpeciesRef {
    pub fn new(species_code: &str, com_name: &str, sci_name: &str) -> Self {
        Self {
            species_code: species_code.to_string(),
            com_name: com_name.to_string(),
            sci_name: sci_name.to_string(),
        }
    }
}

/// Raw per-marker value arrays, index N of each belonging to asset N.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedFields {
    pub ids: Vec<u64>,
    pub citation_urls: Vec<String>,
    pub format_codes: Vec<String>,
    pub uploaders: Vec<String>,
    pub base_urls: Vec<String>,
    pub citation_names: Vec<String>,
}

impl ExtractedFields {
    /// Lengths in the order ids, formats, uploaders, base URLs, citation names.
    pub fn counts(&self) -> [usize; 5] {
        [
            self.ids.len(),
            self.format_codes.len(),
            self.uploaders.len(),
            self.base_urls.len(),
            self.citation_names.len(),
        ]
    }

    pub fn is_aligned(&self) -> bool {
        let counts = self.counts();
        counts.iter().all(|c| *c == counts[0]) && self.citation_urls.len() == counts[0]
    }
}

/// Text following each occurrence of `marker`, up to the next occurrence.
fn value_segments<'a>(text: &'a str, marker: &str) -> Vec<&'a str> {
    text.split(marker).skip(1).collect()
}

/// First comma-delimited token of a segment.
fn first_token(segment: &str) -> &str {
    segment.split(',').next().unwrap_or_default().trim()
}

/// Leading value of a segment: a quoted string up to its closing quote, or a
/// bare token up to the next delimiter.
fn leading_value(segment: &str) -> String {
    let segment = segment.trim_start();
    if let Some(rest) = segment.strip_prefix('"') {
        let mut value = String::new();
        let mut escaped = false;
        for c in rest.chars() {
            match c {
                _ if escaped => {
                    value.push(c);
                    escaped = false;
                }
                '\\' => escaped = true,
                '"' => return value,
                _ => value.push(c),
            }
        }
        // Unterminated quote: keep what we have.
        value
    } else {
        segment
            .split([',', '}', ']', '\n'])
            .next()
            .unwrap_or_default()
            .trim()
            .to_string()
    }
}

/// Run the marker splits over `text`.
pub fn extract_fields(text: &str) -> ExtractedFields {
    let mut fields = ExtractedFields::default();

    for segment in value_segments(text, ASSET_ID_MARKER) {
        match first_token(segment).trim_matches('"').parse::<u64>() {
            Ok(id) => {
                fields.ids.push(id);
                let pieces: Vec<&str> = segment.split(CITATION_URL_MARKER).collect();
                let citation = if pieces.len() > 1 {
                    pieces.last().map(|p| leading_value(p)).unwrap_or_default()
                } else {
                    String::new()
                };
                fields.citation_urls.push(citation);
            }
            Err(e) => debug!("Skipping unparseable asset id {:?}: {}", first_token(segment), e),
        }
    }

    fields.format_codes = value_segments(text, ASSET_FORMAT_MARKER)
        .into_iter()
        .map(|s| first_token(s).trim_matches('"').to_string())
        .collect();
    fields.uploaders = value_segments(text, USER_DISPLAY_NAME_MARKER)
        .into_iter()
        .map(leading_value)
        .collect();
    fields.base_urls = value_segments(text, BASE_DOWNLOAD_URL_MARKER)
        .into_iter()
        .map(leading_value)
        .collect();
    fields.citation_names = value_segments(text, CITATION_NAME_MARKER)
        .into_iter()
        .map(leading_value)
        .collect();

    fields
}

/// The text to scan: the page's script blocks when they carry asset records,
/// otherwise the whole document.
pub fn scan_text(document: &str) -> Cow<'_, str> {
    let html = Html::parse_document(document);
    let Ok(script_selector) = Selector::parse("script") else {
        return Cow::Borrowed(document);
    };

    let scripts: Vec<String> = html
        .select(&script_selector)
        .map(|script| script.text().collect::<String>())
        .filter(|text| text.contains(ASSET_ID_MARKER))
        .collect();

    if scripts.is_empty() {
        Cow::Borrowed(document)
    } else {
        Cow::Owned(scripts.join("\n"))
    }
}

/// Zip extracted fields into asset records.
///
/// `expected_index` continues the numbering of whatever `catalog` already
/// holds for the species in the same format.
pub fn assemble_assets(
    fields: &ExtractedFields,
    species: &SpeciesRef,
    endpoints: &Endpoints,
    catalog: &MediaCatalog,
) -> Result<Vec<AssetMetadata>> {
    if !fields.is_aligned() {
        warn!(
            "Asset fields for {} do not line up (ids, formats, uploaders, base URLs, citations = {:?}), skipping species",
            species.species_code,
            fields.counts()
        );
        return Err(BirdError::Misaligned {
            species_code: species.species_code.clone(),
            counts: fields.counts(),
        });
    }

    let mut assets: Vec<AssetMetadata> = Vec::with_capacity(fields.ids.len());
    for (i, identifier) in fields.ids.iter().copied().enumerate() {
        // Assets catalogued by an earlier scrape keep their original entry.
        if let Some(existing) = catalog.find(&species.species_code, identifier) {
            assets.push(existing.clone());
            continue;
        }

        let format_code = fields.format_codes[i].clone();
        let earlier_in_batch = assets
            .iter()
            .filter(|a| {
                a.asset_format_code == format_code
                    && catalog.find(&a.species_code, a.identifier).is_none()
            })
            .count();
        let expected_index =
            catalog.count_format(&species.species_code, &format_code) + earlier_in_batch + 1;

        let uploaded_by = if fields.uploaders[i].is_empty() {
            fields.citation_names[i].clone()
        } else {
            fields.uploaders[i].clone()
        };
        let base_url = Some(fields.base_urls[i].clone()).filter(|u| !u.is_empty());

        assets.push(AssetMetadata {
            identifier,
            expected_index,
            species_code: species.species_code.clone(),
            asset_format_code: format_code,
            url: endpoints.asset_url(identifier),
            uploaded_by,
            citation_url: fields.citation_urls[i].clone(),
            base_url,
            com_name: species.com_name.clone(),
            sci_name: species.sci_name.clone(),
        });
    }
    Ok(assets)
}

/// Extract and assemble every asset on a species page.
pub fn parse_species_page(
    document: &str,
    species: &SpeciesRef,
    endpoints: &Endpoints,
    catalog: &MediaCatalog,
) -> Result<Vec<AssetMetadata>> {
    let text = scan_text(document);
    let fields = extract_fields(&text);
    assemble_assets(&fields, species, endpoints, catalog)
}

/// Downloads species pages one at a time.
pub struct SpeciesPageScraper {
    endpoints: Endpoints,
    queue: Semaphore,
}

impl SpeciesPageScraper {
    pub fn new(endpoints: Endpoints) -> Self {
        Self {
            endpoints,
            queue: Semaphore::new(1),
        }
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Fetch the raw page for `species_code`. Concurrent callers queue up
    /// behind a single permit so only one page request is on the wire.
    pub async fn fetch_page<T: HttpTransport>(
        &self,
        transport: &T,
        species_code: &str,
    ) -> Result<String> {
        let request = self.endpoints.species_page_request(species_code)?;
        let _permit = self
            .queue
            .acquire()
            .await
            .map_err(|e| BirdError::Transport(e.to_string()))?;

        let body = transport.send(&request).await?.into_success_body()?;
        info!("Fetched species page for {} ({} bytes)", species_code, body.len());
        Ok(body)
    }
}
