//! The bird observation aggregator.
//!
//! Owns the published sighting lists and media catalog, runs the fetch and
//! decode pipeline for both observation endpoints, and enriches species with
//! scraped asset metadata.
//!
//! Published state lives in `tokio::sync::watch` channels. Every mutation goes
//! through a channel sender, so updates are serialized and readers only ever
//! see whole snapshots.
//!
//! The `spawn_*` methods are fire-and-forget and must be called from inside a
//! Tokio runtime. Their results arrive through the `subscribe_*` receivers.

use crate::catalog::MediaCatalog;
use crate::error::{BirdError, Result};
use crate::guard::{Claim, InFlightFlag, MetadataRequests};
use crate::location::{LocationProvider, NoLocation, fallback_coordinate};
use crate::record::{AssetMetadata, Sighting, dedupe_notable};
use crate::request::{Coordinate, DEFAULT_MAX_RESULTS, Endpoints, ObservationKind};
use crate::retry::RetryPolicy;
use crate::scraper::{SpeciesPageScraper, SpeciesRef, assemble_assets, extract_fields, scan_text};
use crate::transport::HttpTransport;
use futures::FutureExt;
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::sleep;

/// Settings for an aggregator instance.
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub endpoints: Endpoints,
    pub api_token: String,
    pub max_results: u32,
    pub retry: RetryPolicy,
}

impl AggregatorConfig {
    pub fn new(api_token: &str) -> Self {
        Self {
            endpoints: Endpoints::default(),
            api_token: api_token.to_string(),
            max_results: DEFAULT_MAX_RESULTS,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_max_results(mut self, max_results: u32) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

struct Published {
    sightings: watch::Sender<Arc<Vec<Sighting>>>,
    notable: watch::Sender<Arc<Vec<Sighting>>>,
    catalog: watch::Sender<Arc<MediaCatalog>>,
}

impl Published {
    fn new() -> Self {
        Self {
            sightings: watch::channel(Arc::new(Vec::new())).0,
            notable: watch::channel(Arc::new(Vec::new())).0,
            catalog: watch::channel(Arc::new(MediaCatalog::new())).0,
        }
    }

    fn list(&self, kind: ObservationKind) -> &watch::Sender<Arc<Vec<Sighting>>> {
        match kind {
            ObservationKind::Recent => &self.sightings,
            ObservationKind::Notable => &self.notable,
        }
    }
}

struct Inner<T, L> {
    transport: T,
    location: L,
    config: AggregatorConfig,
    recent_in_flight: Arc<InFlightFlag>,
    notable_in_flight: Arc<InFlightFlag>,
    metadata_requests: MetadataRequests,
    scraper: SpeciesPageScraper,
    published: Published,
}

/// Cheap to clone; clones share all state.
pub struct BirdObservationAggregator<T, L = NoLocation> {
    inner: Arc<Inner<T, L>>,
}

impl<T, L> Clone for BirdObservationAggregator<T, L> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: HttpTransport> BirdObservationAggregator<T, NoLocation> {
    pub fn new(transport: T, config: AggregatorConfig) -> Self {
        Self::with_location(transport, NoLocation, config)
    }
}

impl<T: HttpTransport, L: LocationProvider> BirdObservationAggregator<T, L> {
    pub fn with_location(transport: T, location: L, config: AggregatorConfig) -> Self {
        let scraper = SpeciesPageScraper::new(config.endpoints.clone());
        Self {
            inner: Arc::new(Inner {
                transport,
                location,
                config,
                recent_in_flight: Arc::new(InFlightFlag::new()),
                notable_in_flight: Arc::new(InFlightFlag::new()),
                metadata_requests: MetadataRequests::new(),
                scraper,
                published: Published::new(),
            }),
        }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.inner.config
    }

    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    pub fn sightings(&self) -> Arc<Vec<Sighting>> {
        self.inner.published.sightings.borrow().clone()
    }

    pub fn notable_sightings(&self) -> Arc<Vec<Sighting>> {
        self.inner.published.notable.borrow().clone()
    }

    pub fn catalog(&self) -> Arc<MediaCatalog> {
        self.inner.published.catalog.borrow().clone()
    }

    pub fn subscribe_sightings(&self) -> watch::Receiver<Arc<Vec<Sighting>>> {
        self.inner.published.sightings.subscribe()
    }

    pub fn subscribe_notable(&self) -> watch::Receiver<Arc<Vec<Sighting>>> {
        self.inner.published.notable.subscribe()
    }

    pub fn subscribe_catalog(&self) -> watch::Receiver<Arc<MediaCatalog>> {
        self.inner.published.catalog.subscribe()
    }

    pub fn is_fetching(&self, kind: ObservationKind) -> bool {
        self.in_flight_flag(kind).is_set()
    }

    /// Whether a metadata request for `species_code` is running.
    pub fn is_scraping(&self, species_code: &str) -> bool {
        self.inner.metadata_requests.is_in_flight(species_code)
    }

    fn in_flight_flag(&self, kind: ObservationKind) -> &Arc<InFlightFlag> {
        match kind {
            ObservationKind::Recent => &self.inner.recent_in_flight,
            ObservationKind::Notable => &self.inner.notable_in_flight,
        }
    }

    /// Clear the recent and notable sighting lists.
    pub fn reset_sightings(&self) {
        self.inner.published.sightings.send_replace(Arc::new(Vec::new()));
        self.inner.published.notable.send_replace(Arc::new(Vec::new()));
    }

    /// Forget every pending and past metadata request.
    pub fn reset_request_history(&self) {
        self.inner.metadata_requests.clear();
    }

    pub fn reset_metadata_catalog(&self) {
        self.inner
            .published
            .catalog
            .send_replace(Arc::new(MediaCatalog::new()));
    }

    pub fn reset_all(&self) {
        self.reset_sightings();
        self.reset_request_history();
        self.reset_metadata_catalog();
    }

    /// Fetch recent sightings around `coordinate` and publish them.
    ///
    /// Not guarded by the in-flight flag and never retried.
    pub async fn fetch_recent(&self, coordinate: Coordinate, radius: u32) -> Result<Vec<Sighting>> {
        self.fetch_and_publish(ObservationKind::Recent, coordinate, radius, false)
            .await
    }

    /// Fetch notable sightings, collapse them to the latest report per species
    /// and location, publish them, and optionally start metadata scrapes.
    pub async fn fetch_notable(
        &self,
        coordinate: Coordinate,
        radius: u32,
        enrich_with_metadata: bool,
    ) -> Result<Vec<Sighting>> {
        self.fetch_and_publish(
            ObservationKind::Notable,
            coordinate,
            radius,
            enrich_with_metadata,
        )
        .await
    }

    /// Start a recent-sightings fetch in the background.
    ///
    /// Returns `false` without doing anything if one is already running.
    pub fn spawn_fetch_recent(&self, coordinate: Coordinate, radius: u32) -> bool {
        self.spawn_observation_fetch(ObservationKind::Recent, coordinate, radius, false, 0)
    }

    /// Start a notable-sightings fetch in the background.
    ///
    /// Returns `false` without doing anything if one is already running.
    pub fn spawn_fetch_notable(
        &self,
        coordinate: Coordinate,
        radius: u32,
        enrich_with_metadata: bool,
    ) -> bool {
        self.spawn_observation_fetch(
            ObservationKind::Notable,
            coordinate,
            radius,
            enrich_with_metadata,
            0,
        )
    }

    fn spawn_observation_fetch(
        &self,
        kind: ObservationKind,
        coordinate: Coordinate,
        radius: u32,
        enrich: bool,
        attempt: u32,
    ) -> bool {
        let Some(guard) = self.in_flight_flag(kind).try_acquire() else {
            debug!("{} fetch already in flight, ignoring request", kind);
            return false;
        };

        let this = self.clone();
        tokio::spawn(async move {
            let result = this.fetch_observations(kind, coordinate, radius).await;
            drop(guard);

            match result {
                Ok(sightings) => this.publish(kind, coordinate, radius, sightings, enrich),
                Err(err) => {
                    warn!("{} fetch at {} failed: {}", kind, coordinate, err);
                    this.retry_after_failure(kind, coordinate, radius, enrich, attempt, err)
                        .await;
                }
            }
        });
        true
    }

    async fn retry_after_failure(
        &self,
        kind: ObservationKind,
        coordinate: Coordinate,
        radius: u32,
        enrich: bool,
        attempt: u32,
        err: BirdError,
    ) {
        let policy = self.inner.config.retry;
        if !err.is_retryable() {
            error!("{} fetch failed and will not be retried: {}", kind, err);
            return;
        }
        if !policy.should_retry(attempt) {
            error!(
                "{} fetch failed after {} attempts, giving up: {}",
                kind,
                attempt + 1,
                err
            );
            return;
        }

        let delay = policy.backoff();
        let fallback = fallback_coordinate(&self.inner.location, coordinate);
        warn!(
            "{} fetch failed (attempt {}): {}; retrying at {} in {}ms",
            kind,
            attempt + 1,
            err,
            fallback,
            delay.as_millis()
        );
        sleep(delay).await;
        self.spawn_observation_fetch(kind, fallback, radius, enrich, attempt + 1);
    }

    async fn fetch_and_publish(
        &self,
        kind: ObservationKind,
        coordinate: Coordinate,
        radius: u32,
        enrich: bool,
    ) -> Result<Vec<Sighting>> {
        let sightings = self
            .fetch_observations(kind, coordinate, radius)
            .await
            .inspect_err(|e| warn!("{} fetch at {} failed: {}", kind, coordinate, e))?;
        self.publish(kind, coordinate, radius, sightings.clone(), enrich);
        Ok(sightings)
    }

    /// Replace the published list for `kind` and start enrichment if asked.
    fn publish(
        &self,
        kind: ObservationKind,
        coordinate: Coordinate,
        radius: u32,
        sightings: Vec<Sighting>,
        enrich: bool,
    ) {
        info!(
            "Fetched {} {} sightings at {} (radius {})",
            sightings.len(),
            kind,
            coordinate,
            radius
        );
        let sightings = Arc::new(sightings);
        self.inner
            .published
            .list(kind)
            .send_replace(Arc::clone(&sightings));

        if enrich && kind == ObservationKind::Notable {
            for sighting in sightings.iter() {
                self.spawn_asset_metadata(
                    SpeciesRef::new(
                        &sighting.species_code,
                        &sighting.com_name,
                        &sighting.sci_name,
                    ),
                    &sighting.sub_id,
                );
            }
        }
    }

    async fn fetch_observations(
        &self,
        kind: ObservationKind,
        coordinate: Coordinate,
        radius: u32,
    ) -> Result<Vec<Sighting>> {
        let config = &self.inner.config;
        let request = config.endpoints.observation_request(
            kind,
            coordinate,
            radius,
            config.max_results,
            &config.api_token,
        )?;

        let body = self
            .inner
            .transport
            .send(&request)
            .await?
            .into_success_body()?;
        let raw: Vec<Sighting> = serde_json::from_str(&body)?;

        Ok(match kind {
            ObservationKind::Recent => raw,
            ObservationKind::Notable => {
                let deduped = dedupe_notable(&raw);
                debug!(
                    "Notable sightings collapsed from {} to {}",
                    raw.len(),
                    deduped.len()
                );
                deduped
            }
        })
    }

    /// Scrape asset metadata for a species and merge it into the catalog.
    ///
    /// A species already in the catalog is answered from the catalog. A
    /// species being scraped right now is answered by that scrape. A species
    /// scraped before (and not reset since) is answered from the catalog
    /// without a new request, which is empty if the scrape found nothing.
    /// Failures are not retried.
    pub async fn fetch_asset_metadata(
        &self,
        species: SpeciesRef,
        submission_id: &str,
    ) -> Result<Vec<AssetMetadata>> {
        let catalogued = self.catalogued(&species.species_code);
        if !catalogued.is_empty() {
            debug!(
                "{} already catalogued ({} assets)",
                species.species_code,
                catalogued.len()
            );
            return Ok(catalogued);
        }

        let claim = self.inner.metadata_requests.claim(&species.species_code, |ticket| {
            let this = self.clone();
            let species = species.clone();
            async move {
                let result = this.scrape_and_merge(&species).await;
                this.inner
                    .metadata_requests
                    .finish(&species.species_code, ticket, result.is_ok());
                result
            }
            .boxed()
        });

        let fetch = match claim {
            Claim::Joined(fetch) => fetch,
            Claim::Started(fetch) => {
                debug!(
                    "Scraping {} for submission {}",
                    species.species_code, submission_id
                );
                // Drive the scrape to completion even if this caller goes away.
                tokio::spawn(fetch.clone());
                fetch
            }
            // Another request may have merged assets since the catalog was checked.
            Claim::AlreadyAttempted => return Ok(self.catalogued(&species.species_code)),
        };
        fetch.await
    }

    fn catalogued(&self, species_code: &str) -> Vec<AssetMetadata> {
        self.inner.published.catalog.borrow().for_species(species_code)
    }

    /// Background form of [`fetch_asset_metadata`](Self::fetch_asset_metadata).
    pub fn spawn_asset_metadata(&self, species: SpeciesRef, submission_id: &str) {
        let this = self.clone();
        let submission_id = submission_id.to_string();
        tokio::spawn(async move {
            let code = species.species_code.clone();
            if let Err(e) = this.fetch_asset_metadata(species, &submission_id).await {
                warn!("Asset metadata for {} unavailable: {}", code, e);
            }
        });
    }

    async fn scrape_and_merge(&self, species: &SpeciesRef) -> Result<Vec<AssetMetadata>> {
        let page = self
            .inner
            .scraper
            .fetch_page(&self.inner.transport, &species.species_code)
            .await
            .inspect_err(|e| warn!("Species page for {} failed: {}", species.species_code, e))?;
        let fields = extract_fields(&scan_text(&page));

        // Assemble under the catalog lock so display ordinals match what is stored.
        let endpoints = self.inner.scraper.endpoints();
        let mut outcome = Ok(Vec::new());
        self.inner.published.catalog.send_if_modified(|catalog| {
            match assemble_assets(&fields, species, endpoints, catalog) {
                Ok(batch) => {
                    let added = Arc::make_mut(catalog).merge(&batch);
                    info!(
                        "Catalogued {} of {} assets for {}",
                        added,
                        batch.len(),
                        species.species_code
                    );
                    outcome = Ok(batch);
                    added > 0
                }
                Err(e) => {
                    outcome = Err(e);
                    false
                }
            }
        });
        outcome
    }
}
