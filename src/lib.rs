//! Nearby bird sightings with photo and audio enrichment.
//!
//! The [`BirdObservationAggregator`] fetches recent and notable sightings from
//! the geo observation API, suppresses duplicate requests, and scrapes each
//! species' web page for asset metadata that it collects in a
//! [`MediaCatalog`].

pub mod aggregator;
pub mod catalog;
pub mod error;
pub mod guard;
pub mod location;
pub mod record;
pub mod request;
pub mod retry;
pub mod scraper;
pub mod settings;
pub mod transport;
pub mod util;

pub use aggregator::{AggregatorConfig, BirdObservationAggregator};
pub use catalog::MediaCatalog;
pub use error::{BirdError, Result};
pub use location::{FixedLocation, LocationProvider, NoLocation};
pub use record::{AssetMetadata, Sighting};
pub use request::{Coordinate, Endpoints, ObservationKind};
pub use retry::RetryPolicy;
pub use scraper::SpeciesRef;
pub use settings::{JsonFileSettings, MemorySettings, SettingsStore};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
