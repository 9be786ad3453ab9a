use crate::catalog::MediaCatalog;
use crate::record::Sighting;
use std::collections::{HashMap, HashSet};
use std::time::Instant;

/// Aggregate view over a list of sightings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SightingSummary {
    pub total: usize,
    pub unique_species: usize,
    pub earliest: Option<String>,
    pub latest: Option<String>,
    /// Location names by descending sighting count, at most three.
    pub top_locations: Vec<(String, usize)>,
}

pub fn summarize(sightings: &[Sighting]) -> SightingSummary {
    let unique_species: HashSet<&str> = sightings
        .iter()
        .map(|s| s.species_code.as_str())
        .filter(|code| !code.is_empty())
        .collect();

    // obsDt is "YYYY-MM-DD HH:MM", so string order is chronological.
    let dates: Vec<&String> = sightings
        .iter()
        .map(|s| &s.obs_dt)
        .filter(|date| !date.is_empty())
        .collect();

    let mut location_counts: HashMap<&str, usize> = HashMap::new();
    for sighting in sightings {
        if !sighting.loc_name.is_empty() {
            *location_counts.entry(&sighting.loc_name).or_insert(0) += 1;
        }
    }
    let mut sorted_locations: Vec<(&str, usize)> = location_counts.into_iter().collect();
    sorted_locations.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    SightingSummary {
        total: sightings.len(),
        unique_species: unique_species.len(),
        earliest: dates.iter().min().map(|d| d.to_string()),
        latest: dates.iter().max().map(|d| d.to_string()),
        top_locations: sorted_locations
            .into_iter()
            .take(3)
            .map(|(name, count)| (name.to_string(), count))
            .collect(),
    }
}

pub fn print_summary(sightings: &[Sighting]) {
    if sightings.is_empty() {
        println!("No sightings to summarize");
        return;
    }

    let summary = summarize(sightings);
    println!("\nSummary:");
    println!("Total sightings: {}", summary.total);
    println!("Unique species: {}", summary.unique_species);
    if let (Some(earliest), Some(latest)) = (&summary.earliest, &summary.latest) {
        println!("Date range: {} to {}", earliest, latest);
    }
    println!("Top locations:");
    for (location, count) in &summary.top_locations {
        println!("  {}: {}", location, count);
    }
}

pub fn print_catalog(catalog: &MediaCatalog) {
    if catalog.is_empty() {
        return;
    }
    let photos = catalog.assets().iter().filter(|a| a.is_photo()).count();
    let audio = catalog.assets().iter().filter(|a| a.is_audio()).count();
    println!(
        "Media catalog: {} assets ({} photos, {} recordings)",
        catalog.len(),
        photos,
        audio
    );
}

pub fn print_hms(start: &Instant) {
    let secs = start.elapsed().as_secs();
    println!(
        "Elapsed: {:02}:{:02}:{:02}",
        secs / 3600,
        (secs % 3600) / 60,
        secs % 60
    );
}
