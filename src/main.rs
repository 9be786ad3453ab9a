mod parse;

use crate::parse::Args;
use clap::Parser;
use csv::Writer;
use futures::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use std::collections::HashSet;
use std::fs::File;
use std::sync::Arc;
use std::time::Instant;
use wherenow_birds::util::{print_catalog, print_hms, print_summary};
use wherenow_birds::{
    AggregatorConfig, BirdObservationAggregator, Coordinate, HttpTransport, JsonFileSettings,
    ReqwestTransport, Sighting, SettingsStore, SpeciesRef,
};

/// Distinct species in first-seen order.
pub fn distinct_species(sightings: &[Sighting]) -> Vec<(SpeciesRef, String)> {
    let mut seen = HashSet::new();
    sightings
        .iter()
        .filter(|s| seen.insert(s.species_code.clone()))
        .map(|s| {
            (
                SpeciesRef::new(&s.species_code, &s.com_name, &s.sci_name),
                s.sub_id.clone(),
            )
        })
        .collect()
}

/// Scrape asset metadata for every species, reporting progress.
async fn enrich<T: HttpTransport>(
    aggregator: &BirdObservationAggregator<T>,
    sightings: &[Sighting],
) {
    let species = distinct_species(sightings);
    let progress_bar = ProgressBar::new(species.len() as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}")
    {
        progress_bar.set_style(style.progress_chars("##-"));
    }
    progress_bar.set_message("Scraping species pages");
    let pb = Arc::new(progress_bar);

    let tasks = species.into_iter().map(|(species, submission_id)| {
        let progress = Arc::clone(&pb);
        async move {
            let result = aggregator
                .fetch_asset_metadata(species, &submission_id)
                .await;
            progress.inc(1);
            result
        }
    });
    let failures = join_all(tasks).await.iter().filter(|r| r.is_err()).count();
    pb.finish_with_message(format!("Done ({} species failed)", failures));
}

fn save_to_csv(
    sightings: &[Sighting],
    filename: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let file = File::create(filename)?;
    let mut writer = Writer::from_writer(file);

    for sighting in sightings {
        writer.serialize(sighting)?;
    }

    writer.flush()?;
    info!("Data saved to {}", filename);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::try_parse()?;
    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let settings = JsonFileSettings::open(&args.settings)?;
    if let Some(radius) = args.radius {
        settings.set_search_radius(radius)?;
    }
    let radius = settings.search_radius();

    let config = AggregatorConfig::new(&args.token);
    let aggregator = BirdObservationAggregator::new(ReqwestTransport::new()?, config);
    let coordinate = Coordinate::new(args.lat, args.lng);

    let start = Instant::now();
    let sightings = if args.notable {
        println!("\nFetching notable sightings within {} km of {}...", radius, coordinate);
        aggregator.fetch_notable(coordinate, radius, false).await?
    } else {
        println!("\nFetching recent sightings within {} km of {}...", radius, coordinate);
        aggregator.fetch_recent(coordinate, radius).await?
    };

    for sighting in sightings.iter().take(10) {
        println!("  {}", sighting.description());
    }

    if args.enrich {
        enrich(&aggregator, &sightings).await;
    }

    print_hms(&start);
    save_to_csv(&sightings, &args.output)?;

    print_summary(&sightings);
    print_catalog(&aggregator.catalog());

    Ok(())
}
