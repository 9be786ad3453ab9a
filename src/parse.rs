use clap::Parser;

#[derive(Parser)]
#[command(name = "wherenow-birds")]
#[command(about = "Fetch nearby bird sightings and their photo and audio assets")]
#[command(version = "0.1")]
pub(crate) struct Args {
    /// Latitude in degrees
    #[arg(long, allow_hyphen_values = true)]
    pub lat: f64,

    /// Longitude in degrees
    #[arg(long, allow_hyphen_values = true)]
    pub lng: f64,

    /// Search radius in km; saved to the settings file when given
    #[arg(short, long)]
    pub radius: Option<u32>,

    /// Fetch notable sightings instead of all recent ones
    #[arg(short, long)]
    pub notable: bool,

    /// Scrape photo and audio metadata for every species found
    #[arg(short, long)]
    pub enrich: bool,

    /// Observation API token
    #[arg(short, long, env = "EBIRD_API_TOKEN", hide_env_values = true)]
    pub token: String,

    /// Settings file holding the saved search radius
    #[arg(short, long, default_value = "wherenow-settings.json")]
    pub settings: String,

    /// Output CSV filename
    #[arg(short, long, default_value = "sightings.csv")]
    pub output: String,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}
