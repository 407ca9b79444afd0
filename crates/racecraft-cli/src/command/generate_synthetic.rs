use racecraft_features::synthetic::{SyntheticConfig, SyntheticSeason};

use super::CommonArg;
use crate::util::Output;

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct GenerateSyntheticArg {
    /// Number of drivers
    #[arg(long, default_value_t = 20)]
    drivers: usize,
    /// Number of races
    #[arg(long, default_value_t = 20)]
    races: usize,
    /// Number of tracks (races are assigned round-robin)
    #[arg(long, default_value_t = 5)]
    tracks: usize,
    /// Random seed
    #[arg(long, default_value_t = 42)]
    seed: u64,
    /// Probability that a feature value is missing
    #[arg(long, default_value_t = 0.0)]
    missing_rate: f64,
    #[clap(flatten)]
    common: CommonArg,
}

pub(crate) fn run(arg: &GenerateSyntheticArg) -> anyhow::Result<()> {
    let config = SyntheticConfig {
        drivers: arg.drivers,
        races: arg.races,
        tracks: arg.tracks,
        seed: arg.seed,
        missing_rate: arg.missing_rate,
        ..SyntheticConfig::default()
    };
    eprintln!(
        "Generating {} drivers x {} races (seed {})...",
        config.drivers, config.races, config.seed
    );
    let season = SyntheticSeason::generate(&config)?;
    eprintln!("  Observations: {}", season.table.len());

    Output::save_json(&season.table, arg.common.output.clone())?;
    Ok(())
}
