use std::path::PathBuf;

use racecraft_analysis::dataset::Dataset;
use racecraft_features::record::RaceSession;

use super::CommonArg;
use crate::util::{self, Output};

#[derive(Default, Debug, Clone, clap::Args)]
pub(crate) struct BuildFeaturesArg {
    /// Raw race sessions (JSON array)
    #[arg(long)]
    sessions: PathBuf,
    /// Minimum clean laps for lap-based metrics (overrides the config)
    #[arg(long)]
    min_clean_laps: Option<usize>,
    #[clap(flatten)]
    common: CommonArg,
}

pub(crate) fn run(arg: &BuildFeaturesArg) -> anyhow::Result<()> {
    let BuildFeaturesArg {
        sessions,
        min_clean_laps,
        common,
    } = arg;

    let mut config = util::load_config(common.config.as_deref())?.features;
    if let Some(min_clean_laps) = min_clean_laps {
        config.min_clean_laps = *min_clean_laps;
    }

    let sessions: Vec<RaceSession> = util::read_json_file("sessions", sessions)?;
    eprintln!("Building features for {} sessions...", sessions.len());
    let dataset = Dataset::from_sessions(&sessions, &config);

    eprintln!("  Observations: {}", dataset.observations().len());
    eprintln!("  Drivers:      {}", dataset.drivers().len());
    eprintln!("  Tracks:       {}", dataset.tracks().len());
    if !dataset.exclusions().is_empty() {
        eprintln!("  Excluded:     {}", dataset.exclusions().len());
        for exclusion in dataset.exclusions() {
            eprintln!("    {}: {}", exclusion.key, exclusion.reason);
        }
    }

    Output::save_json(dataset.table(), common.output.clone())?;
    Ok(())
}
