use std::path::PathBuf;

use racecraft_analysis::{
    ranking::{DashboardExport, DriverRanking},
    track_demand::fit_track_profiles,
};

use super::CommonArg;
use crate::util::{self, Output};

#[derive(Default, Debug, Clone, clap::Args)]
pub(crate) struct ExportArg {
    /// Observation table (JSON)
    #[arg(long)]
    observations: PathBuf,
    /// Fitted model (JSON, from `fit`)
    #[arg(long)]
    model: PathBuf,
    #[clap(flatten)]
    common: CommonArg,
}

pub(crate) fn run(arg: &ExportArg) -> anyhow::Result<()> {
    let ExportArg {
        observations,
        model,
        common,
    } = arg;

    let config = util::load_config(common.config.as_deref())?;
    let artifact = util::read_model_file(model)?;
    let dataset = util::open_dataset(observations)?;
    let model = &artifact.model;

    let ranking = DriverRanking::build(model, dataset.observations());
    let profiles = fit_track_profiles(dataset.observations(), model, &config.track_demand)?;
    let export = DashboardExport::build(&ranking, &profiles, &config.circuit_fit)?;

    eprintln!("Model {}", export.model_version);
    eprintln!("  Drivers:        {}", export.drivers.len());
    eprintln!("  Track profiles: {}", export.track_profiles.len());
    for (rank, driver) in (1..).zip(export.drivers.iter().take(10)) {
        eprintln!(
            "  {rank:>3}. {:<12} overall {:>5.1}",
            driver.driver_id.to_string(),
            driver.overall_score
        );
    }

    Output::save_json(&export, common.output.clone())?;
    Ok(())
}
