use std::path::PathBuf;

use racecraft_analysis::track_demand::{Confidence, TrackDemandProfile, fit_track_profiles};

use super::CommonArg;
use crate::util::{self, Output};

#[derive(Default, Debug, Clone, clap::Args)]
pub(crate) struct TrackDemandArg {
    /// Observation table (JSON)
    #[arg(long)]
    observations: PathBuf,
    /// Fitted model (JSON, from `fit`)
    #[arg(long)]
    model: PathBuf,
    #[clap(flatten)]
    common: CommonArg,
}

pub(crate) fn run(arg: &TrackDemandArg) -> anyhow::Result<()> {
    let TrackDemandArg {
        observations,
        model,
        common,
    } = arg;

    let config = util::load_config(common.config.as_deref())?;
    let artifact = util::read_model_file(model)?;
    let dataset = util::open_dataset(observations)?;

    let profiles = fit_track_profiles(
        dataset.observations(),
        &artifact.model,
        &config.track_demand,
    )?;
    eprintln!("Model {}", profiles.model_version);
    print_profile(&profiles.global);
    for profile in &profiles.profiles {
        print_profile(profile);
    }
    for refusal in &profiles.refusals {
        eprintln!("  {}: refused ({})", refusal.scope, refusal.reason);
    }

    Output::save_json(&profiles, common.output.clone())?;
    Ok(())
}

pub(crate) fn print_profile(profile: &TrackDemandProfile) {
    let confidence = match profile.confidence {
        Confidence::Normal => "",
        Confidence::Low => " [low confidence]",
    };
    eprint!(
        "  {:<16} n={:<5} R2={:.3}",
        profile.scope.to_string(),
        profile.observations,
        profile.r_squared
    );
    for demand in &profile.demands {
        eprint!("  {}={:+.1}", demand.factor.id(), demand.weight);
    }
    eprintln!("{confidence}");
}
