use std::path::PathBuf;

use anyhow::Context;
use racecraft_analysis::{
    factor::FactorLabel,
    improve::{ImproveOutcome, ImprovePredictor, ImproveRequest, SkillAdjustment},
    ranking::DriverRanking,
    track_demand::{DemandScope, TrackDemandProfile},
};
use racecraft_features::ids::{DriverId, TrackId};

use super::CommonArg;
use crate::util::{self, Output};

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct ImproveArg {
    /// Observation table (JSON)
    #[arg(long)]
    observations: PathBuf,
    /// Fitted model (JSON, from `fit`)
    #[arg(long)]
    model: PathBuf,
    /// Driver to evaluate
    #[arg(long)]
    driver: String,
    /// Percentile adjustment as `factor=delta` (e.g. `raw_speed=5`); repeatable
    #[arg(long = "adjust", value_parser = parse_adjustment)]
    adjustments: Vec<SkillAdjustment>,
    /// Maximum total percentile points
    #[arg(long, default_value_t = 10.0)]
    budget: f64,
    /// Evaluate against this track's demand profile (global if omitted)
    #[arg(long)]
    track: Option<String>,
    #[clap(flatten)]
    common: CommonArg,
}

fn parse_adjustment(s: &str) -> Result<SkillAdjustment, String> {
    let (factor, delta) = s
        .split_once('=')
        .ok_or_else(|| format!("expected factor=delta, got `{s}`"))?;
    let factor = FactorLabel::from_id(factor.trim())
        .ok_or_else(|| format!("unknown factor `{factor}`"))?;
    let delta = delta
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("invalid delta `{delta}`: {e}"))?;
    Ok(SkillAdjustment { factor, delta })
}

pub(crate) fn run(arg: &ImproveArg) -> anyhow::Result<()> {
    let ImproveArg {
        observations,
        model,
        driver,
        adjustments,
        budget,
        track,
        common,
    } = arg;

    let config = util::load_config(common.config.as_deref())?;
    let artifact = util::read_model_file(model)?;
    let dataset = util::open_dataset(observations)?;
    let model = &artifact.model;

    let scope = match track {
        Some(track_id) => DemandScope::Track {
            track_id: TrackId::new(track_id.as_str()),
        },
        None => DemandScope::Global,
    };
    let profile = TrackDemandProfile::fit(
        scope.clone(),
        dataset.observations(),
        model,
        &config.track_demand,
    )
    .with_context(|| format!("Failed to fit demand profile for {scope}"))?;
    super::track_demand::print_profile(&profile);

    let ranking = DriverRanking::build(model, dataset.observations());
    let request = ImproveRequest {
        driver_id: DriverId::new(driver.as_str()),
        adjustments: adjustments.clone(),
        budget: *budget,
    };
    let outcome = ImprovePredictor::new(&config.improve)
        .predict(&request, &ranking.drivers, &profile)
        .context("Skill adjustment request rejected")?;
    print_outcome(&outcome);

    Output::save_json(&outcome, common.output.clone())?;
    Ok(())
}

fn print_outcome(outcome: &ImproveOutcome) {
    eprintln!(
        "Driver {} at {} (budget {:.1}/{:.1})",
        outcome.driver_id, outcome.scope, outcome.budget_used, outcome.budget
    );
    eprintln!(
        "  Overall: {:.1} -> {:.1}",
        outcome.current_overall, outcome.projected_overall
    );
    eprintln!("  Similar drivers:");
    for similar in &outcome.similar_drivers {
        eprintln!("    {:<12} {:>5.1}% match", similar.driver_id.to_string(), similar.match_pct);
    }
    eprintln!("  Recommendations:");
    for rec in &outcome.recommendations {
        eprintln!(
            "    {:<18} p{:<5.1} {:<9} priority {:.3}, gain {:.2} positions",
            rec.factor.to_string(),
            rec.percentile,
            rec.tier.to_string(),
            rec.priority,
            rec.expected_position_gain
        );
        eprintln!("      {}", rec.coaching);
    }
}
