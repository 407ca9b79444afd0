use std::path::PathBuf;

use racecraft_analysis::validation::{
    GlobalRegression, TrackDemandPredictor, ValidationAxis, ValidationReport, validate,
};

use super::CommonArg;
use crate::util::{self, Output};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum AxisArg {
    Driver,
    Race,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum PredictorArg {
    /// One regression on all observations
    #[default]
    Global,
    /// Per-track regressions with a global fallback
    Track,
}

#[derive(Default, Debug, Clone, clap::Args)]
pub(crate) struct ValidateArg {
    /// Observation table (JSON)
    #[arg(long)]
    observations: PathBuf,
    /// Grouping of the folds (overrides the config)
    #[arg(long)]
    axis: Option<AxisArg>,
    /// Outcome model
    #[arg(long, value_enum, default_value_t)]
    predictor: PredictorArg,
    /// Run folds one after another
    #[arg(long)]
    sequential: bool,
    #[clap(flatten)]
    common: CommonArg,
}

pub(crate) fn run(arg: &ValidateArg) -> anyhow::Result<()> {
    let ValidateArg {
        observations,
        axis,
        predictor,
        sequential,
        common,
    } = arg;

    let config = util::load_config(common.config.as_deref())?;
    let mut validation = config.validation.clone();
    if let Some(axis) = axis {
        validation.axis = match axis {
            AxisArg::Driver => ValidationAxis::Driver,
            AxisArg::Race => ValidationAxis::Race,
        };
    }
    if *sequential {
        validation.parallel = false;
    }

    let dataset = util::open_dataset(observations)?;
    eprintln!(
        "Cross-validating by {} on {} observations...",
        validation.axis,
        dataset.observations().len()
    );
    let report = match predictor {
        PredictorArg::Global => validate(
            dataset.observations(),
            &config.factor,
            &GlobalRegression,
            &validation,
        )?,
        PredictorArg::Track => validate(
            dataset.observations(),
            &config.factor,
            &TrackDemandPredictor {
                config: config.track_demand.clone(),
            },
            &validation,
        )?,
    };
    print_summary(&report);

    Output::save_json(&report, common.output.clone())?;
    Ok(())
}

fn print_summary(report: &ValidationReport) {
    eprintln!("Model {} ({} folds)", report.model_version, report.folds.len());
    eprintln!("  {:<16}{:>10}{:>10}{:>10}", "", "R2", "MAE", "RMSE");
    for (name, metrics) in [
        ("In-sample", &report.in_sample),
        ("Out-of-sample", &report.out_of_sample),
    ] {
        eprintln!(
            "  {:<16}{:>10.3}{:>10.3}{:>10.3}",
            name, metrics.r_squared, metrics.mae, metrics.rmse
        );
    }
    match report.shrinkage_pct {
        Some(pct) => eprintln!("  Shrinkage: {:.3} ({pct:.1}%)", report.shrinkage),
        None => eprintln!("  Shrinkage: {:.3}", report.shrinkage),
    }
    let skipped = report.folds.iter().map(|f| f.skipped).sum::<usize>();
    if skipped > 0 {
        eprintln!("  Skipped held-out observations: {skipped}");
    }
    if report.in_sample_skipped > 0 {
        eprintln!("  Skipped in-sample observations: {}", report.in_sample_skipped);
    }
    if report.overfitting {
        eprintln!("  WARNING: out-of-sample R2 shrinks beyond the threshold; the model may overfit");
    }
}
