use std::path::PathBuf;

use chrono::Utc;
use racecraft_analysis::factor::{FactorModel, rotation::Rotation};

use super::CommonArg;
use crate::{
    model::ModelArtifact,
    util::{self, Output},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum RotationArg {
    None,
    Varimax,
    Promax,
}

#[derive(Default, Debug, Clone, clap::Args)]
pub(crate) struct FitArg {
    /// Observation table (JSON)
    #[arg(long)]
    observations: PathBuf,
    /// Number of factors (Kaiser criterion if omitted)
    #[arg(long)]
    factors: Option<usize>,
    /// Rotation method (overrides the config)
    #[arg(long)]
    rotation: Option<RotationArg>,
    /// Promax power
    #[arg(long, default_value_t = 4)]
    promax_power: u32,
    #[clap(flatten)]
    common: CommonArg,
}

pub(crate) fn run(arg: &FitArg) -> anyhow::Result<()> {
    let FitArg {
        observations,
        factors,
        rotation,
        promax_power,
        common,
    } = arg;

    let mut config = util::load_config(common.config.as_deref())?.factor;
    if factors.is_some() {
        config.n_factors = *factors;
    }
    if let Some(rotation) = rotation {
        config.rotation = match rotation {
            RotationArg::None => Rotation::None,
            RotationArg::Varimax => Rotation::Varimax,
            RotationArg::Promax => Rotation::Promax {
                power: *promax_power,
            },
        };
    }

    let dataset = util::open_dataset(observations)?;
    eprintln!(
        "Fitting factor model on {} observations...",
        dataset.observations().len()
    );
    let model = FactorModel::fit(dataset.observations(), &config)?;
    print_summary(&model);

    let artifact = ModelArtifact {
        fitted_at: Utc::now(),
        model,
    };
    Output::save_json(&artifact, common.output.clone())?;
    Ok(())
}

fn print_summary(model: &FactorModel) {
    let adequacy = model.adequacy();
    let extraction = model.extraction();
    eprintln!("Model {}", model.version());
    eprintln!(
        "  Bartlett: chi2 = {:.2}, df = {}, p = {:.2e}",
        adequacy.bartlett_chi_square, adequacy.bartlett_degrees_of_freedom, adequacy.bartlett_p_value
    );
    eprintln!("  KMO: {:.3}", adequacy.kmo);
    eprintln!(
        "  Factors: {} ({:?}), rotation {}",
        extraction.n_factors,
        extraction.rule,
        model.config().rotation
    );

    eprintln!();
    eprint!("  {:<24}", "Variable");
    for factor in model.factors() {
        eprint!("{:>18}", factor.label.to_string());
    }
    eprintln!("{:>8}", "h2");
    for (variable, row) in model.variables().iter().zip(model.loadings()) {
        eprint!("  {:<24}", variable.feature.id());
        for loading in row {
            eprint!("{loading:>18.3}");
        }
        eprintln!("{:>8.3}", variable.communality);
    }
    eprint!("  {:<24}", "Proportion of variance");
    for factor in model.factors() {
        eprint!("{:>18.3}", factor.proportion_variance);
    }
    eprintln!();

    if !model.warnings().is_empty() {
        eprintln!();
        eprintln!("Warnings:");
        for warning in model.warnings() {
            eprintln!("  {warning}");
        }
    }
}
