use std::path::PathBuf;

use clap::{Parser, Subcommand};

use self::{
    build_features::BuildFeaturesArg, export::ExportArg, fit::FitArg,
    generate_synthetic::GenerateSyntheticArg, improve::ImproveArg, track_demand::TrackDemandArg,
    validate::ValidateArg,
};

mod build_features;
mod export;
mod fit;
mod generate_synthetic;
mod improve;
mod track_demand;
mod validate;

#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct CommandArgs {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Debug, Clone, Subcommand)]
enum Mode {
    /// Build the observation table from raw race sessions
    BuildFeatures(#[clap(flatten)] BuildFeaturesArg),
    /// Generate a synthetic observation table from known latent skills
    GenerateSynthetic(#[clap(flatten)] GenerateSyntheticArg),
    /// Fit the factor model
    Fit(#[clap(flatten)] FitArg),
    /// Cross-validate the fit-then-predict pipeline
    Validate(#[clap(flatten)] ValidateArg),
    /// Fit track-demand profiles for every track
    TrackDemand(#[clap(flatten)] TrackDemandArg),
    /// Export driver profiles, track profiles and circuit fits
    Export(#[clap(flatten)] ExportArg),
    /// Evaluate a budgeted skill adjustment for one driver
    Improve(#[clap(flatten)] ImproveArg),
}

/// Options shared by every subcommand.
#[derive(Default, Debug, Clone, clap::Args)]
pub(crate) struct CommonArg {
    /// Pipeline configuration (TOML)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Output file path (stdout if omitted)
    #[arg(long)]
    output: Option<PathBuf>,
}

pub fn run() -> anyhow::Result<()> {
    let args = CommandArgs::parse();
    match args.mode {
        Mode::BuildFeatures(arg) => build_features::run(&arg)?,
        Mode::GenerateSynthetic(arg) => generate_synthetic::run(&arg)?,
        Mode::Fit(arg) => fit::run(&arg)?,
        Mode::Validate(arg) => validate::run(&arg)?,
        Mode::TrackDemand(arg) => track_demand::run(&arg)?,
        Mode::Export(arg) => export::run(&arg)?,
        Mode::Improve(arg) => improve::run(&arg)?,
    }
    Ok(())
}
