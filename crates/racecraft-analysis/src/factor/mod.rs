//! Exploratory factor analysis of driver metrics.
//!
//! [`FactorModel::fit`] reduces the observable variables to a few latent skill
//! factors, and [`FactorModel::score`] applies the fitted model to observations.
//!
//! # Pipeline
//!
//! 1. **Complete cases**: observations missing any model variable are left out of fitting
//! 2. **Sample size**: fewer than `min_obs_per_variable × p` rows is an error,
//!    fewer than `recommended_obs_per_variable × p` a warning
//! 3. **Adequacy** ([`adequacy`]): Bartlett's sphericity test and KMO
//! 4. **Factor count** ([`extraction`]): Kaiser criterion or a manual override
//! 5. **Extraction** ([`extraction`]): iterated principal-axis factoring
//! 6. **Rotation** ([`rotation`]): varimax or promax
//! 7. **Reflection and labeling** (`orientation`): every factor is oriented so
//!    that higher means better, then matched to a [`SkillFactor`]
//! 8. **Scoring** ([`scoring`]): non-negative weights over performance-oriented
//!    z-scores, standardized over the fitting sample
//!
//! The fitted model is immutable. Refitting produces a new model with a new
//! [`ModelVersion`], derived from the configuration and the fitting data.
//!
//! # Example
//!
//! ```
//! use racecraft_analysis::factor::{FactorConfig, FactorModel};
//! use racecraft_features::synthetic::{SyntheticConfig, SyntheticSeason};
//!
//! let season = SyntheticSeason::generate(&SyntheticConfig::default()).unwrap();
//! let model = FactorModel::fit(&season.table.observations, &FactorConfig::default()).unwrap();
//! assert_eq!(model.factor_count(), 4);
//!
//! let scores = model.score(&season.table.observations[0]).unwrap();
//! assert_eq!(scores.model_version, *model.version());
//! ```

use std::fmt::Write as _;

use nalgebra::DMatrix;
use racecraft_features::{
    feature::{Feature, SkillFactor},
    observation::Observation,
};
use racecraft_stats::{
    correlation::{Standardization, StandardizeError, correlation_from_standardized},
    descriptive::DescriptiveStats,
    percentiles::rank_percentile,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use self::{
    adequacy::AdequacyReport,
    extraction::{ExtractionSummary, SortedEigen},
    rotation::Rotation,
    scoring::{FactorScore, ObservationScores, ScoreError},
};

pub mod adequacy;
pub mod extraction;
mod orientation;
pub mod rotation;
pub mod scoring;

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum FactorError {
    #[display("no model variables configured")]
    NoVariables,
    #[display("model variable {feature} is listed more than once")]
    DuplicateVariable { feature: Feature },
    #[display("{observations} complete observations; at least {required} are required")]
    InsufficientSample { observations: usize, required: usize },
    #[display("variable {feature} has zero variance")]
    ConstantVariable { feature: Feature },
    #[display("correlation matrix is singular or not positive definite")]
    DegenerateCorrelation,
    #[display("variables are too uncorrelated to factor (Bartlett chi-square {chi_square:.2}, p = {p_value:.4})")]
    NotFactorable { chi_square: f64, p_value: f64 },
    #[display("sampling adequacy is too low (KMO = {kmo:.3})")]
    InadequateSampling { kmo: f64 },
    #[display("cannot extract {requested} factors from {variables} variables")]
    InvalidFactorCount { requested: usize, variables: usize },
    #[display("factor extraction produced non-finite loadings")]
    ExtractionFailed,
    #[display("factor rotation failed")]
    RotationFailed,
    #[display("scores of factor {factor} have zero variance")]
    ZeroScoreVariance { factor: FactorLabel },
}

/// Name of a fitted factor.
///
/// Factors matched to a skill carry it; others keep their extraction index.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum FactorLabel {
    Skill(SkillFactor),
    Unlabeled(usize),
}

impl FactorLabel {
    #[must_use]
    pub fn skill(self) -> Option<SkillFactor> {
        match self {
            FactorLabel::Skill(skill) => Some(skill),
            FactorLabel::Unlabeled(_) => None,
        }
    }

    /// Parses a label from a skill id (`raw_speed`) or `factor_<n>` (1-based).
    #[must_use]
    pub fn from_id(id: &str) -> Option<Self> {
        if let Some(skill) = SkillFactor::from_id(id) {
            return Some(FactorLabel::Skill(skill));
        }
        let index = id.strip_prefix("factor_")?.parse::<usize>().ok()?;
        index.checked_sub(1).map(FactorLabel::Unlabeled)
    }

    #[must_use]
    pub fn id(self) -> String {
        match self {
            FactorLabel::Skill(skill) => skill.id().to_owned(),
            FactorLabel::Unlabeled(index) => format!("factor_{}", index + 1),
        }
    }
}

impl std::fmt::Display for FactorLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FactorLabel::Skill(skill) => write!(f, "{skill}"),
            FactorLabel::Unlabeled(index) => write!(f, "Factor {}", index + 1),
        }
    }
}

/// Identifier of one fitted model.
///
/// Every derived output carries the version of the model it came from so that
/// outputs of different fits are never mixed.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, derive_more::Display,
)]
#[serde(transparent)]
pub struct ModelVersion(String);

impl ModelVersion {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Factor extraction settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactorConfig {
    /// Model variables, in model order
    pub variables: Vec<Feature>,
    /// Manual factor count; `None` selects by the Kaiser criterion
    pub n_factors: Option<usize>,
    pub rotation: Rotation,
    /// Minimum complete observations per variable; below is an error
    pub min_obs_per_variable: f64,
    /// Recommended complete observations per variable; below is a warning
    pub recommended_obs_per_variable: f64,
    /// Significance level of Bartlett's sphericity test
    pub bartlett_alpha: f64,
    /// Minimum overall KMO
    pub min_kmo: f64,
    /// Minimum absolute loading for a variable to be salient on a factor
    pub salience_threshold: f64,
    /// Largest fraction of model variables that may be imputed when scoring
    pub max_imputed_fraction: f64,
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for FactorConfig {
    fn default() -> Self {
        Self {
            variables: Feature::ALL.to_vec(),
            n_factors: None,
            rotation: Rotation::default(),
            min_obs_per_variable: 5.0,
            recommended_obs_per_variable: 10.0,
            bartlett_alpha: 0.05,
            min_kmo: 0.5,
            salience_threshold: 0.30,
            max_imputed_fraction: 1.0 / 3.0,
            max_iterations: 100,
            tolerance: 1e-6,
        }
    }
}

/// Non-fatal issues found while fitting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, derive_more::Display)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FitWarning {
    #[display("{count} incomplete observations were left out of fitting")]
    IncompleteCasesExcluded { count: usize },
    #[display("{observations} observations is below the recommended {recommended}")]
    BelowRecommendedSample {
        observations: usize,
        recommended: usize,
    },
    #[display("Heywood case: communality of {feature} clamped")]
    HeywoodCase { feature: Feature },
    #[display("principal-axis extraction did not converge in {iterations} iterations")]
    ExtractionNotConverged { iterations: usize },
    #[display("rotation did not converge")]
    RotationNotConverged,
}

/// Fitted normalization and communality of one model variable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelVariable {
    pub feature: Feature,
    /// Fitting-sample mean
    pub mean: f64,
    /// Fitting-sample standard deviation
    pub std_dev: f64,
    pub communality: f64,
}

/// Fitted description of one factor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorDescriptor {
    pub label: FactorLabel,
    /// Whether the extracted factor was negated so that higher is better
    pub reflected: bool,
    /// Sum of squared pattern loadings
    pub ss_loadings: f64,
    pub proportion_variance: f64,
    /// Fitting-sample mean of raw scores
    pub score_mean: f64,
    /// Fitting-sample standard deviation of raw scores
    pub score_std_dev: f64,
    /// Fitting-sample z-scores, sorted ascending
    pub sorted_scores: Vec<f64>,
}

/// A fitted factor model.
///
/// Loadings are stored after reflection: for every factor, higher scores mean
/// better performance. All scoring goes through [`FactorModel::score`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorModel {
    version: ModelVersion,
    config: FactorConfig,
    variables: Vec<ModelVariable>,
    factors: Vec<FactorDescriptor>,
    /// `p` rows of `k` pattern loadings
    loadings: Vec<Vec<f64>>,
    /// `k × k` factor correlations
    factor_correlations: Vec<Vec<f64>>,
    /// `p` rows of `k` score weights
    score_weights: Vec<Vec<f64>>,
    adequacy: AdequacyReport,
    extraction: ExtractionSummary,
    fitted_observations: usize,
    warnings: Vec<FitWarning>,
}

impl FactorModel {
    /// Fits a model to `observations`.
    ///
    /// # Errors
    ///
    /// Returns a [`FactorError`] when the sample is too small, a variable is
    /// constant, the correlation matrix is degenerate or not factorable, the
    /// factor count is invalid, or a numeric step fails.
    pub fn fit(observations: &[Observation], config: &FactorConfig) -> Result<Self, FactorError> {
        let features = config.variables.clone();
        validate_variables(&features)?;
        let p = features.len();

        let complete = observations
            .iter()
            .filter(|o| features.iter().all(|f| o.features().get(*f).is_some()))
            .collect::<Vec<_>>();
        let n = complete.len();
        let mut warnings = vec![];
        if n < observations.len() {
            let count = observations.len() - n;
            tracing::warn!(count, "leaving incomplete observations out of factor fitting");
            warnings.push(FitWarning::IncompleteCasesExcluded { count });
        }

        let required = observations_for(config.min_obs_per_variable, p).max(p + 1);
        if n < required {
            return Err(FactorError::InsufficientSample {
                observations: n,
                required,
            });
        }
        let recommended = observations_for(config.recommended_obs_per_variable, p);
        if n < recommended {
            tracing::warn!(observations = n, recommended, "sample is below the recommended size");
            warnings.push(FitWarning::BelowRecommendedSample {
                observations: n,
                recommended,
            });
        }

        let data = DMatrix::from_fn(n, p, |i, j| {
            complete[i].features().get(features[j]).unwrap_or(f64::NAN)
        });
        let standardization = Standardization::from_data(&data).map_err(|e| match e {
            StandardizeError::ConstantColumn { column } => FactorError::ConstantVariable {
                feature: features[column],
            },
            StandardizeError::TooFewObservations { count } => FactorError::InsufficientSample {
                observations: count,
                required,
            },
        })?;
        let z = standardization.apply(&data);
        let correlation = correlation_from_standardized(&z);

        let adequacy = adequacy::assess(&correlation, n, &features, config)?;

        let eigen = SortedEigen::new(&correlation);
        let (k, rule) = extraction::choose_factor_count(&eigen.values, config.n_factors)?;
        let extracted =
            extraction::principal_axis(&correlation, k, config.max_iterations, config.tolerance)?;
        if !extracted.converged {
            tracing::warn!(iterations = extracted.iterations, "principal-axis extraction did not converge");
            warnings.push(FitWarning::ExtractionNotConverged {
                iterations: extracted.iterations,
            });
        }
        for i in &extracted.heywood {
            tracing::warn!(feature = %features[*i], "Heywood case: communality clamped");
            warnings.push(FitWarning::HeywoodCase {
                feature: features[*i],
            });
        }

        let rotated = rotation::rotate(&extracted.loadings, config.rotation)?;
        if !rotated.converged {
            tracing::warn!(rotation = %config.rotation, "rotation did not converge");
            warnings.push(FitWarning::RotationNotConverged);
        }
        let mut pattern = rotated.pattern;
        let mut phi = rotated.factor_correlations;
        let reflected =
            orientation::reflect(&mut pattern, &mut phi, &features, config.salience_threshold);
        let labels = orientation::assign_labels(&pattern, &features);

        let order = orientation::canonical_order(&labels);
        let pattern = pattern.select_columns(&order);
        let phi = phi.select_columns(&order).select_rows(&order);
        let labels = order.iter().map(|f| labels[*f]).collect::<Vec<_>>();
        let reflected = order.iter().map(|f| reflected[*f]).collect::<Vec<_>>();

        let weights = scoring::score_weights(&pattern, &features, config.salience_threshold);
        let raw = (0..n)
            .map(|i| {
                let row = z.row(i).iter().copied().collect::<Vec<_>>();
                scoring::raw_scores(&weights, &features, &row)
            })
            .collect::<Vec<_>>();

        #[expect(clippy::cast_precision_loss)]
        let total_variance = p as f64;
        let mut factors = Vec::with_capacity(k);
        for (f, label) in labels.iter().enumerate() {
            let column = raw.iter().map(|scores| scores[f]).collect::<Vec<_>>();
            let stats = DescriptiveStats::new(column.iter().copied())
                .filter(|s| s.std_dev > f64::EPSILON)
                .ok_or(FactorError::ZeroScoreVariance { factor: *label })?;
            let mut sorted_scores = column
                .iter()
                .map(|s| (s - stats.mean) / stats.std_dev)
                .collect::<Vec<_>>();
            sorted_scores.sort_by(f64::total_cmp);
            let ss_loadings = pattern.column(f).norm_squared();
            factors.push(FactorDescriptor {
                label: *label,
                reflected: reflected[f],
                ss_loadings,
                proportion_variance: ss_loadings / total_variance,
                score_mean: stats.mean,
                score_std_dev: stats.std_dev,
                sorted_scores,
            });
        }

        let variables = features
            .iter()
            .enumerate()
            .map(|(j, feature)| ModelVariable {
                feature: *feature,
                mean: standardization.means[j],
                std_dev: standardization.std_devs[j],
                communality: extracted.communalities[j],
            })
            .collect();

        let version = model_version(config, &features, &complete);
        tracing::info!(
            %version,
            observations = n,
            factors = k,
            kmo = adequacy.kmo,
            "fitted factor model"
        );

        Ok(Self {
            version,
            config: config.clone(),
            variables,
            factors,
            loadings: matrix_rows(&pattern),
            factor_correlations: matrix_rows(&phi),
            score_weights: matrix_rows(&weights),
            adequacy,
            extraction: ExtractionSummary {
                cumulative_variance: extraction::cumulative_variance(&eigen.values),
                eigenvalues: eigen.values,
                n_factors: k,
                rule,
                iterations: extracted.iterations,
                converged: extracted.converged,
            },
            fitted_observations: n,
            warnings,
        })
    }

    /// Scores one observation with the fitted parameters.
    ///
    /// Missing variables are imputed at the fitting mean (z = 0) and reported in
    /// [`ObservationScores::imputed`].
    ///
    /// # Errors
    ///
    /// Returns [`ScoreError::TooManyMissing`] if more than
    /// `max_imputed_fraction` of the model variables are missing.
    pub fn score(&self, observation: &Observation) -> Result<ObservationScores, ScoreError> {
        let p = self.variables.len();
        let mut imputed = vec![];
        let z = self
            .variables
            .iter()
            .map(|variable| match observation.features().get(variable.feature) {
                Some(value) => (value - variable.mean) / variable.std_dev,
                None => {
                    imputed.push(variable.feature);
                    0.0
                }
            })
            .collect::<Vec<_>>();

        let allowed = self.max_imputed();
        if imputed.len() > allowed {
            return Err(ScoreError::TooManyMissing {
                key: observation.key().clone(),
                missing: imputed.len(),
                variables: p,
                allowed,
            });
        }

        let features = self.features();
        let weights = rows_matrix(&self.score_weights, self.factors.len());
        let raw = scoring::raw_scores(&weights, &features, &z);
        let scores = self
            .factors
            .iter()
            .zip(raw)
            .map(|(factor, raw)| {
                let z_score = (raw - factor.score_mean) / factor.score_std_dev;
                FactorScore {
                    factor: factor.label,
                    z_score,
                    percentile: rank_percentile(&factor.sorted_scores, z_score),
                }
            })
            .collect();

        Ok(ObservationScores {
            key: observation.key().clone(),
            model_version: self.version.clone(),
            finishing_position: observation.finishing_position(),
            scores,
            imputed,
        })
    }

    /// Scores every observation, skipping (and logging) those that cannot be scored.
    #[must_use]
    pub fn score_all(&self, observations: &[Observation]) -> Vec<ObservationScores> {
        observations
            .iter()
            .filter_map(|observation| match self.score(observation) {
                Ok(scores) => Some(scores),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unscoreable observation");
                    None
                }
            })
            .collect()
    }

    #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    fn max_imputed(&self) -> usize {
        (self.config.max_imputed_fraction.max(0.0) * self.variables.len() as f64 + 1e-9).floor()
            as usize
    }

    #[must_use]
    pub fn version(&self) -> &ModelVersion {
        &self.version
    }

    #[must_use]
    pub fn config(&self) -> &FactorConfig {
        &self.config
    }

    #[must_use]
    pub fn factor_count(&self) -> usize {
        self.factors.len()
    }

    #[must_use]
    pub fn labels(&self) -> Vec<FactorLabel> {
        self.factors.iter().map(|f| f.label).collect()
    }

    #[must_use]
    pub fn factors(&self) -> &[FactorDescriptor] {
        &self.factors
    }

    #[must_use]
    pub fn variables(&self) -> &[ModelVariable] {
        &self.variables
    }

    #[must_use]
    pub fn features(&self) -> Vec<Feature> {
        self.variables.iter().map(|v| v.feature).collect()
    }

    /// Pattern loadings, one row per variable.
    #[must_use]
    pub fn loadings(&self) -> &[Vec<f64>] {
        &self.loadings
    }

    #[must_use]
    pub fn factor_correlations(&self) -> &[Vec<f64>] {
        &self.factor_correlations
    }

    /// Score weights, one row per variable.
    #[must_use]
    pub fn score_weights(&self) -> &[Vec<f64>] {
        &self.score_weights
    }

    #[must_use]
    pub fn adequacy(&self) -> &AdequacyReport {
        &self.adequacy
    }

    #[must_use]
    pub fn extraction(&self) -> &ExtractionSummary {
        &self.extraction
    }

    #[must_use]
    pub fn fitted_observations(&self) -> usize {
        self.fitted_observations
    }

    #[must_use]
    pub fn warnings(&self) -> &[FitWarning] {
        &self.warnings
    }
}

fn validate_variables(features: &[Feature]) -> Result<(), FactorError> {
    if features.is_empty() {
        return Err(FactorError::NoVariables);
    }
    for (i, feature) in features.iter().enumerate() {
        if features[..i].contains(feature) {
            return Err(FactorError::DuplicateVariable { feature: *feature });
        }
    }
    if features.len() < 2 {
        return Err(FactorError::InvalidFactorCount {
            requested: 1,
            variables: features.len(),
        });
    }
    Ok(())
}

#[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn observations_for(per_variable: f64, p: usize) -> usize {
    (per_variable.max(0.0) * p as f64).ceil() as usize
}

fn matrix_rows(matrix: &DMatrix<f64>) -> Vec<Vec<f64>> {
    matrix
        .row_iter()
        .map(|row| row.iter().copied().collect())
        .collect()
}

fn rows_matrix(rows: &[Vec<f64>], columns: usize) -> DMatrix<f64> {
    DMatrix::from_fn(rows.len(), columns, |i, j| rows[i][j])
}

/// Hash of the configuration and the exact fitting data.
fn model_version(config: &FactorConfig, features: &[Feature], fitted: &[&Observation]) -> ModelVersion {
    let mut hasher = Sha256::new();
    hasher.update(format!("{config:?}").as_bytes());
    for feature in features {
        hasher.update(feature.id().as_bytes());
    }
    for observation in fitted {
        hasher.update(observation.key().to_string().as_bytes());
        hasher.update(observation.finishing_position().to_le_bytes());
        for feature in features {
            let bits = observation.features().get(*feature).map_or(u64::MAX, f64::to_bits);
            hasher.update(bits.to_le_bytes());
        }
    }
    let digest = hasher.finalize();
    let mut version = String::from("fm-");
    for byte in digest.iter().take(8) {
        let _ = write!(version, "{byte:02x}");
    }
    ModelVersion(version)
}

#[cfg(test)]
mod tests {
    use racecraft_features::{
        feature::FeatureValues,
        ids::ObservationKey,
        synthetic::{SyntheticConfig, SyntheticSeason},
    };

    use super::*;

    fn season(drivers: usize, races: usize, seed: u64) -> SyntheticSeason {
        SyntheticSeason::generate(&SyntheticConfig {
            drivers,
            races,
            seed,
            ..Default::default()
        })
        .unwrap()
    }

    fn fit(season: &SyntheticSeason) -> FactorModel {
        FactorModel::fit(&season.table.observations, &FactorConfig::default()).unwrap()
    }

    #[test]
    fn test_recovers_four_labeled_skills() {
        let season = season(20, 20, 1);
        let model = fit(&season);
        assert_eq!(model.extraction().rule, extraction::FactorCountRule::Kaiser);
        assert_eq!(
            model.labels(),
            SkillFactor::ALL.map(FactorLabel::Skill).to_vec()
        );
        // each canonical metric loads most on its own skill
        for (j, variable) in model.variables().iter().enumerate() {
            let row = &model.loadings()[j];
            let (best, _) = row
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
                .unwrap();
            assert_eq!(
                model.labels()[best],
                FactorLabel::Skill(variable.feature.skill()),
                "{}",
                variable.feature
            );
        }
    }

    #[test]
    fn test_scores_follow_true_skills() {
        let season = season(20, 20, 2);
        let model = fit(&season);
        let scores = model.score_all(&season.table.observations);
        assert_eq!(scores.len(), season.table.len());
        for (f, skill) in SkillFactor::ALL.into_iter().enumerate() {
            let true_skill = scores
                .iter()
                .map(|s| season.skills[&s.key.driver_id][f])
                .collect::<Vec<_>>();
            let factor_scores = scores
                .iter()
                .map(|s| s.get(FactorLabel::Skill(skill)).unwrap().z_score)
                .collect::<Vec<_>>();
            assert!(correlation(&true_skill, &factor_scores) > 0.5, "{skill}");
        }
    }

    #[test]
    fn test_fitting_sample_scores_are_standardized() {
        let season = season(15, 20, 3);
        let model = fit(&season);
        let scores = model.score_all(&season.table.observations);
        for f in 0..model.factor_count() {
            let z = scores.iter().map(|s| s.scores[f].z_score).collect::<Vec<_>>();
            let stats = DescriptiveStats::new(z).unwrap();
            assert!(stats.mean.abs() < 1e-9);
            assert!((stats.std_dev - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_dominating_observation_scores_higher_on_every_factor() {
        let season = season(20, 20, 4);
        let model = fit(&season);
        let base = &season.table.observations[0];
        let mut better = FeatureValues::missing();
        for feature in Feature::ALL {
            let value = base.features().get(feature).unwrap();
            better.set(feature, Some(value + 0.1 * feature.direction().sign()));
        }
        let better = Observation::new(base.key().clone(), 1, better).unwrap();
        let a = model.score(&better).unwrap();
        let b = model.score(base).unwrap();
        for (a, b) in a.scores.iter().zip(&b.scores) {
            assert!(a.z_score >= b.z_score, "{}", a.factor);
        }
    }

    #[test]
    fn test_faster_driver_ranks_higher_on_raw_speed() {
        let season = SyntheticSeason::generate(&SyntheticConfig {
            drivers: 3,
            races: 40,
            form_sd: 1.0,
            ..Default::default()
        })
        .unwrap();
        let model = fit(&season);
        let label = FactorLabel::Skill(SkillFactor::RawSpeed);
        assert!(model.labels().contains(&label));

        let slower = &season.table.observations[0];
        let mut values = FeatureValues::missing();
        for feature in Feature::ALL {
            let value = slower.features().get(feature).unwrap();
            let shift = if feature.skill() == SkillFactor::RawSpeed {
                0.5 * feature.direction().sign()
            } else {
                0.0
            };
            values.set(feature, Some(value + shift));
        }
        let faster = Observation::new(slower.key().clone(), 1, values).unwrap();

        let a = model.score(&faster).unwrap();
        let b = model.score(slower).unwrap();
        assert!(a.get(label).unwrap().z_score > b.get(label).unwrap().z_score);
    }

    #[test]
    fn test_scoring_is_idempotent_and_uses_fitted_normalization() {
        let season = season(15, 20, 5);
        let model = fit(&season);
        let observation = &season.table.observations[7];
        let first = model.score(observation).unwrap();
        let second = model.score(observation).unwrap();
        assert_eq!(first, second);

        // scoring other data never changes the model
        let other = season_scores_other(&model);
        assert_eq!(model.score(observation).unwrap(), first);
        assert!(!other.is_empty());
    }

    fn season_scores_other(model: &FactorModel) -> Vec<ObservationScores> {
        model.score_all(&season(5, 30, 99).table.observations)
    }

    #[test]
    fn test_version_depends_on_data_and_config() {
        let season_a = season(15, 20, 6);
        let a = fit(&season_a);
        assert_eq!(a.version(), fit(&season_a).version());
        assert!(a.version().as_str().starts_with("fm-"));
        assert_eq!(a.version().as_str().len(), 3 + 16);

        let b = fit(&season(15, 20, 7));
        assert_ne!(a.version(), b.version());

        let varimax = FactorConfig {
            rotation: Rotation::Varimax,
            ..FactorConfig::default()
        };
        let c = FactorModel::fit(&season_a.table.observations, &varimax).unwrap();
        assert_ne!(a.version(), c.version());
    }

    #[test]
    fn test_manual_factor_count() {
        let season = season(20, 20, 8);
        let config = FactorConfig {
            n_factors: Some(2),
            ..FactorConfig::default()
        };
        let model = FactorModel::fit(&season.table.observations, &config).unwrap();
        assert_eq!(model.factor_count(), 2);
        assert_eq!(model.extraction().rule, extraction::FactorCountRule::Manual);

        let config = FactorConfig {
            n_factors: Some(12),
            ..FactorConfig::default()
        };
        let err = FactorModel::fit(&season.table.observations, &config).unwrap_err();
        assert!(matches!(err, FactorError::InvalidFactorCount { .. }));
    }

    #[test]
    fn test_sample_size_thresholds() {
        // 50 < 5 × 12
        let small = season(5, 10, 9);
        let err = FactorModel::fit(&small.table.observations, &FactorConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            FactorError::InsufficientSample {
                observations: 50,
                required: 60
            }
        ));

        // 100 is enough but below 10 × 12
        let medium = season(10, 10, 9);
        let model = fit(&medium);
        assert!(model.warnings().iter().any(|w| matches!(
            w,
            FitWarning::BelowRecommendedSample {
                observations: 100,
                recommended: 120
            }
        )));
    }

    #[test]
    fn test_constant_variable_is_rejected() {
        let season = season(10, 10, 10);
        let observations = season
            .table
            .observations
            .iter()
            .map(|o| {
                let mut features = o.features().clone();
                features.set(Feature::Overtakes, Some(2.0));
                Observation::new(o.key().clone(), o.finishing_position(), features).unwrap()
            })
            .collect::<Vec<_>>();
        let err = FactorModel::fit(&observations, &FactorConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            FactorError::ConstantVariable {
                feature: Feature::Overtakes
            }
        ));
    }

    #[test]
    fn test_missing_values_are_imputed_or_rejected() {
        let season = season(15, 20, 11);
        let model = fit(&season);
        let base = &season.table.observations[0];

        let mut features = base.features().clone();
        features.set(Feature::Overtakes, None);
        let observation = Observation::new(base.key().clone(), 3, features).unwrap();
        let scores = model.score(&observation).unwrap();
        assert_eq!(scores.imputed, vec![Feature::Overtakes]);

        let sparse = Observation::new(
            ObservationKey::new("X", "T1", "R01"),
            3,
            FeatureValues::missing().with(Feature::Overtakes, 1.0),
        )
        .unwrap();
        let err = model.score(&sparse).unwrap_err();
        assert!(matches!(err, ScoreError::TooManyMissing { missing: 11, allowed: 4, .. }));
    }

    #[test]
    fn test_incomplete_observations_are_left_out_of_fitting() {
        let mut season = season(15, 20, 12);
        let first = season.table.observations[0].clone();
        let mut features = first.features().clone();
        features.set(Feature::QualifyingPace, None);
        season.table.observations[0] =
            Observation::new(first.key().clone(), first.finishing_position(), features).unwrap();
        let model = fit(&season);
        assert_eq!(model.fitted_observations(), season.table.len() - 1);
        assert!(model
            .warnings()
            .contains(&FitWarning::IncompleteCasesExcluded { count: 1 }));
    }

    #[test]
    fn test_uncorrelated_variables_are_not_factorable() {
        // no shared skills: every feature is pure noise
        let season = SyntheticSeason::generate(&SyntheticConfig {
            drivers: 20,
            races: 20,
            loading: 0.0,
            seed: 13,
            ..Default::default()
        })
        .unwrap();
        let config = FactorConfig {
            bartlett_alpha: 1e-6,
            ..FactorConfig::default()
        };
        let err = FactorModel::fit(&season.table.observations, &config).unwrap_err();
        assert!(matches!(err, FactorError::NotFactorable { .. }));
    }

    #[test]
    fn test_model_roundtrips_through_json() {
        let season = season(15, 20, 14);
        let model = fit(&season);
        let json = serde_json::to_string(&model).unwrap();
        let restored: FactorModel = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.version(), model.version());
        let observation = &season.table.observations[3];
        let a = restored.score(observation).unwrap();
        let b = model.score(observation).unwrap();
        for (a, b) in a.scores.iter().zip(&b.scores) {
            assert_eq!(a.factor, b.factor);
            assert!((a.z_score - b.z_score).abs() < 1e-9);
        }
    }

    #[test]
    fn test_label_ids() {
        assert_eq!(
            FactorLabel::from_id("racecraft"),
            Some(FactorLabel::Skill(SkillFactor::Racecraft))
        );
        assert_eq!(FactorLabel::from_id("factor_2"), Some(FactorLabel::Unlabeled(1)));
        assert_eq!(FactorLabel::Unlabeled(1).id(), "factor_2");
        assert_eq!(FactorLabel::from_id("factor_0"), None);
        assert_eq!(FactorLabel::from_id("speed"), None);
    }

    fn correlation(a: &[f64], b: &[f64]) -> f64 {
        let data = DMatrix::from_fn(a.len(), 2, |i, j| if j == 0 { a[i] } else { b[i] });
        let z = Standardization::from_data(&data).unwrap().apply(&data);
        correlation_from_standardized(&z)[(0, 1)]
    }
}
