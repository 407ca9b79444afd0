//! Sign reflection and skill labeling of rotated factors.
//!
//! # Reflection
//!
//! The sign of a factor is arbitrary after extraction. A factor is oriented by
//! its **salient** variables (`|loading| ≥ salience_threshold`, or the single
//! largest loading if none reaches it):
//!
//! ```text
//! orientation_f = Σ_salient loading_jf × direction_j
//! ```
//!
//! where `direction_j` is `+1` for higher-is-better metrics and `-1` for
//! lower-is-better ones. A negative orientation means high factor values
//! correspond to worse performance, so the factor is reflected: its loading
//! column and its row/column of the factor correlation matrix are negated.
//!
//! # Labeling
//!
//! Each factor is matched to the [`SkillFactor`] whose canonical metrics load on
//! it most strongly in the performance direction, greedily by descending match
//! strength. Factors that no skill claims stay [`FactorLabel::Unlabeled`].

use nalgebra::DMatrix;
use racecraft_features::feature::{Feature, SkillFactor};

use super::FactorLabel;

/// Rows of `column` with `|loading| ≥ threshold`; falls back to the largest.
pub(crate) fn salient_rows(pattern: &DMatrix<f64>, column: usize, threshold: f64) -> Vec<usize> {
    let loadings = pattern.column(column);
    let salient = (0..loadings.len())
        .filter(|i| loadings[*i].abs() >= threshold)
        .collect::<Vec<_>>();
    if !salient.is_empty() {
        return salient;
    }
    loadings
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
        .map(|(i, _)| vec![i])
        .unwrap_or_default()
}

/// Performance orientation of one factor; positive when higher is better.
pub(crate) fn orientation(
    pattern: &DMatrix<f64>,
    column: usize,
    variables: &[Feature],
    threshold: f64,
) -> f64 {
    let oriented = |i: usize| pattern[(i, column)] * variables[i].direction().sign();
    let total = salient_rows(pattern, column, threshold)
        .into_iter()
        .map(oriented)
        .sum::<f64>();
    if total.abs() > 0.0 {
        return total;
    }
    // balanced salient set: the dominant variable decides
    salient_rows(pattern, column, f64::INFINITY)
        .first()
        .map_or(0.0, |i| oriented(*i))
}

/// Reflects every factor with negative orientation, in place.
///
/// Returns the reflection flag of each factor.
pub(crate) fn reflect(
    pattern: &mut DMatrix<f64>,
    factor_correlations: &mut DMatrix<f64>,
    variables: &[Feature],
    threshold: f64,
) -> Vec<bool> {
    (0..pattern.ncols())
        .map(|f| {
            let reflected = orientation(pattern, f, variables, threshold) < 0.0;
            if reflected {
                pattern.column_mut(f).neg_mut();
                factor_correlations.column_mut(f).neg_mut();
                factor_correlations.row_mut(f).neg_mut();
            }
            reflected
        })
        .collect()
}

/// Strength with which `skill`'s metrics load on factor `column` in the
/// performance direction.
fn skill_match(pattern: &DMatrix<f64>, column: usize, variables: &[Feature], skill: SkillFactor) -> f64 {
    variables
        .iter()
        .enumerate()
        .filter(|(_, feature)| feature.skill() == skill)
        .map(|(i, feature)| (pattern[(i, column)] * feature.direction().sign()).max(0.0).powi(2))
        .sum()
}

/// Greedily assigns skill labels to factors.
pub(crate) fn assign_labels(pattern: &DMatrix<f64>, variables: &[Feature]) -> Vec<FactorLabel> {
    let k = pattern.ncols();
    let mut candidates = (0..k)
        .flat_map(|f| SkillFactor::ALL.into_iter().map(move |skill| (f, skill)))
        .map(|(f, skill)| (skill_match(pattern, f, variables, skill), f, skill))
        .filter(|(strength, _, _)| *strength > 0.0)
        .collect::<Vec<_>>();
    candidates.sort_by(|a, b| {
        b.0.total_cmp(&a.0)
            .then_with(|| a.1.cmp(&b.1))
            .then_with(|| a.2.cmp(&b.2))
    });

    let mut labels = (0..k).map(FactorLabel::Unlabeled).collect::<Vec<_>>();
    let mut taken = Vec::new();
    for (_, f, skill) in candidates {
        if matches!(labels[f], FactorLabel::Unlabeled(_)) && !taken.contains(&skill) {
            labels[f] = FactorLabel::Skill(skill);
            taken.push(skill);
        }
    }
    labels
}

/// Column permutation that sorts factors by label (skills in canonical order first).
pub(crate) fn canonical_order(labels: &[FactorLabel]) -> Vec<usize> {
    let mut order = (0..labels.len()).collect::<Vec<_>>();
    order.sort_by_key(|f| labels[*f]);
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    // qualifying_pace, best_lap_gap (lower is better), positions_gained, overtakes (higher is better)
    const VARIABLES: [Feature; 4] = [
        Feature::QualifyingPace,
        Feature::BestLapGap,
        Feature::PositionsGained,
        Feature::Overtakes,
    ];

    #[test]
    fn test_lap_time_factor_is_reflected() {
        // factor 0 loads positively on lap-time gaps: high values mean slow
        let mut pattern = DMatrix::from_row_slice(4, 2, &[0.8, 0.1, 0.7, 0.0, 0.05, 0.7, 0.0, 0.6]);
        let mut phi = DMatrix::from_row_slice(2, 2, &[1.0, 0.3, 0.3, 1.0]);
        let reflected = reflect(&mut pattern, &mut phi, &VARIABLES, 0.3);
        assert_eq!(reflected, vec![true, false]);
        assert_eq!(pattern[(0, 0)], -0.8);
        assert_eq!(pattern[(2, 1)], 0.7);
        assert_eq!(phi[(0, 1)], -0.3);
        assert_eq!(phi[(1, 0)], -0.3);
        assert_eq!(phi[(0, 0)], 1.0);
        for f in 0..2 {
            assert!(orientation(&pattern, f, &VARIABLES, 0.3) > 0.0);
        }
    }

    #[test]
    fn test_salience_falls_back_to_dominant_loading() {
        let pattern = DMatrix::from_row_slice(4, 1, &[0.1, -0.25, 0.05, 0.0]);
        assert_eq!(salient_rows(&pattern, 0, 0.3), vec![1]);
        // best_lap_gap is lower-is-better with a negative loading: already oriented
        assert!(orientation(&pattern, 0, &VARIABLES, 0.3) > 0.0);
    }

    #[test]
    fn test_labels_follow_performance_loadings() {
        let pattern = DMatrix::from_row_slice(4, 2, &[0.0, -0.8, 0.1, -0.7, 0.7, 0.0, 0.6, 0.1]);
        let labels = assign_labels(&pattern, &VARIABLES);
        assert_eq!(
            labels,
            vec![
                FactorLabel::Skill(SkillFactor::Racecraft),
                FactorLabel::Skill(SkillFactor::RawSpeed)
            ]
        );
        assert_eq!(canonical_order(&labels), vec![1, 0]);
    }

    #[test]
    fn test_unclaimed_factor_stays_unlabeled() {
        // both factors load on speed metrics only
        let pattern = DMatrix::from_row_slice(4, 2, &[-0.8, -0.3, -0.7, -0.4, 0.0, 0.0, 0.0, 0.0]);
        let labels = assign_labels(&pattern, &VARIABLES);
        assert_eq!(labels[0], FactorLabel::Skill(SkillFactor::RawSpeed));
        assert_eq!(labels[1], FactorLabel::Unlabeled(1));
    }
}
