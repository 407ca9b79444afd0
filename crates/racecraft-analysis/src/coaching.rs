//! Static coaching guidance keyed by skill and priority tier.

use racecraft_features::feature::SkillFactor;
use serde::{Deserialize, Serialize};

use crate::factor::FactorLabel;

/// Development priority implied by a factor percentile.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum PriorityTier {
    /// Below the 25th percentile
    Critical,
    /// 25th to 50th percentile
    Develop,
    /// 50th to 75th percentile
    Refine,
    /// 75th percentile and above
    Strength,
}

impl PriorityTier {
    #[must_use]
    pub fn from_percentile(percentile: f64) -> Self {
        if percentile < 25.0 {
            PriorityTier::Critical
        } else if percentile < 50.0 {
            PriorityTier::Develop
        } else if percentile < 75.0 {
            PriorityTier::Refine
        } else {
            PriorityTier::Strength
        }
    }
}

/// Coaching text for a factor at a tier.
#[must_use]
pub fn coaching(factor: FactorLabel, tier: PriorityTier) -> &'static str {
    match factor {
        FactorLabel::Skill(skill) => skill_coaching(skill, tier),
        FactorLabel::Unlabeled(_) => match tier {
            PriorityTier::Critical | PriorityTier::Develop => {
                "Review the metrics that load on this factor with an engineer before setting targets."
            }
            PriorityTier::Refine | PriorityTier::Strength => {
                "Keep monitoring the metrics that load on this factor."
            }
        },
    }
}

fn skill_coaching(skill: SkillFactor, tier: PriorityTier) -> &'static str {
    use PriorityTier::{Critical, Develop, Refine, Strength};
    use SkillFactor::{Consistency, Racecraft, RawSpeed, TireManagement};

    match (skill, tier) {
        (RawSpeed, Critical) => {
            "Rebuild the qualifying lap from reference data: braking markers, minimum corner speeds and throttle application."
        }
        (RawSpeed, Develop) => {
            "Work on single-lap commitment in the fastest corners and compare sector deltas to the quickest teammate."
        }
        (RawSpeed, Refine) => {
            "Fine-tune exits of the slow corners that lead onto long straights to gain trap speed."
        }
        (RawSpeed, Strength) => {
            "Protect the one-lap advantage; use qualifying position to avoid first-lap traffic."
        }
        (Consistency, Critical) => {
            "Run long programmes at a fixed target pace and review every lap that deviates by more than a few tenths."
        }
        (Consistency, Develop) => {
            "Fix braking reference points for each corner and hit them within a few metres lap after lap."
        }
        (Consistency, Refine) => {
            "Reduce sector-to-sector variation late in stints when fatigue and traffic build up."
        }
        (Consistency, Strength) => {
            "Use consistency as a strategic weapon: longer stints and undercut threats."
        }
        (Racecraft, Critical) => {
            "Study overtaking zones and practise race starts; positions lost on lap one rarely come back."
        }
        (Racecraft, Develop) => {
            "Work on setting up passes a corner early and defending without compromising exit speed."
        }
        (Racecraft, Refine) => {
            "Review wheel-to-wheel footage to convert more attacking opportunities into completed passes."
        }
        (Racecraft, Strength) => {
            "Keep exploiting starts and restarts; strategy can afford a lower qualifying position."
        }
        (TireManagement, Critical) => {
            "Manage slip on corner exit and avoid overheating the fronts in the first laps of a stint."
        }
        (TireManagement, Develop) => {
            "Pace the opening laps of each stint to keep the late-stint drop-off small."
        }
        (TireManagement, Refine) => {
            "Adapt driving lines as grip fades to protect the pace of the final third of the stint."
        }
        (TireManagement, Strength) => {
            "Use low degradation to run longer stints or extend to an alternative strategy."
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tiers_from_percentile() {
        assert_eq!(PriorityTier::from_percentile(0.0), PriorityTier::Critical);
        assert_eq!(PriorityTier::from_percentile(25.0), PriorityTier::Develop);
        assert_eq!(PriorityTier::from_percentile(74.9), PriorityTier::Refine);
        assert_eq!(PriorityTier::from_percentile(100.0), PriorityTier::Strength);
    }

    #[test]
    fn test_every_skill_and_tier_has_distinct_text() {
        let tiers = [
            PriorityTier::Critical,
            PriorityTier::Develop,
            PriorityTier::Refine,
            PriorityTier::Strength,
        ];
        let mut texts = SkillFactor::ALL
            .into_iter()
            .flat_map(|skill| tiers.map(|tier| coaching(FactorLabel::Skill(skill), tier)))
            .collect::<Vec<_>>();
        assert!(texts.iter().all(|t| !t.is_empty()));
        texts.sort_unstable();
        texts.dedup();
        assert_eq!(texts.len(), 16);
    }
}
