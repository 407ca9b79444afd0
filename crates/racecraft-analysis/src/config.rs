//! Settings of the whole pipeline, one section per component.
//!
//! Every section has defaults, so an empty document is a valid configuration:
//!
//! ```
//! use racecraft_analysis::config::PipelineConfig;
//!
//! let config: PipelineConfig = serde_json::from_str("{}").unwrap();
//! assert_eq!(config, PipelineConfig::default());
//! assert_eq!(config.factor.salience_threshold, 0.30);
//! ```

use racecraft_features::builder::FeatureConfig;
use serde::{Deserialize, Serialize};

use crate::{
    circuit_fit::CircuitFitConfig, factor::FactorConfig, improve::ImproveConfig,
    track_demand::TrackDemandConfig, validation::ValidationConfig,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub features: FeatureConfig,
    pub factor: FactorConfig,
    pub validation: ValidationConfig,
    pub track_demand: TrackDemandConfig,
    pub circuit_fit: CircuitFitConfig,
    pub improve: ImproveConfig,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{factor::rotation::Rotation, validation::ValidationAxis};

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let json = r#"{
            "factor": { "n_factors": 3, "rotation": { "method": "varimax" } },
            "validation": { "axis": "race" },
            "improve": { "neighbors": 5 }
        }"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.factor.n_factors, Some(3));
        assert_eq!(config.factor.rotation, Rotation::Varimax);
        assert_eq!(config.factor.min_kmo, 0.5);
        assert_eq!(config.validation.axis, ValidationAxis::Race);
        assert!(config.validation.parallel);
        assert_eq!(config.improve.neighbors, 5);
        assert_eq!(config.improve.target_percentile, 75.0);
        assert_eq!(config.features, FeatureConfig::default());
    }
}
