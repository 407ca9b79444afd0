use chrono::{DateTime, Utc};
use racecraft_analysis::factor::FactorModel;
use serde::{Deserialize, Serialize};

/// A fitted factor model as written by `racecraft fit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub fitted_at: DateTime<Utc>,
    pub model: FactorModel,
}
