use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

// What to do with a propensity score of exactly 0 or 1 (or a missing one).
//
// `Propagate` keeps the plain arithmetic: the division in the pseudo-outcome
// produces a non-finite value that flows straight into the arm means.
// `Reject` checks every score when the exposure model is fit and refuses
// anything outside the open unit interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DegeneratePolicy {
    #[default]
    Propagate,
    Reject,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BootstrapConfig {
    pub replicates: usize,
    pub confidence: f64,
    pub seed: u64,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            replicates: 200,
            confidence: 0.95,
            seed: 0,
        }
    }
}

impl BootstrapConfig {
    pub fn validate(&self) -> Result<()> {
        if self.replicates == 0 {
            return Err(Error::Config(
                "bootstrap.replicates must be positive; omit [bootstrap] to skip it".into(),
            ));
        }
        let confidence = self.confidence;
        if !(confidence > 0.0 && confidence < 1.0) {
            return Err(Error::Config(format!(
                "bootstrap.confidence must be in (0, 1), got {confidence}"
            )));
        }
        Ok(())
    }
}

// Estimator settings, every field optional in the TOML file.
//
// `decimal` is the summary precision and `max_iterations` caps the logistic
// solver. Bootstrap intervals are only generated by the binary when a
// `[bootstrap]` table is present; its own fields default individually.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EstimatorConfig {
    pub decimal: usize,
    pub degenerate: DegeneratePolicy,
    pub max_iterations: u64,
    pub bootstrap: Option<BootstrapConfig>,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            decimal: 4,
            degenerate: DegeneratePolicy::Propagate,
            max_iterations: 100,
            bootstrap: None,
        }
    }
}

impl EstimatorConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: EstimatorConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    // Bootstrap settings to use when intervals are requested
    pub fn bootstrap_settings(&self) -> BootstrapConfig {
        self.bootstrap.clone().unwrap_or_default()
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(bootstrap) = &self.bootstrap {
            bootstrap.validate()?;
        }
        if self.max_iterations == 0 {
            return Err(Error::Config("max_iterations must be positive".into()));
        }
        Ok(())
    }
}
