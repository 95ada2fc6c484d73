use polars::prelude::PolarsError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("the exposure and outcome models must be specified before the doubly robust estimate can be generated")]
    ModelNotSpecified,

    #[error("{requested} requested before {required}")]
    OutOfOrder {
        requested: &'static str,
        required: &'static str,
    },

    #[error("no estimate available: fit has not been run")]
    NotFitted,

    #[error("propensity score {value} for unit {index} is outside (0, 1)")]
    DegeneratePropensity { index: usize, value: f64 },

    #[error("cohort has no rows")]
    EmptyCohort,

    #[error("{what} has {found} entries but the cohort has {expected} units")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("invalid model formula: {0}")]
    Formula(String),

    #[error("model fit error: {0}")]
    ModelFit(String),

    #[error("bootstrap error: {0}")]
    Bootstrap(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
