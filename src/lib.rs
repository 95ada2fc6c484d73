// Doubly robust estimation of risk differences and risk ratios for a binary
// exposure and binary outcome, combining a propensity score model with an
// outcome regression model.

pub mod bootstrap;
pub mod combine;
pub mod config;
pub mod data;
pub mod error;
pub mod estimator;
pub mod nuisance;
pub mod report;

pub use crate::bootstrap::{BootstrapIntervals, Interval};
pub use crate::combine::{DrEstimate, PseudoOutcomes};
pub use crate::config::{BootstrapConfig, DegeneratePolicy, EstimatorConfig};
pub use crate::data::{Cohort, ModelFormula};
pub use crate::error::{Error, Result};
pub use crate::estimator::DoublyRobust;
pub use crate::nuisance::{CounterfactualPredictions, LogisticModels, NuisanceModels};
pub use crate::report::Summary;
