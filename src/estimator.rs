use ndarray::Array1;
use polars::prelude::{DataFrame, Series};
use std::mem;
use tracing::{debug, info};

use crate::bootstrap::{bootstrap_intervals, BootstrapIntervals};
use crate::combine::{aggregate, pseudo_outcomes, DrEstimate, PseudoOutcomes};
use crate::config::{DegeneratePolicy, EstimatorConfig};
use crate::data::{Cohort, ModelFormula};
use crate::error::{Error, Result};
use crate::nuisance::{CounterfactualPredictions, LogisticModels, NuisanceModels};
use crate::report::Summary;

// Where the estimator is in its lifecycle. Each stage carries exactly the
// derived values that are valid at that point.
#[derive(Debug, Clone, Default)]
enum Stage {
    #[default]
    Uninitialized,
    ExposureFit {
        propensity: Array1<f64>,
    },
    OutcomeFit {
        propensity: Array1<f64>,
        predictions: CounterfactualPredictions,
    },
    Combined {
        propensity: Array1<f64>,
        predictions: CounterfactualPredictions,
        pseudo: PseudoOutcomes,
        estimate: DrEstimate,
    },
}

// Simple doubly robust estimator for a binary exposure and binary outcome
// (Funk et al., AJE 2011;173(7):761-767, Table 1 and Equation 1).
//
// Usage runs in order: `exposure_model`, `outcome_model`, `fit`, and then
// `summary` or `bootstrap`. Nuisance models come from the injected
// `NuisanceModels` implementation, logistic regression by default.
#[derive(Debug)]
pub struct DoublyRobust<M = LogisticModels> {
    cohort: Cohort,
    models: M,
    config: EstimatorConfig,
    exposure_formula: Option<ModelFormula>,
    outcome_formula: Option<ModelFormula>,
    stage: Stage,
    intervals: Option<BootstrapIntervals>,
}

impl DoublyRobust<LogisticModels> {
    pub fn new(data: &DataFrame, exposure: &str, outcome: &str) -> Result<Self> {
        let cohort = Cohort::new(data, exposure, outcome)?;
        Ok(Self::from_cohort(cohort, EstimatorConfig::default()))
    }

    pub fn from_cohort(cohort: Cohort, config: EstimatorConfig) -> Self {
        let models = LogisticModels::new(config.max_iterations);
        Self::with_models(cohort, models, config)
    }
}

impl<M: NuisanceModels> DoublyRobust<M> {
    pub fn with_models(cohort: Cohort, models: M, config: EstimatorConfig) -> Self {
        Self {
            cohort,
            models,
            config,
            exposure_formula: None,
            outcome_formula: None,
            stage: Stage::Uninitialized,
            intervals: None,
        }
    }

    pub fn cohort(&self) -> &Cohort {
        &self.cohort
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    // Specify and fit the propensity score model
    //
    // `covariates` is the right-hand side of the model, e.g.
    // "age + male + cd4". Any previous estimate is dropped since it was
    // computed from the old propensity scores.
    pub fn exposure_model(&mut self, covariates: &str) -> Result<()> {
        let formula = ModelFormula::new(self.cohort.exposure_name(), covariates)?;
        let propensity = self.models.fit_propensity(&self.cohort, &formula)?;
        check_length("propensity scores", self.cohort.len(), propensity.len())?;
        if self.config.degenerate == DegeneratePolicy::Reject {
            check_propensity(&propensity)?;
        }
        info!(model = %formula, "exposure model fit");

        self.stage = match mem::take(&mut self.stage) {
            Stage::OutcomeFit { predictions, .. } | Stage::Combined { predictions, .. } => {
                Stage::OutcomeFit {
                    propensity,
                    predictions,
                }
            }
            Stage::Uninitialized | Stage::ExposureFit { .. } => Stage::ExposureFit { propensity },
        };
        self.exposure_formula = Some(formula);
        self.intervals = None;
        Ok(())
    }

    // Specify and fit the outcome model
    //
    // The exposure column should normally appear among `covariates`, since
    // the counterfactual predictions are made by overriding it.
    pub fn outcome_model(&mut self, covariates: &str) -> Result<()> {
        let formula = ModelFormula::new(self.cohort.outcome_name(), covariates)?;
        let propensity = match self.propensity() {
            Some(propensity) => propensity.clone(),
            None => {
                return Err(Error::OutOfOrder {
                    requested: "outcome model",
                    required: "exposure model",
                })
            }
        };
        let predictions = self.models.fit_outcome(&self.cohort, &formula)?;
        check_length("exposed predictions", self.cohort.len(), predictions.if_exposed.len())?;
        check_length(
            "unexposed predictions",
            self.cohort.len(),
            predictions.if_unexposed.len(),
        )?;
        info!(model = %formula, "outcome model fit");

        self.stage = Stage::OutcomeFit {
            propensity,
            predictions,
        };
        self.outcome_formula = Some(formula);
        self.intervals = None;
        Ok(())
    }

    // Generate the doubly robust risk difference and risk ratio
    //
    // Needs both nuisance models. Calling it again recomputes from the
    // current propensity scores and predictions.
    pub fn fit(&mut self) -> Result<DrEstimate> {
        let (propensity, predictions) = match mem::take(&mut self.stage) {
            Stage::OutcomeFit {
                propensity,
                predictions,
            }
            | Stage::Combined {
                propensity,
                predictions,
                ..
            } => (propensity, predictions),
            other => {
                self.stage = other;
                return Err(Error::ModelNotSpecified);
            }
        };

        let combined = self.combine(&propensity, &predictions);
        let (pseudo, estimate) = match combined {
            Ok(v) => v,
            Err(e) => {
                self.stage = Stage::OutcomeFit {
                    propensity,
                    predictions,
                };
                return Err(e);
            }
        };
        debug!(
            risk_exposed = estimate.risk_exposed,
            risk_unexposed = estimate.risk_unexposed,
            "combined pseudo-outcomes"
        );
        info!(
            risk_difference = estimate.risk_difference,
            risk_ratio = estimate.risk_ratio,
            "doubly robust estimate"
        );

        self.stage = Stage::Combined {
            propensity,
            predictions,
            pseudo,
            estimate,
        };
        self.intervals = None;
        Ok(estimate)
    }

    fn combine(
        &self,
        propensity: &Array1<f64>,
        predictions: &CounterfactualPredictions,
    ) -> Result<(PseudoOutcomes, DrEstimate)> {
        let exposure = self.cohort.exposure()?;
        let outcome = self.cohort.outcome()?;
        let pseudo = pseudo_outcomes(&exposure, &outcome, propensity, predictions);
        let estimate = aggregate(&pseudo);
        Ok((pseudo, estimate))
    }

    // Percentile bootstrap intervals for the current estimate
    //
    // Every replicate resamples units with replacement and refits both
    // nuisance models with the formulas used for the point estimate.
    pub fn bootstrap(&mut self) -> Result<&BootstrapIntervals> {
        self.estimate()?;
        let (exposure_formula, outcome_formula) =
            match (&self.exposure_formula, &self.outcome_formula) {
                (Some(e), Some(o)) => (e, o),
                _ => return Err(Error::ModelNotSpecified),
            };
        let intervals = bootstrap_intervals(
            &self.cohort,
            &self.models,
            exposure_formula,
            outcome_formula,
            &self.config,
        )?;
        Ok(self.intervals.insert(intervals))
    }

    pub fn estimate(&self) -> Result<DrEstimate> {
        match &self.stage {
            Stage::Combined { estimate, .. } => Ok(*estimate),
            _ => Err(Error::NotFitted),
        }
    }

    pub fn pseudo_outcomes(&self) -> Option<&PseudoOutcomes> {
        match &self.stage {
            Stage::Combined { pseudo, .. } => Some(pseudo),
            _ => None,
        }
    }

    pub fn propensity(&self) -> Option<&Array1<f64>> {
        match &self.stage {
            Stage::Uninitialized => None,
            Stage::ExposureFit { propensity }
            | Stage::OutcomeFit { propensity, .. }
            | Stage::Combined { propensity, .. } => Some(propensity),
        }
    }

    pub fn predictions(&self) -> Option<&CounterfactualPredictions> {
        match &self.stage {
            Stage::OutcomeFit { predictions, .. } | Stage::Combined { predictions, .. } => {
                Some(predictions)
            }
            _ => None,
        }
    }

    pub fn intervals(&self) -> Option<&BootstrapIntervals> {
        self.intervals.as_ref()
    }

    pub fn exposure_model_fit(&self) -> bool {
        !matches!(self.stage, Stage::Uninitialized)
    }

    pub fn outcome_model_fit(&self) -> bool {
        matches!(self.stage, Stage::OutcomeFit { .. } | Stage::Combined { .. })
    }

    pub fn generated_ci(&self) -> bool {
        self.intervals.is_some()
    }

    // Change a column of the working copy. Everything derived from the old
    // data is discarded, so both models have to be fit again.
    pub fn replace_column(&mut self, column: Series) -> Result<()> {
        self.cohort.replace_column(column)?;
        self.stage = Stage::Uninitialized;
        self.exposure_formula = None;
        self.outcome_formula = None;
        self.intervals = None;
        Ok(())
    }

    pub fn summary(&self, decimal: usize) -> Result<Summary> {
        let estimate = self.estimate()?;
        Ok(Summary::new(estimate, self.intervals.clone(), decimal))
    }

    // Summary at the configured precision (4 decimals unless overridden)
    pub fn report(&self) -> Result<Summary> {
        self.summary(self.config.decimal)
    }
}

pub(crate) fn check_length(what: &'static str, expected: usize, found: usize) -> Result<()> {
    if expected != found {
        return Err(Error::LengthMismatch {
            what,
            expected,
            found,
        });
    }
    Ok(())
}

pub(crate) fn check_propensity(propensity: &Array1<f64>) -> Result<()> {
    match propensity.iter().position(|&p| !(p > 0.0 && p < 1.0)) {
        Some(index) => Err(Error::DegeneratePropensity {
            index,
            value: propensity[index],
        }),
        None => Ok(()),
    }
}
