use linfa::dataset::Dataset;
use linfa::traits::{Fit, Predict};
use linfa_logistic::{FittedLogisticRegression, LogisticRegression};
use ndarray::{Array1, Array2};
use tracing::debug;

use crate::data::{design_matrix, float_column, Cohort, ModelFormula};
use crate::error::{Error, Result};

// Model predictions for every unit under both exposure levels.
#[derive(Debug, Clone, PartialEq)]
pub struct CounterfactualPredictions {
    pub if_exposed: Array1<f64>,
    pub if_unexposed: Array1<f64>,
}

// The two nuisance models the doubly robust estimator consumes.
//
// `fit_propensity` returns P(exposure = 1 | covariates) for every unit.
// `fit_outcome` fits a single outcome model on all units and evaluates it
// twice, once with everyone's exposure forced to 1 and once forced to 0.
// Both outputs must be index-aligned with the cohort. The estimator does not
// check that values fall inside the unit interval.
pub trait NuisanceModels {
    fn fit_propensity(&self, cohort: &Cohort, formula: &ModelFormula) -> Result<Array1<f64>>;

    fn fit_outcome(
        &self,
        cohort: &Cohort,
        formula: &ModelFormula,
    ) -> Result<CounterfactualPredictions>;
}

// Unpenalised logistic regression with an intercept, fit with linfa.
#[derive(Debug, Clone)]
pub struct LogisticModels {
    max_iterations: u64,
}

impl Default for LogisticModels {
    fn default() -> Self {
        Self { max_iterations: 100 }
    }
}

impl LogisticModels {
    pub fn new(max_iterations: u64) -> Self {
        Self { max_iterations }
    }
}

impl NuisanceModels for LogisticModels {
    fn fit_propensity(&self, cohort: &Cohort, formula: &ModelFormula) -> Result<Array1<f64>> {
        let x = cohort.design_matrix(formula)?;
        let y = binary_response(cohort, &formula.dependent)?;
        let logit = Logit::fit(x.clone(), y, &formula.covariates, self.max_iterations)?;
        debug!(
            model = %formula,
            units = cohort.len(),
            intercept = logit.intercept(),
            coefficients = ?logit.coefficients(),
            "fitted propensity model"
        );
        Ok(logit.probabilities(&x))
    }

    fn fit_outcome(
        &self,
        cohort: &Cohort,
        formula: &ModelFormula,
    ) -> Result<CounterfactualPredictions> {
        let x = cohort.design_matrix(formula)?;
        let y = binary_response(cohort, &formula.dependent)?;
        let logit = Logit::fit(x, y, &formula.covariates, self.max_iterations)?;
        debug!(
            model = %formula,
            units = cohort.len(),
            intercept = logit.intercept(),
            coefficients = ?logit.coefficients(),
            "fitted outcome model"
        );

        let exposed = design_matrix(&cohort.with_exposure_level(1.0)?, formula)?;
        let unexposed = design_matrix(&cohort.with_exposure_level(0.0)?, formula)?;
        Ok(CounterfactualPredictions {
            if_exposed: logit.probabilities(&exposed),
            if_unexposed: logit.probabilities(&unexposed),
        })
    }
}

// Read a 0/1 column as linfa class labels
fn binary_response(cohort: &Cohort, name: &str) -> Result<Array1<i64>> {
    let values = float_column(cohort.data(), name)?;
    values
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            if v == 0.0 || v == 1.0 {
                Ok(v as i64)
            } else {
                Err(Error::ModelFit(format!(
                    "`{}` must be 0 or 1 but unit {} has {}",
                    name, i, v
                )))
            }
        })
        .collect()
}

// A fitted logistic model plus the orientation of its probabilities.
//
// linfa picks which of the two classes it treats as positive on its own, so
// after fitting we compare hard predictions against probabilities on the
// training rows and flip if the reported probabilities belong to class 0.
struct Logit {
    model: FittedLogisticRegression<f64, i64>,
    flipped: bool,
}

impl Logit {
    fn fit(
        x: Array2<f64>,
        y: Array1<i64>,
        feature_names: &[String],
        max_iterations: u64,
    ) -> Result<Self> {
        let train = Dataset::new(x, y).with_feature_names(feature_names.to_vec());
        let model = LogisticRegression::default()
            .with_intercept(true)
            .alpha(0.0)
            .max_iterations(max_iterations)
            .fit(&train)
            .map_err(|e| Error::ModelFit(e.to_string()))?;
        let flipped = reports_class_zero(&model, train.records());
        Ok(Self { model, flipped })
    }

    // Intercept and slopes on the log-odds of label 1
    fn intercept(&self) -> f64 {
        let b0 = self.model.intercept();
        if self.flipped {
            -b0
        } else {
            b0
        }
    }

    fn coefficients(&self) -> Vec<f64> {
        let sign = if self.flipped { -1.0 } else { 1.0 };
        self.model.params().iter().map(|b| sign * b).collect()
    }

    fn probabilities(&self, x: &Array2<f64>) -> Array1<f64> {
        let p = self.model.predict_probabilities(x);
        if self.flipped {
            p.mapv(|v| 1.0 - v)
        } else {
            p
        }
    }
}

fn reports_class_zero(model: &FittedLogisticRegression<f64, i64>, x: &Array2<f64>) -> bool {
    let probabilities = model.predict_probabilities(x);
    let labels: Array1<i64> = model.predict(x);
    // The row furthest from 0.5 gives an unambiguous answer.
    let anchor = probabilities
        .iter()
        .map(|p| (p - 0.5).abs())
        .enumerate()
        .filter(|(_, d)| d.is_finite())
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(i, _)| i);
    match anchor {
        Some(i) => (probabilities[i] >= 0.5) != (labels[i] == 1),
        None => false,
    }
}
