use polars::prelude::IdxSize;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::combine::{aggregate, pseudo_outcomes, DrEstimate};
use crate::config::{DegeneratePolicy, EstimatorConfig};
use crate::data::{Cohort, ModelFormula};
use crate::error::{Error, Result};
use crate::estimator::{check_length, check_propensity};
use crate::nuisance::NuisanceModels;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub lower: f64,
    pub upper: f64,
}

// Percentile bootstrap intervals for both effect measures
//
// `risk_difference_se` is the standard deviation of the bootstrap risk
// differences. `replicates` counts the draws that produced a finite
// estimate and `failed` the ones skipped because a nuisance fit failed or
// the estimate was not finite.
#[derive(Debug, Clone, PartialEq)]
pub struct BootstrapIntervals {
    pub confidence: f64,
    pub risk_difference: Interval,
    pub risk_ratio: Interval,
    pub risk_difference_se: f64,
    pub replicates: usize,
    pub failed: usize,
}

// Nonparametric bootstrap of the doubly robust estimator
//
// Each replicate draws `n` units with replacement, refits both nuisance
// models on the resample and recombines. Replicates that fail (a resample
// with only one exposure level, say) are logged and skipped rather than
// aborting the whole run.
pub fn bootstrap_intervals<M: NuisanceModels + ?Sized>(
    cohort: &Cohort,
    models: &M,
    exposure_formula: &ModelFormula,
    outcome_formula: &ModelFormula,
    config: &EstimatorConfig,
) -> Result<BootstrapIntervals> {
    let settings = config.bootstrap_settings();
    settings.validate()?;
    let n = cohort.len();
    let mut rng = StdRng::seed_from_u64(settings.seed);
    let mut differences = Vec::with_capacity(settings.replicates);
    let mut ratios = Vec::with_capacity(settings.replicates);
    let mut failed = 0usize;

    for r in 0..settings.replicates {
        let indices: Vec<IdxSize> = (0..n).map(|_| rng.gen_range(0..n) as IdxSize).collect();
        let sample = cohort.resample(&indices)?;
        match replicate(&sample, models, exposure_formula, outcome_formula, config.degenerate) {
            Ok(estimate)
                if estimate.risk_difference.is_finite() && estimate.risk_ratio.is_finite() =>
            {
                differences.push(estimate.risk_difference);
                ratios.push(estimate.risk_ratio);
            }
            Ok(_) => {
                debug!(replicate = r, "non-finite bootstrap estimate skipped");
                failed += 1;
            }
            Err(e) => {
                warn!(replicate = r, error = %e, "bootstrap replicate failed");
                failed += 1;
            }
        }
    }

    if differences.is_empty() {
        return Err(Error::Bootstrap(format!(
            "all {} replicates failed",
            settings.replicates
        )));
    }

    let alpha = (1.0 - settings.confidence) / 2.0;
    let risk_difference_se = std_dev(&differences);
    differences.sort_by(f64::total_cmp);
    ratios.sort_by(f64::total_cmp);
    let intervals = BootstrapIntervals {
        confidence: settings.confidence,
        risk_difference: percentile_interval(&differences, alpha),
        risk_ratio: percentile_interval(&ratios, alpha),
        risk_difference_se,
        replicates: differences.len(),
        failed,
    };
    info!(
        replicates = intervals.replicates,
        failed,
        "bootstrap confidence intervals generated"
    );
    Ok(intervals)
}

fn replicate<M: NuisanceModels + ?Sized>(
    sample: &Cohort,
    models: &M,
    exposure_formula: &ModelFormula,
    outcome_formula: &ModelFormula,
    policy: DegeneratePolicy,
) -> Result<DrEstimate> {
    let propensity = models.fit_propensity(sample, exposure_formula)?;
    check_length("propensity scores", sample.len(), propensity.len())?;
    if policy == DegeneratePolicy::Reject {
        check_propensity(&propensity)?;
    }
    let predictions = models.fit_outcome(sample, outcome_formula)?;
    check_length("exposed predictions", sample.len(), predictions.if_exposed.len())?;
    check_length("unexposed predictions", sample.len(), predictions.if_unexposed.len())?;
    let pseudo = pseudo_outcomes(
        &sample.exposure()?,
        &sample.outcome()?,
        &propensity,
        &predictions,
    );
    Ok(aggregate(&pseudo))
}

fn percentile_interval(sorted: &[f64], alpha: f64) -> Interval {
    Interval {
        lower: quantile_sorted(sorted, alpha),
        upper: quantile_sorted(sorted, 1.0 - alpha),
    }
}

// Quantile of already-sorted data, linearly interpolated between order
// statistics. NaN for empty input.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let q = q.clamp(0.0, 1.0);
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    (ss / (n - 1.0)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BootstrapConfig;
    use crate::nuisance::CounterfactualPredictions;
    use approx::assert_abs_diff_eq;
    use ndarray::Array1;
    use polars::df;
    use polars::prelude::NamedFrom;

    // Marginal propensity and flat predictions, recomputed on every resample
    struct Marginal;

    impl NuisanceModels for Marginal {
        fn fit_propensity(&self, cohort: &Cohort, _: &ModelFormula) -> Result<Array1<f64>> {
            let exposure = cohort.exposure()?;
            let p = exposure.mean().unwrap_or(f64::NAN);
            if !(p > 0.0 && p < 1.0) {
                return Err(Error::ModelFit("single exposure level".into()));
            }
            Ok(Array1::from_elem(cohort.len(), p))
        }

        fn fit_outcome(
            &self,
            cohort: &Cohort,
            _: &ModelFormula,
        ) -> Result<CounterfactualPredictions> {
            Ok(CounterfactualPredictions {
                if_exposed: Array1::from_elem(cohort.len(), 0.5),
                if_unexposed: Array1::from_elem(cohort.len(), 0.5),
            })
        }
    }

    struct Broken;

    impl NuisanceModels for Broken {
        fn fit_propensity(&self, _: &Cohort, _: &ModelFormula) -> Result<Array1<f64>> {
            Err(Error::ModelFit("no convergence".into()))
        }

        fn fit_outcome(&self, _: &Cohort, _: &ModelFormula) -> Result<CounterfactualPredictions> {
            Err(Error::ModelFit("no convergence".into()))
        }
    }

    fn cohort() -> Cohort {
        let data = df!(
            "a" => &[1i64, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0, 0],
            "y" => &[1i64, 1, 1, 1, 0, 0, 1, 0, 0, 0, 0, 0],
            "l" => &[0.0; 12]
        )
        .unwrap();
        Cohort::new(&data, "a", "y").unwrap()
    }

    fn formulas() -> (ModelFormula, ModelFormula) {
        (
            ModelFormula::new("a", "l").unwrap(),
            ModelFormula::new("y", "a + l").unwrap(),
        )
    }

    #[test]
    fn quantiles_interpolate_between_order_statistics() {
        let sorted = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(quantile_sorted(&sorted, 0.0), 1.0);
        assert_eq!(quantile_sorted(&sorted, 1.0), 5.0);
        assert_eq!(quantile_sorted(&sorted, 0.5), 3.0);
        assert_abs_diff_eq!(quantile_sorted(&sorted, 0.1), 1.4, epsilon = 1e-12);
        assert!(quantile_sorted(&[], 0.5).is_nan());
    }

    #[test]
    fn same_seed_gives_same_intervals() {
        let (ef, of) = formulas();
        let config = EstimatorConfig::default();
        let first = bootstrap_intervals(&cohort(), &Marginal, &ef, &of, &config).unwrap();
        let second = bootstrap_intervals(&cohort(), &Marginal, &ef, &of, &config).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.replicates + first.failed, config.bootstrap_settings().replicates);
    }

    #[test]
    fn interval_brackets_the_point_estimate() {
        let (ef, of) = formulas();
        let config = EstimatorConfig::default();
        let intervals = bootstrap_intervals(&cohort(), &Marginal, &ef, &of, &config).unwrap();
        // naive difference 4/6 - 1/6
        let point = 0.5;
        assert!(intervals.risk_difference.lower <= point);
        assert!(intervals.risk_difference.upper >= point);
        assert!(intervals.risk_difference.lower < intervals.risk_difference.upper);
        assert!(intervals.risk_difference_se > 0.0);
    }

    #[test]
    fn all_failures_is_an_error() {
        let (ef, of) = formulas();
        let config = EstimatorConfig::default();
        assert!(matches!(
            bootstrap_intervals(&cohort(), &Broken, &ef, &of, &config),
            Err(Error::Bootstrap(_))
        ));
    }

    #[test]
    fn zero_replicates_is_a_config_error() {
        let (ef, of) = formulas();
        let config = EstimatorConfig {
            bootstrap: Some(BootstrapConfig {
                replicates: 0,
                ..BootstrapConfig::default()
            }),
            ..EstimatorConfig::default()
        };
        assert!(matches!(
            bootstrap_intervals(&cohort(), &Marginal, &ef, &of, &config),
            Err(Error::Config(_))
        ));
    }
}
