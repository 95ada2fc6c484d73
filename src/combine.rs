use ndarray::{Array1, Zip};

use crate::nuisance::CounterfactualPredictions;

// Per-unit pseudo-outcomes, one vector for each exposure arm.
#[derive(Debug, Clone, PartialEq)]
pub struct PseudoOutcomes {
    pub exposed_arm: Array1<f64>,
    pub unexposed_arm: Array1<f64>,
}

// Point estimates produced by the doubly robust combination
//
// `risk_exposed` estimates E[Y(1)], the risk had everyone been exposed, and
// `risk_unexposed` estimates E[Y(0)]. `risk_ratio` is non-finite when
// `risk_unexposed` is exactly zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrEstimate {
    pub risk_exposed: f64,
    pub risk_unexposed: f64,
    pub risk_difference: f64,
    pub risk_ratio: f64,
    pub units: usize,
}

// Compute the doubly robust pseudo-outcomes
//
// For the exposed arm, units that were actually exposed get the observed
// outcome reweighted by the propensity score, corrected by the outcome
// model's prediction; everyone else just gets the outcome model's prediction
// under exposure. The unexposed arm mirrors this with 1 - propensity and the
// prediction under non-exposure. A propensity of exactly 0 or 1 divides by
// zero here and the non-finite value is passed through untouched.
pub fn pseudo_outcomes(
    exposure: &Array1<f64>,
    outcome: &Array1<f64>,
    propensity: &Array1<f64>,
    predictions: &CounterfactualPredictions,
) -> PseudoOutcomes {
    let exposed_arm = Zip::from(exposure)
        .and(outcome)
        .and(propensity)
        .and(&predictions.if_exposed)
        .map_collect(|&a, &y, &ps, &py1| {
            if a == 1.0 {
                y / ps - py1 * (1.0 - ps) / ps
            } else {
                py1
            }
        });
    let unexposed_arm = Zip::from(exposure)
        .and(outcome)
        .and(propensity)
        .and(&predictions.if_unexposed)
        .map_collect(|&a, &y, &ps, &py0| {
            if a == 0.0 {
                y / (1.0 - ps) - py0 * ps / (1.0 - ps)
            } else {
                py0
            }
        });
    PseudoOutcomes {
        exposed_arm,
        unexposed_arm,
    }
}

// Average the pseudo-outcomes over all units into risk difference and ratio.
// Plain unweighted means; NaN or infinite entries are not filtered out.
pub fn aggregate(pseudo: &PseudoOutcomes) -> DrEstimate {
    let risk_exposed = pseudo.exposed_arm.mean().unwrap_or(f64::NAN);
    let risk_unexposed = pseudo.unexposed_arm.mean().unwrap_or(f64::NAN);
    DrEstimate {
        risk_exposed,
        risk_unexposed,
        risk_difference: risk_exposed - risk_unexposed,
        risk_ratio: risk_exposed / risk_unexposed,
        units: pseudo.exposed_arm.len(),
    }
}

// Difference in observed outcome means between exposed and unexposed units
pub fn naive_risk_difference(exposure: &Array1<f64>, outcome: &Array1<f64>) -> f64 {
    let (mut sum1, mut n1, mut sum0, mut n0) = (0.0, 0usize, 0.0, 0usize);
    for (&a, &y) in exposure.iter().zip(outcome.iter()) {
        if a == 1.0 {
            sum1 += y;
            n1 += 1;
        } else if a == 0.0 {
            sum0 += y;
            n0 += 1;
        }
    }
    sum1 / n1 as f64 - sum0 / n0 as f64
}
