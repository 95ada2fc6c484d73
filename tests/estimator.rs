use approx::assert_abs_diff_eq;
use drisk::{
    Cohort, CounterfactualPredictions, DoublyRobust, EstimatorConfig, ModelFormula,
    NuisanceModels, Result,
};
use ndarray::{array, Array1};
use polars::prelude::{DataFrame, NamedFrom, Series};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs;

fn expit(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

// Confounded cohort: L raises both the chance of exposure and of the outcome.
// Returns the frame and the true risk difference given the sampled L values.
fn simulate(n: usize, seed: u64) -> (DataFrame, f64) {
    let mut rng = StdRng::seed_from_u64(seed);
    let (mut l, mut a, mut y) = (Vec::new(), Vec::new(), Vec::new());
    let mut true_rd = 0.0;
    for _ in 0..n {
        let li: f64 = rng.gen_range(-2.0..2.0);
        let ai = rng.gen_bool(expit(-0.3 + 1.2 * li)) as i64;
        let yi = rng.gen_bool(expit(-1.0 + 0.9 * ai as f64 + 1.1 * li)) as i64;
        true_rd += expit(-1.0 + 0.9 + 1.1 * li) - expit(-1.0 + 1.1 * li);
        l.push(li);
        a.push(ai);
        y.push(yi);
    }
    let data = DataFrame::new(vec![
        Series::new("exposed", a),
        Series::new("event", y),
        Series::new("risk", l),
    ])
    .unwrap();
    (data, true_rd / n as f64)
}

#[test]
fn logistic_pipeline_recovers_the_confounded_effect() {
    let (data, true_rd) = simulate(3000, 11);
    let mut dr = DoublyRobust::new(&data, "exposed", "event").unwrap();
    dr.exposure_model("risk").unwrap();
    dr.outcome_model("exposed + risk").unwrap();
    let estimate = dr.fit().unwrap();

    assert!(estimate.risk_difference.is_finite());
    assert!(estimate.risk_ratio > 1.0);
    assert_abs_diff_eq!(estimate.risk_difference, true_rd, epsilon = 0.06);

    let ps = dr.propensity().unwrap();
    assert!(ps.iter().all(|&p| p > 0.0 && p < 1.0));
}

#[test]
fn cohort_loads_from_csv() {
    let path = std::env::temp_dir().join("drisk_cohort_loads_from_csv.csv");
    fs::write(
        &path,
        "exposed,event,risk\n1,1,0.5\n0,0,-1.0\n1,0,0.2\n0,1,1.5\n1,1,0.9\n0,0,-0.3\n",
    )
    .unwrap();
    let cohort = Cohort::from_csv(path.to_str().unwrap(), "exposed", "event").unwrap();
    assert_eq!(cohort.len(), 6);
    assert_eq!(cohort.exposure().unwrap().sum(), 3.0);
    fs::remove_file(&path).unwrap();
}

// Returns the hand-checkable four-unit inputs whatever the data
struct FourUnits;

impl NuisanceModels for FourUnits {
    fn fit_propensity(&self, _: &Cohort, _: &ModelFormula) -> Result<Array1<f64>> {
        Ok(array![0.5, 0.5, 0.8, 0.2])
    }

    fn fit_outcome(&self, _: &Cohort, _: &ModelFormula) -> Result<CounterfactualPredictions> {
        Ok(CounterfactualPredictions {
            if_exposed: array![0.6, 0.6, 0.5, 0.7],
            if_unexposed: array![0.4, 0.4, 0.3, 0.5],
        })
    }
}

fn four_unit_frame() -> DataFrame {
    DataFrame::new(vec![
        Series::new("exposed", &[1i64, 0, 1, 0]),
        Series::new("event", &[1i64, 0, 0, 1]),
        Series::new("risk", &[0.0, 0.0, 0.0, 0.0]),
    ])
    .unwrap()
}

#[test]
fn four_unit_scenario_through_the_public_api() {
    let cohort = Cohort::new(&four_unit_frame(), "exposed", "event").unwrap();
    let mut dr = DoublyRobust::with_models(cohort, FourUnits, EstimatorConfig::default());
    dr.exposure_model("risk").unwrap();
    dr.outcome_model("exposed + risk").unwrap();
    let estimate = dr.fit().unwrap();

    let pseudo = dr.pseudo_outcomes().unwrap();
    let expected_dr1 = [1.4, 0.6, -0.125, 0.7];
    let expected_dr0 = [0.4, -0.4, 0.3, 1.125];
    for i in 0..4 {
        assert_abs_diff_eq!(pseudo.exposed_arm[i], expected_dr1[i], epsilon = 1e-9);
        assert_abs_diff_eq!(pseudo.unexposed_arm[i], expected_dr0[i], epsilon = 1e-9);
    }
    assert_abs_diff_eq!(estimate.risk_difference, 0.2875, epsilon = 1e-9);
    assert_abs_diff_eq!(estimate.risk_ratio, 0.64375 / 0.35625, epsilon = 1e-9);

    let text = dr.summary(4).unwrap().to_string();
    assert!(text.contains("Risk Difference   : 0.2875"));
}

#[test]
fn estimators_keep_separate_working_copies() {
    let mut data = four_unit_frame();
    let mut first = DoublyRobust::with_models(
        Cohort::new(&data, "exposed", "event").unwrap(),
        FourUnits,
        EstimatorConfig::default(),
    );
    let mut second = DoublyRobust::with_models(
        Cohort::new(&data, "exposed", "event").unwrap(),
        FourUnits,
        EstimatorConfig::default(),
    );

    // caller mutation after construction is not seen
    data.with_column(Series::new("event", &[0i64, 0, 0, 0])).unwrap();
    first
        .replace_column(Series::new("event", &[1i64, 1, 1, 1]))
        .unwrap();

    for dr in [&mut first, &mut second] {
        dr.exposure_model("risk").unwrap();
        dr.outcome_model("exposed + risk").unwrap();
        dr.fit().unwrap();
    }
    assert_eq!(second.cohort().outcome().unwrap().to_vec(), vec![1.0, 0.0, 0.0, 1.0]);
    assert_abs_diff_eq!(
        second.estimate().unwrap().risk_difference,
        0.2875,
        epsilon = 1e-9
    );
    assert!((first.estimate().unwrap().risk_difference - 0.2875).abs() > 1e-6);
}

#[test]
fn fit_is_refused_on_any_data_until_both_models_are_fit() {
    let (data, _) = simulate(50, 3);
    let mut dr = DoublyRobust::new(&data, "exposed", "event").unwrap();
    assert!(matches!(dr.fit(), Err(drisk::Error::ModelNotSpecified)));
    assert!(matches!(dr.summary(4), Err(drisk::Error::NotFitted)));
}
