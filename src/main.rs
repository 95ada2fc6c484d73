use std::env;
use std::error::Error;

use drisk::{Cohort, DoublyRobust, EstimatorConfig};

const USAGE: &str = "usage: drisk <csv> <exposure> <outcome> <exposure-covariates> \
                     <outcome-covariates> [config.toml]";

// Fit both nuisance models, combine them, and optionally bootstrap.
//
// Covariate arguments are right-hand sides of model formulas, e.g.
// "age + male + cd4". Confidence intervals are added only when the config
// file carries a `[bootstrap]` table.
fn run(args: &[String]) -> Result<String, Box<dyn Error>> {
    let (path, exposure, outcome, exposure_covs, outcome_covs) = match args {
        [_, path, exposure, outcome, e, o, ..] => (path, exposure, outcome, e, o),
        _ => return Err(USAGE.into()),
    };
    let config = match args.get(6) {
        Some(file) => EstimatorConfig::load(file)?,
        None => EstimatorConfig::default(),
    };

    let cohort = Cohort::from_csv(path, exposure, outcome)?;
    tracing::info!(units = cohort.len(), path = %path, "loaded cohort");

    let bootstrap = config.bootstrap.is_some();
    let mut dr = DoublyRobust::from_cohort(cohort, config);
    dr.exposure_model(exposure_covs)?;
    dr.outcome_model(outcome_covs)?;
    dr.fit()?;
    if bootstrap {
        dr.bootstrap()?;
    }
    Ok(dr.report()?.to_string())
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    let summary = run(&args)?;
    println!("{}", summary);
    Ok(())
}
