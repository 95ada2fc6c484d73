use ndarray::{Array1, Array2};
use polars::datatypes::DataType::Float64;
use polars::prelude::{
    CsvReader, DataFrame, Float64Type, IdxCa, IdxSize, NamedFrom, PolarsResult, SerReader, Series,
};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

// A model specification of the form `dependent ~ term + term + ...`.
//
// Terms are plain column names. The estimator only ever builds these by
// gluing the dependent variable onto a caller-supplied covariate expression,
// and the adapter parses them back into column selections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelFormula {
    pub dependent: String,
    pub covariates: Vec<String>,
}

impl ModelFormula {
    pub fn new(dependent: &str, covariates: &str) -> Result<Self> {
        format!("{} ~ {}", dependent, covariates).parse()
    }
}

impl FromStr for ModelFormula {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        let (lhs, rhs) = raw
            .split_once('~')
            .ok_or_else(|| Error::Formula(format!("missing '~' in `{}`", raw)))?;
        let dependent = lhs.trim();
        if dependent.is_empty() {
            return Err(Error::Formula(format!("no dependent variable in `{}`", raw)));
        }
        let covariates: Vec<String> = rhs
            .split('+')
            .map(str::trim)
            .filter(|term| !term.is_empty())
            .map(String::from)
            .collect();
        if covariates.is_empty() {
            return Err(Error::Formula(format!("no covariates in `{}`", raw)));
        }
        Ok(Self {
            dependent: dependent.to_string(),
            covariates,
        })
    }
}

impl fmt::Display for ModelFormula {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ~ {}", self.dependent, self.covariates.join(" + "))
    }
}

// The estimator's working copy of the analysis data.
//
// Holds its own DataFrame (cloned from whatever the caller passed in) along
// with the names of the binary exposure and outcome columns. Derived values
// never get written back into the frame; each stage keeps its own vectors.
#[derive(Debug, Clone)]
pub struct Cohort {
    data: DataFrame,
    exposure: String,
    outcome: String,
}

impl Cohort {
    pub fn new(data: &DataFrame, exposure: &str, outcome: &str) -> Result<Self> {
        if data.height() == 0 {
            return Err(Error::EmptyCohort);
        }
        data.column(exposure)?;
        data.column(outcome)?;
        Ok(Self {
            data: data.clone(),
            exposure: exposure.to_string(),
            outcome: outcome.to_string(),
        })
    }

    // Imports a csv file from a specified path into a cohort
    pub fn from_csv(path: &str, exposure: &str, outcome: &str) -> Result<Self> {
        let data = CsvReader::from_path(path)?.has_header(true).finish()?;
        Self::new(&data, exposure, outcome)
    }

    pub fn data(&self) -> &DataFrame {
        &self.data
    }

    pub fn exposure_name(&self) -> &str {
        &self.exposure
    }

    pub fn outcome_name(&self) -> &str {
        &self.outcome
    }

    pub fn len(&self) -> usize {
        self.data.height()
    }

    pub fn is_empty(&self) -> bool {
        self.data.height() == 0
    }

    pub fn exposure(&self) -> Result<Array1<f64>> {
        Ok(float_column(&self.data, &self.exposure)?)
    }

    pub fn outcome(&self) -> Result<Array1<f64>> {
        Ok(float_column(&self.data, &self.outcome)?)
    }

    pub fn float_column(&self, name: &str) -> Result<Array1<f64>> {
        Ok(float_column(&self.data, name)?)
    }

    // Covariate columns of `formula` as a 2D ndarray, one row per unit
    pub fn design_matrix(&self, formula: &ModelFormula) -> Result<Array2<f64>> {
        design_matrix(&self.data, formula)
    }

    // Copy of the working frame with every unit's exposure set to `level`.
    // Used to evaluate a fitted outcome model under both counterfactuals.
    pub fn with_exposure_level(&self, level: f64) -> Result<DataFrame> {
        let mut data = self.data.clone();
        let forced = Series::new(&self.exposure, vec![level; data.height()]);
        data.with_column(forced)?;
        Ok(data)
    }

    // Build a new cohort out of the given row indices (repeats allowed)
    pub fn resample(&self, indices: &[IdxSize]) -> Result<Self> {
        let idx = IdxCa::new("idx", indices.to_vec());
        let data = self.data.take(&idx)?;
        Self::new(&data, &self.exposure, &self.outcome)
    }

    // Overwrite (or add) a column in the working copy
    pub fn replace_column(&mut self, column: Series) -> Result<()> {
        if column.len() != self.data.height() {
            return Err(Error::LengthMismatch {
                what: "replacement column",
                expected: self.data.height(),
                found: column.len(),
            });
        }
        self.data.with_column(column)?;
        Ok(())
    }
}

// Pull a numeric column out as f64, with nulls turned into NaN
pub fn float_column(data: &DataFrame, name: &str) -> PolarsResult<Array1<f64>> {
    let values = data.column(name)?.cast(&Float64)?;
    let values = values
        .f64()?
        .into_iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect();
    Ok(values)
}

pub fn design_matrix(data: &DataFrame, formula: &ModelFormula) -> Result<Array2<f64>> {
    for term in &formula.covariates {
        if data.column(term).is_err() {
            return Err(Error::Formula(format!(
                "unknown column `{}` in `{}`",
                term, formula
            )));
        }
    }
    let x = data
        .select(&formula.covariates)?
        .to_ndarray::<Float64Type>()?;
    Ok(x)
}
