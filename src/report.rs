use std::fmt;

use crate::bootstrap::BootstrapIntervals;
use crate::combine::DrEstimate;

// Printable results of a fitted doubly robust estimator
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub estimate: DrEstimate,
    pub intervals: Option<BootstrapIntervals>,
    pub decimal: usize,
}

impl Summary {
    pub fn new(
        estimate: DrEstimate,
        intervals: Option<BootstrapIntervals>,
        decimal: usize,
    ) -> Self {
        Self {
            estimate,
            intervals,
            decimal,
        }
    }
}

// Implement `Display` for `Summary`.
impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let d = self.decimal;
        let e = &self.estimate;
        let rule = "-".repeat(70);
        writeln!(f, "{}", rule)?;
        writeln!(f, "Doubly robust estimator | # Units: {}", e.units)?;
        writeln!(f, "{}", rule)?;
        writeln!(f, "Risk (exposed)    : {:.*}", d, e.risk_exposed)?;
        writeln!(f, "Risk (unexposed)  : {:.*}", d, e.risk_unexposed)?;
        writeln!(f, "Risk Difference   : {:.*}", d, e.risk_difference)?;
        writeln!(f, "Risk Ratio        : {:.*}", d, e.risk_ratio)?;
        if let Some(ci) = &self.intervals {
            let level = ci.confidence * 100.0;
            writeln!(
                f,
                "{:.0}% CI (RD)       : ({:.*}, {:.*})",
                level, d, ci.risk_difference.lower, d, ci.risk_difference.upper
            )?;
            writeln!(
                f,
                "{:.0}% CI (RR)       : ({:.*}, {:.*})",
                level, d, ci.risk_ratio.lower, d, ci.risk_ratio.upper
            )?;
            writeln!(
                f,
                "Bootstrap         : {} replicates ({} failed)",
                ci.replicates, ci.failed
            )?;
        }
        write!(f, "{}", rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::Interval;

    fn estimate() -> DrEstimate {
        DrEstimate {
            risk_exposed: 0.64375,
            risk_unexposed: 0.35625,
            risk_difference: 0.2875,
            risk_ratio: 0.64375 / 0.35625,
            units: 4,
        }
    }

    #[test]
    fn rounds_to_requested_decimals() {
        let text = Summary::new(estimate(), None, 2).to_string();
        assert!(text.contains("Risk Difference   : 0.29"));
        assert!(text.contains("Risk Ratio        : 1.81"));
        assert!(!text.contains("CI"));

        let text = Summary::new(estimate(), None, 4).to_string();
        assert!(text.contains("Risk Difference   : 0.2875"));
        assert!(text.contains("Risk Ratio        : 1.8070"));
    }

    #[test]
    fn non_finite_ratio_is_shown_as_is() {
        let mut e = estimate();
        e.risk_unexposed = 0.0;
        e.risk_ratio = f64::INFINITY;
        let text = Summary::new(e, None, 3).to_string();
        assert!(text.contains("Risk Ratio        : inf"));
    }

    #[test]
    fn intervals_are_printed_when_present() {
        let ci = BootstrapIntervals {
            confidence: 0.95,
            risk_difference: Interval { lower: 0.1, upper: 0.4 },
            risk_ratio: Interval { lower: 1.2, upper: 2.5 },
            risk_difference_se: 0.08,
            replicates: 198,
            failed: 2,
        };
        let text = Summary::new(estimate(), Some(ci), 2).to_string();
        assert!(text.contains("95% CI (RD)       : (0.10, 0.40)"));
        assert!(text.contains("95% CI (RR)       : (1.20, 2.50)"));
        assert!(text.contains("198 replicates (2 failed)"));
    }
}
