//! Error taxonomy for flux resolution and stability analysis.

use thiserror::Error;

/// Root error type for every fallible operation in `trophic_core`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrophicError {
    /// An edge references an unknown node, a node id is repeated, or the
    /// edge set contains a self-loop or duplicate pair.
    #[error("invalid topology: {0}")]
    InvalidTopology(String),

    /// A consumer has prey edges but zero total weighted prey biomass.
    #[error("underdetermined demand for consumer '{consumer}': total weighted prey biomass is zero")]
    UnderdeterminedDemand { consumer: String },

    /// The eigen-decomposition of the community Jacobian failed numerically.
    #[error("eigen-decomposition did not converge: {0}")]
    NonConvergentEigensolve(String),

    /// The multiplier search could not produce a stabilizing value.
    #[error("stability bound exhausted: {0}")]
    StabilityBoundExhausted(BoundExhaustion),

    /// A numeric input is out of range, non-finite, or dimensionally inconsistent.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Why a stabilizing multiplier search gave up.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BoundExhaustion {
    #[error("no stabilizing multiplier within upper bound {upper_bound} (stability metric {metric})")]
    UpperBoundUnstable { upper_bound: f64, metric: f64 },

    #[error("iteration budget of {iterations} exhausted with bracket [{}, {}] wider than tolerance", .bracket.0, .bracket.1)]
    IterationBudget { iterations: usize, bracket: (f64, f64) },
}

pub type TrophicResult<T> = Result<T, TrophicError>;

#[cfg(test)]
mod tests {
    use super::{BoundExhaustion, TrophicError};

    #[test]
    fn messages_name_the_failing_item() {
        let err = TrophicError::UnderdeterminedDemand {
            consumer: "wolf".to_string(),
        };
        assert!(err.to_string().contains("'wolf'"));

        let err = TrophicError::StabilityBoundExhausted(BoundExhaustion::IterationBudget {
            iterations: 3,
            bracket: (0.25, 0.5),
        });
        let message = err.to_string();
        assert!(message.contains("iteration budget of 3"));
        assert!(message.contains("[0.25, 0.5]"));
    }
}
