//! Search for the smallest self-regulation multiplier that stabilizes a web.
//!
//! The stability metric is assumed to be non-increasing in the multiplier
//! over the search bracket. Under that assumption a bisection locates the
//! point where the metric drops below zero. Webs that violate it can still
//! be searched, but the result is then only one of possibly several
//! crossings.

use crate::error::{BoundExhaustion, TrophicError, TrophicResult};
use crate::flux::{resolve_fluxes, FluxSettings};
use crate::network::NetworkModel;
use crate::stability::{network_stability, JacobianSettings, Normalization};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BisectionSettings {
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for BisectionSettings {
    fn default() -> Self {
        Self {
            lower_bound: 0.0,
            upper_bound: 1.0,
            tolerance: 1e-6,
            max_iterations: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MultiplierSearch {
    pub multiplier: f64,
    /// Stability metric at `multiplier`; always negative.
    pub metric: f64,
    pub iterations: usize,
}

/// Finds the smallest self-regulation multiplier within the bracket at
/// which the web's stability metric is negative.
///
/// Fluxes do not depend on the multiplier, so they are resolved once per
/// search; each bisection step only reassembles the Jacobian.
pub fn find_stabilizing_multiplier(
    network: &NetworkModel,
    flux_settings: &FluxSettings,
    normalization: Normalization,
    settings: BisectionSettings,
) -> TrophicResult<MultiplierSearch> {
    let flux = resolve_fluxes(network, flux_settings)?;
    let jacobian = JacobianSettings::new(normalization)
        .with_efficiency_level(flux_settings.efficiency_level);
    bisect_stabilizing(
        |multiplier| network_stability(network, &flux, &jacobian.with_self_regulation(multiplier)),
        settings,
    )
}

/// Bisection over any metric that falls below zero as the multiplier grows.
pub fn bisect_stabilizing<F>(
    mut metric: F,
    settings: BisectionSettings,
) -> TrophicResult<MultiplierSearch>
where
    F: FnMut(f64) -> TrophicResult<f64>,
{
    validate(&settings)?;

    let upper_metric = metric(settings.upper_bound)?;
    if upper_metric >= 0.0 {
        log::warn!(
            "web is unstable at the upper bound {} (metric {})",
            settings.upper_bound,
            upper_metric
        );
        return Err(TrophicError::StabilityBoundExhausted(
            BoundExhaustion::UpperBoundUnstable {
                upper_bound: settings.upper_bound,
                metric: upper_metric,
            },
        ));
    }

    let lower_metric = metric(settings.lower_bound)?;
    if lower_metric < 0.0 {
        return Ok(MultiplierSearch {
            multiplier: settings.lower_bound,
            metric: lower_metric,
            iterations: 0,
        });
    }

    let mut lo = settings.lower_bound;
    let mut hi = settings.upper_bound;
    let mut hi_metric = upper_metric;
    let mut iterations = 0usize;

    while hi - lo > settings.tolerance {
        if iterations >= settings.max_iterations {
            log::warn!(
                "bisection stopped after {} iterations with bracket [{}, {}]",
                iterations,
                lo,
                hi
            );
            return Err(TrophicError::StabilityBoundExhausted(
                BoundExhaustion::IterationBudget {
                    iterations,
                    bracket: (lo, hi),
                },
            ));
        }
        let mid = lo + 0.5 * (hi - lo);
        let value = metric(mid)?;
        iterations += 1;
        log::debug!("bisection step {}: multiplier {} metric {}", iterations, mid, value);
        if value < 0.0 {
            hi = mid;
            hi_metric = value;
        } else {
            lo = mid;
        }
    }

    Ok(MultiplierSearch {
        multiplier: hi,
        metric: hi_metric,
        iterations,
    })
}

fn validate(settings: &BisectionSettings) -> TrophicResult<()> {
    if !settings.lower_bound.is_finite() || !settings.upper_bound.is_finite() {
        return Err(TrophicError::InvalidParameter(
            "search bounds must be finite".to_string(),
        ));
    }
    if settings.lower_bound > settings.upper_bound {
        return Err(TrophicError::InvalidParameter(format!(
            "lower bound {} exceeds upper bound {}",
            settings.lower_bound, settings.upper_bound
        )));
    }
    if settings.tolerance.is_nan() || settings.tolerance <= 0.0 {
        return Err(TrophicError::InvalidParameter(format!(
            "tolerance must be positive, got {}",
            settings.tolerance
        )));
    }
    if settings.max_iterations == 0 {
        return Err(TrophicError::InvalidParameter(
            "max_iterations must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{EdgeSpec, MetabolicType, NodeSpec, OrganismType, ParameterTables};

    fn linear(threshold: f64) -> impl FnMut(f64) -> TrophicResult<f64> {
        move |m| Ok(threshold - m)
    }

    #[test]
    fn converges_on_linear_crossing() {
        let result = bisect_stabilizing(linear(0.3), BisectionSettings::default()).expect("search");
        assert!(result.multiplier >= 0.3);
        assert!(result.multiplier - 0.3 <= 1e-6);
        assert!(result.metric < 0.0);
        assert!(result.iterations > 0);
    }

    #[test]
    fn stable_lower_bound_is_returned_directly() {
        let result = bisect_stabilizing(linear(-1.0), BisectionSettings::default()).expect("search");
        assert_eq!(result.multiplier, 0.0);
        assert_eq!(result.iterations, 0);
    }

    #[test]
    fn stable_zero_upper_bound_is_not_a_failure() {
        let settings = BisectionSettings {
            lower_bound: 0.0,
            upper_bound: 0.0,
            ..BisectionSettings::default()
        };
        let result = bisect_stabilizing(linear(-0.5), settings).expect("search");
        assert_eq!(result.multiplier, 0.0);
    }

    #[test]
    fn unstable_upper_bound_is_reported() {
        let err = bisect_stabilizing(linear(2.0), BisectionSettings::default()).expect_err("error");
        assert_eq!(
            err,
            TrophicError::StabilityBoundExhausted(BoundExhaustion::UpperBoundUnstable {
                upper_bound: 1.0,
                metric: 1.0,
            })
        );

        // A metric of exactly zero is not stable.
        let err = bisect_stabilizing(linear(1.0), BisectionSettings::default()).expect_err("error");
        assert!(matches!(err, TrophicError::StabilityBoundExhausted(_)));
    }

    #[test]
    fn iteration_budget_is_reported() {
        let settings = BisectionSettings {
            tolerance: 1e-12,
            max_iterations: 4,
            ..BisectionSettings::default()
        };
        let err = bisect_stabilizing(linear(0.3), settings).expect_err("error");
        match err {
            TrophicError::StabilityBoundExhausted(BoundExhaustion::IterationBudget {
                iterations,
                bracket,
            }) => {
                assert_eq!(iterations, 4);
                assert!(bracket.0 < 0.3 && 0.3 < bracket.1);
                assert!((bracket.1 - bracket.0 - 1.0 / 16.0).abs() < 1e-15);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn rejects_invalid_settings() {
        let cases = [
            BisectionSettings {
                lower_bound: 2.0,
                ..BisectionSettings::default()
            },
            BisectionSettings {
                tolerance: 0.0,
                ..BisectionSettings::default()
            },
            BisectionSettings {
                max_iterations: 0,
                ..BisectionSettings::default()
            },
            BisectionSettings {
                upper_bound: f64::INFINITY,
                ..BisectionSettings::default()
            },
        ];
        for settings in cases {
            let err = bisect_stabilizing(linear(0.3), settings).expect_err("error");
            assert!(matches!(err, TrophicError::InvalidParameter(_)), "{settings:?}");
        }
    }

    #[test]
    fn flux_errors_stop_the_search() {
        let network = NetworkModel::new(
            vec![
                NodeSpec::new("moss", 1.0, 0.0, OrganismType::Plant, MetabolicType::Invertebrate)
                    .with_loss_rate(0.0)
                    .with_efficiency(1.0),
                NodeSpec::new("mite", 1.0, 2.0, OrganismType::Animal, MetabolicType::Invertebrate)
                    .with_loss_rate(1.0)
                    .with_efficiency(0.5),
            ],
            vec![EdgeSpec::new("moss", "mite")],
            &ParameterTables::default(),
        )
        .expect("network");
        let err = find_stabilizing_multiplier(
            &network,
            &FluxSettings::default(),
            Normalization::Pred,
            BisectionSettings::default(),
        )
        .expect_err("error");
        assert_eq!(
            err,
            TrophicError::UnderdeterminedDemand {
                consumer: "mite".to_string()
            }
        );
    }

    #[test]
    fn metric_errors_propagate_unchanged() {
        let err = bisect_stabilizing(
            |_| {
                Err(TrophicError::NonConvergentEigensolve(
                    "stalled".to_string(),
                ))
            },
            BisectionSettings::default(),
        )
        .expect_err("error");
        assert_eq!(err, TrophicError::NonConvergentEigensolve("stalled".to_string()));
    }
}
