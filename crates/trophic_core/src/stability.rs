//! Local stability of the flux equilibrium.
//!
//! The community Jacobian is assembled from resolved fluxes:
//!
//! - each feeding link `j -> i` with flux `F` contributes a per-unit
//!   interaction strength `alpha = F / B`, where `B` is the predator's or the
//!   prey's biomass depending on [`Normalization`];
//! - the predator gains `e * alpha` (`J[i][j]`) and the prey loses `alpha`
//!   (`J[j][i]`);
//! - nodes with a growth rate `r` carry the logistic self-limitation term
//!   `outflow / B - r` on the diagonal;
//! - every node carries `-m * loss_rate` on the diagonal, where `m` is the
//!   self-regulation multiplier.
//!
//! The stability metric is the largest real part of the Jacobian's
//! eigenvalues. Negative means locally asymptotically stable.

use crate::error::{TrophicError, TrophicResult};
use crate::flux::{EfficiencyLevel, FluxMatrix};
use crate::network::NetworkModel;
use nalgebra::DMatrix;
use num_complex::Complex;
use serde::{Deserialize, Serialize};

const SCHUR_MAX_ITERATIONS: usize = 10_000;

/// Which biomass converts a flux into a per-unit interaction strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Normalization {
    Pred,
    Prey,
}

impl std::str::FromStr for Normalization {
    type Err = TrophicError;

    fn from_str(s: &str) -> TrophicResult<Self> {
        match s {
            "pred" => Ok(Normalization::Pred),
            "prey" => Ok(Normalization::Prey),
            other => Err(TrophicError::InvalidParameter(format!(
                "unknown normalization '{other}' (expected 'pred' or 'prey')"
            ))),
        }
    }
}

/// Settings for assembling the Jacobian. The normalization has no default
/// and must always be chosen by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JacobianSettings {
    pub normalization: Normalization,
    pub efficiency_level: EfficiencyLevel,
    pub self_regulation: f64,
}

impl JacobianSettings {
    pub fn new(normalization: Normalization) -> Self {
        Self {
            normalization,
            efficiency_level: EfficiencyLevel::Predator,
            self_regulation: 1.0,
        }
    }

    pub fn with_efficiency_level(mut self, level: EfficiencyLevel) -> Self {
        self.efficiency_level = level;
        self
    }

    pub fn with_self_regulation(mut self, multiplier: f64) -> Self {
        self.self_regulation = multiplier;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StabilityReport {
    pub metric: f64,
    pub stable: bool,
    /// Row-major community Jacobian.
    pub jacobian: Vec<f64>,
    pub eigenvalues: Vec<Complex<f64>>,
}

pub fn community_jacobian(
    flux: &FluxMatrix,
    biomass: &[f64],
    loss_rate: &[f64],
    efficiency: &[f64],
    growth_rate: &[Option<f64>],
    settings: &JacobianSettings,
) -> TrophicResult<DMatrix<f64>> {
    let dim = flux.dimension();
    check_length("biomass", biomass.len(), dim)?;
    check_length("loss rate", loss_rate.len(), dim)?;
    check_length("efficiency", efficiency.len(), dim)?;
    check_length("growth rate", growth_rate.len(), dim)?;
    if !settings.self_regulation.is_finite() {
        return Err(TrophicError::InvalidParameter(format!(
            "self-regulation multiplier must be finite, got {}",
            settings.self_regulation
        )));
    }

    let mut jacobian = DMatrix::zeros(dim, dim);

    for prey in 0..dim {
        for predator in 0..dim {
            let f = flux.get(prey, predator);
            if f == 0.0 {
                continue;
            }
            let scale = match settings.normalization {
                Normalization::Pred => predator,
                Normalization::Prey => prey,
            };
            let alpha = per_unit(f, biomass[scale], &flux.ids()[scale])?;
            let e = match settings.efficiency_level {
                EfficiencyLevel::Predator => efficiency[predator],
                EfficiencyLevel::Prey => efficiency[prey],
            };
            jacobian[(predator, prey)] += e * alpha;
            jacobian[(prey, predator)] -= alpha;
        }
    }

    for i in 0..dim {
        if let Some(r) = growth_rate[i] {
            let mortality = per_unit(flux.outflow(i), biomass[i], &flux.ids()[i])?;
            jacobian[(i, i)] += mortality - r;
        }
        jacobian[(i, i)] -= settings.self_regulation * loss_rate[i];
    }

    Ok(jacobian)
}

/// Largest real part of the community Jacobian's eigenvalues.
pub fn stability_value(
    flux: &FluxMatrix,
    biomass: &[f64],
    loss_rate: &[f64],
    efficiency: &[f64],
    growth_rate: &[Option<f64>],
    settings: &JacobianSettings,
) -> TrophicResult<f64> {
    let jacobian = community_jacobian(flux, biomass, loss_rate, efficiency, growth_rate, settings)?;
    let eigenvalues = eigenvalues(jacobian)?;
    Ok(dominant_real_part(&eigenvalues))
}

pub fn stability_report(
    flux: &FluxMatrix,
    biomass: &[f64],
    loss_rate: &[f64],
    efficiency: &[f64],
    growth_rate: &[Option<f64>],
    settings: &JacobianSettings,
) -> TrophicResult<StabilityReport> {
    let jacobian = community_jacobian(flux, biomass, loss_rate, efficiency, growth_rate, settings)?;
    let dim = jacobian.nrows();
    let mut row_major = Vec::with_capacity(dim * dim);
    for i in 0..dim {
        for j in 0..dim {
            row_major.push(jacobian[(i, j)]);
        }
    }
    let eigenvalues = eigenvalues(jacobian)?;
    let metric = dominant_real_part(&eigenvalues);
    Ok(StabilityReport {
        metric,
        stable: metric < 0.0,
        jacobian: row_major,
        eigenvalues,
    })
}

/// [`stability_value`] with per-node parameters taken from `network`.
pub fn network_stability(
    network: &NetworkModel,
    flux: &FluxMatrix,
    settings: &JacobianSettings,
) -> TrophicResult<f64> {
    stability_value(
        flux,
        &network.biomasses(),
        &network.loss_rates(),
        &network.efficiencies(),
        &network.growth_rates(),
        settings,
    )
}

fn eigenvalues(jacobian: DMatrix<f64>) -> TrophicResult<Vec<Complex<f64>>> {
    if jacobian.nrows() == 0 {
        return Err(TrophicError::InvalidParameter(
            "cannot evaluate stability of an empty network".to_string(),
        ));
    }
    if jacobian.iter().any(|v| !v.is_finite()) {
        return Err(TrophicError::NonConvergentEigensolve(
            "Jacobian contains non-finite entries".to_string(),
        ));
    }
    let schur = jacobian
        .try_schur(f64::EPSILON, SCHUR_MAX_ITERATIONS)
        .ok_or_else(|| {
            TrophicError::NonConvergentEigensolve(format!(
                "Schur decomposition exceeded {SCHUR_MAX_ITERATIONS} iterations"
            ))
        })?;
    let values: Vec<Complex<f64>> = schur.complex_eigenvalues().iter().copied().collect();
    if values.iter().any(|v| !v.re.is_finite() || !v.im.is_finite()) {
        return Err(TrophicError::NonConvergentEigensolve(
            "eigenvalues are not finite".to_string(),
        ));
    }
    Ok(values)
}

fn dominant_real_part(eigenvalues: &[Complex<f64>]) -> f64 {
    eigenvalues
        .iter()
        .map(|v| v.re)
        .fold(f64::NEG_INFINITY, f64::max)
}

fn per_unit(flux: f64, biomass: f64, id: &str) -> TrophicResult<f64> {
    if flux == 0.0 {
        return Ok(0.0);
    }
    if biomass <= 0.0 || biomass.is_nan() {
        return Err(TrophicError::InvalidParameter(format!(
            "cannot normalize flux by the zero biomass of '{id}'"
        )));
    }
    Ok(flux / biomass)
}

fn check_length(what: &str, actual: usize, expected: usize) -> TrophicResult<()> {
    if actual != expected {
        return Err(TrophicError::InvalidParameter(format!(
            "{what} vector has {actual} entries, expected {expected}"
        )));
    }
    Ok(())
}
