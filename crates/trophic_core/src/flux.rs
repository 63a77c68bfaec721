//! Steady-state flux resolution.
//!
//! Every consumer must take in enough energy to cover its metabolic losses.
//! Its demand is split across its prey in proportion to preference-weighted
//! prey biomass. Each consumer is handled on its own, so cycles in the web
//! need no iteration and the visiting order does not matter.

use crate::error::{TrophicError, TrophicResult};
use crate::network::{NetworkModel, NodeId};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// Which node's efficiency applies to a feeding link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EfficiencyLevel {
    /// Efficiency is a property of the consumer.
    #[default]
    #[serde(rename = "pred")]
    Predator,
    /// Efficiency is a property of the resource being eaten.
    #[serde(rename = "prey")]
    Prey,
}

impl std::str::FromStr for EfficiencyLevel {
    type Err = TrophicError;

    fn from_str(s: &str) -> TrophicResult<Self> {
        match s {
            "pred" => Ok(EfficiencyLevel::Predator),
            "prey" => Ok(EfficiencyLevel::Prey),
            other => Err(TrophicError::InvalidParameter(format!(
                "unknown efficiency level '{other}' (expected 'pred' or 'prey')"
            ))),
        }
    }
}

/// How a consumer's prey are weighted when its demand is split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PreyWeighting {
    /// `preference * prey biomass`.
    #[default]
    PreferenceTimesBiomass,
    /// `preference` alone.
    PreferenceOnly,
}

/// Whether loss rates are per unit of biomass or already population totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LossBasis {
    #[default]
    PerUnitBiomass,
    Total,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FluxSettings {
    pub efficiency_level: EfficiencyLevel,
    pub prey_weighting: PreyWeighting,
    pub loss_basis: LossBasis,
}

/// Dense node-indexed flux matrix, row = prey, column = predator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawFluxMatrix")]
pub struct FluxMatrix {
    ids: Vec<NodeId>,
    /// Row-major, `values[prey * n + predator]`.
    values: Vec<f64>,
}

/// Wire form of [`FluxMatrix`]; decoded matrices go through the same checks
/// as [`FluxMatrix::from_row_major`].
#[derive(Deserialize)]
struct RawFluxMatrix {
    ids: Vec<NodeId>,
    values: Vec<f64>,
}

impl TryFrom<RawFluxMatrix> for FluxMatrix {
    type Error = TrophicError;

    fn try_from(raw: RawFluxMatrix) -> TrophicResult<Self> {
        FluxMatrix::from_row_major(raw.ids, raw.values)
    }
}

impl FluxMatrix {
    /// Builds a matrix from row-major values, rejecting negative or
    /// non-finite entries.
    pub fn from_row_major(ids: Vec<NodeId>, values: Vec<f64>) -> TrophicResult<Self> {
        let dim = ids.len();
        if values.len() != dim * dim {
            return Err(TrophicError::InvalidParameter(format!(
                "flux matrix for {} nodes needs {} entries, got {}",
                dim,
                dim * dim,
                values.len()
            )));
        }
        if let Some(bad) = values.iter().find(|v| !v.is_finite() || **v < 0.0) {
            return Err(TrophicError::InvalidParameter(format!(
                "flux entries must be finite and non-negative, got {bad}"
            )));
        }
        Ok(Self { ids, values })
    }

    pub fn dimension(&self) -> usize {
        self.ids.len()
    }

    pub fn ids(&self) -> &[NodeId] {
        &self.ids
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn get(&self, prey: usize, predator: usize) -> f64 {
        self.values[prey * self.ids.len() + predator]
    }

    /// Looks up a flux by node ids; `None` if either id is unknown.
    pub fn flux(&self, prey: &str, predator: &str) -> Option<f64> {
        let prey = self.ids.iter().position(|id| id == prey)?;
        let predator = self.ids.iter().position(|id| id == predator)?;
        Some(self.get(prey, predator))
    }

    /// Total flux leaving `node` towards its consumers (row sum).
    pub fn outflow(&self, node: usize) -> f64 {
        let dim = self.ids.len();
        self.values[node * dim..(node + 1) * dim].iter().sum()
    }

    /// Total flux entering `node` from its resources (column sum).
    pub fn inflow(&self, node: usize) -> f64 {
        let dim = self.ids.len();
        (0..dim).map(|prey| self.values[prey * dim + node]).sum()
    }

    pub fn total(&self) -> f64 {
        self.values.iter().sum()
    }

    pub fn to_matrix(&self) -> DMatrix<f64> {
        let dim = self.ids.len();
        DMatrix::from_row_slice(dim, dim, &self.values)
    }
}

/// Resolves the steady-state flux matrix of `network`.
pub fn resolve_fluxes(network: &NetworkModel, settings: &FluxSettings) -> TrophicResult<FluxMatrix> {
    let dim = network.len();
    let nodes = network.nodes();
    let mut values = vec![0.0; dim * dim];
    let mut consumers = 0usize;

    for (consumer, node) in nodes.iter().enumerate() {
        if !network.is_consumer(consumer) {
            continue;
        }
        consumers += 1;

        let weights: Vec<(usize, f64)> = network
            .diet(consumer)
            .map(|edge| {
                let weight = match settings.prey_weighting {
                    PreyWeighting::PreferenceTimesBiomass => {
                        edge.preference * nodes[edge.prey].biomass
                    }
                    PreyWeighting::PreferenceOnly => edge.preference,
                };
                (edge.prey, weight)
            })
            .collect();
        let total_weight: f64 = weights.iter().map(|(_, w)| w).sum();
        if total_weight <= 0.0 {
            return Err(TrophicError::UnderdeterminedDemand {
                consumer: node.id.clone(),
            });
        }
        if !total_weight.is_finite() {
            return Err(TrophicError::InvalidParameter(format!(
                "weighted prey biomass of '{}' is not finite",
                node.id
            )));
        }

        let requirement = match settings.loss_basis {
            LossBasis::PerUnitBiomass => node.loss_rate * node.biomass,
            LossBasis::Total => node.loss_rate,
        };
        let assimilation = match settings.efficiency_level {
            EfficiencyLevel::Predator => node.efficiency,
            EfficiencyLevel::Prey => weights
                .iter()
                .map(|&(prey, w)| nodes[prey].efficiency * w / total_weight)
                .sum::<f64>(),
        };
        let demand = requirement / assimilation;

        for (prey, weight) in weights {
            values[prey * dim + consumer] = demand * (weight / total_weight);
        }
    }

    log::debug!(
        "resolved fluxes for {} consumers over {} nodes",
        consumers,
        dim
    );

    Ok(FluxMatrix {
        ids: network.node_ids(),
        values,
    })
}
