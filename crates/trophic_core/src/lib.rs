//! The `trophic_core` crate resolves steady-state energy fluxes on food webs
//! and analyses the local stability of the resulting equilibrium.
//!
//! Key components:
//! - **Network**: `NetworkModel`, validated nodes and feeding links with
//!   parameter tables for allometric losses and assimilation efficiencies.
//! - **Flux**: `resolve_fluxes`, per-consumer mass balance into a `FluxMatrix`.
//! - **Functions**: herbivory, carnivory and total throughput indices.
//! - **Stability**: community Jacobian and its dominant eigenvalue.
//! - **Search**: bisection for the smallest stabilizing self-regulation multiplier.
pub mod error;
pub mod flux;
pub mod functions;
pub mod network;
pub mod search;
pub mod stability;

pub use error::{BoundExhaustion, TrophicError, TrophicResult};
pub use flux::{
    resolve_fluxes, EfficiencyLevel, FluxMatrix, FluxSettings, LossBasis, PreyWeighting,
};
pub use functions::{
    aggregate_by_organism, aggregate_functions, FunctionIndices, OrganismFunctions,
};
pub use network::{
    AllometricCoefficients, EdgeSpec, MetabolicType, NetworkDescription, NetworkModel, NodeId,
    NodeSpec, OrganismType, ParameterTables,
};
pub use search::{
    bisect_stabilizing, find_stabilizing_multiplier, BisectionSettings, MultiplierSearch,
};
pub use stability::{
    community_jacobian, network_stability, stability_report, stability_value, JacobianSettings,
    Normalization, StabilityReport,
};
