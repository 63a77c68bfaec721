//! Ecosystem-level function indices aggregated from a flux matrix.

use crate::error::{TrophicError, TrophicResult};
use crate::flux::FluxMatrix;
use crate::network::{NetworkModel, OrganismType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FunctionIndices {
    pub herbivory: f64,
    pub carnivory: f64,
    pub total: f64,
}

/// Function indices split by the organism type of the resource.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct OrganismFunctions {
    pub herbivory: f64,
    pub carnivory: f64,
    pub detritivory: f64,
    pub total: f64,
}

/// Aggregates fluxes using the matrix alone: a node whose column sums to
/// zero is basal, and flux leaving it counts as herbivory.
pub fn aggregate_functions(flux: &FluxMatrix) -> FunctionIndices {
    let mut indices = FunctionIndices::default();
    for node in 0..flux.dimension() {
        let outflow = flux.outflow(node);
        if flux.inflow(node) == 0.0 {
            indices.herbivory += outflow;
        } else {
            indices.carnivory += outflow;
        }
    }
    indices.total = flux.total();
    indices
}

/// Aggregates fluxes by what is being eaten: plants feed herbivory,
/// detritus feeds detritivory, animals feed carnivory.
pub fn aggregate_by_organism(
    flux: &FluxMatrix,
    network: &NetworkModel,
) -> TrophicResult<OrganismFunctions> {
    let same_nodes = flux.dimension() == network.len()
        && flux
            .ids()
            .iter()
            .zip(network.nodes())
            .all(|(id, node)| *id == node.id);
    if !same_nodes {
        return Err(TrophicError::InvalidParameter(
            "flux matrix nodes do not match the network".to_string(),
        ));
    }

    let mut functions = OrganismFunctions::default();
    for (idx, node) in network.nodes().iter().enumerate() {
        let outflow = flux.outflow(idx);
        match node.organism_type {
            OrganismType::Plant => functions.herbivory += outflow,
            OrganismType::Animal => functions.carnivory += outflow,
            OrganismType::Detritus => functions.detritivory += outflow,
        }
    }
    functions.total = flux.total();
    Ok(functions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flux::{resolve_fluxes, FluxSettings};
    use crate::network::{EdgeSpec, MetabolicType, NodeSpec, ParameterTables};

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn basal_outflow_is_herbivory() {
        // grass -> hare -> fox, grass -> fox
        let flux = FluxMatrix::from_row_major(
            ids(&["grass", "hare", "fox"]),
            vec![0.0, 5.0, 1.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0],
        )
        .expect("matrix");
        let indices = aggregate_functions(&flux);
        assert_eq!(indices.herbivory, 6.0);
        assert_eq!(indices.carnivory, 2.0);
        assert_eq!(indices.total, 8.0);
    }

    #[test]
    fn empty_matrix_has_zero_functions() {
        let flux = FluxMatrix::from_row_major(Vec::new(), Vec::new()).expect("matrix");
        assert_eq!(aggregate_functions(&flux), FunctionIndices::default());
    }

    #[test]
    fn organism_split_separates_detritivory() {
        let tables = ParameterTables::default();
        let network = NetworkModel::new(
            vec![
                NodeSpec::new("leaf", 1.0, 10.0, OrganismType::Plant, MetabolicType::Invertebrate),
                NodeSpec::new(
                    "litter",
                    1.0,
                    30.0,
                    OrganismType::Detritus,
                    MetabolicType::Invertebrate,
                ),
                NodeSpec::new("woodlouse", 1.0, 2.0, OrganismType::Animal, MetabolicType::Invertebrate)
                    .with_loss_rate(1.0)
                    .with_efficiency(0.5),
                NodeSpec::new("shrew", 1.0, 1.0, OrganismType::Animal, MetabolicType::EndothermVertebrate)
                    .with_loss_rate(3.0)
                    .with_efficiency(1.0),
            ],
            vec![
                EdgeSpec::new("leaf", "woodlouse"),
                EdgeSpec::new("litter", "woodlouse"),
                EdgeSpec::new("woodlouse", "shrew"),
            ],
            &tables,
        )
        .expect("network");
        let flux = resolve_fluxes(&network, &FluxSettings::default()).expect("flux");
        let functions = aggregate_by_organism(&flux, &network).expect("functions");

        assert!((functions.herbivory - 1.0).abs() < 1e-12);
        assert!((functions.detritivory - 3.0).abs() < 1e-12);
        assert!((functions.carnivory - 3.0).abs() < 1e-12);
        assert!((functions.total - 7.0).abs() < 1e-12);
    }

    #[test]
    fn organism_split_rejects_foreign_matrix() {
        let network = NetworkModel::new(
            vec![NodeSpec::new("a", 1.0, 1.0, OrganismType::Plant, MetabolicType::Invertebrate)],
            Vec::new(),
            &ParameterTables::default(),
        )
        .expect("network");
        let flux = FluxMatrix::from_row_major(ids(&["b"]), vec![0.0]).expect("matrix");
        assert!(aggregate_by_organism(&flux, &network).is_err());
    }
}
