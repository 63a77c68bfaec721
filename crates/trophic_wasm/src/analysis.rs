//! Flux, function, stability and multiplier-search entry points.

use crate::web::{js_error, WasmFoodWeb};
use anyhow::{Context, Result};
use js_sys::Float64Array;
use serde::Serialize;
use serde_wasm_bindgen::to_value;
use trophic_core::{
    aggregate_by_organism, aggregate_functions, find_stabilizing_multiplier, resolve_fluxes,
    stability_report, BisectionSettings, FluxSettings, FunctionIndices, JacobianSettings,
    MultiplierSearch, NetworkModel, Normalization, OrganismFunctions, StabilityReport,
};
use wasm_bindgen::prelude::*;

#[derive(Debug, Serialize)]
pub(crate) struct FunctionSummary {
    pub(crate) basal: FunctionIndices,
    pub(crate) by_organism: OrganismFunctions,
}

pub(crate) fn functions_for(network: &NetworkModel, settings: &FluxSettings) -> Result<FunctionSummary> {
    let flux = resolve_fluxes(network, settings).context("Flux resolution failed")?;
    let by_organism = aggregate_by_organism(&flux, network)?;
    Ok(FunctionSummary {
        basal: aggregate_functions(&flux),
        by_organism,
    })
}

pub(crate) fn stability_for(
    network: &NetworkModel,
    settings: &FluxSettings,
    normalization: &str,
    self_regulation: f64,
) -> Result<StabilityReport> {
    let normalization: Normalization = normalization.parse().context("Invalid normalization")?;
    let flux = resolve_fluxes(network, settings).context("Flux resolution failed")?;
    let jacobian = JacobianSettings::new(normalization)
        .with_efficiency_level(settings.efficiency_level)
        .with_self_regulation(self_regulation);
    stability_report(
        &flux,
        &network.biomasses(),
        &network.loss_rates(),
        &network.efficiencies(),
        &network.growth_rates(),
        &jacobian,
    )
    .context("Stability evaluation failed")
}

pub(crate) fn multiplier_for(
    network: &NetworkModel,
    settings: &FluxSettings,
    normalization: &str,
    bisection: BisectionSettings,
) -> Result<MultiplierSearch> {
    let normalization: Normalization = normalization.parse().context("Invalid normalization")?;
    find_stabilizing_multiplier(network, settings, normalization, bisection)
        .context("Stabilizing multiplier search failed")
}

#[wasm_bindgen]
impl WasmFoodWeb {
    /// Serialized flux matrix with node ids and row-major values.
    pub fn compute_fluxes(&self) -> Result<JsValue, JsValue> {
        let flux = resolve_fluxes(&self.network, &self.flux_settings)
            .map_err(|e| JsValue::from_str(&format!("Flux resolution failed: {}", e)))?;
        to_value(&flux).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    /// Row-major flux values only, for plotting without deserialization.
    pub fn flux_values(&self) -> Result<Float64Array, JsValue> {
        let flux = resolve_fluxes(&self.network, &self.flux_settings)
            .map_err(|e| JsValue::from_str(&format!("Flux resolution failed: {}", e)))?;
        Ok(Float64Array::from(flux.as_slice()))
    }

    pub fn compute_functions(&self) -> Result<JsValue, JsValue> {
        let summary = functions_for(&self.network, &self.flux_settings).map_err(js_error)?;
        to_value(&summary).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    pub fn compute_stability(
        &self,
        normalization: &str,
        self_regulation: f64,
    ) -> Result<JsValue, JsValue> {
        let report = stability_for(
            &self.network,
            &self.flux_settings,
            normalization,
            self_regulation,
        )
        .map_err(js_error)?;
        to_value(&report).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    pub fn find_stabilizing_multiplier(
        &self,
        normalization: &str,
        lower_bound: f64,
        upper_bound: f64,
        tolerance: f64,
        max_iterations: u32,
    ) -> Result<JsValue, JsValue> {
        let bisection = BisectionSettings {
            lower_bound,
            upper_bound,
            tolerance,
            max_iterations: max_iterations as usize,
        };
        let search = multiplier_for(&self.network, &self.flux_settings, normalization, bisection)
            .map_err(js_error)?;
        to_value(&search).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web::build_network;
    use trophic_core::{EdgeSpec, MetabolicType, NetworkDescription, NodeSpec, OrganismType};

    fn grazing_pair() -> NetworkModel {
        let description = NetworkDescription {
            nodes: vec![
                NodeSpec::new("alga", 1.0, 100.0, OrganismType::Plant, MetabolicType::Invertebrate)
                    .with_loss_rate(0.0)
                    .with_efficiency(1.0)
                    .with_growth_rate(0.2),
                NodeSpec::new("grazer", 1.0, 10.0, OrganismType::Animal, MetabolicType::Invertebrate)
                    .with_loss_rate(2.0)
                    .with_efficiency(0.5),
            ],
            edges: vec![EdgeSpec::new("alga", "grazer")],
        };
        build_network(description, None).expect("network")
    }

    #[test]
    fn functions_split_plant_flux_into_herbivory() {
        let summary = functions_for(&grazing_pair(), &FluxSettings::default()).expect("summary");
        assert!((summary.basal.herbivory - 40.0).abs() < 1e-12);
        assert!((summary.by_organism.herbivory - 40.0).abs() < 1e-12);
        assert_eq!(summary.by_organism.carnivory, 0.0);
    }

    #[test]
    fn stability_rejects_unknown_normalization() {
        let err = stability_for(&grazing_pair(), &FluxSettings::default(), "biomass", 1.0)
            .expect_err("expected error");
        assert!(format!("{err:#}").contains("Invalid normalization"));
    }

    #[test]
    fn stability_report_marks_unregulated_pair_unstable() {
        let report = stability_for(&grazing_pair(), &FluxSettings::default(), "pred", 0.0)
            .expect("report");
        assert!(!report.stable);
        assert!((report.metric - 0.1).abs() < 1e-9);
        assert_eq!(report.jacobian.len(), 4);
    }

    #[test]
    fn multiplier_search_reports_exhaustion_with_context() {
        let bisection = BisectionSettings {
            upper_bound: 0.05,
            ..BisectionSettings::default()
        };
        let err = multiplier_for(&grazing_pair(), &FluxSettings::default(), "pred", bisection)
            .expect_err("expected error");
        let message = format!("{err:#}");
        assert!(message.contains("Stabilizing multiplier search failed"));
        assert!(message.contains("stability bound exhausted"));
    }
}
