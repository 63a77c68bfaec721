//! Food-web wrapper exposed to JavaScript.

use anyhow::{Context, Result};
use serde_wasm_bindgen::from_value;
use trophic_core::{
    EfficiencyLevel, FluxSettings, LossBasis, NetworkDescription, NetworkModel, ParameterTables,
    PreyWeighting,
};
use wasm_bindgen::prelude::*;

#[wasm_bindgen]
pub struct WasmFoodWeb {
    pub(crate) network: NetworkModel,
    pub(crate) flux_settings: FluxSettings,
}

pub(crate) fn build_network(
    description: NetworkDescription,
    tables: Option<ParameterTables>,
) -> Result<NetworkModel> {
    let tables = tables.unwrap_or_default();
    NetworkModel::from_description(description, &tables).context("Failed to build food web")
}

pub(crate) fn build_flux_settings(
    efficiency_level: &str,
    preference_only: bool,
    total_losses: bool,
) -> Result<FluxSettings> {
    let efficiency_level: EfficiencyLevel = efficiency_level
        .parse()
        .context("Invalid efficiency level")?;
    Ok(FluxSettings {
        efficiency_level,
        prey_weighting: if preference_only {
            PreyWeighting::PreferenceOnly
        } else {
            PreyWeighting::PreferenceTimesBiomass
        },
        loss_basis: if total_losses {
            LossBasis::Total
        } else {
            LossBasis::PerUnitBiomass
        },
    })
}

pub(crate) fn js_error(err: anyhow::Error) -> JsValue {
    JsValue::from_str(&format!("{err:#}"))
}

#[wasm_bindgen]
impl WasmFoodWeb {
    /// `tables` may be `undefined` or `null` to use the default parameter tables.
    #[wasm_bindgen(constructor)]
    pub fn new(
        description: JsValue,
        tables: JsValue,
        efficiency_level: &str,
        preference_only: bool,
        total_losses: bool,
    ) -> Result<WasmFoodWeb, JsValue> {
        console_error_panic_hook::set_once();

        let description: NetworkDescription = from_value(description)
            .map_err(|e| JsValue::from_str(&format!("Invalid network description: {}", e)))?;
        let tables: Option<ParameterTables> = if tables.is_undefined() || tables.is_null() {
            None
        } else {
            Some(
                from_value(tables)
                    .map_err(|e| JsValue::from_str(&format!("Invalid parameter tables: {}", e)))?,
            )
        };

        let network = build_network(description, tables).map_err(js_error)?;
        let flux_settings = build_flux_settings(efficiency_level, preference_only, total_losses)
            .map_err(js_error)?;

        Ok(WasmFoodWeb {
            network,
            flux_settings,
        })
    }

    pub fn node_ids(&self) -> Vec<String> {
        self.network.node_ids()
    }

    pub fn node_count(&self) -> usize {
        self.network.len()
    }
}
