//! WASM bridge exposing the `trophic_core` engine to JavaScript tooling.

mod analysis;
mod web;

pub use web::WasmFoodWeb;
