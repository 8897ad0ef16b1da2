//! Showroom Web - Browser and desktop front end
//!
//! Wraps the showroom scene in a Bevy app with a canvas window, egui tweak
//! panel and a reactive update loop. The same app runs natively through the
//! `showroom` binary.

pub mod app;
pub mod ui;

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

/// WASM entry point
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn main() {
    // Set up panic hook for better error messages
    console_error_panic_hook::set_once();

    // Initialize logging with filtering to reduce noise
    tracing_wasm::set_as_global_default_with_config(
        tracing_wasm::WASMLayerConfigBuilder::new()
            .set_max_level(tracing::Level::WARN)
            .build(),
    );

    app::run(showroom_core::DemoConfig::default());
}
