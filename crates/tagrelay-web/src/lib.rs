//! tagrelay WebAssembly Frontend
//!
//! Browser composition root: implements the tracker capabilities with DOM,
//! `setTimeout`, `navigator.sendBeacon`, `fetch` and `localStorage`, and
//! exposes the tracker to JavaScript as `WebTracker`.

use wasm_bindgen::prelude::*;

mod app;
mod browser;
mod utils;

pub use app::*;
pub use browser::*;
pub use utils::*;

// Initialize WASM module
#[wasm_bindgen(start)]
pub fn main() {
    utils::set_panic_hook();

    // Set up tracing for WASM
    tracing_wasm::set_as_global_default();
}
