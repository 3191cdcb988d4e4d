//! drvgraph-core
//!
//! Core library for static call-graph analysis of kernel driver object code.
//!
//! Given objdump output (symbol table plus disassembly) for the objects of a
//! build, this crate selects entry functions by name pattern, resolves every
//! function transitively reachable from them through direct calls, and renders
//! the result as plain-text call trees and function listings.
//!
//! All substantive logic lives here so it is fully testable and reusable from
//! multiple frontends; the `drvgraph` CLI is a thin wrapper.

pub mod analysis;
pub mod config;
pub mod dump;
pub mod model;
pub mod registry;
pub mod services;

/// Returns the library version as encoded at compile time.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
