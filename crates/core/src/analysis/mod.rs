//! Text grammars and graph algorithms.
//!
//! - `symtab`: objdump symbol-table lines.
//! - `disasm`: disassembly lines, call-site scanning, entry matching.
//! - `callgraph`: memoized, cycle-safe callee resolution.
//! - `report`: call-tree and listing renderers.

pub mod callgraph;
pub mod disasm;
pub mod report;
pub mod symtab;
