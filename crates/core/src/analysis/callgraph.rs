//! Call-graph construction.
//!
//! Each function is resolved at most once: its immediate callee list is
//! computed and fixed *before* any callee is visited, which is what makes
//! recursive and mutually recursive chains terminate.

use log::warn;

use crate::analysis::disasm::CallTarget;
use crate::dump::{DumpError, DumpSource};
use crate::model::{Callee, FunctionId};
use crate::registry::Registry;

/// Resolve `root` and everything transitively reachable from it.
///
/// Functions whose dump is not loaded (e.g. after [`Registry::import`]) get it
/// from `source`. A dump that cannot be produced turns the function into a
/// leaf; only I/O failures are returned.
pub fn build(
    registry: &mut Registry,
    source: &mut dyn DumpSource,
    root: FunctionId,
) -> Result<(), DumpError> {
    let mut stack = vec![root];

    while let Some(id) = stack.pop() {
        if registry.get(id).is_resolved() {
            continue;
        }

        let dump = match registry.get(id).dump() {
            Some(dump) => Some(dump.clone()),
            None => {
                let path = registry.get(id).defining_path().to_path_buf();
                match source.load(&path) {
                    Ok(dump) => {
                        registry.attach_dump(id, dump.clone());
                        Some(dump)
                    }
                    Err(err) if err.is_recoverable() => {
                        warn!("{} stays a leaf: {err}", registry.get(id).name());
                        None
                    }
                    Err(err) => return Err(err),
                }
            }
        };

        let children: Vec<Callee> = match &dump {
            Some(dump) => dump
                .call_targets(registry.get(id).name())
                .into_iter()
                .map(|target| match target {
                    CallTarget::Symbol(name) => {
                        Callee::Function(registry.resolve_symbol(&name, dump))
                    }
                    CallTarget::Unresolved(text) => Callee::Unresolved(text),
                })
                .collect(),
            None => Vec::new(),
        };

        registry.set_children(id, children);

        // Reverse so the first callee is expanded first.
        for child in registry.get(id).children().iter().rev() {
            if let Callee::Function(child) = child {
                if !registry.get(*child).is_resolved() {
                    stack.push(*child);
                }
            }
        }
    }

    Ok(())
}
