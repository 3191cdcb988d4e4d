//! Function registry: the run-wide, de-duplicated store of discovered
//! functions, and its persisted `"<name> <defining_path>"` listing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;
use thiserror::Error;

use crate::dump::ObjectDump;
use crate::model::{Callee, Function, FunctionId, FunctionKey, Role};

/// Errors raised while reading a persisted listing.
#[derive(Debug, Error)]
pub enum ListingError {
    #[error("line {line}: expected `<name> <path>`, found {content:?}")]
    Malformed { line: usize, content: String },
}

/// Arena of functions keyed by [`FunctionKey`].
///
/// The registry only grows: functions are never removed, role tags only
/// accumulate, and a function's callee list is fixed once.
#[derive(Debug, Default)]
pub struct Registry {
    functions: Vec<Function>,
    index: HashMap<FunctionKey, FunctionId>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Borrow a function. `id` must come from this registry.
    pub fn get(&self, id: FunctionId) -> &Function {
        &self.functions[id.0]
    }

    pub fn lookup(&self, key: &FunctionKey) -> Option<FunctionId> {
        self.index.get(key).copied()
    }

    pub fn lookup_global(&self, name: &str) -> Option<FunctionId> {
        self.lookup(&FunctionKey::global(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = (FunctionId, &Function)> {
        self.functions.iter().enumerate().map(|(i, f)| (FunctionId(i), f))
    }

    /// Return the function registered under `key`, creating it anchored at
    /// `defining_path` (and backed by `dump`, when given) if absent.
    pub fn get_or_create(
        &mut self,
        key: FunctionKey,
        defining_path: impl Into<PathBuf>,
        dump: Option<Arc<ObjectDump>>,
    ) -> FunctionId {
        if let Some(id) = self.index.get(&key) {
            return *id;
        }
        let id = FunctionId(self.functions.len());
        self.functions.push(Function::new(key.clone(), defining_path.into(), dump));
        self.index.insert(key, id);
        id
    }

    /// Resolve a symbol referenced from `dump` to a function.
    ///
    /// A static function of the same object wins, then a registered global,
    /// then any other definition in the object itself (e.g. weak). A name the
    /// object does not define becomes an external placeholder scoped to the
    /// object, so it never hides a definition found through another object.
    pub fn resolve_symbol(&mut self, name: &str, dump: &Arc<ObjectDump>) -> FunctionId {
        if dump.defines_local(name) {
            let key = FunctionKey::local(name, dump.path());
            return self.get_or_create(key, dump.path(), Some(Arc::clone(dump)));
        }
        if let Some(id) = self.lookup_global(name) {
            return id;
        }
        let key = if dump.function_symbol(name).is_some() {
            FunctionKey::local(name, dump.path())
        } else {
            FunctionKey::external(name, dump.path())
        };
        self.get_or_create(key, dump.path(), Some(Arc::clone(dump)))
    }

    /// Register every global function defined by `dump`, tagged [`Role::Global`].
    /// Returns the number of newly registered functions.
    pub fn register_globals(&mut self, dump: &Arc<ObjectDump>) -> usize {
        let mut added = 0;
        for name in dump.global_functions() {
            let before = self.functions.len();
            let id = self.get_or_create(FunctionKey::global(name), dump.path(), Some(Arc::clone(dump)));
            if self.functions.len() > before {
                added += 1;
            } else if self.get(id).defining_path() != dump.path() {
                debug!(
                    "global {name} already registered from {}; ignoring {}",
                    self.get(id).defining_path().display(),
                    dump.path().display()
                );
            }
            self.tag(id, Role::Global);
        }
        added
    }

    /// Add `role` to a function. Idempotent; returns whether the tag is new.
    pub fn tag(&mut self, id: FunctionId, role: Role) -> bool {
        self.functions[id.0].add_role(role)
    }

    pub(crate) fn attach_dump(&mut self, id: FunctionId, dump: Arc<ObjectDump>) {
        self.functions[id.0].attach_dump(dump);
    }

    pub(crate) fn set_children(&mut self, id: FunctionId, children: Vec<Callee>) -> bool {
        self.functions[id.0].set_children(children)
    }

    pub fn sort_by_name(&self, ids: &mut [FunctionId]) {
        ids.sort_by(|a, b| {
            let (fa, fb) = (self.get(*a), self.get(*b));
            fa.name().cmp(fb.name()).then_with(|| fa.defining_path().cmp(fb.defining_path()))
        });
    }

    pub fn sort_by_path(&self, ids: &mut [FunctionId]) {
        ids.sort_by(|a, b| {
            let (fa, fb) = (self.get(*a), self.get(*b));
            fa.defining_path().cmp(fb.defining_path()).then_with(|| fa.name().cmp(fb.name()))
        });
    }

    /// Persisted listing of the build-wide global functions, one
    /// `"<name> <defining_path>"` line each, sorted by path then name.
    pub fn export(&self) -> String {
        let mut ids: Vec<FunctionId> =
            self.iter().filter(|(_, f)| f.key().is_global()).map(|(id, _)| id).collect();
        self.sort_by_path(&mut ids);
        let mut out = String::new();
        for id in ids {
            let f = self.get(id);
            out.push_str(&format!("{} {}\n", f.name(), f.defining_path().display()));
        }
        out
    }

    /// Rehydrate a registry from an [`export`](Self::export) listing.
    ///
    /// Every entry is tagged [`Role::Global`] and starts unresolved and without
    /// a dump; dumps are loaded on demand when the function is expanded.
    pub fn import(listing: &str) -> Result<Self, ListingError> {
        let mut registry = Registry::new();
        for (idx, line) in listing.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let Some((name, path)) = trimmed.split_once(' ') else {
                return Err(ListingError::Malformed { line: idx + 1, content: line.to_string() });
            };
            let path = path.trim();
            if name.is_empty() || path.is_empty() {
                return Err(ListingError::Malformed { line: idx + 1, content: line.to_string() });
            }
            let id = registry.get_or_create(FunctionKey::global(name), Path::new(path), None);
            registry.tag(id, Role::Global);
        }
        Ok(registry)
    }
}
