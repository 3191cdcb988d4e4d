//! Core data model: functions, the roles they play, and call-graph edges.
//!
//! Functions live in an arena owned by [`crate::registry::Registry`] and refer
//! to each other through [`FunctionId`] handles, so recursive and mutually
//! recursive call chains never need nested ownership.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::dump::ObjectDump;

/// Stable handle for a function owned by a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId(pub(crate) usize);

/// Role a function plays in an analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    /// Global (or unique global) function definition, pre-registered build-wide.
    Global,
    /// Selected by the entry pattern; a call-graph root.
    Entry,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Global => "global",
            Role::Entry => "entry",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Namespace a function name is resolved in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scope {
    /// Build-wide global definition.
    Global,
    /// Definition bound to one object file: statics, and definitions that are
    /// not build-wide globals (e.g. weak).
    Local(PathBuf),
    /// Referenced from this object file, but neither defined there nor known
    /// as a global.
    External(PathBuf),
}

/// Identity of a function inside a registry.
///
/// Global functions are keyed by name alone. Everything else carries the path
/// of the object it was found through, so two statics sharing a name stay
/// distinct and an undefined reference never shadows a real definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionKey {
    pub name: String,
    pub scope: Scope,
}

impl FunctionKey {
    pub fn global(name: impl Into<String>) -> Self {
        Self { name: name.into(), scope: Scope::Global }
    }

    pub fn local(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self { name: name.into(), scope: Scope::Local(path.into()) }
    }

    pub fn external(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self { name: name.into(), scope: Scope::External(path.into()) }
    }

    pub fn is_global(&self) -> bool {
        self.scope == Scope::Global
    }

    pub fn is_local(&self) -> bool {
        matches!(self.scope, Scope::Local(_))
    }
}

/// Outgoing edge of a resolved function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Callee {
    Function(FunctionId),
    /// Call site whose target could not be mapped to a symbol, e.g. `blx r3`.
    Unresolved(String),
}

/// A function discovered during analysis.
///
/// The body is never copied out of the dump; it is sliced from the shared
/// [`ObjectDump`] on demand.
#[derive(Debug, Clone)]
pub struct Function {
    key: FunctionKey,
    defining_path: PathBuf,
    dump: Option<Arc<ObjectDump>>,
    roles: BTreeSet<Role>,
    children: Option<Vec<Callee>>,
}

impl Function {
    pub(crate) fn new(
        key: FunctionKey,
        defining_path: PathBuf,
        dump: Option<Arc<ObjectDump>>,
    ) -> Self {
        Self { key, defining_path, dump, roles: BTreeSet::new(), children: None }
    }

    pub fn name(&self) -> &str {
        &self.key.name
    }

    pub fn key(&self) -> &FunctionKey {
        &self.key
    }

    /// Object file defining this function; for an external placeholder, the
    /// object that referenced it.
    pub fn defining_path(&self) -> &Path {
        &self.defining_path
    }

    pub fn is_local(&self) -> bool {
        self.key.is_local()
    }

    pub fn dump(&self) -> Option<&Arc<ObjectDump>> {
        self.dump.as_ref()
    }

    pub fn roles(&self) -> &BTreeSet<Role> {
        &self.roles
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// Space-separated role list, e.g. `global entry`.
    pub fn roles_display(&self) -> String {
        self.roles.iter().map(Role::as_str).collect::<Vec<_>>().join(" ")
    }

    pub fn is_resolved(&self) -> bool {
        self.children.is_some()
    }

    /// Immediate callees; empty until the function has been resolved.
    pub fn children(&self) -> &[Callee] {
        self.children.as_deref().unwrap_or(&[])
    }

    pub(crate) fn add_role(&mut self, role: Role) -> bool {
        self.roles.insert(role)
    }

    pub(crate) fn attach_dump(&mut self, dump: Arc<ObjectDump>) {
        if self.dump.is_none() {
            self.dump = Some(dump);
        }
    }

    /// Fix the callee list. Returns `false` (and leaves the list untouched)
    /// if it was already set.
    pub(crate) fn set_children(&mut self, children: Vec<Callee>) -> bool {
        if self.children.is_some() {
            return false;
        }
        self.children = Some(children);
        true
    }
}
