//! Plain-text renderings: call trees, entry listings and function listings.

use std::collections::{BTreeSet, HashSet};
use std::io::{self, Write};

use crate::model::{Callee, FunctionId};
use crate::registry::Registry;

/// Indentation per tree depth level.
pub const INDENT: &str = "    ";

/// Line framing each entry's call-tree block.
pub const TREE_DELIMITER: &str = "______________________________________";

pub const ENTRY_LIST_HEADER: &str = "----------------entry func list----------------";
pub const ENTRY_LIST_FOOTER: &str = "-----------------------end---------------------";

/// Prefix of a call site that could not be resolved to a function.
pub const UNRESOLVED_MARKER: &str = "<unresolved>";

/// Functions reached while printing trees, de-duplicated across entries.
pub type Reachable = BTreeSet<FunctionId>;

enum Node<'a> {
    Function(FunctionId),
    Unresolved(&'a str),
}

/// Print the call tree rooted at `entry` depth-first.
///
/// The first visit of a function prints its name and role tags and expands its
/// callees one level deeper; later visits within the same tree print the name
/// only. Every function printed is added to `reached`.
pub fn print_tree<W: Write>(
    registry: &Registry,
    entry: FunctionId,
    out: &mut W,
    reached: &mut Reachable,
) -> io::Result<()> {
    let mut visited: HashSet<FunctionId> = HashSet::new();
    let mut stack: Vec<(Node<'_>, usize)> = vec![(Node::Function(entry), 0)];

    while let Some((node, depth)) = stack.pop() {
        let indent = INDENT.repeat(depth);
        let id = match node {
            Node::Unresolved(text) => {
                writeln!(out, "{indent}{UNRESOLVED_MARKER} {text}")?;
                continue;
            }
            Node::Function(id) => id,
        };

        let function = registry.get(id);
        reached.insert(id);
        if !visited.insert(id) {
            writeln!(out, "{indent}{}", function.name())?;
            continue;
        }

        if function.roles().is_empty() {
            writeln!(out, "{indent}{}", function.name())?;
        } else {
            writeln!(out, "{indent}{} [{}]", function.name(), function.roles_display())?;
        }

        for child in function.children().iter().rev() {
            let node = match child {
                Callee::Function(child) => Node::Function(*child),
                Callee::Unresolved(text) => Node::Unresolved(text),
            };
            stack.push((node, depth + 1));
        }
    }
    Ok(())
}

/// Write one framed entry block: header, call tree, closing delimiter.
pub fn write_entry_report<W: Write>(
    registry: &Registry,
    entry: FunctionId,
    out: &mut W,
    reached: &mut Reachable,
) -> io::Result<()> {
    let function = registry.get(entry);
    writeln!(out, "{TREE_DELIMITER}")?;
    writeln!(out, "entry function:")?;
    writeln!(out, "{}: {}", function.name(), function.roles_display())?;
    print_tree(registry, entry, out, reached)?;
    writeln!(out, "{TREE_DELIMITER}")
}

/// `"<name> <defining_path>"` lines for `ids`, in the given order.
pub fn write_function_list<W: Write>(
    registry: &Registry,
    ids: &[FunctionId],
    out: &mut W,
) -> io::Result<()> {
    for id in ids {
        let function = registry.get(*id);
        writeln!(out, "{} {}", function.name(), function.defining_path().display())?;
    }
    Ok(())
}

/// Delimited entry listing of a driver.
pub fn write_entry_list<W: Write>(
    registry: &Registry,
    entries: &[FunctionId],
    out: &mut W,
) -> io::Result<()> {
    writeln!(out, "{ENTRY_LIST_HEADER}")?;
    write_function_list(registry, entries, out)?;
    writeln!(out, "{ENTRY_LIST_FOOTER}")
}

/// Reached functions sorted by defining path, then name.
pub fn reachable_sorted(registry: &Registry, reached: &Reachable) -> Vec<FunctionId> {
    let mut ids: Vec<FunctionId> = reached.iter().copied().collect();
    registry.sort_by_path(&mut ids);
    ids
}
