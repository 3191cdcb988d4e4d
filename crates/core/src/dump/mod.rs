//! Raw objdump output for one object file, split into its symbol-table and
//! disassembly sections, plus the [`DumpSource`] abstraction used to obtain
//! dumps by object path.

use std::collections::HashMap;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::analysis::disasm::{self, CallTarget, DisasmLine};
use crate::analysis::symtab::{self, Symbol};

/// Marker opening the symbol table in `objdump -t` output.
pub const SYMBOL_TABLE_MARKER: &str = "SYMBOL TABLE:";

/// Errors raised while obtaining or splitting a dump.
#[derive(Debug, Error)]
pub enum DumpError {
    /// The dump text lacks one of the section markers.
    #[error("{}: missing `{marker}` marker in dump", path.display())]
    MissingMarker { path: PathBuf, marker: &'static str },

    /// The path does not name an object (`.o`) file.
    #[error("Not an object file: {}", .0.display())]
    NotObject(PathBuf),

    /// Neither the object nor a cached dump exists.
    #[error("No dump available for {}", .0.display())]
    NotFound(PathBuf),

    /// The external disassembler could not be run or exited with an error.
    #[error("Disassembler failed for {}: {message}", path.display())]
    Tool { path: PathBuf, message: String },

    /// Reading or writing a dump file failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DumpError {
    /// Whether the batch may skip the affected object and carry on.
    ///
    /// Only I/O failures abort the work unit they occur in.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, DumpError::Io { .. })
    }
}

/// Parsed objdump output of one object file.
///
/// The raw text is kept once; symbol-table text, disassembly text and the
/// per-function bodies are ranges into it.
#[derive(Debug)]
pub struct ObjectDump {
    path: PathBuf,
    text: String,
    symtab: Range<usize>,
    disasm: Range<usize>,
    symbols: Vec<Symbol>,
    bodies: HashMap<String, Range<usize>>,
}

impl ObjectDump {
    /// Split raw `objdump -t -D` output for `path`.
    ///
    /// Fails with [`DumpError::MissingMarker`] unless the text contains
    /// `SYMBOL TABLE:` followed later by a `Disassembly of section <name>:` line.
    pub fn parse(path: impl Into<PathBuf>, text: impl Into<String>) -> Result<Self, DumpError> {
        let path = path.into();
        let text = text.into();

        let Some(symtab_start) = text.find(SYMBOL_TABLE_MARKER).map(|i| i + SYMBOL_TABLE_MARKER.len())
        else {
            return Err(DumpError::MissingMarker { path, marker: SYMBOL_TABLE_MARKER });
        };
        let Some((symtab_end, disasm_start)) = find_section_marker(&text, symtab_start) else {
            return Err(DumpError::MissingMarker { path, marker: disasm::SECTION_MARKER_PREFIX });
        };

        let symtab = symtab_start..symtab_end;
        let disasm = disasm_start..text.len();
        let symbols = symtab::parse_symbol_table(&text[symtab.clone()]);
        let bodies = index_bodies(&text, disasm.clone());

        Ok(Self { path, text, symtab, disasm, symbols, bodies })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn symbol_table_text(&self) -> &str {
        self.text[self.symtab.clone()].trim()
    }

    pub fn disassembly_text(&self) -> &str {
        self.text[self.disasm.clone()].trim()
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    /// Function symbol named `name`, if this object has one.
    pub fn function_symbol(&self, name: &str) -> Option<&Symbol> {
        self.symbols.iter().find(|s| s.is_function() && s.name == name)
    }

    /// Whether `name` is a static (local) function defined in this object.
    pub fn defines_local(&self, name: &str) -> bool {
        self.symbols.iter().any(|s| s.is_local_function() && s.name == name)
    }

    pub fn global_functions(&self) -> impl Iterator<Item = &str> {
        symtab::global_function_names(&self.symbols)
    }

    /// Disassembly lines of function `name`, without its header.
    pub fn function_body(&self, name: &str) -> Option<&str> {
        self.bodies.get(name).map(|range| &self.text[range.clone()])
    }

    /// Call targets of function `name`; empty if the function has no body here.
    pub fn call_targets(&self, name: &str) -> Vec<CallTarget> {
        match self.function_body(name) {
            Some(body) => disasm::extract_call_targets(body, name, &self.symbols),
            None => Vec::new(),
        }
    }
}

/// Locate the first section marker line at or after `from`.
///
/// Returns the byte offset of the line start and of the first byte after it.
fn find_section_marker(text: &str, from: usize) -> Option<(usize, usize)> {
    let mut offset = from;
    for line in text[from..].split_inclusive('\n') {
        let start = offset;
        offset += line.len();
        if line.starts_with(disasm::SECTION_MARKER_PREFIX) && line.trim_end().ends_with(':') {
            return Some((start, offset));
        }
    }
    None
}

/// Map every function header in `range` to the byte range of its body.
fn index_bodies(text: &str, range: Range<usize>) -> HashMap<String, Range<usize>> {
    let mut bodies = HashMap::new();
    let mut current: Option<(&str, usize)> = None;
    let mut offset = range.start;

    for line in text[range.clone()].split_inclusive('\n') {
        let start = offset;
        offset += line.len();
        match disasm::parse_line(line) {
            DisasmLine::Header { name, .. } => {
                if let Some((prev, body_start)) = current.take() {
                    bodies.entry(prev.to_string()).or_insert(body_start..start);
                }
                current = Some((name, offset));
            }
            DisasmLine::Section(_) => {
                if let Some((prev, body_start)) = current.take() {
                    bodies.entry(prev.to_string()).or_insert(body_start..start);
                }
            }
            _ => {}
        }
    }
    if let Some((prev, body_start)) = current {
        bodies.entry(prev.to_string()).or_insert(body_start..range.end);
    }
    bodies
}

/// Provider of parsed dumps keyed by object path.
pub trait DumpSource {
    /// Return the dump for `object`, producing and caching it if needed.
    fn load(&mut self, object: &Path) -> Result<Arc<ObjectDump>, DumpError>;

    /// Load several objects; results keep the order of `objects`.
    fn load_many(&mut self, objects: &[PathBuf]) -> Vec<Result<Arc<ObjectDump>, DumpError>> {
        objects.iter().map(|o| self.load(o)).collect()
    }
}

/// In-memory dump source over already-extracted objdump text.
#[derive(Debug, Default)]
pub struct MemoryDumps {
    raw: HashMap<PathBuf, String>,
    parsed: HashMap<PathBuf, Arc<ObjectDump>>,
}

impl MemoryDumps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the raw dump text for `object`.
    pub fn insert(&mut self, object: impl Into<PathBuf>, text: impl Into<String>) -> &mut Self {
        let object = object.into();
        self.parsed.remove(&object);
        self.raw.insert(object, text.into());
        self
    }

    /// Known object paths, sorted.
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.raw.keys().cloned().collect();
        paths.sort();
        paths
    }
}

impl DumpSource for MemoryDumps {
    fn load(&mut self, object: &Path) -> Result<Arc<ObjectDump>, DumpError> {
        if let Some(dump) = self.parsed.get(object) {
            return Ok(Arc::clone(dump));
        }
        let text = self.raw.get(object).ok_or_else(|| DumpError::NotFound(object.to_path_buf()))?;
        let dump = Arc::new(ObjectDump::parse(object, text.clone())?);
        self.parsed.insert(object.to_path_buf(), Arc::clone(&dump));
        Ok(dump)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DUMP: &str = "\

drv.o:     file format elf32-littlearm

SYMBOL TABLE:
00000000 l    df *ABS*\t00000000 drv.c
00000000 l     F .text\t00000010 helper
00000010 g     F .text\t00000010 drv_suspend



Disassembly of section .text:

00000000 <helper>:
   0:\te12fff1e \tbx\tlr

00000010 <drv_suspend>:
  10:\te92d4010 \tpush\t{r4, lr}
  14:\tebfffff9 \tbl\t0 <helper>
  18:\te8bd8010 \tpop\t{r4, pc}

Disassembly of section .init.text:

00000000 <drv_init>:
   0:\tebfffffe \tbl\t0 <printk>
";

    #[test]
    fn splits_sections_and_indexes_bodies() {
        let dump = ObjectDump::parse("drv.o", DUMP).expect("dump");
        assert!(dump.symbol_table_text().starts_with("00000000 l    df"));
        assert!(dump.disassembly_text().starts_with("00000000 <helper>:"));
        assert_eq!(dump.symbols().len(), 3);
        assert!(dump.defines_local("helper"));
        assert!(!dump.defines_local("drv_suspend"));
        assert_eq!(dump.global_functions().collect::<Vec<_>>(), vec!["drv_suspend"]);

        let body = dump.function_body("drv_suspend").expect("body");
        assert!(body.contains("bl\t0 <helper>"));
        assert!(!body.contains(".init.text"));
        assert_eq!(dump.call_targets("drv_suspend"), vec![CallTarget::Symbol("helper".into())]);
        assert_eq!(dump.call_targets("drv_init"), vec![CallTarget::Symbol("printk".into())]);
        assert!(dump.call_targets("undefined_here").is_empty());
    }

    #[test]
    fn missing_markers_are_reported() {
        let err = ObjectDump::parse("a.o", "Disassembly of section .text:\n").unwrap_err();
        assert!(matches!(err, DumpError::MissingMarker { marker: SYMBOL_TABLE_MARKER, .. }));
        assert!(err.is_recoverable());

        let err = ObjectDump::parse("a.o", "SYMBOL TABLE:\n00000000 g     F .text\t00000004 f\n")
            .unwrap_err();
        assert!(matches!(err, DumpError::MissingMarker { .. }));
    }

    #[test]
    fn memory_source_caches_and_reports_unknown_paths() {
        let mut dumps = MemoryDumps::new();
        dumps.insert("drv.o", DUMP);
        let first = dumps.load(Path::new("drv.o")).expect("load");
        let second = dumps.load(Path::new("drv.o")).expect("load again");
        assert!(Arc::ptr_eq(&first, &second));
        assert!(matches!(dumps.load(Path::new("other.o")), Err(DumpError::NotFound(_))));
    }
}
