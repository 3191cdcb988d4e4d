//! Line grammar for objdump disassembly output, call-site scanning, and entry
//! discovery.
//!
//! Recognized lines:
//!
//! ```text
//! 00000000 <drv_suspend>:                 function header
//!    4:	ebfffffe 	bl	0 <helper>       instruction
//! 			4: R_ARM_CALL	helper           relocation (objdump -r)
//! ```

use std::collections::HashSet;

use regex::Regex;

use crate::analysis::symtab::Symbol;

/// Prefix of the objdump line that opens a disassembled section.
pub const SECTION_MARKER_PREFIX: &str = "Disassembly of section ";

/// Call mnemonics that only ever take a register operand.
const REGISTER_CALLS: [&str; 2] = ["blr", "jalr"];

/// ARM condition code suffixes accepted on `bl`/`blx`.
const ARM_CONDITIONS: [&str; 16] = [
    "eq", "ne", "cs", "hs", "cc", "lo", "mi", "pl", "vs", "vc", "hi", "ls", "ge", "lt", "gt", "le",
];

/// A single decoded instruction line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction<'a> {
    pub address: u64,
    pub mnemonic: &'a str,
    pub operands: &'a str,
}

/// A relocation printed inline by `objdump -r`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relocation<'a> {
    pub address: u64,
    pub kind: &'a str,
    pub symbol: &'a str,
}

/// Classification of one disassembly line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisasmLine<'a> {
    Header { address: u64, name: &'a str },
    Section(&'a str),
    Instruction(Instruction<'a>),
    Relocation(Relocation<'a>),
    Other,
}

/// Resolved target of a call site.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CallTarget {
    Symbol(String),
    /// No symbol could be attached; holds the normalized instruction text.
    Unresolved(String),
}

fn parse_hex(field: &str) -> Option<u64> {
    let field = field.strip_prefix("0x").unwrap_or(field);
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u64::from_str_radix(field, 16).ok()
}

/// Parse a function header line such as `00000010 <helper>:`.
pub fn parse_header(line: &str) -> Option<(u64, &str)> {
    let line = line.trim_end();
    let inner = line.strip_suffix(">:")?;
    let (addr, name) = inner.split_once(" <")?;
    let address = parse_hex(addr)?;
    if name.is_empty() {
        return None;
    }
    Some((address, name))
}

/// Classify one line of disassembly text.
pub fn parse_line(line: &str) -> DisasmLine<'_> {
    if let Some(rest) = line.strip_prefix(SECTION_MARKER_PREFIX) {
        return DisasmLine::Section(rest.trim_end().trim_end_matches(':'));
    }
    if let Some((address, name)) = parse_header(line) {
        return DisasmLine::Header { address, name };
    }

    let trimmed = line.trim_start();
    let Some((addr, rest)) = trimmed.split_once(':') else {
        return DisasmLine::Other;
    };
    let Some(address) = parse_hex(addr) else {
        return DisasmLine::Other;
    };

    let rest_trimmed = rest.trim_start();
    if rest_trimmed.starts_with("R_") {
        let mut fields = rest_trimmed.split_whitespace();
        if let (Some(kind), Some(symbol)) = (fields.next(), fields.next()) {
            return DisasmLine::Relocation(Relocation { address, kind, symbol });
        }
        return DisasmLine::Other;
    }

    // `<TAB><encoding><TAB><mnemonic ...>`: everything after the second tab is
    // the instruction text.
    let mut parts = rest.splitn(3, '\t');
    let (Some(""), Some(_encoding), Some(text)) = (parts.next(), parts.next(), parts.next())
    else {
        return DisasmLine::Other;
    };
    let text = text.trim();
    if text.is_empty() {
        return DisasmLine::Other;
    }
    let (mnemonic, operands) = match text.split_once(char::is_whitespace) {
        Some((m, ops)) => (m, ops.trim()),
        None => (text, ""),
    };
    DisasmLine::Instruction(Instruction { address, mnemonic, operands })
}

/// Whether `mnemonic` is a call instruction on one of the supported targets.
pub fn is_call(mnemonic: &str) -> bool {
    match mnemonic {
        "call" | "callq" | "calll" | "jal" | "jalr" | "blr" => return true,
        _ => {}
    }
    let Some(rest) = mnemonic.strip_prefix("bl") else {
        return false;
    };
    let rest = rest.strip_prefix('x').unwrap_or(rest);
    let rest = rest.strip_suffix(".w").or_else(|| rest.strip_suffix(".n")).unwrap_or(rest);
    rest.is_empty() || ARM_CONDITIONS.contains(&rest)
}

/// Split a `name+0x10` / `name-0x4` reference into name and offset.
fn split_offset(reference: &str) -> (&str, u64) {
    if let Some((name, off)) = reference.split_once('+') {
        return (name, parse_hex(off).unwrap_or(0));
    }
    if let Some((name, _)) = reference.split_once('-') {
        return (name, 0);
    }
    (reference, 0)
}

/// Symbol annotation of an operand, e.g. `1c <helper+0x4>` -> `helper`.
fn annotation<'a>(operands: &'a str, caller: &str) -> Option<&'a str> {
    let start = operands.rfind('<')?;
    let inner = operands[start + 1..].strip_suffix('>')?;
    let (name, offset) = split_offset(inner);
    if name.is_empty() || name.starts_with('.') {
        return None;
    }
    if name == caller && offset != 0 {
        return None;
    }
    Some(name)
}

/// Look up an unannotated operand address among the caller's section symbols.
fn by_address(operands: &str, section: Option<&str>, symbols: &[Symbol]) -> Option<String> {
    let section = section?;
    let operand = operands.split('<').next().unwrap_or(operands).trim();
    let last = operand.rsplit(',').next().unwrap_or(operand).trim();
    let address = parse_hex(last)?;
    symbols
        .iter()
        .find(|s| s.is_function() && s.section == section && s.address == address)
        .map(|s| s.name.clone())
}

fn resolve_call(
    insn: &Instruction<'_>,
    caller: &str,
    section: Option<&str>,
    symbols: &[Symbol],
) -> CallTarget {
    if let Some(name) = annotation(insn.operands, caller) {
        return CallTarget::Symbol(name.to_string());
    }
    if !REGISTER_CALLS.contains(&insn.mnemonic) {
        if let Some(name) = by_address(insn.operands, section, symbols) {
            return CallTarget::Symbol(name);
        }
    }
    let operands = insn.operands.split_whitespace().collect::<Vec<_>>().join(" ");
    CallTarget::Unresolved(format!("{} {}", insn.mnemonic, operands).trim_end().to_string())
}

/// Split a relocation symbol into name and signed addend (`.text-0x4`).
fn split_addend(reference: &str) -> (&str, i64) {
    let (name, addend) = match reference.find(['+', '-']) {
        Some(pos) => (&reference[..pos], &reference[pos..]),
        None => return (reference, 0),
    };
    let magnitude = parse_hex(&addend[1..]).and_then(|v| i64::try_from(v).ok()).unwrap_or(0);
    if addend.starts_with('-') {
        (name, -magnitude)
    } else {
        (name, magnitude)
    }
}

/// Bytes between a PC-relative x86 field and the end of its instruction.
fn pc_relative_bias(kind: &str) -> i64 {
    if kind.ends_with("PC32") || kind.ends_with("PLT32") {
        4
    } else {
        0
    }
}

/// Call target named by a relocation.
///
/// Section-relative relocations (`.text+0x3c`) are mapped to the function
/// symbol at that offset of the section. ARM keeps the addend in the
/// instruction, so its section-relative relocations are left to the operand.
fn relocation_target(reloc: &Relocation<'_>, symbols: &[Symbol]) -> Option<String> {
    let (name, addend) = split_addend(reloc.symbol);
    if name.is_empty() {
        return None;
    }
    if !name.starts_with('.') {
        return Some(name.to_string());
    }
    if reloc.kind.starts_with("R_ARM_") {
        return None;
    }
    let offset = u64::try_from(addend + pc_relative_bias(reloc.kind)).ok()?;
    symbols
        .iter()
        .find(|s| s.is_function() && s.section == name && s.address == offset)
        .map(|s| s.name.clone())
}

/// Ordered, de-duplicated call targets accumulated while scanning a body.
#[derive(Default)]
struct TargetList {
    targets: Vec<CallTarget>,
    seen: HashSet<CallTarget>,
}

impl TargetList {
    fn push(&mut self, target: CallTarget) {
        if self.seen.insert(target.clone()) {
            self.targets.push(target);
        }
    }
}

/// Extract the call targets of `caller` from its disassembly `body`.
///
/// `symbols` is the symbol table of the owning object file, used to resolve
/// unannotated call addresses within the caller's section. Targets keep the
/// order of their first call site.
pub fn extract_call_targets(body: &str, caller: &str, symbols: &[Symbol]) -> Vec<CallTarget> {
    let section = symbols
        .iter()
        .find(|s| s.is_function() && s.name == caller)
        .map(|s| s.section.as_str());

    let mut list = TargetList::default();
    let mut pending: Option<CallTarget> = None;

    for line in body.lines() {
        match parse_line(line) {
            DisasmLine::Instruction(insn) => {
                if let Some(prev) = pending.take() {
                    list.push(prev);
                }
                if is_call(insn.mnemonic) {
                    pending = Some(resolve_call(&insn, caller, section, symbols));
                }
            }
            DisasmLine::Relocation(reloc) => {
                if pending.is_some() {
                    if let Some(name) = relocation_target(&reloc, symbols) {
                        pending = Some(CallTarget::Symbol(name));
                    }
                }
            }
            DisasmLine::Header { .. } | DisasmLine::Section(_) => break,
            DisasmLine::Other => {}
        }
    }
    if let Some(prev) = pending {
        list.push(prev);
    }
    list.targets
}

/// Caller-supplied entry-name pattern.
#[derive(Debug, Clone)]
pub struct EntryMatcher {
    pattern: Regex,
}

impl EntryMatcher {
    /// Compile `pattern`. Matching is case-sensitive and anchored only where the
    /// pattern itself says so.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self { pattern: Regex::new(pattern)? })
    }

    pub fn is_match(&self, name: &str) -> bool {
        self.pattern.is_match(name)
    }

    /// Names of function symbols (any binding) matching the pattern, sorted.
    pub fn find_entries(&self, symbols: &[Symbol]) -> Vec<String> {
        let mut names: Vec<String> = symbols
            .iter()
            .filter(|s| s.is_function() && self.is_match(&s.name))
            .map(|s| s.name.clone())
            .collect();
        names.sort();
        names.dedup();
        names
    }
}
