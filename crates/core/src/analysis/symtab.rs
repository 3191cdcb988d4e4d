//! Parser for the `SYMBOL TABLE:` section printed by `objdump -t`.
//!
//! Each line has the shape
//!
//! ```text
//! 00000000 g     F .text	00000040 drv_suspend
//! ```
//!
//! that is: a hex address, a single space, a seven character flag field, then
//! section, hex size and name separated by whitespace. Lines that do not fit
//! this grammar are skipped.

/// Width of the objdump flag column.
const FLAG_WIDTH: usize = 7;

/// Visibility annotations objdump may print in front of a symbol name.
const VISIBILITY_PREFIXES: [&str; 3] = [".hidden", ".protected", ".internal"];

/// Binding class encoded in the first flag column (and the weak column).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    Local,
    Global,
    /// GNU unique global.
    Unique,
    /// Both local and global (`!`).
    Both,
    Weak,
    None,
}

impl Binding {
    fn from_flags(binding: u8, weak: u8) -> Self {
        match (binding, weak) {
            (b'l', _) => Binding::Local,
            (b'g', _) => Binding::Global,
            (b'u', _) => Binding::Unique,
            (b'!', _) => Binding::Both,
            (_, b'w') => Binding::Weak,
            _ => Binding::None,
        }
    }
}

/// Symbol type encoded in the seventh flag column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Function,
    File,
    Object,
    Other,
}

impl SymbolKind {
    fn from_flag(flag: u8) -> Self {
        match flag {
            b'F' => SymbolKind::Function,
            b'f' => SymbolKind::File,
            b'O' => SymbolKind::Object,
            _ => SymbolKind::Other,
        }
    }
}

/// One parsed symbol-table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub address: u64,
    pub binding: Binding,
    pub kind: SymbolKind,
    pub section: String,
    pub size: u64,
    pub name: String,
}

impl Symbol {
    pub fn is_function(&self) -> bool {
        self.kind == SymbolKind::Function
    }

    /// Global or unique function definition; these are assumed unique build-wide.
    pub fn is_global_function(&self) -> bool {
        self.is_function() && matches!(self.binding, Binding::Global | Binding::Unique)
    }

    pub fn is_local_function(&self) -> bool {
        self.is_function() && self.binding == Binding::Local
    }
}

/// Parse a single symbol-table line. Returns `None` for anything that does not
/// match the grammar (headers, blank lines, truncated output).
pub fn parse_line(line: &str) -> Option<Symbol> {
    let line = line.trim_end_matches(['\r', '\n']);
    let (addr, rest) = line.split_once(' ')?;
    if addr.is_empty() || !addr.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let address = u64::from_str_radix(addr, 16).ok()?;

    let flags = rest.get(..FLAG_WIDTH)?.as_bytes();
    let tail = &rest[FLAG_WIDTH..];
    if !tail.starts_with(char::is_whitespace) {
        return None;
    }

    let mut fields = tail.split_whitespace();
    let section = fields.next()?;
    let size = u64::from_str_radix(fields.next()?, 16).ok()?;
    let mut name = fields.next()?;
    if VISIBILITY_PREFIXES.contains(&name) {
        name = fields.next()?;
    }
    if fields.next().is_some() {
        return None;
    }

    Some(Symbol {
        address,
        binding: Binding::from_flags(flags[0], flags[1]),
        kind: SymbolKind::from_flag(flags[FLAG_WIDTH - 1]),
        section: section.to_string(),
        size,
        name: name.to_string(),
    })
}

/// Parse every well-formed line of a symbol-table section.
pub fn parse_symbol_table(text: &str) -> Vec<Symbol> {
    text.lines().filter_map(parse_line).collect()
}

/// Names of the global/unique function definitions, in table order.
pub fn global_function_names(symbols: &[Symbol]) -> impl Iterator<Item = &str> {
    symbols.iter().filter(|s| s.is_global_function()).map(|s| s.name.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_function_line() {
        let sym = parse_line("00000000 g     F .text\t00000040 drv_suspend").expect("symbol");
        assert_eq!(sym.name, "drv_suspend");
        assert_eq!(sym.binding, Binding::Global);
        assert_eq!(sym.kind, SymbolKind::Function);
        assert_eq!(sym.section, ".text");
        assert_eq!(sym.size, 0x40);
        assert!(sym.is_global_function());
    }

    #[test]
    fn local_function_is_not_global() {
        let sym = parse_line("0000001c l     F .text\t00000010 helper").expect("symbol");
        assert_eq!(sym.binding, Binding::Local);
        assert!(sym.is_local_function());
        assert!(!sym.is_global_function());
    }

    #[test]
    fn weak_and_unique_bindings() {
        let weak = parse_line("00000000  w    F .text\t00000008 weak_fn").expect("weak");
        assert_eq!(weak.binding, Binding::Weak);
        assert!(!weak.is_global_function());

        let unique = parse_line("00000000 u     F .text\t00000008 uniq_fn").expect("unique");
        assert!(unique.is_global_function());
    }

    #[test]
    fn accepts_64bit_addresses_and_hidden_names() {
        let sym = parse_line("0000000000000010 g     F .text\t0000000000000020 .hidden hid_fn")
            .expect("symbol");
        assert_eq!(sym.address, 0x10);
        assert_eq!(sym.name, "hid_fn");
    }

    #[test]
    fn object_and_file_symbols_are_not_functions() {
        let obj = parse_line("00000000 g     O .data\t00000004 counter").expect("object");
        assert_eq!(obj.kind, SymbolKind::Object);
        let file = parse_line("00000000 l    df *ABS*\t00000000 drv.c").expect("file");
        assert_eq!(file.kind, SymbolKind::File);
    }

    #[test]
    fn malformed_lines_are_skipped() {
        assert!(parse_line("").is_none());
        assert!(parse_line("SYMBOL TABLE:").is_none());
        assert!(parse_line("00000000 g F").is_none());
        assert!(parse_line("zzzz g     F .text\t00000040 foo").is_none());
        assert!(parse_line("00000000 g     F .text\tnothex foo").is_none());
    }

    #[test]
    fn global_names_filter_table() {
        let text = "\
00000000 l    df *ABS*\t00000000 drv.c
00000000 l     F .text\t00000010 local_fn
00000010 g     F .text\t00000010 global_fn
00000020 g     O .bss\t00000004 global_obj
garbage line
";
        let symbols = parse_symbol_table(text);
        assert_eq!(symbols.len(), 4);
        let names: Vec<&str> = global_function_names(&symbols).collect();
        assert_eq!(names, vec!["global_fn"]);
    }
}
