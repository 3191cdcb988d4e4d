use std::fs;
use std::io::{self, Write};

use anyhow::{Context, Result};
use drvgraph_core::analysis::disasm::EntryMatcher;
use drvgraph_core::dump::MemoryDumps;
use drvgraph_core::services::analyze_dumps;

/// Print entry list, call trees and reachable functions for existing dump files.
///
/// Each dump is keyed by the path given on the command line, which is what
/// appears in the reachable function list.
pub fn inspect_command(dump_paths: &[String], entry_pattern: &str) -> Result<()> {
    let matcher = EntryMatcher::new(entry_pattern)
        .with_context(|| format!("Invalid entry pattern {entry_pattern:?}"))?;

    let mut dumps = MemoryDumps::new();
    for path in dump_paths {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read dump file {path}"))?;
        dumps.insert(path.as_str(), text);
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let analysis = analyze_dumps(&mut dumps, &matcher, &mut out)?;
    out.flush()?;

    log::info!(
        "{} entries, {} reachable functions, {} dumps skipped",
        analysis.entries.len(),
        analysis.reachable.len(),
        analysis.skipped_objects
    );
    Ok(())
}
