use anyhow::{bail, Result};
use drvgraph_core::config::AnalysisConfig;
use drvgraph_core::services::{DriverStatus, GlobalSummary, ObjdumpCache, Pipeline, RunSummary};

fn print_globals(globals: &GlobalSummary) {
    let origin = if globals.reloaded { "reloaded from listing" } else { "collected" };
    println!("Global functions: {} ({origin})", globals.functions);
    if globals.skipped_objects > 0 {
        println!("Skipped objects: {}", globals.skipped_objects);
    }
}

fn print_summary(summary: &RunSummary) {
    print_globals(&summary.globals);
    if summary.drivers.is_empty() {
        println!("No driver directories found.");
        return;
    }
    println!("Drivers:");
    for driver in &summary.drivers {
        match driver.status {
            DriverStatus::Completed => println!(
                "  - {}: {} entries, {} reachable functions",
                driver.name, driver.entries, driver.reachable
            ),
            DriverStatus::Skipped => println!("  - {}: skipped (already analyzed)", driver.name),
            DriverStatus::Failed => println!(
                "  - {}: FAILED ({})",
                driver.name,
                driver.error.as_deref().unwrap_or("unknown error")
            ),
        }
    }
}

/// Run the full analysis described by `config`.
///
/// Exits with an error if any driver failed, after every driver was attempted.
pub fn run_command(config: AnalysisConfig, force: bool, json: bool) -> Result<()> {
    let output = config.output_path.clone();
    let source = ObjdumpCache::from_config(&config);
    let mut pipeline = Pipeline::new(config, source)?.force(force);
    let summary = pipeline.run()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
        println!("Reports written to {}", output.display());
    }

    let failed = summary.count(DriverStatus::Failed);
    if failed > 0 {
        bail!("{failed} driver(s) failed");
    }
    Ok(())
}

/// Build or reload only the global function list.
pub fn globals_command(config: AnalysisConfig, force: bool, json: bool) -> Result<()> {
    let source = ObjdumpCache::from_config(&config);
    let mut pipeline = Pipeline::new(config, source)?.force(force);
    let globals = pipeline.prepare_globals()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&globals)?);
    } else {
        print_globals(&globals);
        println!("Listing: {}", pipeline.layout().global_list_path.display());
    }
    Ok(())
}
