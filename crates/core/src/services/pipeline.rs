use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analysis::callgraph;
use crate::analysis::disasm::EntryMatcher;
use crate::analysis::report::{self, Reachable};
use crate::config::{AnalysisConfig, OutputLayout};
use crate::dump::{DumpError, DumpSource, MemoryDumps, ObjectDump};
use crate::model::{FunctionId, Role};
use crate::registry::{ListingError, Registry};
use crate::services::scan::{driver_dirs, SourceFilter};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Dump(#[from] DumpError),

    #[error("Invalid global function list: {0}")]
    Listing(#[from] ListingError),

    #[error("Invalid entry pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Failed to walk directory: {0}")]
    Walk(#[from] walkdir::Error),

    /// Object paths must be derived from the build root, never guessed.
    #[error("{} is outside the build root {}", path.display(), root.display())]
    OutsideBuildRoot { path: PathBuf, root: PathBuf },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl PipelineError {
    fn io(path: &Path) -> impl FnOnce(io::Error) -> PipelineError + '_ {
        move |source| PipelineError::Io { path: path.to_path_buf(), source }
    }
}

/// Outcome of one driver directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverStatus {
    Completed,
    /// A done marker from an earlier run was found.
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverReport {
    pub name: String,
    pub status: DriverStatus,
    pub entries: usize,
    pub reachable: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DriverReport {
    fn without_counts(name: &str, status: DriverStatus, error: Option<String>) -> Self {
        Self { name: name.to_string(), status, entries: 0, reachable: 0, error }
    }
}

/// Result of the global pre-registration pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalSummary {
    pub functions: usize,
    /// Registry was rehydrated from an existing listing instead of re-dumping.
    pub reloaded: bool,
    /// Objects skipped because their dump could not be produced or parsed.
    pub skipped_objects: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub globals: GlobalSummary,
    pub drivers: Vec<DriverReport>,
}

impl RunSummary {
    pub fn count(&self, status: DriverStatus) -> usize {
        self.drivers.iter().filter(|d| d.status == status).count()
    }
}

/// Contents of a driver's done marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoneMarker {
    pub driver: String,
    pub entries: usize,
    pub reachable: usize,
    pub started_at: String,
    pub finished_at: String,
}

/// Load a dump, turning recoverable failures into `None` after logging them.
fn load_or_skip(
    source: &mut dyn DumpSource,
    object: &Path,
) -> Result<Option<Arc<ObjectDump>>, PipelineError> {
    match source.load(object) {
        Ok(dump) => Ok(Some(dump)),
        Err(err) if err.is_recoverable() => {
            warn!("skipping {}: {err}", object.display());
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}

/// Entry functions defined by `dump`, registered and tagged.
fn register_entries(
    registry: &mut Registry,
    matcher: &EntryMatcher,
    dump: &Arc<ObjectDump>,
    entries: &mut Vec<FunctionId>,
) {
    for name in matcher.find_entries(dump.symbols()) {
        let id = registry.resolve_symbol(&name, dump);
        registry.tag(id, Role::Entry);
        if !entries.contains(&id) {
            entries.push(id);
        }
    }
}

fn write_artifact(
    path: &Path,
    render: impl FnOnce(&mut BufWriter<File>) -> io::Result<()>,
) -> Result<(), PipelineError> {
    let file = File::create(path).map_err(PipelineError::io(path))?;
    let mut out = BufWriter::new(file);
    render(&mut out).map_err(PipelineError::io(path))?;
    out.flush().map_err(PipelineError::io(path))
}

/// Batch analysis over a build tree: one global pass, then one pass per driver.
pub struct Pipeline<S: DumpSource> {
    config: AnalysisConfig,
    layout: OutputLayout,
    filter: SourceFilter,
    matcher: EntryMatcher,
    source: S,
    registry: Registry,
    force: bool,
}

impl<S: DumpSource> Pipeline<S> {
    pub fn new(config: AnalysisConfig, source: S) -> Result<Self, PipelineError> {
        let matcher = EntryMatcher::new(&config.entry_pattern)?;
        let layout = OutputLayout::new(&config.output_path);
        let filter = SourceFilter::new(&config.build_path, &config.kernel_path);
        Ok(Self { config, layout, filter, matcher, source, registry: Registry::new(), force: false })
    }

    /// Ignore existing done markers and the cached global listing.
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    /// Populate the registry with every global function of the build.
    ///
    /// Reuses `global_funclist.txt` when present; otherwise dumps every
    /// analyzable object and writes the listing.
    pub fn prepare_globals(&mut self) -> Result<GlobalSummary, PipelineError> {
        fs::create_dir_all(&self.layout.root).map_err(PipelineError::io(&self.layout.root))?;
        let list_path = self.layout.global_list_path.clone();

        if list_path.is_file() && !self.force {
            info!("reusing global function list at {}", list_path.display());
            let listing = fs::read_to_string(&list_path).map_err(PipelineError::io(&list_path))?;
            self.registry = Registry::import(&listing)?;
            return Ok(GlobalSummary {
                functions: self.registry.len(),
                reloaded: true,
                skipped_objects: 0,
            });
        }

        info!("pre-processing global functions under {}", self.config.build_path.display());
        let objects = self.filter.collect_objects(&self.config.build_path)?;
        let mut skipped_objects = 0;
        for (object, result) in objects.iter().zip(self.source.load_many(&objects)) {
            match result {
                Ok(dump) => {
                    let added = self.registry.register_globals(&dump);
                    debug!("{}: {added} global functions", object.display());
                }
                Err(err) if err.is_recoverable() => {
                    warn!("skipping {}: {err}", object.display());
                    skipped_objects += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }

        let listing = self.registry.export();
        write_artifact(&list_path, |out| out.write_all(listing.as_bytes()))?;
        Ok(GlobalSummary { functions: self.registry.len(), reloaded: false, skipped_objects })
    }

    /// Find, register and tag the entry functions of every analyzable object
    /// under `dir`. Returned sorted by name.
    pub fn discover_entries(&mut self, dir: &Path) -> Result<Vec<FunctionId>, PipelineError> {
        let mut entries = Vec::new();
        for object in self.filter.collect_objects(dir)? {
            debug!("scanning {} for entries", object.display());
            if let Some(dump) = load_or_skip(&mut self.source, &object)? {
                register_entries(&mut self.registry, &self.matcher, &dump, &mut entries);
            }
        }
        self.registry.sort_by_name(&mut entries);
        Ok(entries)
    }

    /// Analyze one driver directory and write its artifacts and done marker.
    pub fn run_driver(&mut self, name: &str, dir: &Path) -> Result<DriverReport, PipelineError> {
        let started_at = Utc::now().to_rfc3339();
        let out_dir = self.layout.driver_dir(name);
        fs::create_dir_all(&out_dir).map_err(PipelineError::io(&out_dir))?;

        info!("{name}: finding entries");
        let entries = self.discover_entries(dir)?;
        let registry = &self.registry;
        write_artifact(&self.layout.entry_list_path(name), |out| {
            report::write_entry_list(registry, &entries, out)
        })?;

        info!("{name}: building call trees for {} entries", entries.len());
        for entry in &entries {
            callgraph::build(&mut self.registry, &mut self.source, *entry)?;
        }

        let mut reached = Reachable::new();
        let registry = &self.registry;
        write_artifact(&self.layout.call_tree_path(name), |out| {
            for entry in &entries {
                report::write_entry_report(registry, *entry, out, &mut reached)?;
            }
            Ok(())
        })?;

        let reachable = report::reachable_sorted(registry, &reached);
        write_artifact(&self.layout.func_list_path(name), |out| {
            report::write_function_list(registry, &reachable, out)
        })?;

        let marker = DoneMarker {
            driver: name.to_string(),
            entries: entries.len(),
            reachable: reachable.len(),
            started_at,
            finished_at: Utc::now().to_rfc3339(),
        };
        let marker_path = self.layout.done_marker_path(name);
        let body = serde_json::to_string_pretty(&marker)
            .map_err(|e| PipelineError::Io { path: marker_path.clone(), source: e.into() })?;
        write_artifact(&marker_path, |out| out.write_all(body.as_bytes()))?;

        Ok(DriverReport {
            name: name.to_string(),
            status: DriverStatus::Completed,
            entries: marker.entries,
            reachable: marker.reachable,
            error: None,
        })
    }

    /// Run the global pass and every driver not yet marked done.
    ///
    /// A driver that fails is reported and left without a done marker; the
    /// remaining drivers still run.
    pub fn run(&mut self) -> Result<RunSummary, PipelineError> {
        let globals = self.prepare_globals()?;
        let mut drivers = Vec::new();

        for (name, dir) in driver_dirs(&self.config.driver_path)? {
            if !self.force && self.layout.done_marker_path(&name).is_file() {
                info!("{name}: already analyzed, skipping");
                drivers.push(DriverReport::without_counts(&name, DriverStatus::Skipped, None));
                continue;
            }
            match self.run_driver(&name, &dir) {
                Ok(report) => drivers.push(report),
                Err(err) => {
                    error!("{name}: {err}");
                    drivers.push(DriverReport::without_counts(
                        &name,
                        DriverStatus::Failed,
                        Some(err.to_string()),
                    ));
                }
            }
        }

        Ok(RunSummary { globals, drivers })
    }
}

/// Result of analyzing in-memory dumps without a build tree.
#[derive(Debug)]
pub struct OfflineAnalysis {
    pub registry: Registry,
    pub entries: Vec<FunctionId>,
    pub reachable: Vec<FunctionId>,
    pub skipped_objects: usize,
}

/// Analyze a set of dumps directly: register their globals, select entries,
/// and write the entry list, every entry's call tree and the reachable
/// function list to `out`.
pub fn analyze_dumps<W: Write>(
    dumps: &mut MemoryDumps,
    matcher: &EntryMatcher,
    out: &mut W,
) -> Result<OfflineAnalysis, PipelineError> {
    let mut registry = Registry::new();
    let paths = dumps.paths();
    let mut loaded = Vec::new();
    let mut skipped_objects = 0;
    for (path, result) in paths.iter().zip(dumps.load_many(&paths)) {
        match result {
            Ok(dump) => {
                registry.register_globals(&dump);
                loaded.push(dump);
            }
            Err(err) if err.is_recoverable() => {
                warn!("skipping {}: {err}", path.display());
                skipped_objects += 1;
            }
            Err(err) => return Err(err.into()),
        }
    }

    let mut entries = Vec::new();
    for dump in &loaded {
        register_entries(&mut registry, matcher, dump, &mut entries);
    }
    registry.sort_by_name(&mut entries);

    let stdout_err = |source: io::Error| PipelineError::Io { path: PathBuf::from("<output>"), source };
    report::write_entry_list(&registry, &entries, out).map_err(stdout_err)?;

    let mut reached = Reachable::new();
    for entry in &entries {
        callgraph::build(&mut registry, &mut *dumps, *entry)?;
        report::write_entry_report(&registry, *entry, out, &mut reached).map_err(stdout_err)?;
    }
    let reachable = report::reachable_sorted(&registry, &reached);
    report::write_function_list(&registry, &reachable, out).map_err(stdout_err)?;

    Ok(OfflineAnalysis { registry, entries, reachable, skipped_objects })
}
