use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use drvgraph_core::config::AnalysisConfig;
use drvgraph_core::dump::{DumpError, DumpSource, MemoryDumps, ObjectDump};
use drvgraph_core::services::{DoneMarker, DriverStatus, Pipeline};
use tempfile::{tempdir, TempDir};

const FOO_DUMP: &str = "\
SYMBOL TABLE:
00000000 g     F .text\t00000008 foo_suspend
00000008 g     F .text\t00000004 foo_idle

Disassembly of section .text:

00000000 <foo_suspend>:
   0:\tebfffffe \tbl\t0 <foo_suspend>
\t\t\t0: R_ARM_CALL\tcore_sleep
   4:\tebfffffe \tbl\t8 <foo_idle>

00000008 <foo_idle>:
   8:\te12fff1e \tbx\tlr
";

const CORE_DUMP: &str = "\
SYMBOL TABLE:
00000000 g     F .text\t00000004 core_sleep

Disassembly of section .text:

00000000 <core_sleep>:
   0:\te12fff1e \tbx\tlr
";

const HOOK_CALLER_DUMP: &str = "\
SYMBOL TABLE:
00000000 g     F .text\t00000008 a_suspend
00000000         *UND*\t00000000 hook

Disassembly of section .text:

00000000 <a_suspend>:
   0:\tebfffffe \tbl\t0 <hook>
   4:\te12fff1e \tbx\tlr
";

const WEAK_HOOK_DUMP: &str = "\
SYMBOL TABLE:
00000000  w    F .text\t00000008 hook
00000008 g     F .text\t00000008 b_suspend
00000000         *UND*\t00000000 inner

Disassembly of section .text:

00000000 <hook>:
   0:\tebfffffe \tbl\t0 <inner>
   4:\te12fff1e \tbx\tlr

00000008 <b_suspend>:
   8:\tebfffffc \tbl\t0 <hook>
   c:\te12fff1e \tbx\tlr
";

const INNER_DUMP: &str = "\
SYMBOL TABLE:
00000000 g     F .text\t00000004 inner

Disassembly of section .text:

00000000 <inner>:
   0:\te12fff1e \tbx\tlr
";

/// Delegates to in-memory dumps, but fails with an I/O error for one object.
struct FlakySource {
    inner: MemoryDumps,
    broken: PathBuf,
}

impl DumpSource for FlakySource {
    fn load(&mut self, object: &Path) -> Result<Arc<ObjectDump>, DumpError> {
        if object == self.broken {
            return Err(DumpError::Io {
                path: object.to_path_buf(),
                source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
            });
        }
        self.inner.load(object)
    }
}

struct Fixture {
    _dir: TempDir,
    root: PathBuf,
    dumps: MemoryDumps,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempdir().expect("tempdir");
        let root = dir.path().canonicalize().expect("canon");
        fs::create_dir_all(root.join("out")).expect("mkdir out");
        Self { _dir: dir, root, dumps: MemoryDumps::new() }
    }

    /// Create `build/<rel>` and `kernel/<rel .c>`, registering `dump` for it.
    fn object(&mut self, rel: &str, dump: &str) -> PathBuf {
        let object = self.root.join("build").join(rel);
        fs::create_dir_all(object.parent().expect("parent")).expect("mkdir");
        fs::write(&object, b"").expect("object");
        let source = self.root.join("kernel").join(rel).with_extension("c");
        fs::create_dir_all(source.parent().expect("parent")).expect("mkdir");
        fs::write(&source, "").expect("source");
        self.dumps.insert(object.clone(), dump);
        object
    }

    fn config(&self) -> AnalysisConfig {
        AnalysisConfig::new(
            self.root.join("build"),
            self.root.join("kernel"),
            self.root.join("build/drivers"),
            self.root.join("out"),
            "_suspend$",
        )
    }
}

#[test]
fn objects_without_sources_are_not_analyzed() {
    let mut fx = Fixture::new();
    fx.object("drivers/foo/foo.o", FOO_DUMP);
    fx.object("lib/core.o", CORE_DUMP);
    // Generated object: build artifact with no C source.
    let generated = fx.root.join("build/drivers/foo/foo_gen.o");
    fs::write(&generated, b"").expect("generated");
    fx.dumps.insert(
        generated,
        "SYMBOL TABLE:\n00000000 g     F .text\t00000004 gen_suspend\n\nDisassembly of section .text:\n",
    );

    let config = fx.config();
    let mut pipeline = Pipeline::new(config, fx.dumps).expect("pipeline");
    let globals = pipeline.prepare_globals().expect("globals");
    assert_eq!(globals.functions, 3);
    assert!(pipeline.registry().lookup_global("gen_suspend").is_none());
}

#[test]
fn driver_run_writes_artifacts_and_done_marker() {
    let mut fx = Fixture::new();
    let foo = fx.object("drivers/foo/foo.o", FOO_DUMP);
    fx.object("lib/core.o", CORE_DUMP);
    let root = fx.root.clone();

    let mut pipeline = Pipeline::new(fx.config(), fx.dumps).expect("pipeline");
    let summary = pipeline.run().expect("run");
    assert_eq!(summary.count(DriverStatus::Completed), 1);
    let report = &summary.drivers[0];
    assert_eq!(report.name, "foo");
    assert_eq!(report.entries, 1);
    assert_eq!(report.reachable, 3);

    let tree = fs::read_to_string(root.join("out/foo/foo_call_tree.txt")).expect("tree");
    assert!(tree.contains("foo_suspend [global entry]\n    core_sleep [global]\n    foo_idle [global]\n"));

    let list = fs::read_to_string(root.join("out/foo/foo_func_list.txt")).expect("list");
    let core = root.join("build/lib/core.o");
    assert_eq!(
        list,
        format!(
            "foo_idle {foo}\nfoo_suspend {foo}\ncore_sleep {core}\n",
            foo = foo.display(),
            core = core.display()
        )
    );

    let marker: DoneMarker = serde_json::from_str(
        &fs::read_to_string(root.join("out/foo/done.json")).expect("marker"),
    )
    .expect("marker json");
    assert_eq!(marker.driver, "foo");
    assert_eq!(marker.reachable, 3);
}

#[test]
fn done_drivers_are_skipped_unless_forced() {
    let mut fx = Fixture::new();
    fx.object("drivers/foo/foo.o", FOO_DUMP);
    fx.object("lib/core.o", CORE_DUMP);
    let config = fx.config();

    let mut first = Pipeline::new(config.clone(), fx.dumps).expect("pipeline");
    first.run().expect("first run");

    let mut again = MemoryDumps::new();
    again
        .insert(fx.root.join("build/drivers/foo/foo.o"), FOO_DUMP)
        .insert(fx.root.join("build/lib/core.o"), CORE_DUMP);

    let mut second = Pipeline::new(config.clone(), again).expect("pipeline");
    let summary = second.run().expect("second run");
    assert!(summary.globals.reloaded);
    assert_eq!(summary.count(DriverStatus::Skipped), 1);

    let mut forced_dumps = MemoryDumps::new();
    forced_dumps
        .insert(fx.root.join("build/drivers/foo/foo.o"), FOO_DUMP)
        .insert(fx.root.join("build/lib/core.o"), CORE_DUMP);
    let mut forced = Pipeline::new(config, forced_dumps).expect("pipeline").force(true);
    let summary = forced.run().expect("forced run");
    assert!(!summary.globals.reloaded);
    assert_eq!(summary.count(DriverStatus::Completed), 1);
}

#[test]
fn failing_driver_does_not_stop_the_batch() {
    let mut fx = Fixture::new();
    fx.object("drivers/foo/foo.o", FOO_DUMP);
    fx.object("lib/core.o", CORE_DUMP);
    let broken = fx.object("drivers/bad/bad.o", CORE_DUMP);
    let root = fx.root.clone();
    let config = fx.config();

    // Reuse a listing so the global pass never touches the broken object.
    let foo = root.join("build/drivers/foo/foo.o");
    let core = root.join("build/lib/core.o");
    fs::write(
        root.join("out/global_funclist.txt"),
        format!(
            "foo_idle {foo}\nfoo_suspend {foo}\ncore_sleep {core}\n",
            foo = foo.display(),
            core = core.display()
        ),
    )
    .expect("listing");

    let source = FlakySource { inner: fx.dumps, broken };
    let mut pipeline = Pipeline::new(config, source).expect("pipeline");
    let summary = pipeline.run().expect("run");

    assert_eq!(summary.drivers.len(), 2);
    assert_eq!(summary.drivers[0].name, "bad");
    assert_eq!(summary.drivers[0].status, DriverStatus::Failed);
    assert!(summary.drivers[0].error.as_deref().unwrap_or("").contains("denied"));
    assert_eq!(summary.drivers[1].status, DriverStatus::Completed);
    assert!(!root.join("out/bad/done.json").exists());
    assert!(root.join("out/foo/done.json").is_file());
}

#[test]
fn invalid_entry_pattern_is_rejected_up_front() {
    let fx = Fixture::new();
    let mut config = fx.config();
    config.entry_pattern = "(".into();
    assert!(Pipeline::new(config, MemoryDumps::new()).is_err());
}

/// Run the pipeline over drivers `a` (calls an undefined `hook`) and/or `b`
/// (weak `hook` definition) and return b's call tree.
fn weak_hook_tree(with_caller: bool) -> String {
    let mut fx = Fixture::new();
    if with_caller {
        fx.object("drivers/a/a.o", HOOK_CALLER_DUMP);
    }
    fx.object("drivers/b/b.o", WEAK_HOOK_DUMP);
    fx.object("lib/inner.o", INNER_DUMP);
    let root = fx.root.clone();

    let mut pipeline = Pipeline::new(fx.config(), fx.dumps).expect("pipeline");
    let summary = pipeline.run().expect("run");
    assert_eq!(summary.count(DriverStatus::Completed), summary.drivers.len());
    fs::read_to_string(root.join("out/b/b_call_tree.txt")).expect("b call tree")
}

#[test]
fn weak_definition_is_expanded_regardless_of_earlier_drivers() {
    let alone = weak_hook_tree(false);
    let after_caller = weak_hook_tree(true);
    assert!(alone.contains("b_suspend [global entry]\n    hook\n        inner [global]\n"));
    assert_eq!(alone, after_caller);
}

#[test]
fn resumed_run_matches_full_run() {
    let mut fx = Fixture::new();
    fx.object("drivers/a/a.o", HOOK_CALLER_DUMP);
    let b = fx.object("drivers/b/b.o", WEAK_HOOK_DUMP);
    let inner = fx.object("lib/inner.o", INNER_DUMP);
    let a = fx.root.join("build/drivers/a/a.o");
    let root = fx.root.clone();
    let config = fx.config();

    let mut full = Pipeline::new(config.clone(), fx.dumps).expect("pipeline");
    full.run().expect("full run");
    let a_tree = fs::read_to_string(root.join("out/a/a_call_tree.txt")).expect("a tree");
    let b_tree = fs::read_to_string(root.join("out/b/b_call_tree.txt")).expect("b tree");
    let b_funcs = fs::read_to_string(root.join("out/b/b_func_list.txt")).expect("b funcs");
    assert!(a_tree.contains("a_suspend [global entry]\n    hook\n"));
    assert!(!a_tree.contains("inner"));

    // Redo only b, on a fresh process state reloaded from the listing.
    fs::remove_file(root.join("out/b/done.json")).expect("drop marker");
    let mut dumps = MemoryDumps::new();
    dumps.insert(a, HOOK_CALLER_DUMP).insert(b, WEAK_HOOK_DUMP).insert(inner, INNER_DUMP);
    let mut resumed = Pipeline::new(config, dumps).expect("pipeline");
    let summary = resumed.run().expect("resumed run");
    assert_eq!(summary.count(DriverStatus::Skipped), 1);

    assert_eq!(fs::read_to_string(root.join("out/b/b_call_tree.txt")).expect("b tree"), b_tree);
    assert_eq!(fs::read_to_string(root.join("out/b/b_func_list.txt")).expect("b funcs"), b_funcs);
}
