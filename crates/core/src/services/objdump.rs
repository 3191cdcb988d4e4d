use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use log::debug;
use rayon::prelude::*;

use crate::config::AnalysisConfig;
use crate::dump::{DumpError, DumpSource, ObjectDump};

/// Dump source backed by an external objdump, caching raw output as
/// `<object>.dump` next to each object file.
///
/// An existing `.dump` file is reused as-is, so a tree that was dumped once
/// (or by another machine) never needs the cross toolchain again.
#[derive(Debug)]
pub struct ObjdumpCache {
    tool: String,
    args: Vec<String>,
    parsed: HashMap<PathBuf, Arc<ObjectDump>>,
}

impl ObjdumpCache {
    pub fn new(tool: impl Into<String>, args: Vec<String>) -> Self {
        Self { tool: tool.into(), args, parsed: HashMap::new() }
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(config.objdump.clone(), config.objdump_args.clone())
    }

    /// Cached dump location for `object` (`foo.o` -> `foo.dump`).
    pub fn dump_path(object: &Path) -> Result<PathBuf, DumpError> {
        if object.extension().and_then(|e| e.to_str()) != Some("o") {
            return Err(DumpError::NotObject(object.to_path_buf()));
        }
        Ok(object.with_extension("dump"))
    }

    /// Read the cached dump text, running the disassembler first if needed.
    fn read_or_generate(&self, object: &Path) -> Result<String, DumpError> {
        let dump_path = Self::dump_path(object)?;
        if dump_path.is_file() {
            return fs::read_to_string(&dump_path)
                .map_err(|source| DumpError::Io { path: dump_path.clone(), source });
        }
        if !object.is_file() {
            return Err(DumpError::NotFound(object.to_path_buf()));
        }

        debug!("running {} on {}", self.tool, object.display());
        let output = Command::new(&self.tool)
            .args(&self.args)
            .arg(object)
            .output()
            .map_err(|e| DumpError::Tool {
                path: object.to_path_buf(),
                message: format!("failed to spawn {}: {e}", self.tool),
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(DumpError::Tool {
                path: object.to_path_buf(),
                message: format!("{} exited with {}: {stderr}", self.tool, output.status),
            });
        }
        let text = String::from_utf8_lossy(&output.stdout).to_string();
        fs::write(&dump_path, &text)
            .map_err(|source| DumpError::Io { path: dump_path.clone(), source })?;
        Ok(text)
    }

    fn fetch(&self, object: &Path) -> Result<Arc<ObjectDump>, DumpError> {
        let text = self.read_or_generate(object)?;
        Ok(Arc::new(ObjectDump::parse(object, text)?))
    }
}

impl DumpSource for ObjdumpCache {
    fn load(&mut self, object: &Path) -> Result<Arc<ObjectDump>, DumpError> {
        if let Some(dump) = self.parsed.get(object) {
            return Ok(Arc::clone(dump));
        }
        let dump = self.fetch(object)?;
        self.parsed.insert(object.to_path_buf(), Arc::clone(&dump));
        Ok(dump)
    }

    /// Objects are dumped and parsed in parallel; the cache is filled afterwards.
    fn load_many(&mut self, objects: &[PathBuf]) -> Vec<Result<Arc<ObjectDump>, DumpError>> {
        let results: Vec<Result<Arc<ObjectDump>, DumpError>> = {
            let this = &*self;
            objects
                .par_iter()
                .map(|object| match this.parsed.get(object) {
                    Some(dump) => Ok(Arc::clone(dump)),
                    None => this.fetch(object),
                })
                .collect()
        };
        for (object, result) in objects.iter().zip(&results) {
            if let Ok(dump) = result {
                self.parsed.entry(object.clone()).or_insert_with(|| Arc::clone(dump));
            }
        }
        results
    }
}
