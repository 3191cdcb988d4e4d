use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::services::pipeline::PipelineError;

/// Whether `file_name` looks like a compiled translation unit (`foo.o`).
/// Multi-dot names such as `foo.mod.o` and archive members like `(x).o` are not.
pub fn is_object_name(file_name: &str) -> bool {
    match file_name.strip_suffix(".o") {
        Some(stem) => !stem.is_empty() && !stem.contains(['(', ')', '.']),
        None => false,
    }
}

/// Maps object files in the build tree to their C sources in the kernel tree.
#[derive(Debug, Clone)]
pub struct SourceFilter {
    build_root: PathBuf,
    kernel_root: PathBuf,
}

impl SourceFilter {
    pub fn new(build_root: impl Into<PathBuf>, kernel_root: impl Into<PathBuf>) -> Self {
        Self { build_root: build_root.into(), kernel_root: kernel_root.into() }
    }

    /// `<kernel_root>/<object path relative to build_root>` with a `.c` extension.
    pub fn source_for(&self, object: &Path) -> Result<PathBuf, PipelineError> {
        let relative = object.strip_prefix(&self.build_root).map_err(|_| {
            PipelineError::OutsideBuildRoot {
                path: object.to_path_buf(),
                root: self.build_root.clone(),
            }
        })?;
        Ok(self.kernel_root.join(relative).with_extension("c"))
    }

    /// An object is analyzable when its name qualifies and its source exists.
    pub fn is_analyzable(&self, object: &Path) -> Result<bool, PipelineError> {
        let named_like_object =
            object.file_name().and_then(|n| n.to_str()).map(is_object_name).unwrap_or(false);
        if !named_like_object {
            return Ok(false);
        }
        Ok(self.source_for(object)?.is_file())
    }

    /// All analyzable objects under `dir`, in a stable order.
    pub fn collect_objects(&self, dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
        let mut objects = Vec::new();
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            if self.is_analyzable(entry.path())? {
                objects.push(entry.into_path());
            }
        }
        Ok(objects)
    }
}

/// First-level subdirectories of `root` as `(name, path)`, sorted by name.
pub fn driver_dirs(root: &Path) -> Result<Vec<(String, PathBuf)>, PipelineError> {
    let mut dirs = Vec::new();
    let entries = fs::read_dir(root)
        .map_err(|source| PipelineError::Io { path: root.to_path_buf(), source })?;
    for entry in entries {
        let entry = entry.map_err(|source| PipelineError::Io { path: root.to_path_buf(), source })?;
        let file_type = entry
            .file_type()
            .map_err(|source| PipelineError::Io { path: entry.path(), source })?;
        if !file_type.is_dir() {
            continue;
        }
        dirs.push((entry.file_name().to_string_lossy().to_string(), entry.path()));
    }
    dirs.sort();
    Ok(dirs)
}
