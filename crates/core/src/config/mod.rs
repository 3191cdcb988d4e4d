//! Analysis configuration and output layout.
//!
//! - `AnalysisConfig`: serializable run settings (build/kernel/driver/output
//!   roots, entry pattern, disassembler invocation).
//! - `OutputLayout`: computed paths of every artifact under the output root.

mod layout;

pub use layout::OutputLayout;

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

/// Cross objdump used when the config does not name one.
pub const DEFAULT_OBJDUMP: &str = "arm-linux-gnueabihf-objdump";

fn default_objdump() -> String {
    DEFAULT_OBJDUMP.to_string()
}

/// `-D` full disassembly, `-r` inline relocations, `-t` symbol table.
fn default_objdump_args() -> Vec<String> {
    vec!["-D".into(), "-r".into(), "-t".into()]
}

/// Serializable settings for one analysis run.
///
/// Typically stored as YAML (or JSON) next to the build; relative paths are
/// resolved against the directory containing the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Root of the build output holding the `.o` files.
    pub build_path: PathBuf,
    /// Kernel source tree mirroring `build_path`; objects without a `.c` here are skipped.
    pub kernel_path: PathBuf,
    /// Directory whose first-level subdirectories are analyzed as drivers.
    /// Must lie inside `build_path`.
    pub driver_path: PathBuf,
    /// Where listings, reports and done markers are written.
    pub output_path: PathBuf,
    /// Regular expression selecting entry functions by symbol name.
    pub entry_pattern: String,
    /// Disassembler executable.
    #[serde(default = "default_objdump")]
    pub objdump: String,
    /// Arguments passed before the object path.
    #[serde(default = "default_objdump_args")]
    pub objdump_args: Vec<String>,
}

impl AnalysisConfig {
    pub fn new(
        build_path: impl Into<PathBuf>,
        kernel_path: impl Into<PathBuf>,
        driver_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
        entry_pattern: impl Into<String>,
    ) -> Self {
        Self {
            build_path: build_path.into(),
            kernel_path: kernel_path.into(),
            driver_path: driver_path.into(),
            output_path: output_path.into(),
            entry_pattern: entry_pattern.into(),
            objdump: default_objdump(),
            objdump_args: default_objdump_args(),
        }
    }

    /// Make every relative path absolute with respect to `base`.
    pub fn resolve_relative_to(&mut self, base: &Path) {
        for path in [
            &mut self.build_path,
            &mut self.kernel_path,
            &mut self.driver_path,
            &mut self.output_path,
        ] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }

    /// Check the settings before any work starts.
    ///
    /// The input trees must exist, the driver tree must sit inside the build
    /// tree (source paths are derived from the build-relative object path),
    /// and the entry pattern must be a valid, non-empty regular expression.
    pub fn validate(&self) -> Result<()> {
        if self.entry_pattern.trim().is_empty() {
            return Err(anyhow!("Config 'entry_pattern' is required"));
        }
        regex::Regex::new(&self.entry_pattern)
            .with_context(|| format!("Invalid entry_pattern {:?}", self.entry_pattern))?;
        if self.objdump.trim().is_empty() {
            return Err(anyhow!("Config 'objdump' must name a disassembler"));
        }
        for (label, path) in [
            ("build_path", &self.build_path),
            ("kernel_path", &self.kernel_path),
            ("driver_path", &self.driver_path),
        ] {
            if !path.is_dir() {
                return Err(anyhow!("Config '{label}' is not a directory: {}", path.display()));
            }
        }
        if !self.driver_path.starts_with(&self.build_path) {
            return Err(anyhow!(
                "driver_path {} is not inside build_path {}",
                self.driver_path.display(),
                self.build_path.display()
            ));
        }
        Ok(())
    }
}

/// Load a config from YAML or JSON (chosen by extension) and resolve its
/// relative paths against the file's directory.
pub fn load_config(path: &Path) -> Result<AnalysisConfig> {
    let body = std::fs::read(path)
        .with_context(|| format!("Failed to read analysis config at {}", path.display()))?;
    let mut config: AnalysisConfig = if path.extension().and_then(|e| e.to_str()) == Some("json")
    {
        serde_json::from_slice(&body).context("Failed to parse analysis config JSON")?
    } else {
        serde_yaml::from_slice(&body).context("Failed to parse analysis config YAML")?
    };
    let base = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    config.resolve_relative_to(base);
    Ok(config)
}
