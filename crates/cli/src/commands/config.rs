use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use drvgraph_core::config::{load_config, AnalysisConfig};

use crate::canonicalize_or_current;

/// Command-line values that replace (or, without a config file, supply)
/// individual config fields.
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub build_path: Option<String>,
    pub kernel_path: Option<String>,
    pub driver_path: Option<String>,
    pub output_path: Option<String>,
    pub entry_pattern: Option<String>,
    pub objdump: Option<String>,
}

impl ConfigOverrides {
    fn apply(self, config: &mut AnalysisConfig) -> Result<()> {
        if let Some(p) = self.build_path {
            config.build_path = canonicalize_or_current(&p)?;
        }
        if let Some(p) = self.kernel_path {
            config.kernel_path = canonicalize_or_current(&p)?;
        }
        if let Some(p) = self.driver_path {
            config.driver_path = canonicalize_or_current(&p)?;
        }
        if let Some(p) = self.output_path {
            config.output_path = canonicalize_or_current(&p)?;
        }
        if let Some(pattern) = self.entry_pattern {
            config.entry_pattern = pattern;
        }
        if let Some(tool) = self.objdump {
            config.objdump = tool;
        }
        Ok(())
    }

    /// Build a config purely from flags; all paths and the pattern are required.
    fn into_config(self) -> Result<AnalysisConfig> {
        let missing = |flag: &str| anyhow!("--{flag} is required when no --config is given");
        let build = self.build_path.clone().ok_or_else(|| missing("build-path"))?;
        let kernel = self.kernel_path.clone().ok_or_else(|| missing("kernel-path"))?;
        let driver = self.driver_path.clone().ok_or_else(|| missing("driver-path"))?;
        let output = self.output_path.clone().ok_or_else(|| missing("output-path"))?;
        let pattern = self.entry_pattern.clone().ok_or_else(|| missing("entry-pattern"))?;

        let mut config = AnalysisConfig::new(
            canonicalize_or_current(&build)?,
            canonicalize_or_current(&kernel)?,
            canonicalize_or_current(&driver)?,
            canonicalize_or_current(&output)?,
            pattern,
        );
        if let Some(tool) = self.objdump {
            config.objdump = tool;
        }
        Ok(config)
    }
}

/// Load the config file (if any), apply overrides and validate the result.
pub fn load_config_with_overrides(
    config_path: Option<&str>,
    overrides: ConfigOverrides,
) -> Result<AnalysisConfig> {
    let config = match config_path {
        Some(path) => {
            let path = canonicalize_or_current(path)?;
            let mut config = load_config(&path)?;
            overrides.apply(&mut config)?;
            config
        }
        None => overrides.into_config()?,
    };
    config.validate()?;
    Ok(config)
}

/// Default config written by `init-config`, with paths relative to the file.
pub fn template_config() -> AnalysisConfig {
    AnalysisConfig::new(
        "build",
        "kernel",
        "build/drivers",
        "drvgraph-out",
        r"^\w+_(probe|remove|suspend|resume)$",
    )
}

/// Write a template config to `path`.
pub fn init_config_command(path: &str, force: bool) -> Result<()> {
    let path = Path::new(path);
    if path.exists() && !force {
        return Err(anyhow!(
            "Config already exists at {} (use --force to overwrite)",
            path.display()
        ));
    }

    let config = template_config();
    let body = if path.extension().and_then(|e| e.to_str()) == Some("json") {
        serde_json::to_string_pretty(&config)?
    } else {
        serde_yaml::to_string(&config)?
    };
    fs::write(path, body)
        .with_context(|| format!("Failed to write config to {}", path.display()))?;

    println!("Wrote analysis config template to {}", path.display());
    println!("Edit build_path, kernel_path, driver_path and entry_pattern before running.");
    Ok(())
}
