use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use drvgraph::commands::{
    globals_command, init_config_command, inspect_command, load_config_with_overrides,
    run_command, ConfigOverrides,
};

/// Static call-graph auditing of kernel driver entry paths.
///
/// This CLI is a thin wrapper around `drvgraph-core` (exposed in code as
/// `drvgraph_core`). All substantive logic lives in the library so it can be
/// tested thoroughly and reused from other frontends.
#[derive(Parser, Debug)]
#[command(
    name = "drvgraph",
    version,
    about = "Static call-graph auditing of kernel driver entry paths",
    long_about = None
)]
struct Cli {
    /// Log verbosity: trace, debug, info, warn, error or off.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

/// Config file plus per-field overrides shared by the pipeline commands.
#[derive(Args, Debug)]
struct ConfigArgs {
    /// Analysis config (YAML, or JSON by extension).
    #[arg(long)]
    config: Option<String>,

    /// Build output root holding the object files.
    #[arg(long)]
    build_path: Option<String>,

    /// Kernel source root mirroring the build tree.
    #[arg(long)]
    kernel_path: Option<String>,

    /// Directory whose subdirectories are analyzed as drivers.
    #[arg(long)]
    driver_path: Option<String>,

    /// Output root for listings and reports.
    #[arg(long)]
    output_path: Option<String>,

    /// Regular expression selecting entry functions.
    #[arg(long)]
    entry_pattern: Option<String>,

    /// Disassembler executable.
    #[arg(long)]
    objdump: Option<String>,
}

impl ConfigArgs {
    fn load(self) -> Result<drvgraph_core::config::AnalysisConfig> {
        let overrides = ConfigOverrides {
            build_path: self.build_path,
            kernel_path: self.kernel_path,
            driver_path: self.driver_path,
            output_path: self.output_path,
            entry_pattern: self.entry_pattern,
            objdump: self.objdump,
        };
        load_config_with_overrides(self.config.as_deref(), overrides)
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a template analysis config.
    InitConfig {
        /// Where to write the config.
        #[arg(long, default_value = "drvgraph.yaml")]
        path: String,

        /// Overwrite an existing file.
        #[arg(long, default_value_t = false)]
        force: bool,
    },

    /// Run the full analysis: global function pass, then every driver.
    ///
    /// Drivers with a done marker from an earlier run are skipped.
    Run {
        #[command(flatten)]
        config: ConfigArgs,

        /// Redo drivers already marked done and rebuild the global list.
        #[arg(long, default_value_t = false)]
        force: bool,

        /// Emit the run summary as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Only build (or reload) the global function list.
    Globals {
        #[command(flatten)]
        config: ConfigArgs,

        /// Rebuild the list even if one exists.
        #[arg(long, default_value_t = false)]
        force: bool,

        /// Emit the summary as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Analyze existing objdump output files and print the call trees.
    Inspect {
        /// objdump -t -D output file; repeatable.
        #[arg(long = "dump", required = true)]
        dumps: Vec<String>,

        /// Regular expression selecting entry functions.
        #[arg(long)]
        entry_pattern: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    drvgraph::init_logging(&cli.log_level);

    match cli.command {
        Command::InitConfig { path, force } => init_config_command(&path, force)?,
        Command::Run { config, force, json } => run_command(config.load()?, force, json)?,
        Command::Globals { config, force, json } => {
            globals_command(config.load()?, force, json)?
        }
        Command::Inspect { dumps, entry_pattern } => inspect_command(&dumps, &entry_pattern)?,
    }

    Ok(())
}
