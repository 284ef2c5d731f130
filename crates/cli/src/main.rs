//! `mcpsim`: command-line front end for the near-memory-processing
//! co-simulation engine.
//!
//! Two subcommands: `run` drives a full simulation from a config file and
//! one trace per Host core; `validate-config` parses and validates a config
//! file without running anything, for CI.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use mcpsim_core::bb_info::BbInfo;
use mcpsim_core::common::SimError;
use mcpsim_core::common::error::ConfigFileError;
use mcpsim_core::config::{Config, SimMode};
use mcpsim_core::memory::LatencyMemory;
use mcpsim_core::offload::MemVsNonMem;
use mcpsim_core::opcode_table::OpcodeTable;
use mcpsim_core::sim::Simulator;
use tracing::{error, warn};

/// Near-memory-processing co-simulation engine.
#[derive(Parser)]
#[command(name = "mcpsim", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a co-simulation to completion and report statistics.
    Run {
        /// Path to the JSON configuration file.
        #[arg(long)]
        config: PathBuf,
        /// Trace files, one per Host core, assigned by position.
        #[arg(long, required = true, num_args = 1..)]
        trace: Vec<PathBuf>,
        /// Path to write the statistics report; defaults to `<standard>.stats`.
        #[arg(long)]
        stats: Option<PathBuf>,
    },
    /// Parse and validate a configuration file without running anything.
    ValidateConfig {
        /// Path to the JSON configuration file.
        #[arg(long)]
        config: PathBuf,
    },
}

fn install_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_env("MCPSIM_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config(path: &Path) -> Result<Config, SimError> {
    let contents = std::fs::read_to_string(path).map_err(|source| SimError::ConfigFile {
        path: path.to_path_buf(),
        source: ConfigFileError::Io(source),
    })?;
    let config: Config = serde_json::from_str(&contents).map_err(|source| SimError::ConfigFile {
        path: path.to_path_buf(),
        source: ConfigFileError::Json(source),
    })?;
    config.validate()?;
    Ok(config)
}

fn cmd_run(config_path: &Path, traces: Vec<PathBuf>, stats_path: Option<PathBuf>) -> Result<(), SimError> {
    let config = load_config(config_path)?;

    let opcodes = match &config.opcode_table_path {
        Some(path) => OpcodeTable::load(Path::new(path)).unwrap_or_else(|err| {
            warn!(path, error = %err, "opcode table failed to load; every opcode defaults to zero bubbles");
            OpcodeTable::empty()
        }),
        None => OpcodeTable::empty(),
    };

    let mut bb_info = HashMap::new();
    if config.sim_mode == SimMode::CoSimulation {
        let json_dir = Path::new(&config.json_path);
        for process_id in 0..u64::from(config.number_cores) {
            match BbInfo::load(json_dir, process_id) {
                Ok(Some(info)) => {
                    let _ = bb_info.insert(process_id, info);
                }
                Ok(None) => {
                    warn!(process_id, "no basic-block descriptor found; offload heuristic degrades to never-offload for this process");
                }
                Err(err) => {
                    error!(process_id, error = %err, "basic-block descriptor failed to load");
                }
            }
        }
    }

    let memory = Box::new(LatencyMemory::new(
        config.mem_latency_cycles,
        config.mem_clk_ns,
        config.mem_max_in_flight,
    ));
    let policy = Box::new(MemVsNonMem);
    let standard = config.standard.clone();

    let mut simulator = Simulator::new(config, traces, opcodes, policy, bb_info, memory)?;
    let run_result = simulator.run_to_completion();

    let stats_path = stats_path.unwrap_or_else(|| PathBuf::from(format!("{standard}.stats")));
    if let Err(err) = simulator.stats().write_to_file(&stats_path) {
        warn!(path = %stats_path.display(), error = %err, "failed to write statistics file");
    }
    simulator.stats().print();

    run_result
}

fn cmd_validate_config(config_path: &Path) -> Result<(), SimError> {
    let _ = load_config(config_path)?;
    println!("{} is valid", config_path.display());
    Ok(())
}

fn main() -> ExitCode {
    install_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run { config, trace, stats } => cmd_run(&config, trace, stats),
        Commands::ValidateConfig { config } => cmd_validate_config(&config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "fatal error");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
