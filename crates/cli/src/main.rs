// SpiProbe - SPI Timing Verification Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

mod vcd_trace;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use spiprobe_config::BenchConfig;
use spiprobe_core::scenario::{ScenarioKind, ScenarioReport, ScenarioRunner, ScenarioSettings};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info};

const EXIT_PASS: u8 = 0;
const EXIT_ASSERT_FAIL: u8 = 1;
const EXIT_CONFIG_ERROR: u8 = 2;
const EXIT_RUNTIME_ERROR: u8 = 3;

const RESULT_SCHEMA_VERSION: &str = "1.0";

fn parse_seed(s: &str) -> Result<u64, String> {
    let trimmed = s.trim();
    if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        u64::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex seed '{}': {}", s, e))
    } else {
        u64::from_str(trimmed).map_err(|e| format!("Invalid seed '{}': {}", s, e))
    }
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "SPI timing verification harness",
    long_about = None
)]
struct Cli {
    /// Log every read and device conversion
    #[arg(short, long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run bench scenarios against the device model
    Run(RunArgs),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ScenarioChoice {
    Fixed,
    Sweep,
    Divided,
    All,
}

impl ScenarioChoice {
    fn kinds(self) -> Vec<ScenarioKind> {
        match self {
            ScenarioChoice::Fixed => vec![ScenarioKind::FixedRead],
            ScenarioChoice::Sweep => vec![ScenarioKind::PhaseSweep],
            ScenarioChoice::Divided => vec![ScenarioKind::DividedRead],
            ScenarioChoice::All => ScenarioKind::ALL.to_vec(),
        }
    }
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Path to the bench configuration (YAML). Built-in defaults otherwise.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Scenario(s) to run
    #[arg(short, long, value_enum, default_value_t = ScenarioChoice::All)]
    scenario: ScenarioChoice,

    /// Override the number of random phase offsets in a sweep
    #[arg(long)]
    iterations: Option<u32>,

    /// Override the sweep RNG seed (decimal or 0x-prefixed hex)
    #[arg(long, value_parser = parse_seed)]
    seed: Option<u64>,

    /// Directory to write one VCD waveform per scenario
    #[arg(long)]
    vcd_dir: Option<PathBuf>,

    /// Print the run result as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Directory to write run artifacts (result.json)
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct RunResult {
    result_schema_version: String,
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    config: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    scenarios: Vec<ScenarioReport>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr so `--json` output stays machine readable.
    let level = if cli.trace {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run(args) => run_scenarios(args),
    }
}

fn load_settings(args: &RunArgs) -> anyhow::Result<ScenarioSettings> {
    let mut config = match &args.config {
        Some(path) => BenchConfig::from_file(path)?,
        None => BenchConfig::default(),
    };
    if let Some(iterations) = args.iterations {
        config.sweep.iterations = iterations;
    }
    if let Some(seed) = args.seed {
        config.sweep.seed = seed;
    }
    config.validate()?;
    Ok(ScenarioSettings::from_config(&config)?)
}

fn build_runner(
    settings: &ScenarioSettings,
    kind: ScenarioKind,
    vcd_dir: Option<&Path>,
) -> anyhow::Result<ScenarioRunner> {
    let mut runner = ScenarioRunner::new(settings.clone());
    if let Some(dir) = vcd_dir {
        std::fs::create_dir_all(dir)?;
        let observer = vcd_trace::VcdObserver::create(&dir.join(format!("{kind}.vcd")))?;
        info!("Writing waveform to {:?}", observer.path());
        runner.add_observer(Arc::new(observer));
    }
    Ok(runner)
}

fn run_scenarios(args: RunArgs) -> ExitCode {
    let settings = match load_settings(&args) {
        Ok(settings) => settings,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let mut result = RunResult {
        result_schema_version: RESULT_SCHEMA_VERSION.to_string(),
        status: "pass".to_string(),
        config: args.config.clone(),
        message: None,
        scenarios: Vec::new(),
    };

    for kind in args.scenario.kinds() {
        let outcome = build_runner(&settings, kind, args.vcd_dir.as_deref())
            .and_then(|runner| Ok(runner.run(kind)?));
        let report = match outcome {
            Ok(report) => report,
            Err(e) => {
                error!("{}: {:#}", kind, e);
                result.status = "error".to_string();
                result.message = Some(format!("{kind}: {e:#}"));
                write_outputs(&args, &result);
                return ExitCode::from(EXIT_RUNTIME_ERROR);
            }
        };

        if !args.json {
            println!("{}", summary_line(&report));
        }
        if !report.passed() {
            result.status = "fail".to_string();
            if result.message.is_none() {
                result.message = report.mismatch.map(|m| format!("{kind}: {m}"));
            }
        }
        result.scenarios.push(report);
    }

    write_outputs(&args, &result);
    if result.status == "pass" {
        ExitCode::from(EXIT_PASS)
    } else {
        ExitCode::from(EXIT_ASSERT_FAIL)
    }
}

fn summary_line(report: &ScenarioReport) -> String {
    match &report.mismatch {
        None => format!(
            "{}: PASS ({} reads, {:#06x}, sim time {})",
            report.scenario,
            report.reads.len(),
            report.expected,
            report.sim_time
        ),
        Some(mismatch) => format!("{}: FAIL {}", report.scenario, mismatch),
    }
}

fn write_outputs(args: &RunArgs, result: &RunResult) {
    if args.json {
        match serde_json::to_string_pretty(result) {
            Ok(json) => println!("{}", json),
            Err(e) => error!("Failed to serialize result: {}", e),
        }
    }

    if let Some(output_dir) = &args.output_dir {
        if let Err(e) = std::fs::create_dir_all(output_dir) {
            error!("Failed to create output directory {:?}: {}", output_dir, e);
            return;
        }
        let result_path = output_dir.join("result.json");
        match std::fs::File::create(&result_path) {
            Ok(f) => {
                if let Err(e) = serde_json::to_writer_pretty(f, result) {
                    error!("Failed to write result.json: {}", e);
                }
            }
            Err(e) => error!("Failed to create {:?}: {}", result_path, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_seed() {
        assert_eq!(parse_seed("42"), Ok(42));
        assert_eq!(parse_seed("0x5EED"), Ok(0x5EED));
        assert!(parse_seed("seed").is_err());
    }

    #[test]
    fn test_scenario_choice_expands() {
        assert_eq!(ScenarioChoice::All.kinds().len(), 3);
        assert_eq!(ScenarioChoice::Sweep.kinds(), vec![ScenarioKind::PhaseSweep]);
    }

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::parse_from(["spiprobe", "run", "--scenario", "fixed", "--seed", "0x10"]);
        let Commands::Run(args) = cli.command;
        assert_eq!(args.scenario, ScenarioChoice::Fixed);
        assert_eq!(args.seed, Some(16));
        assert!(!cli.trace);
    }
}
