//! `kpi-eval` CLI: evaluate recordings against ground truth, run scenarios.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use kpi_core::association::AssociationPolicy;
use kpi_core::evaluator::{not_assessed_report, EvaluatorConfig, KpiEvaluator, KpiReport};
use kpi_core::KpiError;
use sim::recording::{index_ground_truth, load_ground_truth, load_recording, save_recording, Recording};
use sim::scenarios::{Scenario, ScenarioKind};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "kpi-eval", about = "Parking perception KPI evaluation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum PolicyArg {
    Greedy,
    Optimal,
}

impl From<PolicyArg> for AssociationPolicy {
    fn from(p: PolicyArg) -> Self {
        match p {
            PolicyArg::Greedy => AssociationPolicy::Greedy,
            PolicyArg::Optimal => AssociationPolicy::Optimal,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate a named scenario and evaluate its detections.
    RunScenario {
        #[arg(value_enum)]
        scenario: ScenarioKind,
        /// Random seed for reproducibility
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Evaluator configuration (JSON); defaults to the scenario's preset
        #[arg(long)]
        config: Option<PathBuf>,
        /// Override the association policy
        #[arg(long, value_enum)]
        policy: Option<PolicyArg>,
        /// Override the association radius (m)
        #[arg(long)]
        radius: Option<f64>,
        /// Evaluate every camera on its own as well
        #[arg(long)]
        per_source: bool,
        /// Write the KPI report to a JSON file
        #[arg(long)]
        output: Option<PathBuf>,
        /// Also save the full recording
        #[arg(long)]
        save_recording: Option<PathBuf>,
    },
    /// Evaluate a previously saved recording.
    Evaluate {
        /// Path to the recording JSON file
        input: PathBuf,
        /// Ground truth JSON file, if not embedded in the recording
        #[arg(long)]
        ground_truth: Option<PathBuf>,
        /// Evaluator configuration (JSON)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Write the KPI report to a JSON file
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::RunScenario {
            scenario,
            seed,
            config,
            policy,
            radius,
            per_source,
            output,
            save_recording: save_path,
        } => {
            let scenario = Scenario::build(scenario, seed)?;
            let mut config = match config {
                Some(path) => load_config(&path)?,
                None => EvaluatorConfig {
                    association: scenario.association_config(),
                    ..Default::default()
                },
            };
            if let Some(p) = policy {
                config.association.policy = p.into();
            }
            if let Some(r) = radius {
                config.association.max_radius = r;
            }
            config.partition_by_source |= per_source;
            run_scenario(&scenario, config, output.as_deref(), save_path.as_deref())?;
        }
        Commands::Evaluate {
            input,
            ground_truth,
            config,
            output,
        } => {
            let config = match config {
                Some(path) => load_config(&path)?,
                None => EvaluatorConfig::default(),
            };
            run_evaluate(&input, ground_truth.as_deref(), config, output.as_deref())?;
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> Result<EvaluatorConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config: EvaluatorConfig = serde_json::from_str(&text)
        .with_context(|| format!("parsing config {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

fn run_scenario(
    scenario: &Scenario,
    config: EvaluatorConfig,
    output_path: Option<&Path>,
    recording_path: Option<&Path>,
) -> Result<()> {
    println!(
        "Running scenario '{}' (seed={}, duration={:.0}s, {} landmarks)...",
        scenario.name,
        scenario.seed,
        scenario.duration,
        scenario.landmarks.len()
    );

    let start = std::time::Instant::now();
    let recording = scenario.record();
    println!(
        "Recorded {} frames, {} ground-truth frames in {:.2}s",
        recording.frames.len(),
        recording.ground_truth.len(),
        start.elapsed().as_secs_f64()
    );

    if let Some(rpath) = recording_path {
        save_recording(&recording, rpath)?;
        println!("Recording saved to {}", rpath.display());
    }

    let report = evaluate(&recording, config)?;
    print_report(&report);
    write_report(&report, output_path)
}

fn run_evaluate(
    input: &Path,
    ground_truth_path: Option<&Path>,
    config: EvaluatorConfig,
    output_path: Option<&Path>,
) -> Result<()> {
    let mut recording = load_recording(input)?;
    if let Some(path) = ground_truth_path {
        if !recording.ground_truth.is_empty() {
            warn!("recording has embedded ground truth, replacing it with {}", path.display());
        }
        recording.ground_truth = load_ground_truth(path)?;
    }
    println!(
        "Evaluating '{}' ({} frames, {} ground-truth frames)...",
        recording.scenario_name,
        recording.frames.len(),
        recording.ground_truth.len()
    );

    let report = evaluate(&recording, config)?;
    print_report(&report);
    write_report(&report, output_path)
}

/// Runs the evaluator; empty ground truth yields a `NotAssessed` report.
fn evaluate(recording: &Recording, config: EvaluatorConfig) -> Result<KpiReport> {
    let ground_truth = index_ground_truth(recording.ground_truth.iter().cloned());
    let mut evaluator = KpiEvaluator::new(config.clone())?;
    let start = std::time::Instant::now();
    match evaluator.evaluate(&recording.frames, &ground_truth) {
        Ok(report) => {
            info!(elapsed_s = start.elapsed().as_secs_f64(), "evaluation done");
            Ok(report)
        }
        Err(KpiError::EmptyGroundTruth) => Ok(not_assessed_report(&config)),
        Err(e) => Err(e.into()),
    }
}

fn print_report(report: &KpiReport) {
    let t = &report.tally;
    println!(
        "Verdict: {:?}  ratio={:.4} ({:?}, threshold {:.2})",
        report.verdict, report.ratio, report.ratio_basis, report.pass_threshold
    );
    println!(
        "TP={} FP={} FN={}  precision={:.4} recall={:.4}  frames={} skipped={}",
        t.true_positive_count,
        t.false_positive_count,
        t.false_negative_count(),
        report.precision,
        report.recall,
        report.frames_assessed,
        report.frames_skipped,
    );
    for s in &report.per_source {
        println!(
            "  {}: ratio={:.4} TP={} FP={}",
            s.source, s.ratio, s.tally.true_positive_count, s.tally.false_positive_count
        );
    }
}

fn write_report(report: &KpiReport, output_path: Option<&Path>) -> Result<()> {
    if let Some(opath) = output_path {
        std::fs::write(opath, serde_json::to_string_pretty(report)?)
            .with_context(|| format!("writing {}", opath.display()))?;
        println!("Report saved to {}", opath.display());
    }
    Ok(())
}
