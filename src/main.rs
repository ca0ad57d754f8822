//! ocsvm-rs Binary Entry Point
//!
//! Runs one anomaly-detection experiment and exits non-zero on any fatal error.

use clap::Parser;
use ocsvm_rs::config::{CliArgs, ConfigLoader, RawArguments};
use ocsvm_rs::dataset::Partition;
use ocsvm_rs::logging::init_logging;
use ocsvm_rs::{Collaborators, PipelineController, Result, RunReport};
use std::process::ExitCode;
use tracing::{error, info, warn};

fn main() -> ExitCode {
    let cli = CliArgs::parse();

    let raw = match ConfigLoader::new().load_from_env().load_from_cli(&cli).build() {
        Ok(raw) => raw,
        Err(e) => {
            eprintln!("❌ {}", e);
            return ExitCode::from(e.exit_code());
        }
    };

    // 診断ログは xp_dir が存在する場合のみファイルにも書く
    let log_config = cli.log_config(raw.xp_dir.as_deref());
    let _guard = match init_logging(&log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("⚠️  Logging disabled: {}", e);
            None
        }
    };

    let mut pipeline = PipelineController::new(Collaborators::filesystem());
    match execute(&mut pipeline, &raw) {
        Ok(report) => {
            print_report(&report);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Experiment aborted in state {}: {}", pipeline.state(), e);
            eprintln!("❌ {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

/// Drives the pipeline, echoing the resolved options once configured
fn execute(pipeline: &mut PipelineController, raw: &RawArguments) -> Result<RunReport> {
    let config = pipeline.configure(raw)?;
    info!("Experiment options:");
    for line in config.summary_lines() {
        info!("  {}", line);
    }

    pipeline.build_model()?;
    let fitted = pipeline.train()?;
    info!(
        "Fitted gamma={:?} nu={:?} C={:?} ({} support vectors)",
        fitted.gamma, fitted.nu, fitted.c, fitted.n_support
    );
    pipeline.score()?;
    pipeline.report()?;
    pipeline.persist()?;
    pipeline.finish()
}

fn print_report(report: &RunReport) {
    println!("✅ Experiment finished (run {})", report.results.run_id);
    for partition in [Partition::Train, Partition::Val, Partition::Test] {
        if let Some(result) = report.results.partition(partition) {
            match result.auc {
                Some(auc) => println!("  {:5} AUC: {:.2}%", partition.to_string(), auc * 100.0),
                None => println!("  {:5} AUC: n/a (single class)", partition.to_string()),
            }
        }
    }
    for path in report.artifacts.iter().chain(report.plot.iter()) {
        println!("  📄 {}", path.display());
    }
    for warning in &report.warnings {
        warn!("{}", warning);
        println!("  ⚠️  {}", warning);
    }
}
