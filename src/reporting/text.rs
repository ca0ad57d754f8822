//! Plain-text report files under the experiment directory

use super::{ReportSink, ResultsArtifact};
use crate::config::ExperimentConfig;
use crate::dataset::Partition;
use crate::error::{Error, Result};
use crate::model::{PartitionResult, SvmModel};
use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

pub const EXP_CONFIG_FILE: &str = "log_exp_config.txt";
pub const MODEL_SUMMARY_FILE: &str = "log_svm.txt";
pub const AD_RESULTS_FILE: &str = "log_ad_results.txt";

fn opt(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{}", v))
}

fn write_report(path: &Path, body: &str) -> Result<()> {
    fs::write(path, body).map_err(|e| Error::reporting(&path.display().to_string(), e))?;
    info!("Report written to {}", path.display());
    Ok(())
}

/// 相対パスの info ファイルは xp_dir 基準で解決する
pub fn resolve_info_file(xp_dir: &Path, info_file: &Path) -> PathBuf {
    if info_file.is_absolute() {
        info_file.to_path_buf()
    } else {
        xp_dir.join(info_file)
    }
}

/// xp_dir 配下にテキストレポートを書き出すシンク
#[derive(Debug, Default, Clone)]
pub struct TextReportSink;

impl TextReportSink {
    pub fn new() -> Self {
        Self
    }

    fn partition_block(out: &mut String, result: &PartitionResult) {
        let _ = writeln!(out, "[{}]", result.partition);
        let _ = writeln!(out, "{:18}: {}", "samples", result.n_samples);
        let _ = writeln!(out, "{:18}: {}", "outliers", result.n_outliers);
        let _ = writeln!(out, "{:18}: {}", "AUC", opt(result.auc.map(|a| a * 100.0)));
        let _ = writeln!(out, "{:18}: {:.2}", "accuracy (%)", result.accuracy);
        let _ = writeln!(out, "{:18}: {}", "predicted outliers", result.predicted_outliers);
        let _ = writeln!(out, "{:18}: {:.3}s", "time", result.seconds);
        if let Some(s) = &result.summary {
            let _ = writeln!(
                out,
                "{:18}: mean {:.6}, std {:.6}, min {:.6}, median {:.6}, max {:.6}",
                "scores", s.mean, s.std_dev, s.min, s.median, s.max
            );
        }
        out.push('\n');
    }
}

impl ReportSink for TextReportSink {
    fn log_exp_config(&self, config: &ExperimentConfig) -> Result<()> {
        let mut out = String::from("Experiment configuration\n\n");
        for line in config.summary_lines() {
            out.push_str(&line);
            out.push('\n');
        }
        let table = toml::to_string_pretty(config)
            .map_err(|e| Error::reporting("cannot render configuration", e))?;
        out.push_str("\n# Resolved configuration\n");
        out.push_str(&table);
        write_report(&config.xp_dir.join(EXP_CONFIG_FILE), &out)
    }

    fn log_model_summary(&self, config: &ExperimentConfig, model: &SvmModel) -> Result<()> {
        let fitted = model.fitted()?;
        let p = &fitted.params;
        let mut out = String::from("SVM model summary\n\n");
        let _ = writeln!(out, "{:18}: {}", "loss", fitted.loss);
        let _ = writeln!(out, "{:18}: {}", "kernel", fitted.kernel.kind());
        let _ = writeln!(out, "{:18}: {}", "gamma", opt(p.gamma));
        let _ = writeln!(out, "{:18}: {}", "nu", opt(p.nu));
        let _ = writeln!(out, "{:18}: {}", "C", opt(p.c));
        let _ = writeln!(out, "{:18}: {}", "GridSearchCV", p.grid_searched);
        if let Some(auc) = p.validation_auc {
            let _ = writeln!(out, "{:18}: {:.2}", "validation AUC", auc * 100.0);
        }
        let _ = writeln!(out, "{:18}: {}", "support vectors", p.n_support);
        let _ = writeln!(out, "{:18}: {}", "rho", p.rho);
        let _ = writeln!(out, "{:18}: {:.3}s", "train time", fitted.train_seconds);
        write_report(&config.xp_dir.join(MODEL_SUMMARY_FILE), &out)
    }

    fn log_ad_results(&self, config: &ExperimentConfig, results: &ResultsArtifact) -> Result<()> {
        let mut out = String::from("Anomaly detection results\n\n");
        let _ = writeln!(out, "{:18}: {}", "run id", results.run_id);
        let _ = writeln!(out, "{:18}: {}", "created at", results.created_at.to_rfc3339());
        out.push('\n');
        for result in &results.partitions {
            Self::partition_block(&mut out, result);
        }
        write_report(&config.xp_dir.join(AD_RESULTS_FILE), &out)
    }

    fn log_ad_info(&self, config: &ExperimentConfig, results: &ResultsArtifact) -> Result<()> {
        let Some(info_file) = &config.info_file else {
            return Ok(());
        };
        let path = resolve_info_file(&config.xp_dir, info_file);
        let auc = |p: Partition| {
            opt(results
                .partition(p)
                .and_then(|r| r.auc)
                .map(|a| (a * 10_000.0).round() / 100.0))
        };
        let line = format!(
            "{}\t{}\tnormal={}\toutlier={}\t{}\t{}\tnu={}\tgamma={}\ttrain_auc={}\ttest_auc={}\t{}\n",
            results.created_at.to_rfc3339(),
            results.dataset,
            config.split().classes.normal(),
            config.split().classes.outlier(),
            results.loss,
            results.kernel,
            opt(results.fitted.nu),
            opt(results.fitted.gamma),
            auc(Partition::Train),
            auc(Partition::Test),
            config.xp_dir.display(),
        );
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| Error::reporting(&path.display().to_string(), e))?;
        file.write_all(line.as_bytes())
            .map_err(|e| Error::reporting(&path.display().to_string(), e))?;
        Ok(())
    }
}
