//! テストデータとユーティリティ
//!
//! 2 次元の合成データセット（正常クラス 0 は原点付近、外れ値クラス 1 は右上）を
//! 返すローダーと、実験引数・協調者のモック。

#![allow(dead_code)]

use ndarray::Array2;
use ocsvm_rs::config::{ExperimentConfig, RawArguments};
use ocsvm_rs::dataset::{assemble, DatasetLoader, DatasetSelection, LoadedDataset, RawSplit, SourceSplits};
use ocsvm_rs::error::{Error, Result};
use ocsvm_rs::model::SvmModel;
use ocsvm_rs::reporting::{ArtifactWriter, ExemplarPlotter, ReportSink, ResultsArtifact};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn cluster(rng: &mut StdRng, n: usize, lo: f64, hi: f64, label: u32) -> (Vec<f64>, Vec<u32>) {
    let values = (0..n * 2).map(|_| rng.gen_range(lo..hi)).collect();
    (values, vec![label; n])
}

fn split(rng: &mut StdRng, n_normal: usize, n_outlier: usize) -> RawSplit {
    let (mut values, mut labels) = cluster(rng, n_normal, 0.0, 0.3, 0);
    let (outlier_values, outlier_labels) = cluster(rng, n_outlier, 0.7, 1.0, 1);
    values.extend(outlier_values);
    labels.extend(outlier_labels);
    let features = Array2::from_shape_vec((labels.len(), 2), values).unwrap();
    RawSplit::new(features, labels).unwrap()
}

/// Two well separated clusters; the generator seed is fixed so runs are reproducible
pub fn synthetic_splits() -> SourceSplits {
    let mut rng = StdRng::seed_from_u64(42);
    SourceSplits {
        train: split(&mut rng, 40, 10),
        test: split(&mut rng, 20, 10),
        shape: None,
    }
}

/// In-memory loader that counts how often it was asked for data
#[derive(Debug, Default, Clone)]
pub struct SyntheticLoader {
    pub calls: Arc<AtomicUsize>,
}

impl SyntheticLoader {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl DatasetLoader for SyntheticLoader {
    fn load(&self, selection: &DatasetSelection) -> Result<LoadedDataset> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assemble(selection, synthetic_splits())
    }
}

/// Artifact writer whose disk is always full
pub struct FailingArtifactWriter;

impl ArtifactWriter for FailingArtifactWriter {
    fn write_model(&self, _model: &SvmModel, xp_dir: &Path) -> Result<PathBuf> {
        Err(Error::Serialization(format!(
            "{}: no space left on device",
            xp_dir.display()
        )))
    }

    fn write_results(&self, _results: &ResultsArtifact, xp_dir: &Path) -> Result<PathBuf> {
        Err(Error::Serialization(format!(
            "{}: no space left on device",
            xp_dir.display()
        )))
    }
}

/// Report sink whose every write fails
pub struct FailingReportSink;

impl ReportSink for FailingReportSink {
    fn log_exp_config(&self, _config: &ExperimentConfig) -> Result<()> {
        Err(Error::Reporting("read-only file system".to_string()))
    }

    fn log_model_summary(&self, _config: &ExperimentConfig, _model: &SvmModel) -> Result<()> {
        Err(Error::Reporting("read-only file system".to_string()))
    }

    fn log_ad_results(&self, _config: &ExperimentConfig, _results: &ResultsArtifact) -> Result<()> {
        Err(Error::Reporting("read-only file system".to_string()))
    }

    fn log_ad_info(&self, _config: &ExperimentConfig, _results: &ResultsArtifact) -> Result<()> {
        Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "info file is locked",
        )))
    }
}

pub struct FailingPlotter;

impl ExemplarPlotter for FailingPlotter {
    fn plot(&self, _model: &SvmModel, _n_img: usize, _stem: &Path) -> Result<PathBuf> {
        Err(Error::Reporting("display unavailable".to_string()))
    }
}

/// OC-SVM / rbf arguments on the synthetic data
pub fn raw_args(xp_dir: &Path) -> RawArguments {
    RawArguments {
        dataset: Some("mnist".to_string()),
        xp_dir: Some(xp_dir.display().to_string()),
        loss: Some("OneClassSVM".to_string()),
        kernel: Some("rbf".to_string()),
        nu: 0.1,
        ..RawArguments::default()
    }
}
