//! Reporting Sinks
//!
//! パイプライン出力の一方向の消費者。
//!
//! - [`ReportSink`]: 実験設定・モデル要約・AD 結果のテキストログ
//! - [`ArtifactWriter`]: `model.p` / `AD_results.p` の永続化
//! - [`ExemplarPlotter`]: 最も異常な / 最も正常なテスト例の画像

pub mod artifacts;
pub mod plot;
pub mod text;

use crate::config::{DatasetName, ExperimentConfig, KernelKind, LossKind};
use crate::dataset::Partition;
use crate::error::Result;
use crate::model::{FittedParameters, PartitionResult, SvmModel};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub use artifacts::{FsArtifactWriter, MODEL_FILE, RESULTS_FILE};
pub use plot::{NetpbmPlotter, PLOT_STEM};
pub use text::TextReportSink;

/// AD 結果レコード。一度だけ書き出され、その後は変更されない
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsArtifact {
    pub run_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub dataset: DatasetName,
    pub loss: LossKind,
    pub kernel: KernelKind,
    pub normal_classes: Vec<u32>,
    pub outlier_classes: Vec<u32>,
    pub fitted: FittedParameters,
    pub train_seconds: f64,
    /// 採点済みの分割（train, [val], test の順）
    pub partitions: Vec<PartitionResult>,
}

impl ResultsArtifact {
    /// 採点済みモデルから結果レコードを作る
    pub fn collect(model: &SvmModel, config: &ExperimentConfig) -> Result<Self> {
        let fitted = model.fitted()?;
        let classes = &config.split().classes;
        let partitions = [Partition::Train, Partition::Val, Partition::Test]
            .into_iter()
            .filter(|p| model.scores(*p).is_some())
            .map(|p| model.evaluate(p))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            run_id: Uuid::new_v4(),
            created_at: Utc::now(),
            dataset: fitted.dataset,
            loss: fitted.loss,
            kernel: fitted.kernel.kind(),
            normal_classes: classes.normal().to_vec(),
            outlier_classes: classes.outlier().to_vec(),
            fitted: fitted.params,
            train_seconds: fitted.train_seconds,
            partitions,
        })
    }

    pub fn partition(&self, partition: Partition) -> Option<&PartitionResult> {
        self.partitions.iter().find(|r| r.partition == partition)
    }
}

/// テキストログの協調者インターフェース。出力先は `config.xp_dir`
pub trait ReportSink {
    fn log_exp_config(&self, config: &ExperimentConfig) -> Result<()>;
    /// 学習で確定した（グリッドサーチ後の）パラメータを記録する
    fn log_model_summary(&self, config: &ExperimentConfig, model: &SvmModel) -> Result<()>;
    fn log_ad_results(&self, config: &ExperimentConfig, results: &ResultsArtifact) -> Result<()>;
    /// info ファイルに 1 行追記する
    fn log_ad_info(&self, config: &ExperimentConfig, results: &ResultsArtifact) -> Result<()>;
}

/// 成果物の永続化インターフェース
pub trait ArtifactWriter {
    fn write_model(&self, model: &SvmModel, xp_dir: &Path) -> Result<PathBuf>;
    fn write_results(&self, results: &ResultsArtifact, xp_dir: &Path) -> Result<PathBuf>;
}

/// 可視化インターフェース。`stem` に拡張子を付けたパスを返す
pub trait ExemplarPlotter {
    fn plot(&self, model: &SvmModel, n_img: usize, stem: &Path) -> Result<PathBuf>;
}
