//! Dataset Selector and Loaders
//!
//! データセット名とクラス分割から学習・検証・テスト用の分割を組み立てる。
//!
//! ## 主要機能
//!
//! - **ソース読み込み**: MNIST (IDX)、CIFAR-10 (バイナリバッチ)、MobiFall (CSV)
//! - **AD 分割**: 正常クラスのみの学習データ（`out_frac` による外れ値混入あり）
//! - **前処理**: GCN、ZCA 白色化、PCA、単位区間への再スケーリング

pub mod cifar10;
pub mod mnist;
pub mod mobifall;
pub mod preprocess;
pub mod selector;

use crate::config::DatasetName;
use crate::error::{Error, Result};
use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

pub use preprocess::PreprocessFlags;
pub use selector::{assemble, DatasetSelection};

/// データ分割の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Partition {
    Train,
    Val,
    Test,
}

impl Partition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Partition::Train => "train",
            Partition::Val => "val",
            Partition::Test => "test",
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 画像の形状（画素はチャネル優先の平面配置）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageShape {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
}

impl ImageShape {
    pub fn len(&self) -> usize {
        self.height * self.width * self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// ソースから読み込んだ 1 分割分の生データ
#[derive(Debug, Clone)]
pub struct RawSplit {
    /// 行が 1 サンプル
    pub features: Array2<f64>,
    /// 元のクラスラベル
    pub labels: Vec<u32>,
}

impl RawSplit {
    pub fn new(features: Array2<f64>, labels: Vec<u32>) -> Result<Self> {
        if features.nrows() != labels.len() {
            return Err(Error::Dataset(format!(
                "{} samples but {} labels",
                features.nrows(),
                labels.len()
            )));
        }
        Ok(Self { features, labels })
    }
}

/// データセットソースが返す学習・テスト分割
#[derive(Debug, Clone)]
pub struct SourceSplits {
    pub train: RawSplit,
    pub test: RawSplit,
    /// 画像データの場合のみ
    pub shape: Option<ImageShape>,
}

/// 前処理済みの 1 分割
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionData {
    /// 前処理済み特徴量
    pub features: Array2<f64>,
    /// 二値ラベル（0: 正常, 1: 外れ値）
    pub labels: Vec<u8>,
    /// 可視化用の前処理前データ
    pub raw: Array2<f64>,
}

impl PartitionData {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn n_outliers(&self) -> usize {
        self.labels.iter().filter(|&&l| l == 1).count()
    }

    pub fn n_normal(&self) -> usize {
        self.len() - self.n_outliers()
    }

    /// 両クラスを含むかどうか（AUC の計算条件）
    pub fn has_both_classes(&self) -> bool {
        self.n_outliers() > 0 && self.n_normal() > 0
    }

    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.features.view()
    }

    /// 指定行だけを取り出す
    pub fn select(&self, rows: &[usize]) -> Self {
        Self {
            features: self.features.select(Axis(0), rows),
            labels: rows.iter().map(|&i| self.labels[i]).collect(),
            raw: self.raw.select(Axis(0), rows),
        }
    }
}

/// Model Adapter に渡される読み込み済みデータセット
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedDataset {
    pub name: DatasetName,
    pub train: PartitionData,
    pub val: Option<PartitionData>,
    pub test: PartitionData,
    pub shape: Option<ImageShape>,
}

impl LoadedDataset {
    pub fn n_features(&self) -> usize {
        self.train.features.ncols()
    }

    pub fn partition(&self, partition: Partition) -> Option<&PartitionData> {
        match partition {
            Partition::Train => Some(&self.train),
            Partition::Val => self.val.as_ref(),
            Partition::Test => Some(&self.test),
        }
    }

    /// テスト分割から検証用のホールドアウトを切り出す（既存の検証分割は置き換える）
    pub fn carve_holdout(&mut self, rows: &[usize]) -> Result<()> {
        let mut is_holdout = vec![false; self.test.len()];
        for &row in rows {
            if row >= is_holdout.len() {
                return Err(Error::Dataset(format!(
                    "hold-out row {} outside test partition of {} samples",
                    row,
                    self.test.len()
                )));
            }
            is_holdout[row] = true;
        }
        let keep: Vec<usize> = (0..self.test.len()).filter(|&i| !is_holdout[i]).collect();
        let holdout: Vec<usize> = (0..self.test.len()).filter(|&i| is_holdout[i]).collect();

        self.val = Some(self.test.select(&holdout));
        self.test = self.test.select(&keep);
        Ok(())
    }
}

/// データセット読み込みの協調者インターフェース
pub trait DatasetLoader {
    fn load(&self, selection: &DatasetSelection) -> Result<LoadedDataset>;
}

/// ファイルシステム上の MNIST / CIFAR-10 / MobiFall を読む標準ローダー
#[derive(Debug, Default, Clone)]
pub struct FsDatasetLoader;

impl FsDatasetLoader {
    pub fn new() -> Self {
        Self
    }

    fn read_source(&self, name: DatasetName, data_dir: &Path) -> Result<SourceSplits> {
        match name {
            DatasetName::Mnist => mnist::read(&data_dir.join("mnist")),
            DatasetName::Cifar10 => cifar10::read(&data_dir.join("cifar-10-batches-bin")),
            DatasetName::MobiFall => mobifall::read(&data_dir.join("mobiFall")),
        }
    }
}

impl DatasetLoader for FsDatasetLoader {
    fn load(&self, selection: &DatasetSelection) -> Result<LoadedDataset> {
        let splits = self.read_source(selection.dataset, &selection.data_dir)?;
        assemble(selection, splits)
    }
}

/// バイト列を `[0, 1]` に正規化して行列化
pub(crate) fn bytes_to_matrix(bytes: &[u8], n: usize, d: usize) -> Result<Array2<f64>> {
    let values: Vec<f64> = bytes.iter().map(|&b| f64::from(b) / 255.0).collect();
    Array2::from_shape_vec((n, d), values)
        .map_err(|e| Error::Dataset(format!("cannot shape {}x{} matrix: {}", n, d, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn partition() -> PartitionData {
        PartitionData {
            features: array![[0.0, 1.0], [2.0, 3.0], [4.0, 5.0], [6.0, 7.0]],
            labels: vec![0, 1, 0, 1],
            raw: array![[0.0, 0.1], [0.2, 0.3], [0.4, 0.5], [0.6, 0.7]],
        }
    }

    #[test]
    fn test_partition_select() {
        let selected = partition().select(&[3, 0]);
        assert_eq!(selected.labels, vec![1, 0]);
        assert_eq!(selected.features, array![[6.0, 7.0], [0.0, 1.0]]);
        assert!(selected.has_both_classes());
    }

    #[test]
    fn test_carve_holdout() {
        let mut dataset = LoadedDataset {
            name: DatasetName::Mnist,
            train: partition(),
            val: None,
            test: partition(),
            shape: None,
        };
        dataset.carve_holdout(&[1, 2]).unwrap();

        let val = dataset.val.as_ref().unwrap();
        assert_eq!(val.labels, vec![1, 0]);
        assert_eq!(dataset.test.labels, vec![0, 1]);
        assert_eq!(dataset.test.features, array![[0.0, 1.0], [6.0, 7.0]]);

        assert!(dataset.carve_holdout(&[9]).is_err());
    }

    #[test]
    fn test_bytes_to_matrix() {
        let m = bytes_to_matrix(&[0, 255, 51, 102], 2, 2).unwrap();
        assert_eq!(m[[0, 1]], 1.0);
        assert!((m[[1, 0]] - 0.2).abs() < 1e-12);
        assert!(bytes_to_matrix(&[0, 1, 2], 2, 2).is_err());
    }
}
