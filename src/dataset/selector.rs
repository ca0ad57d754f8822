//! Dataset Selector
//!
//! クラス指定と前処理フラグから学習・検証・テスト分割を組み立てる。

use super::preprocess::{self, PreprocessFlags};
use super::{LoadedDataset, PartitionData, RawSplit, SourceSplits};
use crate::config::{ClassSpecification, DatasetName, ExperimentConfig};
use crate::error::{Error, Result};
use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// データセットローダーに渡す選択内容
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetSelection {
    pub dataset: DatasetName,
    pub classes: ClassSpecification,
    pub val_frac: f64,
    pub out_frac: f64,
    pub ad_experiment: bool,
    pub preprocess: PreprocessFlags,
    pub seed: u64,
    pub data_dir: PathBuf,
}

impl DatasetSelection {
    /// 実験設定から選択中データセットの分割と前処理フラグを取り出す
    pub fn resolve(config: &ExperimentConfig) -> Self {
        let split = config.split();
        Self {
            dataset: config.dataset,
            classes: split.classes.clone(),
            val_frac: split.val_frac,
            out_frac: config.out_frac,
            ad_experiment: config.ad_experiment,
            preprocess: PreprocessFlags {
                gcn: config.gcn,
                unit_norm: config.unit_norm_used,
                zca_whitening: config.zca_whitening,
                pca: config.pca,
            },
            seed: config.seed,
            data_dir: config.data_dir.clone(),
        }
    }
}

/// Number of outlier examples mixed into the training partition
pub fn contamination_count(out_frac: f64, n_normal: usize) -> usize {
    if out_frac <= 0.0 {
        return 0;
    }
    (out_frac * n_normal as f64 / (1.0 - out_frac)).ceil() as usize
}

/// Row indices of a split grouped into (normal, outlier)
fn partition_rows(split: &RawSplit, classes: &ClassSpecification) -> (Vec<usize>, Vec<usize>) {
    let mut normal = Vec::new();
    let mut outlier = Vec::new();
    for (i, &label) in split.labels.iter().enumerate() {
        match classes.binary_label(label) {
            Some(0) => normal.push(i),
            Some(_) => outlier.push(i),
            None => {}
        }
    }
    (normal, outlier)
}

/// 層化して検証用の行を取り出す。戻り値は (train, val)
fn stratified_split(
    normal: Vec<usize>,
    outlier: Vec<usize>,
    val_frac: f64,
    rng: &mut StdRng,
) -> (Vec<(usize, u8)>, Vec<(usize, u8)>) {
    let mut train = Vec::new();
    let mut val = Vec::new();
    for (mut rows, label) in [(normal, 0u8), (outlier, 1u8)] {
        rows.shuffle(rng);
        let n_val = (val_frac * rows.len() as f64).round() as usize;
        let (v, t) = rows.split_at(n_val.min(rows.len()));
        val.extend(v.iter().map(|&i| (i, label)));
        train.extend(t.iter().map(|&i| (i, label)));
    }
    train.sort_unstable();
    val.sort_unstable();
    (train, val)
}

fn rows_and_labels(rows: &[(usize, u8)]) -> (Vec<usize>, Vec<u8>) {
    rows.iter().copied().unzip()
}

/// ソース分割から AD 実験用の `LoadedDataset` を組み立てる
pub fn assemble(selection: &DatasetSelection, splits: SourceSplits) -> Result<LoadedDataset> {
    let mut rng = StdRng::seed_from_u64(selection.seed);
    let classes = &selection.classes;

    let (normal, mut outlier) = partition_rows(&splits.train, classes);
    if normal.is_empty() {
        return Err(Error::Dataset(format!(
            "no training examples of normal classes {}",
            classes.normal()
        )));
    }

    if selection.ad_experiment {
        let wanted = contamination_count(selection.out_frac, normal.len());
        if wanted > outlier.len() {
            warn!(
                "Requested {} contaminating outliers but only {} are available",
                wanted,
                outlier.len()
            );
        }
        outlier.shuffle(&mut rng);
        outlier.truncate(wanted);
    }
    debug!(
        "Training pool: {} normal / {} outlier examples",
        normal.len(),
        outlier.len()
    );

    let (train_rows, val_rows) = stratified_split(normal, outlier, selection.val_frac, &mut rng);
    let (test_normal, test_outlier) = partition_rows(&splits.test, classes);
    let mut test_rows: Vec<(usize, u8)> = test_normal
        .into_iter()
        .map(|i| (i, 0))
        .chain(test_outlier.into_iter().map(|i| (i, 1)))
        .collect();
    test_rows.sort_unstable();

    if train_rows.is_empty() {
        return Err(Error::Dataset("empty training partition".to_string()));
    }
    if test_rows.is_empty() {
        return Err(Error::Dataset(
            "no test examples of the selected classes".to_string(),
        ));
    }

    let (train_idx, train_labels) = rows_and_labels(&train_rows);
    let (val_idx, val_labels) = rows_and_labels(&val_rows);
    let (test_idx, test_labels) = rows_and_labels(&test_rows);

    let train_raw = splits.train.features.select(Axis(0), &train_idx);
    let val_raw = (!val_idx.is_empty()).then(|| splits.train.features.select(Axis(0), &val_idx));
    let test_raw = splits.test.features.select(Axis(0), &test_idx);

    let mut others: Vec<Array2<f64>> = vec![test_raw.clone()];
    if let Some(v) = &val_raw {
        others.push(v.clone());
    }
    let (train_features, mut others) =
        preprocess::apply(&selection.preprocess, train_raw.clone(), others)?;
    let val_features = if val_raw.is_some() { others.pop() } else { None };
    let test_features = others
        .pop()
        .ok_or_else(|| Error::Dataset("preprocessing dropped the test partition".to_string()))?;

    let train = PartitionData {
        features: train_features,
        labels: train_labels,
        raw: train_raw,
    };
    let val = match (val_features, val_raw) {
        (Some(features), Some(raw)) => Some(PartitionData {
            features,
            labels: val_labels,
            raw,
        }),
        _ => None,
    };
    let test = PartitionData {
        features: test_features,
        labels: test_labels,
        raw: test_raw,
    };

    info!(
        "{}: train {} ({} outliers), val {}, test {} ({} outliers), {} features",
        selection.dataset,
        train.len(),
        train.n_outliers(),
        val.as_ref().map_or(0, PartitionData::len),
        test.len(),
        test.n_outliers(),
        train.features.ncols()
    );

    Ok(LoadedDataset {
        name: selection.dataset,
        train,
        val,
        test,
        shape: splits.shape,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LabelUniverse, NormMode};

    fn split(labels: Vec<u32>) -> RawSplit {
        let n = labels.len();
        let features = Array2::from_shape_fn((n, 2), |(i, j)| (i * 2 + j) as f64);
        RawSplit::new(features, labels).unwrap()
    }

    fn selection(out_frac: f64, val_frac: f64, ad_experiment: bool) -> DatasetSelection {
        DatasetSelection {
            dataset: DatasetName::Mnist,
            classes: ClassSpecification::resolve("0", "range(1,3)", &LabelUniverse::new(10))
                .unwrap(),
            val_frac,
            out_frac,
            ad_experiment,
            preprocess: PreprocessFlags {
                gcn: false,
                unit_norm: NormMode::L1,
                zca_whitening: false,
                pca: false,
            },
            seed: 7,
            data_dir: PathBuf::from("data"),
        }
    }

    fn sources() -> SourceSplits {
        SourceSplits {
            train: split(vec![0, 0, 0, 0, 1, 2, 5, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]),
            test: split(vec![0, 1, 2, 3, 9, 0]),
            shape: None,
        }
    }

    #[test]
    fn test_contamination_count() {
        assert_eq!(contamination_count(0.0, 100), 0);
        assert_eq!(contamination_count(0.5, 10), 10);
        assert_eq!(contamination_count(0.2, 10), 3);
        assert_eq!(contamination_count(0.1, 91), 11);
    }

    #[test]
    fn test_ad_split_uses_normal_classes_only() {
        let data = assemble(&selection(0.0, 0.0, true), sources()).unwrap();
        assert_eq!(data.train.len(), 16);
        assert_eq!(data.train.n_outliers(), 0);
        assert!(data.val.is_none());
        // ラベル 3 と 9 はどちらのクラスにも属さない
        assert_eq!(data.test.labels, vec![0, 1, 1, 0]);
    }

    #[test]
    fn test_contamination_and_validation() {
        let data = assemble(&selection(0.1, 0.25, true), sources()).unwrap();
        let val = data.val.as_ref().unwrap();
        assert_eq!(data.train.len() + val.len(), 16 + 2);
        assert_eq!(val.n_normal(), 4);
        assert_eq!(data.train.n_outliers() + val.n_outliers(), 2);
    }

    #[test]
    fn test_supervised_split_keeps_all_outliers() {
        let data = assemble(&selection(0.0, 0.0, false), sources()).unwrap();
        assert_eq!(data.train.n_outliers(), 3);
        assert!(data.train.has_both_classes());
    }

    #[test]
    fn test_seed_is_deterministic() {
        let a = assemble(&selection(0.1, 0.25, true), sources()).unwrap();
        let b = assemble(&selection(0.1, 0.25, true), sources()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_missing_normal_class() {
        let mut sel = selection(0.0, 0.0, true);
        sel.classes =
            ClassSpecification::resolve("7", "range(1,3)", &LabelUniverse::new(10)).unwrap();
        assert!(matches!(assemble(&sel, sources()), Err(Error::Dataset(_))));
    }
}
