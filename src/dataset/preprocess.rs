//! Preprocessing
//!
//! 統計量はすべて学習分割から計算し、検証・テスト分割には同じ変換を適用する。

use crate::config::NormMode;
use crate::error::{Error, Result};
use nalgebra::{DMatrix, SymmetricEigen};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// ZCA 白色化の正則化項
const ZCA_EPS: f64 = 0.1;
/// PCA で保持する分散の割合
const PCA_VAR_RETAINED: f64 = 0.95;

/// 前処理フラグ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreprocessFlags {
    pub gcn: bool,
    pub unit_norm: NormMode,
    pub zca_whitening: bool,
    pub pca: bool,
}

/// 前処理パイプラインを実行（GCN → ZCA → PCA → 単位区間へ再スケール）
pub fn apply(
    flags: &PreprocessFlags,
    train: Array2<f64>,
    others: Vec<Array2<f64>>,
) -> Result<(Array2<f64>, Vec<Array2<f64>>)> {
    let mut train = train;
    let mut others = others;

    if flags.gcn {
        debug!("Applying global contrast normalization ({})", flags.unit_norm);
        global_contrast_normalization(&mut train, flags.unit_norm);
        for x in others.iter_mut() {
            global_contrast_normalization(x, flags.unit_norm);
        }
    }

    if flags.zca_whitening {
        debug!("Applying ZCA whitening (eps = {})", ZCA_EPS);
        let transform = ZcaTransform::fit(&train)?;
        train = transform.apply(&train);
        others = others.iter().map(|x| transform.apply(x)).collect();
    }

    if flags.pca {
        let transform = PcaTransform::fit(&train, PCA_VAR_RETAINED)?;
        info!(
            "PCA keeps {} of {} dimensions ({:.0}% variance)",
            transform.n_components(),
            train.ncols(),
            PCA_VAR_RETAINED * 100.0
        );
        train = transform.apply(&train);
        others = others.iter().map(|x| transform.apply(x)).collect();
    }

    let (min, max) = min_max(&train);
    rescale_to_unit_interval(&mut train, min, max);
    for x in others.iter_mut() {
        rescale_to_unit_interval(x, min, max);
    }

    Ok((train, others))
}

/// サンプルごとに平均を引き、std / l1 / l2 スケールで割る
pub fn global_contrast_normalization(x: &mut Array2<f64>, mode: NormMode) {
    for mut row in x.rows_mut() {
        let n = row.len().max(1) as f64;
        let mean = row.sum() / n;
        row.mapv_inplace(|v| v - mean);
        let scale = match mode {
            NormMode::Std => (row.iter().map(|v| v * v).sum::<f64>() / n).sqrt(),
            NormMode::L1 => row.iter().map(|v| v.abs()).sum::<f64>() / n,
            NormMode::L2 => (row.iter().map(|v| v * v).sum::<f64>()).sqrt(),
        };
        if scale > f64::EPSILON {
            row.mapv_inplace(|v| v / scale);
        }
    }
}

fn min_max(x: &Array2<f64>) -> (f64, f64) {
    x.iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        })
}

/// 学習分割の最小値・最大値で `[0, 1]` に再スケール
pub fn rescale_to_unit_interval(x: &mut Array2<f64>, min: f64, max: f64) {
    let range = max - min;
    if !range.is_finite() || range <= f64::EPSILON {
        x.mapv_inplace(|v| if min.is_finite() { v - min } else { v });
        return;
    }
    x.mapv_inplace(|v| (v - min) / range);
}

fn centered_covariance(x: &Array2<f64>) -> Result<(Array1<f64>, Array2<f64>)> {
    let n = x.nrows();
    if n < 2 {
        return Err(Error::Dataset(
            "at least two training samples are required for whitening/PCA".to_string(),
        ));
    }
    let mean = x
        .mean_axis(Axis(0))
        .ok_or_else(|| Error::Dataset("empty training partition".to_string()))?;
    let centered = x - &mean;
    let cov = centered.t().dot(&centered) / (n as f64);
    Ok((mean, cov))
}

/// 対称行列の固有分解。固有値の降順で返す（固有ベクトルは列）
pub fn symmetric_eigen(matrix: &Array2<f64>) -> (Vec<f64>, Array2<f64>) {
    let d = matrix.nrows();
    let dense = DMatrix::from_fn(d, d, |i, j| matrix[[i, j]]);
    let eigen = SymmetricEigen::new(dense);

    let mut order: Vec<usize> = (0..d).collect();
    order.sort_by(|&i, &j| eigen.eigenvalues[j].total_cmp(&eigen.eigenvalues[i]));
    let values = order.iter().map(|&i| eigen.eigenvalues[i]).collect();
    let vectors = Array2::from_shape_fn((d, d), |(row, k)| eigen.eigenvectors[(row, order[k])]);
    (values, vectors)
}

/// ZCA 白色化 `W = U diag(1 / sqrt(s + eps)) U^T`
pub struct ZcaTransform {
    mean: Array1<f64>,
    whitening: Array2<f64>,
}

impl ZcaTransform {
    pub fn fit(train: &Array2<f64>) -> Result<Self> {
        let (mean, cov) = centered_covariance(train)?;
        let (values, vectors) = symmetric_eigen(&cov);
        let scale = Array1::from_iter(values.iter().map(|s| 1.0 / (s.max(0.0) + ZCA_EPS).sqrt()));
        let scaled = &vectors * &scale;
        let whitening = scaled.dot(&vectors.t());
        Ok(Self { mean, whitening })
    }

    pub fn apply(&self, x: &Array2<f64>) -> Array2<f64> {
        (x - &self.mean).dot(&self.whitening)
    }
}

/// 主成分への射影
pub struct PcaTransform {
    mean: Array1<f64>,
    components: Array2<f64>,
}

impl PcaTransform {
    pub fn fit(train: &Array2<f64>, var_retained: f64) -> Result<Self> {
        let (mean, cov) = centered_covariance(train)?;
        let (values, vectors) = symmetric_eigen(&cov);
        let total: f64 = values.iter().map(|v| v.max(0.0)).sum();

        let mut k = values.len();
        if total > 0.0 {
            let mut acc = 0.0;
            for (i, v) in values.iter().enumerate() {
                acc += v.max(0.0);
                if acc / total >= var_retained {
                    k = i + 1;
                    break;
                }
            }
        }
        let keep: Vec<usize> = (0..k.max(1)).collect();
        Ok(Self {
            mean,
            components: vectors.select(Axis(1), &keep),
        })
    }

    pub fn n_components(&self) -> usize {
        self.components.ncols()
    }

    pub fn apply(&self, x: &Array2<f64>) -> Array2<f64> {
        (x - &self.mean).dot(&self.components)
    }
}
