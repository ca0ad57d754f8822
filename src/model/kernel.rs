//! Kernel functions
//!
//! 数値カーネル（linear / poly / rbf / sigmoid）と、特徴量を 16 段階に量子化した
//! 記号列に対する文字列カーネル（Degree / WeightedDegree）。

use crate::config::KernelKind;
use crate::error::{Error, Result};
use ndarray::{ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

/// Number of quantization levels used by the string kernels
pub const ALPHABET_SIZE: f64 = 16.0;

/// Kernel with its hyperparameters bound
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Kernel {
    Linear,
    Poly { gamma: f64, degree: u32, coef0: f64 },
    Rbf { gamma: f64 },
    Sigmoid { gamma: f64, coef0: f64 },
    Degree { degree: u32 },
    WeightedDegree { degree: u32 },
}

impl Kernel {
    /// カーネル種別とハイパーパラメータからカーネルを組み立てる
    pub fn from_kind(kind: KernelKind, gamma: Option<f64>, degree: u32) -> Result<Self> {
        let need_gamma = || {
            gamma
                .filter(|g| g.is_finite() && *g > 0.0)
                .ok_or_else(|| Error::Training(format!("kernel {} needs a positive gamma", kind)))
        };
        Ok(match kind {
            KernelKind::Linear => Kernel::Linear,
            KernelKind::Poly => Kernel::Poly {
                gamma: need_gamma()?,
                degree,
                coef0: 0.0,
            },
            KernelKind::Rbf => Kernel::Rbf {
                gamma: need_gamma()?,
            },
            KernelKind::Sigmoid => Kernel::Sigmoid {
                gamma: need_gamma()?,
                coef0: 0.0,
            },
            KernelKind::DegreeKernel => Kernel::Degree { degree },
            KernelKind::WeightedDegreeKernel => Kernel::WeightedDegree { degree },
        })
    }

    pub fn kind(&self) -> KernelKind {
        match self {
            Kernel::Linear => KernelKind::Linear,
            Kernel::Poly { .. } => KernelKind::Poly,
            Kernel::Rbf { .. } => KernelKind::Rbf,
            Kernel::Sigmoid { .. } => KernelKind::Sigmoid,
            Kernel::Degree { .. } => KernelKind::DegreeKernel,
            Kernel::WeightedDegree { .. } => KernelKind::WeightedDegreeKernel,
        }
    }

    pub fn gamma(&self) -> Option<f64> {
        match self {
            Kernel::Poly { gamma, .. } | Kernel::Rbf { gamma } | Kernel::Sigmoid { gamma, .. } => {
                Some(*gamma)
            }
            _ => None,
        }
    }

    pub fn compute(&self, x: ArrayView1<'_, f64>, y: ArrayView1<'_, f64>) -> f64 {
        match *self {
            Kernel::Linear => x.dot(&y),
            Kernel::Poly {
                gamma,
                degree,
                coef0,
            } => (gamma * x.dot(&y) + coef0).powi(degree as i32),
            Kernel::Rbf { gamma } => (-gamma * squared_distance(x, y)).exp(),
            Kernel::Sigmoid { gamma, coef0 } => (gamma * x.dot(&y) + coef0).tanh(),
            Kernel::Degree { degree } => degree_kernel(x, y, degree as usize),
            Kernel::WeightedDegree { degree } => weighted_degree_kernel(x, y, degree as usize),
        }
    }
}

pub fn squared_distance(x: ArrayView1<'_, f64>, y: ArrayView1<'_, f64>) -> f64 {
    x.iter().zip(y.iter()).map(|(a, b)| (a - b) * (a - b)).sum()
}

/// 学習データの最大ペア間距離から rbf の既定 gamma `1 / max_dist²` を求める
pub fn max_distance_gamma(x: ArrayView2<'_, f64>) -> Result<f64> {
    let n = x.nrows();
    let mut max_sq = 0.0_f64;
    for i in 0..n {
        for j in i + 1..n {
            max_sq = max_sq.max(squared_distance(x.row(i), x.row(j)));
        }
    }
    if max_sq <= 0.0 {
        return Err(Error::Training(
            "cannot derive gamma: all training examples are identical".to_string(),
        ));
    }
    Ok(1.0 / max_sq)
}

/// `[0, 1]` の値を 0..16 の記号に量子化
fn symbol(v: f64) -> u8 {
    (v.clamp(0.0, 1.0) * ALPHABET_SIZE).floor().min(ALPHABET_SIZE - 1.0) as u8
}

/// 各位置から始まる一致部分列の長さ（`cap` で打ち切り）を後ろから走査して渡す
fn for_each_match_run(
    x: ArrayView1<'_, f64>,
    y: ArrayView1<'_, f64>,
    cap: usize,
    mut f: impl FnMut(usize),
) {
    let mut run = 0usize;
    for i in (0..x.len()).rev() {
        run = if symbol(x[i]) == symbol(y[i]) {
            (run + 1).min(cap)
        } else {
            0
        };
        f(run);
    }
}

fn degree_kernel(x: ArrayView1<'_, f64>, y: ArrayView1<'_, f64>, degree: usize) -> f64 {
    let len = x.len();
    if degree == 0 || len < degree {
        return 0.0;
    }
    let mut matches = 0usize;
    for_each_match_run(x, y, degree, |run| {
        if run == degree {
            matches += 1;
        }
    });
    matches as f64 / (len - degree + 1) as f64
}

fn weighted_degree_kernel(x: ArrayView1<'_, f64>, y: ArrayView1<'_, f64>, degree: usize) -> f64 {
    let len = x.len();
    let degree = degree.min(len);
    if degree == 0 {
        return 0.0;
    }
    // cumulative[m] = Σ_{k=1..m} β_k / positions(k)
    let denom = (degree * (degree + 1)) as f64;
    let mut cumulative = vec![0.0; degree + 1];
    for k in 1..=degree {
        let beta = 2.0 * (degree - k + 1) as f64 / denom;
        cumulative[k] = cumulative[k - 1] + beta / (len - k + 1) as f64;
    }
    let mut total = 0.0;
    for_each_match_run(x, y, degree, |run| total += cumulative[run]);
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_numeric_kernels() {
        let x = array![1.0, 2.0];
        let y = array![0.5, -1.0];
        assert_eq!(Kernel::Linear.compute(x.view(), y.view()), -1.5);

        let rbf = Kernel::Rbf { gamma: 0.5 };
        assert_eq!(rbf.compute(x.view(), x.view()), 1.0);
        let expected = (-0.5_f64 * (0.25 + 9.0)).exp();
        assert!((rbf.compute(x.view(), y.view()) - expected).abs() < 1e-12);

        let poly = Kernel::from_kind(KernelKind::Poly, Some(1.0), 2).unwrap();
        assert_eq!(poly.compute(x.view(), x.view()), 25.0);
    }

    #[test]
    fn test_gamma_required() {
        assert!(Kernel::from_kind(KernelKind::Rbf, None, 3).is_err());
        assert!(Kernel::from_kind(KernelKind::Linear, None, 3).is_ok());
        assert_eq!(Kernel::from_kind(KernelKind::DegreeKernel, None, 3).unwrap().gamma(), None);
    }

    #[test]
    fn test_degree_kernel_counts_aligned_substrings() {
        // 記号列: x = [0, 8, 15, 3], y = [0, 8, 15, 9]
        let x = array![0.0, 0.5, 1.0, 0.2];
        let y = array![0.01, 0.52, 0.99, 0.6];
        let k = Kernel::Degree { degree: 2 };
        // 位置 0 と 1 の長さ 2 部分列が一致、位置は 3 つ
        assert!((k.compute(x.view(), y.view()) - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(k.compute(x.view(), x.view()), 1.0);
    }

    #[test]
    fn test_weighted_degree_self_similarity_is_one() {
        let x = array![0.1, 0.4, 0.7, 0.9, 0.3];
        let k = Kernel::WeightedDegree { degree: 3 };
        assert!((k.compute(x.view(), x.view()) - 1.0).abs() < 1e-12);

        let y = array![0.9, 0.0, 0.0, 0.1, 0.9];
        assert_eq!(k.compute(x.view(), y.view()), 0.0);
    }

    #[test]
    fn test_kernels_are_symmetric() {
        let x = array![0.1, 0.4, 0.7, 0.9, 0.3];
        let y = array![0.1, 0.45, 0.2, 0.9, 0.35];
        for kernel in [
            Kernel::Linear,
            Kernel::Rbf { gamma: 0.3 },
            Kernel::Sigmoid { gamma: 0.2, coef0: 0.0 },
            Kernel::Degree { degree: 2 },
            Kernel::WeightedDegree { degree: 3 },
        ] {
            let a = kernel.compute(x.view(), y.view());
            let b = kernel.compute(y.view(), x.view());
            assert!((a - b).abs() < 1e-12, "{:?}", kernel);
        }
    }

    #[test]
    fn test_max_distance_gamma() {
        let x = array![[0.0, 0.0], [1.0, 0.0], [0.0, 2.0]];
        assert!((max_distance_gamma(x.view()).unwrap() - 0.2).abs() < 1e-12);
        assert!(max_distance_gamma(array![[1.0], [1.0]].view()).is_err());
    }
}
