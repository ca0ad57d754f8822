//! libsvm による双対問題の求解
//!
//! 数値カーネルは libsvm の組み込みカーネルで、文字列カーネル（Degree /
//! WeightedDegree）は `kernel.rs` で計算したグラム行列を precomputed として渡す。
//! 結果は `Σ coef_i K(sv_i, x) - rho` の形に揃えて返す。

use super::kernel::Kernel;
use crate::error::{Error, Result};
use libsvm_rs::train::svm_train;
use libsvm_rs::{set_quiet, KernelType, SvmNode, SvmParameter, SvmProblem, SvmType};
use ndarray::{Array2, ArrayView2, Axis};
use tracing::debug;

/// Solver settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverParams {
    /// Stopping tolerance of the working-set selection
    pub tolerance: f64,
    /// Kernel cache in MB
    pub cache_size_mb: f64,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            tolerance: 1e-3,
            cache_size_mb: 200.0,
        }
    }
}

/// Support vectors and signed dual coefficients of a fitted problem
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub support_vectors: Array2<f64>,
    /// `y_i · α_i`
    pub dual_coef: Vec<f64>,
    pub rho: f64,
}

fn kernel_type(kernel: &Kernel) -> KernelType {
    match kernel {
        Kernel::Linear => KernelType::Linear,
        Kernel::Poly { .. } => KernelType::Polynomial,
        Kernel::Rbf { .. } => KernelType::Rbf,
        Kernel::Sigmoid { .. } => KernelType::Sigmoid,
        Kernel::Degree { .. } | Kernel::WeightedDegree { .. } => KernelType::Precomputed,
    }
}

fn parameter(svm_type: SvmType, kernel: &Kernel, params: &SolverParams) -> SvmParameter {
    let (degree, coef0) = match *kernel {
        Kernel::Poly { degree, coef0, .. } => (degree as i32, coef0),
        Kernel::Sigmoid { coef0, .. } => (3, coef0),
        _ => (3, 0.0),
    };
    SvmParameter {
        svm_type,
        kernel_type: kernel_type(kernel),
        degree,
        gamma: kernel.gamma().unwrap_or(0.0),
        coef0,
        eps: params.tolerance,
        cache_size: params.cache_size_mb,
        ..Default::default()
    }
}

fn is_precomputed(kernel: &Kernel) -> bool {
    matches!(kernel_type(kernel), KernelType::Precomputed)
}

/// 1 行分の libsvm 入力。precomputed では先頭ノードが 1 始まりの通し番号
fn instance(x: ArrayView2<'_, f64>, i: usize, kernel: &Kernel) -> Vec<SvmNode> {
    if is_precomputed(kernel) {
        let row = x.row(i);
        std::iter::once(SvmNode {
            index: 0,
            value: (i + 1) as f64,
        })
        .chain(x.rows().into_iter().enumerate().map(|(j, other)| SvmNode {
            index: (j + 1) as i32,
            value: kernel.compute(row, other),
        }))
        .collect()
    } else {
        x.row(i)
            .iter()
            .enumerate()
            .map(|(j, &value)| SvmNode {
                index: (j + 1) as i32,
                value,
            })
            .collect()
    }
}

/// libsvm の出力を特徴量空間のサポートベクターに戻す
fn support_vectors(x: ArrayView2<'_, f64>, sv: &[Vec<SvmNode>], kernel: &Kernel) -> Result<Array2<f64>> {
    if is_precomputed(kernel) {
        let rows = sv
            .iter()
            .map(|nodes| {
                nodes
                    .first()
                    .map(|node| node.value as usize)
                    .filter(|&serial| serial >= 1 && serial <= x.nrows())
                    .map(|serial| serial - 1)
                    .ok_or_else(|| {
                        Error::Training("support vector without a valid serial number".to_string())
                    })
            })
            .collect::<Result<Vec<usize>>>()?;
        return Ok(x.select(Axis(0), &rows));
    }

    let mut out = Array2::zeros((sv.len(), x.ncols()));
    for (k, nodes) in sv.iter().enumerate() {
        for node in nodes {
            let j = usize::try_from(node.index - 1)
                .ok()
                .filter(|&j| j < x.ncols())
                .ok_or_else(|| {
                    Error::Training(format!("support vector feature index {} out of range", node.index))
                })?;
            out[[k, j]] = node.value;
        }
    }
    Ok(out)
}

fn train(
    x: ArrayView2<'_, f64>,
    order: &[usize],
    labels: Vec<f64>,
    param: &SvmParameter,
    kernel: &Kernel,
) -> Result<Solution> {
    set_quiet(true);
    let problem = SvmProblem {
        labels,
        instances: order.iter().map(|&i| instance(x, i, kernel)).collect(),
    };
    let model = svm_train(&problem, param);

    let dual_coef = model
        .sv_coef
        .first()
        .cloned()
        .ok_or_else(|| Error::Training("libsvm returned no dual coefficients".to_string()))?;
    let rho = model
        .rho
        .first()
        .copied()
        .ok_or_else(|| Error::Training("libsvm returned no offset".to_string()))?;
    if !rho.is_finite() || dual_coef.iter().any(|c| !c.is_finite()) {
        return Err(Error::Training("solver produced non-finite coefficients".to_string()));
    }
    let support_vectors = support_vectors(x, &model.sv, kernel)?;
    debug!("libsvm: {} support vectors, rho = {}", dual_coef.len(), rho);
    Ok(Solution {
        support_vectors,
        dual_coef,
        rho,
    })
}

/// One-class SVM: `0 ≤ α ≤ 1`, `Σα = νl`
pub fn solve_one_class(
    x: ArrayView2<'_, f64>,
    kernel: &Kernel,
    nu: f64,
    params: &SolverParams,
) -> Result<Solution> {
    let n = x.nrows();
    if n == 0 {
        return Err(Error::Training("empty training set".to_string()));
    }
    if !(nu > 0.0 && nu <= 1.0) {
        return Err(Error::Training(format!("nu must lie in (0, 1], got {}", nu)));
    }
    let param = SvmParameter {
        nu,
        ..parameter(SvmType::OneClass, kernel, params)
    };
    let order: Vec<usize> = (0..n).collect();
    train(x, &order, vec![1.0; n], &param, kernel)
}

/// C-SVC: `0 ≤ α ≤ C`, `yᵀα = 0`. Positive decisions mean `y = +1`.
pub fn solve_svc(
    x: ArrayView2<'_, f64>,
    y: &[f64],
    kernel: &Kernel,
    c: f64,
    params: &SolverParams,
) -> Result<Solution> {
    let n = x.nrows();
    if y.len() != n {
        return Err(Error::Training(format!(
            "{} labels for {} training examples",
            y.len(),
            n
        )));
    }
    let first_positive = y.iter().position(|&v| v > 0.0);
    let (Some(first_positive), true) = (first_positive, y.iter().any(|&v| v < 0.0)) else {
        return Err(Error::Training(
            "SVC needs both classes in the training partition".to_string(),
        ));
    };
    if !(c.is_finite() && c > 0.0) {
        return Err(Error::Training(format!("C must be positive, got {}", c)));
    }

    // libsvm は最初に現れたラベルを正の決定値に割り当てる
    let order: Vec<usize> = std::iter::once(first_positive)
        .chain((0..n).filter(|&i| i != first_positive))
        .collect();
    let labels = order.iter().map(|&i| y[i]).collect();
    let param = SvmParameter {
        c,
        ..parameter(SvmType::CSvc, kernel, params)
    };
    train(x, &order, labels, &param, kernel)
}
