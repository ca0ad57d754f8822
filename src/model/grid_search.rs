//! Hyperparameter grid search
//!
//! gamma は `logspace(-10, -1, 10, base=2)`、nu (OC-SVM) または C (SVC) は固定の候補。
//! 検証誤差 `1 - AUC` が厳密に小さくなった最初の点を採用する。

use crate::config::{KernelKind, LossKind};
use crate::error::{Error, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const NU_GRID: [f64; 5] = [0.01, 0.05, 0.1, 0.2, 0.5];
pub const C_GRID: [f64; 4] = [0.1, 1.0, 10.0, 100.0];
/// テスト分割から切り出すホールドアウトの割合
pub const HOLDOUT_FRAC: f64 = 0.1;
const HOLDOUT_ATTEMPTS: usize = 100;

/// 2^-10 .. 2^-1
pub fn gamma_grid() -> Vec<f64> {
    (-10..=-1).map(|e| 2f64.powi(e)).collect()
}

/// One candidate of the search
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridPoint {
    pub gamma: Option<f64>,
    pub nu: Option<f64>,
    pub c: Option<f64>,
}

/// All candidates for a loss/kernel pair, gamma-major
pub fn candidates(loss: LossKind, kernel: KernelKind) -> Vec<GridPoint> {
    let gammas: Vec<Option<f64>> = if kernel.uses_gamma() {
        gamma_grid().into_iter().map(Some).collect()
    } else {
        vec![None]
    };
    let mut points = Vec::new();
    for gamma in gammas {
        match loss {
            LossKind::OneClassSvm => points.extend(NU_GRID.iter().map(|&nu| GridPoint {
                gamma,
                nu: Some(nu),
                c: None,
            })),
            LossKind::Svc => points.extend(C_GRID.iter().map(|&c| GridPoint {
                gamma,
                nu: None,
                c: Some(c),
            })),
        }
    }
    points
}

/// Selected point and its validation AUC
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSearchOutcome {
    pub best: GridPoint,
    pub validation_auc: f64,
    pub evaluated: usize,
}

/// 各候補を `evaluate`（検証 AUC を返す）で評価し、最良の点を返す
pub fn search<F>(points: &[GridPoint], mut evaluate: F) -> Result<GridSearchOutcome>
where
    F: FnMut(&GridPoint) -> Result<f64>,
{
    let mut best: Option<(GridPoint, f64)> = None;
    for point in points {
        let auc = evaluate(point)?;
        let error = 1.0 - auc;
        debug!("grid point {:?}: validation AUC {:.4}", point, auc);
        let improves = match best {
            None => !error.is_nan(),
            Some((_, best_auc)) => error < 1.0 - best_auc,
        };
        if improves {
            best = Some((*point, auc));
        }
    }
    let (best, validation_auc) = best.ok_or_else(|| {
        Error::Training("grid search produced no valid validation score".to_string())
    })?;
    Ok(GridSearchOutcome {
        best,
        validation_auc,
        evaluated: points.len(),
    })
}

fn has_both(labels: &[u8], rows: impl Iterator<Item = usize>) -> bool {
    let (mut normal, mut outlier) = (false, false);
    for i in rows {
        if labels[i] == 1 {
            outlier = true;
        } else {
            normal = true;
        }
    }
    normal && outlier
}

/// Draws hold-out rows until both the hold-out and the remainder contain both classes
pub fn draw_holdout(labels: &[u8], rng: &mut StdRng) -> Result<Vec<usize>> {
    let n = labels.len();
    let size = ((HOLDOUT_FRAC * n as f64).round() as usize).max(2);
    if size + 2 > n {
        return Err(Error::Training(format!(
            "test partition of {} samples is too small for a validation hold-out",
            n
        )));
    }

    let mut rows: Vec<usize> = (0..n).collect();
    for _ in 0..HOLDOUT_ATTEMPTS {
        rows.shuffle(rng);
        let (holdout, rest) = rows.split_at(size);
        if has_both(labels, holdout.iter().copied()) && has_both(labels, rest.iter().copied()) {
            let mut holdout = holdout.to_vec();
            holdout.sort_unstable();
            return Ok(holdout);
        }
    }
    Err(Error::Training(format!(
        "could not draw a hold-out with both classes after {} attempts",
        HOLDOUT_ATTEMPTS
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_gamma_grid() {
        let grid = gamma_grid();
        assert_eq!(grid.len(), 10);
        assert_eq!(grid[0], 1.0 / 1024.0);
        assert_eq!(grid[9], 0.5);
    }

    #[test]
    fn test_candidates() {
        assert_eq!(candidates(LossKind::OneClassSvm, KernelKind::Rbf).len(), 50);
        assert_eq!(candidates(LossKind::Svc, KernelKind::Poly).len(), 40);
        let linear = candidates(LossKind::OneClassSvm, KernelKind::Linear);
        assert_eq!(linear.len(), 5);
        assert!(linear.iter().all(|p| p.gamma.is_none() && p.c.is_none()));
    }

    #[test]
    fn test_first_strictly_better_point_wins() {
        let points = candidates(LossKind::OneClassSvm, KernelKind::Linear);
        let scores = [0.6, 0.8, 0.8, 0.7, 0.5];
        let mut i = 0;
        let outcome = search(&points, |_| {
            i += 1;
            Ok(scores[i - 1])
        })
        .unwrap();
        assert_eq!(outcome.best.nu, Some(0.05));
        assert_eq!(outcome.validation_auc, 0.8);
        assert_eq!(outcome.evaluated, 5);
    }

    #[test]
    fn test_search_propagates_errors() {
        let points = candidates(LossKind::Svc, KernelKind::Linear);
        let result = search(&points, |_| Err(Error::Training("boom".to_string())));
        assert!(matches!(result, Err(Error::Training(_))));
    }

    #[test]
    fn test_draw_holdout() {
        let labels: Vec<u8> = (0..40).map(|i| u8::from(i % 4 == 0)).collect();
        let mut rng = StdRng::seed_from_u64(3);
        let rows = draw_holdout(&labels, &mut rng).unwrap();
        assert_eq!(rows.len(), 4);
        assert!(has_both(&labels, rows.iter().copied()));

        let mut again = StdRng::seed_from_u64(3);
        assert_eq!(draw_holdout(&labels, &mut again).unwrap(), rows);

        assert!(draw_holdout(&[0, 0, 0, 0, 0, 0], &mut rng).is_err());
    }
}
