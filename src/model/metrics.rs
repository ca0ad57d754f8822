//! Anomaly-detection metrics

use serde::{Deserialize, Serialize};
use smartcore::metrics::roc_auc_score;
use statrs::statistics::{Data, Median, Statistics};

/// スコアの要約統計量
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreSummary {
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub median: f64,
}

impl ScoreSummary {
    pub fn from_scores(scores: &[f64]) -> Option<Self> {
        if scores.is_empty() {
            return None;
        }
        let std_dev = if scores.len() > 1 {
            Statistics::std_dev(scores.iter())
        } else {
            0.0
        };
        Some(Self {
            mean: Statistics::mean(scores.iter()),
            std_dev,
            min: Statistics::min(scores.iter()),
            max: Statistics::max(scores.iter()),
            median: Data::new(scores.to_vec()).median(),
        })
    }
}

/// ROC AUC of anomaly scores against binary labels (1 = outlier).
/// `None` when only one class is present.
pub fn auc(labels: &[u8], scores: &[f64]) -> Option<f64> {
    let has_outlier = labels.iter().any(|&l| l == 1);
    let has_normal = labels.iter().any(|&l| l == 0);
    if !(has_outlier && has_normal) || labels.len() != scores.len() {
        return None;
    }
    let y_true: Vec<f64> = labels.iter().map(|&l| f64::from(l)).collect();
    let y_score = scores.to_vec();
    Some(roc_auc_score(&y_true, &y_score))
}

/// 予測ラベルの正解率（%）
pub fn accuracy(labels: &[u8], predictions: &[u8]) -> f64 {
    if labels.is_empty() {
        return 0.0;
    }
    let correct = labels
        .iter()
        .zip(predictions.iter())
        .filter(|(a, b)| a == b)
        .count();
    100.0 * correct as f64 / labels.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auc_perfect_and_inverted() {
        let labels = [0, 0, 1, 1];
        assert_eq!(auc(&labels, &[0.1, 0.2, 0.8, 0.9]), Some(1.0));
        assert_eq!(auc(&labels, &[0.9, 0.8, 0.2, 0.1]), Some(0.0));
        assert_eq!(auc(&[0, 0], &[0.1, 0.2]), None);
    }

    #[test]
    fn test_accuracy() {
        assert_eq!(accuracy(&[0, 1, 1, 0], &[0, 1, 0, 0]), 75.0);
        assert_eq!(accuracy(&[], &[]), 0.0);
    }

    #[test]
    fn test_summary() {
        let summary = ScoreSummary::from_scores(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(summary.mean, 2.5);
        assert_eq!(summary.min, 1.0);
        assert_eq!(summary.max, 4.0);
        assert_eq!(summary.median, 2.5);
        assert!(ScoreSummary::from_scores(&[]).is_none());
    }
}
