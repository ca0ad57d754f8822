//! Model Adapter
//!
//! 損失関数（OneClassSVM / SVC）とカーネルの組み合わせをデータセットに束縛し、
//! 学習・予測・評価・永続化を提供する。
//!
//! ## ライフサイクル
//!
//! - `construct`: 組み合わせの検証のみ（学習はしない）
//! - `train`: `Untrained → Trained` の一度きりの遷移。`FittedParameters` を生成
//! - `predict`: 分割ごとに一度だけ消費できる遅延スコア列を返す
//! - `evaluate`: 消費済みスコアから AUC・正解率・要約統計量を計算

pub mod grid_search;
pub mod kernel;
pub mod metrics;
pub mod solver;

use crate::config::{DatasetName, KernelKind, LossKind, SvmSettings};
use crate::dataset::{LoadedDataset, Partition, PartitionData};
use crate::error::{Error, Result};
use crate::storage;
use grid_search::GridPoint;
use kernel::Kernel;
use metrics::ScoreSummary;
use ndarray::{Array2, ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use solver::SolverParams;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

/// 学習で一度だけ確定するハイパーパラメータ
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FittedParameters {
    pub gamma: Option<f64>,
    pub nu: Option<f64>,
    pub c: Option<f64>,
    pub rho: f64,
    pub n_support: usize,
    pub grid_searched: bool,
    /// グリッドサーチ時の検証 AUC
    pub validation_auc: Option<f64>,
}

/// 学習済みモデル（サポートベクターと双対係数）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedModel {
    pub loss: LossKind,
    pub dataset: DatasetName,
    pub kernel: Kernel,
    pub params: FittedParameters,
    pub support_vectors: Array2<f64>,
    /// `y_i · α_i`
    pub dual_coef: Vec<f64>,
    pub train_seconds: f64,
}

impl FittedModel {
    /// `Σ coef_i K(sv_i, x) - rho`
    pub fn decision(&self, x: ArrayView1<'_, f64>) -> f64 {
        self.support_vectors
            .rows()
            .into_iter()
            .zip(self.dual_coef.iter())
            .map(|(sv, coef)| coef * self.kernel.compute(sv, x))
            .sum::<f64>()
            - self.params.rho
    }

    /// 大きいほど異常
    pub fn anomaly_score(&self, x: ArrayView1<'_, f64>) -> f64 {
        let decision = self.decision(x);
        match self.loss {
            LossKind::OneClassSvm => -decision,
            LossKind::Svc => decision,
        }
    }

    /// Anomaly scores are positive exactly for predicted outliers
    pub fn predict_label(score: f64) -> u8 {
        u8::from(score > 0.0)
    }

    pub fn scores(&self, x: ArrayView2<'_, f64>) -> Vec<f64> {
        x.rows().into_iter().map(|row| self.anomaly_score(row)).collect()
    }
}

/// 分割ごとに保持されるスコア
#[derive(Debug, Clone, Default, PartialEq)]
struct ScoreSlot {
    scores: Vec<f64>,
    complete: bool,
    seconds: f64,
}

#[derive(Debug, Clone, PartialEq)]
enum ModelPhase {
    Untrained,
    Trained(Box<FittedModel>),
}

/// 分割の評価結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionResult {
    pub partition: Partition,
    pub n_samples: usize,
    pub n_outliers: usize,
    pub auc: Option<f64>,
    /// 正解率（%）
    pub accuracy: f64,
    pub predicted_outliers: usize,
    pub summary: Option<ScoreSummary>,
    pub seconds: f64,
    pub scores: Vec<f64>,
    pub labels: Vec<u8>,
    pub predictions: Vec<u8>,
}

/// 一度だけ消費できる遅延スコア列。生成したスコアはモデル側に保持される
pub struct ScoreStream<'a> {
    model: &'a FittedModel,
    features: ArrayView2<'a, f64>,
    slot: &'a mut ScoreSlot,
    next: usize,
    started: Instant,
}

impl Iterator for ScoreStream<'_> {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        if self.next >= self.features.nrows() {
            if !self.slot.complete {
                self.slot.complete = true;
                self.slot.seconds = self.started.elapsed().as_secs_f64();
            }
            return None;
        }
        let score = self.model.anomaly_score(self.features.row(self.next));
        self.slot.scores.push(score);
        self.next += 1;
        Some(score)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.features.nrows() - self.next;
        (remaining, Some(remaining))
    }
}

/// SVM モデルアダプター
#[derive(Debug)]
pub struct SvmModel {
    loss: LossKind,
    kernel: KernelKind,
    settings: SvmSettings,
    seed: u64,
    data: LoadedDataset,
    phase: ModelPhase,
    scores: [Option<ScoreSlot>; 3],
    solver: SolverParams,
}

fn slot_index(partition: Partition) -> usize {
    match partition {
        Partition::Train => 0,
        Partition::Val => 1,
        Partition::Test => 2,
    }
}

impl SvmModel {
    /// 損失とカーネルの組み合わせがサポートされているか
    pub fn check_combination(loss: LossKind, kernel: KernelKind) -> Result<()> {
        if loss == LossKind::Svc && kernel.is_string_kernel() {
            return Err(Error::UnsupportedCombination {
                loss: loss.to_string(),
                kernel: kernel.to_string(),
            });
        }
        Ok(())
    }

    /// データセットに損失とカーネルを束縛する
    pub fn construct(data: LoadedDataset, settings: &SvmSettings, seed: u64) -> Result<Self> {
        Self::check_combination(settings.loss, settings.kernel)?;
        info!(
            "Constructing {} with {} kernel on {}",
            settings.loss, settings.kernel, data.name
        );
        Ok(Self {
            loss: settings.loss,
            kernel: settings.kernel,
            settings: settings.clone(),
            seed,
            data,
            phase: ModelPhase::Untrained,
            scores: Default::default(),
            solver: SolverParams::default(),
        })
    }

    pub fn loss(&self) -> LossKind {
        self.loss
    }

    pub fn kernel(&self) -> KernelKind {
        self.kernel
    }

    pub fn dataset(&self) -> &LoadedDataset {
        &self.data
    }

    pub fn is_trained(&self) -> bool {
        matches!(self.phase, ModelPhase::Trained(_))
    }

    pub fn fitted(&self) -> Result<&FittedModel> {
        match &self.phase {
            ModelPhase::Trained(model) => Ok(model.as_ref()),
            ModelPhase::Untrained => Err(Error::NotTrained(
                "the model has not been trained".to_string(),
            )),
        }
    }

    pub fn fitted_parameters(&self) -> Result<FittedParameters> {
        Ok(self.fitted()?.params)
    }

    /// 消費済みのスコア
    pub fn scores(&self, partition: Partition) -> Option<&[f64]> {
        self.scores[slot_index(partition)]
            .as_ref()
            .filter(|slot| slot.complete)
            .map(|slot| slot.scores.as_slice())
    }

    /// 学習。二度目の呼び出しは `Precondition` で拒否する
    pub fn train(&mut self, grid_search: bool) -> Result<()> {
        if self.is_trained() {
            return Err(Error::Precondition(
                "model is already trained; construct a new model to re-fit".to_string(),
            ));
        }
        if self.loss == LossKind::Svc && !self.data.train.has_both_classes() {
            return Err(Error::Training(
                "SVC needs normal and outlier examples in the training partition".to_string(),
            ));
        }

        let started = Instant::now();
        let (point, validation_auc) = if grid_search {
            let outcome = self.grid_search()?;
            info!(
                "Grid search selected gamma = {:?}, nu = {:?}, C = {:?} (validation AUC {:.4})",
                outcome.best.gamma, outcome.best.nu, outcome.best.c, outcome.validation_auc
            );
            (outcome.best, Some(outcome.validation_auc))
        } else {
            (self.fixed_point()?, None)
        };

        let mut model = self.fit(&self.data.train, &point)?;
        model.params.grid_searched = grid_search;
        model.params.validation_auc = validation_auc;
        model.train_seconds = started.elapsed().as_secs_f64();
        info!(
            "Training finished in {:.3}s: {} support vectors, rho = {:.6}",
            model.train_seconds, model.params.n_support, model.params.rho
        );
        self.phase = ModelPhase::Trained(Box::new(model));
        Ok(())
    }

    fn fixed_point(&self) -> Result<GridPoint> {
        let train = self.data.train.view();
        let gamma = match self.kernel {
            KernelKind::Rbf => Some(kernel::max_distance_gamma(train)?),
            KernelKind::Poly | KernelKind::Sigmoid => Some(1.0 / train.ncols().max(1) as f64),
            _ => None,
        };
        Ok(match self.loss {
            LossKind::OneClassSvm => GridPoint {
                gamma,
                nu: Some(self.settings.nu),
                c: None,
            },
            LossKind::Svc => GridPoint {
                gamma,
                nu: None,
                c: Some(self.settings.c),
            },
        })
    }

    /// 検証分割が両クラスを含まなければテスト分割からホールドアウトを切り出す
    fn ensure_validation(&mut self) -> Result<()> {
        if self
            .data
            .val
            .as_ref()
            .is_some_and(PartitionData::has_both_classes)
        {
            return Ok(());
        }
        let mut rng = StdRng::seed_from_u64(self.seed);
        let rows = grid_search::draw_holdout(&self.data.test.labels, &mut rng)?;
        info!(
            "Carving a {}-sample validation hold-out from the test partition",
            rows.len()
        );
        self.data.carve_holdout(&rows)
    }

    fn grid_search(&mut self) -> Result<grid_search::GridSearchOutcome> {
        self.ensure_validation()?;
        let points = grid_search::candidates(self.loss, self.kernel);
        let val = self
            .data
            .val
            .as_ref()
            .ok_or_else(|| Error::Training("no validation partition".to_string()))?;
        debug!(
            "Grid search over {} candidates on {} validation samples",
            points.len(),
            val.len()
        );
        grid_search::search(&points, |point| {
            let model = self.fit(&self.data.train, point)?;
            let scores = model.scores(val.view());
            Ok(metrics::auc(&val.labels, &scores).unwrap_or(f64::NAN))
        })
    }

    fn fit(&self, train: &PartitionData, point: &GridPoint) -> Result<FittedModel> {
        let kernel = Kernel::from_kind(self.kernel, point.gamma, self.settings.degree)?;
        let x = train.view();

        let solution = match self.loss {
            LossKind::OneClassSvm => {
                let nu = point.nu.unwrap_or(self.settings.nu);
                solver::solve_one_class(x, &kernel, nu, &self.solver)?
            }
            LossKind::Svc => {
                let y: Vec<f64> = train
                    .labels
                    .iter()
                    .map(|&l| if l == 1 { 1.0 } else { -1.0 })
                    .collect();
                let c = point.c.unwrap_or(self.settings.c);
                solver::solve_svc(x, &y, &kernel, c, &self.solver)?
            }
        };

        Ok(FittedModel {
            loss: self.loss,
            dataset: self.data.name,
            kernel,
            params: FittedParameters {
                gamma: kernel.gamma(),
                nu: match self.loss {
                    LossKind::OneClassSvm => Some(point.nu.unwrap_or(self.settings.nu)),
                    LossKind::Svc => None,
                },
                c: match self.loss {
                    LossKind::OneClassSvm => None,
                    LossKind::Svc => Some(point.c.unwrap_or(self.settings.c)),
                },
                rho: solution.rho,
                n_support: solution.dual_coef.len(),
                grid_searched: false,
                validation_auc: None,
            },
            support_vectors: solution.support_vectors,
            dual_coef: solution.dual_coef,
            train_seconds: 0.0,
        })
    }

    /// 分割のスコア列を返す。分割ごとに一度だけ呼べる
    pub fn predict(&mut self, partition: Partition) -> Result<ScoreStream<'_>> {
        let model = match &self.phase {
            ModelPhase::Trained(model) => model.as_ref(),
            ModelPhase::Untrained => {
                return Err(Error::NotTrained(format!(
                    "cannot predict {} before training",
                    partition
                )))
            }
        };
        let data = self.data.partition(partition).ok_or_else(|| {
            Error::Precondition(format!("dataset has no {} partition", partition))
        })?;
        let slot = &mut self.scores[slot_index(partition)];
        if slot.is_some() {
            return Err(Error::Precondition(format!(
                "{} partition was already scored",
                partition
            )));
        }
        debug!("Scoring {} partition ({} samples)", partition, data.len());
        Ok(ScoreStream {
            model,
            features: data.view(),
            slot: slot.insert(ScoreSlot::default()),
            next: 0,
            started: Instant::now(),
        })
    }

    /// 消費済みスコアを評価する
    pub fn evaluate(&self, partition: Partition) -> Result<PartitionResult> {
        self.fitted()?;
        let slot = self.scores[slot_index(partition)]
            .as_ref()
            .filter(|slot| slot.complete)
            .ok_or_else(|| {
                Error::Precondition(format!("{} partition has not been fully scored", partition))
            })?;
        let data = self.data.partition(partition).ok_or_else(|| {
            Error::Precondition(format!("dataset has no {} partition", partition))
        })?;

        let predictions: Vec<u8> = slot
            .scores
            .iter()
            .map(|&s| FittedModel::predict_label(s))
            .collect();
        let auc = metrics::auc(&data.labels, &slot.scores);
        if auc.is_none() {
            warn!("AUC is undefined on {}: only one class present", partition);
        }
        Ok(PartitionResult {
            partition,
            n_samples: data.len(),
            n_outliers: data.n_outliers(),
            auc,
            accuracy: metrics::accuracy(&data.labels, &predictions),
            predicted_outliers: predictions.iter().filter(|&&p| p == 1).count(),
            summary: ScoreSummary::from_scores(&slot.scores),
            seconds: slot.seconds,
            scores: slot.scores.clone(),
            labels: data.labels.clone(),
            predictions,
        })
    }

    /// 学習済みモデルを JSON で `path` に書き出す
    pub fn dump_model(&self, path: &Path) -> Result<()> {
        let model = self.fitted()?;
        storage::write_json_atomic(path, model)?;
        info!("Model saved to {}", path.display());
        Ok(())
    }

    /// `dump_model` で書き出したモデルを読み込む
    pub fn load_fitted(path: &Path) -> Result<FittedModel> {
        storage::read_json(path)
    }
}
