//! Pipeline Controller
//!
//! Sequences configuration, model construction, training, scoring, reporting,
//! persistence and plotting as a strictly linear state machine.

use crate::config::{ExperimentConfig, RawArguments};
use crate::dataset::{DatasetLoader, DatasetSelection, FsDatasetLoader, Partition};
use crate::error::{Error, Result};
use crate::model::{FittedParameters, SvmModel};
use crate::reporting::{
    ArtifactWriter, ExemplarPlotter, FsArtifactWriter, NetpbmPlotter, ReportSink,
    ResultsArtifact, TextReportSink, PLOT_STEM,
};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineState {
    /// No configuration applied yet
    Unconfigured,
    /// Configuration applied and frozen
    Configured,
    /// Dataset loaded and model adapter constructed
    ModelBuilt,
    /// Fitted parameters available
    Trained,
    /// Every available partition scored
    Scored,
    /// Report sinks invoked (failures recorded as warnings)
    Reported,
    /// Model and results written
    Persisted,
    /// Run complete
    Done,
    /// A stage failed; the controller must be recreated
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// External collaborators consumed by the pipeline
pub struct Collaborators {
    pub loader: Box<dyn DatasetLoader>,
    pub reporter: Box<dyn ReportSink>,
    pub artifacts: Box<dyn ArtifactWriter>,
    pub plotter: Box<dyn ExemplarPlotter>,
}

impl Collaborators {
    /// Filesystem-backed collaborators
    pub fn filesystem() -> Self {
        Self {
            loader: Box::new(FsDatasetLoader::new()),
            reporter: Box::new(TextReportSink::new()),
            artifacts: Box::new(FsArtifactWriter::new()),
            plotter: Box::new(NetpbmPlotter::new()),
        }
    }
}

/// Outcome of a completed run
#[derive(Debug)]
pub struct RunReport {
    pub fitted: FittedParameters,
    pub results: ResultsArtifact,
    /// Files written by the persistence stage
    pub artifacts: Vec<PathBuf>,
    pub plot: Option<PathBuf>,
    /// Non-fatal reporting failures
    pub warnings: Vec<Error>,
}

/// Orchestrates one experiment run
pub struct PipelineController {
    state: PipelineState,
    collaborators: Collaborators,
    config: Option<Arc<ExperimentConfig>>,
    model: Option<SvmModel>,
    results: Option<ResultsArtifact>,
    artifacts: Vec<PathBuf>,
    plot: Option<PathBuf>,
    warnings: Vec<Error>,
}

impl PipelineController {
    pub fn new(collaborators: Collaborators) -> Self {
        Self {
            state: PipelineState::Unconfigured,
            collaborators,
            config: None,
            model: None,
            results: None,
            artifacts: Vec::new(),
            plot: None,
            warnings: Vec::new(),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn config(&self) -> Option<&Arc<ExperimentConfig>> {
        self.config.as_ref()
    }

    pub fn model(&self) -> Option<&SvmModel> {
        self.model.as_ref()
    }

    pub fn results(&self) -> Option<&ResultsArtifact> {
        self.results.as_ref()
    }

    pub fn warnings(&self) -> &[Error] {
        &self.warnings
    }

    /// Rejects the call unless the controller sits in `expected`.
    /// A rejected call has no side effect and leaves the state unchanged.
    fn expect_state(&self, expected: PipelineState, operation: &str) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(Error::Precondition(format!(
                "cannot {} in state {} (requires {})",
                operation, self.state, expected
            )))
        }
    }

    /// Moves to `next` on success, to `Failed` on a fatal error
    fn advance<T>(&mut self, result: Result<T>, next: PipelineState) -> Result<T> {
        match result {
            Ok(value) => {
                info!("Pipeline: {} -> {}", self.state, next);
                self.state = next;
                Ok(value)
            }
            Err(e) => {
                error!("Pipeline failed in state {}: {}", self.state, e);
                self.state = PipelineState::Failed;
                Err(e)
            }
        }
    }

    fn parts(&self) -> Result<(&Arc<ExperimentConfig>, &SvmModel)> {
        match (&self.config, &self.model) {
            (Some(config), Some(model)) => Ok((config, model)),
            _ => Err(Error::Precondition("pipeline has no model".to_string())),
        }
    }

    fn record_warning(&mut self, stage: &str, err: Error) {
        let err = match err {
            Error::Reporting(_) => err,
            other => Error::reporting(stage, other),
        };
        warn!("{}", err);
        self.warnings.push(err);
    }

    /// `Unconfigured → Configured`
    pub fn configure(&mut self, raw: &RawArguments) -> Result<Arc<ExperimentConfig>> {
        self.expect_state(PipelineState::Unconfigured, "configure")?;
        let result = ExperimentConfig::apply(raw).map(Arc::new);
        let config = self.advance(result, PipelineState::Configured)?;
        self.config = Some(Arc::clone(&config));
        Ok(config)
    }

    /// `Configured → ModelBuilt`. The loss/kernel pairing is checked before any data is loaded.
    pub fn build_model(&mut self) -> Result<()> {
        self.expect_state(PipelineState::Configured, "build the model")?;
        let result = self.construct_model();
        let model = self.advance(result, PipelineState::ModelBuilt)?;
        self.model = Some(model);
        Ok(())
    }

    fn construct_model(&self) -> Result<SvmModel> {
        let config = self
            .config
            .as_ref()
            .ok_or_else(|| Error::Precondition("configuration missing".to_string()))?;
        SvmModel::check_combination(config.svm.loss, config.svm.kernel)?;
        let selection = DatasetSelection::resolve(config);
        let data = self.collaborators.loader.load(&selection)?;
        SvmModel::construct(data, &config.svm, config.seed)
    }

    /// `ModelBuilt → Trained`
    pub fn train(&mut self) -> Result<FittedParameters> {
        self.expect_state(PipelineState::ModelBuilt, "train")?;
        let grid_search = self.config.as_ref().is_some_and(|c| c.svm.grid_search);
        let result = match self.model.as_mut() {
            Some(model) => model
                .train(grid_search)
                .and_then(|_| model.fitted_parameters()),
            None => Err(Error::Precondition("pipeline has no model".to_string())),
        };
        self.advance(result, PipelineState::Trained)
    }

    /// `Trained → Scored`: train partition first, then test
    pub fn score(&mut self) -> Result<()> {
        self.expect_state(PipelineState::Trained, "score")?;
        let result = self.score_partitions();
        let results = self.advance(result, PipelineState::Scored)?;
        self.results = Some(results);
        Ok(())
    }

    fn score_partitions(&mut self) -> Result<ResultsArtifact> {
        let model = self
            .model
            .as_mut()
            .ok_or_else(|| Error::Precondition("pipeline has no model".to_string()))?;
        // train, test の順。検証分割があれば最後に
        for partition in [Partition::Train, Partition::Test, Partition::Val] {
            if model.dataset().partition(partition).is_none() {
                continue;
            }
            let scored = model.predict(partition)?.count();
            info!("Scored {} {} samples", scored, partition);
        }
        let (config, model) = self.parts()?;
        ResultsArtifact::collect(model, config)
    }

    /// `Scored → Reported`. Sink failures become warnings.
    pub fn report(&mut self) -> Result<()> {
        self.expect_state(PipelineState::Scored, "report")?;
        let mut failures = Vec::new();
        {
            let (config, model) = self.parts()?;
            let results = self
                .results
                .as_ref()
                .ok_or_else(|| Error::Precondition("no results to report".to_string()))?;
            let sink = &self.collaborators.reporter;
            let outcomes = [
                ("experiment config log", sink.log_exp_config(config)),
                ("model summary log", sink.log_model_summary(config, model)),
                ("AD results log", sink.log_ad_results(config, results)),
                ("AD info log", sink.log_ad_info(config, results)),
            ];
            for (stage, outcome) in outcomes {
                if let Err(e) = outcome {
                    failures.push((stage, e));
                }
            }
        }
        for (stage, e) in failures {
            self.record_warning(stage, e);
        }
        self.advance(Ok(()), PipelineState::Reported)
    }

    /// `Reported → Persisted`: `model.p` then `AD_results.p`; any failure is fatal
    pub fn persist(&mut self) -> Result<Vec<PathBuf>> {
        self.expect_state(PipelineState::Reported, "persist")?;
        let result = self.write_artifacts();
        let paths = self.advance(result, PipelineState::Persisted)?;
        self.artifacts = paths.clone();
        Ok(paths)
    }

    fn write_artifacts(&self) -> Result<Vec<PathBuf>> {
        let (config, model) = self.parts()?;
        let results = self
            .results
            .as_ref()
            .ok_or_else(|| Error::Precondition("no results to persist".to_string()))?;
        let writer = &self.collaborators.artifacts;
        let model_path = writer.write_model(model, &config.xp_dir)?;
        let results_path = writer.write_results(results, &config.xp_dir)?;
        Ok(vec![model_path, results_path])
    }

    /// `Persisted → Done`: optional exemplar plot, failure is a warning
    pub fn finish(&mut self) -> Result<RunReport> {
        self.expect_state(PipelineState::Persisted, "finish")?;
        let plotted = {
            let (config, model) = self.parts()?;
            if config.plot.enabled {
                let stem = config.xp_dir.join(PLOT_STEM);
                Some(self.collaborators.plotter.plot(model, config.plot.n_img, &stem))
            } else {
                None
            }
        };
        match plotted {
            Some(Ok(path)) => self.plot = Some(path),
            Some(Err(e)) => self.record_warning("exemplar plot", e),
            None => {}
        }

        let fitted = self.parts()?.1.fitted_parameters()?;
        let results = self
            .results
            .clone()
            .ok_or_else(|| Error::Precondition("no results".to_string()))?;
        let report = RunReport {
            fitted,
            results,
            artifacts: self.artifacts.clone(),
            plot: self.plot.clone(),
            warnings: std::mem::take(&mut self.warnings),
        };
        self.advance(Ok(report), PipelineState::Done)
    }

    /// Drives every transition in order
    pub fn run(&mut self, raw: &RawArguments) -> Result<RunReport> {
        self.configure(raw)?;
        self.build_model()?;
        self.train()?;
        self.score()?;
        self.report()?;
        self.persist()?;
        self.finish()
    }
}
