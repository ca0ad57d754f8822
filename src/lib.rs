//! # ocsvm-rs
//!
//! One-Class SVM / SVC anomaly-detection baseline for MNIST, CIFAR-10 and MobiFall.
//!
//! A run configures itself from CLI flags, TOML and `OCSVM_*` environment
//! variables, loads a dataset with a configurable normal/outlier class split,
//! fits a support-vector model (optionally grid-searched on validation AUC),
//! scores the train and test partitions and writes text reports, the fitted
//! model, the results record and an exemplar plot into the experiment directory.

pub mod config;
pub mod dataset;
pub mod error;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod reporting;
pub mod storage;

pub use config::{ConfigLoader, ExperimentConfig, RawArguments};
pub use error::{Error, Result};
pub use model::SvmModel;
pub use pipeline::{Collaborators, PipelineController, PipelineState, RunReport};
