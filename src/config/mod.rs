//! Configuration Store
//!
//! 実験パラメータの唯一の情報源。CLI・TOML・環境変数から `RawArguments` を組み立て、
//! `ExperimentConfig::apply` で検証済みの不変な設定値に変換する。
//! 以降のステージは `Arc<ExperimentConfig>` を読み取り専用で共有する。

pub mod args;
pub mod class_spec;
pub mod loader;
pub mod types;

pub use args::CliArgs;
pub use class_spec::{ClassExpr, ClassSpecification, LabelSet, LabelUniverse};
pub use loader::{ConfigLoader, ENV_PREFIX};
pub use types::{
    DatasetName, DatasetSplit, ExperimentConfig, KernelKind, LossKind, NormMode, PlotSettings,
    RawArguments, SvmSettings,
};
