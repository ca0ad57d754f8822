//! Command-line arguments
//!
//! Every option is optional at this layer so that TOML files and `OCSVM_*`
//! environment variables can supply values; [`super::ExperimentConfig::apply`]
//! enforces what is required.

use crate::logging::LogConfig;
use clap::Parser;
use std::path::PathBuf;

/// One-class SVM / SVC anomaly-detection baseline
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "ocsvm-rs")]
#[command(about = "Train and evaluate a One-Class SVM or SVC anomaly-detection baseline")]
#[command(version)]
pub struct CliArgs {
    /// Optional TOML file with experiment arguments (same keys as the flags, lowercase)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Dataset name
    #[arg(long, value_parser = ["mnist", "cifar10", "mobiFall"])]
    pub dataset: Option<String>,

    /// Directory for the experiment (must exist)
    #[arg(long = "xp_dir")]
    pub xp_dir: Option<PathBuf>,

    /// Loss function
    #[arg(long, value_parser = ["OneClassSVM", "SVC"])]
    pub loss: Option<String>,

    /// Kernel
    #[arg(long, value_parser = ["linear", "poly", "rbf", "sigmoid", "DegreeKernel", "WeightedDegreeKernel"])]
    pub kernel: Option<String>,

    /// nu parameter of the one-class SVM [default: 0.1]
    #[arg(long)]
    pub nu: Option<f64>,

    /// Search gamma and nu via validation (0/1) [default: 0]
    #[arg(long = "GridSearchCV")]
    pub grid_search_cv: Option<i64>,

    /// Fraction of outliers in the training set [default: 0]
    #[arg(long = "out_frac")]
    pub out_frac: Option<f64>,

    /// Random seed [default: 0]
    #[arg(long)]
    pub seed: Option<i64>,

    /// Two-class anomaly-detection experiment (1) or multiclass training set (0) [default: 1]
    #[arg(long = "ad_experiment")]
    pub ad_experiment: Option<i64>,

    /// Norm used for scaling data to unit norm: std, l1, l2 [default: l1]
    #[arg(long = "unit_norm_used")]
    pub unit_norm_used: Option<String>,

    /// Apply global contrast normalization (0/1) [default: 0]
    #[arg(long)]
    pub gcn: Option<i64>,

    /// Apply ZCA whitening (0/1) [default: 0]
    #[arg(long = "zca_whitening")]
    pub zca_whitening: Option<i64>,

    /// Apply PCA (0/1) [default: 0]
    #[arg(long)]
    pub pca: Option<i64>,

    /// Plot the most anomalous and most normal test exemplars (0/1) [default: 0]
    #[arg(long = "plot_examples")]
    pub plot_examples: Option<i64>,

    /// File collecting one summary line per run
    #[arg(long = "info_file")]
    pub info_file: Option<PathBuf>,

    /// Root directory of the datasets [default: data]
    #[arg(long = "data_dir")]
    pub data_dir: Option<PathBuf>,

    /// C parameter of the SVC [default: 1.0]
    #[arg(long = "svm_C")]
    pub svm_c: Option<f64>,

    /// Degree of poly / DegreeKernel / WeightedDegreeKernel [default: 3]
    #[arg(long = "kernel_degree")]
    pub kernel_degree: Option<i64>,

    /// Exemplars per side in the plot [default: 32]
    #[arg(long = "n_img")]
    pub n_img: Option<i64>,

    /// Validation fraction of the MNIST training data [default: 0]
    #[arg(long = "mnist_val_frac")]
    pub mnist_val_frac: Option<f64>,

    /// Normal classes in MNIST [default: 0]
    #[arg(long = "mnist_normal")]
    pub mnist_normal: Option<String>,

    /// Outlier classes in MNIST [default: range(1,10)]
    #[arg(long = "mnist_outlier")]
    pub mnist_outlier: Option<String>,

    /// Validation fraction of the CIFAR-10 training data [default: 0]
    #[arg(long = "cifar10_val_frac")]
    pub cifar10_val_frac: Option<f64>,

    /// Normal classes in CIFAR-10 [default: 0]
    #[arg(long = "cifar10_normal")]
    pub cifar10_normal: Option<String>,

    /// Outlier classes in CIFAR-10 [default: range(1,10)]
    #[arg(long = "cifar10_outlier")]
    pub cifar10_outlier: Option<String>,

    /// Validation fraction of the MobiFall training data [default: 1/6]
    #[arg(long = "mobiFall_val_frac")]
    pub mobifall_val_frac: Option<f64>,

    /// Normal classes in MobiFall [default: 0]
    #[arg(long = "mobiFall_normal")]
    pub mobifall_normal: Option<String>,

    /// Outlier classes in MobiFall [default: range(1,10)]
    #[arg(long = "mobiFall_outlier")]
    pub mobifall_outlier: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long = "log_level", default_value = "info", env = "OCSVM_LOG_LEVEL")]
    pub log_level: String,

    /// Only warnings and errors on the console
    #[arg(long)]
    pub quiet: bool,

    /// Do not write the diagnostic log file into the experiment directory
    #[arg(long = "no_log_file")]
    pub no_log_file: bool,
}

impl CliArgs {
    /// 診断ログ設定。ファイル出力は xp_dir が存在する場合のみ
    pub fn log_config(&self, xp_dir: Option<&str>) -> LogConfig {
        let config = LogConfig::default()
            .with_level(self.log_level.as_str())
            .with_console(!self.quiet)
            .with_file(!self.no_log_file);
        match xp_dir {
            Some(dir) => config.with_log_dir(dir),
            None => config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_underscore_flag_spellings() {
        let args = CliArgs::try_parse_from([
            "ocsvm-rs",
            "--dataset",
            "mobiFall",
            "--xp_dir",
            "/tmp/xp",
            "--loss",
            "OneClassSVM",
            "--kernel",
            "WeightedDegreeKernel",
            "--GridSearchCV",
            "1",
            "--mobiFall_outlier",
            "range(1,13)",
            "--svm_C",
            "10",
        ])
        .unwrap();

        assert_eq!(args.dataset.as_deref(), Some("mobiFall"));
        assert_eq!(args.grid_search_cv, Some(1));
        assert_eq!(args.mobifall_outlier.as_deref(), Some("range(1,13)"));
        assert_eq!(args.svm_c, Some(10.0));
        assert_eq!(args.nu, None);
    }

    #[test]
    fn test_log_flags_shape_log_config() {
        let defaults = CliArgs::try_parse_from(["ocsvm-rs"]).unwrap().log_config(None);
        assert!(defaults.console_enabled);
        assert!(defaults.file_enabled);
        assert_eq!(defaults.log_dir, None);

        let args = CliArgs::try_parse_from([
            "ocsvm-rs",
            "--quiet",
            "--no_log_file",
            "--log_level",
            "debug",
        ])
        .unwrap();
        let config = args.log_config(Some("/tmp/xp"));
        assert!(!config.console_enabled);
        assert!(!config.file_enabled);
        assert_eq!(config.level, "debug");
        assert_eq!(config.log_dir, Some(PathBuf::from("/tmp/xp")));
    }

    #[test]
    fn test_rejects_unknown_kernel() {
        let result = CliArgs::try_parse_from(["ocsvm-rs", "--kernel", "laplacian"]);
        assert!(result.is_err());
    }
}
