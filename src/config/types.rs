use super::class_spec::{ClassSpecification, LabelUniverse};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident, $flag:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            /// All accepted variants in declaration order
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(raw: &str) -> Result<Self> {
                match raw {
                    $($text => Ok($name::$variant),)+
                    _ => Err(Error::Configuration(format!(
                        "invalid {} '{}'; expected one of: {}",
                        $flag,
                        raw,
                        [$($text),+].join(", ")
                    ))),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_enum!(
    /// Supported datasets
    DatasetName, "--dataset", {
        Mnist => "mnist",
        Cifar10 => "cifar10",
        MobiFall => "mobiFall",
    }
);

string_enum!(
    /// Loss function of the support-vector model
    LossKind, "--loss", {
        OneClassSvm => "OneClassSVM",
        Svc => "SVC",
    }
);

string_enum!(
    /// Kernel selection
    KernelKind, "--kernel", {
        Linear => "linear",
        Poly => "poly",
        Rbf => "rbf",
        Sigmoid => "sigmoid",
        DegreeKernel => "DegreeKernel",
        WeightedDegreeKernel => "WeightedDegreeKernel",
    }
);

string_enum!(
    /// Norm used by global contrast normalization
    NormMode, "--unit_norm_used", {
        Std => "std",
        L1 => "l1",
        L2 => "l2",
    }
);

impl DatasetName {
    /// Label universe of the dataset
    pub fn label_universe(&self) -> LabelUniverse {
        match self {
            DatasetName::Mnist => LabelUniverse::new(10),
            DatasetName::Cifar10 => LabelUniverse::new(10),
            // 9 ADL activities + 4 fall types
            DatasetName::MobiFall => LabelUniverse::new(13),
        }
    }
}

impl KernelKind {
    /// Whether the kernel has a gamma hyperparameter
    pub fn uses_gamma(&self) -> bool {
        matches!(self, KernelKind::Poly | KernelKind::Rbf | KernelKind::Sigmoid)
    }

    /// Whether the kernel operates on quantized symbol strings
    pub fn is_string_kernel(&self) -> bool {
        matches!(self, KernelKind::DegreeKernel | KernelKind::WeightedDegreeKernel)
    }
}

/// Loosely typed experiment arguments, as produced by the configuration layers
/// (defaults, TOML file, environment, command line).
///
/// Flags are kept as 0/1 integers and class specifications as strings;
/// [`ExperimentConfig::apply`] performs the coercion and validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawArguments {
    pub dataset: Option<String>,
    pub xp_dir: Option<String>,
    pub loss: Option<String>,
    pub kernel: Option<String>,
    pub nu: f64,
    pub grid_search_cv: i64,
    pub out_frac: f64,
    pub seed: i64,
    pub ad_experiment: i64,
    pub unit_norm_used: String,
    pub gcn: i64,
    pub zca_whitening: i64,
    pub pca: i64,
    pub plot_examples: i64,
    pub info_file: Option<String>,
    pub data_dir: String,
    pub svm_c: f64,
    pub kernel_degree: i64,
    pub n_img: i64,
    pub mnist_val_frac: f64,
    pub mnist_normal: String,
    pub mnist_outlier: String,
    pub cifar10_val_frac: f64,
    pub cifar10_normal: String,
    pub cifar10_outlier: String,
    pub mobifall_val_frac: f64,
    pub mobifall_normal: String,
    pub mobifall_outlier: String,
}

impl Default for RawArguments {
    fn default() -> Self {
        Self {
            dataset: None,
            xp_dir: None,
            loss: None,
            kernel: None,
            nu: 0.1,
            grid_search_cv: 0,
            out_frac: 0.0,
            seed: 0,
            ad_experiment: 1,
            unit_norm_used: "l1".to_string(),
            gcn: 0,
            zca_whitening: 0,
            pca: 0,
            plot_examples: 0,
            info_file: None,
            data_dir: "data".to_string(),
            svm_c: 1.0,
            kernel_degree: 3,
            n_img: 32,
            // k-fold style validation happens inside the model adapter
            mnist_val_frac: 0.0,
            mnist_normal: "0".to_string(),
            mnist_outlier: "range(1,10)".to_string(),
            cifar10_val_frac: 0.0,
            cifar10_normal: "0".to_string(),
            cifar10_outlier: "range(1,10)".to_string(),
            mobifall_val_frac: 1.0 / 6.0,
            mobifall_normal: "0".to_string(),
            mobifall_outlier: "range(1,10)".to_string(),
        }
    }
}

/// Validation share and class split of one dataset
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetSplit {
    pub val_frac: f64,
    pub classes: ClassSpecification,
}

/// Support-vector model settings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SvmSettings {
    pub loss: LossKind,
    pub kernel: KernelKind,
    pub nu: f64,
    pub c: f64,
    pub degree: u32,
    pub grid_search: bool,
}

/// Exemplar plot settings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlotSettings {
    pub enabled: bool,
    pub n_img: usize,
}

/// Immutable experiment configuration.
///
/// Built exactly once by [`ExperimentConfig::apply`] and shared read-only
/// (`Arc<ExperimentConfig>`) with every later pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExperimentConfig {
    pub dataset: DatasetName,
    pub xp_dir: PathBuf,
    pub info_file: Option<PathBuf>,
    pub data_dir: PathBuf,
    pub seed: u64,
    pub out_frac: f64,
    pub ad_experiment: bool,
    pub unit_norm_used: NormMode,
    pub gcn: bool,
    pub zca_whitening: bool,
    pub pca: bool,
    pub mnist: DatasetSplit,
    pub cifar10: DatasetSplit,
    pub mobi_fall: DatasetSplit,
    pub svm: SvmSettings,
    pub plot: PlotSettings,
}

fn required<'a>(value: &'a Option<String>, flag: &str) -> Result<&'a str> {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| Error::Configuration(format!("missing required argument {}", flag)))
}

fn flag(value: i64, name: &str) -> Result<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(Error::Configuration(format!(
            "{} must be 0 or 1, got {}",
            name, other
        ))),
    }
}

fn fraction(value: f64, name: &str, allow_zero: bool, allow_one: bool) -> Result<f64> {
    let lower_ok = if allow_zero { value >= 0.0 } else { value > 0.0 };
    let upper_ok = if allow_one { value <= 1.0 } else { value < 1.0 };
    if value.is_finite() && lower_ok && upper_ok {
        Ok(value)
    } else {
        Err(Error::Configuration(format!(
            "{} out of range: {}",
            name, value
        )))
    }
}

fn positive_count(value: i64, name: &str) -> Result<u64> {
    u64::try_from(value)
        .ok()
        .filter(|v| *v >= 1)
        .ok_or_else(|| Error::Configuration(format!("{} must be >= 1, got {}", name, value)))
}

fn dataset_split(
    val_frac: f64,
    normal: &str,
    outlier: &str,
    dataset: DatasetName,
) -> Result<DatasetSplit> {
    let val_frac = fraction(val_frac, &format!("{}_val_frac", dataset), true, false)?;
    let classes = ClassSpecification::resolve(normal, outlier, &dataset.label_universe())
        .map_err(|e| Error::Configuration(format!("{} classes: {}", dataset, e)))?;
    Ok(DatasetSplit { val_frac, classes })
}

impl ExperimentConfig {
    /// Validates and coerces raw arguments into the experiment configuration.
    ///
    /// Fails with [`Error::Configuration`] when the experiment directory does
    /// not exist, a required argument is missing, a value is out of range, or
    /// a class specification cannot be resolved.
    pub fn apply(raw: &RawArguments) -> Result<Self> {
        let xp_dir = PathBuf::from(required(&raw.xp_dir, "--xp_dir")?);
        if !xp_dir.is_dir() {
            return Err(Error::Configuration(format!(
                "directory not found: {}",
                xp_dir.display()
            )));
        }

        let dataset: DatasetName = required(&raw.dataset, "--dataset")?.parse()?;
        let loss: LossKind = required(&raw.loss, "--loss")?.parse()?;
        let kernel: KernelKind = required(&raw.kernel, "--kernel")?.parse()?;

        let nu = fraction(raw.nu, "--nu", false, true)?;
        let out_frac = fraction(raw.out_frac, "--out_frac", true, false)?;
        if !(raw.svm_c.is_finite() && raw.svm_c > 0.0) {
            return Err(Error::Configuration(format!(
                "--svm_C must be positive, got {}",
                raw.svm_c
            )));
        }
        let seed = u64::try_from(raw.seed).map_err(|_| {
            Error::Configuration(format!("--seed must be non-negative, got {}", raw.seed))
        })?;
        let degree = u32::try_from(positive_count(raw.kernel_degree, "--kernel_degree")?)
            .map_err(|_| Error::Configuration("--kernel_degree too large".to_string()))?;
        let n_img = usize::try_from(positive_count(raw.n_img, "--n_img")?)
            .map_err(|_| Error::Configuration("--n_img too large".to_string()))?;

        let mnist = dataset_split(
            raw.mnist_val_frac,
            &raw.mnist_normal,
            &raw.mnist_outlier,
            DatasetName::Mnist,
        )?;
        let cifar10 = dataset_split(
            raw.cifar10_val_frac,
            &raw.cifar10_normal,
            &raw.cifar10_outlier,
            DatasetName::Cifar10,
        )?;
        let mobi_fall = dataset_split(
            raw.mobifall_val_frac,
            &raw.mobifall_normal,
            &raw.mobifall_outlier,
            DatasetName::MobiFall,
        )?;

        Ok(Self {
            dataset,
            xp_dir,
            info_file: raw
                .info_file
                .as_deref()
                .filter(|f| !f.trim().is_empty())
                .map(PathBuf::from),
            data_dir: PathBuf::from(&raw.data_dir),
            seed,
            out_frac,
            ad_experiment: flag(raw.ad_experiment, "--ad_experiment")?,
            unit_norm_used: raw.unit_norm_used.parse()?,
            gcn: flag(raw.gcn, "--gcn")?,
            zca_whitening: flag(raw.zca_whitening, "--zca_whitening")?,
            pca: flag(raw.pca, "--pca")?,
            mnist,
            cifar10,
            mobi_fall,
            svm: SvmSettings {
                loss,
                kernel,
                nu,
                c: raw.svm_c,
                degree,
                grid_search: flag(raw.grid_search_cv, "--GridSearchCV")?,
            },
            plot: PlotSettings {
                enabled: flag(raw.plot_examples, "--plot_examples")?,
                n_img,
            },
        })
    }

    /// Split settings of the selected dataset
    pub fn split(&self) -> &DatasetSplit {
        self.split_for(self.dataset)
    }

    /// Split settings of any dataset
    pub fn split_for(&self, dataset: DatasetName) -> &DatasetSplit {
        match dataset {
            DatasetName::Mnist => &self.mnist,
            DatasetName::Cifar10 => &self.cifar10,
            DatasetName::MobiFall => &self.mobi_fall,
        }
    }

    /// Human-readable `key: value` lines describing the experiment
    pub fn summary_lines(&self) -> Vec<String> {
        let split = self.split();
        let mut lines = vec![
            format!("{:16}: {}", "dataset", self.dataset),
            format!("{:16}: {}", "xp_dir", self.xp_dir.display()),
            format!("{:16}: {}", "data_dir", self.data_dir.display()),
            format!("{:16}: {}", "seed", self.seed),
            format!("{:16}: {}", "out_frac", self.out_frac),
            format!("{:16}: {}", "ad_experiment", self.ad_experiment),
            format!("{:16}: {}", "unit_norm_used", self.unit_norm_used),
            format!("{:16}: {}", "gcn", self.gcn),
            format!("{:16}: {}", "zca_whitening", self.zca_whitening),
            format!("{:16}: {}", "pca", self.pca),
            format!("{:16}: {}", "val_frac", split.val_frac),
            format!("{:16}: {}", "normal classes", split.classes.normal()),
            format!("{:16}: {}", "outlier classes", split.classes.outlier()),
            format!("{:16}: {}", "loss", self.svm.loss),
            format!("{:16}: {}", "kernel", self.svm.kernel),
            format!("{:16}: {}", "nu", self.svm.nu),
            format!("{:16}: {}", "C", self.svm.c),
            format!("{:16}: {}", "GridSearchCV", self.svm.grid_search),
            format!("{:16}: {}", "plot_examples", self.plot.enabled),
        ];
        if let Some(info) = &self.info_file {
            lines.push(format!("{:16}: {}", "info_file", info.display()));
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn raw_for(dir: &std::path::Path) -> RawArguments {
        RawArguments {
            dataset: Some("mnist".to_string()),
            xp_dir: Some(dir.display().to_string()),
            loss: Some("OneClassSVM".to_string()),
            kernel: Some("rbf".to_string()),
            ..RawArguments::default()
        }
    }

    #[test]
    fn test_apply_defaults() {
        let dir = tempdir().unwrap();
        let config = ExperimentConfig::apply(&raw_for(dir.path())).unwrap();

        assert_eq!(config.dataset, DatasetName::Mnist);
        assert_eq!(config.svm.loss, LossKind::OneClassSvm);
        assert_eq!(config.svm.kernel, KernelKind::Rbf);
        assert_eq!(config.svm.nu, 0.1);
        assert!(!config.svm.grid_search);
        assert!(config.ad_experiment);
        assert_eq!(config.unit_norm_used, NormMode::L1);
        assert_eq!(config.mobi_fall.val_frac, 1.0 / 6.0);
        assert_eq!(config.split().classes.normal().to_vec(), vec![0]);
    }

    #[test]
    fn test_missing_directory() {
        let dir = tempdir().unwrap();
        let mut raw = raw_for(dir.path());
        raw.xp_dir = Some(dir.path().join("missing").display().to_string());

        match ExperimentConfig::apply(&raw) {
            Err(Error::Configuration(msg)) => assert!(msg.contains("directory not found")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_rejects_bad_flags_and_enums() {
        let dir = tempdir().unwrap();

        let mut raw = raw_for(dir.path());
        raw.gcn = 2;
        assert!(matches!(ExperimentConfig::apply(&raw), Err(Error::Configuration(_))));

        let mut raw = raw_for(dir.path());
        raw.kernel = Some("laplacian".to_string());
        assert!(matches!(ExperimentConfig::apply(&raw), Err(Error::Configuration(_))));

        let mut raw = raw_for(dir.path());
        raw.nu = 0.0;
        assert!(matches!(ExperimentConfig::apply(&raw), Err(Error::Configuration(_))));

        let mut raw = raw_for(dir.path());
        raw.seed = -1;
        assert!(matches!(ExperimentConfig::apply(&raw), Err(Error::Configuration(_))));

        let mut raw = raw_for(dir.path());
        raw.loss = None;
        assert!(matches!(ExperimentConfig::apply(&raw), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_unparseable_class_spec_on_unused_dataset_still_fails() {
        let dir = tempdir().unwrap();
        let mut raw = raw_for(dir.path());
        raw.cifar10_outlier = "range(1,".to_string();
        assert!(matches!(ExperimentConfig::apply(&raw), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_enum_round_trip() {
        for kernel in KernelKind::ALL {
            assert_eq!(kernel.as_str().parse::<KernelKind>().unwrap(), *kernel);
        }
        for dataset in DatasetName::ALL {
            assert_eq!(dataset.to_string().parse::<DatasetName>().unwrap(), *dataset);
        }
    }
}
