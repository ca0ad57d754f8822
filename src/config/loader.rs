use super::args::CliArgs;
use super::types::RawArguments;
use crate::error::Result;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable prefix (`OCSVM_NU=0.05`, `OCSVM_MNIST_NORMAL=3`, ...)
pub const ENV_PREFIX: &str = "OCSVM";

/// Configuration loader with builder pattern.
///
/// Layers, lowest precedence first: built-in defaults, TOML file,
/// environment variables, command-line flags.
pub struct ConfigLoader {
    config_file: Option<PathBuf>,
    load_env: bool,
    cli_override: Option<CliArgs>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            config_file: None,
            load_env: false,
            cli_override: None,
        }
    }

    /// Load configuration from file
    pub fn load_from_file(mut self, path: Option<&Path>) -> Self {
        self.config_file = path.map(Path::to_path_buf);
        self
    }

    /// Load configuration from environment variables
    pub fn load_from_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    /// Load configuration from CLI arguments (also picks up `--config`)
    pub fn load_from_cli(mut self, cli: &CliArgs) -> Self {
        if self.config_file.is_none() {
            self.config_file = cli.config.clone();
        }
        self.cli_override = Some(cli.clone());
        self
    }

    /// Build the raw experiment arguments
    pub fn build(self) -> Result<RawArguments> {
        let mut builder = Config::builder().add_source(Config::try_from(&RawArguments::default())?);

        if let Some(config_path) = &self.config_file {
            debug!("Loading experiment arguments from {}", config_path.display());
            builder = builder.add_source(File::from(config_path.as_path()).required(true));
        }

        if self.load_env {
            builder = builder.add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );
        }

        if let Some(cli) = &self.cli_override {
            builder = apply_cli_overrides(builder, cli)?;
        }

        let raw: RawArguments = builder.build()?.try_deserialize()?;
        Ok(raw)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn path_string(path: &Option<PathBuf>) -> Option<String> {
    path.as_ref().map(|p| p.display().to_string())
}

fn apply_cli_overrides(
    builder: ConfigBuilder<DefaultState>,
    cli: &CliArgs,
) -> Result<ConfigBuilder<DefaultState>> {
    let builder = builder
        .set_override_option("dataset", cli.dataset.clone())?
        .set_override_option("xp_dir", path_string(&cli.xp_dir))?
        .set_override_option("loss", cli.loss.clone())?
        .set_override_option("kernel", cli.kernel.clone())?
        .set_override_option("nu", cli.nu)?
        .set_override_option("grid_search_cv", cli.grid_search_cv)?
        .set_override_option("out_frac", cli.out_frac)?
        .set_override_option("seed", cli.seed)?
        .set_override_option("ad_experiment", cli.ad_experiment)?
        .set_override_option("unit_norm_used", cli.unit_norm_used.clone())?
        .set_override_option("gcn", cli.gcn)?
        .set_override_option("zca_whitening", cli.zca_whitening)?
        .set_override_option("pca", cli.pca)?
        .set_override_option("plot_examples", cli.plot_examples)?
        .set_override_option("info_file", path_string(&cli.info_file))?
        .set_override_option("data_dir", path_string(&cli.data_dir))?
        .set_override_option("svm_c", cli.svm_c)?
        .set_override_option("kernel_degree", cli.kernel_degree)?
        .set_override_option("n_img", cli.n_img)?
        .set_override_option("mnist_val_frac", cli.mnist_val_frac)?
        .set_override_option("mnist_normal", cli.mnist_normal.clone())?
        .set_override_option("mnist_outlier", cli.mnist_outlier.clone())?
        .set_override_option("cifar10_val_frac", cli.cifar10_val_frac)?
        .set_override_option("cifar10_normal", cli.cifar10_normal.clone())?
        .set_override_option("cifar10_outlier", cli.cifar10_outlier.clone())?
        .set_override_option("mobifall_val_frac", cli.mobifall_val_frac)?
        .set_override_option("mobifall_normal", cli.mobifall_normal.clone())?
        .set_override_option("mobifall_outlier", cli.mobifall_outlier.clone())?;
    Ok(builder)
}
