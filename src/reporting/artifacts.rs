//! Model and results persistence

use super::{ArtifactWriter, ResultsArtifact};
use crate::error::Result;
use crate::model::SvmModel;
use crate::storage;
use std::path::{Path, PathBuf};
use tracing::info;

pub const MODEL_FILE: &str = "model.p";
pub const RESULTS_FILE: &str = "AD_results.p";

/// xp_dir に JSON 成果物をアトミックに書き出す
#[derive(Debug, Default, Clone)]
pub struct FsArtifactWriter;

impl FsArtifactWriter {
    pub fn new() -> Self {
        Self
    }
}

impl ArtifactWriter for FsArtifactWriter {
    fn write_model(&self, model: &SvmModel, xp_dir: &Path) -> Result<PathBuf> {
        let path = xp_dir.join(MODEL_FILE);
        model.dump_model(&path)?;
        Ok(path)
    }

    fn write_results(&self, results: &ResultsArtifact, xp_dir: &Path) -> Result<PathBuf> {
        let path = xp_dir.join(RESULTS_FILE);
        storage::write_json_atomic(&path, results)?;
        info!("Results saved to {}", path.display());
        Ok(path)
    }
}
