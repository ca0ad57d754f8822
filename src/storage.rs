//! Atomic JSON artifact storage

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// 同じディレクトリの一時ファイルに書き込んでから rename する。
/// 失敗時に途中までのファイルが `path` に残ることはない。
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let context = path.display().to_string();
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let file = NamedTempFile::new_in(parent).map_err(|e| Error::serialization(&context, e))?;
    {
        let mut writer = BufWriter::new(file.as_file());
        serde_json::to_writer(&mut writer, value).map_err(|e| Error::serialization(&context, e))?;
        writer.flush().map_err(|e| Error::serialization(&context, e))?;
    }
    file.as_file()
        .sync_all()
        .map_err(|e| Error::serialization(&context, e))?;
    file.persist(path)
        .map_err(|e| Error::serialization(&context, e.error))?;
    Ok(())
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let context = path.display().to_string();
    let bytes = fs::read(path).map_err(|e| Error::serialization(&context, e))?;
    serde_json::from_slice(&bytes).map_err(|e| Error::serialization(&context, e))
}
