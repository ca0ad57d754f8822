//! MNIST IDX reader (plain or gzip-compressed files)

use super::{bytes_to_matrix, ImageShape, RawSplit, SourceSplits};
use crate::error::{Error, Result};
use flate2::read::GzDecoder;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::info;

const IMAGE_MAGIC: u32 = 0x0000_0803;
const LABEL_MAGIC: u32 = 0x0000_0801;

/// Reads `train-*` and `t10k-*` IDX files from `dir`
pub fn read(dir: &Path) -> Result<SourceSplits> {
    let (train, shape) = read_split(dir, "train")?;
    let (test, _) = read_split(dir, "t10k")?;
    info!(
        "Loaded MNIST: {} train / {} test images of {}x{}",
        train.labels.len(),
        test.labels.len(),
        shape.height,
        shape.width
    );
    Ok(SourceSplits {
        train,
        test,
        shape: Some(shape),
    })
}

fn read_split(dir: &Path, prefix: &str) -> Result<(RawSplit, ImageShape)> {
    let images = read_idx(&locate(dir, &format!("{}-images-idx3-ubyte", prefix))?)?;
    let labels = read_idx(&locate(dir, &format!("{}-labels-idx1-ubyte", prefix))?)?;

    let (n, shape, pixels) = parse_images(&images)?;
    let label_values = parse_labels(&labels)?;
    if label_values.len() != n {
        return Err(Error::Dataset(format!(
            "MNIST {}: {} images but {} labels",
            prefix,
            n,
            label_values.len()
        )));
    }

    let features = bytes_to_matrix(pixels, n, shape.len())?;
    Ok((RawSplit::new(features, label_values)?, shape))
}

/// Prefers the uncompressed file, falls back to `.gz`
fn locate(dir: &Path, name: &str) -> Result<PathBuf> {
    let plain = dir.join(name);
    if plain.is_file() {
        return Ok(plain);
    }
    let gz = dir.join(format!("{}.gz", name));
    if gz.is_file() {
        return Ok(gz);
    }
    Err(Error::Dataset(format!(
        "MNIST file {} not found in {}",
        name,
        dir.display()
    )))
}

fn read_idx(path: &Path) -> Result<Vec<u8>> {
    let bytes = fs::read(path)
        .map_err(|e| Error::Dataset(format!("cannot read {}: {}", path.display(), e)))?;
    if path.extension().and_then(|e| e.to_str()) == Some("gz") {
        let mut decoded = Vec::new();
        GzDecoder::new(bytes.as_slice())
            .read_to_end(&mut decoded)
            .map_err(|e| Error::Dataset(format!("cannot decompress {}: {}", path.display(), e)))?;
        Ok(decoded)
    } else {
        Ok(bytes)
    }
}

fn be_u32(bytes: &[u8], offset: usize) -> Result<u32> {
    bytes
        .get(offset..offset + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| Error::Dataset("truncated IDX header".to_string()))
}

fn parse_images(bytes: &[u8]) -> Result<(usize, ImageShape, &[u8])> {
    let magic = be_u32(bytes, 0)?;
    if magic != IMAGE_MAGIC {
        return Err(Error::Dataset(format!(
            "bad IDX image magic number {:#010x}",
            magic
        )));
    }
    let n = be_u32(bytes, 4)? as usize;
    let shape = ImageShape {
        height: be_u32(bytes, 8)? as usize,
        width: be_u32(bytes, 12)? as usize,
        channels: 1,
    };
    let body = &bytes[16..];
    if body.len() != n * shape.len() {
        return Err(Error::Dataset(format!(
            "IDX image payload has {} bytes, expected {}",
            body.len(),
            n * shape.len()
        )));
    }
    Ok((n, shape, body))
}

fn parse_labels(bytes: &[u8]) -> Result<Vec<u32>> {
    let magic = be_u32(bytes, 0)?;
    if magic != LABEL_MAGIC {
        return Err(Error::Dataset(format!(
            "bad IDX label magic number {:#010x}",
            magic
        )));
    }
    let n = be_u32(bytes, 4)? as usize;
    let body = &bytes[8..];
    if body.len() != n {
        return Err(Error::Dataset(format!(
            "IDX label payload has {} bytes, expected {}",
            body.len(),
            n
        )));
    }
    Ok(body.iter().map(|&b| u32::from(b)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::tempdir;

    fn idx_images(n: u32, rows: u32, cols: u32, fill: u8) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&IMAGE_MAGIC.to_be_bytes());
        out.extend_from_slice(&n.to_be_bytes());
        out.extend_from_slice(&rows.to_be_bytes());
        out.extend_from_slice(&cols.to_be_bytes());
        out.extend(std::iter::repeat(fill).take((n * rows * cols) as usize));
        out
    }

    fn idx_labels(labels: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&LABEL_MAGIC.to_be_bytes());
        out.extend_from_slice(&(labels.len() as u32).to_be_bytes());
        out.extend_from_slice(labels);
        out
    }

    #[test]
    fn test_read_plain_and_gzip() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("train-images-idx3-ubyte"), idx_images(3, 2, 2, 255)).unwrap();
        fs::write(dir.path().join("train-labels-idx1-ubyte"), idx_labels(&[0, 1, 2])).unwrap();

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&idx_images(2, 2, 2, 0)).unwrap();
        fs::write(
            dir.path().join("t10k-images-idx3-ubyte.gz"),
            encoder.finish().unwrap(),
        )
        .unwrap();
        fs::write(dir.path().join("t10k-labels-idx1-ubyte"), idx_labels(&[4, 5])).unwrap();

        let splits = read(dir.path()).unwrap();
        assert_eq!(splits.train.labels, vec![0, 1, 2]);
        assert_eq!(splits.train.features.dim(), (3, 4));
        assert_eq!(splits.train.features[[0, 0]], 1.0);
        assert_eq!(splits.test.labels, vec![4, 5]);
        assert_eq!(splits.test.features[[1, 3]], 0.0);
        assert_eq!(splits.shape.unwrap().channels, 1);
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = idx_images(1, 1, 1, 0);
        bytes[3] = 0x01;
        assert!(matches!(parse_images(&bytes), Err(Error::Dataset(_))));
    }

    #[test]
    fn test_missing_files() {
        let dir = tempdir().unwrap();
        assert!(matches!(read(dir.path()), Err(Error::Dataset(_))));
    }
}
