//! CIFAR-10 binary batch reader
//!
//! 各レコードは 1 バイトのラベルと 3072 バイトの画素（R, G, B の各 32x32 平面）。

use super::{bytes_to_matrix, ImageShape, RawSplit, SourceSplits};
use crate::error::{Error, Result};
use std::fs;
use std::path::Path;
use tracing::info;

const SHAPE: ImageShape = ImageShape {
    height: 32,
    width: 32,
    channels: 3,
};
const RECORD_LEN: usize = 1 + 32 * 32 * 3;
const TRAIN_BATCHES: [&str; 5] = [
    "data_batch_1.bin",
    "data_batch_2.bin",
    "data_batch_3.bin",
    "data_batch_4.bin",
    "data_batch_5.bin",
];
const TEST_BATCH: &str = "test_batch.bin";

/// `data_batch_{1..5}.bin` と `test_batch.bin` を読み込む
pub fn read(dir: &Path) -> Result<SourceSplits> {
    let train = read_batches(dir, &TRAIN_BATCHES)?;
    let test = read_batches(dir, &[TEST_BATCH])?;
    info!(
        "Loaded CIFAR-10: {} train / {} test images",
        train.labels.len(),
        test.labels.len()
    );
    Ok(SourceSplits {
        train,
        test,
        shape: Some(SHAPE),
    })
}

fn read_batches(dir: &Path, names: &[&str]) -> Result<RawSplit> {
    let mut labels = Vec::new();
    let mut pixels = Vec::new();

    for name in names {
        let path = dir.join(name);
        let bytes = fs::read(&path)
            .map_err(|e| Error::Dataset(format!("cannot read {}: {}", path.display(), e)))?;
        parse_batch(&bytes, &mut labels, &mut pixels)
            .map_err(|e| Error::Dataset(format!("{}: {}", path.display(), e)))?;
    }

    let features = bytes_to_matrix(&pixels, labels.len(), SHAPE.len())?;
    RawSplit::new(features, labels)
}

fn parse_batch(bytes: &[u8], labels: &mut Vec<u32>, pixels: &mut Vec<u8>) -> Result<()> {
    if bytes.len() % RECORD_LEN != 0 {
        return Err(Error::Dataset(format!(
            "batch size {} is not a multiple of the {}-byte record",
            bytes.len(),
            RECORD_LEN
        )));
    }
    for record in bytes.chunks_exact(RECORD_LEN) {
        let label = u32::from(record[0]);
        if label >= 10 {
            return Err(Error::Dataset(format!("invalid CIFAR-10 label {}", label)));
        }
        labels.push(label);
        pixels.extend_from_slice(&record[1..]);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(label: u8, fill: u8) -> Vec<u8> {
        let mut out = vec![label];
        out.extend(std::iter::repeat(fill).take(RECORD_LEN - 1));
        out
    }

    #[test]
    fn test_parse_batch() {
        let mut bytes = record(3, 255);
        bytes.extend(record(9, 0));

        let mut labels = Vec::new();
        let mut pixels = Vec::new();
        parse_batch(&bytes, &mut labels, &mut pixels).unwrap();

        assert_eq!(labels, vec![3, 9]);
        assert_eq!(pixels.len(), 2 * SHAPE.len());
    }

    #[test]
    fn test_rejects_truncated_batch() {
        let bytes = record(1, 1);
        let mut labels = Vec::new();
        let mut pixels = Vec::new();
        assert!(parse_batch(&bytes[..100], &mut labels, &mut pixels).is_err());
    }

    #[test]
    fn test_rejects_bad_label() {
        let mut labels = Vec::new();
        let mut pixels = Vec::new();
        assert!(parse_batch(&record(12, 0), &mut labels, &mut pixels).is_err());
    }
}
