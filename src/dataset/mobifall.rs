//! MobiFall feature CSV reader
//!
//! `train.csv` / `test.csv` の各行は `label,f1,f2,...,fn`。
//! 先頭行がラベルとして解釈できない場合はヘッダーとして読み飛ばす。

use super::{RawSplit, SourceSplits};
use crate::error::{Error, Result};
use ndarray::Array2;
use std::fs;
use std::path::Path;
use tracing::info;

pub fn read(dir: &Path) -> Result<SourceSplits> {
    let train = read_csv(&dir.join("train.csv"))?;
    let test = read_csv(&dir.join("test.csv"))?;
    if train.features.ncols() != test.features.ncols() {
        return Err(Error::Dataset(format!(
            "MobiFall train has {} features but test has {}",
            train.features.ncols(),
            test.features.ncols()
        )));
    }
    info!(
        "Loaded MobiFall: {} train / {} test windows with {} features",
        train.labels.len(),
        test.labels.len(),
        train.features.ncols()
    );
    Ok(SourceSplits {
        train,
        test,
        shape: None,
    })
}

fn read_csv(path: &Path) -> Result<RawSplit> {
    let text = fs::read_to_string(path)
        .map_err(|e| Error::Dataset(format!("cannot read {}: {}", path.display(), e)))?;
    parse_csv(&text).map_err(|e| Error::Dataset(format!("{}: {}", path.display(), e)))
}

fn parse_csv(text: &str) -> Result<RawSplit> {
    let mut labels = Vec::new();
    let mut values = Vec::new();
    let mut width: Option<usize> = None;

    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split(',').map(str::trim);
        let label_field = fields.next().unwrap_or_default();
        let label = match label_field.parse::<u32>() {
            Ok(label) => label,
            Err(_) if line_no == 0 => continue,
            Err(_) => {
                return Err(Error::Dataset(format!(
                    "line {}: invalid label '{}'",
                    line_no + 1,
                    label_field
                )))
            }
        };

        let row = fields
            .map(|f| {
                f.parse::<f64>().ok().filter(|v| v.is_finite()).ok_or_else(|| {
                    Error::Dataset(format!("line {}: invalid value '{}'", line_no + 1, f))
                })
            })
            .collect::<Result<Vec<f64>>>()?;

        match width {
            None => width = Some(row.len()),
            Some(w) if w != row.len() => {
                return Err(Error::Dataset(format!(
                    "line {}: expected {} features, found {}",
                    line_no + 1,
                    w,
                    row.len()
                )))
            }
            Some(_) => {}
        }
        labels.push(label);
        values.extend(row);
    }

    let d = width.unwrap_or(0);
    if labels.is_empty() || d == 0 {
        return Err(Error::Dataset("no samples".to_string()));
    }
    let features = Array2::from_shape_vec((labels.len(), d), values)
        .map_err(|e| Error::Dataset(e.to_string()))?;
    RawSplit::new(features, labels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_header() {
        let split = parse_csv("label,ax,ay\n0, 0.5, 1.5\n3,2.0,-1.0\n\n").unwrap();
        assert_eq!(split.labels, vec![0, 3]);
        assert_eq!(split.features.dim(), (2, 2));
        assert_eq!(split.features[[1, 1]], -1.0);
    }

    #[test]
    fn test_rejects_ragged_rows() {
        assert!(parse_csv("0,1.0,2.0\n1,3.0\n").is_err());
    }

    #[test]
    fn test_rejects_bad_value() {
        assert!(parse_csv("0,1.0,abc\n").is_err());
        assert!(parse_csv("0,1.0,NaN\n").is_err());
        assert!(parse_csv("header\n").is_err());
    }
}
