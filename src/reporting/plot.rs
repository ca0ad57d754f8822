//! Exemplar plot
//!
//! テスト分割の最も異常な n 例（左）と最も正常な n 例（右）をタイル状に並べ、
//! グレースケールは PGM (P5)、カラーは PPM (P6) で書き出す。
//! 画像でないデータ（MobiFall）は各サンプルを高さ固定の濃淡帯として描く。

use super::ExemplarPlotter;
use crate::dataset::{ImageShape, Partition};
use crate::error::{Error, Result};
use crate::model::SvmModel;
use ndarray::ArrayView1;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const PLOT_STEM: &str = "outliers_and_most_normal";
const GAP: usize = 4;
const PAD: usize = 1;
const STRIP_HEIGHT: usize = 4;
const BACKGROUND: u8 = 255;

/// Netpbm 形式で書き出すプロッター
#[derive(Debug, Default, Clone)]
pub struct NetpbmPlotter;

impl NetpbmPlotter {
    pub fn new() -> Self {
        Self
    }
}

/// 出力画像（チャネルはインターリーブ）
struct Canvas {
    width: usize,
    height: usize,
    channels: usize,
    pixels: Vec<u8>,
}

impl Canvas {
    fn new(width: usize, height: usize, channels: usize) -> Self {
        Self {
            width,
            height,
            channels,
            pixels: vec![BACKGROUND; width * height * channels],
        }
    }

    fn set(&mut self, x: usize, y: usize, c: usize, value: u8) {
        let idx = (y * self.width + x) * self.channels + c;
        self.pixels[idx] = value;
    }

    fn encode(&self) -> Vec<u8> {
        let magic = if self.channels == 3 { "P6" } else { "P5" };
        let mut out = format!("{}\n{} {}\n255\n", magic, self.width, self.height).into_bytes();
        out.extend_from_slice(&self.pixels);
        out
    }
}

/// タイル 1 枚分の描画形状
fn tile_shape(shape: Option<ImageShape>, n_features: usize) -> ImageShape {
    match shape {
        Some(shape) if shape.len() == n_features && matches!(shape.channels, 1 | 3) => shape,
        _ => ImageShape {
            height: STRIP_HEIGHT,
            width: n_features,
            channels: 1,
        },
    }
}

fn to_byte(v: f64, lo: f64, hi: f64) -> u8 {
    let range = hi - lo;
    let t = if range > f64::EPSILON { (v - lo) / range } else { 0.5 };
    (t.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Indices of the `n` highest and `n` lowest scores
pub fn extreme_indices(scores: &[f64], n: usize) -> (Vec<usize>, Vec<usize>) {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]).then(a.cmp(&b)));
    let n = n.min(order.len());
    let most_anomalous = order[..n].to_vec();
    let most_normal = order.iter().rev().take(n).copied().collect();
    (most_anomalous, most_normal)
}

fn draw_tile(
    canvas: &mut Canvas,
    sample: ArrayView1<'_, f64>,
    tile: &ImageShape,
    origin: (usize, usize),
    range: (f64, f64),
    is_image: bool,
) {
    let (ox, oy) = origin;
    for y in 0..tile.height {
        for x in 0..tile.width {
            for c in 0..tile.channels {
                let v = if is_image {
                    sample[c * tile.height * tile.width + y * tile.width + x]
                } else {
                    sample[x]
                };
                canvas.set(ox + x, oy + y, c, to_byte(v, range.0, range.1));
            }
        }
    }
}

impl ExemplarPlotter for NetpbmPlotter {
    fn plot(&self, model: &SvmModel, n_img: usize, stem: &Path) -> Result<PathBuf> {
        let scores = model
            .scores(Partition::Test)
            .ok_or_else(|| Error::Reporting("test partition has not been scored".to_string()))?;
        let data = model.dataset();
        let raw = &data.test.raw;
        if scores.is_empty() || n_img == 0 {
            return Err(Error::Reporting("nothing to plot".to_string()));
        }

        let tile = tile_shape(data.shape, raw.ncols());
        let is_image = data.shape.is_some_and(|s| s == tile);
        let (anomalous, normal) = extreme_indices(scores, n_img);

        // 画像は [0, 1] 固定、センサー値は選択サンプルの範囲で正規化
        let range = if is_image {
            (0.0, 1.0)
        } else {
            anomalous
                .iter()
                .chain(normal.iter())
                .flat_map(|&i| raw.row(i).to_vec())
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                    (lo.min(v), hi.max(v))
                })
        };

        let n = anomalous.len();
        let cols = if is_image {
            (n as f64).sqrt().ceil() as usize
        } else {
            1
        };
        let rows = n.div_ceil(cols);
        let cell_w = tile.width + PAD;
        let cell_h = tile.height + PAD;
        let block_w = cols * cell_w;
        let mut canvas = Canvas::new(2 * block_w + GAP, rows * cell_h, tile.channels);

        for (block, indices) in [&anomalous, &normal].into_iter().enumerate() {
            let x0 = block * (block_w + GAP);
            for (k, &i) in indices.iter().enumerate() {
                let origin = (x0 + (k % cols) * cell_w, (k / cols) * cell_h);
                draw_tile(&mut canvas, raw.row(i), &tile, origin, range, is_image);
            }
        }

        let ext = if tile.channels == 3 { "ppm" } else { "pgm" };
        let path = stem.with_extension(ext);
        fs::write(&path, canvas.encode())
            .map_err(|e| Error::reporting(&path.display().to_string(), e))?;
        info!(
            "Plotted {} most anomalous and {} most normal test examples to {}",
            n,
            normal.len(),
            path.display()
        );
        Ok(path)
    }
}
