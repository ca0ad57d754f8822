//! Class Specification
//!
//! データセットのラベルを「正常 / 外れ値」の二値分割に写像する型付きパーサ。
//! 文字列を式として評価することはなく、次の文法のみを受け付ける:
//!
//! - `3` : 単一ラベル
//! - `range(stop)`, `range(start, stop)`, `range(start, stop, step)` : 終端を含まない範囲
//! - `[0, 2, 4]` または `0,2,4` : 明示的なラベル列
//! - `rest` : 外れ値側のみ。正常クラスの補集合

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// データセットのラベル空間（`0..n_classes`）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelUniverse {
    pub n_classes: u32,
}

impl LabelUniverse {
    pub fn new(n_classes: u32) -> Self {
        Self { n_classes }
    }

    pub fn contains(&self, label: u32) -> bool {
        label < self.n_classes
    }

    pub fn labels(&self) -> impl Iterator<Item = u32> {
        0..self.n_classes
    }
}

/// 順序付きラベル集合
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSet(BTreeSet<u32>);

impl LabelSet {
    pub fn contains(&self, label: u32) -> bool {
        self.0.contains(&label)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().copied()
    }

    pub fn is_disjoint(&self, other: &LabelSet) -> bool {
        self.0.is_disjoint(&other.0)
    }

    pub fn to_vec(&self) -> Vec<u32> {
        self.0.iter().copied().collect()
    }
}

impl FromIterator<u32> for LabelSet {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels: Vec<String> = self.0.iter().map(|l| l.to_string()).collect();
        write!(f, "{{{}}}", labels.join(", "))
    }
}

/// 構文解析済みのクラス式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassExpr {
    /// 単一ラベル
    Single(u32),
    /// Python の `range` と同じ意味の範囲
    Range { start: i64, stop: i64, step: i64 },
    /// 明示的なラベル列
    List(Vec<u32>),
    /// 正常クラスの補集合
    Rest,
}

fn range_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^range\(\s*(-?\d+)\s*(?:,\s*(-?\d+)\s*)?(?:,\s*(-?\d+)\s*)?\)$")
            .expect("range pattern is a valid regex")
    })
}

fn list_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?:\[\s*\d+\s*(?:,\s*\d+\s*)*,?\s*\]|\d+\s*(?:,\s*\d+\s*)*,?)$")
            .expect("list pattern is a valid regex")
    })
}

fn parse_label(raw: &str, source: &str) -> Result<u32> {
    raw.trim().parse::<u32>().map_err(|_| {
        Error::Configuration(format!(
            "invalid class label '{}' in class specification '{}'",
            raw.trim(),
            source
        ))
    })
}

fn parse_bound(raw: &str, source: &str) -> Result<i64> {
    raw.parse::<i64>().map_err(|_| {
        Error::Configuration(format!(
            "invalid range bound '{}' in class specification '{}'",
            raw, source
        ))
    })
}

impl FromStr for ClassExpr {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        let text = raw.trim();
        if text.is_empty() {
            return Err(Error::Configuration(
                "empty class specification".to_string(),
            ));
        }

        if text == "rest" {
            return Ok(ClassExpr::Rest);
        }

        if let Some(caps) = range_pattern().captures(text) {
            let bounds: Vec<i64> = caps
                .iter()
                .skip(1)
                .flatten()
                .map(|m| parse_bound(m.as_str(), text))
                .collect::<Result<_>>()?;
            let (start, stop, step) = match bounds.as_slice() {
                [stop] => (0, *stop, 1),
                [start, stop] => (*start, *stop, 1),
                [start, stop, step] => (*start, *stop, *step),
                _ => {
                    return Err(Error::Configuration(format!(
                        "malformed range in class specification '{}'",
                        text
                    )))
                }
            };
            if step == 0 {
                return Err(Error::Configuration(format!(
                    "range step must not be zero in class specification '{}'",
                    text
                )));
            }
            return Ok(ClassExpr::Range { start, stop, step });
        }

        if list_pattern().is_match(text) {
            let inner = text.trim_start_matches('[').trim_end_matches(']');
            let labels = inner
                .split(',')
                .filter(|part| !part.trim().is_empty())
                .map(|part| parse_label(part, text))
                .collect::<Result<Vec<u32>>>()?;
            if labels.len() == 1 && !text.contains(',') && !text.starts_with('[') {
                return Ok(ClassExpr::Single(labels[0]));
            }
            return Ok(ClassExpr::List(labels));
        }

        Err(Error::Configuration(format!(
            "unparseable class specification '{}'",
            text
        )))
    }
}

impl ClassExpr {
    /// ラベル空間に対して集合へ展開する（`Rest` は補集合の元となる集合が必要）
    fn expand(&self, universe: &LabelUniverse, complement_of: Option<&LabelSet>) -> Result<LabelSet> {
        let labels: Vec<i64> = match self {
            ClassExpr::Single(label) => vec![i64::from(*label)],
            ClassExpr::List(labels) => labels.iter().map(|l| i64::from(*l)).collect(),
            ClassExpr::Range { start, stop, step } => {
                let mut out = Vec::new();
                let mut current = *start;
                while (*step > 0 && current < *stop) || (*step < 0 && current > *stop) {
                    out.push(current);
                    // 重複のない範囲はラベル空間より長くなれない
                    if out.len() > universe.n_classes as usize {
                        break;
                    }
                    match current.checked_add(*step) {
                        Some(next) => current = next,
                        None => break,
                    }
                }
                out
            }
            ClassExpr::Rest => {
                let normal = complement_of.ok_or_else(|| {
                    Error::Configuration(
                        "'rest' is only valid for the outlier class specification".to_string(),
                    )
                })?;
                return Ok(universe.labels().filter(|l| !normal.contains(*l)).collect());
            }
        };

        labels
            .into_iter()
            .map(|label| {
                u32::try_from(label)
                    .ok()
                    .filter(|l| universe.contains(*l))
                    .ok_or_else(|| {
                        Error::Configuration(format!(
                            "class label {} is outside the label universe 0..{}",
                            label, universe.n_classes
                        ))
                    })
            })
            .collect()
    }
}

/// 正常クラス集合と外れ値クラス集合の組（常に互いに素）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassSpecification {
    normal: LabelSet,
    outlier: LabelSet,
}

impl ClassSpecification {
    /// 文字列表現から正常 / 外れ値集合を解決
    pub fn resolve(normal: &str, outlier: &str, universe: &LabelUniverse) -> Result<Self> {
        let normal_expr: ClassExpr = normal.parse()?;
        let outlier_expr: ClassExpr = outlier.parse()?;

        let normal_set = normal_expr.expand(universe, None)?;
        let outlier_set = outlier_expr.expand(universe, Some(&normal_set))?;

        Self::new(normal_set, outlier_set)
    }

    /// 展開済みの集合から作成（空集合・重複を拒否）
    pub fn new(normal: LabelSet, outlier: LabelSet) -> Result<Self> {
        if normal.is_empty() {
            return Err(Error::Configuration(
                "normal class specification resolves to an empty set".to_string(),
            ));
        }
        if outlier.is_empty() {
            return Err(Error::Configuration(
                "outlier class specification resolves to an empty set".to_string(),
            ));
        }
        if !normal.is_disjoint(&outlier) {
            return Err(Error::Configuration(format!(
                "normal classes {} and outlier classes {} overlap",
                normal, outlier
            )));
        }
        Ok(Self { normal, outlier })
    }

    pub fn normal(&self) -> &LabelSet {
        &self.normal
    }

    pub fn outlier(&self) -> &LabelSet {
        &self.outlier
    }

    /// 実験に参加するラベルかどうか
    pub fn selects(&self, label: u32) -> bool {
        self.normal.contains(label) || self.outlier.contains(label)
    }

    /// 二値 AD ラベル（0: 正常, 1: 外れ値）。対象外のラベルは `None`
    pub fn binary_label(&self, label: u32) -> Option<u8> {
        if self.normal.contains(label) {
            Some(0)
        } else if self.outlier.contains(label) {
            Some(1)
        } else {
            None
        }
    }
}
