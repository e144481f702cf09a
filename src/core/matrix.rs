//! # Matrix Expansion Module / 矩阵展开模块
//!
//! Turns a compact matrix definition (axes plus include/exclude entries) into
//! the ordered list of concrete attribute combinations, one per job.
//!
//! 将紧凑的矩阵定义（轴以及 include/exclude 条目）展开为有序的具体属性组合列表，
//! 每个组合对应一个作业。
//!
//! ## Ordering / 顺序
//!
//! Cross-product combinations come first, in axis-declaration order with the
//! rightmost axis varying fastest. Standalone combinations created by include
//! entries follow in declaration order.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::debug;

use crate::core::error::{EntryKind, SpecificationError};

/// A single scalar value an axis (or an extra attribute) can take.
/// 轴（或额外属性）可以取的单个标量值。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MatrixValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl fmt::Display for MatrixValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatrixValue::Bool(b) => write!(f, "{b}"),
            MatrixValue::Integer(i) => write!(f, "{i}"),
            MatrixValue::Float(x) => write!(f, "{x}"),
            MatrixValue::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for MatrixValue {
    fn from(value: &str) -> Self {
        MatrixValue::String(value.to_string())
    }
}

impl From<String> for MatrixValue {
    fn from(value: String) -> Self {
        MatrixValue::String(value)
    }
}

impl From<i64> for MatrixValue {
    fn from(value: i64) -> Self {
        MatrixValue::Integer(value)
    }
}

impl From<bool> for MatrixValue {
    fn from(value: bool) -> Self {
        MatrixValue::Bool(value)
    }
}

/// An ordered attribute assignment: axis names and extra keys to values.
pub type Attributes = IndexMap<String, MatrixValue>;

/// A named dimension of the matrix with its ordered values.
/// 矩阵中的一个命名维度及其有序值。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    pub name: String,
    pub values: Vec<MatrixValue>,
}

impl Axis {
    pub fn new<I, V>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<MatrixValue>,
    {
        Self {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

/// The compact matrix definition handed to [`expand`].
/// 传递给 [`expand`] 的紧凑矩阵定义。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatrixSpec {
    /// Axes in declaration order. / 按声明顺序排列的轴。
    pub axes: Vec<Axis>,
    /// Inclusion entries: augment matching combinations or add standalone ones.
    /// 包含条目：增强匹配的组合或添加独立组合。
    pub include: Vec<Attributes>,
    /// Exclusion entries: partial assignments removed from the cross product.
    /// 排除条目：从笛卡尔积中移除的部分赋值。
    pub exclude: Vec<Attributes>,
}

/// Where an expanded combination came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    CrossProduct,
    Included { entry: usize },
}

/// One fully resolved point of the matrix.
/// 矩阵中一个完全解析的点。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Combination {
    pub attributes: Attributes,
    pub origin: Origin,
}

impl Combination {
    /// Comma-joined attribute values, used to build job display names.
    /// 以逗号连接的属性值，用于构建作业显示名称。
    pub fn label(&self) -> String {
        self.attributes
            .values()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// True if every key/value in `partial` is present with the same value.
    pub fn matches(&self, partial: &Attributes) -> bool {
        superset_match(&self.attributes, partial)
    }
}

/// Number of combinations the bare cross product of `axes` produces.
/// An empty axis set produces none.
pub fn cross_product_size(axes: &[Axis]) -> usize {
    if axes.is_empty() {
        return 0;
    }
    axes.iter().map(|axis| axis.values.len()).product()
}

/// Expands a matrix definition into its ordered list of combinations.
///
/// Exclusions filter the cross product first. Each include entry is then
/// checked against the remaining cross-product combinations: when every axis
/// value it names agrees with at least one of them, its extra attributes are
/// merged into all matches (later entries overwrite earlier ones); otherwise
/// the entry becomes a standalone combination containing exactly its own
/// attributes.
///
/// 将矩阵定义展开为有序的组合列表。
/// 排除条目首先过滤笛卡尔积。然后将每个 include 条目与剩余的笛卡尔积组合进行比较：
/// 当它指定的每个轴值都与至少一个组合一致时，其额外属性会合并到所有匹配项中
/// （后面的条目覆盖前面的条目）；否则该条目成为仅包含其自身属性的独立组合。
///
/// # Errors
/// Returns a [`SpecificationError`] for duplicate or empty axes, empty
/// entries, and exclusion keys that name no axis.
pub fn expand(spec: &MatrixSpec) -> Result<Vec<Combination>, SpecificationError> {
    validate(spec)?;

    let axis_names: HashSet<&str> = spec.axes.iter().map(|a| a.name.as_str()).collect();

    let mut jobs: Vec<Combination> = cartesian_product(&spec.axes)
        .into_iter()
        .filter(|attributes| {
            !spec
                .exclude
                .iter()
                .any(|exclusion| superset_match(attributes, exclusion))
        })
        .map(|attributes| Combination {
            attributes,
            origin: Origin::CrossProduct,
        })
        .collect();
    let cross_product_len = jobs.len();

    let mut standalone = Vec::new();
    for (index, entry) in spec.include.iter().enumerate() {
        let (axis_part, extras): (Vec<_>, Vec<_>) = entry
            .iter()
            .partition(|(key, _)| axis_names.contains(key.as_str()));

        let mut matched = false;
        for job in jobs.iter_mut() {
            let agrees = axis_part
                .iter()
                .all(|(key, value)| job.attributes.get(*key) == Some(*value));
            if agrees {
                matched = true;
                for (key, value) in &extras {
                    job.attributes.insert((*key).clone(), (*value).clone());
                }
            }
        }

        if !matched {
            standalone.push(Combination {
                attributes: entry.clone(),
                origin: Origin::Included { entry: index },
            });
        }
    }

    debug!(
        cross_product = cross_product_len,
        standalone = standalone.len(),
        "expanded matrix"
    );

    jobs.extend(standalone);
    Ok(jobs)
}

fn validate(spec: &MatrixSpec) -> Result<(), SpecificationError> {
    let mut seen = HashSet::new();
    for axis in &spec.axes {
        if !seen.insert(axis.name.as_str()) {
            return Err(SpecificationError::DuplicateAxis {
                axis: axis.name.clone(),
            });
        }
        if axis.values.is_empty() {
            return Err(SpecificationError::EmptyAxis {
                axis: axis.name.clone(),
            });
        }
    }

    if let Some(index) = spec.include.iter().position(IndexMap::is_empty) {
        return Err(SpecificationError::EmptyEntry {
            kind: EntryKind::Include,
            index,
        });
    }

    for (index, exclusion) in spec.exclude.iter().enumerate() {
        if exclusion.is_empty() {
            return Err(SpecificationError::EmptyEntry {
                kind: EntryKind::Exclude,
                index,
            });
        }
        if let Some(key) = exclusion.keys().find(|k| !seen.contains(k.as_str())) {
            return Err(SpecificationError::UnknownExclusionKey {
                index,
                key: key.clone(),
            });
        }
    }
    Ok(())
}

/// Rightmost axis varies fastest.
fn cartesian_product(axes: &[Axis]) -> Vec<Attributes> {
    if axes.is_empty() {
        return Vec::new();
    }

    let mut partials = vec![Attributes::new()];
    for axis in axes {
        let mut next = Vec::with_capacity(partials.len() * axis.values.len());
        for partial in &partials {
            for value in &axis.values {
                let mut extended = partial.clone();
                extended.insert(axis.name.clone(), value.clone());
                next.push(extended);
            }
        }
        partials = next;
    }
    partials
}

fn superset_match(attributes: &Attributes, partial: &Attributes) -> bool {
    partial
        .iter()
        .all(|(key, value)| attributes.get(key) == Some(value))
}
