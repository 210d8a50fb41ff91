//! Column metadata and storage.

use serde::{Deserialize, Serialize};

/// Logical type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnKind {
    Numeric,
    Categorical,
}

impl ColumnKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnKind::Numeric => "numeric",
            ColumnKind::Categorical => "categorical",
        }
    }
}

/// Name, type and (for categoricals) the ordered level domain of a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    pub kind: ColumnKind,
    /// Level names; the level code of a cell indexes into this. Empty for
    /// numeric columns.
    pub domain: Vec<String>,
}

impl ColumnMeta {
    pub fn numeric(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ColumnKind::Numeric,
            domain: Vec::new(),
        }
    }

    pub fn categorical(name: impl Into<String>, domain: Vec<String>) -> Self {
        Self {
            name: name.into(),
            kind: ColumnKind::Categorical,
            domain,
        }
    }

    pub fn is_categorical(&self) -> bool {
        self.kind == ColumnKind::Categorical
    }

    /// Number of levels (0 for numeric columns).
    pub fn cardinality(&self) -> usize {
        self.domain.len()
    }
}

/// Physical storage for one column. Missing numerics are NaN, missing
/// levels are `None`.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Numeric(Vec<f64>),
    Categorical(Vec<Option<u32>>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Numeric(v) => v.len(),
            ColumnData::Categorical(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> ColumnKind {
        match self {
            ColumnData::Numeric(_) => ColumnKind::Numeric,
            ColumnData::Categorical(_) => ColumnKind::Categorical,
        }
    }
}

/// Sort a set of level names: numerically when every level parses as a
/// number, lexicographically otherwise.
pub fn sort_domain(levels: &mut Vec<String>) {
    levels.sort();
    levels.dedup();
    let numeric: Option<Vec<f64>> = levels.iter().map(|l| l.parse::<f64>().ok()).collect();
    if let Some(values) = numeric {
        let mut paired: Vec<(f64, String)> = values.into_iter().zip(levels.drain(..)).collect();
        paired.sort_by(|a, b| a.0.total_cmp(&b.0));
        levels.extend(paired.into_iter().map(|(_, l)| l));
    }
}
