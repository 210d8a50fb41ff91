//! Training-frame fill values for missing predictors.

use hglm_frame::{ColumnKind, Frame};

/// Value substituted for a missing cell of one column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FillValue {
    /// Mean of the non-missing numeric values.
    Mean(f64),
    /// Most frequent level code.
    Mode(u32),
    /// Column had no observed values.
    Unavailable,
}

/// Per-column fill values computed once from the training frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ImputationTable {
    fills: Vec<FillValue>,
}

impl ImputationTable {
    /// Compute means and modes for every column of `frame`.
    pub fn from_frame(frame: &Frame) -> Self {
        let fills = (0..frame.n_cols())
            .map(|col| match frame.meta(col).kind {
                ColumnKind::Numeric => frame
                    .column_mean(col)
                    .map_or(FillValue::Unavailable, FillValue::Mean),
                ColumnKind::Categorical => frame
                    .column_mode(col)
                    .map_or(FillValue::Unavailable, FillValue::Mode),
            })
            .collect();
        Self { fills }
    }

    pub fn fill(&self, col: usize) -> FillValue {
        self.fills.get(col).copied().unwrap_or(FillValue::Unavailable)
    }

    /// Numeric fill for `col`; 0 when the column was never observed.
    pub fn numeric(&self, col: usize) -> f64 {
        match self.fill(col) {
            FillValue::Mean(m) => m,
            _ => 0.0,
        }
    }

    /// Level fill for `col`.
    pub fn level(&self, col: usize) -> Option<u32> {
        match self.fill(col) {
            FillValue::Mode(level) => Some(level),
            _ => None,
        }
    }
}
