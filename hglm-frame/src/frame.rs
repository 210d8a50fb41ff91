//! In-memory columnar frame split into fixed-size row chunks.
//!
//! The frame is read-only once built. Parallel passes work on
//! [`Partition`]s (contiguous row ranges) and read individual cells through
//! [`RowView`].

use std::collections::HashMap;

use thiserror::Error;
use tracing::{debug, warn};

use crate::column::{sort_domain, ColumnData, ColumnKind, ColumnMeta};

/// Rows per partition unless configured otherwise.
pub const DEFAULT_CHUNK_ROWS: usize = 4096;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FrameError {
    #[error("Column '{0}' appears more than once")]
    DuplicateColumn(String),

    #[error("Column '{name}' has {got} rows, expected {expected}")]
    LengthMismatch {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("Column '{0}' not found")]
    UnknownColumn(String),

    #[error("Column '{name}' is {found} here but {expected} in the reference frame")]
    KindMismatch {
        name: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Level code {code} out of range for column '{name}' with {levels} levels")]
    LevelOutOfRange { name: String, code: u32, levels: usize },

    #[error("Chunk size must be at least one row")]
    ZeroChunkRows,
}

/// A read-only table of numeric and categorical columns.
#[derive(Debug, Clone)]
pub struct Frame {
    columns: Vec<ColumnMeta>,
    data: Vec<ColumnData>,
    n_rows: usize,
    chunk_rows: usize,
}

impl Frame {
    /// Build a frame from metadata and storage, checking lengths, kinds and
    /// level codes.
    pub fn new(columns: Vec<ColumnMeta>, data: Vec<ColumnData>) -> Result<Self, FrameError> {
        assert_eq!(columns.len(), data.len(), "metadata and storage differ in length");
        let n_rows = data.first().map_or(0, ColumnData::len);
        let mut seen = HashMap::new();
        for (meta, col) in columns.iter().zip(data.iter()) {
            if seen.insert(meta.name.as_str(), ()).is_some() {
                return Err(FrameError::DuplicateColumn(meta.name.clone()));
            }
            if col.len() != n_rows {
                return Err(FrameError::LengthMismatch {
                    name: meta.name.clone(),
                    expected: n_rows,
                    got: col.len(),
                });
            }
            if col.kind() != meta.kind {
                return Err(FrameError::KindMismatch {
                    name: meta.name.clone(),
                    expected: meta.kind.as_str(),
                    found: col.kind().as_str(),
                });
            }
            if let ColumnData::Categorical(codes) = col {
                if let Some(code) = codes.iter().flatten().find(|&&c| c as usize >= meta.cardinality()) {
                    return Err(FrameError::LevelOutOfRange {
                        name: meta.name.clone(),
                        code: *code,
                        levels: meta.cardinality(),
                    });
                }
            }
        }
        Ok(Self {
            columns,
            data,
            n_rows,
            chunk_rows: DEFAULT_CHUNK_ROWS,
        })
    }

    /// Same data, different partitioning.
    pub fn with_chunk_rows(mut self, chunk_rows: usize) -> Result<Self, FrameError> {
        if chunk_rows == 0 {
            return Err(FrameError::ZeroChunkRows);
        }
        self.chunk_rows = chunk_rows;
        Ok(self)
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn chunk_rows(&self) -> usize {
        self.chunk_rows
    }

    pub fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Index of the named column.
    pub fn find(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Index of the named column, or `UnknownColumn`.
    pub fn require(&self, name: &str) -> Result<usize, FrameError> {
        self.find(name)
            .ok_or_else(|| FrameError::UnknownColumn(name.to_string()))
    }

    pub fn meta(&self, col: usize) -> &ColumnMeta {
        &self.columns[col]
    }

    /// Numeric value of a cell; NaN when missing. Categorical cells yield
    /// their level code.
    pub fn numeric(&self, col: usize, row: usize) -> f64 {
        match &self.data[col] {
            ColumnData::Numeric(v) => v[row],
            ColumnData::Categorical(v) => v[row].map_or(f64::NAN, |c| c as f64),
        }
    }

    /// Level code of a categorical cell; `None` when missing or numeric.
    pub fn level(&self, col: usize, row: usize) -> Option<u32> {
        match &self.data[col] {
            ColumnData::Categorical(v) => v[row],
            ColumnData::Numeric(_) => None,
        }
    }

    pub fn is_missing(&self, col: usize, row: usize) -> bool {
        match &self.data[col] {
            ColumnData::Numeric(v) => v[row].is_nan(),
            ColumnData::Categorical(v) => v[row].is_none(),
        }
    }

    /// Raw values of a numeric column.
    pub fn numeric_values(&self, col: usize) -> Option<&[f64]> {
        match &self.data[col] {
            ColumnData::Numeric(v) => Some(v),
            ColumnData::Categorical(_) => None,
        }
    }

    /// Raw level codes of a categorical column.
    pub fn level_codes(&self, col: usize) -> Option<&[Option<u32>]> {
        match &self.data[col] {
            ColumnData::Categorical(v) => Some(v),
            ColumnData::Numeric(_) => None,
        }
    }

    /// Mean of the non-missing values of a numeric column.
    pub fn column_mean(&self, col: usize) -> Option<f64> {
        let values = self.numeric_values(col)?;
        let (sum, n) = values
            .iter()
            .filter(|v| !v.is_nan())
            .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
        if n > 0 {
            Some(sum / n as f64)
        } else {
            None
        }
    }

    /// Most frequent level of a categorical column (lowest code on ties).
    pub fn column_mode(&self, col: usize) -> Option<u32> {
        let codes = self.level_codes(col)?;
        let mut counts = vec![0usize; self.columns[col].cardinality()];
        for c in codes.iter().flatten() {
            counts[*c as usize] += 1;
        }
        let (best, count) = counts
            .iter()
            .enumerate()
            .fold((0usize, 0usize), |acc, (i, &c)| if c > acc.1 { (i, c) } else { acc });
        if count > 0 {
            Some(best as u32)
        } else {
            None
        }
    }

    /// Zero-row frame with the same columns and domains.
    pub fn schema(&self) -> Frame {
        let data = self
            .columns
            .iter()
            .map(|meta| match meta.kind {
                ColumnKind::Numeric => ColumnData::Numeric(Vec::new()),
                ColumnKind::Categorical => ColumnData::Categorical(Vec::new()),
            })
            .collect();
        Frame {
            columns: self.columns.clone(),
            data,
            n_rows: 0,
            chunk_rows: self.chunk_rows,
        }
    }

    pub fn row(&self, row: usize) -> RowView<'_> {
        debug_assert!(row < self.n_rows);
        RowView { frame: self, row }
    }

    pub fn n_partitions(&self) -> usize {
        self.n_rows.div_ceil(self.chunk_rows)
    }

    /// Contiguous row chunks covering the frame, in row order.
    pub fn partitions(&self) -> Vec<Partition<'_>> {
        (0..self.n_partitions())
            .map(|index| {
                let start = index * self.chunk_rows;
                Partition {
                    frame: self,
                    index,
                    start,
                    end: (start + self.chunk_rows).min(self.n_rows),
                }
            })
            .collect()
    }

    /// Add a numeric column, or replace the column of the same name.
    pub fn with_numeric_column(mut self, name: &str, values: Vec<f64>) -> Result<Self, FrameError> {
        if values.len() != self.n_rows {
            return Err(FrameError::LengthMismatch {
                name: name.to_string(),
                expected: self.n_rows,
                got: values.len(),
            });
        }
        match self.find(name) {
            Some(idx) => {
                self.columns[idx] = ColumnMeta::numeric(name);
                self.data[idx] = ColumnData::Numeric(values);
            }
            None => {
                self.columns.push(ColumnMeta::numeric(name));
                self.data.push(ColumnData::Numeric(values));
            }
        }
        Ok(self)
    }

    /// Re-express this frame in the column order and categorical domains of
    /// `reference`, so column indices resolved against the reference apply
    /// unchanged.
    ///
    /// Reference columns absent here are added as all-missing columns of the
    /// reference kind. Levels unknown to the reference become missing.
    /// Columns absent from the reference are appended after the reference
    /// columns, unchanged.
    pub fn adapt_to(&self, reference: &Frame) -> Result<Frame, FrameError> {
        let mut columns = Vec::with_capacity(self.n_cols().max(reference.n_cols()));
        let mut data = Vec::with_capacity(columns.capacity());
        for ref_meta in reference.columns() {
            let Some(idx) = self.find(&ref_meta.name) else {
                warn!("Column '{}' missing from frame; treating it as all missing", ref_meta.name);
                columns.push(ref_meta.clone());
                data.push(match ref_meta.kind {
                    ColumnKind::Numeric => ColumnData::Numeric(vec![f64::NAN; self.n_rows]),
                    ColumnKind::Categorical => ColumnData::Categorical(vec![None; self.n_rows]),
                });
                continue;
            };
            let meta = &self.columns[idx];
            if meta.kind != ref_meta.kind {
                return Err(FrameError::KindMismatch {
                    name: meta.name.clone(),
                    expected: ref_meta.kind.as_str(),
                    found: meta.kind.as_str(),
                });
            }
            match &self.data[idx] {
                ColumnData::Categorical(codes) if meta.domain != ref_meta.domain => {
                    let lookup: HashMap<&str, u32> = ref_meta
                        .domain
                        .iter()
                        .enumerate()
                        .map(|(i, l)| (l.as_str(), i as u32))
                        .collect();
                    let remap: Vec<Option<u32>> = meta
                        .domain
                        .iter()
                        .map(|l| lookup.get(l.as_str()).copied())
                        .collect();
                    let unknown = remap.iter().filter(|r| r.is_none()).count();
                    if unknown > 0 {
                        debug!("Column '{}': {} level(s) unseen in reference", meta.name, unknown);
                    }
                    data.push(ColumnData::Categorical(
                        codes.iter().map(|c| c.and_then(|c| remap[c as usize])).collect(),
                    ));
                }
                other => data.push(other.clone()),
            }
            columns.push(ref_meta.clone());
        }
        for (meta, col) in self.columns.iter().zip(self.data.iter()) {
            if reference.find(&meta.name).is_none() {
                columns.push(meta.clone());
                data.push(col.clone());
            }
        }
        let mut adapted = Frame::new(columns, data)?;
        adapted.n_rows = self.n_rows;
        adapted.chunk_rows = self.chunk_rows;
        Ok(adapted)
    }
}

/// One contiguous chunk of rows.
#[derive(Debug, Clone, Copy)]
pub struct Partition<'a> {
    frame: &'a Frame,
    index: usize,
    start: usize,
    end: usize,
}

impl<'a> Partition<'a> {
    /// Position of this chunk among the frame's partitions.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn frame(&self) -> &'a Frame {
        self.frame
    }

    pub fn rows(&self) -> impl Iterator<Item = RowView<'a>> + 'a {
        let frame = self.frame;
        (self.start..self.end).map(move |row| RowView { frame, row })
    }
}

/// Borrowed view of a single row.
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
    frame: &'a Frame,
    row: usize,
}

impl<'a> RowView<'a> {
    /// Row number within the frame.
    pub fn index(&self) -> usize {
        self.row
    }

    pub fn numeric(&self, col: usize) -> f64 {
        self.frame.numeric(col, self.row)
    }

    pub fn level(&self, col: usize) -> Option<u32> {
        self.frame.level(col, self.row)
    }

    pub fn is_missing(&self, col: usize) -> bool {
        self.frame.is_missing(col, self.row)
    }
}

/// Incremental construction of a [`Frame`] from typed columns.
#[derive(Debug, Default)]
pub struct FrameBuilder {
    columns: Vec<ColumnMeta>,
    data: Vec<ColumnData>,
    chunk_rows: Option<usize>,
}

impl FrameBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn numeric(mut self, name: &str, values: Vec<f64>) -> Self {
        self.columns.push(ColumnMeta::numeric(name));
        self.data.push(ColumnData::Numeric(values));
        self
    }

    /// Categorical column from raw labels; the domain is the sorted set of
    /// distinct labels and empty / `NA` labels are missing.
    pub fn categorical<S: AsRef<str>>(mut self, name: &str, labels: &[S]) -> Self {
        let mut domain: Vec<String> = labels
            .iter()
            .map(|l| l.as_ref())
            .filter(|l| !is_missing_token(l))
            .map(str::to_string)
            .collect();
        sort_domain(&mut domain);
        let lookup: HashMap<&str, u32> = domain
            .iter()
            .enumerate()
            .map(|(i, l)| (l.as_str(), i as u32))
            .collect();
        let codes = labels
            .iter()
            .map(|l| lookup.get(l.as_ref()).copied())
            .collect();
        self.columns.push(ColumnMeta::categorical(name, domain));
        self.data.push(ColumnData::Categorical(codes));
        self
    }

    /// Categorical column from an explicit domain and level codes.
    pub fn categorical_codes(mut self, name: &str, domain: Vec<String>, codes: Vec<Option<u32>>) -> Self {
        self.columns.push(ColumnMeta::categorical(name, domain));
        self.data.push(ColumnData::Categorical(codes));
        self
    }

    pub fn chunk_rows(mut self, rows: usize) -> Self {
        self.chunk_rows = Some(rows);
        self
    }

    pub fn build(self) -> Result<Frame, FrameError> {
        let frame = Frame::new(self.columns, self.data)?;
        match self.chunk_rows {
            Some(rows) => frame.with_chunk_rows(rows),
            None => Ok(frame),
        }
    }
}

/// Tokens treated as a missing cell.
pub fn is_missing_token(s: &str) -> bool {
    matches!(s.trim(), "NA" | "na" | "Na" | "." | "" | "-" | "NaN" | "nan")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_frame() -> Frame {
        FrameBuilder::new()
            .categorical("g", &["b", "a", "b", "NA", "c"])
            .numeric("x", vec![1.0, 2.0, f64::NAN, 4.0, 5.0])
            .chunk_rows(2)
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_domains_and_codes() {
        let f = small_frame();
        assert_eq!(f.n_rows(), 5);
        assert_eq!(f.meta(0).domain, vec!["a", "b", "c"]);
        assert_eq!(f.level(0, 0), Some(1));
        assert_eq!(f.level(0, 1), Some(0));
        assert!(f.is_missing(0, 3));
        assert!(f.is_missing(1, 2));
        assert_eq!(f.find("x"), Some(1));
        assert_eq!(f.find("nope"), None);
        assert_eq!(f.require("nope"), Err(FrameError::UnknownColumn("nope".into())));
    }

    #[test]
    fn test_partitions_cover_rows_in_order() {
        let f = small_frame();
        let parts = f.partitions();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[2].len(), 1);
        let rows: Vec<usize> = parts.iter().flat_map(|p| p.rows().map(|r| r.index())).collect();
        assert_eq!(rows, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_mean_and_mode() {
        let f = small_frame();
        assert!((f.column_mean(1).unwrap() - 3.0).abs() < 1e-12);
        assert_eq!(f.column_mode(0), Some(1));
        assert_eq!(f.column_mean(0), None);
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let err = FrameBuilder::new()
            .numeric("a", vec![1.0, 2.0])
            .numeric("b", vec![1.0])
            .build()
            .unwrap_err();
        assert!(matches!(err, FrameError::LengthMismatch { .. }));
    }

    #[test]
    fn test_duplicate_column_rejected() {
        let err = FrameBuilder::new()
            .numeric("a", vec![1.0])
            .numeric("a", vec![2.0])
            .build()
            .unwrap_err();
        assert_eq!(err, FrameError::DuplicateColumn("a".into()));
    }

    #[test]
    fn test_adapt_to_reference_domain() {
        let train = small_frame();
        let test = FrameBuilder::new()
            .categorical("g", &["c", "d", "a"])
            .numeric("x", vec![1.0, 1.0, 1.0])
            .build()
            .unwrap();
        let adapted = test.adapt_to(&train).unwrap();
        assert_eq!(adapted.meta(0).domain, train.meta(0).domain);
        assert_eq!(adapted.level(0, 0), Some(2));
        assert_eq!(adapted.level(0, 1), None);
        assert_eq!(adapted.level(0, 2), Some(0));
    }

    #[test]
    fn test_adapt_follows_reference_order_and_fills_missing() {
        let train = small_frame();
        let test = FrameBuilder::new()
            .numeric("extra", vec![7.0])
            .numeric("x", vec![1.5])
            .build()
            .unwrap();
        let adapted = test.adapt_to(&train).unwrap();
        assert_eq!(adapted.column_names(), vec!["g", "x", "extra"]);
        assert_eq!(adapted.n_rows(), 1);
        assert!(adapted.is_missing(0, 0));
        assert_eq!(adapted.numeric(1, 0), 1.5);
        assert_eq!(adapted.numeric(2, 0), 7.0);
    }

    #[test]
    fn test_schema_keeps_columns() {
        let schema = small_frame().schema();
        assert_eq!(schema.n_rows(), 0);
        assert_eq!(schema.n_partitions(), 0);
        assert_eq!(schema.column_names(), vec!["g", "x"]);
        assert_eq!(schema.meta(0).domain, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_adapt_rejects_kind_change() {
        let train = small_frame();
        let test = FrameBuilder::new()
            .numeric("g", vec![1.0])
            .numeric("x", vec![1.0])
            .build()
            .unwrap();
        assert!(matches!(
            test.adapt_to(&train).unwrap_err(),
            FrameError::KindMismatch { .. }
        ));
    }

    #[test]
    fn test_with_numeric_column_replaces() {
        let f = small_frame().with_numeric_column("x", vec![0.0; 5]).unwrap();
        assert_eq!(f.n_cols(), 2);
        assert_eq!(f.numeric(1, 2), 0.0);
        let f = f.with_numeric_column("y", vec![1.0; 5]).unwrap();
        assert_eq!(f.n_cols(), 3);
    }
}
