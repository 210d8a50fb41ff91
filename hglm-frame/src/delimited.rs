//! Delimited text reader and writer.
//!
//! Reads tab-, comma- or whitespace-delimited files with a header line.
//! A column is numeric when every non-missing cell parses as a number and
//! it is not listed in `categorical_columns`; otherwise it is categorical
//! with a sorted level domain.

use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::debug;

use crate::frame::{is_missing_token, Frame, FrameBuilder, DEFAULT_CHUNK_ROWS};

/// Options for [`read_delimited`].
#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// Field delimiter; auto-detected from the header when `None`.
    pub delimiter: Option<char>,
    /// Columns forced to be categorical even if their cells look numeric.
    pub categorical_columns: Vec<String>,
    /// Rows per partition of the resulting frame.
    pub chunk_rows: usize,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            delimiter: None,
            categorical_columns: Vec::new(),
            chunk_rows: DEFAULT_CHUNK_ROWS,
        }
    }
}

fn detect_delimiter(header: &str) -> Option<char> {
    if header.contains('\t') {
        Some('\t')
    } else if header.contains(',') {
        Some(',')
    } else {
        None
    }
}

fn split_fields(line: &str, delim: Option<char>) -> Vec<&str> {
    match delim {
        Some(d) => line.split(d).map(|s| s.trim()).collect(),
        None => line.split_whitespace().collect(),
    }
}

/// Parse a string value to f64, treating NA/missing as NaN.
pub fn parse_value(s: &str) -> f64 {
    if is_missing_token(s) {
        f64::NAN
    } else {
        s.trim().parse().unwrap_or(f64::NAN)
    }
}

/// Read a delimited file into a [`Frame`].
pub fn read_delimited(path: &Path, options: &ReadOptions) -> Result<Frame> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read data file: {}", path.display()))?;

    let mut lines = contents.lines();
    let header_line = lines
        .next()
        .ok_or_else(|| anyhow::anyhow!("Empty data file: {}", path.display()))?;

    let delim = options.delimiter.or_else(|| detect_delimiter(header_line));
    let headers: Vec<String> = split_fields(header_line, delim)
        .into_iter()
        .map(|h| h.trim_matches('"').to_string())
        .collect();

    for forced in &options.categorical_columns {
        if !headers.contains(forced) {
            bail!("Categorical column '{}' not found in header", forced);
        }
    }

    let mut cells: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
    for (line_num, line) in lines.enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let fields = split_fields(line, delim);
        if fields.len() != headers.len() {
            bail!(
                "Line {} has {} fields (expected {})",
                line_num + 2,
                fields.len(),
                headers.len()
            );
        }
        for (col, field) in fields.into_iter().enumerate() {
            cells[col].push(field.trim_matches('"').to_string());
        }
    }

    let mut builder = FrameBuilder::new().chunk_rows(options.chunk_rows);
    for (name, column) in headers.iter().zip(cells.iter()) {
        let forced = options.categorical_columns.iter().any(|c| c == name);
        let all_numeric = column
            .iter()
            .all(|s| is_missing_token(s) || s.trim().parse::<f64>().is_ok());
        if !forced && all_numeric {
            builder = builder.numeric(name, column.iter().map(|s| parse_value(s)).collect());
        } else {
            builder = builder.categorical(name, column.as_slice());
        }
    }
    let frame = builder.build()?;
    debug!(
        "Read {} rows x {} columns from {}",
        frame.n_rows(),
        frame.n_cols(),
        path.display()
    );
    Ok(frame)
}

/// Write a frame as a tab-delimited file; missing cells are written as `NA`.
pub fn write_delimited(frame: &Frame, path: &Path) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let mut out = std::io::BufWriter::new(file);
    writeln!(out, "{}", frame.column_names().join("\t"))?;
    for row in 0..frame.n_rows() {
        let fields: Vec<String> = (0..frame.n_cols())
            .map(|col| {
                let meta = frame.meta(col);
                if frame.is_missing(col, row) {
                    "NA".to_string()
                } else if meta.is_categorical() {
                    frame
                        .level(col, row)
                        .map(|c| meta.domain[c as usize].clone())
                        .unwrap_or_else(|| "NA".to_string())
                } else {
                    format!("{}", frame.numeric(col, row))
                }
            })
            .collect();
        writeln!(out, "{}", fields.join("\t"))?;
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::ColumnKind;

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("1.5"), 1.5);
        assert_eq!(parse_value("0"), 0.0);
        assert!(parse_value("NA").is_nan());
        assert!(parse_value(".").is_nan());
        assert!(parse_value("").is_nan());
    }

    #[test]
    fn test_read_infers_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.tsv");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "site\tdose\tclinic\ty").unwrap();
        writeln!(f, "A\t1.5\t1\t3.2").unwrap();
        writeln!(f, "B\tNA\t2\t4.0").unwrap();
        writeln!(f, "A\t2.5\t1\tNA").unwrap();

        let options = ReadOptions {
            categorical_columns: vec!["clinic".into()],
            chunk_rows: 2,
            ..Default::default()
        };
        let frame = read_delimited(&path, &options).unwrap();
        assert_eq!(frame.n_rows(), 3);
        assert_eq!(frame.n_partitions(), 2);
        assert_eq!(frame.meta(0).kind, ColumnKind::Categorical);
        assert_eq!(frame.meta(0).domain, vec!["A", "B"]);
        assert_eq!(frame.meta(1).kind, ColumnKind::Numeric);
        assert!(frame.is_missing(1, 1));
        assert_eq!(frame.meta(2).kind, ColumnKind::Categorical);
        assert!(frame.is_missing(3, 2));
    }

    #[test]
    fn test_read_rejects_ragged_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "a,b\n1,2\n3\n").unwrap();
        assert!(read_delimited(&path, &ReadOptions::default()).is_err());
    }

    #[test]
    fn test_write_then_read_preserves_cells() {
        let frame = FrameBuilder::new()
            .categorical("g", &["x", "y", "NA"])
            .numeric("v", vec![0.25, f64::NAN, -3.0])
            .build()
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.tsv");
        write_delimited(&frame, &path).unwrap();
        let back = read_delimited(&path, &ReadOptions::default()).unwrap();
        assert_eq!(back.meta(0).domain, vec!["x", "y"]);
        assert!(back.is_missing(0, 2));
        assert_eq!(back.numeric(1, 0), 0.25);
        assert!(back.is_missing(1, 1));
        assert_eq!(back.numeric(1, 2), -3.0);
    }
}
