//! hglm-frame: Tabular data abstraction for HGLM-RS
//!
//! Provides a read-only columnar frame with numeric and categorical
//! columns, split into row chunks for parallel passes, plus a delimited
//! text reader/writer and domain adaptation of scoring frames.

pub mod column;
pub mod delimited;
pub mod frame;

pub use column::{ColumnKind, ColumnMeta};
pub use delimited::{read_delimited, write_delimited, ReadOptions};
pub use frame::{Frame, FrameBuilder, FrameError, Partition, RowView};
