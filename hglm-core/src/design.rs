//! Row-to-design-vector mapping.
//!
//! The fixed design vector `x` holds the categorical predictors (one-hot,
//! reference level dropped unless `use_all_factor_levels`), then the numeric
//! predictors, each block in frame order, and ends with the intercept. The
//! grouping column is a predictor but is represented by the group index,
//! not by `x`. The random design vector `z` holds the random columns in
//! frame order, encoded the same way, and ends with the random intercept
//! when enabled.

use hglm_frame::{Frame, RowView};

use crate::config::{HglmConfig, MissingValuesHandling};
use crate::error::Result;
use crate::util::imputation::ImputationTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Numeric,
    Categorical { width: usize },
}

#[derive(Debug, Clone)]
struct DesignColumn {
    col: usize,
    start: usize,
    encoding: Encoding,
}

/// Column layout resolved once from the training frame.
///
/// Frames scored later must be adapted to the training frame first
/// ([`Frame::adapt_to`]) so column positions and level codes agree.
#[derive(Debug, Clone)]
pub struct DesignLayout {
    fixed: Vec<DesignColumn>,
    random: Vec<DesignColumn>,
    p: usize,
    q: usize,
    response: usize,
    group: usize,
    n_groups: usize,
    weights: Option<usize>,
    offset: Option<usize>,
    /// Frame columns whose missingness invalidates a row under `Skip`.
    predictors: Vec<usize>,
    use_all_factor_levels: bool,
    random_intercept: bool,
    missing: MissingValuesHandling,
    imputation: ImputationTable,
    fixed_names: Vec<String>,
    random_names: Vec<String>,
    group_names: Vec<String>,
}

impl DesignLayout {
    /// Resolve the layout of a validated configuration on the training frame.
    pub fn new(frame: &Frame, config: &HglmConfig) -> Result<Self> {
        let response = frame.require(&config.response_column)?;
        let group = frame.require(&config.group_column)?;
        let weights = config
            .weights_column
            .as_deref()
            .map(|name| frame.require(name))
            .transpose()?;
        let offset = config
            .offset_column
            .as_deref()
            .map(|name| frame.require(name))
            .transpose()?;

        let predictor_cols: Vec<usize> = (0..frame.n_cols())
            .filter(|&c| !config.is_special_column(&frame.meta(c).name))
            .collect();
        let mut fixed_cols: Vec<usize> = predictor_cols
            .iter()
            .copied()
            .filter(|&c| c != group && frame.meta(c).is_categorical())
            .collect();
        fixed_cols.extend(
            predictor_cols
                .iter()
                .copied()
                .filter(|&c| !frame.meta(c).is_categorical()),
        );

        let mut random_cols = config
            .random_columns
            .iter()
            .map(|name| frame.require(name))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        random_cols.sort_unstable();

        let use_all = config.use_all_factor_levels;
        let (fixed, mut fixed_names) = lay_out(frame, &fixed_cols, use_all);
        let (random, mut random_names) = lay_out(frame, &random_cols, use_all);
        fixed_names.push("intercept".to_string());
        if config.random_intercept {
            random_names.push("intercept".to_string());
        }

        let group_meta = frame.meta(group);
        let group_names = group_meta
            .domain
            .iter()
            .map(|level| format!("{}.{}", group_meta.name, level))
            .collect();

        Ok(Self {
            p: fixed_names.len(),
            q: random_names.len(),
            fixed,
            random,
            response,
            group,
            n_groups: group_meta.cardinality(),
            weights,
            offset,
            predictors: predictor_cols.into_iter().filter(|&c| c != group).collect(),
            use_all_factor_levels: use_all,
            random_intercept: config.random_intercept,
            missing: config.missing_values_handling,
            imputation: ImputationTable::from_frame(frame),
            fixed_names,
            random_names,
            group_names,
        })
    }

    /// Number of fixed coefficients, intercept included.
    pub fn p(&self) -> usize {
        self.p
    }

    /// Number of random coefficients per group.
    pub fn q(&self) -> usize {
        self.q
    }

    /// Number of groups (levels of the grouping column).
    pub fn n_groups(&self) -> usize {
        self.n_groups
    }

    pub fn fixed_names(&self) -> &[String] {
        &self.fixed_names
    }

    pub fn random_names(&self) -> &[String] {
        &self.random_names
    }

    pub fn group_names(&self) -> &[String] {
        &self.group_names
    }

    pub fn missing_values_handling(&self) -> MissingValuesHandling {
        self.missing
    }

    /// Fill `x` (length p) with the fixed design vector of `row`.
    pub fn extract_fixed(&self, row: &RowView<'_>, x: &mut [f64]) {
        debug_assert_eq!(x.len(), self.p);
        self.encode(&self.fixed, row, x);
        x[self.p - 1] = 1.0;
    }

    /// Fill `z` (length q) with the random design vector of `row`.
    pub fn extract_random(&self, row: &RowView<'_>, z: &mut [f64]) {
        debug_assert_eq!(z.len(), self.q);
        self.encode(&self.random, row, z);
        if self.random_intercept {
            z[self.q - 1] = 1.0;
        }
    }

    pub fn group_index(&self, row: &RowView<'_>) -> Option<usize> {
        row.level(self.group).map(|l| l as usize)
    }

    pub fn response(&self, row: &RowView<'_>) -> f64 {
        row.numeric(self.response)
    }

    pub fn weight(&self, row: &RowView<'_>) -> f64 {
        self.weights.map_or(1.0, |c| row.numeric(c))
    }

    pub fn offset(&self, row: &RowView<'_>) -> f64 {
        self.offset.map_or(0.0, |c| row.numeric(c))
    }

    /// True when every predictor cell is present, or missing cells are
    /// imputed.
    pub fn predictors_usable(&self, row: &RowView<'_>) -> bool {
        match self.missing {
            MissingValuesHandling::MeanImputation => true,
            MissingValuesHandling::Skip => self.predictors.iter().all(|&c| !row.is_missing(c)),
        }
    }

    /// Whether `row` takes part in fitting.
    pub fn is_valid(&self, row: &RowView<'_>) -> bool {
        let weight = self.weight(row);
        !self.response(row).is_nan()
            && self.group_index(row).is_some()
            && !weight.is_nan()
            && weight != 0.0
            && !self.offset(row).is_nan()
            && self.predictors_usable(row)
    }

    fn encode(&self, columns: &[DesignColumn], row: &RowView<'_>, out: &mut [f64]) {
        out.fill(0.0);
        for column in columns {
            match column.encoding {
                Encoding::Numeric => {
                    let v = row.numeric(column.col);
                    out[column.start] = if v.is_nan() {
                        self.imputation.numeric(column.col)
                    } else {
                        v
                    };
                }
                Encoding::Categorical { width } => {
                    let level = row
                        .level(column.col)
                        .or_else(|| self.imputation.level(column.col));
                    let slot = match level {
                        Some(l) if self.use_all_factor_levels => Some(l as usize),
                        Some(l) if l > 0 => Some(l as usize - 1),
                        _ => None,
                    };
                    if let Some(slot) = slot.filter(|&s| s < width) {
                        out[column.start + slot] = 1.0;
                    }
                }
            }
        }
    }
}

fn lay_out(frame: &Frame, cols: &[usize], use_all_levels: bool) -> (Vec<DesignColumn>, Vec<String>) {
    let mut columns = Vec::with_capacity(cols.len());
    let mut names = Vec::new();
    for &col in cols {
        let meta = frame.meta(col);
        let start = names.len();
        if meta.is_categorical() {
            let skip = usize::from(!use_all_levels);
            let levels = meta.domain.iter().skip(skip);
            names.extend(levels.map(|level| format!("{}.{}", meta.name, level)));
            columns.push(DesignColumn {
                col,
                start,
                encoding: Encoding::Categorical {
                    width: names.len() - start,
                },
            });
        } else {
            names.push(meta.name.clone());
            columns.push(DesignColumn {
                col,
                start,
                encoding: Encoding::Numeric,
            });
        }
    }
    (columns, names)
}
