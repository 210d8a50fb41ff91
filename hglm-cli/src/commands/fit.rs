//! Fit an HGLM.
//!
//! hglm fit --train data.tsv --response y --group clinic --random-columns dose --output-prefix out

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use hglm_core::{Hglm, HglmConfig, HglmModel, JobHandle, MissingValuesHandling, PsdPolicy};
use hglm_frame::{read_delimited, Frame, ReadOptions};

use super::split_list;

#[derive(Args)]
pub struct FitArgs {
    /// Training data file (tab, comma or whitespace delimited, with header)
    #[arg(long)]
    train: String,

    /// Validation data file, scored during and after fitting
    #[arg(long)]
    valid: Option<String>,

    /// Response column name
    #[arg(long)]
    response: String,

    /// Group column name (read as categorical)
    #[arg(long)]
    group: String,

    /// Random-effect column names (comma-separated)
    #[arg(long, default_value = "")]
    random_columns: String,

    /// Drop the per-group random intercept
    #[arg(long, default_value = "false")]
    no_random_intercept: bool,

    /// Columns to exclude from the fixed effects (comma-separated)
    #[arg(long, default_value = "")]
    ignore: String,

    /// Columns to read as categorical even if they look numeric (comma-separated)
    #[arg(long, default_value = "")]
    categorical: String,

    /// Observation weight column
    #[arg(long)]
    weights: Option<String>,

    /// Offset column
    #[arg(long)]
    offset: Option<String>,

    /// Keep every level of categorical predictors instead of dropping the first
    #[arg(long, default_value = "false")]
    use_all_factor_levels: bool,

    /// Missing predictor handling: mean or skip
    #[arg(long, default_value = "mean")]
    missing: String,

    /// Maximum EM iterations
    #[arg(long, default_value = "1000")]
    max_iter: usize,

    /// Convergence tolerance on relative parameter changes
    #[arg(long, default_value = "1e-3")]
    epsilon: f64,

    /// Initial noise variance (0 derives it from the data)
    #[arg(long, default_value = "0")]
    tau_e_init: f64,

    /// Initial random-effect variance (0 derives it from the data)
    #[arg(long, default_value = "0")]
    tau_u_init: f64,

    /// Random seed for the initial random effects
    #[arg(long, default_value = "12345")]
    seed: u64,

    /// Score the validation frame after every iteration
    #[arg(long, default_value = "false")]
    score_each_iteration: bool,

    /// Score the validation frame every N iterations
    #[arg(long, default_value = "5")]
    score_interval: usize,

    /// Reaction to T losing positive semi-definiteness: stop or warn
    #[arg(long, default_value = "stop")]
    psd_policy: String,

    /// Rows per partition
    #[arg(long, default_value = "4096")]
    chunk_rows: usize,

    /// Output file prefix for the JSON report and scoring history
    #[arg(long)]
    output_prefix: Option<String>,

    /// Write per-row predictions of the training frame to this file
    #[arg(long)]
    predictions: Option<String>,

    /// Keep the accumulated fixed matrices and log their sizes
    #[arg(long, default_value = "false")]
    show_fixed_mat_vecs: bool,
}

fn build_config(args: &FitArgs) -> Result<HglmConfig> {
    let mut config = HglmConfig::new(&args.response, &args.group);
    config.random_columns = split_list(&args.random_columns);
    config.random_intercept = !args.no_random_intercept;
    config.ignored_columns = split_list(&args.ignore);
    config.weights_column = args.weights.clone();
    config.offset_column = args.offset.clone();
    config.use_all_factor_levels = args.use_all_factor_levels;
    config.missing_values_handling = match args.missing.to_lowercase().as_str() {
        "mean" | "mean_imputation" => MissingValuesHandling::MeanImputation,
        "skip" => MissingValuesHandling::Skip,
        _ => anyhow::bail!("Unknown missing-value handling: {}", args.missing),
    };
    config.psd_policy = match args.psd_policy.to_lowercase().as_str() {
        "stop" => PsdPolicy::Stop,
        "warn" => PsdPolicy::Warn,
        _ => anyhow::bail!("Unknown PSD policy: {}", args.psd_policy),
    };
    config.max_iterations = args.max_iter;
    config.em_epsilon = args.epsilon;
    config.tau_e_var_init = args.tau_e_init;
    config.tau_u_var_init = args.tau_u_init;
    config.seed = args.seed;
    config.score_each_iteration = args.score_each_iteration;
    config.score_iteration_interval = args.score_interval;
    config.show_fixed_mat_vecs = args.show_fixed_mat_vecs;
    Ok(config)
}

fn read_frame(path: &str, args: &FitArgs) -> Result<Frame> {
    let mut categorical = split_list(&args.categorical);
    if !categorical.contains(&args.group) {
        categorical.push(args.group.clone());
    }
    let options = ReadOptions {
        categorical_columns: categorical,
        chunk_rows: args.chunk_rows.max(1),
        ..Default::default()
    };
    read_delimited(Path::new(path), &options)
}

fn write_predictions(model: &HglmModel, frame: &Frame, path: &Path) -> Result<()> {
    let predictions = model.predict(frame)?;
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let mut out = std::io::BufWriter::new(file);
    writeln!(out, "row\tpredict")?;
    for (i, p) in predictions.iter().enumerate() {
        if p.is_nan() {
            writeln!(out, "{}\tNA", i)?;
        } else {
            writeln!(out, "{}\t{}", i, p)?;
        }
    }
    out.flush()?;
    Ok(())
}

pub fn run(args: FitArgs) -> Result<()> {
    let config = build_config(&args)?;

    info!("=== HGLM fit ===");
    info!("Training file: {}", args.train);
    info!("Response: {}, group: {}", config.response_column, config.group_column);

    let train = read_frame(&args.train, &args)?;
    info!(
        "Loaded {} rows x {} columns ({} partitions)",
        train.n_rows(),
        train.n_cols(),
        train.n_partitions()
    );
    let valid = match &args.valid {
        Some(path) => {
            let frame = read_frame(path, &args)?;
            info!("Loaded {} validation rows from {}", frame.n_rows(), path);
            Some(frame)
        }
        None => None,
    };

    let job = JobHandle::new();
    let model = Hglm::new(config)
        .fit(&train, valid.as_ref(), &job)
        .context("HGLM fit failed")?;
    info!("EM finished: {}", model.termination());

    if let Some(mats) = model.fixed_mat_vecs() {
        info!(
            "Fixed matrices: AfTAf {}x{}, {} per-group blocks",
            mats.global.af_t_af.nrows(),
            mats.global.af_t_af.ncols(),
            mats.groups.len()
        );
    }

    if let Some(prefix) = &args.output_prefix {
        let json_path = Path::new(prefix).with_extension("hglm.json");
        let json = serde_json::to_string_pretty(&model.report())?;
        std::fs::write(&json_path, json)
            .with_context(|| format!("Failed to write {}", json_path.display()))?;
        info!("Model report saved to {}", json_path.display());

        let history_path = Path::new(prefix).with_extension("history.tsv");
        std::fs::write(&history_path, model.training_history().to_table())
            .with_context(|| format!("Failed to write {}", history_path.display()))?;
        info!("Scoring history saved to {}", history_path.display());
    }

    if let Some(path) = &args.predictions {
        write_predictions(&model, &train, Path::new(path))?;
        info!("Predictions written to {}", path);
    }

    println!("{}", model.model_summary());
    Ok(())
}
