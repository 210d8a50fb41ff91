//! hglm-rs: EM fitting of Gaussian hierarchical GLMs.
//!
//! CLI entry point using clap for argument parsing.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "hglm",
    version,
    about = "HGLM-RS: Gaussian hierarchical GLMs fitted by Expectation-Maximization",
    long_about = "Fits y = Xb + Zu + e with group-level random effects u ~ N(0, T)\n\
                  and noise e ~ N(0, tau_e) over row-partitioned data."
)]
struct Cli {
    /// Worker threads for the partition passes and the per-group E-step
    /// (0 uses every available core)
    #[arg(long, default_value = "0", global = true)]
    threads: usize,

    /// Verbosity: fit progress is shown by default, -v adds per-iteration
    /// parameter changes, -vv traces every crate
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only report warnings and the final summary
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit an HGLM on a delimited data file
    Fit(commands::fit::FitArgs),

    /// Write a synthetic grouped dataset with known parameters
    Simulate(commands::simulate::SimulateArgs),
}

/// Log filter for the hglm crates; everything else stays at `warn` until
/// the most verbose level.
fn log_filter(verbose: u8, quiet: bool) -> &'static str {
    if quiet {
        return "warn";
    }
    match verbose {
        0 => "warn,hglm_core=info,hglm=info",
        1 => "warn,hglm_core=debug,hglm_frame=debug,hglm=debug",
        _ => "trace",
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(log_filter(cli.verbose, cli.quiet))),
        )
        .with_target(false)
        .init();

    let mut pool = rayon::ThreadPoolBuilder::new();
    if cli.threads > 0 {
        pool = pool.num_threads(cli.threads);
    }
    if let Err(e) = pool.build_global() {
        tracing::warn!("Could not configure the thread pool: {}", e);
    }

    tracing::info!("HGLM-RS v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Using {} threads for partition passes and per-group updates",
        rayon::current_num_threads()
    );

    match cli.command {
        Commands::Fit(args) => commands::fit::run(args),
        Commands::Simulate(args) => commands::simulate::run(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_filter_levels() {
        assert_eq!(log_filter(0, false), "warn,hglm_core=info,hglm=info");
        assert!(log_filter(1, false).contains("hglm_core=debug"));
        assert_eq!(log_filter(3, false), "trace");
        assert_eq!(log_filter(2, true), "warn");
    }

    #[test]
    fn test_threads_default_to_all_cores() {
        let cli = Cli::try_parse_from(["hglm", "simulate", "--output", "out.tsv"]).unwrap();
        assert_eq!(cli.threads, 0);
        assert!(!cli.quiet);

        let cli = Cli::try_parse_from(["hglm", "-q", "--threads", "4", "simulate", "--output", "o"]).unwrap();
        assert_eq!(cli.threads, 4);
        assert!(cli.quiet);
        assert!(Cli::try_parse_from(["hglm", "-q", "-v", "simulate", "--output", "o"]).is_err());
    }
}
