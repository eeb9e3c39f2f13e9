//! Command-line parsing for the gridded cycle estimator.
//!
//! Argument parsing and dispatch stay separate from the estimation code; the
//! `app` module turns these structs into an `AnalysisConfig` and a grid.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::Autocorrelation;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "cyclefit", version, about = "Gauss-Markov harmonic cycle estimation on a spatial grid")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Bin observations from a CSV file and fit every cell.
    Fit(FitArgs),
    /// Fit a synthetic scenario with known signals (no input file needed).
    Demo(DemoArgs),
}

/// Model settings. Each flag overrides the config file (or the default).
#[derive(Debug, Args, Clone, Default)]
pub struct ModelArgs {
    /// JSON config file (`AnalysisConfig`); flags below override its fields.
    #[arg(long, value_name = "JSON")]
    pub config: Option<PathBuf>,

    /// Cycle frequencies in cycles per year, comma separated.
    #[arg(long = "freq", value_delimiter = ',')]
    pub frequencies: Option<Vec<f64>>,

    /// Noise decorrelation timescale in years.
    #[arg(long)]
    pub timescale: Option<f64>,

    /// Noise autocorrelation family.
    #[arg(long, value_enum)]
    pub autocorrelation: Option<Autocorrelation>,

    /// Fit local spatial dependence terms.
    #[arg(long)]
    pub spatial: bool,

    /// Prior standard deviation as a fraction of the data range.
    #[arg(long, conflicts_with = "prior_sigma")]
    pub prior_range_factor: Option<f64>,

    /// Prior standard deviation in data units.
    #[arg(long)]
    pub prior_sigma: Option<f64>,

    /// Amplitude rejection threshold: reject when any |estimate| / prior sigma exceeds it.
    #[arg(long)]
    pub amplitude_threshold: Option<f64>,

    /// Residual rejection threshold: reject when the fraction of residuals larger
    /// than the noise standard deviation exceeds it.
    #[arg(long)]
    pub residual_threshold: Option<f64>,

    /// Remove only the first N cycles from the residual series.
    #[arg(long)]
    pub residual_cycles: Option<usize>,

    /// Skip the posterior error computation.
    #[arg(long)]
    pub no_error: bool,

    /// Worker threads (default: available parallelism).
    #[arg(short = 'j', long)]
    pub workers: Option<usize>,
}

/// Regular grid geometry.
#[derive(Debug, Args, Clone)]
pub struct GridArgs {
    /// West edge of the grid.
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub x0: f64,

    /// South edge of the grid.
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub y0: f64,

    /// Cell width.
    #[arg(long, default_value_t = 1.0)]
    pub dx: f64,

    /// Cell height.
    #[arg(long, default_value_t = 1.0)]
    pub dy: f64,

    /// Number of columns.
    #[arg(long, default_value_t = 6)]
    pub nx: usize,

    /// Number of rows.
    #[arg(long, default_value_t = 4)]
    pub ny: usize,

    /// Wrap x (e.g. a global longitude grid).
    #[arg(long)]
    pub periodic: bool,
}

/// Output options shared by both subcommands.
#[derive(Debug, Args, Clone)]
pub struct OutputArgs {
    /// Show the top-N cells by first-cycle amplitude.
    #[arg(long, default_value_t = 10)]
    pub top: usize,

    /// Export per-cell results to CSV.
    #[arg(long)]
    pub export: Option<PathBuf>,

    /// Export the full output grid to JSON.
    #[arg(long = "export-json")]
    pub export_json: Option<PathBuf>,
}

#[derive(Debug, Parser, Clone)]
pub struct FitArgs {
    /// Observation CSV (`time,x,y,<channel>...`).
    #[arg(short = 'i', long, value_name = "CSV")]
    pub input: PathBuf,

    /// Value columns to use, comma separated (default: all non-position columns).
    #[arg(long, value_delimiter = ',')]
    pub channels: Option<Vec<String>>,

    #[command(flatten)]
    pub grid: GridArgs,

    #[command(flatten)]
    pub model: ModelArgs,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Debug, Parser, Clone)]
pub struct DemoArgs {
    /// Samples per populated cell.
    #[arg(short = 'n', long, default_value_t = 40)]
    pub samples: usize,

    /// Length of the synthetic record in years.
    #[arg(long, default_value_t = 2.0)]
    pub span: f64,

    /// Frequency of the planted cycle (cycles per year).
    #[arg(long, default_value_t = 1.0)]
    pub signal_freq: f64,

    /// Standard deviation of the added noise.
    #[arg(long, default_value_t = 0.1)]
    pub noise: f64,

    /// Number of value channels.
    #[arg(long, default_value_t = 2)]
    pub channels: usize,

    /// Populate every N-th cell.
    #[arg(long, default_value_t = 2)]
    pub stride: usize,

    /// Position jitter as a fraction of the cell size.
    #[arg(long, default_value_t = 0.25)]
    pub jitter: f64,

    /// Random seed.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    #[command(flatten)]
    pub grid: GridArgs,

    #[command(flatten)]
    pub model: ModelArgs,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fit_with_overrides() {
        let cli = Cli::try_parse_from([
            "cyclefit",
            "fit",
            "-i",
            "obs.csv",
            "--freq",
            "1,2,4",
            "--autocorrelation",
            "eddy",
            "--x0",
            "-180",
            "--nx",
            "36",
            "-j",
            "3",
        ])
        .unwrap();
        let Command::Fit(args) = cli.command else {
            panic!("expected fit");
        };
        assert_eq!(args.model.frequencies, Some(vec![1.0, 2.0, 4.0]));
        assert_eq!(args.model.autocorrelation, Some(Autocorrelation::Eddy));
        assert_eq!(args.grid.x0, -180.0);
        assert_eq!(args.grid.nx, 36);
        assert_eq!(args.model.workers, Some(3));
        assert!(args.model.timescale.is_none());
    }

    #[test]
    fn prior_flags_conflict() {
        let res = Cli::try_parse_from([
            "cyclefit",
            "demo",
            "--prior-range-factor",
            "0.5",
            "--prior-sigma",
            "2",
        ]);
        assert!(res.is_err());
    }

    #[test]
    fn threshold_help_describes_the_rejection_rules() {
        use clap::CommandFactory;

        let cmd = Cli::command();
        let fit = cmd.find_subcommand("fit").unwrap();
        let help = |id: &str| {
            fit.get_arguments()
                .find(|a| a.get_id().as_str() == id)
                .and_then(|a| a.get_help())
                .map(|h| h.to_string())
                .unwrap()
        };
        assert!(help("amplitude_threshold").contains("prior sigma"));
        assert!(help("residual_threshold").contains("noise standard deviation"));
    }
}
