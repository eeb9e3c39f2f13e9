//! Top-level application orchestration.
//!
//! `src/main.rs` stays tiny; this module is the real main that:
//! - parses CLI arguments and sets up logging
//! - builds the run configuration
//! - loads or synthesizes observations
//! - runs the grid pipeline
//! - prints reports and writes optional exports

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::binning::RegularGrid;
use crate::cli::{Command, DemoArgs, FitArgs, GridArgs, ModelArgs, OutputArgs};
use crate::data::{SyntheticConfig, demo_signals, generate_observations};
use crate::domain::{AnalysisConfig, PriorScale};
use crate::error::AppError;

pub mod pipeline;

/// Entry point for the `cyclefit` binary.
pub fn run() -> Result<(), AppError> {
    let cli = crate::cli::Cli::parse();
    init_tracing();

    match cli.command {
        Command::Fit(args) => handle_fit(args),
        Command::Demo(args) => handle_demo(args),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // Logs go to stderr so stdout carries only the report.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let config = analysis_config_from_args(&args.model)?;
    let grid = grid_from_args(&args.grid)?;

    let ingested = crate::io::load_observations(&args.input, args.channels.as_deref(), config.undefined)?;
    if ingested.observations.is_empty() {
        return Err(AppError::input(format!(
            "No usable observations in '{}'.",
            args.input.display()
        )));
    }
    for e in ingested.row_errors.iter().take(5) {
        tracing::warn!(line = e.line, "{}", e.message);
    }

    let channels = ingested.channel_names.len();
    let run = pipeline::run_grid(&config, &grid, channels, &ingested.observations)?;
    present(&run, &config, &ingested.channel_names, &args.output)
}

fn handle_demo(args: DemoArgs) -> Result<(), AppError> {
    let mut config = analysis_config_from_args(&args.model)?;
    // Without explicit frequencies, fit the planted cycle only.
    if args.model.frequencies.is_none() && args.model.config.is_none() {
        config.frequencies = vec![args.signal_freq];
    }
    let grid = grid_from_args(&args.grid)?;

    let signals = demo_signals(&grid, args.stride);
    let synthetic = SyntheticConfig {
        samples_per_cell: args.samples,
        span_years: args.span,
        frequency: args.signal_freq,
        noise_sigma: args.noise,
        channels: args.channels,
        jitter: args.jitter,
        seed: args.seed,
        ..SyntheticConfig::default()
    };
    let observations = generate_observations(&grid, &signals, &synthetic)?;
    tracing::info!(
        cells = signals.len(),
        observations = observations.len(),
        seed = args.seed,
        "synthetic scenario generated"
    );

    let names: Vec<String> = (0..args.channels).map(|c| format!("v{c}")).collect();
    let run = pipeline::run_grid(&config, &grid, args.channels, &observations)?;
    present(&run, &config, &names, &args.output)
}

fn present(
    run: &pipeline::RunOutput,
    config: &AnalysisConfig,
    channel_names: &[String],
    output: &OutputArgs,
) -> Result<(), AppError> {
    println!(
        "{}",
        crate::report::format_run_summary(&run.binning, &run.output, config)
    );

    if output.top > 0 {
        let ranks = crate::report::rank_cells(&run.output, 0, 0, output.top)?;
        let name = channel_names.first().map(String::as_str).unwrap_or("0");
        println!(
            "{}",
            crate::report::format_cell_ranking(&ranks, name, run.output.frequencies[0])
        );
    }

    if let Some(path) = &output.export {
        crate::io::write_grid_csv(path, &run.output, channel_names)?;
        tracing::info!(path = %path.display(), "wrote CSV export");
    }
    if let Some(path) = &output.export_json {
        crate::io::write_grid_json(path, &run.output)?;
        tracing::info!(path = %path.display(), "wrote JSON export");
    }
    Ok(())
}

/// Start from the config file (or defaults) and apply flag overrides.
pub fn analysis_config_from_args(args: &ModelArgs) -> Result<AnalysisConfig, AppError> {
    let mut config = match &args.config {
        Some(path) => AnalysisConfig::from_json_file(path)?,
        None => AnalysisConfig::default(),
    };

    if let Some(f) = &args.frequencies {
        config.frequencies = f.clone();
    }
    if let Some(t) = args.timescale {
        config.timescale = t;
    }
    if let Some(a) = args.autocorrelation {
        config.autocorrelation = a;
    }
    if args.spatial {
        config.spatial_terms = true;
    }
    if let Some(f) = args.prior_range_factor {
        config.prior = PriorScale::RangeFactor(f);
    }
    if let Some(s) = args.prior_sigma {
        config.prior = PriorScale::Absolute(s);
    }
    if let Some(t) = args.amplitude_threshold {
        config.amplitude_reject_threshold = t;
    }
    if let Some(t) = args.residual_threshold {
        config.residual_reject_threshold = t;
    }
    if args.residual_cycles.is_some() {
        config.residual_cycles = args.residual_cycles;
    }
    if args.no_error {
        config.compute_error = false;
    }
    if let Some(w) = args.workers {
        config.workers = w;
    }

    config.validate()?;
    Ok(config)
}

pub fn grid_from_args(args: &GridArgs) -> Result<RegularGrid, AppError> {
    RegularGrid::new(args.x0, args.y0, args.dx, args.dy, args.nx, args.ny, args.periodic)
}
