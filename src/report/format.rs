//! Formatted terminal output for a grid run.
//!
//! Formatting lives here so the estimation code never prints.

use crate::binning::BinningReport;
use crate::domain::{AnalysisConfig, PriorScale};
use crate::grid::GridOutput;
use crate::report::CellRank;

/// Format the run summary (input accounting + model + outcome tallies).
pub fn format_run_summary(binning: &BinningReport, output: &GridOutput, config: &AnalysisConfig) -> String {
    let mut out = String::new();
    let (ny, nx) = output.shape();

    out.push_str("=== cyclefit - gridded harmonic cycles ===\n");
    out.push_str(&format!(
        "Grid: {ny}x{nx} | channels={} | workers={}\n",
        output.channels, config.workers
    ));
    out.push_str(&format!(
        "Model: f={} cyc/yr | T={}yr ({:?}) | spatial={} | prior={}\n",
        fmt_vec(&output.frequencies),
        config.timescale,
        config.autocorrelation,
        output.spatial_terms,
        fmt_prior(config.prior),
    ));

    out.push_str(&format!(
        "Observations: total={} | in-domain={} | outside={} | undefined values={}\n",
        binning.total, binning.in_domain, binning.out_of_domain, binning.undefined_values
    ));
    out.push_str(&format!("Binned samples: {}\n", binning.binned_samples));

    let t = output.tally;
    out.push_str("\nOutcomes (cell x channel):\n");
    out.push_str(&format!("- solved   : {}\n", t.solved));
    out.push_str(&format!("- undefined: {}\n", t.undefined));
    out.push_str(&format!(
        "- rejected : amplitude={} (threshold {}) | residual={} (threshold {})\n",
        t.amplitude_rejects,
        config.amplitude_reject_threshold,
        t.residual_rejects,
        config.residual_reject_threshold
    ));
    out.push('\n');

    out
}

/// Format the strongest-cycle table.
pub fn format_cell_ranking(ranks: &[CellRank], channel_name: &str, frequency: f64) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Strongest cells (channel {channel_name}, f={frequency} cyc/yr):\n"
    ));

    out.push_str(
        format!(
            "{:>5} {:>5} {:>6} {:>10} {:>10} {:>10} {:>4}\n",
            "row", "col", "n", "amplitude", "phase", "amp_err", "mask"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(
        format!(
            "{:-<5} {:-<5} {:-<6} {:-<10} {:-<10} {:-<10} {:-<4}\n",
            "", "", "", "", "", "", ""
        )
        .trim_end(),
    );
    out.push('\n');

    for r in ranks {
        out.push_str(
            format!(
                "{:>5} {:>5} {:>6} {:>10.4} {:>10.4} {:>10} {:>4}\n",
                r.cell.row,
                r.cell.col,
                r.count,
                r.amplitude,
                r.phase,
                r.amplitude_error.map(|e| format!("{e:.4}")).unwrap_or_else(|| "-".to_string()),
                r.mask,
            )
            .trim_end(),
        );
        out.push('\n');
    }

    out
}

fn fmt_prior(prior: PriorScale) -> String {
    match prior {
        PriorScale::RangeFactor(f) => format!("{f}*range"),
        PriorScale::Absolute(s) => format!("sigma={s}"),
    }
}

fn fmt_vec(v: &[f64]) -> String {
    let parts: Vec<String> = v.iter().map(|x| format!("{x}")).collect();
    format!("[{}]", parts.join(", "))
}
