//! Reporting utilities: cell rankings and formatted terminal output.

use crate::domain::CellIndex;
use crate::error::AppError;
use crate::grid::GridOutput;

mod format;

pub use format::*;

/// One defined cell's estimate for a given channel and cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CellRank {
    pub cell: CellIndex,
    pub count: usize,
    pub amplitude: f64,
    pub phase: f64,
    pub amplitude_error: Option<f64>,
    pub mask: u8,
}

/// Rank defined cells by descending amplitude of `cycle` in `channel` (top-N).
pub fn rank_cells(output: &GridOutput, channel: usize, cycle: usize, top_n: usize) -> Result<Vec<CellRank>, AppError> {
    if channel >= output.channels {
        return Err(AppError::config(format!(
            "Channel {channel} out of range ({} channels).",
            output.channels
        )));
    }
    let k = output.cycles();
    if cycle >= k {
        return Err(AppError::config(format!("Cycle {cycle} out of range ({k} cycles).")));
    }

    let layer = channel * k + cycle;
    let (ny, nx) = output.shape();
    let mut ranks: Vec<CellRank> = (0..ny)
        .flat_map(|row| (0..nx).map(move |col| CellIndex::new(row, col)))
        .filter_map(|cell| {
            let amplitude = output.amplitude.get(layer, cell);
            if !output.is_defined(amplitude) {
                return None;
            }
            let err = output.amplitude_error.get(layer, cell);
            Some(CellRank {
                cell,
                count: output.count.get(channel, cell) as usize,
                amplitude,
                phase: output.phase.get(layer, cell),
                amplitude_error: output.is_defined(err).then_some(err),
                mask: output.mask.get(channel, cell) as u8,
            })
        })
        .collect();

    ranks.sort_by(|a, b| b.amplitude.partial_cmp(&a.amplitude).unwrap_or(std::cmp::Ordering::Equal));
    ranks.truncate(top_n);
    Ok(ranks)
}
