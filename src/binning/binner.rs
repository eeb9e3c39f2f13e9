//! Two-pass observation binning.
//!
//! Pass 1 counts the defined samples per (cell, channel) so that pass 2 can
//! allocate every array with its exact final length and fill it without
//! reallocation.
//!
//! Drop policy: an observation outside the grid domain (or with a non-finite
//! time) is skipped in both passes, and an undefined channel value is skipped for that channel only.
//! Neither is an error; both are counted in the returned `BinningReport`.

use crate::binning::GridGeometry;
use crate::domain::{CellIndex, Observation};
use crate::error::AppError;

/// Samples of one channel inside one cell.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelSeries {
    pub times: Vec<f64>,
    pub values: Vec<f64>,
    /// `(dx, dy)` from the cell center, recorded only when spatial terms are fitted.
    pub offsets: Option<Vec<(f64, f64)>>,
}

impl ChannelSeries {
    fn with_capacity(n: usize, with_offsets: bool) -> Self {
        Self {
            times: Vec::with_capacity(n),
            values: Vec::with_capacity(n),
            offsets: with_offsets.then(|| Vec::with_capacity(n)),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Binned samples for a `ny × nx` grid, cells stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct BinnedGrid {
    ny: usize,
    nx: usize,
    channels: usize,
    with_offsets: bool,
    cells: Vec<Vec<ChannelSeries>>,
}

impl BinnedGrid {
    pub fn shape(&self) -> (usize, usize) {
        (self.ny, self.nx)
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// `true` when cell-center offsets were recorded for every sample.
    pub fn has_offsets(&self) -> bool {
        self.with_offsets
    }

    pub fn series(&self, cell: CellIndex, channel: usize) -> &ChannelSeries {
        &self.cells[cell.row * self.nx + cell.col][channel]
    }

    /// Total number of binned samples over all cells and channels.
    pub fn sample_count(&self) -> usize {
        self.cells.iter().flatten().map(ChannelSeries::len).sum()
    }

    /// Cells with at least one sample in any channel.
    pub fn populated_cells(&self) -> usize {
        self.cells
            .iter()
            .filter(|c| c.iter().any(|s| !s.is_empty()))
            .count()
    }
}

/// What happened to the input during binning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BinningReport {
    pub total: usize,
    pub in_domain: usize,
    pub out_of_domain: usize,
    /// In-domain channel values skipped as undefined.
    pub undefined_values: usize,
    pub binned_samples: usize,
}

pub struct ObservationBinner<'g, G: GridGeometry> {
    geometry: &'g G,
    channels: usize,
    undefined: f64,
    with_offsets: bool,
}

impl<'g, G: GridGeometry> ObservationBinner<'g, G> {
    pub fn new(geometry: &'g G, channels: usize, undefined: f64, with_offsets: bool) -> Self {
        Self {
            geometry,
            channels,
            undefined,
            with_offsets,
        }
    }

    pub fn bin(&self, observations: &[Observation]) -> Result<(BinnedGrid, BinningReport), AppError> {
        if self.channels == 0 {
            return Err(AppError::config("At least one channel is required."));
        }
        if let Some((i, obs)) = observations
            .iter()
            .enumerate()
            .find(|(_, o)| o.values.len() != self.channels)
        {
            return Err(AppError::input(format!(
                "Observation {i} has {} channel values, expected {}.",
                obs.values.len(),
                self.channels
            )));
        }

        let (ny, nx) = self.geometry.shape();
        let ch = self.channels;
        let slot = |cell: CellIndex, c: usize| (cell.row * nx + cell.col) * ch + c;

        let located: Vec<Option<CellIndex>> = observations
            .iter()
            .map(|o| if o.time.is_finite() { self.geometry.locate(o.x, o.y) } else { None })
            .collect();

        let mut report = BinningReport {
            total: observations.len(),
            ..BinningReport::default()
        };

        // Pass 1: count.
        let mut counts = vec![0usize; ny * nx * ch];
        for (obs, cell) in observations.iter().zip(&located) {
            let Some(cell) = *cell else {
                report.out_of_domain += 1;
                continue;
            };
            report.in_domain += 1;
            for c in 0..ch {
                if obs.is_defined(c, self.undefined) {
                    counts[slot(cell, c)] += 1;
                } else {
                    report.undefined_values += 1;
                }
            }
        }

        // Pass 2: fill exactly-sized arrays.
        let mut cells: Vec<Vec<ChannelSeries>> = (0..ny * nx)
            .map(|cell| {
                (0..ch)
                    .map(|c| ChannelSeries::with_capacity(counts[cell * ch + c], self.with_offsets))
                    .collect()
            })
            .collect();

        for (obs, cell) in observations.iter().zip(&located) {
            let Some(cell) = *cell else { continue };
            let offset = self
                .with_offsets
                .then(|| self.geometry.offset(cell, obs.x, obs.y));
            let series = &mut cells[cell.row * nx + cell.col];
            for (c, s) in series.iter_mut().enumerate() {
                if !obs.is_defined(c, self.undefined) {
                    continue;
                }
                s.times.push(obs.time);
                s.values.push(obs.values[c]);
                if let (Some(offsets), Some(o)) = (s.offsets.as_mut(), offset) {
                    offsets.push(o);
                }
            }
        }

        let grid = BinnedGrid {
            ny,
            nx,
            channels: ch,
            with_offsets: self.with_offsets,
            cells,
        };
        report.binned_samples = grid.sample_count();
        debug_assert_eq!(report.binned_samples, counts.iter().sum::<usize>());

        tracing::debug!(
            total = report.total,
            in_domain = report.in_domain,
            out_of_domain = report.out_of_domain,
            undefined_values = report.undefined_values,
            binned = report.binned_samples,
            "binned observations (out-of-domain and undefined values dropped)"
        );

        Ok((grid, report))
    }
}
