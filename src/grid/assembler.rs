//! Dense output grids.
//!
//! Every statistic is a `GridField`: a stack of `ny × nx` layers stored
//! row-major, one layer per (channel) or per (channel, cycle). Cells with an
//! undefined outcome keep the undefined sentinel in every field but `count`.

use serde::{Deserialize, Serialize};

use crate::domain::{CellIndex, SolveOutcome};

/// Rejection mask values.
pub const MASK_ACCEPTED: f64 = 0.0;
pub const MASK_AMPLITUDE: f64 = 1.0;
pub const MASK_RESIDUAL: f64 = 2.0;
pub const MASK_BOTH: f64 = 3.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridField {
    pub depth: usize,
    pub ny: usize,
    pub nx: usize,
    pub data: Vec<f64>,
}

impl GridField {
    pub fn filled(depth: usize, ny: usize, nx: usize, value: f64) -> Self {
        Self {
            depth,
            ny,
            nx,
            data: vec![value; depth * ny * nx],
        }
    }

    fn index(&self, layer: usize, cell: CellIndex) -> usize {
        debug_assert!(layer < self.depth && cell.row < self.ny && cell.col < self.nx);
        (layer * self.ny + cell.row) * self.nx + cell.col
    }

    pub fn get(&self, layer: usize, cell: CellIndex) -> f64 {
        self.data[self.index(layer, cell)]
    }

    pub fn set(&mut self, layer: usize, cell: CellIndex, value: f64) {
        let i = self.index(layer, cell);
        self.data[i] = value;
    }

    /// One `ny × nx` layer.
    pub fn layer(&self, layer: usize) -> &[f64] {
        let len = self.ny * self.nx;
        &self.data[layer * len..(layer + 1) * len]
    }
}

/// Running tallies over recorded outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeTally {
    pub solved: usize,
    pub undefined: usize,
    pub amplitude_rejects: usize,
    pub residual_rejects: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridOutput {
    pub frequencies: Vec<f64>,
    pub channels: usize,
    pub spatial_terms: bool,
    pub undefined: f64,
    /// Layer `ch`.
    pub mean: GridField,
    /// Layer `ch * K + k`.
    pub amplitude: GridField,
    /// Layer `ch * K + k`, radians.
    pub phase: GridField,
    /// Layer `ch * K + k`.
    pub amplitude_error: GridField,
    /// Layer `ch * V + v`, `v` over (mean, cycles, [spatial], residual).
    pub variance_share: GridField,
    /// Layer `ch`; see `MASK_*`.
    pub mask: GridField,
    /// Layer `ch`; defined for every cell.
    pub count: GridField,
    pub tally: OutcomeTally,
}

impl GridOutput {
    pub fn new(
        ny: usize,
        nx: usize,
        channels: usize,
        frequencies: &[f64],
        spatial_terms: bool,
        undefined: f64,
    ) -> Self {
        let k = frequencies.len();
        let v = variance_components(k, spatial_terms);
        Self {
            frequencies: frequencies.to_vec(),
            channels,
            spatial_terms,
            undefined,
            mean: GridField::filled(channels, ny, nx, undefined),
            amplitude: GridField::filled(channels * k, ny, nx, undefined),
            phase: GridField::filled(channels * k, ny, nx, undefined),
            amplitude_error: GridField::filled(channels * k, ny, nx, undefined),
            variance_share: GridField::filled(channels * v, ny, nx, undefined),
            mask: GridField::filled(channels, ny, nx, undefined),
            count: GridField::filled(channels, ny, nx, 0.0),
            tally: OutcomeTally::default(),
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.mean.ny, self.mean.nx)
    }

    pub fn cycles(&self) -> usize {
        self.frequencies.len()
    }

    /// Number of variance-share layers per channel.
    pub fn variance_components(&self) -> usize {
        variance_components(self.cycles(), self.spatial_terms)
    }

    pub fn is_defined(&self, value: f64) -> bool {
        value != self.undefined && value.is_finite()
    }

    /// Write one outcome into its slots. Called only by the orchestrating thread.
    pub fn record(&mut self, cell: CellIndex, channel: usize, n_samples: usize, outcome: &SolveOutcome) {
        self.count.set(channel, cell, n_samples as f64);

        let r = match outcome {
            SolveOutcome::Solved(r) => r,
            SolveOutcome::Undefined(_) => {
                self.tally.undefined += 1;
                return;
            }
        };
        self.tally.solved += 1;

        self.mean.set(channel, cell, r.mean);

        let k = self.cycles();
        for (i, cycle) in r.cycles.iter().enumerate() {
            let layer = channel * k + i;
            self.amplitude.set(layer, cell, cycle.amplitude);
            self.phase.set(layer, cell, cycle.phase);
            if let Some(err) = cycle.amplitude_error {
                self.amplitude_error.set(layer, cell, err);
            }
        }

        let parts = r.variance.to_vec();
        let total = r.variance.component_sum();
        if total > 0.0 {
            let v = self.variance_components();
            for (i, part) in parts.iter().enumerate() {
                self.variance_share.set(channel * v + i, cell, part / total);
            }
        }

        let mask = match (r.amplitude_reject, r.residual_reject) {
            (false, false) => MASK_ACCEPTED,
            (true, false) => MASK_AMPLITUDE,
            (false, true) => MASK_RESIDUAL,
            (true, true) => MASK_BOTH,
        };
        self.mask.set(channel, cell, mask);
        if r.amplitude_reject {
            self.tally.amplitude_rejects += 1;
        }
        if r.residual_reject {
            self.tally.residual_rejects += 1;
        }
    }
}

fn variance_components(cycles: usize, spatial: bool) -> usize {
    cycles + 2 + usize::from(spatial)
}
