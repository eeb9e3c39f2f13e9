//! Row-by-row concurrent solve over a binned grid.
//!
//! For each row:
//!
//! 1. spawn one task per (column, channel) on the shared `WorkerPool`
//! 2. each task builds its own `DesignModel`, solves, and sends
//!    `(slot, result)` on a completion queue
//! 3. once the row's scope has joined, drain the queue into a slot buffer
//!    indexed by submission order
//! 4. write back in (row, column, channel) order and report progress
//!
//! Output is therefore identical for any worker count. Any task error or
//! panic aborts the run; only degenerate cells are non-fatal, and those come
//! back as `SolveOutcome::Undefined`.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;

use crate::binning::{BinnedGrid, ChannelSeries};
use crate::domain::{CellIndex, DegenerateReason, SolveOutcome};
use crate::error::AppError;
use crate::fit::{GaussMarkov, SolveOptions};
use crate::grid::{GridOutput, WorkerPool};
use crate::math::{DenseSolver, LinearSolver};
use crate::models::{CycleSpec, DesignModel};

/// Progress report emitted after each row has been written back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowProgress {
    pub row: usize,
    pub rows: usize,
    pub tasks: usize,
    pub solved: usize,
    pub undefined: usize,
}

type TaskResult = Result<SolveOutcome, AppError>;

pub struct GridScheduler<'p, L: LinearSolver = DenseSolver> {
    spec: CycleSpec,
    options: SolveOptions,
    undefined: f64,
    solver: GaussMarkov<L>,
    pool: &'p WorkerPool,
}

impl<'p> GridScheduler<'p, DenseSolver> {
    pub fn new(spec: CycleSpec, options: SolveOptions, undefined: f64, pool: &'p WorkerPool) -> Self {
        Self::with_solver(spec, options, undefined, pool, GaussMarkov::default())
    }
}

impl<'p, L: LinearSolver> GridScheduler<'p, L> {
    pub fn with_solver(
        spec: CycleSpec,
        options: SolveOptions,
        undefined: f64,
        pool: &'p WorkerPool,
        solver: GaussMarkov<L>,
    ) -> Self {
        Self {
            spec,
            options,
            undefined,
            solver,
            pool,
        }
    }

    /// Solve every (cell, channel) of `grid`.
    ///
    /// On error no partial output is returned.
    pub fn run<F>(&self, grid: &BinnedGrid, mut progress: F) -> Result<GridOutput, AppError>
    where
        F: FnMut(RowProgress),
    {
        if self.spec.has_spatial() && !grid.has_offsets() {
            return Err(AppError::config(
                "Spatial terms requested but the grid was binned without cell offsets.",
            ));
        }

        let (ny, nx) = grid.shape();
        let channels = grid.channels();
        let per_row = nx * channels;
        let mut output = GridOutput::new(
            ny,
            nx,
            channels,
            self.spec.frequencies(),
            self.spec.has_spatial(),
            self.undefined,
        );

        tracing::info!(
            rows = ny,
            cols = nx,
            channels,
            workers = self.pool.workers(),
            unknowns = self.spec.unknowns(),
            "grid solve started"
        );

        // Reused across rows; only its contents are per-row scratch.
        let mut slots: Vec<Option<TaskResult>> = Vec::with_capacity(per_row);

        for row in 0..ny {
            slots.clear();
            slots.resize_with(per_row, || None);
            self.run_row(grid, row, &mut slots)?;

            let before = output.tally;
            for (slot, result) in slots.iter_mut().enumerate() {
                let (col, ch) = (slot / channels, slot % channels);
                let cell = CellIndex::new(row, col);
                let outcome = match result.take() {
                    Some(Ok(outcome)) => outcome,
                    Some(Err(e)) => {
                        tracing::error!(row, col, channel = ch, error = %e, "solve failed, aborting run");
                        return Err(e);
                    }
                    None => {
                        return Err(AppError::numeric(format!(
                            "Task for cell ({row}, {col}) channel {ch} never reported."
                        )));
                    }
                };
                output.record(cell, ch, grid.series(cell, ch).len(), &outcome);
            }

            let report = RowProgress {
                row,
                rows: ny,
                tasks: per_row,
                solved: output.tally.solved - before.solved,
                undefined: output.tally.undefined - before.undefined,
            };
            tracing::debug!(
                row = row + 1,
                rows = ny,
                solved = report.solved,
                undefined = report.undefined,
                "row complete"
            );
            progress(report);
        }

        let tally = output.tally;
        if tally.amplitude_rejects + tally.residual_rejects > 0 {
            tracing::warn!(
                amplitude_rejects = tally.amplitude_rejects,
                residual_rejects = tally.residual_rejects,
                "some cells were flagged by the rejection tests"
            );
        }
        tracing::info!(solved = tally.solved, undefined = tally.undefined, "grid solve finished");

        Ok(output)
    }

    fn run_row(&self, grid: &BinnedGrid, row: usize, slots: &mut [Option<TaskResult>]) -> Result<(), AppError> {
        let (_, nx) = grid.shape();
        let channels = grid.channels();
        let (tx, rx) = mpsc::channel::<(usize, TaskResult)>();

        let joined = panic::catch_unwind(AssertUnwindSafe(|| {
            self.pool.scope(|s| {
                for col in 0..nx {
                    for ch in 0..channels {
                        let slot = col * channels + ch;
                        let series = grid.series(CellIndex::new(row, col), ch);
                        let tx = tx.clone();
                        s.spawn(move |_| {
                            let result = self.solve_series(series);
                            // The receiver outlives the scope; a send cannot fail here.
                            let _ = tx.send((slot, result));
                        });
                    }
                }
            });
        }));
        drop(tx);

        if let Err(payload) = joined {
            let message = panic_message(payload.as_ref());
            tracing::error!(row, panic = %message, "worker task panicked, aborting run");
            return Err(AppError::numeric(format!("Worker task panicked in row {row}: {message}")));
        }

        for (slot, result) in rx {
            slots[slot] = Some(result);
        }
        Ok(())
    }

    fn solve_series(&self, series: &ChannelSeries) -> TaskResult {
        if series.len() <= 1 {
            return Ok(SolveOutcome::Undefined(DegenerateReason::TooFewSamples));
        }
        let design = DesignModel::build(&self.spec, &series.times, series.offsets.as_deref())?;
        self.solver.estimate_series(&series.values, &design, &self.options)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::f64::consts::PI;

    use super::*;
    use crate::binning::{ObservationBinner, RegularGrid};
    use crate::domain::{Autocorrelation, Observation, PriorScale};
    use crate::error::ErrorKind;

    fn spec() -> CycleSpec {
        CycleSpec::new(
            vec![1.0],
            0.02,
            Autocorrelation::Exponential,
            false,
            0.1,
            PriorScale::default(),
        )
        .unwrap()
    }

    fn binned(observations: &[Observation], channels: usize) -> BinnedGrid {
        let g = RegularGrid::new(0.0, 0.0, 1.0, 1.0, 4, 3, false).unwrap();
        ObservationBinner::new(&g, channels, -999.0, false)
            .bin(observations)
            .unwrap()
            .0
    }

    fn cycle_obs(x: f64, y: f64, amp: f64, n: usize) -> Vec<Observation> {
        (0..n)
            .map(|i| {
                let t = 2.0 * i as f64 / n as f64;
                let v = amp * (2.0 * PI * t).cos() + 0.01 * ((i % 5) as f64 - 2.0);
                Observation::new(t, x, y, vec![v, -v])
            })
            .collect()
    }

    #[test]
    fn progress_is_reported_per_row_in_order() {
        let mut obs = cycle_obs(0.5, 0.5, 1.0, 30);
        obs.extend(cycle_obs(3.5, 2.5, 2.0, 30));
        let grid = binned(&obs, 2);
        let pool = WorkerPool::new(2).unwrap();
        let scheduler = GridScheduler::new(spec(), SolveOptions::default(), -999.0, &pool);

        let mut rows = Vec::new();
        let out = scheduler.run(&grid, |p| rows.push(p)).unwrap();

        assert_eq!(rows.iter().map(|p| p.row).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert!(rows.iter().all(|p| p.tasks == 8));
        assert_eq!(rows[0].solved, 2);
        assert_eq!(rows[2].solved, 2);
        assert_eq!(out.tally.solved, 4);
        assert_eq!(out.tally.undefined, 24 - 4);

        let a = out.amplitude.get(0, CellIndex::new(2, 3));
        assert!((a - 2.0).abs() < 0.15, "amplitude {a}");
        // Second channel is the negated series: same amplitude, phase shifted by π.
        let a1 = out.amplitude.get(1, CellIndex::new(2, 3));
        assert!((a - a1).abs() < 1e-9);
    }

    #[test]
    fn spatial_spec_without_offsets_fails_before_solving() {
        let grid = binned(&cycle_obs(0.5, 0.5, 1.0, 10), 2);
        let spatial = CycleSpec::new(
            vec![1.0],
            0.02,
            Autocorrelation::Eddy,
            true,
            0.1,
            PriorScale::default(),
        )
        .unwrap();
        let pool = WorkerPool::new(1).unwrap();
        let err = GridScheduler::new(spatial, SolveOptions::default(), -999.0, &pool)
            .run(&grid, |_| {})
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    struct PanickingSolver;

    impl LinearSolver for PanickingSolver {
        fn solve(
            &self,
            _a: &nalgebra::DMatrix<f64>,
            _b: &nalgebra::DMatrix<f64>,
        ) -> Result<nalgebra::DMatrix<f64>, AppError> {
            panic!("boom");
        }
    }

    struct FailingSolver;

    impl LinearSolver for FailingSolver {
        fn solve(
            &self,
            _a: &nalgebra::DMatrix<f64>,
            _b: &nalgebra::DMatrix<f64>,
        ) -> Result<nalgebra::DMatrix<f64>, AppError> {
            Err(AppError::numeric("singular"))
        }
    }

    #[test]
    fn task_failure_aborts_the_run() {
        let grid = binned(&cycle_obs(1.5, 1.5, 1.0, 20), 2);
        let pool = WorkerPool::new(4).unwrap();

        let err = GridScheduler::with_solver(
            spec(),
            SolveOptions::default(),
            -999.0,
            &pool,
            GaussMarkov::new(FailingSolver),
        )
        .run(&grid, |_| {})
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Numeric);

        let mut rows_seen = 0;
        let err = GridScheduler::with_solver(
            spec(),
            SolveOptions::default(),
            -999.0,
            &pool,
            GaussMarkov::new(PanickingSolver),
        )
        .run(&grid, |_| rows_seen += 1)
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Numeric);
        assert!(err.to_string().contains("boom"), "{err}");
        // Row 0 has no populated cells, so it completes before the failing row 1.
        assert_eq!(rows_seen, 1);
    }
}
