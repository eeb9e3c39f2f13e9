//! Export grid results to CSV and JSON.
//!
//! The CSV is long-format (one line per cell and channel) so it loads directly
//! into spreadsheets or dataframe tools; the JSON is the full `GridOutput`.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::domain::CellIndex;
use crate::error::AppError;
use crate::grid::GridOutput;

/// Write one row per (cell, channel), including undefined cells.
///
/// Undefined statistics are written as the output's sentinel value.
pub fn write_grid_csv(path: &Path, output: &GridOutput, channel_names: &[String]) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::io(format!("Failed to create export CSV '{}': {e}", path.display())))?;
    let mut w = BufWriter::new(file);
    write_grid_rows(&mut w, output, channel_names)?;
    w.flush()
        .map_err(|e| AppError::io(format!("Failed to flush export CSV '{}': {e}", path.display())))
}

fn write_grid_rows<W: Write>(w: &mut W, output: &GridOutput, channel_names: &[String]) -> Result<(), AppError> {
    let k = output.cycles();
    let v = output.variance_components();

    let mut header = vec!["row", "col", "channel", "count", "mean", "mask"]
        .into_iter()
        .map(String::from)
        .collect::<Vec<_>>();
    for i in 0..k {
        header.push(format!("amp_{i}"));
        header.push(format!("phase_{i}"));
        header.push(format!("amp_err_{i}"));
    }
    header.extend(variance_labels(k, output.spatial_terms).into_iter().map(|l| format!("share_{l}")));

    writeln!(w, "{}", header.join(","))
        .map_err(|e| AppError::io(format!("Failed to write export CSV header: {e}")))?;

    let (ny, nx) = output.shape();
    for row in 0..ny {
        for col in 0..nx {
            let cell = CellIndex::new(row, col);
            for ch in 0..output.channels {
                let name = channel_names
                    .get(ch)
                    .cloned()
                    .unwrap_or_else(|| ch.to_string());
                let mut fields = vec![
                    row.to_string(),
                    col.to_string(),
                    name,
                    format!("{}", output.count.get(ch, cell)),
                    format!("{:.6}", output.mean.get(ch, cell)),
                    format!("{}", output.mask.get(ch, cell)),
                ];
                for i in 0..k {
                    let layer = ch * k + i;
                    fields.push(format!("{:.6}", output.amplitude.get(layer, cell)));
                    fields.push(format!("{:.6}", output.phase.get(layer, cell)));
                    fields.push(format!("{:.6}", output.amplitude_error.get(layer, cell)));
                }
                for i in 0..v {
                    fields.push(format!("{:.6}", output.variance_share.get(ch * v + i, cell)));
                }
                writeln!(w, "{}", fields.join(","))
                    .map_err(|e| AppError::io(format!("Failed to write export CSV row: {e}")))?;
            }
        }
    }
    Ok(())
}

/// Labels of the variance-share components, in layer order.
pub fn variance_labels(cycles: usize, spatial: bool) -> Vec<String> {
    let mut labels = vec!["mean".to_string()];
    labels.extend((0..cycles).map(|i| format!("cycle_{i}")));
    if spatial {
        labels.push("spatial".to_string());
    }
    labels.push("residual".to_string());
    labels
}

/// Write the full output grid as pretty JSON.
pub fn write_grid_json(path: &Path, output: &GridOutput) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::io(format!("Failed to create export JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(BufWriter::new(file), output)
        .map_err(|e| AppError::io(format!("Failed to write export JSON '{}': {e}", path.display())))
}

/// Read a grid previously written by `write_grid_json`.
pub fn read_grid_json(path: &Path) -> Result<GridOutput, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::io(format!("Failed to open grid JSON '{}': {e}", path.display())))?;
    serde_json::from_reader(file)
        .map_err(|e| AppError::input(format!("Invalid grid JSON '{}': {e}", path.display())))
}
