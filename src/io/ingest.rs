//! CSV ingest of drifter observations.
//!
//! Expected layout: a header row with `time`, `x` and `y` columns (any order,
//! case-insensitive) followed by one or more value columns. Every non-position
//! column is a channel unless `channels` names a subset.
//!
//! Row-level problems (unparseable numbers, missing fields) skip the row and
//! are reported; schema problems fail the whole ingest.

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use csv::StringRecord;

use crate::data::parse_time;
use crate::domain::Observation;
use crate::error::AppError;

/// A row-level error encountered during ingest.
#[derive(Debug, Clone)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct IngestedObservations {
    pub observations: Vec<Observation>,
    pub channel_names: Vec<String>,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
}

/// Load observations from a CSV file.
///
/// Empty value fields become `undefined`.
pub fn load_observations(
    path: &Path,
    channels: Option<&[String]>,
    undefined: f64,
) -> Result<IngestedObservations, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::io(format!("Failed to open CSV '{}': {e}", path.display())))?;
    read_observations(file, channels, undefined)
}

pub fn read_observations<R: std::io::Read>(
    reader: R,
    channels: Option<&[String]>,
    undefined: f64,
) -> Result<IngestedObservations, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| AppError::input(format!("Failed to read CSV headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);

    let column = |name: &str| -> Result<usize, AppError> {
        header_map
            .get(name)
            .copied()
            .ok_or_else(|| AppError::input(format!("Missing required column '{name}'.")))
    };
    let (ti, xi, yi) = (column("time")?, column("x")?, column("y")?);

    let channel_cols: Vec<(String, usize)> = match channels {
        Some(names) => names
            .iter()
            .map(|n| {
                header_map
                    .get(&n.to_ascii_lowercase())
                    .map(|&i| (n.clone(), i))
                    .ok_or_else(|| AppError::input(format!("Missing channel column '{n}'.")))
            })
            .collect::<Result<_, _>>()?,
        None => headers
            .iter()
            .enumerate()
            .filter(|(i, _)| ![ti, xi, yi].contains(i))
            .map(|(i, h)| (h.to_string(), i))
            .collect(),
    };
    if channel_cols.is_empty() {
        return Err(AppError::input("No value columns found in CSV."));
    }

    let mut observations = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0;

    for (idx, record) in reader.records().enumerate() {
        // Header is line 1.
        let line = idx + 2;
        rows_read += 1;
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError {
                    line,
                    message: format!("Malformed row: {e}"),
                });
                continue;
            }
        };
        match parse_row(&record, ti, xi, yi, &channel_cols, undefined) {
            Ok(obs) => observations.push(obs),
            Err(e) => row_errors.push(RowError {
                line,
                message: e.to_string(),
            }),
        }
    }

    if !row_errors.is_empty() {
        tracing::warn!(skipped = row_errors.len(), rows = rows_read, "skipped malformed CSV rows");
    }

    Ok(IngestedObservations {
        observations,
        channel_names: channel_cols.into_iter().map(|(n, _)| n).collect(),
        row_errors,
        rows_read,
    })
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(i, h)| (h.trim().to_ascii_lowercase(), i))
        .collect()
}

fn parse_row(
    record: &StringRecord,
    ti: usize,
    xi: usize,
    yi: usize,
    channel_cols: &[(String, usize)],
    undefined: f64,
) -> Result<Observation, AppError> {
    let time = parse_time(field(record, ti, "time")?)?;
    let x = number(record, xi, "x")?;
    let y = number(record, yi, "y")?;
    let values = channel_cols
        .iter()
        .map(|(name, i)| match record.get(*i) {
            None | Some("") => Ok(undefined),
            Some(_) => number(record, *i, name),
        })
        .collect::<Result<Vec<f64>, AppError>>()?;

    Ok(Observation::new(time, x, y, values))
}

fn field<'r>(record: &'r StringRecord, i: usize, name: &str) -> Result<&'r str, AppError> {
    record
        .get(i)
        .ok_or_else(|| AppError::input(format!("Missing field '{name}'.")))
}

fn number(record: &StringRecord, i: usize, name: &str) -> Result<f64, AppError> {
    let s = field(record, i, name)?;
    s.parse::<f64>()
        .map_err(|_| AppError::input(format!("Invalid {name} '{s}'.")))
}
