//! CSV export of a recorded run.
//!
//! - `series.csv`-style file: one row per timestamp, one column per channel. A channel that
//!   lagged at a timestamp gets an empty cell.
//! - `metrics.csv`-style file: `metric,value` summary of the scheduler metrics.

use std::{
    collections::BTreeMap,
    fs::{create_dir_all, File},
    io::{BufWriter, Write},
    path::Path,
};

use csv::Writer;
use log::info;
use serde::Serialize;

use crate::error::ExportError;
use crate::utils::{metrics::SchedulerMetrics, series::LiveSeriesBuffer};

/// Writes the buffer contents to `path`, creating parent directories. Returns the row count.
pub fn export_series_csv(buffer: &LiveSeriesBuffer, path: &Path) -> Result<usize, ExportError> {
    let file = create_file(path)?;
    let rows = write_series(buffer, BufWriter::new(file))?;
    info!("[Export] {} rows written to {}", rows, path.display());
    Ok(rows)
}

/// Writes the series table to any writer.
pub fn write_series<W: Write>(buffer: &LiveSeriesBuffer, writer: W) -> Result<usize, ExportError> {
    let snapshot = buffer.snapshot();
    let channels = snapshot.len();

    let mut table: BTreeMap<u64, Vec<Option<f64>>> = BTreeMap::new();
    for (index, points) in snapshot.iter().enumerate() {
        for &(timestamp, value) in points {
            table.entry(timestamp).or_insert_with(|| vec![None; channels])[index] = Some(value);
        }
    }

    let mut wtr = Writer::from_writer(writer);
    let mut header = vec!["time_ms".to_string()];
    header.extend(buffer.channel_names().iter().cloned());
    wtr.write_record(&header)?;

    for (timestamp, values) in &table {
        let mut record = Vec::with_capacity(channels + 1);
        record.push(timestamp.to_string());
        record.extend(values.iter().map(|v| v.map(|x| x.to_string()).unwrap_or_default()));
        wtr.write_record(&record)?;
    }
    wtr.flush()?;

    Ok(table.len())
}

#[derive(Debug, Serialize)]
struct MetricRow {
    metric: &'static str,
    value: f64,
}

/// Summary of scheduler timing for one run.
pub fn export_metrics_csv(metrics: &SchedulerMetrics, path: &Path) -> Result<(), ExportError> {
    let file = create_file(path)?;
    let mut wtr = Writer::from_writer(BufWriter::new(file));

    let rows = [
        MetricRow { metric: "ticks", value: metrics.ticks as f64 },
        MetricRow { metric: "emitted", value: metrics.emitted as f64 },
        MetricRow { metric: "overruns", value: metrics.overruns as f64 },
        MetricRow { metric: "faults", value: metrics.faults as f64 },
        MetricRow { metric: "max_jitter_us", value: metrics.max_jitter_us as f64 },
        MetricRow { metric: "mean_jitter_us", value: metrics.mean_jitter_us().unwrap_or(0.0) },
    ];
    for row in &rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;

    info!("[Export] metrics summary written to {}", path.display());
    Ok(())
}

fn create_file(path: &Path) -> Result<File, ExportError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        create_dir_all(dir)?;
    }
    Ok(File::create(path)?)
}
