//! Trajectory export.

use std::fmt::Write as _;
use std::path::Path;

use mf_sim::StateBuffer;

use crate::error::{AppError, AppResult};

/// Render a trajectory as CSV: a `time` column then one column per species.
/// Missing samples are written as empty cells.
pub fn trajectory_to_csv(buffer: &StateBuffer) -> String {
    let mut csv = String::from("time");
    for id in buffer.species_ids() {
        csv.push(',');
        csv.push_str(id);
    }
    csv.push('\n');

    for (row, t) in buffer.time().iter().enumerate() {
        let _ = write!(csv, "{}", t);
        for series in buffer.iter_series() {
            csv.push(',');
            if let Some(Some(v)) = series.samples.get(row) {
                let _ = write!(csv, "{}", v);
            }
        }
        csv.push('\n');
    }
    csv
}

pub fn export_csv(path: &Path, buffer: &StateBuffer) -> AppResult<()> {
    std::fs::write(path, trajectory_to_csv(buffer)).map_err(|source| AppError::FileWrite {
        path: path.to_path_buf(),
        source,
    })
}
