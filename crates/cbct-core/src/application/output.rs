//! `.scan` result files: one row per detector pixel.

use crate::domain::{CbctError, CbctResult, codes};
use crate::scoring::{KermaScores, ScoringArray};
use crate::serialization::{format_fixed_f64, write_text_artifact};
use crate::transport::ScoringPlane;
use std::path::{Path, PathBuf};

/// Mean kerma per history and its uncertainty in percent. Empty pixels
/// report 100 %.
fn pixel_value(array: &ScoringArray, pixel: usize) -> (f64, f64) {
    let (mean, sigma) = array.current_result(pixel);
    if mean > 0.0 {
        (mean, 100.0 * sigma / mean)
    } else {
        (mean, 100.0)
    }
}

fn push_value(line: &mut String, (value, percent): (f64, f64)) {
    line.push_str(&format!(" {value:>14.6e}"));
    line.push_str(&format_fixed_f64(percent, 9, 3));
}

pub fn render_scan(plane: &ScoringPlane, scores: &KermaScores, histories: u64) -> String {
    let mut text = String::new();
    text.push_str(&format!(
        "# air kerma per history, {histories} histories, {} x {} pixels\n",
        plane.nx(),
        plane.ny()
    ));
    text.push_str("#          x          y          total   d[%]        primary   d[%]        scatter   d[%]\n");
    for pixel in 0..plane.pixels() {
        let (x, y) = plane.pixel_center(pixel);
        let mut line = format!(
            "{}{}",
            format_fixed_f64(x, 12, 4),
            format_fixed_f64(y, 11, 4)
        );
        push_value(&mut line, pixel_value(scores.total(), pixel));
        push_value(&mut line, pixel_value(scores.primary(), pixel));
        push_value(&mut line, pixel_value(scores.scattered(), pixel));
        text.push_str(&line);
        text.push('\n');
    }
    text
}

pub fn scan_path(stem: &Path) -> PathBuf {
    let mut name = stem.as_os_str().to_owned();
    name.push(".scan");
    PathBuf::from(name)
}

pub fn write_scan(
    stem: &Path,
    plane: &ScoringPlane,
    scores: &KermaScores,
    histories: u64,
) -> CbctResult<PathBuf> {
    let path = scan_path(stem);
    write_text_artifact(&path, &render_scan(plane, scores, histories)).map_err(|error| {
        CbctError::io_system(
            codes::IO_OUTPUT_WRITE,
            format!("failed to write scan '{}': {error}", path.display()),
        )
    })?;
    Ok(path)
}
