use anyhow::{bail, Context, Result};
use geo::LineString;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use streetscape::{pipeline::Outcome, Segment};

#[derive(Deserialize)]
struct SegmentRecord {
    /// Either a string or a number, e.g. an OSM way id.
    id: serde_json::Value,
    coordinates: Vec<[f64; 2]>,
    length: Option<f64>,
}

pub fn load_segments(path: &Path) -> Result<Vec<Segment>> {
    let raw = fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
    let records: Vec<SegmentRecord> = serde_json::from_slice(&raw)
        .with_context(|| format!("failed parsing segments from {}", path.display()))?;

    records
        .into_iter()
        .enumerate()
        .map(|(i, r)| {
            let id = match r.id {
                serde_json::Value::String(s) => s,
                serde_json::Value::Null => bail!("segment #{} has no id", i),
                other => other.to_string(),
            };
            let geometry = LineString::from(r.coordinates.iter().map(|&[x, y]| (x, y)).collect::<Vec<_>>());

            Ok(match r.length {
                Some(length) => Segment::with_length(id, geometry, length),
                None => Segment::new(id, geometry),
            })
        })
        .collect()
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value).context("failed serializing report")?;
    fs::write(path, json).with_context(|| format!("failed writing {}", path.display()))
}

/// Writes the grid, the observation points and the download manifest next to
/// the images.
pub fn write_reports(output_dir: &Path, outcome: &Outcome) -> Result<()> {
    write_json(&output_dir.join("grid.json"), &outcome.grid)?;
    write_json(&output_dir.join("observations.json"), &outcome.metadata.observations)?;
    write_json(&output_dir.join("manifest.json"), &outcome.requests)?;
    write_json(&output_dir.join("summary.json"), &outcome.summary())
}
