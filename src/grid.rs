use geo::Coord;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::Error;
use crate::sampler::{sample, EndMarker, SamplingParams};
use crate::segment::Segment;

/// A sampled location along a street segment, awaiting confirmation that
/// imagery exists near it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GridPoint {
    pub segment_id: String,
    /// Unique within the segment, in sampling order.
    pub index: usize,
    pub marker: EndMarker,
    pub fraction: f64,
    pub location: Coord<f64>,
    /// Azimuth of the road at this point, in degrees.
    pub bearing: f64,
}

/// Everything needed to ask the provider for imagery near a grid point.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct MetadataRequest {
    pub location: Coord<f64>,
}

impl GridPoint {
    pub fn metadata_request(&self) -> MetadataRequest {
        MetadataRequest {
            location: self.location,
        }
    }
}

/// A segment the assembler could not sample.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SkippedSegment {
    pub segment_id: String,
    pub reason: String,
}

/// Grid points for a whole network.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Grid {
    pub points: Vec<GridPoint>,
    pub skipped: Vec<SkippedSegment>,
}

/// Samples every segment of a network and resolves the samples into
/// coordinates.
///
/// Invalid parameters abort before any segment is touched. Degenerate
/// segments are skipped and listed in [`Grid::skipped`].
pub fn build_grid(segments: &[Segment], params: &SamplingParams) -> Result<Grid, Error> {
    params.validate()?;

    let mut grid = Grid::default();

    for segment in segments {
        let samples = match sample(segment, params) {
            Ok(samples) => samples,
            Err(Error::InvalidGeometry { segment_id, reason }) => {
                warn!(segment = %segment_id, %reason, "skipping segment");
                grid.skipped.push(SkippedSegment { segment_id, reason });
                continue;
            }
            Err(e) => return Err(e),
        };

        for s in samples {
            let located = match segment.locate(s.fraction) {
                Some(l) => l,
                None => {
                    let reason = "segment has no coordinates".to_owned();
                    warn!(segment = %segment.id, %reason, "skipping segment");
                    grid.skipped.push(SkippedSegment {
                        segment_id: segment.id.clone(),
                        reason,
                    });
                    break;
                }
            };

            grid.points.push(GridPoint {
                segment_id: segment.id.clone(),
                index: s.index,
                marker: s.marker,
                fraction: s.fraction,
                location: located.coord,
                bearing: located.bearing,
            });
        }
    }

    info!(
        points = grid.points.len(),
        skipped = grid.skipped.len(),
        "{} grid points created",
        grid.points.len()
    );

    Ok(grid)
}
