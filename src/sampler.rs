use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::segment::Segment;

/// Upper bound on the interior points of a single segment.
pub const MAX_SAMPLES_PER_SEGMENT: usize = 1_000_000;

/// Where a sample sits on its segment.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndMarker {
    Start,
    Interior,
    End,
}

/// A sampled position, as a fraction of the segment's length.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Sample {
    pub index: usize,
    pub fraction: f64,
    pub marker: EndMarker,
}

/// Parameters for sampling points along a segment.
#[derive(Clone, Debug, PartialEq)]
pub struct SamplingParams {
    /// Distance between neighbouring points, either in segment length units
    /// or, with `normalized`, as a fraction of the segment.
    pub distance: f64,

    /// Whether `distance` is already a fraction in `[0, 1]`.
    pub normalized: bool,

    /// Whether to always add both segment ends.
    pub include_ends: bool,

    /// Interior points closer than this fraction to either end are dropped.
    pub end_gap: f64,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            distance: 10.0,
            normalized: false,
            include_ends: true,
            end_gap: 0.001,
        }
    }
}

impl SamplingParams {
    /// Checks the parameters that do not depend on a particular segment.
    pub fn validate(&self) -> Result<(), Error> {
        if !self.distance.is_finite() || self.distance <= 0.0 {
            return Err(Error::param(format!(
                "sampling distance must be a positive number, got {}",
                self.distance
            )));
        }
        if !self.end_gap.is_finite() || self.end_gap < 0.0 || self.end_gap >= 0.5 {
            return Err(Error::param(format!(
                "end gap must be within [0, 0.5), got {}",
                self.end_gap
            )));
        }
        Ok(())
    }
}

/// Samples evenly spaced positions along `segment`.
///
/// Sampling happens in normalized space: the step is `distance / length`
/// and the leftover after the last full step is split evenly between both
/// ends, so the points are centered on the segment.
///
/// # Example
/// ```rust
/// # use streetscape::{sample, EndMarker, Segment, SamplingParams};
/// # use geo::line_string;
/// let street = Segment::new("a", line_string![(x: 0.0, y: 0.0), (x: 100.0, y: 0.0)]);
/// let samples = sample(&street, &SamplingParams::default()).unwrap();
///
/// assert_eq!(samples.len(), 11);
/// assert_eq!(samples[0].marker, EndMarker::Start);
/// assert_eq!(samples[10].fraction, 1.0);
/// ```
pub fn sample(segment: &Segment, params: &SamplingParams) -> Result<Vec<Sample>, Error> {
    params.validate()?;

    // normalized sampling of a zero-length segment would stack every point
    if !segment.length.is_finite() || segment.length <= 0.0 {
        return Err(Error::InvalidGeometry {
            segment_id: segment.id.clone(),
            reason: format!("segment length must be positive, got {}", segment.length),
        });
    }
    let length = if params.normalized { 1.0 } else { segment.length };

    let step = params.distance / length;
    if !step.is_finite() || step <= 0.0 {
        return Err(Error::param(format!(
            "sampling step must be a positive number, got {}",
            step
        )));
    }

    let full_steps = (1.0 / step).floor();
    if full_steps > MAX_SAMPLES_PER_SEGMENT as f64 {
        return Err(Error::param(format!(
            "distance {} yields more than {} points on segment {}",
            params.distance, MAX_SAMPLES_PER_SEGMENT, segment.id
        )));
    }
    let offset = 0.5 * (1.0 - step * full_steps);

    let mut samples = Vec::with_capacity(full_steps as usize + 2);
    let mut push = |fraction: f64, marker: EndMarker| {
        let index = samples.len();
        samples.push(Sample {
            index,
            fraction,
            marker,
        });
    };

    if params.include_ends {
        push(0.0, EndMarker::Start);
    }

    let mut current = offset;
    while current < 1.0 - params.end_gap {
        if current > params.end_gap {
            push(current, EndMarker::Interior);
        }
        current += step;
    }

    if params.include_ends {
        push(1.0, EndMarker::End);
    }

    Ok(samples)
}
