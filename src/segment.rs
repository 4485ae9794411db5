use geo::{Coord, Euclidean, InterpolatableLine, Length, LineString};

use crate::bearing::azimuth;

/// One edge of a street network.
///
/// Coordinates use `x` for longitude and `y` for latitude. The `length` is
/// the scale sampling distances are measured against; it defaults to the
/// planar length of the geometry but can be replaced with a metric length
/// supplied alongside the network.
#[derive(Clone, Debug, PartialEq)]
pub struct Segment {
    pub id: String,
    pub geometry: LineString<f64>,
    pub length: f64,
}

/// Position on a segment resolved from a normalized fraction.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Located {
    pub coord: Coord<f64>,
    /// Azimuth of the piece of the polyline the position lies on.
    pub bearing: f64,
}

impl Segment {
    pub fn new(id: impl Into<String>, geometry: LineString<f64>) -> Self {
        let length = Euclidean.length(&geometry);
        Self {
            id: id.into(),
            geometry,
            length,
        }
    }

    /// Creates a segment whose sampling length differs from the planar
    /// length of its geometry, e.g. meters for a lon/lat polyline.
    pub fn with_length(id: impl Into<String>, geometry: LineString<f64>, length: f64) -> Self {
        Self {
            id: id.into(),
            geometry,
            length,
        }
    }

    /// Maps a fraction in `[0, 1]` onto the polyline by arc length.
    ///
    /// Fractions outside the range are clamped. Returns `None` for an empty
    /// geometry.
    pub fn locate(&self, fraction: f64) -> Option<Located> {
        let fraction = fraction.clamp(0.0, 1.0);

        let coord = if fraction >= 1.0 {
            *self.geometry.0.last()?
        } else {
            self.geometry.point_at_ratio_from_start(&Euclidean, fraction)?.0
        };

        Some(Located {
            coord,
            bearing: self.bearing_at(fraction),
        })
    }

    /// Azimuth of the first non-degenerate piece reaching `fraction`, 0 for a
    /// geometry without extent.
    fn bearing_at(&self, fraction: f64) -> f64 {
        let target = fraction * Euclidean.length(&self.geometry);

        let mut walked = 0.0;
        let mut bearing = 0.0;
        for line in self.geometry.lines() {
            let len = Euclidean.length(&line);
            if len <= 0.0 {
                continue;
            }

            bearing = azimuth(line.start, line.end);
            walked += len;
            if walked >= target {
                break;
            }
        }
        bearing
    }
}
