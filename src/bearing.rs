use geo::Coord;

/// Compass azimuth from `from` to `to` in degrees, measured clockwise from
/// north (the positive y axis) and normalized into `[0, 360)`.
///
/// # Example
/// ```rust
/// # use streetscape::azimuth;
/// # use geo::coord;
/// let east = azimuth(coord! { x: 0.0, y: 0.0 }, coord! { x: 1.0, y: 0.0 });
/// assert!((east - 90.0).abs() < 1e-9);
/// ```
pub fn azimuth(from: Coord<f64>, to: Coord<f64>) -> f64 {
    let angle = (to.x - from.x).atan2(to.y - from.y).to_degrees();
    if angle < 0.0 {
        angle + 360.0
    } else {
        angle
    }
}
