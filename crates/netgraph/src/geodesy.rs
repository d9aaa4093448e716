//! Great-circle helpers on lon/lat coordinates.

/// Mean earth radius in meters, matching the value used for edge lengths.
pub const EARTH_RADIUS_M: f64 = 6_371_009.0;

/// Great-circle distance in meters between two lon/lat points.
pub fn great_circle(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = phi2 - phi1;
    let d_lambda = (lon2 - lon1).to_radians();

    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    // Clamp against floating point drift above 1.0
    let arc = 2.0 * h.min(1.0).sqrt().asin();
    arc * EARTH_RADIUS_M
}

/// Initial compass bearing in degrees `[0, 360)` from the first point to the second.
pub fn bearing(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_lambda = (lon2 - lon1).to_radians();

    let y = d_lambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * d_lambda.cos();
    (y.atan2(x).to_degrees() + 360.0) % 360.0
}

/// Project lon/lat to local planar meters around a reference latitude
/// (equirectangular). Adequate at city scale for distance thresholds.
pub fn project_local(lon: f64, lat: f64, ref_lat: f64) -> [f64; 2] {
    let k = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;
    [lon * k * ref_lat.to_radians().cos(), lat * k]
}
