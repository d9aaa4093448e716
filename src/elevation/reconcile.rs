use super::raster::RasterSource;

/// Stated vertical error of SRTM, in meters.
pub const SRTM_ERROR_M: f64 = 16.0;

/// Pick a node's elevation from its ASTER and SRTM values.
///
/// ASTER is preferred and SRTM fills in when ASTER is missing. When the two
/// disagree by more than SRTM's error and SRTM is strictly closer to the
/// Google value, SRTM wins. The chosen value is truncated to whole meters.
pub fn reconcile(aster: Option<f64>, srtm: Option<f64>, google: Option<f64>) -> Option<(RasterSource, f64)> {
    let (source, value) = match (aster, srtm) {
        (Some(a), Some(s)) => {
            let srtm_closer = google.is_some_and(|g| (s - g).abs() < (a - g).abs());
            if (a - s).abs() > SRTM_ERROR_M && srtm_closer { (RasterSource::Srtm, s) } else { (RasterSource::Aster, a) }
        }
        (Some(a), None) => (RasterSource::Aster, a),
        (None, Some(s)) => (RasterSource::Srtm, s),
        (None, None) => return None,
    };
    Some((source, value.trunc()))
}

/// Every elevation known for one node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElevationRecord {
    pub osmid: i64,
    pub aster: Option<f64>,
    pub srtm: Option<f64>,
    pub google: Option<f64>,
    pub elevation: Option<f64>,
    /// Source of `elevation`.
    pub source: Option<RasterSource>,
}

impl ElevationRecord {
    pub fn new(osmid: i64, aster: Option<f64>, srtm: Option<f64>, google: Option<f64>) -> Self {
        let chosen = reconcile(aster, srtm, google);
        Self {
            osmid,
            aster,
            srtm,
            google,
            elevation: chosen.map(|(_, v)| v),
            source: chosen.map(|(s, _)| s),
        }
    }
}
