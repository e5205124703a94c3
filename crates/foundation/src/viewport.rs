use crate::bounds::GeoBounds;
use crate::geo::GeoPoint;

/// Snapshot of the map widget's visible state for one engine pass.
///
/// The engine never queries the widget mid-pass; the host captures this once
/// per settle event so a whole pass sees one consistent view.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Viewport {
    pub bounds: GeoBounds,
    pub center: GeoPoint,
    pub zoom: f64,
}

impl Viewport {
    pub fn new(bounds: GeoBounds, center: GeoPoint, zoom: f64) -> Self {
        Self {
            bounds,
            center,
            zoom,
        }
    }
}
