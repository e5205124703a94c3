use std::collections::BTreeSet;

use catalog::Point;
use foundation::geo::GeoPoint;
use foundation::pixel::PixelPoint;

/// Coordinate-to-pixel capability of the map widget.
///
/// The engine never reimplements projection math. Projection can be wholly
/// unavailable (widget not laid out yet), in which case density filtering
/// fails open and passes its input through unchanged.
pub trait Projector {
    fn is_available(&self) -> bool;

    /// Projects to container pixel space.
    ///
    /// `None` for a point the widget cannot place right now; the filter
    /// keeps such points rather than dropping them.
    fn project(&self, geo: GeoPoint) -> Option<PixelPoint>;
}

/// Density filter settings as supplied by the host's settings surface.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DensitySettings {
    pub enabled: bool,
    /// Filter intensity, 0–100. Values above 100 are treated as 100.
    pub intensity: u8,
}

impl Default for DensitySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            intensity: 95,
        }
    }
}

const MIN_CELL_PX: f64 = 20.0;
const MAX_CELL_PX: f64 = 200.0;
const CURVE_KNEE: f64 = 50.0;
const LOW_SLOPE_PX: f64 = 1.6;
const HIGH_SLOPE_PX: f64 = 2.0;
const KNEE_CELL_PX: f64 = 100.0;

// Cell size fades linearly toward full density between these zoom levels.
const ZOOM_FADE_START: f64 = 6.0;
const ZOOM_FADE_SPAN: f64 = 9.0;
const ZOOM_FADE_MAX: f64 = 0.8;

// At or above this zoom, filtering only applies to strong settings, and
// those get a pass-local intensity boost.
const HIGH_ZOOM: f64 = 15.0;
const HIGH_ZOOM_MIN_INTENSITY: u8 = 70;
const HIGH_ZOOM_BOOST: u8 = 20;

/// Grid cell size for an intensity, before zoom scaling.
///
/// Two-segment curve: gentle growth up to the knee, steeper above it, so the
/// upper half of the slider thins points much more aggressively.
pub fn base_cell_px(intensity: u8) -> f64 {
    let i = f64::from(intensity.min(100));
    let cell = if i <= CURVE_KNEE {
        MIN_CELL_PX + i * LOW_SLOPE_PX
    } else {
        KNEE_CELL_PX + (i - CURVE_KNEE) * HIGH_SLOPE_PX
    };
    cell.clamp(MIN_CELL_PX, MAX_CELL_PX)
}

fn effective_cell_px(intensity: u8, zoom: f64) -> f64 {
    let fade = ((zoom - ZOOM_FADE_START) / ZOOM_FADE_SPAN).clamp(0.0, 1.0);
    base_cell_px(intensity) * (1.0 - fade * ZOOM_FADE_MAX)
}

/// Reduces `points` to at most one representative per screen-space grid cell.
///
/// Pure function of its inputs: the first point observed per cell wins, and
/// output preserves input order. Points with invalid geometry are dropped;
/// an unavailable projector passes everything through unchanged (fail open,
/// never fail closed). That guard lives here and nowhere else.
pub fn filter_by_density(
    settings: DensitySettings,
    points: &[Point],
    zoom: f64,
    projector: &dyn Projector,
) -> Vec<Point> {
    if !settings.enabled {
        return points.to_vec();
    }
    if !projector.is_available() {
        return points.to_vec();
    }

    let mut intensity = settings.intensity.min(100);
    if zoom >= HIGH_ZOOM {
        if intensity < HIGH_ZOOM_MIN_INTENSITY {
            return points.to_vec();
        }
        // Boost for this pass only; stored settings are never mutated.
        intensity = intensity.saturating_add(HIGH_ZOOM_BOOST).min(100);
    }
    let cell = effective_cell_px(intensity, zoom);

    let mut seen: BTreeSet<(i64, i64)> = BTreeSet::new();
    let mut kept: Vec<Point> = Vec::new();
    for point in points {
        let Some(geo) = point.geo() else {
            continue;
        };
        let Some(px) = projector.project(geo) else {
            // The widget could not place this one point; keep it.
            kept.push(point.clone());
            continue;
        };
        let cell_key = (
            (px.x / cell).floor() as i64,
            (px.y / cell).floor() as i64,
        );
        if seen.insert(cell_key) {
            kept.push(point.clone());
        }
    }
    kept
}
