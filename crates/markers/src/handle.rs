use catalog::{CollectionId, Point};
use foundation::geo::GeoPoint;

/// Registry key of one materialized point: owning collection plus the exact
/// coordinate bits.
///
/// Coordinates are keyed bit-for-bit; two points of one collection at the
/// same coordinate share a key and therefore at most one marker.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MarkerKey {
    pub collection_id: CollectionId,
    lat_bits: u64,
    lng_bits: u64,
}

impl MarkerKey {
    pub fn new(collection_id: &str, geo: GeoPoint) -> Self {
        Self {
            collection_id: collection_id.to_string(),
            lat_bits: geo.lat.to_bits(),
            lng_bits: geo.lng.to_bits(),
        }
    }

    pub fn geo(&self) -> GeoPoint {
        GeoPoint::new(f64::from_bits(self.lat_bits), f64::from_bits(self.lng_bits))
    }
}

/// Materialized on-map representation of one point.
///
/// Carries the data the host's click handler reads (the point record and its
/// owning collection id); rendering the detail view is the host's job.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerHandle {
    pub key: MarkerKey,
    pub point: Point,
}

impl MarkerHandle {
    pub fn new(collection_id: &str, geo: GeoPoint, point: Point) -> Self {
        Self {
            key: MarkerKey::new(collection_id, geo),
            point,
        }
    }

    pub fn collection_id(&self) -> &str {
        &self.key.collection_id
    }

    pub fn image_url(&self) -> Option<&str> {
        self.point.image.as_deref()
    }
}
