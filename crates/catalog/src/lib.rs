use std::collections::BTreeMap;

use foundation::geo::GeoPoint;
use serde::{Deserialize, Serialize};

/// Identifier of one collection of pilgrimage points.
pub type CollectionId = String;

/// Collection metadata as served by the `index.json` mapping.
///
/// The lazily fetched point list is deliberately not part of this record;
/// it lives in the streaming point store so metadata stays immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    #[serde(default)]
    pub name: String,
    /// Translated display name, when the source provides one.
    #[serde(default)]
    pub name_cn: Option<String>,
    /// Cover thumbnail URL.
    #[serde(default)]
    pub cover: Option<String>,
    /// CSS-style color used for this collection's markers.
    #[serde(default)]
    pub theme_color: Option<String>,
}

impl Collection {
    /// Preferred display name: translated if present, otherwise primary.
    pub fn display_name(&self) -> &str {
        match &self.name_cn {
            Some(cn) if !cn.is_empty() => cn,
            _ => &self.name,
        }
    }
}

/// One geo-tagged pilgrimage location, as served by
/// `pic/data/{collectionId}/points.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub id: String,
    /// `[lat, lng]`. Anything but two finite numbers disqualifies the point
    /// from spatial operations (see [`Point::geo`]).
    #[serde(default)]
    pub geo: Vec<f64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub cn: Option<String>,
    /// Thumbnail image URL.
    #[serde(default)]
    pub image: Option<String>,
    /// Episode number the location appears in.
    #[serde(default)]
    pub ep: Option<u32>,
    /// Timestamp within the episode, seconds.
    #[serde(default)]
    pub s: Option<f64>,
}

impl Point {
    /// The validated coordinate, or `None` for malformed geometry.
    pub fn geo(&self) -> Option<GeoPoint> {
        if self.geo.len() != 2 {
            return None;
        }
        let p = GeoPoint::new(self.geo[0], self.geo[1]);
        if p.is_finite() { Some(p) } else { None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    Malformed(String),
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogError::Malformed(msg) => write!(f, "malformed catalog payload: {msg}"),
        }
    }
}

impl std::error::Error for CatalogError {}

/// In-memory mapping of collection id to metadata.
///
/// The host fetches `index.json` once at startup and hands the body here;
/// the engine only ever consumes the resulting mapping.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionIndex {
    pub entries: BTreeMap<CollectionId, Collection>,
}

impl CollectionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes the `index.json` mapping.
    ///
    /// Individual malformed entries are skipped rather than failing the
    /// whole index; only an unparseable top level is an error.
    pub fn from_json(raw: &str) -> Result<Self, CatalogError> {
        let top: BTreeMap<String, serde_json::Value> =
            serde_json::from_str(raw).map_err(|e| CatalogError::Malformed(e.to_string()))?;

        let mut entries = BTreeMap::new();
        for (id, value) in top {
            if let Ok(meta) = serde_json::from_value::<Collection>(value) {
                entries.insert(id, meta);
            }
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Collection> {
        self.entries.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &CollectionId> {
        self.entries.keys()
    }
}

/// Decodes a `points.json` body into its ordered point list.
pub fn decode_points(raw: &[u8]) -> Result<Vec<Point>, CatalogError> {
    serde_json::from_slice(raw).map_err(|e| CatalogError::Malformed(e.to_string()))
}

/// Host the original dataset serves thumbnails from.
const DEFAULT_IMAGE_HOST: &str = "image.xinu.ink";

/// Rewrites a point image URL against the currently configured API base host.
///
/// Absolute URLs on the default image host move to `api_base`; other absolute
/// URLs pass through untouched; relative paths are rooted at `api_base`.
pub fn rebase_image_url(url: &str, api_base: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        if url.contains(DEFAULT_IMAGE_HOST) {
            return url.replace(DEFAULT_IMAGE_HOST, api_base);
        }
        return url.to_string();
    }

    if url.starts_with('/') {
        format!("https://{api_base}{url}")
    } else {
        format!("https://{api_base}/{url}")
    }
}

#[cfg(test)]
mod tests {
    use super::{CollectionIndex, decode_points, rebase_image_url};
    use pretty_assertions::assert_eq;

    #[test]
    fn index_parses_mapping_and_skips_malformed_entries() {
        let raw = r##"{
            "114": {"name": "Yuru Camp", "name_cn": "", "theme_color": "#aa6622"},
            "bad": 42,
            "205": {"name": "Bocchi the Rock"}
        }"##;
        let index = CollectionIndex::from_json(raw).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.get("114").unwrap().name, "Yuru Camp");
        assert_eq!(index.get("205").unwrap().theme_color, None);
        assert!(index.get("bad").is_none());
    }

    #[test]
    fn index_top_level_must_be_a_mapping() {
        assert!(CollectionIndex::from_json("[1, 2]").is_err());
    }

    #[test]
    fn points_decode_with_optional_fields() {
        let raw = br#"[
            {"id": "p1", "geo": [35.0, 139.0], "image": "pic/a.jpg", "ep": 3, "s": 512.0},
            {"id": "p2", "geo": [35.1, 139.1]}
        ]"#;
        let points = decode_points(raw).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].ep, Some(3));
        assert_eq!(points[1].image, None);
    }

    #[test]
    fn invalid_geometry_is_rejected_by_accessor() {
        let raw = br#"[
            {"id": "ok", "geo": [35.0, 139.0]},
            {"id": "short", "geo": [35.0]},
            {"id": "missing"}
        ]"#;
        let points = decode_points(raw).unwrap();
        assert!(points[0].geo().is_some());
        assert!(points[1].geo().is_none());
        assert!(points[2].geo().is_none());
    }

    #[test]
    fn non_finite_geometry_is_rejected_by_accessor() {
        let mut p = decode_points(br#"[{"id": "p", "geo": [35.0, 139.0]}]"#)
            .unwrap()
            .remove(0);
        p.geo[0] = f64::NAN;
        assert!(p.geo().is_none());
    }

    #[test]
    fn display_name_prefers_translation() {
        let index = CollectionIndex::from_json(
            r#"{"1": {"name": "a", "name_cn": "b"}, "2": {"name": "a", "name_cn": ""}}"#,
        )
        .unwrap();
        assert_eq!(index.get("1").unwrap().display_name(), "b");
        assert_eq!(index.get("2").unwrap().display_name(), "a");
    }

    #[test]
    fn image_urls_rebase_onto_api_host() {
        let base = "maps.example.net";
        assert_eq!(
            rebase_image_url("https://image.xinu.ink/pic/a.jpg", base),
            "https://maps.example.net/pic/a.jpg"
        );
        assert_eq!(
            rebase_image_url("https://elsewhere.example.com/a.jpg", base),
            "https://elsewhere.example.com/a.jpg"
        );
        assert_eq!(
            rebase_image_url("pic/a.jpg", base),
            "https://maps.example.net/pic/a.jpg"
        );
        assert_eq!(
            rebase_image_url("/pic/a.jpg", base),
            "https://maps.example.net/pic/a.jpg"
        );
    }
}
