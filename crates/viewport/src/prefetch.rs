use foundation::geo::GeoPoint;
use markers::MarkerRegistry;

/// Thumbnail URLs worth prefetching: nearest materialized markers first.
///
/// Distance is the squared degree separation from the viewport center,
/// which is plenty for ordering. Markers without an image
/// are skipped and duplicate URLs collapse to their nearest occurrence.
pub fn nearest_point_images(
    registry: &MarkerRegistry,
    center: GeoPoint,
    count: usize,
) -> Vec<String> {
    let mut candidates: Vec<(f64, &str)> = registry
        .iter()
        .filter_map(|handle| {
            let url = handle.image_url()?;
            Some((handle.key.geo().distance_sq_deg(center), url))
        })
        .collect();
    candidates.sort_by(|(da, ua), (db, ub)| {
        da.partial_cmp(db)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| ua.cmp(ub))
    });

    let mut out: Vec<String> = Vec::new();
    for (_, url) in candidates {
        if out.iter().any(|u| u == url) {
            continue;
        }
        out.push(url.to_string());
        if out.len() >= count {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::nearest_point_images;
    use foundation::geo::GeoPoint;
    use markers::{MarkerHandle, MarkerRegistry};

    fn handle(id: &str, lat: f64, lng: f64, image: Option<&str>) -> MarkerHandle {
        let point = catalog::Point {
            id: id.to_string(),
            geo: vec![lat, lng],
            name: None,
            cn: None,
            image: image.map(str::to_string),
            ep: None,
            s: None,
        };
        MarkerHandle::new("114", GeoPoint::new(lat, lng), point)
    }

    #[test]
    fn nearest_first_and_bounded() {
        let mut registry = MarkerRegistry::new();
        registry.insert(handle("far", 35.0, 140.0, Some("img-far")));
        registry.insert(handle("near", 35.0, 139.1, Some("img-near")));
        registry.insert(handle("mid", 35.0, 139.5, Some("img-mid")));

        let urls = nearest_point_images(&registry, GeoPoint::new(35.0, 139.0), 2);
        assert_eq!(urls, vec!["img-near".to_string(), "img-mid".to_string()]);
    }

    #[test]
    fn imageless_markers_are_skipped() {
        let mut registry = MarkerRegistry::new();
        registry.insert(handle("no-img", 35.0, 139.0, None));
        registry.insert(handle("img", 35.0, 139.9, Some("img-a")));

        let urls = nearest_point_images(&registry, GeoPoint::new(35.0, 139.0), 5);
        assert_eq!(urls, vec!["img-a".to_string()]);
    }

    #[test]
    fn duplicate_urls_collapse() {
        let mut registry = MarkerRegistry::new();
        registry.insert(handle("a", 35.0, 139.1, Some("shared")));
        registry.insert(handle("b", 35.0, 139.2, Some("shared")));

        let urls = nearest_point_images(&registry, GeoPoint::new(35.0, 139.0), 5);
        assert_eq!(urls, vec!["shared".to_string()]);
    }
}
