use std::collections::BTreeMap;

use foundation::bounds::GeoBounds;
use foundation::geo::GeoPoint;
use markers::{MarkerHandle, MarkerKey};

use crate::host::LayerHost;

/// How markers are presented on the map.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum ClusterMode {
    /// Every marker attaches directly to the map.
    #[default]
    ShowAll,
    /// Every marker attaches to the clustering layer.
    Cluster,
    /// Markers inside a configured dense region cluster; the rest attach
    /// directly.
    Hybrid,
}

/// A geographic box treated as "dense" in hybrid mode.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseRegion {
    pub name: String,
    pub bounds: GeoBounds,
}

impl DenseRegion {
    pub fn new(name: &str, bounds: GeoBounds) -> Self {
        Self {
            name: name.to_string(),
            bounds,
        }
    }
}

/// Metro areas where the source dataset piles up points.
pub fn default_dense_regions() -> Vec<DenseRegion> {
    vec![
        DenseRegion::new("tokyo", GeoBounds::from_corners(35.4981, 139.2773, 35.9009, 139.9707)),
        DenseRegion::new("osaka", GeoBounds::from_corners(34.5731, 135.3831, 34.7691, 135.5881)),
        DenseRegion::new("kyoto", GeoBounds::from_corners(34.9487, 135.6461, 35.1187, 135.8511)),
        DenseRegion::new("nagoya", GeoBounds::from_corners(35.0751, 136.8066, 35.2711, 137.0116)),
        DenseRegion::new("sapporo", GeoBounds::from_corners(42.9751, 141.2461, 43.1711, 141.4511)),
    ]
}

pub const MIN_RADIUS_PX: u32 = 10;
pub const MAX_RADIUS_PX: u32 = 200;
pub const MIN_MAX_ZOOM: u8 = 10;
pub const MAX_MAX_ZOOM: u8 = 18;

/// Clustering configuration as supplied by the host's settings surface.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterConfig {
    /// Aggregation radius in pixels.
    pub radius_px: u32,
    /// Zoom level at and above which the widget stops aggregating.
    pub max_zoom: u8,
    pub dense_regions: Vec<DenseRegion>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            radius_px: 80,
            max_zoom: 15,
            dense_regions: default_dense_regions(),
        }
    }
}

impl ClusterConfig {
    /// Settings arrive from persisted host state; out-of-range values are
    /// clamped rather than rejected.
    pub fn clamped(mut self) -> Self {
        self.radius_px = self.radius_px.clamp(MIN_RADIUS_PX, MAX_RADIUS_PX);
        self.max_zoom = self.max_zoom.clamp(MIN_MAX_ZOOM, MAX_MAX_ZOOM);
        self
    }
}

/// Which layer currently owns a marker.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Attachment {
    Direct,
    Clustered,
}

/// Routes marker attachment between the direct map layer and the clustering
/// layer according to the current mode.
///
/// This is the sole mutator of attachment state. The per-key attachment
/// record guarantees a marker is never on both layers: routing is decided
/// once at attach time and the record names the layer to detach from.
#[derive(Debug)]
pub struct ClusterModeManager {
    mode: ClusterMode,
    config: ClusterConfig,
    attachments: BTreeMap<MarkerKey, Attachment>,
}

impl ClusterModeManager {
    /// Creates the manager and, when the mode calls for it, the clustering
    /// layer.
    pub fn new(mode: ClusterMode, config: ClusterConfig, host: &mut dyn LayerHost) -> Self {
        let config = config.clamped();
        if mode != ClusterMode::ShowAll {
            host.create_cluster_layer(config.radius_px, config.max_zoom);
        }
        Self {
            mode,
            config,
            attachments: BTreeMap::new(),
        }
    }

    pub fn mode(&self) -> ClusterMode {
        self.mode
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn attached_len(&self) -> usize {
        self.attachments.len()
    }

    pub fn attachment(&self, key: &MarkerKey) -> Option<Attachment> {
        self.attachments.get(key).copied()
    }

    pub fn is_in_dense_region(&self, geo: GeoPoint) -> bool {
        self.config.dense_regions.iter().any(|r| r.bounds.contains(geo))
    }

    /// Switches presentation mode, detaching every marker.
    ///
    /// The caller re-adds the handles it still wants afterwards.
    pub fn set_mode(&mut self, mode: ClusterMode, host: &mut dyn LayerHost) {
        if mode == self.mode {
            return;
        }
        self.detach_all(host);
        if self.mode != ClusterMode::ShowAll {
            host.teardown_cluster_layer();
        }
        if mode != ClusterMode::ShowAll {
            host.create_cluster_layer(self.config.radius_px, self.config.max_zoom);
        }
        self.mode = mode;
    }

    /// Changes the aggregation radius; recreates the clustering layer.
    pub fn set_radius(&mut self, radius_px: u32, host: &mut dyn LayerHost) {
        self.config.radius_px = radius_px.clamp(MIN_RADIUS_PX, MAX_RADIUS_PX);
        self.recreate_cluster_layer(host);
    }

    /// Changes the no-aggregation zoom threshold; recreates the clustering
    /// layer.
    pub fn set_max_zoom(&mut self, max_zoom: u8, host: &mut dyn LayerHost) {
        self.config.max_zoom = max_zoom.clamp(MIN_MAX_ZOOM, MAX_MAX_ZOOM);
        self.recreate_cluster_layer(host);
    }

    fn recreate_cluster_layer(&mut self, host: &mut dyn LayerHost) {
        if self.mode == ClusterMode::ShowAll {
            return;
        }
        self.detach_all(host);
        host.teardown_cluster_layer();
        host.create_cluster_layer(self.config.radius_px, self.config.max_zoom);
    }

    /// Attaches a marker to the layer its mode and position call for.
    ///
    /// Attaching an already-attached key is a no-op reporting the existing
    /// attachment.
    pub fn add_marker(&mut self, handle: &MarkerHandle, host: &mut dyn LayerHost) -> Attachment {
        if let Some(existing) = self.attachments.get(&handle.key) {
            return *existing;
        }

        let attachment = match self.mode {
            ClusterMode::ShowAll => Attachment::Direct,
            ClusterMode::Cluster => Attachment::Clustered,
            ClusterMode::Hybrid => {
                if self.is_in_dense_region(handle.key.geo()) {
                    Attachment::Clustered
                } else {
                    Attachment::Direct
                }
            }
        };

        match attachment {
            Attachment::Direct => host.add_direct(handle),
            Attachment::Clustered => host.add_clustered(handle),
        }
        self.attachments.insert(handle.key.clone(), attachment);
        attachment
    }

    /// Detaches a marker from whichever layer owns it.
    pub fn remove_marker(&mut self, key: &MarkerKey, host: &mut dyn LayerHost) -> Option<Attachment> {
        let attachment = self.attachments.remove(key)?;
        match attachment {
            Attachment::Direct => host.remove_direct(key),
            Attachment::Clustered => host.remove_clustered(key),
        }
        Some(attachment)
    }

    /// Detaches everything without changing mode or config.
    pub fn detach_all(&mut self, host: &mut dyn LayerHost) {
        let attachments = std::mem::take(&mut self.attachments);
        for (key, attachment) in attachments {
            match attachment {
                Attachment::Direct => host.remove_direct(&key),
                Attachment::Clustered => host.remove_clustered(&key),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Attachment, ClusterConfig, ClusterMode, ClusterModeManager};
    use crate::host::LayerHost;
    use foundation::geo::GeoPoint;
    use markers::{MarkerHandle, MarkerKey};
    use std::collections::BTreeSet;

    /// Records attachment state the way a real map widget would hold it.
    #[derive(Debug, Default)]
    struct RecordingHost {
        direct: BTreeSet<MarkerKey>,
        clustered: BTreeSet<MarkerKey>,
        cluster_layer: Option<(u32, u8)>,
        cluster_layers_created: usize,
    }

    impl RecordingHost {
        fn attached_to_both(&self) -> bool {
            self.direct.intersection(&self.clustered).next().is_some()
        }
    }

    impl LayerHost for RecordingHost {
        fn add_direct(&mut self, handle: &MarkerHandle) {
            self.direct.insert(handle.key.clone());
        }

        fn remove_direct(&mut self, key: &MarkerKey) {
            self.direct.remove(key);
        }

        fn create_cluster_layer(&mut self, radius_px: u32, max_zoom: u8) {
            self.cluster_layer = Some((radius_px, max_zoom));
            self.cluster_layers_created += 1;
        }

        fn teardown_cluster_layer(&mut self) {
            self.cluster_layer = None;
            self.clustered.clear();
        }

        fn add_clustered(&mut self, handle: &MarkerHandle) {
            self.clustered.insert(handle.key.clone());
        }

        fn remove_clustered(&mut self, key: &MarkerKey) {
            self.clustered.remove(key);
        }
    }

    fn handle(lat: f64, lng: f64) -> MarkerHandle {
        let point = catalog::Point {
            id: format!("p-{lat}-{lng}"),
            geo: vec![lat, lng],
            name: None,
            cn: None,
            image: None,
            ep: None,
            s: None,
        };
        MarkerHandle::new("114", GeoPoint::new(lat, lng), point)
    }

    #[test]
    fn show_all_attaches_directly_without_cluster_layer() {
        let mut host = RecordingHost::default();
        let mut mgr = ClusterModeManager::new(ClusterMode::ShowAll, ClusterConfig::default(), &mut host);

        let h = handle(40.0, 141.0);
        assert_eq!(mgr.add_marker(&h, &mut host), Attachment::Direct);
        assert!(host.cluster_layer.is_none());
        assert!(host.direct.contains(&h.key));
    }

    #[test]
    fn cluster_mode_attaches_to_cluster_layer_only() {
        let mut host = RecordingHost::default();
        let mut mgr = ClusterModeManager::new(ClusterMode::Cluster, ClusterConfig::default(), &mut host);

        let h = handle(40.0, 141.0);
        assert_eq!(mgr.add_marker(&h, &mut host), Attachment::Clustered);
        assert!(!host.attached_to_both());
        assert!(host.clustered.contains(&h.key));
        assert_eq!(host.cluster_layer, Some((80, 15)));
    }

    #[test]
    fn hybrid_routes_by_dense_region() {
        let mut host = RecordingHost::default();
        let mut mgr = ClusterModeManager::new(ClusterMode::Hybrid, ClusterConfig::default(), &mut host);

        // Inside the Tokyo box.
        let tokyo = handle(35.68, 139.76);
        // Rural Tohoku, outside every dense region.
        let rural = handle(39.7, 141.15);

        assert_eq!(mgr.add_marker(&tokyo, &mut host), Attachment::Clustered);
        assert_eq!(mgr.add_marker(&rural, &mut host), Attachment::Direct);
        assert!(!host.attached_to_both());
    }

    #[test]
    fn remove_detaches_from_owning_layer() {
        let mut host = RecordingHost::default();
        let mut mgr = ClusterModeManager::new(ClusterMode::Hybrid, ClusterConfig::default(), &mut host);

        let tokyo = handle(35.68, 139.76);
        let rural = handle(39.7, 141.15);
        mgr.add_marker(&tokyo, &mut host);
        mgr.add_marker(&rural, &mut host);

        assert_eq!(mgr.remove_marker(&tokyo.key, &mut host), Some(Attachment::Clustered));
        assert_eq!(mgr.remove_marker(&rural.key, &mut host), Some(Attachment::Direct));
        assert!(host.direct.is_empty());
        assert!(host.clustered.is_empty());
        assert_eq!(mgr.remove_marker(&rural.key, &mut host), None);
    }

    #[test]
    fn double_add_keeps_single_attachment() {
        let mut host = RecordingHost::default();
        let mut mgr = ClusterModeManager::new(ClusterMode::Cluster, ClusterConfig::default(), &mut host);

        let h = handle(40.0, 141.0);
        mgr.add_marker(&h, &mut host);
        mgr.add_marker(&h, &mut host);
        assert_eq!(mgr.attached_len(), 1);
        assert!(!host.attached_to_both());
    }

    #[test]
    fn mode_switch_detaches_everything_for_readd() {
        let mut host = RecordingHost::default();
        let mut mgr = ClusterModeManager::new(ClusterMode::ShowAll, ClusterConfig::default(), &mut host);

        let h = handle(35.68, 139.76);
        mgr.add_marker(&h, &mut host);

        mgr.set_mode(ClusterMode::Cluster, &mut host);
        assert_eq!(mgr.attached_len(), 0);
        assert!(host.direct.is_empty());
        assert!(host.cluster_layer.is_some());

        // Re-added by the caller, now on the cluster layer; never on both.
        assert_eq!(mgr.add_marker(&h, &mut host), Attachment::Clustered);
        assert!(!host.attached_to_both());

        mgr.set_mode(ClusterMode::ShowAll, &mut host);
        assert!(host.cluster_layer.is_none());
        assert!(host.clustered.is_empty());
    }

    #[test]
    fn radius_change_recreates_cluster_layer() {
        let mut host = RecordingHost::default();
        let mut mgr = ClusterModeManager::new(ClusterMode::Cluster, ClusterConfig::default(), &mut host);
        let h = handle(40.0, 141.0);
        mgr.add_marker(&h, &mut host);

        mgr.set_radius(120, &mut host);
        assert_eq!(host.cluster_layer, Some((120, 15)));
        assert_eq!(host.cluster_layers_created, 2);
        assert_eq!(mgr.attached_len(), 0);
    }

    #[test]
    fn radius_and_max_zoom_are_clamped() {
        let mut host = RecordingHost::default();
        let mut mgr = ClusterModeManager::new(
            ClusterMode::Cluster,
            ClusterConfig {
                radius_px: 500,
                max_zoom: 3,
                ..ClusterConfig::default()
            },
            &mut host,
        );
        assert_eq!(mgr.config().radius_px, 200);
        assert_eq!(mgr.config().max_zoom, 10);

        mgr.set_radius(1, &mut host);
        mgr.set_max_zoom(30, &mut host);
        assert_eq!(mgr.config().radius_px, 10);
        assert_eq!(mgr.config().max_zoom, 18);
    }

    #[test]
    fn show_all_reconfigure_leaves_no_layer_behind() {
        let mut host = RecordingHost::default();
        let mut mgr = ClusterModeManager::new(ClusterMode::ShowAll, ClusterConfig::default(), &mut host);
        mgr.set_radius(120, &mut host);
        assert!(host.cluster_layer.is_none());
        assert_eq!(host.cluster_layers_created, 0);
    }
}
