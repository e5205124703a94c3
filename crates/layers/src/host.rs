use markers::{MarkerHandle, MarkerKey};

/// Marker-layer primitives of the map widget.
///
/// The widget owns the actual rendering and the clustering visuals; the
/// engine only routes attach/detach calls through this capability. The
/// cluster layer is created with an aggregation radius and a zoom level at
/// and above which the widget stops aggregating.
pub trait LayerHost {
    fn add_direct(&mut self, handle: &MarkerHandle);
    fn remove_direct(&mut self, key: &MarkerKey);

    fn create_cluster_layer(&mut self, radius_px: u32, max_zoom: u8);
    /// Tears the cluster layer down, dropping everything attached to it.
    fn teardown_cluster_layer(&mut self);

    fn add_clustered(&mut self, handle: &MarkerHandle);
    fn remove_clustered(&mut self, key: &MarkerKey);
}
