use std::collections::{BTreeMap, BTreeSet};

use crate::handle::{MarkerHandle, MarkerKey};

/// The sole source of truth for materialized markers.
///
/// Keyed in a `BTreeMap` for stable iteration; any ordered view is derived
/// from it on demand rather than kept as a second list.
#[derive(Debug, Default)]
pub struct MarkerRegistry {
    handles: BTreeMap<MarkerKey, MarkerHandle>,
}

impl MarkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn contains(&self, key: &MarkerKey) -> bool {
        self.handles.contains_key(key)
    }

    pub fn get(&self, key: &MarkerKey) -> Option<&MarkerHandle> {
        self.handles.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MarkerHandle> {
        self.handles.values()
    }

    pub fn keys(&self) -> impl Iterator<Item = &MarkerKey> {
        self.handles.keys()
    }

    /// Inserts a handle; refuses a second handle for an existing key.
    pub fn insert(&mut self, handle: MarkerHandle) -> bool {
        if self.handles.contains_key(&handle.key) {
            return false;
        }
        self.handles.insert(handle.key.clone(), handle);
        true
    }

    pub fn remove(&mut self, key: &MarkerKey) -> Option<MarkerHandle> {
        self.handles.remove(key)
    }

    /// Removes and returns every handle whose key is not in `desired`.
    ///
    /// This is the desired-set reconciliation step: the caller detaches the
    /// returned handles from their layers.
    pub fn remove_stale(&mut self, desired: &BTreeSet<MarkerKey>) -> Vec<MarkerHandle> {
        let stale_keys: Vec<MarkerKey> = self
            .handles
            .keys()
            .filter(|k| !desired.contains(*k))
            .cloned()
            .collect();
        stale_keys
            .into_iter()
            .filter_map(|k| self.handles.remove(&k))
            .collect()
    }

    /// Removes and returns everything.
    pub fn drain(&mut self) -> Vec<MarkerHandle> {
        std::mem::take(&mut self.handles).into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::MarkerRegistry;
    use crate::handle::{MarkerHandle, MarkerKey};
    use foundation::geo::GeoPoint;
    use std::collections::BTreeSet;

    fn handle(collection: &str, lat: f64, lng: f64) -> MarkerHandle {
        let point = catalog::Point {
            id: format!("{collection}-{lat}-{lng}"),
            geo: vec![lat, lng],
            name: None,
            cn: None,
            image: None,
            ep: None,
            s: None,
        };
        MarkerHandle::new(collection, GeoPoint::new(lat, lng), point)
    }

    #[test]
    fn at_most_one_handle_per_key() {
        let mut reg = MarkerRegistry::new();
        assert!(reg.insert(handle("114", 35.0, 139.0)));
        assert!(!reg.insert(handle("114", 35.0, 139.0)));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn remove_stale_keeps_only_desired() {
        let mut reg = MarkerRegistry::new();
        let a = handle("114", 35.0, 139.0);
        let b = handle("114", 35.1, 139.1);
        let c = handle("205", 36.0, 140.0);
        let keep: BTreeSet<MarkerKey> = [b.key.clone()].into_iter().collect();

        reg.insert(a);
        reg.insert(b);
        reg.insert(c);

        let removed = reg.remove_stale(&keep);
        assert_eq!(removed.len(), 2);
        assert_eq!(reg.len(), 1);
        assert!(reg.contains(keep.iter().next().unwrap()));
    }

    #[test]
    fn drain_empties_the_registry() {
        let mut reg = MarkerRegistry::new();
        reg.insert(handle("114", 35.0, 139.0));
        let drained = reg.drain();
        assert_eq!(drained.len(), 1);
        assert!(reg.is_empty());
    }
}
