use std::collections::BTreeMap;

use catalog::{CollectionId, CollectionIndex, Point};
use foundation::bounds::GeoBounds;

/// Fetch lifecycle of one collection's point list.
#[derive(Debug, Clone, PartialEq)]
pub enum PointsState {
    /// No fetch has been issued yet.
    Unfetched,
    /// A fetch ticket is outstanding.
    Pending,
    /// Points are attached and immutable for the rest of the session.
    ///
    /// A failed fetch attaches an empty list, so it is never retried.
    Fetched(Vec<Point>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    UnknownCollection,
    NotPending,
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::UnknownCollection => write!(f, "collection not present in the index"),
            StoreError::NotPending => write!(f, "no fetch outstanding for collection"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Session-scoped store of collection metadata and lazily fetched points.
///
/// Keyed in `BTreeMap`s for stable traversal order. Once a collection's
/// points are attached they are read-only; reconcile passes may borrow them
/// freely.
#[derive(Debug)]
pub struct PointStore {
    index: CollectionIndex,
    points: BTreeMap<CollectionId, PointsState>,
}

impl PointStore {
    pub fn new(index: CollectionIndex) -> Self {
        Self {
            index,
            points: BTreeMap::new(),
        }
    }

    pub fn index(&self) -> &CollectionIndex {
        &self.index
    }

    pub fn state(&self, id: &str) -> &PointsState {
        static UNFETCHED: PointsState = PointsState::Unfetched;
        self.points.get(id).unwrap_or(&UNFETCHED)
    }

    pub fn is_fetched(&self, id: &str) -> bool {
        matches!(self.state(id), PointsState::Fetched(_))
    }

    pub fn is_pending(&self, id: &str) -> bool {
        matches!(self.state(id), PointsState::Pending)
    }

    /// The fetched point list, or `None` while unfetched/pending.
    pub fn points(&self, id: &str) -> Option<&[Point]> {
        match self.state(id) {
            PointsState::Fetched(points) => Some(points),
            _ => None,
        }
    }

    /// Marks a collection pending ahead of an issued fetch.
    ///
    /// Returns `false` when no fetch should be issued: already pending,
    /// already fetched, or not in the index at all.
    pub fn begin_fetch(&mut self, id: &str) -> bool {
        if self.index.get(id).is_none() {
            return false;
        }
        match self.state(id) {
            PointsState::Unfetched => {
                self.points.insert(id.to_string(), PointsState::Pending);
                true
            }
            _ => false,
        }
    }

    /// Attaches a settled fetch result.
    ///
    /// An errored fetch attaches an empty list. Attached points are final;
    /// attaching twice is a protocol error.
    pub fn attach(&mut self, id: &str, points: Vec<Point>) -> Result<(), StoreError> {
        match self.points.get_mut(id) {
            Some(state @ PointsState::Pending) => {
                *state = PointsState::Fetched(points);
                Ok(())
            }
            Some(_) => Err(StoreError::NotPending),
            None if self.index.get(id).is_none() => Err(StoreError::UnknownCollection),
            None => Err(StoreError::NotPending),
        }
    }

    /// Collections whose already-fetched points intersect `bounds`.
    ///
    /// Unfetched collections are not candidates; they only come into scope
    /// once something else (single-collection selection) fetches them.
    pub fn collections_intersecting(&self, bounds: &GeoBounds) -> Vec<CollectionId> {
        let mut out = Vec::new();
        for (id, state) in &self.points {
            let PointsState::Fetched(points) = state else {
                continue;
            };
            let hit = points
                .iter()
                .filter_map(|p| p.geo())
                .any(|g| bounds.contains(g));
            if hit {
                out.push(id.clone());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::{PointStore, PointsState};
    use catalog::CollectionIndex;
    use foundation::bounds::GeoBounds;

    fn index() -> CollectionIndex {
        CollectionIndex::from_json(r#"{"114": {"name": "a"}, "205": {"name": "b"}}"#).unwrap()
    }

    fn point(id: &str, lat: f64, lng: f64) -> catalog::Point {
        catalog::decode_points(
            format!(r#"[{{"id": "{id}", "geo": [{lat}, {lng}]}}]"#).as_bytes(),
        )
        .unwrap()
        .remove(0)
    }

    #[test]
    fn begin_fetch_only_once() {
        let mut store = PointStore::new(index());
        assert!(store.begin_fetch("114"));
        assert!(!store.begin_fetch("114"));
        assert!(!store.begin_fetch("nope"));
    }

    #[test]
    fn attach_finalizes_state() {
        let mut store = PointStore::new(index());
        store.begin_fetch("114");
        store.attach("114", vec![point("p", 35.0, 139.0)]).unwrap();

        assert!(store.is_fetched("114"));
        assert_eq!(store.points("114").unwrap().len(), 1);
        assert!(store.attach("114", Vec::new()).is_err());
        assert!(!store.begin_fetch("114"));
    }

    #[test]
    fn attach_requires_pending_fetch() {
        let mut store = PointStore::new(index());
        assert!(store.attach("114", Vec::new()).is_err());
    }

    #[test]
    fn empty_attach_counts_as_fetched() {
        let mut store = PointStore::new(index());
        store.begin_fetch("114");
        store.attach("114", Vec::new()).unwrap();
        assert_eq!(store.state("114"), &PointsState::Fetched(Vec::new()));
    }

    #[test]
    fn intersection_ignores_unfetched_collections() {
        let mut store = PointStore::new(index());
        store.begin_fetch("114");
        store.attach("114", vec![point("p", 35.5, 139.5)]).unwrap();

        let near = GeoBounds::from_corners(35.0, 139.0, 36.0, 140.0);
        let far = GeoBounds::from_corners(40.0, 140.0, 41.0, 141.0);
        assert_eq!(store.collections_intersecting(&near), vec!["114"]);
        assert!(store.collections_intersecting(&far).is_empty());
    }
}
