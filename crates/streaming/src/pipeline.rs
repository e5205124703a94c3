use std::collections::BTreeMap;

use catalog::{CollectionId, CollectionIndex, decode_points};
use runtime::work_queue::WorkQueue;

use crate::store::PointStore;
use crate::ticket::FetchTicket;

/// Relative path of one collection's point list on the API host.
pub fn points_path(collection_id: &str) -> String {
    format!("pic/data/{collection_id}/points.json")
}

/// How a settled fetch was folded into the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Decoded and attached this many points.
    Attached(usize),
    /// Network or decode failure; an empty list was cached in its place so
    /// the collection is never fetched again this session.
    FailedEmpty,
}

/// Orchestrates lazy point fetches over the store.
///
/// The pipeline performs no I/O: `submit` issues tickets, the host pops them
/// with [`FetchPipeline::next_fetch`], performs the HTTP request, and settles
/// each ticket through [`FetchPipeline::complete`]. At most one ticket exists
/// per collection per session.
#[derive(Debug)]
pub struct FetchPipeline {
    store: PointStore,
    queue: WorkQueue<FetchTicket>,
    pending: BTreeMap<FetchTicket, CollectionId>,
    next_ticket: u64,
}

impl FetchPipeline {
    pub fn new(index: CollectionIndex) -> Self {
        Self {
            store: PointStore::new(index),
            queue: WorkQueue::new(),
            pending: BTreeMap::new(),
            next_ticket: 1,
        }
    }

    pub fn store(&self) -> &PointStore {
        &self.store
    }

    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Requests a fetch of `collection_id`'s points.
    ///
    /// Returns `None` when no fetch is needed (already fetched, already in
    /// flight, or unknown collection), so callers can submit blindly.
    pub fn submit(&mut self, collection_id: &str) -> Option<FetchTicket> {
        if !self.store.begin_fetch(collection_id) {
            return None;
        }
        let ticket = FetchTicket(self.next_ticket);
        self.next_ticket += 1;
        self.queue.push(0, ticket);
        self.pending.insert(ticket, collection_id.to_string());
        Some(ticket)
    }

    /// Hands the host the next fetch to perform, oldest first.
    pub fn next_fetch(&mut self) -> Option<(FetchTicket, CollectionId)> {
        let (_, _, ticket) = self.queue.pop_next()?;
        let id = self.pending.get(&ticket)?.clone();
        Some((ticket, id))
    }

    /// Settles a ticket with the raw response body, or `Err` for any
    /// network/HTTP failure.
    ///
    /// Failures (including malformed bodies) cache an empty point list; the
    /// collection will not be fetched again. Returns `None` for a ticket
    /// that was never issued or has already settled.
    pub fn complete(
        &mut self,
        ticket: FetchTicket,
        body: Result<&[u8], ()>,
    ) -> Option<(CollectionId, FetchOutcome)> {
        let id = self.pending.remove(&ticket)?;

        let (points, outcome) = match body.map(decode_points) {
            Ok(Ok(points)) => {
                let outcome = FetchOutcome::Attached(points.len());
                (points, outcome)
            }
            Ok(Err(_)) | Err(()) => (Vec::new(), FetchOutcome::FailedEmpty),
        };

        // begin_fetch guarantees the store is Pending for this id.
        let _ = self.store.attach(&id, points);
        Some((id, outcome))
    }
}
