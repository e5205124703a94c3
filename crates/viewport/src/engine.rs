use std::collections::BTreeSet;

use catalog::{CollectionId, CollectionIndex};
use foundation::time::Time;
use foundation::viewport::Viewport;
use layers::{ClusterConfig, ClusterMode, ClusterModeManager, LayerHost};
use markers::{
    DensitySettings, MarkerHandle, MarkerKey, MarkerRegistry, Projector, filter_by_density,
};
use runtime::budget::SlotBudget;
use runtime::event_bus::{Event, EventBus};
use runtime::scheduler::{PendingPass, ScheduleConfig, ViewportScheduler};
use streaming::{
    Acquire, FetchOutcome, FetchPipeline, FetchTicket, ImageCache, ImageCacheConfig, LoadPriority,
    PointStore,
};

use crate::prefetch::nearest_point_images;

/// Which collections a reconcile pass considers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Every collection with fetched points intersecting the viewport.
    All,
    /// One selected collection, regardless of bounds and zoom.
    Single(CollectionId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// In `All` scope nothing materializes below this zoom.
    pub min_materialize_zoom: f64,
    pub density: DensitySettings,
    pub schedule: ScheduleConfig,
    pub image_cache: ImageCacheConfig,
    /// How many nearest visible thumbnails to request after a pass.
    pub prefetch_count: usize,
    /// Concurrent prefetch load slots handed to the host.
    pub prefetch_slots: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_materialize_zoom: 10.0,
            density: DensitySettings::default(),
            schedule: ScheduleConfig::default(),
            image_cache: ImageCacheConfig::default(),
            prefetch_count: 5,
            prefetch_slots: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub generation: u64,
    pub added: usize,
    pub removed: usize,
    /// Markers on the map after the pass.
    pub total: usize,
    /// Prefetch loads newly queued for the host.
    pub prefetch_planned: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileStatus {
    /// The pass ran to completion; the registry matches the viewport.
    Complete(ReconcileSummary),
    /// The pass is waiting on this many point fetches and resumes when the
    /// host settles them via [`Engine::complete_points_fetch`].
    AwaitingFetches(usize),
    /// A newer generation exists; nothing was done.
    Superseded,
}

/// One settled points fetch, as reported back to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchSettlement {
    pub collection_id: CollectionId,
    pub outcome: FetchOutcome,
    /// Present when this settlement completed the in-flight pass.
    pub finished: Option<ReconcileSummary>,
}

#[derive(Debug, Clone)]
struct ActivePass {
    generation: u64,
    viewport: Viewport,
    scope: Scope,
    outstanding: BTreeSet<CollectionId>,
}

/// The viewport marker management engine.
///
/// Owns the point store, fetch pipeline, image cache, marker registry,
/// cluster manager and scheduler, wired the way the host's event loop drives
/// them: viewport events in, attach/detach calls and fetch/load tickets out.
/// The engine performs no I/O and holds no references to the map widget;
/// the host passes its [`Projector`] and [`LayerHost`] capabilities into
/// each call that needs them.
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    pipeline: FetchPipeline,
    images: ImageCache,
    registry: MarkerRegistry,
    cluster: ClusterModeManager,
    scheduler: ViewportScheduler,
    bus: EventBus,
    pass: Option<ActivePass>,
    current_generation: u64,
    detail_image: Option<String>,
}

impl Engine {
    pub fn new(
        index: CollectionIndex,
        config: EngineConfig,
        cluster_mode: ClusterMode,
        cluster_config: ClusterConfig,
        host: &mut dyn LayerHost,
    ) -> Self {
        let cluster = ClusterModeManager::new(cluster_mode, cluster_config, host);
        Self {
            scheduler: ViewportScheduler::new(config.schedule),
            images: ImageCache::new(config.image_cache),
            pipeline: FetchPipeline::new(index),
            registry: MarkerRegistry::new(),
            cluster,
            bus: EventBus::new(),
            pass: None,
            current_generation: 0,
            detail_image: None,
            config,
        }
    }

    pub fn store(&self) -> &PointStore {
        self.pipeline.store()
    }

    pub fn registry(&self) -> &MarkerRegistry {
        &self.registry
    }

    pub fn cluster(&self) -> &ClusterModeManager {
        &self.cluster
    }

    pub fn images(&self) -> &ImageCache {
        &self.images
    }

    pub fn density(&self) -> DensitySettings {
        self.config.density
    }

    /// Density settings apply from the next pass; nothing rematerializes
    /// until the host schedules one.
    pub fn set_density(&mut self, settings: DensitySettings) {
        self.config.density = settings;
    }

    /// The image shown in the host's open detail view, protected from
    /// cache cleanup while open.
    pub fn set_detail_image(&mut self, url: Option<String>) {
        self.detail_image = url;
    }

    pub fn events(&self) -> &[Event] {
        self.bus.events()
    }

    pub fn drain_events(&mut self) -> Vec<Event> {
        self.bus.drain()
    }

    // ---- viewport events -------------------------------------------------

    pub fn on_move_start(&mut self) {
        self.scheduler.on_move_start();
    }

    /// Returns the generation of the scheduled pass.
    pub fn on_move_end(&mut self, now: Time, zoom: f64) -> u64 {
        self.scheduler.on_move_end(now, zoom)
    }

    /// Hands the host the settled pass once its debounce delay elapses.
    ///
    /// The host captures a [`Viewport`] snapshot and calls
    /// [`Engine::reconcile`] with the pass generation.
    pub fn poll_due_pass(&mut self, now: Time) -> Option<PendingPass> {
        self.scheduler.poll(now)
    }

    // ---- reconciliation --------------------------------------------------

    /// Runs one reconcile pass for `viewport` under `scope`.
    ///
    /// Idempotent per call: the materialized marker set afterwards equals
    /// exactly the filtered, in-bounds point set for this viewport. A pass
    /// that needs unfetched points parks as [`ReconcileStatus::AwaitingFetches`]
    /// and finishes from [`Engine::complete_points_fetch`]; a pass for an
    /// older generation is refused outright.
    pub fn reconcile(
        &mut self,
        viewport: Viewport,
        scope: Scope,
        generation: u64,
        now: Time,
        projector: &dyn Projector,
        host: &mut dyn LayerHost,
    ) -> ReconcileStatus {
        if generation < self.current_generation {
            self.bus
                .emit(now, "reconcile", format!("refused stale generation {generation}"));
            return ReconcileStatus::Superseded;
        }
        // Starting a pass supersedes any pass still gathering fetches.
        self.current_generation = generation;
        self.pass = None;

        if scope == Scope::All && viewport.zoom < self.config.min_materialize_zoom {
            let removed = self.clear_markers(host);
            self.bus.emit(
                now,
                "reconcile",
                format!("zoom {:.1} too coarse, cleared {removed} markers", viewport.zoom),
            );
            return ReconcileStatus::Complete(ReconcileSummary {
                generation,
                added: 0,
                removed,
                total: 0,
                prefetch_planned: 0,
            });
        }

        let candidates = self.candidates(&viewport, &scope);
        let mut outstanding: BTreeSet<CollectionId> = BTreeSet::new();
        for id in &candidates {
            if self.pipeline.store().is_fetched(id) {
                continue;
            }
            if self.pipeline.submit(id).is_some() {
                self.bus.emit(now, "fetch", format!("requested points for {id}"));
                outstanding.insert(id.clone());
            } else if self.pipeline.store().is_pending(id) {
                // An earlier pass already issued the ticket; this pass
                // adopts its completion.
                outstanding.insert(id.clone());
            }
        }

        if !outstanding.is_empty() {
            let waiting = outstanding.len();
            self.pass = Some(ActivePass {
                generation,
                viewport,
                scope,
                outstanding,
            });
            return ReconcileStatus::AwaitingFetches(waiting);
        }

        ReconcileStatus::Complete(self.finish_pass(generation, viewport, &scope, now, projector, host))
    }

    /// Settles a points fetch issued through the pipeline.
    ///
    /// The decoded points always land in the store (the data is immutable
    /// and a later pass will want it), but markers only materialize when the
    /// settlement completes the current generation's pass; a superseded pass
    /// never applies its results.
    pub fn complete_points_fetch(
        &mut self,
        ticket: FetchTicket,
        body: Result<&[u8], ()>,
        now: Time,
        projector: &dyn Projector,
        host: &mut dyn LayerHost,
    ) -> Option<FetchSettlement> {
        let (collection_id, outcome) = self.pipeline.complete(ticket, body)?;
        match &outcome {
            FetchOutcome::Attached(count) => {
                self.bus
                    .emit(now, "fetch", format!("{collection_id}: attached {count} points"));
            }
            FetchOutcome::FailedEmpty => {
                self.bus
                    .emit(now, "fetch", format!("{collection_id}: failed, cached empty list"));
            }
        }

        let pass_drained = match &mut self.pass {
            Some(pass) => {
                pass.outstanding.remove(&collection_id);
                pass.outstanding.is_empty()
            }
            None => false,
        };

        let mut finished = None;
        if pass_drained {
            if let Some(pass) = self.pass.take() {
                finished = Some(self.finish_pass(
                    pass.generation,
                    pass.viewport,
                    &pass.scope,
                    now,
                    projector,
                    host,
                ));
            }
        }

        Some(FetchSettlement {
            collection_id,
            outcome,
            finished,
        })
    }

    /// Hands the host the next points fetch to perform.
    pub fn next_points_fetch(&mut self) -> Option<(FetchTicket, CollectionId)> {
        self.pipeline.next_fetch()
    }

    fn candidates(&self, viewport: &Viewport, scope: &Scope) -> Vec<CollectionId> {
        match scope {
            Scope::All => self
                .pipeline
                .store()
                .collections_intersecting(&viewport.bounds),
            Scope::Single(id) => vec![id.clone()],
        }
    }

    fn finish_pass(
        &mut self,
        generation: u64,
        viewport: Viewport,
        scope: &Scope,
        now: Time,
        projector: &dyn Projector,
        host: &mut dyn LayerHost,
    ) -> ReconcileSummary {
        // Recompute candidates: a just-settled fetch may have brought new
        // collections into scope.
        let candidates = self.candidates(&viewport, scope);

        let mut desired: BTreeSet<MarkerKey> = BTreeSet::new();
        let mut added = 0usize;
        for id in &candidates {
            let filtered = {
                let Some(points) = self.pipeline.store().points(id) else {
                    continue;
                };
                filter_by_density(self.config.density, points, viewport.zoom, projector)
            };
            for point in filtered {
                let Some(geo) = point.geo() else {
                    continue;
                };
                if *scope == Scope::All && !viewport.bounds.contains(geo) {
                    continue;
                }
                let key = MarkerKey::new(id, geo);
                if !desired.insert(key.clone()) {
                    continue;
                }
                if !self.registry.contains(&key) {
                    let handle = MarkerHandle { key, point };
                    self.cluster.add_marker(&handle, host);
                    self.registry.insert(handle);
                    added += 1;
                }
            }
        }

        let stale = self.registry.remove_stale(&desired);
        let removed = stale.len();
        for handle in &stale {
            self.cluster.remove_marker(&handle.key, host);
        }

        let mut prefetch_planned = 0usize;
        if self.scheduler.wants_prefetch(viewport.zoom) {
            let urls =
                nearest_point_images(&self.registry, viewport.center, self.config.prefetch_count);
            for url in urls {
                if self.images.acquire(&url, LoadPriority::Normal) == Acquire::Enqueued {
                    prefetch_planned += 1;
                }
            }
        }

        self.bus.emit(
            now,
            "reconcile",
            format!(
                "generation {generation}: added {added}, removed {removed}, {} on map",
                self.registry.len()
            ),
        );

        ReconcileSummary {
            generation,
            added,
            removed,
            total: self.registry.len(),
            prefetch_planned,
        }
    }

    fn clear_markers(&mut self, host: &mut dyn LayerHost) -> usize {
        self.cluster.detach_all(host);
        self.registry.drain().len()
    }

    // ---- images ----------------------------------------------------------

    /// Requests a thumbnail, e.g. on marker click with high priority.
    pub fn acquire_image(&mut self, url: &str, priority: LoadPriority) -> Acquire {
        self.images.acquire(url, priority)
    }

    /// Hands the host the next image load to perform.
    pub fn next_image_load(&mut self) -> Option<String> {
        self.images.next_load()
    }

    /// Budget for one idle prefetch drain; pair with
    /// [`Engine::next_image_load_with_budget`].
    pub fn prefetch_budget(&self) -> SlotBudget {
        SlotBudget::new(self.config.prefetch_slots)
    }

    pub fn next_image_load_with_budget(&mut self, budget: &mut SlotBudget) -> Option<String> {
        self.images.next_load_with_budget(budget)
    }

    /// Settles an image load the host performed.
    pub fn complete_image_load(&mut self, url: &str, ok: bool, now: Time) -> bool {
        match self.images.complete_load(url, ok) {
            Ok(settled) => {
                if !settled.evicted.is_empty() {
                    self.bus.emit(
                        now,
                        "images",
                        format!("evicted {} for {url}", settled.evicted.len()),
                    );
                }
                settled.cached
            }
            Err(_) => false,
        }
    }

    /// Periodic cache retention pass; the host triggers this on its cleanup
    /// timer (once a minute in the reference host).
    pub fn cleanup_images(&mut self, now: Time) -> Vec<String> {
        let mut protected: BTreeSet<String> = self
            .registry
            .iter()
            .filter_map(|h| h.image_url().map(str::to_string))
            .collect();
        if let Some(url) = &self.detail_image {
            protected.insert(url.clone());
        }
        let evicted = self.images.cleanup(&protected);
        if !evicted.is_empty() {
            self.bus
                .emit(now, "images", format!("cleanup evicted {}", evicted.len()));
        }
        evicted
    }

    // ---- presentation settings -------------------------------------------

    /// Switches cluster mode, dropping every marker for re-add.
    ///
    /// The host schedules a fresh pass afterwards to rematerialize.
    pub fn set_cluster_mode(&mut self, mode: ClusterMode, now: Time, host: &mut dyn LayerHost) {
        if mode == self.cluster.mode() {
            return;
        }
        self.cluster.set_mode(mode, host);
        let dropped = self.registry.drain().len();
        self.bus
            .emit(now, "cluster", format!("mode change dropped {dropped} markers"));
    }

    pub fn set_cluster_radius(&mut self, radius_px: u32, now: Time, host: &mut dyn LayerHost) {
        self.cluster.set_radius(radius_px, host);
        if self.cluster.mode() != ClusterMode::ShowAll {
            let dropped = self.registry.drain().len();
            self.bus
                .emit(now, "cluster", format!("radius change dropped {dropped} markers"));
        }
    }

    pub fn set_cluster_max_zoom(&mut self, max_zoom: u8, now: Time, host: &mut dyn LayerHost) {
        self.cluster.set_max_zoom(max_zoom, host);
        if self.cluster.mode() != ClusterMode::ShowAll {
            let dropped = self.registry.drain().len();
            self.bus
                .emit(now, "cluster", format!("max zoom change dropped {dropped} markers"));
        }
    }
}
