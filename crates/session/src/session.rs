//! Session state and its mutation sites.
//!
//! Every mutation of the record collection happens in this file and each one
//! invalidates the filter fact cache and the statistics cache before anything
//! reads them again:
//! - `install` (import, restore, clear)
//! - `commit_relocation`

use boundaries::{BoundaryCache, BoundaryFetcher, GeoPolygonTest};
use catalog::{
    ArchiveResolver, ORIGINAL_RECORDS_KEY, ObjectUrlFactory, RECORDS_KEY, SessionStore,
    StoredBlob, has_diverged_from_import,
};
use foundation::{Granularity, LonLat, RecordId};
use layers::{ClickOutcome, ClusterReconciler, DataMode, MapEngine, MarkerId, RenderPass};
use memories::{
    FilterEngine, FilterState, GeoCounts, MemoryRecord, NormalizedFeature, RecordCollection,
    Statistics, StatsCache, Timing, geo_points, normalize_selection,
};
use runtime::{AppEvent, Debouncer, Event, EventBus, Frame, ModalKind, NoticeLevel, TimerQueue};
use timeline::{TimelinePlayer, entries_for};

use crate::{SessionError, ViewerConfig};

/// Payloads of the session's timers.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SessionTimer {
    PlaybackStep,
    PersistRecords,
}

/// Relocation waiting for its map click.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRelocation {
    pub id: RecordId,
    pub raw_timestamp: Option<String>,
    pub previous: Option<LonLat>,
}

/// What happened while the clock advanced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClockReport {
    pub timeline_steps: usize,
    pub saves: usize,
    pub failed_saves: usize,
}

pub struct Session<E: MapEngine, F: ObjectUrlFactory> {
    config: ViewerConfig,
    collection: RecordCollection,
    filter: FilterState,
    filters: FilterEngine,
    stats: StatsCache,
    reconciler: ClusterReconciler<E>,
    timeline: TimelinePlayer,
    timers: TimerQueue<SessionTimer>,
    persist: Debouncer,
    events: EventBus,
    store: Box<dyn SessionStore>,
    resolver: ArchiveResolver<F>,
    frame: Frame,
    relocation: Option<PendingRelocation>,
    modals: Vec<ModalKind>,
}

impl<E: MapEngine, F: ObjectUrlFactory> Session<E, F> {
    pub fn new(config: ViewerConfig, engine: E, store: Box<dyn SessionStore>, factory: F) -> Self {
        Self {
            reconciler: ClusterReconciler::new(engine, config.cluster.clone()),
            timeline: TimelinePlayer::new(config.timeline.clone()),
            persist: Debouncer::new(config.persistence.debounce_ms),
            resolver: ArchiveResolver::new(config.resolver.clone(), factory),
            config,
            collection: RecordCollection::default(),
            filter: FilterState::new(),
            filters: FilterEngine::new(),
            stats: StatsCache::new(),
            timers: TimerQueue::new(),
            events: EventBus::new(),
            store,
            frame: Frame::default(),
            relocation: None,
            modals: Vec::new(),
        }
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn collection(&self) -> &RecordCollection {
        &self.collection
    }

    pub fn filter(&self) -> &FilterState {
        &self.filter
    }

    pub fn filter_engine(&self) -> &FilterEngine {
        &self.filters
    }

    pub fn stats_cache(&self) -> &StatsCache {
        &self.stats
    }

    pub fn reconciler(&self) -> &ClusterReconciler<E> {
        &self.reconciler
    }

    pub fn engine_mut(&mut self) -> &mut E {
        self.reconciler.engine_mut()
    }

    pub fn timeline(&self) -> &TimelinePlayer {
        &self.timeline
    }

    pub fn resolver(&self) -> &ArchiveResolver<F> {
        &self.resolver
    }

    pub fn store(&self) -> &dyn SessionStore {
        self.store.as_ref()
    }

    pub fn relocation(&self) -> Option<&PendingRelocation> {
        self.relocation.as_ref()
    }

    pub fn now_ms(&self) -> u64 {
        self.timers.now_ms()
    }

    pub fn displayed(&self) -> &[NormalizedFeature] {
        self.reconciler.displayed()
    }

    pub fn events(&self) -> &[Event] {
        self.events.events()
    }

    pub fn drain_events(&mut self) -> Vec<Event> {
        self.events.drain()
    }

    pub fn is_persist_pending(&self) -> bool {
        self.persist.is_pending(&self.timers)
    }

    /// Armed playback and persistence timers.
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    // --- lifecycle ---

    /// Imports an export: photos plus the records document. The document is
    /// stored twice so later edits can be detected against the original.
    pub fn import(
        &mut self,
        records_json: Vec<u8>,
        media: Vec<(String, StoredBlob)>,
    ) -> Result<usize, SessionError> {
        let records: Vec<MemoryRecord> = serde_json::from_slice(&records_json)
            .map_err(|e| SessionError::Decode(e.to_string()))?;

        self.resolver.clear();
        for (path, blob) in media {
            self.store.save(&path, blob.clone())?;
            self.resolver.insert(path, blob);
        }
        self.store.save(
            ORIGINAL_RECORDS_KEY,
            StoredBlob::json(ORIGINAL_RECORDS_KEY, records_json.clone()),
        )?;
        self.store
            .save(RECORDS_KEY, StoredBlob::json(RECORDS_KEY, records_json))?;

        let count = records.len();
        self.install(records)?;
        tracing::info!(records = count, photos = self.resolver.file_count(), "session imported");
        Ok(count)
    }

    /// Reopens a stored session. `Ok(false)` when the store holds none.
    pub fn restore(&mut self) -> Result<bool, SessionError> {
        let Some(blob) = self.store.load(RECORDS_KEY)? else {
            return Ok(false);
        };
        let records: Vec<MemoryRecord> = serde_json::from_slice(&blob.bytes)
            .map_err(|e| SessionError::Decode(e.to_string()))?;
        let photos = self.resolver.reload_from_store(self.store.as_ref())?;
        let count = records.len();
        self.install(records)?;
        tracing::info!(records = count, photos, "session restored");
        Ok(true)
    }

    /// Logs out: timers, markers, URLs, store and records are all dropped.
    pub fn clear(&mut self) -> Result<(), SessionError> {
        self.persist.cancel(&mut self.timers);
        self.timeline.close(&mut self.timers);
        self.relocation = None;
        self.modals.clear();
        self.reconciler.clear()?;
        self.resolver.clear();
        self.store.clear()?;
        self.collection.clear();
        self.filters.invalidate();
        self.stats.invalidate();
        self.filter.reset();
        tracing::info!("session cleared");
        Ok(())
    }

    /// The working collection as JSON, as it would be written to the store.
    pub fn export(&self) -> Result<Vec<u8>, SessionError> {
        self.collection
            .to_json_bytes()
            .map_err(|e| SessionError::Encode(e.to_string()))
    }

    /// Whether the working collection differs from the imported original.
    pub fn has_unexported_changes(&self) -> Result<bool, SessionError> {
        if !self.is_persist_pending() {
            return Ok(has_diverged_from_import(self.store.as_ref())?);
        }
        let Some(original) = self.store.load(ORIGINAL_RECORDS_KEY)? else {
            return Ok(false);
        };
        Ok(original.bytes != self.export()?)
    }

    fn install(&mut self, records: Vec<MemoryRecord>) -> Result<(), SessionError> {
        self.persist.cancel(&mut self.timers);
        self.timeline.close(&mut self.timers);
        self.relocation = None;
        self.collection.replace(records);
        self.filters.invalidate();
        self.stats.invalidate();
        let selection = self.filters.apply(&self.collection, &self.filter);
        self.push_selection(&selection, DataMode::Rebuild)
    }

    // --- display ---

    fn filter_mode(&self) -> DataMode {
        if self.reconciler.has_source() {
            DataMode::Swap
        } else {
            DataMode::Rebuild
        }
    }

    fn push_selection(&mut self, selection: &[usize], mode: DataMode) -> Result<(), SessionError> {
        let facts = self.filters.facts(&self.collection);
        let features = normalize_selection(&self.collection, selection, facts, &mut self.resolver);
        self.reconciler.set_data(features, mode)?;
        Ok(())
    }

    fn render_timeline(&mut self) -> Result<(), SessionError> {
        let visible = self.timeline.visible();
        self.push_selection(&visible, DataMode::Swap)
    }

    fn render_current(&mut self) -> Result<(), SessionError> {
        if self.timeline.is_open() {
            return self.render_timeline();
        }
        let selection = self.filters.apply(&self.collection, &self.filter);
        let mode = self.filter_mode();
        self.push_selection(&selection, mode)
    }

    /// Render tick from the map engine.
    pub fn on_render(&mut self, time_ms: u64) -> RenderPass {
        self.frame = self.frame.next(time_ms);
        self.reconciler.on_render(self.frame)
    }

    pub fn on_zoom_end(&mut self) -> Result<bool, SessionError> {
        Ok(self.reconciler.on_zoom_end()?)
    }

    // --- filters ---

    /// Re-applies the current filters. Returns the filtered record count.
    pub fn apply_filters(&mut self) -> Result<usize, SessionError> {
        let selection = self.filters.apply(&self.collection, &self.filter);
        if self.timeline.is_open() {
            let entries = entries_for(&selection, self.filters.facts(&self.collection));
            self.timeline.on_filters_changed(entries, &mut self.timers);
            self.render_timeline()?;
        } else {
            let mode = self.filter_mode();
            self.push_selection(&selection, mode)?;
        }
        Ok(selection.len())
    }

    pub fn toggle_year(&mut self, year: &str) -> Result<usize, SessionError> {
        self.filter.toggle_year(year);
        self.apply_filters()
    }

    pub fn toggle_month(&mut self, month0: u32) -> Result<usize, SessionError> {
        self.filter.toggle_month(month0);
        self.apply_filters()
    }

    pub fn select_timing(&mut self, timing: Timing) -> Result<usize, SessionError> {
        self.filter.select_timing(timing);
        self.apply_filters()
    }

    pub fn reset_filters(&mut self) -> Result<usize, SessionError> {
        self.filter.reset();
        self.apply_filters()
    }

    pub fn available_years(&mut self) -> Vec<String> {
        self.filters.available_years(&self.collection)
    }

    // --- timeline ---

    /// Opens the player on the filtered records. `Ok(false)` with no records.
    pub fn open_timeline(&mut self) -> Result<bool, SessionError> {
        if self.collection.is_empty() {
            return Ok(false);
        }
        let selection = self.filters.apply(&self.collection, &self.filter);
        let entries = entries_for(&selection, self.filters.facts(&self.collection));
        self.timeline.open(entries, &mut self.timers);
        self.render_timeline()?;
        Ok(true)
    }

    /// Stops playback and shows the whole filtered set again.
    pub fn close_timeline(&mut self) -> Result<(), SessionError> {
        if !self.timeline.is_open() {
            return Ok(());
        }
        self.timeline.close(&mut self.timers);
        self.render_current()
    }

    pub fn seek_timeline(&mut self, index: usize) -> Result<usize, SessionError> {
        let cursor = self.timeline.seek(index);
        if self.timeline.is_open() {
            self.render_timeline()?;
        }
        Ok(cursor)
    }

    /// Play/pause button. Returns `true` when playback is running afterwards.
    pub fn toggle_play(&mut self) -> Result<bool, SessionError> {
        let playing = self
            .timeline
            .toggle_play(&mut self.timers, SessionTimer::PlaybackStep);
        if playing {
            self.render_timeline()?;
        }
        Ok(playing)
    }

    pub fn set_timeline_speed(&mut self, speed: u32) -> bool {
        self.timeline
            .set_speed(speed, &mut self.timers, SessionTimer::PlaybackStep)
    }

    pub fn set_timeline_granularity(&mut self, granularity: Granularity) -> Result<bool, SessionError> {
        if !self.timeline.set_granularity(granularity) {
            return Ok(false);
        }
        if self.timeline.is_open() {
            self.render_timeline()?;
        }
        Ok(true)
    }

    // --- modals ---

    pub fn open_modal(&mut self, kind: ModalKind) {
        if !self.modals.contains(&kind) {
            self.modals.push(kind);
        }
        self.events.emit(self.frame, AppEvent::ModalOpen(kind));
        self.timeline.suspend(&mut self.timers);
    }

    /// The player resumes once no modal is left open.
    pub fn close_modal(&mut self, kind: ModalKind) {
        self.modals.retain(|k| *k != kind);
        self.events.emit(self.frame, AppEvent::ModalClose(kind));
        if self.modals.is_empty() {
            self.timeline
                .resume(&mut self.timers, SessionTimer::PlaybackStep);
        }
    }

    // --- clicks ---

    /// Marker click. While relocating, markers do not react.
    pub fn on_marker_click(&mut self, id: &MarkerId) -> Result<ClickOutcome, SessionError> {
        if self.relocation.is_some() {
            return Ok(ClickOutcome::Ignored);
        }
        let outcome = self.reconciler.on_marker_click(id)?;
        if matches!(outcome, ClickOutcome::OpenViewer(_)) {
            self.open_modal(ModalKind::PhotoViewer);
        }
        Ok(outcome)
    }

    /// Click on the map background; commits a pending relocation.
    pub fn on_map_click(&mut self, position: LonLat) -> Result<Option<usize>, SessionError> {
        if self.relocation.is_none() {
            return Ok(None);
        }
        self.commit_relocation(position).map(Some)
    }

    // --- relocation ---

    /// Enters relocation mode for the feature shown in the viewer.
    pub fn start_relocation(&mut self, feature: &NormalizedFeature) {
        let previous = self
            .collection
            .locate(&feature.id, feature.raw_timestamp.as_deref())
            .and_then(|i| self.collection.get(i))
            .and_then(|r| r.location.as_ref().map(|_| r.coordinates()));
        let pending = PendingRelocation {
            id: feature.id.clone(),
            raw_timestamp: feature.raw_timestamp.clone(),
            previous,
        };
        self.events.emit(
            self.frame,
            AppEvent::RelocationStart {
                id: pending.id.clone(),
                raw_timestamp: pending.raw_timestamp.clone(),
                previous,
            },
        );
        self.relocation = Some(pending);
        if self.modals.contains(&ModalKind::PhotoViewer) {
            self.close_modal(ModalKind::PhotoViewer);
        }
    }

    pub fn cancel_relocation(&mut self) -> bool {
        if self.relocation.take().is_none() {
            return false;
        }
        self.events.emit(self.frame, AppEvent::RelocationCancelled);
        true
    }

    /// Moves the pending record to `position`: optimistic in memory and on
    /// the map, persisted after the debounce delay. Returns the record index.
    pub fn commit_relocation(&mut self, position: LonLat) -> Result<usize, SessionError> {
        let Some(pending) = self.relocation.clone() else {
            return Err(SessionError::NoRelocationPending);
        };
        let Some(index) = self
            .collection
            .locate(&pending.id, pending.raw_timestamp.as_deref())
        else {
            tracing::warn!(id = pending.id.as_str(), "relocation target not found");
            self.events.notice(
                self.frame,
                NoticeLevel::Error,
                "Impossible de retrouver ce BeReal",
            );
            return Err(SessionError::RelocationTargetMissing(pending.id));
        };

        self.collection.relocate(index, position);
        self.filters.invalidate();
        self.stats.invalidate();
        self.relocation = None;

        self.persist
            .trigger(&mut self.timers, SessionTimer::PersistRecords);
        self.render_current()?;

        self.events.emit(
            self.frame,
            AppEvent::RelocationCommitted {
                id: pending.id,
                position,
            },
        );
        self.events
            .notice(self.frame, NoticeLevel::Success, "Position mise à jour");
        Ok(index)
    }

    // --- timers and persistence ---

    /// Runs every timer due up to `until_ms`, in order.
    pub fn advance_clock(&mut self, until_ms: u64) -> Result<ClockReport, SessionError> {
        let mut report = ClockReport::default();
        while let Some(fired) = self.timers.pop_due(until_ms) {
            match fired.payload {
                SessionTimer::PlaybackStep => {
                    if self.timeline.on_timer(&mut self.timers, fired.id).is_some() {
                        self.render_timeline()?;
                        report.timeline_steps += 1;
                    }
                }
                SessionTimer::PersistRecords => {
                    if self.persist.settle(fired.id) {
                        if self.persist_now() {
                            report.saves += 1;
                        } else {
                            report.failed_saves += 1;
                        }
                    }
                }
            }
        }
        Ok(report)
    }

    /// Writes a pending save immediately. `false` if nothing was pending.
    pub fn flush(&mut self) -> bool {
        if !self.persist.cancel(&mut self.timers) {
            return false;
        }
        self.persist_now()
    }

    /// A failed write keeps the in-memory state and tells the user.
    fn persist_now(&mut self) -> bool {
        let result = self
            .export()
            .and_then(|bytes| Ok(self.store.save(RECORDS_KEY, StoredBlob::json(RECORDS_KEY, bytes))?));
        match result {
            Ok(()) => {
                tracing::debug!(records = self.collection.len(), "records persisted");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to persist records");
                self.events.notice(
                    self.frame,
                    NoticeLevel::Warning,
                    "Modification non sauvegardée : elle sera perdue au rechargement",
                );
                false
            }
        }
    }

    // --- statistics ---

    /// Dashboard statistics over the whole collection, cached until the next
    /// mutation. Boundary datasets come from the shared `boundaries` cache.
    pub async fn statistics<B: BoundaryFetcher>(&mut self, boundaries: &BoundaryCache<B>) -> Statistics {
        let version = self.collection.version();
        if let Some(stats) = self.stats.get(version) {
            return stats.clone();
        }
        let points = geo_points(self.collection.records());
        let attribution = boundaries.attribute(&points, &GeoPolygonTest).await;
        let geo = GeoCounts {
            countries: attribution.country_count(),
            regions: attribution.region_count(),
        };
        let stats = Statistics::compute(self.collection.records(), geo);
        self.stats.store(version, stats).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boundaries::{BoundaryConfig, BoxFuture, FetchError};
    use catalog::{ContentUrlFactory, InMemorySessionStore, StoreError};
    use layers::InMemoryMapEngine;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::rc::Rc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type TestSession = Session<InMemoryMapEngine, ContentUrlFactory>;

    /// Store that logs writes and can be switched to failing.
    #[derive(Default)]
    struct SharedStore {
        inner: InMemorySessionStore,
        saves: Rc<RefCell<Vec<String>>>,
        fail_writes: Rc<RefCell<bool>>,
    }

    impl SessionStore for SharedStore {
        fn save(&mut self, key: &str, blob: StoredBlob) -> Result<(), StoreError> {
            if *self.fail_writes.borrow() {
                return Err(StoreError::StorageUnavailable);
            }
            self.saves.borrow_mut().push(key.to_string());
            self.inner.save(key, blob)
        }
        fn load(&self, key: &str) -> Result<Option<StoredBlob>, StoreError> {
            self.inner.load(key)
        }
        fn load_all(&self) -> Result<BTreeMap<String, StoredBlob>, StoreError> {
            self.inner.load_all()
        }
        fn clear(&mut self) -> Result<(), StoreError> {
            self.inner.clear()
        }
    }

    const RECORDS: &str = r#"[
        {"uid":"a","takenTime":"2023-03-01T10:00:00Z","berealMoment":"m1","isLate":false,
         "location":{"latitude":48.85,"longitude":2.35},"frontImage":{"path":"/Photos/post/a.webp"}},
        {"uid":"b","takenTime":"2024-01-01T10:00:00Z","berealMoment":"m2","isLate":true,
         "location":{"latitude":45.76,"longitude":4.83}},
        {"uid":"c","takenTime":"2024-01-05T10:00:00Z","berealMoment":"m3","isLate":false},
        {"takenTime":"2024-02-01T10:00:00Z","berealMoment":"m3","isLate":false,
         "location":{"latitude":43.6,"longitude":1.44}}
    ]"#;

    fn session_with(store: SharedStore) -> TestSession {
        Session::new(
            ViewerConfig::default(),
            InMemoryMapEngine::default(),
            Box::new(store),
            ContentUrlFactory::new(),
        )
    }

    fn imported() -> (TestSession, Rc<RefCell<Vec<String>>>, Rc<RefCell<bool>>) {
        let store = SharedStore::default();
        let saves = Rc::clone(&store.saves);
        let fail = Rc::clone(&store.fail_writes);
        let mut s = session_with(store);
        let photo = StoredBlob::new("a.webp", "image/webp", vec![1, 2, 3]);
        s.import(
            RECORDS.as_bytes().to_vec(),
            vec![("Photos/post/a.webp".to_string(), photo)],
        )
        .unwrap();
        saves.borrow_mut().clear();
        (s, saves, fail)
    }

    fn feature(s: &TestSession, id: &str) -> NormalizedFeature {
        s.displayed()
            .iter()
            .find(|f| f.id.as_str() == id)
            .cloned()
            .unwrap()
    }

    #[test]
    fn import_builds_source_and_keeps_original_copy() {
        let (s, _, _) = imported();
        assert_eq!(s.displayed().len(), 4);
        assert!(s.reconciler().has_source());
        assert!(s.store().load(ORIGINAL_RECORDS_KEY).unwrap().is_some());
        assert!(!s.has_unexported_changes().unwrap());
        assert!(feature(&s, "a").front.starts_with("blob:"));
        assert!(feature(&s, "c").can_be_relocated);
    }

    #[test]
    fn invalid_document_is_rejected_before_anything_is_stored() {
        let store = SharedStore::default();
        let saves = Rc::clone(&store.saves);
        let mut s = session_with(store);
        let err = s.import(b"{\"not\":\"a list\"}".to_vec(), Vec::new()).unwrap_err();
        assert!(matches!(err, SessionError::Decode(_)));
        assert!(saves.borrow().is_empty());
    }

    #[test]
    fn filters_swap_data_without_rebuilding() {
        let (mut s, _, _) = imported();
        assert_eq!(s.toggle_year("2024").unwrap(), 3);
        assert_eq!(s.displayed().len(), 3);
        assert_eq!(s.select_timing(Timing::Bonus).unwrap(), 1);
        assert_eq!(s.displayed()[0].raw_timestamp.as_deref(), Some("2024-02-01T10:00:00Z"));
        let counters = s.reconciler().engine().counters();
        assert_eq!(counters.sources_added, 1);
        assert_eq!(counters.data_swaps, 2);
        assert_eq!(s.reset_filters().unwrap(), 4);
        assert_eq!(s.available_years(), vec!["2023", "2024"]);
    }

    #[test]
    fn relocation_moves_record_invalidates_and_persists_after_debounce() {
        let (mut s, saves, _) = imported();
        let target = feature(&s, "c");
        s.apply_filters().unwrap();
        let before = s.filter_engine().recomputations();

        s.start_relocation(&target);
        assert!(matches!(
            s.events().last().map(|e| &e.event),
            Some(AppEvent::RelocationStart { previous: None, .. })
        ));
        let index = s.on_map_click(LonLat::new(2.35, 48.85)).unwrap();
        assert_eq!(index, Some(2));

        assert!(!feature(&s, "c").can_be_relocated);
        assert_eq!(feature(&s, "c").coordinates, LonLat::new(2.35, 48.85));
        assert_eq!(s.filter_engine().recomputations(), before + 1);
        assert!(s.stats_cache().is_empty());
        assert!(s.relocation().is_none());
        assert!(s.has_unexported_changes().unwrap());

        assert_eq!(s.advance_clock(999).unwrap().saves, 0);
        assert!(saves.borrow().is_empty());
        assert_eq!(s.advance_clock(1_000).unwrap().saves, 1);
        assert_eq!(*saves.borrow(), vec![RECORDS_KEY.to_string()]);
        assert!(s.has_unexported_changes().unwrap());
    }

    #[test]
    fn rapid_relocations_coalesce_into_one_write() {
        let (mut s, saves, _) = imported();
        for (t, lon) in [(0, 1.0), (400, 2.0), (800, 3.0)] {
            s.advance_clock(t).unwrap();
            let target = feature(&s, "b");
            s.start_relocation(&target);
            s.commit_relocation(LonLat::new(lon, 45.0)).unwrap();
        }
        let report = s.advance_clock(10_000).unwrap();
        assert_eq!(report.saves, 1);
        assert_eq!(saves.borrow().len(), 1);
        let stored = s.store().load(RECORDS_KEY).unwrap().unwrap();
        assert_eq!(stored.bytes, s.export().unwrap());
    }

    #[test]
    fn relocation_falls_back_to_timestamp_identity() {
        let (mut s, _, _) = imported();
        let mut target = feature(&s, "2024-02-01T10:00:00Z");
        target.id = RecordId::new("");
        s.start_relocation(&target);
        assert_eq!(s.commit_relocation(LonLat::new(5.0, 45.0)).unwrap(), 3);
    }

    #[test]
    fn missing_relocation_target_is_reported_and_mode_stays_active() {
        let (mut s, _, _) = imported();
        let mut ghost = feature(&s, "a");
        ghost.id = RecordId::new("ghost");
        ghost.raw_timestamp = Some("1999-01-01T00:00:00Z".to_string());
        s.start_relocation(&ghost);

        let err = s.commit_relocation(LonLat::new(1.0, 1.0)).unwrap_err();
        assert_eq!(err, SessionError::RelocationTargetMissing(RecordId::new("ghost")));
        assert!(s.relocation().is_some());
        assert!(matches!(
            s.events().last().map(|e| &e.event),
            Some(AppEvent::Notice { level: NoticeLevel::Error, .. })
        ));
        assert!(s.cancel_relocation());
        assert_eq!(
            s.commit_relocation(LonLat::new(1.0, 1.0)),
            Err(SessionError::NoRelocationPending)
        );
    }

    #[test]
    fn failed_write_keeps_optimistic_state_and_warns() {
        let (mut s, _, fail) = imported();
        *fail.borrow_mut() = true;
        let target = feature(&s, "b");
        s.start_relocation(&target);
        s.commit_relocation(LonLat::new(7.0, 47.0)).unwrap();
        let report = s.advance_clock(5_000).unwrap();
        assert_eq!(report.failed_saves, 1);
        assert_eq!(feature(&s, "b").coordinates, LonLat::new(7.0, 47.0));
        assert!(s.events().iter().any(|e| matches!(
            e.event,
            AppEvent::Notice { level: NoticeLevel::Warning, .. }
        )));
    }

    #[test]
    fn markers_ignore_clicks_while_relocating() {
        let (mut s, _, _) = imported();
        let pass = s.on_render(16);
        assert!(!pass.added.is_empty());
        let target = feature(&s, "b");
        s.start_relocation(&target);
        assert_eq!(s.on_marker_click(&pass.added[0]).unwrap(), ClickOutcome::Ignored);
    }

    #[test]
    fn timeline_steps_through_buckets_with_data_swaps() {
        let (mut s, _, _) = imported();
        assert!(s.open_timeline().unwrap());
        assert_eq!(s.timeline().buckets().len(), 4);
        assert_eq!(s.displayed().len(), 1);

        assert!(s.toggle_play().unwrap());
        let report = s.advance_clock(180 * 3).unwrap();
        assert_eq!(report.timeline_steps, 3);
        assert_eq!(s.displayed().len(), 4);
        assert!(!s.timeline().is_playing());
        assert_eq!(s.reconciler().engine().counters().sources_added, 1);

        s.close_timeline().unwrap();
        assert!(!s.timeline().is_open());
        assert_eq!(s.displayed().len(), 4);
    }

    #[test]
    fn reopening_a_playing_timeline_leaves_no_timer_behind() {
        let (mut s, _, _) = imported();
        s.open_timeline().unwrap();
        s.toggle_play().unwrap();
        assert!(s.open_timeline().unwrap());
        assert!(!s.timeline().is_playing());
        assert_eq!(s.timeline().timer_id(), None);
        assert_eq!(s.pending_timers(), 0);
        assert_eq!(s.advance_clock(10_000).unwrap().timeline_steps, 0);

        assert!(s.toggle_play().unwrap());
        assert_eq!(s.pending_timers(), 1);
        assert_eq!(s.advance_clock(20_000).unwrap().timeline_steps, 3);
        assert_eq!(s.pending_timers(), 0);
    }

    #[test]
    fn viewer_suspends_and_resumes_playback() {
        let (mut s, _, _) = imported();
        s.open_timeline().unwrap();
        s.toggle_play().unwrap();
        s.advance_clock(180).unwrap();
        assert_eq!(s.timeline().cursor(), 1);

        s.open_modal(ModalKind::PhotoViewer);
        assert_eq!(s.advance_clock(2_000).unwrap().timeline_steps, 0);
        assert!(s.timeline().is_suspended());

        s.close_modal(ModalKind::PhotoViewer);
        assert!(s.timeline().is_playing());
        assert_eq!(s.timeline().cursor(), 1);
        assert_eq!(s.advance_clock(2_180).unwrap().timeline_steps, 1);
    }

    #[test]
    fn filter_change_while_timeline_open_resets_and_pauses() {
        let (mut s, _, _) = imported();
        s.open_timeline().unwrap();
        s.toggle_play().unwrap();
        s.advance_clock(180).unwrap();
        s.toggle_year("2024").unwrap();
        assert_eq!(s.timeline().cursor(), 0);
        assert!(!s.timeline().is_playing());
        assert_eq!(s.timeline().buckets().len(), 3);

        assert!(s.set_timeline_granularity(Granularity::Month).unwrap());
        assert_eq!(s.timeline().buckets().len(), 2);
        assert_eq!(s.displayed().len(), 2);
    }

    #[test]
    fn restore_reads_back_the_working_copy() {
        let (mut s, _, _) = imported();
        let target = feature(&s, "c");
        s.start_relocation(&target);
        s.commit_relocation(LonLat::new(2.35, 48.85)).unwrap();
        assert!(s.flush());

        assert!(s.restore().unwrap());
        assert_eq!(feature(&s, "c").coordinates, LonLat::new(2.35, 48.85));
        assert_eq!(s.resolver().file_count(), 1);
        assert!(s.has_unexported_changes().unwrap());
    }

    #[test]
    fn clear_drops_everything() {
        let (mut s, _, _) = imported();
        s.on_render(16);
        s.clear().unwrap();
        assert!(s.collection().is_empty());
        assert!(!s.reconciler().has_source());
        assert_eq!(s.reconciler().engine().marker_count(), 0);
        assert_eq!(s.resolver().factory().live_urls(), 0);
        assert!(!s.restore().unwrap());
        assert!(!s.open_timeline().unwrap());
    }

    struct SquareFetcher {
        calls: AtomicUsize,
    }

    const FRANCE: &str = r#"{"type":"FeatureCollection","features":[
        {"type":"Feature","properties":{"ADMIN":"France","nom":"Paris"},
         "geometry":{"type":"Polygon","coordinates":[[[2.0,48.0],[3.0,48.0],[3.0,49.0],[2.0,49.0],[2.0,48.0]]]}}]}"#;

    impl BoundaryFetcher for SquareFetcher {
        fn fetch<'a>(&'a self, _url: &'a str) -> BoxFuture<'a, Result<String, FetchError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(FRANCE.to_string()) })
        }
    }

    #[tokio::test]
    async fn statistics_are_cached_until_a_relocation() {
        let (mut s, _, _) = imported();
        let cache = BoundaryCache::new(
            SquareFetcher {
                calls: AtomicUsize::new(0),
            },
            BoundaryConfig::default(),
        );

        let first = s.statistics(&cache).await;
        assert_eq!(first.total, 4);
        assert_eq!(first.geo.countries, 1);
        assert_eq!(first.geo.regions, 1);
        assert!(!s.stats_cache().is_empty());
        assert_eq!(s.statistics(&cache).await, first);

        let target = feature(&s, "c");
        s.start_relocation(&target);
        s.commit_relocation(LonLat::new(120.0, -30.0)).unwrap();
        assert!(s.stats_cache().is_empty());
        let second = s.statistics(&cache).await;
        assert_eq!(second.total, 4);
        assert_eq!(cache.fetcher().calls.load(Ordering::SeqCst), 2);
    }
}
