use std::collections::hash_map::Entry as MapEntry;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::remote::{ClientError, ClientResult, ProgressRemote};
use super::throttle::KeyedThrottle;
use crate::dto::progress_dto::SaveProgressRequest;
use crate::models::progress::{clamp_progress, ProgressRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgressKey {
    pub user_id: Uuid,
    pub formation_id: Uuid,
    pub lesson_id: Uuid,
}

impl ProgressKey {
    pub fn new(user_id: Uuid, formation_id: Uuid, lesson_id: Uuid) -> Self {
        Self {
            user_id,
            formation_id,
            lesson_id,
        }
    }

    pub fn of(record: &ProgressRecord) -> Self {
        Self::new(record.user_id, record.formation_id, record.lesson_id)
    }
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Minimum time between two remote writes for the same key.
    pub min_write_interval: Duration,
    pub remote_timeout: Duration,
    /// Remote writes allowed in flight across all keys.
    pub max_in_flight: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            min_write_interval: Duration::from_secs(1),
            remote_timeout: Duration::from_secs(10),
            max_in_flight: 4,
        }
    }
}

/// Partial update from the lesson viewer. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressUpdate {
    pub current_page: Option<i32>,
    pub total_pages: Option<i32>,
    pub time_spent: Option<i64>,
    pub total_time: Option<i64>,
    pub progress: Option<f64>,
    pub completed: Option<bool>,
}

impl ProgressUpdate {
    /// Folds a later update into this one; fields set later win.
    fn absorb(&mut self, later: &ProgressUpdate) {
        if let Some(progress) = later.progress {
            self.progress = Some(f64::from(clamp_progress(progress)));
        }
        if later.current_page.is_some() {
            self.current_page = later.current_page;
        }
        if later.total_pages.is_some() {
            self.total_pages = later.total_pages;
        }
        if later.time_spent.is_some() {
            self.time_spent = later.time_spent;
        }
        if later.total_time.is_some() {
            self.total_time = later.total_time;
        }
        if later.completed.is_some() {
            self.completed = later.completed;
        }
    }

    /// Drops every field that `reported` sets.
    fn forget(&mut self, reported: &ProgressUpdate) {
        if reported.progress.is_some() {
            self.progress = None;
        }
        if reported.current_page.is_some() {
            self.current_page = None;
        }
        if reported.total_pages.is_some() {
            self.total_pages = None;
        }
        if reported.time_spent.is_some() {
            self.time_spent = None;
        }
        if reported.total_time.is_some() {
            self.total_time = None;
        }
        if reported.completed.is_some() {
            self.completed = None;
        }
    }

    fn is_empty(&self) -> bool {
        *self == ProgressUpdate::default()
    }
}

/// Local view of one lesson. Fields never reported by the viewer or the
/// server stay `None` and are left out of remote writes.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalProgress {
    pub key: ProgressKey,
    pub progress: Option<i32>,
    pub current_page: Option<i32>,
    pub total_pages: Option<i32>,
    pub current_time_seconds: Option<i64>,
    pub total_time_seconds: Option<i64>,
    pub is_completed: Option<bool>,
    pub last_accessed_at: DateTime<Utc>,
    pub synced_at: Option<DateTime<Utc>>,
    /// Holds changes the server has not acknowledged yet.
    pub dirty: bool,
}

impl LocalProgress {
    fn empty(key: ProgressKey, at: DateTime<Utc>) -> Self {
        Self {
            key,
            progress: None,
            current_page: None,
            total_pages: None,
            current_time_seconds: None,
            total_time_seconds: None,
            is_completed: None,
            last_accessed_at: at,
            synced_at: None,
            dirty: false,
        }
    }

    fn from_record(record: &ProgressRecord, synced_at: DateTime<Utc>) -> Self {
        Self {
            key: ProgressKey::of(record),
            progress: Some(record.progress),
            current_page: record.current_page,
            total_pages: record.total_pages,
            current_time_seconds: Some(record.current_time_seconds),
            total_time_seconds: Some(record.total_time_seconds),
            is_completed: Some(record.is_completed),
            last_accessed_at: record.last_accessed_at,
            synced_at: Some(synced_at),
            dirty: false,
        }
    }

    fn merge(&mut self, update: &ProgressUpdate, at: DateTime<Utc>) {
        if let Some(progress) = update.progress {
            self.progress = Some(clamp_progress(progress));
        }
        if update.current_page.is_some() {
            self.current_page = update.current_page;
        }
        if update.total_pages.is_some() {
            self.total_pages = update.total_pages;
        }
        if update.time_spent.is_some() {
            self.current_time_seconds = update.time_spent;
        }
        if update.total_time.is_some() {
            self.total_time_seconds = update.total_time;
        }
        if update.completed.is_some() {
            self.is_completed = update.completed;
        }
        self.last_accessed_at = self.last_accessed_at.max(at);
    }
}

#[derive(Debug)]
pub enum WriteOutcome {
    /// The server acknowledged the write.
    Synced(LocalProgress),
    /// Kept locally; the key is throttled, already in flight, or the write
    /// budget is exhausted.
    Coalesced(LocalProgress),
    /// The remote write failed. The local value stays and is marked dirty.
    Deferred { entry: LocalProgress, error: String },
    /// The cache was closed.
    Cancelled,
}

impl WriteOutcome {
    pub fn entry(&self) -> Option<&LocalProgress> {
        match self {
            Self::Synced(entry) | Self::Coalesced(entry) => Some(entry),
            Self::Deferred { entry, .. } => Some(entry),
            Self::Cancelled => None,
        }
    }
}

struct CachedEntry {
    local: LocalProgress,
    /// Bumped by every local change, reported or not.
    revision: u64,
    /// Viewer-reported fields not yet acknowledged. Local-only edits never
    /// land here, so they never reach the server.
    reported: ProgressUpdate,
    reported_seq: u64,
    /// Local-only edits, laid back over acknowledged records.
    local_only: ProgressUpdate,
    in_flight: bool,
}

impl CachedEntry {
    fn new(local: LocalProgress) -> Self {
        Self {
            local,
            revision: 0,
            reported: ProgressUpdate::default(),
            reported_seq: 0,
            local_only: ProgressUpdate::default(),
            in_flight: false,
        }
    }

    fn to_request(&self) -> SaveProgressRequest {
        let key = self.local.key;
        SaveProgressRequest {
            user_id: Some(key.user_id),
            lesson_id: Some(key.lesson_id),
            formation_id: Some(key.formation_id),
            current_page: self.reported.current_page,
            total_pages: self.reported.total_pages,
            time_spent: self.reported.time_spent,
            total_time: self.reported.total_time,
            progress: self.reported.progress,
            completed: self.reported.completed,
        }
    }

    fn begin_write(&mut self, key: ProgressKey, permit: OwnedSemaphorePermit) -> PendingWrite {
        self.in_flight = true;
        PendingWrite {
            key,
            request: self.to_request(),
            marks: WriteMarks {
                revision: self.revision,
                reported_seq: self.reported_seq,
            },
            permit,
        }
    }

    /// Applies an acknowledged record unless local edits arrived after the
    /// write was sent, in which case those edits win. The entry stays dirty
    /// only while reported fields remain unsent.
    fn acknowledge(&mut self, record: &ProgressRecord, sent: WriteMarks, at: DateTime<Utc>) {
        if self.revision == sent.revision {
            self.local = LocalProgress::from_record(record, at);
            let accessed = self.local.last_accessed_at;
            self.local.merge(&self.local_only, accessed);
        } else {
            self.local.synced_at = Some(at);
        }
        if self.reported_seq == sent.reported_seq {
            self.reported = ProgressUpdate::default();
            self.local.dirty = false;
        } else {
            self.local.dirty = true;
        }
    }
}

struct CacheState {
    entries: HashMap<ProgressKey, CachedEntry>,
    throttle: KeyedThrottle<ProgressKey>,
    last_error: Option<String>,
}

/// Entry counters captured when a write is sent.
#[derive(Debug, Clone, Copy)]
struct WriteMarks {
    revision: u64,
    reported_seq: u64,
}

struct PendingWrite {
    key: ProgressKey,
    request: SaveProgressRequest,
    marks: WriteMarks,
    permit: OwnedSemaphorePermit,
}

/// Per-session progress cache in front of the progress API.
///
/// Viewer updates always land locally first. Remote writes are throttled per
/// lesson, bounded overall, and never surface errors to the caller: a failed
/// write leaves the entry dirty for the next write or [`ProgressCache::flush`].
pub struct ProgressCache {
    remote: Arc<dyn ProgressRemote>,
    config: CacheConfig,
    state: Mutex<CacheState>,
    permits: Arc<Semaphore>,
    shutdown: CancellationToken,
}

impl ProgressCache {
    pub fn new(remote: Arc<dyn ProgressRemote>, config: CacheConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_in_flight.max(1)));
        let throttle = KeyedThrottle::new(config.min_write_interval);
        Self {
            remote,
            config,
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                throttle,
                last_error: None,
            }),
            permits,
            shutdown: CancellationToken::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, key: &ProgressKey) -> Option<LocalProgress> {
        self.lock().entries.get(key).map(|e| e.local.clone())
    }

    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub async fn record_progress(&self, key: ProgressKey, update: ProgressUpdate) -> WriteOutcome {
        if self.is_closed() {
            return WriteOutcome::Cancelled;
        }
        let now = Utc::now();
        let tick = Instant::now();

        let pending = {
            let mut guard = self.lock();
            let state = &mut *guard;
            let entry = state
                .entries
                .entry(key)
                .or_insert_with(|| CachedEntry::new(LocalProgress::empty(key, now)));
            entry.local.merge(&update, now);
            entry.local.dirty = true;
            entry.revision += 1;
            entry.reported.absorb(&update);
            entry.reported_seq += 1;
            entry.local_only.forget(&update);

            if entry.in_flight || state.throttle.is_throttled(&key, tick) {
                return WriteOutcome::Coalesced(entry.local.clone());
            }
            let Ok(permit) = self.permits.clone().try_acquire_owned() else {
                tracing::debug!(lesson_id = %key.lesson_id, "write budget exhausted, kept locally");
                return WriteOutcome::Coalesced(entry.local.clone());
            };
            state.throttle.try_acquire(key, tick);
            entry.begin_write(key, permit)
        };

        self.push(pending).await
    }

    /// Local-only merge; nothing is sent.
    pub fn update_progress_local(&self, key: ProgressKey, update: ProgressUpdate) -> LocalProgress {
        let now = Utc::now();
        let mut state = self.lock();
        let entry = state
            .entries
            .entry(key)
            .or_insert_with(|| CachedEntry::new(LocalProgress::empty(key, now)));
        entry.local.merge(&update, now);
        entry.local_only.absorb(&update);
        entry.revision += 1;
        entry.local.clone()
    }

    /// Cached entry, else the server's record. `None` when the learner has
    /// no record or the server could not be reached.
    pub async fn load_progress(&self, key: ProgressKey) -> Option<LocalProgress> {
        if let Some(hit) = self.get(&key) {
            return Some(hit);
        }
        match self.call(self.remote.fetch(&key)).await {
            Ok(Some(record)) => self.hydrate(&record),
            Ok(None) => None,
            Err(err) => {
                self.note_error(&err, "progress load failed");
                None
            }
        }
    }

    /// Hydrates the cache with every record of the user. Returns how many
    /// records were received.
    pub async fn preload(&self, user_id: Uuid) -> usize {
        match self.call(self.remote.fetch_all(user_id)).await {
            Ok(records) => {
                for record in &records {
                    self.hydrate(record);
                }
                tracing::debug!(%user_id, count = records.len(), "progress preloaded");
                records.len()
            }
            Err(err) => {
                self.note_error(&err, "progress preload failed");
                0
            }
        }
    }

    /// Pushes every dirty entry that is neither throttled nor in flight.
    /// Returns how many were acknowledged.
    pub async fn flush(&self) -> usize {
        if self.is_closed() {
            return 0;
        }
        let tick = Instant::now();
        let batch: Vec<PendingWrite> = {
            let mut guard = self.lock();
            let state = &mut *guard;
            let mut batch = Vec::new();
            for (key, entry) in state.entries.iter_mut() {
                if !entry.local.dirty || entry.in_flight || state.throttle.is_throttled(key, tick) {
                    continue;
                }
                let Ok(permit) = self.permits.clone().try_acquire_owned() else {
                    break;
                };
                state.throttle.try_acquire(*key, tick);
                batch.push(entry.begin_write(*key, permit));
            }
            batch
        };

        let mut synced = 0;
        for pending in batch {
            if let WriteOutcome::Synced(_) = self.push(pending).await {
                synced += 1;
            }
        }
        synced
    }

    /// Tears the session down: in-flight writes are cancelled and the local
    /// map is dropped.
    pub fn close(&self) {
        self.shutdown.cancel();
        let mut state = self.lock();
        state.entries.clear();
        state.throttle.clear();
    }

    async fn push(&self, pending: PendingWrite) -> WriteOutcome {
        let PendingWrite {
            key,
            request,
            marks,
            permit,
        } = pending;
        let result = self.call(self.remote.save(&request)).await;
        drop(permit);

        let mut state = self.lock();
        let Some(entry) = state.entries.get_mut(&key) else {
            return WriteOutcome::Cancelled;
        };
        entry.in_flight = false;

        match result {
            Ok(record) => {
                entry.acknowledge(&record, marks, Utc::now());
                tracing::debug!(
                    user_id = %key.user_id,
                    lesson_id = %key.lesson_id,
                    progress = record.progress,
                    "progress synced"
                );
                WriteOutcome::Synced(entry.local.clone())
            }
            Err(ClientError::Cancelled) => WriteOutcome::Cancelled,
            Err(err) => {
                let local = entry.local.clone();
                let error = err.to_string();
                tracing::warn!(
                    user_id = %key.user_id,
                    lesson_id = %key.lesson_id,
                    error = %error,
                    "progress write deferred"
                );
                state.last_error = Some(error.clone());
                WriteOutcome::Deferred {
                    entry: local,
                    error,
                }
            }
        }
    }

    async fn call<T>(&self, request: impl Future<Output = ClientResult<T>>) -> ClientResult<T> {
        let timeout = self.config.remote_timeout;
        tokio::select! {
            _ = self.shutdown.cancelled() => Err(ClientError::Cancelled),
            result = tokio::time::timeout(timeout, request) => {
                result.unwrap_or(Err(ClientError::Timeout(timeout)))
            }
        }
    }

    fn note_error(&self, err: &ClientError, context: &'static str) {
        if matches!(err, ClientError::Cancelled) {
            return;
        }
        tracing::warn!(error = %err, "{}", context);
        self.lock().last_error = Some(err.to_string());
    }

    /// Last write wins on `last_accessed_at`: local state newer than the
    /// server's record is kept, synced or not.
    fn hydrate(&self, record: &ProgressRecord) -> Option<LocalProgress> {
        if self.is_closed() {
            return None;
        }
        let now = Utc::now();
        let mut state = self.lock();
        let local = match state.entries.entry(ProgressKey::of(record)) {
            MapEntry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                let local_is_newer = entry.local.last_accessed_at > record.last_accessed_at;
                if !local_is_newer && !entry.in_flight {
                    entry.local = LocalProgress::from_record(record, now);
                    entry.local.dirty = !entry.reported.is_empty();
                    entry.local_only = ProgressUpdate::default();
                    entry.revision += 1;
                }
                entry.local.clone()
            }
            MapEntry::Vacant(vacant) => {
                let local = LocalProgress::from_record(record, now);
                vacant.insert(CachedEntry::new(local.clone()));
                local
            }
        };
        Some(local)
    }
}

impl Drop for ProgressCache {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
