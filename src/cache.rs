//! Per (session, kind, region) resource lists with TTL, single-flight
//! refresh and relation resolution.
//!
//! Remote calls only ever run on the worker pool. Every refresh gets a
//! token from a per-entry counter; a completion is applied only if its token
//! is newer than the last applied one, so results land in start order even
//! when calls finish out of order.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::model::{CacheConfig, KindId, ResourceRecord, ResourceRef};
use crate::registry::{Registry, ResourceTypeDescriptor};
use crate::remote::RemoteError;
use crate::session::{Session, SessionId};

mod clock;
mod events;
mod retry;
mod workers;

pub use self::clock::{Clock, ManualClock, SystemClock};
pub use self::events::{CacheEvent, EventSink};
pub use self::retry::RetryPolicy;
pub use self::workers::{Spawner, Workers};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    pub session: SessionId,
    pub kind: KindId,
    pub region: String,
}

impl CacheKey {
    pub fn new(session: SessionId, kind: KindId, region: impl Into<String>) -> Self {
        Self {
            session,
            kind,
            region: region.into(),
        }
    }

    pub fn for_session(session: &Session, kind: KindId) -> Self {
        Self::new(session.id(), kind, session.region())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.session, self.region, self.kind)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryState {
    /// Never refreshed.
    Empty,
    Refreshing,
    Fresh,
    /// TTL elapsed or explicitly invalidated.
    Stale,
    /// Last refresh gave up after retries; previous records retained.
    Errored,
}

/// Identifies a screen (or other party) interested in an entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(pub u64);

/// How a refresh ended, as seen by whoever waits on it.
#[derive(Clone, Debug, PartialEq)]
pub enum RefreshOutcome {
    Applied { records: usize },
    /// A later-started refresh had already been applied.
    Superseded,
    Failed(CoreError),
    /// The entry was cleared or evicted while the call ran.
    Discarded,
}

#[derive(Default)]
struct Completion {
    outcome: Mutex<Option<RefreshOutcome>>,
    done: Condvar,
}

impl Completion {
    fn finish(&self, outcome: RefreshOutcome) {
        *self.outcome.lock() = Some(outcome);
        self.done.notify_all();
    }
}

/// Handle on one in-flight refresh. Cloned to every caller that attaches.
#[derive(Clone)]
pub struct RefreshHandle {
    token: u64,
    completion: Arc<Completion>,
}

impl RefreshHandle {
    pub fn token(&self) -> u64 {
        self.token
    }

    pub fn is_done(&self) -> bool {
        self.completion.outcome.lock().is_some()
    }

    /// Block until the refresh finishes. Never call this on the UI thread.
    pub fn wait(&self) -> RefreshOutcome {
        let mut outcome = self.completion.outcome.lock();
        loop {
            if let Some(o) = outcome.as_ref() {
                return o.clone();
            }
            self.completion.done.wait(&mut outcome);
        }
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Option<RefreshOutcome> {
        let deadline = Instant::now() + timeout;
        let mut outcome = self.completion.outcome.lock();
        while outcome.is_none() {
            if self
                .completion
                .done
                .wait_until(&mut outcome, deadline)
                .timed_out()
            {
                break;
            }
        }
        outcome.clone()
    }
}

impl fmt::Debug for RefreshHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshHandle")
            .field("token", &self.token)
            .field("done", &self.is_done())
            .finish()
    }
}

#[derive(Debug)]
pub enum EnsureFresh {
    /// Nothing to do.
    Fresh,
    /// This call started a refresh.
    Started(RefreshHandle),
    /// A refresh was already running; this call joined it.
    Attached(RefreshHandle),
}

impl EnsureFresh {
    pub fn handle(&self) -> Option<&RefreshHandle> {
        match self {
            EnsureFresh::Fresh => None,
            EnsureFresh::Started(h) | EnsureFresh::Attached(h) => Some(h),
        }
    }
}

/// Read-only view of an entry at one instant.
#[derive(Clone, Debug)]
pub struct EntrySnapshot {
    pub key: CacheKey,
    pub state: EntryState,
    pub records: Arc<Vec<ResourceRecord>>,
    pub last_refresh: Option<Instant>,
    pub error: Option<CoreError>,
    pub version: u64,
    pub subscribers: usize,
}

impl EntrySnapshot {
    pub fn has_data(&self) -> bool {
        self.last_refresh.is_some()
    }

    /// Stale data on screen, for whatever reason.
    pub fn is_stale(&self) -> bool {
        matches!(self.state, EntryState::Stale | EntryState::Errored)
    }
}

struct InFlight {
    token: u64,
    completion: Arc<Completion>,
}

struct Entry {
    records: Arc<Vec<ResourceRecord>>,
    ttl: Duration,
    last_refresh: Option<Instant>,
    last_attempt: Option<Instant>,
    error: Option<CoreError>,
    /// Refreshes with a token below this started before the last invalidation.
    invalidated_below: Option<u64>,
    in_flight: Option<InFlight>,
    next_token: u64,
    /// Highest token whose result has landed, applied or failed.
    settled_token: u64,
    subscribers: BTreeSet<SubscriberId>,
    idle_since: Option<Instant>,
    version: u64,
}

impl Entry {
    fn new(ttl: Duration, now: Instant) -> Self {
        Self {
            records: Arc::new(Vec::new()),
            ttl,
            last_refresh: None,
            last_attempt: None,
            error: None,
            invalidated_below: None,
            in_flight: None,
            next_token: 1,
            settled_token: 0,
            subscribers: BTreeSet::new(),
            idle_since: Some(now),
            version: 0,
        }
    }

    fn state(&self, now: Instant) -> EntryState {
        if self.in_flight.is_some() {
            return EntryState::Refreshing;
        }
        if self.last_refresh.is_none() && self.error.is_none() {
            return EntryState::Empty;
        }
        if self.invalidated_below.is_some() {
            return EntryState::Stale;
        }
        if self.error.is_some()
            && self
                .last_attempt
                .is_some_and(|t| now.saturating_duration_since(t) <= self.ttl)
        {
            return EntryState::Errored;
        }
        match self.last_refresh {
            Some(t) if now.saturating_duration_since(t) <= self.ttl => EntryState::Fresh,
            _ => EntryState::Stale,
        }
    }

    /// True when the running refresh, if any, began after the last invalidation.
    fn in_flight_is_current(&self) -> bool {
        match (&self.in_flight, self.invalidated_below) {
            (None, _) => false,
            (Some(f), Some(min)) => f.token >= min,
            (Some(_), None) => true,
        }
    }

    fn start(&mut self) -> RefreshHandle {
        let token = self.next_token;
        self.next_token += 1;
        let completion = Arc::new(Completion::default());
        self.in_flight = Some(InFlight {
            token,
            completion: completion.clone(),
        });
        RefreshHandle { token, completion }
    }

    fn attach(&self) -> Option<RefreshHandle> {
        self.in_flight.as_ref().map(|f| RefreshHandle {
            token: f.token,
            completion: f.completion.clone(),
        })
    }

    fn snapshot(&self, key: &CacheKey, now: Instant) -> EntrySnapshot {
        EntrySnapshot {
            key: key.clone(),
            state: self.state(now),
            records: self.records.clone(),
            last_refresh: self.last_refresh,
            error: self.error.clone(),
            version: self.version,
            subscribers: self.subscribers.len(),
        }
    }
}

/// Tunables for a cache instance.
#[derive(Clone, Debug)]
pub struct CacheSettings {
    pub ttl: Duration,
    pub idle_window: Duration,
    pub retry: RetryPolicy,
}

impl CacheSettings {
    pub fn from_config(cache: &CacheConfig, retry: RetryPolicy) -> Self {
        Self {
            ttl: Duration::from_secs(cache.ttl_secs),
            idle_window: Duration::from_secs(cache.idle_evict_secs),
            retry,
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default(), RetryPolicy::default())
    }
}

struct Shared {
    entries: Mutex<HashMap<CacheKey, Entry>>,
    registry: Arc<Registry>,
    settings: CacheSettings,
    clock: Arc<dyn Clock>,
    spawner: Spawner,
    sink: Option<EventSink>,
}

impl Shared {
    fn emit(&self, event: CacheEvent) {
        if let Some(sink) = &self.sink {
            sink(event);
        }
    }
}

pub struct CacheBuilder {
    registry: Arc<Registry>,
    spawner: Spawner,
    settings: CacheSettings,
    clock: Arc<dyn Clock>,
    sink: Option<EventSink>,
}

impl CacheBuilder {
    pub fn settings(mut self, settings: CacheSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn events(mut self, sink: EventSink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn build(self) -> CacheEngine {
        CacheEngine {
            shared: Arc::new(Shared {
                entries: Mutex::new(HashMap::new()),
                registry: self.registry,
                settings: self.settings,
                clock: self.clock,
                spawner: self.spawner,
                sink: self.sink,
            }),
        }
    }
}

/// The cache. Cheap to clone; clones share entries.
#[derive(Clone)]
pub struct CacheEngine {
    shared: Arc<Shared>,
}

/// Targets of one relation from a record, as found in the target kind's list.
#[derive(Clone, Debug, PartialEq)]
pub struct RelatedGroup {
    pub label: &'static str,
    pub target: KindId,
    pub records: Vec<ResourceRecord>,
    /// Ids the relation named that the target list does not contain.
    pub missing: Vec<String>,
}

impl CacheEngine {
    pub fn builder(registry: Arc<Registry>, spawner: Spawner) -> CacheBuilder {
        CacheBuilder {
            registry,
            spawner,
            settings: CacheSettings::default(),
            clock: Arc::new(SystemClock),
            sink: None,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.shared.registry
    }

    pub fn spawner(&self) -> &Spawner {
        &self.shared.spawner
    }

    pub fn now(&self) -> Instant {
        self.shared.clock.now()
    }

    fn descriptor(&self, kind: &str) -> Result<&'static ResourceTypeDescriptor, CoreError> {
        self.shared
            .registry
            .get(kind)
            .ok_or_else(|| CoreError::not_found("resource kind", kind))
    }

    /// Snapshot of the entry for `key`, creating an empty one on first use.
    pub fn get(&self, key: &CacheKey) -> EntrySnapshot {
        let now = self.now();
        let mut entries = self.shared.entries.lock();
        entries
            .entry(key.clone())
            .or_insert_with(|| Entry::new(self.shared.settings.ttl, now))
            .snapshot(key, now)
    }

    /// Snapshot without creating the entry.
    pub fn snapshot(&self, key: &CacheKey) -> Option<EntrySnapshot> {
        let now = self.now();
        self.shared
            .entries
            .lock()
            .get(key)
            .map(|e| e.snapshot(key, now))
    }

    pub fn state(&self, key: &CacheKey) -> Option<EntryState> {
        let now = self.now();
        self.shared.entries.lock().get(key).map(|e| e.state(now))
    }

    pub fn record(&self, key: &CacheKey, id: &str) -> Option<ResourceRecord> {
        let entries = self.shared.entries.lock();
        entries
            .get(key)?
            .records
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.shared.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn set_ttl(&self, key: &CacheKey, ttl: Duration) {
        let now = self.now();
        let mut entries = self.shared.entries.lock();
        entries
            .entry(key.clone())
            .or_insert_with(|| Entry::new(ttl, now))
            .ttl = ttl;
    }

    /// Start a refresh if the entry is empty or stale and none is running.
    /// Callers that find one running attach to it.
    pub fn ensure_fresh(
        &self,
        session: &Arc<Session>,
        kind: KindId,
    ) -> Result<EnsureFresh, CoreError> {
        let desc = self.descriptor(kind)?;
        let key = CacheKey::for_session(session, desc.kind);
        let now = self.now();
        let handle = {
            let mut entries = self.shared.entries.lock();
            let entry = entries
                .entry(key.clone())
                .or_insert_with(|| Entry::new(self.shared.settings.ttl, now));
            if entry.in_flight_is_current() {
                if let Some(h) = entry.attach() {
                    return Ok(EnsureFresh::Attached(h));
                }
            }
            if entry.in_flight.is_none()
                && !matches!(entry.state(now), EntryState::Empty | EntryState::Stale)
            {
                return Ok(EnsureFresh::Fresh);
            }
            entry.start()
        };
        self.spawn_refresh(session.clone(), desc, key, handle.clone(), now);
        Ok(EnsureFresh::Started(handle))
    }

    /// Start a refresh unconditionally. A refresh already running keeps
    /// running, but its result is discarded if this one is applied first.
    pub fn refresh(&self, session: &Arc<Session>, kind: KindId) -> Result<RefreshHandle, CoreError> {
        let desc = self.descriptor(kind)?;
        let key = CacheKey::for_session(session, desc.kind);
        let now = self.now();
        let handle = {
            let mut entries = self.shared.entries.lock();
            entries
                .entry(key.clone())
                .or_insert_with(|| Entry::new(self.shared.settings.ttl, now))
                .start()
        };
        self.spawn_refresh(session.clone(), desc, key, handle.clone(), now);
        Ok(handle)
    }

    fn spawn_refresh(
        &self,
        session: Arc<Session>,
        desc: &'static ResourceTypeDescriptor,
        key: CacheKey,
        handle: RefreshHandle,
        started: Instant,
    ) {
        debug!(key = %key, token = handle.token, "refresh started");
        let cache = self.clone();
        self.shared.spawner.spawn(move || {
            let result = cache.fetch_list(&session, desc);
            let outcome = cache.complete(&key, handle.token, started, result);
            handle.completion.finish(outcome);
        });
    }

    fn fetch_list(
        &self,
        session: &Session,
        desc: &'static ResourceTypeDescriptor,
    ) -> Result<Vec<ResourceRecord>, CoreError> {
        let client = session.client(desc.service)?;
        let label = format!("list {}", desc.kind);
        let payloads = self
            .shared
            .settings
            .retry
            .run(&label, || client.list(desc.kind, session.region()))
            .map_err(|e| list_error(desc.kind, e))?;
        Ok(payloads.iter().filter_map(|p| desc.record_from(p)).collect())
    }

    /// Apply a finished refresh to its entry.
    fn complete(
        &self,
        key: &CacheKey,
        token: u64,
        started: Instant,
        result: Result<Vec<ResourceRecord>, CoreError>,
    ) -> RefreshOutcome {
        let now = self.now();
        let (outcome, event) = {
            let mut entries = self.shared.entries.lock();
            let Some(entry) = entries.get_mut(key) else {
                debug!(key = %key, token, "refresh finished for a dropped entry");
                return RefreshOutcome::Discarded;
            };
            if entry.in_flight.as_ref().is_some_and(|f| f.token == token) {
                entry.in_flight = None;
            }
            if token <= entry.settled_token {
                debug!(key = %key, token, settled = entry.settled_token, "stale refresh result discarded");
                (RefreshOutcome::Superseded, None)
            } else {
                entry.settled_token = token;
                match result {
                    Ok(records) => {
                        let count = records.len();
                        entry.records = Arc::new(records);
                        entry.last_refresh = Some(started);
                        entry.last_attempt = Some(now);
                        entry.error = None;
                        if entry.invalidated_below.is_some_and(|min| token >= min) {
                            entry.invalidated_below = None;
                        }
                        entry.version += 1;
                        info!(key = %key, token, records = count, "refresh applied");
                        (
                            RefreshOutcome::Applied { records: count },
                            Some(CacheEvent::Updated {
                                key: key.clone(),
                                version: entry.version,
                            }),
                        )
                    }
                    Err(err) => {
                        entry.error = Some(err.clone());
                        entry.last_attempt = Some(now);
                        entry.version += 1;
                        warn!(key = %key, token, error = %err, "refresh failed; keeping previous records");
                        (
                            RefreshOutcome::Failed(err.clone()),
                            Some(CacheEvent::Failed {
                                key: key.clone(),
                                version: entry.version,
                                error: err.to_string(),
                            }),
                        )
                    }
                }
            }
        };
        if let Some(ev) = event {
            self.shared.emit(ev);
        }
        outcome
    }

    /// Make the next `ensure_fresh` refresh regardless of TTL. A refresh
    /// already running does not count.
    pub fn invalidate(&self, key: &CacheKey) {
        let mut entries = self.shared.entries.lock();
        if let Some(entry) = entries.get_mut(key) {
            entry.invalidated_below = Some(entry.next_token);
            debug!(key = %key, "entry invalidated");
        }
    }

    /// Drop every entry. Refreshes still running finish as `Discarded`.
    pub fn clear(&self) {
        let n = {
            let mut entries = self.shared.entries.lock();
            let n = entries.len();
            entries.clear();
            n
        };
        info!(entries = n, "cache cleared");
    }

    pub fn clear_session(&self, session: SessionId) {
        self.shared
            .entries
            .lock()
            .retain(|k, _| k.session != session);
    }

    pub fn subscribe(&self, key: &CacheKey, who: SubscriberId) {
        let now = self.now();
        let mut entries = self.shared.entries.lock();
        let entry = entries
            .entry(key.clone())
            .or_insert_with(|| Entry::new(self.shared.settings.ttl, now));
        entry.subscribers.insert(who);
        entry.idle_since = None;
    }

    pub fn unsubscribe(&self, key: &CacheKey, who: SubscriberId) {
        let now = self.now();
        let mut entries = self.shared.entries.lock();
        if let Some(entry) = entries.get_mut(key) {
            entry.subscribers.remove(&who);
            if entry.subscribers.is_empty() && entry.idle_since.is_none() {
                entry.idle_since = Some(now);
            }
        }
    }

    /// Drop entries nobody has subscribed to for longer than the idle window.
    /// Returns how many were dropped.
    pub fn evict_idle(&self) -> usize {
        let now = self.now();
        let window = self.shared.settings.idle_window;
        let evicted: Vec<CacheKey> = {
            let mut entries = self.shared.entries.lock();
            let doomed: Vec<CacheKey> = entries
                .iter()
                .filter(|(_, e)| {
                    e.subscribers.is_empty()
                        && e.in_flight.is_none()
                        && e.idle_since
                            .is_some_and(|t| now.saturating_duration_since(t) > window)
                })
                .map(|(k, _)| k.clone())
                .collect();
            for k in &doomed {
                entries.remove(k);
            }
            doomed
        };
        for key in &evicted {
            debug!(key = %key, "idle entry evicted");
            self.shared.emit(CacheEvent::Evicted { key: key.clone() });
        }
        evicted.len()
    }

    /// Fetch one record's describe payload and store it on the cached record.
    /// Blocking.
    pub fn describe(
        &self,
        session: &Session,
        kind: KindId,
        id: &str,
    ) -> Result<ResourceRecord, CoreError> {
        let desc = self.descriptor(kind)?;
        let client = session.client(desc.service)?;
        let label = format!("describe {}", desc.kind);
        let payload = self
            .shared
            .settings
            .retry
            .run(&label, || client.describe(desc.kind, session.region(), id))
            .map_err(|e| match e {
                RemoteError::NotFound => CoreError::not_found(desc.kind, id),
                RemoteError::Transient(m) => CoreError::TransientRemoteFailure(m),
                RemoteError::Failed(m) => CoreError::action_failed(format!("describe {}", id), m),
            })?;

        let key = CacheKey::new(session.id(), desc.kind, session.region());
        let mut record = desc
            .record_from(&payload)
            .or_else(|| self.record(&key, id))
            .unwrap_or_else(|| ResourceRecord::new(id));
        record.relations = desc.relation_refs(&payload);
        record.raw = Some(Arc::new(payload));

        let stored = {
            let mut entries = self.shared.entries.lock();
            match entries.get_mut(&key) {
                Some(entry) if entry.records.iter().any(|r| r.id == id) => {
                    let mut next: Vec<ResourceRecord> = entry.records.as_ref().clone();
                    for r in next.iter_mut().filter(|r| r.id == id) {
                        *r = record.clone();
                    }
                    entry.records = Arc::new(next);
                    entry.version += 1;
                    true
                }
                _ => false,
            }
        };
        if stored {
            self.shared.emit(CacheEvent::Described {
                key,
                id: id.to_string(),
            });
        }
        Ok(record)
    }

    /// Records of `target` that `record` refers to. Issues one describe if
    /// the record's raw payload is not known yet, and waits for the target
    /// list only when it has never been loaded. Blocking.
    pub fn resolve_relation(
        &self,
        session: &Arc<Session>,
        kind: KindId,
        record: &ResourceRecord,
        target: KindId,
    ) -> Result<Vec<ResourceRecord>, CoreError> {
        let desc = self.descriptor(kind)?;
        if !desc.relations.iter().any(|r| r.target == target) {
            return Err(CoreError::not_found(
                "relation",
                format!("{} -> {}", desc.kind, target),
            ));
        }
        let record = self.with_raw(session, desc, record)?;
        let groups = self.resolve_groups(session, desc, &record, Some(target))?;
        Ok(groups.into_iter().flat_map(|g| g.records).collect())
    }

    /// Every relation of `record`, grouped. Blocking.
    pub fn related(
        &self,
        session: &Arc<Session>,
        kind: KindId,
        record: &ResourceRecord,
    ) -> Result<Vec<RelatedGroup>, CoreError> {
        let desc = self.descriptor(kind)?;
        let record = self.with_raw(session, desc, record)?;
        self.resolve_groups(session, desc, &record, None)
    }

    fn with_raw(
        &self,
        session: &Session,
        desc: &'static ResourceTypeDescriptor,
        record: &ResourceRecord,
    ) -> Result<ResourceRecord, CoreError> {
        if record.raw.is_some() {
            return Ok(record.clone());
        }
        self.describe(session, desc.kind, &record.id)
    }

    fn resolve_groups(
        &self,
        session: &Arc<Session>,
        desc: &'static ResourceTypeDescriptor,
        record: &ResourceRecord,
        only: Option<KindId>,
    ) -> Result<Vec<RelatedGroup>, CoreError> {
        let Some(raw) = record.raw.as_deref() else {
            return Ok(Vec::new());
        };
        let mut groups = Vec::new();
        for rel in desc
            .relations
            .iter()
            .filter(|r| only.is_none_or(|t| t == r.target))
        {
            let ids = rel.extract(raw);
            if ids.is_empty() {
                continue;
            }
            let targets = self.target_records(session, rel.target)?;
            let records: Vec<ResourceRecord> = targets
                .iter()
                .filter(|r| ids.contains(&r.id))
                .cloned()
                .collect();
            let missing = ids
                .into_iter()
                .filter(|id| !records.iter().any(|r| &r.id == id))
                .collect();
            groups.push(RelatedGroup {
                label: rel.label,
                target: rel.target,
                records,
                missing,
            });
        }
        Ok(groups)
    }

    /// Current records of `kind`, loading them first if never loaded.
    fn target_records(
        &self,
        session: &Arc<Session>,
        kind: KindId,
    ) -> Result<Arc<Vec<ResourceRecord>>, CoreError> {
        let key = CacheKey::for_session(session, kind);
        let ensure = self.ensure_fresh(session, kind)?;
        let loaded = self.snapshot(&key).is_some_and(|s| s.has_data());
        if !loaded && let Some(h) = ensure.handle() {
            if let RefreshOutcome::Failed(err) = h.wait() {
                let has_data = self.snapshot(&key).is_some_and(|s| s.has_data());
                if !has_data {
                    return Err(err);
                }
            }
        }
        Ok(self
            .snapshot(&key)
            .map(|s| s.records)
            .unwrap_or_default())
    }

    /// Ids referenced by a record, as weak references.
    pub fn references(&self, kind: KindId, record: &ResourceRecord) -> Vec<ResourceRef> {
        if !record.relations.is_empty() {
            return record.relations.iter().cloned().collect();
        }
        match (self.shared.registry.get(kind), record.raw.as_deref()) {
            (Some(desc), Some(raw)) => desc.relation_refs(raw).into_iter().collect(),
            _ => Vec::new(),
        }
    }
}

fn list_error(kind: KindId, err: RemoteError) -> CoreError {
    match err {
        RemoteError::Transient(m) => CoreError::TransientRemoteFailure(m),
        RemoteError::NotFound => CoreError::not_found("resource kind", kind),
        RemoteError::Failed(m) => CoreError::action_failed(format!("list {}", kind), m),
    }
}
