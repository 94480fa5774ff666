use std::sync::Arc;

use super::CacheKey;

/// Change notifications for cache entries, delivered from worker threads.
#[derive(Clone, Debug, PartialEq)]
pub enum CacheEvent {
    /// New records were applied.
    Updated { key: CacheKey, version: u64 },
    /// A refresh gave up; the previous records are still in place.
    Failed {
        key: CacheKey,
        version: u64,
        error: String,
    },
    /// A record's describe payload arrived.
    Described { key: CacheKey, id: String },
    /// Idle entry dropped.
    Evicted { key: CacheKey },
}

impl CacheEvent {
    pub fn key(&self) -> &CacheKey {
        match self {
            CacheEvent::Updated { key, .. }
            | CacheEvent::Failed { key, .. }
            | CacheEvent::Described { key, .. }
            | CacheEvent::Evicted { key } => key,
        }
    }
}

pub type EventSink = Arc<dyn Fn(CacheEvent) + Send + Sync>;
