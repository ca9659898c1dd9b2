use chrono::{DateTime, Duration as TtlDuration, Utc};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use crate::cache::{CacheId, Clock, Store};
use crate::errors::{DataHubError, Result};

/// 可手动推进的时钟
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn advance(&self, by: TtlDuration) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = *guard + by;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|guard| *guard).unwrap_or_else(|e| *e.into_inner())
    }
}

struct StoredEntry {
    contents: String,
    modified: DateTime<Utc>,
}

/// 内存存储，写入时间取自注入的时钟
pub struct MemoryStore {
    clock: Arc<dyn Clock>,
    entries: Mutex<BTreeMap<CacheId, StoredEntry>>,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<CacheId, StoredEntry>>> {
        self.entries
            .lock()
            .map_err(|_| DataHubError::Unknown("memory store lock poisoned".to_string()))
    }
}

impl Store for MemoryStore {
    fn read(&self, id: &CacheId) -> Result<Option<String>> {
        Ok(self.lock()?.get(id).map(|e| e.contents.clone()))
    }

    fn write(&self, id: &CacheId, contents: &str) -> Result<()> {
        let modified = self.clock.now();
        self.lock()?.insert(
            id.clone(),
            StoredEntry {
                contents: contents.to_string(),
                modified,
            },
        );
        Ok(())
    }

    fn modified_at(&self, id: &CacheId) -> Result<Option<DateTime<Utc>>> {
        Ok(self.lock()?.get(id).map(|e| e.modified))
    }

    fn list(&self, prefix: &str) -> Result<Vec<CacheId>> {
        Ok(self
            .lock()?
            .keys()
            .filter(|id| id.as_str().starts_with(prefix))
            .cloned()
            .collect())
    }
}
