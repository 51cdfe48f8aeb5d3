//! Time-bounded memoization of loaded tables.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use labtrend_core::{LabtrendError, ObservationTable};

use crate::{load, LoadOptions, RowSource};

struct CacheSlot {
    loaded_at: Instant,
    table: Arc<ObservationTable>,
}

/// Wraps a source so each tab is fetched at most once per `ttl`.
///
/// Entries expire by age only; there is no size bound. Sessions may share one
/// loader: when two race on an expired tab both fetch and the last insert wins.
pub struct CachedLoader<S> {
    source: S,
    options: LoadOptions,
    ttl: Duration,
    slots: Mutex<HashMap<String, CacheSlot>>,
}

impl<S: RowSource> CachedLoader<S> {
    pub fn new(source: S, options: LoadOptions, ttl: Duration) -> Self {
        Self {
            source,
            options,
            ttl,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    /// Cached table for `tab`, fetching again once the entry is older than `ttl`.
    pub fn load(&self, tab: &str) -> Result<Arc<ObservationTable>, LabtrendError> {
        if let Some(table) = self.fresh(tab) {
            log::debug!("cache hit for tab `{tab}`");
            return Ok(table);
        }

        // Fetch outside the lock so a slow source does not block other tabs.
        let table = Arc::new(load(&self.source, tab, &self.options)?);
        self.lock().insert(
            tab.to_string(),
            CacheSlot {
                loaded_at: Instant::now(),
                table: Arc::clone(&table),
            },
        );
        Ok(table)
    }

    /// Drop the entry for `tab`; returns whether one existed.
    pub fn invalidate(&self, tab: &str) -> bool {
        self.lock().remove(tab).is_some()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn fresh(&self, tab: &str) -> Option<Arc<ObservationTable>> {
        let slots = self.lock();
        let slot = slots.get(tab)?;
        (slot.loaded_at.elapsed() < self.ttl).then(|| Arc::clone(&slot.table))
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheSlot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
