//! In-memory [`RemoteStore`] for tests, demos and single-process runs

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::gateway::{RemoteStore, StoreError, ZoneRow, ZoneScope, ZoneUpdate};

#[derive(Debug, Default)]
struct Inner {
    rows: Mutex<Vec<ZoneRow>>,
    next_id: AtomicU64,
    latency: Mutex<Option<Duration>>,
    failing: AtomicBool,
}

/// Row store kept in process memory.
///
/// Assigns ids `zone-1`, `zone-2`, ... on insert. Clones share the same rows,
/// so a test can keep a handle while the gateway owns another.
#[derive(Debug, Clone, Default)]
pub struct InMemoryZoneStore {
    inner: Arc<Inner>,
}

impl InMemoryZoneStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency` (simulated network time)
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.inner.latency.lock() = latency;
    }

    /// Make every call fail with a backend error
    pub fn set_failing(&self, failing: bool) {
        self.inner.failing.store(failing, Ordering::SeqCst);
    }

    /// Snapshot of all rows, deleted ones included
    pub fn rows(&self) -> Vec<ZoneRow> {
        self.inner.rows.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.rows.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn enter(&self) -> Result<(), StoreError> {
        let latency = *self.inner.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.inner.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("store unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for InMemoryZoneStore {
    async fn insert(&self, mut row: ZoneRow) -> Result<String, StoreError> {
        self.enter().await?;
        let n = self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        row.id = format!("zone-{n}");
        row.deleted = false;
        let id = row.id.clone();
        self.inner.rows.lock().push(row);
        Ok(id)
    }

    async fn fetch(
        &self,
        owner_id: &str,
        scope: &ZoneScope,
        limit: usize,
    ) -> Result<Vec<ZoneRow>, StoreError> {
        self.enter().await?;
        let mut rows: Vec<ZoneRow> = self
            .inner
            .rows
            .lock()
            .iter()
            .filter(|r| !r.deleted && r.owner_id == owner_id && r.symbol == scope.symbol)
            .filter(|r| scope.timeframe.as_deref().map_or(true, |tf| r.timeframe == tf))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn update(&self, id: &str, update: ZoneUpdate) -> Result<(), StoreError> {
        self.enter().await?;
        let mut rows = self.inner.rows.lock();
        let row = rows
            .iter_mut()
            .find(|r| r.id == id && !r.deleted)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        row.status = update.status;
        row.retest_count = update.retest_count;
        row.last_tested_at = update.last_tested_at;
        Ok(())
    }

    async fn soft_delete(&self, id: &str) -> Result<(), StoreError> {
        self.enter().await?;
        let mut rows = self.inner.rows.lock();
        let row = rows
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        row.deleted = true;
        Ok(())
    }
}
