//! Cache-first persistence for zones
//!
//! The gateway sits between two ports:
//!
//! - [`LocalStore`]: synchronous in-process state, the source of truth for reads
//! - [`RemoteStore`]: a durable row store reached over async I/O
//!
//! Every mutation is applied locally first. Remote calls are bounded by
//! `store_timeout_ms`; failures and timeouts are logged and never reach the
//! caller.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use super::{
    tracker::{ZoneRegistry, ZoneStats},
    Zone, ZoneDraft, ZoneMetadata, ZoneStatus, ZoneType,
};
use crate::{PatternError, Result};

// ============================================================
// ERRORS
// ============================================================

/// Failures reported by a [`RemoteStore`]
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("zone {0} not found in store")]
    NotFound(String),

    #[error("invalid zone row {id}: {reason}")]
    InvalidRow { id: String, reason: String },
}

// ============================================================
// ROWS
// ============================================================

/// Which zones a load covers
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ZoneScope {
    pub symbol: String,
    /// `None` covers every timeframe of the symbol
    pub timeframe: Option<String>,
}

impl ZoneScope {
    pub fn symbol(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe: None,
        }
    }

    pub fn with_timeframe(mut self, timeframe: impl Into<String>) -> Self {
        self.timeframe = Some(timeframe.into());
        self
    }

    pub fn matches(&self, zone: &Zone) -> bool {
        zone.symbol() == self.symbol
            && self
                .timeframe
                .as_deref()
                .map_or(true, |tf| zone.timeframe() == tf)
    }
}

/// Store representation of a zone. Trades stay in memory.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ZoneRow {
    pub id: String,
    pub owner_id: String,
    pub symbol: String,
    pub timeframe: String,
    pub zone_type: String,
    pub high: f64,
    pub low: f64,
    pub mid: f64,
    pub status: String,
    pub retest_count: u32,
    pub created_at: i64,
    pub last_tested_at: Option<i64>,
    pub pattern_type: Option<String>,
    pub confidence: f64,
    pub entry: f64,
    pub stop: f64,
    pub strength: f64,
    pub targets: Vec<f64>,
    #[serde(default)]
    pub deleted: bool,
}

impl ZoneRow {
    pub fn from_zone(zone: &Zone, owner_id: &str) -> Self {
        let meta = zone.metadata();
        Self {
            id: zone.id().to_string(),
            owner_id: owner_id.to_string(),
            symbol: meta.symbol.clone(),
            timeframe: meta.timeframe.clone(),
            zone_type: zone.zone_type().as_str().to_string(),
            high: zone.high(),
            low: zone.low(),
            mid: zone.mid(),
            status: zone.status().as_str().to_string(),
            retest_count: zone.retest_count(),
            created_at: zone.created_at(),
            last_tested_at: zone.last_tested_at(),
            pattern_type: meta.pattern_type.clone(),
            confidence: meta.confidence,
            entry: meta.entry,
            stop: meta.stop,
            strength: zone.strength(),
            targets: meta.targets.clone(),
            deleted: false,
        }
    }

    pub fn to_zone(&self) -> std::result::Result<Zone, StoreError> {
        let invalid = |e: PatternError| StoreError::InvalidRow {
            id: self.id.clone(),
            reason: e.to_string(),
        };

        let zone_type: ZoneType = self.zone_type.parse().map_err(invalid)?;
        let status: ZoneStatus = self.status.parse().map_err(invalid)?;
        let draft = ZoneDraft {
            zone_type,
            high: self.high,
            low: self.low,
            created_at: self.created_at,
            metadata: ZoneMetadata {
                symbol: self.symbol.clone(),
                timeframe: self.timeframe.clone(),
                pattern_type: self.pattern_type.clone(),
                confidence: self.confidence,
                entry: self.entry,
                stop: self.stop,
                strength: self.strength,
                targets: self.targets.clone(),
            },
        };
        draft.validate().map_err(invalid)?;

        Ok(Zone::restore(
            self.id.clone(),
            draft,
            status,
            self.retest_count,
            self.last_tested_at,
        ))
    }
}

/// Mutable columns of a stored zone
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ZoneUpdate {
    pub status: String,
    pub retest_count: u32,
    pub last_tested_at: Option<i64>,
}

impl ZoneUpdate {
    pub fn from_zone(zone: &Zone) -> Self {
        Self {
            status: zone.status().as_str().to_string(),
            retest_count: zone.retest_count(),
            last_tested_at: zone.last_tested_at(),
        }
    }
}

// ============================================================
// PORTS
// ============================================================

/// Durable zone store
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Persist a new row and return the id the store assigned to it
    async fn insert(&self, row: ZoneRow) -> std::result::Result<String, StoreError>;

    /// Non-deleted rows for an owner and scope, newest first, at most `limit`
    async fn fetch(
        &self,
        owner_id: &str,
        scope: &ZoneScope,
        limit: usize,
    ) -> std::result::Result<Vec<ZoneRow>, StoreError>;

    async fn update(&self, id: &str, update: ZoneUpdate) -> std::result::Result<(), StoreError>;

    async fn soft_delete(&self, id: &str) -> std::result::Result<(), StoreError>;
}

/// In-process zone state
pub trait LocalStore: Send + Sync {
    fn add_zone(&self, draft: ZoneDraft) -> Result<String>;

    fn get(&self, id: &str) -> Option<Zone>;

    /// Insert unless the id exists; existing state always wins
    fn insert_if_absent(&self, zone: Zone) -> bool;

    fn rekey(&self, old: &str, new: &str) -> bool;

    fn record_retest(&self, id: &str, now: i64) -> Option<ZoneStatus>;

    fn check_zone_broken(&self, id: &str, close: f64) -> bool;

    fn remove(&self, id: &str) -> Option<Zone>;

    fn zones_in_scope(&self, scope: &ZoneScope) -> Vec<Zone>;

    fn active_zones(&self) -> Vec<Zone>;

    fn stats(&self) -> ZoneStats;
}

impl LocalStore for ZoneRegistry {
    fn add_zone(&self, draft: ZoneDraft) -> Result<String> {
        ZoneRegistry::add_zone(self, draft)
    }

    fn get(&self, id: &str) -> Option<Zone> {
        ZoneRegistry::get(self, id)
    }

    fn insert_if_absent(&self, zone: Zone) -> bool {
        self.write(|t| t.insert_if_absent(zone))
    }

    fn rekey(&self, old: &str, new: &str) -> bool {
        self.write(|t| t.rekey(old, new))
    }

    fn record_retest(&self, id: &str, now: i64) -> Option<ZoneStatus> {
        ZoneRegistry::record_retest(self, id, now)
    }

    fn check_zone_broken(&self, id: &str, close: f64) -> bool {
        ZoneRegistry::check_zone_broken(self, id, close)
    }

    fn remove(&self, id: &str) -> Option<Zone> {
        self.write(|t| t.remove(id))
    }

    fn zones_in_scope(&self, scope: &ZoneScope) -> Vec<Zone> {
        self.read(|t| t.zones_in_scope(scope).into_iter().cloned().collect())
    }

    fn active_zones(&self) -> Vec<Zone> {
        self.get_active_zones()
    }

    fn stats(&self) -> ZoneStats {
        ZoneRegistry::stats(self)
    }
}

// ============================================================
// GATEWAY
// ============================================================

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Deadline for every remote call
    pub store_timeout_ms: u64,
    /// Maximum rows fetched per load
    pub page_size: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            store_timeout_ms: 10_000,
            page_size: 100,
        }
    }
}

impl GatewayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.store_timeout_ms == 0 {
            return Err(PatternError::InvalidConfig(
                "store_timeout_ms must be > 0".to_string(),
            ));
        }
        if self.page_size == 0 {
            return Err(PatternError::InvalidConfig(
                "page_size must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    #[inline]
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

/// Cache-first zone persistence for one owner
pub struct ZoneGateway<R, L = ZoneRegistry> {
    remote: R,
    local: L,
    owner_id: String,
    config: GatewayConfig,
}

impl<R: RemoteStore, L: LocalStore> ZoneGateway<R, L> {
    pub fn new(remote: R, local: L, owner_id: impl Into<String>, config: GatewayConfig) -> Self {
        Self {
            remote,
            local,
            owner_id: owner_id.into(),
            config,
        }
    }

    pub fn local(&self) -> &L {
        &self.local
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// Merge the newest stored zones for `scope` into local state and return
    /// every local zone in scope.
    ///
    /// Rows whose id is already known locally are skipped. A failed or
    /// timed-out fetch leaves local state as it is.
    pub async fn load_zones(&self, scope: &ZoneScope) -> Vec<Zone> {
        let fetch = self
            .remote
            .fetch(&self.owner_id, scope, self.config.page_size);

        match self.bounded(fetch).await {
            Ok(rows) => {
                let fetched = rows.len();
                let mut merged = 0;
                for row in rows.into_iter().filter(|r| !r.deleted) {
                    match row.to_zone() {
                        Ok(zone) => {
                            if self.local.insert_if_absent(zone) {
                                merged += 1;
                            }
                        }
                        Err(error) => {
                            tracing::warn!(
                                zone_id = %row.id,
                                %error,
                                "skipping unreadable zone row"
                            );
                        }
                    }
                }
                tracing::debug!(symbol = %scope.symbol, fetched, merged, "zones loaded");
            }
            Err(error) => {
                tracing::warn!(
                    symbol = %scope.symbol,
                    %error,
                    "zone load failed, using local zones"
                );
            }
        }

        self.local.zones_in_scope(scope)
    }

    /// Register a zone locally, then persist it.
    ///
    /// Returns the store id when the insert succeeds (the zone is re-keyed to
    /// it), otherwise the local id. Only draft validation errors are returned.
    /// A zone deleted while its insert is in flight has the new row
    /// soft-deleted as well.
    pub async fn save_zone(&self, draft: ZoneDraft) -> Result<String> {
        let local_id = self.local.add_zone(draft)?;
        let Some(zone) = self.local.get(&local_id) else {
            return Ok(local_id);
        };
        let row = ZoneRow::from_zone(&zone, &self.owner_id);

        match self.bounded(self.remote.insert(row)).await {
            Ok(store_id) => {
                if self.local.rekey(&local_id, &store_id) {
                    return Ok(store_id);
                }
                if self.local.get(&local_id).is_none() {
                    // Deleted locally while the insert was in flight
                    let orphan = self.bounded(self.remote.soft_delete(&store_id)).await;
                    if let Err(error) = orphan {
                        tracing::warn!(
                            zone_id = %local_id,
                            %store_id,
                            %error,
                            "orphaned zone row not deleted"
                        );
                    }
                } else {
                    tracing::warn!(
                        zone_id = %local_id,
                        %store_id,
                        "could not adopt store id, keeping local id"
                    );
                }
                Ok(local_id)
            }
            Err(error) => {
                tracing::warn!(zone_id = %local_id, %error, "zone insert failed, keeping local id");
                Ok(local_id)
            }
        }
    }

    /// Count a retest locally, then push the new status to the store
    pub async fn update_zone_retest(&self, id: &str, now: i64) -> Option<ZoneStatus> {
        let status = self.local.record_retest(id, now)?;
        self.push_update(id).await;
        Some(status)
    }

    /// Break the zone locally if `close` invalidates it, then push the change
    pub async fn mark_zone_broken(&self, id: &str, close: f64) -> bool {
        if !self.local.check_zone_broken(id, close) {
            return false;
        }
        self.push_update(id).await;
        true
    }

    /// Drop the zone locally and soft-delete it in the store
    pub async fn delete_zone(&self, id: &str) -> bool {
        let removed = self.local.remove(id).is_some();
        if let Err(error) = self.bounded(self.remote.soft_delete(id)).await {
            tracing::warn!(zone_id = id, %error, "zone delete not propagated");
        }
        removed
    }

    pub fn get_active_zones(&self) -> Vec<Zone> {
        self.local.active_zones()
    }

    pub fn get_zone_stats(&self) -> ZoneStats {
        self.local.stats()
    }

    async fn push_update(&self, id: &str) {
        let Some(zone) = self.local.get(id) else {
            return;
        };
        let update = ZoneUpdate::from_zone(&zone);
        if let Err(error) = self.bounded(self.remote.update(id, update)).await {
            tracing::warn!(zone_id = id, %error, "zone update not propagated");
        }
    }

    async fn bounded<T, F>(&self, call: F) -> std::result::Result<T, StoreError>
    where
        F: Future<Output = std::result::Result<T, StoreError>>,
    {
        let limit = self.config.store_timeout();
        match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(limit)),
        }
    }
}
