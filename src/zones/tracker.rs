//! Zone lifecycle tracking
//!
//! ```text
//! FRESH -> TESTED_1X -> TESTED_2X -> WEAK
//!   \__________\____________\__________\____-> BROKEN
//! ```
//!
//! One step per qualifying retest; any close through the far side of the band
//! breaks the zone. `WEAK`, `BROKEN` and zones that have been traded
//! `max_trades_per_zone` times leave the active set.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;

use super::{boundary::TargetConfig, gateway::ZoneScope, Zone, ZoneDraft, ZoneStatus, ZoneTrade};
use crate::{PatternError, Result};

const HOUR_MS: i64 = 60 * 60 * 1000;
const DAY_MS: i64 = 24 * HOUR_MS;

// ============================================================
// CONFIG
// ============================================================

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ZoneConfig {
    /// Minimum idle time between two counted retests
    pub retest_cooldown_ms: i64,
    /// Zones older than this are purged by `cleanup`
    pub max_zone_age_ms: i64,
    /// A zone leaves the active set once it has been traded this often
    pub max_trades_per_zone: usize,
    pub targets: TargetConfig,
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self {
            retest_cooldown_ms: HOUR_MS,
            max_zone_age_ms: 30 * DAY_MS,
            max_trades_per_zone: 2,
            targets: TargetConfig::default(),
        }
    }
}

impl ZoneConfig {
    pub fn validate(&self) -> Result<()> {
        if self.retest_cooldown_ms < 0 {
            return Err(PatternError::InvalidConfig(
                "retest_cooldown_ms must be >= 0".to_string(),
            ));
        }
        if self.max_zone_age_ms <= 0 {
            return Err(PatternError::InvalidConfig(
                "max_zone_age_ms must be > 0".to_string(),
            ));
        }
        if self.max_trades_per_zone == 0 {
            return Err(PatternError::InvalidConfig(
                "max_trades_per_zone must be > 0".to_string(),
            ));
        }
        self.targets.validate()
    }
}

// ============================================================
// STATS
// ============================================================

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ZoneStats {
    pub total: usize,
    pub active: usize,
    pub fresh: usize,
    pub tested_1x: usize,
    pub tested_2x: usize,
    pub weak: usize,
    pub broken: usize,
    pub total_trades: usize,
    /// Mean strength of active zones, 0 when none
    pub average_strength: f64,
}

// ============================================================
// TRACKER
// ============================================================

/// Owner of every live zone plus the set of ids still eligible for trading
#[derive(Debug, Default)]
pub struct ZoneTracker {
    zones: HashMap<String, Zone>,
    active: HashSet<String>,
    config: ZoneConfig,
}

impl ZoneTracker {
    pub fn new(config: ZoneConfig) -> Self {
        Self {
            zones: HashMap::new(),
            active: HashSet::new(),
            config,
        }
    }

    pub fn config(&self) -> &ZoneConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Zone> {
        self.zones.get(id)
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.active.contains(id)
    }

    /// Register a new zone as `FRESH` and return its id.
    ///
    /// The id is `{type}_{mid:.2}_{created_at}`; a numeric suffix is appended
    /// if that id is already taken.
    pub fn add_zone(&mut self, draft: ZoneDraft) -> Result<String> {
        draft.validate()?;

        let base = draft.local_id();
        let mut id = base.clone();
        let mut n = 1;
        while self.zones.contains_key(&id) {
            id = format!("{base}_{n}");
            n += 1;
        }

        let zone = Zone::from_draft(id.clone(), draft);
        tracing::debug!(
            zone_id = %id,
            zone_type = %zone.zone_type(),
            symbol = zone.symbol(),
            high = zone.high(),
            low = zone.low(),
            "zone added"
        );
        self.zones.insert(id.clone(), zone);
        self.active.insert(id.clone());
        Ok(id)
    }

    /// Active zones whose band contains `price` and whose cooldown has elapsed
    pub fn check_for_retests(&self, price: f64, now: i64) -> Vec<&Zone> {
        let cooldown = self.config.retest_cooldown_ms;
        let mut hits: Vec<&Zone> = self
            .active_iter()
            .filter(|z| z.contains(price))
            .filter(|z| z.last_tested_at().map_or(true, |t| now - t > cooldown))
            .collect();
        hits.sort_by(|a, b| a.id().cmp(b.id()));
        hits
    }

    /// Count a retest of an active zone and return its new status.
    ///
    /// Unknown and inactive zones are left untouched.
    pub fn record_retest(&mut self, id: &str, now: i64) -> Option<ZoneStatus> {
        if !self.active.contains(id) {
            return None;
        }
        let zone = self.zones.get_mut(id)?;
        zone.apply_retest(now);
        let status = zone.status();

        if !status.is_active() {
            self.active.remove(id);
            tracing::info!(zone_id = id, retests = zone.retest_count(), "zone weakened");
        } else {
            tracing::debug!(zone_id = id, status = %status, "zone retested");
        }
        Some(status)
    }

    /// Break the zone if `close` is beyond its far side.
    ///
    /// Only the close counts; wicks through the band are ignored. Returns
    /// `true` when this call broke the zone.
    pub fn check_zone_broken(&mut self, id: &str, close: f64) -> bool {
        let Some(zone) = self.zones.get_mut(id) else {
            return false;
        };
        if zone.status() == ZoneStatus::Broken || !zone.is_invalidated_by(close) {
            return false;
        }

        zone.mark_broken();
        self.active.remove(id);
        tracing::info!(zone_id = id, close, "zone broken");
        true
    }

    /// Append a trade and return the zone's trade count
    pub fn record_trade(&mut self, id: &str, trade: ZoneTrade) -> Option<usize> {
        let zone = self.zones.get_mut(id)?;
        zone.push_trade(trade);
        let count = zone.trades().len();
        if count >= self.config.max_trades_per_zone && self.active.remove(id) {
            tracing::info!(zone_id = id, trades = count, "zone retired after trade limit");
        }
        Some(count)
    }

    /// Tradeable zones, fresher first, newest first within a status
    pub fn get_active_zones(&self) -> Vec<&Zone> {
        let mut zones: Vec<&Zone> = self.active_iter().filter(|z| z.status().is_active()).collect();
        zones.sort_by(|a, b| {
            a.status()
                .rank()
                .cmp(&b.status().rank())
                .then(b.created_at().cmp(&a.created_at()))
        });
        zones
    }

    /// Purge zones older than `max_zone_age_ms`, whatever their state
    pub fn cleanup(&mut self, now: i64) -> usize {
        let max_age = self.config.max_zone_age_ms;
        let before = self.zones.len();
        self.zones.retain(|_, z| now - z.created_at() <= max_age);
        let zones = &self.zones;
        self.active.retain(|id| zones.contains_key(id));

        let purged = before - self.zones.len();
        if purged > 0 {
            tracing::debug!(purged, remaining = self.zones.len(), "expired zones purged");
        }
        purged
    }

    pub fn remove(&mut self, id: &str) -> Option<Zone> {
        self.active.remove(id);
        self.zones.remove(id)
    }

    /// Move a zone to a new id, keeping its active membership.
    ///
    /// Fails when `old` is unknown or `new` is already taken.
    pub fn rekey(&mut self, old: &str, new: &str) -> bool {
        if old == new {
            return self.zones.contains_key(old);
        }
        if self.zones.contains_key(new) {
            return false;
        }
        let Some(mut zone) = self.zones.remove(old) else {
            return false;
        };

        zone.set_id(new.to_string());
        self.zones.insert(new.to_string(), zone);
        if self.active.remove(old) {
            self.active.insert(new.to_string());
        }
        tracing::info!(old_id = old, new_id = new, "zone re-keyed");
        true
    }

    /// Insert a zone restored from elsewhere unless its id is already known.
    ///
    /// Live local state always wins over the incoming copy.
    pub fn insert_if_absent(&mut self, zone: Zone) -> bool {
        if self.zones.contains_key(zone.id()) {
            return false;
        }
        let id = zone.id().to_string();
        if zone.status().is_active() && zone.trades().len() < self.config.max_trades_per_zone {
            self.active.insert(id.clone());
        }
        self.zones.insert(id, zone);
        true
    }

    /// All zones in a scope, newest first
    pub fn zones_in_scope(&self, scope: &ZoneScope) -> Vec<&Zone> {
        let mut zones: Vec<&Zone> = self.zones.values().filter(|z| scope.matches(z)).collect();
        zones.sort_by(|a, b| b.created_at().cmp(&a.created_at()).then(a.id().cmp(b.id())));
        zones
    }

    pub fn stats(&self) -> ZoneStats {
        let mut stats = ZoneStats {
            total: self.zones.len(),
            ..Default::default()
        };

        for zone in self.zones.values() {
            match zone.status() {
                ZoneStatus::Fresh => stats.fresh += 1,
                ZoneStatus::Tested1x => stats.tested_1x += 1,
                ZoneStatus::Tested2x => stats.tested_2x += 1,
                ZoneStatus::Weak => stats.weak += 1,
                ZoneStatus::Broken => stats.broken += 1,
            }
            stats.total_trades += zone.trades().len();
        }

        let active = self.get_active_zones();
        stats.active = active.len();
        if !active.is_empty() {
            stats.average_strength =
                active.iter().map(|z| z.strength()).sum::<f64>() / active.len() as f64;
        }
        stats
    }

    fn active_iter(&self) -> impl Iterator<Item = &Zone> {
        self.active.iter().filter_map(|id| self.zones.get(id))
    }
}

// ============================================================
// SHARED HANDLE
// ============================================================

/// Cloneable process-wide handle to one [`ZoneTracker`].
///
/// Every method takes the lock for the duration of a single tracker call and
/// returns owned zones, so no guard ever outlives the call.
#[derive(Debug, Clone, Default)]
pub struct ZoneRegistry {
    inner: Arc<RwLock<ZoneTracker>>,
}

impl ZoneRegistry {
    pub fn new(config: ZoneConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(ZoneTracker::new(config))),
        }
    }

    /// Run `f` under the read lock
    pub fn read<R>(&self, f: impl FnOnce(&ZoneTracker) -> R) -> R {
        f(&self.inner.read())
    }

    /// Run `f` under the write lock
    pub fn write<R>(&self, f: impl FnOnce(&mut ZoneTracker) -> R) -> R {
        f(&mut self.inner.write())
    }

    pub fn add_zone(&self, draft: ZoneDraft) -> Result<String> {
        self.write(|t| t.add_zone(draft))
    }

    pub fn get(&self, id: &str) -> Option<Zone> {
        self.read(|t| t.get(id).cloned())
    }

    pub fn check_for_retests(&self, price: f64, now: i64) -> Vec<Zone> {
        self.read(|t| t.check_for_retests(price, now).into_iter().cloned().collect())
    }

    pub fn record_retest(&self, id: &str, now: i64) -> Option<ZoneStatus> {
        self.write(|t| t.record_retest(id, now))
    }

    pub fn check_zone_broken(&self, id: &str, close: f64) -> bool {
        self.write(|t| t.check_zone_broken(id, close))
    }

    pub fn record_trade(&self, id: &str, trade: ZoneTrade) -> Option<usize> {
        self.write(|t| t.record_trade(id, trade))
    }

    pub fn get_active_zones(&self) -> Vec<Zone> {
        self.read(|t| t.get_active_zones().into_iter().cloned().collect())
    }

    pub fn cleanup(&self, now: i64) -> usize {
        self.write(|t| t.cleanup(now))
    }

    pub fn stats(&self) -> ZoneStats {
        self.read(|t| t.stats())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zones::{test_draft, ZoneType};
    use crate::Direction;

    const T0: i64 = 1_700_000_000_000;

    fn tracker_with(zone_type: ZoneType) -> (ZoneTracker, String) {
        let mut tracker = ZoneTracker::default();
        let id = tracker.add_zone(test_draft(zone_type, 100.0, 110.0, T0)).unwrap();
        (tracker, id)
    }

    #[test]
    fn test_add_zone_starts_fresh() {
        let (tracker, id) = tracker_with(ZoneType::Lfz);
        let zone = tracker.get(&id).unwrap();
        assert_eq!(zone.status(), ZoneStatus::Fresh);
        assert_eq!(zone.retest_count(), 0);
        assert!(tracker.is_active(&id));
        assert_eq!(id, format!("LFZ_105.00_{T0}"));
    }

    #[test]
    fn test_duplicate_ids_get_suffix() {
        let (mut tracker, id) = tracker_with(ZoneType::Lfz);
        let second = tracker.add_zone(test_draft(ZoneType::Lfz, 100.0, 110.0, T0)).unwrap();
        assert_ne!(id, second);
        assert_eq!(tracker.len(), 2);
    }

    #[test]
    fn test_add_zone_rejects_inverted_band() {
        let mut tracker = ZoneTracker::default();
        assert!(tracker.add_zone(test_draft(ZoneType::Hfz, 110.0, 100.0, T0)).is_err());
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_retest_cooldown() {
        let (mut tracker, id) = tracker_with(ZoneType::Lfz);
        assert_eq!(tracker.check_for_retests(105.0, T0).len(), 1);
        assert!(tracker.check_for_retests(111.0, T0).is_empty());

        tracker.record_retest(&id, T0);
        // Within the hour: not yet eligible again
        assert!(tracker.check_for_retests(105.0, T0 + HOUR_MS).is_empty());
        assert_eq!(tracker.check_for_retests(105.0, T0 + HOUR_MS + 1).len(), 1);
    }

    #[test]
    fn test_three_retests_weaken() {
        let (mut tracker, id) = tracker_with(ZoneType::Hfz);
        assert_eq!(tracker.record_retest(&id, T0), Some(ZoneStatus::Tested1x));
        assert_eq!(tracker.record_retest(&id, T0 + 2 * HOUR_MS), Some(ZoneStatus::Tested2x));
        assert_eq!(tracker.record_retest(&id, T0 + 4 * HOUR_MS), Some(ZoneStatus::Weak));

        assert!(!tracker.is_active(&id));
        assert!(tracker.get_active_zones().is_empty());
        // Inactive zones are not retested further
        assert_eq!(tracker.record_retest(&id, T0 + 6 * HOUR_MS), None);
        assert_eq!(tracker.get(&id).unwrap().retest_count(), 3);
    }

    #[test]
    fn test_break_from_fresh_and_from_weak() {
        let (mut tracker, id) = tracker_with(ZoneType::Lfz);
        assert!(!tracker.check_zone_broken(&id, 100.0));
        assert!(tracker.check_zone_broken(&id, 99.99));
        assert_eq!(tracker.get(&id).unwrap().status(), ZoneStatus::Broken);
        assert!(!tracker.is_active(&id));
        // Already broken
        assert!(!tracker.check_zone_broken(&id, 90.0));

        let (mut tracker, id) = tracker_with(ZoneType::Hfz);
        for i in 0..3 {
            tracker.record_retest(&id, T0 + i * 2 * HOUR_MS);
        }
        assert!(tracker.check_zone_broken(&id, 111.0));
        assert_eq!(tracker.get(&id).unwrap().status(), ZoneStatus::Broken);
    }

    #[test]
    fn test_two_trades_retire_zone() {
        let (mut tracker, id) = tracker_with(ZoneType::Lfz);
        let trade = ZoneTrade {
            opened_at: T0,
            entry: 110.0,
            direction: Direction::Long,
            pnl: None,
        };
        assert_eq!(tracker.record_trade(&id, trade.clone()), Some(1));
        assert!(tracker.is_active(&id));
        assert_eq!(tracker.record_trade(&id, trade), Some(2));
        assert!(!tracker.is_active(&id));
        // Status is unaffected
        assert_eq!(tracker.get(&id).unwrap().status(), ZoneStatus::Fresh);
    }

    #[test]
    fn test_active_ordering() {
        let mut tracker = ZoneTracker::default();
        let old = tracker.add_zone(test_draft(ZoneType::Lfz, 90.0, 95.0, T0)).unwrap();
        let new = tracker.add_zone(test_draft(ZoneType::Lfz, 80.0, 85.0, T0 + 1)).unwrap();
        let tested = tracker.add_zone(test_draft(ZoneType::Lfz, 70.0, 75.0, T0 + 2)).unwrap();
        tracker.record_retest(&tested, T0 + 3);

        let ids: Vec<&str> = tracker.get_active_zones().iter().map(|z| z.id()).collect();
        assert_eq!(ids, vec![new.as_str(), old.as_str(), tested.as_str()]);
    }

    #[test]
    fn test_cleanup_ignores_state() {
        let (mut tracker, id) = tracker_with(ZoneType::Lfz);
        let young = tracker
            .add_zone(test_draft(ZoneType::Hfz, 120.0, 125.0, T0 + 10 * DAY_MS))
            .unwrap();

        assert_eq!(tracker.cleanup(T0 + 30 * DAY_MS), 0);
        assert_eq!(tracker.cleanup(T0 + 31 * DAY_MS), 1);
        assert!(tracker.get(&id).is_none());
        assert!(!tracker.is_active(&id));
        assert!(tracker.get(&young).is_some());
    }

    #[test]
    fn test_rekey_moves_active_membership() {
        let (mut tracker, id) = tracker_with(ZoneType::Lfz);
        assert!(tracker.rekey(&id, "zone-1"));
        assert!(tracker.get(&id).is_none());
        assert_eq!(tracker.get("zone-1").unwrap().id(), "zone-1");
        assert!(tracker.is_active("zone-1"));
        assert!(!tracker.rekey("missing", "zone-2"));

        let other = tracker.add_zone(test_draft(ZoneType::Hfz, 120.0, 125.0, T0)).unwrap();
        assert!(!tracker.rekey(&other, "zone-1"));
    }

    #[test]
    fn test_insert_if_absent_keeps_live_state() {
        let (mut tracker, id) = tracker_with(ZoneType::Lfz);
        tracker.record_retest(&id, T0);

        let stale = Zone::from_draft(id.clone(), test_draft(ZoneType::Lfz, 100.0, 110.0, T0));
        assert!(!tracker.insert_if_absent(stale));
        assert_eq!(tracker.get(&id).unwrap().status(), ZoneStatus::Tested1x);

        let weak = Zone::restore(
            "zone-9".into(),
            test_draft(ZoneType::Hfz, 120.0, 125.0, T0),
            ZoneStatus::Weak,
            3,
            Some(T0),
        );
        assert!(tracker.insert_if_absent(weak));
        assert!(!tracker.is_active("zone-9"));
    }

    #[test]
    fn test_stats() {
        let (mut tracker, id) = tracker_with(ZoneType::Lfz);
        tracker.add_zone(test_draft(ZoneType::Hfz, 120.0, 125.0, T0)).unwrap();
        tracker.check_zone_broken(&id, 50.0);

        let stats = tracker.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.active, 1);
        assert_eq!(stats.fresh, 1);
        assert_eq!(stats.broken, 1);
        assert!((stats.average_strength - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_registry_shares_state() {
        let registry = ZoneRegistry::default();
        let handle = registry.clone();
        let id = registry.add_zone(test_draft(ZoneType::Lfz, 100.0, 110.0, T0)).unwrap();

        assert_eq!(handle.check_for_retests(105.0, T0).len(), 1);
        handle.record_retest(&id, T0);
        assert_eq!(registry.get(&id).unwrap().status(), ZoneStatus::Tested1x);
        assert_eq!(registry.get_active_zones().len(), 1);
    }
}
