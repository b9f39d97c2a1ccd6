//! Supply and demand zones
//!
//! A [`Zone`] is a price band taken from a consolidation range. Supply zones
//! (HFZ) sit above price and are traded short; demand zones (LFZ) sit below
//! price and are traded long.
//!
//! - [`boundary`] turns a consolidation range into a zone draft plus a risk summary
//! - [`tracker`] owns live zones and drives their lifecycle
//! - [`gateway`] mirrors the tracker into a durable store
//! - [`store`] is an in-memory store for tests and local runs

pub mod boundary;
pub mod gateway;
pub mod store;
pub mod tracker;

use std::fmt;
use std::str::FromStr;

use crate::{Direction, PatternError};

// ============================================================
// ZONE TYPE / STATUS
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ZoneType {
    /// High Frequency Zone (supply)
    Hfz,
    /// Low Frequency Zone (demand)
    Lfz,
}

impl ZoneType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ZoneType::Hfz => "HFZ",
            ZoneType::Lfz => "LFZ",
        }
    }

    /// Trade direction on a reaction from the zone
    pub fn direction(&self) -> Direction {
        match self {
            ZoneType::Hfz => Direction::Short,
            ZoneType::Lfz => Direction::Long,
        }
    }
}

impl fmt::Display for ZoneType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ZoneType {
    type Err = PatternError;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "HFZ" | "SUPPLY" => Ok(ZoneType::Hfz),
            "LFZ" | "DEMAND" => Ok(ZoneType::Lfz),
            _ => Err(PatternError::UnknownVariant {
                kind: "zone type",
                value: s.to_string(),
            }),
        }
    }
}

/// Lifecycle state. Active states degrade one step per retest; any state may
/// jump to `Broken`. Nothing ever moves back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ZoneStatus {
    Fresh,
    #[serde(rename = "TESTED_1X")]
    Tested1x,
    #[serde(rename = "TESTED_2X")]
    Tested2x,
    Weak,
    Broken,
}

impl ZoneStatus {
    pub const ALL: [ZoneStatus; 5] = [
        ZoneStatus::Fresh,
        ZoneStatus::Tested1x,
        ZoneStatus::Tested2x,
        ZoneStatus::Weak,
        ZoneStatus::Broken,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ZoneStatus::Fresh => "FRESH",
            ZoneStatus::Tested1x => "TESTED_1X",
            ZoneStatus::Tested2x => "TESTED_2X",
            ZoneStatus::Weak => "WEAK",
            ZoneStatus::Broken => "BROKEN",
        }
    }

    /// Tradeable states
    #[inline]
    pub fn is_active(self) -> bool {
        matches!(
            self,
            ZoneStatus::Fresh | ZoneStatus::Tested1x | ZoneStatus::Tested2x
        )
    }

    /// Position along the lifecycle, 0 = fresh
    #[inline]
    pub fn rank(self) -> u8 {
        match self {
            ZoneStatus::Fresh => 0,
            ZoneStatus::Tested1x => 1,
            ZoneStatus::Tested2x => 2,
            ZoneStatus::Weak => 3,
            ZoneStatus::Broken => 4,
        }
    }

    /// Status after `count` retests of a zone that is not broken
    pub fn from_retest_count(count: u32) -> Self {
        match count {
            0 => ZoneStatus::Fresh,
            1 => ZoneStatus::Tested1x,
            2 => ZoneStatus::Tested2x,
            _ => ZoneStatus::Weak,
        }
    }
}

impl fmt::Display for ZoneStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ZoneStatus {
    type Err = PatternError;

    fn from_str(s: &str) -> crate::Result<Self> {
        ZoneStatus::ALL
            .into_iter()
            .find(|st| st.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| PatternError::UnknownVariant {
                kind: "zone status",
                value: s.to_string(),
            })
    }
}

// ============================================================
// ZONE DATA
// ============================================================

/// Context captured when the zone was detected
#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ZoneMetadata {
    pub symbol: String,
    pub timeframe: String,
    pub pattern_type: Option<String>,
    /// Detection confidence in 0.0..=1.0
    pub confidence: f64,
    pub entry: f64,
    pub stop: f64,
    /// Strength at detection time
    pub strength: f64,
    pub targets: Vec<f64>,
}

/// A trade taken from a zone
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ZoneTrade {
    pub opened_at: i64,
    pub entry: f64,
    pub direction: Direction,
    /// Realized result in price units, once closed
    pub pnl: Option<f64>,
}

/// A zone as proposed by a caller, before the tracker owns it
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ZoneDraft {
    pub zone_type: ZoneType,
    pub high: f64,
    pub low: f64,
    /// Unix milliseconds
    pub created_at: i64,
    pub metadata: ZoneMetadata,
}

impl ZoneDraft {
    pub fn validate(&self) -> crate::Result<()> {
        if !self.high.is_finite() || !self.low.is_finite() {
            return Err(PatternError::InvalidValue("zone bounds must be finite"));
        }
        if self.high <= self.low {
            return Err(PatternError::InvalidValue("zone high must be above zone low"));
        }
        if !(0.0..=1.0).contains(&self.metadata.confidence) {
            return Err(PatternError::OutOfRange {
                field: "confidence",
                value: self.metadata.confidence,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(())
    }

    #[inline]
    pub fn mid(&self) -> f64 {
        (self.high + self.low) / 2.0
    }

    /// Deterministic local id: `{type}_{mid:.2}_{created_at}`
    pub fn local_id(&self) -> String {
        format!("{}_{:.2}_{}", self.zone_type, self.mid(), self.created_at)
    }
}

/// A tracked zone.
///
/// Bounds, entry, stop and metadata are fixed at creation. Only the tracker
/// moves `status`, `retest_count`, `last_tested_at` and `trades`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Zone {
    id: String,
    zone_type: ZoneType,
    high: f64,
    low: f64,
    mid: f64,
    status: ZoneStatus,
    retest_count: u32,
    created_at: i64,
    last_tested_at: Option<i64>,
    trades: Vec<ZoneTrade>,
    metadata: ZoneMetadata,
}

impl Zone {
    pub(crate) fn from_draft(id: String, draft: ZoneDraft) -> Self {
        Self {
            id,
            zone_type: draft.zone_type,
            mid: draft.mid(),
            high: draft.high,
            low: draft.low,
            status: ZoneStatus::Fresh,
            retest_count: 0,
            created_at: draft.created_at,
            last_tested_at: None,
            trades: Vec::new(),
            metadata: draft.metadata,
        }
    }

    /// Rebuild a zone with lifecycle state, e.g. from a store row
    pub(crate) fn restore(
        id: String,
        draft: ZoneDraft,
        status: ZoneStatus,
        retest_count: u32,
        last_tested_at: Option<i64>,
    ) -> Self {
        let mut zone = Self::from_draft(id, draft);
        zone.status = status;
        zone.retest_count = retest_count;
        zone.last_tested_at = last_tested_at;
        zone
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn zone_type(&self) -> ZoneType {
        self.zone_type
    }

    pub fn high(&self) -> f64 {
        self.high
    }

    pub fn low(&self) -> f64 {
        self.low
    }

    pub fn mid(&self) -> f64 {
        self.mid
    }

    pub fn width(&self) -> f64 {
        self.high - self.low
    }

    pub fn status(&self) -> ZoneStatus {
        self.status
    }

    pub fn retest_count(&self) -> u32 {
        self.retest_count
    }

    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    pub fn last_tested_at(&self) -> Option<i64> {
        self.last_tested_at
    }

    pub fn trades(&self) -> &[ZoneTrade] {
        &self.trades
    }

    pub fn metadata(&self) -> &ZoneMetadata {
        &self.metadata
    }

    pub fn symbol(&self) -> &str {
        &self.metadata.symbol
    }

    pub fn timeframe(&self) -> &str {
        &self.metadata.timeframe
    }

    /// Inclusive band check
    #[inline]
    pub fn contains(&self, price: f64) -> bool {
        price >= self.low && price <= self.high
    }

    /// Close beyond the far side of the band
    #[inline]
    pub fn is_invalidated_by(&self, close: f64) -> bool {
        match self.zone_type {
            ZoneType::Hfz => close > self.high,
            ZoneType::Lfz => close < self.low,
        }
    }

    /// Current strength in `0..=100`
    pub fn strength(&self) -> f64 {
        if self.status == ZoneStatus::Broken {
            return 0.0;
        }
        let mut strength =
            (100.0 - 15.0 * self.retest_count as f64) * self.metadata.confidence.clamp(0.0, 1.0);
        if self.status == ZoneStatus::Fresh {
            strength += 10.0;
        }
        strength.clamp(0.0, 100.0)
    }

    /// Back to the draft the zone was built from
    pub fn to_draft(&self) -> ZoneDraft {
        ZoneDraft {
            zone_type: self.zone_type,
            high: self.high,
            low: self.low,
            created_at: self.created_at,
            metadata: self.metadata.clone(),
        }
    }

    // Lifecycle mutators, tracker only

    pub(crate) fn set_id(&mut self, id: String) {
        self.id = id;
    }

    /// Count a retest. Status never moves backwards and broken zones stay broken.
    pub(crate) fn apply_retest(&mut self, now: i64) {
        self.retest_count = self.retest_count.saturating_add(1);
        self.last_tested_at = Some(now);
        let next = ZoneStatus::from_retest_count(self.retest_count);
        if self.status != ZoneStatus::Broken && next.rank() > self.status.rank() {
            self.status = next;
        }
    }

    pub(crate) fn mark_broken(&mut self) {
        self.status = ZoneStatus::Broken;
    }

    pub(crate) fn push_trade(&mut self, trade: ZoneTrade) {
        self.trades.push(trade);
    }
}

#[cfg(test)]
pub(crate) fn test_draft(zone_type: ZoneType, low: f64, high: f64, created_at: i64) -> ZoneDraft {
    ZoneDraft {
        zone_type,
        high,
        low,
        created_at,
        metadata: ZoneMetadata {
            symbol: "EURUSD".to_string(),
            timeframe: "1h".to_string(),
            confidence: 0.8,
            ..Default::default()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_id_format() {
        let draft = test_draft(ZoneType::Lfz, 100.0, 110.0, 1_700_000_000_000);
        assert_eq!(draft.local_id(), "LFZ_105.00_1700000000000");
    }

    #[test]
    fn test_draft_validation() {
        assert!(test_draft(ZoneType::Hfz, 100.0, 110.0, 0).validate().is_ok());
        assert!(test_draft(ZoneType::Hfz, 110.0, 100.0, 0).validate().is_err());
        assert!(test_draft(ZoneType::Hfz, 100.0, f64::NAN, 0).validate().is_err());

        let mut draft = test_draft(ZoneType::Hfz, 100.0, 110.0, 0);
        draft.metadata.confidence = 80.0;
        assert!(draft.validate().is_err());
    }

    #[test]
    fn test_invalidation_uses_far_side() {
        let lfz = Zone::from_draft("a".into(), test_draft(ZoneType::Lfz, 100.0, 110.0, 0));
        assert!(lfz.is_invalidated_by(99.0));
        assert!(!lfz.is_invalidated_by(100.0));
        assert!(!lfz.is_invalidated_by(120.0));

        let hfz = Zone::from_draft("b".into(), test_draft(ZoneType::Hfz, 100.0, 110.0, 0));
        assert!(hfz.is_invalidated_by(110.5));
        assert!(!hfz.is_invalidated_by(90.0));
    }

    #[test]
    fn test_strength() {
        let mut zone = Zone::from_draft("a".into(), test_draft(ZoneType::Lfz, 100.0, 110.0, 0));
        // 100 * 0.8 + 10 fresh bonus
        assert!((zone.strength() - 90.0).abs() < 1e-9);

        zone.apply_retest(1);
        assert!((zone.strength() - 68.0).abs() < 1e-9);

        zone.mark_broken();
        assert_eq!(zone.strength(), 0.0);
    }

    #[test]
    fn test_retest_never_unbreaks() {
        let mut zone = Zone::from_draft("a".into(), test_draft(ZoneType::Hfz, 100.0, 110.0, 0));
        zone.mark_broken();
        zone.apply_retest(5);
        assert_eq!(zone.status(), ZoneStatus::Broken);
        assert_eq!(zone.retest_count(), 1);
    }

    #[test]
    fn test_status_strings() {
        for status in ZoneStatus::ALL {
            assert_eq!(status.as_str().parse::<ZoneStatus>().unwrap(), status);
        }
        assert_eq!(
            serde_json::to_string(&ZoneStatus::Tested1x).unwrap(),
            "\"TESTED_1X\""
        );
        assert_eq!("supply".parse::<ZoneType>().unwrap(), ZoneType::Hfz);
        assert!("NEUTRAL".parse::<ZoneType>().is_err());
    }
}
