//! Zone boundaries, width checks and take-profit placement
//!
//! Everything here is a pure function of candles and prices. Invalid input
//! yields `None` from [`calculate_boundaries`] and structured "invalid"
//! values from the validators, never an error.

use crate::{
    detectors::helpers::{average_true_range, MAX_SWING_STRENGTH},
    swing::find_swing_points,
    zones::{ZoneDraft, ZoneMetadata, ZoneType},
    PatternType, OHLCV,
};

/// ATR period used for zone sizing
pub const ZONE_ATR_PERIOD: usize = 14;
/// Stop buffer as a fraction of zone width
pub const STOP_WIDTH_BUFFER: f64 = 0.10;

// ============================================================
// BOUNDARIES
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ZoneBoundaries {
    pub pause_high: f64,
    pub pause_low: f64,
    pub entry: f64,
    /// Far side of the zone
    pub stop: f64,
    /// `stop` pushed 10% of the width further out
    pub stop_loss_price: f64,
    pub width: f64,
}

/// Boundaries of the consolidation (`pause`) candles.
///
/// Supply zones enter at the bottom and stop at the top; demand zones mirror.
pub fn calculate_boundaries<T: OHLCV>(pause: &[T], zone_type: ZoneType) -> Option<ZoneBoundaries> {
    let pause_high = pause.iter().map(|b| b.high()).reduce(f64::max)?;
    let pause_low = pause.iter().map(|b| b.low()).reduce(f64::min)?;
    if !pause_high.is_finite() || !pause_low.is_finite() {
        return None;
    }

    let width = pause_high - pause_low;
    if width <= 0.0 {
        return None;
    }

    let buffer = width * STOP_WIDTH_BUFFER;
    let (entry, stop, stop_loss_price) = match zone_type {
        ZoneType::Hfz => (pause_low, pause_high, pause_high + buffer),
        ZoneType::Lfz => (pause_high, pause_low, pause_low - buffer),
    };

    Some(ZoneBoundaries {
        pause_high,
        pause_low,
        entry,
        stop,
        stop_loss_price,
        width,
    })
}

/// ATR over `period` candles (simple mean of true ranges)
pub fn calculate_atr<T: OHLCV>(bars: &[T], period: usize) -> Option<f64> {
    average_true_range(bars, period)
}

// ============================================================
// WIDTH VALIDATION
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum WidthQuality {
    TooNarrow,
    Excellent,
    Good,
    Acceptable,
    /// Valid but wide; worth refining on a lower timeframe
    Extended,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct WidthValidation {
    pub is_valid: bool,
    pub quality: WidthQuality,
    /// Width in ATR units
    pub atr_ratio: f64,
    pub refine_on_lower_timeframe: bool,
}

/// Grade a zone width against ATR
///
/// | width / ATR | result |
/// |-------------|--------|
/// | < 0.3       | invalid, too narrow |
/// | ≤ 1.0       | excellent |
/// | ≤ 1.5       | good |
/// | ≤ 4.0       | acceptable |
/// | > 4.0       | valid, extended |
pub fn validate_zone_width(width: f64, atr: f64) -> WidthValidation {
    if !atr.is_finite() || atr <= 0.0 || !width.is_finite() || width <= 0.0 {
        return WidthValidation {
            is_valid: false,
            quality: WidthQuality::TooNarrow,
            atr_ratio: 0.0,
            refine_on_lower_timeframe: false,
        };
    }

    let atr_ratio = width / atr;
    let quality = match atr_ratio {
        r if r < 0.3 => WidthQuality::TooNarrow,
        r if r <= 1.0 => WidthQuality::Excellent,
        r if r <= 1.5 => WidthQuality::Good,
        r if r <= 4.0 => WidthQuality::Acceptable,
        _ => WidthQuality::Extended,
    };

    WidthValidation {
        is_valid: quality != WidthQuality::TooNarrow,
        quality,
        atr_ratio,
        refine_on_lower_timeframe: quality == WidthQuality::Extended,
    }
}

// ============================================================
// RISK / REWARD
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum RrQuality {
    Poor,
    Acceptable,
    Good,
    Excellent,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RiskReward {
    pub risk: f64,
    pub reward: f64,
    pub ratio: f64,
    pub quality: RrQuality,
}

impl RiskReward {
    pub fn is_acceptable(&self) -> bool {
        self.quality >= RrQuality::Acceptable
    }
}

pub fn calculate_risk_reward(entry: f64, stop: f64, target: f64) -> RiskReward {
    let risk = (entry - stop).abs();
    let reward = (target - entry).abs();
    let ratio = if risk > 0.0 && risk.is_finite() && reward.is_finite() {
        reward / risk
    } else {
        0.0
    };

    let quality = match ratio {
        r if r >= 4.0 => RrQuality::Excellent,
        r if r >= 3.0 => RrQuality::Good,
        r if r >= 2.0 => RrQuality::Acceptable,
        _ => RrQuality::Poor,
    };

    RiskReward {
        risk,
        reward,
        ratio,
        quality,
    }
}

// ============================================================
// TARGETS
// ============================================================

/// Take-profit placement thresholds
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Baseline target distance in multiples of risk
    pub min_rr: f64,
    /// Never place the target further than this many ATRs from entry
    pub max_atr_multiple: f64,
    /// Targets realizing less than this R:R are flagged invalid
    pub min_valid_rr: f64,
    /// Keep the target this far inside the recent extreme
    pub extreme_buffer: f64,
    pub swing_lookback: usize,
    pub swing_strength: usize,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            min_rr: 2.0,
            max_atr_multiple: 3.5,
            min_valid_rr: 1.5,
            extreme_buffer: 0.005,
            swing_lookback: 100,
            swing_strength: 3,
        }
    }
}

impl TargetConfig {
    pub fn validate(&self) -> crate::Result<()> {
        let positive = [
            ("min_rr", self.min_rr),
            ("max_atr_multiple", self.max_atr_multiple),
            ("min_valid_rr", self.min_valid_rr),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(crate::PatternError::InvalidConfig(format!(
                    "{name} must be finite and > 0"
                )));
            }
        }
        if !(0.0..1.0).contains(&self.extreme_buffer) {
            return Err(crate::PatternError::InvalidConfig(
                "extreme_buffer must be in [0, 1)".to_string(),
            ));
        }
        if self.swing_lookback == 0 {
            return Err(crate::PatternError::InvalidConfig(
                "swing_lookback must be > 0".to_string(),
            ));
        }
        if !(1..=MAX_SWING_STRENGTH).contains(&self.swing_strength) {
            return Err(crate::PatternError::InvalidConfig(format!(
                "swing_strength must be in 1..={MAX_SWING_STRENGTH}"
            )));
        }
        Ok(())
    }
}

/// Opposing swing levels in the last `lookback` candles: swing highs for
/// demand zones, swing lows for supply zones. Oldest first.
pub fn find_swing_targets<T: OHLCV>(
    bars: &[T],
    zone_type: ZoneType,
    lookback: usize,
    strength: usize,
) -> Vec<f64> {
    let window = &bars[bars.len().saturating_sub(lookback)..];
    let swings = find_swing_points(window, strength);
    let points = match zone_type {
        ZoneType::Lfz => swings.highs,
        ZoneType::Hfz => swings.lows,
    };
    points.into_iter().map(|p| p.price).collect()
}

/// Which rule placed the final target
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TargetSource {
    MinRr,
    Swing,
    PatternHeight,
    AtrCap,
    ExtremeCap,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SmartTarget {
    pub price: f64,
    /// Realized reward over risk at `price`
    pub risk_reward: f64,
    pub source: TargetSource,
    pub is_valid: bool,
    pub reason: String,
}

/// Inputs for [`calculate_smart_tp`]
#[derive(Debug, Clone, Copy)]
pub struct TargetRequest<'a, T> {
    /// Recent history, most recent last
    pub bars: &'a [T],
    pub zone_type: ZoneType,
    pub entry: f64,
    pub stop: f64,
    pub atr: f64,
    /// Height of a detected formation, projected from entry
    pub pattern_height: Option<f64>,
}

/// Place a take-profit for a zone trade.
///
/// 1. Baseline `min_rr` risks beyond entry.
/// 2. Nearest swing target at or beyond the baseline replaces it.
/// 3. A pattern-height target inside `[baseline, ATR cap]` replaces the baseline,
///    or a swing target when nearer.
/// 4. Distance is capped at `max_atr_multiple` ATRs.
/// 5. Price is capped just inside the most extreme recent high (long) or low (short).
///
/// The result is only valid when it still realizes `min_valid_rr`.
pub fn calculate_smart_tp<T: OHLCV>(
    req: &TargetRequest<'_, T>,
    config: &TargetConfig,
) -> SmartTarget {
    let s = req.zone_type.direction().sign();
    let risk = (req.entry - req.stop).abs();
    if !risk.is_finite() || risk <= 0.0 || !req.entry.is_finite() {
        return SmartTarget {
            price: req.entry,
            risk_reward: 0.0,
            source: TargetSource::MinRr,
            is_valid: false,
            reason: "zero or undefined risk".to_string(),
        };
    }

    let baseline = req.entry + s * risk * config.min_rr;
    let mut price = baseline;
    let mut source = TargetSource::MinRr;

    // Distance from entry in the trade direction
    let reach = |p: f64| s * (p - req.entry);

    let swing = find_swing_targets(
        req.bars,
        req.zone_type,
        config.swing_lookback,
        config.swing_strength,
    )
    .into_iter()
    .filter(|&p| reach(p) >= reach(baseline))
    .min_by(|a, b| reach(*a).total_cmp(&reach(*b)));
    if let Some(p) = swing {
        price = p;
        source = TargetSource::Swing;
    }

    let atr_cap = (req.atr.is_finite() && req.atr > 0.0)
        .then(|| req.entry + s * config.max_atr_multiple * req.atr);

    if let Some(height) = req.pattern_height.filter(|h| h.is_finite() && *h > 0.0) {
        let candidate = req.entry + s * height;
        let within_cap = atr_cap.map_or(true, |cap| reach(candidate) <= reach(cap));
        let tighter = source == TargetSource::MinRr || reach(candidate) < reach(price);
        if reach(candidate) >= reach(baseline) && within_cap && tighter {
            price = candidate;
            source = TargetSource::PatternHeight;
        }
    }

    if let Some(cap) = atr_cap {
        if reach(price) > reach(cap) {
            price = cap;
            source = TargetSource::AtrCap;
        }
    }

    let window = &req.bars[req.bars.len().saturating_sub(config.swing_lookback)..];
    let extreme = match req.zone_type {
        ZoneType::Lfz => window.iter().map(|b| b.high()).reduce(f64::max),
        ZoneType::Hfz => window.iter().map(|b| b.low()).reduce(f64::min),
    };
    if let Some(extreme) = extreme.filter(|e| e.is_finite()) {
        let capped = extreme * (1.0 - s * config.extreme_buffer);
        if reach(price) > reach(capped) {
            price = capped;
            source = TargetSource::ExtremeCap;
        }
    }

    let risk_reward = reach(price) / risk;
    let is_valid = risk_reward.is_finite() && risk_reward >= config.min_valid_rr;
    let reason = if is_valid {
        format!("{source:?} target at {risk_reward:.2}R")
    } else {
        format!(
            "{source:?} target realizes {risk_reward:.2}R, below {:.2}R",
            config.min_valid_rr
        )
    };

    SmartTarget {
        price,
        risk_reward,
        source,
        is_valid,
        reason,
    }
}

// ============================================================
// ZONE RESULT
// ============================================================

/// Everything needed to turn a consolidation range into a zone
#[derive(Debug, Clone)]
pub struct ZoneRequest<'a, T> {
    pub symbol: &'a str,
    pub timeframe: &'a str,
    pub zone_type: ZoneType,
    /// Consolidation candles
    pub pause: &'a [T],
    /// Recent history ending at the current candle, used for ATR and targets
    pub history: &'a [T],
    pub current_price: f64,
    pub pattern_type: Option<PatternType>,
    /// Detection confidence in 0.0..=1.0
    pub confidence: f64,
    pub pattern_height: Option<f64>,
    pub created_at: i64,
}

/// A zone draft plus its risk summary
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ZoneResult {
    pub draft: ZoneDraft,
    pub boundaries: ZoneBoundaries,
    pub atr: f64,
    pub width: WidthValidation,
    pub target: SmartTarget,
    pub risk_reward: RiskReward,
    /// Signed distance of the current price from entry, in percent
    pub distance_pct: f64,
    /// Current price already closed through the far side
    pub already_broken: bool,
}

impl ZoneResult {
    pub fn is_tradeable(&self) -> bool {
        self.width.is_valid && self.target.is_valid && !self.already_broken
    }
}

/// Combine boundaries, width, target and R:R into a zone proposal.
///
/// `None` when the consolidation range is empty or degenerate.
pub fn create_zone_result<T: OHLCV>(
    req: &ZoneRequest<'_, T>,
    config: &TargetConfig,
) -> Option<ZoneResult> {
    let boundaries = calculate_boundaries(req.pause, req.zone_type)?;
    let atr = calculate_atr(req.history, ZONE_ATR_PERIOD).unwrap_or(0.0);
    let width = validate_zone_width(boundaries.width, atr);

    let target = calculate_smart_tp(
        &TargetRequest {
            bars: req.history,
            zone_type: req.zone_type,
            entry: boundaries.entry,
            stop: boundaries.stop_loss_price,
            atr,
            pattern_height: req.pattern_height,
        },
        config,
    );
    let risk_reward =
        calculate_risk_reward(boundaries.entry, boundaries.stop_loss_price, target.price);

    let already_broken = match req.zone_type {
        ZoneType::Hfz => req.current_price > boundaries.pause_high,
        ZoneType::Lfz => req.current_price < boundaries.pause_low,
    };
    let distance_pct = (req.current_price - boundaries.entry) / boundaries.entry * 100.0;

    let confidence = req.confidence.clamp(0.0, 1.0);
    let draft = ZoneDraft {
        zone_type: req.zone_type,
        high: boundaries.pause_high,
        low: boundaries.pause_low,
        created_at: req.created_at,
        metadata: ZoneMetadata {
            symbol: req.symbol.to_string(),
            timeframe: req.timeframe.to_string(),
            pattern_type: req.pattern_type.map(|p| p.as_str().to_string()),
            confidence,
            entry: boundaries.entry,
            stop: boundaries.stop_loss_price,
            strength: (100.0 * confidence + 10.0).clamp(0.0, 100.0),
            targets: vec![target.price],
        },
    };

    tracing::debug!(
        symbol = req.symbol,
        timeframe = req.timeframe,
        zone_type = %req.zone_type,
        entry = boundaries.entry,
        target = target.price,
        width_ok = width.is_valid,
        target_ok = target.is_valid,
        "zone result computed"
    );

    Some(ZoneResult {
        draft,
        boundaries,
        atr,
        width,
        target,
        risk_reward,
        distance_pct,
        already_broken,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::helpers::path_candles;
    use crate::Candle;

    fn pause() -> Vec<Candle> {
        vec![
            Candle::new(104.0, 110.0, 101.0, 106.0, 0),
            Candle::new(106.0, 108.0, 100.0, 102.0, 1),
            Candle::new(102.0, 107.0, 101.0, 105.0, 2),
        ]
    }

    #[test]
    fn test_boundaries_by_type() {
        let lfz = calculate_boundaries(&pause(), ZoneType::Lfz).unwrap();
        assert_eq!(lfz.entry, 110.0);
        assert_eq!(lfz.stop, 100.0);
        assert!((lfz.stop_loss_price - 99.0).abs() < 1e-9);

        let hfz = calculate_boundaries(&pause(), ZoneType::Hfz).unwrap();
        assert_eq!(hfz.entry, 100.0);
        assert_eq!(hfz.stop, 110.0);
        assert!((hfz.stop_loss_price - 111.0).abs() < 1e-9);
    }

    #[test]
    fn test_boundaries_degenerate() {
        let empty: Vec<Candle> = Vec::new();
        assert!(calculate_boundaries(&empty, ZoneType::Lfz).is_none());
        let flat = vec![Candle::new(1.0, 1.0, 1.0, 1.0, 0)];
        assert!(calculate_boundaries(&flat, ZoneType::Hfz).is_none());
    }

    #[test]
    fn test_width_tiers() {
        assert!(!validate_zone_width(0.2, 1.0).is_valid);
        assert_eq!(validate_zone_width(0.8, 1.0).quality, WidthQuality::Excellent);
        assert_eq!(validate_zone_width(1.2, 1.0).quality, WidthQuality::Good);
        assert_eq!(validate_zone_width(3.0, 1.0).quality, WidthQuality::Acceptable);

        let wide = validate_zone_width(5.0, 1.0);
        assert!(wide.is_valid);
        assert_eq!(wide.quality, WidthQuality::Extended);
        assert!(wide.refine_on_lower_timeframe);

        assert!(!validate_zone_width(1.0, 0.0).is_valid);
    }

    #[test]
    fn test_risk_reward_tiers() {
        assert_eq!(calculate_risk_reward(100.0, 99.0, 101.5).quality, RrQuality::Poor);
        assert_eq!(calculate_risk_reward(100.0, 99.0, 102.0).quality, RrQuality::Acceptable);
        assert_eq!(calculate_risk_reward(100.0, 101.0, 97.0).quality, RrQuality::Good);
        assert_eq!(calculate_risk_reward(100.0, 99.0, 104.0).quality, RrQuality::Excellent);

        let zero = calculate_risk_reward(100.0, 100.0, 105.0);
        assert_eq!(zero.ratio, 0.0);
        assert_eq!(zero.quality, RrQuality::Poor);
    }

    #[test]
    fn test_smart_tp_baseline_without_history() {
        let bars: Vec<Candle> = Vec::new();
        let req = TargetRequest {
            bars: &bars,
            zone_type: ZoneType::Lfz,
            entry: 100.0,
            stop: 98.0,
            atr: 0.0,
            pattern_height: None,
        };
        let tp = calculate_smart_tp(&req, &TargetConfig::default());
        assert_eq!(tp.source, TargetSource::MinRr);
        assert!((tp.price - 104.0).abs() < 1e-9);
        assert!(tp.is_valid);
    }

    #[test]
    fn test_smart_tp_prefers_swing_then_caps() {
        // Swing high at 120.2 well beyond the 2R baseline
        let bars = path_candles(&[100.0, 120.0, 105.0], 6);
        let req = TargetRequest {
            bars: &bars,
            zone_type: ZoneType::Lfz,
            entry: 106.0,
            stop: 104.0,
            atr: 10.0,
            pattern_height: None,
        };
        let config = TargetConfig::default();
        let tp = calculate_smart_tp(&req, &config);
        // 120.2 is the recent extreme, so the buffered cap wins
        assert_eq!(tp.source, TargetSource::ExtremeCap);
        assert!((tp.price - 120.2 * 0.995).abs() < 1e-9);

        // A tight ATR pulls the target in to 3.5 ATRs
        let tight = TargetRequest { atr: 1.5, ..req };
        let tp = calculate_smart_tp(&tight, &config);
        assert_eq!(tp.source, TargetSource::AtrCap);
        assert!((tp.price - 111.25).abs() < 1e-9);
        assert!(tp.is_valid);
    }

    #[test]
    fn test_smart_tp_pattern_height() {
        let bars: Vec<Candle> = Vec::new();
        let req = TargetRequest {
            bars: &bars,
            zone_type: ZoneType::Hfz,
            entry: 100.0,
            stop: 102.0,
            atr: 3.0,
            pattern_height: Some(5.0),
        };
        let tp = calculate_smart_tp(&req, &TargetConfig::default());
        // Baseline 96, cap 89.5, pattern target 95 sits between
        assert_eq!(tp.source, TargetSource::PatternHeight);
        assert!((tp.price - 95.0).abs() < 1e-9);
    }

    #[test]
    fn test_smart_tp_flags_low_rr() {
        // Recent low under 1R away caps a short target
        let bars = vec![
            Candle::new(100.0, 101.0, 98.0, 100.0, 0),
            Candle::new(100.0, 101.0, 99.0, 100.0, 1),
        ];
        let req = TargetRequest {
            bars: &bars,
            zone_type: ZoneType::Hfz,
            entry: 100.0,
            stop: 102.0,
            atr: 0.0,
            pattern_height: None,
        };
        let tp = calculate_smart_tp(&req, &TargetConfig::default());
        assert_eq!(tp.source, TargetSource::ExtremeCap);
        assert!(tp.risk_reward < 1.5);
        assert!(!tp.is_valid);
    }

    #[test]
    fn test_create_zone_result() {
        let history = path_candles(&[100.0, 130.0, 105.0, 108.0], 10);
        let pause = &history[20..24];
        let req = ZoneRequest {
            symbol: "EURUSD",
            timeframe: "1h",
            zone_type: ZoneType::Lfz,
            pause,
            history: &history,
            current_price: 108.0,
            pattern_type: Some(PatternType::DoubleBottom),
            confidence: 0.7,
            pattern_height: None,
            created_at: 1_700_000_000_000,
        };
        let result = create_zone_result(&req, &TargetConfig::default()).unwrap();

        assert_eq!(result.draft.zone_type, ZoneType::Lfz);
        assert_eq!(result.draft.high, result.boundaries.pause_high);
        assert_eq!(result.draft.metadata.pattern_type.as_deref(), Some("DOUBLE_BOTTOM"));
        assert_eq!(result.draft.metadata.targets, vec![result.target.price]);
        assert!(!result.already_broken);
        assert!(result.atr > 0.0);
        assert!(result.draft.validate().is_ok());
    }

    #[test]
    fn test_already_broken_zone_not_tradeable() {
        let history = path_candles(&[100.0, 130.0, 105.0, 108.0], 10);
        let req = ZoneRequest {
            symbol: "EURUSD",
            timeframe: "1h",
            zone_type: ZoneType::Hfz,
            pause: &history[8..12],
            history: &history,
            current_price: 140.0,
            pattern_type: None,
            confidence: 0.5,
            pattern_height: None,
            created_at: 0,
        };
        let result = create_zone_result(&req, &TargetConfig::default()).unwrap();
        assert!(result.already_broken);
        assert!(!result.is_tradeable());
    }

    #[test]
    fn test_target_config_bounds_swing_strength() {
        assert!(TargetConfig::default().validate().is_ok());
        for swing_strength in [0, 51, usize::MAX / 2 + 1] {
            let config = TargetConfig {
                swing_strength,
                ..TargetConfig::default()
            };
            assert!(config.validate().is_err());
        }
    }
}
