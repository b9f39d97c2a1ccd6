//! Shared measurements and setups for the swing formation detectors

use crate::{
    confidence::ConfidenceFactors,
    swing::{SwingKind, SwingPoint, SwingPoints},
    Direction, MarketContext, OHLCVExt, PatternMatch, PatternType, Trend, OHLCV,
};

// ============================================================
// THRESHOLDS
// ============================================================

/// Every detector needs at least this many candles
pub const MIN_SCAN_BARS: usize = 30;
/// Default swing lookback on each side
pub const DEFAULT_SWING_STRENGTH: usize = 3;
/// Largest accepted swing lookback
pub const MAX_SWING_STRENGTH: usize = 50;
/// Bars looked back to classify the trend leading into a formation
pub const PRIOR_TREND_PERIOD: usize = 20;
/// Stop placed 1% beyond the invalidating swing
pub const DEFAULT_STOP_BUFFER: f64 = 0.01;

// ============================================================
// MEASUREMENTS
// ============================================================

#[inline]
pub(crate) fn is_valid_price(price: f64) -> bool {
    price.is_finite() && price > 0.0
}

/// Simple mean of the last `period` true ranges. Needs `period + 1` bars.
pub fn average_true_range<T: OHLCV>(bars: &[T], period: usize) -> Option<f64> {
    if period == 0 || bars.len() < period + 1 {
        return None;
    }
    let start = bars.len() - period;
    let sum: f64 = (start..bars.len())
        .map(|i| bars[i].true_range(bars[i - 1].close()))
        .sum();
    let atr = sum / period as f64;
    atr.is_finite().then_some(atr)
}

/// Last bar's volume over the mean volume of the preceding `period` bars.
/// Returns 1.0 when there is no volume to compare against.
pub fn volume_ratio<T: OHLCV>(bars: &[T], period: usize) -> f64 {
    let Some((last, rest)) = bars.split_last() else {
        return 1.0;
    };
    let window = &rest[rest.len().saturating_sub(period)..];
    if window.is_empty() {
        return 1.0;
    }
    let avg = window.iter().map(|b| b.volume()).sum::<f64>() / window.len() as f64;
    if avg <= f64::EPSILON || !avg.is_finite() {
        return 1.0;
    }
    last.volume() / avg
}

/// Trend over the `period` closes ending at `index`
pub fn prior_trend<T: OHLCV>(bars: &[T], index: usize, period: usize) -> Trend {
    if index >= bars.len() {
        return Trend::Sideways;
    }
    let start = index.saturating_sub(period);
    if start == index {
        return Trend::Sideways;
    }

    let first_close = bars[start].close();
    let last_close = bars[index].close();
    if first_close <= f64::EPSILON {
        return Trend::Sideways;
    }

    Trend::from_change((last_close - first_close) / first_close)
}

/// Map a deviation against its tolerance to `-1.0..=1.0`
/// (`1.0` = perfect, `0.0` = half the tolerance used, `-1.0` = at or past it).
pub fn symmetry_factor(deviation: f64, tolerance: f64) -> f64 {
    if !deviation.is_finite() || !tolerance.is_finite() || tolerance <= 0.0 {
        return 0.0;
    }
    1.0 - 2.0 * (deviation.abs() / tolerance).clamp(0.0, 1.0)
}

/// Symmetry of the two legs spanned by three ordered bar indices
pub fn spacing_symmetry(a: usize, b: usize, c: usize) -> f64 {
    let d1 = b.saturating_sub(a) as f64;
    let d2 = c.saturating_sub(b) as f64;
    let longest = d1.max(d2);
    if longest == 0.0 {
        return 0.0;
    }
    symmetry_factor((d1 - d2).abs() / longest, 1.0)
}

/// Formation height relative to volatility, in `-1.0..=1.0`.
/// One ATR is neutral; two or more ATRs is a clean swing.
pub fn swing_clarity(height: f64, atr: f64) -> f64 {
    if !atr.is_finite() || atr <= f64::EPSILON || !height.is_finite() {
        return 0.0;
    }
    (height / atr - 1.0).clamp(-1.0, 1.0)
}

/// Lowest low strictly between two bar indices
pub fn lowest_low_between<T: OHLCV>(bars: &[T], start: usize, end: usize) -> Option<SwingPoint> {
    let end = end.min(bars.len());
    (start + 1..end)
        .min_by(|&a, &b| bars[a].low().total_cmp(&bars[b].low()))
        .and_then(|i| SwingPoint::at(bars, i, SwingKind::Low))
}

/// Highest high strictly between two bar indices
pub fn highest_high_between<T: OHLCV>(bars: &[T], start: usize, end: usize) -> Option<SwingPoint> {
    let end = end.min(bars.len());
    (start + 1..end)
        .max_by(|&a, &b| bars[a].high().total_cmp(&bars[b].high()))
        .and_then(|i| SwingPoint::at(bars, i, SwingKind::High))
}

// ============================================================
// TWO-LEG SETUPS (DPD / UPU / DPU / UPD)
// ============================================================

/// Two anchor swings with a pause swing before the second one.
///
/// Anchors are swing highs for shorts and swing lows for longs. Continuations
/// need the second anchor to step in the trade direction (lower high / higher
/// low); reversals need it to step against it (higher high / lower low).
#[derive(Debug, Clone, Copy)]
pub(crate) struct LegSetup {
    pub pattern_type: PatternType,
    pub direction: Direction,
    pub continuation: bool,
    pub min_move: f64,
    pub stop_buffer: f64,
    pub reward_multiple: f64,
    pub min_confidence: f64,
}

pub(crate) fn detect_leg_setup<T: OHLCV>(
    bars: &[T],
    swings: &SwingPoints,
    ctx: &MarketContext,
    setup: &LegSetup,
) -> Option<PatternMatch> {
    if bars.len() < MIN_SCAN_BARS {
        return None;
    }

    let s = setup.direction.sign();
    let (anchor_kind, pause_kind) = match setup.direction {
        Direction::Long => (SwingKind::Low, SwingKind::High),
        Direction::Short => (SwingKind::High, SwingKind::Low),
    };

    let (first, second) = match swings.last_n(anchor_kind, 2)? {
        [a, b] => (*a, *b),
        _ => return None,
    };
    if !is_valid_price(first.price) || !is_valid_price(second.price) {
        return None;
    }

    let change = (second.price - first.price) / first.price;
    let step = if setup.continuation { s * change } else { -s * change };
    if step < setup.min_move {
        return None;
    }

    let pause = *swings.last_before(pause_kind, second.index)?;
    let entry = pause.price;
    if !is_valid_price(entry) || s * (entry - second.price) <= 0.0 {
        return None;
    }

    let stop_loss = second.price * (1.0 - s * setup.stop_buffer);
    let risk = s * (entry - stop_loss);
    if risk <= 0.0 {
        return None;
    }
    let target = entry + s * setup.reward_multiple * risk;
    if !is_valid_price(target) {
        return None;
    }

    let extreme = match setup.direction {
        Direction::Long => first.price.min(second.price),
        Direction::Short => first.price.max(second.price),
    };
    let height = (entry - extreme).abs();

    let mut supporting_points = vec![first, pause, second];
    supporting_points.sort_by_key(|p| p.index);

    let trend_aligned = setup.continuation
        && match setup.direction {
            Direction::Long => ctx.trend.is_up(),
            Direction::Short => ctx.trend.is_down(),
        };

    let factors = ConfidenceFactors {
        volume_ratio: ctx.volume_ratio,
        symmetry: spacing_symmetry(
            supporting_points[0].index,
            supporting_points[1].index,
            supporting_points[2].index,
        ),
        trend_aligned,
        swing_clarity: swing_clarity(height, ctx.atr),
        price_confirmation: s * (ctx.last_close - entry) > 0.0,
    };
    let confidence = factors.score();
    if confidence < setup.min_confidence {
        return None;
    }

    Some(PatternMatch {
        pattern_type: setup.pattern_type,
        direction: setup.direction,
        confidence,
        entry,
        stop_loss,
        target,
        risk_reward: setup.reward_multiple,
        factors,
        supporting_points,
    })
}

// ============================================================
// TEST SUPPORT
// ============================================================

/// Point candles walking linearly through `waypoints`, `steps` bars per leg,
/// one hour apart, with a fixed 0.2 wick on each side.
#[cfg(test)]
pub(crate) fn path_candles(waypoints: &[f64], steps: usize) -> Vec<crate::Candle> {
    let mut prices = vec![waypoints[0]];
    for leg in waypoints.windows(2) {
        let (from, to) = (leg[0], leg[1]);
        for s in 1..=steps {
            prices.push(from + (to - from) * s as f64 / steps as f64);
        }
    }
    prices
        .iter()
        .enumerate()
        .map(|(i, &p)| crate::Candle::new(p, p + 0.2, p - 0.2, p, i as i64 * 3_600_000))
        .collect()
}
