//! Multi-swing structures: Head & Shoulders, Double Top, Double Bottom

use std::collections::HashMap;

use super::continuation::validate_leg_config;
use super::helpers::{
    highest_high_between, is_valid_price, lowest_low_between, prior_trend, swing_clarity,
    symmetry_factor, DEFAULT_STOP_BUFFER, MIN_SCAN_BARS, PRIOR_TREND_PERIOD,
};
use crate::{
    confidence::ConfidenceFactors,
    params::{get_factor, get_ratio, ParamMeta, ParameterizedDetector},
    swing::{SwingKind, SwingPoints},
    Direction, MarketContext, PatternDetector, PatternMatch, PatternType, Ratio, Result, OHLCV,
};

impl_with_defaults!(HeadAndShouldersDetector, DoubleTopDetector, DoubleBottomDetector);

// ============================================================
// HEAD AND SHOULDERS
// ============================================================

/// Head & Shoulders top over the last three swing highs
///
/// The head must exceed both shoulders and the shoulders must sit within
/// `shoulder_tolerance` of the left one. The neckline is the lowest swing low
/// between the shoulders; entry is just below it.
#[derive(Debug, Clone)]
pub struct HeadAndShouldersDetector {
    pub shoulder_tolerance: Ratio,
    /// Entry offset below the neckline
    pub neckline_buffer: Ratio,
    /// Stop offset above the head
    pub stop_buffer: Ratio,
    pub min_confidence: f64,
}

impl Default for HeadAndShouldersDetector {
    fn default() -> Self {
        Self {
            shoulder_tolerance: Ratio::new_const(0.03),
            neckline_buffer: Ratio::new_const(0.005),
            stop_buffer: Ratio::new_const(DEFAULT_STOP_BUFFER),
            min_confidence: 45.0,
        }
    }
}

impl PatternDetector for HeadAndShouldersDetector {
    fn pattern_type(&self) -> PatternType {
        PatternType::HeadAndShoulders
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        swings: &SwingPoints,
        ctx: &MarketContext,
    ) -> Option<PatternMatch> {
        if bars.len() < MIN_SCAN_BARS {
            return None;
        }

        let (left, head, right) = match swings.last_n(SwingKind::High, 3)? {
            [l, h, r] => (*l, *h, *r),
            _ => return None,
        };
        if !is_valid_price(left.price) || head.price <= left.price || head.price <= right.price {
            return None;
        }

        let tolerance = self.shoulder_tolerance.get();
        let shoulder_diff = (left.price - right.price).abs() / left.price;
        if shoulder_diff > tolerance {
            return None;
        }

        let neckline = *swings
            .between(SwingKind::Low, left.index, right.index)
            .min_by(|a, b| a.price.total_cmp(&b.price))?;
        if !is_valid_price(neckline.price) {
            return None;
        }

        let height = head.price - neckline.price;
        let entry = neckline.price * (1.0 - self.neckline_buffer.get());
        let stop_loss = head.price * (1.0 + self.stop_buffer.get());
        let target = neckline.price - height;
        let risk = stop_loss - entry;
        if height <= 0.0 || risk <= 0.0 || target >= entry || !is_valid_price(target) {
            return None;
        }

        let factors = ConfidenceFactors {
            volume_ratio: ctx.volume_ratio,
            symmetry: symmetry_factor(shoulder_diff, tolerance),
            trend_aligned: prior_trend(bars, left.index, PRIOR_TREND_PERIOD).is_up(),
            swing_clarity: swing_clarity(height, ctx.atr),
            price_confirmation: ctx.last_close < entry,
        };
        let confidence = factors.score();
        if confidence < self.min_confidence {
            return None;
        }

        let mut supporting_points = vec![left, neckline, head, right];
        supporting_points.sort_by_key(|p| p.index);

        Some(PatternMatch {
            pattern_type: PatternType::HeadAndShoulders,
            direction: Direction::Short,
            confidence,
            entry,
            stop_loss,
            target,
            risk_reward: (entry - target) / risk,
            factors,
            supporting_points,
        })
    }

    fn validate_config(&self) -> Result<()> {
        validate_leg_config(1.0, self.min_confidence)
    }
}

// ============================================================
// DOUBLE TOP / DOUBLE BOTTOM
// ============================================================

/// Shared thresholds of the two double formations
#[derive(Debug, Clone, Copy)]
struct DoubleSetup {
    direction: Direction,
    tolerance: f64,
    min_depth: f64,
    stop_buffer: f64,
    min_confidence: f64,
}

/// Two comparable extremes separated by a pivot of at least `min_depth`.
///
/// Tops (short) use the last two swing highs and the lowest low between them;
/// bottoms (long) mirror this. Entry is the pivot break and the target
/// projects the formation height from it.
fn detect_double<T: OHLCV>(
    bars: &[T],
    swings: &SwingPoints,
    ctx: &MarketContext,
    setup: DoubleSetup,
) -> Option<PatternMatch> {
    if bars.len() < MIN_SCAN_BARS {
        return None;
    }

    let s = setup.direction.sign();
    let kind = match setup.direction {
        Direction::Long => SwingKind::Low,
        Direction::Short => SwingKind::High,
    };
    let (first, second) = match swings.last_n(kind, 2)? {
        [a, b] => (*a, *b),
        _ => return None,
    };
    if !is_valid_price(first.price) || !is_valid_price(second.price) {
        return None;
    }

    let reference = match setup.direction {
        Direction::Long => first.price.min(second.price),
        Direction::Short => first.price.max(second.price),
    };
    let diff = (first.price - second.price).abs() / reference;
    if diff > setup.tolerance {
        return None;
    }

    let pivot = match setup.direction {
        Direction::Long => highest_high_between(bars, first.index, second.index)?,
        Direction::Short => lowest_low_between(bars, first.index, second.index)?,
    };
    let height = s * (pivot.price - reference);
    if height / reference < setup.min_depth || height <= 0.0 {
        return None;
    }

    let entry = pivot.price;
    let stop_loss = reference * (1.0 - s * setup.stop_buffer);
    let target = entry + s * height;
    let risk = s * (entry - stop_loss);
    if risk <= 0.0 || !is_valid_price(target) {
        return None;
    }

    let prior = prior_trend(bars, first.index, PRIOR_TREND_PERIOD);
    let factors = ConfidenceFactors {
        volume_ratio: ctx.volume_ratio,
        symmetry: symmetry_factor(diff, setup.tolerance),
        trend_aligned: match setup.direction {
            Direction::Long => prior.is_down(),
            Direction::Short => prior.is_up(),
        },
        swing_clarity: swing_clarity(height, ctx.atr),
        price_confirmation: s * (ctx.last_close - entry) > 0.0,
    };
    let confidence = factors.score();
    if confidence < setup.min_confidence {
        return None;
    }

    let pattern_type = match setup.direction {
        Direction::Long => PatternType::DoubleBottom,
        Direction::Short => PatternType::DoubleTop,
    };

    Some(PatternMatch {
        pattern_type,
        direction: setup.direction,
        confidence,
        entry,
        stop_loss,
        target,
        risk_reward: height / risk,
        factors,
        supporting_points: vec![first, pivot, second],
    })
}

/// Double Top ("M"): two comparable swing highs, short below the trough
#[derive(Debug, Clone)]
pub struct DoubleTopDetector {
    /// Maximum difference between the two tops, relative to the higher one
    pub tolerance: Ratio,
    /// Minimum trough depth, relative to the higher top
    pub min_depth: Ratio,
    pub stop_buffer: Ratio,
    pub min_confidence: f64,
}

impl Default for DoubleTopDetector {
    fn default() -> Self {
        Self {
            tolerance: Ratio::new_const(0.04),
            min_depth: Ratio::new_const(0.01),
            stop_buffer: Ratio::new_const(DEFAULT_STOP_BUFFER),
            min_confidence: 40.0,
        }
    }
}

impl PatternDetector for DoubleTopDetector {
    fn pattern_type(&self) -> PatternType {
        PatternType::DoubleTop
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        swings: &SwingPoints,
        ctx: &MarketContext,
    ) -> Option<PatternMatch> {
        let setup = DoubleSetup {
            direction: Direction::Short,
            tolerance: self.tolerance.get(),
            min_depth: self.min_depth.get(),
            stop_buffer: self.stop_buffer.get(),
            min_confidence: self.min_confidence,
        };
        detect_double(bars, swings, ctx, setup)
    }

    fn validate_config(&self) -> Result<()> {
        validate_leg_config(1.0, self.min_confidence)
    }
}

/// Double Bottom ("W"): two comparable swing lows, long above the peak
#[derive(Debug, Clone)]
pub struct DoubleBottomDetector {
    /// Maximum difference between the two bottoms, relative to the lower one
    pub tolerance: Ratio,
    pub min_depth: Ratio,
    pub stop_buffer: Ratio,
    pub min_confidence: f64,
}

impl Default for DoubleBottomDetector {
    fn default() -> Self {
        Self {
            tolerance: Ratio::new_const(0.04),
            min_depth: Ratio::new_const(0.01),
            stop_buffer: Ratio::new_const(DEFAULT_STOP_BUFFER),
            min_confidence: 40.0,
        }
    }
}

impl PatternDetector for DoubleBottomDetector {
    fn pattern_type(&self) -> PatternType {
        PatternType::DoubleBottom
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        swings: &SwingPoints,
        ctx: &MarketContext,
    ) -> Option<PatternMatch> {
        let setup = DoubleSetup {
            direction: Direction::Long,
            tolerance: self.tolerance.get(),
            min_depth: self.min_depth.get(),
            stop_buffer: self.stop_buffer.get(),
            min_confidence: self.min_confidence,
        };
        detect_double(bars, swings, ctx, setup)
    }

    fn validate_config(&self) -> Result<()> {
        validate_leg_config(1.0, self.min_confidence)
    }
}

// ============================================================
// PARAMETERS
// ============================================================

static HEAD_AND_SHOULDERS_PARAMS: &[ParamMeta] = &[
    ParamMeta::ratio(
        "shoulder_tolerance",
        0.03,
        (0.01, 0.06, 0.01),
        "Max shoulder height difference",
    ),
    ParamMeta::ratio(
        "neckline_buffer",
        0.005,
        (0.0, 0.02, 0.005),
        "Entry offset below the neckline",
    ),
    ParamMeta::ratio(
        "stop_buffer",
        0.01,
        (0.0, 0.03, 0.005),
        "Stop offset above the head",
    ),
    ParamMeta::factor(
        "min_confidence",
        45.0,
        (35.0, 70.0, 5.0),
        "Reject matches scoring below this confidence",
    ),
];

static DOUBLE_PARAMS: &[ParamMeta] = &[
    ParamMeta::ratio(
        "tolerance",
        0.04,
        (0.01, 0.06, 0.01),
        "Max difference between the two extremes",
    ),
    ParamMeta::ratio(
        "min_depth",
        0.01,
        (0.005, 0.05, 0.005),
        "Min pivot depth from the reference level",
    ),
    ParamMeta::ratio(
        "stop_buffer",
        0.01,
        (0.0, 0.03, 0.005),
        "Stop offset beyond the reference level",
    ),
    ParamMeta::factor(
        "min_confidence",
        40.0,
        (35.0, 70.0, 5.0),
        "Reject matches scoring below this confidence",
    ),
];

impl ParameterizedDetector for HeadAndShouldersDetector {
    fn param_meta() -> &'static [ParamMeta] {
        HEAD_AND_SHOULDERS_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        let detector = Self {
            shoulder_tolerance: get_ratio(params, "shoulder_tolerance", 0.03)?,
            neckline_buffer: get_ratio(params, "neckline_buffer", 0.005)?,
            stop_buffer: get_ratio(params, "stop_buffer", DEFAULT_STOP_BUFFER)?,
            min_confidence: get_factor(params, "min_confidence", 45.0)?,
        };
        PatternDetector::validate_config(&detector)?;
        Ok(detector)
    }

    fn pattern_type() -> PatternType {
        PatternType::HeadAndShoulders
    }
}

macro_rules! impl_double_params {
    ($($detector:ident => $pattern:ident),* $(,)?) => {
        $(impl ParameterizedDetector for $detector {
            fn param_meta() -> &'static [ParamMeta] {
                DOUBLE_PARAMS
            }

            fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
                let detector = Self {
                    tolerance: get_ratio(params, "tolerance", 0.04)?,
                    min_depth: get_ratio(params, "min_depth", 0.01)?,
                    stop_buffer: get_ratio(params, "stop_buffer", DEFAULT_STOP_BUFFER)?,
                    min_confidence: get_factor(params, "min_confidence", 40.0)?,
                };
                PatternDetector::validate_config(&detector)?;
                Ok(detector)
            }

            fn pattern_type() -> PatternType {
                PatternType::$pattern
            }
        })*
    };
}

impl_double_params!(DoubleTopDetector => DoubleTop, DoubleBottomDetector => DoubleBottom);
