//! Trend continuation formations: DPD (drop-pause-drop) and UPU (up-pause-up)

use std::collections::HashMap;

use super::helpers::{detect_leg_setup, LegSetup, DEFAULT_STOP_BUFFER};
use crate::{
    confidence::{MAX_CONFIDENCE, MIN_CONFIDENCE},
    params::{get_factor, get_ratio, ParamMeta, ParameterizedDetector},
    swing::SwingPoints,
    Direction, MarketContext, PatternDetector, PatternError, PatternMatch, PatternType, Ratio,
    Result, OHLCV,
};

impl_with_defaults!(DpdDetector, UpuDetector);

pub(crate) fn validate_leg_config(reward_multiple: f64, min_confidence: f64) -> Result<()> {
    if !reward_multiple.is_finite() || reward_multiple <= 0.0 {
        return Err(PatternError::InvalidValue(
            "reward_multiple must be finite and > 0",
        ));
    }
    if !(MIN_CONFIDENCE..=MAX_CONFIDENCE).contains(&min_confidence) {
        return Err(PatternError::OutOfRange {
            field: "min_confidence",
            value: min_confidence,
            min: MIN_CONFIDENCE,
            max: MAX_CONFIDENCE,
        });
    }
    Ok(())
}

// ============================================================
// DPD
// ============================================================

/// Drop-Pause-Drop: a lower swing high after a pause low, short on the pause break
#[derive(Debug, Clone)]
pub struct DpdDetector {
    /// Minimum lower-high step between the last two swing highs
    pub min_move: Ratio,
    pub stop_buffer: Ratio,
    pub reward_multiple: f64,
    pub min_confidence: f64,
}

impl Default for DpdDetector {
    fn default() -> Self {
        Self {
            min_move: Ratio::new_const(0.005),
            stop_buffer: Ratio::new_const(DEFAULT_STOP_BUFFER),
            reward_multiple: 2.0,
            min_confidence: 45.0,
        }
    }
}

impl DpdDetector {
    fn setup(&self) -> LegSetup {
        LegSetup {
            pattern_type: PatternType::Dpd,
            direction: Direction::Short,
            continuation: true,
            min_move: self.min_move.get(),
            stop_buffer: self.stop_buffer.get(),
            reward_multiple: self.reward_multiple,
            min_confidence: self.min_confidence,
        }
    }
}

impl PatternDetector for DpdDetector {
    fn pattern_type(&self) -> PatternType {
        PatternType::Dpd
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        swings: &SwingPoints,
        ctx: &MarketContext,
    ) -> Option<PatternMatch> {
        detect_leg_setup(bars, swings, ctx, &self.setup())
    }

    fn validate_config(&self) -> Result<()> {
        validate_leg_config(self.reward_multiple, self.min_confidence)
    }
}

// ============================================================
// UPU
// ============================================================

/// Up-Pause-Up: a higher swing low after a pause high, long on the pause break
#[derive(Debug, Clone)]
pub struct UpuDetector {
    /// Minimum higher-low step between the last two swing lows
    pub min_move: Ratio,
    pub stop_buffer: Ratio,
    pub reward_multiple: f64,
    pub min_confidence: f64,
}

impl Default for UpuDetector {
    fn default() -> Self {
        Self {
            min_move: Ratio::new_const(0.005),
            stop_buffer: Ratio::new_const(DEFAULT_STOP_BUFFER),
            reward_multiple: 2.0,
            min_confidence: 45.0,
        }
    }
}

impl UpuDetector {
    fn setup(&self) -> LegSetup {
        LegSetup {
            pattern_type: PatternType::Upu,
            direction: Direction::Long,
            continuation: true,
            min_move: self.min_move.get(),
            stop_buffer: self.stop_buffer.get(),
            reward_multiple: self.reward_multiple,
            min_confidence: self.min_confidence,
        }
    }
}

impl PatternDetector for UpuDetector {
    fn pattern_type(&self) -> PatternType {
        PatternType::Upu
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        swings: &SwingPoints,
        ctx: &MarketContext,
    ) -> Option<PatternMatch> {
        detect_leg_setup(bars, swings, ctx, &self.setup())
    }

    fn validate_config(&self) -> Result<()> {
        validate_leg_config(self.reward_multiple, self.min_confidence)
    }
}

// ============================================================
// PARAMETERS
// ============================================================

static CONTINUATION_PARAMS: &[ParamMeta] = &[
    ParamMeta::ratio(
        "min_move",
        0.005,
        (0.002, 0.02, 0.001),
        "Minimum step between the two anchor swings",
    ),
    ParamMeta::ratio(
        "stop_buffer",
        0.01,
        (0.0, 0.03, 0.005),
        "Stop distance beyond the second anchor",
    ),
    ParamMeta::factor(
        "reward_multiple",
        2.0,
        (1.0, 4.0, 0.5),
        "Target distance in multiples of risk",
    ),
    ParamMeta::factor(
        "min_confidence",
        45.0,
        (35.0, 70.0, 5.0),
        "Reject matches scoring below this confidence",
    ),
];

impl ParameterizedDetector for DpdDetector {
    fn param_meta() -> &'static [ParamMeta] {
        CONTINUATION_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        let detector = Self {
            min_move: get_ratio(params, "min_move", 0.005)?,
            stop_buffer: get_ratio(params, "stop_buffer", DEFAULT_STOP_BUFFER)?,
            reward_multiple: get_factor(params, "reward_multiple", 2.0)?,
            min_confidence: get_factor(params, "min_confidence", 45.0)?,
        };
        PatternDetector::validate_config(&detector)?;
        Ok(detector)
    }

    fn pattern_type() -> PatternType {
        PatternType::Dpd
    }
}

impl ParameterizedDetector for UpuDetector {
    fn param_meta() -> &'static [ParamMeta] {
        CONTINUATION_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        let detector = Self {
            min_move: get_ratio(params, "min_move", 0.005)?,
            stop_buffer: get_ratio(params, "stop_buffer", DEFAULT_STOP_BUFFER)?,
            reward_multiple: get_factor(params, "reward_multiple", 2.0)?,
            min_confidence: get_factor(params, "min_confidence", 45.0)?,
        };
        PatternDetector::validate_config(&detector)?;
        Ok(detector)
    }

    fn pattern_type() -> PatternType {
        PatternType::Upu
    }
}
