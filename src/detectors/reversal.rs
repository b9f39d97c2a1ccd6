//! Reversal formations: DPU (drop-pause-up) and UPD (up-pause-down)
//!
//! Both look for the last anchor swing stepping *against* the trade
//! direction (a lower low before a long, a higher high before a short)
//! and enter on a break of the pause swing in between.

use std::collections::HashMap;

use super::continuation::validate_leg_config;
use super::helpers::{detect_leg_setup, LegSetup, DEFAULT_STOP_BUFFER};
use crate::{
    params::{get_factor, get_ratio, ParamMeta, ParameterizedDetector},
    swing::SwingPoints,
    Direction, MarketContext, PatternDetector, PatternMatch, PatternType, Ratio, Result, OHLCV,
};

impl_with_defaults!(DpuDetector, UpdDetector);

/// Drop-Pause-Up: a lower swing low, long on the break of the pause high
#[derive(Debug, Clone)]
pub struct DpuDetector {
    pub min_move: Ratio,
    pub stop_buffer: Ratio,
    pub reward_multiple: f64,
    pub min_confidence: f64,
}

impl Default for DpuDetector {
    fn default() -> Self {
        Self {
            min_move: Ratio::new_const(0.003),
            stop_buffer: Ratio::new_const(DEFAULT_STOP_BUFFER),
            reward_multiple: 1.0,
            min_confidence: 40.0,
        }
    }
}

impl PatternDetector for DpuDetector {
    fn pattern_type(&self) -> PatternType {
        PatternType::Dpu
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        swings: &SwingPoints,
        ctx: &MarketContext,
    ) -> Option<PatternMatch> {
        let setup = LegSetup {
            pattern_type: PatternType::Dpu,
            direction: Direction::Long,
            continuation: false,
            min_move: self.min_move.get(),
            stop_buffer: self.stop_buffer.get(),
            reward_multiple: self.reward_multiple,
            min_confidence: self.min_confidence,
        };
        detect_leg_setup(bars, swings, ctx, &setup)
    }

    fn validate_config(&self) -> Result<()> {
        validate_leg_config(self.reward_multiple, self.min_confidence)
    }
}

/// Up-Pause-Down: a higher swing high, short on the break of the pause low
#[derive(Debug, Clone)]
pub struct UpdDetector {
    pub min_move: Ratio,
    pub stop_buffer: Ratio,
    pub reward_multiple: f64,
    pub min_confidence: f64,
}

impl Default for UpdDetector {
    fn default() -> Self {
        Self {
            min_move: Ratio::new_const(0.003),
            stop_buffer: Ratio::new_const(DEFAULT_STOP_BUFFER),
            reward_multiple: 1.0,
            min_confidence: 40.0,
        }
    }
}

impl PatternDetector for UpdDetector {
    fn pattern_type(&self) -> PatternType {
        PatternType::Upd
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        swings: &SwingPoints,
        ctx: &MarketContext,
    ) -> Option<PatternMatch> {
        let setup = LegSetup {
            pattern_type: PatternType::Upd,
            direction: Direction::Short,
            continuation: false,
            min_move: self.min_move.get(),
            stop_buffer: self.stop_buffer.get(),
            reward_multiple: self.reward_multiple,
            min_confidence: self.min_confidence,
        };
        detect_leg_setup(bars, swings, ctx, &setup)
    }

    fn validate_config(&self) -> Result<()> {
        validate_leg_config(self.reward_multiple, self.min_confidence)
    }
}

static REVERSAL_PARAMS: &[ParamMeta] = &[
    ParamMeta::ratio(
        "min_move",
        0.003,
        (0.001, 0.01, 0.001),
        "Minimum counter-trend anchor step",
    ),
    ParamMeta::ratio(
        "stop_buffer",
        0.01,
        (0.0, 0.03, 0.005),
        "Stop distance beyond the second anchor",
    ),
    ParamMeta::factor(
        "reward_multiple",
        1.0,
        (0.5, 3.0, 0.5),
        "Target distance in multiples of risk",
    ),
    ParamMeta::factor(
        "min_confidence",
        40.0,
        (35.0, 70.0, 5.0),
        "Reject matches scoring below this confidence",
    ),
];

macro_rules! impl_reversal_params {
    ($($detector:ident => $pattern:ident),* $(,)?) => {
        $(impl ParameterizedDetector for $detector {
            fn param_meta() -> &'static [ParamMeta] {
                REVERSAL_PARAMS
            }

            fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
                let detector = Self {
                    min_move: get_ratio(params, "min_move", 0.003)?,
                    stop_buffer: get_ratio(params, "stop_buffer", DEFAULT_STOP_BUFFER)?,
                    reward_multiple: get_factor(params, "reward_multiple", 1.0)?,
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

impl_reversal_params!(DpuDetector => Dpu, UpdDetector => Upd);
