//! # zonesight - chart formations and supply/demand zones
//!
//! Detects seven swing-based chart formations in a candle series and tracks the
//! supply (HFZ) and demand (LFZ) zones derived from consolidation ranges.
//!
//! ## Quick Start
//!
//! ```rust
//! use zonesight::prelude::*;
//!
//! let engine = EngineBuilder::new()
//!     .with_all_defaults()
//!     .build()
//!     .unwrap();
//!
//! // Fewer than 30 candles never produces a signal.
//! let candles: Vec<Candle> = vec![];
//! let signals = engine.scan("BTCUSDT", "1h", &candles).unwrap();
//! assert!(signals.is_empty());
//! ```

pub mod config;
pub mod confidence;
pub mod detectors;
pub mod params;
pub mod scanner;
pub mod swing;
pub mod zones;

pub mod prelude {
    pub use crate::{
        // Configuration
        config::ZonesightConfig,
        // Scoring
        confidence::ConfidenceFactors,
        // Detectors
        detectors::*,
        // Parameters
        params::{get_factor, get_ratio, ParamMeta, ParamType, ParameterizedDetector},
        // Parallel
        scan_parallel,
        // Async scanning
        scanner::{CandleSource, Scanner, ScannerConfig, ScannerError, SourceError},
        // Swings
        swing::{find_swing_points, SwingKind, SwingPoint, SwingPoints},
        // Zones
        zones::{
            boundary::{
                calculate_smart_tp, create_zone_result, TargetConfig, TargetRequest, ZoneRequest,
                ZoneResult,
            },
            gateway::{GatewayConfig, LocalStore, RemoteStore, StoreError, ZoneGateway, ZoneScope},
            store::InMemoryZoneStore,
            tracker::{ZoneConfig, ZoneRegistry, ZoneStats, ZoneTracker},
            Zone, ZoneDraft, ZoneMetadata, ZoneStatus, ZoneTrade, ZoneType,
        },
        // Engine
        BuiltinDetector,
        Candle,
        ContextProvider,
        DefaultContextProvider,
        Direction,
        EngineBuilder,
        EngineConfig,
        MarketContext,
        OHLCVExt,
        PatternDetector,
        PatternEngine,
        // Errors
        PatternError,
        PatternMatch,
        PatternType,
        Period,
        Ratio,
        Result,
        ScanError,
        ScanResult,
        Signal,
        Trend,
        OHLCV,
    };
}

use swing::{find_swing_points, SwingPoint, SwingPoints};

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, PatternError>;

/// Errors raised by validation and configuration
#[derive(Debug, Clone, thiserror::Error)]
pub enum PatternError {
    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Invalid OHLCV at index {index}: {reason}")]
    InvalidOHLCV { index: usize, reason: &'static str },

    #[error("Unknown {kind}: {value}")]
    UnknownVariant { kind: &'static str, value: String },
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Normalized value in range 0.0..=1.0
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Ratio(f64);

impl Ratio {
    /// Create a new Ratio, validating the value is in [0.0, 1.0]
    pub fn new(value: f64) -> Result<Self> {
        if value.is_nan() || value.is_infinite() {
            return Err(PatternError::InvalidValue(
                "Ratio cannot be NaN or infinite",
            ));
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(PatternError::OutOfRange {
                field: "Ratio",
                value,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(Self(value))
    }

    /// Create a Ratio from a compile-time constant (library internal use)
    #[doc(hidden)]
    pub const fn new_const(value: f64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl serde::Serialize for Ratio {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Ratio {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Ratio::new(value).map_err(serde::de::Error::custom)
    }
}

/// Period (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Period(usize);

impl Period {
    /// Create a new Period, validating value is > 0
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(PatternError::InvalidValue("Period must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl serde::Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        Period::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// OHLCV TRAITS
// ============================================================

/// Core OHLCV data trait
pub trait OHLCV {
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;
    fn volume(&self) -> f64;

    /// Bar open time in Unix milliseconds
    fn timestamp(&self) -> Option<i64> {
        None
    }
}

/// Extension trait with computed properties for OHLCV data
pub trait OHLCVExt: OHLCV {
    #[inline]
    fn range(&self) -> f64 {
        self.high() - self.low()
    }

    /// True range against the previous close (Wilder)
    #[inline]
    fn true_range(&self, prev_close: f64) -> f64 {
        let hl = self.range();
        let hc = (self.high() - prev_close).abs();
        let lc = (self.low() - prev_close).abs();
        hl.max(hc).max(lc)
    }

    /// Validate OHLCV data consistency
    fn validate(&self) -> Result<()> {
        if self.open().is_nan()
            || self.high().is_nan()
            || self.low().is_nan()
            || self.close().is_nan()
        {
            return Err(PatternError::InvalidOHLCV {
                index: 0,
                reason: "NaN in OHLCV",
            });
        }
        if self.open().is_infinite()
            || self.high().is_infinite()
            || self.low().is_infinite()
            || self.close().is_infinite()
        {
            return Err(PatternError::InvalidOHLCV {
                index: 0,
                reason: "Infinite value in OHLCV",
            });
        }
        if self.high() < self.low() {
            return Err(PatternError::InvalidOHLCV {
                index: 0,
                reason: "high < low",
            });
        }
        Ok(())
    }
}

impl<T: OHLCV> OHLCVExt for T {}

/// Owned candle as delivered by a candle source
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Candle {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
    /// Unix milliseconds
    pub timestamp: i64,
}

impl Candle {
    pub fn new(open: f64, high: f64, low: f64, close: f64, timestamp: i64) -> Self {
        Self {
            open,
            high,
            low,
            close,
            volume: 0.0,
            timestamp,
        }
    }

    pub fn with_volume(mut self, volume: f64) -> Self {
        self.volume = volume;
        self
    }
}

impl OHLCV for Candle {
    fn open(&self) -> f64 {
        self.open
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn close(&self) -> f64 {
        self.close
    }

    fn volume(&self) -> f64 {
        self.volume
    }

    fn timestamp(&self) -> Option<i64> {
        Some(self.timestamp)
    }
}

// ============================================================
// PATTERN TYPES AND SIGNALS
// ============================================================

/// The seven swing formations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PatternType {
    /// Drop-Pause-Drop
    Dpd,
    /// Up-Pause-Up
    Upu,
    /// Drop-Pause-Up
    Dpu,
    /// Up-Pause-Down
    Upd,
    HeadAndShoulders,
    DoubleTop,
    DoubleBottom,
}

impl PatternType {
    pub const ALL: [PatternType; 7] = [
        PatternType::Dpd,
        PatternType::Upu,
        PatternType::Dpu,
        PatternType::Upd,
        PatternType::HeadAndShoulders,
        PatternType::DoubleTop,
        PatternType::DoubleBottom,
    ];

    /// Returns the string identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternType::Dpd => "DPD",
            PatternType::Upu => "UPU",
            PatternType::Dpu => "DPU",
            PatternType::Upd => "UPD",
            PatternType::HeadAndShoulders => "HEAD_AND_SHOULDERS",
            PatternType::DoubleTop => "DOUBLE_TOP",
            PatternType::DoubleBottom => "DOUBLE_BOTTOM",
        }
    }

    /// Trade direction the formation signals
    pub fn direction(&self) -> Direction {
        match self {
            PatternType::Upu | PatternType::Dpu | PatternType::DoubleBottom => Direction::Long,
            PatternType::Dpd
            | PatternType::Upd
            | PatternType::HeadAndShoulders
            | PatternType::DoubleTop => Direction::Short,
        }
    }

    /// Returns true for trend continuation formations
    pub fn is_continuation(&self) -> bool {
        matches!(self, PatternType::Dpd | PatternType::Upu)
    }

    /// Historical hit rate used as the starting point of the win-rate estimate
    pub fn base_win_rate(&self) -> f64 {
        match self {
            PatternType::Dpd | PatternType::Upu => 0.58,
            PatternType::Dpu | PatternType::Upd => 0.52,
            PatternType::HeadAndShoulders => 0.60,
            PatternType::DoubleTop | PatternType::DoubleBottom => 0.57,
        }
    }
}

impl std::fmt::Display for PatternType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PatternType {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self> {
        PatternType::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| PatternError::UnknownVariant {
                kind: "pattern type",
                value: s.to_string(),
            })
    }
}

/// Trade direction of a signal or zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    #[inline]
    pub fn is_long(self) -> bool {
        matches!(self, Direction::Long)
    }

    #[inline]
    pub fn is_short(self) -> bool {
        matches!(self, Direction::Short)
    }

    /// +1.0 for long, -1.0 for short
    #[inline]
    pub fn sign(self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }
}

/// Raw detector output, before it is stamped with symbol and time
#[derive(Debug, Clone, PartialEq)]
pub struct PatternMatch {
    pub pattern_type: PatternType,
    pub direction: Direction,
    /// Confidence score in 35.0..=95.0
    pub confidence: f64,
    pub entry: f64,
    pub stop_loss: f64,
    pub target: f64,
    pub risk_reward: f64,
    pub factors: confidence::ConfidenceFactors,
    pub supporting_points: Vec<SwingPoint>,
}

/// A detected formation, ready to hand to a caller
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Signal {
    pub id: String,
    pub pattern_type: PatternType,
    pub symbol: String,
    pub timeframe: String,
    pub confidence: f64,
    pub direction: Direction,
    pub entry: f64,
    pub stop_loss: f64,
    pub target: f64,
    pub risk_reward: f64,
    pub win_rate_estimate: f64,
    /// Unix milliseconds of the last scanned candle
    pub detected_at: i64,
    pub supporting_points: Vec<SwingPoint>,
}

impl Signal {
    pub fn from_match(m: PatternMatch, symbol: &str, timeframe: &str, detected_at: i64) -> Self {
        let win_rate_estimate = (m.pattern_type.base_win_rate()
            + (m.confidence - confidence::BASE_CONFIDENCE) / 100.0 * 0.2)
            .clamp(0.30, 0.85);

        Self {
            id: format!("{}-{}-{}-{}", m.pattern_type, symbol, timeframe, detected_at),
            pattern_type: m.pattern_type,
            symbol: symbol.to_string(),
            timeframe: timeframe.to_string(),
            confidence: m.confidence,
            direction: m.direction,
            entry: m.entry,
            stop_loss: m.stop_loss,
            target: m.target,
            risk_reward: m.risk_reward,
            win_rate_estimate,
            detected_at,
            supporting_points: m.supporting_points,
        }
    }
}

/// Sort signals by descending confidence; ties keep their order.
pub fn sort_by_confidence(signals: &mut [Signal]) {
    signals.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
}

// ============================================================
// MARKET CONTEXT
// ============================================================

/// Market trend classification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Trend {
    StrongUp,
    WeakUp,
    #[default]
    Sideways,
    WeakDown,
    StrongDown,
}

impl Trend {
    /// Classify a relative close-to-close change
    pub fn from_change(change: f64) -> Self {
        match change {
            c if c > 0.05 => Trend::StrongUp,
            c if c > 0.02 => Trend::WeakUp,
            c if c < -0.05 => Trend::StrongDown,
            c if c < -0.02 => Trend::WeakDown,
            _ => Trend::Sideways,
        }
    }

    #[inline]
    pub fn is_down(self) -> bool {
        matches!(self, Trend::WeakDown | Trend::StrongDown)
    }

    #[inline]
    pub fn is_up(self) -> bool {
        matches!(self, Trend::WeakUp | Trend::StrongUp)
    }
}

/// Market context at the end of a candle window
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MarketContext {
    pub trend: Trend,
    /// Average true range, 0.0 when not enough bars
    pub atr: f64,
    /// Last volume over the trailing average volume (1.0 when unknown)
    pub volume_ratio: f64,
    pub last_close: f64,
}

/// Provider of market context for a whole window
pub trait ContextProvider: Send + Sync {
    fn compute<T: OHLCV>(&self, bars: &[T]) -> MarketContext;
}

/// Default context provider using simple trailing averages
#[derive(Debug, Clone)]
pub struct DefaultContextProvider {
    pub trend_period: Period,
    pub volume_period: Period,
    pub atr_period: Period,
}

impl Default for DefaultContextProvider {
    fn default() -> Self {
        Self {
            trend_period: Period::new_const(20),
            volume_period: Period::new_const(20),
            atr_period: Period::new_const(14),
        }
    }
}

impl ContextProvider for DefaultContextProvider {
    fn compute<T: OHLCV>(&self, bars: &[T]) -> MarketContext {
        let Some(last) = bars.last() else {
            return MarketContext::default();
        };
        let index = bars.len() - 1;

        MarketContext {
            trend: detectors::helpers::prior_trend(bars, index, self.trend_period.get()),
            atr: detectors::helpers::average_true_range(bars, self.atr_period.get())
                .unwrap_or(0.0),
            volume_ratio: detectors::helpers::volume_ratio(bars, self.volume_period.get()),
            last_close: last.close(),
        }
    }
}

// ============================================================
// PATTERN DETECTOR TRAIT
// ============================================================

/// Swing-based formation detector
///
/// Implementations must return `None` for any precondition failure
/// (short input, missing swings, degenerate prices) and never panic.
pub trait PatternDetector: Send + Sync {
    fn pattern_type(&self) -> PatternType;

    fn min_bars(&self) -> usize {
        detectors::helpers::MIN_SCAN_BARS
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        swings: &SwingPoints,
        ctx: &MarketContext,
    ) -> Option<PatternMatch>;

    fn validate_config(&self) -> Result<()> {
        Ok(())
    }
}

// ============================================================
// BUILTIN DETECTORS - generated via macro
// ============================================================

use detectors::*;

/// Macro to generate BuiltinDetector enum without boilerplate
macro_rules! define_builtin_detectors {
    (
        $(
            $variant:ident($detector:ty)
        ),* $(,)?
    ) => {
        /// All builtin detectors - enum dispatch
        #[derive(Debug, Clone)]
        pub enum BuiltinDetector {
            $($variant($detector)),*
        }

        impl BuiltinDetector {
            #[inline]
            pub fn detect<T: OHLCV>(
                &self,
                bars: &[T],
                swings: &SwingPoints,
                ctx: &MarketContext,
            ) -> Option<PatternMatch> {
                match self {
                    $(Self::$variant(d) => PatternDetector::detect(d, bars, swings, ctx)),*
                }
            }

            #[inline]
            pub fn pattern_type(&self) -> PatternType {
                match self {
                    $(Self::$variant(d) => PatternDetector::pattern_type(d)),*
                }
            }

            #[inline]
            pub fn min_bars(&self) -> usize {
                match self {
                    $(Self::$variant(d) => PatternDetector::min_bars(d)),*
                }
            }

            pub fn validate_config(&self) -> Result<()> {
                match self {
                    $(Self::$variant(d) => PatternDetector::validate_config(d)),*
                }
            }
        }
    };
}

define_builtin_detectors! {
    // Continuation
    Dpd(DpdDetector),
    Upu(UpuDetector),

    // Reversal
    Dpu(DpuDetector),
    Upd(UpdDetector),

    // Structure
    HeadAndShoulders(HeadAndShouldersDetector),
    DoubleTop(DoubleTopDetector),
    DoubleBottom(DoubleBottomDetector),
}

// ============================================================
// PATTERN ENGINE
// ============================================================

/// Engine configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Drop signals below this confidence (on top of each detector's own floor)
    pub min_confidence: Option<f64>,
    pub validate_data: bool,
    pub pattern_filter: Option<Vec<PatternType>>,
    /// Swing lookback `k` on each side
    pub swing_strength: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_confidence: None,
            validate_data: false,
            pattern_filter: None,
            swing_strength: detectors::helpers::DEFAULT_SWING_STRENGTH,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if !(1..=detectors::helpers::MAX_SWING_STRENGTH).contains(&self.swing_strength) {
            return Err(PatternError::InvalidConfig(format!(
                "swing_strength must be in 1..={}",
                detectors::helpers::MAX_SWING_STRENGTH
            )));
        }
        if let Some(min) = self.min_confidence {
            if !(confidence::MIN_CONFIDENCE..=confidence::MAX_CONFIDENCE).contains(&min) {
                return Err(PatternError::OutOfRange {
                    field: "min_confidence",
                    value: min,
                    min: confidence::MIN_CONFIDENCE,
                    max: confidence::MAX_CONFIDENCE,
                });
            }
        }
        Ok(())
    }
}

/// Main pattern detection engine
pub struct PatternEngine<C: ContextProvider = DefaultContextProvider> {
    builtin: Vec<BuiltinDetector>,
    context_provider: C,
    config: EngineConfig,
}

impl<C: ContextProvider> PatternEngine<C> {
    pub fn new(context_provider: C) -> Self {
        Self {
            builtin: Vec::new(),
            context_provider,
            config: EngineConfig::default(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn detectors(&self) -> &[BuiltinDetector] {
        &self.builtin
    }

    // ===========================================
    // LOW-LEVEL: Primitives
    // ===========================================

    #[inline]
    pub fn compute_context<T: OHLCV>(&self, bars: &[T]) -> MarketContext {
        self.context_provider.compute(bars)
    }

    #[inline]
    pub fn swing_points<T: OHLCV>(&self, bars: &[T]) -> SwingPoints {
        find_swing_points(bars, self.config.swing_strength)
    }

    /// Run every detector once over the window.
    pub fn scan_matches<T: OHLCV>(
        &self,
        bars: &[T],
        swings: &SwingPoints,
        ctx: &MarketContext,
    ) -> Vec<PatternMatch> {
        let mut results = Vec::new();

        for detector in &self.builtin {
            if bars.len() < detector.min_bars() {
                continue;
            }
            if let Some(m) = detector.detect(bars, swings, ctx) {
                if self.should_include(&m) {
                    results.push(m);
                } else {
                    tracing::trace!(
                        pattern = %m.pattern_type,
                        confidence = m.confidence,
                        "match filtered"
                    );
                }
            }
        }

        results
    }

    // ===========================================
    // HIGH-LEVEL: Batch processing
    // ===========================================

    /// Scan a window and return confidence-sorted signals.
    pub fn scan<T: OHLCV>(&self, symbol: &str, timeframe: &str, bars: &[T]) -> Result<Vec<Signal>> {
        if self.config.validate_data {
            self.validate_bars(bars)?;
        }

        let ctx = self.compute_context(bars);
        let swings = self.swing_points(bars);
        let detected_at = bars.last().and_then(|b| b.timestamp()).unwrap_or_default();

        let mut signals: Vec<Signal> = self
            .scan_matches(bars, &swings, &ctx)
            .into_iter()
            .map(|m| Signal::from_match(m, symbol, timeframe, detected_at))
            .collect();
        sort_by_confidence(&mut signals);

        tracing::debug!(
            symbol,
            timeframe,
            bars = bars.len(),
            swing_highs = swings.highs.len(),
            swing_lows = swings.lows.len(),
            signals = signals.len(),
            "pattern scan complete"
        );

        Ok(signals)
    }

    // ===========================================
    // Internal helpers
    // ===========================================

    fn should_include(&self, m: &PatternMatch) -> bool {
        if let Some(min) = self.config.min_confidence {
            if m.confidence < min {
                return false;
            }
        }
        if let Some(ref filter) = self.config.pattern_filter {
            if !filter.contains(&m.pattern_type) {
                return false;
            }
        }
        true
    }

    fn validate_bars<T: OHLCV>(&self, bars: &[T]) -> Result<()> {
        for (i, bar) in bars.iter().enumerate() {
            bar.validate().map_err(|e| match e {
                PatternError::InvalidOHLCV { reason, .. } => {
                    PatternError::InvalidOHLCV { index: i, reason }
                }
                other => other,
            })?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        self.config.validate()?;
        for d in &self.builtin {
            d.validate_config()?;
        }
        Ok(())
    }
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for creating PatternEngine instances
pub struct EngineBuilder<C: ContextProvider = DefaultContextProvider> {
    context_provider: C,
    builtin: Vec<BuiltinDetector>,
    config: EngineConfig,
}

impl Default for EngineBuilder<DefaultContextProvider> {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder<DefaultContextProvider> {
    pub fn new() -> Self {
        Self {
            context_provider: DefaultContextProvider::default(),
            builtin: Vec::new(),
            config: EngineConfig::default(),
        }
    }
}

/// Generate an array of `BuiltinDetector` variants using `Default::default()` for each inner type.
macro_rules! builtin_defaults {
  ($($variant:ident),* $(,)?) => {
    [$(BuiltinDetector::$variant(Default::default())),*]
  };
}

impl<C: ContextProvider> EngineBuilder<C> {
    /// Change context provider
    pub fn context_provider<C2: ContextProvider>(self, provider: C2) -> EngineBuilder<C2> {
        EngineBuilder {
            context_provider: provider,
            builtin: self.builtin,
            config: self.config,
        }
    }

    /// Add all seven formations with default configurations
    pub fn with_all_defaults(self) -> Self {
        self.with_continuation_defaults()
            .with_reversal_defaults()
            .with_structure_defaults()
    }

    /// DPD and UPU
    pub fn with_continuation_defaults(mut self) -> Self {
        self.builtin.extend(builtin_defaults![Dpd, Upu]);
        self
    }

    /// DPU and UPD
    pub fn with_reversal_defaults(mut self) -> Self {
        self.builtin.extend(builtin_defaults![Dpu, Upd]);
        self
    }

    /// Head & Shoulders, Double Top, Double Bottom
    pub fn with_structure_defaults(mut self) -> Self {
        self.builtin
            .extend(builtin_defaults![HeadAndShoulders, DoubleTop, DoubleBottom]);
        self
    }

    /// Add a builtin detector
    #[allow(clippy::should_implement_trait)]
    pub fn add(mut self, detector: BuiltinDetector) -> Self {
        self.builtin.push(detector);
        self
    }

    /// Add with config validation
    pub fn add_checked(mut self, detector: BuiltinDetector) -> Result<Self> {
        detector.validate_config()?;
        self.builtin.push(detector);
        Ok(self)
    }

    /// Replace the whole engine configuration
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Set minimum confidence filter
    pub fn min_confidence(mut self, confidence: f64) -> Self {
        self.config.min_confidence = Some(confidence);
        self
    }

    /// Enable/disable data validation
    pub fn validate_data(mut self, enable: bool) -> Self {
        self.config.validate_data = enable;
        self
    }

    /// Swing lookback on each side of a candidate extremum
    pub fn swing_strength(mut self, k: usize) -> Self {
        self.config.swing_strength = k;
        self
    }

    /// Filter to specific formations only
    pub fn only_patterns(mut self, types: impl IntoIterator<Item = PatternType>) -> Self {
        self.config.pattern_filter = Some(types.into_iter().collect());
        self
    }

    /// Build the engine
    pub fn build(self) -> Result<PatternEngine<C>> {
        let engine = PatternEngine {
            builtin: self.builtin,
            context_provider: self.context_provider,
            config: self.config,
        };
        engine.validate()?;
        Ok(engine)
    }
}

// ============================================================
// PARALLEL SCANNING
// ============================================================

use rayon::prelude::*;

/// Result of scanning a single instrument
#[derive(Debug)]
pub struct ScanResult {
    pub symbol: String,
    pub signals: Vec<Signal>,
}

/// Error from scanning a single instrument
#[derive(Debug)]
pub struct ScanError {
    pub symbol: String,
    pub error: PatternError,
}

/// Parallel scanning of already-fetched instruments on one timeframe
pub fn scan_parallel<'a, T, I, C>(
    engine: &PatternEngine<C>,
    timeframe: &str,
    instruments: I,
) -> (Vec<ScanResult>, Vec<ScanError>)
where
    T: OHLCV + Sync + 'a,
    I: IntoParallelIterator<Item = (&'a str, &'a [T])>,
    C: ContextProvider + Sync,
{
    let results: Vec<_> = instruments
        .into_par_iter()
        .map(|(symbol, bars)| {
            engine
                .scan(symbol, timeframe, bars)
                .map(|signals| ScanResult {
                    symbol: symbol.to_string(),
                    signals,
                })
                .map_err(|error| ScanError {
                    symbol: symbol.to_string(),
                    error,
                })
        })
        .collect();

    let mut successes = Vec::new();
    let mut errors = Vec::new();

    for result in results {
        match result {
            Ok(r) => successes.push(r),
            Err(e) => errors.push(e),
        }
    }

    (successes, errors)
}

// ============================================================
// TESTS
// ============================================================
