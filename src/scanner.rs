//! Async scanning over an external candle source

use std::time::Duration;

use async_trait::async_trait;

use crate::{
    sort_by_confidence, Candle, ContextProvider, DefaultContextProvider, PatternEngine,
    PatternError, Signal,
};

/// Failures reported by a [`CandleSource`]
#[derive(Debug, Clone, thiserror::Error)]
pub enum SourceError {
    #[error("candle source unavailable: {0}")]
    Unavailable(String),

    #[error("unknown symbol {0}")]
    UnknownSymbol(String),

    #[error("unsupported timeframe {0}")]
    UnsupportedTimeframe(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ScannerError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("candle fetch timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Pattern(#[from] PatternError),
}

/// Read-only supplier of candles, oldest first
#[async_trait]
pub trait CandleSource: Send + Sync {
    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, SourceError>;
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Candles requested per scan
    pub candle_limit: usize,
    pub fetch_timeout_ms: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            candle_limit: 200,
            fetch_timeout_ms: 10_000,
        }
    }
}

impl ScannerConfig {
    pub fn validate(&self) -> crate::Result<()> {
        if self.candle_limit < crate::detectors::helpers::MIN_SCAN_BARS {
            return Err(PatternError::InvalidConfig(format!(
                "candle_limit must be >= {}",
                crate::detectors::helpers::MIN_SCAN_BARS
            )));
        }
        if self.fetch_timeout_ms == 0 {
            return Err(PatternError::InvalidConfig(
                "fetch_timeout_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Fetches candles and runs the pattern engine over them
pub struct Scanner<S, C: ContextProvider = DefaultContextProvider> {
    source: S,
    engine: PatternEngine<C>,
    config: ScannerConfig,
}

impl<S: CandleSource, C: ContextProvider> Scanner<S, C> {
    pub fn new(source: S, engine: PatternEngine<C>, config: ScannerConfig) -> Self {
        Self {
            source,
            engine,
            config,
        }
    }

    pub fn engine(&self) -> &PatternEngine<C> {
        &self.engine
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Fetch and scan one symbol, surfacing every failure
    pub async fn try_detect_patterns(
        &self,
        symbol: &str,
        timeframe: &str,
    ) -> Result<Vec<Signal>, ScannerError> {
        let limit = Duration::from_millis(self.config.fetch_timeout_ms);
        let fetch = self
            .source
            .fetch_candles(symbol, timeframe, self.config.candle_limit);
        let candles = tokio::time::timeout(limit, fetch)
            .await
            .map_err(|_| ScannerError::Timeout(limit))??;

        Ok(self.engine.scan(symbol, timeframe, &candles)?)
    }

    /// Confidence-sorted signals for one symbol; any failure yields none
    pub async fn detect_patterns(&self, symbol: &str, timeframe: &str) -> Vec<Signal> {
        match self.try_detect_patterns(symbol, timeframe).await {
            Ok(signals) => signals,
            Err(error) => {
                tracing::warn!(symbol, timeframe, %error, "pattern scan failed");
                Vec::new()
            }
        }
    }

    /// Scan symbols one after another and merge their signals by confidence
    pub async fn scan_multiple_symbols<I, T>(&self, symbols: I, timeframe: &str) -> Vec<Signal>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let mut all = Vec::new();
        for symbol in symbols {
            all.extend(self.detect_patterns(symbol.as_ref(), timeframe).await);
        }
        sort_by_confidence(&mut all);
        all
    }
}
