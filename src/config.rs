//! Top-level configuration
//!
//! Every section is optional in the serialized form; missing fields fall back
//! to their defaults.
//!
//! ```rust
//! use zonesight::config::ZonesightConfig;
//!
//! let json = r#"{ "engine": { "min_confidence": 60 } }"#;
//! let config = ZonesightConfig::from_json_str(json).unwrap();
//! assert_eq!(config.engine.min_confidence, Some(60.0));
//! assert_eq!(config.gateway.page_size, 100);
//! ```

use crate::{
    scanner::ScannerConfig,
    zones::{gateway::GatewayConfig, tracker::ZoneConfig},
    ContextProvider, EngineBuilder, EngineConfig, PatternError, Result,
};

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ZonesightConfig {
    pub engine: EngineConfig,
    pub zones: ZoneConfig,
    pub gateway: GatewayConfig,
    pub scanner: ScannerConfig,
}

impl ZonesightConfig {
    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| PatternError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| PatternError::InvalidConfig(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        self.engine.validate()?;
        self.zones.validate()?;
        self.gateway.validate()?;
        self.scanner.validate()
    }

    /// Apply the engine section to a builder
    pub fn configure<C: ContextProvider>(&self, builder: EngineBuilder<C>) -> EngineBuilder<C> {
        builder.config(self.engine.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PatternType;

    #[test]
    fn test_defaults_are_valid() {
        let config = ZonesightConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.zones.retest_cooldown_ms, 3_600_000);
        assert_eq!(config.zones.max_zone_age_ms, 30 * 24 * 3_600_000);
        assert_eq!(config.zones.max_trades_per_zone, 2);
        assert_eq!(config.gateway.store_timeout_ms, 10_000);
        assert_eq!(config.scanner.candle_limit, 200);
        assert_eq!(config.engine.swing_strength, 3);
    }

    #[test]
    fn test_partial_json() {
        let json = r#"{
            "engine": { "pattern_filter": ["DOUBLE_TOP", "DPD"] },
            "zones": { "targets": { "min_rr": 3.0 } },
            "gateway": { "page_size": 50 }
        }"#;
        let config = ZonesightConfig::from_json_str(json).unwrap();
        assert_eq!(
            config.engine.pattern_filter,
            Some(vec![PatternType::DoubleTop, PatternType::Dpd])
        );
        assert_eq!(config.zones.targets.min_rr, 3.0);
        assert_eq!(config.zones.targets.min_valid_rr, 1.5);
        assert_eq!(config.gateway.page_size, 50);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let invalid = [
            r#"{ "engine": { "swing_strength": 0 } }"#,
            r#"{ "engine": { "swing_strength": 51 } }"#,
            r#"{ "gateway": { "page_size": 0 } }"#,
            r#"{ "scanner": { "candle_limit": 10 } }"#,
            "not json",
        ];
        for json in invalid {
            assert!(ZonesightConfig::from_json_str(json).is_err(), "{json}");
        }
    }

    #[test]
    fn test_round_trip_and_configure() {
        let mut config = ZonesightConfig::default();
        config.engine.min_confidence = Some(55.0);
        let parsed = ZonesightConfig::from_json_str(&config.to_json_string().unwrap()).unwrap();
        assert_eq!(parsed.engine.min_confidence, Some(55.0));

        let engine = parsed
            .configure(EngineBuilder::new().with_all_defaults())
            .build()
            .unwrap();
        assert_eq!(engine.config().min_confidence, Some(55.0));
    }
}
