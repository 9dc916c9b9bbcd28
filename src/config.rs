//! Runtime settings.
//!
//! Layering: built-in defaults, then an optional file, then `ARBX_*`
//! environment variables (`__` separates nested keys, e.g.
//! `ARBX_SKEW__WINDOW=100`). Raw [`Settings`] are untyped numbers and
//! strings; [`Settings::validate`] turns them into the typed values the
//! components take, or fails before anything connects.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use config::{Config, Environment, File, Source};
use rust_decimal::Decimal;
use serde::Deserialize;
use url::Url;

use crate::engine::detector::DetectorConfig;
use crate::engine::skew::SkewConfig;
use crate::error::ConfigError;
use crate::market_data::connector::ConnectorSettings;

pub const ENV_PREFIX: &str = "ARBX";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VenueKind {
    Binance,
    Huobi,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VenueSettings {
    pub id: String,
    pub kind: VenueKind,
    pub url: String,
    /// Send a SUBSCRIBE frame on open instead of relying on the URL path.
    #[serde(default)]
    pub explicit_subscribe: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SkewSettings {
    pub window: usize,
    pub multiplier_base: f64,
    pub multiplier_cap: f64,
    pub floor_ms: u64,
}

impl Default for SkewSettings {
    fn default() -> Self {
        Self { window: 50, multiplier_base: 1.5, multiplier_cap: 3.0, floor_ms: 300 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub instrument: String,
    /// Percent: 0.03 means 0.03 %, not 3 %.
    pub margin_threshold_percent: f64,
    pub price_expiry_ms: u64,
    pub reconnect_delay_ms: u64,
    pub idle_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub statistics_interval_ms: u64,
    pub opportunity_queue_capacity: usize,
    pub log_filter: String,
    /// Prometheus listen address; only used with the `metrics-exporter` feature.
    pub metrics_addr: Option<String>,
    pub skew: SkewSettings,
    pub venues: Vec<VenueSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            instrument: "ethusdt".into(),
            margin_threshold_percent: 0.03,
            price_expiry_ms: 5_000,
            reconnect_delay_ms: 5_000,
            idle_timeout_ms: 60_000,
            connect_timeout_ms: 10_000,
            statistics_interval_ms: 60_000,
            opportunity_queue_capacity: 1_024,
            log_filter: "info".into(),
            metrics_addr: None,
            skew: SkewSettings::default(),
            venues: vec![
                VenueSettings {
                    id: "binance".into(),
                    kind: VenueKind::Binance,
                    url: "wss://stream.binance.com:9443/ws/ethusdt@bookTicker".into(),
                    explicit_subscribe: false,
                },
                VenueSettings {
                    id: "huobi".into(),
                    kind: VenueKind::Huobi,
                    url: "wss://api.huobi.pro/ws".into(),
                    explicit_subscribe: false,
                },
            ],
        }
    }
}

/// Typed, checked settings. Only constructed by [`Settings::validate`].
#[derive(Debug, Clone)]
pub struct ValidatedSettings {
    pub instrument: String,
    pub detector: DetectorConfig,
    pub skew: SkewConfig,
    pub connector: ConnectorSettings,
    pub statistics_interval: Duration,
    pub opportunity_queue_capacity: usize,
    pub log_filter: String,
    pub metrics_addr: Option<SocketAddr>,
    pub venues: Vec<(VenueSettings, Url)>,
}

pub fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX).prefix_separator("_").separator("__").try_parsing(true)
}

impl Settings {
    /// Defaults, then `file` if given, then the process environment.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        Self::layered(file.map(|p| File::from(p).required(true)), environment())
    }

    pub fn layered<S>(file: Option<S>, env: Environment) -> Result<Self, ConfigError>
    where
        S: Source + Send + Sync + 'static,
    {
        let mut builder = Config::builder();
        if let Some(file) = file {
            builder = builder.add_source(file);
        }
        // struct-level serde defaults fill anything no source sets
        let settings = builder.add_source(env).build()?.try_deserialize::<Settings>()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<ValidatedSettings, ConfigError> {
        let instrument = self.instrument.trim().to_lowercase();
        if instrument.is_empty() {
            return Err(invalid("instrument", "must not be empty"));
        }

        let threshold = self.margin_threshold_percent;
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(ConfigError::InvalidThreshold(threshold.to_string()));
        }
        // shortest round-trip text, so 0.03 stays exactly 0.03
        let threshold_percent = Decimal::from_str(&threshold.to_string())
            .map_err(|_| ConfigError::InvalidThreshold(threshold.to_string()))?;

        let skew = &self.skew;
        if skew.window == 0 {
            return Err(invalid("skew.window", "must be at least 1"));
        }
        if !skew.multiplier_base.is_finite() || skew.multiplier_base <= 0.0 {
            return Err(invalid("skew.multiplier_base", "must be a positive number"));
        }
        if !skew.multiplier_cap.is_finite() || skew.multiplier_cap < skew.multiplier_base {
            return Err(invalid("skew.multiplier_cap", "must be >= skew.multiplier_base"));
        }

        if self.opportunity_queue_capacity == 0 {
            return Err(invalid("opportunity_queue_capacity", "must be at least 1"));
        }

        let metrics_addr = self
            .metrics_addr
            .as_deref()
            .map(|addr| addr.parse::<SocketAddr>().map_err(|e| invalid("metrics_addr", &e.to_string())))
            .transpose()?;

        Ok(ValidatedSettings {
            detector: DetectorConfig {
                threshold_percent,
                absolute_expiry: positive_ms("price_expiry_ms", self.price_expiry_ms)?,
            },
            skew: SkewConfig {
                window: skew.window,
                multiplier_base: skew.multiplier_base,
                multiplier_cap: skew.multiplier_cap,
                floor: positive_ms("skew.floor_ms", skew.floor_ms)?,
            },
            connector: ConnectorSettings {
                reconnect_delay: positive_ms("reconnect_delay_ms", self.reconnect_delay_ms)?,
                idle_timeout: positive_ms("idle_timeout_ms", self.idle_timeout_ms)?,
                connect_timeout: positive_ms("connect_timeout_ms", self.connect_timeout_ms)?,
            },
            statistics_interval: positive_ms("statistics_interval_ms", self.statistics_interval_ms)?,
            opportunity_queue_capacity: self.opportunity_queue_capacity,
            log_filter: self.log_filter.clone(),
            metrics_addr,
            venues: validate_venues(&self.venues)?,
            instrument,
        })
    }
}

fn validate_venues(venues: &[VenueSettings]) -> Result<Vec<(VenueSettings, Url)>, ConfigError> {
    if venues.is_empty() {
        return Err(ConfigError::NoVenues);
    }
    let mut seen = HashSet::new();
    venues
        .iter()
        .map(|venue| {
            if !seen.insert(venue.id.as_str()) {
                return Err(ConfigError::DuplicateVenue(venue.id.clone()));
            }
            let url = Url::parse(&venue.url).map_err(|source| ConfigError::InvalidVenueUri {
                venue: venue.id.clone(),
                url: venue.url.clone(),
                source,
            })?;
            match url.scheme() {
                "ws" | "wss" => Ok((venue.clone(), url)),
                other => Err(ConfigError::UnsupportedScheme { venue: venue.id.clone(), scheme: other.to_string() }),
            }
        })
        .collect()
}

fn positive_ms(name: &'static str, ms: u64) -> Result<Duration, ConfigError> {
    if ms == 0 {
        return Err(invalid(name, "must be greater than zero"));
    }
    Ok(Duration::from_millis(ms))
}

fn invalid(name: &'static str, reason: &str) -> ConfigError {
    ConfigError::InvalidSetting { name, reason: reason.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn no_env() -> Environment {
        environment().source(Some(HashMap::new()))
    }

    fn from_toml(text: &str) -> Result<Settings, ConfigError> {
        Settings::layered(Some(File::from_str(text, FileFormat::Toml)), no_env())
    }

    #[test]
    fn test_defaults_validate() {
        let settings = from_toml("").unwrap();
        let valid = settings.validate().unwrap();
        assert_eq!(valid.instrument, "ethusdt");
        assert_eq!(valid.detector.threshold_percent, dec!(0.03));
        assert_eq!(valid.detector.absolute_expiry, Duration::from_millis(5_000));
        assert_eq!(valid.connector.reconnect_delay, Duration::from_millis(5_000));
        assert_eq!(valid.connector.idle_timeout, Duration::from_millis(60_000));
        assert_eq!(valid.skew.window, 50);
        assert_eq!(valid.skew.floor, Duration::from_millis(300));
        assert_eq!(valid.statistics_interval, Duration::from_millis(60_000));
        assert_eq!(valid.venues.len(), 2);
        assert_eq!(valid.venues[1].1.scheme(), "wss");
    }

    #[test]
    fn test_file_overrides_defaults() {
        let settings = from_toml(
            r#"
            instrument = "BTCUSDT"
            margin_threshold_percent = 0.1

            [skew]
            window = 10

            [[venues]]
            id = "a"
            kind = "binance"
            url = "ws://127.0.0.1:9001/ws/btcusdt@bookTicker"
            explicit_subscribe = true

            [[venues]]
            id = "b"
            kind = "huobi"
            url = "ws://127.0.0.1:9002/ws"
            "#,
        )
        .unwrap();
        let valid = settings.validate().unwrap();
        assert_eq!(valid.instrument, "btcusdt");
        assert_eq!(valid.detector.threshold_percent, dec!(0.1));
        assert_eq!(valid.skew.window, 10);
        assert!((valid.skew.multiplier_base - 1.5).abs() < f64::EPSILON);
        assert!(valid.venues[0].0.explicit_subscribe);
        assert_eq!(valid.venues[1].0.kind, VenueKind::Huobi);
    }

    #[test]
    fn test_environment_wins_over_file() {
        let env: HashMap<String, String> = [
            ("ARBX_PRICE_EXPIRY_MS".to_string(), "2500".to_string()),
            ("ARBX_SKEW__FLOOR_MS".to_string(), "150".to_string()),
        ]
        .into_iter()
        .collect();
        let settings = Settings::layered(
            Some(File::from_str("price_expiry_ms = 9000", FileFormat::Toml)),
            environment().source(Some(env)),
        )
        .unwrap();
        assert_eq!(settings.price_expiry_ms, 2_500);
        assert_eq!(settings.skew.floor_ms, 150);
    }

    #[test]
    fn test_rejects_bad_venue_urls() {
        let mut settings = Settings::default();
        settings.venues[0].url = "not a url".into();
        assert!(matches!(settings.validate(), Err(ConfigError::InvalidVenueUri { .. })));

        settings.venues[0].url = "https://stream.binance.com".into();
        match settings.validate() {
            Err(ConfigError::UnsupportedScheme { venue, scheme }) => {
                assert_eq!(venue, "binance");
                assert_eq!(scheme, "https");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_rejects_bad_threshold_and_durations() {
        let mut settings = Settings { margin_threshold_percent: -0.01, ..Settings::default() };
        assert!(matches!(settings.validate(), Err(ConfigError::InvalidThreshold(_))));
        settings.margin_threshold_percent = f64::NAN;
        assert!(matches!(settings.validate(), Err(ConfigError::InvalidThreshold(_))));

        let settings = Settings { idle_timeout_ms: 0, ..Settings::default() };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidSetting { name: "idle_timeout_ms", .. })
        ));

        let settings = Settings { metrics_addr: Some("nowhere".into()), ..Settings::default() };
        assert!(matches!(settings.validate(), Err(ConfigError::InvalidSetting { name: "metrics_addr", .. })));
    }

    #[test]
    fn test_rejects_empty_and_duplicate_venues() {
        let settings = Settings { venues: Vec::new(), ..Settings::default() };
        assert!(matches!(settings.validate(), Err(ConfigError::NoVenues)));

        let mut settings = Settings::default();
        settings.venues[1].id = "binance".into();
        assert!(matches!(settings.validate(), Err(ConfigError::DuplicateVenue(id)) if id == "binance"));
    }

    #[test]
    fn test_unknown_venue_kind_fails_to_load() {
        let err = from_toml(
            r#"
            [[venues]]
            id = "x"
            kind = "kraken"
            url = "wss://example.com"
            "#,
        );
        assert!(matches!(err, Err(ConfigError::Load(_))));
    }
}
