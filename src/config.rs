//! Runtime settings read from `XVENUE_*` environment variables.

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};

use crate::market::market_data::MarketKind;
use crate::market::timeframe::Timeframe;
use crate::pipeline::aggregator::{AggregatorConfig, DEFAULT_FETCH_TIMEOUT, DEFAULT_MAX_CONCURRENT_FETCHES};
use crate::pipeline::catalog::InstrumentFilter;
use crate::streaming::reconnect::ReconnectConfig;

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub base: String,
    pub quotes: Vec<String>,
    pub kind: Option<MarketKind>,
    pub timeframe: Timeframe,
    pub bar_count: usize,
    pub reference: String,
    pub fetch_timeout: Duration,
    pub max_concurrent: usize,
    pub reconnect: ReconnectConfig,
    /// Fallback tracing filter when `RUST_LOG` is unset
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base: "BTC".to_string(),
            quotes: vec!["USDT".to_string(), "USDC".to_string(), "USD".to_string()],
            kind: None,
            timeframe: Timeframe::H1,
            bar_count: 100,
            reference: "BTC/USDT".to_string(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            max_concurrent: DEFAULT_MAX_CONCURRENT_FETCHES,
            reconnect: ReconnectConfig::default(),
            log_filter: "info".to_string(),
        }
    }
}

impl Settings {
    /// Loads `.env` when present, then reads the process environment.
    pub fn from_env() -> Result<Self> {
        if let Err(err) = dotenvy::dotenv() {
            if !err.not_found() {
                return Err(err).context("failed to load .env");
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from any key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let quotes = match get("XVENUE_QUOTES") {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|q| !q.is_empty())
                .map(str::to_ascii_uppercase)
                .collect(),
            None => defaults.quotes,
        };

        let kind = match get("XVENUE_KIND") {
            Some(raw) => Some(MarketKind::parse(&raw).ok_or_else(|| anyhow!("XVENUE_KIND: unknown market kind {raw:?}"))?),
            None => None,
        };

        let timeframe = match get("XVENUE_TIMEFRAME") {
            Some(raw) => raw.parse::<Timeframe>().context("XVENUE_TIMEFRAME")?,
            None => defaults.timeframe,
        };

        let bar_count: usize = parse_or(&get, "XVENUE_BAR_COUNT", defaults.bar_count)?;
        if bar_count == 0 {
            return Err(anyhow!("XVENUE_BAR_COUNT must be positive"));
        }

        let reconnect = ReconnectConfig {
            initial_delay: millis_or(&get, "XVENUE_RECONNECT_INITIAL_MS", defaults.reconnect.initial_delay)?,
            max_delay: millis_or(&get, "XVENUE_RECONNECT_MAX_MS", defaults.reconnect.max_delay)?,
            multiplier: parse_or(&get, "XVENUE_RECONNECT_MULTIPLIER", defaults.reconnect.multiplier)?,
            max_attempts: parse_or(&get, "XVENUE_RECONNECT_MAX_ATTEMPTS", defaults.reconnect.max_attempts)?,
            ..defaults.reconnect
        };
        if !reconnect.multiplier.is_finite() || reconnect.multiplier < 1.0 {
            return Err(anyhow!(
                "XVENUE_RECONNECT_MULTIPLIER must be a finite number >= 1, got {}",
                reconnect.multiplier
            ));
        }

        Ok(Self {
            base: get("XVENUE_BASE").map_or(defaults.base, |b| b.to_ascii_uppercase()),
            quotes,
            kind,
            timeframe,
            bar_count,
            reference: get("XVENUE_REFERENCE").unwrap_or(defaults.reference),
            fetch_timeout: millis_or(&get, "XVENUE_FETCH_TIMEOUT_MS", defaults.fetch_timeout)?,
            max_concurrent: parse_or(&get, "XVENUE_MAX_CONCURRENT", defaults.max_concurrent)?,
            reconnect,
            log_filter: get("XVENUE_LOG").unwrap_or(defaults.log_filter),
        })
    }

    pub fn filter(&self) -> InstrumentFilter {
        let filter = InstrumentFilter::new(self.base.clone()).with_quotes(self.quotes.iter().cloned());
        match self.kind {
            Some(kind) => filter.with_kind(kind),
            None => filter,
        }
    }

    pub fn aggregator(&self) -> AggregatorConfig {
        AggregatorConfig {
            fetch_timeout: self.fetch_timeout,
            max_concurrent: self.max_concurrent,
        }
    }

    pub fn reconnect(&self) -> ReconnectConfig {
        self.reconnect.clone()
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.parse::<T>().with_context(|| format!("{key}: invalid value {raw:?}")),
        None => Ok(default),
    }
}

fn millis_or<G>(get: &G, key: &str, default: Duration) -> Result<Duration>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse::<u64>()
            .map(Duration::from_millis)
            .with_context(|| format!("{key}: expected milliseconds, got {raw:?}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(pairs: &[(&str, &str)]) -> Result<Settings> {
        let vars: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_when_unset() {
        let s = settings(&[]).unwrap();
        assert_eq!(s, Settings::default());
        assert_eq!(s.timeframe, Timeframe::H1);
        assert_eq!(s.quotes, vec!["USDT", "USDC", "USD"]);
        assert_eq!(s.reconnect.max_attempts, 0);
    }

    #[test]
    fn test_overrides() {
        let s = settings(&[
            ("XVENUE_BASE", "eth"),
            ("XVENUE_QUOTES", "usdt, usdc"),
            ("XVENUE_KIND", "swap"),
            ("XVENUE_TIMEFRAME", "15m"),
            ("XVENUE_BAR_COUNT", "24"),
            ("XVENUE_REFERENCE", "ETH/USDT"),
            ("XVENUE_FETCH_TIMEOUT_MS", "2500"),
            ("XVENUE_RECONNECT_MAX_ATTEMPTS", "5"),
        ])
        .unwrap();

        assert_eq!(s.base, "ETH");
        assert_eq!(s.quotes, vec!["USDT", "USDC"]);
        assert_eq!(s.kind, Some(MarketKind::Swap));
        assert_eq!(s.timeframe, Timeframe::M15);
        assert_eq!(s.bar_count, 24);
        assert_eq!(s.aggregator().fetch_timeout, Duration::from_millis(2500));
        assert_eq!(s.reconnect().max_attempts, 5);
        assert_eq!(s.filter().kind, Some(MarketKind::Swap));
    }

    #[test]
    fn test_malformed_value_names_variable() {
        let err = settings(&[("XVENUE_MAX_CONCURRENT", "lots")]).unwrap_err();
        assert!(format!("{err:#}").contains("XVENUE_MAX_CONCURRENT"));

        let err = settings(&[("XVENUE_TIMEFRAME", "2h")]).unwrap_err();
        assert!(format!("{err:#}").contains("XVENUE_TIMEFRAME"));
    }

    #[test]
    fn test_rejects_zero_bar_count() {
        assert!(settings(&[("XVENUE_BAR_COUNT", "0")]).is_err());
    }

    #[test]
    fn test_rejects_unusable_multiplier() {
        for raw in ["0", "-2", "0.5", "inf", "NaN"] {
            let err = settings(&[("XVENUE_RECONNECT_MULTIPLIER", raw)]).unwrap_err();
            assert!(err.to_string().contains("XVENUE_RECONNECT_MULTIPLIER"), "{raw}: {err}");
        }
        let s = settings(&[("XVENUE_RECONNECT_MULTIPLIER", "1.5")]).unwrap();
        assert_eq!(s.reconnect.multiplier, 1.5);
    }

    #[test]
    fn test_unknown_kind() {
        let err = settings(&[("XVENUE_KIND", "option")]).unwrap_err();
        assert!(err.to_string().contains("option"));
    }
}
