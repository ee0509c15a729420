//! Pipeline configuration: parsed and validated once at startup.
//!
//! Every key is optional and falls back to its default, but a value that
//! is present must parse and be in range; otherwise loading fails with
//! [`ScalpwatchError::ConfigInvalid`].

use chrono::Duration;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use crate::domain::capital::CapitalParams;
use crate::domain::error::ScalpwatchError;
use crate::domain::history::HistoryParams;
use crate::domain::indicator::IndicatorKind;
use crate::domain::indicator::candle_pattern::MAX_LOOKBACK;
use crate::domain::indicator::engine::IndicatorParams;
use crate::domain::position::PositionParams;
use crate::domain::scoring::{ScoringAggregator, default_weights};
use crate::domain::signal::SignalThresholds;
use crate::ports::config_port::ConfigPort;

/// Longest accepted candle interval: one year.
const MAX_INTERVAL_SECS: i64 = 365 * 24 * 60 * 60;

/// Sections and keys understood by [`PipelineConfig::from_port`].
const KNOWN_KEYS: &[(&str, &[&str])] = &[
    ("feed", &["interval_secs"]),
    ("macd", &["fast", "slow", "signal", "full_strength_pct"]),
    ("rsi", &["period", "overbought", "oversold"]),
    ("ema", &["period", "full_strength_pct"]),
    ("atr", &["period"]),
    ("vegas", &["fast", "slow", "full_strength_pct"]),
    ("ema_cross", &["fast", "slow", "decay_candles", "min_strength"]),
    ("candle_pattern", &["lookback"]),
    ("fibonacci", &["lookback", "shallow", "deep"]),
    (
        "weights",
        &[
            "macd",
            "rsi",
            "ema200",
            "atr",
            "vegas",
            "ema_cross",
            "candle_pattern",
            "fibonacci",
            "enabled",
        ],
    ),
    (
        "position",
        &[
            "entry_threshold",
            "stop_atr_long",
            "take_atr_long",
            "stop_atr_short",
            "take_atr_short",
            "auto_adjust",
            "tighten",
            "widen",
            "allow_short",
        ],
    ),
    ("capital", &["initial_capital", "position_fraction", "phase_targets"]),
    (
        "history",
        &[
            "path",
            "pool_size",
            "horizon_candles",
            "neutral_band",
            "max_retries",
            "retry_backoff_ms",
            "buffer_capacity",
        ],
    ),
    ("notify", &["strong_score"]),
];

#[derive(Debug, Clone, PartialEq)]
pub struct StorageConfig {
    /// SQLite file; `None` keeps history in memory.
    pub path: Option<PathBuf>,
    pub pool_size: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: None,
            pool_size: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotifyConfig {
    /// Notify when |score| * 10 reaches this value.
    pub strong_score: f64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self { strong_score: 8.0 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub interval: Duration,
    pub indicators: IndicatorParams,
    pub thresholds: SignalThresholds,
    pub weights: BTreeMap<IndicatorKind, f64>,
    pub enabled: BTreeSet<IndicatorKind>,
    pub position: PositionParams,
    pub capital: CapitalParams,
    pub history: HistoryParams,
    pub storage: StorageConfig,
    pub notify: NotifyConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let weights = default_weights();
        let enabled = weights.keys().copied().collect();
        Self {
            interval: Duration::seconds(60),
            indicators: IndicatorParams::default(),
            thresholds: SignalThresholds::default(),
            weights,
            enabled,
            position: PositionParams::default(),
            capital: CapitalParams::default(),
            history: HistoryParams::default(),
            storage: StorageConfig::default(),
            notify: NotifyConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_port(config: &dyn ConfigPort) -> Result<Self, ScalpwatchError> {
        warn_unknown_keys(config);
        let d = PipelineConfig::default();
        let r = Reader { config };

        let interval_secs: i64 = r.get("feed", "interval_secs", 60)?;
        r.check(
            interval_secs > 0 && interval_secs <= MAX_INTERVAL_SECS,
            "feed",
            "interval_secs",
            "must be between 1 and 31536000 (one year)",
        )?;

        let i = &d.indicators;
        let indicators = IndicatorParams {
            macd_fast: r.period("macd", "fast", i.macd_fast)?,
            macd_slow: r.period("macd", "slow", i.macd_slow)?,
            macd_signal: r.period("macd", "signal", i.macd_signal)?,
            rsi_period: r.period("rsi", "period", i.rsi_period)?,
            ema_period: r.period("ema", "period", i.ema_period)?,
            atr_period: r.period("atr", "period", i.atr_period)?,
            vegas_fast: r.period("vegas", "fast", i.vegas_fast)?,
            vegas_slow: r.period("vegas", "slow", i.vegas_slow)?,
            cross_fast: r.period("ema_cross", "fast", i.cross_fast)?,
            cross_slow: r.period("ema_cross", "slow", i.cross_slow)?,
            pattern_lookback: r.period("candle_pattern", "lookback", i.pattern_lookback)?,
            fib_lookback: r.period("fibonacci", "lookback", i.fib_lookback)?,
        };
        r.check(
            indicators.macd_fast < indicators.macd_slow,
            "macd",
            "fast",
            "must be shorter than slow",
        )?;
        r.check(
            indicators.vegas_fast < indicators.vegas_slow,
            "vegas",
            "fast",
            "must be shorter than slow",
        )?;
        r.check(
            indicators.cross_fast < indicators.cross_slow,
            "ema_cross",
            "fast",
            "must be shorter than slow",
        )?;
        r.check(
            indicators.pattern_lookback <= MAX_LOOKBACK,
            "candle_pattern",
            "lookback",
            format!("must be at most {}", MAX_LOOKBACK),
        )?;
        r.check(
            indicators.fib_lookback >= 2,
            "fibonacci",
            "lookback",
            "must be at least 2",
        )?;

        let t = &d.thresholds;
        let thresholds = SignalThresholds {
            macd_full_strength_pct: r.positive("macd", "full_strength_pct", t.macd_full_strength_pct)?,
            rsi_overbought: r.get("rsi", "overbought", t.rsi_overbought)?,
            rsi_oversold: r.get("rsi", "oversold", t.rsi_oversold)?,
            ema_full_strength_pct: r.positive("ema", "full_strength_pct", t.ema_full_strength_pct)?,
            vegas_full_strength_pct: r.positive("vegas", "full_strength_pct", t.vegas_full_strength_pct)?,
            cross_decay_candles: r.period("ema_cross", "decay_candles", t.cross_decay_candles)?,
            cross_min_strength: r.unit("ema_cross", "min_strength", t.cross_min_strength)?,
            fib_shallow: r.get("fibonacci", "shallow", t.fib_shallow)?,
            fib_deep: r.get("fibonacci", "deep", t.fib_deep)?,
        };
        r.check(
            0.0 < thresholds.rsi_oversold
                && thresholds.rsi_oversold < 50.0
                && 50.0 < thresholds.rsi_overbought
                && thresholds.rsi_overbought < 100.0,
            "rsi",
            "overbought",
            "need 0 < oversold < 50 < overbought < 100",
        )?;
        r.check(
            0.0 < thresholds.fib_shallow
                && thresholds.fib_shallow < thresholds.fib_deep
                && thresholds.fib_deep < 1.0,
            "fibonacci",
            "shallow",
            "need 0 < shallow < deep < 1",
        )?;

        let mut weights = BTreeMap::new();
        for kind in IndicatorKind::ALL {
            let default = d.weights.get(&kind).copied().unwrap_or(0.0);
            weights.insert(kind, r.unit("weights", kind.name(), default)?);
        }
        let enabled = match config.get_string("weights", "enabled") {
            Some(list) => parse_enabled(&list)?,
            None => d.enabled.clone(),
        };
        ScoringAggregator::new(weights.clone(), enabled.clone())?;

        let p = &d.position;
        let position = PositionParams {
            entry_threshold: r.get("position", "entry_threshold", p.entry_threshold)?,
            stop_atr_long: r.positive("position", "stop_atr_long", p.stop_atr_long)?,
            take_atr_long: r.positive("position", "take_atr_long", p.take_atr_long)?,
            stop_atr_short: r.positive("position", "stop_atr_short", p.stop_atr_short)?,
            take_atr_short: r.positive("position", "take_atr_short", p.take_atr_short)?,
            auto_adjust: r.flag("position", "auto_adjust", p.auto_adjust)?,
            tighten: r.unit("position", "tighten", p.tighten)?,
            widen: r.non_negative("position", "widen", p.widen)?,
            allow_short: r.flag("position", "allow_short", p.allow_short)?,
        };
        r.check(
            position.entry_threshold > 0.0 && position.entry_threshold <= 1.0,
            "position",
            "entry_threshold",
            "must be in (0, 1]",
        )?;

        let c = &d.capital;
        let capital = CapitalParams {
            initial_capital: r.positive("capital", "initial_capital", c.initial_capital)?,
            position_fraction: r.get("capital", "position_fraction", c.position_fraction)?,
            phase_targets: match config.get_string("capital", "phase_targets") {
                Some(list) => parse_targets(&list)?,
                None => c.phase_targets.clone(),
            },
        };
        r.check(
            capital.position_fraction > 0.0 && capital.position_fraction <= 1.0,
            "capital",
            "position_fraction",
            "must be in (0, 1]",
        )?;

        let h = &d.history;
        let history = HistoryParams {
            horizon_candles: r.get("history", "horizon_candles", h.horizon_candles)?,
            neutral_band: r.get("history", "neutral_band", h.neutral_band)?,
            max_retries: r.get("history", "max_retries", h.max_retries)?,
            retry_backoff_ms: r.get("history", "retry_backoff_ms", h.retry_backoff_ms)?,
            buffer_capacity: r.get("history", "buffer_capacity", h.buffer_capacity)?,
        };
        r.check(
            history.horizon_candles >= 1,
            "history",
            "horizon_candles",
            "must be at least 1",
        )?;
        r.check(
            history.neutral_band > 0.0 && history.neutral_band <= 1.0,
            "history",
            "neutral_band",
            "must be in (0, 1]",
        )?;

        let storage = StorageConfig {
            path: config.get_string("history", "path").map(PathBuf::from),
            pool_size: r.get("history", "pool_size", d.storage.pool_size)?,
        };
        r.check(storage.pool_size >= 1, "history", "pool_size", "must be at least 1")?;

        let notify = NotifyConfig {
            strong_score: r.get("notify", "strong_score", d.notify.strong_score)?,
        };
        r.check(
            (0.0..=10.0).contains(&notify.strong_score),
            "notify",
            "strong_score",
            "must be between 0 and 10",
        )?;

        Ok(Self {
            interval: Duration::seconds(interval_secs),
            indicators,
            thresholds,
            weights,
            enabled,
            position,
            capital,
            history,
            storage,
            notify,
        })
    }
}

/// Typed access over a [`ConfigPort`] with uniform error reporting.
struct Reader<'a> {
    config: &'a dyn ConfigPort,
}

impl Reader<'_> {
    fn get<T>(&self, section: &str, key: &str, default: T) -> Result<T, ScalpwatchError>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.config.get_string(section, key) {
            Some(raw) => raw
                .parse()
                .map_err(|e| ScalpwatchError::invalid(section, key, format!("'{}': {}", raw, e))),
            None => Ok(default),
        }
    }

    fn check(
        &self,
        ok: bool,
        section: &str,
        key: &str,
        reason: impl Into<String>,
    ) -> Result<(), ScalpwatchError> {
        if ok {
            Ok(())
        } else {
            Err(ScalpwatchError::invalid(section, key, reason))
        }
    }

    fn period(&self, section: &str, key: &str, default: usize) -> Result<usize, ScalpwatchError> {
        let value = self.get(section, key, default)?;
        self.check(value >= 1, section, key, "must be at least 1")?;
        Ok(value)
    }

    fn finite(&self, section: &str, key: &str, default: f64) -> Result<f64, ScalpwatchError> {
        let value: f64 = self.get(section, key, default)?;
        self.check(value.is_finite(), section, key, "must be a finite number")?;
        Ok(value)
    }

    fn positive(&self, section: &str, key: &str, default: f64) -> Result<f64, ScalpwatchError> {
        let value = self.finite(section, key, default)?;
        self.check(value > 0.0, section, key, "must be positive")?;
        Ok(value)
    }

    fn non_negative(&self, section: &str, key: &str, default: f64) -> Result<f64, ScalpwatchError> {
        let value = self.finite(section, key, default)?;
        self.check(value >= 0.0, section, key, "must not be negative")?;
        Ok(value)
    }

    fn unit(&self, section: &str, key: &str, default: f64) -> Result<f64, ScalpwatchError> {
        let value = self.finite(section, key, default)?;
        self.check(
            (0.0..=1.0).contains(&value),
            section,
            key,
            "must be between 0 and 1",
        )?;
        Ok(value)
    }

    fn flag(&self, section: &str, key: &str, default: bool) -> Result<bool, ScalpwatchError> {
        match self.config.get_string(section, key) {
            Some(raw) => match raw.to_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Ok(true),
                "false" | "no" | "off" | "0" => Ok(false),
                _ => Err(ScalpwatchError::invalid(
                    section,
                    key,
                    format!("'{}' is not a boolean", raw),
                )),
            },
            None => Ok(default),
        }
    }
}

fn parse_enabled(list: &str) -> Result<BTreeSet<IndicatorKind>, ScalpwatchError> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<IndicatorKind>()
                .map_err(|e| ScalpwatchError::invalid("weights", "enabled", e))
        })
        .collect()
}

fn parse_targets(list: &str) -> Result<Vec<f64>, ScalpwatchError> {
    let targets = list
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite() && *v > 0.0)
                .ok_or_else(|| {
                    ScalpwatchError::invalid(
                        "capital",
                        "phase_targets",
                        format!("'{}' is not a positive number", s),
                    )
                })
        })
        .collect::<Result<Vec<f64>, _>>()?;
    if targets.windows(2).any(|w| w[0] >= w[1]) {
        return Err(ScalpwatchError::invalid(
            "capital",
            "phase_targets",
            "targets must be strictly ascending",
        ));
    }
    Ok(targets)
}

fn warn_unknown_keys(config: &dyn ConfigPort) {
    for (section, known) in KNOWN_KEYS {
        for key in config.keys(section) {
            if !known.contains(&key.as_str()) {
                tracing::warn!(section, key = %key, "ignoring unknown config key");
            }
        }
    }
}
