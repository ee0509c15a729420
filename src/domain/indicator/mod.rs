//! Incremental technical indicators.
//!
//! Every indicator implements [`Indicator`]: it consumes one closed candle at
//! a time, keeps only the rolling state it needs, and returns `None` while
//! it lacks history for a valid reading. The [`engine::IndicatorEngine`]
//! owns one instance per [`IndicatorKind`] and wraps their output into
//! [`IndicatorReading`]s.

pub mod atr;
pub mod candle_pattern;
pub mod ema;
pub mod ema_cross;
pub mod engine;
pub mod fibonacci;
pub mod macd;
pub mod rsi;
pub mod vegas;

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

use crate::domain::candle::Candle;
use crate::domain::signal::Direction;

pub use candle_pattern::CandlePattern;
pub use fibonacci::{FibLevel, SwingTrend};

/// Identity of each indicator in the battery. Ordering is the order of the
/// score breakdown and of the signal list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum IndicatorKind {
    Macd,
    Rsi,
    Ema200,
    Atr,
    VegasTunnel,
    EmaCross,
    CandlePattern,
    Fibonacci,
}

impl IndicatorKind {
    pub const ALL: [IndicatorKind; 8] = [
        IndicatorKind::Macd,
        IndicatorKind::Rsi,
        IndicatorKind::Ema200,
        IndicatorKind::Atr,
        IndicatorKind::VegasTunnel,
        IndicatorKind::EmaCross,
        IndicatorKind::CandlePattern,
        IndicatorKind::Fibonacci,
    ];

    /// Stable key used in config files and history records.
    pub fn name(&self) -> &'static str {
        match self {
            IndicatorKind::Macd => "macd",
            IndicatorKind::Rsi => "rsi",
            IndicatorKind::Ema200 => "ema200",
            IndicatorKind::Atr => "atr",
            IndicatorKind::VegasTunnel => "vegas",
            IndicatorKind::EmaCross => "ema_cross",
            IndicatorKind::CandlePattern => "candle_pattern",
            IndicatorKind::Fibonacci => "fibonacci",
        }
    }
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for IndicatorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        IndicatorKind::ALL
            .into_iter()
            .find(|k| k.name() == wanted)
            .ok_or_else(|| format!("unknown indicator '{}'", s.trim()))
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum IndicatorValue {
    Simple(f64),
    Macd {
        line: f64,
        signal: f64,
        histogram: f64,
    },
    Vegas {
        fast: f64,
        slow: f64,
        /// Change in |fast - slow| since the previous candle.
        separation_change: f64,
    },
    EmaCross {
        fast: f64,
        slow: f64,
        cross: Direction,
        candles_since: usize,
    },
    Pattern(Option<CandlePattern>),
    Fibonacci {
        swing_high: f64,
        swing_low: f64,
        trend: SwingTrend,
        levels: Vec<FibLevel>,
        retracement: f64,
        nearest_support: Option<f64>,
        nearest_resistance: Option<f64>,
    },
}

/// One indicator's output for one closed candle. `value == None` means the
/// indicator does not have enough history yet.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct IndicatorReading {
    pub kind: IndicatorKind,
    pub candle_time: DateTime<Utc>,
    pub close: f64,
    pub value: Option<IndicatorValue>,
}

impl IndicatorReading {
    pub fn is_available(&self) -> bool {
        self.value.is_some()
    }

    pub fn simple(&self) -> Option<f64> {
        match self.value {
            Some(IndicatorValue::Simple(v)) => Some(v),
            _ => None,
        }
    }
}

/// Shared "consume candle → produce reading" contract.
pub trait Indicator: Send {
    fn kind(&self) -> IndicatorKind;

    fn update(&mut self, candle: &Candle) -> Option<IndicatorValue>;

    /// Return to the empty state, as if no candle had been seen.
    fn reset(&mut self);
}
