//! Signal evaluation: maps each indicator reading to a direction and a
//! strength in [0, 1].
//!
//! An unavailable reading always evaluates to neutral with strength 0.

use chrono::{DateTime, Utc};
use std::fmt;

use crate::domain::indicator::{IndicatorKind, IndicatorReading, IndicatorValue, SwingTrend};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Direction {
    Bullish,
    Bearish,
    Neutral,
}

impl Direction {
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Bullish => 1.0,
            Direction::Bearish => -1.0,
            Direction::Neutral => 0.0,
        }
    }

    pub fn opposite(&self) -> Direction {
        match self {
            Direction::Bullish => Direction::Bearish,
            Direction::Bearish => Direction::Bullish,
            Direction::Neutral => Direction::Neutral,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Bullish => "bullish",
            Direction::Bearish => "bearish",
            Direction::Neutral => "neutral",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Signal {
    pub indicator: IndicatorKind,
    pub direction: Direction,
    pub strength: f64,
    pub candle_time: DateTime<Utc>,
}

impl Signal {
    fn new(reading: &IndicatorReading, direction: Direction, strength: f64) -> Self {
        let strength = if strength.is_finite() {
            strength.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            indicator: reading.kind,
            direction,
            strength,
            candle_time: reading.candle_time,
        }
    }

    fn neutral(reading: &IndicatorReading) -> Self {
        Self::new(reading, Direction::Neutral, 0.0)
    }

    /// Signed strength: +strength bullish, -strength bearish, 0 neutral.
    pub fn signed_strength(&self) -> f64 {
        self.strength * self.direction.sign()
    }
}

/// Per-indicator classification thresholds.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalThresholds {
    /// |MACD line| as a percentage of close that counts as full strength.
    pub macd_full_strength_pct: f64,
    pub rsi_overbought: f64,
    pub rsi_oversold: f64,
    /// |close - EMA| as a percentage of the EMA that counts as full strength.
    pub ema_full_strength_pct: f64,
    /// Distance from the tunnel as a percentage of the band edge.
    pub vegas_full_strength_pct: f64,
    pub cross_decay_candles: usize,
    pub cross_min_strength: f64,
    pub fib_shallow: f64,
    pub fib_deep: f64,
}

impl Default for SignalThresholds {
    fn default() -> Self {
        Self {
            macd_full_strength_pct: 0.1,
            rsi_overbought: 70.0,
            rsi_oversold: 30.0,
            ema_full_strength_pct: 1.0,
            vegas_full_strength_pct: 0.5,
            cross_decay_candles: 50,
            cross_min_strength: 0.3,
            fib_shallow: 0.382,
            fib_deep: 0.618,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SignalEvaluator {
    thresholds: SignalThresholds,
}

impl SignalEvaluator {
    pub fn new(thresholds: SignalThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &SignalThresholds {
        &self.thresholds
    }

    pub fn evaluate_all(&self, readings: &[IndicatorReading]) -> Vec<Signal> {
        readings.iter().map(|r| self.evaluate(r)).collect()
    }

    pub fn evaluate(&self, reading: &IndicatorReading) -> Signal {
        let Some(value) = &reading.value else {
            return Signal::neutral(reading);
        };
        let t = &self.thresholds;
        let close = reading.close;

        match (reading.kind, value) {
            (IndicatorKind::Macd, IndicatorValue::Macd { line, .. }) => {
                let full = close.abs() * t.macd_full_strength_pct / 100.0;
                Signal::new(reading, direction_of(*line), ratio(line.abs(), full))
            }
            (IndicatorKind::Rsi, IndicatorValue::Simple(rsi)) => self.rsi(reading, *rsi),
            (IndicatorKind::Ema200, IndicatorValue::Simple(ema)) => {
                let full = ema.abs() * t.ema_full_strength_pct / 100.0;
                Signal::new(
                    reading,
                    direction_of(close - ema),
                    ratio((close - ema).abs(), full),
                )
            }
            (IndicatorKind::Atr, IndicatorValue::Simple(_)) => Signal::neutral(reading),
            (
                IndicatorKind::VegasTunnel,
                IndicatorValue::Vegas {
                    fast,
                    slow,
                    separation_change,
                },
            ) => self.vegas(reading, *fast, *slow, *separation_change),
            (
                IndicatorKind::EmaCross,
                IndicatorValue::EmaCross {
                    cross,
                    candles_since,
                    ..
                },
            ) => {
                if *cross == Direction::Neutral {
                    return Signal::neutral(reading);
                }
                let decay = t.cross_decay_candles.max(1) as f64;
                let strength = (1.0 - *candles_since as f64 / decay).max(t.cross_min_strength);
                Signal::new(reading, *cross, strength)
            }
            (IndicatorKind::CandlePattern, IndicatorValue::Pattern(pattern)) => match pattern {
                Some(p) => Signal::new(reading, p.polarity(), p.base_strength()),
                None => Signal::neutral(reading),
            },
            (
                IndicatorKind::Fibonacci,
                IndicatorValue::Fibonacci {
                    trend, retracement, ..
                },
            ) => self.fibonacci(reading, *trend, *retracement),
            _ => Signal::neutral(reading),
        }
    }

    fn rsi(&self, reading: &IndicatorReading, rsi: f64) -> Signal {
        let ob = self.thresholds.rsi_overbought;
        let os = self.thresholds.rsi_oversold;
        if rsi > ob {
            Signal::new(reading, Direction::Bearish, (rsi - ob) / (100.0 - ob))
        } else if rsi < os {
            Signal::new(reading, Direction::Bullish, (os - rsi) / os)
        } else if rsi >= 50.0 {
            Signal::new(reading, Direction::Neutral, ratio(rsi - 50.0, ob - 50.0))
        } else {
            Signal::new(reading, Direction::Neutral, ratio(50.0 - rsi, 50.0 - os))
        }
    }

    fn vegas(&self, reading: &IndicatorReading, fast: f64, slow: f64, change: f64) -> Signal {
        let close = reading.close;
        let top = fast.max(slow);
        let bottom = fast.min(slow);
        let pct = self.thresholds.vegas_full_strength_pct / 100.0;

        let (direction, distance, edge) = if close > top && fast >= slow {
            (Direction::Bullish, close - top, top)
        } else if close < bottom && fast <= slow {
            (Direction::Bearish, bottom - close, bottom)
        } else {
            return Signal::neutral(reading);
        };

        let mut strength = ratio(distance, edge.abs() * pct);
        if change < -1e-9 * close.abs() {
            strength *= 0.5;
        }
        Signal::new(reading, direction, strength)
    }

    fn fibonacci(&self, reading: &IndicatorReading, trend: SwingTrend, r: f64) -> Signal {
        let shallow = self.thresholds.fib_shallow;
        let deep = self.thresholds.fib_deep;
        let swing = match trend {
            SwingTrend::Up => Direction::Bullish,
            SwingTrend::Down => Direction::Bearish,
        };
        if r < shallow {
            Signal::new(reading, swing, 1.0 - r / shallow)
        } else if r > deep {
            Signal::new(reading, swing.opposite(), (r - deep) / (1.0 - deep))
        } else {
            Signal::neutral(reading)
        }
    }
}

fn direction_of(x: f64) -> Direction {
    if x > 0.0 {
        Direction::Bullish
    } else if x < 0.0 {
        Direction::Bearish
    } else {
        Direction::Neutral
    }
}

/// `value / full`, capped at 1; 0 when `full` is not positive.
fn ratio(value: f64, full: f64) -> f64 {
    if full > 0.0 {
        (value / full).min(1.0)
    } else {
        0.0
    }
}
