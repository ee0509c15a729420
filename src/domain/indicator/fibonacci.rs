//! Fibonacci support/resistance anchored to the latest swing.
//!
//! The swing high and low are the extremes of the last `lookback` candles.
//! When the low came first the swing is an up-move and levels are measured
//! down from the high; otherwise they are measured up from the low. The
//! ladder is rebuilt only when the anchors move.

use std::collections::VecDeque;

use crate::domain::candle::Candle;
use crate::domain::indicator::{Indicator, IndicatorKind, IndicatorValue};

pub const DEFAULT_LOOKBACK: usize = 50;

/// Retracement ladder including the 0 and 1 anchors.
pub const RATIOS: [f64; 7] = [0.0, 0.236, 0.382, 0.5, 0.618, 0.786, 1.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum SwingTrend {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FibLevel {
    pub ratio: f64,
    pub price: f64,
}

#[derive(Debug, Clone)]
pub struct Fibonacci {
    lookback: usize,
    /// (high, low) per candle, oldest first.
    window: VecDeque<(f64, f64)>,
    anchors: Option<(f64, f64, SwingTrend)>,
    levels: Vec<FibLevel>,
}

impl Fibonacci {
    pub fn new(lookback: usize) -> Self {
        let lookback = lookback.max(2);
        Self {
            lookback,
            window: VecDeque::with_capacity(lookback),
            anchors: None,
            levels: Vec::with_capacity(RATIOS.len()),
        }
    }

    /// Latest occurrence of the window's high and low, plus the swing trend.
    fn swing(&self) -> Option<(f64, f64, SwingTrend)> {
        let mut hi = (usize::MIN, f64::MIN);
        let mut lo = (usize::MIN, f64::MAX);
        for (i, &(high, low)) in self.window.iter().enumerate() {
            if high >= hi.1 {
                hi = (i, high);
            }
            if low <= lo.1 {
                lo = (i, low);
            }
        }
        if self.window.is_empty() || hi.1 <= lo.1 {
            return None;
        }
        let trend = if lo.0 <= hi.0 {
            SwingTrend::Up
        } else {
            SwingTrend::Down
        };
        Some((hi.1, lo.1, trend))
    }

    fn rebuild_levels(&mut self, high: f64, low: f64, trend: SwingTrend) {
        let range = high - low;
        self.levels.clear();
        self.levels.extend(RATIOS.iter().map(|&ratio| FibLevel {
            ratio,
            price: match trend {
                SwingTrend::Up => high - ratio * range,
                SwingTrend::Down => low + ratio * range,
            },
        }));
    }
}

impl Default for Fibonacci {
    fn default() -> Self {
        Self::new(DEFAULT_LOOKBACK)
    }
}

impl Indicator for Fibonacci {
    fn kind(&self) -> IndicatorKind {
        IndicatorKind::Fibonacci
    }

    fn update(&mut self, candle: &Candle) -> Option<IndicatorValue> {
        if self.window.len() == self.lookback {
            self.window.pop_front();
        }
        self.window.push_back((candle.high, candle.low));

        let Some(swing) = self.swing() else {
            self.anchors = None;
            self.levels.clear();
            return None;
        };
        if self.anchors != Some(swing) {
            let (high, low, trend) = swing;
            self.rebuild_levels(high, low, trend);
            self.anchors = Some(swing);
        }

        let (swing_high, swing_low, trend) = swing;
        let range = swing_high - swing_low;
        let close = candle.close;
        let retracement = match trend {
            SwingTrend::Up => (swing_high - close) / range,
            SwingTrend::Down => (close - swing_low) / range,
        }
        .clamp(0.0, 1.0);

        let nearest_support = self
            .levels
            .iter()
            .map(|l| l.price)
            .filter(|&p| p <= close)
            .fold(None, |best: Option<f64>, p| Some(best.map_or(p, |b| b.max(p))));
        let nearest_resistance = self
            .levels
            .iter()
            .map(|l| l.price)
            .filter(|&p| p > close)
            .fold(None, |best: Option<f64>, p| Some(best.map_or(p, |b| b.min(p))));

        Some(IndicatorValue::Fibonacci {
            swing_high,
            swing_low,
            trend,
            levels: self.levels.clone(),
            retracement,
            nearest_support,
            nearest_resistance,
        })
    }

    fn reset(&mut self) {
        self.window.clear();
        self.anchors = None;
        self.levels.clear();
    }
}
