//! RSI (Relative Strength Index).
//!
//! Uses Wilder's smoothing for average gain/loss calculation:
//! - First average: simple mean of gains/losses over the first n changes
//! - Subsequent: avg = (prev_avg * (n-1) + current) / n
//!
//! Formula: RSI = 100 - (100 / (1 + avg_gain / avg_loss))
//! If avg_loss == 0: RSI = 100
//!
//! Warmup: first n candles are invalid (need n price changes).

use crate::domain::candle::Candle;
use crate::domain::indicator::{Indicator, IndicatorKind, IndicatorValue};

pub const DEFAULT_PERIOD: usize = 14;

#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
    prev_close: Option<f64>,
    changes: usize,
    avg_gain: f64,
    avg_loss: f64,
}

impl Rsi {
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
            prev_close: None,
            changes: 0,
            avg_gain: 0.0,
            avg_loss: 0.0,
        }
    }

    fn value(&self) -> f64 {
        let rsi = if self.avg_loss == 0.0 {
            100.0
        } else {
            100.0 - (100.0 / (1.0 + self.avg_gain / self.avg_loss))
        };
        rsi.clamp(0.0, 100.0)
    }
}

impl Default for Rsi {
    fn default() -> Self {
        Self::new(DEFAULT_PERIOD)
    }
}

impl Indicator for Rsi {
    fn kind(&self) -> IndicatorKind {
        IndicatorKind::Rsi
    }

    fn update(&mut self, candle: &Candle) -> Option<IndicatorValue> {
        let prev = self.prev_close.replace(candle.close)?;
        let change = candle.close - prev;
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);
        let n = self.period as f64;

        self.changes += 1;
        if self.changes <= self.period {
            // Running simple mean until the seed window is full.
            let count = self.changes as f64;
            self.avg_gain += (gain - self.avg_gain) / count;
            self.avg_loss += (loss - self.avg_loss) / count;
            if self.changes < self.period {
                return None;
            }
        } else {
            self.avg_gain = (self.avg_gain * (n - 1.0) + gain) / n;
            self.avg_loss = (self.avg_loss * (n - 1.0) + loss) / n;
        }

        Some(IndicatorValue::Simple(self.value()))
    }

    fn reset(&mut self) {
        *self = Self::new(self.period);
    }
}
