//! Average True Range with Wilder smoothing.
//!
//! The first candle's true range is high - low (no previous close). The
//! seed is the mean of the first n true ranges; afterwards
//! ATR = (prev_atr * (n-1) + TR) / n.

use crate::domain::candle::Candle;
use crate::domain::indicator::{Indicator, IndicatorKind, IndicatorValue};

pub const DEFAULT_PERIOD: usize = 14;

#[derive(Debug, Clone)]
pub struct Atr {
    period: usize,
    prev_close: Option<f64>,
    count: usize,
    sum: f64,
    value: Option<f64>,
}

impl Atr {
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
            prev_close: None,
            count: 0,
            sum: 0.0,
            value: None,
        }
    }
}

impl Default for Atr {
    fn default() -> Self {
        Self::new(DEFAULT_PERIOD)
    }
}

impl Indicator for Atr {
    fn kind(&self) -> IndicatorKind {
        IndicatorKind::Atr
    }

    fn update(&mut self, candle: &Candle) -> Option<IndicatorValue> {
        let tr = match self.prev_close.replace(candle.close) {
            Some(prev) => candle.true_range(prev),
            None => candle.range(),
        };
        let n = self.period as f64;

        self.value = match self.value {
            Some(prev) => Some((prev * (n - 1.0) + tr) / n),
            None => {
                self.count += 1;
                self.sum += tr;
                (self.count == self.period).then(|| self.sum / n)
            }
        };

        self.value.map(IndicatorValue::Simple)
    }

    fn reset(&mut self) {
        *self = Self::new(self.period);
    }
}
