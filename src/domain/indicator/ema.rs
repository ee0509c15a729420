//! Exponential Moving Average.
//!
//! k = 2/(n+1), seed with the SMA of the first n inputs, then
//! EMA[i] = x[i]*k + EMA[i-1]*(1-k). The first (n-1) inputs produce nothing.

use crate::domain::candle::Candle;
use crate::domain::indicator::{Indicator, IndicatorKind, IndicatorValue};

/// Rolling EMA state shared by every EMA-based indicator.
#[derive(Debug, Clone, PartialEq)]
pub struct Ema {
    period: usize,
    k: f64,
    count: usize,
    sum: f64,
    value: Option<f64>,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        let period = period.max(1);
        Self {
            period,
            k: 2.0 / (period as f64 + 1.0),
            count: 0,
            sum: 0.0,
            value: None,
        }
    }

    pub fn period(&self) -> usize {
        self.period
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }

    pub fn push(&mut self, x: f64) -> Option<f64> {
        match self.value {
            Some(prev) => {
                self.value = Some(x * self.k + prev * (1.0 - self.k));
            }
            None => {
                self.count += 1;
                self.sum += x;
                if self.count == self.period {
                    self.value = Some(self.sum / self.period as f64);
                }
            }
        }
        self.value
    }

    pub fn reset(&mut self) {
        self.count = 0;
        self.sum = 0.0;
        self.value = None;
    }
}

/// Long-horizon trend EMA over closes (200 periods by default).
#[derive(Debug, Clone)]
pub struct TrendEma {
    ema: Ema,
}

impl TrendEma {
    pub const DEFAULT_PERIOD: usize = 200;

    pub fn new(period: usize) -> Self {
        Self {
            ema: Ema::new(period),
        }
    }
}

impl Indicator for TrendEma {
    fn kind(&self) -> IndicatorKind {
        IndicatorKind::Ema200
    }

    fn update(&mut self, candle: &Candle) -> Option<IndicatorValue> {
        self.ema.push(candle.close).map(IndicatorValue::Simple)
    }

    fn reset(&mut self) {
        self.ema.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::test_support::closes;

    #[test]
    fn ema_warmup() {
        let mut ema = Ema::new(3);
        assert!(ema.push(10.0).is_none());
        assert!(ema.push(20.0).is_none());
        assert!(ema.push(30.0).is_some());
        assert!(ema.push(40.0).is_some());
    }

    #[test]
    fn ema_period_1_tracks_input() {
        let mut ema = Ema::new(1);
        assert_eq!(ema.push(10.0), Some(10.0));
        assert_eq!(ema.push(20.0), Some(20.0));
    }

    #[test]
    fn ema_seed_is_sma() {
        let mut ema = Ema::new(3);
        ema.push(10.0);
        ema.push(20.0);
        let seed = ema.push(30.0).unwrap();
        assert!((seed - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn ema_recursive_calculation() {
        let mut ema = Ema::new(3);
        for x in [10.0, 20.0, 30.0] {
            ema.push(x);
        }
        let k = 2.0 / 4.0;
        let expected = 40.0 * k + 20.0 * (1.0 - k);
        let v = ema.push(40.0).unwrap();
        assert!((v - expected).abs() < f64::EPSILON);
    }

    #[test]
    fn ema_equal_prices() {
        let mut ema = Ema::new(3);
        for _ in 0..5 {
            ema.push(100.0);
        }
        assert!((ema.value().unwrap() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn ema_reset_returns_to_warmup() {
        let mut ema = Ema::new(2);
        ema.push(1.0);
        ema.push(2.0);
        ema.reset();
        assert!(ema.value().is_none());
        assert!(ema.push(5.0).is_none());
    }

    #[test]
    fn trend_ema_unavailable_before_period() {
        let candles = closes(&(0..200).map(|i| 100.0 + i as f64).collect::<Vec<_>>());
        let mut ema = TrendEma::new(200);
        for (i, c) in candles.iter().enumerate() {
            let v = ema.update(c);
            if i < 199 {
                assert!(v.is_none(), "candle {} should be unavailable", i + 1);
            } else {
                assert!(v.is_some(), "candle 200 should be available");
            }
        }
    }
}
