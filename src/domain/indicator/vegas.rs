//! Vegas Tunnel: a band between two slow EMAs (144/169 by default).
//!
//! The reading carries both EMA values and how much the gap between them
//! changed since the previous candle, so the evaluator can tell an opening
//! tunnel from a closing one.

use crate::domain::candle::Candle;
use crate::domain::indicator::ema::Ema;
use crate::domain::indicator::{Indicator, IndicatorKind, IndicatorValue};

pub const DEFAULT_FAST: usize = 144;
pub const DEFAULT_SLOW: usize = 169;

#[derive(Debug, Clone)]
pub struct VegasTunnel {
    fast: Ema,
    slow: Ema,
    prev_separation: Option<f64>,
}

impl VegasTunnel {
    pub fn new(fast: usize, slow: usize) -> Self {
        Self {
            fast: Ema::new(fast),
            slow: Ema::new(slow),
            prev_separation: None,
        }
    }
}

impl Default for VegasTunnel {
    fn default() -> Self {
        Self::new(DEFAULT_FAST, DEFAULT_SLOW)
    }
}

impl Indicator for VegasTunnel {
    fn kind(&self) -> IndicatorKind {
        IndicatorKind::VegasTunnel
    }

    fn update(&mut self, candle: &Candle) -> Option<IndicatorValue> {
        let fast = self.fast.push(candle.close);
        let slow = self.slow.push(candle.close);
        let (fast, slow) = (fast?, slow?);

        let separation = (fast - slow).abs();
        let separation_change = self
            .prev_separation
            .replace(separation)
            .map_or(0.0, |prev| separation - prev);

        Some(IndicatorValue::Vegas {
            fast,
            slow,
            separation_change,
        })
    }

    fn reset(&mut self) {
        self.fast.reset();
        self.slow.reset();
        self.prev_separation = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::test_support::closes;

    #[test]
    fn unavailable_until_slow_ema_seeds() {
        let mut vegas = VegasTunnel::new(3, 5);
        let candles = closes(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let values: Vec<_> = candles.iter().map(|c| vegas.update(c)).collect();
        assert!(values[..4].iter().all(Option::is_none));
        assert!(values[4].is_some());
    }

    #[test]
    fn first_reading_reports_no_separation_change() {
        let mut vegas = VegasTunnel::new(2, 3);
        let candles = closes(&[1.0, 2.0, 3.0]);
        let last = candles.iter().map(|c| vegas.update(c)).last().flatten();
        match last {
            Some(IndicatorValue::Vegas {
                separation_change, ..
            }) => assert_eq!(separation_change, 0.0),
            other => panic!("expected tunnel, got {:?}", other),
        }
    }

    #[test]
    fn accelerating_rally_widens_tunnel() {
        let mut vegas = VegasTunnel::new(2, 4);
        let prices: Vec<f64> = (0..12).map(|i| 100.0 + (i * i) as f64).collect();
        let mut last = None;
        for c in closes(&prices) {
            last = vegas.update(&c);
        }
        match last {
            Some(IndicatorValue::Vegas {
                fast,
                slow,
                separation_change,
            }) => {
                assert!(fast > slow);
                assert!(separation_change > 0.0);
            }
            other => panic!("expected tunnel, got {:?}", other),
        }
    }
}
