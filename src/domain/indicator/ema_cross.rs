//! EMA double cross: tracks the latest crossover between a fast and a slow
//! EMA and how many candles have closed since.
//!
//! The first candle on which both EMAs are available establishes the
//! initial ordering and counts as a crossover.

use std::cmp::Ordering;

use crate::domain::candle::Candle;
use crate::domain::indicator::ema::Ema;
use crate::domain::indicator::{Indicator, IndicatorKind, IndicatorValue};
use crate::domain::signal::Direction;

pub const DEFAULT_FAST: usize = 9;
pub const DEFAULT_SLOW: usize = 21;

#[derive(Debug, Clone)]
pub struct EmaCross {
    fast: Ema,
    slow: Ema,
    last_cross: Option<(Direction, usize)>,
}

impl EmaCross {
    pub fn new(fast: usize, slow: usize) -> Self {
        Self {
            fast: Ema::new(fast),
            slow: Ema::new(slow),
            last_cross: None,
        }
    }
}

impl Default for EmaCross {
    fn default() -> Self {
        Self::new(DEFAULT_FAST, DEFAULT_SLOW)
    }
}

impl Indicator for EmaCross {
    fn kind(&self) -> IndicatorKind {
        IndicatorKind::EmaCross
    }

    fn update(&mut self, candle: &Candle) -> Option<IndicatorValue> {
        let fast = self.fast.push(candle.close);
        let slow = self.slow.push(candle.close);
        let (fast, slow) = (fast?, slow?);

        let ordering = match fast.partial_cmp(&slow) {
            Some(Ordering::Greater) => Some(Direction::Bullish),
            Some(Ordering::Less) => Some(Direction::Bearish),
            _ => None,
        };

        let (cross, candles_since) = match (self.last_cross, ordering) {
            (Some((prev, since)), Some(now)) if prev == now => (prev, since + 1),
            (Some((prev, since)), None) => (prev, since + 1),
            (_, Some(now)) => (now, 0),
            // EMAs exactly equal on the very first available candle.
            (None, None) => (Direction::Neutral, 0),
        };
        self.last_cross = (cross != Direction::Neutral).then_some((cross, candles_since));

        Some(IndicatorValue::EmaCross {
            fast,
            slow,
            cross,
            candles_since,
        })
    }

    fn reset(&mut self) {
        self.fast.reset();
        self.slow.reset();
        self.last_cross = None;
    }
}
