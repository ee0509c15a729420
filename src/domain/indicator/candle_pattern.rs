//! Rule-based candlestick pattern recognition over the last few candles.
//!
//! The catalogue is checked in [`CandlePattern::CATALOGUE`] order; the
//! match with the highest base strength wins and ties keep the earlier
//! entry. Flat candles (zero range) never take part in a match.

use std::collections::VecDeque;

use crate::domain::candle::Candle;
use crate::domain::indicator::{Indicator, IndicatorKind, IndicatorValue};
use crate::domain::signal::Direction;

pub const DEFAULT_LOOKBACK: usize = 5;
pub const MAX_LOOKBACK: usize = 5;

const DOJI_BODY_RATIO: f64 = 0.1;
const MARUBOZU_BODY_RATIO: f64 = 0.95;
const SOLDIER_BODY_RATIO: f64 = 0.6;
const STAR_OUTER_BODY_RATIO: f64 = 0.5;
const STAR_MIDDLE_BODY_FRACTION: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum CandlePattern {
    BullishEngulfing,
    BearishEngulfing,
    MorningStar,
    EveningStar,
    ThreeWhiteSoldiers,
    ThreeBlackCrows,
    Hammer,
    ShootingStar,
    BullishMarubozu,
    BearishMarubozu,
    Doji,
}

impl CandlePattern {
    pub const CATALOGUE: [CandlePattern; 11] = [
        CandlePattern::BullishEngulfing,
        CandlePattern::BearishEngulfing,
        CandlePattern::MorningStar,
        CandlePattern::EveningStar,
        CandlePattern::ThreeWhiteSoldiers,
        CandlePattern::ThreeBlackCrows,
        CandlePattern::Hammer,
        CandlePattern::ShootingStar,
        CandlePattern::BullishMarubozu,
        CandlePattern::BearishMarubozu,
        CandlePattern::Doji,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CandlePattern::BullishEngulfing => "bullish_engulfing",
            CandlePattern::BearishEngulfing => "bearish_engulfing",
            CandlePattern::MorningStar => "morning_star",
            CandlePattern::EveningStar => "evening_star",
            CandlePattern::ThreeWhiteSoldiers => "three_white_soldiers",
            CandlePattern::ThreeBlackCrows => "three_black_crows",
            CandlePattern::Hammer => "hammer",
            CandlePattern::ShootingStar => "shooting_star",
            CandlePattern::BullishMarubozu => "bullish_marubozu",
            CandlePattern::BearishMarubozu => "bearish_marubozu",
            CandlePattern::Doji => "doji",
        }
    }

    pub fn polarity(&self) -> Direction {
        match self {
            CandlePattern::BullishEngulfing
            | CandlePattern::MorningStar
            | CandlePattern::ThreeWhiteSoldiers
            | CandlePattern::Hammer
            | CandlePattern::BullishMarubozu => Direction::Bullish,
            CandlePattern::BearishEngulfing
            | CandlePattern::EveningStar
            | CandlePattern::ThreeBlackCrows
            | CandlePattern::ShootingStar
            | CandlePattern::BearishMarubozu => Direction::Bearish,
            CandlePattern::Doji => Direction::Neutral,
        }
    }

    pub fn base_strength(&self) -> f64 {
        match self {
            CandlePattern::BullishEngulfing | CandlePattern::BearishEngulfing => 0.9,
            CandlePattern::MorningStar | CandlePattern::EveningStar => 0.85,
            CandlePattern::ThreeWhiteSoldiers | CandlePattern::ThreeBlackCrows => 0.8,
            CandlePattern::Hammer | CandlePattern::ShootingStar => 0.6,
            CandlePattern::BullishMarubozu | CandlePattern::BearishMarubozu => 0.5,
            CandlePattern::Doji => 0.3,
        }
    }

    /// Number of trailing candles the pattern spans.
    pub fn span(&self) -> usize {
        match self {
            CandlePattern::BullishEngulfing | CandlePattern::BearishEngulfing => 2,
            CandlePattern::MorningStar
            | CandlePattern::EveningStar
            | CandlePattern::ThreeWhiteSoldiers
            | CandlePattern::ThreeBlackCrows => 3,
            _ => 1,
        }
    }

    /// `window` holds exactly `self.span()` candles, oldest first.
    fn matches(&self, window: &[&Candle]) -> bool {
        if window.iter().any(|c| c.range() <= 0.0) {
            return false;
        }
        match (self, window) {
            (CandlePattern::BullishEngulfing, [prev, cur]) => {
                prev.is_bearish()
                    && cur.is_bullish()
                    && cur.open <= prev.close
                    && cur.close >= prev.open
                    && cur.body() > prev.body()
            }
            (CandlePattern::BearishEngulfing, [prev, cur]) => {
                prev.is_bullish()
                    && cur.is_bearish()
                    && cur.open >= prev.close
                    && cur.close <= prev.open
                    && cur.body() > prev.body()
            }
            (CandlePattern::MorningStar, [first, star, last]) => {
                first.is_bearish()
                    && first.body_ratio() >= STAR_OUTER_BODY_RATIO
                    && star.body() <= first.body() * STAR_MIDDLE_BODY_FRACTION
                    && last.is_bullish()
                    && last.close > first.midpoint()
            }
            (CandlePattern::EveningStar, [first, star, last]) => {
                first.is_bullish()
                    && first.body_ratio() >= STAR_OUTER_BODY_RATIO
                    && star.body() <= first.body() * STAR_MIDDLE_BODY_FRACTION
                    && last.is_bearish()
                    && last.close < first.midpoint()
            }
            (CandlePattern::ThreeWhiteSoldiers, [a, b, c]) => {
                [a, b, c]
                    .iter()
                    .all(|x| x.is_bullish() && x.body_ratio() >= SOLDIER_BODY_RATIO)
                    && b.close > a.close
                    && c.close > b.close
                    && b.open >= a.open
                    && c.open >= b.open
            }
            (CandlePattern::ThreeBlackCrows, [a, b, c]) => {
                [a, b, c]
                    .iter()
                    .all(|x| x.is_bearish() && x.body_ratio() >= SOLDIER_BODY_RATIO)
                    && b.close < a.close
                    && c.close < b.close
                    && b.open <= a.open
                    && c.open <= b.open
            }
            (CandlePattern::Hammer, [c]) => {
                c.lower_wick() > 2.0 * c.body() && c.upper_wick() < c.body()
            }
            (CandlePattern::ShootingStar, [c]) => {
                c.upper_wick() > 2.0 * c.body() && c.lower_wick() < c.body()
            }
            (CandlePattern::BullishMarubozu, [c]) => {
                c.is_bullish() && c.body_ratio() >= MARUBOZU_BODY_RATIO
            }
            (CandlePattern::BearishMarubozu, [c]) => {
                c.is_bearish() && c.body_ratio() >= MARUBOZU_BODY_RATIO
            }
            (CandlePattern::Doji, [c]) => c.body_ratio() <= DOJI_BODY_RATIO,
            _ => false,
        }
    }
}

/// Keeps the last `lookback` candles and reports the strongest pattern
/// ending on the newest one.
#[derive(Debug, Clone)]
pub struct CandlePatternDetector {
    lookback: usize,
    window: VecDeque<Candle>,
}

impl CandlePatternDetector {
    pub fn new(lookback: usize) -> Self {
        let lookback = lookback.clamp(1, MAX_LOOKBACK);
        Self {
            lookback,
            window: VecDeque::with_capacity(lookback),
        }
    }

    fn detect(&self) -> Option<CandlePattern> {
        let mut best: Option<CandlePattern> = None;
        for pattern in CandlePattern::CATALOGUE {
            let span = pattern.span();
            if span > self.window.len() {
                continue;
            }
            let tail: Vec<&Candle> = self.window.iter().skip(self.window.len() - span).collect();
            if !pattern.matches(&tail) {
                continue;
            }
            if best.is_none_or(|b| pattern.base_strength() > b.base_strength()) {
                best = Some(pattern);
            }
        }
        best
    }
}

impl Default for CandlePatternDetector {
    fn default() -> Self {
        Self::new(DEFAULT_LOOKBACK)
    }
}

impl Indicator for CandlePatternDetector {
    fn kind(&self) -> IndicatorKind {
        IndicatorKind::CandlePattern
    }

    fn update(&mut self, candle: &Candle) -> Option<IndicatorValue> {
        if self.window.len() == self.lookback {
            self.window.pop_front();
        }
        self.window.push_back(candle.clone());
        Some(IndicatorValue::Pattern(self.detect()))
    }

    fn reset(&mut self) {
        self.window.clear();
    }
}
