//! Owns one instance of every indicator and advances them together.
//!
//! All indicators are updated on every closed candle, enabled or not, so
//! re-enabling an indicator never requires a replay.

use crate::domain::candle::Candle;
use crate::domain::indicator::atr::{self, Atr};
use crate::domain::indicator::candle_pattern::{self, CandlePatternDetector};
use crate::domain::indicator::ema::TrendEma;
use crate::domain::indicator::ema_cross::{self, EmaCross};
use crate::domain::indicator::fibonacci::{self, Fibonacci};
use crate::domain::indicator::macd::{self, Macd};
use crate::domain::indicator::rsi::{self, Rsi};
use crate::domain::indicator::vegas::{self, VegasTunnel};
use crate::domain::indicator::{Indicator, IndicatorKind, IndicatorReading};

/// Periods and windows for the indicator battery.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorParams {
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub rsi_period: usize,
    pub ema_period: usize,
    pub atr_period: usize,
    pub vegas_fast: usize,
    pub vegas_slow: usize,
    pub cross_fast: usize,
    pub cross_slow: usize,
    pub pattern_lookback: usize,
    pub fib_lookback: usize,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            macd_fast: macd::DEFAULT_FAST,
            macd_slow: macd::DEFAULT_SLOW,
            macd_signal: macd::DEFAULT_SIGNAL,
            rsi_period: rsi::DEFAULT_PERIOD,
            ema_period: TrendEma::DEFAULT_PERIOD,
            atr_period: atr::DEFAULT_PERIOD,
            vegas_fast: vegas::DEFAULT_FAST,
            vegas_slow: vegas::DEFAULT_SLOW,
            cross_fast: ema_cross::DEFAULT_FAST,
            cross_slow: ema_cross::DEFAULT_SLOW,
            pattern_lookback: candle_pattern::DEFAULT_LOOKBACK,
            fib_lookback: fibonacci::DEFAULT_LOOKBACK,
        }
    }
}

pub struct IndicatorEngine {
    indicators: Vec<Box<dyn Indicator>>,
    candles_seen: u64,
}

impl IndicatorEngine {
    pub fn new(params: &IndicatorParams) -> Self {
        // Same order as IndicatorKind::ALL.
        let indicators: Vec<Box<dyn Indicator>> = vec![
            Box::new(Macd::new(params.macd_fast, params.macd_slow, params.macd_signal)),
            Box::new(Rsi::new(params.rsi_period)),
            Box::new(TrendEma::new(params.ema_period)),
            Box::new(Atr::new(params.atr_period)),
            Box::new(VegasTunnel::new(params.vegas_fast, params.vegas_slow)),
            Box::new(EmaCross::new(params.cross_fast, params.cross_slow)),
            Box::new(CandlePatternDetector::new(params.pattern_lookback)),
            Box::new(Fibonacci::new(params.fib_lookback)),
        ];
        debug_assert!(
            indicators
                .iter()
                .map(|i| i.kind())
                .eq(IndicatorKind::ALL.into_iter())
        );
        Self {
            indicators,
            candles_seen: 0,
        }
    }

    /// Feed one closed candle; returns one reading per indicator in
    /// [`IndicatorKind::ALL`] order.
    pub fn update(&mut self, candle: &Candle) -> Vec<IndicatorReading> {
        self.candles_seen += 1;
        self.indicators
            .iter_mut()
            .map(|indicator| IndicatorReading {
                kind: indicator.kind(),
                candle_time: candle.close_time,
                close: candle.close,
                value: indicator.update(candle),
            })
            .collect()
    }

    pub fn reset(&mut self) {
        for indicator in &mut self.indicators {
            indicator.reset();
        }
        self.candles_seen = 0;
    }

    pub fn candles_seen(&self) -> u64 {
        self.candles_seen
    }
}

impl Default for IndicatorEngine {
    fn default() -> Self {
        Self::new(&IndicatorParams::default())
    }
}
