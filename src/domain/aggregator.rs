//! Tick-to-candle aggregation.
//!
//! Buckets are aligned to the Unix epoch: a tick at `ts` belongs to the
//! candle opening at `floor(ts / interval) * interval`. The in-progress
//! candle is emitted the moment a tick from a later bucket arrives, so its
//! close is the last tick before the boundary. Intervals without ticks emit
//! nothing.

use chrono::{DateTime, Duration, Utc};

use crate::domain::candle::Candle;
use crate::domain::error::ScalpwatchError;
use crate::domain::tick::PriceTick;

#[derive(Debug, Clone)]
pub struct CandleAggregator {
    interval: Duration,
    current: Option<Candle>,
    last_tick: Option<DateTime<Utc>>,
}

impl CandleAggregator {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            current: None,
            last_tick: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Candle currently being built, if any tick has been accepted since the last close.
    pub fn in_progress(&self) -> Option<&Candle> {
        self.current.as_ref()
    }

    pub fn last_tick_time(&self) -> Option<DateTime<Utc>> {
        self.last_tick
    }

    /// Accept one tick. Returns the candle that this tick closed, if any.
    ///
    /// A tick whose timestamp is not strictly after the last accepted one is
    /// rejected with [`ScalpwatchError::OutOfOrderTick`], and a tick whose
    /// candle would close past the representable time range with
    /// [`ScalpwatchError::Feed`]. Either way the aggregator is left untouched.
    pub fn push(&mut self, tick: &PriceTick) -> Result<Option<Candle>, ScalpwatchError> {
        if let Some(last) = self.last_tick {
            if tick.timestamp <= last {
                return Err(ScalpwatchError::OutOfOrderTick {
                    last,
                    received: tick.timestamp,
                });
            }
        }

        let bucket = self.bucket_start(tick.timestamp);
        let volume = tick.volume.unwrap_or(0.0);

        if let Some(candle) = self.current.as_mut() {
            if candle.open_time == bucket {
                candle.high = candle.high.max(tick.price);
                candle.low = candle.low.min(tick.price);
                candle.close = tick.price;
                candle.volume += volume;
                candle.tick_count += 1;
                self.last_tick = Some(tick.timestamp);
                return Ok(None);
            }
        }

        let fresh = self.open_candle(bucket, tick.price, volume)?;
        self.last_tick = Some(tick.timestamp);
        Ok(self.current.replace(fresh))
    }

    /// Drop the in-progress candle and the ordering watermark.
    pub fn reset(&mut self) {
        self.current = None;
        self.last_tick = None;
    }

    /// Adapt a tick iterator into a lazy sequence of closed candles.
    pub fn candles<I>(self, ticks: I) -> Candles<I::IntoIter>
    where
        I: IntoIterator<Item = PriceTick>,
    {
        Candles {
            aggregator: self,
            ticks: ticks.into_iter(),
        }
    }

    fn bucket_start(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let interval_ms = self.interval.num_milliseconds().max(1);
        let start_ms = ts.timestamp_millis().div_euclid(interval_ms) * interval_ms;
        DateTime::from_timestamp_millis(start_ms).unwrap_or(ts)
    }

    fn open_candle(
        &self,
        open_time: DateTime<Utc>,
        price: f64,
        volume: f64,
    ) -> Result<Candle, ScalpwatchError> {
        let close_time = open_time
            .checked_add_signed(self.interval)
            .ok_or_else(|| ScalpwatchError::Feed {
                reason: format!("candle opening at {open_time} closes past the supported time range"),
            })?;
        Ok(Candle {
            open_time,
            close_time,
            open: price,
            high: price,
            low: price,
            close: price,
            volume,
            tick_count: 1,
        })
    }
}

/// Lazy candle sequence produced by [`CandleAggregator::candles`].
///
/// Out-of-order ticks surface as `Err` items; the stream keeps going
/// afterwards so the caller decides whether to drop them or stop.
pub struct Candles<I> {
    aggregator: CandleAggregator,
    ticks: I,
}

impl<I> Iterator for Candles<I>
where
    I: Iterator<Item = PriceTick>,
{
    type Item = Result<Candle, ScalpwatchError>;

    fn next(&mut self) -> Option<Self::Item> {
        for tick in self.ticks.by_ref() {
            match self.aggregator.push(&tick) {
                Ok(Some(candle)) => return Some(Ok(candle)),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
        None
    }
}
