//! Signal history: one record per evaluated candle, finalised once the
//! outcome is known.
//!
//! Resolution policy:
//! - the record of the candle that opened a position, and every record made
//!   while it stays open, resolve with that trade (profit is success) and
//!   take its exit price;
//! - the record of the candle that closed a position is terminal at once;
//! - any other record whose |score| reaches `neutral_band` resolves after
//!   `horizon_candles` by whether the close moved in the score's direction;
//! - records below the band stay pending.
//!
//! Writes go through a [`HistoryPort`]. A failing write is retried with
//! exponential backoff, then parked in a bounded FIFO that is flushed ahead
//! of the next write.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::domain::candle::Candle;
use crate::domain::error::ScalpwatchError;
use crate::domain::position::{ClosedTrade, PositionEvent};
use crate::domain::scoring::ScoredSnapshot;
use crate::ports::history_port::HistoryPort;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum HistoryResult {
    Pending,
    Success,
    Failure,
}

impl HistoryResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryResult::Pending => "pending",
            HistoryResult::Success => "success",
            HistoryResult::Failure => "failure",
        }
    }

    pub fn is_terminal(&self) -> bool {
        *self != HistoryResult::Pending
    }

    fn from_trade(trade: &ClosedTrade) -> Self {
        if trade.is_win() {
            HistoryResult::Success
        } else {
            HistoryResult::Failure
        }
    }
}

impl fmt::Display for HistoryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HistoryResult {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(HistoryResult::Pending),
            "success" => Ok(HistoryResult::Success),
            "failure" => Ok(HistoryResult::Failure),
            other => Err(format!("unknown history result '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum RecordEvent {
    Evaluation,
    PositionOpened,
    PositionClosed,
}

impl RecordEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordEvent::Evaluation => "evaluation",
            RecordEvent::PositionOpened => "position_opened",
            RecordEvent::PositionClosed => "position_closed",
        }
    }
}

impl fmt::Display for RecordEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordEvent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "evaluation" => Ok(RecordEvent::Evaluation),
            "position_opened" => Ok(RecordEvent::PositionOpened),
            "position_closed" => Ok(RecordEvent::PositionClosed),
            other => Err(format!("unknown record event '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SignalHistoryRecord {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    /// Indicator with the largest |contribution| on this candle.
    pub signal_name: String,
    pub signal_value: f64,
    pub score: f64,
    /// Reference price the record is judged from (entry price for trades).
    pub open_price: Option<f64>,
    /// Price the record resolved at.
    pub close_price: Option<f64>,
    pub event: RecordEvent,
    pub result: HistoryResult,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryQuery {
    /// Inclusive lower bound.
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound.
    pub to: Option<DateTime<Utc>>,
    pub limit: usize,
    pub offset: usize,
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self {
            from: None,
            to: None,
            limit: 50,
            offset: 0,
        }
    }
}

impl HistoryQuery {
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.from.is_none_or(|from| ts >= from) && self.to.is_none_or(|to| ts <= to)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct HistoryPage {
    pub records: Vec<SignalHistoryRecord>,
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryParams {
    pub horizon_candles: u64,
    pub neutral_band: f64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub buffer_capacity: usize,
}

impl Default for HistoryParams {
    fn default() -> Self {
        Self {
            horizon_candles: 15,
            neutral_band: 0.2,
            max_retries: 3,
            retry_backoff_ms: 50,
            buffer_capacity: 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct HistoryHealth {
    /// Writes waiting in memory for the store to recover.
    pub buffered: usize,
    /// Buffered writes discarded because the buffer was full.
    pub dropped: u64,
    /// Writes that exhausted their retries.
    pub write_failures: u64,
    pub last_error: Option<String>,
}

impl HistoryHealth {
    pub fn is_degraded(&self) -> bool {
        self.buffered > 0 || self.dropped > 0
    }
}

#[derive(Debug, Clone, PartialEq)]
enum PendingWrite {
    Append(SignalHistoryRecord),
    Finalize {
        id: u64,
        result: HistoryResult,
        close_price: Option<f64>,
    },
}

#[derive(Debug, Clone, Copy)]
struct HorizonCheck {
    due: u64,
    id: u64,
    reference: f64,
    sign: f64,
}

pub struct HistoryRecorder {
    port: Arc<dyn HistoryPort>,
    params: HistoryParams,
    next_id: u64,
    candles: u64,
    trade_records: Vec<u64>,
    horizon: VecDeque<HorizonCheck>,
    buffer: VecDeque<PendingWrite>,
    health: HistoryHealth,
}

impl HistoryRecorder {
    /// Continues numbering after the largest id already in the store.
    pub fn new(port: Arc<dyn HistoryPort>, params: HistoryParams) -> Result<Self, ScalpwatchError> {
        let next_id = port.max_id()?.map_or(1, |id| id + 1);
        Ok(Self {
            port,
            params,
            next_id,
            candles: 0,
            trade_records: Vec::new(),
            horizon: VecDeque::new(),
            buffer: VecDeque::new(),
            health: HistoryHealth::default(),
        })
    }

    pub fn health(&self) -> HistoryHealth {
        HistoryHealth {
            buffered: self.buffer.len(),
            ..self.health.clone()
        }
    }

    /// Record one evaluated candle. `position_open` is the state after the
    /// candle's position events were applied.
    pub fn record_candle(
        &mut self,
        candle: &Candle,
        snapshot: &ScoredSnapshot,
        events: &[PositionEvent],
        position_open: bool,
    ) -> SignalHistoryRecord {
        self.candles += 1;
        self.resolve_horizon(candle.close);

        let (signal_name, signal_value) = snapshot
            .dominant()
            .map_or(("none".to_string(), 0.0), |c| {
                (c.indicator.name().to_string(), c.contribution)
            });

        let opened = events.iter().find_map(|e| match e {
            PositionEvent::Opened(p) => Some(p),
            _ => None,
        });
        let closed = events.iter().find_map(|e| match e {
            PositionEvent::Closed(t) => Some(t),
            _ => None,
        });

        let (event, open_price, close_price, result) = match (closed, opened) {
            (Some(trade), _) => (
                RecordEvent::PositionClosed,
                Some(trade.entry_price),
                Some(trade.exit_price),
                HistoryResult::from_trade(trade),
            ),
            (None, Some(position)) => (
                RecordEvent::PositionOpened,
                Some(position.entry_price),
                None,
                HistoryResult::Pending,
            ),
            (None, None) => (
                RecordEvent::Evaluation,
                Some(candle.close),
                None,
                HistoryResult::Pending,
            ),
        };

        let record = SignalHistoryRecord {
            id: self.allocate_id(),
            timestamp: candle.close_time,
            signal_name,
            signal_value,
            score: snapshot.composite_score,
            open_price,
            close_price,
            event,
            result,
        };
        self.write(PendingWrite::Append(record.clone()));

        if let Some(trade) = closed {
            self.resolve_trade(trade);
        } else if opened.is_some() || position_open {
            self.trade_records.push(record.id);
        } else if snapshot.composite_score.abs() >= self.params.neutral_band {
            self.horizon.push_back(HorizonCheck {
                due: self.candles + self.params.horizon_candles,
                id: record.id,
                reference: candle.close,
                sign: snapshot.composite_score.signum(),
            });
        }
        record
    }

    /// Record a close that happened outside candle processing.
    pub fn record_manual_close(
        &mut self,
        at: DateTime<Utc>,
        score: f64,
        trade: &ClosedTrade,
    ) -> SignalHistoryRecord {
        let record = SignalHistoryRecord {
            id: self.allocate_id(),
            timestamp: at,
            signal_name: "manual_close".to_string(),
            signal_value: 0.0,
            score,
            open_price: Some(trade.entry_price),
            close_price: Some(trade.exit_price),
            event: RecordEvent::PositionClosed,
            result: HistoryResult::from_trade(trade),
        };
        self.write(PendingWrite::Append(record.clone()));
        self.resolve_trade(trade);
        record
    }

    /// Retry the buffered writes now.
    pub fn flush(&mut self) -> bool {
        while let Some(op) = self.buffer.front() {
            match self.apply(op) {
                Ok(()) => {
                    self.buffer.pop_front();
                }
                Err(e) => {
                    self.health.last_error = Some(e.to_string());
                    return false;
                }
            }
        }
        true
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn resolve_trade(&mut self, trade: &ClosedTrade) {
        let result = HistoryResult::from_trade(trade);
        for id in std::mem::take(&mut self.trade_records) {
            self.write(PendingWrite::Finalize {
                id,
                result,
                close_price: Some(trade.exit_price),
            });
        }
    }

    fn resolve_horizon(&mut self, close: f64) {
        while self.horizon.front().is_some_and(|c| c.due <= self.candles) {
            let Some(check) = self.horizon.pop_front() else {
                break;
            };
            let moved = (close - check.reference) * check.sign;
            let result = if moved > 0.0 {
                HistoryResult::Success
            } else {
                HistoryResult::Failure
            };
            self.write(PendingWrite::Finalize {
                id: check.id,
                result,
                close_price: Some(close),
            });
        }
    }

    fn apply(&self, op: &PendingWrite) -> Result<(), ScalpwatchError> {
        match op {
            PendingWrite::Append(record) => self.port.append(record),
            PendingWrite::Finalize {
                id,
                result,
                close_price,
            } => {
                if !self.port.finalize(*id, *result, *close_price)? {
                    tracing::debug!(id, "history record already resolved or missing");
                }
                Ok(())
            }
        }
    }

    fn write(&mut self, op: PendingWrite) {
        if !self.buffer.is_empty() && !self.flush() {
            self.park(op);
            return;
        }

        let attempts = self.params.max_retries + 1;
        for attempt in 0..attempts {
            match self.apply(&op) {
                Ok(()) => return,
                Err(e) => {
                    tracing::warn!(attempt = attempt + 1, error = %e, "history write failed");
                    self.health.last_error = Some(e.to_string());
                    if attempt + 1 < attempts {
                        self.backoff(attempt);
                    }
                }
            }
        }

        self.health.write_failures += 1;
        let failure = ScalpwatchError::PersistenceFailure {
            attempts,
            reason: self.health.last_error.clone().unwrap_or_default(),
        };
        tracing::error!(error = %failure, "buffering history write");
        self.park(op);
    }

    fn park(&mut self, op: PendingWrite) {
        if self.params.buffer_capacity == 0 {
            self.health.dropped += 1;
            tracing::error!("history buffer disabled, write dropped");
            return;
        }
        if self.buffer.len() >= self.params.buffer_capacity {
            self.buffer.pop_front();
            self.health.dropped += 1;
            tracing::error!(
                dropped = self.health.dropped,
                "history buffer full, dropped oldest write"
            );
        }
        self.buffer.push_back(op);
    }

    fn backoff(&self, attempt: u32) {
        let ms = self
            .params
            .retry_backoff_ms
            .saturating_mul(1u64 << attempt.min(16));
        if ms > 0 {
            std::thread::sleep(std::time::Duration::from_millis(ms));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory_history_adapter::MemoryHistoryAdapter;
    use crate::domain::indicator::IndicatorKind;
    use crate::domain::indicator::test_support::candle_at;
    use crate::domain::position::{ExitReason, Position, Side};
    use crate::domain::scoring::ScoreContribution;
    use crate::domain::signal::Direction;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn params() -> HistoryParams {
        HistoryParams {
            horizon_candles: 2,
            neutral_band: 0.2,
            max_retries: 1,
            retry_backoff_ms: 0,
            buffer_capacity: 3,
        }
    }

    fn snapshot(score: f64) -> ScoredSnapshot {
        ScoredSnapshot {
            timestamp: DateTime::from_timestamp(0, 0).unwrap(),
            composite_score: score,
            breakdown: vec![
                ScoreContribution {
                    indicator: IndicatorKind::Rsi,
                    direction: Direction::Neutral,
                    strength: 0.0,
                    weight: 0.5,
                    contribution: 0.0,
                },
                ScoreContribution {
                    indicator: IndicatorKind::Macd,
                    direction: Direction::Bullish,
                    strength: 1.0,
                    weight: 0.5,
                    contribution: score,
                },
            ],
        }
    }

    fn recorder() -> (Arc<MemoryHistoryAdapter>, HistoryRecorder) {
        let store = Arc::new(MemoryHistoryAdapter::new());
        let rec = HistoryRecorder::new(store.clone(), params()).unwrap();
        (store, rec)
    }

    fn all(store: &MemoryHistoryAdapter) -> Vec<SignalHistoryRecord> {
        let q = HistoryQuery {
            limit: 100,
            ..HistoryQuery::default()
        };
        let mut records = store.query(&q).unwrap().records;
        records.reverse();
        records
    }

    fn opened(entry: f64) -> PositionEvent {
        PositionEvent::Opened(Position {
            side: Side::Long,
            entry_price: entry,
            size: 1.0,
            stop_loss: 1280.0,
            take_profit: 1340.0,
            opened_at: DateTime::from_timestamp(60, 0).unwrap(),
        })
    }

    fn stopped(entry: f64, exit: f64) -> PositionEvent {
        PositionEvent::Closed(ClosedTrade {
            side: Side::Long,
            entry_price: entry,
            exit_price: exit,
            size: 1.0,
            opened_at: DateTime::from_timestamp(60, 0).unwrap(),
            closed_at: DateTime::from_timestamp(180, 0).unwrap(),
            pnl: exit - entry,
            reason: ExitReason::StopLoss,
        })
    }

    #[test]
    fn dominant_signal_names_the_record() {
        let (_store, mut rec) = recorder();
        let r = rec.record_candle(&candle_at(0, 1.0, 2.0, 0.5, 1.5), &snapshot(0.4), &[], false);
        assert_eq!(r.signal_name, "macd");
        assert_eq!(r.signal_value, 0.4);
        assert_eq!(r.id, 1);
        assert_eq!(r.result, HistoryResult::Pending);
    }

    #[test]
    fn stop_out_fails_entry_and_close_records() {
        let (store, mut rec) = recorder();
        rec.record_candle(&candle_at(0, 1295.0, 1301.0, 1294.0, 1300.0), &snapshot(0.7), &[opened(1300.0)], true);
        rec.record_candle(&candle_at(1, 1300.0, 1305.0, 1290.0, 1302.0), &snapshot(0.1), &[], true);
        rec.record_candle(&candle_at(2, 1299.0, 1301.0, 1275.0, 1290.0), &snapshot(-0.3), &[stopped(1300.0, 1280.0)], false);

        let records = all(&store);
        assert_eq!(records.len(), 3);
        for r in &records {
            assert_eq!(r.result, HistoryResult::Failure);
            assert_eq!(r.close_price, Some(1280.0));
        }
        assert_eq!(records[0].event, RecordEvent::PositionOpened);
        assert_eq!(records[2].event, RecordEvent::PositionClosed);
        assert_eq!(records[2].open_price, Some(1300.0));
    }

    #[test]
    fn horizon_resolves_directional_records() {
        let (store, mut rec) = recorder();
        rec.record_candle(&candle_at(0, 99.0, 101.0, 98.0, 100.0), &snapshot(0.5), &[], false);
        rec.record_candle(&candle_at(1, 100.0, 101.0, 99.0, 100.5), &snapshot(-0.5), &[], false);
        rec.record_candle(&candle_at(2, 100.5, 103.0, 100.0, 102.0), &snapshot(0.0), &[], false);

        let records = all(&store);
        assert_eq!(records[0].result, HistoryResult::Success);
        assert_eq!(records[0].close_price, Some(102.0));
        assert_eq!(records[1].result, HistoryResult::Pending);
        assert_eq!(records[2].result, HistoryResult::Pending);

        rec.record_candle(&candle_at(3, 102.0, 104.0, 101.0, 103.0), &snapshot(0.0), &[], false);
        let records = all(&store);
        assert_eq!(records[1].result, HistoryResult::Failure);
    }

    #[test]
    fn neutral_records_stay_pending() {
        let (store, mut rec) = recorder();
        for i in 0..6 {
            rec.record_candle(&candle_at(i, 100.0, 101.0, 99.0, 100.0 + i as f64), &snapshot(0.1), &[], false);
        }
        assert!(all(&store).iter().all(|r| r.result == HistoryResult::Pending));
    }

    #[test]
    fn ids_continue_after_existing_records() {
        let store = Arc::new(MemoryHistoryAdapter::new());
        let mut first = HistoryRecorder::new(store.clone(), params()).unwrap();
        first.record_candle(&candle_at(0, 1.0, 2.0, 0.5, 1.5), &snapshot(0.0), &[], false);
        let mut second = HistoryRecorder::new(store.clone(), params()).unwrap();
        let r = second.record_candle(&candle_at(1, 1.0, 2.0, 0.5, 1.5), &snapshot(0.0), &[], false);
        assert_eq!(r.id, 2);
    }

    /// Store that fails every call while `down` is set.
    struct Switchable {
        inner: MemoryHistoryAdapter,
        down: AtomicBool,
    }

    impl Switchable {
        fn check(&self) -> Result<(), ScalpwatchError> {
            if self.down.load(Ordering::SeqCst) {
                Err(ScalpwatchError::Database {
                    reason: "store unavailable".into(),
                })
            } else {
                Ok(())
            }
        }
    }

    impl HistoryPort for Switchable {
        fn append(&self, record: &SignalHistoryRecord) -> Result<(), ScalpwatchError> {
            self.check()?;
            self.inner.append(record)
        }

        fn finalize(
            &self,
            id: u64,
            result: HistoryResult,
            close_price: Option<f64>,
        ) -> Result<bool, ScalpwatchError> {
            self.check()?;
            self.inner.finalize(id, result, close_price)
        }

        fn query(&self, query: &HistoryQuery) -> Result<HistoryPage, ScalpwatchError> {
            self.inner.query(query)
        }

        fn max_id(&self) -> Result<Option<u64>, ScalpwatchError> {
            self.inner.max_id()
        }
    }

    #[test]
    fn failed_writes_are_buffered_then_flushed_in_order() {
        let store = Arc::new(Switchable {
            inner: MemoryHistoryAdapter::new(),
            down: AtomicBool::new(true),
        });
        let mut rec = HistoryRecorder::new(store.clone(), params()).unwrap();
        rec.record_candle(&candle_at(0, 99.0, 101.0, 98.0, 100.0), &snapshot(0.5), &[], false);
        rec.record_candle(&candle_at(1, 100.0, 101.0, 99.0, 100.5), &snapshot(0.0), &[], false);

        let health = rec.health();
        assert!(health.is_degraded());
        assert_eq!(health.buffered, 2);
        assert_eq!(health.write_failures, 1);
        assert!(health.last_error.is_some());

        store.down.store(false, Ordering::SeqCst);
        rec.record_candle(&candle_at(2, 100.5, 103.0, 100.0, 102.0), &snapshot(0.0), &[], false);
        assert_eq!(rec.health().buffered, 0);
        assert!(!rec.health().is_degraded());

        let records = all(&store.inner);
        assert_eq!(records.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(records[0].result, HistoryResult::Success);
    }

    #[test]
    fn overflow_drops_oldest_and_counts() {
        let store = Arc::new(Switchable {
            inner: MemoryHistoryAdapter::new(),
            down: AtomicBool::new(true),
        });
        let mut rec = HistoryRecorder::new(store.clone(), params()).unwrap();
        for i in 0..5 {
            rec.record_candle(&candle_at(i, 99.0, 101.0, 98.0, 100.0), &snapshot(0.0), &[], false);
        }
        let health = rec.health();
        assert_eq!(health.buffered, 3);
        assert_eq!(health.dropped, 2);

        store.down.store(false, Ordering::SeqCst);
        assert!(rec.flush());
        let ids: Vec<u64> = all(&store.inner).iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 4, 5]);
        assert!(rec.health().is_degraded());
    }
}
