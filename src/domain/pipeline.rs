//! Live evaluation pipeline: ticks → candles → indicators → signals →
//! score → position → history.
//!
//! A [`Pipeline`] is owned by a single thread and processes ticks strictly
//! in order. After each accepted tick or command it publishes a fresh
//! immutable [`PipelineSnapshot`] that any number of [`QueryHandle`]s read
//! concurrently.

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::domain::aggregator::CandleAggregator;
use crate::domain::candle::Candle;
use crate::domain::capital::CapitalAccount;
use crate::domain::config::PipelineConfig;
use crate::domain::error::ScalpwatchError;
use crate::domain::history::{HistoryRecorder, SignalHistoryRecord};
use crate::domain::indicator::engine::IndicatorEngine;
use crate::domain::indicator::{IndicatorKind, IndicatorReading};
use crate::domain::position::{ClosedTrade, PositionEvent, PositionManager};
use crate::domain::query::{
    HealthStatus, LatestPrice, PipelineSnapshot, PositionView, QueryHandle, SnapshotSlot,
};
use crate::domain::scoring::{ScoredSnapshot, ScoringAggregator};
use crate::domain::signal::{Signal, SignalEvaluator};
use crate::domain::tick::PriceTick;
use crate::ports::history_port::HistoryPort;
use crate::ports::notify_port::{Notification, Notifier};
use crate::ports::tick_port::TickSource;

/// Everything one closed candle produced.
#[derive(Debug, Clone, PartialEq)]
pub struct CandleReport {
    pub candle: Candle,
    pub readings: Vec<IndicatorReading>,
    pub score: ScoredSnapshot,
    pub events: Vec<PositionEvent>,
    pub record: SignalHistoryRecord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeedSummary {
    pub ticks: u64,
    pub rejected: u64,
    pub feed_errors: u64,
    pub candles: u64,
}

pub struct Pipeline {
    aggregator: CandleAggregator,
    engine: IndicatorEngine,
    evaluator: SignalEvaluator,
    scoring: ScoringAggregator,
    positions: PositionManager,
    capital: CapitalAccount,
    history: HistoryRecorder,
    history_port: Arc<dyn HistoryPort>,
    notifier: Box<dyn Notifier>,
    strong_score: f64,
    latest: Option<LatestPrice>,
    signals: Vec<Signal>,
    score: Option<ScoredSnapshot>,
    strong: bool,
    candles: u64,
    rejected_ticks: u64,
    feed_errors: u64,
    notify_failures: u64,
    slot: SnapshotSlot,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        history: Arc<dyn HistoryPort>,
        notifier: Box<dyn Notifier>,
    ) -> Result<Self, ScalpwatchError> {
        let scoring = ScoringAggregator::new(config.weights.clone(), config.enabled.clone())?;
        let recorder = HistoryRecorder::new(Arc::clone(&history), config.history.clone())?;
        let capital = CapitalAccount::new(config.capital.clone());
        let initial = PipelineSnapshot {
            latest: None,
            position: None,
            signals: Vec::new(),
            score: None,
            capital: capital.snapshot(0.0),
            health: HealthStatus::default(),
            candles: 0,
        };

        tracing::info!(
            interval_secs = config.interval.num_seconds(),
            enabled = scoring.enabled().count(),
            "pipeline ready"
        );

        Ok(Self {
            aggregator: CandleAggregator::new(config.interval),
            engine: IndicatorEngine::new(&config.indicators),
            evaluator: SignalEvaluator::new(config.thresholds.clone()),
            scoring,
            positions: PositionManager::new(config.position.clone()),
            capital,
            history: recorder,
            history_port: history,
            notifier,
            strong_score: config.notify.strong_score,
            latest: None,
            signals: Vec::new(),
            score: None,
            strong: false,
            candles: 0,
            rejected_ticks: 0,
            feed_errors: 0,
            notify_failures: 0,
            slot: Arc::new(ArcSwap::from_pointee(initial)),
        })
    }

    pub fn query_handle(&self) -> QueryHandle {
        QueryHandle::new(Arc::clone(&self.slot), Arc::clone(&self.history_port))
    }

    pub fn candles(&self) -> u64 {
        self.candles
    }

    /// Accept one tick. Returns the report of the candle it closed, if any.
    ///
    /// Out-of-order and malformed ticks are rejected without touching any
    /// pipeline state besides the health counters.
    pub fn ingest(&mut self, tick: &PriceTick) -> Result<Option<CandleReport>, ScalpwatchError> {
        let invalid = if !tick.price.is_finite() || tick.price <= 0.0 {
            Some(format!("invalid tick price {}", tick.price))
        } else {
            tick.volume
                .filter(|v| !v.is_finite() || *v < 0.0)
                .map(|v| format!("invalid tick volume {}", v))
        };
        if let Some(reason) = invalid {
            self.feed_errors += 1;
            tracing::warn!(at = %tick.timestamp, %reason, "dropping tick");
            self.publish();
            return Err(ScalpwatchError::Feed { reason });
        }

        let closed = match self.aggregator.push(tick) {
            Ok(closed) => closed,
            Err(e) => {
                if matches!(e, ScalpwatchError::OutOfOrderTick { .. }) {
                    self.rejected_ticks += 1;
                } else {
                    self.feed_errors += 1;
                }
                tracing::warn!(error = %e, "rejected tick");
                self.publish();
                return Err(e);
            }
        };

        self.latest = Some(LatestPrice {
            price: tick.price,
            timestamp: tick.timestamp,
        });
        let report = closed.map(|candle| self.process_candle(candle));
        self.publish();
        Ok(report)
    }

    /// Drain a feed. Bad ticks and feed errors are counted and skipped.
    pub fn run_feed(&mut self, source: &mut dyn TickSource) -> FeedSummary {
        let mut summary = FeedSummary::default();
        while let Some(item) = source.next_tick() {
            match item {
                Ok(tick) => {
                    summary.ticks += 1;
                    match self.ingest(&tick) {
                        Ok(Some(_)) => summary.candles += 1,
                        Ok(None) => {}
                        Err(ScalpwatchError::OutOfOrderTick { .. }) => summary.rejected += 1,
                        Err(_) => summary.feed_errors += 1,
                    }
                }
                Err(e) => {
                    summary.feed_errors += 1;
                    self.feed_errors += 1;
                    tracing::warn!(error = %e, "feed error");
                    self.publish();
                }
            }
        }
        if !self.history.flush() {
            tracing::error!(
                buffered = self.history.health().buffered,
                "history writes still buffered at end of feed"
            );
        }
        self.publish();
        tracing::info!(
            ticks = summary.ticks,
            candles = summary.candles,
            rejected = summary.rejected,
            feed_errors = summary.feed_errors,
            "feed finished"
        );
        summary
    }

    /// Close the open position at the latest price. `Ok(None)` when flat.
    pub fn close_position(&mut self) -> Result<Option<ClosedTrade>, ScalpwatchError> {
        if self.positions.position().is_none() {
            return Ok(None);
        }
        let latest = self.latest.ok_or_else(|| ScalpwatchError::InvalidCommand {
            reason: "no price received yet".to_string(),
        })?;
        let Some(trade) = self.positions.close_manual(latest.price, latest.timestamp) else {
            return Ok(None);
        };

        self.capital.record(&trade);
        let score = self.score.as_ref().map_or(0.0, |s| s.composite_score);
        self.history
            .record_manual_close(latest.timestamp, score, &trade);
        tracing::info!(
            side = %trade.side,
            exit = trade.exit_price,
            pnl = trade.pnl,
            "position closed manually"
        );
        self.notify(Notification::PositionClosed(trade.clone()));
        self.publish();
        Ok(Some(trade))
    }

    /// Toggle an indicator's participation in the score. The current score
    /// is recomputed from the current signals with the new weights.
    pub fn set_indicator_enabled(
        &mut self,
        kind: IndicatorKind,
        enabled: bool,
    ) -> Result<bool, ScalpwatchError> {
        let changed = self.scoring.set_enabled(kind, enabled)?;
        if changed {
            tracing::info!(indicator = %kind, enabled, "indicator toggled");
            if let Some(previous) = &self.score {
                self.score = Some(self.scoring.score(previous.timestamp, &self.signals));
            }
            self.publish();
        }
        Ok(changed)
    }

    /// Drop all indicator state and the in-progress candle. The position,
    /// capital and history are kept.
    pub fn reset_indicators(&mut self) {
        self.engine.reset();
        self.aggregator.reset();
        self.signals.clear();
        self.score = None;
        self.strong = false;
        tracing::info!("indicator state reset");
        self.publish();
    }

    fn process_candle(&mut self, candle: Candle) -> CandleReport {
        self.candles += 1;
        let readings = self.engine.update(&candle);
        let signals = self.evaluator.evaluate_all(&readings);
        let score = self.scoring.score(candle.close_time, &signals);
        let atr = readings
            .iter()
            .find(|r| r.kind == IndicatorKind::Atr)
            .and_then(IndicatorReading::simple);

        let stake = self.capital.equity() * self.capital.position_fraction();
        let events = self
            .positions
            .on_candle(&candle, atr, score.composite_score, stake);
        for event in &events {
            match event {
                PositionEvent::Opened(p) => tracing::info!(
                    side = %p.side,
                    entry = p.entry_price,
                    stop_loss = p.stop_loss,
                    take_profit = p.take_profit,
                    "position opened"
                ),
                PositionEvent::Adjusted {
                    stop_loss,
                    take_profit,
                } => tracing::debug!(stop_loss, take_profit, "levels adjusted"),
                PositionEvent::Closed(t) => {
                    self.capital.record(t);
                    tracing::info!(
                        side = %t.side,
                        exit = t.exit_price,
                        pnl = t.pnl,
                        reason = t.reason.as_str(),
                        "position closed"
                    );
                }
            }
        }

        let record = self.history.record_candle(
            &candle,
            &score,
            &events,
            self.positions.position().is_some(),
        );
        if self.history.health().is_degraded() {
            tracing::error!(health = ?self.history.health(), "history persistence degraded");
        }

        tracing::debug!(
            close_time = %candle.close_time,
            close = candle.close,
            score = score.composite_score,
            record = record.id,
            "candle evaluated"
        );

        self.notify_candle(&score, &events);
        self.signals = signals;
        self.score = Some(score.clone());

        CandleReport {
            candle,
            readings,
            score,
            events,
            record,
        }
    }

    fn notify_candle(&mut self, score: &ScoredSnapshot, events: &[PositionEvent]) {
        let strong = score.composite_score.abs() * 10.0 >= self.strong_score;
        if strong && !self.strong {
            self.notify(Notification::StrongSignal {
                at: score.timestamp,
                score: score.composite_score,
                display_score: score.display_score(),
                advice: score.advice(),
                dominant: score
                    .dominant()
                    .map_or_else(|| "none".to_string(), |c| c.indicator.name().to_string()),
            });
        }
        self.strong = strong;

        for event in events {
            match event {
                PositionEvent::Opened(p) => self.notify(Notification::PositionOpened(p.clone())),
                PositionEvent::Closed(t) => self.notify(Notification::PositionClosed(t.clone())),
                PositionEvent::Adjusted { .. } => {}
            }
        }
    }

    fn notify(&mut self, notification: Notification) {
        if let Err(e) = self.notifier.notify(&notification) {
            self.notify_failures += 1;
            tracing::warn!(error = %e, "notifier failed");
        }
    }

    fn snapshot(&self) -> PipelineSnapshot {
        let history = self.history.health();
        let degraded = history.is_degraded() || self.feed_errors > 0;
        let position = self.positions.position().cloned().map(|position| {
            let mark_price = self.latest.map_or(position.entry_price, |l| l.price);
            PositionView {
                unrealized_pnl: position.unrealized_pnl(mark_price),
                mark_price,
                position,
            }
        });
        let unrealized = position.as_ref().map_or(0.0, |p| p.unrealized_pnl);

        PipelineSnapshot {
            latest: self.latest,
            position,
            signals: self
                .signals
                .iter()
                .filter(|s| self.scoring.is_enabled(s.indicator))
                .cloned()
                .collect(),
            score: self.score.clone(),
            capital: self.capital.snapshot(unrealized),
            health: HealthStatus {
                rejected_ticks: self.rejected_ticks,
                feed_errors: self.feed_errors,
                notify_failures: self.notify_failures,
                history,
                degraded,
            },
            candles: self.candles,
        }
    }

    fn publish(&self) {
        self.slot.store(Arc::new(self.snapshot()));
    }

    /// Timestamp of the last accepted tick.
    pub fn last_tick_time(&self) -> Option<DateTime<Utc>> {
        self.aggregator.last_tick_time()
    }
}
