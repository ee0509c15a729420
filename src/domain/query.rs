//! Read-only query surface over the latest published pipeline state.
//!
//! The pipeline replaces the whole [`PipelineSnapshot`] after every accepted
//! tick or command; readers clone the current `Arc` and never observe a
//! half-applied update.

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::domain::capital::CapitalSnapshot;
use crate::domain::error::ScalpwatchError;
use crate::domain::history::{HistoryHealth, HistoryPage, HistoryQuery};
use crate::domain::position::Position;
use crate::domain::scoring::ScoredSnapshot;
use crate::domain::signal::Signal;
use crate::ports::history_port::HistoryPort;

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct LatestPrice {
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

/// Open position marked to the latest price.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PositionView {
    pub position: Position,
    pub mark_price: f64,
    pub unrealized_pnl: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct HealthStatus {
    pub rejected_ticks: u64,
    pub feed_errors: u64,
    pub notify_failures: u64,
    pub history: HistoryHealth,
    /// Set while history writes are buffered or lost, or once the feed has
    /// reported an error.
    pub degraded: bool,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PipelineSnapshot {
    pub latest: Option<LatestPrice>,
    pub position: Option<PositionView>,
    /// One signal per enabled indicator, in indicator order.
    pub signals: Vec<Signal>,
    pub score: Option<ScoredSnapshot>,
    pub capital: CapitalSnapshot,
    pub health: HealthStatus,
    pub candles: u64,
}

pub(crate) type SnapshotSlot = Arc<ArcSwap<PipelineSnapshot>>;

#[derive(Clone)]
pub struct QueryHandle {
    slot: SnapshotSlot,
    history: Arc<dyn HistoryPort>,
}

impl QueryHandle {
    pub(crate) fn new(slot: SnapshotSlot, history: Arc<dyn HistoryPort>) -> Self {
        Self { slot, history }
    }

    /// The whole current snapshot; cheap to call and consistent across fields.
    pub fn snapshot(&self) -> Arc<PipelineSnapshot> {
        self.slot.load_full()
    }

    pub fn latest_price(&self) -> Option<LatestPrice> {
        self.snapshot().latest
    }

    pub fn current_position(&self) -> Option<PositionView> {
        self.snapshot().position.clone()
    }

    pub fn current_signals(&self) -> Vec<Signal> {
        self.snapshot().signals.clone()
    }

    pub fn current_score(&self) -> Option<ScoredSnapshot> {
        self.snapshot().score.clone()
    }

    /// Newest first; see [`HistoryQuery`] for filtering and paging.
    pub fn signal_history(&self, query: &HistoryQuery) -> Result<HistoryPage, ScalpwatchError> {
        self.history.query(query)
    }

    pub fn capital(&self) -> CapitalSnapshot {
        self.snapshot().capital.clone()
    }

    pub fn health(&self) -> HealthStatus {
        self.snapshot().health.clone()
    }
}

impl std::fmt::Debug for QueryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryHandle")
            .field("snapshot", &self.snapshot())
            .finish_non_exhaustive()
    }
}
