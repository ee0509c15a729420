//! Single-slot position state machine with ATR-based stops.
//!
//! Per closed candle, in order: check the open position's stop and target
//! against the candle's range, trail the levels when auto-adjust is on, and
//! finally consider a new entry from the composite score.

use chrono::{DateTime, Utc};
use std::fmt;

use crate::domain::candle::Candle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn sign(&self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Long => "long",
            Side::Short => "short",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Position {
    pub side: Side,
    pub entry_price: f64,
    pub size: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub opened_at: DateTime<Utc>,
}

impl Position {
    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        (price - self.entry_price) * self.size * self.side.sign()
    }

    fn stop_hit(&self, candle: &Candle) -> bool {
        match self.side {
            Side::Long => candle.low <= self.stop_loss,
            Side::Short => candle.high >= self.stop_loss,
        }
    }

    fn target_hit(&self, candle: &Candle) -> bool {
        match self.side {
            Side::Long => candle.high >= self.take_profit,
            Side::Short => candle.low <= self.take_profit,
        }
    }

    fn close(self, exit_price: f64, closed_at: DateTime<Utc>, reason: ExitReason) -> ClosedTrade {
        ClosedTrade {
            pnl: self.unrealized_pnl(exit_price),
            side: self.side,
            entry_price: self.entry_price,
            exit_price,
            size: self.size,
            opened_at: self.opened_at,
            closed_at,
            reason,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    Manual,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::StopLoss => "stop_loss",
            ExitReason::TakeProfit => "take_profit",
            ExitReason::Manual => "manual",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ClosedTrade {
    pub side: Side,
    pub entry_price: f64,
    pub exit_price: f64,
    pub size: f64,
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
    pub pnl: f64,
    pub reason: ExitReason,
}

impl ClosedTrade {
    pub fn is_win(&self) -> bool {
        self.pnl > 0.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PositionParams {
    /// Minimum |composite score| that opens a position.
    pub entry_threshold: f64,
    pub stop_atr_long: f64,
    pub take_atr_long: f64,
    pub stop_atr_short: f64,
    pub take_atr_short: f64,
    pub auto_adjust: bool,
    /// How much a fully favourable score shrinks the stop distance.
    pub tighten: f64,
    /// How much a fully favourable score stretches the target distance.
    pub widen: f64,
    pub allow_short: bool,
}

impl Default for PositionParams {
    fn default() -> Self {
        Self {
            entry_threshold: 0.6,
            stop_atr_long: 1.5,
            take_atr_long: 3.0,
            stop_atr_short: 1.5,
            take_atr_short: 3.0,
            auto_adjust: true,
            tighten: 0.5,
            widen: 1.0,
            allow_short: true,
        }
    }
}

impl PositionParams {
    fn multipliers(&self, side: Side) -> (f64, f64) {
        match side {
            Side::Long => (self.stop_atr_long, self.take_atr_long),
            Side::Short => (self.stop_atr_short, self.take_atr_short),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PositionEvent {
    Opened(Position),
    Adjusted { stop_loss: f64, take_profit: f64 },
    Closed(ClosedTrade),
}

#[derive(Debug, Clone)]
pub struct PositionManager {
    params: PositionParams,
    position: Option<Position>,
}

impl PositionManager {
    pub fn new(params: PositionParams) -> Self {
        Self {
            params,
            position: None,
        }
    }

    pub fn params(&self) -> &PositionParams {
        &self.params
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    /// Advance the state machine by one closed candle. `stake` is the
    /// capital a new position may commit.
    pub fn on_candle(
        &mut self,
        candle: &Candle,
        atr: Option<f64>,
        score: f64,
        stake: f64,
    ) -> Vec<PositionEvent> {
        let mut events = Vec::new();

        if let Some(trade) = self.check_exit(candle) {
            events.push(PositionEvent::Closed(trade));
        } else if self.params.auto_adjust {
            if let Some(event) = atr.and_then(|atr| self.adjust(candle.close, atr, score)) {
                events.push(event);
            }
        }

        if self.position.is_none() && events.is_empty() {
            if let Some(atr) = atr {
                if let Some(opened) = self.try_open(candle, atr, score, stake) {
                    events.push(PositionEvent::Opened(opened));
                }
            }
        }
        events
    }

    /// Close at `price`; `None` when flat.
    pub fn close_manual(&mut self, price: f64, at: DateTime<Utc>) -> Option<ClosedTrade> {
        self.position
            .take()
            .map(|p| p.close(price, at, ExitReason::Manual))
    }

    pub fn reset(&mut self) {
        self.position = None;
    }

    fn check_exit(&mut self, candle: &Candle) -> Option<ClosedTrade> {
        let position = self.position.as_ref()?;
        // A candle that spans both levels is treated as stopped out.
        let (price, reason) = if position.stop_hit(candle) {
            (position.stop_loss, ExitReason::StopLoss)
        } else if position.target_hit(candle) {
            (position.take_profit, ExitReason::TakeProfit)
        } else {
            return None;
        };
        self.position
            .take()
            .map(|p| p.close(price, candle.close_time, reason))
    }

    fn adjust(&mut self, close: f64, atr: f64, score: f64) -> Option<PositionEvent> {
        let params = &self.params;
        let position = self.position.as_mut()?;
        let sign = position.side.sign();
        let favor = (score * sign).max(0.0);
        let (stop_mult, take_mult) = params.multipliers(position.side);

        let stop = close - sign * stop_mult * atr * (1.0 - params.tighten * favor).max(0.0);
        let take = close + sign * take_mult * atr * (1.0 + params.widen * favor);

        let (stop, take) = match position.side {
            Side::Long => (position.stop_loss.max(stop), position.take_profit.max(take)),
            Side::Short => (position.stop_loss.min(stop), position.take_profit.min(take)),
        };
        if stop == position.stop_loss && take == position.take_profit {
            return None;
        }
        position.stop_loss = stop;
        position.take_profit = take;
        Some(PositionEvent::Adjusted {
            stop_loss: stop,
            take_profit: take,
        })
    }

    fn try_open(&mut self, candle: &Candle, atr: f64, score: f64, stake: f64) -> Option<Position> {
        if score.abs() < self.params.entry_threshold || candle.close <= 0.0 || stake <= 0.0 {
            return None;
        }
        let side = if score > 0.0 {
            Side::Long
        } else if self.params.allow_short {
            Side::Short
        } else {
            return None;
        };
        let entry = candle.close;
        let (stop_mult, take_mult) = self.params.multipliers(side);
        let sign = side.sign();
        let position = Position {
            side,
            entry_price: entry,
            size: stake / entry,
            stop_loss: entry - sign * stop_mult * atr,
            take_profit: entry + sign * take_mult * atr,
            opened_at: candle.close_time,
        };
        self.position = Some(position.clone());
        Some(position)
    }
}
