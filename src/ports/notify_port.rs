//! Outbound notifications for signals and trades.

use chrono::{DateTime, Utc};

use crate::domain::error::ScalpwatchError;
use crate::domain::position::{ClosedTrade, Position};
use crate::domain::scoring::Advice;

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    StrongSignal {
        at: DateTime<Utc>,
        score: f64,
        display_score: f64,
        advice: Advice,
        dominant: String,
    },
    PositionOpened(Position),
    PositionClosed(ClosedTrade),
}

pub trait Notifier: Send {
    fn notify(&self, notification: &Notification) -> Result<(), ScalpwatchError>;
}
