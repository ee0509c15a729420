//! Notifier that writes notifications to the tracing log.

use crate::domain::error::ScalpwatchError;
use crate::ports::notify_port::{Notification, Notifier};

#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), ScalpwatchError> {
        match notification {
            Notification::StrongSignal {
                at,
                score,
                display_score,
                advice,
                dominant,
            } => tracing::info!(
                target: "scalpwatch::notify",
                %at,
                score = format_args!("{:.3}", score),
                display = format_args!("{:.1}", display_score),
                dominant = %dominant,
                "new trading signal: {}",
                advice
            ),
            Notification::PositionOpened(p) => tracing::info!(
                target: "scalpwatch::notify",
                side = %p.side,
                entry = p.entry_price,
                size = p.size,
                stop_loss = p.stop_loss,
                take_profit = p.take_profit,
                "trade update: position opened"
            ),
            Notification::PositionClosed(t) => tracing::info!(
                target: "scalpwatch::notify",
                side = %t.side,
                entry = t.entry_price,
                exit = t.exit_price,
                pnl = t.pnl,
                reason = t.reason.as_str(),
                "trade update: position closed"
            ),
        }
        Ok(())
    }
}
