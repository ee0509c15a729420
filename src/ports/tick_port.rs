//! Upstream price feed port.

use crate::domain::error::ScalpwatchError;
use crate::domain::tick::PriceTick;

pub trait TickSource {
    /// Next tick from the feed; `None` once the feed is exhausted. A feed
    /// error does not end the stream.
    fn next_tick(&mut self) -> Option<Result<PriceTick, ScalpwatchError>>;
}

/// Any iterator of ticks is a feed; handy for replay and tests.
impl<I> TickSource for I
where
    I: Iterator<Item = PriceTick>,
{
    fn next_tick(&mut self) -> Option<Result<PriceTick, ScalpwatchError>> {
        self.next().map(Ok)
    }
}
