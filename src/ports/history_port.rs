//! Durable signal-history storage port.

use crate::domain::error::ScalpwatchError;
use crate::domain::history::{HistoryPage, HistoryQuery, HistoryResult, SignalHistoryRecord};

pub trait HistoryPort: Send + Sync {
    /// Store a new record. Appending an id that already exists is a no-op.
    fn append(&self, record: &SignalHistoryRecord) -> Result<(), ScalpwatchError>;

    /// Resolve a pending record. Returns `false` when the record is missing
    /// or already terminal; terminal records are never modified.
    fn finalize(
        &self,
        id: u64,
        result: HistoryResult,
        close_price: Option<f64>,
    ) -> Result<bool, ScalpwatchError>;

    /// Newest first (timestamp, then id, descending).
    fn query(&self, query: &HistoryQuery) -> Result<HistoryPage, ScalpwatchError>;

    /// Largest stored id, used to continue numbering after a restart.
    fn max_id(&self) -> Result<Option<u64>, ScalpwatchError>;
}
