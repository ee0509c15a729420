//! In-process history store, used when no database path is configured.

use std::sync::Mutex;

use crate::domain::error::ScalpwatchError;
use crate::domain::history::{HistoryPage, HistoryQuery, HistoryResult, SignalHistoryRecord};
use crate::ports::history_port::HistoryPort;

#[derive(Debug, Default)]
pub struct MemoryHistoryAdapter {
    records: Mutex<Vec<SignalHistoryRecord>>,
}

impl MemoryHistoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<SignalHistoryRecord>>, ScalpwatchError> {
        self.records.lock().map_err(|e| ScalpwatchError::Database {
            reason: format!("history store poisoned: {}", e),
        })
    }
}

impl HistoryPort for MemoryHistoryAdapter {
    fn append(&self, record: &SignalHistoryRecord) -> Result<(), ScalpwatchError> {
        let mut records = self.lock()?;
        if !records.iter().any(|r| r.id == record.id) {
            records.push(record.clone());
        }
        Ok(())
    }

    fn finalize(
        &self,
        id: u64,
        result: HistoryResult,
        close_price: Option<f64>,
    ) -> Result<bool, ScalpwatchError> {
        let mut records = self.lock()?;
        match records
            .iter_mut()
            .find(|r| r.id == id && r.result == HistoryResult::Pending)
        {
            Some(record) => {
                record.result = result;
                record.close_price = close_price;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn query(&self, query: &HistoryQuery) -> Result<HistoryPage, ScalpwatchError> {
        let records = self.lock()?;
        let mut matching: Vec<&SignalHistoryRecord> = records
            .iter()
            .filter(|r| query.contains(r.timestamp))
            .collect();
        matching.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));

        let mut page: Vec<SignalHistoryRecord> = matching
            .into_iter()
            .skip(query.offset)
            .take(query.limit.saturating_add(1))
            .cloned()
            .collect();
        let has_more = page.len() > query.limit;
        page.truncate(query.limit);
        Ok(HistoryPage {
            records: page,
            has_more,
        })
    }

    fn max_id(&self) -> Result<Option<u64>, ScalpwatchError> {
        Ok(self.lock()?.iter().map(|r| r.id).max())
    }
}
