#![allow(dead_code)]

use chrono::{DateTime, Utc};
use scalpwatch::adapters::memory_history_adapter::MemoryHistoryAdapter;
use scalpwatch::domain::config::PipelineConfig;
use scalpwatch::domain::error::ScalpwatchError;
use scalpwatch::domain::history::{HistoryPage, HistoryQuery, HistoryResult, SignalHistoryRecord};
use scalpwatch::domain::pipeline::{CandleReport, Pipeline};
use scalpwatch::domain::tick::PriceTick;
use scalpwatch::ports::history_port::HistoryPort;
use scalpwatch::ports::notify_port::{Notification, Notifier};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap()
}

pub fn tick(secs: i64, price: f64) -> PriceTick {
    PriceTick::new(at(secs), price)
}

/// Close of candle `i` in the 260-candle 1000 → 1300 ramp.
pub fn rising_price(i: usize) -> f64 {
    1000.0 + 300.0 * i as f64 / 259.0
}

/// Two ticks per one-minute candle: the open at the previous close and the
/// close at [`rising_price`]. A trailing tick closes the last candle, so
/// ingesting the result yields exactly `candles` closed candles.
pub fn rising_ticks(candles: usize) -> Vec<PriceTick> {
    let mut ticks = Vec::with_capacity(candles * 2 + 1);
    for i in 0..candles {
        let open = if i == 0 { rising_price(0) } else { rising_price(i - 1) };
        let start = i as i64 * 60;
        ticks.push(tick(start, open));
        ticks.push(tick(start + 30, rising_price(i)));
    }
    if candles > 0 {
        ticks.push(tick(candles as i64 * 60, rising_price(candles - 1)));
    }
    ticks
}

/// Two ticks per candle following `closes`, plus a trailing closing tick.
pub fn ticks_from_closes(closes: &[f64]) -> Vec<PriceTick> {
    let mut ticks = Vec::with_capacity(closes.len() * 2 + 1);
    let mut prev = closes.first().copied().unwrap_or(1000.0);
    for (i, &close) in closes.iter().enumerate() {
        let start = i as i64 * 60;
        ticks.push(tick(start, prev));
        ticks.push(tick(start + 30, close));
        prev = close;
    }
    ticks.push(tick(closes.len() as i64 * 60, prev));
    ticks
}

pub fn memory_pipeline(config: PipelineConfig) -> (Pipeline, Arc<MemoryHistoryAdapter>) {
    let store = Arc::new(MemoryHistoryAdapter::new());
    let pipeline = Pipeline::new(config, store.clone(), Box::new(RecordingNotifier::default()))
        .unwrap();
    (pipeline, store)
}

/// Ingest every tick and keep the candle reports.
pub fn ingest_all(pipeline: &mut Pipeline, ticks: &[PriceTick]) -> Vec<CandleReport> {
    ticks
        .iter()
        .filter_map(|t| pipeline.ingest(t).unwrap())
        .collect()
}

pub fn all_history(port: &dyn HistoryPort) -> HistoryPage {
    port.query(&HistoryQuery {
        limit: 10_000,
        ..HistoryQuery::default()
    })
    .unwrap()
}

pub fn find_record(page: &HistoryPage, id: u64) -> SignalHistoryRecord {
    page.records.iter().find(|r| r.id == id).cloned().unwrap()
}

pub fn terminal(page: &HistoryPage) -> Vec<SignalHistoryRecord> {
    page.records
        .iter()
        .filter(|r| r.result != HistoryResult::Pending)
        .cloned()
        .collect()
}

#[derive(Clone, Default)]
pub struct RecordingNotifier(pub Arc<Mutex<Vec<Notification>>>);

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), ScalpwatchError> {
        self.0.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

/// In-memory history that fails every call while `failing` is set.
#[derive(Default)]
pub struct FlakyHistory {
    pub inner: MemoryHistoryAdapter,
    pub failing: AtomicBool,
}

impl FlakyHistory {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), ScalpwatchError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(ScalpwatchError::Database {
                reason: "disk unavailable".into(),
            })
        } else {
            Ok(())
        }
    }
}

impl HistoryPort for FlakyHistory {
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

pub fn write_temp(content: &str, suffix: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

pub fn ticks_csv(ticks: &[PriceTick]) -> String {
    let mut csv = String::from("timestamp,price\n");
    for t in ticks {
        csv.push_str(&format!("{},{}\n", t.timestamp.timestamp_millis(), t.price));
    }
    csv
}
