//! CSV tick feed: `timestamp,price[,volume]` with a header row.
//!
//! Timestamps are RFC 3339 strings or integer Unix milliseconds.

use crate::domain::error::ScalpwatchError;
use crate::domain::tick::PriceTick;
use crate::ports::tick_port::TickSource;
use chrono::{DateTime, Utc};
use std::fs::File;
use std::io::Read;
use std::path::Path;

pub struct CsvTickSource<R: Read> {
    reader: csv::Reader<R>,
    record: csv::StringRecord,
    line: u64,
}

impl CsvTickSource<File> {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ScalpwatchError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| ScalpwatchError::Feed {
            reason: format!("failed to open {}: {}", path.display(), e),
        })?;
        Ok(Self::from_reader(file))
    }
}

impl<R: Read> CsvTickSource<R> {
    pub fn from_reader(reader: R) -> Self {
        Self {
            reader: csv::ReaderBuilder::new()
                .has_headers(true)
                .flexible(true)
                .trim(csv::Trim::All)
                .from_reader(reader),
            record: csv::StringRecord::new(),
            line: 1,
        }
    }

    fn feed_err(&self, reason: impl std::fmt::Display) -> ScalpwatchError {
        ScalpwatchError::Feed {
            reason: format!("line {}: {}", self.line, reason),
        }
    }

    fn parse_record(&self) -> Result<PriceTick, ScalpwatchError> {
        let ts_field = self
            .record
            .get(0)
            .ok_or_else(|| self.feed_err("missing timestamp column"))?;
        let timestamp = parse_timestamp(ts_field).map_err(|e| self.feed_err(e))?;

        let price: f64 = self
            .record
            .get(1)
            .ok_or_else(|| self.feed_err("missing price column"))?
            .parse()
            .map_err(|e| self.feed_err(format!("invalid price: {}", e)))?;
        if !price.is_finite() || price <= 0.0 {
            return Err(self.feed_err(format!("price must be positive, got {}", price)));
        }

        let tick = PriceTick::new(timestamp, price);
        match self.record.get(2).filter(|v| !v.is_empty()) {
            Some(v) => {
                let volume: f64 = v
                    .parse()
                    .map_err(|e| self.feed_err(format!("invalid volume: {}", e)))?;
                if !volume.is_finite() || volume < 0.0 {
                    return Err(self.feed_err(format!("volume must be non-negative, got {}", volume)));
                }
                Ok(tick.with_volume(volume))
            }
            None => Ok(tick),
        }
    }
}

pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(ms) = value.parse::<i64>() {
        return DateTime::from_timestamp_millis(ms)
            .ok_or_else(|| format!("timestamp out of range: {}", value));
    }
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("invalid timestamp '{}': {}", value, e))
}

impl<R: Read> TickSource for CsvTickSource<R> {
    fn next_tick(&mut self) -> Option<Result<PriceTick, ScalpwatchError>> {
        self.line += 1;
        match self.reader.read_record(&mut self.record) {
            Ok(true) => Some(self.parse_record()),
            Ok(false) => None,
            Err(e) => Some(Err(self.feed_err(format!("CSV parse error: {}", e)))),
        }
    }
}
