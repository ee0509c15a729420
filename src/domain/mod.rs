//! Core domain types and logic.

pub mod aggregator;
pub mod candle;
pub mod capital;
pub mod config;
pub mod error;
pub mod history;
pub mod indicator;
pub mod pipeline;
pub mod position;
pub mod query;
pub mod scoring;
pub mod signal;
pub mod tick;
