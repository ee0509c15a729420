//! Concrete adapter implementations for ports.

pub mod csv_tick_adapter;
pub mod file_config_adapter;
pub mod log_notifier;
pub mod memory_history_adapter;
#[cfg(feature = "sqlite")]
pub mod sqlite_adapter;
