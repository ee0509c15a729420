//! Port traits the domain depends on; adapters implement them.

pub mod config_port;
pub mod history_port;
pub mod notify_port;
pub mod tick_port;
