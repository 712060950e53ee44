//! Port traits (interfaces) for the hexagonal architecture.

pub mod alert_port;
pub mod cache_port;
pub mod config_port;
pub mod market_port;
pub mod store_port;
