// Library module for logsync
// Re-exports modules for use in integration tests and the binary

pub mod config;
pub mod error;
pub mod logging;
pub mod store;
pub mod sync;
