// Sync integration tests, one module per component

mod common;
mod config_tests;
mod end_to_end_tests;
mod store_tests;
