// Library root: re-exports all modules so the CLI and integration tests can
// reach the crate's public API.

pub mod config;
pub mod eligibility;
pub mod engine;
pub mod error;
pub mod import;
pub mod model;
pub mod position;
pub mod rollup;
pub mod stats;
pub mod store;
pub mod window;
