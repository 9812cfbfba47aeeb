//! Configuration for the Capella API client.
//!
//! This crate provides the settings types used by `capella-client` and a
//! loader that fills them from code, `.env` files and `CAPELLA_*` variables.

pub mod constants;
mod loader;
pub mod types;

pub use loader::{ConfigError, ConfigLoader, env_var_or_none};
pub use types::{Config, ConnectionConfig, PollSettings, RateLimitSettings, RetrySettings};
