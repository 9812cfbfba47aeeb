//! Tests for the configuration loader.
//!
//! Invariants:
//! - Tests that touch process environment use `serial_test` and `temp_env`
//!   so variables never leak between tests.
