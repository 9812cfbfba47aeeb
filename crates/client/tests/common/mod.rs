//! Common test utilities for integration tests.
//!
//! Re-exports the wiremock types and the `capella_client::testing` helpers so
//! every test file can start from `use common::*;`.
//!
//! # What this does NOT handle
//! - Mock server setup (use wiremock directly in tests)

use secrecy::SecretString;
use tokio_util::sync::CancellationToken;

#[allow(unused_imports)]
pub use capella_client::testing::{
    api_error_body, fast_client, fast_retry_policy, paginated_body, status_body,
};
#[allow(unused_imports)]
pub use capella_client::{ClientError, EndpointConfig, ErrorKind, TransportKind};
#[allow(unused_imports)]
pub use wiremock::{Mock, MockServer, ResponseTemplate};

/// Bearer token used by every test.
#[allow(dead_code)]
pub const TEST_TOKEN: &str = "test-token";

#[allow(dead_code)]
pub fn token() -> SecretString {
    SecretString::from(TEST_TOKEN.to_string())
}

#[allow(dead_code)]
pub fn never_cancelled() -> CancellationToken {
    CancellationToken::new()
}
