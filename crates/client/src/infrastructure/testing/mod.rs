//! Test doubles shared by unit and integration tests.
//!
//! Compiled for `cfg(test)` and for the `testing` feature so the integration
//! tests under `tests/` can drive the same scripted server.

mod fixtures;
mod mock_server;

pub use fixtures::{post, snapshot_with_posts};
pub use mock_server::{MockConnector, MockServer, MockTransport};

use std::time::Duration;

/// Poll `condition` until it holds, yielding to the runtime between checks.
///
/// Uses tokio time, so under `start_paused` the budget is virtual.
/// Panics if the condition does not hold within ten seconds.
pub async fn wait_until(condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            panic!("condition not met within 10s");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
