//! Periodic self-ping that keeps the free-tier instance awake.
//!
//! Render idles services after 15 minutes without inbound traffic; a GET
//! against our own public URL counts as traffic. Failures are logged and
//! never crash the task.

use std::time::Duration;

use tracing::{error, info, warn};

/// Delay before the first ping, giving the server time to come up.
const STARTUP_DELAY: Duration = Duration::from_secs(10);
/// Timeout for a single ping request.
const PING_TIMEOUT: Duration = Duration::from_secs(30);

/// Spawn the keep-alive loop as a detached background task.
pub fn spawn(url: String, interval: Duration) {
    tokio::spawn(async move {
        let client = match reqwest::Client::builder().timeout(PING_TIMEOUT).build() {
            Ok(client) => client,
            Err(e) => {
                error!(error = %e, "failed to build keep-alive HTTP client");
                return;
            }
        };

        tokio::time::sleep(STARTUP_DELAY).await;
        info!(url = %url, interval_secs = interval.as_secs(), "keep-alive loop started");

        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match client.get(&url).send().await {
                Ok(response) => info!(status = %response.status(), "keep-alive ping"),
                Err(e) => warn!(error = %e, "keep-alive ping failed"),
            }
        }
    });
}
