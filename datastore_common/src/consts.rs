//! Workspace-wide constants for the datastore.
//!
//! Single source of truth for all numeric limits and default paths.

use std::time::Duration;

/// Depth of the bounded request channel drained by the worker thread.
pub const DATASTORE_QUEUE_DEPTH: usize = 10;

/// Upper bound on subscriber table capacity per datapoint type,
/// including the reserved margin slot.
pub const MAX_TYPE_SUBSCRIPTIONS: usize = 32;

/// How long an API caller waits on its private response channel.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_millis(100);

/// How long `start()` waits for the worker to finish the boot
/// notification sweep.
pub const START_TIMEOUT: Duration = Duration::from_millis(1000);

/// Name assigned to the worker thread.
pub const WORKER_THREAD_NAME: &str = "datastore";

/// Default catalog file path.
pub const DEFAULT_CATALOG_PATH: &str = "/etc/datastore/catalog.toml";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_are_consistent() {
        assert!(DATASTORE_QUEUE_DEPTH > 0);
        assert!(MAX_TYPE_SUBSCRIPTIONS > 1);
        assert!(RESPONSE_TIMEOUT < START_TIMEOUT);
    }
}
