//! Classification configuration.

use std::{num::NonZeroUsize, time::Duration};

/// Default deadline for a single RPC call made during a classification run.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of transaction lookups in flight at once.
pub const DEFAULT_MAX_CONCURRENT_LOOKUPS: usize = 128;

/// Classification configuration.
#[derive(Debug, Clone)]
pub struct ClassifyConfig {
    /// Deadline applied to every RPC call of a run. An expired ticket enumeration aborts the run, any other
    /// expired call only skips the ticket it was made for.
    pub call_timeout: Duration,
    /// Upper bound of transaction lookups sent to the wallet without having received their response.
    pub max_concurrent_lookups: NonZeroUsize,
}

impl Default for ClassifyConfig {
    fn default() -> Self {
        Self {
            call_timeout: DEFAULT_CALL_TIMEOUT,
            max_concurrent_lookups: NonZeroUsize::new(DEFAULT_MAX_CONCURRENT_LOOKUPS)
                .expect("hard coded non-zero integer"),
        }
    }
}

impl ClassifyConfig {
    /// Sets the per-call deadline.
    #[must_use]
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Sets the bound on in-flight transaction lookups.
    #[must_use]
    pub fn with_max_concurrent_lookups(mut self, max_concurrent_lookups: NonZeroUsize) -> Self {
        self.max_concurrent_lookups = max_concurrent_lookups;
        self
    }
}
