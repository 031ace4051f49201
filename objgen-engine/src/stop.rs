//! Cooperative stop signalling for a load test run.

use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::request::Operation;
use crate::statistics::Counter;

/// Why a run stopped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// A statistics threshold was reached.
    Threshold {
        /// The operation the threshold applies to, or `None` for all operations.
        operation: Option<Operation>,
        /// The counter that reached the threshold.
        counter: Counter,
        /// The configured threshold.
        value: u64,
    },
    /// The configured runtime elapsed.
    Runtime(Duration),
    /// The run was interrupted from outside, for example by a signal.
    Interrupted,
    /// A protocol violation was detected in strict mode.
    ProtocolViolation(String),
    /// A fatal error occurred during the run.
    Failed(String),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Threshold {
                operation,
                counter,
                value,
            } => {
                let scope = operation.map_or("total", Operation::as_str);
                write!(f, "{scope} {counter} reached {value}")
            }
            StopReason::Runtime(runtime) => write!(f, "runtime of {runtime:?} elapsed"),
            StopReason::Interrupted => f.write_str("interrupted"),
            StopReason::ProtocolViolation(message) => write!(f, "protocol violation: {message}"),
            StopReason::Failed(message) => write!(f, "failed: {message}"),
        }
    }
}

/// Shared handle to stop a run, remembering the first reason given.
///
/// Clones share the same state.
#[derive(Clone, Debug, Default)]
pub struct StopSignal {
    token: CancellationToken,
    reason: Arc<OnceLock<StopReason>>,
}

impl StopSignal {
    /// Creates a signal that has not been triggered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stops the run. Returns `true` if this call triggered the stop.
    pub fn stop(&self, reason: StopReason) -> bool {
        let first = self.reason.set(reason.clone()).is_ok();
        if first {
            tracing::info!(%reason, "stopping load test");
        }
        self.token.cancel();
        first
    }

    /// Returns `true` once the run was stopped.
    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The reason given to the first call of [`stop`](Self::stop).
    pub fn reason(&self) -> Option<&StopReason> {
        self.reason.get()
    }

    /// The cancellation token triggered by [`stop`](Self::stop).
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Waits until the run is stopped.
    pub async fn stopped(&self) {
        self.token.cancelled().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_reason_wins() {
        let signal = StopSignal::new();
        let clone = signal.clone();
        assert!(!signal.is_stopped());

        assert!(clone.stop(StopReason::Interrupted));
        assert!(!signal.stop(StopReason::Runtime(Duration::from_secs(1))));

        signal.stopped().await;
        assert_eq!(signal.reason(), Some(&StopReason::Interrupted));
    }

    #[test]
    fn describes_thresholds() {
        let reason = StopReason::Threshold {
            operation: Some(Operation::Read),
            counter: Counter::Status(404),
            value: 10,
        };
        assert_eq!(reason.to_string(), "read status 404 reached 10");
    }
}
