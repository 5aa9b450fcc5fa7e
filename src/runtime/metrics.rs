/// Normalization metrics
///
/// Counters for dispatch outcomes and queue fallbacks plus a pass duration histogram.
/// They mirror the `DispatchHealth` snapshot for whichever recorder the process installs.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Duration;

/// Normalization requests by dispatch outcome.
pub const DISPATCH_REQUESTS: &str = "skillstack_normalization_requests_total";

/// Queue failures that downgraded a request to in-process execution.
pub const QUEUE_FALLBACKS: &str = "skillstack_normalization_fallbacks_total";

/// Time spent inside the lease per pass.
pub const PASS_DURATION: &str = "skillstack_normalization_pass_duration_seconds";

/// Label values for [`DISPATCH_REQUESTS`].
pub mod outcome {
    pub const QUEUED: &str = "queued";
    pub const COALESCED: &str = "coalesced";
    pub const IN_PROCESS: &str = "in_process";
    pub const DROPPED: &str = "dropped";
}

/// Registers metric descriptions; call once after installing a recorder.
pub fn register_metrics() {
    describe_counter!(DISPATCH_REQUESTS, "Normalization requests by dispatch outcome");
    describe_counter!(QUEUE_FALLBACKS, "Queue failures that fell back to in-process normalization");
    describe_histogram!(PASS_DURATION, "Duration of normalization passes in seconds");
}

pub fn record_dispatch(outcome: &'static str) {
    counter!(DISPATCH_REQUESTS, "outcome" => outcome).increment(1);
}

pub fn record_fallback() {
    counter!(QUEUE_FALLBACKS).increment(1);
}

pub fn record_pass(duration: Duration) {
    histogram!(PASS_DURATION).record(duration.as_secs_f64());
}
