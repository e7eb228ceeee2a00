//! Telemetry metric name constants.
//!
//! Consumers install their own `metrics` recorder (e.g. prometheus,
//! statsd); without a recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `hugin_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `operation`: cached capability: "complete" or "embed"
//! - `status`: outcome of a stream: "finished", "failed" or "cancelled"

/// Cache lookups answered from disk.
///
/// Labels: `operation`.
pub const CACHE_HITS_TOTAL: &str = "hugin_cache_hits_total";

/// Cache lookups that fell through to the delegate.
///
/// Labels: `operation`.
pub const CACHE_MISSES_TOTAL: &str = "hugin_cache_misses_total";

/// Entries persisted to disk.
///
/// Labels: `operation`.
pub const CACHE_WRITES_TOTAL: &str = "hugin_cache_writes_total";

/// Cache operations abandoned because the root lock was held too long.
pub const CACHE_LOCK_TIMEOUTS_TOTAL: &str = "hugin_cache_lock_timeouts_total";

/// Entries that could not be parsed and were treated as misses.
pub const CACHE_CORRUPT_ENTRIES_TOTAL: &str = "hugin_cache_corrupt_entries_total";

/// Calls forwarded to the wrapped remote model.
///
/// Labels: `operation`, `status` ("ok" | "error").
pub const DELEGATE_CALLS_TOTAL: &str = "hugin_delegate_calls_total";

/// Delegate call duration in seconds.
///
/// Labels: `operation`.
pub const DELEGATE_DURATION_SECONDS: &str = "hugin_delegate_duration_seconds";

/// Streaming pipeline runs by terminal state.
///
/// Labels: `status`.
pub const STREAMS_TOTAL: &str = "hugin_streams_total";
