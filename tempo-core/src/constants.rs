use std::time::Duration;

/// VUs constructed before the first tick when none are configured.
pub const DEFAULT_PREALLOCATED_VUS: usize = 1;

/// Concurrency ceiling used when none is configured.
pub const DEFAULT_MAX_VUS: usize = 100;

/// Highest arrival rate accepted, in iterations per second.
pub const MAX_TARGET_RATE: f64 = 1_000_000.;

/// Grace period of the bundled browse/submit scenario's `DrainPolicy::Deadline`.
pub const DEFAULT_DRAIN_GRACE: Duration = Duration::from_secs(30);
