//! Data-timeout escalation.
//!
//! Evaluated on the transport side: the planner itself never blocks on
//! I/O and has no internal timeouts. On `Critical` the vehicle is told to
//! hover in place; on `Termination` the companion signals the flight
//! termination state.

use std::time::Duration;

/// Health of the avoidance pipeline as seen by the watchdog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailsafeState {
    /// Data is flowing; planner output is trustworthy.
    Healthy,
    /// Data stale beyond the critical timeout: hover at the current
    /// position.
    Critical,
    /// Data stale beyond the termination timeout: signal flight
    /// termination.
    Termination,
}

/// Classify the pipeline health from the time since the last cloud.
///
/// `since_start` guards the startup phase: no escalation before the
/// system has been up longer than the respective timeout.
pub fn check_failsafe(
    since_last_cloud: Duration,
    since_start: Duration,
    timeout_critical: f32,
    timeout_termination: f32,
) -> FailsafeState {
    let critical = Duration::from_secs_f32(timeout_critical);
    let termination = Duration::from_secs_f32(timeout_termination);

    if since_last_cloud > termination && since_start > termination {
        FailsafeState::Termination
    } else if since_last_cloud > critical && since_start > critical {
        FailsafeState::Critical
    } else {
        FailsafeState::Healthy
    }
}
