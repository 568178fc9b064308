//! Output contract toward the waypoint smoother.

use std::time::Instant;

use nalgebra::Vector3;

/// The kind of setpoint the strategy selected for this cycle.
///
/// Dispatch on this is exhaustive downstream; `Hover` is only ever forced
/// externally by the watchdog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaypointType {
    /// Hold position (externally forced on data timeout).
    Hover,
    /// Climb to the starting altitude before avoiding.
    ReachHeight,
    /// Fly straight at the (possibly rewritten) goal.
    Direct,
    /// Follow the lookahead tree path.
    TryPath,
    /// Follow the best cost-matrix direction.
    Costmap,
    /// Retreat from a dense close-range obstacle.
    GoBack,
}

/// Value snapshot of one planning cycle handed to the waypoint smoother.
///
/// The planner keeps no alias into a returned snapshot.
#[derive(Debug, Clone)]
pub struct AvoidanceOutput {
    /// Selected setpoint mode.
    pub waypoint_type: WaypointType,
    /// Whether an obstacle currently shapes the decision.
    pub obstacle_ahead: bool,
    /// Cruise speed near obstacles (m/s).
    pub velocity_around_obstacles: f32,
    /// Cruise speed in free space (m/s).
    pub velocity_far_from_obstacles: f32,
    /// Time the last tree path was produced.
    pub last_path_time: Instant,
    /// Closest point captured when the retreat began.
    pub back_off_point: Vector3<f32>,
    /// Vehicle position when the retreat began.
    pub back_off_start_point: Vector3<f32>,
    /// Distance defining "too close" returns (meters).
    pub min_dist_backoff: f32,
    /// Pose captured at arming, anchoring the initial climb.
    pub take_off_pose: Vector3<f32>,
    /// Elevation of the chosen cost-matrix direction (degrees).
    pub costmap_direction_e: f32,
    /// Azimuth of the chosen cost-matrix direction (degrees).
    pub costmap_direction_z: f32,
    /// Tree path positions, vehicle position first.
    pub path_node_positions: Vec<Vector3<f32>>,
}
