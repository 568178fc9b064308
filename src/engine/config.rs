//! Planner configuration.
//!
//! All tuning recognized by the avoidance core, loadable from TOML and
//! applied atomically at cycle boundaries. Invalid configurations are
//! rejected at apply time and the previous configuration retained.

use std::path::Path;

use serde::Deserialize;

use crate::error::{AvoidanceError, Result};

/// Complete tuning of the avoidance core.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct AvoidanceConfig {
    /// Half side length of the planning region box (meters).
    pub box_radius: f32,
    /// Weight of the goal-direction term.
    pub goal_cost_param: f32,
    /// Weight of the heading-change term.
    pub heading_cost_param: f32,
    /// Weight of the smoothness term.
    pub smooth_cost_param: f32,
    /// Weight of vertical deviation in the goal term (upper bound of the
    /// adapted value).
    pub height_change_cost_param: f32,
    /// Cruise speed near obstacles (m/s).
    pub velocity_around_obstacles: f32,
    /// Cruise speed in free space (m/s).
    pub velocity_far_from_obstacles: f32,
    /// Minimum distance kept to obstacles (meters).
    pub keep_distance: f32,
    /// Maximum age (cycles) of carried-over observations.
    pub reproj_age_max: u32,
    /// Slope of the speed blend between the two cruise speeds.
    pub velocity_sigmoid_slope: f32,
    /// Goal-distance slope above which progress counts as stalled (m/s).
    pub no_progress_slope: f32,
    /// Clouds at or below this size carry no obstacle information.
    pub min_cloud_size: usize,
    /// Returns closer than this are sensor artifacts (meters).
    pub min_sensor_range: f32,
    /// Distance defining "too close" returns for the back-off logic (meters).
    pub min_dist_backoff: f32,
    /// Seconds without fresh data before the vehicle is told to hover.
    pub timeout_critical: f32,
    /// Seconds without fresh data before flight termination is signaled.
    pub timeout_termination: f32,
    /// Candidate directions expanded per tree node.
    pub children_per_node: usize,
    /// Maximum tree expansions per build.
    pub n_expanded_nodes: usize,
    /// Angular margin over which the smoothness term fades (degrees).
    pub smoothing_margin_degrees: f32,
    /// Goal altitude applied on reconfiguration (meters).
    pub goal_z: f32,
    /// Emit velocity setpoints instead of position setpoints.
    pub use_vel_setpoints: bool,
    /// Brake in front of obstacles instead of steering around them.
    pub stop_in_front: bool,
    /// Enable the controlled-retreat behavior.
    pub use_back_off: bool,
    /// Enable the lookahead tree search.
    pub use_vfh_star: bool,
    /// Enable progress-rate adaptation of the height-change weight.
    pub adapt_cost_params: bool,
    /// Publish the per-azimuth obstacle range sweep.
    pub send_obstacles_fcu: bool,
    /// Horizontal smoothing speed handed to the waypoint smoother.
    pub smoothing_speed_xy: f32,
    /// Vertical smoothing speed handed to the waypoint smoother.
    pub smoothing_speed_z: f32,
    /// Angular resolution of the histogram (degrees; divides 180 and 360,
    /// even).
    pub alpha_res: usize,
    /// Edge length between tree nodes (meters).
    pub tree_node_distance: f32,
    /// Cycles a built tree may be reused.
    pub tree_reuse_age: u32,
    /// Goal distance at which the tree search terminates (meters).
    pub acceptance_radius: f32,
    /// Samples in the progress-rate window.
    pub dist_incline_window_size: usize,
    /// Skip the initial climb to goal altitude.
    pub disable_rise_to_goal_altitude: bool,
    /// Number of depth cameras feeding the combined horizontal FOV.
    pub n_cameras: usize,
}

impl Default for AvoidanceConfig {
    fn default() -> Self {
        Self {
            box_radius: 12.0,
            goal_cost_param: 10.0,
            heading_cost_param: 0.5,
            smooth_cost_param: 1.5,
            height_change_cost_param: 4.0,
            velocity_around_obstacles: 1.0,
            velocity_far_from_obstacles: 3.0,
            keep_distance: 6.0,
            reproj_age_max: 10,
            velocity_sigmoid_slope: 1.0,
            no_progress_slope: 0.05,
            min_cloud_size: 160,
            min_sensor_range: 0.2,
            min_dist_backoff: 1.0,
            timeout_critical: 0.5,
            timeout_termination: 15.0,
            children_per_node: 8,
            n_expanded_nodes: 40,
            smoothing_margin_degrees: 30.0,
            goal_z: 3.5,
            use_vel_setpoints: false,
            stop_in_front: false,
            use_back_off: true,
            use_vfh_star: true,
            adapt_cost_params: true,
            send_obstacles_fcu: false,
            smoothing_speed_xy: 10.0,
            smoothing_speed_z: 3.0,
            alpha_res: 6,
            tree_node_distance: 1.0,
            tree_reuse_age: 5,
            acceptance_radius: 2.0,
            dist_incline_window_size: 50,
            disable_rise_to_goal_altitude: false,
            n_cameras: 1,
        }
    }
}

impl AvoidanceConfig {
    /// Load a configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AvoidanceError::Config(format!("failed to read config file: {}", e)))?;
        let config: AvoidanceConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for consistency.
    ///
    /// Rejected configurations leave the previously applied one in force.
    pub fn validate(&self) -> Result<()> {
        if self.alpha_res == 0 || 180 % self.alpha_res != 0 || 360 % self.alpha_res != 0 {
            return Err(AvoidanceError::Config(format!(
                "alpha_res {} must divide 180 and 360",
                self.alpha_res
            )));
        }
        if self.alpha_res % 2 != 0 {
            return Err(AvoidanceError::Config(format!(
                "alpha_res {} must be even",
                self.alpha_res
            )));
        }
        if self.box_radius <= 0.0 {
            return Err(AvoidanceError::Config(
                "box_radius must be positive".into(),
            ));
        }
        if self.height_change_cost_param < 0.75 {
            return Err(AvoidanceError::Config(
                "height_change_cost_param must be at least 0.75".into(),
            ));
        }
        if self.children_per_node == 0 || self.n_expanded_nodes == 0 {
            return Err(AvoidanceError::Config(
                "tree expansion parameters must be positive".into(),
            ));
        }
        if self.reproj_age_max == 0 {
            return Err(AvoidanceError::Config(
                "reproj_age_max must be positive".into(),
            ));
        }
        if self.smoothing_margin_degrees <= 0.0 {
            return Err(AvoidanceError::Config(
                "smoothing_margin_degrees must be positive".into(),
            ));
        }
        if self.timeout_critical <= 0.0 || self.timeout_termination <= self.timeout_critical {
            return Err(AvoidanceError::Config(
                "timeouts must satisfy 0 < critical < termination".into(),
            ));
        }
        if self.dist_incline_window_size == 0 {
            return Err(AvoidanceError::Config(
                "dist_incline_window_size must be positive".into(),
            ));
        }
        if self.n_cameras == 0 {
            return Err(AvoidanceError::Config("n_cameras must be positive".into()));
        }
        Ok(())
    }
}
