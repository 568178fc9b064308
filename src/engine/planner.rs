//! The avoidance strategy controller.
//!
//! Owns all mutable planning state for the lifetime of the vehicle and
//! runs one end-to-end decision cycle per fresh set of inputs: filter the
//! fused cloud, decide the flight mode, build and combine the obstacle
//! histogram, score directions and (when enabled) grow the lookahead tree.

use std::collections::VecDeque;
use std::time::Instant;

use nalgebra::{UnitQuaternion, Vector3};

use crate::algorithms::cost::{best_candidates, build_cost_matrix, CostContext, CostParams};
use crate::algorithms::fov::{calculate_fov, FieldOfView};
use crate::algorithms::histogram::{
    combine_histograms, compress_histogram_elevation, generate_new_histogram,
    obstacle_distance_sweep, propagate_histogram, reproject_histogram, Histogram,
};
use crate::algorithms::star_planner::{StarPlanner, StarPlannerConfig, TreeContext};
use crate::core::math::{
    cartesian_to_polar, hist_heading_deg, pitch_from_quaternion, polar_to_cartesian,
    polar_to_histogram_index, yaw_from_quaternion,
};
use crate::core::types::{AgedPoint, HistogramBox, PolarPoint};
use crate::engine::config::AvoidanceConfig;
use crate::engine::output::{AvoidanceOutput, WaypointType};
use crate::error::Result;
use crate::sensors::cloud::{filter_point_cloud, FilteredCloud};

/// Close-range returns above this count trigger the retreat behavior.
const BACKOFF_POINT_THRESHOLD: usize = 200;
/// Speed below which the vehicle counts as hovering or only yawing (m/s).
const ONLY_YAWED_SPEED: f32 = 0.1;
/// Default combined horizontal field of view of one camera (degrees).
const DEFAULT_H_FOV: f32 = 59.0;
/// Default vertical field of view (degrees).
const DEFAULT_V_FOV: f32 = 46.0;

/// Reactive local avoidance planner.
pub struct AvoidancePlanner {
    config: AvoidanceConfig,
    cost_params: CostParams,
    star_planner: StarPlanner,

    // Vehicle state
    position: Vector3<f32>,
    position_old: Vector3<f32>,
    velocity: Vector3<f32>,
    yaw: f32,
    pitch: f32,
    goal: Vector3<f32>,
    ground_distance: f32,
    last_sent_waypoint: Vector3<f32>,
    currently_armed: bool,
    mission: bool,
    offboard: bool,

    // Sensing
    h_fov: f32,
    v_fov: f32,
    camera_clouds: Vec<Vec<Vector3<f32>>>,
    histogram_box: HistogramBox,
    fov: FieldOfView,
    filtered: FilteredCloud,
    polar_histogram: Histogram,
    reprojected_points: Vec<AgedPoint>,
    obstacle_distance: Option<Vec<f32>>,

    // Strategy state
    waypoint_type: WaypointType,
    obstacle_ahead: bool,
    hist_is_empty: bool,
    reach_altitude: bool,
    starting_height: f32,
    take_off_pose: Vector3<f32>,
    back_off: bool,
    back_off_point: Vector3<f32>,
    back_off_start_point: Vector3<f32>,
    first_brake: bool,
    stop_in_front_active: bool,
    costmap_direction_e: f32,
    costmap_direction_z: f32,
    last_path_time: Instant,
    goal_dist_incline: VecDeque<f32>,
    last_cycle_time: Option<Instant>,
}

impl AvoidancePlanner {
    /// Create a planner with the given configuration.
    pub fn new(config: AvoidanceConfig) -> Result<Self> {
        config.validate()?;
        let cost_params = CostParams {
            goal_cost_param: config.goal_cost_param,
            heading_cost_param: config.heading_cost_param,
            smooth_cost_param: config.smooth_cost_param,
            height_change_cost_param: config.height_change_cost_param,
            height_change_cost_param_adapted: config.height_change_cost_param,
        };
        let star_planner = StarPlanner::new(star_config(&config));
        let histogram_box = HistogramBox::new(config.box_radius);
        let polar_histogram = Histogram::new(config.alpha_res);
        let goal = Vector3::new(0.0, 0.0, config.goal_z);
        Ok(Self {
            cost_params,
            star_planner,
            histogram_box,
            polar_histogram,
            goal,
            position: Vector3::zeros(),
            position_old: Vector3::zeros(),
            velocity: Vector3::zeros(),
            yaw: 0.0,
            pitch: 0.0,
            ground_distance: 2.0,
            last_sent_waypoint: Vector3::zeros(),
            currently_armed: false,
            mission: false,
            offboard: false,
            h_fov: DEFAULT_H_FOV * config.n_cameras as f32,
            v_fov: DEFAULT_V_FOV,
            camera_clouds: Vec::new(),
            fov: FieldOfView::default(),
            filtered: FilteredCloud::default(),
            reprojected_points: Vec::new(),
            obstacle_distance: None,
            waypoint_type: WaypointType::ReachHeight,
            obstacle_ahead: false,
            hist_is_empty: true,
            reach_altitude: false,
            starting_height: 0.0,
            take_off_pose: Vector3::zeros(),
            back_off: false,
            back_off_point: Vector3::zeros(),
            back_off_start_point: Vector3::zeros(),
            first_brake: true,
            stop_in_front_active: false,
            costmap_direction_e: 0.0,
            costmap_direction_z: 0.0,
            last_path_time: Instant::now(),
            goal_dist_incline: VecDeque::new(),
            last_cycle_time: None,
            config,
        })
    }

    /// Replace the configuration atomically.
    ///
    /// Validation failures leave the previous configuration in force.
    /// Applying the same configuration twice is a no-op.
    pub fn apply_config(&mut self, config: AvoidanceConfig) -> Result<()> {
        config.validate()?;

        if (self.goal.z - config.goal_z).abs() > f32::EPSILON {
            let mut goal = self.goal;
            goal.z = config.goal_z;
            self.set_goal(goal);
        }

        self.cost_params.goal_cost_param = config.goal_cost_param;
        self.cost_params.heading_cost_param = config.heading_cost_param;
        self.cost_params.smooth_cost_param = config.smooth_cost_param;
        self.cost_params.height_change_cost_param = config.height_change_cost_param;
        self.cost_params.height_change_cost_param_adapted = config.height_change_cost_param;

        self.histogram_box = HistogramBox::new(config.box_radius);
        self.star_planner.set_config(star_config(&config));

        if config.alpha_res != self.config.alpha_res {
            self.polar_histogram = Histogram::new(config.alpha_res);
            self.reprojected_points.clear();
        }

        self.config = config;
        log::debug!("configuration applied");
        Ok(())
    }

    /// Update vehicle pose. While disarmed the take-off pose tracks the
    /// vehicle and the climb phase is re-armed.
    pub fn set_pose(&mut self, position: Vector3<f32>, orientation: &UnitQuaternion<f32>) {
        self.position = position;
        self.yaw = yaw_from_quaternion(orientation);
        self.pitch = pitch_from_quaternion(orientation);

        if !self.currently_armed && !self.config.disable_rise_to_goal_altitude {
            self.take_off_pose = position;
            self.reach_altitude = false;
        }
    }

    /// Update vehicle linear velocity.
    pub fn set_velocity(&mut self, velocity: Vector3<f32>) {
        self.velocity = velocity;
    }

    /// Update the goal. Resets progress tracking; the lookahead tree is
    /// invalidated at the next cycle.
    pub fn set_goal(&mut self, goal: Vector3<f32>) {
        self.goal = goal;
        self.goal_dist_incline.clear();
        log::info!("goal set to [{:.2}, {:.2}, {:.2}]", goal.x, goal.y, goal.z);
    }

    /// Update the per-camera clouds for the next cycle.
    pub fn set_camera_clouds(&mut self, clouds: Vec<Vec<Vector3<f32>>>) {
        self.camera_clouds = clouds;
    }

    /// Derive the field of view from camera intrinsics. The horizontal
    /// field of view combines all configured cameras.
    pub fn set_camera_info(&mut self, width: u32, height: u32, fx: f32, fy: f32) {
        let single_h = 2.0 * ((width as f32) / (2.0 * fx)).atan().to_degrees();
        self.h_fov = self.config.n_cameras as f32 * single_h;
        self.v_fov = 2.0 * ((height as f32) / (2.0 * fy)).atan().to_degrees();
    }

    /// Update the measured distance to the ground.
    pub fn set_ground_distance(&mut self, distance: f32) {
        self.ground_distance = distance;
    }

    /// Update the last waypoint sent downstream (smoothness reference).
    pub fn set_last_sent_waypoint(&mut self, waypoint: Vector3<f32>) {
        self.last_sent_waypoint = waypoint;
    }

    /// Update the vehicle arming and mode flags.
    pub fn set_vehicle_state(&mut self, armed: bool, mission: bool, offboard: bool) {
        self.currently_armed = armed;
        self.mission = mission;
        self.offboard = offboard;
    }

    /// Run one end-to-end planning cycle on the staged inputs.
    pub fn run_planner(&mut self) {
        self.stop_in_front_active = false;

        log::debug!(
            "planning cycle started, {} cameras staged",
            self.camera_clouds.len()
        );

        self.fov = calculate_fov(
            self.config.alpha_res,
            self.h_fov,
            self.v_fov,
            self.yaw,
            self.pitch,
        );
        self.histogram_box.set_limits(&self.position, self.ground_distance);
        self.filtered = filter_point_cloud(
            &self.camera_clouds,
            &self.histogram_box,
            &self.position,
            self.config.min_sensor_range,
            self.config.min_dist_backoff,
        );

        self.determine_strategy();
    }

    fn determine_strategy(&mut self) {
        self.star_planner.age_tree();

        let now = Instant::now();
        let dt = self
            .last_cycle_time
            .map(|t| (now - t).as_secs_f32())
            .unwrap_or(0.0);
        self.last_cycle_time = Some(now);

        if self.config.disable_rise_to_goal_altitude {
            self.reach_altitude = true;
        }

        if !self.reach_altitude {
            self.starting_height = (self.goal.z - 0.5).max(self.take_off_pose.z + 1.0);
            self.waypoint_type = WaypointType::ReachHeight;
            log::info!("climbing to starting height {:.2}", self.starting_height);

            if self.position.z > self.starting_height {
                self.reach_altitude = true;
                self.waypoint_type = WaypointType::Direct;
            }

            if self.config.send_obstacles_fcu {
                self.create_obstacle_representation(true);
            }
        } else if self.filtered.len() > self.config.min_cloud_size && self.config.stop_in_front {
            self.obstacle_ahead = true;
            log::info!("obstacle ahead, braking in front");
            self.stop_in_front_obstacles();
            self.waypoint_type = WaypointType::Direct;

            if self.config.send_obstacles_fcu {
                self.create_obstacle_representation(true);
            }
        } else if ((self.filtered.backoff_point_count > BACKOFF_POINT_THRESHOLD
            && self.filtered.len() > self.config.min_cloud_size)
            || self.back_off)
            && self.config.use_back_off
        {
            if !self.back_off {
                if let Some(closest) = self.filtered.closest_point {
                    self.back_off_point = closest;
                }
                self.back_off_start_point = self.position;
                self.back_off = true;
                log::info!(
                    "retreating from obstacle at [{:.2}, {:.2}, {:.2}]",
                    self.back_off_point.x,
                    self.back_off_point.y,
                    self.back_off_point.z
                );
            } else {
                let dist = (self.position - self.back_off_point).norm();
                if dist > self.config.min_dist_backoff + 1.0 {
                    self.back_off = false;
                }
            }
            self.waypoint_type = WaypointType::GoBack;

            if self.config.send_obstacles_fcu {
                self.create_obstacle_representation(true);
            }
        } else {
            self.evaluate_progress_rate(dt);
            self.create_obstacle_representation(self.config.send_obstacles_fcu);

            if self.hist_is_empty {
                self.obstacle_ahead = false;
                self.waypoint_type = WaypointType::TryPath;
            } else {
                self.obstacle_ahead = true;
                let only_yawed = self.velocity.norm() < ONLY_YAWED_SPEED;

                if self.config.use_vfh_star {
                    // Project the last chosen direction out at goal distance
                    // so the tree's smoothing reference has comparable range
                    let mut last_wp_pol =
                        cartesian_to_polar(&self.last_sent_waypoint, &self.position);
                    last_wp_pol.r = (self.position - self.goal).norm();
                    let last_direction = polar_to_cartesian(&last_wp_pol, &self.position);

                    let tree_ctx = TreeContext {
                        position: self.position,
                        yaw: self.yaw,
                        goal: self.goal,
                        cost_params: &self.cost_params,
                        fov: &self.fov,
                        cloud: &self.filtered.points,
                        reprojected: &self.reprojected_points,
                        last_direction,
                        only_yawed,
                    };
                    self.star_planner.build_lookahead_tree(&tree_ctx);
                    self.waypoint_type = WaypointType::TryPath;
                    self.last_path_time = Instant::now();
                } else {
                    let cost_ctx = CostContext {
                        histogram: &self.polar_histogram,
                        goal: self.goal,
                        position: self.position,
                        heading_deg: hist_heading_deg(self.yaw),
                        last_sent_waypoint: self.last_sent_waypoint,
                        only_yawed,
                        smoothing_margin_degrees: self.config.smoothing_margin_degrees,
                        keep_distance: self.config.keep_distance,
                    };
                    let cost_matrix = build_cost_matrix(&cost_ctx, &self.cost_params);
                    let candidates = best_candidates(&cost_matrix, 1);
                    if let Some(best) = candidates.first() {
                        self.costmap_direction_e = best.elevation_deg;
                        self.costmap_direction_z = best.azimuth_deg;
                        self.waypoint_type = WaypointType::Costmap;
                    } else {
                        log::warn!("all directions blocked, braking in front of obstacle");
                        self.stop_in_front_obstacles();
                        self.waypoint_type = WaypointType::Direct;
                        self.config.stop_in_front = true;
                    }
                }
            }

            self.first_brake = true;
        }

        self.position_old = self.position;
    }

    /// Rebuild the obstacle representation for this cycle: carry the
    /// previous histogram forward, propagate it at half resolution, build
    /// the fresh histogram and combine the two.
    fn create_obstacle_representation(&mut self, send_to_fcu: bool) {
        self.reprojected_points = reproject_histogram(
            &self.polar_histogram,
            &self.position_old,
            &self.position,
            self.config.box_radius,
            self.config.reproj_age_max,
        );

        let propagated = propagate_histogram(
            self.config.alpha_res,
            &self.position,
            &self.reprojected_points,
            self.config.reproj_age_max,
            self.config.box_radius,
        );
        let mut new_hist = generate_new_histogram(
            self.config.alpha_res,
            &self.position,
            &self.filtered.points,
            self.config.box_radius,
        );

        let waypoint_pol = cartesian_to_polar(&self.last_sent_waypoint, &self.position);
        let (wp_e, wp_z) = polar_to_histogram_index(&waypoint_pol, self.config.alpha_res);
        let waypoint_in_fov = self.fov.contains(wp_e, wp_z);

        self.hist_is_empty =
            combine_histograms(&mut new_hist, &propagated, &self.fov, waypoint_in_fov);

        if send_to_fcu {
            let compressed = compress_histogram_elevation(&new_hist);
            self.obstacle_distance = Some(obstacle_distance_sweep(&compressed, &self.fov));
        } else {
            self.obstacle_distance = None;
        }

        self.polar_histogram = new_hist;
    }

    /// Track the rate at which the vehicle closes on the goal and adapt
    /// the height-change weight: a stalled approach makes vertical
    /// maneuvers cheaper.
    fn evaluate_progress_rate(&mut self, dt: f32) {
        if self.reach_altitude && self.config.adapt_cost_params && dt > f32::EPSILON {
            let goal_dist = (self.position - self.goal).norm();
            let goal_dist_old = (self.position_old - self.goal).norm();
            let incline = (goal_dist - goal_dist_old) / dt;

            self.goal_dist_incline.push_back(incline);
            if self.goal_dist_incline.len() > self.config.dist_incline_window_size {
                self.goal_dist_incline.pop_front();
            }

            let avg_incline: f32 = self.goal_dist_incline.iter().sum::<f32>()
                / self.goal_dist_incline.len() as f32;

            if avg_incline > self.config.no_progress_slope
                && self.goal_dist_incline.len() == self.config.dist_incline_window_size
                && self.cost_params.height_change_cost_param_adapted > 0.75
            {
                self.cost_params.height_change_cost_param_adapted -= 0.02;
            }
            if avg_incline < self.config.no_progress_slope
                && self.cost_params.height_change_cost_param_adapted
                    < self.cost_params.height_change_cost_param - 0.03
            {
                self.cost_params.height_change_cost_param_adapted += 0.03;
            }
            self.cost_params.height_change_cost_param_adapted = self
                .cost_params
                .height_change_cost_param_adapted
                .clamp(0.75, self.cost_params.height_change_cost_param);

            log::debug!(
                "progress rate {:.3} m/s, adapted height change cost {:.2}",
                avg_incline,
                self.cost_params.height_change_cost_param_adapted
            );
        } else {
            self.cost_params.height_change_cost_param_adapted =
                self.cost_params.height_change_cost_param;
        }
    }

    /// Relocate the XY goal to a braking point ahead of the nearest
    /// obstacle, once per approach (latched until the strategy re-arms).
    fn stop_in_front_obstacles(&mut self) {
        if self.first_brake {
            let braking_distance =
                (self.filtered.distance_to_closest - self.config.keep_distance).abs();
            let to_goal = nalgebra::Vector2::new(
                self.goal.x - self.position.x,
                self.goal.y - self.position.y,
            );
            if to_goal.norm() > f32::EPSILON {
                let dir = to_goal / to_goal.norm();
                self.goal.x = self.position.x + braking_distance * dir.x;
                self.goal.y = self.position.y + braking_distance * dir.y;
            }
            self.first_brake = false;
            self.stop_in_front_active = true;
        }
        log::info!(
            "braking goal [{:.2}, {:.2}, {:.2}], obstacle distance {:.2}",
            self.goal.x,
            self.goal.y,
            self.goal.z,
            self.filtered.distance_to_closest
        );
    }

    /// Assemble the per-cycle output snapshot.
    pub fn output(&self) -> AvoidanceOutput {
        AvoidanceOutput {
            waypoint_type: self.waypoint_type,
            obstacle_ahead: self.obstacle_ahead,
            velocity_around_obstacles: self.config.velocity_around_obstacles,
            velocity_far_from_obstacles: self.config.velocity_far_from_obstacles,
            last_path_time: self.last_path_time,
            back_off_point: self.back_off_point,
            back_off_start_point: self.back_off_start_point,
            min_dist_backoff: self.config.min_dist_backoff,
            take_off_pose: self.take_off_pose,
            costmap_direction_e: self.costmap_direction_e,
            costmap_direction_z: self.costmap_direction_z,
            path_node_positions: self.star_planner.path_node_positions().to_vec(),
        }
    }

    /// Latest per-azimuth obstacle range sweep, when enabled.
    pub fn obstacle_distance(&self) -> Option<&[f32]> {
        self.obstacle_distance.as_deref()
    }

    /// Current goal (possibly rewritten by braking).
    pub fn goal(&self) -> Vector3<f32> {
        self.goal
    }

    /// Current vehicle position.
    pub fn position(&self) -> Vector3<f32> {
        self.position
    }

    /// Whether the initial climb has completed.
    pub fn reach_altitude(&self) -> bool {
        self.reach_altitude
    }

    /// Whether the braking goal rewrite happened this cycle.
    pub fn stop_in_front_active(&self) -> bool {
        self.stop_in_front_active
    }

    /// Whether the combined histogram was empty this cycle.
    pub fn hist_is_empty(&self) -> bool {
        self.hist_is_empty
    }

    /// Current cost weights (including the adapted height-change value).
    pub fn cost_params(&self) -> &CostParams {
        &self.cost_params
    }

    /// Active configuration.
    pub fn config(&self) -> &AvoidanceConfig {
        &self.config
    }

    /// Height the climb phase targets.
    pub fn starting_height(&self) -> f32 {
        self.starting_height
    }
}

fn star_config(config: &AvoidanceConfig) -> StarPlannerConfig {
    StarPlannerConfig {
        children_per_node: config.children_per_node,
        n_expanded_nodes: config.n_expanded_nodes,
        tree_node_distance: config.tree_node_distance,
        tree_reuse_age: config.tree_reuse_age,
        acceptance_radius: config.acceptance_radius,
        alpha_res: config.alpha_res,
        box_radius: config.box_radius,
        keep_distance: config.keep_distance,
        smoothing_margin_degrees: config.smoothing_margin_degrees,
    }
}

/// A direction chosen from the cost matrix, as polar angles (degrees).
/// Used by the waypoint smoother to reconstruct the commanded direction.
pub fn costmap_direction_to_cartesian(
    e_deg: f32,
    z_deg: f32,
    radius: f32,
    position: &Vector3<f32>,
) -> Vector3<f32> {
    polar_to_cartesian(&PolarPoint::new(e_deg, z_deg, radius), position)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn level_orientation() -> UnitQuaternion<f32> {
        UnitQuaternion::identity()
    }

    fn armed_planner(config: AvoidanceConfig) -> AvoidancePlanner {
        let mut planner = AvoidancePlanner::new(config).unwrap();
        planner.set_vehicle_state(true, true, false);
        planner
    }

    fn wall_cloud(x: f32, n: usize) -> Vec<Vector3<f32>> {
        // Points forming a plane at the given x, spanning y and z
        let mut cloud = Vec::with_capacity(n);
        let side = (n as f32).sqrt().ceil() as usize;
        for i in 0..side {
            for j in 0..side {
                if cloud.len() == n {
                    break;
                }
                let y = -2.0 + 4.0 * (i as f32) / (side.max(2) - 1) as f32;
                let z = 1.0 + 4.0 * (j as f32) / (side.max(2) - 1) as f32;
                cloud.push(Vector3::new(x, y, z));
            }
        }
        cloud
    }

    #[test]
    fn test_climb_phase_before_altitude_reached() {
        let mut planner = AvoidancePlanner::new(AvoidanceConfig::default()).unwrap();
        // Disarmed on the ground: take-off pose tracks the vehicle
        planner.set_pose(Vector3::new(0.0, 0.0, 0.5), &level_orientation());
        planner.set_vehicle_state(true, true, false);
        planner.set_goal(Vector3::new(0.0, 0.0, 5.0));
        planner.run_planner();

        let out = planner.output();
        assert_eq!(out.waypoint_type, WaypointType::ReachHeight);
        assert!(!planner.reach_altitude());
        assert_relative_eq!(planner.starting_height(), 4.5);

        // Above the starting height the climb hands over to direct flight
        planner.set_pose(Vector3::new(0.0, 0.0, 4.6), &level_orientation());
        planner.run_planner();
        assert_eq!(planner.output().waypoint_type, WaypointType::Direct);
        assert!(planner.reach_altitude());
    }

    #[test]
    fn test_climb_mode_stays_in_allowed_set() {
        let mut planner = AvoidancePlanner::new(AvoidanceConfig::default()).unwrap();
        planner.set_vehicle_state(true, true, false);
        planner.set_goal(Vector3::new(0.0, 0.0, 5.0));
        for z in [0.5, 1.0, 2.0, 3.0, 4.0, 4.8] {
            planner.set_pose(Vector3::new(0.0, 0.0, z), &level_orientation());
            planner.run_planner();
            if !planner.reach_altitude() {
                assert!(matches!(
                    planner.output().waypoint_type,
                    WaypointType::ReachHeight | WaypointType::Direct
                ));
            }
        }
    }

    #[test]
    fn test_free_flight_tries_path() {
        let mut planner = armed_planner(AvoidanceConfig::default());
        planner.set_pose(Vector3::new(0.0, 0.0, 3.0), &level_orientation());
        planner.set_velocity(Vector3::new(1.0, 0.0, 0.0));
        planner.set_goal(Vector3::new(10.0, 0.0, 3.0));
        // Waypoint ahead along the flight direction, inside the FOV
        planner.set_last_sent_waypoint(Vector3::new(1.0, 0.0, 3.0));
        planner.set_camera_clouds(vec![Vec::new()]);

        planner.run_planner(); // first cycle flips reach_altitude
        planner.run_planner();

        assert!(planner.reach_altitude());
        assert!(planner.hist_is_empty());
        let out = planner.output();
        assert_eq!(out.waypoint_type, WaypointType::TryPath);
        assert!(!out.obstacle_ahead);
    }

    #[test]
    fn test_wall_ahead_brakes_and_rewrites_goal() {
        let config = AvoidanceConfig {
            stop_in_front: true,
            keep_distance: 2.0,
            min_cloud_size: 160,
            ..AvoidanceConfig::default()
        };
        let mut planner = armed_planner(config);
        planner.set_pose(Vector3::new(0.0, 0.0, 3.0), &level_orientation());
        planner.set_velocity(Vector3::new(1.0, 0.0, 0.0));
        planner.set_goal(Vector3::new(10.0, 0.0, 3.0));
        planner.set_camera_clouds(vec![wall_cloud(3.0, 500)]);

        planner.run_planner(); // reach altitude handover
        planner.run_planner();

        let out = planner.output();
        assert_eq!(out.waypoint_type, WaypointType::Direct);
        assert!(out.obstacle_ahead);
        assert!(planner.stop_in_front_active());
        // Braking point at |closest - keep_distance| ahead
        let goal = planner.goal();
        assert!(goal.x > 0.0 && goal.x < 3.0, "braking goal x = {}", goal.x);
        assert_relative_eq!(goal.y, 0.0, epsilon = 1e-4);

        // The rewrite is latched: another cycle does not move the goal again
        let goal_before = planner.goal();
        planner.run_planner();
        assert_relative_eq!(planner.goal().x, goal_before.x, epsilon = 1e-5);
    }

    #[test]
    fn test_cloud_at_min_size_is_not_an_obstacle() {
        let config = AvoidanceConfig {
            stop_in_front: true,
            min_cloud_size: 200,
            ..AvoidanceConfig::default()
        };
        let mut planner = armed_planner(config);
        planner.set_pose(Vector3::new(0.0, 0.0, 3.0), &level_orientation());
        planner.set_goal(Vector3::new(10.0, 0.0, 3.0));
        planner.set_last_sent_waypoint(Vector3::new(1.0, 0.0, 3.0));
        // Exactly min_cloud_size points: strict inequality keeps this benign
        planner.set_camera_clouds(vec![wall_cloud(3.0, 200)]);

        planner.run_planner();
        planner.run_planner();
        assert_ne!(planner.output().waypoint_type, WaypointType::Direct);
    }

    #[test]
    fn test_back_off_entry_and_exit() {
        let config = AvoidanceConfig {
            use_back_off: true,
            stop_in_front: false,
            min_cloud_size: 100,
            min_dist_backoff: 1.0,
            ..AvoidanceConfig::default()
        };
        let mut planner = armed_planner(config);
        planner.set_pose(Vector3::new(0.0, 0.0, 3.0), &level_orientation());
        planner.set_goal(Vector3::new(10.0, 0.0, 3.0));
        planner.run_planner(); // altitude handover

        // Dense cluster just ahead: > 200 returns inside the back-off range
        let mut cloud = Vec::new();
        for i in 0..300 {
            let t = (i as f32) / 300.0;
            cloud.push(Vector3::new(0.6 + 0.2 * t, -0.1 + 0.2 * t, 3.0));
        }
        planner.set_camera_clouds(vec![cloud]);
        planner.run_planner();

        let out = planner.output();
        assert_eq!(out.waypoint_type, WaypointType::GoBack);
        assert!(out.back_off_point.x > 0.0);
        assert_relative_eq!(out.back_off_start_point.x, 0.0);

        // Still retreating while within the exit distance
        planner.set_camera_clouds(vec![Vec::new()]);
        planner.set_pose(Vector3::new(-1.0, 0.0, 3.0), &level_orientation());
        planner.run_planner();
        assert_eq!(planner.output().waypoint_type, WaypointType::GoBack);

        // Far enough from the captured point the retreat ends
        planner.set_pose(Vector3::new(-2.5, 0.0, 3.0), &level_orientation());
        planner.run_planner();
        assert_eq!(planner.output().waypoint_type, WaypointType::GoBack);
        planner.run_planner();
        assert_ne!(planner.output().waypoint_type, WaypointType::GoBack);
    }

    #[test]
    fn test_progress_rate_adaptation_bounds() {
        let mut planner = armed_planner(AvoidanceConfig {
            dist_incline_window_size: 5,
            ..AvoidanceConfig::default()
        });
        planner.set_pose(Vector3::new(0.0, 0.0, 3.0), &level_orientation());
        planner.set_goal(Vector3::new(10.0, 0.0, 3.0));
        planner.reach_altitude = true;

        // Moving away from the goal: vertical maneuvers get cheaper
        planner.position = Vector3::new(0.0, 0.0, 3.0);
        planner.position_old = Vector3::new(1.0, 0.0, 3.0);
        for _ in 0..400 {
            planner.evaluate_progress_rate(0.1);
        }
        assert_relative_eq!(
            planner.cost_params().height_change_cost_param_adapted,
            0.75,
            epsilon = 0.03
        );

        // Closing on the goal: the weight recovers up to its bound
        planner.position = Vector3::new(1.0, 0.0, 3.0);
        planner.position_old = Vector3::new(0.0, 0.0, 3.0);
        for _ in 0..400 {
            planner.evaluate_progress_rate(0.1);
        }
        let adapted = planner.cost_params().height_change_cost_param_adapted;
        let bound = planner.cost_params().height_change_cost_param;
        assert!(adapted <= bound && adapted >= bound - 0.04);
    }

    #[test]
    fn test_adapted_param_always_within_bounds() {
        let mut planner = armed_planner(AvoidanceConfig {
            dist_incline_window_size: 3,
            ..AvoidanceConfig::default()
        });
        planner.reach_altitude = true;
        planner.set_goal(Vector3::new(10.0, 0.0, 3.0));
        for i in 0..200 {
            // Alternate closing and retreating
            let x = if i % 2 == 0 { 0.0 } else { 2.0 };
            planner.position = Vector3::new(x, 0.0, 3.0);
            planner.position_old = Vector3::new(2.0 - x, 0.0, 3.0);
            planner.evaluate_progress_rate(0.05);
            let adapted = planner.cost_params().height_change_cost_param_adapted;
            assert!((0.75..=planner.cost_params().height_change_cost_param).contains(&adapted));
        }
    }

    #[test]
    fn test_costmap_mode_without_tree_search() {
        let config = AvoidanceConfig {
            use_vfh_star: false,
            ..AvoidanceConfig::default()
        };
        let mut planner = armed_planner(config);
        planner.set_pose(Vector3::new(0.0, 0.0, 3.0), &level_orientation());
        planner.set_velocity(Vector3::new(1.0, 0.0, 0.0));
        planner.set_goal(Vector3::new(10.0, 0.0, 3.0));
        // Wall beyond keep_distance: costly but feasible directions remain
        planner.set_camera_clouds(vec![wall_cloud(8.0, 300)]);

        planner.run_planner();
        planner.run_planner();

        let out = planner.output();
        assert_eq!(out.waypoint_type, WaypointType::Costmap);
        assert!(out.obstacle_ahead);
        assert!(out.costmap_direction_z.abs() <= 180.0);
        assert!(out.costmap_direction_e.abs() <= 90.0);
    }

    #[test]
    fn test_all_directions_blocked_falls_back_to_braking() {
        let config = AvoidanceConfig {
            use_vfh_star: false,
            stop_in_front: false,
            min_cloud_size: 100,
            ..AvoidanceConfig::default()
        };
        let mut planner = armed_planner(config);
        planner.set_pose(Vector3::new(0.0, 0.0, 3.0), &level_orientation());
        planner.set_goal(Vector3::new(10.0, 0.0, 3.0));
        planner.set_ground_distance(50.0);
        planner.run_planner(); // climb handover

        // A full sphere of returns inside keep_distance: every cell blocked
        let position = Vector3::new(0.0, 0.0, 3.0);
        let mut cloud = Vec::new();
        for e_idx in 0..30 {
            for z_idx in 0..60 {
                let center = PolarPoint::new(
                    (e_idx * 6) as f32 - 90.0 + 3.0,
                    (z_idx * 6) as f32 - 180.0 + 3.0,
                    3.0,
                );
                cloud.push(polar_to_cartesian(&center, &position));
            }
        }
        planner.set_camera_clouds(vec![cloud]);
        planner.run_planner();

        let out = planner.output();
        assert_eq!(out.waypoint_type, WaypointType::Direct);
        assert!(planner.stop_in_front_active());
        // The braking behavior latches on for subsequent cycles
        assert!(planner.config().stop_in_front);
        assert!(planner.goal().x < 10.0);
    }

    #[test]
    fn test_apply_config_is_idempotent() {
        let mut planner = AvoidancePlanner::new(AvoidanceConfig::default()).unwrap();
        let config = AvoidanceConfig {
            keep_distance: 4.0,
            goal_cost_param: 12.0,
            ..AvoidanceConfig::default()
        };
        planner.apply_config(config.clone()).unwrap();
        let params_once = planner.cost_params().clone();
        let goal_once = planner.goal();
        planner.apply_config(config).unwrap();
        assert_eq!(*planner.cost_params(), params_once);
        assert_eq!(planner.goal(), goal_once);
    }

    #[test]
    fn test_invalid_config_is_rejected_and_previous_kept() {
        let mut planner = AvoidancePlanner::new(AvoidanceConfig::default()).unwrap();
        let bad = AvoidanceConfig {
            alpha_res: 7,
            ..AvoidanceConfig::default()
        };
        assert!(planner.apply_config(bad).is_err());
        assert_eq!(planner.config().alpha_res, 6);
    }

    #[test]
    fn test_obstacle_sweep_emitted_when_enabled() {
        let config = AvoidanceConfig {
            send_obstacles_fcu: true,
            ..AvoidanceConfig::default()
        };
        let mut planner = armed_planner(config);
        planner.set_pose(Vector3::new(0.0, 0.0, 3.0), &level_orientation());
        planner.set_goal(Vector3::new(10.0, 0.0, 3.0));
        planner.set_camera_clouds(vec![wall_cloud(8.0, 300)]);
        planner.run_planner();
        planner.run_planner();

        let sweep = planner.obstacle_distance().expect("sweep enabled");
        assert_eq!(sweep.len(), 360 / planner.config().alpha_res);
        for &r in sweep {
            assert!((0.0..=21.0).contains(&r) || r == u16::MAX as f32);
        }
    }
}
