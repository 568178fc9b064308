//! End-to-end scenarios for the avoidance core.
//!
//! Each test drives the planner through full cycles the way the transport
//! layer would: stage inputs, run, inspect the output snapshot.

use approx::assert_relative_eq;
use nalgebra::{UnitQuaternion, Vector3};

use garuda_nav::state::create_shared;
use garuda_nav::threads::{check_failsafe, FailsafeState, PlannerThread};
use garuda_nav::{AvoidanceConfig, AvoidancePlanner, WaypointType};

fn level() -> UnitQuaternion<f32> {
    UnitQuaternion::identity()
}

/// Points forming a wall plane at the given x, covering the y/z extent.
fn wall(x: f32, y_range: (f32, f32), z_range: (f32, f32), n: usize) -> Vec<Vector3<f32>> {
    let side = (n as f32).sqrt().ceil() as usize;
    let mut cloud = Vec::with_capacity(n);
    for i in 0..side {
        for j in 0..side {
            if cloud.len() == n {
                break;
            }
            let y = y_range.0 + (y_range.1 - y_range.0) * (i as f32) / (side - 1).max(1) as f32;
            let z = z_range.0 + (z_range.1 - z_range.0) * (j as f32) / (side - 1).max(1) as f32;
            cloud.push(Vector3::new(x, y, z));
        }
    }
    cloud
}

#[test]
fn free_flight_to_goal() {
    let mut planner = AvoidancePlanner::new(AvoidanceConfig::default()).unwrap();
    planner.set_vehicle_state(true, true, false);
    planner.set_pose(Vector3::new(0.0, 0.0, 3.0), &level());
    planner.set_velocity(Vector3::new(1.0, 0.0, 0.0));
    planner.set_goal(Vector3::new(10.0, 0.0, 3.0));
    planner.set_last_sent_waypoint(Vector3::new(1.0, 0.0, 3.0));
    planner.set_camera_clouds(vec![Vec::new()]);

    planner.run_planner();
    assert!(planner.reach_altitude(), "first cycle should clear the climb");

    for _ in 0..5 {
        planner.run_planner();
        let out = planner.output();
        assert_eq!(out.waypoint_type, WaypointType::TryPath);
        assert!(!out.obstacle_ahead);
    }
}

#[test]
fn takeoff_climb_then_direct() {
    let mut planner = AvoidancePlanner::new(AvoidanceConfig::default()).unwrap();

    // Disarmed on the ground: the take-off pose follows the vehicle
    planner.set_pose(Vector3::new(0.0, 0.0, 0.5), &level());
    planner.set_vehicle_state(true, true, false);
    planner.set_goal(Vector3::new(0.0, 0.0, 5.0));

    let mut z = 0.5;
    let mut reached_direct = false;
    for _ in 0..30 {
        planner.set_pose(Vector3::new(0.0, 0.0, z), &level());
        planner.run_planner();
        let out = planner.output();
        if z <= 4.5 {
            assert_eq!(out.waypoint_type, WaypointType::ReachHeight);
        } else if out.waypoint_type == WaypointType::Direct {
            reached_direct = true;
            break;
        }
        z += 0.3;
    }
    assert!(reached_direct, "climb never handed over to direct flight");
    assert_relative_eq!(planner.output().take_off_pose.z, 0.5);
}

#[test]
fn wall_ahead_stop_in_front() {
    let config = AvoidanceConfig {
        stop_in_front: true,
        keep_distance: 2.0,
        ..AvoidanceConfig::default()
    };
    let mut planner = AvoidancePlanner::new(config).unwrap();
    planner.set_vehicle_state(true, true, false);
    planner.set_pose(Vector3::new(0.0, 0.0, 3.0), &level());
    planner.set_velocity(Vector3::new(1.0, 0.0, 0.0));
    planner.set_goal(Vector3::new(10.0, 0.0, 3.0));
    planner.set_camera_clouds(vec![wall(3.0, (-2.0, 2.0), (1.0, 5.0), 500)]);

    planner.run_planner(); // climb handover
    planner.run_planner();

    let out = planner.output();
    assert_eq!(out.waypoint_type, WaypointType::Direct);
    assert!(out.obstacle_ahead);

    // Braking goal placed |closest - keep_distance| ahead of the vehicle,
    // on the line toward the original goal
    let goal = planner.goal();
    assert_relative_eq!(goal.x, 1.0, epsilon = 0.2);
    assert_relative_eq!(goal.y, 0.0, epsilon = 1e-3);
    assert_relative_eq!(goal.z, 3.0, epsilon = 1e-5);
}

#[test]
fn narrow_gap_tree_path() {
    let config = AvoidanceConfig {
        keep_distance: 2.0,
        use_vfh_star: true,
        ..AvoidanceConfig::default()
    };
    let mut planner = AvoidancePlanner::new(config).unwrap();
    planner.set_vehicle_state(true, true, false);
    planner.set_pose(Vector3::new(0.0, 0.0, 3.0), &level());
    planner.set_velocity(Vector3::new(1.0, 0.0, 0.0));
    planner.set_goal(Vector3::new(10.0, 0.0, 3.0));
    planner.set_last_sent_waypoint(Vector3::new(1.0, 0.0, 3.0));

    // Two walls at x = 4 with a gap around y = 0
    let mut cloud = wall(4.0, (1.0, 5.0), (1.0, 5.0), 400);
    cloud.extend(wall(4.0, (-5.0, -1.0), (1.0, 5.0), 400));
    planner.set_camera_clouds(vec![cloud]);

    planner.run_planner(); // climb handover
    planner.run_planner();

    let out = planner.output();
    assert_eq!(out.waypoint_type, WaypointType::TryPath);
    assert!(out.obstacle_ahead);
    assert!(out.path_node_positions.len() > 1);
    assert_eq!(out.path_node_positions[0], planner.position());
    assert!(
        out.path_node_positions.iter().skip(1).any(|p| p.y.abs() < 1.0),
        "path should thread the gap: {:?}",
        out.path_node_positions
    );
}

#[test]
fn back_off_until_clear_of_capture_point() {
    let config = AvoidanceConfig {
        use_back_off: true,
        min_cloud_size: 100,
        min_dist_backoff: 1.0,
        ..AvoidanceConfig::default()
    };
    let mut planner = AvoidancePlanner::new(config).unwrap();
    planner.set_vehicle_state(true, true, false);
    planner.set_pose(Vector3::new(0.0, 0.0, 3.0), &level());
    planner.set_goal(Vector3::new(10.0, 0.0, 3.0));
    planner.run_planner(); // climb handover

    // Dense cluster of close returns
    let mut cloud = Vec::new();
    for i in 0..250 {
        let t = (i as f32) / 250.0;
        cloud.push(Vector3::new(0.5 + 0.3 * t, -0.15 + 0.3 * t, 3.0));
    }
    planner.set_camera_clouds(vec![cloud]);
    planner.run_planner();

    let out = planner.output();
    assert_eq!(out.waypoint_type, WaypointType::GoBack);
    let capture = out.back_off_point;

    // Retreat persists until the vehicle clears the capture point by the
    // back-off distance plus one meter
    planner.set_camera_clouds(vec![Vec::new()]);
    planner.set_pose(Vector3::new(-1.5, 0.0, 3.0), &level());
    planner.run_planner();
    assert_eq!(planner.output().waypoint_type, WaypointType::GoBack);

    planner.set_pose(Vector3::new(-2.6, 0.0, 3.0), &level());
    planner.run_planner(); // exits the retreat, mode still GoBack this cycle
    planner.run_planner();
    assert_ne!(planner.output().waypoint_type, WaypointType::GoBack);
    assert!((Vector3::new(-2.6, 0.0, 3.0) - capture).norm() > 2.0);
}

#[test]
fn stale_cloud_watchdog_escalation() {
    let shared = create_shared(1);
    let (tx, rx) = crossbeam_channel::unbounded();
    let config = AvoidanceConfig {
        timeout_critical: 0.2,
        timeout_termination: 30.0,
        ..AvoidanceConfig::default()
    };
    let timeout_critical = config.timeout_critical;
    let timeout_termination = config.timeout_termination;
    let thread = PlannerThread::spawn(config, shared.clone(), tx).unwrap();

    let start = std::time::Instant::now();
    shared.stage_vehicle_state(true, true, false);
    shared.stage_pose(Vector3::new(0.0, 0.0, 3.0), UnitQuaternion::identity());
    shared.stage_cloud(0, Vec::new());

    let first = rx
        .recv_timeout(std::time::Duration::from_secs(5))
        .expect("first cycle");

    // No new cloud: no further cycles run and the last output stays valid
    assert!(rx
        .recv_timeout(std::time::Duration::from_millis(400))
        .is_err());
    let latest = shared.latest_output().expect("snapshot kept");
    assert_eq!(latest.waypoint_type, first.waypoint_type);

    // The watchdog escalates once the data is stale past the critical bound
    std::thread::sleep(std::time::Duration::from_millis(300));
    let age = shared.since_last_cloud().expect("cloud was staged");
    let state = check_failsafe(age, start.elapsed(), timeout_critical, timeout_termination);
    assert_eq!(state, FailsafeState::Critical);

    shared.shutdown();
    thread.join().unwrap();
}

#[test]
fn obstacle_sweep_wire_contract() {
    let config = AvoidanceConfig {
        send_obstacles_fcu: true,
        ..AvoidanceConfig::default()
    };
    let alpha_res = config.alpha_res;
    let mut planner = AvoidancePlanner::new(config).unwrap();
    planner.set_vehicle_state(true, true, false);
    planner.set_pose(Vector3::new(0.0, 0.0, 3.0), &level());
    planner.set_goal(Vector3::new(10.0, 0.0, 3.0));
    planner.set_camera_clouds(vec![wall(8.0, (-3.0, 3.0), (1.0, 5.0), 300)]);

    planner.run_planner();
    planner.run_planner();

    let sweep = planner.obstacle_distance().expect("sweep enabled");
    assert_eq!(sweep.len(), 360 / alpha_res);

    // The wall sits ahead (histogram azimuth 90); on the wire it appears
    // rotated 180 degrees
    let n = sweep.len();
    let ahead_idx = (90 + 180) / alpha_res % n;
    let rotated_idx = (ahead_idx + n / 2) % n;
    assert!(
        sweep[rotated_idx] > 7.0 && sweep[rotated_idx] < 9.0,
        "wall range missing on rotated index: {}",
        sweep[rotated_idx]
    );
    // Azimuths behind the camera are unobservable
    assert_eq!(sweep[ahead_idx], u16::MAX as f32);
}

#[test]
fn goal_update_mid_flight_redirects_tree() {
    let mut planner = AvoidancePlanner::new(AvoidanceConfig::default()).unwrap();
    planner.set_vehicle_state(true, true, false);
    planner.set_pose(Vector3::new(0.0, 0.0, 3.0), &level());
    planner.set_velocity(Vector3::new(1.0, 0.0, 0.0));
    planner.set_goal(Vector3::new(10.0, 0.0, 3.0));
    // A small obstacle so the tree actually builds
    planner.set_camera_clouds(vec![wall(8.0, (-1.0, 1.0), (2.0, 4.0), 300)]);

    planner.run_planner();
    planner.run_planner();
    let out = planner.output();
    assert_eq!(out.waypoint_type, WaypointType::TryPath);
    assert!(out.path_node_positions.len() > 1);
    assert!(out.path_node_positions[1].x > 0.0);

    // Goal flipped behind the vehicle: next cycle rebuilds toward it
    planner.set_goal(Vector3::new(-10.0, 0.0, 3.0));
    planner.run_planner();
    let out = planner.output();
    assert!(out.path_node_positions.len() > 1);
    assert!(
        out.path_node_positions[1].x < 0.0,
        "tree should follow the new goal: {:?}",
        out.path_node_positions
    );
}
