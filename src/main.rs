//! GarudaNav daemon demo.
//!
//! Runs the avoidance core against a simulated transport: a synthetic
//! depth camera observing a wall between the vehicle and the goal, staged
//! at sensor rate. Useful for exercising the full planning loop without
//! a vehicle.
//!
//! ```bash
//! # Default scenario
//! cargo run --release
//!
//! # Custom config and goal
//! cargo run --release -- --config garuda-nav.toml --goal-x 15 --cycles 100
//! ```

use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Parser;
use nalgebra::{UnitQuaternion, Vector3};
use rand::Rng;

use garuda_nav::state::create_shared;
use garuda_nav::threads::{check_failsafe, FailsafeState, PlannerThread};
use garuda_nav::{AvoidanceConfig, WaypointType};

#[derive(Parser, Debug)]
#[command(name = "garuda-nav", about = "Reactive local avoidance core demo")]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Goal X coordinate (meters).
    #[arg(long, default_value_t = 15.0)]
    goal_x: f32,

    /// Goal Y coordinate (meters).
    #[arg(long, default_value_t = 0.0)]
    goal_y: f32,

    /// Goal altitude (meters).
    #[arg(long, default_value_t = 3.5)]
    goal_z: f32,

    /// Number of planning cycles to simulate.
    #[arg(long, default_value_t = 60)]
    cycles: usize,

    /// X position of the simulated wall (meters).
    #[arg(long, default_value_t = 8.0)]
    wall_x: f32,
}

/// Synthetic depth camera: returns points on a wall plane ahead of the
/// vehicle, with a little range noise.
fn simulate_cloud(position: &Vector3<f32>, wall_x: f32) -> Vec<Vector3<f32>> {
    let mut rng = rand::thread_rng();
    let mut cloud = Vec::new();
    if position.x > wall_x {
        return cloud;
    }
    for i in 0..40 {
        for j in 0..20 {
            let y = -4.0 + 8.0 * (i as f32) / 39.0;
            let z = 0.5 + 6.0 * (j as f32) / 19.0;
            // Gap around y in [-1, 1] to fly through
            if y.abs() < 1.0 {
                continue;
            }
            let noise: f32 = rng.gen_range(-0.02..0.02);
            cloud.push(Vector3::new(wall_x + noise, y, z));
        }
    }
    cloud
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => match AvoidanceConfig::load(path) {
            Ok(c) => c,
            Err(e) => {
                log::error!("failed to load config: {}", e);
                std::process::exit(1);
            }
        },
        None => AvoidanceConfig::default(),
    };
    config.goal_z = args.goal_z;

    let timeout_critical = config.timeout_critical;
    let timeout_termination = config.timeout_termination;

    let shared = create_shared(1);
    let (output_tx, output_rx) = crossbeam_channel::unbounded();
    let planner = match PlannerThread::spawn(config, shared.clone(), output_tx) {
        Ok(p) => p,
        Err(e) => {
            log::error!("failed to start planner: {}", e);
            std::process::exit(1);
        }
    };

    let goal = Vector3::new(args.goal_x, args.goal_y, args.goal_z);
    shared.stage_goal(goal);
    shared.stage_vehicle_state(true, true, false);
    shared.stage_ground_distance(2.0);

    let start = Instant::now();
    let mut position = Vector3::new(0.0, 0.0, 3.0);
    let mut velocity = Vector3::zeros();

    for cycle in 0..args.cycles {
        shared.stage_pose(position, UnitQuaternion::identity());
        shared.stage_velocity(velocity);
        shared.stage_last_sent_waypoint(position + velocity);
        shared.stage_cloud(0, simulate_cloud(&position, args.wall_x));

        let output = match output_rx.recv_timeout(Duration::from_secs(2)) {
            Ok(o) => o,
            Err(_) => {
                log::error!("planner produced no output");
                break;
            }
        };

        log::info!(
            "cycle {:3}: mode {:?}, obstacle {}, pos [{:.1} {:.1} {:.1}]",
            cycle,
            output.waypoint_type,
            output.obstacle_ahead,
            position.x,
            position.y,
            position.z
        );

        // Crude vehicle model: follow the chosen direction at cruise speed
        let speed = if output.obstacle_ahead {
            output.velocity_around_obstacles
        } else {
            output.velocity_far_from_obstacles
        };
        let target = match output.waypoint_type {
            WaypointType::TryPath if output.path_node_positions.len() > 1 => {
                output.path_node_positions[1]
            }
            WaypointType::ReachHeight => Vector3::new(position.x, position.y, position.z + 2.0),
            WaypointType::GoBack => output.back_off_start_point,
            _ => goal,
        };
        let to_target = target - position;
        if to_target.norm() > 1e-3 {
            velocity = to_target / to_target.norm() * speed;
            position += velocity * 0.1;
        }

        if let Some(age) = shared.since_last_cloud() {
            match check_failsafe(age, start.elapsed(), timeout_critical, timeout_termination) {
                FailsafeState::Healthy => {}
                state => log::warn!("watchdog: {:?}", state),
            }
        }

        if (position - goal).norm() < 1.0 {
            log::info!("goal reached after {} cycles", cycle + 1);
            break;
        }
    }

    shared.shutdown();
    planner.join().expect("planner thread panicked");
}
