//! Cross-thread staging state.
//!
//! Transport callbacks write the latest pose, velocity, per-camera clouds
//! and flags into the staging area; the planner thread copies them out at
//! the start of each cycle. The staging mutex, the readiness flag and its
//! condition variable are the only synchronization between the two sides.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use nalgebra::{UnitQuaternion, Vector3};
use parking_lot::{Condvar, Mutex};

use crate::engine::config::AvoidanceConfig;
use crate::engine::output::AvoidanceOutput;

/// Ground distance assumed when the range reading is stale (meters).
const GROUND_DISTANCE_FALLBACK: f32 = 2.0;
/// Readings older than this no longer describe the ground (seconds).
const GROUND_DISTANCE_MAX_AGE: Duration = Duration::from_millis(500);

/// One camera's staged cloud and freshness mark.
#[derive(Debug, Clone, Default)]
pub struct CameraFrame {
    /// Latest cloud in the local frame (NaN padding removed by transport).
    pub cloud: Vec<Vector3<f32>>,
    /// Whether a new cloud arrived since the last planning cycle.
    pub fresh: bool,
}

/// Staged inputs written by transport callbacks.
#[derive(Debug, Clone)]
pub struct StagedInput {
    pub position: Vector3<f32>,
    pub orientation: UnitQuaternion<f32>,
    pub velocity: Vector3<f32>,
    pub cameras: Vec<CameraFrame>,
    /// Pending goal override, consumed by the next cycle.
    pub goal: Option<Vector3<f32>>,
    /// Latest ground range reading and its arrival time.
    pub ground_distance: Option<(f32, Instant)>,
    pub armed: bool,
    pub mission: bool,
    pub offboard: bool,
    pub last_sent_waypoint: Vector3<f32>,
    /// Arrival time of the most recent cloud from any camera.
    pub last_cloud_time: Option<Instant>,
}

impl StagedInput {
    fn new(n_cameras: usize) -> Self {
        Self {
            position: Vector3::zeros(),
            orientation: UnitQuaternion::identity(),
            velocity: Vector3::zeros(),
            cameras: vec![CameraFrame::default(); n_cameras],
            goal: None,
            ground_distance: None,
            armed: false,
            mission: false,
            offboard: false,
            last_sent_waypoint: Vector3::zeros(),
            last_cloud_time: None,
        }
    }
}

/// Everything the planner thread needs for one cycle, copied out of
/// staging under the lock.
#[derive(Debug, Clone)]
pub struct CycleInput {
    pub position: Vector3<f32>,
    pub orientation: UnitQuaternion<f32>,
    pub velocity: Vector3<f32>,
    pub clouds: Vec<Vec<Vector3<f32>>>,
    pub goal: Option<Vector3<f32>>,
    /// Resolved ground distance (fallback applied when stale).
    pub ground_distance: f32,
    pub armed: bool,
    pub mission: bool,
    pub offboard: bool,
    pub last_sent_waypoint: Vector3<f32>,
    /// Configuration to apply before this cycle, if one is pending.
    pub pending_config: Option<AvoidanceConfig>,
}

struct Staging {
    input: StagedInput,
    data_ready: bool,
    pending_config: Option<AvoidanceConfig>,
}

/// State shared between the transport side and the planner thread.
pub struct PlannerShared {
    staging: Mutex<Staging>,
    data_ready_cv: Condvar,
    should_exit: AtomicBool,
    latest_output: Mutex<Option<AvoidanceOutput>>,
}

/// Handle type for the shared state.
pub type SharedHandle = Arc<PlannerShared>;

/// Create shared state for the given camera count.
pub fn create_shared(n_cameras: usize) -> SharedHandle {
    Arc::new(PlannerShared::new(n_cameras))
}

impl PlannerShared {
    /// Create staging state for the given camera count.
    pub fn new(n_cameras: usize) -> Self {
        Self {
            staging: Mutex::new(Staging {
                input: StagedInput::new(n_cameras),
                data_ready: false,
                pending_config: None,
            }),
            data_ready_cv: Condvar::new(),
            should_exit: AtomicBool::new(false),
            latest_output: Mutex::new(None),
        }
    }

    /// Stage the latest vehicle pose.
    pub fn stage_pose(&self, position: Vector3<f32>, orientation: UnitQuaternion<f32>) {
        let mut staging = self.staging.lock();
        staging.input.position = position;
        staging.input.orientation = orientation;
    }

    /// Stage the latest linear velocity.
    pub fn stage_velocity(&self, velocity: Vector3<f32>) {
        self.staging.lock().input.velocity = velocity;
    }

    /// Stage a fresh cloud for one camera. When every camera has delivered
    /// since the last cycle the planner is woken.
    pub fn stage_cloud(&self, camera_index: usize, cloud: Vec<Vector3<f32>>) {
        let mut staging = self.staging.lock();
        let Some(frame) = staging.input.cameras.get_mut(camera_index) else {
            log::warn!("cloud for unknown camera index {}", camera_index);
            return;
        };
        frame.cloud = cloud;
        frame.fresh = true;
        staging.input.last_cloud_time = Some(Instant::now());

        if staging.input.cameras.iter().all(|c| c.fresh) {
            staging.data_ready = true;
            self.data_ready_cv.notify_one();
        }
    }

    /// Stage a goal override for the next cycle.
    pub fn stage_goal(&self, goal: Vector3<f32>) {
        self.staging.lock().input.goal = Some(goal);
    }

    /// Stage a ground range reading.
    pub fn stage_ground_distance(&self, distance: f32) {
        if !distance.is_finite() {
            return;
        }
        self.staging.lock().input.ground_distance = Some((distance, Instant::now()));
    }

    /// Stage the vehicle arming and mode flags.
    pub fn stage_vehicle_state(&self, armed: bool, mission: bool, offboard: bool) {
        let mut staging = self.staging.lock();
        staging.input.armed = armed;
        staging.input.mission = mission;
        staging.input.offboard = offboard;
    }

    /// Stage the last waypoint sent to the flight controller.
    pub fn stage_last_sent_waypoint(&self, waypoint: Vector3<f32>) {
        self.staging.lock().input.last_sent_waypoint = waypoint;
    }

    /// Queue a configuration to be applied at the next cycle boundary.
    pub fn stage_config(&self, config: AvoidanceConfig) {
        self.staging.lock().pending_config = Some(config);
    }

    /// Age of the most recent cloud from any camera.
    pub fn since_last_cloud(&self) -> Option<Duration> {
        self.staging
            .lock()
            .input
            .last_cloud_time
            .map(|t| t.elapsed())
    }

    /// Request planner shutdown and wake the thread.
    pub fn shutdown(&self) {
        self.should_exit.store(true, Ordering::Release);
        self.data_ready_cv.notify_all();
    }

    /// Whether shutdown was requested.
    pub fn should_exit(&self) -> bool {
        self.should_exit.load(Ordering::Acquire)
    }

    /// Block until fresh inputs are staged, then copy them out.
    ///
    /// Marks all cameras not-fresh and clears the readiness flag and the
    /// goal override under the same lock, so each staged goal and cloud
    /// set feeds exactly one cycle. Returns `None` on shutdown.
    pub fn wait_for_cycle(&self) -> Option<CycleInput> {
        let mut staging = self.staging.lock();
        while !staging.data_ready && !self.should_exit() {
            self.data_ready_cv.wait(&mut staging);
        }
        if self.should_exit() {
            return None;
        }

        staging.data_ready = false;
        let clouds = staging
            .input
            .cameras
            .iter_mut()
            .map(|c| {
                c.fresh = false;
                c.cloud.clone()
            })
            .collect();

        let ground_distance = match staging.input.ground_distance {
            Some((d, at)) if at.elapsed() < GROUND_DISTANCE_MAX_AGE => d,
            _ => GROUND_DISTANCE_FALLBACK,
        };

        Some(CycleInput {
            position: staging.input.position,
            orientation: staging.input.orientation,
            velocity: staging.input.velocity,
            clouds,
            goal: staging.input.goal.take(),
            ground_distance,
            armed: staging.input.armed,
            mission: staging.input.mission,
            offboard: staging.input.offboard,
            last_sent_waypoint: staging.input.last_sent_waypoint,
            pending_config: staging.pending_config.take(),
        })
    }

    /// Non-blocking probe used by tests and the transport side.
    pub fn try_take_cycle(&self) -> Option<CycleInput> {
        let ready = { self.staging.lock().data_ready };
        if ready {
            self.wait_for_cycle()
        } else {
            None
        }
    }

    /// Publish the latest output snapshot.
    pub fn set_latest_output(&self, output: AvoidanceOutput) {
        *self.latest_output.lock() = Some(output);
    }

    /// Read the latest output snapshot.
    pub fn latest_output(&self) -> Option<AvoidanceOutput> {
        self.latest_output.lock().clone()
    }
}
