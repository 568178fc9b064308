//! Planner thread.
//!
//! A dedicated worker that blocks on the staging condition variable,
//! copies the staged inputs, runs one uninterrupted planning cycle and
//! publishes the output snapshot. Outputs are produced in strict cycle
//! order; configuration changes apply at cycle boundaries only.

use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;

use crate::engine::config::AvoidanceConfig;
use crate::engine::output::AvoidanceOutput;
use crate::engine::planner::AvoidancePlanner;
use crate::error::Result;
use crate::state::staging::SharedHandle;

/// Handle to the running planner thread.
pub struct PlannerThread {
    handle: JoinHandle<()>,
}

impl PlannerThread {
    /// Spawn the planner thread.
    ///
    /// The planner is constructed here so an invalid initial configuration
    /// fails before any thread exists. Each cycle's output is stored as
    /// the latest snapshot and sent on `output_tx`; the thread exits when
    /// shutdown is requested or every receiver is gone.
    pub fn spawn(
        config: AvoidanceConfig,
        shared: SharedHandle,
        output_tx: Sender<AvoidanceOutput>,
    ) -> Result<Self> {
        let mut planner = AvoidancePlanner::new(config)?;

        let handle = thread::Builder::new()
            .name("avoidance-planner".into())
            .spawn(move || {
                log::info!("planner thread started");
                while let Some(cycle) = shared.wait_for_cycle() {
                    if let Some(config) = cycle.pending_config {
                        if let Err(e) = planner.apply_config(config) {
                            log::warn!("rejected configuration: {}", e);
                        }
                    }

                    planner.set_vehicle_state(cycle.armed, cycle.mission, cycle.offboard);
                    planner.set_pose(cycle.position, &cycle.orientation);
                    planner.set_velocity(cycle.velocity);
                    planner.set_camera_clouds(cycle.clouds);
                    planner.set_ground_distance(cycle.ground_distance);
                    planner.set_last_sent_waypoint(cycle.last_sent_waypoint);
                    if let Some(goal) = cycle.goal {
                        planner.set_goal(goal);
                    }

                    planner.run_planner();

                    let output = planner.output();
                    shared.set_latest_output(output.clone());
                    if output_tx.send(output).is_err() {
                        log::info!("output receiver dropped, stopping planner thread");
                        break;
                    }
                }
                log::info!("planner thread exiting");
            })
            .expect("failed to spawn planner thread");

        Ok(Self { handle })
    }

    /// Wait for the thread to finish.
    pub fn join(self) -> thread::Result<()> {
        self.handle.join()
    }
}
