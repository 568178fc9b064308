//! GarudaNav - Reactive local obstacle avoidance for autonomous
//! multirotors.
//!
//! Given the vehicle pose, velocity, fused depth-camera clouds and a goal,
//! the core continuously selects a short-horizon obstacle-free direction
//! for a downstream waypoint smoother: a polar obstacle histogram with
//! one-cycle memory, a best-first lookahead tree over candidate headings,
//! and a mode-selecting strategy loop.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                   threads/                          │  ← Planner worker, watchdog
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                    state/                           │  ← Staging handoff
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                   engine/                           │  ← Strategy, config, output
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                 algorithms/                         │  ← Histogram, FOV, cost, tree
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                  sensors/                           │  ← Cloud filtering
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                    core/                            │  ← Types, geometry kernel
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! Per cycle: transport stages pose, velocity and clouds → the planner
//! thread copies them under the staging lock → the cloud is cropped to
//! the histogram box → the strategy picks a mode → the histogram is
//! built, propagated from the previous cycle's reprojected observations
//! and combined → directions are scored and, when enabled, the lookahead
//! tree is grown → an [`AvoidanceOutput`] snapshot is published.

// Layer 1: Core foundation (no internal deps)
pub mod core;

// Layer 2: Sensor processing (depends on core)
pub mod sensors;

// Layer 3: Algorithms (depends on core, sensors)
pub mod algorithms;

// Layer 4: Engine orchestration (depends on core, sensors, algorithms)
pub mod engine;

// Layer 5: Cross-thread state
pub mod state;

// Layer 6: Thread infrastructure
pub mod threads;

pub mod error;

// Convenience re-exports (flat namespace for common use)
pub use algorithms::{
    CandidateCell, CostMatrix, CostParams, FieldOfView, Histogram, StarPlanner,
    StarPlannerConfig, TreeNode,
};
pub use crate::core::math;
pub use crate::core::types::{AgedPoint, HistogramBox, PolarPoint};
pub use engine::{AvoidanceConfig, AvoidanceOutput, AvoidancePlanner, WaypointType};
pub use error::{AvoidanceError, Result};
pub use sensors::{filter_point_cloud, FilteredCloud};
pub use state::{create_shared, PlannerShared, SharedHandle};
pub use threads::{check_failsafe, FailsafeState, PlannerThread};
