//! Orchestration layer: the strategy controller, its configuration and
//! the per-cycle output contract.

pub mod config;
pub mod output;
pub mod planner;

pub use config::AvoidanceConfig;
pub use output::{AvoidanceOutput, WaypointType};
pub use planner::AvoidancePlanner;
