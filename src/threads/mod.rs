//! Thread infrastructure: the planner worker and the data watchdog.

pub mod planner_thread;
pub mod watchdog;

pub use planner_thread::PlannerThread;
pub use watchdog::{check_failsafe, FailsafeState};
