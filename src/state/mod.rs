//! Cross-thread state shared between transport callbacks and the planner
//! thread.

pub mod staging;

pub use staging::{create_shared, CameraFrame, CycleInput, PlannerShared, SharedHandle, StagedInput};
