//! Core algorithms: obstacle histogram, field of view, direction costs and
//! the lookahead tree search.

pub mod cost;
pub mod fov;
pub mod histogram;
pub mod star_planner;
pub mod tree_node;

pub use cost::{best_candidates, build_cost_matrix, CandidateCell, CostMatrix, CostParams};
pub use fov::{calculate_fov, FieldOfView};
pub use histogram::Histogram;
pub use star_planner::{StarPlanner, StarPlannerConfig, TreeContext};
pub use tree_node::TreeNode;
