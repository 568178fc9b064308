//! Arena node for the lookahead tree.

use nalgebra::Vector3;

/// A node of the lookahead tree, linked by arena index.
///
/// The root is its own parent; for every other node the parent index is
/// strictly smaller than the node's own index.
#[derive(Debug, Clone)]
pub struct TreeNode {
    /// Position of the node in the local frame.
    pub position: Vector3<f32>,
    /// Heading the vehicle would have at this node (radians).
    pub yaw_heading: f32,
    /// Accumulated cost from the root.
    pub total_cost: f32,
    /// Estimated remaining cost to the goal.
    pub heuristic: f32,
    /// Depth below the root (root is 0).
    pub depth: u32,
    /// Arena index of the parent node.
    pub parent: usize,
}

impl TreeNode {
    /// Create the root node at the vehicle position.
    pub fn root(position: Vector3<f32>, yaw: f32) -> Self {
        Self {
            position,
            yaw_heading: yaw,
            total_cost: 0.0,
            heuristic: 0.0,
            depth: 0,
            parent: 0,
        }
    }
}
