//! Lookahead tree search over histogram directions.
//!
//! Expands candidate headings best-first through per-node obstacle
//! histograms, accumulating direction cost plus a goal-distance heuristic,
//! and extracts the cheapest path for the strategy layer to follow.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use nalgebra::Vector3;

use crate::core::math::{hist_heading_deg, polar_to_cartesian};
use crate::core::types::{AgedPoint, PolarPoint};

use super::cost::{best_candidates, build_cost_matrix, CostContext, CostParams};
use super::fov::FieldOfView;
use super::histogram::generate_new_histogram;
use super::tree_node::TreeNode;

/// Per-edge cost added during expansion, decayed with depth so early
/// heading changes dominate the accumulated cost.
const TREE_STEP_COST: f32 = 5.0;
const TREE_DISCOUNT_FACTOR: f32 = 0.8;

/// Tuning of the lookahead tree search.
#[derive(Debug, Clone)]
pub struct StarPlannerConfig {
    /// Candidate directions expanded per node.
    pub children_per_node: usize,
    /// Maximum number of node expansions per build.
    pub n_expanded_nodes: usize,
    /// Edge length between a node and its children (meters).
    pub tree_node_distance: f32,
    /// Cycles a built tree may be reused before a rebuild.
    pub tree_reuse_age: u32,
    /// Distance to the goal at which the search terminates (meters).
    pub acceptance_radius: f32,
    /// Angular resolution of the per-node histograms (degrees).
    pub alpha_res: usize,
    /// Half side length of the planning region (meters).
    pub box_radius: f32,
    /// Obstacle distances below this are infeasible (meters).
    pub keep_distance: f32,
    /// Smoothness fade margin passed through to cell scoring (degrees).
    pub smoothing_margin_degrees: f32,
}

impl Default for StarPlannerConfig {
    fn default() -> Self {
        Self {
            children_per_node: 8,
            n_expanded_nodes: 40,
            tree_node_distance: 1.0,
            tree_reuse_age: 5,
            acceptance_radius: 2.0,
            alpha_res: 6,
            box_radius: 12.0,
            keep_distance: 6.0,
            smoothing_margin_degrees: 30.0,
        }
    }
}

/// Per-cycle inputs to a tree build.
pub struct TreeContext<'a> {
    /// Vehicle position (tree root).
    pub position: Vector3<f32>,
    /// Vehicle yaw at the root (radians).
    pub yaw: f32,
    /// Goal position.
    pub goal: Vector3<f32>,
    /// Cost weights for cell scoring.
    pub cost_params: &'a CostParams,
    /// Current field of view.
    pub fov: &'a FieldOfView,
    /// Filtered obstacle cloud.
    pub cloud: &'a [Vector3<f32>],
    /// Observations carried over from the previous cycle.
    pub reprojected: &'a [AgedPoint],
    /// Last chosen direction, projected at goal distance, for smoothing.
    pub last_direction: Vector3<f32>,
    /// Vehicle speed below which the heading term is skipped (true when
    /// hovering or only yawing).
    pub only_yawed: bool,
}

/// Entry of the open set, ordered so the cheapest node pops first.
#[derive(Debug, Clone, Copy)]
struct OpenNode {
    index: usize,
    priority: f32,
}

impl PartialEq for OpenNode {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl Eq for OpenNode {}

impl Ord for OpenNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for a min-heap on priority
        other
            .priority
            .partial_cmp(&self.priority)
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for OpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Best-first lookahead planner over histogram directions.
#[derive(Debug)]
pub struct StarPlanner {
    config: StarPlannerConfig,
    tree: Vec<TreeNode>,
    closed_set: Vec<usize>,
    path_node_positions: Vec<Vector3<f32>>,
    tree_age: u32,
    last_goal: Option<Vector3<f32>>,
}

impl StarPlanner {
    /// Create a planner with the given tuning.
    pub fn new(config: StarPlannerConfig) -> Self {
        Self {
            config,
            tree: Vec::new(),
            closed_set: Vec::new(),
            path_node_positions: Vec::new(),
            tree_age: 0,
            last_goal: None,
        }
    }

    /// Replace the tuning (applied at the next build).
    pub fn set_config(&mut self, config: StarPlannerConfig) {
        self.config = config;
    }

    /// Advance the reuse counter by one cycle.
    pub fn age_tree(&mut self) {
        self.tree_age = self.tree_age.saturating_add(1);
    }

    /// Cycles since the tree was last rebuilt.
    pub fn tree_age(&self) -> u32 {
        self.tree_age
    }

    /// Positions of the extracted path, root first.
    pub fn path_node_positions(&self) -> &[Vector3<f32>] {
        &self.path_node_positions
    }

    /// The tree arena (for inspection).
    pub fn tree(&self) -> &[TreeNode] {
        &self.tree
    }

    /// Indices of expanded nodes.
    pub fn closed_set(&self) -> &[usize] {
        &self.closed_set
    }

    /// Build (or reuse) the lookahead tree and extract the best path.
    ///
    /// The previous tree is kept while it is younger than the reuse bound
    /// and the goal has not moved; otherwise the tree is rebuilt and the
    /// reuse counter reset.
    pub fn build_lookahead_tree(&mut self, ctx: &TreeContext<'_>) {
        let goal_changed = self
            .last_goal
            .map(|g| (g - ctx.goal).norm() > 0.01)
            .unwrap_or(true);

        if !goal_changed
            && self.tree_age <= self.config.tree_reuse_age
            && self.path_node_positions.len() > 1
        {
            log::debug!("reusing lookahead tree (age {})", self.tree_age);
            return;
        }

        self.rebuild(ctx);
        self.tree_age = 0;
        self.last_goal = Some(ctx.goal);
    }

    fn rebuild(&mut self, ctx: &TreeContext<'_>) {
        self.tree.clear();
        self.closed_set.clear();
        self.path_node_positions.clear();

        self.tree.push(TreeNode::root(ctx.position, ctx.yaw));

        let mut open_set: BinaryHeap<OpenNode> = BinaryHeap::new();
        open_set.push(OpenNode {
            index: 0,
            priority: 0.0,
        });

        let mut expansions = 0;
        while let Some(current) = open_set.pop() {
            if expansions >= self.config.n_expanded_nodes {
                break;
            }
            expansions += 1;

            let origin = current.index;
            self.closed_set.push(origin);

            let (origin_position, origin_yaw, origin_cost, origin_depth) = {
                let n = &self.tree[origin];
                (n.position, n.yaw_heading, n.total_cost, n.depth)
            };

            if (origin_position - ctx.goal).norm() < self.config.acceptance_radius {
                break;
            }

            // Score candidate directions from this node against a histogram
            // rebuilt at the node's position
            let mut points: Vec<Vector3<f32>> = ctx.cloud.to_vec();
            points.extend(ctx.reprojected.iter().map(|p| p.position));
            let histogram = generate_new_histogram(
                self.config.alpha_res,
                &origin_position,
                &points,
                self.config.box_radius,
            );
            let cost_ctx = CostContext {
                histogram: &histogram,
                goal: ctx.goal,
                position: origin_position,
                heading_deg: hist_heading_deg(origin_yaw),
                last_sent_waypoint: ctx.last_direction,
                only_yawed: ctx.only_yawed,
                smoothing_margin_degrees: self.config.smoothing_margin_degrees,
                keep_distance: self.config.keep_distance,
            };
            let matrix = build_cost_matrix(&cost_ctx, ctx.cost_params);
            let candidates = best_candidates(&matrix, self.config.children_per_node);

            for candidate in candidates {
                let dir = PolarPoint::new(
                    candidate.elevation_deg,
                    candidate.azimuth_deg,
                    self.config.tree_node_distance,
                );
                let child_position = polar_to_cartesian(&dir, &origin_position);
                let delta = child_position - origin_position;
                let child_yaw = if delta.norm() < 1e-6 {
                    origin_yaw
                } else {
                    delta.y.atan2(delta.x)
                };
                let depth = origin_depth + 1;
                let total_cost =
                    origin_cost + candidate.cost + depth_discount(origin_depth);
                let heuristic =
                    ctx.cost_params.goal_cost_param * (ctx.goal - child_position).norm();

                let index = self.tree.len();
                self.tree.push(TreeNode {
                    position: child_position,
                    yaw_heading: child_yaw,
                    total_cost,
                    heuristic,
                    depth,
                    parent: origin,
                });
                open_set.push(OpenNode {
                    index,
                    priority: total_cost + heuristic,
                });
            }
        }

        self.extract_path();
        log::debug!(
            "lookahead tree rebuilt: {} nodes, {} expanded, path length {}",
            self.tree.len(),
            self.closed_set.len(),
            self.path_node_positions.len()
        );
    }

    /// Walk parent links from the cheapest expanded node back to the root.
    fn extract_path(&mut self) {
        let best = self
            .closed_set
            .iter()
            .copied()
            .filter(|&i| i != 0)
            .min_by(|&a, &b| {
                let fa = self.tree[a].total_cost + self.tree[a].heuristic;
                let fb = self.tree[b].total_cost + self.tree[b].heuristic;
                fa.partial_cmp(&fb).unwrap_or(Ordering::Equal)
            });

        // Fall back to the cheapest leaf when only the root was expanded
        let best = best.or_else(|| {
            (1..self.tree.len()).min_by(|&a, &b| {
                let fa = self.tree[a].total_cost + self.tree[a].heuristic;
                let fb = self.tree[b].total_cost + self.tree[b].heuristic;
                fa.partial_cmp(&fb).unwrap_or(Ordering::Equal)
            })
        });

        let Some(mut current) = best else {
            // Degenerate tree: keep only the root position
            self.path_node_positions = vec![self.tree[0].position];
            return;
        };

        let mut path = Vec::with_capacity(self.tree[current].depth as usize + 1);
        loop {
            path.push(self.tree[current].position);
            if current == 0 {
                break;
            }
            current = self.tree[current].parent;
        }
        path.reverse();
        self.path_node_positions = path;
    }
}

#[inline]
fn depth_discount(depth: u32) -> f32 {
    TREE_STEP_COST * TREE_DISCOUNT_FACTOR.powi(depth as i32)
}
