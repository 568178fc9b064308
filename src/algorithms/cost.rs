//! Direction cost matrix.
//!
//! Scores every histogram cell as a candidate travel direction, trading
//! off progress toward the goal, heading change, smoothness against the
//! last commanded direction, and obstacle proximity.

use nalgebra::Vector3;

use crate::core::math::{
    angle_difference_deg, cartesian_to_polar, histogram_index_to_polar,
    wrap_angle_to_plus_minus_180,
};
use crate::core::types::PolarPoint;

use super::histogram::Histogram;

/// Scale applied to the obstacle-distance term beyond the hard margin.
const OBSTACLE_COST_SCALE: f32 = 100.0;

/// Weights of the direction cost function.
///
/// `height_change_cost_param_adapted` is mutated by the progress-rate
/// controller and stays within `[0.75, height_change_cost_param]`.
#[derive(Debug, Clone, PartialEq)]
pub struct CostParams {
    pub goal_cost_param: f32,
    pub heading_cost_param: f32,
    pub smooth_cost_param: f32,
    pub height_change_cost_param: f32,
    pub height_change_cost_param_adapted: f32,
}

impl Default for CostParams {
    fn default() -> Self {
        Self {
            goal_cost_param: 10.0,
            heading_cost_param: 0.5,
            smooth_cost_param: 1.5,
            height_change_cost_param: 4.0,
            height_change_cost_param_adapted: 4.0,
        }
    }
}

/// Per-cell direction costs at histogram resolution.
#[derive(Debug, Clone)]
pub struct CostMatrix {
    resolution: usize,
    n_elev: usize,
    n_azim: usize,
    costs: Vec<f32>,
}

impl CostMatrix {
    fn new(resolution: usize) -> Self {
        let n_elev = 180 / resolution;
        let n_azim = 360 / resolution;
        Self {
            resolution,
            n_elev,
            n_azim,
            costs: vec![0.0; n_elev * n_azim],
        }
    }

    /// Cost of the cell at `(e_idx, z_idx)`.
    #[inline]
    pub fn cost(&self, e_idx: usize, z_idx: usize) -> f32 {
        self.costs[e_idx * self.n_azim + z_idx]
    }

    #[inline]
    fn set_cost(&mut self, e_idx: usize, z_idx: usize, cost: f32) {
        self.costs[e_idx * self.n_azim + z_idx] = cost;
    }

    /// Angular resolution in degrees.
    pub fn resolution(&self) -> usize {
        self.resolution
    }

    /// Number of elevation rows.
    pub fn n_elev(&self) -> usize {
        self.n_elev
    }

    /// Number of azimuth columns.
    pub fn n_azim(&self) -> usize {
        self.n_azim
    }
}

/// A scored candidate direction, identified by histogram cell and its
/// center angles.
#[derive(Debug, Clone, Copy)]
pub struct CandidateCell {
    pub cost: f32,
    pub e_idx: usize,
    pub z_idx: usize,
    /// Elevation angle of the cell center (degrees).
    pub elevation_deg: f32,
    /// Azimuth angle of the cell center (degrees).
    pub azimuth_deg: f32,
}

/// Inputs that stay fixed while scoring every cell of one matrix.
#[derive(Debug, Clone, Copy)]
pub struct CostContext<'a> {
    /// Histogram the matrix is scored against.
    pub histogram: &'a Histogram,
    /// Goal position in the local frame.
    pub goal: Vector3<f32>,
    /// Position the directions originate from.
    pub position: Vector3<f32>,
    /// Heading azimuth in the histogram frame (degrees).
    pub heading_deg: f32,
    /// Last waypoint sent downstream, for the smoothness term.
    pub last_sent_waypoint: Vector3<f32>,
    /// Skip the heading term (vehicle hovering or only yawing).
    pub only_yawed: bool,
    /// Angular margin over which the smoothness term fades out (degrees).
    pub smoothing_margin_degrees: f32,
    /// Obstacle distances below this are infeasible (meters).
    pub keep_distance: f32,
}

/// Score every histogram cell.
pub fn build_cost_matrix(ctx: &CostContext<'_>, params: &CostParams) -> CostMatrix {
    let res = ctx.histogram.resolution();
    let half_res = (res / 2) as f32;
    let mut matrix = CostMatrix::new(res);

    let goal_pol = cartesian_to_polar(&ctx.goal, &ctx.position);
    let last_wp_pol = cartesian_to_polar(&ctx.last_sent_waypoint, &ctx.position);

    for e_idx in 0..matrix.n_elev() {
        for z_idx in 0..matrix.n_azim() {
            let corner = histogram_index_to_polar(e_idx, z_idx, res, 1.0);
            let cell = PolarPoint::new(corner.e + half_res, corner.z + half_res, 1.0);
            let cost = cell_cost(
                &cell,
                ctx.histogram.dist(e_idx, z_idx),
                &goal_pol,
                &last_wp_pol,
                ctx,
                params,
            );
            matrix.set_cost(e_idx, z_idx, cost);
        }
    }
    matrix
}

fn cell_cost(
    cell: &PolarPoint,
    dist_in_cell: f32,
    goal_pol: &PolarPoint,
    last_wp_pol: &PolarPoint,
    ctx: &CostContext<'_>,
    params: &CostParams,
) -> f32 {
    // Progress toward the goal; vertical deviation weighted by the adapted
    // height-change parameter
    let de = (cell.e - goal_pol.e) * params.height_change_cost_param_adapted;
    let dz = wrap_angle_to_plus_minus_180(cell.z - goal_pol.z);
    let goal_deviation = (de * de + dz * dz).sqrt();

    let heading_deviation = if ctx.only_yawed {
        0.0
    } else {
        angle_difference_deg(cell.z, ctx.heading_deg)
    };

    let smooth_dev = {
        let de = cell.e - last_wp_pol.e;
        let dz = wrap_angle_to_plus_minus_180(cell.z - last_wp_pol.z);
        (de * de + dz * dz).sqrt()
    };
    let smoothness = smooth_dev * (1.0 - smooth_dev / ctx.smoothing_margin_degrees).max(0.0);

    let obstacle = if dist_in_cell > 0.0 {
        if dist_in_cell < ctx.keep_distance {
            return f32::INFINITY;
        }
        OBSTACLE_COST_SCALE * ctx.keep_distance / dist_in_cell
    } else {
        0.0
    };

    params.goal_cost_param * goal_deviation
        + params.heading_cost_param * heading_deviation
        + params.smooth_cost_param * smoothness
        + obstacle
}

/// The `k` lowest-cost cells, ties broken by smaller elevation index then
/// smaller azimuth index. Empty iff no cell has a finite cost.
pub fn best_candidates(matrix: &CostMatrix, k: usize) -> Vec<CandidateCell> {
    let res = matrix.resolution();
    let half_res = (res / 2) as f32;
    let mut cells: Vec<CandidateCell> = Vec::with_capacity(matrix.n_elev() * matrix.n_azim());

    for e_idx in 0..matrix.n_elev() {
        for z_idx in 0..matrix.n_azim() {
            let cost = matrix.cost(e_idx, z_idx);
            if !cost.is_finite() {
                continue;
            }
            let corner = histogram_index_to_polar(e_idx, z_idx, res, 1.0);
            cells.push(CandidateCell {
                cost,
                e_idx,
                z_idx,
                elevation_deg: corner.e + half_res,
                azimuth_deg: corner.z + half_res,
            });
        }
    }

    cells.sort_by(|a, b| {
        a.cost
            .partial_cmp(&b.cost)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.e_idx.cmp(&b.e_idx))
            .then(a.z_idx.cmp(&b.z_idx))
    });
    cells.truncate(k);
    cells
}
