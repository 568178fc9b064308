//! Polar obstacle histogram.
//!
//! A 2D grid of `(distance, age)` cells indexed by elevation and azimuth.
//! Each cycle builds a fresh histogram from the filtered cloud, propagates
//! the previous cycle's observations at half resolution, and combines the
//! two so that memory complements sensing outside the field of view.
//!
//! A cell is empty iff its distance is zero.

use nalgebra::Vector3;

use crate::core::math::{
    cartesian_to_polar, histogram_index_to_polar, polar_to_cartesian, polar_to_histogram_index,
};
use crate::core::types::{AgedPoint, PolarPoint};

use super::fov::FieldOfView;

/// Minimum range reported in the obstacle distance sweep (meters).
pub const SWEEP_RANGE_MIN: f32 = 0.2;
/// Maximum range reported in the obstacle distance sweep (meters).
pub const SWEEP_RANGE_MAX: f32 = 20.0;
/// Sweep sentinel for azimuths outside the field of view.
pub const SWEEP_OUT_OF_VIEW: f32 = u16::MAX as f32;
/// Reprojected points closer than this to the new vehicle position are
/// discarded.
const REPROJECT_MIN_DIST: f32 = 0.3;

/// Polar grid of obstacle observations at a fixed angular resolution.
#[derive(Debug, Clone)]
pub struct Histogram {
    resolution: usize,
    n_elev: usize,
    n_azim: usize,
    dist: Vec<f32>,
    age: Vec<u32>,
}

impl Histogram {
    /// Create an empty histogram at `resolution` degrees per cell.
    pub fn new(resolution: usize) -> Self {
        let n_elev = 180 / resolution;
        let n_azim = 360 / resolution;
        Self {
            resolution,
            n_elev,
            n_azim,
            dist: vec![0.0; n_elev * n_azim],
            age: vec![0; n_elev * n_azim],
        }
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

    #[inline]
    fn index(&self, e_idx: usize, z_idx: usize) -> usize {
        debug_assert!(e_idx < self.n_elev && z_idx < self.n_azim);
        e_idx * self.n_azim + z_idx
    }

    /// Observed obstacle distance in a cell (0 when empty).
    #[inline]
    pub fn dist(&self, e_idx: usize, z_idx: usize) -> f32 {
        self.dist[self.index(e_idx, z_idx)]
    }

    /// Cycles since the observation populating a cell.
    #[inline]
    pub fn age(&self, e_idx: usize, z_idx: usize) -> u32 {
        self.age[self.index(e_idx, z_idx)]
    }

    /// Set a cell's distance.
    #[inline]
    pub fn set_dist(&mut self, e_idx: usize, z_idx: usize, dist: f32) {
        let i = self.index(e_idx, z_idx);
        self.dist[i] = dist;
    }

    /// Set a cell's age.
    #[inline]
    pub fn set_age(&mut self, e_idx: usize, z_idx: usize, age: u32) {
        let i = self.index(e_idx, z_idx);
        self.age[i] = age;
    }

    /// Whether a single cell holds no observation.
    #[inline]
    pub fn is_cell_empty(&self, e_idx: usize, z_idx: usize) -> bool {
        self.dist(e_idx, z_idx) == 0.0
    }

    /// Whether every cell is empty.
    pub fn is_empty(&self) -> bool {
        self.dist.iter().all(|&d| d == 0.0)
    }

    /// Produce a histogram at half the angular resolution value (twice the
    /// cell density), copying each coarse cell into its 2x2 block of fine
    /// cells.
    pub fn upsample(&self) -> Histogram {
        let fine_res = self.resolution / 2;
        let mut fine = Histogram::new(fine_res);
        for e in 0..fine.n_elev {
            for z in 0..fine.n_azim {
                let coarse_e = e / 2;
                let coarse_z = z / 2;
                fine.set_dist(e, z, self.dist(coarse_e, coarse_z));
                fine.set_age(e, z, self.age(coarse_e, coarse_z));
            }
        }
        fine
    }
}

/// Build a histogram from the filtered cloud at the current pose.
///
/// Each cell keeps the minimum observed radius across contributors; newly
/// populated cells have age 0. Points beyond `box_radius` are ignored so
/// that cell distances stay within the planning region.
pub fn generate_new_histogram(
    resolution: usize,
    position: &Vector3<f32>,
    points: &[Vector3<f32>],
    box_radius: f32,
) -> Histogram {
    let mut hist = Histogram::new(resolution);
    for p in points {
        let pol = cartesian_to_polar(p, position);
        if pol.r <= 0.0 || pol.r > box_radius {
            continue;
        }
        let (e_idx, z_idx) = polar_to_histogram_index(&pol, resolution);
        if hist.is_cell_empty(e_idx, z_idx) || pol.r < hist.dist(e_idx, z_idx) {
            hist.set_dist(e_idx, z_idx, pol.r);
            hist.set_age(e_idx, z_idx, 0);
        }
    }
    hist
}

/// Build the propagated histogram at twice the base resolution from the
/// previous cycle's reprojected points.
///
/// Each point carries its age forward incremented by one; points whose
/// incremented age reaches `reproj_age_max` are dropped. A cell keeps the
/// minimum distance and the age of its closest contributor.
pub fn propagate_histogram(
    base_resolution: usize,
    position: &Vector3<f32>,
    reprojected: &[AgedPoint],
    reproj_age_max: u32,
    box_radius: f32,
) -> Histogram {
    let mut hist = Histogram::new(2 * base_resolution);
    for p in reprojected {
        let age = p.age + 1;
        if age >= reproj_age_max {
            continue;
        }
        let pol = cartesian_to_polar(&p.position, position);
        if pol.r <= 0.0 || pol.r > box_radius {
            continue;
        }
        let (e_idx, z_idx) = polar_to_histogram_index(&pol, hist.resolution());
        if hist.is_cell_empty(e_idx, z_idx) || pol.r < hist.dist(e_idx, z_idx) {
            hist.set_dist(e_idx, z_idx, pol.r);
            hist.set_age(e_idx, z_idx, age);
        }
    }
    hist
}

/// Fill empty cells of the new histogram from the propagated histogram,
/// restricted to cells outside the current field of view so memory never
/// overrides sensing.
///
/// Returns `hist_is_empty`: true iff every cell of the combined histogram
/// is empty *and* the last sent waypoint lies inside the field of view.
pub fn combine_histograms(
    new_hist: &mut Histogram,
    propagated: &Histogram,
    fov: &FieldOfView,
    waypoint_in_fov: bool,
) -> bool {
    let fine = propagated.upsample();
    debug_assert_eq!(fine.resolution(), new_hist.resolution());

    for e in 0..new_hist.n_elev() {
        for z in 0..new_hist.n_azim() {
            if new_hist.is_cell_empty(e, z) && !fine.is_cell_empty(e, z) && !fov.contains(e, z) {
                new_hist.set_dist(e, z, fine.dist(e, z));
                new_hist.set_age(e, z, fine.age(e, z));
            }
        }
    }

    new_hist.is_empty() && waypoint_in_fov
}

/// Flatten the histogram over elevation: per azimuth, the minimum non-empty
/// distance across all elevation rows (0 when the whole column is empty).
pub fn compress_histogram_elevation(hist: &Histogram) -> Vec<f32> {
    let mut compressed = vec![0.0f32; hist.n_azim()];
    for z in 0..hist.n_azim() {
        let mut min_dist = f32::MAX;
        for e in 0..hist.n_elev() {
            let d = hist.dist(e, z);
            if d > 0.0 && d < min_dist {
                min_dist = d;
            }
        }
        if min_dist < f32::MAX {
            compressed[z] = min_dist;
        }
    }
    compressed
}

/// Assemble the per-azimuth obstacle range sweep for the flight controller.
///
/// Output indices are rotated 180 degrees relative to histogram azimuth
/// indices (wire contract: the sweep points to local north). Azimuths
/// outside the field of view report [`SWEEP_OUT_OF_VIEW`]; observed-empty
/// azimuths report one past the maximum range.
pub fn obstacle_distance_sweep(compressed: &[f32], fov: &FieldOfView) -> Vec<f32> {
    let n = compressed.len();
    let half = n / 2;
    let mut ranges = Vec::with_capacity(n);
    for idx in 0..n {
        let hist_idx = (idx + half) % n;
        let range = if !fov.contains_azimuth(hist_idx) {
            SWEEP_OUT_OF_VIEW
        } else if compressed[hist_idx] == 0.0 {
            SWEEP_RANGE_MAX + 1.0
        } else {
            compressed[hist_idx].clamp(SWEEP_RANGE_MIN, SWEEP_RANGE_MAX)
        };
        ranges.push(range);
    }
    ranges
}

/// Carry the histogram's observations forward one cycle: emit four
/// cartesian points at the polar corners of every non-empty cell, labeled
/// with the cell's age.
///
/// Points farther than `2 * box_radius` from the new vehicle position or
/// closer than 0.3 m are discarded.
pub fn reproject_histogram(
    hist: &Histogram,
    old_position: &Vector3<f32>,
    new_position: &Vector3<f32>,
    box_radius: f32,
    reproj_age_max: u32,
) -> Vec<AgedPoint> {
    let res = hist.resolution();
    let half_res = (res / 2) as f32;
    let mut out = Vec::new();

    for e in 0..hist.n_elev() {
        for z in 0..hist.n_azim() {
            let dist = hist.dist(e, z);
            if dist <= f32::MIN_POSITIVE {
                continue;
            }
            let age = hist.age(e, z);
            if age >= reproj_age_max {
                continue;
            }
            let corner = histogram_index_to_polar(e, z, res, dist);
            let center = PolarPoint::new(corner.e + half_res, corner.z + half_res, dist);
            let corners = [
                PolarPoint::new(center.e + half_res, center.z + half_res, dist),
                PolarPoint::new(center.e - half_res, center.z + half_res, dist),
                PolarPoint::new(center.e + half_res, center.z - half_res, dist),
                PolarPoint::new(center.e - half_res, center.z - half_res, dist),
            ];
            for c in &corners {
                let p = polar_to_cartesian(c, old_position);
                let d = (p - new_position).norm();
                if d < 2.0 * box_radius && d > REPROJECT_MIN_DIST {
                    out.push(AgedPoint { position: p, age });
                }
            }
        }
    }
    out
}
