//! Field-of-view computation.
//!
//! Maps the camera set's horizontal and vertical field of view, together
//! with the current yaw and pitch, onto histogram indices: the set of
//! azimuth columns in view and the elevation row bounds.

/// Histogram-index description of what the camera set currently sees.
#[derive(Debug, Clone, Default)]
pub struct FieldOfView {
    z_indices: Vec<usize>,
    e_min: i64,
    e_max: i64,
    h_fov_deg: f32,
    v_fov_deg: f32,
}

impl FieldOfView {
    /// Azimuth indices currently in view (wrapped, ascending sweep order).
    pub fn z_indices(&self) -> &[usize] {
        &self.z_indices
    }

    /// Lowest elevation row in view (may be clamped by callers).
    pub fn e_min(&self) -> i64 {
        self.e_min
    }

    /// Highest elevation row in view.
    pub fn e_max(&self) -> i64 {
        self.e_max
    }

    /// Horizontal field of view in degrees.
    pub fn h_fov_deg(&self) -> f32 {
        self.h_fov_deg
    }

    /// Vertical field of view in degrees.
    pub fn v_fov_deg(&self) -> f32 {
        self.v_fov_deg
    }

    /// Whether an azimuth column is in view.
    pub fn contains_azimuth(&self, z_idx: usize) -> bool {
        self.z_indices.contains(&z_idx)
    }

    /// Whether a histogram cell is in view.
    pub fn contains(&self, e_idx: usize, z_idx: usize) -> bool {
        let e = e_idx as i64;
        e >= self.e_min && e <= self.e_max && self.contains_azimuth(z_idx)
    }
}

/// Compute the field of view at the given vehicle attitude.
///
/// Azimuth indices wrap modularly around the histogram; elevation bounds
/// may extend past the valid rows when the vehicle pitches steeply and are
/// compared, not indexed.
pub fn calculate_fov(
    resolution: usize,
    h_fov_deg: f32,
    v_fov_deg: f32,
    yaw_rad: f32,
    pitch_rad: f32,
) -> FieldOfView {
    let res = resolution as f32;
    let n_azim = (360 / resolution) as i64;

    let yaw_deg = -yaw_rad.to_degrees();
    let pitch_deg = -pitch_rad.to_degrees();

    let z_min = ((yaw_deg - h_fov_deg / 2.0 + 270.0) / res).floor() as i64;
    let z_max = ((yaw_deg + h_fov_deg / 2.0 + 270.0) / res).floor() as i64;
    let e_min = ((pitch_deg - v_fov_deg / 2.0 + 90.0) / res).floor() as i64;
    let e_max = ((pitch_deg + v_fov_deg / 2.0 + 90.0) / res).floor() as i64;

    let mut z_indices = Vec::with_capacity((z_max - z_min + 1) as usize);
    for i in z_min..=z_max {
        let idx = i.rem_euclid(n_azim) as usize;
        if !z_indices.contains(&idx) {
            z_indices.push(idx);
        }
    }

    FieldOfView {
        z_indices,
        e_min,
        e_max,
        h_fov_deg,
        v_fov_deg,
    }
}
