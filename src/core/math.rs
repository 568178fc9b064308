//! Geometry kernel: polar/cartesian conversions, histogram indexing and
//! angle utilities.
//!
//! The polar frame is right-handed, z-up. Azimuth is measured in degrees
//! from the +Y axis in `(-180, 180]`, elevation in degrees from the XY
//! plane in `[-90, 90]`.

use std::f32::consts::PI;

use nalgebra::{UnitQuaternion, Vector3};

use super::types::PolarPoint;

/// Proportional gain applied to the wrapped yaw error.
const YAW_RATE_GAIN: f32 = 0.5;
/// Magnitude bound on the commanded yaw rate (rad/s).
const MAX_YAW_RATE: f32 = PI / 4.0;

/// Convert a cartesian point to polar coordinates relative to `origin`.
///
/// Azimuth is `atan2(dx, dy)` in degrees, elevation `atan2(dz, ||xy||)`
/// in degrees, radius the Euclidean distance.
pub fn cartesian_to_polar(p: &Vector3<f32>, origin: &Vector3<f32>) -> PolarPoint {
    let dx = p.x - origin.x;
    let dy = p.y - origin.y;
    let dz = p.z - origin.z;
    let xy_norm = (dx * dx + dy * dy).sqrt();
    PolarPoint::new(
        dz.atan2(xy_norm).to_degrees(),
        dx.atan2(dy).to_degrees(),
        (dx * dx + dy * dy + dz * dz).sqrt(),
    )
}

/// Convert a polar point back to cartesian coordinates, offset by `origin`.
///
/// Exact inverse of [`cartesian_to_polar`] for radii greater than zero.
pub fn polar_to_cartesian(pol: &PolarPoint, origin: &Vector3<f32>) -> Vector3<f32> {
    let e = pol.e.to_radians();
    let z = pol.z.to_radians();
    Vector3::new(
        origin.x + pol.r * e.cos() * z.sin(),
        origin.y + pol.r * e.cos() * z.cos(),
        origin.z + pol.r * e.sin(),
    )
}

/// Wrap a polar point so that elevation lies in `[-90, 90)` and azimuth in
/// `(-180, 180]`. Out-of-range elevation is reflected through the pole,
/// shifting azimuth by 180 degrees each time.
pub fn wrap_polar(pol: &mut PolarPoint) {
    while pol.e > 90.0 || pol.e < -90.0 {
        if pol.e > 90.0 {
            pol.e = 180.0 - pol.e;
        } else {
            pol.e = -180.0 - pol.e;
        }
        pol.z += 180.0;
    }
    pol.z = wrap_angle_to_plus_minus_180(pol.z);
}

/// Wrap an angle in degrees to `(-180, 180]`.
#[inline]
pub fn wrap_angle_to_plus_minus_180(angle: f32) -> f32 {
    let mut a = angle;
    while a > 180.0 {
        a -= 360.0;
    }
    while a <= -180.0 {
        a += 360.0;
    }
    a
}

/// Wrap an angle in radians to `[-π, π]`.
#[inline]
pub fn wrap_angle_to_plus_minus_pi(angle: f32) -> f32 {
    let mut a = angle % (2.0 * PI);
    if a > PI {
        a -= 2.0 * PI;
    } else if a < -PI {
        a += 2.0 * PI;
    }
    a
}

/// Absolute angular difference between two angles in degrees, in `[0, 180]`.
#[inline]
pub fn angle_difference_deg(a: f32, b: f32) -> f32 {
    wrap_angle_to_plus_minus_180(a - b).abs()
}

/// Angular distance between two polar points, combining the elevation and
/// wrapped azimuth differences (degrees).
#[inline]
pub fn polar_distance_deg(a: &PolarPoint, b: &PolarPoint) -> f32 {
    let de = a.e - b.e;
    let dz = wrap_angle_to_plus_minus_180(a.z - b.z);
    (de * de + dz * dz).sqrt()
}

/// Map a polar point to histogram indices `(e_idx, z_idx)` at the given
/// angular resolution in degrees.
///
/// The azimuth index is modular, the elevation index clamped. Invalid
/// inputs (NaN components) map to `(0, 0)`.
pub fn polar_to_histogram_index(pol: &PolarPoint, res: usize) -> (usize, usize) {
    if !pol.e.is_finite() || !pol.z.is_finite() {
        return (0, 0);
    }
    let mut p = *pol;
    wrap_polar(&mut p);

    let res_f = res as f32;
    let n_elev = 180 / res;
    let n_azim = 360 / res;

    let z_raw = ((p.z + 180.0) / res_f).floor() as i64;
    let z_idx = z_raw.rem_euclid(n_azim as i64) as usize;
    let e_raw = ((p.e + 90.0) / res_f).floor() as i64;
    let e_idx = e_raw.clamp(0, n_elev as i64 - 1) as usize;
    (e_idx, z_idx)
}

/// Recover the polar angle of the *lower corner* of a histogram cell.
/// Callers add half the resolution to obtain the cell center.
pub fn histogram_index_to_polar(e_idx: usize, z_idx: usize, res: usize, radius: f32) -> PolarPoint {
    PolarPoint::new(
        (e_idx * res) as f32 - 90.0,
        (z_idx * res) as f32 - 180.0,
        radius,
    )
}

/// Yaw angle from `u` toward `v` in radians (`atan2(dx, dy)`), keeping
/// `prev_yaw` when the points are too close to define a direction.
pub fn next_yaw(u: &Vector3<f32>, v: &Vector3<f32>, prev_yaw: f32) -> f32 {
    if (v - u).norm() < 1e-6 {
        return prev_yaw;
    }
    (v.x - u.x).atan2(v.y - u.y)
}

/// Extract yaw (rotation about z) from an orientation quaternion, radians.
#[inline]
pub fn yaw_from_quaternion(q: &UnitQuaternion<f32>) -> f32 {
    q.euler_angles().2
}

/// Extract pitch (rotation about y) from an orientation quaternion, radians.
#[inline]
pub fn pitch_from_quaternion(q: &UnitQuaternion<f32>) -> f32 {
    q.euler_angles().1
}

/// Azimuth angle of the vehicle heading in the histogram frame (degrees).
///
/// The histogram measures azimuth from +Y while yaw is measured from +X,
/// hence the sign flip and 90 degree offset.
#[inline]
pub fn hist_heading_deg(yaw_rad: f32) -> f32 {
    (-yaw_rad.to_degrees()).round() + 90.0
}

/// Commanded angular velocity to rotate from `curr_yaw` toward
/// `desired_yaw` (radians). Proportional on the wrapped error with a
/// bounded magnitude.
pub fn angular_velocity(desired_yaw: f32, curr_yaw: f32) -> f32 {
    let error = wrap_angle_to_plus_minus_pi(desired_yaw - curr_yaw);
    let rate = YAW_RATE_GAIN * error;
    rate.clamp(-MAX_YAW_RATE, MAX_YAW_RATE)
}
