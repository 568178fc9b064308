//! Point-cloud filtering.
//!
//! Fuses the per-camera clouds into one filtered cloud confined to the
//! histogram box, tracking the closest return and the number of returns
//! close enough to justify a controlled retreat.

use nalgebra::Vector3;

use crate::core::types::HistogramBox;

/// Result of filtering the per-camera clouds for one planning cycle.
#[derive(Debug, Clone, Default)]
pub struct FilteredCloud {
    /// Surviving points in the local frame.
    pub points: Vec<Vector3<f32>>,
    /// Closest surviving point, if any.
    pub closest_point: Option<Vector3<f32>>,
    /// Distance to the closest surviving point (`f32::MAX` when empty).
    pub distance_to_closest: f32,
    /// Number of points within the back-off distance.
    pub backoff_point_count: usize,
}

impl FilteredCloud {
    /// Number of surviving points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether no points survived filtering.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Filter the per-camera clouds against the histogram box.
///
/// Points are dropped when any component is non-finite, when they fall
/// outside the box (including below its ground clip plane), or when they
/// lie within `min_sensor_range` of the vehicle.
pub fn filter_point_cloud(
    camera_clouds: &[Vec<Vector3<f32>>],
    histogram_box: &HistogramBox,
    position: &Vector3<f32>,
    min_sensor_range: f32,
    min_dist_backoff: f32,
) -> FilteredCloud {
    let capacity: usize = camera_clouds.iter().map(|c| c.len()).sum();
    let mut out = FilteredCloud {
        points: Vec::with_capacity(capacity),
        closest_point: None,
        distance_to_closest: f32::MAX,
        backoff_point_count: 0,
    };

    for cloud in camera_clouds {
        for p in cloud {
            if !(p.x.is_finite() && p.y.is_finite() && p.z.is_finite()) {
                continue;
            }
            if !histogram_box.contains(p) {
                continue;
            }
            let dist = (p - position).norm();
            if dist < min_sensor_range {
                continue;
            }
            if dist < min_dist_backoff {
                out.backoff_point_count += 1;
            }
            if dist < out.distance_to_closest {
                out.distance_to_closest = dist;
                out.closest_point = Some(*p);
            }
            out.points.push(*p);
        }
    }

    out
}
