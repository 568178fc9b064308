//! Core value types shared by the avoidance pipeline.

use nalgebra::Vector3;

/// Margin above the measured ground plane below which returns are discarded.
///
/// Keeps floor returns out of the obstacle histogram and matches the
/// near-point cutoff used when carrying observations across cycles.
pub const FLOOR_MARGIN: f32 = 0.3;

/// A point in the vehicle-centered polar frame.
///
/// Elevation `e` in degrees `[-90, 90]` measured from the XY plane, azimuth
/// `z` in degrees `(-180, 180]` measured from the +Y axis, radius `r` in
/// meters.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PolarPoint {
    /// Elevation angle (degrees).
    pub e: f32,
    /// Azimuth angle (degrees).
    pub z: f32,
    /// Radius (meters).
    pub r: f32,
}

impl PolarPoint {
    /// Create a polar point from elevation, azimuth and radius.
    pub fn new(e: f32, z: f32, r: f32) -> Self {
        Self { e, z, r }
    }
}

/// A cartesian point carrying the number of planner cycles since it was
/// last directly observed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgedPoint {
    /// Position in the local frame.
    pub position: Vector3<f32>,
    /// Planner cycles since the observation that produced this point.
    pub age: u32,
}

/// Axis-aligned cube centered on the vehicle bounding the local planning
/// region, with a lower clip plane that keeps ground returns out.
#[derive(Debug, Clone, Copy)]
pub struct HistogramBox {
    /// Half side length (meters).
    pub radius: f32,
    pub xmin: f32,
    pub xmax: f32,
    pub ymin: f32,
    pub ymax: f32,
    pub zmin: f32,
    pub zmax: f32,
}

impl HistogramBox {
    /// Create a box with the given radius. Limits are unset until
    /// [`HistogramBox::set_limits`] is called with a vehicle position.
    pub fn new(radius: f32) -> Self {
        Self {
            radius,
            xmin: 0.0,
            xmax: 0.0,
            ymin: 0.0,
            ymax: 0.0,
            zmin: 0.0,
            zmax: 0.0,
        }
    }

    /// Recenter the box on the vehicle and recompute the lower clip plane
    /// from the measured ground distance.
    pub fn set_limits(&mut self, position: &Vector3<f32>, ground_distance: f32) {
        self.xmin = position.x - self.radius;
        self.xmax = position.x + self.radius;
        self.ymin = position.y - self.radius;
        self.ymax = position.y + self.radius;
        self.zmin = (position.z - self.radius).max(position.z - ground_distance + FLOOR_MARGIN);
        self.zmax = position.z + self.radius;
    }

    /// Whether a point lies inside the box (above the clip plane).
    pub fn contains(&self, p: &Vector3<f32>) -> bool {
        p.x >= self.xmin
            && p.x <= self.xmax
            && p.y >= self.ymin
            && p.y <= self.ymax
            && p.z >= self.zmin
            && p.z <= self.zmax
    }
}
