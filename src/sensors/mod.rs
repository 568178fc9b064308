//! Sensor processing layer: point-cloud filtering.

pub mod cloud;

pub use cloud::{filter_point_cloud, FilteredCloud};
