//! Implements proximity queries over points and spheres in 3D.
//!
//! * [`PointOctree`](struct.PointOctree.html) finds the closest stored point to a
//!   query position, optionally within a radius and skipping excluded points.
//! * [`OccupancyGrid`](struct.OccupancyGrid.html) registers keys with covering
//!   spheres on a uniform grid and collects the keys near a query sphere.

extern crate aitios_geom as geom;
#[macro_use]
extern crate log;

mod config;
mod error;
mod occupancy;
mod octants;
mod point_octree;

pub use config::{OctreeConfig, MAX_SUPPORTED_DEPTH};
pub use error::ConfigError;
pub use occupancy::{Cell, CellRange, OccupancyGrid};
pub use point_octree::{Nearest, PointId, PointOctree};
