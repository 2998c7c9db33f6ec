//! Bake jobs and the kernel they run.

#[cfg(test)]
pub(crate) mod fixtures;
pub mod geometry;
pub mod image;
pub mod job;
pub mod kernel;

pub use geometry::{GeometrySnapshot, Triangle, WorldGeometry, WorldObject};
pub use image::{Accumulator, CookieImage};
pub use job::{BakeJob, BakeState};
pub use kernel::{BakeSettings, CpuKernel, RayHit, SampleKernel};
