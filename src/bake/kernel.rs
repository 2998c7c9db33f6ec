//! Ray-trace kernel for spotlight cookies.
//!
//! One sample pass shoots a single jittered ray per output pixel from the
//! light through the shadow-focus plane, bounces it through the scene, and
//! accumulates whatever colour it still carries into the pixel its final
//! direction projects onto.

use super::geometry::{Triangle, WorldGeometry};
use super::image::Accumulator;
use crate::math::{LightBasis, Ray, SMALLEST_POSITIVE, Vec2, Vec3};
use crate::protocol::WorkloadRequest;
use rayon::prelude::*;

/// Colour kept by a ray each time it hits a surface.
pub const HIT_ATTENUATION: f32 = 0.5;

/// Distance a bounced ray is lifted off the surface it hit.
pub const SURFACE_OFFSET: f32 = 0.0005;

/// Per-job constants the kernel needs for every pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BakeSettings {
    pub light: LightBasis,
    pub resolution: usize,
    pub bounce_count: u32,
    pub min_range: f32,
    pub max_range: f32,
    pub shadow_focus: f32,
    /// Half-width of the projection plane at the shadow-focus distance.
    pub half_size: f32,
}

impl BakeSettings {
    /// Expects a request whose resolution and bounce count were already validated.
    pub fn from_request(request: &WorkloadRequest) -> Self {
        Self {
            light: LightBasis::new(
                request.light_position,
                request.light_forward,
                request.light_upward,
            ),
            resolution: request.resolution.max(0) as usize,
            bounce_count: request.bounce_count.max(0) as u32,
            min_range: request.min_range,
            max_range: request.max_range,
            shadow_focus: request.shadow_focus_plane,
            half_size: request.shadow_focus_plane * request.light_theta_rad.tan(),
        }
    }
}

/// Result of tracing a ray against the whole scene.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    /// Whether the ray hit any geometry
    pub hit: bool,

    /// Distance from ray origin to hit point
    ///
    /// Only meaningful if `hit` is true
    pub distance: f32,

    /// Only meaningful if `hit` is true
    pub position: Vec3,

    /// Surface normal at the hit point (normalized)
    ///
    /// Only meaningful if `hit` is true
    pub normal: Vec3,
}

impl RayHit {
    /// Creates a miss result (no hit)
    pub fn miss() -> Self {
        Self {
            hit: false,
            distance: f32::MAX,
            position: Vec3::ZERO,
            normal: Vec3::ZERO,
        }
    }

    /// Creates a hit result
    pub fn new(distance: f32, position: Vec3, normal: Vec3) -> Self {
        Self {
            hit: true,
            distance,
            position,
            normal,
        }
    }
}

impl Default for RayHit {
    fn default() -> Self {
        Self::miss()
    }
}

/// Runs one full-resolution sample pass.
///
/// This is the seam a GPU implementation plugs into; the worker only needs the
/// pass to add each pixel's contribution to `accumulator`.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` since the scheduler may live on any thread.
///
/// # Example
///
/// ```
/// use cookie_baker::bake::{Accumulator, BakeSettings, SampleKernel, WorldGeometry};
/// use cookie_baker::math::{Vec2, Vec3};
///
/// // Lights every pixel fully, ignoring the scene.
/// struct FloodKernel;
///
/// impl SampleKernel for FloodKernel {
///     fn run_pass(
///         &self,
///         _settings: &BakeSettings,
///         _scene: &WorldGeometry,
///         _pixel_offset: Vec2,
///         accumulator: &mut Accumulator,
///     ) {
///         for index in 0..accumulator.pixels().len() {
///             accumulator.add(index, Vec3::ONE);
///         }
///     }
/// }
/// ```
pub trait SampleKernel: Send + Sync {
    fn run_pass(
        &self,
        settings: &BakeSettings,
        scene: &WorldGeometry,
        pixel_offset: Vec2,
        accumulator: &mut Accumulator,
    );
}

/// Multi-threaded CPU implementation. Rows are traced in parallel and their
/// contributions applied in row order afterwards, so a pass is deterministic.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuKernel;

impl SampleKernel for CpuKernel {
    fn run_pass(
        &self,
        settings: &BakeSettings,
        scene: &WorldGeometry,
        pixel_offset: Vec2,
        accumulator: &mut Accumulator,
    ) {
        let resolution = settings.resolution;

        let rows: Vec<Vec<(usize, Vec3)>> = (0..resolution)
            .into_par_iter()
            .map(|y| {
                (0..resolution)
                    .filter_map(|x| trace_pixel(x, y, pixel_offset, settings, scene))
                    .collect()
            })
            .collect();

        for (index, color) in rows.into_iter().flatten() {
            accumulator.add(index, color);
        }
    }
}

/// Traces the ray for pixel `(x, y)` and returns the pixel it lands on.
pub fn trace_pixel(
    x: usize,
    y: usize,
    pixel_offset: Vec2,
    settings: &BakeSettings,
    scene: &WorldGeometry,
) -> Option<(usize, Vec3)> {
    let uv = pixel_uv(x, y, pixel_offset, settings.resolution);
    let mut ray = initial_ray(uv, settings);

    for _ in 0..settings.bounce_count {
        let hit = trace(&ray, scene, settings);
        if !hit.hit {
            break;
        }
        ray.color *= HIT_ATTENUATION;
        ray.set_direction(hit.normal);
        ray.origin = hit.position + SURFACE_OFFSET * hit.normal;
    }

    let uv = project_to_plane(ray.direction(), settings)?;
    let index = uv_to_pixel(uv, settings.resolution)?;
    Some((index, ray.color))
}

/// Maps a pixel plus sub-pixel offset to `[-1, 1)` UV space.
pub fn pixel_uv(x: usize, y: usize, pixel_offset: Vec2, resolution: usize) -> Vec2 {
    let uv = (Vec2::new(x as f32, y as f32) + pixel_offset) / resolution as f32;
    uv * 2.0 - Vec2::ONE
}

/// Ray from the light toward `uv` on the shadow-focus plane.
pub fn initial_ray(uv: Vec2, settings: &BakeSettings) -> Ray {
    let light = &settings.light;
    let target = (uv.x * settings.half_size) * light.right
        + (uv.y * settings.half_size) * light.up
        + settings.shadow_focus * light.forward;

    Ray::new(light.position, target.normalize(), Vec3::ONE)
}

/// Nearest hit along `ray`. Ties keep the first triangle found.
pub fn trace(ray: &Ray, scene: &WorldGeometry, settings: &BakeSettings) -> RayHit {
    let min_sq = settings.min_range * settings.min_range;
    let max_sq = settings.max_range * settings.max_range;
    let light_position = settings.light.position;

    let mut best = RayHit::miss();
    let mut best_normal = Vec3::ZERO;

    for object in &scene.objects {
        if !object.bounds.intersects(ray) {
            continue;
        }

        for triangle in scene.object_triangles(object) {
            if let Some((distance, normal)) =
                intersect_triangle(ray, triangle, light_position, min_sq, max_sq)
            {
                if distance < best.distance {
                    best = RayHit::new(distance, ray.at(distance), Vec3::ZERO);
                    best_normal = normal;
                }
            }
        }
    }

    if best.hit {
        best.normal = best_normal.normalize();
    }
    best
}

/// Plane intersection with range and edge tests.
///
/// Returns the distance along the ray and the unnormalized face normal
/// `cross(v1 - v0, v2 - v0)`. Only front faces count: the ray must travel
/// against the normal. The hit point must satisfy
/// `min_sq <= |p - light|^2 <= max_sq`.
pub fn intersect_triangle(
    ray: &Ray,
    triangle: &Triangle,
    light_position: Vec3,
    min_sq: f32,
    max_sq: f32,
) -> Option<(f32, Vec3)> {
    let Triangle { v0, v1, v2 } = *triangle;
    let edge0 = v1 - v0;
    let edge1 = v2 - v0;
    let normal = edge0.cross(edge1);

    let n_dot_dir = normal.dot(ray.direction());
    if n_dot_dir > -SMALLEST_POSITIVE {
        return None;
    }

    let distance = (-normal).dot(ray.origin - v0) / n_dot_dir;
    if !(distance > 0.0) {
        return None;
    }
    let point = ray.at(distance);

    let dist_sq = (point - light_position).length_squared();
    if dist_sq < min_sq || dist_sq > max_sq {
        return None;
    }

    let delta = point - v0;
    if delta.dot(edge0.cross(normal)) > 0.0 {
        return None;
    }
    if delta.dot(edge1.cross(normal)) < 0.0 {
        return None;
    }
    if (point - v1).dot((v2 - v1).cross(normal)) > 0.0 {
        return None;
    }

    Some((distance, normal))
}

/// Projects a final ray direction, cast from the light, onto the shadow-focus
/// plane and returns its UV. Directions not heading through the plane yield `None`.
pub fn project_to_plane(direction: Vec3, settings: &BakeSettings) -> Option<Vec2> {
    let light = &settings.light;
    let plane_normal = -light.forward;

    let n_dot_dir = plane_normal.dot(direction);
    if n_dot_dir > -SMALLEST_POSITIVE {
        return None;
    }

    let plane_origin = light.position + settings.shadow_focus * light.forward;
    let s = (-plane_normal).dot(light.position - plane_origin) / n_dot_dir;
    let on_plane = light.position + s * direction - plane_origin;

    Some(Vec2::new(on_plane.dot(light.right), on_plane.dot(light.up)) / settings.half_size)
}

/// Half-open `[-1, 1)` UV to a row-major pixel index.
pub fn uv_to_pixel(uv: Vec2, resolution: usize) -> Option<usize> {
    if resolution == 0 || !(-1.0..1.0).contains(&uv.x) || !(-1.0..1.0).contains(&uv.y) {
        return None;
    }

    let pixel = (uv + Vec2::ONE) * (resolution as f32 / 2.0);
    let last = resolution - 1;
    let x = (pixel.x as usize).min(last);
    let y = (pixel.y as usize).min(last);
    Some(y * resolution + x)
}
