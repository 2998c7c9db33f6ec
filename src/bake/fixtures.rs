//! Scenes shared by the unit tests.

use crate::math::Vec3;
use crate::protocol::{Bounds, ObjectDatum, WorkloadRequest};

/// A 2x2 bake with the light at the origin looking down +Z and one triangle at
/// z = 2 facing it. The triangle covers every pixel centre except (1, 1), so a
/// centred pass lights only pixel 3.
pub(crate) fn partial_blocker_request(workload_id: i32, sample_count: i32) -> WorkloadRequest {
    WorkloadRequest {
        workload_id,
        sample_count,
        min_range: 0.0,
        max_range: 100.0,
        shadow_focus_plane: 1.0,
        resolution: 2,
        bounce_count: 1,
        light_position: Vec3::ZERO,
        light_forward: Vec3::Z,
        light_upward: Vec3::Y,
        light_theta_rad: std::f32::consts::FRAC_PI_4,
        vertices: vec![
            Vec3::new(-5.0, -5.0, 2.0),
            Vec3::new(-5.0, 6.0, 2.0),
            Vec3::new(6.0, -5.0, 2.0),
        ],
        indices: vec![0, 1, 2],
        object_data: vec![ObjectDatum {
            indices_count: 3,
            bounds: Bounds {
                center: Vec3::new(0.5, 0.5, 2.0),
                extent: Vec3::new(5.5, 5.5, 0.0),
            },
            ..ObjectDatum::default()
        }],
    }
}
