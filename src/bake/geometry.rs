//! Per-job scene snapshot.
//!
//! A [`GeometrySnapshot`] holds the pools exactly as the host sent them, after
//! every object record has been checked against them. When a job starts the
//! snapshot is flattened into [`WorldGeometry`]: world-space triangles grouped
//! per object behind a padded bounding box.

use crate::error::InvalidWorkload;
use crate::math::{Aabb, Vec3};
use crate::protocol::ObjectDatum;
use std::ops::Range;

/// Bounds are grown by this much on every axis so flat meshes still pass the slab test.
pub const BOUNDS_PADDING: f32 = 0.005;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    pub v0: Vec3,
    pub v1: Vec3,
    pub v2: Vec3,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorldObject {
    pub bounds: Aabb,
    pub triangles: Range<usize>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorldGeometry {
    pub objects: Vec<WorldObject>,
    pub triangles: Vec<Triangle>,
}

impl WorldGeometry {
    pub fn object_triangles(&self, object: &WorldObject) -> &[Triangle] {
        &self.triangles[object.triangles.clone()]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeometrySnapshot {
    vertices: Vec<Vec3>,
    indices: Vec<i32>,
    objects: Vec<ObjectDatum>,
}

impl GeometrySnapshot {
    pub fn new(
        vertices: Vec<Vec3>,
        indices: Vec<i32>,
        objects: Vec<ObjectDatum>,
    ) -> Result<Self, InvalidWorkload> {
        if indices.len() % 3 != 0 {
            return Err(InvalidWorkload::IndexPoolLength(indices.len()));
        }

        for (object, datum) in objects.iter().enumerate() {
            let range = index_range(datum, indices.len()).ok_or(InvalidWorkload::IndexRange {
                object,
                offset: datum.indices_offset,
                count: datum.indices_count,
                pool: indices.len(),
            })?;

            for &index in &indices[range] {
                let vertex = index as i64 + datum.vertices_offset as i64;
                if vertex < 0 || vertex >= vertices.len() as i64 {
                    return Err(InvalidWorkload::VertexIndex {
                        object,
                        vertex,
                        pool: vertices.len(),
                    });
                }
            }
        }

        Ok(Self {
            vertices,
            indices,
            objects,
        })
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.objects
            .iter()
            .map(|datum| datum.indices_count as usize / 3)
            .sum()
    }

    /// Transforms every object's triangles into world space.
    pub fn to_world(&self) -> WorldGeometry {
        let mut world = WorldGeometry {
            objects: Vec::with_capacity(self.objects.len()),
            triangles: Vec::with_capacity(self.triangle_count()),
        };

        for datum in &self.objects {
            let start = world.triangles.len();
            let offset = datum.indices_offset as usize;
            let count = datum.indices_count as usize;
            let vertex = |index: i32| {
                let local = self.vertices[(index as i64 + datum.vertices_offset as i64) as usize];
                datum.local_to_world.transform_point3(local)
            };

            for corners in self.indices[offset..offset + count].chunks_exact(3) {
                world.triangles.push(Triangle {
                    v0: vertex(corners[0]),
                    v1: vertex(corners[1]),
                    v2: vertex(corners[2]),
                });
            }

            world.objects.push(WorldObject {
                bounds: Aabb::from_center_extent(datum.bounds.center, datum.bounds.extent)
                    .padded(BOUNDS_PADDING),
                triangles: start..world.triangles.len(),
            });
        }

        world
    }
}

fn index_range(datum: &ObjectDatum, pool: usize) -> Option<Range<usize>> {
    if datum.indices_offset < 0 || datum.indices_count < 0 || datum.indices_count % 3 != 0 {
        return None;
    }
    let start = datum.indices_offset as usize;
    let end = start.checked_add(datum.indices_count as usize)?;
    (end <= pool).then_some(start..end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Mat4;
    use crate::protocol::Bounds;

    fn quad_object(indices_offset: i32, vertices_offset: i32) -> ObjectDatum {
        ObjectDatum {
            local_to_world: Mat4::from_translation(Vec3::new(0.0, 0.0, 10.0)),
            indices_offset,
            indices_count: 6,
            vertices_offset,
            bounds: Bounds {
                center: Vec3::new(0.5, 0.5, 10.0),
                extent: Vec3::new(0.5, 0.5, 0.0),
            },
        }
    }

    fn quad_vertices() -> Vec<Vec3> {
        vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ]
    }

    #[test]
    fn test_snapshot_to_world() {
        let snapshot =
            GeometrySnapshot::new(quad_vertices(), vec![0, 1, 2, 0, 2, 3], vec![quad_object(0, 0)])
                .unwrap();
        assert_eq!(snapshot.triangle_count(), 2);

        let world = snapshot.to_world();
        assert_eq!(world.objects.len(), 1);
        let triangles = world.object_triangles(&world.objects[0]);
        assert_eq!(triangles.len(), 2);
        assert_eq!(triangles[0].v1, Vec3::new(1.0, 0.0, 10.0));
        assert_eq!(world.objects[0].bounds.min.z, 10.0 - BOUNDS_PADDING);
    }

    #[test]
    fn test_vertex_offset_is_applied() {
        let mut vertices = vec![Vec3::splat(99.0)];
        vertices.extend(quad_vertices());
        let snapshot =
            GeometrySnapshot::new(vertices, vec![0, 1, 2, 0, 2, 3], vec![quad_object(0, 1)])
                .unwrap();
        let world = snapshot.to_world();
        assert_eq!(world.triangles[0].v0, Vec3::new(0.0, 0.0, 10.0));
    }

    #[test]
    fn test_empty_snapshot() {
        let snapshot = GeometrySnapshot::new(Vec::new(), Vec::new(), Vec::new()).unwrap();
        let world = snapshot.to_world();
        assert!(world.objects.is_empty());
        assert!(world.triangles.is_empty());
    }

    #[test]
    fn test_rejects_partial_triangle_pool() {
        let result = GeometrySnapshot::new(quad_vertices(), vec![0, 1], Vec::new());
        assert_eq!(result, Err(InvalidWorkload::IndexPoolLength(2)));
    }

    #[test]
    fn test_rejects_index_range_past_pool() {
        let result =
            GeometrySnapshot::new(quad_vertices(), vec![0, 1, 2], vec![quad_object(0, 0)]);
        assert!(matches!(result, Err(InvalidWorkload::IndexRange { object: 0, .. })));

        let result = GeometrySnapshot::new(
            quad_vertices(),
            vec![0, 1, 2, 0, 2, 3],
            vec![quad_object(-3, 0)],
        );
        assert!(matches!(result, Err(InvalidWorkload::IndexRange { .. })));
    }

    #[test]
    fn test_rejects_vertex_past_pool() {
        let result =
            GeometrySnapshot::new(quad_vertices(), vec![0, 1, 2, 0, 2, 3], vec![quad_object(0, 1)]);
        assert_eq!(
            result,
            Err(InvalidWorkload::VertexIndex {
                object: 0,
                vertex: 4,
                pool: 4
            })
        );

        let result = GeometrySnapshot::new(
            quad_vertices(),
            vec![0, -1, 2, 0, 2, 3],
            vec![quad_object(0, 0)],
        );
        assert!(matches!(result, Err(InvalidWorkload::VertexIndex { vertex: -1, .. })));
    }
}
