//! Math types for the bake kernel

pub use glam::{Mat4, Vec2, Vec3, Vec4};

/// Smallest positive `f32` (the subnormal one), used for sign tests.
pub const SMALLEST_POSITIVE: f32 = f32::from_bits(1);

/// A light ray carrying the colour it still contributes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    direction: Vec3,
    inv_direction: Vec3,
    pub color: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3, color: Vec3) -> Self {
        Self {
            origin,
            direction,
            inv_direction: direction.recip(),
            color,
        }
    }

    pub fn direction(&self) -> Vec3 {
        self.direction
    }

    pub fn inv_direction(&self) -> Vec3 {
        self.inv_direction
    }

    pub fn set_direction(&mut self, direction: Vec3) {
        self.direction = direction;
        self.inv_direction = direction.recip();
    }

    pub fn at(&self, distance: f32) -> Vec3 {
        self.origin + distance * self.direction
    }
}

/// Axis-aligned box stored as min/max corners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn from_center_extent(center: Vec3, extent: Vec3) -> Self {
        Self {
            min: center - extent,
            max: center + extent,
        }
    }

    pub fn padded(self, amount: f32) -> Self {
        Self {
            min: self.min - Vec3::splat(amount),
            max: self.max + Vec3::splat(amount),
        }
    }

    /// Slab test. Only rejects; a pass does not imply a triangle hit.
    pub fn intersects(&self, ray: &Ray) -> bool {
        let t0 = (self.min - ray.origin) * ray.inv_direction();
        let t1 = (self.max - ray.origin) * ray.inv_direction();

        let t_near = t0.min(t1);
        let t_far = t0.max(t1);

        let enter = t_near.max_element();
        let exit = t_far.min_element();

        // NaN (origin on a slab with a zero direction component) keeps the box.
        !(enter > exit || exit < 0.0)
    }
}

/// Orthonormal-ish frame of a spotlight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightBasis {
    pub position: Vec3,
    pub forward: Vec3,
    pub up: Vec3,
    pub right: Vec3,
}

impl LightBasis {
    pub fn new(position: Vec3, forward: Vec3, up: Vec3) -> Self {
        Self {
            position,
            forward,
            up,
            right: up.cross(forward),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smallest_positive_is_subnormal() {
        assert!(SMALLEST_POSITIVE > 0.0);
        assert!(SMALLEST_POSITIVE < f32::MIN_POSITIVE);
        assert_eq!(SMALLEST_POSITIVE / 2.0, 0.0);
    }

    #[test]
    fn test_aabb_hit_and_miss() {
        let aabb = Aabb::from_center_extent(Vec3::new(0.0, 0.0, 5.0), Vec3::ONE);
        let toward = Ray::new(Vec3::ZERO, Vec3::Z, Vec3::ONE);
        let away = Ray::new(Vec3::ZERO, -Vec3::Z, Vec3::ONE);
        let beside = Ray::new(Vec3::new(3.0, 0.0, 0.0), Vec3::Z, Vec3::ONE);

        assert!(aabb.intersects(&toward));
        assert!(!aabb.intersects(&away));
        assert!(!aabb.intersects(&beside));
    }

    #[test]
    fn test_aabb_flat_box_with_padding() {
        let flat = Aabb::from_center_extent(Vec3::new(0.0, 0.0, 2.0), Vec3::new(1.0, 1.0, 0.0));
        let ray = Ray::new(Vec3::ZERO, Vec3::new(0.1, 0.1, 1.0).normalize(), Vec3::ONE);
        assert!(flat.padded(0.005).intersects(&ray));
    }

    #[test]
    fn test_light_basis_right_axis() {
        let basis = LightBasis::new(Vec3::ZERO, Vec3::Z, Vec3::Y);
        assert_eq!(basis.right, Vec3::X);
    }
}
