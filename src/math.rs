//! Geometry helpers shared by the CPU and GPU paths.

use glam::Vec3;

/// Axis-aligned box defined by two diagonally opposite corners.
///
/// Doubles as the toroidal simulation domain: motion past `high` wraps
/// around to `low` and vice versa.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    /// Corner with the minimal coordinates.
    pub low: Vec3,
    /// Corner with the maximal coordinates.
    pub high: Vec3,
}

impl BoundingBox {
    pub fn new(low: Vec3, high: Vec3) -> Self {
        Self { low, high }
    }

    /// Cube centered on the origin, from `-half` to `+half` on every axis.
    pub fn cube(half: f32) -> Self {
        Self::new(Vec3::splat(-half), Vec3::splat(half))
    }

    #[inline]
    pub fn diagonal(&self) -> Vec3 {
        self.high - self.low
    }

    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.low + self.high) * 0.5
    }

    /// Half-open containment test, `low <= p < high` on every axis.
    pub fn contains(&self, p: Vec3) -> bool {
        p.cmpge(self.low).all() && p.cmplt(self.high).all()
    }

    /// Box of one of the eight octants.
    ///
    /// Octant bits: 4 selects the upper X half, 2 the upper Y half and 1 the
    /// upper Z half.
    pub fn octant(&self, index: usize) -> Self {
        let center = self.center();
        let mut child = *self;

        if index & 4 != 0 {
            child.low.x = center.x;
        } else {
            child.high.x = center.x;
        }
        if index & 2 != 0 {
            child.low.y = center.y;
        } else {
            child.high.y = center.y;
        }
        if index & 1 != 0 {
            child.low.z = center.z;
        } else {
            child.high.z = center.z;
        }
        child
    }

    /// Octant index a point falls into. Points on a dividing plane go to
    /// the lower half.
    #[inline]
    pub fn octant_of(&self, p: Vec3) -> usize {
        let center = self.center();
        let mut index = 0;
        if p.x > center.x {
            index += 4;
        }
        if p.y > center.y {
            index += 2;
        }
        if p.z > center.z {
            index += 1;
        }
        index
    }

    /// Point of the box closest to `p`.
    #[inline]
    pub fn closest_point(&self, p: Vec3) -> Vec3 {
        p.max(self.low).min(self.high)
    }

    /// Whether any point of the box lies within `range_sqr` of `p`.
    #[inline]
    pub fn intersects_sphere(&self, p: Vec3, range_sqr: f32) -> bool {
        dist2(p, self.closest_point(p)) <= range_sqr
    }
}

/// Squared distance between two points.
#[inline]
pub fn dist2(a: Vec3, b: Vec3) -> f32 {
    (a - b).length_squared()
}

/// Squared length of a vector.
#[inline]
pub fn len2(a: Vec3) -> f32 {
    a.length_squared()
}

/// Angle between two vectors in radians.
///
/// The cosine is clamped to `[-1, 1]`; if either vector has zero length the
/// NaN cosine clamps to 1 and the angle is 0.
pub fn angle(a: Vec3, b: Vec3) -> f32 {
    let cos = a.dot(b) / (a.length() * b.length());
    cos.min(1.0).max(-1.0).acos()
}

/// Rescale `v` to exactly `max` if it is longer than `max`.
#[inline]
pub fn limit(v: Vec3, max: f32) -> Vec3 {
    if len2(v) > max * max {
        v.normalize() * max
    } else {
        v
    }
}

/// Toroidal wrap of `p` into `[low, high)`.
pub fn wrap(p: Vec3, bbox: &BoundingBox) -> Vec3 {
    let diagonal = bbox.diagonal();
    let mut local = (p - bbox.low).rem_euclid(diagonal);

    // rem_euclid may round up to exactly the diagonal for tiny negatives
    for axis in 0..3 {
        if local[axis] >= diagonal[axis] {
            local[axis] = 0.0;
        }
    }
    let wrapped = local + bbox.low;

    // Adding `low` back can round up to `high` for the same reason
    let mut out = wrapped;
    for axis in 0..3 {
        if out[axis] >= bbox.high[axis] {
            out[axis] = bbox.low[axis];
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_octant_partitions_parent() {
        let bbox = BoundingBox::new(Vec3::new(-2.0, 0.0, 10.0), Vec3::new(2.0, 4.0, 12.0));
        let upper_x = bbox.octant(4);
        assert_eq!(upper_x.low, Vec3::new(0.0, 0.0, 10.0));
        assert_eq!(upper_x.high, Vec3::new(2.0, 2.0, 11.0));

        let all_upper = bbox.octant(7);
        assert_eq!(all_upper.low, bbox.center());
        assert_eq!(all_upper.high, bbox.high);
    }

    #[test]
    fn test_octant_of_ties_go_low() {
        let bbox = BoundingBox::cube(1.0);
        assert_eq!(bbox.octant_of(Vec3::ZERO), 0);
        assert_eq!(bbox.octant_of(Vec3::new(0.5, 0.0, 0.0)), 4);
        assert_eq!(bbox.octant_of(Vec3::new(0.0, 0.5, 0.5)), 3);
    }

    #[test]
    fn test_intersects_sphere() {
        let bbox = BoundingBox::new(Vec3::ZERO, Vec3::ONE);
        assert!(bbox.intersects_sphere(Vec3::new(0.5, 0.5, 0.5), 0.0));
        assert!(bbox.intersects_sphere(Vec3::new(2.0, 0.5, 0.5), 1.0));
        assert!(!bbox.intersects_sphere(Vec3::new(2.0, 2.0, 0.5), 1.5));
    }

    #[test]
    fn test_limit() {
        let v = Vec3::new(3.0, 4.0, 0.0);
        assert_eq!(limit(v, 10.0), v);

        let limited = limit(v, 1.0);
        assert!((limited.length() - 1.0).abs() < 1e-6);
        assert!(limited.normalize().dot(v.normalize()) > 0.9999);
    }

    #[test]
    fn test_angle_degenerate_is_zero() {
        assert_eq!(angle(Vec3::ZERO, Vec3::X), 0.0);
        assert!((angle(Vec3::X, Vec3::Y) - std::f32::consts::FRAC_PI_2).abs() < 1e-6);
        assert!((angle(Vec3::X, -Vec3::X) - std::f32::consts::PI).abs() < 1e-6);
    }

    #[test]
    fn test_wrap() {
        let bbox = BoundingBox::cube(100.0);
        assert_eq!(wrap(Vec3::new(101.0, 0.0, -101.0), &bbox), Vec3::new(-99.0, 0.0, 99.0));
        assert_eq!(wrap(Vec3::new(100.0, -100.0, 0.0), &bbox), Vec3::new(-100.0, -100.0, 0.0));
        // several laps at once
        assert_eq!(wrap(Vec3::new(650.0, 0.0, 0.0), &bbox), Vec3::new(50.0, 0.0, 0.0));

        let tiny = wrap(Vec3::new(-100.0 - 1e-9, 0.0, 0.0), &bbox);
        assert!(bbox.contains(tiny));
    }
}
