//! Root triangles, subdivision and point lookup.

use crate::error::{HtmError, Result};
use crate::{Coordinate, TrixelId, Vector3, MAX_LEVEL};

/// Tolerance for points lying exactly on a trixel edge.
const EPSILON: f64 = 1.0e-15;

const V0: Vector3 = Vector3::new(0.0, 0.0, 1.0);
const V1: Vector3 = Vector3::new(1.0, 0.0, 0.0);
const V2: Vector3 = Vector3::new(0.0, 1.0, 0.0);
const V3: Vector3 = Vector3::new(-1.0, 0.0, 0.0);
const V4: Vector3 = Vector3::new(0.0, -1.0, 0.0);
const V5: Vector3 = Vector3::new(0.0, 0.0, -1.0);

/// Octahedron faces in id order: S0..S3 (ids 8..=11), N0..N3 (ids 12..=15).
/// Corners are counter-clockwise seen from outside the sphere.
const ROOTS: [Triangle; 8] = [
    Triangle::new(V1, V5, V2),
    Triangle::new(V2, V5, V3),
    Triangle::new(V3, V5, V4),
    Triangle::new(V4, V5, V1),
    Triangle::new(V1, V0, V4),
    Triangle::new(V4, V0, V3),
    Triangle::new(V3, V0, V2),
    Triangle::new(V2, V0, V1),
];

/// A spherical triangle given by its three corners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    pub corners: [Vector3; 3],
}

impl Triangle {
    /// Create a triangle from counter-clockwise corners.
    pub const fn new(a: Vector3, b: Vector3, c: Vector3) -> Self {
        Self { corners: [a, b, c] }
    }

    /// Check whether a unit vector lies inside or on the edge of this triangle.
    pub fn contains(&self, point: &Vector3) -> bool {
        let [a, b, c] = &self.corners;
        a.cross(b).dot(point) >= -EPSILON
            && b.cross(c).dot(point) >= -EPSILON
            && c.cross(a).dot(point) >= -EPSILON
    }

    /// Split into four children, in child index order.
    pub fn subdivide(&self) -> [Triangle; 4] {
        let [a, b, c] = self.corners;
        let w0 = b.midpoint(&c);
        let w1 = a.midpoint(&c);
        let w2 = a.midpoint(&b);
        [
            Triangle::new(a, w2, w1),
            Triangle::new(b, w0, w2),
            Triangle::new(c, w1, w0),
            Triangle::new(w0, w1, w2),
        ]
    }
}

/// Trixel containing the given location at the given level.
pub fn trixel_at(location: &Coordinate, level: u8) -> Result<TrixelId> {
    location.validate()?;
    lookup(&location.to_vector(), level)
}

/// Trixel containing the given unit vector at the given level.
///
/// Points on a shared edge go to the first matching trixel in id order, so
/// the result is deterministic and every level refines the previous one.
pub fn lookup(point: &Vector3, level: u8) -> Result<TrixelId> {
    if level > MAX_LEVEL {
        return Err(HtmError::LevelOutOfRange {
            level,
            max: MAX_LEVEL,
        });
    }

    let index = ROOTS
        .iter()
        .position(|t| t.contains(point))
        .ok_or(HtmError::Uncovered)?;
    let mut triangle = ROOTS[index];
    let mut raw = TrixelId::root(index as u64).value();

    for _ in 0..level {
        let children = triangle.subdivide();
        // A point inside the parent that is in none of the corner children is
        // in the centre one.
        let child = children[..3]
            .iter()
            .position(|t| t.contains(point))
            .unwrap_or(3);
        raw = raw * 4 + child as u64;
        triangle = children[child];
    }

    TrixelId::new(raw)
}
