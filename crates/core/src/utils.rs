//! Geometric primitives shared across the engine.
//!
//! Provides the Point/Rect/Matrix tuple types, affine transform operations,
//! and rectangle helpers used by the cleanup pipeline. Matrices follow the
//! PDF convention: (a, b, c, d, e, f) maps (x, y) to
//! (ax + cy + e, bx + dy + f).

use crate::error::{CleanupError, Result};

/// Small epsilon for floating-point comparisons.
pub const EPSILON: f64 = 1e-9;

/// Epsilon used by region/geometry comparisons throughout the cleanup code.
pub const CLEANUP_EPSILON: f64 = 1e-4;

/// A 2D point (x, y).
pub type Point = (f64, f64);

/// A rectangle (x0, y0, x1, y1), (x0, y0) bottom-left, (x1, y1) top-right.
pub type Rect = (f64, f64, f64, f64);

/// A 6-element affine transformation matrix (a, b, c, d, e, f).
pub type Matrix = (f64, f64, f64, f64, f64, f64);

/// Identity transformation matrix.
pub const MATRIX_IDENTITY: Matrix = (1.0, 0.0, 0.0, 1.0, 0.0, 0.0);

/// Compares two floats for approximate equality.
#[inline]
pub fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
    (a - b).abs() < epsilon
}

/// Multiplies two matrices: result = m1 * m0.
/// This applies m0 first, then m1.
pub fn mult_matrix(m1: Matrix, m0: Matrix) -> Matrix {
    let (a1, b1, c1, d1, e1, f1) = m1;
    let (a0, b0, c0, d0, e0, f0) = m0;
    (
        a0 * a1 + c0 * b1,
        b0 * a1 + d0 * b1,
        a0 * c1 + c0 * d1,
        b0 * c1 + d0 * d1,
        a0 * e1 + c0 * f1 + e0,
        b0 * e1 + d0 * f1 + f0,
    )
}

/// Translates a matrix by (x, y) inside the projection.
pub fn translate_matrix(m: Matrix, v: Point) -> Matrix {
    let (a, b, c, d, e, f) = m;
    let (x, y) = v;
    (a, b, c, d, x * a + y * c + e, x * b + y * d + f)
}

/// Applies a matrix to a point.
pub fn apply_matrix_pt(m: Matrix, v: Point) -> Point {
    let (a, b, c, d, e, f) = m;
    let (x, y) = v;
    (a * x + c * y + e, b * x + d * y + f)
}

/// Inverts an affine matrix.
///
/// A near-zero determinant means the transform collapses the plane and the
/// cleanup region cannot be mapped through it.
pub fn invert_matrix(m: Matrix) -> Result<Matrix> {
    let (a, b, c, d, e, f) = m;
    let det = a * d - b * c;
    if det.abs() < EPSILON {
        return Err(CleanupError::NoninvertibleTransform);
    }
    let inv_det = 1.0 / det;
    Ok((
        d * inv_det,
        -b * inv_det,
        -c * inv_det,
        a * inv_det,
        (c * f - d * e) * inv_det,
        (b * e - a * f) * inv_det,
    ))
}

/// Normalizes a rectangle so x0 <= x1 and y0 <= y1.
pub fn normalize_rect(r: Rect) -> Rect {
    let (x0, y0, x1, y1) = r;
    (x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1))
}

/// Intersection of two normalized rectangles, or None when disjoint.
pub fn intersect_rects(a: Rect, b: Rect) -> Option<Rect> {
    let x0 = a.0.max(b.0);
    let y0 = a.1.max(b.1);
    let x1 = a.2.min(b.2);
    let y1 = a.3.min(b.3);
    if x0 < x1 && y0 < y1 {
        Some((x0, y0, x1, y1))
    } else {
        None
    }
}

/// The four corners of a rectangle in counter-clockwise order.
pub fn rect_corners(r: Rect) -> [Point; 4] {
    let (x0, y0, x1, y1) = r;
    [(x0, y0), (x1, y0), (x1, y1), (x0, y1)]
}

/// Axis-aligned bounding box of a point set.
pub fn points_bbox(pts: &[Point]) -> Option<Rect> {
    let (first, rest) = pts.split_first()?;
    let mut bbox = (first.0, first.1, first.0, first.1);
    for &(x, y) in rest {
        bbox.0 = bbox.0.min(x);
        bbox.1 = bbox.1.min(y);
        bbox.2 = bbox.2.max(x);
        bbox.3 = bbox.3.max(y);
    }
    Some(bbox)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mult_matrix_identity() {
        let identity = MATRIX_IDENTITY;
        assert_eq!(mult_matrix(identity, identity), identity);
    }

    #[test]
    fn test_apply_matrix_pt_identity() {
        assert_eq!(apply_matrix_pt(MATRIX_IDENTITY, (5.0, 10.0)), (5.0, 10.0));
    }

    #[test]
    fn test_invert_round_trips() {
        let m = (2.0, 0.0, 0.5, 3.0, 7.0, -4.0);
        let inv = invert_matrix(m).unwrap();
        let p = apply_matrix_pt(inv, apply_matrix_pt(m, (1.5, -2.0)));
        assert!(approx_eq(p.0, 1.5, 1e-9) && approx_eq(p.1, -2.0, 1e-9));
    }

    #[test]
    fn test_invert_singular_fails() {
        let m = (1.0, 2.0, 2.0, 4.0, 0.0, 0.0);
        assert!(invert_matrix(m).is_err());
    }

    #[test]
    fn test_intersect_rects() {
        assert_eq!(
            intersect_rects((0.0, 0.0, 10.0, 10.0), (5.0, 5.0, 20.0, 20.0)),
            Some((5.0, 5.0, 10.0, 10.0))
        );
        assert_eq!(
            intersect_rects((0.0, 0.0, 1.0, 1.0), (2.0, 2.0, 3.0, 3.0)),
            None
        );
    }
}
