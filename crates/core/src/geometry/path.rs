//! Path model shared by fill, clip, and offset-stroke geometry.

use smallvec::SmallVec;

use crate::canvas::ContentWriter;
use crate::utils::{Matrix, Point, Rect, apply_matrix_pt, points_bbox};

/// Control-point offset placing a cubic Bézier quadrant on a unit circle.
pub const BEZIER_CIRCLE_K: f64 = 0.55191502449;

/// Flattening tolerance (maximum sagitta) used when curves are reduced to
/// polylines for clipping.
pub const FLATTEN_TOLERANCE: f64 = 0.02;

/// One segment of a subpath, holding its end point(s). The start point lives
/// on the subpath (or is the previous segment's end).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Segment {
    Line(Point),
    Cubic(Point, Point, Point),
}

/// A single connected run of segments.
#[derive(Debug, Clone, PartialEq)]
pub struct Subpath {
    pub start: Point,
    pub segments: Vec<Segment>,
    pub closed: bool,
}

impl Subpath {
    pub fn new(start: Point) -> Self {
        Self {
            start,
            segments: Vec::new(),
            closed: false,
        }
    }

    /// Polygon subpath from a point loop (implicitly closed).
    pub fn polygon(points: &[Point]) -> Self {
        let mut sp = Self::new(points[0]);
        for &p in &points[1..] {
            sp.segments.push(Segment::Line(p));
        }
        sp.closed = true;
        sp
    }

    /// Approximated circle: four Bézier quadrants, control points offset by
    /// `radius * BEZIER_CIRCLE_K` along the axes.
    pub fn circle(center: Point, radius: f64) -> Self {
        let (cx, cy) = center;
        let k = radius * BEZIER_CIRCLE_K;
        let mut sp = Self::new((cx + radius, cy));
        sp.segments.push(Segment::Cubic(
            (cx + radius, cy + k),
            (cx + k, cy + radius),
            (cx, cy + radius),
        ));
        sp.segments.push(Segment::Cubic(
            (cx - k, cy + radius),
            (cx - radius, cy + k),
            (cx - radius, cy),
        ));
        sp.segments.push(Segment::Cubic(
            (cx - radius, cy - k),
            (cx - k, cy - radius),
            (cx, cy - radius),
        ));
        sp.segments.push(Segment::Cubic(
            (cx + k, cy - radius),
            (cx + radius, cy - k),
            (cx + radius, cy),
        ));
        sp.closed = true;
        sp
    }

    /// Piecewise-linear approximation.
    pub fn flatten(&self, tolerance: f64) -> Polyline {
        let mut points: SmallVec<[Point; 16]> = SmallVec::new();
        points.push(self.start);
        let mut current = self.start;
        for seg in &self.segments {
            match *seg {
                Segment::Line(p) => {
                    points.push(p);
                    current = p;
                }
                Segment::Cubic(c1, c2, p) => {
                    flatten_cubic(current, c1, c2, p, tolerance, 0, &mut points);
                    current = p;
                }
            }
        }
        Polyline {
            points: points.into_vec(),
            closed: self.closed,
        }
    }

    pub fn transform(&self, m: Matrix) -> Self {
        let map = |p: Point| apply_matrix_pt(m, p);
        Self {
            start: map(self.start),
            segments: self
                .segments
                .iter()
                .map(|seg| match *seg {
                    Segment::Line(p) => Segment::Line(map(p)),
                    Segment::Cubic(c1, c2, p) => Segment::Cubic(map(c1), map(c2), map(p)),
                })
                .collect(),
            closed: self.closed,
        }
    }
}

/// Recursive de Casteljau subdivision; appends interior + end points.
fn flatten_cubic(
    p0: Point,
    c1: Point,
    c2: Point,
    p3: Point,
    tolerance: f64,
    depth: u32,
    out: &mut SmallVec<[Point; 16]>,
) {
    let flat = point_segment_distance(c1, p0, p3).max(point_segment_distance(c2, p0, p3));
    if flat <= tolerance || depth >= 16 {
        out.push(p3);
        return;
    }
    let mid = |a: Point, b: Point| ((a.0 + b.0) / 2.0, (a.1 + b.1) / 2.0);
    let ab = mid(p0, c1);
    let bc = mid(c1, c2);
    let cd = mid(c2, p3);
    let abc = mid(ab, bc);
    let bcd = mid(bc, cd);
    let abcd = mid(abc, bcd);
    flatten_cubic(p0, ab, abc, abcd, tolerance, depth + 1, out);
    flatten_cubic(abcd, bcd, cd, p3, tolerance, depth + 1, out);
}

/// Distance from `p` to segment `a`..`b`.
pub fn point_segment_distance(p: Point, a: Point, b: Point) -> f64 {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let len2 = dx * dx + dy * dy;
    if len2 <= f64::EPSILON {
        return (p.0 - a.0).hypot(p.1 - a.1);
    }
    let t = (((p.0 - a.0) * dx + (p.1 - a.1) * dy) / len2).clamp(0.0, 1.0);
    let (cx, cy) = (a.0 + t * dx, a.1 + t * dy);
    (p.0 - cx).hypot(p.1 - cy)
}

/// A flattened subpath.
#[derive(Debug, Clone, PartialEq)]
pub struct Polyline {
    pub points: Vec<Point>,
    pub closed: bool,
}

impl Polyline {
    pub fn bbox(&self) -> Option<Rect> {
        points_bbox(&self.points)
    }
}

/// Ordered list of subpaths, used uniformly for fill, clip, and stroke
/// geometry.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Path {
    pub subpaths: Vec<Subpath>,
}

impl Path {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.subpaths.is_empty()
    }

    pub fn push(&mut self, subpath: Subpath) {
        self.subpaths.push(subpath);
    }

    /// Axis-aligned rectangle as one closed subpath (the `re` operator).
    pub fn push_rect(&mut self, x: f64, y: f64, w: f64, h: f64) {
        self.push(Subpath::polygon(&[
            (x, y),
            (x + w, y),
            (x + w, y + h),
            (x, y + h),
        ]));
    }

    pub fn transform(&self, m: Matrix) -> Self {
        Self {
            subpaths: self.subpaths.iter().map(|sp| sp.transform(m)).collect(),
        }
    }

    pub fn flatten(&self, tolerance: f64) -> Vec<Polyline> {
        self.subpaths
            .iter()
            .map(|sp| sp.flatten(tolerance))
            .collect()
    }

    pub fn bbox(&self) -> Option<Rect> {
        let mut acc: Option<Rect> = None;
        for sp in &self.subpaths {
            if let Some(b) = sp.flatten(FLATTEN_TOLERANCE).bbox() {
                acc = Some(match acc {
                    None => b,
                    Some(a) => (a.0.min(b.0), a.1.min(b.1), a.2.max(b.2), a.3.max(b.3)),
                });
            }
        }
        acc
    }

    /// Write the path construction operators.
    pub fn emit(&self, writer: &mut ContentWriter) {
        for sp in &self.subpaths {
            writer.move_to(sp.start.0, sp.start.1);
            for seg in &sp.segments {
                match *seg {
                    Segment::Line(p) => writer.line_to(p.0, p.1),
                    Segment::Cubic(c1, c2, p) => {
                        writer.curve_to(c1.0, c1.1, c2.0, c2.1, p.0, p.1)
                    }
                }
            }
            if sp.closed {
                writer.close_path();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten_line_only() {
        let mut sp = Subpath::new((0.0, 0.0));
        sp.segments.push(Segment::Line((10.0, 0.0)));
        let poly = sp.flatten(0.1);
        assert_eq!(poly.points, vec![(0.0, 0.0), (10.0, 0.0)]);
    }

    #[test]
    fn test_flatten_cubic_stays_close() {
        let mut sp = Subpath::new((0.0, 0.0));
        sp.segments
            .push(Segment::Cubic((0.0, 10.0), (10.0, 10.0), (10.0, 0.0)));
        let poly = sp.flatten(0.05);
        assert!(poly.points.len() > 4, "curve should subdivide");
        // all interior points stay within the control hull
        for &(x, y) in &poly.points {
            assert!((-0.01..=10.01).contains(&x));
            assert!((-0.01..=10.01).contains(&y));
        }
    }

    #[test]
    fn test_circle_bbox() {
        let circle = Subpath::circle((5.0, 5.0), 2.0);
        let poly = circle.flatten(0.01);
        let bbox = poly.bbox().unwrap();
        assert!((bbox.0 - 3.0).abs() < 0.05);
        assert!((bbox.1 - 3.0).abs() < 0.05);
        assert!((bbox.2 - 7.0).abs() < 0.05);
        assert!((bbox.3 - 7.0).abs() < 0.05);
    }

    #[test]
    fn test_rect_subpath() {
        let mut path = Path::new();
        path.push_rect(1.0, 2.0, 3.0, 4.0);
        let poly = path.subpaths[0].flatten(0.1);
        assert!(poly.closed);
        assert_eq!(poly.points.len(), 4);
    }
}
