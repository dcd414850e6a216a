//! Polygon intersection and difference against cleanup regions.
//!
//! Regions arrive as axis-aligned rectangles in device space; mapped through
//! an inverse CTM they stay parallelograms, so every clip shape here is
//! convex. Subjects are arbitrary flattened subpaths. Intersection tests use
//! separating-axis projection with an epsilon wide enough that degenerate
//! subjects (zero-height descent boxes collapsing to a segment) still
//! register against region edges they lie on. The difference keeps each
//! subpath's orientation, so the caller's fill rule stays valid for the
//! rewritten path.

use itertools::Itertools;
use smallvec::SmallVec;
use tracing::warn;

use crate::geometry::path::{FLATTEN_TOLERANCE, Path, Subpath};
use crate::geometry::FillRule;
use crate::utils::{
    CLEANUP_EPSILON, Matrix, Point, Rect, invert_matrix, points_bbox, rect_corners,
};

/// Minimum absolute area a clipped fragment must keep to survive.
const AREA_EPSILON: f64 = 1e-7;

/// A four-point polygon (region parallelogram or glyph box).
pub type Quad = [Point; 4];

/// Result of [`filter_fill_path`].
#[derive(Debug, Clone, PartialEq)]
pub enum FilteredPath {
    /// No subpath touched any region; the caller keeps the original
    /// operator bytes.
    Unchanged,
    /// The difference, possibly empty when the regions swallowed
    /// everything.
    Rewritten(Path),
}

impl FilteredPath {
    pub fn is_unchanged(&self) -> bool {
        matches!(self, FilteredPath::Unchanged)
    }
}

/// Signed polygon area (shoelace). Positive for counter-clockwise rings.
pub fn signed_area(pts: &[Point]) -> f64 {
    if pts.len() < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for (&(x0, y0), &(x1, y1)) in pts.iter().circular_tuple_windows() {
        sum += x0 * y1 - x1 * y0;
    }
    sum / 2.0
}

/// Transform the corners of a rectangle, keeping polygon order.
pub fn transformed_rect_quad(m: Matrix, rect: Rect) -> Quad {
    let corners = rect_corners(rect);
    let map = |p: Point| crate::utils::apply_matrix_pt(m, p);
    [
        map(corners[0]),
        map(corners[1]),
        map(corners[2]),
        map(corners[3]),
    ]
}

/// Axis-aligned bounding box of a quad.
pub fn quad_bbox(q: &Quad) -> Rect {
    points_bbox(q).unwrap_or((0.0, 0.0, 0.0, 0.0))
}

/// Drop consecutive duplicate points (and a duplicated closing point).
fn distinct_points(pts: &[Point]) -> SmallVec<[Point; 8]> {
    let mut out: SmallVec<[Point; 8]> = SmallVec::new();
    for &p in pts {
        if out
            .last()
            .is_none_or(|&q: &Point| (p.0 - q.0).hypot(p.1 - q.1) > 1e-9)
        {
            out.push(p);
        }
    }
    if out.len() > 1
        && let (Some(&first), Some(&last)) = (out.first(), out.last())
        && (first.0 - last.0).hypot(first.1 - last.1) <= 1e-9
    {
        out.pop();
    }
    out
}

fn project(pts: &[Point], axis: Point) -> (f64, f64) {
    let mut min = f64::MAX;
    let mut max = f64::MIN;
    for &(x, y) in pts {
        let d = x * axis.0 + y * axis.1;
        min = min.min(d);
        max = max.max(d);
    }
    (min, max)
}

fn push_axes(pts: &[Point], degenerate: bool, axes: &mut SmallVec<[Point; 12]>) {
    for (&a, &b) in pts.iter().circular_tuple_windows() {
        let (dx, dy) = (b.0 - a.0, b.1 - a.1);
        let len = dx.hypot(dy);
        if len <= 1e-12 {
            continue;
        }
        axes.push((-dy / len, dx / len));
        if degenerate {
            // collinear degenerate shapes also separate along the edge
            // direction, which no normal of theirs can witness
            axes.push((dx / len, dy / len));
        }
    }
}

/// Closed-set intersection test for two quads with epsilon tolerance.
///
/// Degenerate inputs (segments, points) fall out of the same projection
/// machinery: a degenerate subject lying along a clip edge projects onto
/// every axis inside the clip's span and therefore intersects.
pub fn quads_intersect(subject: &Quad, clip: &Quad) -> bool {
    let a = distinct_points(subject);
    let b = distinct_points(clip);
    if a.is_empty() || b.is_empty() {
        return false;
    }

    let a_degenerate = signed_area(&a).abs() <= CLEANUP_EPSILON * CLEANUP_EPSILON;
    let b_degenerate = signed_area(&b).abs() <= CLEANUP_EPSILON * CLEANUP_EPSILON;

    let mut axes: SmallVec<[Point; 12]> = SmallVec::new();
    push_axes(&a, a_degenerate, &mut axes);
    push_axes(&b, b_degenerate, &mut axes);

    if axes.is_empty() {
        // both collapsed to points
        let (p, q) = (a[0], b[0]);
        return (p.0 - q.0).hypot(p.1 - q.1) <= CLEANUP_EPSILON;
    }

    for axis in axes {
        let (amin, amax) = project(&a, axis);
        let (bmin, bmax) = project(&b, axis);
        if amin > bmax + CLEANUP_EPSILON || bmin > amax + CLEANUP_EPSILON {
            return false;
        }
    }
    true
}

/// Ring in counter-clockwise orientation.
fn ensure_ccw(pts: &[Point]) -> Vec<Point> {
    if signed_area(pts) < 0.0 {
        pts.iter().rev().copied().collect()
    } else {
        pts.to_vec()
    }
}

/// Sutherland-Hodgman clip of an arbitrary ring against one half-plane:
/// keeps the side to the left of the directed line a -> b.
fn clip_halfplane(pts: &[Point], a: Point, b: Point) -> Vec<Point> {
    let side = |p: Point| (b.0 - a.0) * (p.1 - a.1) - (b.1 - a.1) * (p.0 - a.0);
    let mut out = Vec::with_capacity(pts.len() + 2);
    if pts.is_empty() {
        return out;
    }
    for (&cur, &next) in pts.iter().circular_tuple_windows() {
        let s_cur = side(cur);
        let s_next = side(next);
        if s_cur >= -1e-9 {
            out.push(cur);
        }
        if (s_cur > 1e-9 && s_next < -1e-9) || (s_cur < -1e-9 && s_next > 1e-9) {
            let t = s_cur / (s_cur - s_next);
            out.push((
                cur.0 + t * (next.0 - cur.0),
                cur.1 + t * (next.1 - cur.1),
            ));
        }
    }
    out
}

/// Clip an arbitrary ring against a convex polygon; the classic use is a
/// glyph quad against a region parallelogram.
pub fn convex_clip(subject: &[Point], clip: &[Point]) -> Vec<Point> {
    let clip = ensure_ccw(&distinct_points(clip));
    if clip.len() < 3 {
        return Vec::new();
    }
    let mut out = subject.to_vec();
    for (&a, &b) in clip.iter().circular_tuple_windows() {
        if out.len() < 3 {
            return Vec::new();
        }
        out = clip_halfplane(&out, a, b);
    }
    out
}

/// `area(subject ∩ clip) / area(subject)`, or None when the subject is
/// degenerate. Both quads must be convex, which holds for glyph boxes and
/// region parallelograms.
pub fn intersection_ratio(subject: &Quad, clip: &Quad) -> Option<f64> {
    let subject_ring = ensure_ccw(&distinct_points(subject));
    let subject_area = signed_area(&subject_ring).abs();
    if subject_area <= CLEANUP_EPSILON * CLEANUP_EPSILON {
        return None;
    }
    let inter = convex_clip(&subject_ring, clip);
    Some(signed_area(&inter).abs() / subject_area)
}

/// Does a cleanup region quad hit the subject quad, honoring the optional
/// overlap-ratio mode? With a ratio set, the intersection must exceed
/// `ratio + ε` of the subject's area; degenerate subjects fall back to the
/// binary test.
pub fn region_hits_quad(region: &Quad, subject: &Quad, overlap_ratio: Option<f64>) -> bool {
    match overlap_ratio {
        Some(ratio) => match intersection_ratio(subject, region) {
            Some(r) => r > ratio + CLEANUP_EPSILON,
            None => quads_intersect(subject, region),
        },
        None => quads_intersect(subject, region),
    }
}

/// Even-odd containment for a single ring.
fn ring_contains(pts: &[Point], p: Point) -> bool {
    let mut inside = false;
    for (&(x0, y0), &(x1, y1)) in pts.iter().circular_tuple_windows() {
        if (y0 > p.1) != (y1 > p.1) {
            let x_cross = x0 + (p.1 - y0) / (y1 - y0) * (x1 - x0);
            if p.0 < x_cross {
                inside = !inside;
            }
        }
    }
    inside
}

fn segments_cross(a1: Point, a2: Point, b1: Point, b2: Point) -> bool {
    let orient = |p: Point, q: Point, r: Point| {
        (q.0 - p.0) * (r.1 - p.1) - (q.1 - p.1) * (r.0 - p.0)
    };
    let d1 = orient(b1, b2, a1);
    let d2 = orient(b1, b2, a2);
    let d3 = orient(a1, a2, b1);
    let d4 = orient(a1, a2, b2);
    ((d1 > 1e-9 && d2 < -1e-9) || (d1 < -1e-9 && d2 > 1e-9))
        && ((d3 > 1e-9 && d4 < -1e-9) || (d3 < -1e-9 && d4 > 1e-9))
}

#[derive(Debug, PartialEq, Eq)]
enum Relation {
    Disjoint,
    Touched,
}

/// Does subtracting the (convex, CCW) region change this ring at all?
fn classify(ring: &[Point], region: &[Point]) -> Relation {
    let strictly_inside = |p: Point| {
        region.iter().circular_tuple_windows().all(|(&a, &b)| {
            (b.0 - a.0) * (p.1 - a.1) - (b.1 - a.1) * (p.0 - a.0) > 1e-9
        })
    };
    if ring.iter().any(|&p| strictly_inside(p)) {
        return Relation::Touched;
    }
    for (&a1, &a2) in ring.iter().circular_tuple_windows() {
        for (&b1, &b2) in region.iter().circular_tuple_windows() {
            if segments_cross(a1, a2, b1, b2) {
                return Relation::Touched;
            }
        }
    }
    // region fully inside the ring (a hole is about to be cut)
    if region.iter().any(|&p| ring_contains(ring, p)) {
        return Relation::Touched;
    }
    Relation::Disjoint
}

/// Subtract one convex CCW region from a ring.
///
/// The region's complement decomposes into half-plane wedges (outside edge
/// i, inside edges 0..i); clipping the ring to each wedge yields disjoint
/// fragments whose union is ring minus region, with orientation preserved.
fn subtract_region(ring: &[Point], region: &[Point]) -> Vec<Vec<Point>> {
    let n = region.len();
    let mut out = Vec::new();
    for i in 0..n {
        // outside of CCW edge i = left of the reversed edge
        let mut part = clip_halfplane(ring, region[(i + 1) % n], region[i]);
        for j in 0..i {
            if part.len() < 3 {
                break;
            }
            part = clip_halfplane(&part, region[j], region[(j + 1) % n]);
        }
        if part.len() >= 3 && signed_area(&part).abs() > AREA_EPSILON {
            out.push(part);
        }
    }
    out
}

/// Boolean difference of a path against the union of cleanup regions.
///
/// Regions are device-space rectangles; they are mapped into the path's
/// local space through the inverse CTM. A noninvertible CTM is logged and
/// leaves the path alone (every region is skipped). Open subpaths are
/// implicitly closed, matching fill semantics. Returns
/// [`FilteredPath::Unchanged`] when no subpath actually touches a region.
pub fn filter_fill_path(
    path: &Path,
    ctm: Matrix,
    _fill_rule: FillRule,
    regions: &[Rect],
) -> FilteredPath {
    if regions.is_empty() || path.is_empty() {
        return FilteredPath::Unchanged;
    }
    let inverse = match invert_matrix(ctm) {
        Ok(m) => m,
        Err(_) => {
            warn!(?ctm, "noninvertible transform, leaving path unfiltered");
            return FilteredPath::Unchanged;
        }
    };

    let local_regions: Vec<Vec<Point>> = regions
        .iter()
        .filter_map(|&rect| {
            let quad = transformed_rect_quad(inverse, rect);
            let ring = ensure_ccw(&distinct_points(&quad));
            if ring.len() < 3 || signed_area(&ring).abs() <= AREA_EPSILON {
                warn!(?rect, "cleanup region degenerates in path space, skipping");
                return None;
            }
            Some(ring)
        })
        .collect();
    if local_regions.is_empty() {
        return FilteredPath::Unchanged;
    }

    let mut rings: Vec<Vec<Point>> = path
        .flatten(FLATTEN_TOLERANCE)
        .into_iter()
        .map(|poly| distinct_points(&poly.points).into_vec())
        .filter(|ring| ring.len() >= 3)
        .collect();

    let mut changed = false;
    for region in &local_regions {
        let mut next = Vec::with_capacity(rings.len());
        for ring in rings {
            match classify(&ring, region) {
                Relation::Disjoint => next.push(ring),
                Relation::Touched => {
                    changed = true;
                    next.extend(subtract_region(&ring, region));
                }
            }
        }
        rings = next;
    }

    if !changed {
        return FilteredPath::Unchanged;
    }
    let mut out = Path::new();
    for ring in rings {
        if ring.len() >= 3 && signed_area(&ring).abs() > AREA_EPSILON {
            out.push(Subpath::polygon(&ring));
        }
    }
    FilteredPath::Rewritten(out)
}

/// Sampled area covered by a set of rings under a fill rule, within the
/// given bounds. Test support for the area and idempotence laws.
pub fn estimate_covered_area(
    rings: &[Vec<Point>],
    rule: FillRule,
    bounds: Rect,
    resolution: usize,
) -> f64 {
    let (x0, y0, x1, y1) = bounds;
    let (w, h) = (x1 - x0, y1 - y0);
    if w <= 0.0 || h <= 0.0 || resolution == 0 {
        return 0.0;
    }
    let mut covered = 0usize;
    for iy in 0..resolution {
        let py = y0 + (iy as f64 + 0.5) / resolution as f64 * h;
        for ix in 0..resolution {
            let px = x0 + (ix as f64 + 0.5) / resolution as f64 * w;
            let mut winding = 0i32;
            let mut parity = false;
            for ring in rings {
                for (&(ax, ay), &(bx, by)) in ring.iter().circular_tuple_windows() {
                    if (ay > py) != (by > py) {
                        let x_cross = ax + (py - ay) / (by - ay) * (bx - ax);
                        if px < x_cross {
                            parity = !parity;
                            winding += if by > ay { 1 } else { -1 };
                        }
                    }
                }
            }
            let inside = match rule {
                FillRule::Nonzero => winding != 0,
                FillRule::EvenOdd => parity,
            };
            if inside {
                covered += 1;
            }
        }
    }
    covered as f64 / (resolution * resolution) as f64 * w * h
}
