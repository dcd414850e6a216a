//! Stroke-to-fill conversion: dash expansion and outline offsetting.
//!
//! A zero-width line cannot be subtracted from a region, so stroked paths
//! become their painted outline before clipping: dashes are expanded into
//! separate pieces, each piece is offset by half the line width into a
//! closed envelope ring, and degenerate (zero-length) pieces turn into cap
//! dots. The caller runs the result through `filter_fill_path` and paints
//! it with the stroke color under the nonzero rule.

use std::f64::consts::{PI, TAU};

use crate::cleanup::location::OffsetProperties;
use crate::geometry::path::{FLATTEN_TOLERANCE, Path, Polyline, Subpath};
use crate::model::{CapStyle, DashPattern, GraphicsState, JoinStyle};
use crate::utils::Point;

/// Zero-width strokes render as hairlines; give them measurable area.
const HAIRLINE_HALF_WIDTH: f64 = 0.05;

/// Inner-corner miter points farther than this (in half-width units) from
/// the vertex fall back to the two plain offset points.
const INNER_MITER_CLAMP: f64 = 100.0;

/// A dash piece that collapsed to a single point.
#[derive(Debug, Clone, Copy)]
struct Dot {
    center: Point,
    tangent: Option<Point>,
}

/// Convert a stroked path into equivalent fill geometry.
pub fn stroke_to_fill(path: &Path, state: &GraphicsState, offset: &OffsetProperties) -> Path {
    let half = (state.line_width / 2.0).max(HAIRLINE_HALF_WIDTH);
    let tolerance = if offset.dynamic_multiplier {
        offset.arc_tolerance * half
    } else {
        offset.arc_tolerance
    };
    let step = arc_step(half, tolerance);

    let polylines = path.flatten(FLATTEN_TOLERANCE);
    let fallback = fallback_tangent(&polylines);

    let mut out = Path::new();
    for poly in &polylines {
        let pts = dedupe(&poly.points);
        if pts.len() < 2 {
            // a lone point strokes as a cap dot
            if let Some(&center) = pts.first() {
                emit_dot(
                    &mut out,
                    Dot {
                        center,
                        tangent: None,
                    },
                    half,
                    state.line_cap,
                    fallback,
                );
            }
            continue;
        }

        let (runs, dots) = if state.dash.is_solid() {
            (vec![(pts.clone(), poly.closed)], Vec::new())
        } else {
            expand_dashes(&pts, poly.closed, &state.dash)
        };

        for (run, closed) in runs {
            let run = dedupe(&run);
            if run.len() < 2 {
                if let Some(&center) = run.first() {
                    emit_dot(
                        &mut out,
                        Dot {
                            center,
                            tangent: None,
                        },
                        half,
                        state.line_cap,
                        fallback,
                    );
                }
                continue;
            }
            if closed {
                // annulus: shrunk ring plus grown ring of opposite winding
                let inner = offset_side(&run, true, half, state, step);
                let reversed: Vec<Point> = run.iter().rev().copied().collect();
                let outer = offset_side(&reversed, true, half, state, step);
                if inner.len() >= 3 {
                    out.push(Subpath::polygon(&inner));
                }
                if outer.len() >= 3 {
                    out.push(Subpath::polygon(&outer));
                }
            } else {
                let ring = open_envelope(&run, half, state, step);
                if ring.len() >= 3 {
                    out.push(Subpath::polygon(&ring));
                }
            }
        }
        for dot in dots {
            emit_dot(&mut out, dot, half, state.line_cap, fallback);
        }
    }
    out
}

fn dedupe(pts: &[Point]) -> Vec<Point> {
    let mut out: Vec<Point> = Vec::with_capacity(pts.len());
    for &p in pts {
        if out.last().is_none_or(|q| (p.0 - q.0).hypot(p.1 - q.1) > 1e-9) {
            out.push(p);
        }
    }
    out
}

/// First direction found anywhere in the flattened path; orients square
/// dots when their own piece has no tangent.
fn fallback_tangent(polylines: &[Polyline]) -> Option<Point> {
    for poly in polylines {
        for pair in poly.points.windows(2) {
            let (dx, dy) = (pair[1].0 - pair[0].0, pair[1].1 - pair[0].1);
            let len = dx.hypot(dy);
            if len > 1e-9 {
                return Some((dx / len, dy / len));
            }
        }
    }
    None
}

/// Largest arc step whose sagitta stays within the tolerance.
fn arc_step(radius: f64, tolerance: f64) -> f64 {
    let t = (tolerance.max(1e-6)).min(radius * 0.5);
    (2.0 * (1.0 - t / radius).acos()).clamp(0.05, PI / 2.0)
}

/// Expand one flattened subpath into alternating dash pieces.
///
/// The dash cycle restarts (phase included) at the start of every subpath.
/// Closed subpaths walk their synthesized closing segment, and a piece
/// still on at the wrap bridges onto the piece that began the subpath. A
/// subpath the pattern never switches off stays one closed run.
fn expand_dashes(
    pts: &[Point],
    closed: bool,
    dash: &DashPattern,
) -> (Vec<(Vec<Point>, bool)>, Vec<Dot>) {
    let elems = &dash.array;
    let total: f64 = elems.iter().map(|&d| d.max(0.0)).sum();
    debug_assert!(total > 0.0, "solid patterns are expanded by the caller");

    let mut idx = 0usize;
    let mut on = true;
    let mut remaining = elems[0].max(0.0);
    let mut toggled = false;

    let advance = |on: &mut bool, idx: &mut usize, remaining: &mut f64, toggled: &mut bool| {
        *on = !*on;
        *idx = (*idx + 1) % elems.len();
        *remaining = elems[*idx].max(0.0);
        *toggled = true;
    };

    // consume the phase
    let mut phase = dash.phase.max(0.0) % total;
    while phase > 0.0 {
        if phase >= remaining {
            phase -= remaining;
            advance(&mut on, &mut idx, &mut remaining, &mut toggled);
        } else {
            remaining -= phase;
            phase = 0.0;
        }
    }
    toggled = false;

    let mut runs: Vec<(Vec<Point>, bool)> = Vec::new();
    let mut dots: Vec<Dot> = Vec::new();
    let mut run: Vec<Point> = Vec::new();
    let started_on = on && remaining > 1e-12;
    let mut last_dir: Option<Point> = None;

    let seg_count = if closed { pts.len() } else { pts.len() - 1 };
    for i in 0..seg_count {
        let a = pts[i];
        let b = pts[(i + 1) % pts.len()];
        let (dx, dy) = (b.0 - a.0, b.1 - a.1);
        let seg_len = dx.hypot(dy);
        if seg_len <= 1e-12 {
            continue;
        }
        let dir = (dx / seg_len, dy / seg_len);
        last_dir = Some(dir);
        let mut dist_left = seg_len;

        while dist_left > 1e-12 {
            if remaining <= 1e-12 {
                if on && run.len() >= 2 {
                    runs.push((std::mem::take(&mut run), false));
                }
                run.clear();
                advance(&mut on, &mut idx, &mut remaining, &mut toggled);
                if on && remaining <= 1e-12 {
                    // zero-length on element: a dot
                    let t = (seg_len - dist_left) / seg_len;
                    dots.push(Dot {
                        center: (a.0 + dx * t, a.1 + dy * t),
                        tangent: Some(dir),
                    });
                }
                continue;
            }
            let take = remaining.min(dist_left);
            let t0 = (seg_len - dist_left) / seg_len;
            let t1 = (seg_len - dist_left + take) / seg_len;
            if on {
                if run.is_empty() {
                    run.push((a.0 + dx * t0, a.1 + dy * t0));
                }
                run.push((a.0 + dx * t1, a.1 + dy * t1));
            }
            remaining -= take;
            dist_left -= take;
        }
    }

    // tail: flush the final piece, or surface a dot landing exactly on the end
    if on {
        if run.len() >= 2 {
            if closed && !toggled {
                // the pattern never switched off around the whole loop
                runs.push((std::mem::take(&mut run), true));
            } else if closed
                && started_on
                && let Some(first) = runs.first_mut()
                && let (Some(&tail), Some(&head)) = (run.last(), first.0.first())
                && (tail.0 - head.0).hypot(tail.1 - head.1) <= 1e-9
            {
                // bridge across the wrap: the closing piece continues the
                // piece that opened the subpath
                let mut bridged = std::mem::take(&mut run);
                bridged.extend(first.0.iter().skip(1).copied());
                first.0 = bridged;
            } else {
                runs.push((std::mem::take(&mut run), false));
            }
        } else if let Some(&p) = run.first() {
            dots.push(Dot {
                center: p,
                tangent: last_dir,
            });
        }
    } else if remaining <= 1e-12 {
        advance(&mut on, &mut idx, &mut remaining, &mut toggled);
        if on
            && remaining <= 1e-12
            && let Some(&end) = pts.last()
        {
            dots.push(Dot {
                center: if closed { pts[0] } else { end },
                tangent: last_dir,
            });
        }
    }

    (runs, dots)
}

fn angle_of(p: Point) -> f64 {
    p.1.atan2(p.0)
}

fn line_intersection(p: Point, d: Point, q: Point, e: Point) -> Option<Point> {
    let denom = d.0 * e.1 - d.1 * e.0;
    if denom.abs() < 1e-12 {
        return None;
    }
    let t = ((q.0 - p.0) * e.1 - (q.1 - p.1) * e.0) / denom;
    Some((p.0 + t * d.0, p.1 + t * d.1))
}

/// Push arc points around `center` from angle `a0` sweeping `delta`
/// (signed), exclusive of both endpoints.
fn push_arc(out: &mut Vec<Point>, center: Point, radius: f64, a0: f64, delta: f64, step: f64) {
    let n = (delta.abs() / step).ceil().max(1.0) as usize;
    for k in 1..n {
        let ang = a0 + delta * k as f64 / n as f64;
        out.push((center.0 + radius * ang.cos(), center.1 + radius * ang.sin()));
    }
}

fn emit_join(
    out: &mut Vec<Point>,
    v: Point,
    d_in: Point,
    d_out: Point,
    half: f64,
    join: JoinStyle,
    miter_limit: f64,
    step: f64,
) {
    let n_in = (-d_in.1, d_in.0);
    let n_out = (-d_out.1, d_out.0);
    let p_in = (v.0 + half * n_in.0, v.1 + half * n_in.1);
    let p_out = (v.0 + half * n_out.0, v.1 + half * n_out.1);
    let cross = d_in.0 * d_out.1 - d_in.1 * d_out.0;
    let dot = d_in.0 * d_out.0 + d_in.1 * d_out.1;

    if cross.abs() < 1e-9 && dot > 0.0 {
        out.push(p_in);
        return;
    }

    if cross > 1e-9 {
        // turn toward the offset side: inner corner, always mitered
        if let Some(pt) = line_intersection(p_in, d_in, p_out, d_out)
            && (pt.0 - v.0).hypot(pt.1 - v.1) <= half * INNER_MITER_CLAMP
        {
            out.push(pt);
        } else {
            out.push(p_in);
            out.push(p_out);
        }
        return;
    }

    // outer corner
    match join {
        JoinStyle::Miter => {
            if let Some(pt) = line_intersection(p_in, d_in, p_out, d_out)
                && (pt.0 - v.0).hypot(pt.1 - v.1) <= half * miter_limit
            {
                out.push(pt);
                return;
            }
            out.push(p_in);
            out.push(p_out);
        }
        JoinStyle::Bevel => {
            out.push(p_in);
            out.push(p_out);
        }
        JoinStyle::Round => {
            out.push(p_in);
            let a0 = angle_of(n_in);
            let mut delta = angle_of(n_out) - a0;
            while delta > 1e-9 {
                delta -= TAU;
            }
            push_arc(out, v, half, a0, delta, step);
            out.push(p_out);
        }
    }
}

/// Offset one side of a polyline by `half` to the left of travel, joining
/// corners per the graphics state.
fn offset_side(pts: &[Point], closed: bool, half: f64, state: &GraphicsState, step: f64) -> Vec<Point> {
    let n = pts.len();
    let seg_count = if closed { n } else { n - 1 };
    let dirs: Vec<Point> = (0..seg_count)
        .map(|i| {
            let a = pts[i];
            let b = pts[(i + 1) % n];
            let (dx, dy) = (b.0 - a.0, b.1 - a.1);
            let len = dx.hypot(dy).max(1e-12);
            (dx / len, dy / len)
        })
        .collect();

    let mut out = Vec::with_capacity(n + 8);
    if !closed {
        let nrm = (-dirs[0].1, dirs[0].0);
        out.push((pts[0].0 + half * nrm.0, pts[0].1 + half * nrm.1));
    }
    let joint_count = if closed { seg_count } else { seg_count - 1 };
    for k in 0..joint_count {
        let j = (k + 1) % seg_count;
        let v = pts[(k + 1) % n];
        emit_join(
            &mut out,
            v,
            dirs[k],
            dirs[j],
            half,
            state.line_join,
            state.miter_limit,
            step,
        );
    }
    if !closed {
        let nrm = (-dirs[seg_count - 1].1, dirs[seg_count - 1].0);
        out.push((
            pts[n - 1].0 + half * nrm.0,
            pts[n - 1].1 + half * nrm.1,
        ));
    }
    out
}

/// Envelope ring of an open piece: left offsets, end cap, right offsets
/// (the reversed left side), start cap.
fn open_envelope(pts: &[Point], half: f64, state: &GraphicsState, step: f64) -> Vec<Point> {
    let n = pts.len();
    let mut ring = offset_side(pts, false, half, state, step);

    let d_last = {
        let (dx, dy) = (pts[n - 1].0 - pts[n - 2].0, pts[n - 1].1 - pts[n - 2].1);
        let len = dx.hypot(dy).max(1e-12);
        (dx / len, dy / len)
    };
    emit_cap(&mut ring, pts[n - 1], d_last, half, state.line_cap, step);

    let reversed: Vec<Point> = pts.iter().rev().copied().collect();
    ring.extend(offset_side(&reversed, false, half, state, step));

    let d_first = {
        let (dx, dy) = (pts[1].0 - pts[0].0, pts[1].1 - pts[0].1);
        let len = dx.hypot(dy).max(1e-12);
        (dx / len, dy / len)
    };
    emit_cap(&mut ring, pts[0], (-d_first.0, -d_first.1), half, state.line_cap, step);
    ring
}

/// Cap geometry at `end`, bulging along `dir` (the outward direction),
/// exclusive of the side endpoints it bridges.
fn emit_cap(out: &mut Vec<Point>, end: Point, dir: Point, half: f64, cap: CapStyle, step: f64) {
    let nrm = (-dir.1, dir.0);
    match cap {
        CapStyle::Butt => {}
        CapStyle::Square => {
            out.push((
                end.0 + half * (dir.0 + nrm.0),
                end.1 + half * (dir.1 + nrm.1),
            ));
            out.push((
                end.0 + half * (dir.0 - nrm.0),
                end.1 + half * (dir.1 - nrm.1),
            ));
        }
        CapStyle::Round => {
            push_arc(out, end, half, angle_of(nrm), -PI, step);
        }
    }
}

/// A dot becomes a circle (round cap), a tangent-aligned square (square
/// cap with a known tangent), or nothing.
fn emit_dot(out: &mut Path, dot: Dot, half: f64, cap: CapStyle, fallback: Option<Point>) {
    match cap {
        CapStyle::Round => out.push(Subpath::circle(dot.center, half)),
        CapStyle::Square => {
            let Some(t) = dot.tangent.or(fallback) else {
                // no tangent anywhere in the path: skip, matching the
                // path-approximation scan needing two points
                return;
            };
            let n = (-t.1, t.0);
            let c = dot.center;
            out.push(Subpath::polygon(&[
                (c.0 + half * (t.0 + n.0), c.1 + half * (t.1 + n.1)),
                (c.0 + half * (n.0 - t.0), c.1 + half * (n.1 - t.1)),
                (c.0 - half * (t.0 + n.0), c.1 - half * (t.1 + n.1)),
                (c.0 + half * (t.0 - n.0), c.1 + half * (t.1 - n.1)),
            ]));
        }
        CapStyle::Butt => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{FillRule, estimate_covered_area, signed_area};
    use smallvec::SmallVec;

    fn line_path(from: Point, to: Point) -> Path {
        let mut sub = Subpath::new(from);
        sub.segments.push(crate::geometry::Segment::Line(to));
        let mut path = Path::new();
        path.push(sub);
        path
    }

    fn state_with(width: f64, cap: CapStyle, dash: Option<(&[f64], f64)>) -> GraphicsState {
        let mut gs = GraphicsState::default();
        gs.line_width = width;
        gs.line_cap = cap;
        if let Some((array, phase)) = dash {
            gs.dash = DashPattern {
                array: SmallVec::from_slice(array),
                phase,
            };
        }
        gs
    }

    fn covered_area(path: &Path, bounds: (f64, f64, f64, f64)) -> f64 {
        let rings: Vec<Vec<Point>> = path
            .flatten(0.01)
            .into_iter()
            .map(|poly| poly.points)
            .collect();
        estimate_covered_area(&rings, FillRule::Nonzero, bounds, 250)
    }

    #[test]
    fn test_butt_line_envelope_area() {
        let path = line_path((0.0, 0.0), (10.0, 0.0));
        let gs = state_with(2.0, CapStyle::Butt, None);
        let out = stroke_to_fill(&path, &gs, &OffsetProperties::default());
        let area = covered_area(&out, (-2.0, -2.0, 12.0, 2.0));
        assert!((area - 20.0).abs() < 0.5, "10x2 butt stroke, got {area}");
    }

    #[test]
    fn test_round_caps_add_semicircles() {
        let path = line_path((0.0, 0.0), (10.0, 0.0));
        let gs = state_with(2.0, CapStyle::Round, None);
        let out = stroke_to_fill(&path, &gs, &OffsetProperties::default());
        let area = covered_area(&out, (-2.0, -2.0, 12.0, 2.0));
        let expected = 20.0 + PI;
        assert!(
            (area - expected).abs() < 0.5,
            "expected ~{expected}, got {area}"
        );
    }

    #[test]
    fn test_dash_expansion_positions() {
        let pts = vec![(0.0, 0.0), (10.0, 0.0)];
        let dash = DashPattern {
            array: SmallVec::from_slice(&[2.0, 3.0]),
            phase: 0.0,
        };
        let (runs, dots) = expand_dashes(&pts, false, &dash);
        assert!(dots.is_empty());
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].0.first(), Some(&(0.0, 0.0)));
        assert_eq!(runs[0].0.last(), Some(&(2.0, 0.0)));
        assert_eq!(runs[1].0.first(), Some(&(5.0, 0.0)));
        assert_eq!(runs[1].0.last(), Some(&(7.0, 0.0)));
    }

    #[test]
    fn test_dash_phase_shifts_pattern() {
        let pts = vec![(0.0, 0.0), (10.0, 0.0)];
        let dash = DashPattern {
            array: SmallVec::from_slice(&[2.0, 3.0]),
            phase: 2.0,
        };
        let (runs, _) = expand_dashes(&pts, false, &dash);
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].0.first(), Some(&(3.0, 0.0)));
        assert_eq!(runs[0].0.last(), Some(&(5.0, 0.0)));
        assert_eq!(runs[1].0.first(), Some(&(8.0, 0.0)));
        assert_eq!(runs[1].0.last(), Some(&(10.0, 0.0)));
    }

    #[test]
    fn test_dash_restarts_each_subpath() {
        let dash = DashPattern {
            array: SmallVec::from_slice(&[3.0, 5.0]),
            phase: 0.0,
        };
        let (runs_a, _) = expand_dashes(&[(0.0, 0.0), (4.0, 0.0)], false, &dash);
        let (runs_b, _) = expand_dashes(&[(0.0, 5.0), (4.0, 5.0)], false, &dash);
        assert_eq!(runs_a[0].0.first(), Some(&(0.0, 0.0)));
        assert_eq!(runs_b[0].0.first(), Some(&(0.0, 5.0)), "cycle restarts");
        assert_eq!(runs_b[0].0.last(), Some(&(3.0, 5.0)));
    }

    #[test]
    fn test_zero_length_dashes_make_dots() {
        let pts = vec![(0.0, 0.0), (8.0, 0.0)];
        let dash = DashPattern {
            array: SmallVec::from_slice(&[0.0, 4.0]),
            phase: 0.0,
        };
        let (runs, dots) = expand_dashes(&pts, false, &dash);
        assert!(runs.is_empty());
        let centers: Vec<Point> = dots.iter().map(|d| d.center).collect();
        assert_eq!(centers, vec![(0.0, 0.0), (4.0, 0.0), (8.0, 0.0)]);
        assert!(dots.iter().all(|d| d.tangent.is_some()));
    }

    #[test]
    fn test_round_dots_become_circles() {
        let path = line_path((0.0, 0.0), (8.0, 0.0));
        let gs = state_with(2.0, CapStyle::Round, Some((&[0.0, 4.0], 0.0)));
        let out = stroke_to_fill(&path, &gs, &OffsetProperties::default());
        // three dots, each a 4-quadrant Bezier circle of radius 1
        let area = covered_area(&out, (-2.0, -2.0, 10.0, 2.0));
        let expected = 3.0 * PI;
        assert!(
            (area - expected).abs() < 0.5,
            "expected ~{expected}, got {area}"
        );
    }

    #[test]
    fn test_square_dot_without_tangent_skipped() {
        let mut path = Path::new();
        path.push(Subpath::new((5.0, 5.0)));
        let gs = state_with(2.0, CapStyle::Square, None);
        let out = stroke_to_fill(&path, &gs, &OffsetProperties::default());
        assert!(out.is_empty(), "no tangent anywhere, no square emitted");

        let gs_round = state_with(2.0, CapStyle::Round, None);
        let out_round = stroke_to_fill(&path, &gs_round, &OffsetProperties::default());
        assert!(!out_round.is_empty(), "round cap dots need no tangent");
    }

    #[test]
    fn test_closed_square_annulus() {
        let mut path = Path::new();
        path.push(Subpath::polygon(&[
            (0.0, 0.0),
            (10.0, 0.0),
            (10.0, 10.0),
            (0.0, 10.0),
        ]));
        let gs = state_with(2.0, CapStyle::Butt, None);
        let out = stroke_to_fill(&path, &gs, &OffsetProperties::default());
        let area = covered_area(&out, (-2.0, -2.0, 12.0, 12.0));
        // 12x12 outer minus 8x8 hole with mitered corners
        assert!((area - 80.0).abs() < 1.5, "expected ~80, got {area}");
        // hole must stay open
        let rings: Vec<Vec<Point>> = out.flatten(0.01).into_iter().map(|p| p.points).collect();
        let hole = estimate_covered_area(&rings, FillRule::Nonzero, (3.0, 3.0, 7.0, 7.0), 60);
        assert!(hole < 0.2, "annulus hole must not be covered, got {hole}");
    }

    #[test]
    fn test_envelope_rings_are_closed_polygons() {
        let path = line_path((0.0, 0.0), (10.0, 5.0));
        let gs = state_with(3.0, CapStyle::Square, None);
        let out = stroke_to_fill(&path, &gs, &OffsetProperties::default());
        for poly in out.flatten(0.01) {
            assert!(poly.closed);
            assert!(signed_area(&poly.points).abs() > 1.0);
        }
    }
}
