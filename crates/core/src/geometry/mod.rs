//! Geometric core: path model, flattening, and polygon boolean operations.

pub mod clip;
pub mod path;

pub use clip::{
    FilteredPath, Quad, convex_clip, estimate_covered_area, filter_fill_path, intersection_ratio,
    quad_bbox, quads_intersect, region_hits_quad, signed_area, transformed_rect_quad,
};
pub use path::{BEZIER_CIRCLE_K, Path, Polyline, Segment, Subpath};

/// Interior rule for fill and clip decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillRule {
    Nonzero,
    EvenOdd,
}
