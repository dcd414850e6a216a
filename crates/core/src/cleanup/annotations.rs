//! Removal of annotations overlapping cleanup regions.

use smol_str::SmolStr;
use tracing::{debug, warn};

use crate::document::Page;
use crate::geometry::{Quad, quads_intersect};
use crate::model::{PdfDict, PdfObject, rect_value};
use crate::utils::{Point, Rect, normalize_rect, points_bbox, rect_corners};

/// Whether an annotation is removed when its geometry only partly overlaps
/// a cleanup region. When `false`, an annotation survives unless every quad
/// it claims falls entirely inside some region.
pub const REMOVE_ANNOT_ON_PARTIAL_OVERLAP: bool = true;

/// Tolerance when validating /QuadPoints against /Rect.
const QUAD_SLACK: f64 = 1e-6;

/// Drops page annotations whose claimed geometry overlaps a cleanup region.
///
/// Popup annotations are never matched directly; they go away with their
/// parent. Redact annotations are left alone here because the redaction
/// pass consumes them itself, and Watermark annotations are kept no matter
/// what they overlap.
#[derive(Debug, Default)]
pub struct AnnotationFilter {
    warned_watermark: bool,
}

impl AnnotationFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter_page(&mut self, page: &mut Page, regions: &[Rect]) {
        if regions.is_empty() || page.annotations.is_empty() {
            return;
        }
        let region_quads: Vec<Quad> = regions
            .iter()
            .map(|&r| rect_corners(normalize_rect(r)))
            .collect();

        let annots = std::mem::take(&mut page.annotations);
        let mut kept = Vec::with_capacity(annots.len());
        let mut dropped_popups: Vec<PdfDict> = Vec::new();
        for annot in annots {
            let subtype: SmolStr = annot
                .get("Subtype")
                .and_then(|o| o.as_name().ok())
                .unwrap_or("")
                .into();
            if subtype == "Popup" || subtype == "Redact" {
                kept.push(annot);
                continue;
            }
            if !annotation_hit(&annot, &subtype, &region_quads, regions) {
                kept.push(annot);
                continue;
            }
            if subtype == "Watermark" {
                if !self.warned_watermark {
                    warn!("watermark annotation overlaps a cleanup region and is kept");
                    self.warned_watermark = true;
                }
                kept.push(annot);
                continue;
            }
            debug!(subtype = subtype.as_str(), "removing overlapping annotation");
            if let Some(PdfObject::Dict(popup)) = annot.get("Popup") {
                dropped_popups.push(popup.clone());
            }
        }
        if !dropped_popups.is_empty() {
            kept.retain(|a| {
                let is_popup =
                    a.get("Subtype").and_then(|o| o.as_name().ok()) == Some("Popup");
                !(is_popup && dropped_popups.iter().any(|p| p == a))
            });
        }
        page.annotations = kept;
    }
}

fn annotation_hit(
    annot: &PdfDict,
    subtype: &str,
    region_quads: &[Quad],
    regions: &[Rect],
) -> bool {
    let quads = annotation_quads(annot, subtype);
    if quads.is_empty() {
        return false;
    }
    if REMOVE_ANNOT_ON_PARTIAL_OVERLAP {
        quads
            .iter()
            .any(|q| region_quads.iter().any(|r| quads_intersect(q, r)))
    } else {
        quads
            .iter()
            .all(|q| regions.iter().any(|&r| quad_inside_rect(q, r)))
    }
}

/// Geometry an annotation claims on the page.
///
/// Markup subtypes carrying /QuadPoints are matched on those quads, but
/// only when every point lies inside /Rect; viewers ignore stray
/// QuadPoints and fall back to the rectangle, and so does this filter.
/// Line annotations additionally claim the box spanned by their /L
/// endpoints, which may poke outside /Rect in malformed files.
fn annotation_quads(annot: &PdfDict, subtype: &str) -> Vec<Quad> {
    let rect = annot.get("Rect").and_then(|o| rect_value(o).ok());
    if matches!(
        subtype,
        "Link" | "Highlight" | "Underline" | "Squiggly" | "StrikeOut"
    ) && let Some(PdfObject::Array(arr)) = annot.get("QuadPoints")
    {
        let boxes = quad_point_boxes(arr);
        if !boxes.is_empty()
            && rect.is_none_or(|r| {
                boxes
                    .iter()
                    .all(|&b| rect_corners(b).iter().all(|&p| point_in_rect(p, r)))
            })
        {
            return boxes.iter().map(|&b| rect_corners(b)).collect();
        }
    }
    let mut out = Vec::new();
    if let Some(r) = rect {
        out.push(rect_corners(r));
    }
    if subtype == "Line"
        && let Some(PdfObject::Array(arr)) = annot.get("L")
        && arr.len() >= 4
        && let (Ok(x0), Ok(y0), Ok(x1), Ok(y1)) = (
            arr[0].as_f64(),
            arr[1].as_f64(),
            arr[2].as_f64(),
            arr[3].as_f64(),
        )
    {
        out.push(rect_corners(normalize_rect((x0, y0, x1, y1))));
    }
    out
}

/// Parses /QuadPoints into per-quad bounding boxes.
///
/// Writers disagree on corner order inside a quad, so the four points are
/// taken order-insensitively and the claimed area is their bounding box.
/// Quads with non-numeric entries are skipped.
pub(crate) fn quad_point_boxes(arr: &[PdfObject]) -> Vec<Rect> {
    let mut out = Vec::new();
    for chunk in arr.chunks_exact(8) {
        let mut nums = [0.0f64; 8];
        let mut ok = true;
        for (slot, obj) in nums.iter_mut().zip(chunk) {
            match obj.as_f64() {
                Ok(v) => *slot = v,
                Err(_) => {
                    ok = false;
                    break;
                }
            }
        }
        if !ok {
            continue;
        }
        let pts = [
            (nums[0], nums[1]),
            (nums[2], nums[3]),
            (nums[4], nums[5]),
            (nums[6], nums[7]),
        ];
        if let Some(b) = points_bbox(&pts) {
            out.push(b);
        }
    }
    out
}

fn point_in_rect((x, y): Point, (x0, y0, x1, y1): Rect) -> bool {
    x >= x0 - QUAD_SLACK && x <= x1 + QUAD_SLACK && y >= y0 - QUAD_SLACK && y <= y1 + QUAD_SLACK
}

fn quad_inside_rect(q: &Quad, r: Rect) -> bool {
    q.iter().all(|&p| point_in_rect(p, r))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Page;

    fn rect_obj(r: Rect) -> PdfObject {
        PdfObject::Array(vec![
            PdfObject::Real(r.0),
            PdfObject::Real(r.1),
            PdfObject::Real(r.2),
            PdfObject::Real(r.3),
        ])
    }

    fn annot(subtype: &str, rect: Rect) -> PdfDict {
        let mut d = PdfDict::new();
        d.insert("Subtype".into(), PdfObject::name(subtype));
        d.insert("Rect".into(), rect_obj(rect));
        d
    }

    fn quad_points(boxes: &[Rect]) -> PdfObject {
        let mut arr = Vec::new();
        for &(x0, y0, x1, y1) in boxes {
            for (x, y) in [(x0, y1), (x1, y1), (x0, y0), (x1, y0)] {
                arr.push(PdfObject::Real(x));
                arr.push(PdfObject::Real(y));
            }
        }
        PdfObject::Array(arr)
    }

    fn page_with(annots: Vec<PdfDict>) -> Page {
        let mut page = Page::new(Vec::new(), PdfDict::new(), (0.0, 0.0, 612.0, 792.0));
        page.annotations = annots;
        page
    }

    #[test]
    fn test_overlapping_annotation_removed() {
        let mut page = page_with(vec![
            annot("Square", (10.0, 10.0, 50.0, 50.0)),
            annot("Square", (300.0, 300.0, 350.0, 350.0)),
        ]);
        AnnotationFilter::new().filter_page(&mut page, &[(40.0, 40.0, 80.0, 80.0)]);
        assert_eq!(page.annotations.len(), 1);
        let kept = rect_value(page.annotations[0].get("Rect").unwrap()).unwrap();
        assert_eq!(kept, (300.0, 300.0, 350.0, 350.0));
    }

    #[test]
    fn test_quad_points_override_rect() {
        // Rect touches the region but the highlighted quads do not; the
        // quads are valid (inside Rect), so the annotation stays.
        let mut a = annot("Highlight", (0.0, 0.0, 100.0, 100.0));
        a.insert("QuadPoints".into(), quad_points(&[(60.0, 60.0, 90.0, 90.0)]));
        let mut page = page_with(vec![a]);
        AnnotationFilter::new().filter_page(&mut page, &[(0.0, 0.0, 20.0, 20.0)]);
        assert_eq!(page.annotations.len(), 1);
    }

    #[test]
    fn test_stray_quad_points_fall_back_to_rect() {
        // One quad point lies outside Rect, so the quads are ignored and
        // the Rect (which overlaps the region) decides.
        let mut a = annot("Highlight", (0.0, 0.0, 100.0, 100.0));
        a.insert(
            "QuadPoints".into(),
            quad_points(&[(60.0, 60.0, 190.0, 90.0)]),
        );
        let mut page = page_with(vec![a]);
        AnnotationFilter::new().filter_page(&mut page, &[(0.0, 0.0, 20.0, 20.0)]);
        assert!(page.annotations.is_empty());
    }

    #[test]
    fn test_line_endpoints_extend_geometry() {
        let mut a = annot("Line", (0.0, 0.0, 10.0, 10.0));
        a.insert(
            "L".into(),
            PdfObject::Array(vec![
                PdfObject::Real(0.0),
                PdfObject::Real(0.0),
                PdfObject::Real(200.0),
                PdfObject::Real(200.0),
            ]),
        );
        let mut page = page_with(vec![a]);
        AnnotationFilter::new().filter_page(&mut page, &[(150.0, 150.0, 180.0, 180.0)]);
        assert!(page.annotations.is_empty());
    }

    #[test]
    fn test_watermark_kept() {
        let mut page = page_with(vec![annot("Watermark", (0.0, 0.0, 100.0, 100.0))]);
        AnnotationFilter::new().filter_page(&mut page, &[(0.0, 0.0, 200.0, 200.0)]);
        assert_eq!(page.annotations.len(), 1);
    }

    #[test]
    fn test_redact_annotation_left_alone() {
        let mut page = page_with(vec![annot("Redact", (0.0, 0.0, 100.0, 100.0))]);
        AnnotationFilter::new().filter_page(&mut page, &[(0.0, 0.0, 200.0, 200.0)]);
        assert_eq!(page.annotations.len(), 1);
    }

    #[test]
    fn test_popup_removed_with_parent() {
        let mut popup = annot("Popup", (120.0, 10.0, 200.0, 60.0));
        popup.insert("Open".into(), PdfObject::Bool(false));
        let mut parent = annot("Text", (10.0, 10.0, 30.0, 30.0));
        parent.insert("Popup".into(), PdfObject::Dict(popup.clone()));
        let mut page = page_with(vec![parent, popup]);
        AnnotationFilter::new().filter_page(&mut page, &[(0.0, 0.0, 50.0, 50.0)]);
        assert!(page.annotations.is_empty());
    }

    #[test]
    fn test_orphan_popup_untouched() {
        // A popup whose parent survives is not matched directly, even when
        // the popup box itself overlaps a region.
        let popup = annot("Popup", (10.0, 10.0, 40.0, 40.0));
        let mut page = page_with(vec![popup]);
        AnnotationFilter::new().filter_page(&mut page, &[(0.0, 0.0, 50.0, 50.0)]);
        assert_eq!(page.annotations.len(), 1);
    }

    #[test]
    fn test_quad_point_boxes_skips_malformed() {
        let mut arr = Vec::new();
        for _ in 0..8 {
            arr.push(PdfObject::Real(1.0));
        }
        arr[3] = PdfObject::name("oops");
        arr.extend([
            PdfObject::Real(0.0),
            PdfObject::Real(0.0),
            PdfObject::Real(5.0),
            PdfObject::Real(0.0),
            PdfObject::Real(0.0),
            PdfObject::Real(5.0),
            PdfObject::Real(5.0),
            PdfObject::Real(5.0),
        ]);
        let boxes = quad_point_boxes(&arr);
        assert_eq!(boxes, vec![(0.0, 0.0, 5.0, 5.0)]);
    }
}
