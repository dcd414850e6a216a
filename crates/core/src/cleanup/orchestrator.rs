//! Document-level cleanup passes: explicit locations and Redact
//! annotations.
//!
//! [`clean_up`] is the workhorse: it groups locations per page, rewrites
//! each page's content stream through one shared image cache, prunes the
//! structure tree entries whose marked content vanished, runs the
//! annotation filter, and finally paints the requested fill colors on
//! top. [`clean_up_redact_annotations`] builds the location list from the
//! document's Redact annotations first, then consumes the annotations and
//! stamps their overlay appearances.

use smol_str::SmolStr;
use tracing::debug;

use crate::canvas::{ContentWriter, TextItem};
use crate::cleanup::annotations::{AnnotationFilter, quad_point_boxes};
use crate::cleanup::image_filter::FilteredImagesCache;
use crate::cleanup::location::{CleanupLocation, CleanupProperties};
use crate::cleanup::processor::ContentStreamProcessor;
use crate::document::{AccessMode, Document, Page};
use crate::error::{CleanupError, Result};
use crate::font::FontMetrics;
use crate::model::{Color, PdfDict, PdfObject, PdfStream, rect_value};
use crate::parser::{ContentEvent, ContentParser, Op};
use crate::utils::Rect;

/// Erase every listed region from its page. Regions may target any page
/// in any order; the whole run shares one filtered-image cache so an
/// image reused across pages is reprocessed once per distinct region set.
pub fn clean_up(
    document: &mut Document,
    locations: &[CleanupLocation],
    properties: &CleanupProperties,
) -> Result<()> {
    properties.validate()?;
    if document.access == AccessMode::ReadOnly {
        return Err(CleanupError::ReadOnlyDocument);
    }

    let mut by_page: Vec<(usize, Vec<CleanupLocation>)> = Vec::new();
    for loc in locations {
        match by_page.iter_mut().find(|(page, _)| *page == loc.page()) {
            Some((_, group)) => group.push(loc.clone()),
            None => by_page.push((loc.page(), vec![loc.clone()])),
        }
    }
    // fail before touching anything if a location is out of range
    for &(page_index, _) in &by_page {
        document.page(page_index)?;
    }

    let mut cache = FilteredImagesCache::new();
    let mut annotations = AnnotationFilter::new();
    for (page_index, group) in by_page {
        let regions: Vec<Rect> = group.iter().map(CleanupLocation::region).collect();
        let processed = {
            let mut processor =
                ContentStreamProcessor::new(&regions, properties, &mut cache);
            processor.process_page(document.page(page_index)?)?
        };
        debug!(
            page = page_index,
            regions = regions.len(),
            "rewrote page content"
        );
        for &mcid in &processed.removed_mcids {
            document.remove_struct_item(page_index, mcid);
        }
        let page = document.page_mut(page_index)?;
        page.content = processed.content;
        page.resources = processed.resources;
        if properties.process_annotations {
            annotations.filter_page(page, &regions);
        }
        paint_fills(page, &group);
    }
    Ok(())
}

/// Apply every Redact annotation in the document: erase the marked
/// regions, paint /IC interior colors, stamp overlay appearances, then
/// delete the annotations themselves. `additional` locations are cleaned
/// in the same pass, without consuming any annotation.
pub fn clean_up_redact_annotations(
    document: &mut Document,
    additional: &[CleanupLocation],
    properties: &CleanupProperties,
) -> Result<()> {
    let mut locations = additional.to_vec();
    for (index, page) in document.pages.iter().enumerate() {
        for annot in &page.annotations {
            if subtype_of(annot) != Some("Redact") {
                continue;
            }
            let fill = interior_color(annot);
            for region in redact_regions(annot) {
                locations.push(match fill {
                    Some(color) => CleanupLocation::with_fill_color(index, region, color),
                    None => CleanupLocation::new(index, region),
                });
            }
        }
    }
    if locations.is_empty() {
        return Ok(());
    }
    clean_up(document, &locations, properties)?;

    for page in &mut document.pages {
        let redacts: Vec<PdfDict> = page
            .annotations
            .iter()
            .filter(|a| subtype_of(a) == Some("Redact"))
            .cloned()
            .collect();
        if redacts.is_empty() {
            continue;
        }
        page.annotations.retain(|a| {
            match subtype_of(a) {
                Some("Redact") => false,
                // popups attached to a consumed redact annotation go too
                Some("Popup") => !redacts.iter().any(
                    |r| matches!(r.get("Popup"), Some(PdfObject::Dict(p)) if p == a),
                ),
                _ => true,
            }
        });
        for annot in &redacts {
            draw_redact_overlay(page, annot);
        }
    }
    Ok(())
}

fn subtype_of(annot: &PdfDict) -> Option<&str> {
    annot.get("Subtype").and_then(|o| o.as_name().ok())
}

/// Paint the requested fill colors over cleaned regions, snapped to a
/// half-point grid so adjacent boxes tile without hairline gaps.
fn paint_fills(page: &mut Page, locations: &[CleanupLocation]) {
    let mut writer = ContentWriter::new();
    for loc in locations {
        let Some(color) = loc.fill_color() else {
            continue;
        };
        let (x0, y0, x1, y1) = loc.region();
        let (x0, y0) = (snap_half(x0), snap_half(y0));
        let (x1, y1) = (snap_half(x1), snap_half(y1));
        if x1 - x0 <= 0.0 || y1 - y0 <= 0.0 {
            continue;
        }
        writer.save_state();
        writer.set_fill_color(color);
        writer.rect(x0, y0, x1 - x0, y1 - y0);
        writer.fill(false);
        writer.restore_state();
    }
    append_content(page, writer);
}

fn snap_half(v: f64) -> f64 {
    (v * 2.0).round() / 2.0
}

fn append_content(page: &mut Page, writer: ContentWriter) {
    if writer.is_empty() {
        return;
    }
    if !page.content.is_empty() && page.content.last() != Some(&b'\n') {
        page.content.push(b'\n');
    }
    page.content.extend_from_slice(&writer.into_bytes());
}

/// Regions one Redact annotation marks: the /QuadPoints groups when
/// present and parseable, otherwise /Rect.
fn redact_regions(annot: &PdfDict) -> Vec<Rect> {
    if let Some(PdfObject::Array(arr)) = annot.get("QuadPoints") {
        let boxes = quad_point_boxes(arr);
        if !boxes.is_empty() {
            return boxes;
        }
    }
    annot
        .get("Rect")
        .and_then(|o| rect_value(o).ok())
        .into_iter()
        .collect()
}

/// /IC interior color: 1, 3, or 4 components. An empty array means
/// transparent and yields no fill.
fn interior_color(annot: &PdfDict) -> Option<Color> {
    let Some(PdfObject::Array(arr)) = annot.get("IC") else {
        return None;
    };
    let mut nums = arr.iter().filter_map(|o| o.as_f64().ok());
    match arr.len() {
        1 => Some(Color::Gray(nums.next()?)),
        3 => Some(Color::Rgb(nums.next()?, nums.next()?, nums.next()?)),
        4 => Some(Color::Cmyk(
            nums.next()?,
            nums.next()?,
            nums.next()?,
            nums.next()?,
        )),
        _ => None,
    }
}

/// Stamp a Redact annotation's post-redaction appearance over its
/// rectangle: the /RO form XObject when present, else the /OverlayText
/// block with its /DA styling.
fn draw_redact_overlay(page: &mut Page, annot: &PdfDict) {
    let Some(rect) = annot.get("Rect").and_then(|o| rect_value(o).ok()) else {
        return;
    };
    if let Some(PdfObject::Stream(form)) = annot.get("RO") {
        stamp_overlay_form(page, rect, form);
        return;
    }
    if let Some(text) = annot.get("OverlayText").and_then(|o| o.as_str_bytes().ok()) {
        let style = parse_default_appearance(
            annot
                .get("DA")
                .and_then(|o| o.as_str_bytes().ok())
                .unwrap_or(b""),
        );
        let repeat = matches!(annot.get("Repeat"), Some(PdfObject::Bool(true)));
        draw_overlay_text(page, rect, text, &style, repeat);
    }
}

fn stamp_overlay_form(page: &mut Page, rect: Rect, form: &PdfStream) {
    let bbox = form
        .get("BBox")
        .and_then(|o| rect_value(o).ok())
        .unwrap_or((0.0, 0.0, 1.0, 1.0));
    let (bw, bh) = (bbox.2 - bbox.0, bbox.3 - bbox.1);
    if bw <= 0.0 || bh <= 0.0 {
        return;
    }
    let sx = (rect.2 - rect.0) / bw;
    let sy = (rect.3 - rect.1) / bh;
    let name = free_xobject_name(&page.resources);
    let mut writer = ContentWriter::new();
    writer.save_state();
    writer.concat((sx, 0.0, 0.0, sy, rect.0 - bbox.0 * sx, rect.1 - bbox.1 * sy));
    writer.invoke_xobject(&name);
    writer.restore_state();
    append_content(page, writer);

    let xobjects = page
        .resources
        .entry(SmolStr::new("XObject"))
        .or_insert_with(|| PdfObject::Dict(PdfDict::new()));
    if let PdfObject::Dict(d) = xobjects {
        d.insert(name, PdfObject::Stream(Box::new(form.clone())));
    }
}

fn free_xobject_name(resources: &PdfDict) -> SmolStr {
    let taken = resources.get("XObject").and_then(|o| o.as_dict().ok());
    let mut i = 0usize;
    loop {
        let name = SmolStr::new(format!("Ovr{i}"));
        if taken.is_none_or(|d| !d.contains_key(name.as_str())) {
            return name;
        }
        i += 1;
    }
}

struct OverlayStyle {
    font_name: SmolStr,
    font_size: f64,
    color: Color,
}

/// Parse the /DA appearance string for font selection and fill color.
/// Anything unparseable falls back to 12pt black Helvetica.
fn parse_default_appearance(da: &[u8]) -> OverlayStyle {
    let mut style = OverlayStyle {
        font_name: SmolStr::new_static("Helv"),
        font_size: 12.0,
        color: Color::Gray(0.0),
    };
    for event in ContentParser::new(da) {
        let ContentEvent::Op(op) = event else {
            continue;
        };
        let num = |i: usize| op.operands.get(i).and_then(|o| o.as_f64().ok());
        match op.kind {
            Op::Tf => {
                if let Some(name) = op.operands.first().and_then(|o| o.as_name().ok()) {
                    style.font_name = name.into();
                }
                // size 0 means auto-fit; keep the default instead
                if let Some(size) = num(1)
                    && size > 0.0
                {
                    style.font_size = size;
                }
            }
            Op::Gg => {
                if let Some(g) = num(0) {
                    style.color = Color::Gray(g);
                }
            }
            Op::Rg => {
                if let (Some(r), Some(g), Some(b)) = (num(0), num(1), num(2)) {
                    style.color = Color::Rgb(r, g, b);
                }
            }
            Op::Kk => {
                if let (Some(c), Some(m), Some(y), Some(k)) =
                    (num(0), num(1), num(2), num(3))
                {
                    style.color = Color::Cmyk(c, m, y, k);
                }
            }
            _ => {}
        }
    }
    style
}

/// Lay the overlay text into the rectangle, wrapped at word boundaries
/// and clipped to the box. With /Repeat the words cycle until every line
/// that fits is full. Layout uses built-in Helvetica metrics regardless
/// of the /DA font, which is how these overlays are commonly produced.
fn draw_overlay_text(
    page: &mut Page,
    rect: Rect,
    text: &[u8],
    style: &OverlayStyle,
    repeat: bool,
) {
    let (x0, y0, x1, y1) = rect;
    let width = x1 - x0;
    if width <= 0.0 || y1 - y0 <= 0.0 {
        return;
    }
    let words: Vec<&[u8]> = text.split(|&b| b == b' ').filter(|w| !w.is_empty()).collect();
    if words.is_empty() {
        return;
    }

    let metrics = FontMetrics::from_dict(&PdfDict::new());
    let size = style.font_size;
    let leading = size * 1.2;
    let ascent = metrics.ascent_1000() / 1000.0 * size;
    let descent = metrics.descent_1000() / 1000.0 * size;

    let mut max_lines = 0usize;
    let mut baseline = y1 - ascent;
    while baseline + descent >= y0 - 1e-9 {
        max_lines += 1;
        baseline -= leading;
    }
    // a rect shorter than one line still shows a clipped line
    let max_lines = max_lines.max(1);

    let space_w = text_width(&metrics, b" ", size);
    let mut lines: Vec<Vec<u8>> = Vec::new();
    let mut line: Vec<u8> = Vec::new();
    let mut line_w = 0.0;
    let mut idx = 0usize;
    loop {
        if !repeat && idx >= words.len() {
            break;
        }
        let word = words[idx % words.len()];
        let ww = text_width(&metrics, word, size);
        let add = if line.is_empty() { ww } else { ww + space_w };
        if line.is_empty() || line_w + add <= width {
            if !line.is_empty() {
                line.push(b' ');
            }
            line.extend_from_slice(word);
            line_w += add;
            idx += 1;
        } else {
            lines.push(std::mem::take(&mut line));
            line_w = 0.0;
            if lines.len() >= max_lines {
                break;
            }
        }
    }
    if !line.is_empty() && lines.len() < max_lines {
        lines.push(line);
    }
    if lines.is_empty() {
        return;
    }

    let mut writer = ContentWriter::new();
    writer.save_state();
    writer.rect(x0, y0, width, y1 - y0);
    writer.clip(false);
    writer.end_path();
    writer.set_fill_color(style.color);
    writer.begin_text();
    writer.set_font(&style.font_name, size);
    writer.set_leading(leading);
    writer.move_text(x0, y1 - ascent);
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            writer.next_line();
        }
        writer.show_text(&[TextItem::Str(line.clone())]);
    }
    writer.end_text();
    writer.restore_state();
    append_content(page, writer);
    ensure_overlay_font(&mut page.resources, &style.font_name);
}

fn text_width(metrics: &FontMetrics, bytes: &[u8], size: f64) -> f64 {
    metrics
        .decode(bytes)
        .iter()
        .map(|g| metrics.width_1000(g.code) / 1000.0 * size)
        .sum()
}

/// Make sure the overlay font name resolves on the page; a standard
/// Helvetica entry is added unless the resources already carry one.
fn ensure_overlay_font(resources: &mut PdfDict, name: &str) {
    let fonts = resources
        .entry(SmolStr::new("Font"))
        .or_insert_with(|| PdfObject::Dict(PdfDict::new()));
    let PdfObject::Dict(fonts) = fonts else {
        return;
    };
    if fonts.contains_key(name) {
        return;
    }
    let mut helv = PdfDict::new();
    helv.insert(SmolStr::new("Type"), PdfObject::name("Font"));
    helv.insert(SmolStr::new("Subtype"), PdfObject::name("Type1"));
    helv.insert(SmolStr::new("BaseFont"), PdfObject::name("Helvetica"));
    helv.insert(SmolStr::new("Encoding"), PdfObject::name("WinAnsiEncoding"));
    fonts.insert(SmolStr::new(name), PdfObject::Dict(helv));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::StructTree;

    fn one_page_doc(content: &str) -> Document {
        Document::new(vec![Page::new(
            content.as_bytes().to_vec(),
            PdfDict::new(),
            (0.0, 0.0, 612.0, 792.0),
        )])
    }

    fn text_of(page: &Page) -> String {
        String::from_utf8_lossy(&page.content).into_owned()
    }

    fn rect_obj(r: Rect) -> PdfObject {
        PdfObject::Array(vec![
            PdfObject::Real(r.0),
            PdfObject::Real(r.1),
            PdfObject::Real(r.2),
            PdfObject::Real(r.3),
        ])
    }

    fn redact_annot(rect: Rect) -> PdfDict {
        let mut d = PdfDict::new();
        d.insert(SmolStr::new("Subtype"), PdfObject::name("Redact"));
        d.insert(SmolStr::new("Rect"), rect_obj(rect));
        d
    }

    #[test]
    fn test_read_only_document_rejected() {
        let mut doc = one_page_doc("");
        doc.access = AccessMode::ReadOnly;
        let locations = [CleanupLocation::new(0, (0.0, 0.0, 10.0, 10.0))];
        assert!(matches!(
            clean_up(&mut doc, &locations, &CleanupProperties::new()),
            Err(CleanupError::ReadOnlyDocument)
        ));
    }

    #[test]
    fn test_invalid_properties_rejected() {
        let mut doc = one_page_doc("");
        let props = CleanupProperties {
            overlap_ratio: Some(2.0),
            ..CleanupProperties::default()
        };
        let locations = [CleanupLocation::new(0, (0.0, 0.0, 10.0, 10.0))];
        assert!(matches!(
            clean_up(&mut doc, &locations, &props),
            Err(CleanupError::InvalidOverlapRatio(_))
        ));
    }

    #[test]
    fn test_out_of_range_page_fails_before_mutation() {
        let mut doc = one_page_doc("10 10 20 20 re f");
        let locations = [
            CleanupLocation::new(0, (0.0, 0.0, 600.0, 700.0)),
            CleanupLocation::new(3, (0.0, 0.0, 10.0, 10.0)),
        ];
        assert!(clean_up(&mut doc, &locations, &CleanupProperties::new()).is_err());
        // the first page's content must still be intact
        assert_eq!(doc.pages[0].content, b"10 10 20 20 re f");
    }

    #[test]
    fn test_covered_content_removed_and_fill_painted() {
        let mut doc = one_page_doc("110 110 40 40 re f");
        let locations = [CleanupLocation::with_fill_color(
            0,
            (100.2, 100.6, 160.4, 160.9),
            Color::Gray(0.0),
        )];
        clean_up(&mut doc, &locations, &CleanupProperties::new()).unwrap();
        let out = text_of(&doc.pages[0]);
        assert!(!out.contains("110 110 40 40 re"));
        // region snapped to the half-point grid
        assert!(out.contains("100 100.5 60.5 60.5 re"));
        assert!(out.contains("0 g"));
        assert!(out.contains('f'));
    }

    #[test]
    fn test_no_fill_color_paints_nothing() {
        let mut doc = one_page_doc("110 110 40 40 re f");
        let locations = [CleanupLocation::new(0, (100.0, 100.0, 160.0, 160.0))];
        clean_up(&mut doc, &locations, &CleanupProperties::new()).unwrap();
        assert!(doc.pages[0].content.is_empty());
    }

    #[test]
    fn test_struct_tree_pruned_for_removed_content() {
        let mut doc = one_page_doc(
            "/P <</MCID 3>> BDC 110 110 40 40 re f EMC 300 300 10 10 re f",
        );
        let mut tree = StructTree::new();
        tree.add_content_item(0, 3);
        doc.struct_tree = Some(tree);
        let locations = [CleanupLocation::new(0, (100.0, 100.0, 160.0, 160.0))];
        clean_up(&mut doc, &locations, &CleanupProperties::new()).unwrap();
        let tree = doc.struct_tree.as_ref().unwrap();
        assert!(!tree.contains(0, 3));
        assert!(text_of(&doc.pages[0]).contains("300 300 10 10 re"));
    }

    #[test]
    fn test_annotations_filtered_when_enabled() {
        let mut doc = one_page_doc("");
        let mut annot = PdfDict::new();
        annot.insert(SmolStr::new("Subtype"), PdfObject::name("Square"));
        annot.insert(SmolStr::new("Rect"), rect_obj((10.0, 10.0, 50.0, 50.0)));
        doc.pages[0].annotations.push(annot.clone());
        let locations = [CleanupLocation::new(0, (0.0, 0.0, 100.0, 100.0))];

        let mut props = CleanupProperties::new();
        props.process_annotations = false;
        clean_up(&mut doc, &locations, &props).unwrap();
        assert_eq!(doc.pages[0].annotations.len(), 1);

        clean_up(&mut doc, &locations, &CleanupProperties::new()).unwrap();
        assert!(doc.pages[0].annotations.is_empty());
    }

    #[test]
    fn test_redact_annotations_consumed() {
        let mut doc = one_page_doc("110 110 40 40 re f");
        let mut annot = redact_annot((100.0, 100.0, 160.0, 160.0));
        annot.insert(
            SmolStr::new("IC"),
            PdfObject::Array(vec![
                PdfObject::Real(1.0),
                PdfObject::Real(0.0),
                PdfObject::Real(0.0),
            ]),
        );
        doc.pages[0].annotations.push(annot);
        clean_up_redact_annotations(&mut doc, &[], &CleanupProperties::new()).unwrap();
        let out = text_of(&doc.pages[0]);
        assert!(doc.pages[0].annotations.is_empty());
        assert!(!out.contains("110 110 40 40 re"));
        assert!(out.contains("1 0 0 rg"));
        assert!(out.contains("100 100 60 60 re"));
    }

    #[test]
    fn test_additional_locations_cleaned_alongside_redacts() {
        let mut doc = one_page_doc("110 110 40 40 re f 310 310 40 40 re f");
        doc.pages[0]
            .annotations
            .push(redact_annot((100.0, 100.0, 160.0, 160.0)));
        let additional = [CleanupLocation::new(0, (300.0, 300.0, 360.0, 360.0))];
        clean_up_redact_annotations(&mut doc, &additional, &CleanupProperties::new()).unwrap();
        let out = text_of(&doc.pages[0]);
        assert!(!out.contains("110 110 40 40 re"));
        assert!(!out.contains("310 310 40 40 re"));
        assert!(doc.pages[0].annotations.is_empty());
    }

    #[test]
    fn test_redact_quad_points_win_over_rect() {
        let mut doc = one_page_doc("10 10 5 5 re f 110 110 5 5 re f");
        let mut annot = redact_annot((0.0, 0.0, 200.0, 200.0));
        annot.insert(
            SmolStr::new("QuadPoints"),
            PdfObject::Array(
                [
                    (100.0, 130.0),
                    (130.0, 130.0),
                    (100.0, 100.0),
                    (130.0, 100.0),
                ]
                .iter()
                .flat_map(|&(x, y)| [PdfObject::Real(x), PdfObject::Real(y)])
                .collect(),
            ),
        );
        doc.pages[0].annotations.push(annot);
        clean_up_redact_annotations(&mut doc, &[], &CleanupProperties::new()).unwrap();
        let out = text_of(&doc.pages[0]);
        // only the quad area is erased, not the whole Rect
        assert!(out.contains("10 10 5 5 re"));
        assert!(!out.contains("110 110 5 5 re"));
    }

    #[test]
    fn test_overlay_text_drawn_and_font_registered() {
        let mut doc = one_page_doc("110 110 40 40 re f");
        let mut annot = redact_annot((100.0, 100.0, 300.0, 160.0));
        annot.insert(
            SmolStr::new("OverlayText"),
            PdfObject::String(b"CONFIDENTIAL".to_vec()),
        );
        annot.insert(
            SmolStr::new("DA"),
            PdfObject::String(b"/Helv 10 Tf 1 0 0 rg".to_vec()),
        );
        doc.pages[0].annotations.push(annot);
        clean_up_redact_annotations(&mut doc, &[], &CleanupProperties::new()).unwrap();
        let out = text_of(&doc.pages[0]);
        assert!(out.contains("BT"));
        assert!(out.contains("/Helv 10 Tf"));
        assert!(out.contains("(CONFIDENTIAL) Tj"));
        assert!(out.contains("1 0 0 rg"));
        assert!(out.contains("re\nW\nn"));
        let fonts = doc.pages[0]
            .resources
            .get("Font")
            .and_then(|o| o.as_dict().ok())
            .unwrap();
        assert!(fonts.contains_key("Helv"));
    }

    #[test]
    fn test_overlay_text_repeats_to_fill() {
        let mut doc = one_page_doc("");
        let mut annot = redact_annot((0.0, 700.0, 200.0, 760.0));
        annot.insert(
            SmolStr::new("OverlayText"),
            PdfObject::String(b"VOID".to_vec()),
        );
        annot.insert(SmolStr::new("Repeat"), PdfObject::Bool(true));
        doc.pages[0].annotations.push(annot);
        clean_up_redact_annotations(&mut doc, &[], &CleanupProperties::new()).unwrap();
        let out = text_of(&doc.pages[0]);
        // VOID at 12pt is about 30 units wide; a 200-unit line fits several
        assert!(out.contains("VOID VOID"));
        assert!(out.contains("T*"));
    }

    #[test]
    fn test_overlay_form_stamped() {
        let mut doc = one_page_doc("");
        let mut attrs = PdfDict::new();
        attrs.insert(SmolStr::new("Subtype"), PdfObject::name("Form"));
        attrs.insert(SmolStr::new("BBox"), rect_obj((0.0, 0.0, 10.0, 10.0)));
        let form = PdfStream::new(attrs, b"0 0 10 10 re f".to_vec());
        let mut annot = redact_annot((100.0, 100.0, 200.0, 150.0));
        annot.insert(SmolStr::new("RO"), PdfObject::Stream(Box::new(form)));
        doc.pages[0].annotations.push(annot);
        clean_up_redact_annotations(&mut doc, &[], &CleanupProperties::new()).unwrap();
        let out = text_of(&doc.pages[0]);
        assert!(out.contains("10 0 0 5 100 100 cm"));
        assert!(out.contains("/Ovr0 Do"));
        let xobjects = doc.pages[0]
            .resources
            .get("XObject")
            .and_then(|o| o.as_dict().ok())
            .unwrap();
        assert!(xobjects.contains_key("Ovr0"));
    }

    #[test]
    fn test_parse_default_appearance() {
        let style = parse_default_appearance(b"/TimesRoman 9 Tf 0.2 0.4 0.6 rg");
        assert_eq!(style.font_name, "TimesRoman");
        assert_eq!(style.font_size, 9.0);
        assert_eq!(style.color, Color::Rgb(0.2, 0.4, 0.6));

        let fallback = parse_default_appearance(b"");
        assert_eq!(fallback.font_name, "Helv");
        assert_eq!(fallback.font_size, 12.0);
        assert_eq!(fallback.color, Color::Gray(0.0));
    }

    #[test]
    fn test_snap_half() {
        assert_eq!(snap_half(100.2), 100.0);
        assert_eq!(snap_half(100.6), 100.5);
        assert_eq!(snap_half(-0.3), -0.5);
    }
}
