//! Pattern-driven location discovery: find text matching a strategy and
//! erase it, without the caller supplying coordinates.
//!
//! A lightweight interpreter walks each page (and the form XObjects it
//! draws) collecting one [`SweptGlyph`] per shown character, with word
//! and line separators synthesized from the glyph geometry. Strategies
//! turn that stream into [`CleanupLocation`]s; [`auto_sweep`] feeds them
//! straight into [`clean_up`].

use std::cmp::Reverse;

use ordered_float::OrderedFloat;
use regex::Regex;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use tracing::{debug, warn};

use crate::cleanup::location::{CleanupLocation, CleanupProperties};
use crate::cleanup::orchestrator::clean_up;
use crate::cleanup::text::{adjustment_to_dx, decompose_run};
use crate::codec::decode_stream;
use crate::document::{Document, Page};
use crate::error::Result;
use crate::font::FontMetrics;
use crate::geometry::quad_bbox;
use crate::model::{Color, PdfDict, PdfObject, TextState, dict_value, matrix_value, num_value};
use crate::parser::{ContentEvent, ContentOp, ContentParser, Op};
use crate::utils::{MATRIX_IDENTITY, Matrix, Rect, mult_matrix, translate_matrix};

/// Gap wider than this share of the line height reads as a word break.
const WORD_GAP_FACTOR: f64 = 0.2;

/// One character of page text with the device-space box it occupies.
///
/// Separators synthesized between chunks carry a degenerate box and never
/// contribute to match geometry.
#[derive(Debug, Clone)]
pub struct SweptGlyph {
    pub ch: char,
    pub bbox: Rect,
}

impl SweptGlyph {
    pub fn has_area(&self) -> bool {
        self.bbox.2 > self.bbox.0 && self.bbox.3 > self.bbox.1
    }
}

/// Picks regions to erase from one page's swept text.
///
/// [`sweep_locations`] calls [`reset`](Self::reset) before every page, so
/// one instance can carry state within a page yet scan a whole document
/// cleanly.
pub trait SweepStrategy {
    fn locations(&mut self, page: usize, glyphs: &[SweptGlyph]) -> Vec<CleanupLocation>;

    /// Clear any per-page state. Stateless strategies keep the no-op
    /// default.
    fn reset(&mut self) {}
}

/// Erase every match of a regular expression, one location per visual
/// line touched by the match.
pub struct RegexSweepStrategy {
    pattern: Regex,
    fill_color: Option<Color>,
}

impl RegexSweepStrategy {
    pub fn new(pattern: Regex) -> Self {
        Self {
            pattern,
            fill_color: None,
        }
    }

    /// Paint matched regions with this color after erasing them.
    pub fn with_fill_color(mut self, color: Color) -> Self {
        self.fill_color = Some(color);
        self
    }
}

impl SweepStrategy for RegexSweepStrategy {
    fn locations(&mut self, page: usize, glyphs: &[SweptGlyph]) -> Vec<CleanupLocation> {
        let mut text = String::with_capacity(glyphs.len());
        let mut char_starts = Vec::with_capacity(glyphs.len());
        for g in glyphs {
            char_starts.push(text.len());
            text.push(g.ch);
        }
        let mut out = Vec::new();
        for m in self.pattern.find_iter(&text) {
            let lo = char_starts.partition_point(|&b| b < m.start());
            let hi = char_starts.partition_point(|&b| b < m.end());
            for rect in merge_line_boxes(&glyphs[lo..hi]) {
                out.push(match self.fill_color {
                    Some(color) => CleanupLocation::with_fill_color(page, rect, color),
                    None => CleanupLocation::new(page, rect),
                });
            }
        }
        out
    }
}

/// Runs several strategies over the same glyph stream and merges their
/// hits top-to-bottom, left-to-right.
#[derive(Default)]
pub struct CompositeSweepStrategy {
    strategies: Vec<Box<dyn SweepStrategy>>,
}

impl CompositeSweepStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, strategy: Box<dyn SweepStrategy>) {
        self.strategies.push(strategy);
    }
}

impl SweepStrategy for CompositeSweepStrategy {
    fn locations(&mut self, page: usize, glyphs: &[SweptGlyph]) -> Vec<CleanupLocation> {
        let mut out: Vec<CleanupLocation> = self
            .strategies
            .iter_mut()
            .flat_map(|s| s.locations(page, glyphs))
            .collect();
        out.sort_by_key(|loc| {
            let r = loc.region();
            (Reverse(OrderedFloat(r.3)), OrderedFloat(r.0))
        });
        out
    }

    fn reset(&mut self) {
        for s in &mut self.strategies {
            s.reset();
        }
    }
}

/// Collect the locations a strategy finds across the whole document.
pub fn sweep_locations(
    document: &Document,
    strategy: &mut dyn SweepStrategy,
) -> Vec<CleanupLocation> {
    let mut out = Vec::new();
    for (index, page) in document.pages.iter().enumerate() {
        strategy.reset();
        let glyphs = scan_page(page);
        let found = strategy.locations(index, &glyphs);
        if !found.is_empty() {
            debug!(page = index, hits = found.len(), "sweep matched");
        }
        out.extend(found);
    }
    out
}

/// Find and erase everything a strategy matches, in one pass.
pub fn auto_sweep(
    document: &mut Document,
    strategy: &mut dyn SweepStrategy,
    properties: &CleanupProperties,
) -> Result<()> {
    let locations = sweep_locations(document, strategy);
    if locations.is_empty() {
        return Ok(());
    }
    clean_up(document, &locations, properties)
}

/// Extract the positioned characters of one page in content order.
pub fn scan_page(page: &Page) -> Vec<SweptGlyph> {
    let mut scanner = GlyphScanner {
        out: Vec::new(),
        last_box: None,
        guard: Vec::new(),
    };
    scanner.scan(&page.content, &page.resources, MATRIX_IDENTITY);
    scanner.out
}

struct GlyphScanner {
    out: Vec<SweptGlyph>,
    /// Box of the last real glyph, for separator synthesis.
    last_box: Option<Rect>,
    guard: Vec<u64>,
}

impl GlyphScanner {
    fn scan(&mut self, content: &[u8], resources: &PdfDict, base_ctm: Matrix) {
        let mut ctm = base_ctm;
        let mut ts = TextState::new();
        let mut stack: Vec<(Matrix, TextState)> = Vec::new();
        let mut font = FontMetrics::from_dict(&PdfDict::new());
        let mut fonts: FxHashMap<SmolStr, FontMetrics> = FxHashMap::default();

        for event in ContentParser::new(content) {
            let ContentEvent::Op(op) = event else {
                continue;
            };
            match op.kind {
                Op::Qq => stack.push((ctm, ts.clone())),
                Op::Q => {
                    if let Some((m, t)) = stack.pop() {
                        ctm = m;
                        ts = t;
                    }
                }
                Op::Cm => {
                    if let Some(m) = operand_matrix(&op) {
                        ctm = mult_matrix(m, ctm);
                    }
                }
                Op::BT => ts.reset_matrices(),
                Op::Tc => {
                    if let Some(v) = operand_num(&op, 0) {
                        ts.char_spacing = v;
                    }
                }
                Op::Tw => {
                    if let Some(v) = operand_num(&op, 0) {
                        ts.word_spacing = v;
                    }
                }
                Op::Tz => {
                    if let Some(v) = operand_num(&op, 0) {
                        ts.scaling = v;
                    }
                }
                Op::Ts => {
                    if let Some(v) = operand_num(&op, 0) {
                        ts.rise = v;
                    }
                }
                Op::TL => {
                    if let Some(v) = operand_num(&op, 0) {
                        ts.leading = v;
                    }
                }
                Op::Tf => {
                    if let Some(name) = op.operands.first().and_then(|o| o.as_name().ok()) {
                        font = fonts
                            .entry(SmolStr::new(name))
                            .or_insert_with(|| match resources.get("Font") {
                                Some(PdfObject::Dict(d)) => match d.get(name) {
                                    Some(obj) => match dict_value(obj) {
                                        Ok(dict) => FontMetrics::from_dict(dict),
                                        Err(_) => FontMetrics::from_dict(&PdfDict::new()),
                                    },
                                    None => FontMetrics::from_dict(&PdfDict::new()),
                                },
                                _ => FontMetrics::from_dict(&PdfDict::new()),
                            })
                            .clone();
                    }
                    if let Some(size) = operand_num(&op, 1) {
                        ts.font_size = size;
                    }
                }
                Op::Td => {
                    if let (Some(dx), Some(dy)) = (operand_num(&op, 0), operand_num(&op, 1)) {
                        ts.line_matrix = translate_matrix(ts.line_matrix, (dx, dy));
                        ts.matrix = ts.line_matrix;
                    }
                }
                Op::TD => {
                    if let (Some(dx), Some(dy)) = (operand_num(&op, 0), operand_num(&op, 1)) {
                        ts.leading = -dy;
                        ts.line_matrix = translate_matrix(ts.line_matrix, (dx, dy));
                        ts.matrix = ts.line_matrix;
                    }
                }
                Op::Tm => {
                    if let Some(m) = operand_matrix(&op) {
                        ts.line_matrix = m;
                        ts.matrix = m;
                    }
                }
                Op::TStar => next_line(&mut ts),
                Op::Tj => {
                    if let Some(bytes) = op.operands.first().and_then(|o| o.as_str_bytes().ok()) {
                        self.show(bytes, &font, &mut ts, ctm);
                    }
                }
                Op::Quote => {
                    next_line(&mut ts);
                    if let Some(bytes) = op.operands.first().and_then(|o| o.as_str_bytes().ok()) {
                        self.show(bytes, &font, &mut ts, ctm);
                    }
                }
                Op::DoubleQuote => {
                    if let Some(aw) = operand_num(&op, 0) {
                        ts.word_spacing = aw;
                    }
                    if let Some(ac) = operand_num(&op, 1) {
                        ts.char_spacing = ac;
                    }
                    next_line(&mut ts);
                    if let Some(bytes) = op.operands.get(2).and_then(|o| o.as_str_bytes().ok()) {
                        self.show(bytes, &font, &mut ts, ctm);
                    }
                }
                Op::TJ => {
                    if let Some(PdfObject::Array(items)) = op.operands.first() {
                        for item in items {
                            match item {
                                PdfObject::String(bytes) => self.show(bytes, &font, &mut ts, ctm),
                                other => {
                                    if let Ok(n) = num_value(other) {
                                        let dx = adjustment_to_dx(n, &ts);
                                        ts.matrix = translate_matrix(ts.matrix, (dx, 0.0));
                                    }
                                }
                            }
                        }
                    }
                }
                Op::Do => {
                    if let Some(name) = op.operands.first().and_then(|o| o.as_name().ok()) {
                        self.enter_form(name, resources, ctm);
                    }
                }
                _ => {}
            }
        }
    }

    fn show(&mut self, bytes: &[u8], font: &FontMetrics, ts: &mut TextState, ctm: Matrix) {
        let mut total = 0.0;
        for info in decompose_run(bytes, font, ts, ctm) {
            let bbox = quad_bbox(&info.quad);
            self.push_separator(bbox);
            self.out.push(SweptGlyph {
                ch: char::from_u32(info.glyph.code).unwrap_or('\u{FFFD}'),
                bbox,
            });
            if bbox.2 > bbox.0 && bbox.3 > bbox.1 {
                self.last_box = Some(bbox);
            }
            total += info.advance;
        }
        ts.matrix = translate_matrix(ts.matrix, (total, 0.0));
    }

    /// Synthesize a word or line separator when the next glyph does not
    /// continue the previous one.
    fn push_separator(&mut self, next: Rect) {
        let Some(prev) = self.last_box else {
            return;
        };
        if next.2 <= next.0 || next.3 <= next.1 {
            return;
        }
        let sep = if prev.1 < next.3 && next.1 < prev.3 {
            let height = (prev.3 - prev.1).max(next.3 - next.1);
            (next.0 - prev.2 > WORD_GAP_FACTOR * height).then_some(' ')
        } else {
            Some('\n')
        };
        if let Some(ch) = sep
            && self.out.last().is_none_or(|g| g.has_area())
        {
            self.out.push(SweptGlyph {
                ch,
                bbox: (prev.2, prev.3, prev.2, prev.3),
            });
        }
    }

    fn enter_form(&mut self, name: &str, resources: &PdfDict, ctm: Matrix) {
        let Some(PdfObject::Dict(xobjects)) = resources.get("XObject") else {
            return;
        };
        let Some(PdfObject::Stream(form)) = xobjects.get(name) else {
            return;
        };
        if form.get("Subtype").and_then(|o| o.as_name().ok()) != Some("Form") {
            return;
        }
        if self.guard.contains(&form.uid()) {
            warn!(name, "recursive form reference, skipping");
            return;
        }
        let Ok(content) = decode_stream(form) else {
            return;
        };
        let matrix = form
            .get("Matrix")
            .and_then(|o| matrix_value(o).ok())
            .unwrap_or(MATRIX_IDENTITY);
        let inner_ctm = mult_matrix(matrix, ctm);
        let own_resources = form.get("Resources").and_then(|o| dict_value(o).ok());

        self.guard.push(form.uid());
        self.scan(&content, own_resources.unwrap_or(resources), inner_ctm);
        self.guard.pop();
    }
}

fn next_line(ts: &mut TextState) {
    ts.line_matrix = translate_matrix(ts.line_matrix, (0.0, -ts.leading));
    ts.matrix = ts.line_matrix;
}

fn operand_num(op: &ContentOp, index: usize) -> Option<f64> {
    op.operands.get(index).and_then(|o| num_value(o).ok())
}

fn operand_matrix(op: &ContentOp) -> Option<Matrix> {
    Some((
        operand_num(op, 0)?,
        operand_num(op, 1)?,
        operand_num(op, 2)?,
        operand_num(op, 3)?,
        operand_num(op, 4)?,
        operand_num(op, 5)?,
    ))
}

/// Merge per-glyph boxes into one box per visual line. The union spans
/// word gaps inside the match, so the erased area is contiguous.
fn merge_line_boxes(glyphs: &[SweptGlyph]) -> Vec<Rect> {
    let mut out: Vec<Rect> = Vec::new();
    let mut current: Option<Rect> = None;
    for g in glyphs.iter().filter(|g| g.has_area()) {
        current = Some(match current {
            Some(c) if c.1 < g.bbox.3 && g.bbox.1 < c.3 => (
                c.0.min(g.bbox.0),
                c.1.min(g.bbox.1),
                c.2.max(g.bbox.2),
                c.3.max(g.bbox.3),
            ),
            Some(c) => {
                out.push(c);
                g.bbox
            }
            None => g.bbox,
        });
    }
    out.extend(current);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Page;
    use crate::model::PdfStream;

    fn font_resources() -> PdfDict {
        let mut fonts = PdfDict::new();
        fonts.insert(SmolStr::new("F1"), PdfObject::Dict(PdfDict::new()));
        let mut res = PdfDict::new();
        res.insert(SmolStr::new("Font"), PdfObject::Dict(fonts));
        res
    }

    fn page_with(content: &str) -> Page {
        Page::new(
            content.as_bytes().to_vec(),
            font_resources(),
            (0.0, 0.0, 612.0, 792.0),
        )
    }

    fn swept_text(glyphs: &[SweptGlyph]) -> String {
        glyphs.iter().map(|g| g.ch).collect()
    }

    #[test]
    fn test_scan_positions_glyphs() {
        let page = page_with("BT /F1 12 Tf 72 700 Td (AB) Tj ET");
        let glyphs = scan_page(&page);
        assert_eq!(swept_text(&glyphs), "AB");
        let a = &glyphs[0];
        assert!((a.bbox.0 - 72.0).abs() < 1e-9);
        assert!((a.bbox.1 - 697.6).abs() < 1e-9);
        assert!((a.bbox.3 - 709.6).abs() < 1e-9);
        // Helvetica A is 667/1000 wide
        let b = &glyphs[1];
        assert!((b.bbox.0 - 80.004).abs() < 1e-9);
    }

    #[test]
    fn test_word_gap_synthesizes_space() {
        let page = page_with("BT /F1 12 Tf 72 700 Td (AB) Tj 50 0 Td (CD) Tj ET");
        assert_eq!(swept_text(&scan_page(&page)), "AB CD");
    }

    #[test]
    fn test_kerning_adjustment_is_not_a_space() {
        let page = page_with("BT /F1 12 Tf 72 700 Td [(A) -100 (B)] TJ ET");
        assert_eq!(swept_text(&scan_page(&page)), "AB");
    }

    #[test]
    fn test_wide_adjustment_is_a_space() {
        let page = page_with("BT /F1 12 Tf 72 700 Td [(A) -500 (B)] TJ ET");
        assert_eq!(swept_text(&scan_page(&page)), "A B");
    }

    #[test]
    fn test_line_change_synthesizes_newline() {
        let page = page_with("BT /F1 12 Tf 72 700 Td (AB) Tj 0 -14 Td (CD) Tj ET");
        assert_eq!(swept_text(&scan_page(&page)), "AB\nCD");
    }

    #[test]
    fn test_scan_descends_into_forms() {
        let mut attrs = PdfDict::new();
        attrs.insert(SmolStr::new("Subtype"), PdfObject::name("Form"));
        attrs.insert(
            SmolStr::new("Matrix"),
            PdfObject::Array(vec![
                PdfObject::Int(1),
                PdfObject::Int(0),
                PdfObject::Int(0),
                PdfObject::Int(1),
                PdfObject::Int(10),
                PdfObject::Int(20),
            ]),
        );
        let form = PdfStream::new(attrs, b"BT /F1 12 Tf 0 0 Td (XY) Tj ET".to_vec());
        let mut xobjects = PdfDict::new();
        xobjects.insert(SmolStr::new("Fm0"), PdfObject::Stream(Box::new(form)));
        let mut res = font_resources();
        res.insert(SmolStr::new("XObject"), PdfObject::Dict(xobjects));
        let page = Page::new(b"/Fm0 Do".to_vec(), res, (0.0, 0.0, 612.0, 792.0));
        let glyphs = scan_page(&page);
        assert_eq!(swept_text(&glyphs), "XY");
        assert!((glyphs[0].bbox.0 - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_regex_strategy_boxes_match() {
        let page = page_with("BT /F1 12 Tf 72 700 Td (SECRET DATA) Tj ET");
        let glyphs = scan_page(&page);
        let mut strategy = RegexSweepStrategy::new(Regex::new("SECRET").unwrap());
        let locations = strategy.locations(0, &glyphs);
        assert_eq!(locations.len(), 1);
        let r = locations[0].region();
        assert!((r.0 - 72.0).abs() < 1e-9);
        // width of SECRET at 12pt Helvetica
        assert!((r.2 - 72.0 - 48.672).abs() < 1e-6);
        assert!((r.1 - 697.6).abs() < 1e-9);
        assert!((r.3 - 709.6).abs() < 1e-9);
    }

    #[test]
    fn test_match_across_gap_yields_one_box() {
        let page = page_with("BT /F1 12 Tf 72 700 Td (AB) Tj 50 0 Td (CD) Tj ET");
        let glyphs = scan_page(&page);
        let mut strategy = RegexSweepStrategy::new(Regex::new("AB CD").unwrap());
        let locations = strategy.locations(0, &glyphs);
        assert_eq!(locations.len(), 1);
        let r = locations[0].region();
        assert!((r.0 - 72.0).abs() < 1e-9);
        assert!(r.2 > 122.0);
    }

    #[test]
    fn test_match_spanning_lines_yields_one_box_per_line() {
        let page = page_with("BT /F1 12 Tf 72 700 Td (AB) Tj 0 -14 Td (CD) Tj ET");
        let glyphs = scan_page(&page);
        let mut strategy = RegexSweepStrategy::new(Regex::new("AB\nCD").unwrap());
        let locations = strategy.locations(0, &glyphs);
        assert_eq!(locations.len(), 2);
    }

    #[test]
    fn test_composite_sorts_top_to_bottom() {
        let page = page_with("BT /F1 12 Tf 72 600 Td (LOW) Tj 0 100 Td (HIGH) Tj ET");
        let glyphs = scan_page(&page);
        let mut composite = CompositeSweepStrategy::new();
        composite.add(Box::new(RegexSweepStrategy::new(
            Regex::new("LOW").unwrap(),
        )));
        composite.add(Box::new(RegexSweepStrategy::new(
            Regex::new("HIGH").unwrap(),
        )));
        let locations = composite.locations(0, &glyphs);
        assert_eq!(locations.len(), 2);
        assert!(locations[0].region().3 > locations[1].region().3);
    }

    #[test]
    fn test_auto_sweep_erases_matches() {
        let mut doc = Document::new(vec![page_with(
            "BT /F1 12 Tf 72 700 Td (SECRET DATA) Tj ET",
        )]);
        let mut strategy = RegexSweepStrategy::new(Regex::new("SECRET").unwrap())
            .with_fill_color(Color::Gray(0.0));
        auto_sweep(&mut doc, &mut strategy, &CleanupProperties::new()).unwrap();
        let out = String::from_utf8_lossy(&doc.pages[0].content).into_owned();
        assert!(!out.contains("SECRET"));
        assert!(out.contains("DATA"));
        // the matched area is painted over
        assert!(out.contains("0 g"));
        assert!(out.contains("re"));
    }

    #[test]
    fn test_auto_sweep_without_matches_is_a_no_op() {
        let mut doc = Document::new(vec![page_with("BT /F1 12 Tf 72 700 Td (HELLO) Tj ET")]);
        let before = doc.pages[0].content.clone();
        let mut strategy = RegexSweepStrategy::new(Regex::new("ABSENT").unwrap());
        auto_sweep(&mut doc, &mut strategy, &CleanupProperties::new()).unwrap();
        assert_eq!(doc.pages[0].content, before);
    }
}
