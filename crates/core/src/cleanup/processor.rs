//! Content-stream rewriting.
//!
//! [`ContentStreamProcessor`] interprets a page's content stream while
//! writing a filtered copy. Operators whose geometry stays clear of every
//! cleanup region pass through byte-exact via their source spans; touched
//! operators are re-emitted with the covered parts cut out.
//!
//! Graphics-state operators are not copied eagerly. Each `q` level owns a
//! delta of pending state changes (matrix concat, `gs` selections, color
//! and line-style selects, text state) that is only written once content at
//! or below that level actually survives. A level whose content vanished
//! entirely contributes nothing to the output, save/restore included. The
//! same applies to marked-content tags: `BDC`/`BMC` are queued and opened
//! lazily, and a tag whose body was removed is dropped together with its
//! structure-tree item.

use std::mem;
use std::ops::Range;

use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use tracing::{debug, warn};

use crate::canvas::{ContentWriter, TextItem, fmt_number};
use crate::cleanup::image_filter::{
    FilteredImage, FilteredImagesCache, filter_image_cached, filter_inline_image,
};
use crate::cleanup::location::CleanupProperties;
use crate::cleanup::stroke::stroke_to_fill;
use crate::cleanup::text::{
    TextPositioningTracker, adjustment_to_dx, decompose_run, dx_to_adjustment,
};
use crate::codec::{decode_stream, flateencode};
use crate::document::Page;
use crate::error::Result;
use crate::font::FontMetrics;
use crate::geometry::{FillRule, FilteredPath, Path, Quad, Segment, Subpath, filter_fill_path,
    quads_intersect, region_hits_quad, transformed_rect_quad};
use crate::model::{
    CapStyle, Color, DashPattern, GraphicsState, JoinStyle, PdfDict, PdfObject, PdfStream,
    TextState, dict_value, matrix_value, num_value, rect_value,
};
use crate::parser::{ContentEvent, ContentOp, ContentParser, InlineImage, Op};
use crate::utils::{
    CLEANUP_EPSILON, MATRIX_IDENTITY, Matrix, Point, Rect, apply_matrix_pt, intersect_rects,
    invert_matrix, mult_matrix, normalize_rect, points_bbox, rect_corners, translate_matrix,
};

/// Result of rewriting one content stream.
#[derive(Debug)]
pub struct ProcessedContent {
    pub content: Vec<u8>,
    /// Page resources with replaced image and form XObjects swapped in.
    pub resources: PdfDict,
    /// MCIDs of marked-content items that lost all their content.
    pub removed_mcids: Vec<i64>,
}

/// Rewrites content streams against a fixed set of cleanup regions.
///
/// One processor handles one page; the image cache is injected so a
/// multi-page run can share decoded results for images reused across
/// pages.
pub struct ContentStreamProcessor<'a> {
    regions: Vec<Rect>,
    region_quads: Vec<Quad>,
    props: &'a CleanupProperties,
    cache: &'a mut FilteredImagesCache,
    form_guard: Vec<u64>,
    removed_mcids: Vec<i64>,
}

impl<'a> ContentStreamProcessor<'a> {
    pub fn new(
        regions: &[Rect],
        props: &'a CleanupProperties,
        cache: &'a mut FilteredImagesCache,
    ) -> Self {
        let regions: Vec<Rect> = regions.iter().map(|r| normalize_rect(*r)).collect();
        let region_quads = regions.iter().map(|r| rect_corners(*r)).collect();
        Self {
            regions,
            region_quads,
            props,
            cache,
            form_guard: Vec::new(),
            removed_mcids: Vec::new(),
        }
    }

    pub fn process_page(&mut self, page: &Page) -> Result<ProcessedContent> {
        let mut resources = page.resources.clone();
        let content = self.process_stream(
            &page.content,
            &mut resources,
            GraphicsState::new(MATRIX_IDENTITY),
        )?;
        Ok(ProcessedContent {
            content,
            resources,
            removed_mcids: mem::take(&mut self.removed_mcids),
        })
    }

    /// Rewrite one stream. Form XObjects recurse here with their own
    /// starting state and resource dictionary.
    fn process_stream(
        &mut self,
        source: &[u8],
        resources: &mut PdfDict,
        state: GraphicsState,
    ) -> Result<Vec<u8>> {
        let run = StreamRun {
            proc: self,
            resources,
            source,
            out: ContentWriter::new(),
            gs: state,
            ts: TextState::new(),
            stack: Vec::new(),
            deltas: vec![Delta::base()],
            open_tags: 0,
            bt_pending: false,
            tracker: TextPositioningTracker::new(),
            font: FontMetrics::from_dict(&PdfDict::new()),
            fonts: FxHashMap::default(),
            subpaths: Vec::new(),
            current_point: None,
            construction_spans: Vec::new(),
            path_spans: Vec::new(),
            pending_clip: None,
        };
        run.run()
    }
}

/// A color-channel entry pending emission. Device colors are tracked as
/// values so stroke-to-fill conversion can repaint with them; colorspace
/// based selections replay their original bytes.
#[derive(Debug)]
enum PendingColor {
    Typed(Color),
    Raw(Op, Vec<u8>),
}

#[derive(Debug)]
struct QueuedTag {
    tag: SmolStr,
    props: Option<PdfObject>,
    mcid: Option<i64>,
}

/// Pending state changes of one save/restore level.
#[derive(Debug, Default)]
struct Delta {
    /// The level's `q` has been written to the output.
    opened: bool,
    matrix: Option<Matrix>,
    gs_names: Vec<SmolStr>,
    fill: Vec<PendingColor>,
    stroke: Vec<PendingColor>,
    line: Vec<(Op, Vec<u8>)>,
    text: Vec<(Op, Vec<u8>)>,
    tags: Vec<QueuedTag>,
    /// Tags queued before the current `BT`; they open outside the text
    /// object, the rest inside.
    tags_outer: usize,
}

impl Delta {
    /// The stream's outermost level needs no `q` of its own.
    fn base() -> Self {
        Delta {
            opened: true,
            ..Delta::default()
        }
    }
}

enum ShowKind {
    Plain,
    Array,
    NextLine,
    Spaced,
}

enum Coverage {
    Clear,
    Full,
    Partial(Vec<Rect>),
}

struct StreamRun<'r, 'a> {
    proc: &'r mut ContentStreamProcessor<'a>,
    resources: &'r mut PdfDict,
    source: &'r [u8],
    out: ContentWriter,
    gs: GraphicsState,
    ts: TextState,
    stack: Vec<(GraphicsState, TextState)>,
    deltas: Vec<Delta>,
    open_tags: usize,
    bt_pending: bool,
    tracker: TextPositioningTracker,
    font: FontMetrics,
    fonts: FxHashMap<SmolStr, FontMetrics>,
    subpaths: Vec<Subpath>,
    current_point: Option<Point>,
    construction_spans: Vec<Range<usize>>,
    path_spans: Vec<Range<usize>>,
    pending_clip: Option<FillRule>,
}

impl StreamRun<'_, '_> {
    fn run(mut self) -> Result<Vec<u8>> {
        for event in ContentParser::new(self.source) {
            match event {
                ContentEvent::Op(op) => self.handle_op(op)?,
                ContentEvent::InlineImage(img) => self.handle_inline_image(&img)?,
            }
        }
        Ok(self.out.into_bytes())
    }

    fn handle_op(&mut self, op: ContentOp) -> Result<()> {
        match op.kind {
            Op::Qq => self.save_state(),
            Op::Q => self.restore_state(),
            Op::Cm => self.concat_matrix(&op),
            Op::Gs => self.select_ext_gstate(&op),
            Op::Ww | Op::J | Op::Jj | Op::M | Op::D | Op::Ri | Op::I => self.line_state(&op),
            Op::Gg | Op::Rg | Op::Kk => self.typed_color(&op, false),
            Op::G | Op::RG | Op::K => self.typed_color(&op, true),
            Op::Cs | Op::Sc | Op::Scn => self.raw_color(&op, false),
            Op::CS | Op::SC | Op::SCN => self.raw_color(&op, true),
            Op::Tc | Op::Tw | Op::Tz | Op::Tf | Op::Tr | Op::Ts => self.text_state(&op),
            Op::TL => self.set_leading(&op),
            Op::BT => self.begin_text(),
            Op::ET => self.end_text(),
            Op::Td => self.move_text(&op, false),
            Op::TD => self.move_text(&op, true),
            Op::Tm => self.set_text_matrix(&op),
            Op::TStar => self.next_line(),
            Op::Tj => self.show(&op, ShowKind::Plain),
            Op::TJ => self.show(&op, ShowKind::Array),
            Op::Quote => self.show(&op, ShowKind::NextLine),
            Op::DoubleQuote => self.show(&op, ShowKind::Spaced),
            Op::Mm | Op::L | Op::C | Op::V | Op::Y | Op::H | Op::Re => self.path_op(&op),
            Op::WClip => self.set_clip(&op, FillRule::Nonzero),
            Op::WStar => self.set_clip(&op, FillRule::EvenOdd),
            Op::S
            | Op::Ss
            | Op::F
            | Op::Ff
            | Op::FStar
            | Op::B
            | Op::BStar
            | Op::Bb
            | Op::BbStar
            | Op::N => self.paint(&op),
            Op::Do => self.invoke_xobject(&op)?,
            Op::BMC | Op::BDC => self.begin_tag(&op),
            Op::EMC => self.end_tag(),
            // content points carry no geometry to test; keep them under
            // their proper parent tag
            Op::MP | Op::DP | Op::Sh => self.passthrough(&op),
            Op::BX | Op::EX | Op::D0 | Op::D1 => self.passthrough_quiet(&op),
            Op::Unknown => self.passthrough(&op),
        }
        Ok(())
    }

    // --- pending-state machinery ---

    fn delta(&mut self) -> &mut Delta {
        if self.deltas.is_empty() {
            self.deltas.push(Delta::base());
        }
        let last = self.deltas.len() - 1;
        &mut self.deltas[last]
    }

    /// Write out everything queued before visible content: unopened `q`
    /// levels, their pending state, and queued marked-content tags.
    fn flush_pending(&mut self, outer_tags_only: bool) {
        for i in 0..self.deltas.len() {
            if !self.deltas[i].opened {
                self.deltas[i].opened = true;
                self.out.save_state();
            }
            if let Some(m) = self.deltas[i].matrix.take() {
                self.out.concat(m);
            }
            for name in mem::take(&mut self.deltas[i].gs_names) {
                self.out.set_ext_gstate(&name);
            }
            for entry in mem::take(&mut self.deltas[i].fill) {
                match entry {
                    PendingColor::Typed(c) => self.out.set_fill_color(c),
                    PendingColor::Raw(_, bytes) => self.out.write_raw(&bytes),
                }
            }
            for entry in mem::take(&mut self.deltas[i].stroke) {
                match entry {
                    PendingColor::Typed(c) => self.out.set_stroke_color(c),
                    PendingColor::Raw(_, bytes) => self.out.write_raw(&bytes),
                }
            }
            for (_, bytes) in mem::take(&mut self.deltas[i].line) {
                self.out.write_raw(&bytes);
            }
            for (_, bytes) in mem::take(&mut self.deltas[i].text) {
                self.out.write_raw(&bytes);
            }
            let take = if outer_tags_only {
                self.deltas[i].tags_outer.min(self.deltas[i].tags.len())
            } else {
                self.deltas[i].tags.len()
            };
            self.deltas[i].tags_outer -= self.deltas[i].tags_outer.min(take);
            let tags: Vec<QueuedTag> = self.deltas[i].tags.drain(..take).collect();
            for tag in tags {
                self.out.begin_marked_content(&tag.tag, tag.props.as_ref());
                self.open_tags += 1;
            }
        }
    }

    fn save_state(&mut self) {
        self.stack.push((self.gs.clone(), self.ts.clone()));
        self.deltas.push(Delta::default());
    }

    fn restore_state(&mut self) {
        let Some((gs, ts)) = self.stack.pop() else {
            debug!("unbalanced restore, dropping");
            return;
        };
        self.gs = gs;
        self.ts = ts;
        if let Some(delta) = self.deltas.pop() {
            for tag in delta.tags {
                self.record_dropped_tag(tag);
            }
            if delta.opened {
                self.out.restore_state();
            }
        }
    }

    fn concat_matrix(&mut self, op: &ContentOp) {
        let Some(m) = operand_matrix(&op.operands) else {
            return;
        };
        self.gs.ctm = mult_matrix(m, self.gs.ctm);
        let delta = self.delta();
        delta.matrix = Some(match delta.matrix {
            Some(pending) => mult_matrix(m, pending),
            None => m,
        });
    }

    fn select_ext_gstate(&mut self, op: &ContentOp) {
        let Some(name) = op.operands.first().and_then(|o| o.as_name().ok()) else {
            return;
        };
        // ExtGState entries can rewrite the line parameters the stroke
        // converter depends on
        let gs_dict = self
            .resource_entry("ExtGState", name)
            .and_then(|o| dict_value(o).ok())
            .cloned();
        match gs_dict {
            Some(dict) => self.apply_ext_gstate(&dict),
            None => debug!(name, "ExtGState resource missing"),
        }
        let name = SmolStr::new(name);
        self.delta().gs_names.push(name);
    }

    fn apply_ext_gstate(&mut self, dict: &PdfDict) {
        if let Some(v) = dict.get("LW").and_then(|o| num_value(o).ok()) {
            self.gs.line_width = v;
        }
        if let Some(v) = dict.get("LC").and_then(|o| o.as_i64().ok()) {
            self.gs.line_cap = CapStyle::from_code(v);
        }
        if let Some(v) = dict.get("LJ").and_then(|o| o.as_i64().ok()) {
            self.gs.line_join = JoinStyle::from_code(v);
        }
        if let Some(v) = dict.get("ML").and_then(|o| num_value(o).ok()) {
            self.gs.miter_limit = v;
        }
        if let Some(PdfObject::Array(entry)) = dict.get("D")
            && let Some(PdfObject::Array(arr)) = entry.first()
        {
            self.gs.dash = DashPattern {
                array: arr.iter().filter_map(|o| num_value(o).ok()).collect(),
                phase: entry.get(1).and_then(|o| num_value(o).ok()).unwrap_or(0.0),
            };
        }
    }

    fn line_state(&mut self, op: &ContentOp) {
        match op.kind {
            Op::Ww => {
                if let Some(v) = operand_num(&op.operands, 0) {
                    self.gs.line_width = v;
                }
            }
            Op::J => {
                if let Some(v) = op.operands.first().and_then(|o| o.as_i64().ok()) {
                    self.gs.line_cap = CapStyle::from_code(v);
                }
            }
            Op::Jj => {
                if let Some(v) = op.operands.first().and_then(|o| o.as_i64().ok()) {
                    self.gs.line_join = JoinStyle::from_code(v);
                }
            }
            Op::M => {
                if let Some(v) = operand_num(&op.operands, 0) {
                    self.gs.miter_limit = v;
                }
            }
            Op::D => {
                if let Some(PdfObject::Array(arr)) = op.operands.first() {
                    self.gs.dash = DashPattern {
                        array: arr.iter().filter_map(|o| num_value(o).ok()).collect(),
                        phase: operand_num(&op.operands, 1).unwrap_or(0.0),
                    };
                }
            }
            _ => {}
        }
        let bytes = self.source[op.span.clone()].to_vec();
        queue_replacing(&mut self.delta().line, op.kind, bytes);
    }

    fn typed_color(&mut self, op: &ContentOp, stroke: bool) {
        let color = match op.kind {
            Op::Gg | Op::G => match operand_num(&op.operands, 0) {
                Some(v) => Color::Gray(v),
                None => return,
            },
            Op::Rg | Op::RG => {
                match (
                    operand_num(&op.operands, 0),
                    operand_num(&op.operands, 1),
                    operand_num(&op.operands, 2),
                ) {
                    (Some(r), Some(g), Some(b)) => Color::Rgb(r, g, b),
                    _ => return,
                }
            }
            _ => {
                match (
                    operand_num(&op.operands, 0),
                    operand_num(&op.operands, 1),
                    operand_num(&op.operands, 2),
                    operand_num(&op.operands, 3),
                ) {
                    (Some(c), Some(m), Some(y), Some(k)) => Color::Cmyk(c, m, y, k),
                    _ => return,
                }
            }
        };
        if stroke {
            self.gs.stroke_color = color;
        } else {
            self.gs.fill_color = color;
        }
        let delta = self.delta();
        let channel = if stroke {
            &mut delta.stroke
        } else {
            &mut delta.fill
        };
        // a device color fully determines the channel
        channel.clear();
        channel.push(PendingColor::Typed(color));
    }

    fn raw_color(&mut self, op: &ContentOp, stroke: bool) {
        let bytes = self.source[op.span.clone()].to_vec();
        let delta = self.delta();
        let channel = if stroke {
            &mut delta.stroke
        } else {
            &mut delta.fill
        };
        match op.kind {
            // colorspace select resets the color to the space default
            Op::Cs | Op::CS => {
                channel.clear();
                channel.push(PendingColor::Raw(op.kind, bytes));
            }
            _ => {
                if let Some(PendingColor::Raw(kind, slot)) = channel.last_mut()
                    && matches!(kind, Op::Sc | Op::Scn | Op::SC | Op::SCN)
                {
                    *kind = op.kind;
                    *slot = bytes;
                } else {
                    channel.push(PendingColor::Raw(op.kind, bytes));
                }
            }
        }
    }

    fn text_state(&mut self, op: &ContentOp) {
        match op.kind {
            Op::Tc => {
                if let Some(v) = operand_num(&op.operands, 0) {
                    self.ts.char_spacing = v;
                }
            }
            Op::Tw => {
                if let Some(v) = operand_num(&op.operands, 0) {
                    self.ts.word_spacing = v;
                }
            }
            Op::Tz => {
                if let Some(v) = operand_num(&op.operands, 0) {
                    self.ts.scaling = v;
                }
            }
            Op::Tr => {
                if let Some(v) = op.operands.first().and_then(|o| o.as_i64().ok()) {
                    self.ts.render_mode = v;
                }
            }
            Op::Ts => {
                if let Some(v) = operand_num(&op.operands, 0) {
                    self.ts.rise = v;
                }
            }
            Op::Tf => {
                if let Some(name) = op.operands.first().and_then(|o| o.as_name().ok()) {
                    let name = SmolStr::new(name);
                    self.font = self.resolve_font(&name);
                    self.ts.font_name = Some(name);
                }
                if let Some(size) = operand_num(&op.operands, 1) {
                    self.ts.font_size = size;
                }
            }
            _ => {}
        }
        let bytes = self.source[op.span.clone()].to_vec();
        queue_replacing(&mut self.delta().text, op.kind, bytes);
    }

    fn resolve_font(&mut self, name: &SmolStr) -> FontMetrics {
        if let Some(hit) = self.fonts.get(name) {
            return hit.clone();
        }
        let metrics = match self.resource_entry("Font", name) {
            Some(obj) => match dict_value(obj) {
                Ok(dict) => FontMetrics::from_dict(dict),
                Err(_) => FontMetrics::from_dict(&PdfDict::new()),
            },
            None => {
                debug!(font = %name, "font resource missing, using fallback metrics");
                FontMetrics::from_dict(&PdfDict::new())
            }
        };
        self.fonts.insert(name.clone(), metrics.clone());
        metrics
    }

    // --- text objects ---

    fn set_leading(&mut self, op: &ContentOp) {
        if let Some(v) = operand_num(&op.operands, 0) {
            self.ts.leading = v;
            self.tracker.set_leading(v);
        }
    }

    fn begin_text(&mut self) {
        self.bt_pending = true;
        self.ts.reset_matrices();
        self.tracker.reset_object();
        for delta in &mut self.deltas {
            delta.tags_outer = delta.tags.len();
        }
    }

    fn end_text(&mut self) {
        if self.bt_pending {
            // nothing inside survived; the whole object disappears
            self.bt_pending = false;
        } else {
            self.out.end_text();
        }
        self.tracker.reset_object();
    }

    /// Open the output text object if a show is about to write into it.
    fn ensure_text_object(&mut self) {
        if self.bt_pending {
            self.flush_pending(true);
            self.out.begin_text();
            self.bt_pending = false;
        }
        self.flush_pending(false);
    }

    fn move_text(&mut self, op: &ContentOp, with_leading: bool) {
        let (Some(dx), Some(dy)) = (operand_num(&op.operands, 0), operand_num(&op.operands, 1))
        else {
            return;
        };
        self.ts.line_matrix = translate_matrix(self.ts.line_matrix, (dx, dy));
        self.ts.matrix = self.ts.line_matrix;
        if with_leading {
            self.ts.leading = -dy;
            self.tracker.move_text_with_leading(dx, dy);
        } else {
            self.tracker.move_text(dx, dy);
        }
    }

    fn set_text_matrix(&mut self, op: &ContentOp) {
        let Some(m) = operand_matrix(&op.operands) else {
            return;
        };
        self.ts.line_matrix = m;
        self.ts.matrix = m;
        self.tracker.set_matrix(m);
    }

    fn next_line(&mut self) {
        let dy = -self.ts.leading;
        self.ts.line_matrix = translate_matrix(self.ts.line_matrix, (0.0, dy));
        self.ts.matrix = self.ts.line_matrix;
        self.tracker.next_line();
    }

    fn show(&mut self, op: &ContentOp, kind: ShowKind) {
        match kind {
            ShowKind::NextLine => self.next_line(),
            ShowKind::Spaced => {
                if let (Some(aw), Some(ac)) =
                    (operand_num(&op.operands, 0), operand_num(&op.operands, 1))
                {
                    self.ts.word_spacing = aw;
                    self.ts.char_spacing = ac;
                    let tw = format!("{} Tw", fmt_number(aw)).into_bytes();
                    queue_replacing(&mut self.delta().text, Op::Tw, tw);
                    let tc = format!("{} Tc", fmt_number(ac)).into_bytes();
                    queue_replacing(&mut self.delta().text, Op::Tc, tc);
                }
                self.next_line();
            }
            _ => {}
        }

        let storage;
        let items: &[PdfObject] = match kind {
            ShowKind::Array => match op.operands.first() {
                Some(PdfObject::Array(arr)) => arr,
                _ => return,
            },
            ShowKind::Spaced => match op.operands.get(2) {
                Some(s @ PdfObject::String(_)) => {
                    storage = [s.clone()];
                    &storage
                }
                _ => return,
            },
            _ => match op.operands.first() {
                Some(s @ PdfObject::String(_)) => {
                    storage = [s.clone()];
                    &storage
                }
                _ => return,
            },
        };

        let mut pending_dx = self.tracker.take_adjustment();
        let had_adjustment = pending_dx != 0.0;
        let mut removed_any = false;
        let mut out_items: Vec<TextItem> = Vec::new();

        for item in items {
            match item {
                PdfObject::String(bytes) => {
                    let infos = decompose_run(bytes, &self.font, &self.ts, self.gs.ctm);
                    let mut total = 0.0;
                    let mut run: Option<Range<usize>> = None;
                    for info in &infos {
                        total += info.advance;
                        let hit = self.proc.region_quads.iter().any(|region| {
                            region_hits_quad(region, &info.quad, self.proc.props.overlap_ratio)
                        });
                        if hit {
                            removed_any = true;
                            if let Some(r) = run.take() {
                                out_items.push(TextItem::Str(bytes[r].to_vec()));
                            }
                            pending_dx += info.advance;
                        } else {
                            let start = info.glyph.start;
                            let end = start + info.glyph.len;
                            match &mut run {
                                Some(r) => r.end = end,
                                None => {
                                    if pending_dx != 0.0 {
                                        out_items.push(TextItem::Num(dx_to_adjustment(
                                            pending_dx, &self.ts,
                                        )));
                                        pending_dx = 0.0;
                                    }
                                    run = Some(start..end);
                                }
                            }
                        }
                    }
                    if let Some(r) = run {
                        out_items.push(TextItem::Str(bytes[r].to_vec()));
                    }
                    self.ts.matrix = translate_matrix(self.ts.matrix, (total, 0.0));
                }
                other => {
                    if let Ok(n) = num_value(other) {
                        let dx = adjustment_to_dx(n, &self.ts);
                        self.ts.matrix = translate_matrix(self.ts.matrix, (dx, 0.0));
                        pending_dx += dx;
                    }
                }
            }
        }

        let survived = out_items
            .iter()
            .any(|item| matches!(item, TextItem::Str(_)));
        if !survived {
            // everything removed; carry the whole displacement forward
            self.tracker.add_adjustment(pending_dx);
            return;
        }

        self.ensure_text_object();
        self.tracker.flush(&mut self.out);
        if !removed_any && !had_adjustment && matches!(kind, ShowKind::Plain | ShowKind::Array) {
            // untouched run keeps its original operand bytes
            self.out.write_raw(&self.source[op.span.clone()]);
        } else {
            self.out.show_text(&out_items);
        }
        if pending_dx != 0.0 {
            self.tracker.add_adjustment(pending_dx);
        }
    }

    // --- paths ---

    fn path_op(&mut self, op: &ContentOp) {
        self.construction_spans.push(op.span.clone());
        self.path_spans.push(op.span.clone());
        match op.kind {
            Op::Mm => {
                if let Some(p) = operand_point(&op.operands, 0) {
                    self.subpaths.push(Subpath::new(p));
                    self.current_point = Some(p);
                }
            }
            Op::L => {
                if let Some(p) = operand_point(&op.operands, 0) {
                    self.append_segment(Segment::Line(p), p);
                }
            }
            Op::C => {
                if let (Some(c1), Some(c2), Some(p)) = (
                    operand_point(&op.operands, 0),
                    operand_point(&op.operands, 2),
                    operand_point(&op.operands, 4),
                ) {
                    self.append_segment(Segment::Cubic(c1, c2, p), p);
                }
            }
            Op::V => {
                if let (Some(c2), Some(p)) = (
                    operand_point(&op.operands, 0),
                    operand_point(&op.operands, 2),
                ) {
                    let c1 = self.current_point.unwrap_or(p);
                    self.append_segment(Segment::Cubic(c1, c2, p), p);
                }
            }
            Op::Y => {
                if let (Some(c1), Some(p)) = (
                    operand_point(&op.operands, 0),
                    operand_point(&op.operands, 2),
                ) {
                    self.append_segment(Segment::Cubic(c1, p, p), p);
                }
            }
            Op::H => {
                if let Some(sp) = self.subpaths.last_mut() {
                    sp.closed = true;
                    self.current_point = Some(sp.start);
                }
            }
            Op::Re => {
                if let (Some((x, y)), Some(w), Some(h)) = (
                    operand_point(&op.operands, 0),
                    operand_num(&op.operands, 2),
                    operand_num(&op.operands, 3),
                ) {
                    self.subpaths.push(Subpath::polygon(&[
                        (x, y),
                        (x + w, y),
                        (x + w, y + h),
                        (x, y + h),
                    ]));
                    self.current_point = Some((x, y));
                }
            }
            _ => {}
        }
    }

    fn append_segment(&mut self, seg: Segment, end: Point) {
        if self.subpaths.last().is_none_or(|sp| sp.closed) {
            let start = self.current_point.unwrap_or((0.0, 0.0));
            self.subpaths.push(Subpath::new(start));
        }
        if let Some(sp) = self.subpaths.last_mut() {
            sp.segments.push(seg);
        }
        self.current_point = Some(end);
    }

    fn set_clip(&mut self, op: &ContentOp, rule: FillRule) {
        self.pending_clip = Some(rule);
        self.path_spans.push(op.span.clone());
    }

    fn paint(&mut self, op: &ContentOp) {
        let kind = op.kind;
        let closes = matches!(kind, Op::Ss | Op::Bb | Op::BbStar);
        let fills = matches!(
            kind,
            Op::F | Op::Ff | Op::FStar | Op::B | Op::BStar | Op::Bb | Op::BbStar
        );
        let strokes = matches!(
            kind,
            Op::S | Op::Ss | Op::B | Op::BStar | Op::Bb | Op::BbStar
        );
        let fill_rule = if matches!(kind, Op::FStar | Op::BStar | Op::BbStar) {
            FillRule::EvenOdd
        } else {
            FillRule::Nonzero
        };
        if closes && let Some(sp) = self.subpaths.last_mut() {
            sp.closed = true;
        }

        let path = Path {
            subpaths: mem::take(&mut self.subpaths),
        };
        let construction = mem::take(&mut self.construction_spans);
        let all_spans = mem::take(&mut self.path_spans);
        let clip = self.pending_clip.take();
        self.current_point = None;

        let regions = &self.proc.regions;
        let fill_res = fills.then(|| filter_fill_path(&path, self.gs.ctm, fill_rule, regions));
        let stroke_res = strokes.then(|| {
            let envelope = stroke_to_fill(&path, &self.gs, &self.proc.props.path_offset);
            filter_fill_path(&envelope, self.gs.ctm, FillRule::Nonzero, regions)
        });
        let clip_res = clip.map(|rule| match &fill_res {
            Some(res) if rule == fill_rule => res.clone(),
            _ => filter_fill_path(&path, self.gs.ctm, rule, regions),
        });

        let untouched = fill_res.as_ref().is_none_or(FilteredPath::is_unchanged)
            && stroke_res.as_ref().is_none_or(FilteredPath::is_unchanged)
            && clip_res.as_ref().is_none_or(FilteredPath::is_unchanged);
        if untouched {
            self.flush_pending(false);
            self.replay(&all_spans);
            self.out.write_raw(&self.source[op.span.clone()]);
            return;
        }

        if let Some(res) = fill_res {
            match res {
                FilteredPath::Unchanged => {
                    self.flush_pending(false);
                    self.replay(&construction);
                    self.out.fill(fill_rule == FillRule::EvenOdd);
                }
                FilteredPath::Rewritten(p) if !p.is_empty() => {
                    self.flush_pending(false);
                    p.emit(&mut self.out);
                    self.out.fill(fill_rule == FillRule::EvenOdd);
                }
                _ => {}
            }
        }
        if let Some(res) = stroke_res {
            match res {
                FilteredPath::Unchanged => {
                    self.flush_pending(false);
                    self.replay(&construction);
                    self.out.write_raw(if closes { b"s" } else { b"S" });
                }
                FilteredPath::Rewritten(p) if !p.is_empty() => {
                    // the surviving envelope is painted as a fill, so the
                    // stroke color has to drive the fill channel briefly
                    self.flush_pending(false);
                    self.out.save_state();
                    self.out.set_fill_color(self.gs.stroke_color);
                    p.emit(&mut self.out);
                    self.out.fill(false);
                    self.out.restore_state();
                }
                _ => {}
            }
        }
        if let (Some(res), Some(rule)) = (clip_res, clip) {
            self.flush_pending(false);
            match res {
                FilteredPath::Unchanged => {
                    self.replay(&construction);
                    self.out.clip(rule == FillRule::EvenOdd);
                    self.out.end_path();
                }
                FilteredPath::Rewritten(p) => {
                    if p.is_empty() {
                        // a clip that lost all area still has to suppress
                        // everything that follows
                        self.out.move_to(0.0, 0.0);
                        self.out.clip(false);
                        self.out.end_path();
                    } else {
                        p.emit(&mut self.out);
                        self.out.clip(rule == FillRule::EvenOdd);
                        self.out.end_path();
                    }
                }
            }
        }
    }

    fn replay(&mut self, spans: &[Range<usize>]) {
        for span in spans {
            self.out.write_raw(&self.source[span.clone()]);
        }
    }

    // --- XObjects and inline images ---

    fn invoke_xobject(&mut self, op: &ContentOp) -> Result<()> {
        let Some(name) = op.operands.first().and_then(|o| o.as_name().ok()) else {
            return Ok(());
        };
        let name = SmolStr::new(name);
        let Some(stream) = self.xobject_stream(&name) else {
            debug!(name = %name, "XObject resource missing, passing through");
            self.passthrough(op);
            return Ok(());
        };
        match stream.get("Subtype").and_then(|o| o.as_name().ok()) {
            Some("Image") => self.draw_image(op, &name, &stream),
            Some("Form") => self.recurse_form(op, &name, &stream),
            _ => {
                self.passthrough(op);
                Ok(())
            }
        }
    }

    fn xobject_stream(&self, name: &str) -> Option<PdfStream> {
        match self.resource_entry("XObject", name)? {
            PdfObject::Stream(s) => Some(s.as_ref().clone()),
            _ => None,
        }
    }

    fn resource_entry(&self, category: &str, name: &str) -> Option<&PdfObject> {
        match self.resources.get(category)? {
            PdfObject::Dict(d) => d.get(name),
            _ => None,
        }
    }

    fn replace_xobject(&mut self, name: &str, stream: PdfStream) {
        let entry = self
            .resources
            .entry(SmolStr::new("XObject"))
            .or_insert_with(|| PdfObject::Dict(PdfDict::new()));
        if let PdfObject::Dict(d) = entry {
            d.insert(SmolStr::new(name), PdfObject::Stream(Box::new(stream)));
        }
    }

    fn draw_image(&mut self, op: &ContentOp, name: &str, image: &PdfStream) -> Result<()> {
        match self.image_coverage() {
            Coverage::Clear => {
                self.passthrough(op);
                Ok(())
            }
            Coverage::Full => {
                debug!(name, "image fully covered, dropping");
                Ok(())
            }
            Coverage::Partial(regions) => {
                match filter_image_cached(self.proc.cache, image, Some(&regions))? {
                    FilteredImage::Replaced(stream) => {
                        self.replace_xobject(name, stream);
                        self.flush_pending(false);
                        self.out.invoke_xobject(name);
                    }
                    FilteredImage::Untouched => self.passthrough(op),
                    FilteredImage::Removed => {}
                }
                Ok(())
            }
        }
    }

    /// Map the cleanup regions into the image's unit square.
    ///
    /// Regions are transformed through the inverse CTM and reduced to
    /// their bounding box there, so a rotated placement clears a slightly
    /// larger area rather than a smaller one.
    fn image_coverage(&self) -> Coverage {
        let unit: Rect = (0.0, 0.0, 1.0, 1.0);
        let quad = transformed_rect_quad(self.gs.ctm, unit);
        let inverse = match invert_matrix(self.gs.ctm) {
            Ok(m) => m,
            Err(_) => {
                debug!("degenerate image matrix, leaving image untouched");
                return Coverage::Clear;
            }
        };
        let mut mapped = Vec::new();
        for (region, region_quad) in self.proc.regions.iter().zip(&self.proc.region_quads) {
            if !quads_intersect(region_quad, &quad) {
                continue;
            }
            let corners: Vec<Point> = rect_corners(*region)
                .iter()
                .map(|&p| apply_matrix_pt(inverse, p))
                .collect();
            let Some(bbox) = points_bbox(&corners) else {
                continue;
            };
            let Some(clipped) = intersect_rects(bbox, unit) else {
                continue;
            };
            if clipped.0 <= CLEANUP_EPSILON
                && clipped.1 <= CLEANUP_EPSILON
                && clipped.2 >= 1.0 - CLEANUP_EPSILON
                && clipped.3 >= 1.0 - CLEANUP_EPSILON
            {
                return Coverage::Full;
            }
            mapped.push(clipped);
        }
        if mapped.is_empty() {
            Coverage::Clear
        } else {
            Coverage::Partial(mapped)
        }
    }

    fn recurse_form(&mut self, op: &ContentOp, name: &str, form: &PdfStream) -> Result<()> {
        if self.proc.form_guard.contains(&form.uid()) {
            warn!(name, "recursive form reference, passing through");
            self.passthrough(op);
            return Ok(());
        }
        let matrix = form
            .get("Matrix")
            .and_then(|o| matrix_value(o).ok())
            .unwrap_or(MATRIX_IDENTITY);
        let inner_ctm = mult_matrix(matrix, self.gs.ctm);
        if let Some(bbox) = form.get("BBox").and_then(|o| rect_value(o).ok()) {
            let quad = transformed_rect_quad(inner_ctm, bbox);
            if !self
                .proc
                .region_quads
                .iter()
                .any(|region| quads_intersect(region, &quad))
            {
                self.passthrough(op);
                return Ok(());
            }
        }

        let content = decode_stream(form)?;
        let mut state = self.gs.clone();
        state.ctm = inner_ctm;
        let own_resources = form
            .get("Resources")
            .and_then(|o| dict_value(o).ok())
            .cloned();

        self.proc.form_guard.push(form.uid());
        let result = match own_resources.clone() {
            Some(mut child) => self
                .proc
                .process_stream(&content, &mut child, state)
                .map(|bytes| (bytes, Some(child))),
            None => self
                .proc
                .process_stream(&content, self.resources, state)
                .map(|bytes| (bytes, None)),
        };
        self.proc.form_guard.pop();
        let (new_content, child_resources) = result?;

        if new_content == content && child_resources == own_resources {
            self.passthrough(op);
            return Ok(());
        }

        let mut attrs = form.attrs.clone();
        for key in ["Filter", "F", "DecodeParms", "DP", "Length"] {
            attrs.shift_remove(key);
        }
        let encoded = flateencode(&new_content);
        attrs.insert(SmolStr::new("Filter"), PdfObject::name("FlateDecode"));
        attrs.insert(SmolStr::new("Length"), PdfObject::Int(encoded.len() as i64));
        if let Some(child) = child_resources {
            attrs.insert(SmolStr::new("Resources"), PdfObject::Dict(child));
        }
        self.replace_xobject(name, PdfStream::new(attrs, encoded));
        self.flush_pending(false);
        self.out.invoke_xobject(name);
        Ok(())
    }

    fn handle_inline_image(&mut self, img: &InlineImage) -> Result<()> {
        match self.image_coverage() {
            Coverage::Clear => {
                self.flush_pending(false);
                self.out.write_raw(&self.source[img.span.clone()]);
            }
            Coverage::Full => {
                debug!("inline image fully covered, dropping");
            }
            Coverage::Partial(regions) => {
                match filter_inline_image(&img.stream, Some(&regions))? {
                    FilteredImage::Replaced(stream) => {
                        let inline = abbreviated_inline(&stream);
                        self.flush_pending(false);
                        self.out.write_inline_image(&inline);
                    }
                    FilteredImage::Untouched => {
                        self.flush_pending(false);
                        self.out.write_raw(&self.source[img.span.clone()]);
                    }
                    FilteredImage::Removed => {}
                }
            }
        }
        Ok(())
    }

    // --- marked content ---

    fn begin_tag(&mut self, op: &ContentOp) {
        let Some(tag) = op.operands.first().and_then(|o| o.as_name().ok()) else {
            return;
        };
        let tag = SmolStr::new(tag);
        let props = op.operands.get(1).cloned();
        let mcid = props.as_ref().and_then(|p| match p {
            PdfObject::Dict(d) => d.get("MCID").and_then(|o| o.as_i64().ok()),
            _ => None,
        });
        self.delta().tags.push(QueuedTag { tag, props, mcid });
    }

    fn end_tag(&mut self) {
        let popped = self.delta().tags.pop();
        if let Some(tag) = popped {
            let delta = self.delta();
            if delta.tags.len() < delta.tags_outer {
                delta.tags_outer = delta.tags.len();
            }
            self.record_dropped_tag(tag);
            return;
        }
        if self.open_tags > 0 {
            self.open_tags -= 1;
            self.out.end_marked_content();
        } else {
            debug!("unbalanced EMC, dropping");
        }
    }

    fn record_dropped_tag(&mut self, tag: QueuedTag) {
        if let Some(mcid) = tag.mcid {
            debug!(mcid, tag = %tag.tag, "marked-content item lost its content");
            self.proc.removed_mcids.push(mcid);
        }
    }

    // --- passthrough ---

    fn passthrough(&mut self, op: &ContentOp) {
        self.flush_pending(false);
        self.out.write_raw(&self.source[op.span.clone()]);
    }

    /// Structural brackets; they draw nothing, so pending state stays
    /// pending.
    fn passthrough_quiet(&mut self, op: &ContentOp) {
        self.out.write_raw(&self.source[op.span.clone()]);
    }
}

fn operand_num(operands: &[PdfObject], index: usize) -> Option<f64> {
    operands.get(index).and_then(|o| num_value(o).ok())
}

fn operand_point(operands: &[PdfObject], index: usize) -> Option<Point> {
    Some((
        operand_num(operands, index)?,
        operand_num(operands, index + 1)?,
    ))
}

fn operand_matrix(operands: &[PdfObject]) -> Option<Matrix> {
    Some((
        operand_num(operands, 0)?,
        operand_num(operands, 1)?,
        operand_num(operands, 2)?,
        operand_num(operands, 3)?,
        operand_num(operands, 4)?,
        operand_num(operands, 5)?,
    ))
}

fn queue_replacing(channel: &mut Vec<(Op, Vec<u8>)>, kind: Op, bytes: Vec<u8>) {
    if let Some(slot) = channel.iter_mut().find(|(k, _)| *k == kind) {
        slot.1 = bytes;
    } else {
        channel.push((kind, bytes));
    }
}

/// Rebuild a filtered inline image dictionary with the abbreviated keys
/// and values the `BI` syntax uses.
fn abbreviated_inline(stream: &PdfStream) -> PdfStream {
    let mut attrs = PdfDict::new();
    for (key, value) in &stream.attrs {
        let (short, value) = match key.as_str() {
            "Length" => continue,
            "Width" => ("W", value.clone()),
            "Height" => ("H", value.clone()),
            "BitsPerComponent" => ("BPC", value.clone()),
            "ImageMask" => ("IM", value.clone()),
            "Decode" => ("D", value.clone()),
            "DecodeParms" => ("DP", value.clone()),
            "Interpolate" => ("I", value.clone()),
            "ColorSpace" => (
                "CS",
                abbreviate_name(value, &[("DeviceGray", "G"), ("DeviceRGB", "RGB")]),
            ),
            "Filter" => ("F", abbreviate_name(value, &[("FlateDecode", "Fl")])),
            other => (other, value.clone()),
        };
        attrs.insert(SmolStr::new(short), value);
    }
    PdfStream::new(attrs, stream.rawdata_bytes())
}

fn abbreviate_name(value: &PdfObject, table: &[(&str, &str)]) -> PdfObject {
    if let Ok(name) = value.as_name()
        && let Some((_, short)) = table.iter().find(|(long, _)| *long == name)
    {
        return PdfObject::name(short);
    }
    value.clone()
}
