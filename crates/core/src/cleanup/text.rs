//! Glyph-level text decomposition and output-side positioning coalescing.
//!
//! A shown string is broken into [`GlyphRenderInfo`]s, each carrying the
//! device-space quad of its advance cell (descent to ascent, inclusive of
//! character and word spacing) so the region test sees what the reader
//! sees. Removed glyphs leave a horizontal displacement behind; the
//! [`TextPositioningTracker`] folds those displacements and any buffered
//! positioning operators into the minimal operator emitted right before
//! the next surviving run.

use crate::canvas::ContentWriter;
use crate::font::{FontMetrics, Glyph};
use crate::geometry::Quad;
use crate::model::TextState;
use crate::utils::{Matrix, apply_matrix_pt, mult_matrix, translate_matrix};

/// One glyph of a shown string, positioned on the page.
#[derive(Debug, Clone)]
pub struct GlyphRenderInfo {
    pub glyph: Glyph,
    /// Advance cell corners in device space, counterclockwise from the
    /// descent-left corner.
    pub quad: Quad,
    /// Horizontal displacement in text space (horizontal scaling applied).
    pub advance: f64,
}

/// Decompose one shown string into positioned glyphs.
///
/// The pen starts at `ts.matrix`; the caller advances the interpreter's
/// text matrix by the summed advances afterwards.
pub fn decompose_run(
    bytes: &[u8],
    font: &FontMetrics,
    ts: &TextState,
    ctm: Matrix,
) -> Vec<GlyphRenderInfo> {
    let th = ts.scaling / 100.0;
    let ascent = font.ascent_1000() / 1000.0 * ts.font_size + ts.rise;
    let descent = font.descent_1000() / 1000.0 * ts.font_size + ts.rise;

    let mut pen = ts.matrix;
    let glyphs = font.decode(bytes);
    let mut out = Vec::with_capacity(glyphs.len());
    for glyph in glyphs {
        let mut advance = font.width_1000(glyph.code) / 1000.0 * ts.font_size + ts.char_spacing;
        if font.is_word_space(glyph) {
            advance += ts.word_spacing;
        }
        let advance = advance * th;

        let trm = mult_matrix(pen, ctm);
        let quad = [
            apply_matrix_pt(trm, (0.0, descent)),
            apply_matrix_pt(trm, (advance, descent)),
            apply_matrix_pt(trm, (advance, ascent)),
            apply_matrix_pt(trm, (0.0, ascent)),
        ];
        out.push(GlyphRenderInfo {
            glyph,
            quad,
            advance,
        });
        pen = translate_matrix(pen, (advance, 0.0));
    }
    out
}

/// Text-space displacement of one TJ adjustment number.
pub fn adjustment_to_dx(n: f64, ts: &TextState) -> f64 {
    -n / 1000.0 * ts.font_size * (ts.scaling / 100.0)
}

/// TJ adjustment number producing a given text-space displacement.
/// Degenerate text state (zero size or scaling) yields no adjustment.
pub fn dx_to_adjustment(dx: f64, ts: &TextState) -> f64 {
    let scale = ts.font_size * (ts.scaling / 100.0);
    if scale.abs() < 1e-12 {
        return 0.0;
    }
    -dx * 1000.0 / scale
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Pending {
    None,
    /// Accumulated `Td`-style move relative to the line matrix.
    Offset(f64, f64),
    /// Absolute `Tm` replacement (later moves composed in).
    Matrix(Matrix),
}

/// Coalesces text-positioning operators on the output side.
///
/// Positioning operators are absolute with respect to the line matrix, so
/// consecutive moves collapse into one and any of them cancels the
/// displacement left by a fully-removed run. The displacement survives
/// only until the next positioning operator or `ET`; when a run is shown
/// without repositioning first, the processor pulls it via
/// [`TextPositioningTracker::take_adjustment`] and injects it as a TJ
/// number instead.
#[derive(Debug)]
pub struct TextPositioningTracker {
    pending: Pending,
    adjustment: f64,
    leading: f64,
    out_leading: Option<f64>,
}

impl Default for TextPositioningTracker {
    fn default() -> Self {
        Self {
            pending: Pending::None,
            adjustment: 0.0,
            leading: 0.0,
            out_leading: None,
        }
    }
}

impl TextPositioningTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn leading(&self) -> f64 {
        self.leading
    }

    /// `TL`: state only, written lazily when a move depends on it.
    pub fn set_leading(&mut self, leading: f64) {
        self.leading = leading;
    }

    /// `Td`
    pub fn move_text(&mut self, dx: f64, dy: f64) {
        self.adjustment = 0.0;
        self.pending = match self.pending {
            Pending::None => Pending::Offset(dx, dy),
            Pending::Offset(ax, ay) => Pending::Offset(ax + dx, ay + dy),
            Pending::Matrix(m) => Pending::Matrix(translate_matrix(m, (dx, dy))),
        };
    }

    /// `TD`
    pub fn move_text_with_leading(&mut self, dx: f64, dy: f64) {
        self.leading = -dy;
        self.move_text(dx, dy);
    }

    /// `Tm`
    pub fn set_matrix(&mut self, m: Matrix) {
        self.adjustment = 0.0;
        self.pending = Pending::Matrix(m);
    }

    /// `T*`
    pub fn next_line(&mut self) {
        let leading = self.leading;
        self.move_text(0.0, -leading);
    }

    /// Record the displacement of a removed run or run tail.
    pub fn add_adjustment(&mut self, dx: f64) {
        self.adjustment += dx;
    }

    /// Displacement to inject ahead of the next shown glyphs.
    pub fn take_adjustment(&mut self) -> f64 {
        std::mem::take(&mut self.adjustment)
    }

    pub fn has_pending(&self) -> bool {
        self.pending != Pending::None
    }

    /// Entering or leaving a text object discards buffered positioning;
    /// leading persists across text objects.
    pub fn reset_object(&mut self) {
        self.pending = Pending::None;
        self.adjustment = 0.0;
    }

    /// Write the minimal operator for everything buffered.
    pub fn flush(&mut self, canvas: &mut ContentWriter) {
        match std::mem::replace(&mut self.pending, Pending::None) {
            Pending::None => {}
            Pending::Offset(dx, dy) => {
                let stale = self.out_leading != Some(self.leading);
                if stale && dy == -self.leading && self.leading != 0.0 {
                    // one TD moves and syncs the leading
                    canvas.move_text_set_leading(dx, dy);
                    self.out_leading = Some(self.leading);
                } else {
                    canvas.move_text(dx, dy);
                }
            }
            Pending::Matrix(m) => canvas.set_text_matrix(m),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PdfDict;
    use crate::utils::MATRIX_IDENTITY;

    fn default_font() -> FontMetrics {
        FontMetrics::from_dict(&PdfDict::new())
    }

    fn text_state(size: f64) -> TextState {
        let mut ts = TextState::new();
        ts.font_size = size;
        ts
    }

    #[test]
    fn test_decompose_advances_pen() {
        let font = default_font();
        let ts = text_state(10.0);
        let glyphs = decompose_run(b"AB", &font, &ts, MATRIX_IDENTITY);
        assert_eq!(glyphs.len(), 2);
        // Helvetica 'A' is 667/1000
        assert!((glyphs[0].advance - 6.67).abs() < 1e-9);
        assert!((glyphs[1].quad[0].0 - 6.67).abs() < 1e-9, "B starts after A");
        // advance cell spans descent..ascent
        assert!(glyphs[0].quad[0].1 < 0.0);
        assert!(glyphs[0].quad[2].1 > 0.0);
    }

    #[test]
    fn test_word_spacing_only_on_space() {
        let font = default_font();
        let mut ts = text_state(10.0);
        ts.word_spacing = 5.0;
        let glyphs = decompose_run(b"a a", &font, &ts, MATRIX_IDENTITY);
        let space = &glyphs[1];
        let letter = &glyphs[0];
        assert!((space.advance - letter.advance - 5.0 - (278.0 - 556.0) / 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_horizontal_scaling_halves_advances() {
        let font = default_font();
        let mut ts = text_state(10.0);
        ts.scaling = 50.0;
        let glyphs = decompose_run(b"A", &font, &ts, MATRIX_IDENTITY);
        assert!((glyphs[0].advance - 3.335).abs() < 1e-9);
    }

    #[test]
    fn test_rise_lifts_quad() {
        let font = default_font();
        let mut ts = text_state(10.0);
        ts.rise = 3.0;
        let glyphs = decompose_run(b"A", &font, &ts, MATRIX_IDENTITY);
        // defaults are 800/-200 per mille
        assert!((glyphs[0].quad[0].1 - 1.0).abs() < 1e-9);
        assert!((glyphs[0].quad[2].1 - 11.0).abs() < 1e-9);
    }

    #[test]
    fn test_ctm_maps_quads_to_device_space() {
        let font = default_font();
        let ts = text_state(10.0);
        let ctm = (2.0, 0.0, 0.0, 2.0, 100.0, 0.0);
        let glyphs = decompose_run(b"A", &font, &ts, ctm);
        assert!((glyphs[0].quad[0].0 - 100.0).abs() < 1e-9);
        assert!((glyphs[0].quad[1].0 - (100.0 + 2.0 * 6.67)).abs() < 1e-9);
        // advance stays in text space
        assert!((glyphs[0].advance - 6.67).abs() < 1e-9);
    }

    #[test]
    fn test_adjustment_round_trip() {
        let mut ts = text_state(12.0);
        ts.scaling = 80.0;
        let dx = adjustment_to_dx(-250.0, &ts);
        assert!(dx > 0.0);
        assert!((dx_to_adjustment(dx, &ts) - -250.0).abs() < 1e-9);
    }

    #[test]
    fn test_tracker_coalesces_moves() {
        let mut tracker = TextPositioningTracker::new();
        tracker.move_text(5.0, 0.0);
        tracker.move_text(3.0, -2.0);
        let mut w = ContentWriter::new();
        tracker.flush(&mut w);
        assert_eq!(String::from_utf8(w.into_bytes()).unwrap(), "8 -2 Td\n");
        assert!(!tracker.has_pending());
    }

    #[test]
    fn test_tracker_matrix_absorbs_moves() {
        let mut tracker = TextPositioningTracker::new();
        tracker.move_text(99.0, 99.0);
        tracker.set_matrix((1.0, 0.0, 0.0, 1.0, 40.0, 700.0));
        tracker.move_text(0.0, -12.0);
        let mut w = ContentWriter::new();
        tracker.flush(&mut w);
        assert_eq!(
            String::from_utf8(w.into_bytes()).unwrap(),
            "1 0 0 1 40 688 Tm\n"
        );
    }

    #[test]
    fn test_tracker_next_line_uses_leading() {
        let mut tracker = TextPositioningTracker::new();
        tracker.set_leading(14.0);
        tracker.next_line();
        tracker.next_line();
        let mut w = ContentWriter::new();
        tracker.flush(&mut w);
        // both line moves coalesce; the combined offset is two leadings,
        // so no TD sync applies
        assert_eq!(String::from_utf8(w.into_bytes()).unwrap(), "0 -28 Td\n");
    }

    #[test]
    fn test_tracker_td_syncs_leading_once() {
        let mut tracker = TextPositioningTracker::new();
        tracker.move_text_with_leading(0.0, -14.0);
        let mut w = ContentWriter::new();
        tracker.flush(&mut w);
        assert_eq!(String::from_utf8(w.into_bytes()).unwrap(), "0 -14 TD\n");

        // leading already synced: a later matching move is a plain Td
        tracker.next_line();
        let mut w = ContentWriter::new();
        tracker.flush(&mut w);
        assert_eq!(String::from_utf8(w.into_bytes()).unwrap(), "0 -14 Td\n");
    }

    #[test]
    fn test_move_cancels_removed_run_displacement() {
        let mut tracker = TextPositioningTracker::new();
        tracker.add_adjustment(42.0);
        tracker.move_text(10.0, 0.0);
        assert_eq!(tracker.take_adjustment(), 0.0);

        tracker.add_adjustment(42.0);
        assert_eq!(tracker.take_adjustment(), 42.0);
    }

    #[test]
    fn test_reset_object_drops_pending() {
        let mut tracker = TextPositioningTracker::new();
        tracker.set_leading(12.0);
        tracker.move_text(1.0, 2.0);
        tracker.add_adjustment(3.0);
        tracker.reset_object();
        assert!(!tracker.has_pending());
        assert_eq!(tracker.take_adjustment(), 0.0);
        assert_eq!(tracker.leading(), 12.0, "leading survives text objects");
    }
}
