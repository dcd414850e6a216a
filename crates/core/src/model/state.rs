//! Graphics and text state tracked while interpreting a content stream.

use smallvec::SmallVec;
use smol_str::SmolStr;

use crate::utils::{MATRIX_IDENTITY, Matrix};

/// Color value in one of the device color spaces.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Color {
    /// Greyscale (0.0 = black, 1.0 = white)
    Gray(f64),
    /// RGB color
    Rgb(f64, f64, f64),
    /// CMYK color
    Cmyk(f64, f64, f64, f64),
}

impl Default for Color {
    fn default() -> Self {
        Color::Gray(0.0)
    }
}

impl Color {
    /// Numeric components in operator order.
    pub fn components(&self) -> SmallVec<[f64; 4]> {
        match *self {
            Color::Gray(g) => SmallVec::from_slice(&[g]),
            Color::Rgb(r, g, b) => SmallVec::from_slice(&[r, g, b]),
            Color::Cmyk(c, m, y, k) => SmallVec::from_slice(&[c, m, y, k]),
        }
    }

    /// Fill (non-stroking) operator for this color space.
    pub const fn fill_operator(&self) -> &'static str {
        match self {
            Color::Gray(_) => "g",
            Color::Rgb(..) => "rg",
            Color::Cmyk(..) => "k",
        }
    }

    /// Stroke operator for this color space.
    pub const fn stroke_operator(&self) -> &'static str {
        match self {
            Color::Gray(_) => "G",
            Color::Rgb(..) => "RG",
            Color::Cmyk(..) => "K",
        }
    }
}

/// Line cap style (PDF codes 0..=2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CapStyle {
    #[default]
    Butt,
    Round,
    Square,
}

impl CapStyle {
    pub const fn from_code(code: i64) -> Self {
        match code {
            1 => Self::Round,
            2 => Self::Square,
            _ => Self::Butt,
        }
    }
}

/// Line join style (PDF codes 0..=2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinStyle {
    #[default]
    Miter,
    Round,
    Bevel,
}

impl JoinStyle {
    pub const fn from_code(code: i64) -> Self {
        match code {
            1 => Self::Round,
            2 => Self::Bevel,
            _ => Self::Miter,
        }
    }
}

/// Dash pattern: alternating on/off lengths plus a starting phase.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DashPattern {
    pub array: SmallVec<[f64; 6]>,
    pub phase: f64,
}

impl DashPattern {
    /// An empty array, or one that never draws anything off, strokes solid.
    pub fn is_solid(&self) -> bool {
        self.array.is_empty() || self.array.iter().all(|&d| d <= 0.0)
    }
}

/// Graphics state mirrored while walking a content stream.
#[derive(Debug, Clone)]
pub struct GraphicsState {
    /// Current transformation matrix (user space -> device space).
    pub ctm: Matrix,
    pub line_width: f64,
    pub line_cap: CapStyle,
    pub line_join: JoinStyle,
    pub miter_limit: f64,
    pub dash: DashPattern,
    pub fill_color: Color,
    pub stroke_color: Color,
}

impl GraphicsState {
    pub fn new(ctm: Matrix) -> Self {
        Self {
            ctm,
            line_width: 1.0,
            line_cap: CapStyle::Butt,
            line_join: JoinStyle::Miter,
            miter_limit: 10.0,
            dash: DashPattern::default(),
            fill_color: Color::Gray(0.0),
            stroke_color: Color::Gray(0.0),
        }
    }
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self::new(MATRIX_IDENTITY)
    }
}

/// Text state within and across text objects.
///
/// `matrix` is the text matrix, `line_matrix` the line matrix set by the
/// positioning operators; both reset at BT. Leading, spacing, font, and the
/// other parameters survive text-object boundaries.
#[derive(Debug, Clone)]
pub struct TextState {
    /// Current font resource name (e.g. "F1").
    pub font_name: Option<SmolStr>,
    pub font_size: f64,
    pub char_spacing: f64,
    pub word_spacing: f64,
    /// Horizontal scaling percentage (100 = normal).
    pub scaling: f64,
    pub leading: f64,
    /// Text rendering mode (0-7).
    pub render_mode: i64,
    pub rise: f64,
    /// Text matrix (Tm).
    pub matrix: Matrix,
    /// Line matrix - start of the current line.
    pub line_matrix: Matrix,
}

impl TextState {
    pub fn new() -> Self {
        Self {
            font_name: None,
            font_size: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            scaling: 100.0,
            leading: 0.0,
            render_mode: 0,
            rise: 0.0,
            matrix: MATRIX_IDENTITY,
            line_matrix: MATRIX_IDENTITY,
        }
    }

    /// Reset text and line matrices at the start of a text object.
    pub fn reset_matrices(&mut self) {
        self.matrix = MATRIX_IDENTITY;
        self.line_matrix = MATRIX_IDENTITY;
    }
}

impl Default for TextState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dash_solid() {
        assert!(DashPattern::default().is_solid());
        let all_zero = DashPattern {
            array: SmallVec::from_slice(&[0.0, 0.0]),
            phase: 0.0,
        };
        assert!(all_zero.is_solid());
        let dashed = DashPattern {
            array: SmallVec::from_slice(&[3.0, 2.0]),
            phase: 0.0,
        };
        assert!(!dashed.is_solid());
    }

    #[test]
    fn test_color_operators() {
        assert_eq!(Color::Rgb(1.0, 0.0, 0.0).fill_operator(), "rg");
        assert_eq!(Color::Gray(0.5).stroke_operator(), "G");
        assert_eq!(Color::Cmyk(0.0, 0.0, 0.0, 1.0).components().len(), 4);
    }
}
