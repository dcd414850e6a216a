//! Font metrics needed to place glyph boxes: width tables, vertical
//! extent, and the byte-to-code split for simple versus composite fonts.
//!
//! Only the metric side of a font dictionary is read. Glyph outlines,
//! encodings beyond the code split, and ToUnicode maps play no role in
//! deciding whether a glyph's box overlaps a cleanup region.

use crate::model::{PdfDict, PdfObject};

/// Standard Helvetica advance widths for codes 32..=126, in 1/1000 text
/// space units. Fallback when a font dictionary carries no usable width
/// table, and the ruler for overlay-text layout.
const HELVETICA_WIDTHS_32_126: [i16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, 556, 556, 556,
    556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, 1015, 667, 667, 722, 722,
    667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, 667, 778, 722, 667, 611, 722, 667, 944,
    667, 667, 611, 278, 278, 278, 469, 556, 333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222,
    500, 222, 833, 556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334,
    584,
];

const FALLBACK_WIDTH: f64 = 600.0;
const DEFAULT_ASCENT: f64 = 800.0;
const DEFAULT_DESCENT: f64 = -200.0;

fn dict_num(dict: &PdfDict, key: &str) -> Option<f64> {
    dict.get(key).and_then(|o| o.as_f64().ok())
}

/// Width of a string in 1/1000 units when set in Helvetica.
pub fn helvetica_width_1000(text: &str) -> f64 {
    text.bytes()
        .map(|b| {
            if (32..=126).contains(&b) {
                HELVETICA_WIDTHS_32_126[(b - 32) as usize] as f64
            } else {
                FALLBACK_WIDTH
            }
        })
        .sum()
}

/// One code range of a CIDFont /W array.
#[derive(Debug, Clone)]
struct CidWidthRange {
    start: u32,
    end: u32,
    width: f64,
}

/// One glyph code cut out of a show-text string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Glyph {
    pub code: u32,
    /// Byte offset of the code within the string.
    pub start: usize,
    /// Byte length of the code (1, or 2 for composite fonts).
    pub len: usize,
}

/// Metrics extracted from a font dictionary.
#[derive(Debug, Clone, Default)]
pub struct FontMetrics {
    first_char: i64,
    widths: Vec<f64>,
    missing_width: f64,
    cid_widths: Vec<CidWidthRange>,
    cid_default_width: f64,
    /// Composite (Type0) fonts consume two bytes per code.
    two_byte: bool,
    ascent: f64,
    descent: f64,
}

impl FontMetrics {
    /// Read metrics out of a font dictionary. Missing or malformed
    /// entries fall back to standard defaults rather than failing; a
    /// width of zero never blocks redaction, it only shrinks a glyph box.
    pub fn from_dict(dict: &PdfDict) -> FontMetrics {
        let subtype = dict.get("Subtype").and_then(|o| o.as_name().ok());
        let two_byte = subtype == Some("Type0");

        // composite fonts keep their widths on the descendant
        let descendant = dict
            .get("DescendantFonts")
            .and_then(|o| o.as_array().ok())
            .and_then(|arr| arr.first())
            .and_then(|o| o.as_dict().ok());
        let metrics_dict = descendant.unwrap_or(dict);

        let first_char = dict
            .get("FirstChar")
            .and_then(|o| o.as_i64().ok())
            .unwrap_or(0);
        let widths = dict
            .get("Widths")
            .and_then(|o| o.as_array().ok())
            .map(|arr| arr.iter().filter_map(|o| o.as_f64().ok()).collect())
            .unwrap_or_default();

        let descriptor = metrics_dict
            .get("FontDescriptor")
            .and_then(|o| o.as_dict().ok());
        let ascent = descriptor
            .and_then(|d| dict_num(d, "Ascent"))
            .unwrap_or(DEFAULT_ASCENT);
        let descent = descriptor
            .and_then(|d| dict_num(d, "Descent"))
            .unwrap_or(DEFAULT_DESCENT);
        let missing_width = descriptor
            .and_then(|d| dict_num(d, "MissingWidth"))
            .unwrap_or(0.0);

        let mut cid_widths = Vec::new();
        let mut cid_default_width = 1000.0;
        if let Some(desc) = descendant {
            if let Some(dw) = dict_num(desc, "DW") {
                cid_default_width = dw;
            }
            if let Some(w) = desc.get("W").and_then(|o| o.as_array().ok()) {
                cid_widths = parse_cid_widths(w);
            }
        }

        FontMetrics {
            first_char,
            widths,
            missing_width,
            cid_widths,
            cid_default_width,
            two_byte,
            ascent,
            descent,
        }
    }

    /// Advance width of a glyph code in 1/1000 text space units.
    pub fn width_1000(&self, code: u32) -> f64 {
        if self.two_byte {
            for range in &self.cid_widths {
                if code >= range.start && code <= range.end {
                    return range.width;
                }
            }
            return self.cid_default_width;
        }
        let idx = code as i64 - self.first_char;
        if idx >= 0 && (idx as usize) < self.widths.len() {
            let w = self.widths[idx as usize];
            if w > 0.0 {
                return w;
            }
        }
        if self.missing_width > 0.0 {
            self.missing_width
        } else if (32..=126).contains(&code) {
            HELVETICA_WIDTHS_32_126[(code - 32) as usize] as f64
        } else {
            FALLBACK_WIDTH
        }
    }

    /// Glyph-box top in 1/1000 units.
    pub fn ascent_1000(&self) -> f64 {
        self.ascent
    }

    /// Glyph-box bottom in 1/1000 units (negative below the baseline).
    pub fn descent_1000(&self) -> f64 {
        self.descent
    }

    /// Word spacing applies only to the single-byte code 32.
    pub fn is_word_space(&self, glyph: Glyph) -> bool {
        glyph.len == 1 && glyph.code == 32
    }

    /// Split a show-text string into glyph codes. Composite fonts take
    /// big-endian byte pairs; a trailing odd byte stands alone.
    pub fn decode(&self, bytes: &[u8]) -> Vec<Glyph> {
        let mut out = Vec::with_capacity(if self.two_byte {
            bytes.len() / 2 + 1
        } else {
            bytes.len()
        });
        if self.two_byte {
            let mut i = 0;
            while i < bytes.len() {
                if i + 1 < bytes.len() {
                    out.push(Glyph {
                        code: u32::from(bytes[i]) << 8 | u32::from(bytes[i + 1]),
                        start: i,
                        len: 2,
                    });
                    i += 2;
                } else {
                    out.push(Glyph {
                        code: u32::from(bytes[i]),
                        start: i,
                        len: 1,
                    });
                    i += 1;
                }
            }
        } else {
            for (i, &b) in bytes.iter().enumerate() {
                out.push(Glyph {
                    code: u32::from(b),
                    start: i,
                    len: 1,
                });
            }
        }
        out
    }
}

/// Parse a CIDFont /W array: `c [w w ...]` runs and `c_first c_last w`
/// ranges, freely interleaved.
fn parse_cid_widths(arr: &[PdfObject]) -> Vec<CidWidthRange> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < arr.len() {
        let Ok(start) = arr[i].as_i64() else {
            i += 1;
            continue;
        };
        let Some(next) = arr.get(i + 1) else { break };
        match next {
            PdfObject::Array(widths) => {
                let mut cid = start as u32;
                for w in widths {
                    if let Ok(width) = w.as_f64() {
                        out.push(CidWidthRange {
                            start: cid,
                            end: cid,
                            width,
                        });
                    }
                    cid += 1;
                }
                i += 2;
            }
            _ if next.as_i64().is_ok() => {
                let Some(third) = arr.get(i + 2) else { break };
                let end = next.as_i64().unwrap_or(start);
                let width = third.as_f64().unwrap_or(0.0);
                out.push(CidWidthRange {
                    start: start as u32,
                    end: end as u32,
                    width,
                });
                i += 3;
            }
            _ => {
                i += 1;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PdfObject;

    fn simple_font() -> PdfDict {
        let mut dict = PdfDict::default();
        dict.insert("Subtype".into(), PdfObject::name("Type1"));
        dict.insert("FirstChar".into(), PdfObject::Int(65));
        dict.insert(
            "Widths".into(),
            PdfObject::Array(vec![
                PdfObject::Int(700),
                PdfObject::Int(710),
                PdfObject::Int(720),
            ]),
        );
        dict
    }

    #[test]
    fn test_simple_widths() {
        let font = FontMetrics::from_dict(&simple_font());
        assert_eq!(font.width_1000(65), 700.0);
        assert_eq!(font.width_1000(67), 720.0);
        // outside the table: Helvetica fallback for a space
        assert_eq!(font.width_1000(32), 278.0);
    }

    #[test]
    fn test_simple_decode_is_per_byte() {
        let font = FontMetrics::from_dict(&simple_font());
        let glyphs = font.decode(b"AB");
        assert_eq!(glyphs.len(), 2);
        assert_eq!(glyphs[0], Glyph { code: 65, start: 0, len: 1 });
        assert_eq!(glyphs[1], Glyph { code: 66, start: 1, len: 1 });
    }

    #[test]
    fn test_composite_widths_and_decode() {
        let mut desc = PdfDict::default();
        desc.insert("DW".into(), PdfObject::Int(500));
        desc.insert(
            "W".into(),
            PdfObject::Array(vec![
                PdfObject::Int(1),
                PdfObject::Array(vec![PdfObject::Int(600), PdfObject::Int(650)]),
                PdfObject::Int(10),
                PdfObject::Int(20),
                PdfObject::Int(800),
            ]),
        );
        let mut dict = PdfDict::default();
        dict.insert("Subtype".into(), PdfObject::name("Type0"));
        dict.insert(
            "DescendantFonts".into(),
            PdfObject::Array(vec![PdfObject::Dict(desc)]),
        );
        let font = FontMetrics::from_dict(&dict);

        assert_eq!(font.width_1000(1), 600.0);
        assert_eq!(font.width_1000(2), 650.0);
        assert_eq!(font.width_1000(15), 800.0);
        assert_eq!(font.width_1000(99), 500.0);

        let glyphs = font.decode(&[0x00, 0x41, 0x01, 0x02, 0x7f]);
        assert_eq!(glyphs.len(), 3);
        assert_eq!(glyphs[0].code, 0x41);
        assert_eq!(glyphs[1].code, 0x0102);
        assert_eq!(glyphs[2], Glyph { code: 0x7f, start: 4, len: 1 });
    }

    #[test]
    fn test_word_space_detection() {
        let simple = FontMetrics::from_dict(&simple_font());
        assert!(simple.is_word_space(Glyph { code: 32, start: 0, len: 1 }));
        assert!(!simple.is_word_space(Glyph { code: 32, start: 0, len: 2 }));
    }

    #[test]
    fn test_helvetica_ruler() {
        assert_eq!(helvetica_width_1000(" "), 278.0);
        assert_eq!(helvetica_width_1000("H"), 722.0);
        assert!(helvetica_width_1000("Hello") > 0.0);
    }
}
