//! Serialization of operators and objects back into content-stream bytes.
//!
//! The writer is deliberately dumb: it formats exactly what it is told and
//! keeps no graphics state. All decisions about what to emit (and in which
//! order) live in the processor; passthrough content arrives here as raw
//! source spans.

use crate::model::{Color, PdfObject, PdfStream};
use crate::utils::Matrix;

/// Item of a TJ show array: glyph bytes or a position adjustment in
/// thousandths of text space.
#[derive(Debug, Clone, PartialEq)]
pub enum TextItem {
    Str(Vec<u8>),
    Num(f64),
}

/// Formats a number the compact way content streams usually carry them.
pub fn fmt_number(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    if value.fract() == 0.0 && value.abs() < 1e15 {
        return format!("{}", value as i64);
    }
    let mut s = format!("{value:.6}");
    while s.ends_with('0') {
        s.pop();
    }
    if s.ends_with('.') {
        s.pop();
    }
    s
}

/// Escape and append a name token (`/Name`).
fn push_name(buf: &mut Vec<u8>, name: &str) {
    buf.push(b'/');
    for &b in name.as_bytes() {
        let regular = (0x21..=0x7e).contains(&b)
            && !matches!(
                b,
                b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%' | b'#'
            );
        if regular {
            buf.push(b);
        } else {
            buf.extend_from_slice(format!("#{b:02X}").as_bytes());
        }
    }
}

/// Escape and append a literal string token (`(...)`).
fn push_string(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.push(b'(');
    for &b in bytes {
        match b {
            b'(' | b')' | b'\\' => {
                buf.push(b'\\');
                buf.push(b);
            }
            b'\n' => buf.extend_from_slice(b"\\n"),
            b'\r' => buf.extend_from_slice(b"\\r"),
            _ => buf.push(b),
        }
    }
    buf.push(b')');
}

/// Serialize one object in content-stream syntax.
pub fn serialize_object(obj: &PdfObject, buf: &mut Vec<u8>) {
    match obj {
        PdfObject::Null => buf.extend_from_slice(b"null"),
        PdfObject::Bool(true) => buf.extend_from_slice(b"true"),
        PdfObject::Bool(false) => buf.extend_from_slice(b"false"),
        PdfObject::Int(n) => buf.extend_from_slice(n.to_string().as_bytes()),
        PdfObject::Real(v) => buf.extend_from_slice(fmt_number(*v).as_bytes()),
        PdfObject::Name(name) => push_name(buf, name),
        PdfObject::String(s) => push_string(buf, s),
        PdfObject::Array(items) => {
            buf.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    buf.push(b' ');
                }
                serialize_object(item, buf);
            }
            buf.push(b']');
        }
        PdfObject::Dict(dict) => {
            buf.extend_from_slice(b"<<");
            for (key, value) in dict {
                push_name(buf, key);
                buf.push(b' ');
                serialize_object(value, buf);
            }
            buf.extend_from_slice(b">>");
        }
        // bare stream objects cannot appear inside a content stream; emit
        // the dictionary so output stays parseable
        PdfObject::Stream(s) => {
            serialize_object(&PdfObject::Dict(s.attrs.clone()), buf);
        }
    }
}

/// Accumulates the rewritten content stream.
#[derive(Debug, Default)]
pub struct ContentWriter {
    buf: Vec<u8>,
}

impl ContentWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn ensure_separated(&mut self) {
        if let Some(&last) = self.buf.last()
            && last != b'\n'
            && last != b' '
        {
            self.buf.push(b'\n');
        }
    }

    /// Append raw source bytes (a passthrough span), separated from prior
    /// output.
    pub fn write_raw(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        self.ensure_separated();
        self.buf.extend_from_slice(bytes);
        self.buf.push(b'\n');
    }

    fn op(&mut self, operands: &[f64], operator: &str) {
        self.ensure_separated();
        for &v in operands {
            self.buf.extend_from_slice(fmt_number(v).as_bytes());
            self.buf.push(b' ');
        }
        self.buf.extend_from_slice(operator.as_bytes());
        self.buf.push(b'\n');
    }

    // --- graphics state ---

    pub fn save_state(&mut self) {
        self.op(&[], "q");
    }

    pub fn restore_state(&mut self) {
        self.op(&[], "Q");
    }

    pub fn concat(&mut self, m: Matrix) {
        self.op(&[m.0, m.1, m.2, m.3, m.4, m.5], "cm");
    }

    pub fn set_ext_gstate(&mut self, name: &str) {
        self.ensure_separated();
        push_name(&mut self.buf, name);
        self.buf.extend_from_slice(b" gs\n");
    }

    pub fn set_fill_color(&mut self, color: Color) {
        self.op(&color.components(), color.fill_operator());
    }

    pub fn set_stroke_color(&mut self, color: Color) {
        self.op(&color.components(), color.stroke_operator());
    }

    // --- path construction & painting ---

    pub fn move_to(&mut self, x: f64, y: f64) {
        self.op(&[x, y], "m");
    }

    pub fn line_to(&mut self, x: f64, y: f64) {
        self.op(&[x, y], "l");
    }

    pub fn curve_to(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, x3: f64, y3: f64) {
        self.op(&[x1, y1, x2, y2, x3, y3], "c");
    }

    pub fn close_path(&mut self) {
        self.op(&[], "h");
    }

    pub fn rect(&mut self, x: f64, y: f64, w: f64, h: f64) {
        self.op(&[x, y, w, h], "re");
    }

    pub fn fill(&mut self, even_odd: bool) {
        self.op(&[], if even_odd { "f*" } else { "f" });
    }

    pub fn clip(&mut self, even_odd: bool) {
        self.op(&[], if even_odd { "W*" } else { "W" });
    }

    pub fn end_path(&mut self) {
        self.op(&[], "n");
    }

    // --- text ---

    pub fn begin_text(&mut self) {
        self.op(&[], "BT");
    }

    pub fn end_text(&mut self) {
        self.op(&[], "ET");
    }

    pub fn set_font(&mut self, name: &str, size: f64) {
        self.ensure_separated();
        push_name(&mut self.buf, name);
        self.buf.push(b' ');
        self.buf.extend_from_slice(fmt_number(size).as_bytes());
        self.buf.extend_from_slice(b" Tf\n");
    }

    pub fn set_leading(&mut self, leading: f64) {
        self.op(&[leading], "TL");
    }

    pub fn move_text(&mut self, dx: f64, dy: f64) {
        self.op(&[dx, dy], "Td");
    }

    pub fn move_text_set_leading(&mut self, dx: f64, dy: f64) {
        self.op(&[dx, dy], "TD");
    }

    pub fn set_text_matrix(&mut self, m: Matrix) {
        self.op(&[m.0, m.1, m.2, m.3, m.4, m.5], "Tm");
    }

    pub fn next_line(&mut self) {
        self.op(&[], "T*");
    }

    /// Emit a TJ array (or a bare Tj when it is a single plain string).
    pub fn show_text(&mut self, items: &[TextItem]) {
        self.ensure_separated();
        if let [TextItem::Str(s)] = items {
            push_string(&mut self.buf, s);
            self.buf.extend_from_slice(b" Tj\n");
            return;
        }
        self.buf.push(b'[');
        for item in items {
            match item {
                TextItem::Str(s) => push_string(&mut self.buf, s),
                TextItem::Num(v) => {
                    self.buf.extend_from_slice(fmt_number(*v).as_bytes());
                    self.buf.push(b' ');
                }
            }
        }
        self.buf.extend_from_slice(b"] TJ\n");
    }

    // --- xobjects & marked content ---

    pub fn invoke_xobject(&mut self, name: &str) {
        self.ensure_separated();
        push_name(&mut self.buf, name);
        self.buf.extend_from_slice(b" Do\n");
    }

    pub fn begin_marked_content(&mut self, tag: &str, props: Option<&PdfObject>) {
        self.ensure_separated();
        push_name(&mut self.buf, tag);
        match props {
            Some(obj) => {
                self.buf.push(b' ');
                serialize_object(obj, &mut self.buf);
                self.buf.extend_from_slice(b" BDC\n");
            }
            None => self.buf.extend_from_slice(b" BMC\n"),
        }
    }

    pub fn end_marked_content(&mut self) {
        self.op(&[], "EMC");
    }

    /// Emit an inline image (BI ... ID ... EI).
    pub fn write_inline_image(&mut self, image: &PdfStream) {
        self.ensure_separated();
        self.buf.extend_from_slice(b"BI");
        for (key, value) in &image.attrs {
            self.buf.push(b' ');
            push_name(&mut self.buf, key);
            self.buf.push(b' ');
            serialize_object(value, &mut self.buf);
        }
        self.buf.extend_from_slice(b" ID ");
        self.buf.extend_from_slice(image.rawdata());
        self.buf.extend_from_slice(b" EI\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fmt_number() {
        assert_eq!(fmt_number(10.0), "10");
        assert_eq!(fmt_number(-0.5), "-0.5");
        assert_eq!(fmt_number(0.0), "0");
        assert_eq!(fmt_number(1.25), "1.25");
        assert_eq!(fmt_number(0.123456789), "0.123457");
    }

    #[test]
    fn test_writer_basic_ops() {
        let mut w = ContentWriter::new();
        w.save_state();
        w.concat((2.0, 0.0, 0.0, 2.0, 10.0, 0.0));
        w.rect(1.0, 2.0, 3.0, 4.0);
        w.fill(false);
        w.restore_state();
        let out = String::from_utf8(w.into_bytes()).unwrap();
        assert_eq!(out, "q\n2 0 0 2 10 0 cm\n1 2 3 4 re\nf\nQ\n");
    }

    #[test]
    fn test_show_text_single_string_uses_tj() {
        let mut w = ContentWriter::new();
        w.show_text(&[TextItem::Str(b"Hi".to_vec())]);
        assert_eq!(w.into_bytes(), b"(Hi) Tj\n");
    }

    #[test]
    fn test_show_text_array_with_adjustments() {
        let mut w = ContentWriter::new();
        w.show_text(&[
            TextItem::Str(b"A".to_vec()),
            TextItem::Num(-250.0),
            TextItem::Str(b"B".to_vec()),
        ]);
        assert_eq!(w.into_bytes(), b"[(A)-250 (B)] TJ\n");
    }

    #[test]
    fn test_serialize_nested_dict() {
        let mut dict = crate::model::PdfDict::new();
        dict.insert("MCID".into(), PdfObject::Int(7));
        let mut buf = Vec::new();
        serialize_object(&PdfObject::Dict(dict), &mut buf);
        assert_eq!(buf, b"<</MCID 7>>");
    }

    #[test]
    fn test_string_escaping() {
        let mut buf = Vec::new();
        serialize_object(&PdfObject::String(b"a(b)c\\".to_vec()), &mut buf);
        assert_eq!(buf, b"(a\\(b\\)c\\\\)");
    }
}
