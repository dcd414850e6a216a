//! Content-stream lexing and parsing.
//!
//! Turns raw content bytes into complete operator events: each event carries
//! the operator kind, its operands as [`PdfObject`]s, and the byte span of
//! operands + operator in the source. The span makes byte-exact passthrough
//! possible for operators the rewriter does not touch.
//!
//! Inline images (BI/ID/EI) are delivered as a single event holding the
//! image dictionary and data; when the image is unfiltered its exact data
//! length is computed from the dictionary so binary data containing "EI"
//! does not end the scan early.

use std::ops::Range;

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use tracing::debug;

use crate::model::{PdfDict, PdfObject, PdfStream};

/// Content operator kind.
///
/// Variant naming: uppercase PDF operators keep their letter, lowercase ones
/// double it (`Q` restore / `Qq` save), `*` becomes `Star`, and the clipping
/// `W` is `WClip` to keep it apart from the line-width `Ww`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    // Graphics state
    Q,  // restore (uppercase Q)
    Qq, // save (lowercase q)
    Cm, // concat matrix
    Ww, // line width (lowercase w)
    J,  // line cap (uppercase J)
    Jj, // line join (lowercase j)
    M,  // miter limit
    D,  // dash pattern
    Ri, // rendering intent
    I,  // flatness
    Gs, // graphics state dict

    // Path construction
    Mm, // moveto (lowercase m)
    L,  // lineto
    C,  // curveto
    V,
    Y,
    H,  // closepath
    Re, // rectangle

    // Path painting
    S,      // stroke (uppercase)
    Ss,     // close+stroke (lowercase s)
    F,      // fill (uppercase, deprecated alias)
    Ff,     // fill (lowercase f)
    FStar,  // f*
    B,      // fill+stroke
    BStar,  // B*
    Bb,     // close+fill+stroke (lowercase b)
    BbStar, // b*
    N,      // end path

    // Clipping (uppercase W)
    WClip,
    WStar,

    // Text object
    BT,
    ET,

    // Text state
    Tc,
    Tw,
    Tz,
    TL,
    Tf,
    Tr,
    Ts,

    // Text positioning
    Td,
    TD,
    Tm,
    TStar, // T*

    // Text showing
    Tj,
    TJ,
    Quote,       // '
    DoubleQuote, // "

    // Color
    CS,
    Cs, // lowercase
    SC,
    SCN,
    Sc,  // lowercase
    Scn, // lowercase
    G,
    Gg, // lowercase g
    RG,
    Rg, // lowercase
    K,
    Kk, // lowercase k

    // XObject
    Do,

    // Marked content
    MP,
    DP,
    BMC,
    BDC,
    EMC,

    // Shading
    Sh,

    // Type 3 glyph metrics
    D0,
    D1,

    // Compatibility sections
    BX,
    EX,

    /// Operator outside the table; passed through via its source span.
    Unknown,
}

static OP_TABLE: Lazy<FxHashMap<&'static [u8], Op>> = Lazy::new(|| {
    let mut table: FxHashMap<&'static [u8], Op> = FxHashMap::default();
    let entries: &[(&'static [u8], Op)] = &[
        (b"Q", Op::Q),
        (b"q", Op::Qq),
        (b"cm", Op::Cm),
        (b"w", Op::Ww),
        (b"J", Op::J),
        (b"j", Op::Jj),
        (b"M", Op::M),
        (b"d", Op::D),
        (b"ri", Op::Ri),
        (b"i", Op::I),
        (b"gs", Op::Gs),
        (b"m", Op::Mm),
        (b"l", Op::L),
        (b"c", Op::C),
        (b"v", Op::V),
        (b"y", Op::Y),
        (b"h", Op::H),
        (b"re", Op::Re),
        (b"S", Op::S),
        (b"s", Op::Ss),
        (b"F", Op::F),
        (b"f", Op::Ff),
        (b"f*", Op::FStar),
        (b"B", Op::B),
        (b"B*", Op::BStar),
        (b"b", Op::Bb),
        (b"b*", Op::BbStar),
        (b"n", Op::N),
        (b"W", Op::WClip),
        (b"W*", Op::WStar),
        (b"BT", Op::BT),
        (b"ET", Op::ET),
        (b"Tc", Op::Tc),
        (b"Tw", Op::Tw),
        (b"Tz", Op::Tz),
        (b"TL", Op::TL),
        (b"Tf", Op::Tf),
        (b"Tr", Op::Tr),
        (b"Ts", Op::Ts),
        (b"Td", Op::Td),
        (b"TD", Op::TD),
        (b"Tm", Op::Tm),
        (b"T*", Op::TStar),
        (b"Tj", Op::Tj),
        (b"TJ", Op::TJ),
        (b"'", Op::Quote),
        (b"\"", Op::DoubleQuote),
        (b"CS", Op::CS),
        (b"cs", Op::Cs),
        (b"SC", Op::SC),
        (b"SCN", Op::SCN),
        (b"sc", Op::Sc),
        (b"scn", Op::Scn),
        (b"G", Op::G),
        (b"g", Op::Gg),
        (b"RG", Op::RG),
        (b"rg", Op::Rg),
        (b"K", Op::K),
        (b"k", Op::Kk),
        (b"Do", Op::Do),
        (b"MP", Op::MP),
        (b"DP", Op::DP),
        (b"BMC", Op::BMC),
        (b"BDC", Op::BDC),
        (b"EMC", Op::EMC),
        (b"sh", Op::Sh),
        (b"d0", Op::D0),
        (b"d1", Op::D1),
        (b"BX", Op::BX),
        (b"EX", Op::EX),
    ];
    for &(token, op) in entries {
        table.insert(token, op);
    }
    table
});

impl Op {
    /// Map an operator token to its kind.
    pub fn from_token(token: &[u8]) -> Self {
        OP_TABLE.get(token).copied().unwrap_or(Op::Unknown)
    }
}

/// One complete content-stream operator with operands.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentOp {
    pub kind: Op,
    pub operands: Vec<PdfObject>,
    /// Byte span of operands + operator in the source stream.
    pub span: Range<usize>,
}

/// Inline image carried between ID and EI.
#[derive(Debug, Clone, PartialEq)]
pub struct InlineImage {
    pub stream: PdfStream,
    /// Byte span of BI ... EI in the source stream.
    pub span: Range<usize>,
}

/// Event produced by [`ContentParser`].
#[derive(Debug, Clone, PartialEq)]
pub enum ContentEvent {
    Op(ContentOp),
    InlineImage(InlineImage),
}

const fn is_whitespace(b: u8) -> bool {
    matches!(b, b'\0' | b'\t' | b'\n' | b'\x0c' | b'\r' | b' ')
}

const fn is_delimiter(b: u8) -> bool {
    matches!(
        b,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

const fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Tokens surfaced by the lexer to the parser loop.
#[derive(Debug, Clone, PartialEq)]
enum Token {
    Obj(PdfObject),
    ArrayStart,
    ArrayEnd,
    DictStart,
    DictEnd,
    Operator(SmolStr),
}

struct ContentLexer<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ContentLexer<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.data.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn skip_whitespace(&mut self) {
        while let Some(b) = self.peek() {
            if b == b'%' {
                // comment runs to end of line
                while let Some(c) = self.bump() {
                    if c == b'\n' || c == b'\r' {
                        break;
                    }
                }
            } else if is_whitespace(b) {
                self.pos += 1;
            } else {
                return;
            }
        }
    }

    /// Next token with its starting offset; None at end of data.
    fn next_token(&mut self) -> Option<(usize, Token)> {
        self.skip_whitespace();
        let start = self.pos;
        let b = self.peek()?;

        let token = match b {
            b'/' => Token::Obj(self.parse_name()),
            b'(' => Token::Obj(self.parse_string()),
            b'<' => {
                if self.peek_at(1) == Some(b'<') {
                    self.pos += 2;
                    Token::DictStart
                } else {
                    Token::Obj(self.parse_hex_string())
                }
            }
            b'>' => {
                if self.peek_at(1) == Some(b'>') {
                    self.pos += 2;
                    Token::DictEnd
                } else {
                    // stray '>', skip it
                    self.pos += 1;
                    debug!(pos = start, "skipping stray '>' in content stream");
                    return self.next_token();
                }
            }
            b'[' => {
                self.pos += 1;
                Token::ArrayStart
            }
            b']' => {
                self.pos += 1;
                Token::ArrayEnd
            }
            b'{' | b'}' | b')' => {
                self.pos += 1;
                debug!(pos = start, byte = b, "skipping stray delimiter");
                return self.next_token();
            }
            b'+' | b'-' | b'.' => {
                if matches!(self.peek_at(1), Some(c) if c.is_ascii_digit() || c == b'.') {
                    Token::Obj(self.parse_number())
                } else {
                    self.parse_operator()
                }
            }
            c if c.is_ascii_digit() => Token::Obj(self.parse_number()),
            _ => self.parse_operator(),
        };
        Some((start, token))
    }

    fn parse_number(&mut self) -> PdfObject {
        let start = self.pos;
        let mut is_real = false;
        if matches!(self.peek(), Some(b'+') | Some(b'-')) {
            self.pos += 1;
        }
        while let Some(b) = self.peek() {
            match b {
                b'0'..=b'9' => self.pos += 1,
                b'.' => {
                    is_real = true;
                    self.pos += 1;
                }
                _ => break,
            }
        }
        let text = std::str::from_utf8(&self.data[start..self.pos]).unwrap_or("0");
        if is_real {
            PdfObject::Real(text.parse::<f64>().unwrap_or(0.0))
        } else {
            match text.parse::<i64>() {
                Ok(n) => PdfObject::Int(n),
                Err(_) => PdfObject::Real(text.parse::<f64>().unwrap_or(0.0)),
            }
        }
    }

    fn parse_name(&mut self) -> PdfObject {
        self.pos += 1; // '/'
        let mut name = Vec::with_capacity(16);
        while let Some(b) = self.peek() {
            if is_whitespace(b) || is_delimiter(b) {
                break;
            }
            if b == b'#'
                && let (Some(h1), Some(h2)) = (
                    self.peek_at(1).and_then(hex_value),
                    self.peek_at(2).and_then(hex_value),
                )
            {
                self.pos += 3;
                name.push((h1 << 4) | h2);
                continue;
            }
            name.push(b);
            self.pos += 1;
        }
        PdfObject::Name(SmolStr::new(String::from_utf8_lossy(&name)))
    }

    fn parse_string(&mut self) -> PdfObject {
        self.pos += 1; // '('
        let mut out = Vec::new();
        let mut depth = 1usize;
        while let Some(b) = self.bump() {
            match b {
                b'(' => {
                    depth += 1;
                    out.push(b);
                }
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    out.push(b);
                }
                b'\\' => match self.bump() {
                    Some(b'n') => out.push(b'\n'),
                    Some(b'r') => out.push(b'\r'),
                    Some(b't') => out.push(b'\t'),
                    Some(b'b') => out.push(0x08),
                    Some(b'f') => out.push(0x0c),
                    Some(b'(') => out.push(b'('),
                    Some(b')') => out.push(b')'),
                    Some(b'\\') => out.push(b'\\'),
                    Some(b'\r') => {
                        // line continuation, swallow a following LF too
                        if self.peek() == Some(b'\n') {
                            self.pos += 1;
                        }
                    }
                    Some(b'\n') => {}
                    Some(d @ b'0'..=b'7') => {
                        let mut value = (d - b'0') as u32;
                        for _ in 0..2 {
                            match self.peek() {
                                Some(o @ b'0'..=b'7') => {
                                    value = value * 8 + (o - b'0') as u32;
                                    self.pos += 1;
                                }
                                _ => break,
                            }
                        }
                        out.push(value as u8);
                    }
                    Some(other) => out.push(other),
                    None => break,
                },
                _ => out.push(b),
            }
        }
        PdfObject::String(out)
    }

    fn parse_hex_string(&mut self) -> PdfObject {
        self.pos += 1; // '<'
        let mut nibbles = Vec::new();
        while let Some(b) = self.bump() {
            if b == b'>' {
                break;
            }
            if let Some(v) = hex_value(b) {
                nibbles.push(v);
            }
        }
        if nibbles.len() % 2 == 1 {
            nibbles.push(0);
        }
        let bytes = nibbles.chunks_exact(2).map(|p| (p[0] << 4) | p[1]).collect();
        PdfObject::String(bytes)
    }

    fn parse_operator(&mut self) -> Token {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if is_whitespace(b) || is_delimiter(b) {
                break;
            }
            self.pos += 1;
        }
        if self.pos == start {
            // a stray delimiter byte must still advance the cursor
            self.pos += 1;
        }
        let raw = &self.data[start..self.pos];
        match raw {
            b"true" => Token::Obj(PdfObject::Bool(true)),
            b"false" => Token::Obj(PdfObject::Bool(false)),
            b"null" => Token::Obj(PdfObject::Null),
            _ => Token::Operator(SmolStr::new(String::from_utf8_lossy(raw))),
        }
    }
}

/// Parser producing complete [`ContentEvent`]s from one content stream.
pub struct ContentParser<'a> {
    lexer: ContentLexer<'a>,
    operands: Vec<PdfObject>,
    /// Offset of the first buffered operand, if any.
    operands_start: Option<usize>,
}

impl<'a> ContentParser<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            lexer: ContentLexer::new(data),
            operands: Vec::new(),
            operands_start: None,
        }
    }

    fn note_operand_start(&mut self, pos: usize) {
        if self.operands_start.is_none() {
            self.operands_start = Some(pos);
        }
    }

    /// Collect tokens until the matching ArrayEnd.
    fn parse_array(&mut self) -> PdfObject {
        let mut items = Vec::new();
        while let Some((_, token)) = self.lexer.next_token() {
            match token {
                Token::Obj(obj) => items.push(obj),
                Token::ArrayStart => items.push(self.parse_array()),
                Token::DictStart => items.push(self.parse_dict()),
                Token::ArrayEnd => break,
                Token::DictEnd => break,
                // operators inside arrays are malformed; drop them
                Token::Operator(op) => {
                    debug!(op = op.as_str(), "operator inside array, dropping");
                }
            }
        }
        PdfObject::Array(items)
    }

    /// Collect key/value pairs until the matching DictEnd.
    fn parse_dict(&mut self) -> PdfObject {
        let mut dict = PdfDict::new();
        let mut pending_key: Option<SmolStr> = None;
        while let Some((_, token)) = self.lexer.next_token() {
            let value = match token {
                Token::Obj(PdfObject::Name(name)) if pending_key.is_none() => {
                    pending_key = Some(name);
                    continue;
                }
                Token::Obj(obj) => obj,
                Token::ArrayStart => self.parse_array(),
                Token::DictStart => self.parse_dict(),
                Token::DictEnd => break,
                Token::ArrayEnd => break,
                Token::Operator(op) => {
                    debug!(op = op.as_str(), "operator inside dict, dropping");
                    continue;
                }
            };
            if let Some(key) = pending_key.take() {
                dict.insert(key, value);
            }
        }
        PdfObject::Dict(dict)
    }

    /// Exact sample length for an unfiltered inline image, when computable.
    fn unfiltered_inline_length(dict: &PdfDict) -> Option<usize> {
        if dict.get("F").or_else(|| dict.get("Filter")).is_some() {
            return None;
        }
        let get_num = |keys: [&str; 2]| -> Option<i64> {
            keys.iter()
                .find_map(|k| dict.get(*k))
                .and_then(|o| o.as_i64().ok())
        };
        let width = get_num(["W", "Width"])?;
        let height = get_num(["H", "Height"])?;
        let is_mask = dict
            .get("IM")
            .or_else(|| dict.get("ImageMask"))
            .and_then(|o| o.as_bool().ok())
            .unwrap_or(false);
        let bpc = if is_mask {
            1
        } else {
            get_num(["BPC", "BitsPerComponent"]).unwrap_or(8)
        };
        let channels = if is_mask {
            1
        } else {
            match dict
                .get("CS")
                .or_else(|| dict.get("ColorSpace"))
                .and_then(|o| o.as_name().ok())
            {
                Some("RGB") | Some("DeviceRGB") => 3,
                Some("CMYK") | Some("DeviceCMYK") => 4,
                _ => 1,
            }
        };
        if width <= 0 || height <= 0 || bpc <= 0 {
            return None;
        }
        let row = (width as usize * bpc as usize * channels + 7) / 8;
        Some(row * height as usize)
    }

    /// Read inline image data after ID, returning data and the offset just
    /// past the closing EI.
    fn read_inline_data(&mut self, dict: &PdfDict) -> (Vec<u8>, usize) {
        let data_bytes = self.lexer.data;
        // exactly one whitespace byte separates ID from the data
        if matches!(self.lexer.peek(), Some(b) if is_whitespace(b)) {
            self.lexer.pos += 1;
        }
        let start = self.lexer.pos;

        if let Some(len) = Self::unfiltered_inline_length(dict) {
            let end = (start + len).min(data_bytes.len());
            let mut pos = end;
            // skip whitespace then the EI keyword
            while pos < data_bytes.len() && is_whitespace(data_bytes[pos]) {
                pos += 1;
            }
            if data_bytes[pos..].starts_with(b"EI") {
                pos += 2;
            }
            self.lexer.pos = pos;
            return (data_bytes[start..end].to_vec(), pos);
        }

        // scan for a whitespace-delimited EI
        let mut pos = start;
        while pos + 1 < data_bytes.len() {
            if data_bytes[pos] == b'E'
                && data_bytes[pos + 1] == b'I'
                && (pos == start || is_whitespace(data_bytes[pos - 1]))
                && (pos + 2 >= data_bytes.len()
                    || is_whitespace(data_bytes[pos + 2])
                    || is_delimiter(data_bytes[pos + 2]))
            {
                let mut end = pos;
                while end > start && is_whitespace(data_bytes[end - 1]) {
                    end -= 1;
                }
                self.lexer.pos = pos + 2;
                return (data_bytes[start..end].to_vec(), pos + 2);
            }
            pos += 1;
        }
        // unterminated image: consume the rest
        self.lexer.pos = data_bytes.len();
        (data_bytes[start..].to_vec(), data_bytes.len())
    }

    /// Collect the BI dictionary up to ID, then the data.
    fn parse_inline_image(&mut self, bi_pos: usize) -> Option<ContentEvent> {
        let mut items: Vec<PdfObject> = Vec::new();
        loop {
            let (_, token) = self.lexer.next_token()?;
            match token {
                Token::Obj(obj) => items.push(obj),
                Token::ArrayStart => items.push(self.parse_array()),
                Token::DictStart => items.push(self.parse_dict()),
                Token::Operator(op) if op == "ID" => break,
                Token::Operator(op) => {
                    debug!(op = op.as_str(), "unexpected operator in inline image dict");
                }
                Token::ArrayEnd | Token::DictEnd => {}
            }
        }
        let mut dict = PdfDict::new();
        let mut iter = items.into_iter();
        while let Some(key) = iter.next() {
            if let PdfObject::Name(name) = key {
                if let Some(value) = iter.next() {
                    dict.insert(name, value);
                }
            }
        }
        let (data, end) = self.read_inline_data(&dict);
        Some(ContentEvent::InlineImage(InlineImage {
            stream: PdfStream::new(dict, data),
            span: bi_pos..end,
        }))
    }

    fn next_event(&mut self) -> Option<ContentEvent> {
        loop {
            let (pos, token) = self.lexer.next_token()?;
            match token {
                Token::Obj(obj) => {
                    self.note_operand_start(pos);
                    self.operands.push(obj);
                }
                Token::ArrayStart => {
                    self.note_operand_start(pos);
                    let array = self.parse_array();
                    self.operands.push(array);
                }
                Token::DictStart => {
                    self.note_operand_start(pos);
                    let dict = self.parse_dict();
                    self.operands.push(dict);
                }
                Token::ArrayEnd | Token::DictEnd => {
                    debug!(pos, "unbalanced array/dict close in content stream");
                }
                Token::Operator(raw) => {
                    if raw == "BI" {
                        self.operands.clear();
                        self.operands_start = None;
                        return self.parse_inline_image(pos);
                    }
                    let kind = Op::from_token(raw.as_bytes());
                    let span_start = self.operands_start.take().unwrap_or(pos);
                    let operands = std::mem::take(&mut self.operands);
                    return Some(ContentEvent::Op(ContentOp {
                        kind,
                        operands,
                        span: span_start..self.lexer.pos,
                    }));
                }
            }
        }
    }
}

impl Iterator for ContentParser<'_> {
    type Item = ContentEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_event()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ops(content: &[u8]) -> Vec<ContentEvent> {
        ContentParser::new(content).collect()
    }

    #[test]
    fn test_simple_ops() {
        let events = ops(b"q 1 0 0 1 10 20 cm Q");
        assert_eq!(events.len(), 3);
        match &events[1] {
            ContentEvent::Op(op) => {
                assert_eq!(op.kind, Op::Cm);
                assert_eq!(op.operands.len(), 6);
                assert_eq!(op.operands[4], PdfObject::Int(10));
            }
            other => panic!("expected cm, got {other:?}"),
        }
    }

    #[test]
    fn test_span_covers_operands() {
        let content = b"q 10 20 m S";
        let events = ops(content);
        let ContentEvent::Op(m) = &events[1] else {
            panic!("expected op");
        };
        assert_eq!(&content[m.span.clone()], b"10 20 m");
    }

    #[test]
    fn test_tj_array_and_strings() {
        let events = ops(b"BT [(AB) -120 (C\\)D)] TJ ET");
        let ContentEvent::Op(tj) = &events[1] else {
            panic!("expected op");
        };
        assert_eq!(tj.kind, Op::TJ);
        let arr = tj.operands[0].as_array().unwrap();
        assert_eq!(arr[0], PdfObject::String(b"AB".to_vec()));
        assert_eq!(arr[1], PdfObject::Int(-120));
        assert_eq!(arr[2], PdfObject::String(b"C)D".to_vec()));
    }

    #[test]
    fn test_hex_string_and_names() {
        let events = ops(b"/F#31 12 Tf <48454c4c4f> Tj");
        let ContentEvent::Op(tf) = &events[0] else {
            panic!("expected op");
        };
        assert_eq!(tf.operands[0], PdfObject::name("F1"));
        let ContentEvent::Op(tj) = &events[1] else {
            panic!("expected op");
        };
        assert_eq!(tj.operands[0], PdfObject::String(b"HELLO".to_vec()));
    }

    #[test]
    fn test_inline_image_exact_length() {
        // 2x2 1-bit unfiltered: 1 byte per row, 2 bytes of data, data
        // deliberately contains "EI" lookalike bytes via 0x45 0x49
        let content = b"BI /W 2 /H 2 /BPC 1 /IM true ID \x45\x49 EI Q";
        let events = ops(content);
        match &events[0] {
            ContentEvent::InlineImage(img) => {
                assert_eq!(img.stream.rawdata(), b"\x45\x49");
                assert!(content[img.span.clone()].ends_with(b"EI"));
                assert_eq!(img.span.start, 0);
            }
            other => panic!("expected inline image, got {other:?}"),
        }
        let ContentEvent::Op(q) = &events[1] else {
            panic!("expected trailing Q");
        };
        assert_eq!(q.kind, Op::Q);
    }

    #[test]
    fn test_inline_image_scan_fallback() {
        let content = b"BI /W 1 /H 1 /BPC 8 /F /Fl ID \x12\x34\x56 EI n";
        let events = ops(content);
        match &events[0] {
            ContentEvent::InlineImage(img) => {
                assert_eq!(img.stream.rawdata(), b"\x12\x34\x56");
            }
            other => panic!("expected inline image, got {other:?}"),
        }
    }

    #[test]
    fn test_bdc_properties_dict() {
        let events = ops(b"/OC <</Type /OCMD>> BDC EMC");
        let ContentEvent::Op(bdc) = &events[0] else {
            panic!("expected op");
        };
        assert_eq!(bdc.kind, Op::BDC);
        assert_eq!(bdc.operands[0], PdfObject::name("OC"));
        let dict = bdc.operands[1].as_dict().unwrap();
        assert_eq!(dict.get("Type"), Some(&PdfObject::name("OCMD")));
    }

    #[test]
    fn test_unknown_operator_span() {
        let content = b"1 2 frob S";
        let events = ops(content);
        let ContentEvent::Op(unknown) = &events[0] else {
            panic!("expected op");
        };
        assert_eq!(unknown.kind, Op::Unknown);
        assert_eq!(&content[unknown.span.clone()], b"1 2 frob");
    }
}
