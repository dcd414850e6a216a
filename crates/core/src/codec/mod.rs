//! Codec modules for PDF stream compression.
//!
//! This module contains:
//! - `ascii85`: ASCII85 and ASCIIHex decoding
//! - `lzw`: LZW decompression
//! - `runlength`: Run-length decoding
//!
//! Flate, the PNG predictor, and the filter-chain walk live here. Image
//! codecs (DCTDecode and friends) are not transport filters; callers that
//! meet one get [`CleanupError::UnsupportedImageFormat`] and decide
//! themselves whether that is fatal.

pub mod ascii85;
pub mod lzw;
pub mod runlength;

pub use ascii85::{ascii85decode, asciihexdecode};
pub use lzw::{lzwdecode, lzwdecode_with_earlychange};
pub use runlength::rldecode;

use std::io::{Read, Write};

use smol_str::SmolStr;

use crate::error::{CleanupError, Result};
use crate::model::{PdfDict, PdfObject, PdfStream};

/// Decode Flate (zlib) data. Corrupt tails fall back to a lenient
/// byte-at-a-time pass that keeps whatever decompressed cleanly.
pub fn flatedecode(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = flate2::read::ZlibDecoder::new(data);
    let mut out = Vec::new();
    if decoder.read_to_end(&mut out).is_err() {
        out = decompress_corrupted(data);
    }
    Ok(out)
}

/// Encode data as Flate (zlib) at the default level.
pub fn flateencode(data: &[u8]) -> Vec<u8> {
    let mut encoder =
        flate2::write::ZlibEncoder::new(Vec::with_capacity(data.len() / 2), flate2::Compression::default());
    // writing to a Vec cannot fail
    let _ = encoder.write_all(data);
    encoder.finish().unwrap_or_default()
}

/// Best-effort zlib decompression for corrupted streams: feed one byte at
/// a time and return the output produced up to the first failure.
fn decompress_corrupted(data: &[u8]) -> Vec<u8> {
    use flate2::{Decompress, FlushDecompress, Status};
    let mut decoder = Decompress::new(true);
    let mut out = Vec::with_capacity(data.len() * 2);
    let mut buf = [0u8; 4096];
    let mut i = 0usize;
    while i < data.len() {
        let before_out = decoder.total_out();
        let before_in = decoder.total_in();
        let res = decoder.decompress(&data[i..i + 1], &mut buf, FlushDecompress::None);
        let produced = (decoder.total_out() - before_out) as usize;
        if produced > 0 {
            out.extend_from_slice(&buf[..produced]);
        }
        let consumed = (decoder.total_in() - before_in) as usize;
        i += consumed.max(1);
        match res {
            Ok(Status::StreamEnd) | Err(_) => break,
            Ok(_) => {}
        }
    }
    out
}

fn paeth_predictor(left: u8, above: u8, upper_left: u8) -> u8 {
    let p = left as i16 + above as i16 - upper_left as i16;
    let pa = (p - left as i16).abs();
    let pb = (p - above as i16).abs();
    let pc = (p - upper_left as i16).abs();
    if pa <= pb && pa <= pc {
        left
    } else if pb <= pc {
        above
    } else {
        upper_left
    }
}

/// Reverse PNG row prediction. Each row carries a leading filter byte;
/// rows short of a full record are dropped.
pub fn apply_png_predictor(
    data: &[u8],
    columns: usize,
    colors: usize,
    bits_per_component: usize,
) -> Result<Vec<u8>> {
    let row_bytes = colors * columns * bits_per_component / 8;
    let bpp = std::cmp::max(1, colors * bits_per_component / 8);
    let row_size = row_bytes + 1;
    if row_bytes == 0 {
        return Ok(Vec::new());
    }

    let mut result = Vec::with_capacity(data.len());
    let mut prev_row = vec![0u8; row_bytes];

    for row_start in (0..data.len()).step_by(row_size) {
        if row_start + row_size > data.len() {
            break;
        }
        let filter_type = data[row_start];
        let row_data = &data[row_start + 1..row_start + row_size];
        let mut current_row = vec![0u8; row_bytes];

        match filter_type {
            0 => current_row.copy_from_slice(row_data),
            1 => {
                for i in 0..row_bytes {
                    let left = if i >= bpp { current_row[i - bpp] } else { 0 };
                    current_row[i] = row_data[i].wrapping_add(left);
                }
            }
            2 => {
                for i in 0..row_bytes {
                    current_row[i] = row_data[i].wrapping_add(prev_row[i]);
                }
            }
            3 => {
                for i in 0..row_bytes {
                    let left = if i >= bpp {
                        current_row[i - bpp] as u16
                    } else {
                        0
                    };
                    let above = prev_row[i] as u16;
                    current_row[i] = row_data[i].wrapping_add(((left + above) / 2) as u8);
                }
            }
            4 => {
                for i in 0..row_bytes {
                    let left = if i >= bpp { current_row[i - bpp] } else { 0 };
                    let above = prev_row[i];
                    let upper_left = if i >= bpp { prev_row[i - bpp] } else { 0 };
                    current_row[i] = row_data[i].wrapping_add(paeth_predictor(left, above, upper_left));
                }
            }
            _ => current_row.copy_from_slice(row_data),
        }

        result.extend_from_slice(&current_row);
        prev_row = current_row;
    }

    Ok(result)
}

/// Expand a filter abbreviation to its full name.
fn normalize_filter_name(name: &str) -> SmolStr {
    match name {
        "Fl" => SmolStr::new_static("FlateDecode"),
        "LZW" => SmolStr::new_static("LZWDecode"),
        "AHx" => SmolStr::new_static("ASCIIHexDecode"),
        "A85" => SmolStr::new_static("ASCII85Decode"),
        "RL" => SmolStr::new_static("RunLengthDecode"),
        "CCF" => SmolStr::new_static("CCITTFaxDecode"),
        "DCT" => SmolStr::new_static("DCTDecode"),
        other => SmolStr::new(other),
    }
}

fn parms_at(parms: Option<&PdfObject>, index: usize, chain_len: usize) -> Option<PdfDict> {
    match parms {
        Some(PdfObject::Dict(d)) if chain_len == 1 => Some(d.clone()),
        Some(PdfObject::Array(arr)) => match arr.get(index) {
            Some(PdfObject::Dict(d)) => Some(d.clone()),
            _ => None,
        },
        Some(PdfObject::Dict(d)) if index == 0 => Some(d.clone()),
        _ => None,
    }
}

/// The normalized filter chain of a stream, outermost first, each paired
/// with its decode parms.
pub fn filter_chain(stream: &PdfStream) -> Vec<(SmolStr, Option<PdfDict>)> {
    let filter = stream.get_any(&["Filter", "F"]);
    let parms = stream.get_any(&["DecodeParms", "DP"]);
    let names: Vec<SmolStr> = match filter {
        Some(PdfObject::Name(n)) => vec![normalize_filter_name(n)],
        Some(PdfObject::Array(arr)) => arr
            .iter()
            .filter_map(|o| match o {
                PdfObject::Name(n) => Some(normalize_filter_name(n)),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };
    let len = names.len();
    names
        .into_iter()
        .enumerate()
        .map(|(i, n)| (n, parms_at(parms, i, len)))
        .collect()
}

/// True when the name is an image codec rather than a transport filter.
pub fn is_image_filter(name: &str) -> bool {
    matches!(
        name,
        "DCTDecode" | "JPXDecode" | "JBIG2Decode" | "CCITTFaxDecode"
    )
}

/// Apply one transport filter, including any PNG predictor its parms
/// declare. Image codecs are refused.
pub fn apply_filter(name: &str, data: &[u8], parms: Option<&PdfDict>) -> Result<Vec<u8>> {
    let mut out = match name {
        "FlateDecode" => flatedecode(data)?,
        "LZWDecode" => {
            let early = parms
                .and_then(|p| p.get("EarlyChange"))
                .and_then(|o| o.as_i64().ok())
                .unwrap_or(1);
            lzwdecode_with_earlychange(data, early as i32)?
        }
        "ASCIIHexDecode" => asciihexdecode(data)?,
        "ASCII85Decode" => ascii85decode(data)?,
        "RunLengthDecode" => rldecode(data)?,
        other if is_image_filter(other) => {
            return Err(CleanupError::UnsupportedImageFormat(other.to_string()));
        }
        other => return Err(CleanupError::DecodeError(format!("unknown filter {other}"))),
    };

    if matches!(name, "FlateDecode" | "LZWDecode")
        && let Some(parms) = parms
    {
        let predictor = parms
            .get("Predictor")
            .and_then(|o| o.as_i64().ok())
            .unwrap_or(1);
        if predictor >= 10 {
            let columns = parms
                .get("Columns")
                .and_then(|o| o.as_i64().ok())
                .unwrap_or(1) as usize;
            let colors = parms
                .get("Colors")
                .and_then(|o| o.as_i64().ok())
                .unwrap_or(1) as usize;
            let bits = parms
                .get("BitsPerComponent")
                .and_then(|o| o.as_i64().ok())
                .unwrap_or(8) as usize;
            out = apply_png_predictor(&out, columns, colors, bits)?;
        }
    }
    Ok(out)
}

/// Decode a stream through its whole filter chain. An image codec in the
/// chain yields [`CleanupError::UnsupportedImageFormat`].
pub fn decode_stream(stream: &PdfStream) -> Result<Vec<u8>> {
    let mut data = stream.rawdata().to_vec();
    for (name, parms) in filter_chain(stream) {
        data = apply_filter(&name, &data, parms.as_ref())?;
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_flate_round_trip() {
        let data = b"q 1 0 0 1 10 20 cm /Im0 Do Q".repeat(20);
        let encoded = flateencode(&data);
        assert!(encoded.len() < data.len());
        assert_eq!(flatedecode(&encoded).unwrap(), data);
    }

    #[test]
    fn test_flate_corrupt_tail_keeps_prefix() {
        let data = b"hello hello hello hello hello".to_vec();
        let mut encoded = flateencode(&data);
        let n = encoded.len();
        encoded.truncate(n - 4);
        let out = flatedecode(&encoded).unwrap();
        assert!(data.starts_with(&out) || out.is_empty() || data == out);
    }

    #[test]
    fn test_png_predictor_up() {
        // two rows of 3 bytes, filter type 2 (Up)
        let data = [0u8, 1, 2, 3, 2, 1, 1, 1];
        let out = apply_png_predictor(&data, 3, 1, 8).unwrap();
        assert_eq!(out, vec![1, 2, 3, 2, 3, 4]);
    }

    #[test]
    fn test_filter_chain_normalizes_abbreviations() {
        let mut attrs = PdfDict::default();
        attrs.insert(
            "F".into(),
            PdfObject::Array(vec![PdfObject::name("AHx"), PdfObject::name("Fl")]),
        );
        let stream = PdfStream::new(attrs, Bytes::new());
        let chain = filter_chain(&stream);
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].0, "ASCIIHexDecode");
        assert_eq!(chain[1].0, "FlateDecode");
    }

    #[test]
    fn test_decode_stream_stops_on_image_codec() {
        let mut attrs = PdfDict::default();
        attrs.insert("Filter".into(), PdfObject::name("DCTDecode"));
        let stream = PdfStream::new(attrs, Bytes::from_static(b"\xff\xd8"));
        match decode_stream(&stream) {
            Err(CleanupError::UnsupportedImageFormat(name)) => assert_eq!(name, "DCTDecode"),
            other => panic!("expected UnsupportedImageFormat, got {other:?}"),
        }
    }
}
