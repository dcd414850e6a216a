//! Raster redaction: clearing image samples under cleanup regions.
//!
//! Regions arrive in normalized image space (the unit square the image maps
//! onto, y up). Device-gray images whose filter chain we can decode losslessly
//! are edited at the bit level and keep their dictionary; everything else is
//! decoded to 8-bit samples, cleared, and re-encoded as Flate. Either way the
//! cleared sample value is 0.
//!
//! Filtering the same image against the same region set is pure, so results
//! are memoized in [`FilteredImagesCache`], keyed by stream identity plus the
//! quantized region set.

use byteorder::{BigEndian, ByteOrder};
use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use tracing::debug;

use crate::codec::{apply_filter, decode_stream, filter_chain, flateencode, is_image_filter};
use crate::error::{CleanupError, Result};
use crate::model::{PdfDict, PdfObject, PdfStream};
use crate::utils::{CLEANUP_EPSILON, Rect, normalize_rect};

/// Outcome of filtering one image against a region set.
#[derive(Debug, Clone, PartialEq)]
pub enum FilteredImage {
    /// Fully covered: the draw is dropped.
    Removed,
    /// No region touches the image: pass the original through.
    Untouched,
    /// Partially covered: replacement stream with cleared samples.
    Replaced(PdfStream),
}

/// Cache key: stream identity plus the region set snapped to a 1e-4 grid
/// and sorted, so operand formatting noise cannot split entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FilteredImageKey {
    uid: u64,
    regions: Vec<[i64; 4]>,
}

impl FilteredImageKey {
    pub fn new(image: &PdfStream, regions: &[Rect]) -> Self {
        let quantize = |v: f64| (v / CLEANUP_EPSILON).round() as i64;
        let mut quantized: Vec<[i64; 4]> = regions
            .iter()
            .map(|r| [quantize(r.0), quantize(r.1), quantize(r.2), quantize(r.3)])
            .collect();
        quantized.sort_unstable();
        Self {
            uid: image.uid(),
            regions: quantized,
        }
    }
}

/// Memo of already-filtered images for one cleanup run.
///
/// Owned by the orchestrator and lent to each page's processor, so a
/// resource shared across pages is filtered once per region set.
#[derive(Debug, Default)]
pub struct FilteredImagesCache {
    entries: FxHashMap<FilteredImageKey, FilteredImage>,
}

impl FilteredImagesCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn retrieve(&self, key: &FilteredImageKey) -> Option<&FilteredImage> {
        self.entries.get(key)
    }

    pub fn store(&mut self, key: FilteredImageKey, image: FilteredImage) {
        self.entries.insert(key, image);
    }
}

/// Filter `image` against cleanup regions in normalized image space.
///
/// `None` means the image is fully covered; `Some(&[])` means nothing
/// touches it. Masks attached via `/SMask` or a stream-typed `/Mask`
/// are filtered against the same regions; color-key mask arrays copy
/// through untouched.
pub fn filter_image(image: &PdfStream, regions: Option<&[Rect]>) -> Result<FilteredImage> {
    let Some(regions) = regions else {
        return Ok(FilteredImage::Removed);
    };
    if regions.is_empty() {
        return Ok(FilteredImage::Untouched);
    }

    let mut replaced = if direct_path_applies(image) {
        filter_direct(image, regions)?
    } else {
        filter_general(image, regions)?
    };
    filter_masks(&mut replaced.attrs, regions)?;
    Ok(FilteredImage::Replaced(replaced))
}

/// Variant for inline images, which are always rebuilt as 8-bit
/// flate-compressed samples regardless of their source encoding. Inline
/// dictionaries use abbreviated keys and never share streams, so the
/// direct bit-editing path and the cache buy nothing here.
pub fn filter_inline_image(image: &PdfStream, regions: Option<&[Rect]>) -> Result<FilteredImage> {
    let Some(regions) = regions else {
        return Ok(FilteredImage::Removed);
    };
    if regions.is_empty() {
        return Ok(FilteredImage::Untouched);
    }
    let replaced = filter_general(image, regions)?;
    Ok(FilteredImage::Replaced(replaced))
}

/// Cache-aware wrapper around [`filter_image`].
pub fn filter_image_cached(
    cache: &mut FilteredImagesCache,
    image: &PdfStream,
    regions: Option<&[Rect]>,
) -> Result<FilteredImage> {
    let Some(regions) = regions else {
        return Ok(FilteredImage::Removed);
    };
    if regions.is_empty() {
        return Ok(FilteredImage::Untouched);
    }
    let key = FilteredImageKey::new(image, regions);
    if let Some(hit) = cache.retrieve(&key) {
        debug!(uid = image.uid(), "image filter cache hit");
        return Ok(hit.clone());
    }
    let filtered = filter_image(image, Some(regions))?;
    cache.store(key, filtered.clone());
    Ok(filtered)
}

fn filter_masks(attrs: &mut PdfDict, regions: &[Rect]) -> Result<()> {
    for key in ["SMask", "Mask"] {
        let mask = match attrs.get(key) {
            Some(PdfObject::Stream(s)) => s.as_ref().clone(),
            _ => continue,
        };
        if let FilteredImage::Replaced(filtered) = filter_image(&mask, Some(regions))? {
            attrs.insert(SmolStr::new(key), PdfObject::Stream(Box::new(filtered)));
        }
    }
    Ok(())
}

/// Bit-level editing applies to device-gray (or colorspace-less) images
/// whose filter chain decodes losslessly.
fn direct_path_applies(image: &PdfStream) -> bool {
    let gray = match image.get_any(&["ColorSpace", "CS"]) {
        None => true,
        Some(obj) => matches!(obj.as_name(), Ok("DeviceGray" | "G")),
    };
    gray && filter_chain(image).iter().all(|(name, _)| {
        !matches!(name.as_str(), "DCTDecode" | "JPXDecode" | "JBIG2Decode")
    })
}

fn required_usize(image: &PdfStream, names: &[&str], key: &'static str) -> Result<usize> {
    image
        .get_any(names)
        .and_then(|obj| obj.as_i64().ok())
        .filter(|&n| n > 0)
        .map(|n| n as usize)
        .ok_or(CleanupError::MissingRequiredAttribute { key })
}

type Range = std::ops::Range<usize>;

/// Pixel bounds of one normalized region, inflated by the cleanup epsilon
/// so regions computed from the same edge always cover its pixels. Rows
/// come back top-down, matching sample order.
fn pixel_bounds(region: Rect, width: usize, height: usize) -> Option<(Range, Range)> {
    let (x0, y0, x1, y1) = normalize_rect(region);
    let (w, h) = (width as f64, height as f64);
    let clamp = |v: f64, hi: usize| (v.max(0.0) as usize).min(hi);

    let col_start = clamp((x0 * w - CLEANUP_EPSILON).ceil(), width);
    let col_end = clamp((x1 * w + CLEANUP_EPSILON).floor(), width);
    let row_start = clamp(h - (y1 * h + CLEANUP_EPSILON).floor(), height);
    let row_end = clamp(h - (y0 * h - CLEANUP_EPSILON).ceil(), height);
    if col_start >= col_end || row_start >= row_end {
        return None;
    }
    Some((col_start..col_end, row_start..row_end))
}

/// Clear sample bits in place, preserving bit depth and row padding.
fn clear_samples(
    samples: &mut [u8],
    width: usize,
    height: usize,
    bpc: usize,
    components: usize,
    regions: &[Rect],
) {
    let row_bytes = (width * components * bpc).div_ceil(8);
    for &region in regions {
        let Some((cols, rows)) = pixel_bounds(region, width, height) else {
            continue;
        };
        for row in rows {
            let base = row * row_bytes;
            if base + row_bytes > samples.len() {
                // truncated sample data: clear what exists
                break;
            }
            for col in cols.clone() {
                for comp in 0..components {
                    let sample = col * components + comp;
                    match bpc {
                        8 => samples[base + sample] = 0,
                        16 => BigEndian::write_u16(
                            &mut samples[base + sample * 2..base + sample * 2 + 2],
                            0,
                        ),
                        _ => {
                            let bit = sample * bpc;
                            let shift = 8 - bpc - (bit % 8);
                            let mask = (((1u16 << bpc) - 1) as u8) << shift;
                            samples[base + bit / 8] &= !mask;
                        }
                    }
                }
            }
        }
    }
}

/// Direct path: decode the transport filters, clear bits, Flate re-encode,
/// keep the dictionary.
fn filter_direct(image: &PdfStream, regions: &[Rect]) -> Result<PdfStream> {
    let width = required_usize(image, &["Width", "W"], "Width")?;
    let height = required_usize(image, &["Height", "H"], "Height")?;
    let bpc = if is_stencil_mask(image) {
        1
    } else {
        required_usize(image, &["BitsPerComponent", "BPC"], "BitsPerComponent")?
    };
    if !matches!(bpc, 1 | 2 | 4 | 8 | 16) {
        return Err(CleanupError::UnsupportedImageFormat(format!(
            "{bpc} bits per component"
        )));
    }

    let mut samples = decode_stream(image)?;
    clear_samples(&mut samples, width, height, bpc, 1, regions);

    let mut attrs = image.attrs.clone();
    strip_filter_keys(&mut attrs);
    let encoded = flateencode(&samples);
    attrs.insert(SmolStr::new("Filter"), PdfObject::name("FlateDecode"));
    attrs.insert(SmolStr::new("Length"), PdfObject::Int(encoded.len() as i64));
    Ok(PdfStream::new(attrs, encoded))
}

fn is_stencil_mask(image: &PdfStream) -> bool {
    image
        .get_any(&["ImageMask", "IM"])
        .and_then(|obj| obj.as_bool().ok())
        .unwrap_or(false)
}

fn strip_filter_keys(attrs: &mut PdfDict) {
    for key in ["Filter", "F", "DecodeParms", "DP", "Length"] {
        attrs.shift_remove(key);
    }
}

/// General path: decode to 8-bit gray or RGB, clear pixels, rebuild the
/// dictionary around a Flate stream.
fn filter_general(image: &PdfStream, regions: &[Rect]) -> Result<PdfStream> {
    let (width, height, mut pixels, components) = decode_raster(image)?;
    clear_samples(&mut pixels, width, height, 8, components, regions);

    let mut attrs = image.attrs.clone();
    strip_filter_keys(&mut attrs);
    for key in [
        "Decode",
        "D",
        "BitsPerComponent",
        "BPC",
        "ColorSpace",
        "CS",
        "Width",
        "W",
        "Height",
        "H",
    ] {
        attrs.shift_remove(key);
    }
    attrs.insert(SmolStr::new("Width"), PdfObject::Int(width as i64));
    attrs.insert(SmolStr::new("Height"), PdfObject::Int(height as i64));
    attrs.insert(SmolStr::new("BitsPerComponent"), PdfObject::Int(8));
    attrs.insert(
        SmolStr::new("ColorSpace"),
        PdfObject::name(if components == 1 {
            "DeviceGray"
        } else {
            "DeviceRGB"
        }),
    );
    let encoded = flateencode(&pixels);
    attrs.insert(SmolStr::new("Filter"), PdfObject::name("FlateDecode"));
    attrs.insert(SmolStr::new("Length"), PdfObject::Int(encoded.len() as i64));
    Ok(PdfStream::new(attrs, encoded))
}

/// Decode any supported image to packed 8-bit samples.
///
/// Returns `(width, height, samples, components)` with `components` 1 for
/// gray and 3 for RGB.
fn decode_raster(image: &PdfStream) -> Result<(usize, usize, Vec<u8>, usize)> {
    let chain = filter_chain(image);

    if chain.iter().any(|(name, _)| name == "DCTDecode") {
        // strip transport filters wrapped around the JPEG, then hand the
        // remaining bytes to the JPEG decoder
        let mut data = image.rawdata().to_vec();
        for (name, parms) in &chain {
            if name == "DCTDecode" {
                return decode_jpeg(&data);
            }
            data = apply_filter(name, &data, parms.as_ref())?;
        }
        return Err(CleanupError::UnsupportedImageFormat(
            "DCTDecode chain".to_string(),
        ));
    }
    if let Some((name, _)) = chain.iter().find(|(name, _)| is_image_filter(name)) {
        return Err(CleanupError::UnsupportedImageFormat(name.to_string()));
    }

    let width = required_usize(image, &["Width", "W"], "Width")?;
    let height = required_usize(image, &["Height", "H"], "Height")?;
    let stencil = is_stencil_mask(image);
    let bpc = if stencil {
        1
    } else {
        required_usize(image, &["BitsPerComponent", "BPC"], "BitsPerComponent")?
    };
    let components = if stencil {
        1
    } else {
        match image.get_any(&["ColorSpace", "CS"]) {
            None => 1,
            Some(obj) => match obj.as_name() {
                Ok("DeviceGray" | "G" | "CalGray") => 1,
                Ok("DeviceRGB" | "RGB" | "CalRGB") => 3,
                Ok(other) => {
                    return Err(CleanupError::UnsupportedImageFormat(other.to_string()));
                }
                Err(_) => {
                    return Err(CleanupError::UnsupportedImageFormat(
                        "non-name colorspace".to_string(),
                    ));
                }
            },
        }
    };

    let samples = decode_stream(image)?;
    let pixels = expand_to_8bit(&samples, width, height, components, bpc)?;
    Ok((width, height, pixels, components))
}

fn decode_jpeg(data: &[u8]) -> Result<(usize, usize, Vec<u8>, usize)> {
    let decoded = image::load_from_memory_with_format(data, image::ImageFormat::Jpeg)
        .map_err(|e| CleanupError::DecodeError(e.to_string()))?;
    let (w, h) = (decoded.width() as usize, decoded.height() as usize);
    match decoded.color() {
        image::ColorType::L8 | image::ColorType::L16 | image::ColorType::La8
        | image::ColorType::La16 => Ok((w, h, decoded.to_luma8().into_raw(), 1)),
        _ => Ok((w, h, decoded.to_rgb8().into_raw(), 3)),
    }
}

/// Repack raw samples as one byte per component, dropping row padding.
fn expand_to_8bit(
    samples: &[u8],
    width: usize,
    height: usize,
    components: usize,
    bpc: usize,
) -> Result<Vec<u8>> {
    let row_samples = width * components;
    let row_bytes = (row_samples * bpc).div_ceil(8);
    let mut out = vec![0u8; row_samples * height];

    match bpc {
        8 => {
            for row in 0..height {
                let src = row * row_bytes;
                if src + row_samples > samples.len() {
                    break;
                }
                out[row * row_samples..(row + 1) * row_samples]
                    .copy_from_slice(&samples[src..src + row_samples]);
            }
        }
        16 => {
            for row in 0..height {
                for s in 0..row_samples {
                    let src = row * row_bytes + s * 2;
                    if src + 2 > samples.len() {
                        break;
                    }
                    out[row * row_samples + s] = (BigEndian::read_u16(&samples[src..src + 2]) >> 8) as u8;
                }
            }
        }
        1 | 2 | 4 => {
            let max = ((1u16 << bpc) - 1) as u8;
            for row in 0..height {
                let base = row * row_bytes;
                for s in 0..row_samples {
                    let bit = s * bpc;
                    let Some(&byte) = samples.get(base + bit / 8) else {
                        break;
                    };
                    let shift = 8 - bpc - (bit % 8);
                    let value = (byte >> shift) & max;
                    out[row * row_samples + s] = (value as u16 * 255 / max as u16) as u8;
                }
            }
        }
        other => {
            return Err(CleanupError::UnsupportedImageFormat(format!(
                "{other} bits per component"
            )));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::flatedecode;

    fn gray_image(width: usize, height: usize, fill: u8) -> PdfStream {
        let mut attrs = PdfDict::new();
        attrs.insert("Width".into(), PdfObject::Int(width as i64));
        attrs.insert("Height".into(), PdfObject::Int(height as i64));
        attrs.insert("BitsPerComponent".into(), PdfObject::Int(8));
        attrs.insert("Filter".into(), PdfObject::name("FlateDecode"));
        PdfStream::new(attrs, flateencode(&vec![fill; width * height]))
    }

    #[test]
    fn test_full_and_empty_coverage() {
        let img = gray_image(4, 4, 200);
        assert_eq!(filter_image(&img, None).unwrap(), FilteredImage::Removed);
        assert_eq!(
            filter_image(&img, Some(&[])).unwrap(),
            FilteredImage::Untouched
        );
    }

    #[test]
    fn test_direct_path_clears_left_half() {
        let img = gray_image(100, 100, 255);
        let out = filter_image(&img, Some(&[(0.0, 0.0, 0.5, 1.0)])).unwrap();
        let FilteredImage::Replaced(stream) = out else {
            panic!("expected a replacement stream");
        };
        let samples = flatedecode(stream.rawdata()).unwrap();
        assert_eq!(samples.len(), 100 * 100);
        for row in 0..100 {
            for col in 0..100 {
                let v = samples[row * 100 + col];
                if col < 50 {
                    assert_eq!(v, 0, "cleared at ({row},{col})");
                } else {
                    assert_eq!(v, 255, "untouched at ({row},{col})");
                }
            }
        }
        // dictionary keeps its shape, data is Flate again
        assert_eq!(
            stream.get("Filter").unwrap().as_name().unwrap(),
            "FlateDecode"
        );
        assert_eq!(stream.get("BitsPerComponent").unwrap().as_i64().unwrap(), 8);
    }

    #[test]
    fn test_direct_path_one_bit_rows_top_down() {
        // 8x4, all ones; clear the top half (y in [0.5, 1.0])
        let mut attrs = PdfDict::new();
        attrs.insert("Width".into(), PdfObject::Int(8));
        attrs.insert("Height".into(), PdfObject::Int(4));
        attrs.insert("BitsPerComponent".into(), PdfObject::Int(1));
        let img = PdfStream::new(attrs, vec![0xffu8; 4]);
        let out = filter_image(&img, Some(&[(0.0, 0.5, 1.0, 1.0)])).unwrap();
        let FilteredImage::Replaced(stream) = out else {
            panic!("expected a replacement stream");
        };
        let samples = flatedecode(stream.rawdata()).unwrap();
        // rows are stored top-down: the top half is the first two rows
        assert_eq!(samples, vec![0x00, 0x00, 0xff, 0xff]);
    }

    #[test]
    fn test_missing_dimensions_fatal() {
        let mut attrs = PdfDict::new();
        attrs.insert("Width".into(), PdfObject::Int(4));
        let img = PdfStream::new(attrs, vec![0u8; 4]);
        let err = filter_image(&img, Some(&[(0.0, 0.0, 1.0, 1.0)])).unwrap_err();
        assert!(matches!(
            err,
            CleanupError::MissingRequiredAttribute { key: "Height" }
        ));
    }

    #[test]
    fn test_rgb_goes_general_path() {
        let mut attrs = PdfDict::new();
        attrs.insert("Width".into(), PdfObject::Int(2));
        attrs.insert("Height".into(), PdfObject::Int(2));
        attrs.insert("BitsPerComponent".into(), PdfObject::Int(8));
        attrs.insert("ColorSpace".into(), PdfObject::name("DeviceRGB"));
        let img = PdfStream::new(attrs, vec![10u8; 12]);
        let out = filter_image(&img, Some(&[(0.5, 0.0, 1.0, 1.0)])).unwrap();
        let FilteredImage::Replaced(stream) = out else {
            panic!("expected a replacement stream");
        };
        let pixels = flatedecode(stream.rawdata()).unwrap();
        // right column cleared in all three components
        assert_eq!(pixels, vec![10, 10, 10, 0, 0, 0, 10, 10, 10, 0, 0, 0]);
        assert_eq!(
            stream.get("ColorSpace").unwrap().as_name().unwrap(),
            "DeviceRGB"
        );
    }

    #[test]
    fn test_unsupported_colorspace_fatal() {
        let mut attrs = PdfDict::new();
        attrs.insert("Width".into(), PdfObject::Int(2));
        attrs.insert("Height".into(), PdfObject::Int(2));
        attrs.insert("BitsPerComponent".into(), PdfObject::Int(8));
        attrs.insert("ColorSpace".into(), PdfObject::name("DeviceCMYK"));
        let img = PdfStream::new(attrs, vec![0u8; 16]);
        let err = filter_image(&img, Some(&[(0.0, 0.0, 1.0, 1.0)])).unwrap_err();
        assert!(matches!(err, CleanupError::UnsupportedImageFormat(_)));
    }

    #[test]
    fn test_smask_filtered_with_image() {
        let mut base = gray_image(4, 4, 128);
        let smask = gray_image(4, 4, 255);
        base.attrs
            .insert("SMask".into(), PdfObject::Stream(Box::new(smask)));
        let out = filter_image(&base, Some(&[(0.0, 0.0, 1.0, 1.0)])).unwrap();
        let FilteredImage::Replaced(stream) = out else {
            panic!("expected a replacement stream");
        };
        let mask = stream.get("SMask").unwrap().as_stream().unwrap();
        let mask_samples = flatedecode(mask.rawdata()).unwrap();
        assert!(mask_samples.iter().all(|&v| v == 0), "mask cleared too");
    }

    #[test]
    fn test_cache_returns_identical_result() {
        let mut cache = FilteredImagesCache::new();
        let img = gray_image(8, 8, 77);
        let regions = [(0.25, 0.25, 0.75, 0.75)];
        let first = filter_image_cached(&mut cache, &img, Some(&regions)).unwrap();
        assert_eq!(cache.len(), 1);
        let second = filter_image_cached(&mut cache, &img, Some(&regions)).unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.len(), 1, "second call must be a hit");

        // region order and sub-epsilon jitter hit the same entry
        let jittered = [(0.25 + 1e-6, 0.25, 0.75, 0.75 - 1e-6)];
        filter_image_cached(&mut cache, &img, Some(&jittered)).unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_distinguishes_region_sets() {
        let mut cache = FilteredImagesCache::new();
        let img = gray_image(8, 8, 77);
        filter_image_cached(&mut cache, &img, Some(&[(0.0, 0.0, 0.5, 1.0)])).unwrap();
        filter_image_cached(&mut cache, &img, Some(&[(0.5, 0.0, 1.0, 1.0)])).unwrap();
        assert_eq!(cache.len(), 2);
    }
}
