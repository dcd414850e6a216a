//! The cleanup pipeline, from caller-facing configuration down to the
//! per-page content stream rewriter.
//!
//! This module contains:
//! - `location`: cleanup locations and run properties
//! - `orchestrator`: whole-document passes over locations and Redact annotations
//! - `processor`: the per-page content stream rewriter
//! - `text`: glyph decomposition and positioning coalescing
//! - `stroke`: stroke outline to fill-envelope conversion
//! - `image_filter`: masking of image samples under regions, with caching
//! - `annotations`: removal of annotations overlapping regions
//! - `sweep`: pattern-driven location discovery

pub mod annotations;
pub mod image_filter;
pub mod location;
pub mod orchestrator;
pub mod processor;
pub mod stroke;
pub mod sweep;
pub mod text;

// Re-export main types for convenience
pub use annotations::{AnnotationFilter, REMOVE_ANNOT_ON_PARTIAL_OVERLAP};
pub use image_filter::{
    FilteredImage, FilteredImageKey, FilteredImagesCache, filter_image, filter_image_cached,
    filter_inline_image,
};
pub use location::{
    CleanupLocation, CleanupProperties, DEFAULT_ARC_TOLERANCE, OffsetProperties,
};
pub use orchestrator::{clean_up, clean_up_redact_annotations};
pub use processor::{ContentStreamProcessor, ProcessedContent};
pub use stroke::stroke_to_fill;
pub use sweep::{
    CompositeSweepStrategy, RegexSweepStrategy, SweepStrategy, SweptGlyph, auto_sweep,
    scan_page, sweep_locations,
};
pub use text::{GlyphRenderInfo, TextPositioningTracker, decompose_run};
