//! tacha - surgical removal of content from PDF page streams.
//!
//! Erases everything that intersects caller-chosen regions: path fills
//! and strokes, text at glyph granularity, raster image samples, form
//! XObjects, and the annotations above them. Operators the regions do
//! not touch are carried into the rewritten stream byte for byte.
//!
//! # Example
//!
//! ```ignore
//! use tacha_core::{CleanupLocation, CleanupProperties, clean_up};
//!
//! let locations = vec![CleanupLocation::new(0, (100.0, 500.0, 300.0, 550.0))];
//! clean_up(&mut document, &locations, &CleanupProperties::new())?;
//! ```

pub mod canvas;
pub mod cleanup;
pub mod codec;
pub mod document;
pub mod error;
pub mod font;
pub mod geometry;
pub mod model;
pub mod parser;
pub mod utils;

// Re-export the main entry points for convenience
pub use cleanup::{
    CleanupLocation, CleanupProperties, CompositeSweepStrategy, RegexSweepStrategy, SweepStrategy,
    auto_sweep, clean_up, clean_up_redact_annotations, sweep_locations,
};
pub use document::{AccessMode, Document, Page};
pub use error::{CleanupError, Result};
