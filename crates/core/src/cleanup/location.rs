//! Caller-facing cleanup configuration: locations and run properties.

use crate::error::{CleanupError, Result};
use crate::model::Color;
use crate::utils::{Rect, normalize_rect};

/// Default arc tolerance for approximating round joins and caps, in user
/// units.
pub const DEFAULT_ARC_TOLERANCE: f64 = 0.0025;

/// One rectangle to erase, with an optional fill-in color painted after
/// the content underneath is gone.
///
/// `page` indexes into [`crate::document::Document::pages`]. The region is
/// axis-aligned in unrotated default user space and normalized on
/// construction.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanupLocation {
    page: usize,
    region: Rect,
    fill_color: Option<Color>,
}

impl CleanupLocation {
    pub fn new(page: usize, region: Rect) -> Self {
        Self {
            page,
            region: normalize_rect(region),
            fill_color: None,
        }
    }

    pub fn with_fill_color(page: usize, region: Rect, color: Color) -> Self {
        Self {
            page,
            region: normalize_rect(region),
            fill_color: Some(color),
        }
    }

    pub const fn page(&self) -> usize {
        self.page
    }

    pub const fn region(&self) -> Rect {
        self.region
    }

    pub const fn fill_color(&self) -> Option<Color> {
        self.fill_color
    }
}

/// Tuning for the stroke-offsetting pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OffsetProperties {
    /// Maximum deviation of a polyline arc from the true circle.
    pub arc_tolerance: f64,
    /// Scale the tolerance by half the line width, so wide strokes get
    /// proportionally coarser arcs.
    pub dynamic_multiplier: bool,
}

impl Default for OffsetProperties {
    fn default() -> Self {
        Self {
            arc_tolerance: DEFAULT_ARC_TOLERANCE,
            dynamic_multiplier: false,
        }
    }
}

/// Options for one cleanup run.
///
/// `overlap_ratio` switches glyph/annotation hit testing from "any
/// intersection" to "intersection exceeds this share of the subject's
/// area"; it must lie in (0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct CleanupProperties {
    pub overlap_ratio: Option<f64>,
    /// Run the annotation filter after rewriting each page's content.
    pub process_annotations: bool,
    pub path_offset: OffsetProperties,
}

impl Default for CleanupProperties {
    fn default() -> Self {
        Self {
            overlap_ratio: None,
            process_annotations: true,
            path_offset: OffsetProperties::default(),
        }
    }
}

impl CleanupProperties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the overlap ratio, validating the (0, 1] range eagerly.
    pub fn with_overlap_ratio(mut self, ratio: f64) -> Result<Self> {
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(CleanupError::InvalidOverlapRatio(ratio));
        }
        self.overlap_ratio = Some(ratio);
        Ok(self)
    }

    /// Re-check a possibly literal-constructed value before a run starts.
    pub fn validate(&self) -> Result<()> {
        if let Some(ratio) = self.overlap_ratio
            && !(ratio > 0.0 && ratio <= 1.0)
        {
            return Err(CleanupError::InvalidOverlapRatio(ratio));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_normalizes_region() {
        let loc = CleanupLocation::new(0, (150.0, 150.0, 100.0, 100.0));
        assert_eq!(loc.region(), (100.0, 100.0, 150.0, 150.0));
        assert_eq!(loc.fill_color(), None);
    }

    #[test]
    fn test_overlap_ratio_bounds() {
        assert!(CleanupProperties::new().with_overlap_ratio(0.5).is_ok());
        assert!(CleanupProperties::new().with_overlap_ratio(1.0).is_ok());
        assert!(matches!(
            CleanupProperties::new().with_overlap_ratio(0.0),
            Err(CleanupError::InvalidOverlapRatio(_))
        ));
        assert!(matches!(
            CleanupProperties::new().with_overlap_ratio(1.5),
            Err(CleanupError::InvalidOverlapRatio(_))
        ));
        let literal = CleanupProperties {
            overlap_ratio: Some(-2.0),
            ..CleanupProperties::default()
        };
        assert!(literal.validate().is_err());
    }
}
