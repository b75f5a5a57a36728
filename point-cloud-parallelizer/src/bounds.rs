/// Axis-aligned 2D bounds for tiling and crop geometry
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    /// Create bounds, rejecting degenerate or non-finite rectangles
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Result<Self> {
        let bounds = Self {
            min_x,
            min_y,
            max_x,
            max_y,
        };
        bounds.validate()?;
        Ok(bounds)
    }

    /// Check `min < max` on both axes
    pub fn validate(&self) -> Result<()> {
        let finite = [self.min_x, self.min_y, self.max_x, self.max_y]
            .iter()
            .all(|v| v.is_finite());
        if !finite || self.min_x >= self.max_x || self.min_y >= self.max_y {
            return Err(Error::InvalidExtent(format!(
                "bounds {} must satisfy min < max on both axes",
                self
            )));
        }
        Ok(())
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Grow outward by `(dx, dy)` on all four sides
    pub fn expanded(&self, buffer: (f64, f64)) -> Result<Self> {
        Self::new(
            self.min_x - buffer.0,
            self.min_y - buffer.1,
            self.max_x + buffer.0,
            self.max_y + buffer.1,
        )
    }

    /// Shrink inward by `(dx, dy)` on all four sides
    pub fn contracted(&self, buffer: (f64, f64)) -> Result<Self> {
        Self::new(
            self.min_x + buffer.0,
            self.min_y + buffer.1,
            self.max_x - buffer.0,
            self.max_y - buffer.1,
        )
    }

    /// Overlapping region of two bounds, if it has a non-empty interior
    pub fn intersection(&self, other: &Bounds) -> Option<Self> {
        Self::new(
            self.min_x.max(other.min_x),
            self.min_y.max(other.min_y),
            self.max_x.min(other.max_x),
            self.max_y.min(other.max_y),
        )
        .ok()
    }

    /// Default tile name taken from the truncated origin
    pub fn origin_name(&self) -> String {
        format!("{}_{}", self.min_x.floor() as i64, self.min_y.floor() as i64)
    }

    /// PDAL `filters.crop` bounds expression
    pub fn crop_expression(&self) -> String {
        format!(
            "([{}, {}], [{}, {}])",
            self.min_x, self.max_x, self.min_y, self.max_y
        )
    }
}

impl std::fmt::Display for Bounds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({:.2}, {:.2}) to ({:.2}, {:.2})",
            self.min_x, self.min_y, self.max_x, self.max_y
        )
    }
}
