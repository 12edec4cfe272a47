//! Geometric primitives for layout analysis.
//!
//! Coordinates follow the pdfplumber convention: `x` grows rightward, `y`
//! grows downward, and a box is stored by its edges rather than by origin
//! plus size, because the safe-region invariant (`x0 <= x1`, `y0 <= y1`) and
//! the stored 4-tuple form are what the rest of the crate cares about.

use serde::{Deserialize, Serialize};

/// An axis-aligned bounding box in document space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    /// Left edge.
    pub x0: f64,
    /// Top edge.
    pub y0: f64,
    /// Right edge (`>= x0`).
    pub x1: f64,
    /// Bottom edge (`>= y0`).
    pub y1: f64,
}

impl BBox {
    /// Create a new bounding box, normalizing flipped edges.
    ///
    /// # Examples
    ///
    /// ```
    /// use lextract::geometry::BBox;
    ///
    /// let bbox = BBox::new(0.0, 0.0, 612.0, 792.0);
    /// assert_eq!(bbox.width(), 612.0);
    /// ```
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    /// Width of the box.
    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    /// Height of the box.
    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }

    /// Area of the box.
    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Whether the point `(x, y)` lies inside the box (edges inclusive).
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x0 && x <= self.x1 && y >= self.y0 && y <= self.y1
    }

    /// The box as a `[x0, y0, x1, y1]` array, the form the pattern store
    /// serializes.
    pub fn to_array(&self) -> [f64; 4] {
        [self.x0, self.y0, self.x1, self.y1]
    }

    /// Build a box from a `[x0, y0, x1, y1]` array.
    pub fn from_array(coords: [f64; 4]) -> Self {
        Self::new(coords[0], coords[1], coords[2], coords[3])
    }
}
