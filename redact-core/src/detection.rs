use std::fmt;

use redact_utils::PerCategory;
use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// The x-coordinate of the top-left corner.
    pub x: f32,
    /// The y-coordinate of the top-left corner.
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle spanning two corners given in any order.
    pub fn from_corners(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        let (left, right) = if x1 <= x2 { (x1, x2) } else { (x2, x1) };
        let (top, bottom) = if y1 <= y2 { (y1, y2) } else { (y2, y1) };
        Self::new(left, top, right - left, bottom - top)
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width * 0.5, self.y + self.height * 0.5)
    }

    /// Area, treating negative extents as empty.
    pub fn area(&self) -> f32 {
        (self.width.max(0.0)) * (self.height.max(0.0))
    }

    /// `true` for finite boxes with strictly positive width and height.
    pub fn is_valid(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
            && self.width > 0.0
            && self.height > 0.0
    }

    /// Multiply every coordinate by `factor` (maps between resampled spaces).
    pub fn scaled(&self, factor: f32) -> Self {
        Self::new(
            self.x * factor,
            self.y * factor,
            self.width * factor,
            self.height * factor,
        )
    }

    /// Same centre, width and height multiplied independently.
    pub fn expanded_about_center(&self, width_factor: f32, height_factor: f32) -> Self {
        let (cx, cy) = self.center();
        let width = self.width * width_factor;
        let height = self.height * height_factor;
        Self::new(cx - width * 0.5, cy - height * 0.5, width, height)
    }

    /// Overlap with the rectangle `(0, 0)..(width, height)`, or `None` when the two
    /// do not share any area.
    pub fn clamped_to(&self, width: f32, height: f32) -> Option<Self> {
        let x1 = self.x.max(0.0);
        let y1 = self.y.max(0.0);
        let x2 = self.right().min(width);
        let y2 = self.bottom().min(height);
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(Self::new(x1, y1, x2 - x1, y2 - y1))
    }

    /// Intersection over Union with another bounding box.
    pub fn iou(&self, other: &Self) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = self.right().min(other.right());
        let y2 = self.bottom().min(other.bottom());

        let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        if intersection <= 0.0 {
            return 0.0;
        }

        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }
}

/// What a detection covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Face,
    Person,
    Plate,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Face, Category::Person, Category::Plate];

    /// Look up this category's entry in a per-category settings table.
    pub fn pick<T: Copy>(self, table: &PerCategory<T>) -> T {
        match self {
            Category::Face => table.face,
            Category::Person => table.person,
            Category::Plate => table.plate,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Face => "face",
            Category::Person => "person",
            Category::Plate => "plate",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A candidate region in base-image pixel space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    /// Calibrated confidence in `0.0..=1.0`.
    pub confidence: f32,
    pub category: Category,
    /// Resample factor of the pass that produced this detection (1.0 for the
    /// heuristic plate scan).
    pub source_scale: f32,
    /// Name of the detector adapter or heuristic that produced it.
    pub source_detector: String,
}

impl Detection {
    pub fn area(&self) -> f32 {
        self.bbox.area()
    }
}

/// Per-category totals surfaced to the user after redaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionCounts {
    pub faces_detected: usize,
    pub people_detected: usize,
    pub plates_detected: usize,
}

impl DetectionCounts {
    pub fn from_detections<'a, I>(detections: I) -> Self
    where
        I: IntoIterator<Item = &'a Detection>,
    {
        let mut counts = Self::default();
        for detection in detections {
            match detection.category {
                Category::Face => counts.faces_detected += 1,
                Category::Person => counts.people_detected += 1,
                Category::Plate => counts.plates_detected += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.faces_detected + self.people_detected + self.plates_detected
    }
}
