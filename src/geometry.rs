//! Shared value types for the toolpath pipeline.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Identifier of one print layer.
///
/// Explicit `;LAYER:<n>` directives use `n` directly; layers introduced by
/// a bare Z word derive their id as `round(z * 100)`. Z heights closer
/// together than 5 µm collapse into the same id, an accepted lossy mapping
/// since the ids only need to preserve vertical order.
pub type LayerId = i64;

/// Layers keyed by id, iterated in ascending numeric order.
///
/// Point lists are flat with even length: points `2k` and `2k + 1` are the
/// start and end of one drawable stroke.
pub type LayerMap = BTreeMap<LayerId, Vec<Point2D>>;

/// A position on the build plate, in millimeters.
///
/// Serializes as a bare `[x, y]` pair so layer artifacts stay readable by
/// any list-of-pairs parser.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(into = "(f64, f64)", from = "(f64, f64)")]
pub struct Point2D {
    /// Left/right axis.
    pub x: f64,
    /// Front/back axis.
    pub y: f64,
}

impl Point2D {
    /// Create a point.
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance(&self, other: &Point2D) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }
}

impl From<Point2D> for (f64, f64) {
    fn from(p: Point2D) -> Self {
        (p.x, p.y)
    }
}

impl From<(f64, f64)> for Point2D {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn distance_is_euclidean() {
        let a = Point2D::new(0.0, 0.0);
        let b = Point2D::new(3.0, 4.0);
        assert_eq!(a.distance(&b), 5.0);
        assert_eq!(b.distance(&a), 5.0);
        assert_eq!(a.distance(&a), 0.0);
    }

    #[test]
    fn serializes_as_a_pair() {
        let json = serde_json::to_string(&vec![Point2D::new(1.5, -2.0)]).unwrap();
        assert_eq!(json, "[[1.5,-2.0]]");
        let back: Vec<Point2D> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, vec![Point2D::new(1.5, -2.0)]);
    }
}
