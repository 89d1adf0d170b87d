//! Mapping of model coordinates into the galvo coordinate space.
//!
//! The scan card addresses each axis with 16 bits, center at 32768. Points
//! are centered inside the canvas spanned by the whole job, normalized per
//! axis, then compressed toward center by a configurable scale so the
//! mirrors never slam against their mechanical limits.

use scanproto::GalvoPoint;

use crate::geometry::{LayerMap, Point2D};

/// Default compression of the mapped range toward center.
pub const DEFAULT_SCALE: f64 = 2.0;

const AXIS_CENTER: f64 = 32768.0;
const AXIS_MAX: i64 = 65535;

/// Extent of a job's geometry across every layer.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Bounds {
    /// Smallest x over all layers.
    pub min_x: f64,
    /// Largest x over all layers.
    pub max_x: f64,
    /// Smallest y over all layers.
    pub min_y: f64,
    /// Largest y over all layers.
    pub max_y: f64,
}

impl Bounds {
    /// Bounds of all points across every layer, all zero when the map
    /// holds no points at all.
    pub fn from_layers(layers: &LayerMap) -> Self {
        let mut points = layers.values().flatten();
        let Some(first) = points.next() else {
            return Self::default();
        };
        let mut bounds = Self {
            min_x: first.x,
            max_x: first.x,
            min_y: first.y,
            max_y: first.y,
        };
        for p in points {
            bounds.min_x = bounds.min_x.min(p.x);
            bounds.max_x = bounds.max_x.max(p.x);
            bounds.min_y = bounds.min_y.min(p.y);
            bounds.max_y = bounds.max_y.max(p.y);
        }
        bounds
    }

    /// Canvas width, rounded up to a whole unit.
    pub fn width(&self) -> f64 {
        (self.max_x - self.min_x).abs().ceil()
    }

    /// Canvas height, rounded up to a whole unit.
    pub fn height(&self) -> f64 {
        (self.max_y - self.min_y).abs().ceil()
    }
}

/// Projects model points into the u16 coordinate space of the scan card.
///
/// The same mapper must be used for every layer of a job, otherwise layers
/// would shift relative to each other.
#[derive(Debug, Clone, Copy)]
pub struct GalvoMapper {
    bounds: Bounds,
    scale: f64,
}

impl GalvoMapper {
    /// Mapper over `bounds`, compressing the swing by `scale`.
    pub fn new(bounds: Bounds, scale: f64) -> Self {
        Self { bounds, scale }
    }

    /// Map points into galvo space.
    ///
    /// Returns the mapped points and the number of coordinates that fell
    /// outside the 16-bit range and had to be clamped.
    pub fn transform(&self, points: &[Point2D]) -> (Vec<GalvoPoint>, usize) {
        let mut clamped = 0;
        let mapped = points
            .iter()
            .map(|p| {
                let x = self.project(p.x - self.bounds.min_x, self.bounds.width(), &mut clamped);
                let y = self.project(p.y - self.bounds.min_y, self.bounds.height(), &mut clamped);
                GalvoPoint::new(x, y)
            })
            .collect();
        (mapped, clamped)
    }

    fn project(&self, offset: f64, extent: f64, clamped: &mut usize) -> u16 {
        let half = extent / 2.0;
        let raw = if half == 0.0 {
            // A flat axis has nothing to normalize against; park it at
            // center instead of dividing by zero.
            AXIS_CENTER
        } else {
            let normalized = (offset - half) / half;
            let mapped = normalized * AXIS_CENTER + AXIS_CENTER;
            AXIS_CENTER + (mapped - AXIS_CENTER) / self.scale
        };
        let value = raw as i64;
        if (0..=AXIS_MAX).contains(&value) {
            value as u16
        } else {
            *clamped += 1;
            value.clamp(0, AXIS_MAX) as u16
        }
    }
}
