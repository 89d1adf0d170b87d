//! Densification of strokes to a fixed spatial resolution.
//!
//! The scan card holds each frame's position for one pacing interval, so
//! long strokes must be subdivided or the beam would jump. Every stroke is
//! replaced by interpolated points at most one resolution step apart, then
//! re-paired so the output keeps the flat even-length stroke layout.

use crate::geometry::Point2D;

/// Default resampling step, in millimeters.
pub const DEFAULT_RESOLUTION: f64 = 0.3;

/// Resample a flat stroke list (consecutive pairs) at `resolution`.
///
/// Each pair becomes `floor(distance / resolution) + 1` points, inclusive
/// of both endpoints, re-paired into consecutive strokes. A pair shorter
/// than the resolution collapses to its start point and contributes no
/// strokes; zero-length pairs vanish the same way. Coordinates round to 5
/// decimal places, which makes resampling already-resampled output a
/// fixed point rather than a slow drift.
pub fn resample_path(points: &[Point2D], resolution: f64) -> Vec<Point2D> {
    let mut resampled = Vec::new();
    for pair in points.chunks_exact(2) {
        let line = interpolate_line(pair[0], pair[1], resolution);
        for window in line.windows(2) {
            resampled.push(window[0]);
            resampled.push(window[1]);
        }
    }
    resampled
}

/// Interpolate one stroke, inclusive of both endpoints.
fn interpolate_line(start: Point2D, end: Point2D, resolution: f64) -> Vec<Point2D> {
    let length = start.distance(&end);
    if length == 0.0 {
        return vec![round5_point(start)];
    }

    let num_points = (length / resolution) as usize + 1;
    let mut points = Vec::with_capacity(num_points);
    for i in 0..num_points {
        let point = if i == 0 {
            start
        } else if i == num_points - 1 {
            end
        } else {
            let t = i as f64 / (num_points - 1) as f64;
            Point2D::new(start.x + (end.x - start.x) * t, start.y + (end.y - start.y) * t)
        };
        points.push(round5_point(point));
    }
    points
}

fn round5_point(p: Point2D) -> Point2D {
    Point2D::new(round5(p.x), round5(p.y))
}

fn round5(v: f64) -> f64 {
    (v * 1e5).round() / 1e5
}
