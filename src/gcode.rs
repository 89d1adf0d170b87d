//! Extraction of drawable strokes from sliced G-code.
//!
//! The slicer's output is scanned line by line as an explicit fold: each
//! raw line maps the current scan state to a successor state plus what the
//! line contributed (nothing, a layer entry, or one stroke). Only `G1`
//! moves that push filament draw; everything else is bookkeeping.

use std::sync::OnceLock;

use anyhow::{Context, Result};
use regex::Regex;

use crate::geometry::{LayerId, LayerMap, Point2D};

/// Extract drawable strokes from G-code text, grouped by layer.
///
/// Returned point lists are flat: consecutive pairs form one stroke. Layer
/// 0 always exists, even when nothing draws on it, and layers entered by a
/// directive or Z change but never drawn on come back empty. The same text
/// always produces the same map; line order is preserved within a layer.
pub fn extract_layers(gcode: &str) -> Result<LayerMap> {
    let mut layers = LayerMap::new();
    layers.insert(0, Vec::new());

    let mut state = ScanState::initial();
    for (idx, line) in gcode.lines().enumerate() {
        let (next, outcome) = state.step(line).with_context(|| format!("G-code line {}", idx + 1))?;
        match outcome {
            LineOutcome::Ignored => {}
            LineOutcome::EnteredLayer(id) => {
                layers.entry(id).or_default();
            }
            LineOutcome::Stroke { layer, from, to } => {
                let points = layers.entry(layer).or_default();
                points.push(from);
                points.push(to);
            }
        }
        state = next;
    }
    Ok(layers)
}

/// Whether an extraction result contains anything to draw.
pub fn has_geometry(layers: &LayerMap) -> bool {
    layers.values().any(|points| !points.is_empty())
}

/// What a single G-code line did to the scan.
#[derive(Debug, Clone, Copy, PartialEq)]
enum LineOutcome {
    /// No effect on geometry.
    Ignored,
    /// The line selected a layer (directive or Z change).
    EnteredLayer(LayerId),
    /// An extruding move drew one stroke on `layer`.
    Stroke {
        layer: LayerId,
        from: Point2D,
        to: Point2D,
    },
}

/// Scan position between two lines of G-code.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ScanState {
    layer: LayerId,
    z: f64,
    last_e: f64,
    position: Option<Point2D>,
    extruding: bool,
}

impl ScanState {
    fn initial() -> Self {
        Self {
            layer: 0,
            z: 0.0,
            last_e: 0.0,
            position: None,
            extruding: false,
        }
    }

    /// Consume one raw line, producing the successor state and the line's
    /// contribution.
    fn step(self, raw: &str) -> Result<(Self, LineOutcome)> {
        let line = raw.trim();
        let mut next = self;

        if let Some(rest) = line.strip_prefix(";LAYER:") {
            let token = rest.split(':').next().unwrap_or("");
            let id: LayerId = token
                .trim()
                .parse()
                .with_context(|| format!("invalid layer directive {:?}", line))?;
            next.layer = id;
            // Position carries across the directive; extrusion mode does not.
            next.extruding = false;
            return Ok((next, LineOutcome::EnteredLayer(id)));
        }

        if let Some(z) = scan_value(z_pattern(), line)? {
            if z != self.z {
                let id = (z * 100.0).round() as LayerId;
                next.z = z;
                next.layer = id;
                next.position = None;
                next.extruding = false;
                return Ok((next, LineOutcome::EnteredLayer(id)));
            }
            // A repeated Z is still consumed: Z-bearing lines are layer
            // bookkeeping, never motion.
            return Ok((next, LineOutcome::Ignored));
        }

        let is_g0 = line.starts_with("G0");
        let is_g1 = line.starts_with("G1");
        if !is_g0 && !is_g1 {
            return Ok((next, LineOutcome::Ignored));
        }

        let (x, y) = scan_xy(line)?;
        let e = scan_value(e_pattern(), line)?;
        if x.is_none() && y.is_none() {
            return Ok((next, LineOutcome::Ignored));
        }

        let target = match self.position {
            Some(p) => Point2D::new(x.unwrap_or(p.x), y.unwrap_or(p.y)),
            None => match (x, y) {
                (Some(x), Some(y)) => Point2D::new(x, y),
                // Half a coordinate and nowhere to inherit the rest from.
                _ => return Ok((next, LineOutcome::Ignored)),
            },
        };

        let draws = if is_g0 {
            next.extruding = false;
            false
        } else if let Some(e) = e {
            next.extruding = e > self.last_e;
            next.extruding
        } else {
            self.extruding
        };

        let outcome = match (draws, self.position) {
            (true, Some(from)) => LineOutcome::Stroke {
                layer: self.layer,
                from,
                to: target,
            },
            _ => LineOutcome::Ignored,
        };

        next.position = Some(target);
        if let Some(e) = e {
            next.last_e = e;
        }
        Ok((next, outcome))
    }
}

/// Last `X`/`Y` words on the line, if any.
fn scan_xy(line: &str) -> Result<(Option<f64>, Option<f64>)> {
    let mut x = None;
    let mut y = None;
    for cap in xy_pattern().captures_iter(line) {
        if let Some(m) = cap.get(1) {
            x = Some(parse_word(m.as_str())?);
        }
        if let Some(m) = cap.get(2) {
            y = Some(parse_word(m.as_str())?);
        }
    }
    Ok((x, y))
}

/// First match of `re` on the line, if any.
fn scan_value(re: &Regex, line: &str) -> Result<Option<f64>> {
    match re.captures(line).and_then(|cap| cap.get(1)) {
        Some(m) => Ok(Some(parse_word(m.as_str())?)),
        None => Ok(None),
    }
}

fn parse_word(text: &str) -> Result<f64> {
    text.parse::<f64>().with_context(|| format!("bad numeric word {:?}", text))
}

fn xy_pattern() -> &'static Regex {
    static XY: OnceLock<Regex> = OnceLock::new();
    XY.get_or_init(|| Regex::new(r"X(-?\d+\.?\d*)|Y(-?\d+\.?\d*)").expect("invalid XY regex"))
}

fn z_pattern() -> &'static Regex {
    static Z: OnceLock<Regex> = OnceLock::new();
    Z.get_or_init(|| Regex::new(r"Z(-?\d+\.?\d*)").expect("invalid Z regex"))
}

fn e_pattern() -> &'static Regex {
    static E: OnceLock<Regex> = OnceLock::new();
    E.get_or_init(|| Regex::new(r"E(-?\d+\.?\d*)").expect("invalid E regex"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn points(layers: &LayerMap, id: LayerId) -> &[Point2D] {
        layers.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    #[test]
    fn square_extracts_four_strokes() {
        let gcode = "\
;LAYER:0
G1 X0 Y0 E1
G1 X10 Y0 E2
G1 X10 Y10 E3
G1 X0 Y10 E4
G1 X0 Y0 E5
";
        let layers = extract_layers(gcode).unwrap();
        let pts = points(&layers, 0);
        assert_eq!(pts.len(), 8);
        assert_eq!(pts[0], Point2D::new(0.0, 0.0));
        assert_eq!(pts[1], Point2D::new(10.0, 0.0));
        assert_eq!(pts[6], Point2D::new(0.0, 10.0));
        assert_eq!(pts[7], Point2D::new(0.0, 0.0));
    }

    #[test]
    fn every_layer_has_even_point_count() {
        let gcode = "\
G1 X1 Y1 E0.5
;LAYER:1
G0 X5 Y5
G1 X6 Y5 E1
G1 X6 Y6 E2
G1 Z0.2
G1 X7 Y7 E3
G1 X8 Y7 E4
;LAYER:2
G1 X9 E4.5
";
        let layers = extract_layers(gcode).unwrap();
        for (id, pts) in &layers {
            assert_eq!(pts.len() % 2, 0, "layer {} has odd point count", id);
        }
    }

    #[test]
    fn travel_only_gcode_has_no_geometry() {
        let gcode = "\
G0 X0 Y0
G0 X10 Y0
G0 X10 Y10
";
        let layers = extract_layers(gcode).unwrap();
        assert!(!has_geometry(&layers));
        assert_eq!(points(&layers, 0), &[]);
    }

    #[test]
    fn layer_zero_always_exists() {
        let layers = extract_layers("").unwrap();
        assert_eq!(layers.len(), 1);
        assert_eq!(points(&layers, 0), &[]);
    }

    #[test]
    fn retracting_e_stops_drawing() {
        let gcode = "\
G1 X0 Y0 E1
G1 X5 Y0 E2
G1 X10 Y0 E1.5
";
        let layers = extract_layers(gcode).unwrap();
        // Only the E1 -> E2 move draws; the retracting move is travel.
        assert_eq!(points(&layers, 0), &[Point2D::new(0.0, 0.0), Point2D::new(5.0, 0.0)]);
    }

    #[test]
    fn moves_without_e_inherit_extrusion_mode() {
        let gcode = "\
G1 X0 Y0 E1
G1 X5 Y0 E2
G1 X5 Y5
G0 X0 Y5
G1 X0 Y0
";
        let layers = extract_layers(gcode).unwrap();
        // The E-less G1 keeps drawing; G0 clears the mode, so the final
        // E-less G1 is travel.
        assert_eq!(
            points(&layers, 0),
            &[
                Point2D::new(0.0, 0.0),
                Point2D::new(5.0, 0.0),
                Point2D::new(5.0, 0.0),
                Point2D::new(5.0, 5.0),
            ]
        );
    }

    #[test]
    fn missing_x_or_y_inherits_from_last_position() {
        let gcode = "\
G1 X1 Y2 E1
G1 X5 E2
G1 Y7 E3
";
        let layers = extract_layers(gcode).unwrap();
        assert_eq!(
            points(&layers, 0),
            &[
                Point2D::new(1.0, 2.0),
                Point2D::new(5.0, 2.0),
                Point2D::new(5.0, 2.0),
                Point2D::new(5.0, 7.0),
            ]
        );
    }

    #[test]
    fn half_a_coordinate_with_no_history_is_a_no_op() {
        let gcode = "\
G1 X5 E1
G1 X1 Y1 E2
G1 X2 Y1 E3
";
        let layers = extract_layers(gcode).unwrap();
        // The lone-X line resolves nothing, so the first full position is
        // (1, 1) and only the following move draws.
        assert_eq!(points(&layers, 0), &[Point2D::new(1.0, 1.0), Point2D::new(2.0, 1.0)]);
    }

    #[test]
    fn z_change_derives_layer_id_and_resets_position() {
        let gcode = "\
G1 X0 Y0 E1
G1 X5 Y0 E2
G1 Z0.2
G1 X5 Y5 E3
G1 X9 Y5 E4
";
        let layers = extract_layers(gcode).unwrap();
        assert_eq!(points(&layers, 0).len(), 2);
        // round(0.2 * 100) = 20. The first move after the Z change has no
        // previous position, so only the second one draws.
        assert_eq!(points(&layers, 20), &[Point2D::new(5.0, 5.0), Point2D::new(9.0, 5.0)]);
    }

    #[test]
    fn layer_directive_keeps_position() {
        let gcode = "\
G1 X3 Y4 E1
;LAYER:7
G1 X8 Y4 E2
";
        let layers = extract_layers(gcode).unwrap();
        // Position survives the directive, so the first move of layer 7
        // draws from (3, 4). Extrusion mode was reset, but E2 > E1 turns it
        // back on.
        assert_eq!(points(&layers, 7), &[Point2D::new(3.0, 4.0), Point2D::new(8.0, 4.0)]);
    }

    #[test]
    fn layer_directive_resets_extrusion_mode() {
        let gcode = "\
G1 X0 Y0 E1
G1 X5 Y0 E2
;LAYER:1
G1 X9 Y0
";
        let layers = extract_layers(gcode).unwrap();
        // The E-less move after the directive no longer inherits the old
        // extruding mode.
        assert_eq!(points(&layers, 1), &[]);
    }

    #[test]
    fn z_bearing_lines_are_never_motion() {
        let gcode = "\
G1 X0 Y0 E1
G1 X5 Y5 Z0.3 E2
G1 X9 Y9 E3
";
        let layers = extract_layers(gcode).unwrap();
        // The Z-bearing line is consumed as a layer change even though it
        // carries X/Y/E; nothing draws on layer 0.
        assert_eq!(points(&layers, 0), &[]);
        assert_eq!(points(&layers, 30), &[]);
        assert!(layers.contains_key(&30));
    }

    #[test]
    fn repeated_z_is_consumed_without_a_new_layer() {
        let gcode = "\
G1 Z0.2
G1 Z0.2 X5 Y5 E1
G1 X0 Y0 E2
G1 X1 Y0 E3
";
        let layers = extract_layers(gcode).unwrap();
        assert_eq!(layers.keys().copied().collect::<Vec<_>>(), vec![0, 20]);
        assert_eq!(points(&layers, 20), &[Point2D::new(0.0, 0.0), Point2D::new(1.0, 0.0)]);
    }

    #[test]
    fn e_only_moves_are_ignored_entirely() {
        let gcode = "\
G1 X0 Y0 E1
G1 X5 Y0 E2
G1 E0
G1 X9 Y0
";
        let layers = extract_layers(gcode).unwrap();
        // The E-only retraction resolves no coordinates, so it neither
        // clears the mode nor records its E; the final move still draws.
        assert_eq!(points(&layers, 0).len(), 4);
        assert_eq!(points(&layers, 0)[3], Point2D::new(9.0, 0.0));
    }

    #[test]
    fn negative_layer_directives_parse() {
        let layers = extract_layers(";LAYER:-1\nG1 X0 Y0 E1\nG1 X2 Y0 E2\n").unwrap();
        assert_eq!(points(&layers, -1).len(), 2);
    }

    #[test]
    fn garbled_layer_directive_reports_the_line() {
        let err = extract_layers("G1 X0 Y0 E1\n;LAYER:abc\n").unwrap_err();
        assert!(format!("{:#}", err).contains("line 2"));
    }

    #[test]
    fn g0_with_e_still_updates_the_extrusion_reference() {
        let gcode = "\
G0 X0 Y0 E5
G1 X5 Y0 E2
G1 X9 Y0 E6
";
        let layers = extract_layers(gcode).unwrap();
        // E5 on the travel move raises the reference, so E2 is a retraction
        // and only the E6 move draws.
        assert_eq!(points(&layers, 0), &[Point2D::new(5.0, 0.0), Point2D::new(9.0, 0.0)]);
    }
}
