//! Port placement, port hit testing and connector curve geometry.
//!
//! Ports are spread evenly along the node side they belong to, excluding the
//! two corners: for `k` ports on a side of length `d`, port `i` sits at
//! `d / (k + 1) * (i + 1)`. Inputs live on the left edge, outputs on the
//! right edge.

use crate::catalog::get_node_definition;
use crate::graph::{NodeId, NodeInstance};
use kurbo::{CubicBez, Point};
use serde::{Deserialize, Serialize};

/// Default radius for [`hit_test_port`].
pub const DEFAULT_HIT_RADIUS: f64 = 12.0;
/// Default search distance for [`find_nearest_port`].
pub const DEFAULT_SNAP_DISTANCE: f64 = 30.0;
/// Shortest horizontal control arm of a connector curve.
pub const MIN_CONTROL_OFFSET: f64 = 50.0;
/// Longest horizontal control arm of a connector curve.
pub const MAX_CONTROL_OFFSET: f64 = 150.0;

/// World-space location of a port, derived from a node and its definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortPosition {
    pub node_id: NodeId,
    pub port_id: String,
    pub is_output: bool,
    pub x: f64,
    pub y: f64,
    #[serde(rename = "type")]
    pub port_type: String,
}

impl PortPosition {
    pub fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }

    fn distance_to(&self, x: f64, y: f64) -> f64 {
        (self.x - x).hypot(self.y - y)
    }
}

/// Compute every port position of a node, inputs first then outputs.
///
/// Unknown node types have no ports.
pub fn port_positions(node: &NodeInstance) -> Vec<PortPosition> {
    let Some(def) = get_node_definition(&node.node_type) else {
        return Vec::new();
    };

    let mut positions = Vec::with_capacity(def.inputs.len() + def.outputs.len());
    for is_output in [false, true] {
        let ports = def.ports(is_output);
        let x = if is_output { node.x + node.width } else { node.x };
        let spacing = node.height / (ports.len() as f64 + 1.0);
        for (i, port) in ports.iter().enumerate() {
            positions.push(PortPosition {
                node_id: node.id,
                port_id: port.id.clone(),
                is_output,
                x,
                y: node.y + spacing * (i as f64 + 1.0),
                port_type: port.port_type.clone(),
            });
        }
    }
    positions
}

/// Position of one port, matched on both id and side.
pub fn port_position(node: &NodeInstance, port_id: &str, is_output: bool) -> Option<PortPosition> {
    port_positions(node)
        .into_iter()
        .find(|p| p.is_output == is_output && p.port_id == port_id)
}

/// First port of `node` within `hit_radius` of the world point.
pub fn hit_test_port(
    world_x: f64,
    world_y: f64,
    node: &NodeInstance,
    hit_radius: f64,
) -> Option<PortPosition> {
    port_positions(node)
        .into_iter()
        .find(|p| p.distance_to(world_x, world_y) <= hit_radius)
}

/// Closest port on the requested side across `nodes`, strictly within `max_distance`.
///
/// Ports of `exclude_node` are skipped. On equal distance the first port
/// encountered wins.
pub fn find_nearest_port<'a>(
    world_x: f64,
    world_y: f64,
    nodes: impl IntoIterator<Item = &'a NodeInstance>,
    is_output: bool,
    exclude_node: Option<NodeId>,
    max_distance: f64,
) -> Option<PortPosition> {
    let mut best: Option<(f64, PortPosition)> = None;

    for node in nodes {
        if exclude_node == Some(node.id) {
            continue;
        }
        for port in port_positions(node) {
            if port.is_output != is_output {
                continue;
            }
            let dist = port.distance_to(world_x, world_y);
            if dist >= max_distance {
                continue;
            }
            if best.as_ref().is_none_or(|(best_dist, _)| dist < *best_dist) {
                best = Some((dist, port));
            }
        }
    }

    best.map(|(_, port)| port)
}

/// Control points of a horizontal S-curve from `start` to `end`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BezierControlPoints {
    pub cp1: Point,
    pub cp2: Point,
}

/// Control points for a connector leaving an output and entering an input.
///
/// The horizontal arm is half the horizontal span, clamped to
/// `[MIN_CONTROL_OFFSET, MAX_CONTROL_OFFSET]`, so curves stay well formed for
/// right-to-left and vertically stacked connections.
pub fn bezier_control_points(start_x: f64, start_y: f64, end_x: f64, end_y: f64) -> BezierControlPoints {
    let offset = ((end_x - start_x).abs() * 0.5).clamp(MIN_CONTROL_OFFSET, MAX_CONTROL_OFFSET);
    BezierControlPoints {
        cp1: Point::new(start_x + offset, start_y),
        cp2: Point::new(end_x - offset, end_y),
    }
}

/// Full cubic connector curve between two world points.
pub fn connector_curve(start: Point, end: Point) -> CubicBez {
    let cps = bezier_control_points(start.x, start.y, end.x, end.y);
    CubicBez::new(start, cps.cp1, cps.cp2, end)
}

/// Anchor points used for an edge between two nodes: the vertical midpoint
/// of the source's right edge and of the target's left edge.
pub fn edge_anchor_points(source: &NodeInstance, target: &NodeInstance) -> (Point, Point) {
    (
        Point::new(source.x + source.width, source.y + source.height / 2.0),
        Point::new(target.x, target.y + target.height / 2.0),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::ParamCurve;

    fn img2img(x: f64, y: f64, w: f64, h: f64) -> NodeInstance {
        NodeInstance::new("img2img", x, y, w, h)
    }

    #[test]
    fn test_single_port_is_centered() {
        let node = NodeInstance::new("triposr", 0.0, 0.0, 200.0, 300.0);
        let input = port_position(&node, "image", false).expect("input port");
        let output = port_position(&node, "mesh", true).expect("output port");
        assert_eq!((input.x, input.y), (0.0, 150.0));
        assert_eq!((output.x, output.y), (200.0, 150.0));
        assert_eq!(input.port_type, "image");
        assert_eq!(output.port_type, "mesh");
    }

    #[test]
    fn test_even_spacing_and_order() {
        let node = img2img(10.0, 20.0, 180.0, 90.0);
        let positions = port_positions(&node);
        assert_eq!(positions.len(), 3);

        // Two inputs: spacing 30
        assert_eq!(positions[0].port_id, "image");
        assert!(!positions[0].is_output);
        assert!((positions[0].y - 50.0).abs() < 1e-12);
        assert_eq!(positions[1].port_id, "prompt");
        assert!((positions[1].y - 80.0).abs() < 1e-12);
        assert!((positions[1].x - 10.0).abs() < 1e-12);

        // One output: centered
        assert!(positions[2].is_output);
        assert!((positions[2].x - 190.0).abs() < 1e-12);
        assert!((positions[2].y - 65.0).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_type_has_no_ports() {
        let node = NodeInstance::new("mystery", 0.0, 0.0, 100.0, 100.0);
        assert!(port_positions(&node).is_empty());
        assert!(port_position(&node, "image", false).is_none());
        assert!(hit_test_port(0.0, 50.0, &node, 100.0).is_none());
    }

    #[test]
    fn test_same_port_id_distinguished_by_side() {
        let node = NodeInstance::new("image_output", 0.0, 0.0, 120.0, 80.0);
        let input = port_position(&node, "image", false).expect("input");
        let output = port_position(&node, "image", true).expect("output");
        assert!(!input.is_output);
        assert!(output.is_output);
        assert_eq!(input.x, 0.0);
        assert_eq!(output.x, 120.0);
    }

    #[test]
    fn test_hit_test_port_example() {
        let node = NodeInstance::new("triposr", 0.0, 0.0, 200.0, 300.0);
        let hit = hit_test_port(0.0, 150.0, &node, DEFAULT_HIT_RADIUS).expect("hit");
        assert_eq!(hit.port_id, "image");
        assert!(!hit.is_output);
        assert!(hit_test_port(0.0, 170.0, &node, DEFAULT_HIT_RADIUS).is_none());
    }

    #[test]
    fn test_hit_test_port_monotonic_in_radius() {
        let node = img2img(0.0, 0.0, 200.0, 300.0);
        let probes = [(3.0, 98.0), (0.0, 111.0), (205.0, 150.0), (-7.0, 206.0)];
        for (x, y) in probes {
            let mut hit_before = false;
            for r in [1.0, 4.0, 8.0, 12.0, 20.0, 40.0] {
                let hit = hit_test_port(x, y, &node, r).is_some();
                assert!(!hit_before || hit, "radius {r} lost a hit at ({x}, {y})");
                hit_before = hit;
            }
        }
    }

    #[test]
    fn test_hit_test_port_first_match_wins() {
        // Ports 10 apart: a radius of 50 covers both inputs, list order decides.
        let node = img2img(0.0, 0.0, 100.0, 30.0);
        let hit = hit_test_port(0.0, 19.0, &node, 50.0).expect("hit");
        assert_eq!(hit.port_id, "image");
    }

    #[test]
    fn test_find_nearest_port_excludes_node() {
        let a = NodeInstance::new("triposr", 0.0, 0.0, 100.0, 100.0);
        let b = NodeInstance::new("triposr", 0.0, 120.0, 100.0, 100.0);
        let nodes = vec![a.clone(), b.clone()];

        // Closest input is on `a`, but it is excluded.
        let found = find_nearest_port(2.0, 52.0, &nodes, false, Some(a.id), 150.0).expect("b");
        assert_eq!(found.node_id, b.id);

        let found = find_nearest_port(2.0, 52.0, &nodes, false, None, 150.0).expect("a");
        assert_eq!(found.node_id, a.id);
    }

    #[test]
    fn test_find_nearest_port_respects_side_and_distance() {
        let node = NodeInstance::new("triposr", 0.0, 0.0, 100.0, 100.0);
        let nodes = [node];
        assert!(find_nearest_port(100.0, 50.0, &nodes, false, None, 30.0).is_none());
        let out = find_nearest_port(100.0, 50.0, &nodes, true, None, 30.0).expect("output");
        assert_eq!(out.port_id, "mesh");

        // Exactly max_distance away is outside
        assert!(find_nearest_port(130.0, 50.0, &nodes, true, None, 30.0).is_none());
        assert!(find_nearest_port(129.0, 50.0, &nodes, true, None, DEFAULT_SNAP_DISTANCE).is_some());
    }

    #[test]
    fn test_find_nearest_port_tie_keeps_first() {
        let a = NodeInstance::new("triposr", 0.0, 0.0, 100.0, 100.0);
        let b = NodeInstance::new("triposr", 200.0, 0.0, 100.0, 100.0);
        // Equidistant from a's output (100, 50) and b's input (200, 50) - use outputs only
        let c = NodeInstance::new("triposr", 100.0, 0.0, 100.0, 100.0);
        let nodes = [a.clone(), b, c];
        let found = find_nearest_port(150.0, 50.0, &nodes, true, None, 60.0).expect("hit");
        assert_eq!(found.node_id, a.id);
    }

    #[test]
    fn test_bezier_control_points_clamped() {
        let near = bezier_control_points(0.0, 10.0, 20.0, 10.0);
        assert_eq!(near.cp1, Point::new(50.0, 10.0));
        assert_eq!(near.cp2, Point::new(-30.0, 10.0));

        let far = bezier_control_points(0.0, 0.0, 1000.0, 40.0);
        assert_eq!(far.cp1, Point::new(150.0, 0.0));
        assert_eq!(far.cp2, Point::new(850.0, 40.0));

        let mid = bezier_control_points(0.0, 0.0, 200.0, 0.0);
        assert_eq!(mid.cp1.x, 100.0);
    }

    #[test]
    fn test_bezier_control_points_keep_endpoint_y() {
        for (x0, x1) in [(0.0, 0.0), (300.0, -40.0), (-5.0, 9000.0)] {
            let cps = bezier_control_points(x0, 77.0, x1, 77.0);
            assert_eq!(cps.cp1.y, 77.0);
            assert_eq!(cps.cp2.y, 77.0);
        }
    }

    #[test]
    fn test_bezier_offset_symmetric_for_right_to_left() {
        let forward = bezier_control_points(0.0, 0.0, 160.0, 0.0);
        let backward = bezier_control_points(160.0, 0.0, 0.0, 0.0);
        let forward_offset = forward.cp1.x - 0.0;
        let backward_offset = backward.cp1.x - 160.0;
        assert_eq!(forward_offset, backward_offset);
        // Still leaves the output to the right and enters the input from the left
        assert!(backward.cp1.x > 160.0);
        assert!(backward.cp2.x < 0.0);
    }

    #[test]
    fn test_connector_curve_endpoints() {
        let curve = connector_curve(Point::new(0.0, 0.0), Point::new(300.0, 100.0));
        assert_eq!(curve.eval(0.0), Point::new(0.0, 0.0));
        assert_eq!(curve.eval(1.0), Point::new(300.0, 100.0));
    }

    #[test]
    fn test_edge_anchor_points() {
        let source = NodeInstance::new("prompt", 0.0, 0.0, 100.0, 60.0);
        let target = NodeInstance::new("img2img", 300.0, 100.0, 100.0, 80.0);
        let (start, end) = edge_anchor_points(&source, &target);
        assert_eq!(start, Point::new(100.0, 30.0));
        assert_eq!(end, Point::new(300.0, 140.0));
    }
}
