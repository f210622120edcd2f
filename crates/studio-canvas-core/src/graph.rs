//! Node and edge values projected out of the graph document.

use kurbo::{Point, Rect};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a node.
pub type NodeId = Uuid;
/// Unique identifier for an edge.
pub type EdgeId = Uuid;

/// A single node parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Number(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Number(value as f64)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

/// Parameter bag of a node, ordered by key.
pub type Params = BTreeMap<String, ParamValue>;

/// Execution status of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    #[default]
    Idle,
    Queued,
    Running,
    Complete,
    Error,
    Cancelled,
}

impl NodeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeStatus::Idle => "idle",
            NodeStatus::Queued => "queued",
            NodeStatus::Running => "running",
            NodeStatus::Complete => "complete",
            NodeStatus::Error => "error",
            NodeStatus::Cancelled => "cancelled",
        }
    }

    /// Parse a stored status, treating anything unknown as idle.
    pub fn parse(s: &str) -> Self {
        match s {
            "queued" => NodeStatus::Queued,
            "running" => NodeStatus::Running,
            "complete" => NodeStatus::Complete,
            "error" => NodeStatus::Error,
            "cancelled" => NodeStatus::Cancelled,
            _ => NodeStatus::Idle,
        }
    }

    /// Whether the node is waiting on or doing work.
    pub fn is_busy(self) -> bool {
        matches!(self, NodeStatus::Queued | NodeStatus::Running)
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A node placed on the canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInstance {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub params: Params,
    #[serde(default)]
    pub status: NodeStatus,
}

impl NodeInstance {
    /// Create a node with a fresh id and empty params.
    pub fn new(node_type: impl Into<String>, x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            node_type: node_type.into(),
            x,
            y,
            width,
            height,
            params: Params::new(),
            status: NodeStatus::Idle,
        }
    }

    /// Axis-aligned world-space rectangle of the node.
    pub fn bounds(&self) -> Rect {
        Rect::new(self.x, self.y, self.x + self.width, self.y + self.height)
    }

    /// Whether a world point lies on the node body (edges inclusive).
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x
            && point.x <= self.x + self.width
            && point.y >= self.y
            && point.y <= self.y + self.height
    }

    pub fn param(&self, key: &str) -> Option<&ParamValue> {
        self.params.get(key)
    }
}

/// A directed connection from an output port to an input port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub source_node_id: NodeId,
    pub source_port_id: String,
    pub target_node_id: NodeId,
    pub target_port_id: String,
}

impl Edge {
    pub fn new(
        source_node_id: NodeId,
        source_port_id: impl Into<String>,
        target_node_id: NodeId,
        target_port_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_node_id,
            source_port_id: source_port_id.into(),
            target_node_id,
            target_port_id: target_port_id.into(),
        }
    }

    /// Whether either endpoint is the given node.
    pub fn touches(&self, node_id: NodeId) -> bool {
        self.source_node_id == node_id || self.target_node_id == node_id
    }

    /// Whether two edges connect the same ports.
    pub fn same_endpoints(&self, other: &Edge) -> bool {
        self.source_node_id == other.source_node_id
            && self.source_port_id == other.source_port_id
            && self.target_node_id == other.target_node_id
            && self.target_port_id == other.target_port_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_bounds_and_contains() {
        let node = NodeInstance::new("img2img", 10.0, 20.0, 200.0, 100.0);
        let bounds = node.bounds();
        assert_eq!(bounds, Rect::new(10.0, 20.0, 210.0, 120.0));
        assert!(node.contains(Point::new(10.0, 20.0)));
        assert!(node.contains(Point::new(210.0, 120.0)));
        assert!(!node.contains(Point::new(210.1, 50.0)));
    }

    #[test]
    fn test_status_parse() {
        for status in [
            NodeStatus::Idle,
            NodeStatus::Queued,
            NodeStatus::Running,
            NodeStatus::Complete,
            NodeStatus::Error,
            NodeStatus::Cancelled,
        ] {
            assert_eq!(NodeStatus::parse(status.as_str()), status);
        }
        assert_eq!(NodeStatus::parse("exploded"), NodeStatus::Idle);
        assert!(NodeStatus::Running.is_busy());
        assert!(!NodeStatus::Error.is_busy());
    }

    #[test]
    fn test_param_value_json_is_untagged() {
        let mut params = Params::new();
        params.insert("steps".into(), 20i64.into());
        params.insert("remove_bg".into(), true.into());
        params.insert("sampler_name".into(), "euler".into());
        let json = serde_json::to_string(&params).expect("serialize");
        assert_eq!(json, r#"{"remove_bg":true,"sampler_name":"euler","steps":20.0}"#);
        let parsed: Params = serde_json::from_str(&json).expect("parse");
        assert_eq!(parsed, params);
    }

    #[test]
    fn test_edge_touches() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let edge = Edge::new(a, "image", b, "image");
        assert!(edge.touches(a));
        assert!(edge.touches(b));
        assert!(!edge.touches(Uuid::new_v4()));
    }
}
