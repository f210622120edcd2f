//! Conversion between graph values and Loro containers.

use crate::graph::{Edge, NodeInstance, NodeStatus, ParamValue, Params};
use loro::{LoroMap, LoroMapValue, LoroResult, LoroValue};
use uuid::Uuid;

// Node keys
pub(crate) const KEY_TYPE: &str = "type";
pub(crate) const KEY_X: &str = "x";
pub(crate) const KEY_Y: &str = "y";
pub(crate) const KEY_WIDTH: &str = "width";
pub(crate) const KEY_HEIGHT: &str = "height";
pub(crate) const KEY_STATUS: &str = "status";
pub(crate) const KEY_PARAMS: &str = "params";

// Edge keys
const KEY_SOURCE_NODE: &str = "source_node";
const KEY_SOURCE_PORT: &str = "source_port";
const KEY_TARGET_NODE: &str = "target_node";
const KEY_TARGET_PORT: &str = "target_port";

fn get_double(map: &LoroMapValue, key: &str) -> Option<f64> {
    match map.get(key)? {
        LoroValue::Double(d) => Some(*d),
        LoroValue::I64(i) => Some(*i as f64),
        _ => None,
    }
}

fn get_string(map: &LoroMapValue, key: &str) -> Option<String> {
    match map.get(key)? {
        LoroValue::String(s) => Some(s.to_string()),
        _ => None,
    }
}

fn get_uuid(map: &LoroMapValue, key: &str) -> Option<Uuid> {
    get_string(map, key).and_then(|s| Uuid::parse_str(&s).ok())
}

/// Write a parameter value into a Loro map.
pub(crate) fn param_to_loro(map: &LoroMap, key: &str, value: &ParamValue) -> LoroResult<()> {
    match value {
        ParamValue::Bool(b) => map.insert(key, *b),
        ParamValue::Number(n) => map.insert(key, *n),
        ParamValue::Text(s) => map.insert(key, s.as_str()),
    }
}

fn param_from_loro(value: &LoroValue) -> Option<ParamValue> {
    match value {
        LoroValue::Bool(b) => Some(ParamValue::Bool(*b)),
        LoroValue::Double(d) => Some(ParamValue::Number(*d)),
        LoroValue::I64(i) => Some(ParamValue::Number(*i as f64)),
        LoroValue::String(s) => Some(ParamValue::Text(s.to_string())),
        _ => None,
    }
}

/// Write a node's fields into an empty node map.
pub fn node_to_loro(node: &NodeInstance, map: &LoroMap) -> LoroResult<()> {
    map.insert(KEY_TYPE, node.node_type.as_str())?;
    map.insert(KEY_X, node.x)?;
    map.insert(KEY_Y, node.y)?;
    map.insert(KEY_WIDTH, node.width)?;
    map.insert(KEY_HEIGHT, node.height)?;
    map.insert(KEY_STATUS, node.status.as_str())?;

    let params = map.insert_container(KEY_PARAMS, LoroMap::new())?;
    for (key, value) in &node.params {
        param_to_loro(&params, key, value)?;
    }
    Ok(())
}

/// Rebuild a node from its deep map value.
///
/// Returns `None` when the id or geometry is unreadable.
pub fn node_from_loro(id: &str, map: &LoroMapValue) -> Option<NodeInstance> {
    let params: Params = match map.get(KEY_PARAMS) {
        Some(LoroValue::Map(values)) => values
            .iter()
            .filter_map(|(k, v)| param_from_loro(v).map(|p| (k.clone(), p)))
            .collect(),
        _ => Params::new(),
    };

    Some(NodeInstance {
        id: Uuid::parse_str(id).ok()?,
        node_type: get_string(map, KEY_TYPE)?,
        x: get_double(map, KEY_X)?,
        y: get_double(map, KEY_Y)?,
        width: get_double(map, KEY_WIDTH)?,
        height: get_double(map, KEY_HEIGHT)?,
        params,
        status: get_string(map, KEY_STATUS)
            .map(|s| NodeStatus::parse(&s))
            .unwrap_or_default(),
    })
}

/// Write an edge's endpoints into an empty edge map.
pub fn edge_to_loro(edge: &Edge, map: &LoroMap) -> LoroResult<()> {
    map.insert(KEY_SOURCE_NODE, edge.source_node_id.to_string())?;
    map.insert(KEY_SOURCE_PORT, edge.source_port_id.as_str())?;
    map.insert(KEY_TARGET_NODE, edge.target_node_id.to_string())?;
    map.insert(KEY_TARGET_PORT, edge.target_port_id.as_str())?;
    Ok(())
}

/// Rebuild an edge from its deep map value.
pub fn edge_from_loro(id: &str, map: &LoroMapValue) -> Option<Edge> {
    Some(Edge {
        id: Uuid::parse_str(id).ok()?,
        source_node_id: get_uuid(map, KEY_SOURCE_NODE)?,
        source_port_id: get_string(map, KEY_SOURCE_PORT)?,
        target_node_id: get_uuid(map, KEY_TARGET_NODE)?,
        target_port_id: get_string(map, KEY_TARGET_PORT)?,
    })
}
