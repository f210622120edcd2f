//! Loro document schema and graph operations.

use super::convert::{
    KEY_HEIGHT, KEY_PARAMS, KEY_STATUS, KEY_WIDTH, KEY_X, KEY_Y, edge_from_loro, edge_to_loro,
    node_from_loro, node_to_loro, param_to_loro,
};
use super::{EncodedState, GraphError, GraphResult};
use crate::catalog::get_node_definition;
use crate::config::HistoryConfig;
use crate::graph::{Edge, EdgeId, NodeId, NodeInstance, NodeStatus, ParamValue};
use kurbo::Rect;
use loro::{
    Container, ExportMode, LoroDoc, LoroList, LoroMap, LoroValue, Subscription, UndoManager,
    ValueOrContainer, VersionVector,
};
use std::collections::HashSet;
use uuid::Uuid;

/// Key for the nodes map in the document.
pub const NODES_KEY: &str = "nodes";
/// Key for the edges map in the document.
pub const EDGES_KEY: &str = "edges";
/// Key for the z-order list in the document.
pub const Z_ORDER_KEY: &str = "z_order";

/// A CRDT-backed graph document.
///
/// This wraps a `LoroDoc` and exposes node and edge operations; every
/// operation is a single commit and therefore a single undo step (subject to
/// the undo manager's merge interval). Node and edge values returned from
/// this type are read out of the CRDT at call time.
pub struct GraphDocument {
    /// The underlying Loro document.
    doc: LoroDoc,
    /// Undo manager for local undo/redo.
    undo_manager: UndoManager,
}

impl GraphDocument {
    /// Create a new empty graph document.
    pub fn new() -> Self {
        Self::with_history(&HistoryConfig::default())
    }

    /// Create a new empty graph document with the given undo settings.
    pub fn with_history(history: &HistoryConfig) -> Self {
        let doc = LoroDoc::new();
        let undo_manager = Self::undo_manager_for(&doc, history);
        Self { doc, undo_manager }
    }

    /// Create a graph document from a snapshot.
    pub fn from_snapshot(bytes: &[u8]) -> GraphResult<Self> {
        let doc = LoroDoc::new();
        doc.import(bytes)?;
        let undo_manager = Self::undo_manager_for(&doc, &HistoryConfig::default());
        Ok(Self { doc, undo_manager })
    }

    fn undo_manager_for(doc: &LoroDoc, history: &HistoryConfig) -> UndoManager {
        let mut undo_manager = UndoManager::new(doc);
        undo_manager.set_max_undo_steps(history.max_undo_steps);
        undo_manager.set_merge_interval(history.merge_interval_ms);
        undo_manager
    }

    /// Get the underlying LoroDoc.
    pub fn loro_doc(&self) -> &LoroDoc {
        &self.doc
    }

    fn nodes_map(&self) -> LoroMap {
        self.doc.get_map(NODES_KEY)
    }

    fn edges_map(&self) -> LoroMap {
        self.doc.get_map(EDGES_KEY)
    }

    fn z_order_list(&self) -> LoroList {
        self.doc.get_list(Z_ORDER_KEY)
    }

    fn node_container(&self, id: NodeId) -> GraphResult<LoroMap> {
        match self.nodes_map().get(&id.to_string()) {
            Some(ValueOrContainer::Container(Container::Map(map))) => Ok(map),
            _ => Err(GraphError::NodeNotFound(id)),
        }
    }

    fn z_index_of(&self, id: &str) -> Option<usize> {
        let list = self.z_order_list();
        (0..list.len()).find(|&i| {
            matches!(list.get(i), Some(ValueOrContainer::Value(LoroValue::String(s))) if s.as_ref() == id)
        })
    }

    // --- Reads ---

    /// Get the number of nodes in the document.
    pub fn node_count(&self) -> usize {
        self.nodes_map().len()
    }

    /// Get the number of edges in the document.
    pub fn edge_count(&self) -> usize {
        self.edges_map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.node_count() == 0 && self.edge_count() == 0
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes_map().get(&id.to_string()).is_some()
    }

    /// Get the z-order as a list of node ids, back to front.
    pub fn z_order(&self) -> Vec<NodeId> {
        let list = self.z_order_list();
        let mut seen = HashSet::new();
        let mut result = Vec::with_capacity(list.len());
        for i in 0..list.len() {
            if let Some(ValueOrContainer::Value(LoroValue::String(s))) = list.get(i) {
                if let Ok(id) = Uuid::parse_str(&s.to_string()) {
                    if seen.insert(id) {
                        result.push(id);
                    }
                }
            }
        }
        result
    }

    /// Get a node by id.
    pub fn node(&self, id: NodeId) -> Option<NodeInstance> {
        match self.node_container(id).ok()?.get_deep_value() {
            LoroValue::Map(node_map) => node_from_loro(&id.to_string(), &node_map),
            _ => None,
        }
    }

    /// Get all nodes in draw order (back to front).
    ///
    /// Nodes missing from the z-order list (possible after concurrent merges)
    /// are appended in id order.
    pub fn nodes(&self) -> Vec<NodeInstance> {
        let LoroValue::Map(map) = self.nodes_map().get_deep_value() else {
            return Vec::new();
        };

        let mut nodes = Vec::with_capacity(map.len());
        let mut placed = HashSet::new();
        for id in self.z_order() {
            let key = id.to_string();
            if let Some(LoroValue::Map(node_map)) = map.get(&key) {
                if let Some(node) = node_from_loro(&key, node_map) {
                    placed.insert(id);
                    nodes.push(node);
                }
            }
        }

        let mut stray: Vec<NodeInstance> = map
            .iter()
            .filter_map(|(key, value)| match value {
                LoroValue::Map(node_map) => node_from_loro(key, node_map),
                _ => None,
            })
            .filter(|node| !placed.contains(&node.id))
            .collect();
        stray.sort_by_key(|node| node.id);
        nodes.extend(stray);
        nodes
    }

    /// Get an edge by id.
    pub fn edge(&self, id: EdgeId) -> Option<Edge> {
        let key = id.to_string();
        match self.edges_map().get(&key) {
            Some(ValueOrContainer::Container(Container::Map(edge_map))) => match edge_map.get_deep_value() {
                LoroValue::Map(value) => edge_from_loro(&key, &value),
                _ => None,
            },
            _ => None,
        }
    }

    /// Get all edges, ordered by id.
    pub fn edges(&self) -> Vec<Edge> {
        let LoroValue::Map(map) = self.edges_map().get_deep_value() else {
            return Vec::new();
        };
        let mut edges: Vec<Edge> = map
            .iter()
            .filter_map(|(key, value)| match value {
                LoroValue::Map(edge_map) => edge_from_loro(key, edge_map),
                _ => None,
            })
            .collect();
        edges.sort_by_key(|edge| edge.id);
        edges
    }

    /// Get the edges attached to a node.
    pub fn edges_for_node(&self, node_id: NodeId) -> Vec<Edge> {
        self.edges()
            .into_iter()
            .filter(|edge| edge.touches(node_id))
            .collect()
    }

    /// Get the bounding box of all nodes.
    pub fn bounds(&self) -> Option<Rect> {
        self.nodes()
            .iter()
            .map(NodeInstance::bounds)
            .reduce(|acc, bounds| acc.union(bounds))
    }

    // --- Node operations ---

    /// Add a node of a catalog type, seeded with the type's default params.
    pub fn add_node(
        &mut self,
        node_type: &str,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    ) -> GraphResult<NodeId> {
        let def = get_node_definition(node_type)
            .ok_or_else(|| GraphError::UnknownNodeType(node_type.to_string()))?;
        let mut node = NodeInstance::new(node_type, x, y, width, height);
        node.params = def.default_params.clone();
        self.insert_node(&node)?;
        Ok(node.id)
    }

    /// Insert a fully formed node on top of the z-order.
    pub fn insert_node(&mut self, node: &NodeInstance) -> GraphResult<()> {
        let id = node.id.to_string();
        let node_map = self.nodes_map().insert_container(&id, LoroMap::new())?;
        node_to_loro(node, &node_map)?;
        self.z_order_list().push(LoroValue::String(id.into()))?;
        self.doc.commit();
        Ok(())
    }

    /// Move a node to a new top-left position.
    pub fn move_node(&mut self, id: NodeId, x: f64, y: f64) -> GraphResult<()> {
        let node_map = self.node_container(id)?;
        node_map.insert(KEY_X, x)?;
        node_map.insert(KEY_Y, y)?;
        self.doc.commit();
        Ok(())
    }

    /// Offset several nodes at once, as one change.
    ///
    /// Unknown ids are ignored.
    pub fn translate_nodes(&mut self, ids: &[NodeId], dx: f64, dy: f64) -> GraphResult<()> {
        for &id in ids {
            let Some(node) = self.node(id) else { continue };
            let node_map = self.node_container(id)?;
            node_map.insert(KEY_X, node.x + dx)?;
            node_map.insert(KEY_Y, node.y + dy)?;
        }
        self.doc.commit();
        Ok(())
    }

    /// Resize a node, keeping its top-left corner.
    pub fn resize_node(&mut self, id: NodeId, width: f64, height: f64) -> GraphResult<()> {
        let node_map = self.node_container(id)?;
        node_map.insert(KEY_WIDTH, width)?;
        node_map.insert(KEY_HEIGHT, height)?;
        self.doc.commit();
        Ok(())
    }

    /// Set a single parameter on a node.
    pub fn set_param(&mut self, id: NodeId, key: &str, value: ParamValue) -> GraphResult<()> {
        let node_map = self.node_container(id)?;
        let params = match node_map.get(KEY_PARAMS) {
            Some(ValueOrContainer::Container(Container::Map(map))) => map,
            _ => node_map.insert_container(KEY_PARAMS, LoroMap::new())?,
        };
        param_to_loro(&params, key, &value)?;
        self.doc.commit();
        Ok(())
    }

    /// Update a node's execution status.
    pub fn set_status(&mut self, id: NodeId, status: NodeStatus) -> GraphResult<()> {
        let node_map = self.node_container(id)?;
        node_map.insert(KEY_STATUS, status.as_str())?;
        self.doc.commit();
        Ok(())
    }

    /// Remove a node and every edge attached to it.
    ///
    /// Returns the ids of the removed edges.
    pub fn remove_node(&mut self, id: NodeId) -> GraphResult<Vec<EdgeId>> {
        if !self.contains_node(id) {
            return Err(GraphError::NodeNotFound(id));
        }
        let key = id.to_string();

        let edges_map = self.edges_map();
        let attached: Vec<EdgeId> = self.edges_for_node(id).iter().map(|e| e.id).collect();
        for edge_id in &attached {
            edges_map.delete(&edge_id.to_string())?;
        }

        self.nodes_map().delete(&key)?;
        while let Some(i) = self.z_index_of(&key) {
            self.z_order_list().delete(i, 1)?;
        }

        self.doc.commit();
        Ok(attached)
    }

    /// Bring a node to the top of the z-order.
    pub fn bring_to_front(&mut self, id: NodeId) -> GraphResult<()> {
        if !self.contains_node(id) {
            return Err(GraphError::NodeNotFound(id));
        }
        let key = id.to_string();
        let z_order = self.z_order_list();
        while let Some(i) = self.z_index_of(&key) {
            z_order.delete(i, 1)?;
        }
        z_order.push(LoroValue::String(key.into()))?;
        self.doc.commit();
        Ok(())
    }

    // --- Edge operations ---

    /// Check that an edge connects an existing output port to an existing input port.
    pub fn validate_edge(&self, edge: &Edge) -> GraphResult<()> {
        let endpoint = |node_id: NodeId, port_id: &str, is_output: bool| -> GraphResult<()> {
            let node = self.node(node_id).ok_or(GraphError::NodeNotFound(node_id))?;
            let def = get_node_definition(&node.node_type)
                .ok_or_else(|| GraphError::UnknownNodeType(node.node_type.clone()))?;
            if def.port(port_id, is_output).is_none() {
                return Err(GraphError::PortNotFound {
                    node_id,
                    port_id: port_id.to_string(),
                    is_output,
                });
            }
            Ok(())
        };

        endpoint(edge.source_node_id, &edge.source_port_id, true)?;
        endpoint(edge.target_node_id, &edge.target_port_id, false)?;

        if self.edges().iter().any(|e| e.same_endpoints(edge)) {
            return Err(GraphError::DuplicateEdge);
        }
        Ok(())
    }

    /// Connect an output port to an input port.
    pub fn add_edge(
        &mut self,
        source_node_id: NodeId,
        source_port_id: &str,
        target_node_id: NodeId,
        target_port_id: &str,
    ) -> GraphResult<EdgeId> {
        let edge = Edge::new(source_node_id, source_port_id, target_node_id, target_port_id);
        self.insert_edge(&edge)?;
        Ok(edge.id)
    }

    /// Insert a fully formed edge after validating it.
    pub fn insert_edge(&mut self, edge: &Edge) -> GraphResult<()> {
        if let Err(e) = self.validate_edge(edge) {
            log::debug!("Rejected edge {}: {}", edge.id, e);
            return Err(e);
        }
        let edge_map = self
            .edges_map()
            .insert_container(&edge.id.to_string(), LoroMap::new())?;
        edge_to_loro(edge, &edge_map)?;
        self.doc.commit();
        Ok(())
    }

    /// Remove an edge.
    pub fn remove_edge(&mut self, id: EdgeId) -> GraphResult<()> {
        let key = id.to_string();
        let edges_map = self.edges_map();
        if edges_map.get(&key).is_none() {
            return Err(GraphError::EdgeNotFound(id));
        }
        edges_map.delete(&key)?;
        self.doc.commit();
        Ok(())
    }

    /// Remove every node and edge.
    pub fn clear(&mut self) -> GraphResult<()> {
        let z_order = self.z_order_list();
        let len = z_order.len();
        if len > 0 {
            z_order.delete(0, len)?;
        }

        for map in [self.nodes_map(), self.edges_map()] {
            let keys: Vec<String> = match map.get_deep_value() {
                LoroValue::Map(values) => values.keys().cloned().collect(),
                _ => vec![],
            };
            for key in keys {
                map.delete(&key)?;
            }
        }

        self.doc.commit();
        Ok(())
    }

    // --- Replication ---

    /// Export the document as a snapshot (full state).
    pub fn export_snapshot(&self) -> GraphResult<Vec<u8>> {
        self.doc
            .export(ExportMode::Snapshot)
            .map_err(|e| GraphError::Encode(e.to_string()))
    }

    /// Export incremental updates since a version.
    pub fn export_updates(&self, since: &VersionVector) -> GraphResult<Vec<u8>> {
        self.doc
            .export(ExportMode::updates(since))
            .map_err(|e| GraphError::Encode(e.to_string()))
    }

    /// Encode the state vector together with a full snapshot, for persistence.
    pub fn encode_state(&self) -> GraphResult<EncodedState> {
        Ok(EncodedState {
            state_vector: self.version().encode(),
            update: self.export_snapshot()?,
        })
    }

    /// Merge a snapshot or update blob into this document.
    ///
    /// Importing the same bytes twice is harmless.
    pub fn import(&mut self, bytes: &[u8]) -> GraphResult<()> {
        self.doc.import(bytes)?;
        Ok(())
    }

    /// Get the current version vector.
    pub fn version(&self) -> VersionVector {
        self.doc.oplog_vv()
    }

    /// Subscribe to locally committed updates.
    ///
    /// The listener runs synchronously inside each commit (including undo and
    /// redo) with the encoded update. Dropping the returned subscription
    /// unsubscribes.
    pub fn subscribe_local_updates<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        self.doc.subscribe_local_update(Box::new(move |bytes: &Vec<u8>| {
            listener(bytes);
            true
        }))
    }

    // --- Undo/Redo API ---

    /// Undo the last change made by this peer.
    /// Returns true if undo was performed, false if nothing to undo.
    pub fn undo(&mut self) -> bool {
        self.undo_manager.undo().unwrap_or(false)
    }

    /// Redo the last undone change.
    pub fn redo(&mut self) -> bool {
        self.undo_manager.redo().unwrap_or(false)
    }

    pub fn can_undo(&self) -> bool {
        self.undo_manager.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.undo_manager.can_redo()
    }

    /// Start a new undo group. All changes until `end_undo_group` will be undone together.
    pub fn start_undo_group(&mut self) {
        let _ = self.undo_manager.group_start();
    }

    /// End the current undo group.
    pub fn end_undo_group(&mut self) {
        self.undo_manager.group_end();
    }

    /// Clear undo/redo history.
    pub fn clear_undo_history(&self) {
        self.undo_manager.clear();
    }
}

impl Default for GraphDocument {
    fn default() -> Self {
        Self::new()
    }
}
