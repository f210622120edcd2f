//! CRDT-backed graph state using Loro.
//!
//! # Schema
//!
//! ```text
//! LoroDoc
//! ├── "nodes": LoroMap<NodeId, LoroMap>   (node data)
//! ├── "edges": LoroMap<EdgeId, LoroMap>   (edge endpoints)
//! └── "z_order": LoroList<String>         (node ids, back to front)
//! ```
//!
//! Each node map holds `type`, `x`, `y`, `width`, `height`, `status` and a
//! nested `params` map. Each edge map holds `source_node`, `source_port`,
//! `target_node` and `target_port`.

mod convert;
mod schema;

pub use convert::{edge_from_loro, edge_to_loro, node_from_loro, node_to_loro};
pub use schema::{EDGES_KEY, GraphDocument, NODES_KEY, Z_ORDER_KEY};

pub use loro::{Subscription, VersionVector};

use crate::graph::{EdgeId, NodeId};
use thiserror::Error;

/// Errors raised by graph document operations.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),
    #[error("Edge not found: {0}")]
    EdgeNotFound(EdgeId),
    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),
    #[error("Port {port_id} ({}) not found on node {node_id}", if *.is_output { "output" } else { "input" })]
    PortNotFound {
        node_id: NodeId,
        port_id: String,
        is_output: bool,
    },
    #[error("An identical edge already exists")]
    DuplicateEdge,
    #[error("CRDT error: {0}")]
    Crdt(#[from] loro::LoroError),
    #[error("Encoding error: {0}")]
    Encode(String),
}

/// Result type for graph document operations.
pub type GraphResult<T> = Result<T, GraphError>;

/// A persisted form of the document: its version vector plus a full update blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedState {
    /// Encoded `VersionVector` at export time.
    pub state_vector: Vec<u8>,
    /// Snapshot bytes, importable into an empty or diverged document.
    pub update: Vec<u8>,
}
