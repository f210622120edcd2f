//! Studio Canvas Core Library
//!
//! Platform-agnostic interaction and graph-state engine for the node-based
//! image pipeline editor: camera, port geometry, hit testing, the CRDT graph
//! document and its snapshot persistence.

pub mod camera;
pub mod catalog;
pub mod config;
pub mod crdt;
pub mod graph;
pub mod ports;
pub mod selection;
pub mod storage;

pub use camera::Camera;
pub use catalog::{NodeDefinition, Port, get_node_color, get_node_definition};
pub use config::EngineConfig;
pub use crdt::{EncodedState, GraphDocument, GraphError, GraphResult};
pub use graph::{Edge, EdgeId, NodeId, NodeInstance, NodeStatus, ParamValue};
pub use hit_test::{HitResult, HitTester, nodes_in_rect};
pub use ports::{PortPosition, find_nearest_port, hit_test_port, port_positions};
pub use selection::{HoverTarget, SelectionState};
pub use storage::{PersistenceAdapter, SaveOutcome, SnapshotRecord, SnapshotStore, StorageError};
