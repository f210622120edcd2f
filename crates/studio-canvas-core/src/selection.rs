//! Observable selection and hover state.

use crate::crdt::GraphDocument;
use crate::graph::{EdgeId, NodeId};
use crate::hit_test::HitResult;
use std::fmt;

/// Element under the pointer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HoverTarget {
    Node(NodeId),
    Edge(EdgeId),
    Port {
        node_id: NodeId,
        port_id: String,
        is_output: bool,
    },
}

impl HoverTarget {
    /// Hover target for a hit test result, `None` for empty space.
    pub fn from_hit(hit: &HitResult) -> Option<Self> {
        match hit {
            HitResult::Port(port) => Some(HoverTarget::Port {
                node_id: port.node_id,
                port_id: port.port_id.clone(),
                is_output: port.is_output,
            }),
            HitResult::Node(id) => Some(HoverTarget::Node(*id)),
            HitResult::Edge(id) => Some(HoverTarget::Edge(*id)),
            HitResult::Empty => None,
        }
    }

    fn exists_in(&self, document: &GraphDocument) -> bool {
        match self {
            HoverTarget::Node(id) | HoverTarget::Port { node_id: id, .. } => document.contains_node(*id),
            HoverTarget::Edge(id) => document.edge(*id).is_some(),
        }
    }
}

/// Handle returned by [`SelectionState::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn Fn(&SelectionState)>;

/// Selected nodes and edges plus the hovered element.
///
/// Listeners run synchronously after a mutation that actually changed
/// something.
#[derive(Default)]
pub struct SelectionState {
    nodes: Vec<NodeId>,
    edges: Vec<EdgeId>,
    hovered: Option<HoverTarget>,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener: u64,
}

impl fmt::Debug for SelectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectionState")
            .field("nodes", &self.nodes)
            .field("edges", &self.edges)
            .field("hovered", &self.hovered)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl SelectionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a change listener.
    pub fn subscribe(&mut self, listener: impl Fn(&SelectionState) + 'static) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    /// Selected nodes in selection order.
    pub fn selected_nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn selected_edges(&self) -> &[EdgeId] {
        &self.edges
    }

    pub fn hovered(&self) -> Option<&HoverTarget> {
        self.hovered.as_ref()
    }

    pub fn is_node_selected(&self, id: NodeId) -> bool {
        self.nodes.contains(&id)
    }

    pub fn is_edge_selected(&self, id: EdgeId) -> bool {
        self.edges.contains(&id)
    }

    /// True when neither nodes nor edges are selected.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    /// Select a node. Without `additive` the previous selection is replaced.
    pub fn select_node(&mut self, id: NodeId, additive: bool) {
        self.update(|s| {
            if !additive {
                s.nodes.clear();
                s.edges.clear();
            }
            if !s.nodes.contains(&id) {
                s.nodes.push(id);
            }
        });
    }

    /// Add a node to the selection, or remove it if already selected.
    pub fn toggle_node(&mut self, id: NodeId) {
        self.update(|s| {
            if let Some(index) = s.nodes.iter().position(|n| *n == id) {
                s.nodes.remove(index);
            } else {
                s.nodes.push(id);
            }
        });
    }

    /// Select a single edge, replacing the selection.
    pub fn select_edge(&mut self, id: EdgeId) {
        self.update(|s| {
            s.nodes.clear();
            s.edges.clear();
            s.edges.push(id);
        });
    }

    /// Replace the selection with a set of nodes (marquee result).
    pub fn select_nodes(&mut self, ids: impl IntoIterator<Item = NodeId>) {
        let mut selected = Vec::new();
        for id in ids {
            if !selected.contains(&id) {
                selected.push(id);
            }
        }
        self.update(|s| {
            s.nodes = selected;
            s.edges.clear();
        });
    }

    pub fn clear(&mut self) {
        self.update(|s| {
            s.nodes.clear();
            s.edges.clear();
        });
    }

    pub fn set_hovered(&mut self, target: Option<HoverTarget>) {
        self.update(|s| s.hovered = target);
    }

    /// Drop selected and hovered ids that no longer exist in the document.
    pub fn retain_existing(&mut self, document: &GraphDocument) {
        self.update(|s| {
            s.nodes.retain(|id| document.contains_node(*id));
            s.edges.retain(|id| document.edge(*id).is_some());
            if s.hovered.as_ref().is_some_and(|h| !h.exists_in(document)) {
                s.hovered = None;
            }
        });
    }

    fn update(&mut self, mutate: impl FnOnce(&mut Self)) {
        let before = (self.nodes.clone(), self.edges.clone(), self.hovered.clone());
        mutate(self);
        if before.0 != self.nodes || before.1 != self.edges || before.2 != self.hovered {
            for (_, listener) in &self.listeners {
                listener(self);
            }
        }
    }
}
