//! Named handles to backend relations.
//!
//! A handle is only a name; every relation it owns is derived from that name,
//! so two handles with the same name always refer to the same relations.

use std::fmt;

/// Name of the reserved graph holding every ingested vertex and edge.
pub const BASE_GRAPH_NAME: &str = "trace_base";

/// Prefix of freshly allocated graph names (`trace_<n>`).
pub const GRAPH_PREFIX: &str = "trace_";
/// Prefix of freshly allocated metadata names (`meta_<n>`).
pub const METADATA_PREFIX: &str = "meta_";
/// Prefix reserved for relations that live only inside one instruction.
pub const SCRATCH_PREFIX: &str = "m_";

/// Raw ingested relations.
pub const VERTEX_TABLE: &str = "vertex";
pub const EDGE_TABLE: &str = "edge";
pub const VERTEX_ANNO_TABLE: &str = "vertex_anno";
pub const EDGE_ANNO_TABLE: &str = "edge_anno";

/// Vertex or edge side of a graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Component {
    Vertex,
    Edge,
}

impl Component {
    pub fn as_str(self) -> &'static str {
        match self {
            Component::Vertex => "vertex",
            Component::Edge => "edge",
        }
    }

    /// Raw relation holding the ingested rows for this component.
    pub fn base_table(self) -> &'static str {
        match self {
            Component::Vertex => VERTEX_TABLE,
            Component::Edge => EDGE_TABLE,
        }
    }

    /// Raw relation holding the annotations for this component.
    pub fn annotation_table(self) -> &'static str {
        match self {
            Component::Vertex => VERTEX_ANNO_TABLE,
            Component::Edge => EDGE_ANNO_TABLE,
        }
    }
}

/// Handle to a `(vertex id set, edge id set)` pair of relations.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Graph {
    name: String,
}

impl Graph {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn base() -> Self {
        Self::new(BASE_GRAPH_NAME)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_base(&self) -> bool {
        self.name == BASE_GRAPH_NAME
    }

    pub fn vertex_table(&self) -> String {
        format!("{}_vertex", self.name)
    }

    pub fn edge_table(&self) -> String {
        format!("{}_edge", self.name)
    }

    pub fn table(&self, component: Component) -> String {
        match component {
            Component::Vertex => self.vertex_table(),
            Component::Edge => self.edge_table(),
        }
    }
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Handle to `(id, name, value)` attribute relations for vertices and edges.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GraphMetadata {
    name: String,
}

impl GraphMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vertex_table(&self) -> String {
        format!("{}_vertex", self.name)
    }

    pub fn edge_table(&self) -> String {
        format!("{}_edge", self.name)
    }

    pub fn table(&self, component: Component) -> String {
        match component {
            Component::Vertex => self.vertex_table(),
            Component::Edge => self.edge_table(),
        }
    }
}

impl fmt::Display for GraphMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relation_names_derive_from_entity_name() {
        let graph = Graph::new("trace_7");
        assert_eq!(graph.vertex_table(), "trace_7_vertex");
        assert_eq!(graph.edge_table(), "trace_7_edge");
        assert_eq!(graph.table(Component::Edge), "trace_7_edge");

        let meta = GraphMetadata::new("meta_3");
        assert_eq!(meta.vertex_table(), "meta_3_vertex");
        assert_eq!(meta.table(Component::Edge), "meta_3_edge");
    }

    #[test]
    fn base_graph_relations() {
        let base = Graph::base();
        assert!(base.is_base());
        assert_eq!(base.vertex_table(), "trace_base_vertex");
        assert_eq!(base.edge_table(), "trace_base_edge");
        assert!(!Graph::new("trace_1").is_base());
    }
}
