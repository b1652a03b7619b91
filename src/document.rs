//! JSON graph documents used to seed the base graph.
//!
//! ```json
//! {
//!   "vertices": [{ "id": 1, "md5": "…", "annotations": { "type": "Process" } }],
//!   "edges": [{ "id": 10, "src": 1, "dst": 2, "annotations": { "operation": "fork" } }]
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::store::SqliteBackend;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphDocument {
    #[serde(default)]
    pub vertices: Vec<VertexRecord>,
    #[serde(default)]
    pub edges: Vec<EdgeRecord>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VertexRecord {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub id: i64,
    pub src: i64,
    pub dst: i64,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

/// Counts of rows written by [`load_document`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoadSummary {
    pub vertices: usize,
    pub edges: usize,
}

impl GraphDocument {
    pub fn from_json(text: &str) -> Result<Self> {
        let document: GraphDocument =
            serde_json::from_str(text).context("failed to parse graph document")?;
        document.validate()?;
        Ok(document)
    }

    pub fn read(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("in {}", path.display()))
    }

    /// Reject duplicate ids and edges whose endpoints are not in the document.
    pub fn validate(&self) -> Result<()> {
        let mut vertex_ids = std::collections::BTreeSet::new();
        for vertex in &self.vertices {
            if !vertex_ids.insert(vertex.id) {
                bail!("duplicate vertex id {}", vertex.id);
            }
        }
        let mut edge_ids = std::collections::BTreeSet::new();
        for edge in &self.edges {
            if !edge_ids.insert(edge.id) {
                bail!("duplicate edge id {}", edge.id);
            }
            for endpoint in [edge.src, edge.dst] {
                if !vertex_ids.contains(&endpoint) {
                    bail!("edge {} references unknown vertex {endpoint}", edge.id);
                }
            }
        }
        Ok(())
    }
}

/// Write every vertex and edge of `document` into the base relations.
pub fn load_document(backend: &SqliteBackend, document: &GraphDocument) -> Result<LoadSummary> {
    for vertex in &document.vertices {
        let annotations = borrowed(&vertex.annotations);
        backend
            .put_vertex(vertex.id, vertex.md5.as_deref(), &annotations)
            .with_context(|| format!("failed to store vertex {}", vertex.id))?;
    }
    for edge in &document.edges {
        let annotations = borrowed(&edge.annotations);
        backend
            .put_edge(edge.id, edge.src, edge.dst, &annotations)
            .with_context(|| format!("failed to store edge {}", edge.id))?;
    }
    let summary = LoadSummary {
        vertices: document.vertices.len(),
        edges: document.edges.len(),
    };
    info!(vertices = summary.vertices, edges = summary.edges, "loaded graph document");
    Ok(summary)
}

fn borrowed(annotations: &BTreeMap<String, String>) -> Vec<(&str, &str)> {
    annotations
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect()
}
