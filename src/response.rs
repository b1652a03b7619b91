//! Typed query responses and their text, JSON and DOT renderings.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::error::QueryError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Plain,
    Dot,
}

impl ExportFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            ExportFormat::Plain => "plain",
            ExportFormat::Dot => "dot",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ExportedVertex {
    pub id: i64,
    pub annotations: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ExportedEdge {
    pub id: i64,
    pub src: i64,
    pub dst: i64,
    pub annotations: BTreeMap<String, String>,
}

/// Attributed graph reconstructed from a graph's id sets, sorted by id.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ExportedGraph {
    pub vertices: Vec<ExportedVertex>,
    pub edges: Vec<ExportedEdge>,
}

impl ExportedGraph {
    pub fn vertex_ids(&self) -> Vec<i64> {
        self.vertices.iter().map(|v| v.id).collect()
    }

    pub fn edge_ids(&self) -> Vec<i64> {
        self.edges.iter().map(|e| e.id).collect()
    }

    /// Graphviz rendering; annotations become the node or edge label.
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph provql {\n");
        for vertex in &self.vertices {
            out.push_str(&format!(
                "  \"{}\" [label=\"{}\"];\n",
                vertex.id,
                dot_label(vertex.id, &vertex.annotations)
            ));
        }
        for edge in &self.edges {
            out.push_str(&format!(
                "  \"{}\" -> \"{}\" [label=\"{}\"];\n",
                edge.src,
                edge.dst,
                dot_label(edge.id, &edge.annotations)
            ));
        }
        out.push_str("}\n");
        out
    }
}

fn dot_label(id: i64, annotations: &BTreeMap<String, String>) -> String {
    let mut label = format!("id:{id}");
    for (key, value) in annotations {
        label.push_str("\\n");
        label.push_str(&dot_escape(key));
        label.push(':');
        label.push_str(&dot_escape(value));
    }
    label
}

fn dot_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    out
}

fn write_annotations(f: &mut fmt::Formatter<'_>, annotations: &BTreeMap<String, String>) -> fmt::Result {
    if annotations.is_empty() {
        return Ok(());
    }
    let body = annotations
        .iter()
        .map(|(k, v)| format!("{k}={v:?}"))
        .collect::<Vec<_>>()
        .join(", ");
    write!(f, " {{{body}}}")
}

impl fmt::Display for ExportedGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for vertex in &self.vertices {
            write!(f, "vertex {}", vertex.id)?;
            write_annotations(f, &vertex.annotations)?;
            writeln!(f)?;
        }
        for edge in &self.edges {
            write!(f, "edge {} {} -> {}", edge.id, edge.src, edge.dst)?;
            write_annotations(f, &edge.annotations)?;
            writeln!(f)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    pub kind: String,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "return_type", content = "result")]
pub enum Response {
    #[serde(rename = "String")]
    Text(String),
    Graph(ExportedGraph),
    Export {
        format: ExportFormat,
        path: String,
        graph: ExportedGraph,
    },
    Error(ErrorReport),
}

impl Response {
    pub fn ok() -> Self {
        Response::Text("OK".to_string())
    }

    pub fn return_type(&self) -> &'static str {
        match self {
            Response::Text(_) => "String",
            Response::Graph(_) => "Graph",
            Response::Export { .. } => "Export",
            Response::Error(_) => "Error",
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Response::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn graph(&self) -> Option<&ExportedGraph> {
        match self {
            Response::Graph(graph) | Response::Export { graph, .. } => Some(graph),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error(_))
    }
}

impl From<String> for Response {
    fn from(text: String) -> Self {
        Response::Text(text)
    }
}

impl From<&QueryError> for Response {
    fn from(err: &QueryError) -> Self {
        Response::Error(ErrorReport {
            kind: err.kind().to_string(),
            message: err.to_string(),
        })
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Text(text) => f.write_str(text),
            Response::Graph(graph) => write!(f, "{graph}"),
            Response::Export { path, graph, .. } => write!(
                f,
                "exported {} vertices and {} edges to {path}",
                graph.vertices.len(),
                graph.edges.len()
            ),
            Response::Error(report) => write!(f, "{}: {}", report.kind, report.message),
        }
    }
}
