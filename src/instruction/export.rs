use std::collections::BTreeMap;

use tracing::debug;

use crate::backend::Backend;
use crate::entities::{EDGE_ANNO_TABLE, EDGE_TABLE, Graph, VERTEX_ANNO_TABLE};
use crate::error::BackendError;
use crate::response::{ExportFormat, ExportedEdge, ExportedGraph, ExportedVertex, Response};

/// Largest vertex count exported without `force`.
pub const EXPORT_VERTEX_LIMIT: i64 = 1000;

pub(super) fn stat(backend: &dyn Backend, target: &Graph) -> Result<String, BackendError> {
    let vertices =
        backend.execute_for_long_result(&format!("SELECT COUNT(*) FROM {};", target.vertex_table()))?;
    let edges =
        backend.execute_for_long_result(&format!("SELECT COUNT(*) FROM {};", target.edge_table()))?;
    Ok(format!("# vertices = {vertices}, # edges = {edges}"))
}

pub(super) fn export_graph(
    backend: &dyn Backend,
    target: &Graph,
    format: ExportFormat,
    force: bool,
    path: Option<&str>,
) -> Result<Response, BackendError> {
    if !force {
        let count = backend
            .execute_for_long_result(&format!("SELECT COUNT(*) FROM {};", target.vertex_table()))?;
        if count > EXPORT_VERTEX_LIMIT {
            let command = match format {
                ExportFormat::Plain => "dump",
                ExportFormat::Dot => "export",
            };
            return Ok(Response::Text(format!(
                "It may take a long time to transfer/print the result data due to too many vertices: {count}\n\
                 Please use *{command} force ...* to force the transfer"
            )));
        }
    }

    let graph = ExportedGraph {
        vertices: export_vertices(backend, target)?,
        edges: export_edges(backend, target)?,
    };
    debug!(
        graph = %target,
        vertices = graph.vertices.len(),
        edges = graph.edges.len(),
        "exported graph"
    );

    Ok(match format {
        ExportFormat::Plain => Response::Graph(graph),
        ExportFormat::Dot => Response::Export {
            format,
            path: path.unwrap_or_default().to_string(),
            graph,
        },
    })
}

fn export_vertices(
    backend: &dyn Backend,
    target: &Graph,
) -> Result<Vec<ExportedVertex>, BackendError> {
    let vertex_table = target.vertex_table();
    let mut vertices = BTreeMap::new();
    for row in backend.query_rows(&format!("SELECT DISTINCT id FROM {vertex_table};"))? {
        let id = parse_id(&row, 0)?;
        vertices.insert(
            id,
            ExportedVertex {
                id,
                annotations: BTreeMap::new(),
            },
        );
    }

    for row in backend.query_rows(&format!(
        "SELECT id, field, value FROM {VERTEX_ANNO_TABLE} \
         WHERE id IN (SELECT id FROM {vertex_table});"
    ))? {
        let id = parse_id(&row, 0)?;
        if let Some(vertex) = vertices.get_mut(&id) {
            vertex
                .annotations
                .insert(column(&row, 1)?.to_string(), column(&row, 2)?.to_string());
        }
    }
    Ok(vertices.into_values().collect())
}

fn export_edges(backend: &dyn Backend, target: &Graph) -> Result<Vec<ExportedEdge>, BackendError> {
    let edge_table = target.edge_table();
    let mut edges = BTreeMap::new();
    for row in backend.query_rows(&format!(
        "SELECT id, src, dst FROM {EDGE_TABLE} WHERE id IN (SELECT id FROM {edge_table});"
    ))? {
        let id = parse_id(&row, 0)?;
        edges.insert(
            id,
            ExportedEdge {
                id,
                src: parse_id(&row, 1)?,
                dst: parse_id(&row, 2)?,
                annotations: BTreeMap::new(),
            },
        );
    }

    for row in backend.query_rows(&format!(
        "SELECT id, field, value FROM {EDGE_ANNO_TABLE} \
         WHERE id IN (SELECT id FROM {edge_table});"
    ))? {
        let id = parse_id(&row, 0)?;
        if let Some(edge) = edges.get_mut(&id) {
            edge.annotations
                .insert(column(&row, 1)?.to_string(), column(&row, 2)?.to_string());
        }
    }
    Ok(edges.into_values().collect())
}

fn column(row: &[String], index: usize) -> Result<&str, BackendError> {
    row.get(index)
        .map(String::as_str)
        .ok_or_else(|| BackendError::Other(format!("missing column {index} in export row")))
}

fn parse_id(row: &[String], index: usize) -> Result<i64, BackendError> {
    let raw = column(row, index)?;
    raw.trim()
        .parse()
        .map_err(|_| BackendError::UnexpectedOutput(raw.to_string()))
}
