//! Graph-algebra instructions and their relational translation.
//!
//! Every instruction names the relations it touches; it never owns data.
//! Execution issues statements through the [`ExecutionContext`] backend and,
//! for the reporting instructions, appends a [`crate::response::Response`].

mod edges;
mod export;
mod lineage;
mod metadata;
mod path;
mod set_ops;

use std::fmt;

use crate::entities::{Graph, GraphMetadata};
use crate::error::BackendError;
use crate::program::ExecutionContext;
use crate::response::ExportFormat;

pub use export::EXPORT_VERTEX_LIMIT;

/// Traversal direction for lineage queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Ancestor,
    Descendant,
    Both,
}

impl Direction {
    pub fn parse(text: &str) -> Option<Direction> {
        match text {
            "a" | "ancestor" | "ancestors" => Some(Direction::Ancestor),
            "d" | "descendant" | "descendants" => Some(Direction::Descendant),
            "b" | "both" => Some(Direction::Both),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Ancestor => "ancestor",
            Direction::Descendant => "descendant",
            Direction::Both => "both",
        }
    }
}

/// Which endpoints of an edge set to project.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EdgeEndpoint {
    Source,
    Destination,
    Both,
}

impl EdgeEndpoint {
    pub fn as_str(self) -> &'static str {
        match self {
            EdgeEndpoint::Source => "source",
            EdgeEndpoint::Destination => "destination",
            EdgeEndpoint::Both => "both",
        }
    }
}

/// Which side of a graph a metadata assignment covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetadataScope {
    Vertex,
    Edge,
    Both,
}

impl MetadataScope {
    pub fn as_str(self) -> &'static str {
        match self {
            MetadataScope::Vertex => "vertex",
            MetadataScope::Edge => "edge",
            MetadataScope::Both => "both",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instruction {
    CreateEmptyGraph {
        target: Graph,
    },
    CreateEmptyGraphMetadata {
        target: GraphMetadata,
    },
    UnionGraph {
        target: Graph,
        source: Graph,
    },
    IntersectGraph {
        target: Graph,
        lhs: Graph,
        rhs: Graph,
    },
    SubtractGraph {
        target: Graph,
        minuend: Graph,
        subtrahend: Graph,
    },
    DistinctifyGraph {
        target: Graph,
        source: Graph,
    },
    LimitGraph {
        target: Graph,
        source: Graph,
        limit: i64,
    },
    InsertLiteralVertex {
        target: Graph,
        ids: Vec<i64>,
    },
    InsertLiteralEdge {
        target: Graph,
        ids: Vec<i64>,
    },
    CollapseEdge {
        target: Graph,
        source: Graph,
        fields: Vec<String>,
    },
    GetEdgeEndpoint {
        target: Graph,
        subject: Graph,
        endpoint: EdgeEndpoint,
    },
    GetSubgraph {
        target: Graph,
        subject: Graph,
        skeleton: Graph,
    },
    GetLineage {
        target: Graph,
        subject: Graph,
        start: Graph,
        depth: i64,
        direction: Direction,
    },
    GetPath {
        target: Graph,
        subject: Graph,
        source: Graph,
        destination: Graph,
        max_depth: i64,
    },
    GetShortestPath {
        target: Graph,
        subject: Graph,
        source: Graph,
        destination: Graph,
        max_depth: i64,
    },
    SetGraphMetadata {
        target: GraphMetadata,
        scope: MetadataScope,
        source: Graph,
        name: String,
        value: String,
    },
    OverwriteGraphMetadata {
        target: GraphMetadata,
        lhs: GraphMetadata,
        rhs: GraphMetadata,
    },
    StatGraph {
        target: Graph,
    },
    ExportGraph {
        target: Graph,
        format: ExportFormat,
        force: bool,
        path: Option<String>,
    },
    EvaluateQuery {
        query: String,
    },
}

impl Instruction {
    pub fn label(&self) -> &'static str {
        match self {
            Instruction::CreateEmptyGraph { .. } => "CreateEmptyGraph",
            Instruction::CreateEmptyGraphMetadata { .. } => "CreateEmptyGraphMetadata",
            Instruction::UnionGraph { .. } => "UnionGraph",
            Instruction::IntersectGraph { .. } => "IntersectGraph",
            Instruction::SubtractGraph { .. } => "SubtractGraph",
            Instruction::DistinctifyGraph { .. } => "DistinctifyGraph",
            Instruction::LimitGraph { .. } => "LimitGraph",
            Instruction::InsertLiteralVertex { .. } => "InsertLiteralVertex",
            Instruction::InsertLiteralEdge { .. } => "InsertLiteralEdge",
            Instruction::CollapseEdge { .. } => "CollapseEdge",
            Instruction::GetEdgeEndpoint { .. } => "GetEdgeEndpoint",
            Instruction::GetSubgraph { .. } => "GetSubgraph",
            Instruction::GetLineage { .. } => "GetLineage",
            Instruction::GetPath { .. } => "GetPath",
            Instruction::GetShortestPath { .. } => "GetShortestPath",
            Instruction::SetGraphMetadata { .. } => "SetGraphMetadata",
            Instruction::OverwriteGraphMetadata { .. } => "OverwriteGraphMetadata",
            Instruction::StatGraph { .. } => "StatGraph",
            Instruction::ExportGraph { .. } => "ExportGraph",
            Instruction::EvaluateQuery { .. } => "EvaluateQuery",
        }
    }

    pub fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), BackendError> {
        let backend = ctx.backend();
        match self {
            Instruction::CreateEmptyGraph { target } => set_ops::create_empty_graph(backend, target),
            Instruction::CreateEmptyGraphMetadata { target } => {
                metadata::create_empty_metadata(backend, target)
            }
            Instruction::UnionGraph { target, source } => set_ops::union(backend, target, source),
            Instruction::IntersectGraph { target, lhs, rhs } => {
                set_ops::intersect(backend, target, lhs, rhs)
            }
            Instruction::SubtractGraph {
                target,
                minuend,
                subtrahend,
            } => set_ops::subtract(backend, target, minuend, subtrahend),
            Instruction::DistinctifyGraph { target, source } => {
                set_ops::distinctify(backend, target, source)
            }
            Instruction::LimitGraph {
                target,
                source,
                limit,
            } => set_ops::limit(backend, target, source, *limit),
            Instruction::InsertLiteralVertex { target, ids } => {
                set_ops::insert_literal(backend, &target.vertex_table(), ids)
            }
            Instruction::InsertLiteralEdge { target, ids } => {
                set_ops::insert_literal(backend, &target.edge_table(), ids)
            }
            Instruction::CollapseEdge {
                target,
                source,
                fields,
            } => edges::collapse_edge(backend, target, source, fields),
            Instruction::GetEdgeEndpoint {
                target,
                subject,
                endpoint,
            } => edges::edge_endpoints(backend, target, subject, *endpoint),
            Instruction::GetSubgraph {
                target,
                subject,
                skeleton,
            } => edges::subgraph(backend, target, subject, skeleton),
            Instruction::GetLineage {
                target,
                subject,
                start,
                depth,
                direction,
            } => lineage::get_lineage(backend, target, subject, start, *depth, *direction),
            Instruction::GetPath {
                target,
                subject,
                source,
                destination,
                max_depth,
            } => path::get_path(backend, target, subject, source, destination, *max_depth),
            Instruction::GetShortestPath {
                target,
                subject,
                source,
                destination,
                max_depth,
            } => path::get_shortest_path(backend, target, subject, source, destination, *max_depth),
            Instruction::SetGraphMetadata {
                target,
                scope,
                source,
                name,
                value,
            } => metadata::set_metadata(backend, target, *scope, source, name, value),
            Instruction::OverwriteGraphMetadata { target, lhs, rhs } => {
                metadata::overwrite_metadata(backend, target, lhs, rhs)
            }
            Instruction::StatGraph { target } => {
                let text = export::stat(backend, target)?;
                ctx.add_response(text.into());
                Ok(())
            }
            Instruction::ExportGraph {
                target,
                format,
                force,
                path,
            } => {
                let response = export::export_graph(backend, target, *format, *force, path.as_deref())?;
                ctx.add_response(response);
                Ok(())
            }
            Instruction::EvaluateQuery { query } => {
                let output = backend.execute(query)?;
                if !output.is_empty() {
                    ctx.add_response(output.into());
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())?;
        match self {
            Instruction::CreateEmptyGraph { target } => write!(f, " target={target}"),
            Instruction::CreateEmptyGraphMetadata { target } => write!(f, " target={target}"),
            Instruction::UnionGraph { target, source }
            | Instruction::DistinctifyGraph { target, source } => {
                write!(f, " target={target} source={source}")
            }
            Instruction::IntersectGraph { target, lhs, rhs } => {
                write!(f, " target={target} lhs={lhs} rhs={rhs}")
            }
            Instruction::SubtractGraph {
                target,
                minuend,
                subtrahend,
            } => write!(f, " target={target} minuend={minuend} subtrahend={subtrahend}"),
            Instruction::LimitGraph {
                target,
                source,
                limit,
            } => write!(f, " target={target} source={source} limit={limit}"),
            Instruction::InsertLiteralVertex { target, ids }
            | Instruction::InsertLiteralEdge { target, ids } => {
                write!(f, " target={target} ids={ids:?}")
            }
            Instruction::CollapseEdge {
                target,
                source,
                fields,
            } => write!(f, " target={target} source={source} fields={fields:?}"),
            Instruction::GetEdgeEndpoint {
                target,
                subject,
                endpoint,
            } => write!(
                f,
                " target={target} subject={subject} component={}",
                endpoint.as_str()
            ),
            Instruction::GetSubgraph {
                target,
                subject,
                skeleton,
            } => write!(f, " target={target} subject={subject} skeleton={skeleton}"),
            Instruction::GetLineage {
                target,
                subject,
                start,
                depth,
                direction,
            } => write!(
                f,
                " target={target} subject={subject} start={start} depth={depth} direction={}",
                direction.as_str()
            ),
            Instruction::GetPath {
                target,
                subject,
                source,
                destination,
                max_depth,
            }
            | Instruction::GetShortestPath {
                target,
                subject,
                source,
                destination,
                max_depth,
            } => write!(
                f,
                " target={target} subject={subject} source={source} destination={destination} maxDepth={max_depth}"
            ),
            Instruction::SetGraphMetadata {
                target,
                scope,
                source,
                name,
                value,
            } => write!(
                f,
                " target={target} component={} source={source} name={name:?} value={value:?}",
                scope.as_str()
            ),
            Instruction::OverwriteGraphMetadata { target, lhs, rhs } => {
                write!(f, " target={target} lhs={lhs} rhs={rhs}")
            }
            Instruction::StatGraph { target } => write!(f, " target={target}"),
            Instruction::ExportGraph {
                target,
                format,
                force,
                path,
            } => {
                write!(f, " target={target} format={} force={force}", format.as_str())?;
                if let Some(path) = path {
                    write!(f, " path={path:?}")?;
                }
                Ok(())
            }
            Instruction::EvaluateQuery { query } => write!(f, " query={query:?}"),
        }
    }
}
