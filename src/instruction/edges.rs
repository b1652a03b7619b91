use crate::backend::Backend;
use crate::entities::{EDGE_ANNO_TABLE, EDGE_TABLE, Graph};
use crate::error::BackendError;
use crate::instruction::EdgeEndpoint;
use crate::sql::{ScratchSpace, quote_literal};

/// Keep one edge (the lowest id) per endpoint pair and per combination of
/// values of `fields`. Edges missing any of the fields are dropped.
pub(super) fn collapse_edge(
    backend: &dyn Backend,
    target: &Graph,
    source: &Graph,
    fields: &[String],
) -> Result<(), BackendError> {
    let mut tables = String::new();
    let mut predicates = String::new();
    let mut groups = String::new();
    for (i, field) in fields.iter().enumerate() {
        let alias = format!("ea{i}");
        tables.push_str(&format!(", {EDGE_ANNO_TABLE} {alias}"));
        predicates.push_str(&format!(
            " AND e.id = {alias}.id AND {alias}.field = {}",
            quote_literal(field)
        ));
        groups.push_str(&format!(", {alias}.value"));
    }

    backend.execute(&format!(
        "INSERT INTO {} SELECT id FROM {};\n\
         INSERT INTO {} SELECT MIN(e.id) FROM {EDGE_TABLE} e{tables} \
         WHERE e.id IN (SELECT id FROM {}){predicates} \
         GROUP BY e.src, e.dst{groups};",
        target.vertex_table(),
        source.vertex_table(),
        target.edge_table(),
        source.edge_table()
    ))?;
    Ok(())
}

pub(super) fn edge_endpoints(
    backend: &dyn Backend,
    target: &Graph,
    subject: &Graph,
    endpoint: EdgeEndpoint,
) -> Result<(), BackendError> {
    let mut scratch = ScratchSpace::new(backend);
    let answer = scratch.create("answer", "id INTEGER")?;
    let subject_edges = subject.edge_table();

    let columns: &[&str] = match endpoint {
        EdgeEndpoint::Source => &["src"],
        EdgeEndpoint::Destination => &["dst"],
        EdgeEndpoint::Both => &["src", "dst"],
    };
    for column in columns {
        backend.execute(&format!(
            "INSERT INTO {answer} SELECT {column} FROM {EDGE_TABLE} \
             WHERE id IN (SELECT id FROM {subject_edges});"
        ))?;
    }
    backend.execute(&format!(
        "INSERT INTO {} SELECT id FROM {answer} GROUP BY id;",
        target.vertex_table()
    ))?;
    scratch.finish()
}

/// Vertices of `subject` that `skeleton` touches (as vertices or as edge
/// endpoints), plus every `subject` edge between them.
pub(super) fn subgraph(
    backend: &dyn Backend,
    target: &Graph,
    subject: &Graph,
    skeleton: &Graph,
) -> Result<(), BackendError> {
    let mut scratch = ScratchSpace::new(backend);
    let answer = scratch.create("answer", "id INTEGER")?;
    let subject_vertices = subject.vertex_table();
    let skeleton_edges = skeleton.edge_table();

    backend.execute(&format!(
        "INSERT INTO {answer} SELECT id FROM {} WHERE id IN (SELECT id FROM {subject_vertices});\n\
         INSERT INTO {answer} SELECT src FROM {EDGE_TABLE} \
         WHERE id IN (SELECT id FROM {skeleton_edges}) AND src IN (SELECT id FROM {subject_vertices});\n\
         INSERT INTO {answer} SELECT dst FROM {EDGE_TABLE} \
         WHERE id IN (SELECT id FROM {skeleton_edges}) AND dst IN (SELECT id FROM {subject_vertices});\n\
         INSERT INTO {} SELECT id FROM {answer} GROUP BY id;",
        skeleton.vertex_table(),
        target.vertex_table()
    ))?;
    backend.execute(&format!(
        "INSERT INTO {} SELECT s.id FROM {} s, {EDGE_TABLE} e \
         WHERE s.id = e.id AND e.src IN (SELECT id FROM {answer}) \
         AND e.dst IN (SELECT id FROM {answer}) GROUP BY s.id;",
        target.edge_table(),
        subject.edge_table()
    ))?;
    scratch.finish()
}
