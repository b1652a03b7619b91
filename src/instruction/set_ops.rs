use crate::backend::Backend;
use crate::entities::Graph;
use crate::error::BackendError;
use crate::sql::id_rows;

pub(super) fn create_empty_graph(backend: &dyn Backend, target: &Graph) -> Result<(), BackendError> {
    let vertex = target.vertex_table();
    let edge = target.edge_table();
    backend.execute(&format!(
        "DROP TABLE IF EXISTS {vertex};\n\
         DROP TABLE IF EXISTS {edge};\n\
         CREATE TABLE {vertex} (id INTEGER);\n\
         CREATE TABLE {edge} (id INTEGER);"
    ))?;
    Ok(())
}

/// Appends; duplicates already in `target` are kept.
pub(super) fn union(backend: &dyn Backend, target: &Graph, source: &Graph) -> Result<(), BackendError> {
    backend.execute(&format!(
        "INSERT INTO {} SELECT id FROM {};\n\
         INSERT INTO {} SELECT id FROM {};",
        target.vertex_table(),
        source.vertex_table(),
        target.edge_table(),
        source.edge_table()
    ))?;
    Ok(())
}

pub(super) fn intersect(
    backend: &dyn Backend,
    target: &Graph,
    lhs: &Graph,
    rhs: &Graph,
) -> Result<(), BackendError> {
    filter_by_membership(backend, target, lhs, rhs, "IN")
}

pub(super) fn subtract(
    backend: &dyn Backend,
    target: &Graph,
    minuend: &Graph,
    subtrahend: &Graph,
) -> Result<(), BackendError> {
    filter_by_membership(backend, target, minuend, subtrahend, "NOT IN")
}

fn filter_by_membership(
    backend: &dyn Backend,
    target: &Graph,
    source: &Graph,
    filter: &Graph,
    membership: &str,
) -> Result<(), BackendError> {
    backend.execute(&format!(
        "INSERT INTO {} SELECT id FROM {} WHERE id {membership} (SELECT id FROM {});\n\
         INSERT INTO {} SELECT id FROM {} WHERE id {membership} (SELECT id FROM {});",
        target.vertex_table(),
        source.vertex_table(),
        filter.vertex_table(),
        target.edge_table(),
        source.edge_table(),
        filter.edge_table()
    ))?;
    Ok(())
}

pub(super) fn distinctify(
    backend: &dyn Backend,
    target: &Graph,
    source: &Graph,
) -> Result<(), BackendError> {
    backend.execute(&format!(
        "INSERT INTO {} SELECT id FROM {} GROUP BY id;\n\
         INSERT INTO {} SELECT id FROM {} GROUP BY id;",
        target.vertex_table(),
        source.vertex_table(),
        target.edge_table(),
        source.edge_table()
    ))?;
    Ok(())
}

/// First `limit` distinct vertices and edges of `source`, lowest ids first.
pub(super) fn limit(
    backend: &dyn Backend,
    target: &Graph,
    source: &Graph,
    limit: i64,
) -> Result<(), BackendError> {
    for (into, from) in [
        (target.vertex_table(), source.vertex_table()),
        (target.edge_table(), source.edge_table()),
    ] {
        let count = backend.execute_for_long_result(&format!("SELECT COUNT(*) FROM {from};"))?;
        if count > 0 {
            backend.execute(&format!(
                "INSERT INTO {into} SELECT id FROM {from} GROUP BY id ORDER BY id LIMIT {limit};"
            ))?;
        }
    }
    Ok(())
}

pub(super) fn insert_literal(
    backend: &dyn Backend,
    table: &str,
    ids: &[i64],
) -> Result<(), BackendError> {
    if ids.is_empty() {
        return Ok(());
    }
    backend.execute(&format!("INSERT INTO {table} (id) VALUES {};", id_rows(ids)))?;
    Ok(())
}
