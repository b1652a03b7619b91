use crate::backend::Backend;
use crate::entities::{Graph, GraphMetadata};
use crate::error::BackendError;
use crate::instruction::MetadataScope;
use crate::sql::quote_literal;

pub(super) fn create_empty_metadata(
    backend: &dyn Backend,
    target: &GraphMetadata,
) -> Result<(), BackendError> {
    let vertex = target.vertex_table();
    let edge = target.edge_table();
    backend.execute(&format!(
        "DROP TABLE IF EXISTS {vertex};\n\
         DROP TABLE IF EXISTS {edge};\n\
         CREATE TABLE {vertex} (id INTEGER, name TEXT, value TEXT);\n\
         CREATE TABLE {edge} (id INTEGER, name TEXT, value TEXT);"
    ))?;
    Ok(())
}

/// One `(id, name, value)` row per distinct id of the selected side of `source`.
pub(super) fn set_metadata(
    backend: &dyn Backend,
    target: &GraphMetadata,
    scope: MetadataScope,
    source: &Graph,
    name: &str,
    value: &str,
) -> Result<(), BackendError> {
    let name = quote_literal(name);
    let value = quote_literal(value);
    let mut pairs = Vec::with_capacity(2);
    if matches!(scope, MetadataScope::Vertex | MetadataScope::Both) {
        pairs.push((target.vertex_table(), source.vertex_table()));
    }
    if matches!(scope, MetadataScope::Edge | MetadataScope::Both) {
        pairs.push((target.edge_table(), source.edge_table()));
    }
    for (into, from) in pairs {
        backend.execute(&format!(
            "INSERT INTO {into} SELECT id, {name}, {value} FROM {from} GROUP BY id;"
        ))?;
    }
    Ok(())
}

/// `lhs` rows whose `(id, name)` does not appear in `rhs`, then every `rhs` row.
pub(super) fn overwrite_metadata(
    backend: &dyn Backend,
    target: &GraphMetadata,
    lhs: &GraphMetadata,
    rhs: &GraphMetadata,
) -> Result<(), BackendError> {
    let mut statements = String::new();
    for (into, left, right) in [
        (target.vertex_table(), lhs.vertex_table(), rhs.vertex_table()),
        (target.edge_table(), lhs.edge_table(), rhs.edge_table()),
    ] {
        statements.push_str(&format!(
            "INSERT INTO {into} SELECT id, name, value FROM {left} l \
             WHERE NOT EXISTS (SELECT 1 FROM {right} r WHERE l.id = r.id AND l.name = r.name);\n\
             INSERT INTO {into} SELECT id, name, value FROM {right};\n"
        ));
    }
    backend.execute(&statements)?;
    Ok(())
}
