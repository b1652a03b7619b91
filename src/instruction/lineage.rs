use tracing::trace;

use crate::backend::Backend;
use crate::entities::{EDGE_TABLE, Graph};
use crate::error::BackendError;
use crate::instruction::Direction;
use crate::sql::ScratchSpace;

/// Restrict traversal to `subject`'s edges. The base graph covers every
/// edge, so no filter is needed there.
pub(super) fn subject_filter(subject: &Graph) -> String {
    if subject.is_base() {
        String::new()
    } else {
        format!(
            " AND {EDGE_TABLE}.id IN (SELECT id FROM {})",
            subject.edge_table()
        )
    }
}

pub(super) fn get_lineage(
    backend: &dyn Backend,
    target: &Graph,
    subject: &Graph,
    start: &Graph,
    depth: i64,
    direction: Direction,
) -> Result<(), BackendError> {
    let directions: &[Direction] = match direction {
        Direction::Both => &[Direction::Ancestor, Direction::Descendant],
        Direction::Ancestor => &[Direction::Ancestor],
        Direction::Descendant => &[Direction::Descendant],
    };
    let filter = subject_filter(subject);

    let mut scratch = ScratchSpace::new(backend);
    for one in directions {
        let (answer, answer_edge) =
            expand_one_direction(backend, &mut scratch, start, depth, *one, &filter)?;
        backend.execute(&format!(
            "INSERT INTO {} SELECT id FROM {answer};\n\
             INSERT INTO {} SELECT id FROM {answer_edge} GROUP BY id;",
            target.vertex_table(),
            target.edge_table()
        ))?;
    }
    scratch.finish()
}

/// Bounded frontier expansion. Returns the scratch relations holding the
/// visited vertices and traversed edges.
fn expand_one_direction(
    backend: &dyn Backend,
    scratch: &mut ScratchSpace<'_>,
    start: &Graph,
    depth: i64,
    direction: Direction,
    filter: &str,
) -> Result<(String, String), BackendError> {
    // Ancestors walk edges backwards: from a frontier at `dst` to `src`.
    let (from, to) = match direction {
        Direction::Ancestor => ("dst", "src"),
        _ => ("src", "dst"),
    };

    let cur = scratch.create("cur", "id INTEGER")?;
    let next = scratch.create("next", "id INTEGER")?;
    let answer = scratch.create("answer", "id INTEGER")?;
    let answer_edge = scratch.create("answer_edge", "id INTEGER")?;

    backend.execute(&format!(
        "INSERT INTO {cur} SELECT id FROM {};\n\
         INSERT INTO {answer} SELECT id FROM {cur};",
        start.vertex_table()
    ))?;

    let step = format!(
        "DELETE FROM {next};\n\
         INSERT INTO {next} SELECT {to} FROM {EDGE_TABLE} \
         WHERE {from} IN (SELECT id FROM {cur}){filter} GROUP BY {to};\n\
         INSERT INTO {answer_edge} SELECT id FROM {EDGE_TABLE} \
         WHERE {from} IN (SELECT id FROM {cur}){filter};\n\
         DELETE FROM {cur};\n\
         INSERT INTO {cur} SELECT id FROM {next} WHERE id NOT IN (SELECT id FROM {answer});\n\
         INSERT INTO {answer} SELECT id FROM {cur};"
    );
    for hop in 0..depth {
        backend.execute(&step)?;
        let frontier = backend.execute_for_long_result(&format!("SELECT COUNT(*) FROM {cur};"))?;
        trace!(hop, frontier, direction = direction.as_str(), "lineage step");
        if frontier == 0 {
            break;
        }
    }
    Ok((answer, answer_edge))
}
