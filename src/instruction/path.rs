//! Two-phase path reconstruction.
//!
//! Phase one sweeps backwards from the destination set and records every
//! connection it crosses together with its hop distance from the
//! destinations. Phase two walks forward from the source vertices that the
//! backward sweep reached, following only recorded connections that still
//! fit within the depth bound.

use tracing::trace;

use crate::backend::Backend;
use crate::entities::{EDGE_TABLE, Graph};
use crate::error::BackendError;
use crate::instruction::lineage::subject_filter;
use crate::sql::ScratchSpace;

pub(super) fn get_path(
    backend: &dyn Backend,
    target: &Graph,
    subject: &Graph,
    source: &Graph,
    destination: &Graph,
    max_depth: i64,
) -> Result<(), BackendError> {
    let filter = subject_filter(subject);
    let mut scratch = ScratchSpace::new(backend);
    let cur = scratch.create("cur", "id INTEGER")?;
    let next = scratch.create("next", "id INTEGER")?;
    let answer = scratch.create("answer", "id INTEGER")?;
    let sgconn = scratch.create("sgconn", "src INTEGER, dst INTEGER, depth INTEGER")?;

    backend.execute(&format!(
        "INSERT INTO {cur} SELECT id FROM {};\n\
         INSERT INTO {answer} SELECT id FROM {cur};",
        destination.vertex_table()
    ))?;

    for hop in 1..=max_depth {
        backend.execute(&format!(
            "INSERT INTO {sgconn} SELECT src, dst, {hop} FROM {EDGE_TABLE} \
             WHERE dst IN (SELECT id FROM {cur}){filter};\n\
             DELETE FROM {next};\n\
             INSERT INTO {next} SELECT src FROM {EDGE_TABLE} \
             WHERE dst IN (SELECT id FROM {cur}){filter} GROUP BY src;\n\
             DELETE FROM {cur};\n\
             INSERT INTO {cur} SELECT id FROM {next} WHERE id NOT IN (SELECT id FROM {answer});\n\
             INSERT INTO {answer} SELECT id FROM {cur};"
        ))?;
        if frontier_exhausted(backend, &cur, "backward", hop)? {
            break;
        }
    }

    restart_from_sources(backend, &cur, &answer, source)?;

    for hop in 0..max_depth {
        backend.execute(&format!(
            "DELETE FROM {next};\n\
             INSERT INTO {next} SELECT dst FROM {sgconn} \
             WHERE src IN (SELECT id FROM {cur}) AND depth + {hop} <= {max_depth} GROUP BY dst;\n\
             DELETE FROM {cur};\n\
             INSERT INTO {cur} SELECT id FROM {next} WHERE id NOT IN (SELECT id FROM {answer});\n\
             INSERT INTO {answer} SELECT id FROM {cur};"
        ))?;
        if frontier_exhausted(backend, &cur, "forward", hop)? {
            break;
        }
    }

    write_induced(backend, target, &answer, &filter)?;
    scratch.finish()
}

/// Like [`get_path`], but each forward step from a vertex toward a given
/// destination only follows the connections recorded at that vertex's
/// minimal distance to the destination, picking the lowest next-hop id.
pub(super) fn get_shortest_path(
    backend: &dyn Backend,
    target: &Graph,
    subject: &Graph,
    source: &Graph,
    destination: &Graph,
    max_depth: i64,
) -> Result<(), BackendError> {
    let filter = subject_filter(subject);
    let mut scratch = ScratchSpace::new(backend);

    let conn = scratch.create("conn", "src INTEGER, dst INTEGER")?;
    if subject.is_base() {
        backend.execute(&format!(
            "INSERT INTO {conn} SELECT src, dst FROM {EDGE_TABLE} GROUP BY src, dst;"
        ))?;
    } else {
        backend.execute(&format!(
            "INSERT INTO {conn} SELECT src, dst FROM {EDGE_TABLE} \
             WHERE id IN (SELECT id FROM {}) GROUP BY src, dst;",
            subject.edge_table()
        ))?;
    }

    let sgconn = scratch.create(
        "sgconn",
        "src INTEGER, dst INTEGER, reaching INTEGER, depth INTEGER",
    )?;
    let cur = scratch.create("cur", "id INTEGER, reaching INTEGER")?;
    let next = scratch.create("next", "id INTEGER, reaching INTEGER")?;
    let answer = scratch.create("answer", "id INTEGER")?;

    backend.execute(&format!(
        "INSERT INTO {cur} SELECT id, id FROM {};\n\
         INSERT INTO {answer} SELECT id FROM {cur} GROUP BY id;",
        destination.vertex_table()
    ))?;

    for hop in 1..=max_depth {
        backend.execute(&format!(
            "INSERT INTO {sgconn} SELECT k.src, k.dst, c.reaching, {hop} \
             FROM {cur} c, {conn} k WHERE c.id = k.dst;\n\
             DELETE FROM {next};\n\
             INSERT INTO {next} SELECT k.src, c.reaching FROM {cur} c, {conn} k WHERE c.id = k.dst;\n\
             DELETE FROM {cur};\n\
             INSERT INTO {cur} SELECT id, reaching FROM {next} \
             WHERE id NOT IN (SELECT id FROM {answer}) GROUP BY id, reaching;\n\
             INSERT INTO {answer} SELECT id FROM {cur} GROUP BY id;"
        ))?;
        if frontier_exhausted(backend, &cur, "backward", hop)? {
            break;
        }
    }

    let cur = scratch.create("cur", "id INTEGER")?;
    let next = scratch.create("next", "id INTEGER")?;
    restart_from_sources(backend, &cur, &answer, source)?;

    for hop in 0..max_depth {
        backend.execute(&format!(
            "DELETE FROM {next};\n\
             INSERT INTO {next} SELECT MIN(s.dst) FROM {cur} c, {sgconn} s \
             WHERE c.id = s.src AND s.depth + {hop} <= {max_depth} \
             AND s.depth = (SELECT MIN(t.depth) FROM {sgconn} t \
             WHERE t.src = s.src AND t.reaching = s.reaching) \
             GROUP BY s.src, s.reaching;\n\
             DELETE FROM {cur};\n\
             INSERT INTO {cur} SELECT id FROM {next} WHERE id NOT IN (SELECT id FROM {answer});\n\
             INSERT INTO {answer} SELECT id FROM {cur};"
        ))?;
        if frontier_exhausted(backend, &cur, "forward", hop)? {
            break;
        }
    }

    write_induced(backend, target, &answer, &filter)?;
    scratch.finish()
}

fn frontier_exhausted(
    backend: &dyn Backend,
    cur: &str,
    phase: &str,
    hop: i64,
) -> Result<bool, BackendError> {
    let frontier = backend.execute_for_long_result(&format!("SELECT COUNT(*) FROM {cur};"))?;
    trace!(phase, hop, frontier, "path step");
    Ok(frontier == 0)
}

/// Reset the frontier and the answer to the source vertices the backward
/// sweep reached.
fn restart_from_sources(
    backend: &dyn Backend,
    cur: &str,
    answer: &str,
    source: &Graph,
) -> Result<(), BackendError> {
    backend.execute(&format!(
        "DELETE FROM {cur};\n\
         INSERT INTO {cur} SELECT id FROM {} WHERE id IN (SELECT id FROM {answer});\n\
         DELETE FROM {answer};\n\
         INSERT INTO {answer} SELECT id FROM {cur};",
        source.vertex_table()
    ))?;
    Ok(())
}

fn write_induced(
    backend: &dyn Backend,
    target: &Graph,
    answer: &str,
    filter: &str,
) -> Result<(), BackendError> {
    backend.execute(&format!(
        "INSERT INTO {} SELECT id FROM {answer};\n\
         INSERT INTO {} SELECT id FROM {EDGE_TABLE} \
         WHERE src IN (SELECT id FROM {answer}) AND dst IN (SELECT id FROM {answer}){filter};",
        target.vertex_table(),
        target.edge_table()
    ))?;
    Ok(())
}
