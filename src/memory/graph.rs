//! Directed weighted memory graph and traversal.
//!
//! Edges reference memory identifiers, not memory records, so traversal stays
//! decoupled from the storage representation. Traversal is breadth-first,
//! hop-limited, direction-aware, and cycle-safe: a node is claimed at its
//! first (shortest-hop) discovery and later, longer paths to it are dropped.

use std::collections::{HashMap, HashSet};

use rusqlite::{params, Connection};

use crate::error::{EngramError, Result};
use crate::memory::repository;
use crate::memory::types::{Direction, Edge, TraversalNode};

/// Create a directed edge between two existing memories.
///
/// Repeated calls with identical parameters create independent parallel
/// edges — there is no deduplication. Weight is intended to lie in (0,1] for
/// multiplicative decay to make sense, but the range is not enforced.
pub fn add_edge(
    conn: &Connection,
    source_id: &str,
    target_id: &str,
    predicate: &str,
    weight: f64,
) -> Result<Edge> {
    require_memory(conn, source_id, "source")?;
    require_memory(conn, target_id, "target")?;

    let id = uuid::Uuid::now_v7().to_string();
    let now = chrono::Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO memory_edges (id, source_id, target_id, predicate, weight, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![id, source_id, target_id, predicate, weight, now],
    )?;

    Ok(Edge {
        id,
        source_id: source_id.to_string(),
        target_id: target_id.to_string(),
        predicate: predicate.to_string(),
        weight,
        created_at: now,
    })
}

/// Breadth-first traversal from `start_id`, layer by layer up to `max_hops`.
///
/// Hop 0 is the start node itself at score 1.0. Within a layer, neighbors are
/// visited in edge-insertion order for determinism. When `weighted` is true a
/// node's score is the product of the traversed edge weights times
/// `decay^hops`; otherwise it is just `decay^hops`.
pub fn traverse(
    conn: &Connection,
    start_id: &str,
    max_hops: i64,
    direction: Direction,
    decay: f64,
    weighted: bool,
) -> Result<Vec<TraversalNode>> {
    if max_hops < 0 {
        return Err(EngramError::Validation(format!(
            "max_hops must be >= 0, got {max_hops}"
        )));
    }
    if !(decay > 0.0 && decay <= 1.0) {
        return Err(EngramError::Validation(format!(
            "decay must be within (0.0, 1.0], got {decay}"
        )));
    }
    require_memory(conn, start_id, "start")?;

    // Saturate oversized budgets instead of truncating; the frontier empties
    // long before u32::MAX hops on any real graph.
    let hop_budget = u32::try_from(max_hops).unwrap_or(u32::MAX);

    // Discovery order, with path weight (product of edge weights) per node.
    let mut discovered: Vec<(String, f64, u32)> = vec![(start_id.to_string(), 1.0, 0)];
    let mut path_weight: HashMap<String, f64> = HashMap::from([(start_id.to_string(), 1.0)]);
    let mut visited: HashSet<String> = HashSet::from([start_id.to_string()]);
    let mut frontier: Vec<String> = vec![start_id.to_string()];

    for hop in 1..=hop_budget {
        if frontier.is_empty() {
            break;
        }

        let mut next_frontier = Vec::new();
        for (from, to, weight) in neighbors(conn, &frontier, direction)? {
            if visited.contains(&to) {
                continue; // first discovery wins — cycle and diamond safe
            }
            visited.insert(to.clone());
            let pw = path_weight[&from] * weight;
            path_weight.insert(to.clone(), pw);
            discovered.push((to.clone(), pw, hop));
            next_frontier.push(to);
        }
        frontier = next_frontier;
    }

    // Hydrate memories and compute final scores.
    let ids: Vec<&str> = discovered.iter().map(|(id, _, _)| id.as_str()).collect();
    let mut records = repository::fetch_memories(conn, &ids)?;

    let mut nodes = Vec::with_capacity(discovered.len());
    for (id, pw, hops) in discovered {
        let Some(memory) = records.remove(&id) else {
            continue;
        };
        let decay_factor = decay.powi(hops as i32);
        let score = if weighted { pw * decay_factor } else { decay_factor };
        nodes.push(TraversalNode { memory, score, hops });
    }
    Ok(nodes)
}

/// Edges adjacent to the frontier, as `(from, to, weight)` triples in
/// edge-insertion (rowid) order.
fn neighbors(
    conn: &Connection,
    frontier: &[String],
    direction: Direction,
) -> Result<Vec<(String, String, f64)>> {
    let mut rows: Vec<(i64, String, String, f64)> = Vec::new();

    if matches!(direction, Direction::Outgoing | Direction::Both) {
        rows.extend(adjacent(conn, frontier, "source_id", "target_id")?);
    }
    if matches!(direction, Direction::Incoming | Direction::Both) {
        rows.extend(adjacent(conn, frontier, "target_id", "source_id")?);
    }

    // Interleave both orientations in global insertion order.
    rows.sort_by_key(|(rowid, _, _, _)| *rowid);
    Ok(rows
        .into_iter()
        .map(|(_, from, to, weight)| (from, to, weight))
        .collect())
}

fn adjacent(
    conn: &Connection,
    frontier: &[String],
    from_col: &str,
    to_col: &str,
) -> Result<Vec<(i64, String, String, f64)>> {
    if frontier.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders: Vec<String> = (1..=frontier.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "SELECT rowid, {from_col}, {to_col}, weight FROM memory_edges \
         WHERE {from_col} IN ({}) ORDER BY rowid",
        placeholders.join(", ")
    );

    let mut stmt = conn.prepare(&sql)?;
    let params_vec: Vec<&dyn rusqlite::types::ToSql> = frontier
        .iter()
        .map(|id| id as &dyn rusqlite::types::ToSql)
        .collect();

    let rows = stmt
        .query_map(params_vec.as_slice(), |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn require_memory(conn: &Connection, id: &str, role: &str) -> Result<()> {
    conn.query_row(
        "SELECT 1 FROM memories WHERE id = ?1",
        params![id],
        |row| row.get::<_, i64>(0),
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => {
            EngramError::NotFound(format!("{role} memory not found: {id}"))
        }
        other => other.into(),
    })?;
    Ok(())
}
