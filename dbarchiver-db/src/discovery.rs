use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use dbarchiver_errors::{Phase, PhaseError};
use dbarchiver_graph::Graph;
use mysql_async::prelude::*;
use mysql_async::{Pool, Row, Value as SqlValue};

use crate::retry::with_retry;
use crate::sql;
use crate::value::PkValue;

/// Statistics attached to a [`RecordSet`], surfaced in the orchestrator's
/// run summary and the `dry-run` subcommand.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryStats {
    pub tables_scanned: usize,
    pub records_found: usize,
    pub bfs_depth: usize,
    pub elapsed: Duration,
}

/// The transitive closure of a batch of root PKs under the graph, per
/// spec.md §3.
#[derive(Debug, Clone)]
pub struct RecordSet {
    pub root_pks: Vec<PkValue>,
    pub by_table: HashMap<String, Vec<PkValue>>,
    pub stats: DiscoveryStats,
}

impl RecordSet {
    pub fn table(&self, name: &str) -> &[PkValue] {
        self.by_table.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn total_records(&self) -> usize {
        self.by_table.values().map(Vec::len).sum()
    }
}

/// BFS-expands a batch of root PKs into a [`RecordSet`], per spec.md §4.3.
pub struct Discovery {
    pool: Pool,
    chunk_size: usize,
}

impl Discovery {
    pub fn new(pool: Pool, chunk_size: u64) -> Self {
        Discovery {
            pool,
            chunk_size: chunk_size.max(1) as usize,
        }
    }

    /// Walk `graph` in copy order (parents before children) so every
    /// `by_table[parent]` is fully materialized before any query that
    /// depends on it. Deduplicates within each table's result set.
    pub async fn discover(&self, graph: &Graph, root_pks: Vec<PkValue>) -> Result<RecordSet, PhaseError> {
        let started = Instant::now();
        let mut by_table: HashMap<String, Vec<PkValue>> = HashMap::new();
        by_table.insert(graph.root_name().to_string(), root_pks.clone());

        let order = graph.copy_order();
        let mut tables_scanned = 1; // the root table counts as scanned.
        let mut max_depth = 0usize;

        for table in order.iter().skip(1) {
            let Some(node) = graph.node(table) else { continue };
            let parent = match graph.parents_of(table).first() {
                Some(p) => p.clone(),
                None => continue,
            };
            let Some(meta) = graph.edge_meta(&parent, table) else { continue };

            let parent_values = by_table.get(&parent).cloned().unwrap_or_default();
            if parent_values.is_empty() {
                by_table.insert(table.clone(), Vec::new());
                continue;
            }

            let pk_column = &node.pk_column;
            let fk_column = &meta.fk_column;

            let mut found: HashSet<PkValue> = HashSet::new();
            for chunk in sql::chunks(&parent_values, self.chunk_size) {
                let rows = self
                    .fetch_children(table, pk_column, fk_column, &chunk)
                    .await
                    .map_err(|e| PhaseError {
                        phase: Phase::Discovery,
                        table: table.clone(),
                        message: e.to_string(),
                    })?;
                found.extend(rows);
            }

            tables_scanned += 1;
            max_depth = max_depth.max(1 + depth_of(graph, table));
            by_table.insert(table.clone(), found.into_iter().collect());
        }

        let records_found: usize = by_table.values().map(Vec::len).sum();

        Ok(RecordSet {
            root_pks,
            by_table,
            stats: DiscoveryStats {
                tables_scanned,
                records_found,
                bfs_depth: max_depth,
                elapsed: started.elapsed(),
            },
        })
    }

    async fn fetch_children(
        &self,
        table: &str,
        pk_column: &str,
        fk_column: &str,
        parent_values: &[PkValue],
    ) -> Result<Vec<PkValue>, dbarchiver_errors::TransientDbError> {
        let quoted_table = sql::quote_ident(table);
        let quoted_pk = sql::quote_ident(pk_column);
        let quoted_fk = sql::quote_ident(fk_column);
        let placeholders = sql::placeholders(parent_values.len());
        let query = format!("SELECT {quoted_pk} FROM {quoted_table} WHERE {quoted_fk} IN ({placeholders})");

        let rows: Vec<Row> = with_retry("discovery:fetch_children", || async {
            let mut conn = self.pool.get_conn().await?;
            let params: Vec<SqlValue> = parent_values.iter().cloned().map(SqlValue::from).collect();
            conn.exec(query.clone(), mysql_async::Params::from(params)).await
        })
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let value: SqlValue = row.get(0).expect("single-column select");
            if let Ok(pk) = PkValue::try_from(value) {
                out.push(pk);
            }
        }
        Ok(out)
    }
}

/// Distance from the root along the graph's parent edges. Used only to
/// report `bfs_depth`; cheap to recompute since graphs are small.
fn depth_of(graph: &Graph, table: &str) -> usize {
    let mut depth = 0;
    let mut current = table.to_string();
    while let Some(parent) = graph.parents_of(&current).first() {
        depth += 1;
        current = parent.clone();
        if depth > graph.len() {
            break; // guards against any future non-acyclic graph sneaking through.
        }
    }
    depth
}
