use mysql_async::prelude::*;
use mysql_async::Pool;

use crate::sql;

/// Row-count and batch-count estimates for a job, with no writes and no PK
/// materialization, per SPEC_FULL.md §B ("reuse the Discovery BFS machinery
/// but issue `COUNT(*)` instead of PK-selecting queries").
#[derive(Debug, Clone)]
pub struct TableEstimate {
    pub table: String,
    pub estimated_rows: u64,
}

#[derive(Debug, Clone)]
pub struct JobEstimate {
    pub root_rows: u64,
    pub batch_count: u64,
    pub tables: Vec<TableEstimate>,
}

pub struct Estimator {
    pool: Pool,
}

impl Estimator {
    pub fn new(pool: Pool) -> Self {
        Estimator { pool }
    }

    /// Estimate row counts for the root table and every descendant in
    /// `graph`, plus the number of batches a real run would take.
    ///
    /// Each descendant's count is produced by one `COUNT(DISTINCT ...)`
    /// query chaining `JOIN`s back to the root along the graph's parent
    /// edges, rather than fetching and holding every intervening PK in
    /// memory the way [`crate::discovery::Discovery`] does for a real
    /// batch.
    pub async fn estimate(
        &self,
        graph: &dbarchiver_graph::Graph,
        predicate: Option<&str>,
        batch_size: u64,
    ) -> Result<JobEstimate, mysql_async::Error> {
        let mut conn = self.pool.get_conn().await?;
        let root = graph.root_name();
        let root_pk = graph.pk(root).expect("root always has a pk");

        let root_rows = self.count_root(&mut conn, root, predicate).await?;
        let batch_count = if batch_size == 0 {
            0
        } else {
            (root_rows + batch_size - 1) / batch_size
        };

        let mut tables = Vec::new();
        for table in graph.copy_order() {
            if table == root {
                continue;
            }
            let path = join_path(graph, table);
            let estimated_rows = self.count_joined(&mut conn, root, root_pk, &path, predicate).await?;
            tables.push(TableEstimate {
                table: table.clone(),
                estimated_rows,
            });
        }

        Ok(JobEstimate {
            root_rows,
            batch_count,
            tables,
        })
    }

    async fn count_root(
        &self,
        conn: &mut mysql_async::Conn,
        root: &str,
        predicate: Option<&str>,
    ) -> Result<u64, mysql_async::Error> {
        let quoted = sql::quote_ident(root);
        let where_clause = predicate.map(|p| format!(" WHERE ({p})")).unwrap_or_default();
        let query = format!("SELECT COUNT(*) FROM {quoted}{where_clause}");
        conn.query_first(query).await.map(|c: Option<u64>| c.unwrap_or(0))
    }

    async fn count_joined(
        &self,
        conn: &mut mysql_async::Conn,
        root: &str,
        root_pk: &str,
        path: &[JoinStep],
        predicate: Option<&str>,
    ) -> Result<u64, mysql_async::Error> {
        let Some(last) = path.last() else {
            return Ok(0);
        };
        let quoted_root = sql::quote_ident(root);
        let quoted_root_pk = sql::quote_ident(root_pk);
        let quoted_target = sql::quote_ident(&last.table);
        let quoted_target_pk = sql::quote_ident(&last.pk_column);

        let mut query = format!("SELECT COUNT(DISTINCT {quoted_target}.{quoted_target_pk}) FROM {quoted_root}");
        let mut previous = root.to_string();
        for step in path {
            let quoted_table = sql::quote_ident(&step.table);
            let quoted_fk = sql::quote_ident(&step.fk_column);
            let quoted_ref = sql::quote_ident(&step.ref_column);
            let quoted_prev = sql::quote_ident(&previous);
            query.push_str(&format!(
                " JOIN {quoted_table} ON {quoted_table}.{quoted_fk} = {quoted_prev}.{quoted_ref}"
            ));
            previous = step.table.clone();
        }
        if let Some(predicate) = predicate {
            // Written against the root table's own columns, unqualified,
            // matching how `RootFetcher` applies the same predicate string.
            query.push_str(&format!(" WHERE ({predicate})"));
        }

        conn.query_first(query).await.map(|c: Option<u64>| c.unwrap_or(0))
    }
}

struct JoinStep {
    table: String,
    pk_column: String,
    fk_column: String,
    ref_column: String,
}

/// The chain of joins from the root to `table`, root-first. The job
/// configuration format is a tree, so this path is unique.
fn join_path(graph: &dbarchiver_graph::Graph, table: &str) -> Vec<JoinStep> {
    let mut steps = Vec::new();
    let mut current = table.to_string();

    while current != graph.root_name() {
        let Some(parent) = graph.parents_of(&current).first().cloned() else {
            break;
        };
        let Some(meta) = graph.edge_meta(&parent, &current) else {
            break;
        };
        let pk_column = graph.pk(&current).expect("node in graph has a pk").to_string();
        steps.push(JoinStep {
            table: current.clone(),
            pk_column,
            fk_column: meta.fk_column.clone(),
            ref_column: meta.ref_column.clone(),
        });
        current = parent;
    }

    steps.reverse();
    steps
}

#[cfg(test)]
mod tests {
    use dbarchiver_graph::GraphBuilder;

    use super::*;

    fn sample_graph() -> dbarchiver_graph::Graph {
        GraphBuilder::from_relation_spec(
            "users",
            "id",
            &[dbarchiver_graph::RelationSpec {
                table: "orders".into(),
                primary_key: "id".into(),
                foreign_key: "user_id".into(),
                dep_kind: None,
                children: vec![dbarchiver_graph::RelationSpec {
                    table: "order_items".into(),
                    primary_key: "id".into(),
                    foreign_key: "order_id".into(),
                    dep_kind: None,
                    children: vec![],
                }],
            }],
        )
        .unwrap()
    }

    #[test]
    fn join_path_is_empty_for_the_root() {
        let graph = sample_graph();
        assert!(join_path(&graph, "users").is_empty());
    }

    #[test]
    fn join_path_walks_from_root_to_direct_child() {
        let graph = sample_graph();
        let path = join_path(&graph, "orders");
        assert_eq!(path.len(), 1);
        assert_eq!(path[0].table, "orders");
        assert_eq!(path[0].fk_column, "user_id");
        assert_eq!(path[0].ref_column, "id");
    }

    #[test]
    fn join_path_chains_through_grandchildren_root_first() {
        let graph = sample_graph();
        let path = join_path(&graph, "order_items");
        assert_eq!(path.len(), 2);
        assert_eq!(path[0].table, "orders");
        assert_eq!(path[1].table, "order_items");
        assert_eq!(path[1].fk_column, "order_id");
    }
}
