use std::collections::HashSet;

use dbarchiver_errors::{PreflightError, PreflightFinding};
use dbarchiver_graph::Graph;
use mysql_async::prelude::*;
use mysql_async::{Conn, Pool, Row};
use tracing::warn;

/// Verifies per-table readiness before a run starts, per spec.md §4.10.
pub struct PreflightChecker {
    pool: Pool,
    allow_delete_triggers: bool,
}

impl PreflightChecker {
    pub fn new(pool: Pool, allow_delete_triggers: bool) -> Self {
        PreflightChecker {
            pool,
            allow_delete_triggers,
        }
    }

    /// Check every table in `graph` against the live source schema,
    /// collecting all findings rather than stopping at the first.
    pub async fn check(&self, database: &str, graph: &Graph) -> Result<(), PreflightError> {
        let mut conn = self.pool.get_conn().await.map_err(|e| {
            PreflightError::Failed(vec![PreflightFinding {
                table: graph.root_name().to_string(),
                problem: format!("could not connect to source: {e}"),
            }])
        })?;

        let mut findings = Vec::new();
        for table in graph.table_names() {
            self.check_table(&mut conn, database, graph, table, &mut findings)
                .await;
        }

        if findings.is_empty() {
            Ok(())
        } else {
            Err(PreflightError::Failed(findings))
        }
    }

    async fn check_table(
        &self,
        conn: &mut Conn,
        database: &str,
        graph: &Graph,
        table: &str,
        findings: &mut Vec<PreflightFinding>,
    ) {
        let engine: Option<Row> = conn
            .exec_first(
                "SELECT engine FROM information_schema.tables WHERE table_schema = ? AND table_name = ?",
                (database, table),
            )
            .await
            .ok()
            .flatten();

        let Some(engine_row) = engine else {
            findings.push(PreflightFinding {
                table: table.to_string(),
                problem: "table does not exist in source schema".to_string(),
            });
            return;
        };

        let engine_name: String = engine_row.get("engine").unwrap_or_default();
        if !engine_name.eq_ignore_ascii_case("InnoDB") {
            findings.push(PreflightFinding {
                table: table.to_string(),
                problem: format!("storage engine `{engine_name}` does not support transactional deletes"),
            });
        }

        self.check_fk_coverage(conn, database, graph, table, findings).await;
        self.check_fk_indexes(conn, database, graph, table, findings).await;
        self.check_delete_triggers(conn, database, table, findings).await;
    }

    /// Every FK the schema actually declares on `table` must be covered by
    /// a relation the graph knows about, or deleting would cascade/fail
    /// unexpectedly.
    async fn check_fk_coverage(
        &self,
        conn: &mut Conn,
        database: &str,
        graph: &Graph,
        table: &str,
        findings: &mut Vec<PreflightFinding>,
    ) {
        let declared: HashSet<String> = graph
            .edge_meta(
                graph.parents_of(table).first().map(String::as_str).unwrap_or(""),
                table,
            )
            .map(|m| m.fk_column.clone())
            .into_iter()
            .collect();

        let rows: Vec<Row> = match conn
            .exec(
                "SELECT column_name, referenced_table_name, delete_rule
                 FROM information_schema.key_column_usage k
                 JOIN information_schema.referential_constraints r
                   ON k.constraint_name = r.constraint_name AND k.table_schema = r.constraint_schema
                 WHERE k.table_schema = ? AND k.table_name = ? AND k.referenced_table_name IS NOT NULL",
                (database, table),
            )
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                findings.push(PreflightFinding {
                    table: table.to_string(),
                    problem: format!("could not inspect foreign keys: {e}"),
                });
                return;
            }
        };

        for row in rows {
            let column: String = row.get("column_name").unwrap_or_default();
            let delete_rule: String = row.get("delete_rule").unwrap_or_default();

            if !declared.contains(&column) {
                findings.push(PreflightFinding {
                    table: table.to_string(),
                    problem: format!(
                        "foreign key on `{column}` is not covered by any declared relation"
                    ),
                });
            }
            if delete_rule.eq_ignore_ascii_case("CASCADE") {
                // Per spec.md §4.10, CASCADE rules are a warning, not a
                // blocking finding: unlike missing FK coverage or a DELETE
                // trigger, a cascading FK doesn't make the delete phase
                // touch undeclared rows in a way dbarchiver can't account
                // for (the graph already walks to that child explicitly).
                warn!(
                    table = %table,
                    column = %column,
                    "foreign key has ON DELETE CASCADE; source-side cascades may race with dbarchiver's own child deletes"
                );
            }
        }
    }

    /// The FK column the graph expects on `table` should have an index,
    /// otherwise Discovery's `IN (...)` lookups degrade to full scans.
    async fn check_fk_indexes(
        &self,
        conn: &mut Conn,
        database: &str,
        graph: &Graph,
        table: &str,
        findings: &mut Vec<PreflightFinding>,
    ) {
        let Some(node) = graph.node(table) else { return };
        let Some(fk_column) = &node.fk_column else { return };

        let indexed: Option<Row> = conn
            .exec_first(
                "SELECT 1 FROM information_schema.statistics
                 WHERE table_schema = ? AND table_name = ? AND column_name = ? LIMIT 1",
                (database, table, fk_column),
            )
            .await
            .ok()
            .flatten();

        if indexed.is_none() {
            findings.push(PreflightFinding {
                table: table.to_string(),
                problem: format!("no index on foreign key column `{fk_column}`"),
            });
        }
    }

    async fn check_delete_triggers(
        &self,
        conn: &mut Conn,
        database: &str,
        table: &str,
        findings: &mut Vec<PreflightFinding>,
    ) {
        if self.allow_delete_triggers {
            return;
        }
        let triggers: Vec<Row> = conn
            .exec(
                "SELECT trigger_name FROM information_schema.triggers
                 WHERE event_object_schema = ? AND event_object_table = ? AND event_manipulation = 'DELETE'",
                (database, table),
            )
            .await
            .unwrap_or_default();

        for trigger in triggers {
            let name: String = trigger.get("trigger_name").unwrap_or_default();
            findings.push(PreflightFinding {
                table: table.to_string(),
                problem: format!("DELETE trigger `{name}` would fire during the delete phase"),
            });
        }
    }
}
