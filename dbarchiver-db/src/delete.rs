use dbarchiver_errors::{Phase, PhaseError};
use dbarchiver_graph::Graph;
use mysql_async::prelude::*;
use mysql_async::{Params, Pool, Value as SqlValue};

use crate::discovery::RecordSet;
use crate::retry::with_retry;
use crate::sql;
use crate::value::PkValue;

/// Rows deleted per table, surfaced in the orchestrator's run summary.
#[derive(Debug, Clone, Default)]
pub struct DeleteStats {
    pub tables_deleted: usize,
    pub records_deleted: usize,
}

/// Deletes a [`RecordSet`] from the source in delete order (children
/// first), per spec.md §4.6.
pub struct DeletePhase {
    source: Pool,
    chunk_size: usize,
}

impl DeletePhase {
    pub fn new(source: Pool, batch_delete_size: u64) -> Self {
        DeletePhase {
            source,
            chunk_size: batch_delete_size.max(1) as usize,
        }
    }

    pub async fn delete(&self, graph: &Graph, record_set: &RecordSet) -> Result<DeleteStats, PhaseError> {
        let mut stats = DeleteStats::default();

        for table in graph.delete_order() {
            let pks = record_set.table(&table);
            if pks.is_empty() {
                continue;
            }
            let pk_column = graph.pk(&table).map_err(|e| PhaseError {
                phase: Phase::Delete,
                table: table.clone(),
                message: e.to_string(),
            })?;

            let deleted = self
                .delete_table(&table, pk_column, pks)
                .await
                .map_err(|e| PhaseError {
                    phase: Phase::Delete,
                    table: table.clone(),
                    message: e.to_string(),
                })?;

            stats.tables_deleted += 1;
            stats.records_deleted += deleted;
        }

        Ok(stats)
    }

    async fn delete_table(
        &self,
        table: &str,
        pk_column: &str,
        pks: &[PkValue],
    ) -> Result<usize, dbarchiver_errors::TransientDbError> {
        let quoted_table = sql::quote_ident(table);
        let quoted_pk = sql::quote_ident(pk_column);

        let mut deleted = 0usize;
        for chunk in sql::chunks(pks, self.chunk_size) {
            let placeholders = sql::placeholders(chunk.len());
            let query = format!("DELETE FROM {quoted_table} WHERE {quoted_pk} IN ({placeholders})");

            with_retry("delete:delete_table", || async {
                let mut conn = self.source.get_conn().await?;
                let params: Vec<SqlValue> = chunk.iter().cloned().map(SqlValue::from).collect();
                conn.exec_drop(query.clone(), Params::from(params)).await
            })
            .await?;
            deleted += chunk.len();
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_size_is_clamped_to_at_least_one() {
        let source = Pool::new("mysql://root@localhost:3306/test");
        let phase = DeletePhase::new(source, 0);
        assert_eq!(phase.chunk_size, 1);
    }
}
