use dbarchiver_errors::{Phase, PhaseError};
use dbarchiver_graph::Graph;
use mysql_async::prelude::*;
use mysql_async::{Params, Pool, Row, Value as SqlValue};

use crate::discovery::RecordSet;
use crate::retry::with_retry;
use crate::sql;
use crate::value::PkValue;

/// Rows written per table, surfaced in the orchestrator's run summary.
#[derive(Debug, Clone, Default)]
pub struct CopyStats {
    pub tables_copied: usize,
    pub records_copied: usize,
}

/// Writes a [`RecordSet`] to the destination in copy order, per
/// spec.md §4.4.
pub struct CopyPhase {
    source: Pool,
    destination: Pool,
    chunk_size: usize,
}

impl CopyPhase {
    pub fn new(source: Pool, destination: Pool, batch_copy_size: u64) -> Self {
        CopyPhase {
            source,
            destination,
            chunk_size: batch_copy_size.max(1) as usize,
        }
    }

    /// Copy every table in `graph.copy_order()` that has rows in
    /// `record_set`, parent-first. Each row write is a `REPLACE INTO`
    /// keyed by the table's primary key, which is what makes a retry after
    /// a partial copy converge to the same destination state as a clean
    /// run (spec.md §4.4's idempotence requirement).
    pub async fn copy(&self, graph: &Graph, record_set: &RecordSet) -> Result<CopyStats, PhaseError> {
        let mut stats = CopyStats::default();

        for table in graph.copy_order() {
            let pks = record_set.table(table);
            if pks.is_empty() {
                continue;
            }
            let pk_column = graph.pk(table).map_err(|e| PhaseError {
                phase: Phase::Copy,
                table: table.clone(),
                message: e.to_string(),
            })?;

            let copied = self
                .copy_table(table, pk_column, pks)
                .await
                .map_err(|e| PhaseError {
                    phase: Phase::Copy,
                    table: table.clone(),
                    message: e.to_string(),
                })?;

            stats.tables_copied += 1;
            stats.records_copied += copied;
        }

        Ok(stats)
    }

    async fn copy_table(
        &self,
        table: &str,
        pk_column: &str,
        pks: &[PkValue],
    ) -> Result<usize, dbarchiver_errors::TransientDbError> {
        let mut copied = 0usize;
        for chunk in sql::chunks(pks, self.chunk_size) {
            let rows = self.fetch_rows(table, pk_column, &chunk).await?;
            if rows.is_empty() {
                continue;
            }
            copied += rows.len();
            self.write_rows(table, rows).await?;
        }
        Ok(copied)
    }

    /// Each call to the driver is wrapped in [`with_retry`] (spec.md §7:
    /// `TransientDbError` is "retried inside the connection layer").
    async fn fetch_rows(
        &self,
        table: &str,
        pk_column: &str,
        pks: &[PkValue],
    ) -> Result<Vec<Row>, dbarchiver_errors::TransientDbError> {
        let quoted_table = sql::quote_ident(table);
        let quoted_pk = sql::quote_ident(pk_column);
        let placeholders = sql::placeholders(pks.len());
        let query = format!("SELECT * FROM {quoted_table} WHERE {quoted_pk} IN ({placeholders})");

        with_retry("copy:fetch_rows", || async {
            let mut conn = self.source.get_conn().await?;
            let params: Vec<SqlValue> = pks.iter().cloned().map(SqlValue::from).collect();
            conn.exec(query.clone(), Params::from(params)).await
        })
        .await
    }

    /// `REPLACE INTO` each row individually inside one transaction per
    /// chunk, so a chunk either lands in full or not at all and a retried
    /// chunk overwrites rather than duplicates.
    async fn write_rows(&self, table: &str, rows: Vec<Row>) -> Result<(), dbarchiver_errors::TransientDbError> {
        let columns: Vec<String> = rows[0]
            .columns_ref()
            .iter()
            .map(|c| c.name_str().to_string())
            .collect();

        let quoted_table = sql::quote_ident(table);
        let quoted_cols = columns
            .iter()
            .map(|c| sql::quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = sql::placeholders(columns.len());
        let query = format!("REPLACE INTO {quoted_table} ({quoted_cols}) VALUES ({placeholders})");

        with_retry("copy:write_rows", || async {
            let mut conn = self.destination.get_conn().await?;
            let mut tx = conn.start_transaction(Default::default()).await?;

            for row in &rows {
                let values: Vec<SqlValue> = (0..columns.len())
                    .map(|i| row.as_ref(i).cloned().unwrap_or(SqlValue::NULL))
                    .collect();
                tx.exec_drop(query.clone(), Params::from(values)).await?;
            }

            tx.commit().await
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_size_is_clamped_to_at_least_one() {
        let source = Pool::new("mysql://root@localhost:3306/test");
        let destination = Pool::new("mysql://root@localhost:3306/test");
        let phase = CopyPhase::new(source, destination, 0);
        assert_eq!(phase.chunk_size, 1);
    }
}
