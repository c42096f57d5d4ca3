use dbarchiver_errors::{VerificationMethod, VerificationMismatch, VerificationResult};
use dbarchiver_graph::Graph;
use mysql_async::prelude::*;
use mysql_async::{Params, Pool, Row, Value as SqlValue};
use sha2::{Digest, Sha256};

use crate::discovery::RecordSet;
use crate::retry::with_retry;
use crate::sql;
use crate::value::{canonicalize_row, PkValue};

/// Row-exact parity check between source and destination, per spec.md §4.5.
pub struct Verifier {
    source: Pool,
    destination: Pool,
    chunk_size: usize,
}

impl Verifier {
    pub fn new(source: Pool, destination: Pool, chunk_size: u64) -> Self {
        Verifier {
            source,
            destination,
            chunk_size: chunk_size.max(1) as usize,
        }
    }

    /// Verify every non-empty table in `record_set` using `method`.
    /// Stops at the first mismatching table (spec.md §4.5: "the verifier
    /// returns a failure result containing the per-table outcomes so the
    /// orchestrator can abort the run"), returning everything checked so
    /// far either way.
    pub async fn verify(
        &self,
        graph: &Graph,
        record_set: &RecordSet,
        method: VerificationMethod,
    ) -> Result<Vec<VerificationResult>, VerificationMismatch> {
        if matches!(method, VerificationMethod::Skip) {
            return Ok(Vec::new());
        }

        let mut results = Vec::new();
        for table in graph.copy_order() {
            let pks = record_set.table(table);
            if pks.is_empty() {
                continue;
            }
            let Ok(pk_column) = graph.pk(table) else { continue };

            let result = match method {
                VerificationMethod::Count => self.verify_count(table, pk_column, pks).await,
                VerificationMethod::Sha256 => self.verify_sha256(table, pk_column, pks).await,
                VerificationMethod::Skip => unreachable!(),
            };

            let mismatch = !result.is_match;
            results.push(result);
            if mismatch {
                return Err(VerificationMismatch(results));
            }
        }

        Ok(results)
    }

    async fn verify_count(&self, table: &str, pk_column: &str, pks: &[PkValue]) -> VerificationResult {
        let source_count = self.count_in(&self.source, table, pk_column, pks).await;
        let dest_count = self.count_in(&self.destination, table, pk_column, pks).await;

        match (source_count, dest_count) {
            (Ok(source_count), Ok(dest_count)) => VerificationResult {
                table: table.to_string(),
                method: VerificationMethod::Count,
                source_count,
                dest_count,
                source_digest: None,
                dest_digest: None,
                is_match: source_count == dest_count,
                error: if source_count == dest_count {
                    None
                } else {
                    Some(format!(
                        "count mismatch: source has {source_count} row(s), destination has {dest_count}"
                    ))
                },
            },
            (source_count, dest_count) => VerificationResult {
                table: table.to_string(),
                method: VerificationMethod::Count,
                source_count: source_count.unwrap_or(0),
                dest_count: dest_count.unwrap_or(0),
                source_digest: None,
                dest_digest: None,
                is_match: false,
                error: Some("could not count rows on one or both sides".to_string()),
            },
        }
    }

    async fn count_in(
        &self,
        pool: &Pool,
        table: &str,
        pk_column: &str,
        pks: &[PkValue],
    ) -> Result<u64, dbarchiver_errors::TransientDbError> {
        let quoted_table = sql::quote_ident(table);
        let quoted_pk = sql::quote_ident(pk_column);
        let placeholders = sql::placeholders(pks.len());
        let query = format!("SELECT COUNT(*) FROM {quoted_table} WHERE {quoted_pk} IN ({placeholders})");

        with_retry("verify:count_in", || async {
            let mut conn = pool.get_conn().await?;
            let params: Vec<SqlValue> = pks.iter().cloned().map(SqlValue::from).collect();
            conn.exec_first(query.clone(), Params::from(params))
                .await
                .map(|c: Option<u64>| c.unwrap_or(0))
        })
        .await
    }

    /// Stream rows from both sides ordered by PK ascending, in chunks of
    /// `self.chunk_size`, folding each row's canonical serialization into a
    /// running SHA-256 on each side. Requires equal digests *and* equal row
    /// counts, per spec.md §4.5.
    async fn verify_sha256(&self, table: &str, pk_column: &str, pks: &[PkValue]) -> VerificationResult {
        let mut sorted = pks.to_vec();
        sorted.sort();

        let mut source_hasher = Sha256::new();
        let mut dest_hasher = Sha256::new();
        let mut source_rows = 0u64;
        let mut dest_rows = 0u64;
        let mut error = None;

        for chunk in sql::chunks(&sorted, self.chunk_size) {
            let source_chunk = self.fetch_ordered(&self.source, table, pk_column, &chunk).await;
            let dest_chunk = self.fetch_ordered(&self.destination, table, pk_column, &chunk).await;

            match (source_chunk, dest_chunk) {
                (Ok(source_chunk), Ok(dest_chunk)) => {
                    source_rows += source_chunk.len() as u64;
                    dest_rows += dest_chunk.len() as u64;
                    for row in source_chunk {
                        hash_row(&mut source_hasher, &row);
                    }
                    for row in dest_chunk {
                        hash_row(&mut dest_hasher, &row);
                    }
                }
                _ => {
                    error = Some("could not stream rows on one or both sides".to_string());
                    break;
                }
            }
        }

        let source_digest = hex::encode(source_hasher.finalize());
        let dest_digest = hex::encode(dest_hasher.finalize());
        let is_match = error.is_none() && source_rows == dest_rows && source_digest == dest_digest;

        VerificationResult {
            table: table.to_string(),
            method: VerificationMethod::Sha256,
            source_count: source_rows,
            dest_count: dest_rows,
            source_digest: Some(source_digest.clone()),
            dest_digest: Some(dest_digest.clone()),
            is_match,
            error: error.or_else(|| {
                if is_match {
                    None
                } else if source_rows != dest_rows {
                    Some(format!(
                        "row count mismatch: source has {source_rows}, destination has {dest_rows}"
                    ))
                } else {
                    Some(format!(
                        "content digest mismatch: source={source_digest} destination={dest_digest}"
                    ))
                }
            }),
        }
    }

    async fn fetch_ordered(
        &self,
        pool: &Pool,
        table: &str,
        pk_column: &str,
        pks: &[PkValue],
    ) -> Result<Vec<Row>, dbarchiver_errors::TransientDbError> {
        let quoted_table = sql::quote_ident(table);
        let quoted_pk = sql::quote_ident(pk_column);
        let placeholders = sql::placeholders(pks.len());
        let query =
            format!("SELECT * FROM {quoted_table} WHERE {quoted_pk} IN ({placeholders}) ORDER BY {quoted_pk} ASC");

        with_retry("verify:fetch_ordered", || async {
            let mut conn = pool.get_conn().await?;
            let params: Vec<SqlValue> = pks.iter().cloned().map(SqlValue::from).collect();
            conn.exec(query.clone(), Params::from(params)).await
        })
        .await
    }
}

fn hash_row(hasher: &mut Sha256, row: &Row) {
    let columns: Vec<String> = row
        .columns_ref()
        .iter()
        .map(|c| c.name_str().to_string())
        .collect();
    let values: Vec<SqlValue> = (0..columns.len())
        .map(|i| row.as_ref(i).cloned().unwrap_or(SqlValue::NULL))
        .collect();
    hasher.update(canonicalize_row(&columns, &values).as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_size_is_clamped_to_at_least_one() {
        let source = Pool::new("mysql://root@localhost:3306/test");
        let destination = Pool::new("mysql://root@localhost:3306/test");
        let verifier = Verifier::new(source, destination, 0);
        assert_eq!(verifier.chunk_size, 1);
    }
}
