use mysql_async::prelude::*;
use mysql_async::{Params, Pool, Row, Value as SqlValue};

use crate::retry::with_retry;
use crate::value::PkValue;

/// Produces ascending batches of root PKs, strictly greater than the
/// seeded checkpoint, matching the job predicate. Uses keyset pagination
/// (`WHERE pk > last AND <predicate> ORDER BY pk LIMIT n`) rather than
/// `OFFSET`, per spec.md §4.8, so concurrent inserts can't shift or repeat
/// a page.
pub struct RootFetcher {
    pool: Pool,
    table: String,
    pk_column: String,
    predicate: Option<String>,
    batch_size: u64,
    cursor: Option<PkValue>,
}

impl RootFetcher {
    pub fn new(
        pool: Pool,
        table: impl Into<String>,
        pk_column: impl Into<String>,
        predicate: Option<String>,
        batch_size: u64,
        start_after: Option<PkValue>,
    ) -> Self {
        RootFetcher {
            pool,
            table: table.into(),
            pk_column: pk_column.into(),
            predicate,
            batch_size: batch_size.max(1),
            cursor: start_after,
        }
    }

    /// Fetch the next batch. An empty `Vec` signals end-of-stream.
    pub async fn next_batch(&mut self) -> Result<Vec<PkValue>, dbarchiver_errors::TransientDbError> {
        let quoted_table = crate::sql::quote_ident(&self.table);
        let quoted_pk = crate::sql::quote_ident(&self.pk_column);

        let mut clauses = Vec::new();
        if self.cursor.is_some() {
            clauses.push(format!("{quoted_pk} > ?"));
        }
        if let Some(predicate) = &self.predicate {
            clauses.push(format!("({predicate})"));
        }

        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };

        let sql = format!(
            "SELECT {quoted_pk} FROM {quoted_table} {where_clause} ORDER BY {quoted_pk} ASC LIMIT {}",
            self.batch_size
        );

        let cursor = self.cursor.clone();
        let rows: Vec<Row> = with_retry("root_fetcher:next_batch", || async {
            let mut conn = self.pool.get_conn().await?;
            let mut params: Vec<SqlValue> = Vec::new();
            if let Some(cursor) = &cursor {
                params.push(SqlValue::from(cursor.clone()));
            }
            conn.exec(sql.clone(), Params::from(params)).await
        })
        .await?;

        let mut batch = Vec::with_capacity(rows.len());
        for row in rows {
            let value: SqlValue = row.get(0).expect("single-column select");
            if let Ok(pk) = PkValue::try_from(value) {
                batch.push(pk);
            }
        }

        if let Some(last) = batch.last() {
            self.cursor = Some(last.clone());
        }

        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_size_is_clamped_to_at_least_one() {
        // Construction alone should never panic even for a zero batch size;
        // the clamp happens at construction time.
        let pool = Pool::new("mysql://root@localhost:3306/test");
        let fetcher = RootFetcher::new(pool, "users", "id", None, 0, None);
        assert_eq!(fetcher.batch_size, 1);
    }
}
