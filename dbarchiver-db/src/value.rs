use std::fmt;

use mysql_async::Value as SqlValue;

/// A primary (or foreign) key value, abstracted away from `mysql_async`'s
/// wire-level [`SqlValue`] so the rest of this crate doesn't need to match
/// on every variant every time it wants to compare, hash or sort a key.
///
/// Mirrors the columnar-type boundary the teacher keeps at the edge of its
/// own wire codecs (one canonical in-process value enum, driver types
/// converted at the boundary only).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PkValue {
    Int(i64),
    UInt(u64),
    Bytes(Vec<u8>),
}

impl PkValue {
    /// Reconstruct a [`PkValue`] from its persisted text form (the
    /// `dbarchiver_jobs.last_processed_root_pk` column). The original
    /// variant (int vs bytes) is not recoverable from text alone, but
    /// binding it back as a query parameter round-trips correctly: MySQL
    /// coerces a string parameter to the column's declared type for
    /// comparison.
    pub fn from_text(text: String) -> Self {
        PkValue::Bytes(text.into_bytes())
    }

    /// Render this value as it appears on the wire. Used when embedding a
    /// value inside a diagnostic message.
    pub fn display(&self) -> String {
        match self {
            PkValue::Int(v) => v.to_string(),
            PkValue::UInt(v) => v.to_string(),
            PkValue::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
        }
    }
}

impl fmt::Display for PkValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

/// Error produced when a row's primary key column is `NULL` or otherwise
/// cannot be represented as a [`PkValue`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("column value cannot be used as a primary key: {0}")]
pub struct NotAPrimaryKey(pub String);

impl TryFrom<SqlValue> for PkValue {
    type Error = NotAPrimaryKey;

    fn try_from(value: SqlValue) -> Result<Self, Self::Error> {
        match value {
            SqlValue::Int(v) => Ok(PkValue::Int(v)),
            SqlValue::UInt(v) => Ok(PkValue::UInt(v)),
            SqlValue::Bytes(b) => Ok(PkValue::Bytes(b)),
            SqlValue::NULL => Err(NotAPrimaryKey("NULL".to_string())),
            other => Err(NotAPrimaryKey(format!("{other:?}"))),
        }
    }
}

impl From<PkValue> for SqlValue {
    fn from(value: PkValue) -> Self {
        match value {
            PkValue::Int(v) => SqlValue::Int(v),
            PkValue::UInt(v) => SqlValue::UInt(v),
            PkValue::Bytes(b) => SqlValue::Bytes(b),
        }
    }
}

/// Canonicalize a single column value for the SHA-256 content verifier:
/// `NULL` becomes the literal `NULL`, byte columns are interpreted as UTF-8
/// (lossily — this is a deliberate, documented limitation, see spec.md §9),
/// numbers use their shortest lossless decimal form, booleans render as
/// `true`/`false`.
///
/// The separator chosen (`\x1f` unit separator, not `|`) avoids the
/// collision spec.md §9 flags with a naive `|`-joined scheme: `\x1f` cannot
/// appear in a MySQL text/varchar value round-tripped through the wire
/// protocol's normal encoding, so two distinct rows cannot serialize to the
/// same bytes by embedding the separator in their data.
pub fn canonicalize_column(value: &SqlValue) -> String {
    match value {
        SqlValue::NULL => "NULL".to_string(),
        SqlValue::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
        SqlValue::Int(v) => v.to_string(),
        SqlValue::UInt(v) => v.to_string(),
        SqlValue::Float(v) => format_float(*v as f64),
        SqlValue::Double(v) => format_float(*v),
        SqlValue::Date(year, month, day, hour, minute, second, micros) => {
            format!("{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}.{micros:06}")
        }
        SqlValue::Time(neg, days, hours, minutes, seconds, micros) => {
            let sign = if *neg { "-" } else { "" };
            format!("{sign}{days}d{hours:02}:{minutes:02}:{seconds:02}.{micros:06}")
        }
    }
}

fn format_float(v: f64) -> String {
    if v == v.trunc() && v.is_finite() {
        format!("{v:.0}")
    } else {
        format!("{v}")
    }
}

/// Join a row's canonicalized columns with the unit-separator control
/// character, prefixed by column name so reordering columns cannot make two
/// different rows collide.
pub fn canonicalize_row(columns: &[String], values: &[SqlValue]) -> String {
    columns
        .iter()
        .zip(values.iter())
        .map(|(col, val)| format!("{col}=\x1f{}\x1f", canonicalize_column(val)))
        .collect::<Vec<_>>()
        .join("\x1e")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_rows_serialize_identically() {
        let cols = vec!["id".to_string(), "name".to_string()];
        let a = vec![SqlValue::Int(1), SqlValue::Bytes(b"alice".to_vec())];
        let b = vec![SqlValue::Int(1), SqlValue::Bytes(b"alice".to_vec())];
        assert_eq!(canonicalize_row(&cols, &a), canonicalize_row(&cols, &b));
    }

    #[test]
    fn different_rows_serialize_differently() {
        let cols = vec!["id".to_string(), "name".to_string()];
        let a = vec![SqlValue::Int(1), SqlValue::Bytes(b"alice".to_vec())];
        let b = vec![SqlValue::Int(1), SqlValue::Bytes(b"bob".to_vec())];
        assert_ne!(canonicalize_row(&cols, &a), canonicalize_row(&cols, &b));
    }

    #[test]
    fn null_is_a_literal() {
        assert_eq!(canonicalize_column(&SqlValue::NULL), "NULL");
    }

    #[test]
    fn pk_value_roundtrips_through_sql_value() {
        let pk = PkValue::Int(42);
        let sql: SqlValue = pk.clone().into();
        let back = PkValue::try_from(sql).unwrap();
        assert_eq!(pk, back);
    }
}
