use itertools::Itertools;

/// Quote a MySQL identifier (table or column name) with backticks, escaping
/// any literal backtick by doubling it. Per spec.md §9 ("should quote
/// identifiers"), every identifier this crate interpolates into generated
/// SQL goes through here rather than being pasted raw.
pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// `?, ?, ?, ...` for an `IN (...)` clause of length `n`. `n` must be > 0.
pub fn placeholders(n: usize) -> String {
    debug_assert!(n > 0);
    std::iter::repeat("?").take(n).collect::<Vec<_>>().join(", ")
}

/// Split `items` into chunks of at most `size` (size must be > 0), bounding
/// the `IN (...)` list length for every discovery/copy/verify/delete query.
pub fn chunks<T: Clone>(items: &[T], size: usize) -> Vec<Vec<T>> {
    let size = size.max(1);
    items.iter().cloned().chunks(size).into_iter().map(Iterator::collect).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_and_escapes_identifiers() {
        assert_eq!(quote_ident("users"), "`users`");
        assert_eq!(quote_ident("weird`name"), "`weird``name`");
    }

    #[test]
    fn placeholders_join_with_commas() {
        assert_eq!(placeholders(3), "?, ?, ?");
        assert_eq!(placeholders(1), "?");
    }

    #[test]
    fn chunks_splits_into_bounded_pieces() {
        let items: Vec<i32> = (0..10).collect();
        let chunked = chunks(&items, 3);
        assert_eq!(chunked.len(), 4);
        assert_eq!(chunked[0], vec![0, 1, 2]);
        assert_eq!(chunked[3], vec![9]);
    }
}
