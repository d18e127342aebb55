//! Helpers shared by the SQL-speaking backends.

use pdns_core::errors::StorageError;
use pdns_core::timestamp;
use pdns_core::types::Which;

/// Escape LIKE metacharacters in `prefix` and append the wildcard.
/// Backends pair this with `ESCAPE '\'`.
pub(crate) fn like_prefix(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Normalize an aggregator timestamp to unix seconds for storage.
pub(crate) fn unix_seconds(value: &str) -> Result<i64, StorageError> {
    timestamp::to_unix_seconds(value).map_err(|e| StorageError::BadTimestamp { value: e.value })
}

/// Parse the single-character `which` column.
pub(crate) fn which_from_column(value: &str) -> Result<Which, StorageError> {
    Which::parse(value).ok_or_else(|| StorageError::BadColumn {
        column: "which",
        value: value.to_string(),
    })
}

/// Retention cutoff: `days` days before now, in unix seconds.
pub(crate) fn retention_cutoff(days: u32) -> i64 {
    chrono::Utc::now().timestamp() - i64::from(days) * 86_400
}

#[cfg(test)]
mod tests {
    use super::like_prefix;

    #[test]
    fn escapes_like_metacharacters() {
        assert_eq!(like_prefix("moc.elpmaxe"), "moc.elpmaxe%");
        assert_eq!(like_prefix("50%_off\\"), "50\\%\\_off\\\\%");
    }
}
