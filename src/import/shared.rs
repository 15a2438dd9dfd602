use chrono::NaiveTime;
use crate::time::parse_time;
use super::ImportError;

/// Parse an optional time column; empty fields are absent
pub fn optional_time(value: Option<&str>, line: u64) -> Result<Option<NaiveTime>, ImportError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => parse_time(v)
            .map(Some)
            .map_err(|_| ImportError::InvalidTime { line, value: v.to_string() }),
    }
}

/// Line number of a record for error messages
pub fn line_of(record: &::csv::StringRecord) -> u64 {
    record.position().map_or(0, ::csv::Position::line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optional_time() {
        assert_eq!(optional_time(None, 1).expect("empty is fine"), None);
        assert_eq!(optional_time(Some("  "), 1).expect("empty is fine"), None);
        assert_eq!(
            optional_time(Some("15:34"), 1).expect("valid"),
            NaiveTime::from_hms_opt(15, 34, 0)
        );
        assert!(matches!(optional_time(Some("25:99"), 7), Err(ImportError::InvalidTime { line: 7, .. })));
    }
}
