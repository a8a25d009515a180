//! Query-string parameters shared by `/logs` and `/logs/stream`

use chrono::{DateTime, Utc};
use logdeck_core::{Cursor, Error, QuerySpec, Result, Severity, SortOrder};
use serde::Deserialize;

/// Raw parameters; everything is parsed by hand so bad values become 400s
/// with a useful message instead of an extractor rejection.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogQueryParams {
    pub severity: Option<String>,
    /// Comma-separated source ids
    pub source: Option<String>,
    pub text: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub cursor: Option<String>,
    pub page_size: Option<String>,
    pub order: Option<String>,
}

/// Empty values (`?severity=`) count as absent
fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_time(name: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::bad_request(format!("Invalid '{}' timestamp '{}': {}", name, value, e)))
}

impl LogQueryParams {
    pub fn into_spec(self, default_page_size: usize) -> Result<QuerySpec> {
        let mut spec = QuerySpec::new().with_page_size(default_page_size);

        if let Some(severity) = present(&self.severity) {
            spec = spec.with_min_level(severity.parse::<Severity>()?);
        }

        if let Some(raw) = self.source.as_deref().filter(|s| !s.trim().is_empty()) {
            spec = spec.with_sources(
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from),
            );
        }

        if let Some(text) = present(&self.text) {
            spec = spec.with_text(text);
        }

        let from = present(&self.from).map(|v| parse_time("from", v)).transpose()?;
        let to = present(&self.to).map(|v| parse_time("to", v)).transpose()?;
        spec = spec.with_time(from, to);

        if let Some(size) = present(&self.page_size) {
            let size = size
                .parse::<usize>()
                .map_err(|_| Error::bad_request(format!("Invalid pageSize '{}'", size)))?;
            spec = spec.with_page_size(size);
        }

        let cursor = present(&self.cursor).map(Cursor::decode).transpose()?;

        // A cursor carries its order, so `order` may be left off when resuming
        let order = match (present(&self.order), &cursor) {
            (Some(order), _) => order.parse::<SortOrder>()?,
            (None, Some(cursor)) => cursor.order,
            (None, None) => SortOrder::Asc,
        };
        spec = spec.with_order(order);

        if let Some(cursor) = cursor {
            spec = spec.with_cursor(cursor);
        }

        Ok(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> LogQueryParams {
        let mut p = LogQueryParams::default();
        for (key, value) in pairs {
            let value = Some(value.to_string());
            match *key {
                "severity" => p.severity = value,
                "source" => p.source = value,
                "text" => p.text = value,
                "from" => p.from = value,
                "to" => p.to = value,
                "cursor" => p.cursor = value,
                "pageSize" => p.page_size = value,
                "order" => p.order = value,
                _ => unreachable!(),
            }
        }
        p
    }

    #[test]
    fn test_defaults() {
        let spec = LogQueryParams::default().into_spec(50).unwrap();
        assert_eq!(spec.page_size, 50);
        assert_eq!(spec.order, SortOrder::Asc);
        assert!(spec.sources.is_none());
        assert!(spec.min_level.is_none());
    }

    #[test]
    fn test_full_query() {
        let spec = params(&[
            ("severity", "WARN"),
            ("source", "api, worker,"),
            ("text", "timeout"),
            ("from", "2024-01-01T00:00:00Z"),
            ("to", "2024-01-01T01:00:00+01:00"),
            ("pageSize", "25"),
            ("order", "desc"),
        ])
        .into_spec(100)
        .unwrap();

        assert_eq!(spec.min_level, Some(Severity::Warn));
        assert_eq!(spec.sources, Some(vec!["api".to_string(), "worker".to_string()]));
        assert_eq!(spec.text.as_deref(), Some("timeout"));
        assert_eq!(spec.time.from, spec.time.to);
        assert_eq!(spec.page_size, 25);
        assert_eq!(spec.order, SortOrder::Desc);
    }

    #[test]
    fn test_empty_values_ignored() {
        let spec = params(&[("severity", ""), ("text", " "), ("source", "")])
            .into_spec(10)
            .unwrap();
        assert!(spec.min_level.is_none());
        assert!(spec.text.is_none());
        assert!(spec.sources.is_none());
    }

    #[test]
    fn test_order_taken_from_cursor() {
        let token = Cursor::new(SortOrder::Desc).encode();
        let spec = params(&[("cursor", &token)]).into_spec(10).unwrap();
        assert_eq!(spec.order, SortOrder::Desc);
        assert!(spec.cursor.is_some());
    }

    #[test]
    fn test_malformed_values() {
        for pairs in [
            [("severity", "loud")],
            [("from", "yesterday")],
            [("pageSize", "ten")],
            [("order", "sideways")],
        ] {
            let err = params(&pairs).into_spec(10).unwrap_err();
            assert!(matches!(err, Error::BadRequest(_)), "{:?}", pairs);
        }

        let err = params(&[("cursor", "!!!")]).into_spec(10).unwrap_err();
        assert!(matches!(err, Error::InvalidCursor(_)));
    }
}
