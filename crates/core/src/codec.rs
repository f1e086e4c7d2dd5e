//! Record codec: converts typed records to and from flat rows.
//!
//! A [`Row`] holds one cell per column in the record's persisted column
//! order; `None` marks an absent optional value. Text media render rows
//! through [`crate::csv`], the SQL medium stores one TEXT column per cell.
//! All field coercion (timestamps, booleans, required checks) happens here
//! so every medium shares the same rules.

use std::collections::HashSet;

use chrono::{NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};

use crate::error::CoreError;
use crate::types::Timestamp;

/// One persisted row, cells in [`Record::COLUMNS`] order.
pub type Row = Vec<Option<String>>;

/// A flat record type that can live in a versioned dataset.
pub trait Record: Clone + Send + Sync + 'static {
    /// Entity name used in error messages (e.g. `"Project"`).
    const ENTITY: &'static str;
    /// Persisted column names, in order.
    const COLUMNS: &'static [&'static str];

    /// Primary key; unique within a dataset.
    fn id(&self) -> &str;

    fn to_row(&self) -> Row;

    fn from_row(row: RowView<'_>) -> Result<Self, CoreError>;
}

/// Encode records into rows. Exact left-inverse of [`decode`].
pub fn encode<R: Record>(records: &[R]) -> Vec<Row> {
    records.iter().map(Record::to_row).collect()
}

/// Decode rows into records, rejecting missing required fields,
/// unparseable dates, and duplicate ids.
pub fn decode<R: Record>(rows: &[Row]) -> Result<Vec<R>, CoreError> {
    let mut seen = HashSet::with_capacity(rows.len());
    let mut records = Vec::with_capacity(rows.len());

    for (index, row) in rows.iter().enumerate() {
        let view = RowView {
            columns: R::COLUMNS,
            row,
            index,
        };
        let record = R::from_row(view)?;
        if !seen.insert(record.id().to_string()) {
            return Err(CoreError::malformed(
                "id",
                format!("row {} repeats id '{}'", index + 1, record.id()),
            ));
        }
        records.push(record);
    }
    Ok(records)
}

/// Read-only accessor over one row, addressing cells by column name.
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
    columns: &'static [&'static str],
    row: &'a Row,
    index: usize,
}

impl<'a> RowView<'a> {
    pub fn new(columns: &'static [&'static str], row: &'a Row, index: usize) -> Self {
        Self {
            columns,
            row,
            index,
        }
    }

    /// Raw non-empty cell value for `field`.
    pub fn get(&self, field: &str) -> Option<&'a str> {
        let pos = self.columns.iter().position(|c| *c == field)?;
        self.row
            .get(pos)
            .and_then(|cell| cell.as_deref())
            .filter(|value| !value.is_empty())
    }

    pub fn optional(&self, field: &str) -> Option<String> {
        self.get(field).map(String::from)
    }

    pub fn required(&self, field: &str) -> Result<String, CoreError> {
        match self.get(field) {
            Some(value) if !value.trim().is_empty() => Ok(value.to_string()),
            _ => Err(self.malformed(field, "required value is missing")),
        }
    }

    pub fn optional_timestamp(&self, field: &str) -> Result<Option<Timestamp>, CoreError> {
        self.get(field)
            .map(|raw| parse_timestamp(raw).map_err(|reason| self.malformed(field, reason)))
            .transpose()
    }

    pub fn required_timestamp(&self, field: &str) -> Result<Timestamp, CoreError> {
        self.optional_timestamp(field)?
            .ok_or_else(|| self.malformed(field, "required value is missing"))
    }

    /// Boolean cell; absent cells take `default`.
    pub fn boolean(&self, field: &str, default: bool) -> Result<bool, CoreError> {
        match self.get(field) {
            None => Ok(default),
            Some(raw) => parse_bool(raw).ok_or_else(|| {
                self.malformed(field, format!("'{raw}' is not a boolean"))
            }),
        }
    }

    fn malformed(&self, field: &str, reason: impl std::fmt::Display) -> CoreError {
        CoreError::malformed(field, format!("row {}: {reason}", self.index + 1))
    }
}

/// Canonical timestamp text: RFC 3339, UTC, `Z` suffix, minimal sub-second digits.
pub fn format_timestamp(ts: &Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Parse a timestamp in canonical form, or one of the naive layouts older
/// clients wrote (interpreted as UTC).
pub fn parse_timestamp(raw: &str) -> Result<Timestamp, String> {
    let raw = raw.trim();
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    for layout in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, layout) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    Err(format!("'{raw}' is not a valid date/time"))
}

pub fn format_bool(value: bool) -> String {
    value.to_string()
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::Timelike;

    #[derive(Debug, Clone, PartialEq)]
    struct Tag {
        id: String,
        label: String,
        seen_at: Option<Timestamp>,
        pinned: bool,
    }

    impl Record for Tag {
        const ENTITY: &'static str = "Tag";
        const COLUMNS: &'static [&'static str] = &["id", "label", "seen_at", "pinned"];

        fn id(&self) -> &str {
            &self.id
        }

        fn to_row(&self) -> Row {
            vec![
                Some(self.id.clone()),
                Some(self.label.clone()),
                self.seen_at.as_ref().map(format_timestamp),
                Some(format_bool(self.pinned)),
            ]
        }

        fn from_row(row: RowView<'_>) -> Result<Self, CoreError> {
            Ok(Self {
                id: row.required("id")?,
                label: row.required("label")?,
                seen_at: row.optional_timestamp("seen_at")?,
                pinned: row.boolean("pinned", false)?,
            })
        }
    }

    fn tag(id: &str) -> Tag {
        Tag {
            id: id.into(),
            label: format!("label {id}"),
            seen_at: Some(Utc::now()),
            pinned: true,
        }
    }

    #[test]
    fn decode_inverts_encode() {
        let tags = vec![tag("a"), tag("b")];
        let decoded: Vec<Tag> = decode(&encode(&tags)).unwrap();
        assert_eq!(decoded, tags);
    }

    #[test]
    fn missing_required_field_is_named() {
        let rows = vec![vec![Some("a".into()), None, None, None]];
        let err = decode::<Tag>(&rows).unwrap_err();
        assert_matches!(err, CoreError::MalformedData { ref field, .. } if field == "label");
    }

    #[test]
    fn bad_date_is_named() {
        let rows = vec![vec![
            Some("a".into()),
            Some("x".into()),
            Some("next tuesday".into()),
            None,
        ]];
        let err = decode::<Tag>(&rows).unwrap_err();
        assert_matches!(err, CoreError::MalformedData { ref field, .. } if field == "seen_at");
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let tags = vec![tag("a"), tag("a")];
        let err = decode::<Tag>(&encode(&tags)).unwrap_err();
        assert_matches!(err, CoreError::MalformedData { ref field, .. } if field == "id");
    }

    #[test]
    fn naive_layouts_parse_as_utc() {
        let ts = parse_timestamp("2025-01-04 19:54:44.666093").unwrap();
        assert_eq!(ts.hour(), 19);
        let ts = parse_timestamp("2025-01-04T08:00:00").unwrap();
        assert_eq!(ts.hour(), 8);
        let ts = parse_timestamp("2025-01-04").unwrap();
        assert_eq!(format_timestamp(&ts), "2025-01-04T00:00:00Z");
    }

    #[test]
    fn canonical_format_round_trips_sub_second_precision() {
        let ts = Utc::now();
        assert_eq!(parse_timestamp(&format_timestamp(&ts)).unwrap(), ts);
    }

    #[test]
    fn booleans_accept_common_spellings() {
        let row = vec![Some("a".into()), Some("x".into()), None, Some("FALSE".into())];
        let view = RowView::new(Tag::COLUMNS, &row, 0);
        assert!(!view.boolean("pinned", true).unwrap());

        let row = vec![Some("a".into()), Some("x".into()), None, Some("maybe".into())];
        let view = RowView::new(Tag::COLUMNS, &row, 0);
        assert!(view.boolean("pinned", true).is_err());
    }
}
