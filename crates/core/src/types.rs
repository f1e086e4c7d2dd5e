/// Record identifiers are opaque strings (UUID v4 when server-generated).
pub type RecordId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Generate a fresh random record id.
pub fn new_record_id() -> RecordId {
    uuid::Uuid::new_v4().to_string()
}

/// Trim a user-supplied optional string, mapping blank values to `None`.
pub fn normalize_optional(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
