//! Project records: the tracked work items of the `projects` dataset.

use serde::{Deserialize, Serialize};

use crate::codec::{format_timestamp, parse_timestamp, Record, Row, RowView};
use crate::error::CoreError;
use crate::types::{new_record_id, normalize_optional, RecordId, Timestamp};

/// Persisted column order of the projects dataset.
pub const PROJECT_COLUMNS: &[&str] = &[
    "id",
    "name",
    "category",
    "subcategory",
    "description",
    "detail",
    "procedure",
    "start_date",
    "status",
    "manager",
    "supervisor",
    "created_at",
    "updated_at",
    "update_notes",
];

/// A project row.
///
/// `id` and `created_at` never change after creation; `updated_at` is
/// refreshed by every successful update and is never earlier than
/// `created_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: RecordId,
    pub name: String,
    pub category: String,
    pub subcategory: String,
    pub description: Option<String>,
    pub detail: Option<String>,
    pub procedure: Option<String>,
    pub start_date: Option<Timestamp>,
    pub status: Option<String>,
    pub manager: Option<String>,
    pub supervisor: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub update_notes: Option<String>,
}

/// DTO for creating a project.
///
/// Required fields are optional here so a missing value surfaces as a
/// validation error rather than a body parse failure. Server-assigned
/// timestamps sent by clients are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewProject {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub subcategory: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub procedure: Option<String>,
    #[serde(default, alias = "startDate")]
    pub start_date: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub manager: Option<String>,
    #[serde(default)]
    pub supervisor: Option<String>,
    #[serde(default, alias = "updateNotes")]
    pub update_notes: Option<String>,
}

/// DTO for a partial update. `None` leaves a field unchanged; a blank
/// string clears an optional field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub subcategory: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub procedure: Option<String>,
    #[serde(default, alias = "startDate")]
    pub start_date: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub manager: Option<String>,
    #[serde(default)]
    pub supervisor: Option<String>,
    #[serde(default, alias = "updateNotes")]
    pub update_notes: Option<String>,
}

impl Project {
    /// Build a new project from client input, stamping both timestamps with `now`.
    ///
    /// A blank or missing `id` is replaced by a random one.
    pub fn create(input: NewProject, now: Timestamp) -> Result<Self, CoreError> {
        let id = normalize_optional(input.id).unwrap_or_else(new_record_id);
        Ok(Self {
            id,
            name: required_input("name", input.name)?,
            category: required_input("category", input.category)?,
            subcategory: required_input("subcategory", input.subcategory)?,
            description: normalize_optional(input.description),
            detail: normalize_optional(input.detail),
            procedure: normalize_optional(input.procedure),
            start_date: parse_input_date(input.start_date)?,
            status: normalize_optional(input.status),
            manager: normalize_optional(input.manager),
            supervisor: normalize_optional(input.supervisor),
            created_at: now,
            updated_at: now,
            update_notes: normalize_optional(input.update_notes),
        })
    }

    /// Merge `patch` onto this record. `id` and `created_at` are untouched;
    /// `updated_at` moves to `now` unless that would move it backwards.
    pub fn apply_patch(&mut self, patch: &ProjectPatch, now: Timestamp) -> Result<(), CoreError> {
        if let Some(name) = &patch.name {
            self.name = required_input("name", Some(name.clone()))?;
        }
        if let Some(category) = &patch.category {
            self.category = required_input("category", Some(category.clone()))?;
        }
        if let Some(subcategory) = &patch.subcategory {
            self.subcategory = required_input("subcategory", Some(subcategory.clone()))?;
        }
        if patch.start_date.is_some() {
            self.start_date = parse_input_date(patch.start_date.clone())?;
        }

        merge_optional(&mut self.description, &patch.description);
        merge_optional(&mut self.detail, &patch.detail);
        merge_optional(&mut self.procedure, &patch.procedure);
        merge_optional(&mut self.status, &patch.status);
        merge_optional(&mut self.manager, &patch.manager);
        merge_optional(&mut self.supervisor, &patch.supervisor);
        merge_optional(&mut self.update_notes, &patch.update_notes);

        self.updated_at = now.max(self.updated_at);
        Ok(())
    }
}

fn required_input(field: &str, value: Option<String>) -> Result<String, CoreError> {
    normalize_optional(value).ok_or_else(|| CoreError::Validation(format!("{field} is required")))
}

fn parse_input_date(value: Option<String>) -> Result<Option<Timestamp>, CoreError> {
    normalize_optional(value)
        .map(|raw| {
            parse_timestamp(&raw).map_err(|reason| CoreError::Validation(format!("start_date: {reason}")))
        })
        .transpose()
}

fn merge_optional(target: &mut Option<String>, value: &Option<String>) {
    if value.is_some() {
        *target = normalize_optional(value.clone());
    }
}

impl Record for Project {
    const ENTITY: &'static str = "Project";
    const COLUMNS: &'static [&'static str] = PROJECT_COLUMNS;

    fn id(&self) -> &str {
        &self.id
    }

    fn to_row(&self) -> Row {
        vec![
            Some(self.id.clone()),
            Some(self.name.clone()),
            Some(self.category.clone()),
            Some(self.subcategory.clone()),
            self.description.clone(),
            self.detail.clone(),
            self.procedure.clone(),
            self.start_date.as_ref().map(format_timestamp),
            self.status.clone(),
            self.manager.clone(),
            self.supervisor.clone(),
            Some(format_timestamp(&self.created_at)),
            Some(format_timestamp(&self.updated_at)),
            self.update_notes.clone(),
        ]
    }

    fn from_row(row: RowView<'_>) -> Result<Self, CoreError> {
        let project = Self {
            id: row.required("id")?,
            name: row.required("name")?,
            category: row.required("category")?,
            subcategory: row.required("subcategory")?,
            description: row.optional("description"),
            detail: row.optional("detail"),
            procedure: row.optional("procedure"),
            start_date: row.optional_timestamp("start_date")?,
            status: row.optional("status"),
            manager: row.optional("manager"),
            supervisor: row.optional("supervisor"),
            created_at: row.required_timestamp("created_at")?,
            updated_at: row.required_timestamp("updated_at")?,
            update_notes: row.optional("update_notes"),
        };
        if project.updated_at < project.created_at {
            return Err(CoreError::malformed(
                "updated_at",
                format!("project '{}' was updated before it was created", project.id),
            ));
        }
        Ok(project)
    }
}
