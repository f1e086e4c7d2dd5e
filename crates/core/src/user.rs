//! User accounts for registration and login.

use serde::{Deserialize, Serialize};
use validator::ValidateEmail;

use crate::codec::{format_bool, format_timestamp, Record, Row, RowView};
use crate::error::CoreError;
use crate::types::{new_record_id, normalize_optional, RecordId, Timestamp};

/// Persisted column order of the users dataset.
pub const USER_COLUMNS: &[&str] = &[
    "id",
    "email",
    "password_hash",
    "name",
    "role",
    "department",
    "created_at",
    "last_login_at",
    "is_active",
];

/// Full user row.
///
/// Contains the password hash -- NEVER serialize this to API responses directly.
/// Use [`UserResponse`] for external-facing output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: RecordId,
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub role: String,
    pub department: String,
    pub created_at: Timestamp,
    pub last_login_at: Option<Timestamp>,
    pub is_active: bool,
}

/// Safe user representation for API responses (no password hash).
#[derive(Debug, Clone, Serialize)]
pub struct UserResponse {
    pub id: RecordId,
    pub email: String,
    pub name: String,
    pub role: String,
    pub department: String,
    pub created_at: Timestamp,
    pub last_login_at: Option<Timestamp>,
    pub is_active: bool,
}

/// Request body for registration. Fields are optional so that a missing
/// one is reported by [`RegisterUser::validate`] with its name.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegisterUser {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
}

/// Registration input after validation and normalization.
#[derive(Debug, Clone)]
pub struct ValidRegistration {
    pub email: String,
    pub password: String,
    pub name: String,
    pub role: String,
    pub department: String,
}

impl RegisterUser {
    /// Check required fields, email shape, and password length.
    pub fn validate(self, min_password_len: usize) -> Result<ValidRegistration, CoreError> {
        let email = normalize_email(&require("email", self.email)?);
        if !email.validate_email() {
            return Err(CoreError::Validation(format!(
                "'{email}' is not a valid email address"
            )));
        }

        let password = self
            .password
            .filter(|p| !p.is_empty())
            .ok_or_else(|| CoreError::Validation("password is required".into()))?;
        if password.chars().count() < min_password_len {
            return Err(CoreError::Validation(format!(
                "Password must be at least {min_password_len} characters long"
            )));
        }

        Ok(ValidRegistration {
            email,
            password,
            name: require("name", self.name)?,
            role: require("role", self.role)?,
            department: require("department", self.department)?,
        })
    }
}

fn require(field: &str, value: Option<String>) -> Result<String, CoreError> {
    normalize_optional(value).ok_or_else(|| CoreError::Validation(format!("{field} is required")))
}

/// Emails are compared trimmed and lowercased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl User {
    pub fn new(registration: ValidRegistration, password_hash: String, now: Timestamp) -> Self {
        Self {
            id: new_record_id(),
            email: registration.email,
            password_hash,
            name: registration.name,
            role: registration.role,
            department: registration.department,
            created_at: now,
            last_login_at: None,
            is_active: true,
        }
    }

    pub fn to_response(&self) -> UserResponse {
        UserResponse {
            id: self.id.clone(),
            email: self.email.clone(),
            name: self.name.clone(),
            role: self.role.clone(),
            department: self.department.clone(),
            created_at: self.created_at,
            last_login_at: self.last_login_at,
            is_active: self.is_active,
        }
    }
}

impl Record for User {
    const ENTITY: &'static str = "User";
    const COLUMNS: &'static [&'static str] = USER_COLUMNS;

    fn id(&self) -> &str {
        &self.id
    }

    fn to_row(&self) -> Row {
        vec![
            Some(self.id.clone()),
            Some(self.email.clone()),
            Some(self.password_hash.clone()),
            Some(self.name.clone()),
            Some(self.role.clone()),
            Some(self.department.clone()),
            Some(format_timestamp(&self.created_at)),
            self.last_login_at.as_ref().map(format_timestamp),
            Some(format_bool(self.is_active)),
        ]
    }

    fn from_row(row: RowView<'_>) -> Result<Self, CoreError> {
        Ok(Self {
            id: row.required("id")?,
            email: normalize_email(&row.required("email")?),
            password_hash: row.required("password_hash")?,
            name: row.required("name")?,
            role: row.required("role")?,
            department: row.required("department")?,
            created_at: row.required_timestamp("created_at")?,
            last_login_at: row.optional_timestamp("last_login_at")?,
            is_active: row.boolean("is_active", true)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode, encode};
    use assert_matches::assert_matches;
    use chrono::Utc;

    fn registration() -> RegisterUser {
        RegisterUser {
            email: Some("  Kim@Example.com ".into()),
            password: Some("correct-horse".into()),
            name: Some("Kim".into()),
            role: Some("manager".into()),
            department: Some("infra".into()),
        }
    }

    #[test]
    fn validate_normalizes_email() {
        let valid = registration().validate(8).unwrap();
        assert_eq!(valid.email, "kim@example.com");
    }

    #[test]
    fn validate_rejects_bad_email() {
        let input = RegisterUser {
            email: Some("not-an-email".into()),
            ..registration()
        };
        assert_matches!(input.validate(8), Err(CoreError::Validation(_)));
    }

    #[test]
    fn validate_rejects_short_password() {
        let input = RegisterUser {
            password: Some("short".into()),
            ..registration()
        };
        let err = input.validate(8).unwrap_err();
        assert!(err.to_string().contains("at least 8 characters"));
    }

    #[test]
    fn validate_names_missing_field() {
        let input = RegisterUser {
            department: None,
            ..registration()
        };
        assert_eq!(
            input.validate(8).unwrap_err(),
            CoreError::Validation("department is required".into())
        );
    }

    #[test]
    fn rows_round_trip_including_flags() {
        let mut user = User::new(registration().validate(8).unwrap(), "$argon2id$x".into(), Utc::now());
        user.is_active = false;
        user.last_login_at = Some(Utc::now());
        let decoded: Vec<User> = decode(&encode(std::slice::from_ref(&user))).unwrap();
        assert_eq!(decoded, vec![user]);
    }

    #[test]
    fn response_omits_password_hash() {
        let user = User::new(registration().validate(8).unwrap(), "$argon2id$x".into(), Utc::now());
        let json = serde_json::to_value(user.to_response()).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["email"], "kim@example.com");
    }
}
