//! Response bodies shared by several handlers.

use serde::Serialize;

/// `{ "message": ... }`
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Body of a successful delete: `{ "message": ..., "id": ... }`.
#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub message: String,
    pub id: String,
}
