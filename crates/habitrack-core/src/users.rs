//! User registration.

use chrono::{DateTime, Utc};
use tracing::info;

use crate::error::{Result, ValidationError};
use crate::model::User;
use crate::storage::Transactor;

/// Registers `username`, rejecting blank and duplicate names.
pub fn create_user<D: Transactor>(db: &D, username: &str, at: DateTime<Utc>) -> Result<User> {
    let username = username.trim();
    if username.is_empty() {
        return Err(ValidationError::InvalidValue {
            field: "username".into(),
            message: "must not be empty".into(),
        }
        .into());
    }

    db.run_repeatable_read(|storage| {
        if storage.get_user(username)?.is_some() {
            return Err(ValidationError::InvalidValue {
                field: "username".into(),
                message: format!("'{username}' is already taken"),
            }
            .into());
        }
        storage.create_user(username, at)?;
        info!(username, "user created");
        Ok(User {
            username: username.to_string(),
            created_at: at,
        })
    })
}
