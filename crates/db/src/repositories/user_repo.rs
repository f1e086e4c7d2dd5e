//! User accounts on the `users` dataset.
//!
//! Password hashing happens in the API crate; this repository only stores
//! the finished hash and enforces email uniqueness.

use std::sync::Arc;

use chrono::Utc;
use taskmaster_core::codec::Record;
use taskmaster_core::error::CoreError;
use taskmaster_core::user::{normalize_email, User};

use crate::medium::DurableMedium;
use crate::store::{Change, StoreConfig, VersionedStore};
use crate::USERS;

pub struct UserRepo {
    store: VersionedStore<User>,
}

impl UserRepo {
    pub fn new(medium: Arc<dyn DurableMedium>, config: StoreConfig) -> Self {
        Self {
            store: VersionedStore::new(medium, USERS, config),
        }
    }

    /// Insert a new user. Fails with `DuplicateEmail` if the (normalized)
    /// email is already registered.
    pub async fn create(&self, user: User) -> Result<User, CoreError> {
        let email = normalize_email(&user.email);
        self.store
            .mutate(|users| {
                if users.iter().any(|u| normalize_email(&u.email) == email) {
                    return Err(CoreError::DuplicateEmail(email.clone()));
                }
                users.push(user.clone());
                Ok(Change::new(user.clone(), format!("Register user: {email}")))
            })
            .await
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, CoreError> {
        let email = normalize_email(email);
        let snapshot = self.store.load().await?;
        Ok(snapshot
            .records
            .iter()
            .find(|u| normalize_email(&u.email) == email)
            .cloned())
    }

    pub async fn find_by_id(&self, id: &str) -> Result<User, CoreError> {
        self.store
            .find(id)
            .await?
            .ok_or_else(|| CoreError::not_found(User::ENTITY, id))
    }

    /// Stamp `last_login_at` with the current time.
    pub async fn record_successful_login(&self, id: &str) -> Result<User, CoreError> {
        self.modify(id, "Record login", |user| {
            user.last_login_at = Some(Utc::now());
        })
        .await
    }

    pub async fn set_active(&self, id: &str, active: bool) -> Result<User, CoreError> {
        let action = if active { "Activate user" } else { "Deactivate user" };
        self.modify(id, action, |user| user.is_active = active).await
    }

    async fn modify<F>(&self, id: &str, action: &str, change: F) -> Result<User, CoreError>
    where
        F: Fn(&mut User) + Send + Sync,
    {
        self.store
            .mutate(|users| {
                let user = users
                    .iter_mut()
                    .find(|u| u.id == id)
                    .ok_or_else(|| CoreError::not_found(User::ENTITY, id))?;
                change(user);
                Ok(Change::new(user.clone(), format!("{action}: {id}")))
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::medium::MemoryMedium;
    use assert_matches::assert_matches;
    use taskmaster_core::user::RegisterUser;

    fn repo() -> UserRepo {
        UserRepo::new(Arc::new(MemoryMedium::new()), StoreConfig::default())
    }

    fn user(email: &str) -> User {
        let registration = RegisterUser {
            email: Some(email.into()),
            password: Some("longenough".into()),
            name: Some("Ada".into()),
            role: Some("engineer".into()),
            department: Some("R&D".into()),
        }
        .validate(8)
        .unwrap();
        User::new(registration, "$argon2id$fake".into(), Utc::now())
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected_case_insensitively() {
        let repo = repo();
        repo.create(user("ada@example.com")).await.unwrap();

        let mut clash = user("ada@example.com");
        clash.email = "ADA@Example.com ".into();
        assert_matches!(repo.create(clash).await, Err(CoreError::DuplicateEmail(_)));
    }

    #[tokio::test]
    async fn lookup_by_email_normalizes() {
        let repo = repo();
        let created = repo.create(user("ada@example.com")).await.unwrap();
        let found = repo.find_by_email("  Ada@Example.COM").await.unwrap();
        assert_eq!(found.map(|u| u.id), Some(created.id));
        assert!(repo.find_by_email("nobody@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn login_and_deactivation_are_persisted() {
        let repo = repo();
        let created = repo.create(user("ada@example.com")).await.unwrap();
        assert!(created.last_login_at.is_none());

        repo.record_successful_login(&created.id).await.unwrap();
        repo.set_active(&created.id, false).await.unwrap();

        let stored = repo.find_by_id(&created.id).await.unwrap();
        assert!(stored.last_login_at.is_some());
        assert!(!stored.is_active);
    }

    #[tokio::test]
    async fn modifying_unknown_user_is_not_found() {
        let repo = repo();
        assert_matches!(
            repo.set_active("missing", false).await,
            Err(CoreError::NotFound { .. })
        );
    }
}
