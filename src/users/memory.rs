use std::collections::BTreeMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;

use super::repo::UserStore;
use super::repo_types::{NewUser, User, UserPatch};
use crate::auth::password::PasswordHasher;
use crate::error::AccountError;

/// In-process `UserStore` used by service and handler tests.
pub struct MemoryUserStore {
    hasher: PasswordHasher,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    rows: BTreeMap<i64, User>,
}

impl Inner {
    fn taken(&self, username: &str, email: &str, except: Option<i64>) -> bool {
        self.rows
            .values()
            .filter(|u| Some(u.id) != except)
            .any(|u| u.username == username || u.email == email)
    }
}

impl MemoryUserStore {
    pub fn new(hasher: PasswordHasher) -> Self {
        Self {
            hasher,
            inner: Mutex::new(Inner::default()),
        }
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create(&self, draft: &NewUser) -> Result<User, AccountError> {
        let password_hash = self.hasher.hash(&draft.password)?;
        let mut inner = self.inner.lock().await;
        if inner.taken(&draft.username, &draft.email, None) {
            return Err(AccountError::Conflict);
        }
        inner.next_id += 1;
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: inner.next_id,
            username: draft.username.clone(),
            email: draft.email.clone(),
            password_hash,
            role: draft.role.unwrap_or_default(),
            created_at: now,
            updated_at: now,
        };
        inner.rows.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_by_id(&self, id: i64) -> Result<User, AccountError> {
        let inner = self.inner.lock().await;
        inner.rows.get(&id).cloned().ok_or(AccountError::NotFound)
    }

    async fn get_by_username(&self, username: &str) -> Result<User, AccountError> {
        let inner = self.inner.lock().await;
        inner
            .rows
            .values()
            .find(|u| u.username == username)
            .cloned()
            .ok_or(AccountError::NotFound)
    }

    async fn get_by_email(&self, email: &str) -> Result<User, AccountError> {
        let inner = self.inner.lock().await;
        inner
            .rows
            .values()
            .find(|u| u.email == email)
            .cloned()
            .ok_or(AccountError::NotFound)
    }

    async fn update(&self, id: i64, patch: &UserPatch) -> Result<User, AccountError> {
        let mut inner = self.inner.lock().await;
        let mut next = inner.rows.get(&id).cloned().ok_or(AccountError::NotFound)?;
        next.apply_patch(patch, &self.hasher)?;
        if inner.taken(&next.username, &next.email, Some(id)) {
            return Err(AccountError::Conflict);
        }
        next.updated_at = OffsetDateTime::now_utc().max(next.updated_at);
        inner.rows.insert(id, next.clone());
        Ok(next)
    }

    async fn delete(&self, id: i64) -> Result<(), AccountError> {
        let mut inner = self.inner.lock().await;
        inner.rows.remove(&id).map(|_| ()).ok_or(AccountError::NotFound)
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<User>, AccountError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .rows
            .values()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<i64, AccountError> {
        Ok(self.inner.lock().await.rows.len() as i64)
    }
}
