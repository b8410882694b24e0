use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use super::pagination::{Page, PageRequest};
use super::repo::UserStore;
use super::repo_types::{Credentials, NewUser, User, UserPatch};
use crate::auth::{PasswordHasher, TokenIssuer};
use crate::error::AccountError;

/// Runs a store call unless `cancel` fires first; the dropped future aborts
/// the query and rolls back any open transaction.
async fn guarded<T, F>(cancel: &CancellationToken, fut: F) -> Result<T, AccountError>
where
    F: Future<Output = Result<T, AccountError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AccountError::Cancelled),
        res = fut => res,
    }
}

/// Register, login and profile management on top of a `UserStore`.
#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn UserStore>,
    hasher: PasswordHasher,
    tokens: TokenIssuer,
    // Verified against on unknown usernames so both login failures cost the same.
    dummy_hash: Arc<str>,
}

impl AccountService {
    pub fn new(
        store: Arc<dyn UserStore>,
        hasher: PasswordHasher,
        tokens: TokenIssuer,
    ) -> Result<Self, AccountError> {
        let dummy_hash = hasher.hash("account-service-timing-placeholder")?;
        Ok(Self {
            store,
            hasher,
            tokens,
            dummy_hash: Arc::from(dummy_hash),
        })
    }

    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    #[instrument(skip(self, draft, cancel), fields(username = %draft.username))]
    pub async fn register(
        &self,
        draft: NewUser,
        cancel: &CancellationToken,
    ) -> Result<String, AccountError> {
        let user = guarded(cancel, self.store.create(&draft)).await?;
        let token = self.tokens.issue_default(user.id, user.role)?;
        info!(user_id = user.id, role = %user.role, "user registered");
        Ok(token)
    }

    #[instrument(skip(self, credentials, cancel), fields(username = %credentials.username))]
    pub async fn login(
        &self,
        credentials: Credentials,
        cancel: &CancellationToken,
    ) -> Result<String, AccountError> {
        let user = match guarded(cancel, self.store.get_by_username(&credentials.username)).await {
            Ok(user) => Some(user),
            Err(AccountError::NotFound) => None,
            Err(e) => return Err(e),
        };

        let hash = user
            .as_ref()
            .map(|u| u.password_hash.as_str())
            .unwrap_or(&*self.dummy_hash);
        let ok = self.hasher.verify(&credentials.password, hash)?;

        match user {
            Some(user) if ok => {
                let token = self.tokens.issue_default(user.id, user.role)?;
                info!(user_id = user.id, "user logged in");
                Ok(token)
            }
            _ => {
                warn!("login rejected");
                Err(AccountError::InvalidCredentials)
            }
        }
    }

    #[instrument(skip(self, cancel))]
    pub async fn get_by_id(
        &self,
        id: i64,
        cancel: &CancellationToken,
    ) -> Result<User, AccountError> {
        guarded(cancel, self.store.get_by_id(id)).await
    }

    #[instrument(skip(self, patch, cancel))]
    pub async fn update(
        &self,
        id: i64,
        patch: UserPatch,
        cancel: &CancellationToken,
    ) -> Result<User, AccountError> {
        let user = guarded(cancel, self.store.update(id, &patch)).await?;
        info!(user_id = id, "user updated");
        Ok(user)
    }

    #[instrument(skip(self, cancel))]
    pub async fn delete(&self, id: i64, cancel: &CancellationToken) -> Result<(), AccountError> {
        guarded(cancel, self.store.delete(id)).await?;
        info!(user_id = id, "user deleted");
        Ok(())
    }

    /// Lists one page ordered by id. `items` and `total` come from two
    /// separate reads and may disagree under concurrent writes.
    #[instrument(skip(self, cancel))]
    pub async fn list(
        &self,
        page: i64,
        page_size: i64,
        cancel: &CancellationToken,
    ) -> Result<Page<User>, AccountError> {
        let req = PageRequest::new(page, page_size);
        let items = guarded(cancel, self.store.list(req.limit(), req.offset())).await?;
        let total = guarded(cancel, self.store.count()).await?;
        Ok(req.into_page(items, total))
    }
}

#[cfg(test)]
pub(crate) fn test_service() -> AccountService {
    use crate::auth::password::test_hasher;
    use crate::users::memory::MemoryUserStore;
    use std::time::Duration;

    let hasher = test_hasher();
    let store = Arc::new(MemoryUserStore::new(hasher.clone()));
    let tokens = TokenIssuer::new(b"service-test-secret", Duration::from_secs(3600));
    AccountService::new(store, hasher, tokens).expect("service")
}
