use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, warn};

use super::repo_types::{NewUser, User, UserPatch};
use crate::auth::password::PasswordHasher;
use crate::error::AccountError;

/// Persistence of `User` records.
///
/// Implementations classify storage failures into `AccountError` exactly once;
/// callers never look at engine-specific error text.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Hashes the draft password and inserts the row. Role defaults to `user`.
    async fn create(&self, draft: &NewUser) -> Result<User, AccountError>;
    async fn get_by_id(&self, id: i64) -> Result<User, AccountError>;
    async fn get_by_username(&self, username: &str) -> Result<User, AccountError>;
    async fn get_by_email(&self, email: &str) -> Result<User, AccountError>;
    /// Atomic read-modify-write; nothing is persisted unless the whole merge commits.
    async fn update(&self, id: i64, patch: &UserPatch) -> Result<User, AccountError>;
    async fn delete(&self, id: i64) -> Result<(), AccountError>;
    /// Rows ordered by ascending id.
    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<User>, AccountError>;
    async fn count(&self) -> Result<i64, AccountError>;
}

/// Postgres-backed store. The pool is built and sized by the caller.
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
    hasher: PasswordHasher,
}

impl PgUserStore {
    pub fn new(pool: PgPool, hasher: PasswordHasher) -> Self {
        Self { pool, hasher }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create(&self, draft: &NewUser) -> Result<User, AccountError> {
        let password_hash = self.hasher.hash(&draft.password)?;
        let role = draft.role.unwrap_or_default();

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, email, password_hash, role, created_at, updated_at)
            VALUES ($1, $2, $3, $4, NOW(), NOW())
            RETURNING id, username, email, password_hash, role, created_at, updated_at
            "#,
        )
        .bind(&draft.username)
        .bind(&draft.email)
        .bind(&password_hash)
        .bind(role.as_str())
        .fetch_one(&self.pool)
        .await?;

        debug!(user_id = user.id, "user row inserted");
        Ok(user)
    }

    async fn get_by_id(&self, id: i64) -> Result<User, AccountError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password_hash, role, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    async fn get_by_username(&self, username: &str) -> Result<User, AccountError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password_hash, role, created_at, updated_at
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    async fn get_by_email(&self, email: &str) -> Result<User, AccountError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password_hash, role, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    async fn update(&self, id: i64, patch: &UserPatch) -> Result<User, AccountError> {
        // Dropping `tx` on any early return rolls the transaction back.
        let mut tx = self.pool.begin().await?;

        let mut current = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password_hash, role, created_at, updated_at
            FROM users
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        current.apply_patch(patch, &self.hasher)?;

        let updated = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET username = $1, email = $2, password_hash = $3, role = $4,
                updated_at = GREATEST(NOW(), updated_at)
            WHERE id = $5
            RETURNING id, username, email, password_hash, role, created_at, updated_at
            "#,
        )
        .bind(&current.username)
        .bind(&current.email)
        .bind(&current.password_hash)
        .bind(current.role.as_str())
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            warn!(user_id = id, error = %e, "user update rolled back");
            AccountError::from(e)
        })?;

        tx.commit().await?;
        Ok(updated)
    }

    async fn delete(&self, id: i64) -> Result<(), AccountError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AccountError::NotFound);
        }
        Ok(())
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<User>, AccountError> {
        let rows = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password_hash, role, created_at, updated_at
            FROM users
            ORDER BY id ASC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn count(&self) -> Result<i64, AccountError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

// These run against a real Postgres: `DATABASE_URL=... cargo test -- --ignored`.
#[cfg(test)]
mod pg_tests {
    use super::*;
    use crate::auth::password::test_hasher;
    use crate::users::Role;

    fn draft(name: &str) -> NewUser {
        NewUser {
            username: name.into(),
            email: format!("{}@example.com", name),
            password: "password123".into(),
            role: None,
        }
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn create_assigns_id_and_default_role(pool: PgPool) {
        let store = PgUserStore::new(pool, test_hasher());
        let user = store.create(&draft("alice")).await.unwrap();
        assert!(user.id > 0);
        assert_eq!(user.role, Role::User);
        assert_ne!(user.password_hash, "password123");
        assert_eq!(store.get_by_email("alice@example.com").await.unwrap().id, user.id);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn duplicate_username_is_conflict(pool: PgPool) {
        let store = PgUserStore::new(pool, test_hasher());
        store.create(&draft("bob")).await.unwrap();
        let mut dup = draft("bob");
        dup.email = "other@example.com".into();
        assert!(matches!(store.create(&dup).await, Err(AccountError::Conflict)));
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn conflicting_update_rolls_back(pool: PgPool) {
        let store = PgUserStore::new(pool, test_hasher());
        store.create(&draft("carol")).await.unwrap();
        let dave = store.create(&draft("dave")).await.unwrap();

        let patch = UserPatch {
            username: Some("carol".into()),
            role: Some(Role::Admin),
            ..Default::default()
        };
        assert!(matches!(store.update(dave.id, &patch).await, Err(AccountError::Conflict)));

        let after = store.get_by_id(dave.id).await.unwrap();
        assert_eq!(after.username, "dave");
        assert_eq!(after.role, Role::User);
        assert_eq!(after.updated_at, dave.updated_at);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn delete_then_list_in_id_order(pool: PgPool) {
        let store = PgUserStore::new(pool, test_hasher());
        let mut ids = Vec::new();
        for name in ["u1", "u2", "u3"] {
            ids.push(store.create(&draft(name)).await.unwrap().id);
        }
        store.delete(ids[1]).await.unwrap();
        assert!(matches!(store.delete(ids[1]).await, Err(AccountError::NotFound)));

        let listed: Vec<i64> = store.list(10, 0).await.unwrap().iter().map(|u| u.id).collect();
        assert_eq!(listed, vec![ids[0], ids[2]]);
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn concurrent_updates_apply_one_patch_whole(pool: PgPool) {
        let store = std::sync::Arc::new(PgUserStore::new(pool, test_hasher()));
        let kate = store.create(&draft("kate")).await.unwrap();

        let a = UserPatch {
            username: Some("kate_a".into()),
            email: Some("a@example.com".into()),
            role: Some(Role::Admin),
            ..Default::default()
        };
        let b = UserPatch {
            username: Some("kate_b".into()),
            email: Some("b@example.com".into()),
            role: Some(Role::User),
            ..Default::default()
        };

        let (sa, sb) = (store.clone(), store.clone());
        let id = kate.id;
        let ta = tokio::spawn(async move { sa.update(id, &a).await });
        let tb = tokio::spawn(async move { sb.update(id, &b).await });
        ta.await.unwrap().unwrap();
        tb.await.unwrap().unwrap();

        let fin = store.get_by_id(id).await.unwrap();
        let row = (fin.username.as_str(), fin.email.as_str(), fin.role);
        assert!(
            row == ("kate_a", "a@example.com", Role::Admin)
                || row == ("kate_b", "b@example.com", Role::User),
            "mixed state: {:?}",
            fin
        );
        assert_eq!(fin.created_at, kate.created_at);
        assert!(fin.updated_at >= kate.updated_at);
    }
}
