use async_trait::async_trait;
use sqlx::PgPool;

use crate::users::{
    error::UserError,
    repo_types::{NewUser, User, UserPatch},
};

/// Persistence for user records.
///
/// Implementations enforce email uniqueness and existence-before-mutate
/// atomically; callers never read-then-write.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create(&self, candidate: NewUser) -> Result<User, UserError>;
    /// Absence is `Ok(None)`, not an error.
    async fn get(&self, id: i64) -> Result<Option<User>, UserError>;
    /// Newest first; ties by ascending id.
    async fn list(&self) -> Result<Vec<User>, UserError>;
    async fn update(&self, id: i64, patch: UserPatch) -> Result<User, UserError>;
    async fn delete(&self, id: i64) -> Result<(), UserError>;
}

const UNIQUE_VIOLATION: &str = "23505";

fn conflict_or_store(err: sqlx::Error, email: Option<&str>) -> UserError {
    if let sqlx::Error::Database(db) = &err {
        if db.code().as_deref() == Some(UNIQUE_VIOLATION) {
            return UserError::Conflict(email.unwrap_or_default().to_string());
        }
    }
    UserError::Store(err)
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create(&self, candidate: NewUser) -> Result<User, UserError> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, first_name, last_name, role, is_active)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, email, first_name, last_name, role, is_active, created_at, updated_at
            "#,
        )
        .bind(&candidate.email)
        .bind(&candidate.first_name)
        .bind(&candidate.last_name)
        .bind(candidate.role)
        .bind(candidate.is_active)
        .fetch_one(&self.db)
        .await
        .map_err(|e| conflict_or_store(e, Some(&candidate.email)))
    }

    async fn get(&self, id: i64) -> Result<Option<User>, UserError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, first_name, last_name, role, is_active, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn list(&self) -> Result<Vec<User>, UserError> {
        let rows = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, first_name, last_name, role, is_active, created_at, updated_at
            FROM users
            ORDER BY created_at DESC, id ASC
            "#,
        )
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn update(&self, id: i64, patch: UserPatch) -> Result<User, UserError> {
        // clock_timestamp() rather than now(): now() is frozen for the transaction.
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
               SET email      = COALESCE($2, email),
                   first_name = COALESCE($3, first_name),
                   last_name  = COALESCE($4, last_name),
                   role       = COALESCE($5, role),
                   is_active  = COALESCE($6, is_active),
                   updated_at = GREATEST(clock_timestamp(), updated_at + INTERVAL '1 microsecond')
             WHERE id = $1
            RETURNING id, email, first_name, last_name, role, is_active, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(patch.email.as_deref())
        .bind(patch.first_name.as_deref())
        .bind(patch.last_name.as_deref())
        .bind(patch.role)
        .bind(patch.is_active)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| conflict_or_store(e, patch.email.as_deref()))?
        .ok_or(UserError::NotFound(id))
    }

    async fn delete(&self, id: i64) -> Result<(), UserError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(UserError::NotFound(id));
        }
        Ok(())
    }
}
