use std::{cmp::Reverse, collections::BTreeMap};

use async_trait::async_trait;
use time::{Duration, OffsetDateTime};
use tokio::sync::RwLock;

use crate::users::{
    error::UserError,
    repo::UserStore,
    repo_types::{NewUser, User, UserPatch},
};

#[derive(Default)]
struct Inner {
    last_id: i64,
    users: BTreeMap<i64, User>,
}

impl Inner {
    fn email_taken(&self, email: &str, except: Option<i64>) -> bool {
        self.users
            .values()
            .any(|u| u.email == email && Some(u.id) != except)
    }
}

/// Process-local store. Every mutation runs under one write lock, which gives
/// the same atomicity the unique constraint gives in Postgres.
#[derive(Default)]
pub struct MemoryUserStore {
    inner: RwLock<Inner>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create(&self, candidate: NewUser) -> Result<User, UserError> {
        let mut inner = self.inner.write().await;
        if inner.email_taken(&candidate.email, None) {
            return Err(UserError::Conflict(candidate.email));
        }
        inner.last_id += 1;
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: inner.last_id,
            email: candidate.email,
            first_name: candidate.first_name,
            last_name: candidate.last_name,
            role: candidate.role,
            is_active: candidate.is_active,
            created_at: now,
            updated_at: now,
        };
        inner.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get(&self, id: i64) -> Result<Option<User>, UserError> {
        Ok(self.inner.read().await.users.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<User>, UserError> {
        let mut users: Vec<User> = self.inner.read().await.users.values().cloned().collect();
        users.sort_by_key(|u| (Reverse(u.created_at), u.id));
        Ok(users)
    }

    async fn update(&self, id: i64, patch: UserPatch) -> Result<User, UserError> {
        let mut inner = self.inner.write().await;
        if !inner.users.contains_key(&id) {
            return Err(UserError::NotFound(id));
        }
        if let Some(email) = &patch.email {
            if inner.email_taken(email, Some(id)) {
                return Err(UserError::Conflict(email.clone()));
            }
        }
        let user = inner.users.get_mut(&id).ok_or(UserError::NotFound(id))?;
        patch.apply_to(user);
        user.updated_at =
            OffsetDateTime::now_utc().max(user.updated_at + Duration::microseconds(1));
        Ok(user.clone())
    }

    async fn delete(&self, id: i64) -> Result<(), UserError> {
        match self.inner.write().await.users.remove(&id) {
            Some(_) => Ok(()),
            None => Err(UserError::NotFound(id)),
        }
    }
}
