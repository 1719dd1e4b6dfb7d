use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, info, instrument, warn};

use crate::users::{
    dto::{CreateUserRequest, DeleteUserResponse, Field, UpdateUserRequest},
    error::UserError,
    repo::UserStore,
    repo_types::{NewUser, User, UserPatch},
};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

// Values are stored exactly as submitted; validation only accepts or rejects.
fn check_email(email: String) -> Result<String, UserError> {
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(UserError::Validation("invalid email address".into()));
    }
    Ok(email)
}

fn check_name(field: &str, name: String) -> Result<String, UserError> {
    if name.is_empty() {
        warn!(field, "empty name");
        return Err(UserError::Validation(format!("{field} is required")));
    }
    Ok(name)
}

fn present<T>(field: &str, value: Field<T>) -> Result<Option<T>, UserError> {
    match value {
        Field::Absent => Ok(None),
        Field::Null => Err(UserError::Validation(format!("{field} cannot be null"))),
        Field::Present(v) => Ok(Some(v)),
    }
}

/// Checks a create request and fills in defaults.
pub fn validate_new_user(req: CreateUserRequest) -> Result<NewUser, UserError> {
    Ok(NewUser {
        email: check_email(req.email)?,
        first_name: check_name("first_name", req.first_name)?,
        last_name: check_name("last_name", req.last_name)?,
        role: present("role", req.role)?.unwrap_or_default(),
        is_active: present("is_active", req.is_active)?.unwrap_or(true),
    })
}

/// Checks each supplied field of an update request. Absent fields stay absent.
pub fn validate_patch(req: UpdateUserRequest) -> Result<UserPatch, UserError> {
    Ok(UserPatch {
        email: present("email", req.email)?
            .map(check_email)
            .transpose()?,
        first_name: present("first_name", req.first_name)?
            .map(|n| check_name("first_name", n))
            .transpose()?,
        last_name: present("last_name", req.last_name)?
            .map(|n| check_name("last_name", n))
            .transpose()?,
        role: present("role", req.role)?,
        is_active: present("is_active", req.is_active)?,
    })
}

#[instrument(skip(store, req))]
pub async fn create_user(store: &dyn UserStore, req: CreateUserRequest) -> Result<User, UserError> {
    let candidate = validate_new_user(req)?;
    let user = store.create(candidate).await?;
    info!(user_id = user.id, email = %user.email, "user created");
    Ok(user)
}

#[instrument(skip(store))]
pub async fn get_user(store: &dyn UserStore, id: i64) -> Result<Option<User>, UserError> {
    store.get(id).await
}

#[instrument(skip(store))]
pub async fn get_users(store: &dyn UserStore) -> Result<Vec<User>, UserError> {
    store.list().await
}

#[instrument(skip(store, req))]
pub async fn update_user(
    store: &dyn UserStore,
    id: i64,
    req: UpdateUserRequest,
) -> Result<User, UserError> {
    let patch = validate_patch(req)?;
    if patch.is_empty() {
        debug!(user_id = id, "empty patch, touching updated_at only");
    }
    let user = store.update(id, patch).await?;
    info!(user_id = user.id, "user updated");
    Ok(user)
}

#[instrument(skip(store))]
pub async fn delete_user(store: &dyn UserStore, id: i64) -> Result<DeleteUserResponse, UserError> {
    store.delete(id).await?;
    info!(user_id = id, "user deleted");
    Ok(DeleteUserResponse { success: true })
}


#[cfg(test)]
mod operation_tests {
    use std::sync::Arc;

    use super::*;
    use crate::users::{memory::MemoryUserStore, repo_types::Role};

    fn create_req(email: &str) -> CreateUserRequest {
        CreateUserRequest {
            email: email.into(),
            first_name: "A".into(),
            last_name: "B".into(),
            role: Field::Absent,
            is_active: Field::Absent,
        }
    }

    #[tokio::test]
    async fn create_assigns_fresh_ids_and_equal_timestamps() {
        let store = MemoryUserStore::new();
        let a = create_user(&store, create_req("a@x.com")).await.unwrap();
        let b = create_user(&store, create_req("b@x.com")).await.unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(a.created_at, a.updated_at);
        assert_eq!(a.role, Role::User);
        assert!(a.is_active);
    }

    #[tokio::test]
    async fn sequential_duplicate_email_conflicts() {
        let store = MemoryUserStore::new();
        create_user(&store, create_req("a@x.com")).await.unwrap();
        let err = create_user(&store, create_req("a@x.com")).await.unwrap_err();
        assert!(matches!(err, UserError::Conflict(_)));
    }

    #[tokio::test]
    async fn email_uniqueness_is_exact_match() {
        let store = MemoryUserStore::new();
        let upper = create_user(&store, create_req("Alice@X.com")).await.unwrap();
        assert_eq!(upper.email, "Alice@X.com");
        let lower = create_user(&store, create_req("alice@x.com")).await.unwrap();
        assert_ne!(upper.id, lower.id);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_duplicate_email_has_one_winner() {
        let store: Arc<dyn UserStore> = Arc::new(MemoryUserStore::new());
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { create_user(store.as_ref(), create_req("a@x.com")).await })
            })
            .collect();

        let mut ok = 0;
        let mut conflicts = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => ok += 1,
                Err(UserError::Conflict(_)) => conflicts += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(conflicts, 7);
    }

    #[tokio::test]
    async fn invalid_input_never_reaches_store() {
        let store = MemoryUserStore::new();
        let err = create_user(&store, create_req("not-an-email")).await.unwrap_err();
        assert!(matches!(err, UserError::Validation(_)));
        assert!(get_users(&store).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_patch_only_moves_updated_at() {
        let store = MemoryUserStore::new();
        let before = create_user(&store, create_req("a@x.com")).await.unwrap();
        let after = update_user(&store, before.id, UpdateUserRequest::default())
            .await
            .unwrap();
        assert!(after.updated_at > before.updated_at);
        let mut expected = before.clone();
        expected.updated_at = after.updated_at;
        assert_eq!(after, expected);
    }

    #[tokio::test]
    async fn single_field_update_round_trips() {
        let store = MemoryUserStore::new();
        let before = create_user(&store, create_req("a@x.com")).await.unwrap();
        let req = UpdateUserRequest {
            first_name: Field::Present("X".into()),
            ..Default::default()
        };
        update_user(&store, before.id, req).await.unwrap();

        let fetched = get_user(&store, before.id).await.unwrap().unwrap();
        assert_eq!(fetched.first_name, "X");
        assert_eq!(fetched.email, before.email);
        assert_eq!(fetched.last_name, before.last_name);
        assert_eq!(fetched.role, before.role);
        assert_eq!(fetched.is_active, before.is_active);
        assert_eq!(fetched.created_at, before.created_at);
    }

    #[tokio::test]
    async fn padded_name_update_round_trips_unchanged() {
        let store = MemoryUserStore::new();
        let user = create_user(&store, create_req("a@x.com")).await.unwrap();
        let req = UpdateUserRequest {
            first_name: Field::Present(" X ".into()),
            ..Default::default()
        };
        update_user(&store, user.id, req).await.unwrap();

        let fetched = get_user(&store, user.id).await.unwrap().unwrap();
        assert_eq!(fetched.first_name, " X ");
        assert_eq!(fetched.last_name, user.last_name);
    }

    #[tokio::test]
    async fn role_update_leaves_the_rest() {
        let store = MemoryUserStore::new();
        let before = create_user(&store, create_req("a@x.com")).await.unwrap();
        let req = UpdateUserRequest {
            role: Field::Present(Role::Admin),
            ..Default::default()
        };
        let after = update_user(&store, before.id, req).await.unwrap();
        assert_eq!(after.role, Role::Admin);
        assert_eq!(after.email, before.email);
        assert_eq!(after.first_name, before.first_name);
        assert_eq!(after.last_name, before.last_name);
        assert_eq!(after.is_active, before.is_active);
    }

    #[tokio::test]
    async fn update_of_missing_user_is_not_found() {
        let store = MemoryUserStore::new();
        let err = update_user(&store, 1, UpdateUserRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, UserError::NotFound(1)));
    }

    #[tokio::test]
    async fn update_validates_before_existence() {
        let store = MemoryUserStore::new();
        let req = UpdateUserRequest {
            first_name: Field::Present("".into()),
            ..Default::default()
        };
        let err = update_user(&store, 1, req).await.unwrap_err();
        assert!(matches!(err, UserError::Validation(_)));
    }

    #[tokio::test]
    async fn delete_is_terminal() {
        let store = MemoryUserStore::new();
        let user = create_user(&store, create_req("a@x.com")).await.unwrap();
        assert_eq!(
            delete_user(&store, user.id).await.unwrap(),
            DeleteUserResponse { success: true }
        );
        assert!(get_user(&store, user.id).await.unwrap().is_none());
        assert!(matches!(
            delete_user(&store, user.id).await,
            Err(UserError::NotFound(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_deletes_report_one_success() {
        let store: Arc<dyn UserStore> = Arc::new(MemoryUserStore::new());
        let id = create_user(store.as_ref(), create_req("a@x.com")).await.unwrap().id;
        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { delete_user(store.as_ref(), id).await })
            })
            .collect();
        let mut ok = 0;
        for task in tasks {
            if task.await.unwrap().is_ok() {
                ok += 1;
            }
        }
        assert_eq!(ok, 1);
    }

    #[tokio::test]
    async fn missing_user_is_none() {
        let store = MemoryUserStore::new();
        assert!(get_user(&store, 99999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let store = MemoryUserStore::new();
        assert!(get_users(&store).await.unwrap().is_empty());

        let older = create_user(&store, create_req("a@x.com")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let newer = create_user(&store, create_req("b@x.com")).await.unwrap();

        let ids: Vec<i64> = get_users(&store).await.unwrap().iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![newer.id, older.id]);
    }
}
