use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::instrument;

use crate::{
    state::AppState,
    users::{
        dto::{CreateUserRequest, DeleteUserResponse, UpdateUserRequest},
        error::UserError,
        repo_types::User,
        services,
    },
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(get_users).post(create_user))
        .route(
            "/users/:id",
            get(get_user).patch(update_user).delete(delete_user),
        )
}

#[instrument(skip(state, body))]
pub async fn create_user(
    State(state): State<AppState>,
    body: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<User>), UserError> {
    let Json(body) = body?;
    let user = services::create_user(state.users.as_ref(), body).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

#[instrument(skip(state))]
pub async fn get_users(State(state): State<AppState>) -> Result<Json<Vec<User>>, UserError> {
    let users = services::get_users(state.users.as_ref()).await?;
    Ok(Json(users))
}

#[instrument(skip(state, id))]
pub async fn get_user(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Option<User>>, UserError> {
    let Path(id) = id?;
    let user = services::get_user(state.users.as_ref(), id).await?;
    Ok(Json(user))
}

#[instrument(skip(state, id, body))]
pub async fn update_user(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
    body: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Result<Json<User>, UserError> {
    let Path(id) = id?;
    let Json(body) = body?;
    let user = services::update_user(state.users.as_ref(), id, body).await?;
    Ok(Json(user))
}

#[instrument(skip(state, id))]
pub async fn delete_user(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<DeleteUserResponse>, UserError> {
    let Path(id) = id?;
    let res = services::delete_user(state.users.as_ref(), id).await?;
    Ok(Json(res))
}
