use axum::{
    extract::{Path, State},
    Json,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::ApiError;
use crate::response::ApiResponse;
use crate::state::AppState;
use crate::todos::dto::{CreateTodoRequest, UpdateTodoRequest};
use crate::todos::repo::Todo;
use crate::users::session::CurrentUser;

fn ensure_owner(todo: &Todo, caller: Uuid, verb: &str) -> Result<(), ApiError> {
    if todo.user_id != caller {
        return Err(ApiError::Forbidden(format!(
            "you don't have permission to {verb} this todo"
        )));
    }
    Ok(())
}

/// Existence before ownership: an absent id is 404 for everyone, a present
/// row owned by someone else is 403.
async fn load_owned(state: &AppState, id: Uuid, caller: Uuid, verb: &str) -> Result<Todo, ApiError> {
    let todo = Todo::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("todo not found".into()))?;
    ensure_owner(&todo, caller, verb)?;
    Ok(todo)
}

/// POST /todos
#[instrument(skip(state, current, payload))]
pub async fn create_todo(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(payload): Json<CreateTodoRequest>,
) -> Result<Json<ApiResponse<Todo>>, ApiError> {
    let title = payload.title.trim();
    let description = payload.description.trim();
    if title.is_empty() || description.is_empty() {
        return Err(ApiError::BadRequest(
            "title and description are required".into(),
        ));
    }

    let todo = Todo::create(&state.db, current.0.id, title, description).await?;
    info!(todo_id = %todo.id, user_id = %current.0.id, "todo created");
    Ok(Json(ApiResponse::ok(todo, "Todo created successfully")))
}

/// GET /todos — the caller's todos, newest first.
#[instrument(skip(state, current))]
pub async fn list_todos(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<ApiResponse<Vec<Todo>>>, ApiError> {
    let todos = Todo::list_for_user(&state.db, current.0.id).await?;
    Ok(Json(ApiResponse::ok(todos, "Todos fetched successfully")))
}

/// GET /todos/:id
#[instrument(skip(state, current))]
pub async fn get_todo(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Todo>>, ApiError> {
    let todo = load_owned(&state, id, current.0.id, "view").await?;
    Ok(Json(ApiResponse::ok(todo, "Todo fetched successfully")))
}

/// PATCH /todos/:id
#[instrument(skip(state, current, payload))]
pub async fn update_todo(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateTodoRequest>,
) -> Result<Json<ApiResponse<Todo>>, ApiError> {
    let existing = load_owned(&state, id, current.0.id, "update").await?;

    let title = match payload.title.as_deref().map(str::trim) {
        Some("") => return Err(ApiError::BadRequest("title must not be blank".into())),
        Some(t) => t.to_string(),
        None => existing.title,
    };
    let description = match payload.description.as_deref().map(str::trim) {
        Some("") => {
            return Err(ApiError::BadRequest("description must not be blank".into()))
        }
        Some(d) => d.to_string(),
        None => existing.description,
    };
    let completed = payload.completed.unwrap_or(existing.completed);

    let todo = Todo::update(&state.db, id, &title, &description, completed).await?;
    Ok(Json(ApiResponse::ok(todo, "Todo updated successfully")))
}

/// DELETE /todos/:id
#[instrument(skip(state, current))]
pub async fn delete_todo(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Option<()>>>, ApiError> {
    load_owned(&state, id, current.0.id, "delete").await?;
    Todo::delete(&state.db, id).await?;
    info!(todo_id = %id, user_id = %current.0.id, "todo deleted");
    Ok(Json(ApiResponse::ok(None, "Todo deleted successfully")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use time::OffsetDateTime;

    fn todo_owned_by(user_id: Uuid) -> Todo {
        let now = OffsetDateTime::now_utc();
        Todo {
            id: Uuid::new_v4(),
            user_id,
            title: "buy milk".into(),
            description: "two liters".into(),
            completed: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn owner_passes_the_ownership_check() {
        let owner = Uuid::new_v4();
        assert!(ensure_owner(&todo_owned_by(owner), owner, "update").is_ok());
    }

    #[test]
    fn another_user_gets_forbidden() {
        let owner = Uuid::new_v4();
        let intruder = Uuid::new_v4();
        let err = ensure_owner(&todo_owned_by(owner), intruder, "delete").unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert!(err.to_string().contains("permission"));
    }
}
