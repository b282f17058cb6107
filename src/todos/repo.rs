use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

/// Todo row. `user_id` is the canonical owner reference.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: String,
    pub completed: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

const TODO_COLUMNS: &str = "id, user_id, title, description, completed, created_at, updated_at";

impl Todo {
    pub async fn create(
        db: &PgPool,
        user_id: Uuid,
        title: &str,
        description: &str,
    ) -> anyhow::Result<Todo> {
        let todo = sqlx::query_as::<_, Todo>(&format!(
            "INSERT INTO todos (user_id, title, description) \
             VALUES ($1, $2, $3) RETURNING {TODO_COLUMNS}"
        ))
        .bind(user_id)
        .bind(title)
        .bind(description)
        .fetch_one(db)
        .await?;
        Ok(todo)
    }

    /// Lookup by id alone; ownership is the handler's decision so that an
    /// absent row can 404 before any 403.
    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<Todo>> {
        let todo = sqlx::query_as::<_, Todo>(&format!(
            "SELECT {TODO_COLUMNS} FROM todos WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(todo)
    }

    pub async fn list_for_user(db: &PgPool, user_id: Uuid) -> anyhow::Result<Vec<Todo>> {
        let rows = sqlx::query_as::<_, Todo>(&format!(
            "SELECT {TODO_COLUMNS} FROM todos \
             WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(db)
        .await?;
        Ok(rows)
    }

    pub async fn count_for_user(db: &PgPool, user_id: Uuid) -> anyhow::Result<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT count(*) FROM todos WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(db)
                .await?;
        Ok(count)
    }

    pub async fn update(
        db: &PgPool,
        id: Uuid,
        title: &str,
        description: &str,
        completed: bool,
    ) -> anyhow::Result<Todo> {
        let todo = sqlx::query_as::<_, Todo>(&format!(
            "UPDATE todos SET title = $2, description = $3, completed = $4, updated_at = now() \
             WHERE id = $1 RETURNING {TODO_COLUMNS}"
        ))
        .bind(id)
        .bind(title)
        .bind(description)
        .bind(completed)
        .fetch_one(db)
        .await?;
        Ok(todo)
    }

    pub async fn delete(db: &PgPool, id: Uuid) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM todos WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(result.rows_affected())
    }
}
