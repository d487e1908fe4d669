use sqlx::{QueryBuilder, Sqlite};
use tracing::info;

use super::Task;
use crate::error::{Error, Result};

pub const DEFAULT_TITLE: &str = "Untitled";

#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: Option<String>,
    pub completed: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub completed: Option<bool>,
}

pub struct TaskManager<'a> {
    pool: &'a sqlx::SqlitePool,
}

impl<'a> TaskManager<'a> {
    pub fn new(pool: &'a sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

impl TaskManager<'_> {
    pub async fn list(&self) -> Result<Vec<Task>> {
        Ok(sqlx::query_as::<_, Task>("SELECT * FROM Task ORDER BY id")
            .fetch_all(self.pool)
            .await?)
    }

    pub async fn get(&self, id: i64) -> Result<Task> {
        sqlx::query_as::<_, Task>("SELECT * FROM Task WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| Error::not_found("task", id))
    }

    pub async fn create(&self, task: NewTask) -> Result<Task> {
        let created = sqlx::query_as::<_, Task>(
            "INSERT INTO Task(title, completed) VALUES (?, ?) RETURNING *",
        )
        .bind(task.title.unwrap_or_else(|| DEFAULT_TITLE.to_owned()))
        .bind(task.completed.unwrap_or(false))
        .fetch_one(self.pool)
        .await?;

        info!("created task {}", created.id);
        Ok(created)
    }

    pub async fn update(&self, id: i64, patch: TaskPatch) -> Result<Task> {
        if patch.title.is_none() && patch.completed.is_none() {
            return self.get(id).await;
        }

        let mut builder = QueryBuilder::<Sqlite>::new("UPDATE Task SET ");
        {
            let mut fields = builder.separated(", ");
            if let Some(title) = patch.title {
                fields.push("title = ").push_bind_unseparated(title);
            }
            if let Some(completed) = patch.completed {
                fields.push("completed = ").push_bind_unseparated(completed);
            }
        }
        builder.push(" WHERE id = ").push_bind(id).push(" RETURNING *");

        builder
            .build_query_as::<Task>()
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| Error::not_found("task", id))
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM Task WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found("task", id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[sqlx::test]
    async fn defaults_apply_on_create(pool: sqlx::SqlitePool) {
        let task = TaskManager::new(&pool)
            .create(NewTask::default())
            .await
            .unwrap();

        assert_eq!(task.title, DEFAULT_TITLE);
        assert!(!task.completed);
    }

    #[sqlx::test(fixtures("tasks"))]
    async fn ok_complete_task(pool: sqlx::SqlitePool) {
        let task = TaskManager::new(&pool)
            .update(
                1,
                TaskPatch {
                    completed: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(task.completed);
        assert_eq!(task.title, "Sweep the chapel");
    }

    #[sqlx::test(fixtures("tasks"))]
    async fn delete_twice_is_not_found(pool: sqlx::SqlitePool) {
        let manager = TaskManager::new(&pool);

        manager.delete(1).await.unwrap();
        assert!(matches!(
            manager.delete(1).await.unwrap_err(),
            Error::NotFound(_)
        ));
    }
}
