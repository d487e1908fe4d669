use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use axum_extra::extract::WithRejection;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::manager::{
    task_manager::{NewTask, TaskManager, TaskPatch},
    Task,
};
use crate::AppState;

#[derive(Deserialize, Debug, Default)]
pub struct TaskPayload {
    title: Option<String>,
    completed: Option<bool>,
}

pub async fn list_tasks(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Task>>> {
    Ok(Json(TaskManager::new(&state.pool).list().await?))
}

pub async fn get_task(
    State(state): State<Arc<AppState>>,
    WithRejection(Path(id), _): WithRejection<Path<i64>, Error>,
) -> Result<Json<Task>> {
    Ok(Json(TaskManager::new(&state.pool).get(id).await?))
}

pub async fn create_task(
    State(state): State<Arc<AppState>>,
    WithRejection(Json(payload), _): WithRejection<Json<TaskPayload>, Error>,
) -> Result<(StatusCode, Json<Task>)> {
    let TaskPayload { title, completed } = payload;
    let created = TaskManager::new(&state.pool)
        .create(NewTask { title, completed })
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_task(
    State(state): State<Arc<AppState>>,
    WithRejection(Path(id), _): WithRejection<Path<i64>, Error>,
    WithRejection(Json(payload), _): WithRejection<Json<TaskPayload>, Error>,
) -> Result<Json<Task>> {
    let TaskPayload { title, completed } = payload;
    Ok(Json(
        TaskManager::new(&state.pool)
            .update(id, TaskPatch { title, completed })
            .await?,
    ))
}

pub async fn delete_task(
    State(state): State<Arc<AppState>>,
    WithRejection(Path(id), _): WithRejection<Path<i64>, Error>,
) -> Result<StatusCode> {
    TaskManager::new(&state.pool).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
