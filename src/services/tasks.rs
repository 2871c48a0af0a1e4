use chrono::Utc;
use garde::Validate;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::task::{Difficulty, Task},
    state::AppState,
};

/// The payload for publishing a task.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    #[garde(length(min = 1, max = 200))]
    pub title: String,
    #[garde(length(min = 1, max = 100))]
    pub category: String,
    #[garde(skip)]
    pub difficulty: Difficulty,
    #[garde(length(min = 1, max = 20000))]
    pub content: String,
    #[garde(skip)]
    #[serde(default)]
    pub is_deleted: bool,
}

/// Publishes a task so joins can match it.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `input` - The validated task payload.
///
/// # Returns
///
/// A `Result` containing the stored `Task`.
pub async fn create_task(state: &AppState, input: NewTask) -> Result<Task> {
    let task = state
        .store
        .create_task(Task {
            id: Uuid::new_v4(),
            title: input.title,
            category: input.category,
            difficulty: input.difficulty,
            content: input.content,
            is_deleted: input.is_deleted,
            created_at: Utc::now(),
        })
        .await?;

    tracing::info!("📚 Task {} created in {}/{}", task.id, task.category, task.difficulty);
    Ok(task)
}

/// Fetches a task by id. Soft-deleted tasks are still returned.
pub async fn get_task(state: &AppState, task_id: Uuid) -> Result<Task> {
    state
        .store
        .find_task(task_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("task {} not found", task_id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::task::TaskDescriptor;
    use crate::services::membership::tests::recording_state;
    use crate::validation::input::validate;

    fn new_task(category: &str) -> NewTask {
        NewTask {
            title: "Merge intervals".to_string(),
            category: category.to_string(),
            difficulty: Difficulty::Hard,
            content: "Given a list of intervals...".to_string(),
            is_deleted: false,
        }
    }

    #[tokio::test]
    async fn created_task_is_matchable() {
        let (state, _) = recording_state();
        let task = create_task(&state, new_task("intervals")).await.unwrap();

        assert_eq!(get_task(&state, task.id).await.unwrap().title, "Merge intervals");

        let descriptor = TaskDescriptor {
            category: "intervals".to_string(),
            difficulty: Difficulty::Hard,
            title: None,
        };
        let matched = state.store.find_task_for_descriptor(&descriptor).await.unwrap();
        assert_eq!(matched.map(|t| t.id), Some(task.id));
    }

    #[tokio::test]
    async fn missing_task_is_not_found() {
        let (state, _) = recording_state();
        let err = get_task(&state, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn empty_title_is_rejected() {
        let mut task = new_task("intervals");
        task.title.clear();
        assert!(matches!(validate(&task), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn soft_delete_flag_defaults_to_false() {
        let task: NewTask = sonic_rs::from_str(
            r#"{"title":"t","category":"c","difficulty":"easy","content":"x"}"#,
        )
        .unwrap();
        assert!(!task.is_deleted);
    }
}
