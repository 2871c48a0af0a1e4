use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How hard a task is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(format!("unknown difficulty '{}'", other)),
        }
    }
}

/// Represents a task that collab sessions work on.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// The unique identifier for the task.
    pub id: Uuid,
    /// The task's title.
    pub title: String,
    /// The task's category.
    pub category: String,
    /// The task's difficulty.
    pub difficulty: Difficulty,
    /// The task's statement.
    pub content: String,
    /// Whether the task has been soft-deleted.
    pub is_deleted: bool,
    /// The timestamp when the task was created.
    pub created_at: DateTime<Utc>,
}

/// What a joining user asks to work on.
///
/// Matches tasks by category and difficulty, and by exact title when one is given.
#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TaskDescriptor {
    #[garde(length(min = 1, max = 100))]
    pub category: String,
    #[garde(skip)]
    pub difficulty: Difficulty,
    #[garde(length(min = 1, max = 200))]
    #[serde(default)]
    pub title: Option<String>,
}

impl TaskDescriptor {
    /// Whether `task` satisfies this descriptor.
    pub fn matches(&self, task: &Task) -> bool {
        !task.is_deleted
            && task.category == self.category
            && task.difficulty == self.difficulty
            && self.title.as_ref().is_none_or(|title| *title == task.title)
    }
}
