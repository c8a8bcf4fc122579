//! Todo model and request types.
//!
//! Todos form an owner-scoped ordered list: for a fixed owner the `position`
//! values of live todos are exactly `0..n-1`, dense and duplicate-free.

use serde::{Deserialize, Serialize};

/// Todo priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Priority::Low),
            "medium" => Some(Priority::Medium),
            "high" => Some(Priority::High),
            _ => None,
        }
    }
}

/// A todo item.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    pub id: String,
    pub user: String,
    pub title: String,
    pub content: String,
    pub completed: bool,
    pub priority: Priority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    pub tags: Vec<String>,
    pub position: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// Request body for creating a todo.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTodoRequest {
    pub title: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

/// Request body for partially updating a todo.
///
/// These fields are the whitelist of what a caller may patch; anything else in
/// the payload is ignored by deserialization.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTodoRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub completed: Option<bool>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

impl UpdateTodoRequest {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.content.is_none()
            && self.completed.is_none()
            && self.priority.is_none()
            && self.due_date.is_none()
            && self.tags.is_none()
    }
}

/// Request body for moving a todo to a new position.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePositionRequest {
    pub position: i64,
}

/// Request body for patching several todos at once.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkUpdateTodosRequest {
    pub todo_ids: Vec<String>,
    pub updates: UpdateTodoRequest,
}

/// Result of a bulk update.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkUpdateResult {
    pub modified_count: u64,
    pub matched_count: u64,
}

/// Per-owner todo statistics.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoStats {
    pub total_todos: i64,
    pub completed_todos: i64,
    pub pending_todos: i64,
    pub overdue_todos: i64,
    pub today_todos: i64,
    pub completion_rate: i64,
    pub priority_breakdown: PriorityBreakdown,
}

/// Open todos grouped by priority.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriorityBreakdown {
    pub high: i64,
    pub medium: i64,
    pub low: i64,
}
