//! The task record a document is persisted in.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::core::Editor;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    NotStarted,
    Ongoing,
    Done,
    Canceled,
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskPriority {
    Urgent,
    High,
    #[default]
    Normal,
    Low,
}

fn default_estimated_days() -> u32 {
    1
}

fn at_least_one_day<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    Ok(u32::deserialize(deserializer)?.max(1))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub id: String,
    pub project_id: String,
    pub title: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default = "default_estimated_days", deserialize_with = "at_least_one_day")]
    pub estimated_days: u32,
    pub date: NaiveDate,
    /// The document, as persisted markup.
    #[serde(default)]
    pub content: String,
}

impl TaskRecord {
    pub fn new(id: impl Into<String>, project_id: impl Into<String>, title: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            id: id.into(),
            project_id: project_id.into(),
            title: title.into(),
            status: TaskStatus::default(),
            priority: TaskPriority::default(),
            estimated_days: default_estimated_days(),
            date,
            content: String::new(),
        }
    }

    /// Opens the content in an editor. Broken markup degrades to paragraphs.
    pub fn editor(&self) -> Editor {
        Editor::from_markup(&self.content)
    }

    pub fn apply(&mut self, update: TaskUpdate) {
        let TaskUpdate {
            title,
            content,
            status,
            priority,
            estimated_days,
        } = update;
        if let Some(title) = title {
            self.title = title;
        }
        if let Some(content) = content {
            self.content = content;
        }
        if let Some(status) = status {
            self.status = status;
        }
        if let Some(priority) = priority {
            self.priority = priority;
        }
        if let Some(days) = estimated_days {
            self.estimated_days = days.max(1);
        }
    }
}

/// A partial update; absent fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<TaskPriority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_days: Option<u32>,
}

impl TaskUpdate {
    pub fn content(markup: impl Into<String>) -> Self {
        Self {
            content: Some(markup.into()),
            ..Self::default()
        }
    }
}
