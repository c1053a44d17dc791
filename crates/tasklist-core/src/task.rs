use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::datetime::iso_millis_serde;

/// Identifier assigned to a task at creation; unique within a collection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct TaskId(pub i64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" | "h" => Ok(Priority::High),
            "medium" | "m" => Ok(Priority::Medium),
            "low" | "l" => Ok(Priority::Low),
            other => Err(anyhow!("invalid priority: {other} (expected high, medium or low)")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,

    pub text: String,

    #[serde(default)]
    pub completed: bool,

    #[serde(with = "iso_millis_serde")]
    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub priority: Priority,
}

impl Task {
    /// Builds a fresh, uncompleted task with medium priority.
    pub fn new(id: TaskId, text: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            text,
            completed: false,
            created_at: now,
            priority: Priority::Medium,
        }
    }
}

/// Next id for a task created at `now`: the millisecond timestamp, unless an
/// existing id is already at or past it.
pub fn next_id(tasks: &[Task], now: DateTime<Utc>) -> TaskId {
    let stamp = now.timestamp_millis();
    let Some(max) = tasks.iter().map(|t| t.id.0).max() else {
        return TaskId(stamp);
    };

    match max.checked_add(1) {
        Some(floor) => TaskId(stamp.max(floor)),
        // Nothing is left above the largest id; take the nearest free one.
        None => {
            let taken: HashSet<i64> = tasks.iter().map(|t| t.id.0).collect();
            let free = (stamp..=i64::MAX)
                .chain((i64::MIN..stamp).rev())
                .find(|candidate| !taken.contains(candidate))
                .unwrap_or(stamp);
            TaskId(free)
        }
    }
}
