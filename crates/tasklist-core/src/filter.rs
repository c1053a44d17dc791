use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;

use crate::task::Task;

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
)]
pub enum FilterMode {
  #[default]
  All,
  Active,
  Completed
}

impl FilterMode {
  pub fn as_str(self) -> &'static str {
    match self {
      | FilterMode::All => "all",
      | FilterMode::Active => "active",
      | FilterMode::Completed => {
        "completed"
      }
    }
  }

  pub fn admits(
    self,
    task: &Task
  ) -> bool {
    match self {
      | FilterMode::All => true,
      | FilterMode::Active => {
        !task.completed
      }
      | FilterMode::Completed => {
        task.completed
      }
    }
  }
}

impl fmt::Display for FilterMode {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for FilterMode {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "all" => Ok(FilterMode::All),
      | "active" | "pending" => {
        Ok(FilterMode::Active)
      }
      | "completed" | "done" => {
        Ok(FilterMode::Completed)
      }
      | other => Err(anyhow!(
        "invalid filter: {other} \
         (expected all, active or \
         completed)"
      ))
    }
  }
}

/// Case-insensitive substring match;
/// an empty term matches everything.
pub fn matches_search(
  task: &Task,
  term: &str
) -> bool {
  if term.is_empty() {
    return true;
  }
  task
    .text
    .to_lowercase()
    .contains(&term.to_lowercase())
}

/// Tasks admitted by `mode` whose
/// text contains `term`, in
/// collection order.
#[tracing::instrument(skip(tasks), fields(total = tasks.len()))]
pub fn visible_tasks<'a>(
  tasks: &'a [Task],
  mode: FilterMode,
  term: &str
) -> Vec<&'a Task> {
  tasks
    .iter()
    .filter(|task| mode.admits(task))
    .filter(|task| {
      matches_search(task, term)
    })
    .collect()
}
