use crate::task::{
  Priority,
  Task
};

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
)]
pub struct PriorityCounts {
  pub high:   usize,
  pub medium: usize,
  pub low:    usize
}

impl PriorityCounts {
  pub fn get(
    &self,
    priority: Priority
  ) -> usize {
    match priority {
      | Priority::High => self.high,
      | Priority::Medium => self.medium,
      | Priority::Low => self.low
    }
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
)]
pub struct Stats {
  pub total:       usize,
  pub completed:   usize,
  pub pending:     usize,
  pub by_priority: PriorityCounts
}

/// Summary over the whole
/// collection, independent of any
/// filter or search.
pub fn stats(tasks: &[Task]) -> Stats {
  let mut out = Stats {
    total: tasks.len(),
    ..Stats::default()
  };

  for task in tasks {
    if task.completed {
      out.completed += 1;
    }
    match task.priority {
      | Priority::High => {
        out.by_priority.high += 1
      }
      | Priority::Medium => {
        out.by_priority.medium += 1
      }
      | Priority::Low => {
        out.by_priority.low += 1
      }
    }
  }

  out.pending =
    out.total - out.completed;
  out
}
