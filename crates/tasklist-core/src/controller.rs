use chrono::{
  DateTime,
  Utc
};
use tracing::{
  debug,
  info,
  instrument,
  warn
};

use crate::datastore::{
  KeyValueStore,
  load_tasks,
  save_tasks
};
use crate::datetime::truncate_to_millis;
use crate::filter::{
  FilterMode,
  visible_tasks
};
use crate::stats::{
  Stats,
  stats
};
use crate::task::{
  Priority,
  Task,
  TaskId,
  next_id
};

pub trait Clock {
  fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> {
    Utc::now()
  }
}

/// Draws the current view. Called
/// after every controller operation.
pub trait Renderer {
  fn render(
    &mut self,
    view: &View<'_>
  ) -> anyhow::Result<()>;
}

#[derive(
  Debug, Clone, PartialEq, Eq,
)]
pub struct EditState {
  pub task_id: TaskId,
  pub text:    String
}

/// Session state. Only `tasks` is
/// ever persisted.
#[derive(Debug, Clone, Default)]
pub struct TaskListState {
  pub tasks:   Vec<Task>,
  pub filter:  FilterMode,
  pub search:  String,
  pub editing: Option<EditState>,
  pub draft:   String
}

/// Read-only snapshot handed to the
/// renderer.
#[derive(Debug, Clone)]
pub struct View<'a> {
  pub visible: Vec<&'a Task>,
  pub stats:   Stats,
  pub filter:  FilterMode,
  pub search:  &'a str,
  pub editing: Option<&'a EditState>,
  pub draft:   &'a str
}

impl TaskListState {
  pub fn view(&self) -> View<'_> {
    View {
      visible: visible_tasks(
        &self.tasks,
        self.filter,
        &self.search
      ),
      stats:   stats(&self.tasks),
      filter:  self.filter,
      search:  &self.search,
      editing: self.editing.as_ref(),
      draft:   &self.draft
    }
  }

  fn find_mut(
    &mut self,
    id: TaskId
  ) -> Option<&mut Task> {
    self
      .tasks
      .iter_mut()
      .find(|task| task.id == id)
  }

  fn contains(
    &self,
    id: TaskId
  ) -> bool {
    self
      .tasks
      .iter()
      .any(|task| task.id == id)
  }

  fn drop_stale_edit(&mut self) {
    if let Some(edit) = &self.editing
      && !self.contains(edit.task_id)
    {
      debug!(id = %edit.task_id, "edit target removed; leaving edit mode");
      self.editing = None;
    }
  }
}

pub struct TaskListController<
  S,
  R,
  C = SystemClock
> {
  state:       TaskListState,
  store:       S,
  storage_key: String,
  renderer:    R,
  clock:       C
}

impl<S, R, C> TaskListController<S, R, C>
where
  S: KeyValueStore,
  R: Renderer,
  C: Clock
{
  /// Loads the saved collection.
  /// Nothing is drawn until the
  /// first operation or `refresh`.
  #[instrument(skip(
    store, renderer, clock
  ))]
  pub fn new(
    store: S,
    storage_key: &str,
    renderer: R,
    clock: C
  ) -> Self {
    let tasks =
      load_tasks(&store, storage_key);
    info!(
      count = tasks.len(),
      "task list ready"
    );

    Self {
      state: TaskListState {
        tasks,
        ..TaskListState::default()
      },
      store,
      storage_key: storage_key
        .to_string(),
      renderer,
      clock
    }
  }

  pub fn state(&self) -> &TaskListState {
    &self.state
  }

  pub fn tasks(&self) -> &[Task] {
    &self.state.tasks
  }

  pub fn store(&self) -> &S {
    &self.store
  }

  pub fn renderer(&self) -> &R {
    &self.renderer
  }

  pub fn view(&self) -> View<'_> {
    self.state.view()
  }

  pub fn visible_tasks(
    &self
  ) -> Vec<&Task> {
    visible_tasks(
      &self.state.tasks,
      self.state.filter,
      &self.state.search
    )
  }

  pub fn stats(&self) -> Stats {
    stats(&self.state.tasks)
  }

  pub fn refresh(&mut self) {
    let view = self.state.view();
    if let Err(err) =
      self.renderer.render(&view)
    {
      warn!(error = %format!("{err:#}"), "render failed");
    }
  }

  #[instrument(skip(self))]
  pub fn set_draft(
    &mut self,
    text: &str
  ) {
    self.state.draft = text.to_string();
    self.settle(false);
  }

  pub fn submit_draft(
    &mut self
  ) -> Option<TaskId> {
    let draft = std::mem::take(
      &mut self.state.draft
    );
    self.create(&draft)
  }

  /// Prepends a task built from the
  /// trimmed text. Blank input is
  /// ignored. The draft buffer is
  /// cleared either way.
  #[instrument(skip(self))]
  pub fn create(
    &mut self,
    raw_text: &str
  ) -> Option<TaskId> {
    self.state.draft.clear();

    let text = raw_text.trim();
    if text.is_empty() {
      debug!(
        "ignoring blank task text"
      );
      self.settle(false);
      return None;
    }

    let now = truncate_to_millis(
      self.clock.now()
    );
    let id =
      next_id(&self.state.tasks, now);
    self.state.tasks.insert(
      0,
      Task::new(
        id,
        text.to_string(),
        now
      )
    );
    debug!(%id, count = self.state.tasks.len(), "task created");

    self.settle(true);
    Some(id)
  }

  #[instrument(skip(self))]
  pub fn toggle_completed(
    &mut self,
    id: TaskId
  ) {
    let changed = match self
      .state
      .find_mut(id)
    {
      | Some(task) => {
        task.completed = !task.completed;
        debug!(%id, completed = task.completed, "toggled task");
        true
      }
      | None => {
        debug!(%id, "toggle: no such task");
        false
      }
    };
    self.settle(changed);
  }

  #[instrument(skip(self))]
  pub fn delete(&mut self, id: TaskId) {
    let before = self.state.tasks.len();
    self
      .state
      .tasks
      .retain(|task| task.id != id);
    let changed =
      self.state.tasks.len() != before;
    if changed {
      self.state.drop_stale_edit();
      debug!(%id, "task deleted");
    } else {
      debug!(%id, "delete: no such task");
    }
    self.settle(changed);
  }

  /// Enters edit mode for `id`,
  /// replacing any edit already in
  /// progress without saving it.
  #[instrument(skip(self))]
  pub fn begin_edit(
    &mut self,
    id: TaskId
  ) {
    let text = self
      .state
      .tasks
      .iter()
      .find(|task| task.id == id)
      .map(|task| task.text.clone());

    match text {
      | Some(text) => {
        if let Some(prev) =
          &self.state.editing
          && prev.task_id != id
        {
          debug!(previous = %prev.task_id, "discarding unsaved edit");
        }
        self.state.editing =
          Some(EditState {
            task_id: id,
            text
          });
      }
      | None => {
        debug!(%id, "begin_edit: no such task");
      }
    }
    self.settle(false);
  }

  #[instrument(skip(self))]
  pub fn set_edit_text(
    &mut self,
    text: &str
  ) {
    match &mut self.state.editing {
      | Some(edit) => {
        edit.text = text.to_string();
      }
      | None => {
        debug!(
          "set_edit_text: not editing"
        );
      }
    }
    self.settle(false);
  }

  /// Writes the trimmed edit buffer
  /// into task `id` and leaves edit
  /// mode. A blank buffer leaves the
  /// text as it was.
  #[instrument(skip(self))]
  pub fn commit_edit(
    &mut self,
    id: TaskId
  ) {
    let buffer = self
      .state
      .editing
      .take()
      .map(|edit| edit.text)
      .unwrap_or_default();
    let text = buffer.trim();

    let changed = if text.is_empty() {
      debug!(%id, "blank edit rejected; text unchanged");
      false
    } else {
      match self.state.find_mut(id) {
        | Some(task) => {
          let changed =
            task.text != text;
          task.text = text.to_string();
          debug!(%id, "edit committed");
          changed
        }
        | None => {
          debug!(%id, "commit_edit: no such task");
          false
        }
      }
    };
    self.settle(changed);
  }

  #[instrument(skip(self))]
  pub fn cancel_edit(&mut self) {
    if self.state.editing.take().is_some()
    {
      debug!("edit cancelled");
    }
    self.settle(false);
  }

  #[instrument(skip(self))]
  pub fn set_priority(
    &mut self,
    id: TaskId,
    priority: Priority
  ) {
    let changed = match self
      .state
      .find_mut(id)
    {
      | Some(task) => {
        let changed =
          task.priority != priority;
        task.priority = priority;
        debug!(%id, %priority, "priority set");
        changed
      }
      | None => {
        debug!(%id, "set_priority: no such task");
        false
      }
    };
    self.settle(changed);
  }

  #[instrument(skip(self))]
  pub fn set_filter(
    &mut self,
    mode: FilterMode
  ) {
    self.state.filter = mode;
    self.settle(false);
  }

  #[instrument(skip(self))]
  pub fn set_search_term(
    &mut self,
    term: &str
  ) {
    self.state.search = term.to_string();
    self.settle(false);
  }

  #[instrument(skip(self))]
  pub fn clear_completed(&mut self) {
    let before = self.state.tasks.len();
    self
      .state
      .tasks
      .retain(|task| !task.completed);
    let removed =
      before - self.state.tasks.len();
    if removed > 0 {
      self.state.drop_stale_edit();
    }
    debug!(
      removed,
      "cleared completed tasks"
    );
    self.settle(removed > 0);
  }

  fn settle(
    &mut self,
    tasks_changed: bool
  ) {
    if tasks_changed {
      self.persist();
    }
    self.refresh();
  }

  fn persist(&mut self) {
    if let Err(err) = save_tasks(
      &mut self.store,
      &self.storage_key,
      &self.state.tasks
    ) {
      warn!(error = %format!("{err:#}"), "failed to persist tasks; continuing");
    }
  }
}
