use std::io::{
  BufRead,
  Write
};
use std::str::FromStr;

use anyhow::{
  Context,
  anyhow
};
use tracing::{
  debug,
  info,
  instrument
};

use crate::cli::Invocation;
use crate::controller::{
  Clock,
  Renderer,
  TaskListController
};
use crate::datastore::KeyValueStore;
use crate::filter::FilterMode;
use crate::task::{
  Priority,
  TaskId
};

const HELP: &str = "\
commands (any unique prefix works):
  add TEXT...           create a task
  draft TEXT...         fill the input box
  submit                create a task from the input box
  toggle REF            mark done / not done
  delete REF            remove a task
  edit REF              start editing a task
  text TEXT...          replace the edit buffer
  save [REF]            commit the edit
  cancel                abandon the edit
  priority REF LEVEL    set high, medium or low
  filter MODE           show all, active or completed
  search [TERM...]      case-insensitive search; empty clears
  clear                 remove completed tasks
  list                  redraw
  help                  this text
  quit | exit           leave the shell

REF is a position in the visible list (1, 2, ...) or id:N for a task id.";

pub fn known_command_names()
-> Vec<&'static str> {
  vec![
    "add", "draft", "submit",
    "toggle", "delete", "edit",
    "text", "save", "cancel",
    "priority", "filter", "search",
    "clear", "list", "help", "quit",
    "exit",
  ]
}

/// Exact names win; otherwise a
/// prefix must match exactly one
/// known name.
pub fn expand_command_abbrev(
  token: &str,
  known: &[&'static str]
) -> Option<&'static str> {
  if let Some(exact) = known
    .iter()
    .copied()
    .find(|name| *name == token)
  {
    return Some(exact);
  }

  let mut matches = known
    .iter()
    .copied()
    .filter(|name| {
      name.starts_with(token)
    });
  let first = matches.next()?;
  if matches.next().is_some() {
    None
  } else {
    Some(first)
  }
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum TaskRef {
  Position(usize),
  Id(TaskId)
}

impl FromStr for TaskRef {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    if let Some(raw) =
      s.strip_prefix("id:")
    {
      let id =
        raw.parse::<i64>().with_context(
          || format!("invalid task id: {raw}")
        )?;
      return Ok(TaskRef::Id(TaskId(id)));
    }

    match s.parse::<usize>() {
      | Ok(0) | Err(_) => Err(anyhow!(
        "invalid task reference: {s} \
         (expected a list position or \
         id:N)"
      )),
      | Ok(pos) => {
        Ok(TaskRef::Position(pos))
      }
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
  Add(String),
  Draft(String),
  Submit,
  Toggle(TaskRef),
  Delete(TaskRef),
  Edit(TaskRef),
  Text(String),
  Save(Option<TaskRef>),
  Cancel,
  SetPriority(TaskRef, Priority),
  Filter(FilterMode),
  Search(String),
  Clear,
  List,
  Help,
  Quit
}

impl Action {
  #[instrument]
  pub fn from_invocation(
    inv: &Invocation
  ) -> anyhow::Result<Self> {
    let args = inv.args();
    let action = match inv
      .command
      .as_str()
    {
      | "add" => {
        Action::Add(inv.rest.clone())
      }
      | "draft" => {
        Action::Draft(inv.rest.clone())
      }
      | "submit" => Action::Submit,
      | "toggle" => Action::Toggle(
        single_ref(&args, "toggle")?
      ),
      | "delete" => Action::Delete(
        single_ref(&args, "delete")?
      ),
      | "edit" => Action::Edit(
        single_ref(&args, "edit")?
      ),
      | "text" => {
        Action::Text(inv.rest.clone())
      }
      | "save" => {
        match args.as_slice() {
          | [] => Action::Save(None),
          | [r] => {
            Action::Save(Some(r.parse()?))
          }
          | _ => {
            return Err(anyhow!(
              "usage: save [REF]"
            ));
          }
        }
      }
      | "cancel" => Action::Cancel,
      | "priority" => {
        match args.as_slice() {
          | [r, level] => {
            Action::SetPriority(
              r.parse()?,
              level.parse()?
            )
          }
          | _ => {
            return Err(anyhow!(
              "usage: priority REF \
               high|medium|low"
            ));
          }
        }
      }
      | "filter" => {
        match args.as_slice() {
          | [mode] => {
            Action::Filter(mode.parse()?)
          }
          | _ => {
            return Err(anyhow!(
              "usage: filter \
               all|active|completed"
            ));
          }
        }
      }
      | "search" => {
        Action::Search(inv.rest.clone())
      }
      | "clear" => Action::Clear,
      | "list" => Action::List,
      | "help" => Action::Help,
      | "quit" | "exit" => Action::Quit,
      | other => {
        return Err(anyhow!(
          "unknown command: {other}"
        ));
      }
    };
    Ok(action)
  }
}

fn single_ref(
  args: &[&str],
  command: &str
) -> anyhow::Result<TaskRef> {
  match args {
    | [r] => r.parse(),
    | _ => Err(anyhow!(
      "usage: {command} REF"
    ))
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
  Continue,
  Quit
}

fn resolve_ref<S, R, C>(
  controller: &TaskListController<
    S,
    R,
    C
  >,
  task_ref: TaskRef
) -> anyhow::Result<TaskId>
where
  S: KeyValueStore,
  R: Renderer,
  C: Clock
{
  match task_ref {
    | TaskRef::Id(id) => Ok(id),
    | TaskRef::Position(pos) => {
      pos
        .checked_sub(1)
        .and_then(|idx| {
          controller
            .visible_tasks()
            .get(idx)
            .map(|task| task.id)
        })
        .ok_or_else(|| {
          anyhow!(
            "no task at position {pos}"
          )
        })
    }
  }
}

#[instrument(skip(controller, out))]
pub fn dispatch<S, R, C, W>(
  controller: &mut TaskListController<
    S,
    R,
    C
  >,
  action: Action,
  out: &mut W
) -> anyhow::Result<Flow>
where
  S: KeyValueStore,
  R: Renderer,
  C: Clock,
  W: Write
{
  debug!(?action, "dispatching action");

  match action {
    | Action::Add(text) => {
      controller.create(&text);
    }
    | Action::Draft(text) => {
      controller.set_draft(&text)
    }
    | Action::Submit => {
      controller.submit_draft();
    }
    | Action::Toggle(r) => {
      let id = resolve_ref(controller, r)?;
      controller.toggle_completed(id)
    }
    | Action::Delete(r) => {
      let id = resolve_ref(controller, r)?;
      controller.delete(id)
    }
    | Action::Edit(r) => {
      let id = resolve_ref(controller, r)?;
      controller.begin_edit(id)
    }
    | Action::Text(text) => {
      if controller.state().editing.is_none()
      {
        return Err(anyhow!(
          "not editing any task; use \
           edit REF first"
        ));
      }
      controller.set_edit_text(&text)
    }
    | Action::Save(r) => {
      let id = match r {
        | Some(r) => {
          resolve_ref(controller, r)?
        }
        | None => controller
          .state()
          .editing
          .as_ref()
          .map(|edit| edit.task_id)
          .ok_or_else(|| {
            anyhow!(
              "not editing any task"
            )
          })?
      };
      controller.commit_edit(id)
    }
    | Action::Cancel => {
      controller.cancel_edit()
    }
    | Action::SetPriority(r, level) => {
      let id = resolve_ref(controller, r)?;
      controller.set_priority(id, level)
    }
    | Action::Filter(mode) => {
      controller.set_filter(mode)
    }
    | Action::Search(term) => {
      controller.set_search_term(&term)
    }
    | Action::Clear => {
      controller.clear_completed()
    }
    | Action::List => {
      controller.refresh()
    }
    | Action::Help => {
      writeln!(out, "{HELP}")?;
    }
    | Action::Quit => {
      return Ok(Flow::Quit);
    }
  }

  Ok(Flow::Continue)
}

/// Runs one line of shell input.
pub fn execute_line<S, R, C, W>(
  controller: &mut TaskListController<
    S,
    R,
    C
  >,
  line: &str,
  out: &mut W
) -> anyhow::Result<Flow>
where
  S: KeyValueStore,
  R: Renderer,
  C: Clock,
  W: Write
{
  let Some(inv) =
    Invocation::from_line(line)?
  else {
    return Ok(Flow::Continue);
  };
  let action =
    Action::from_invocation(&inv)?;
  dispatch(controller, action, out)
}

/// Reads commands until `quit`,
/// `exit` or end of input. A failed
/// command is reported on `out` and
/// the loop carries on.
#[instrument(skip_all)]
pub fn run_shell<S, R, C, I, W>(
  controller: &mut TaskListController<
    S,
    R,
    C
  >,
  input: I,
  out: &mut W,
  prompt: bool
) -> anyhow::Result<()>
where
  S: KeyValueStore,
  R: Renderer,
  C: Clock,
  I: BufRead,
  W: Write
{
  info!("starting shell");
  controller.refresh();

  let mut lines = input.lines();
  loop {
    if prompt {
      write!(out, "tasklist> ")?;
      out.flush()?;
    }

    let Some(line) = lines.next() else {
      debug!("end of input");
      break;
    };
    let line = line
      .context("failed reading input")?;

    match execute_line(
      controller, &line, out
    ) {
      | Ok(Flow::Quit) => break,
      | Ok(Flow::Continue) => {}
      | Err(err) => {
        writeln!(out, "error: {err:#}")?;
      }
    }
  }

  info!("shell finished");
  Ok(())
}
