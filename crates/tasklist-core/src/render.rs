use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::controller::{Renderer, View};
use crate::datetime::{DEFAULT_DISPLAY_FORMAT, format_local, validate_display_format};
use crate::task::{Priority, Task};

pub const EMPTY_MESSAGE: &str = "No tasks found. Add a new task to get started!";

/// Draws the task list as an aligned table followed by the footer and the
/// summary panels.
#[derive(Debug)]
pub struct TerminalRenderer<W = io::Stdout> {
    out: W,
    color: bool,
    date_format: String,
}

impl TerminalRenderer<io::Stdout> {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color = color_enabled(cfg)? && io::stdout().is_terminal();
        Self::with_writer(cfg, io::stdout(), color)
    }
}

impl<W: Write> TerminalRenderer<W> {
    pub fn with_writer(cfg: &Config, out: W, color: bool) -> anyhow::Result<Self> {
        let date_format = cfg
            .get("date.format")
            .unwrap_or_else(|| DEFAULT_DISPLAY_FORMAT.to_string());
        validate_display_format(&date_format)?;

        Ok(Self {
            out,
            color,
            date_format,
        })
    }

    pub fn writer(&self) -> &W {
        &self.out
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }

    fn task_row(&self, position: usize, task: &Task, view: &View<'_>) -> Vec<String> {
        let dim = |cell: String| {
            if task.completed {
                self.paint(&cell, "2")
            } else {
                cell
            }
        };

        let done = if task.completed { "[x]" } else { "[ ]" }.to_string();
        let priority = self.paint(task.priority.as_str(), priority_color(task.priority));

        let text = match view.editing {
            Some(edit) if edit.task_id == task.id => {
                self.paint(&format!("> {}", escape_control(&edit.text)), "4")
            }
            _ => dim(escape_control(&task.text)),
        };

        let created = format_local(task.created_at, &self.date_format);

        vec![dim(position.to_string()), dim(done), priority, text, dim(created)]
    }
}

impl<W: Write> Renderer for TerminalRenderer<W> {
    #[tracing::instrument(skip(self, view), fields(visible = view.visible.len()))]
    fn render(&mut self, view: &View<'_>) -> anyhow::Result<()> {
        let mut header = format!("Filter: {}", view.filter);
        if !view.search.is_empty() {
            header.push_str(&format!("   Search: {:?}", view.search));
        }
        if !view.draft.is_empty() {
            header.push_str(&format!("   Draft: {:?}", view.draft));
        }

        let rows: Vec<Vec<String>> = view
            .visible
            .iter()
            .enumerate()
            .map(|(idx, task)| self.task_row(idx + 1, task, view))
            .collect();

        let stats = view.stats;
        let out = &mut self.out;

        writeln!(out, "{header}")?;
        writeln!(out)?;

        if rows.is_empty() {
            writeln!(out, "{EMPTY_MESSAGE}")?;
        } else {
            let headers = ["#", "Done", "Priority", "Task", "Created"];
            write_table(&mut *out, &headers, &rows)?;
        }

        writeln!(out)?;
        writeln!(out, "{} items left", stats.pending)?;
        writeln!(out)?;
        writeln!(out, "Quick Stats")?;
        writeln!(out, "  Total tasks: {}", stats.total)?;
        writeln!(out, "  Completed: {}", stats.completed)?;
        writeln!(out, "  Pending: {}", stats.pending)?;
        writeln!(out, "Priority Distribution")?;
        for priority in Priority::ALL {
            writeln!(
                out,
                "  {}: {}",
                capitalize(priority.as_str()),
                stats.by_priority.get(priority)
            )?;
        }
        out.flush()?;

        Ok(())
    }
}

fn color_enabled(cfg: &Config) -> anyhow::Result<bool> {
    let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
    match color_cfg.to_ascii_lowercase().as_str() {
        "on" | "yes" | "true" | "1" => Ok(true),
        "off" | "no" | "false" | "0" => Ok(false),
        other => Err(anyhow!("invalid color setting: {other}")),
    }
}

fn priority_color(priority: Priority) -> &'static str {
    match priority {
        Priority::High => "31",
        Priority::Medium => "33",
        Priority::Low => "32",
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn display_width(cell: &str) -> usize {
    UnicodeWidthStr::width(strip_ansi(cell).as_str())
}

/// Left-aligned columns sized to their widest cell, with a dashed rule
/// under the header. Colour codes do not count toward the width.
fn write_table<W: Write>(mut out: W, headers: &[&str], rows: &[Vec<String>]) -> anyhow::Result<()> {
    let mut widths: Vec<usize> = headers.iter().map(|h| display_width(h)).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(display_width(cell));
        }
    }

    let header: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();

    for line in [&header, &rule].into_iter().chain(rows) {
        for (cell, width) in line.iter().zip(&widths) {
            let pad = width.saturating_sub(display_width(cell));
            write!(out, "{cell}{:pad$} ", "")?;
        }
        writeln!(out)?;
    }

    Ok(())
}

/// Stored text may hold newlines or escape sequences; show them escaped so
/// they cannot break the table or inject terminal codes.
fn escape_control(text: &str) -> String {
    text.chars()
        .flat_map(|ch| {
            let escaped: Vec<char> = if ch.is_control() {
                ch.escape_debug().collect()
            } else {
                vec![ch]
            };
            escaped
        })
        .collect()
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find('\x1b') {
        out.push_str(&rest[..start]);
        rest = match rest[start..].find('m') {
            Some(end) => &rest[start + end + 1..],
            None => "",
        };
    }
    out.push_str(rest);
    out
}
