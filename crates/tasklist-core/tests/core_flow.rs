use std::cell::Cell;

use anyhow::anyhow;
use chrono::{DateTime, TimeZone, Utc};
use tasklist_core::controller::{Clock, Renderer, TaskListController, View};
use tasklist_core::datastore::{
    DEFAULT_TASKS_KEY, FileStore, KeyValueStore, MemoryStore, decode_tasks, encode_tasks,
    load_tasks,
};
use tasklist_core::filter::FilterMode;
use tasklist_core::stats::Stats;
use tasklist_core::task::{Priority, TaskId};
use tempfile::tempdir;

/// Advances one millisecond per reading, starting at a fixed instant.
struct StepClock {
    next: Cell<i64>,
}

impl StepClock {
    fn new() -> Self {
        let start = Utc
            .with_ymd_and_hms(2026, 2, 16, 5, 0, 0)
            .single()
            .expect("valid start");
        Self {
            next: Cell::new(start.timestamp_millis()),
        }
    }
}

impl Clock for StepClock {
    fn now(&self) -> DateTime<Utc> {
        let millis = self.next.get();
        self.next.set(millis + 1);
        DateTime::from_timestamp_millis(millis).expect("valid millis")
    }
}

/// Always reports the same instant.
struct FrozenClock(DateTime<Utc>);

impl Clock for FrozenClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[derive(Default)]
struct RecordingRenderer {
    frames: Vec<Vec<String>>,
    last_stats: Option<Stats>,
    last_filter: Option<FilterMode>,
}

impl Renderer for RecordingRenderer {
    fn render(&mut self, view: &View<'_>) -> anyhow::Result<()> {
        self.frames
            .push(view.visible.iter().map(|t| t.text.clone()).collect());
        self.last_stats = Some(view.stats);
        self.last_filter = Some(view.filter);
        Ok(())
    }
}

struct FailingStore;

impl KeyValueStore for FailingStore {
    fn load(&self, _key: &str) -> anyhow::Result<Option<String>> {
        Err(anyhow!("storage unavailable"))
    }

    fn save(&mut self, _key: &str, _value: &str) -> anyhow::Result<()> {
        Err(anyhow!("disk full"))
    }
}

/// Counts writes so tests can tell a no-op from a rewrite.
#[derive(Default)]
struct CountingStore {
    inner: MemoryStore,
    saves: usize,
}

impl KeyValueStore for CountingStore {
    fn load(&self, key: &str) -> anyhow::Result<Option<String>> {
        self.inner.load(key)
    }

    fn save(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        self.saves += 1;
        self.inner.save(key, value)
    }
}

type MemController = TaskListController<MemoryStore, RecordingRenderer, StepClock>;

fn controller() -> MemController {
    TaskListController::new(
        MemoryStore::new(),
        DEFAULT_TASKS_KEY,
        RecordingRenderer::default(),
        StepClock::new(),
    )
}

fn texts(c: &MemController) -> Vec<&str> {
    c.tasks().iter().map(|t| t.text.as_str()).collect()
}

fn visible_texts(c: &MemController) -> Vec<&str> {
    c.visible_tasks().iter().map(|t| t.text.as_str()).collect()
}

fn stored_texts(c: &MemController) -> Vec<String> {
    let raw = c.store().get(DEFAULT_TASKS_KEY).expect("tasks persisted");
    decode_tasks(raw)
        .expect("decode stored tasks")
        .into_iter()
        .map(|t| t.text)
        .collect()
}

#[test]
fn end_to_end_scenario() {
    let mut c = controller();

    let milk = c.create("Buy milk").expect("created");
    c.create("Call mom").expect("created");
    assert_eq!(texts(&c), vec!["Call mom", "Buy milk"]);

    c.toggle_completed(milk);
    let stats = c.stats();
    assert_eq!((stats.total, stats.completed, stats.pending), (2, 1, 1));

    c.set_filter(FilterMode::Completed);
    assert_eq!(visible_texts(&c), vec!["Buy milk"]);

    c.clear_completed();
    assert_eq!(texts(&c), vec!["Call mom"]);
    assert_eq!(stored_texts(&c), vec!["Call mom".to_string()]);
}

#[test]
fn create_prepends_trimmed_text_with_defaults() {
    let mut c = controller();
    for (n, text) in ["one", "  two  ", "three"].iter().enumerate() {
        c.create(text).expect("created");
        assert_eq!(c.tasks().len(), n + 1);
        assert_eq!(c.tasks()[0].text, text.trim());
    }

    let newest = &c.tasks()[0];
    assert!(!newest.completed);
    assert_eq!(newest.priority, Priority::Medium);

    let ids: Vec<i64> = c.tasks().iter().map(|t| t.id.0).collect();
    assert!(ids.windows(2).all(|w| w[0] > w[1]), "ids {ids:?}");
}

#[test]
fn blank_create_is_ignored_and_not_persisted() {
    let mut c = controller();
    assert!(c.create("").is_none());
    assert!(c.create("   ").is_none());
    assert!(c.tasks().is_empty());
    assert!(c.store().get(DEFAULT_TASKS_KEY).is_none());
    assert_eq!(c.renderer().frames.len(), 2);
}

#[test]
fn same_millisecond_creations_get_distinct_ids() {
    let instant = Utc
        .with_ymd_and_hms(2026, 2, 16, 5, 0, 0)
        .single()
        .expect("valid instant");
    let mut c = TaskListController::new(
        MemoryStore::new(),
        DEFAULT_TASKS_KEY,
        RecordingRenderer::default(),
        FrozenClock(instant),
    );
    let a = c.create("a").expect("created");
    let b = c.create("b").expect("created");
    assert_ne!(a, b);
    assert_eq!(b.0, a.0 + 1);
}

#[test]
fn toggle_twice_restores_and_unknown_id_is_noop() {
    let mut c = controller();
    let id = c.create("task").expect("created");

    c.toggle_completed(id);
    assert!(c.tasks()[0].completed);
    c.toggle_completed(id);
    assert!(!c.tasks()[0].completed);

    c.toggle_completed(TaskId(-1));
    assert_eq!(c.tasks().len(), 1);
    assert!(!c.tasks()[0].completed);
}

#[test]
fn delete_is_idempotent() {
    let mut c = controller();
    let a = c.create("a").expect("created");
    c.create("b").expect("created");

    c.delete(a);
    assert_eq!(texts(&c), vec!["b"]);
    c.delete(a);
    assert_eq!(texts(&c), vec!["b"]);
    assert_eq!(stored_texts(&c), vec!["b".to_string()]);
}

#[test]
fn filter_modes_respect_completion() {
    let mut c = controller();
    let ids: Vec<TaskId> = ["a", "b", "c", "d"]
        .iter()
        .map(|t| c.create(t).expect("created"))
        .collect();
    c.toggle_completed(ids[0]);
    c.toggle_completed(ids[2]);

    c.set_filter(FilterMode::Active);
    assert!(c.visible_tasks().iter().all(|t| !t.completed));
    assert_eq!(visible_texts(&c), vec!["d", "b"]);

    c.set_filter(FilterMode::Completed);
    assert!(c.visible_tasks().iter().all(|t| t.completed));
    assert_eq!(visible_texts(&c), vec!["c", "a"]);

    c.set_filter(FilterMode::All);
    assert_eq!(visible_texts(&c), vec!["d", "c", "b", "a"]);
    assert_eq!(c.renderer().last_filter, Some(FilterMode::All));
}

#[test]
fn search_is_case_insensitive_and_stats_ignore_it() {
    let mut c = controller();
    c.create("buy milk").expect("created");
    c.create("walk dog").expect("created");

    c.set_search_term("BUY");
    assert_eq!(visible_texts(&c), vec!["buy milk"]);
    assert_eq!(c.state().search, "BUY");

    let stats = c.renderer().last_stats.expect("rendered");
    assert_eq!(stats.total, 2);
    assert_eq!(stats.pending + stats.completed, stats.total);
    assert_eq!(
        c.renderer().frames.last().expect("frame"),
        &vec!["buy milk".to_string()]
    );
}

#[test]
fn priority_counts_follow_updates() {
    let mut c = controller();
    let a = c.create("a").expect("created");
    let b = c.create("b").expect("created");

    c.set_priority(a, Priority::High);
    c.set_priority(b, Priority::Low);
    c.set_priority(TaskId(42), Priority::High);

    let stats = c.stats();
    assert_eq!(stats.by_priority.high, 1);
    assert_eq!(stats.by_priority.medium, 0);
    assert_eq!(stats.by_priority.low, 1);
}

#[test]
fn clear_completed_is_idempotent() {
    let mut c = controller();
    let a = c.create("a").expect("created");
    c.create("b").expect("created");
    c.toggle_completed(a);

    c.clear_completed();
    assert!(c.tasks().iter().all(|t| !t.completed));
    assert_eq!(texts(&c), vec!["b"]);
    c.clear_completed();
    assert_eq!(texts(&c), vec!["b"]);
}

#[test]
fn edit_lifecycle() {
    let mut c = controller();
    let a = c.create("first").expect("created");
    let b = c.create("second").expect("created");

    c.begin_edit(a);
    c.set_edit_text("unsaved");
    c.begin_edit(b);
    let edit = c.state().editing.clone().expect("editing");
    assert_eq!(edit.task_id, b);
    assert_eq!(edit.text, "second");

    c.set_edit_text("  second, revised ");
    c.commit_edit(b);
    assert!(c.state().editing.is_none());
    assert_eq!(texts(&c), vec!["second, revised", "first"]);
    assert_eq!(stored_texts(&c)[0], "second, revised");

    c.begin_edit(a);
    c.set_edit_text("   ");
    c.commit_edit(a);
    assert!(c.state().editing.is_none());
    assert_eq!(c.tasks()[1].text, "first");

    c.begin_edit(a);
    c.set_edit_text("discard me");
    c.cancel_edit();
    assert!(c.state().editing.is_none());
    assert_eq!(c.tasks()[1].text, "first");
}

#[test]
fn commit_edit_without_a_matching_edit_changes_nothing() {
    let mut c = TaskListController::new(
        CountingStore::default(),
        DEFAULT_TASKS_KEY,
        RecordingRenderer::default(),
        StepClock::new(),
    );
    let a = c.create("first").expect("created");
    let before = c.tasks().to_vec();
    let saves = c.store().saves;

    c.begin_edit(a);
    c.set_edit_text("renamed");
    c.commit_edit(TaskId(999));
    assert!(c.state().editing.is_none());
    assert_eq!(c.tasks(), before.as_slice());
    assert_eq!(c.store().saves, saves);

    c.commit_edit(a);
    assert!(c.state().editing.is_none());
    assert_eq!(c.tasks(), before.as_slice());
    assert_eq!(c.store().saves, saves);
}

#[test]
fn create_after_largest_possible_id_still_gets_a_fresh_id() {
    let raw = r#"[{"id":9223372036854775807,"text":"top","completed":false,"createdAt":"2024-02-16T05:00:00.000Z","priority":"medium"}]"#;
    let mut c = TaskListController::new(
        MemoryStore::with_entry(DEFAULT_TASKS_KEY, raw),
        DEFAULT_TASKS_KEY,
        RecordingRenderer::default(),
        StepClock::new(),
    );
    assert_eq!(c.tasks()[0].id, TaskId(i64::MAX));

    let first = c.create("new").expect("created");
    let second = c.create("newer").expect("created");
    assert_ne!(first, TaskId(i64::MAX));
    assert_ne!(first, second);
    assert_eq!(texts(&c), vec!["newer", "new", "top"]);
    assert_eq!(stored_texts(&c), vec!["newer", "new", "top"]);
}

#[test]
fn begin_edit_on_missing_task_does_nothing() {
    let mut c = controller();
    c.begin_edit(TaskId(7));
    assert!(c.state().editing.is_none());
}

#[test]
fn removing_edit_target_leaves_edit_mode() {
    let mut c = controller();
    let a = c.create("a").expect("created");
    c.begin_edit(a);
    c.delete(a);
    assert!(c.state().editing.is_none());

    let b = c.create("b").expect("created");
    c.toggle_completed(b);
    c.begin_edit(b);
    c.clear_completed();
    assert!(c.state().editing.is_none());
}

#[test]
fn draft_is_consumed_by_submit() {
    let mut c = controller();
    c.set_draft("  from the box ");
    assert_eq!(c.state().draft, "  from the box ");

    c.submit_draft().expect("created");
    assert_eq!(texts(&c), vec!["from the box"]);
    assert!(c.state().draft.is_empty());

    c.set_draft("   ");
    assert!(c.submit_draft().is_none());
    assert!(c.state().draft.is_empty());
    assert_eq!(c.tasks().len(), 1);
}

#[test]
fn session_state_is_not_persisted() {
    let mut c = controller();
    c.create("a").expect("created");
    let before = c.store().get(DEFAULT_TASKS_KEY).map(str::to_string);

    c.set_filter(FilterMode::Completed);
    c.set_search_term("zzz");
    let raw = c.store().get(DEFAULT_TASKS_KEY).expect("persisted");
    assert_eq!(Some(raw.to_string()), before);
    assert!(!raw.contains("zzz"));
}

#[test]
fn store_failures_do_not_roll_back_state() {
    let mut c = TaskListController::new(
        FailingStore,
        DEFAULT_TASKS_KEY,
        RecordingRenderer::default(),
        StepClock::new(),
    );
    assert!(c.tasks().is_empty());

    let id = c.create("kept in memory").expect("created");
    c.toggle_completed(id);
    assert_eq!(c.tasks().len(), 1);
    assert!(c.tasks()[0].completed);
}

#[test]
fn file_store_round_trip_preserves_collection() {
    let temp = tempdir().expect("tempdir");
    let store = FileStore::open(temp.path()).expect("open store");

    let mut c = TaskListController::new(
        store,
        DEFAULT_TASKS_KEY,
        RecordingRenderer::default(),
        StepClock::new(),
    );
    let a = c.create("Buy milk").expect("created");
    let b = c.create("Call mom").expect("created");
    c.toggle_completed(a);
    c.set_priority(b, Priority::High);
    let expected = c.tasks().to_vec();

    let reopened = FileStore::open(temp.path()).expect("reopen store");
    assert!(temp.path().join("tasks.json").is_file());
    let loaded = load_tasks(&reopened, DEFAULT_TASKS_KEY);
    assert_eq!(loaded, expected);

    let c2 = TaskListController::new(
        reopened,
        DEFAULT_TASKS_KEY,
        RecordingRenderer::default(),
        StepClock::new(),
    );
    assert_eq!(c2.tasks(), expected.as_slice());
    assert!(c2.renderer().frames.is_empty());
}

#[test]
fn codec_round_trip_is_exact() {
    let mut c = controller();
    c.create("x").expect("created");
    c.create("y").expect("created");
    let raw = encode_tasks(c.tasks()).expect("encode");
    assert_eq!(decode_tasks(&raw).expect("decode"), c.tasks());
}

#[test]
fn corrupt_or_missing_data_loads_empty() {
    let temp = tempdir().expect("tempdir");
    let mut store = FileStore::open(temp.path()).expect("open store");
    assert!(load_tasks(&store, DEFAULT_TASKS_KEY).is_empty());

    store
        .save(DEFAULT_TASKS_KEY, "{not json")
        .expect("write garbage");
    assert!(load_tasks(&store, DEFAULT_TASKS_KEY).is_empty());

    let c = TaskListController::new(
        MemoryStore::with_entry(DEFAULT_TASKS_KEY, "[{\"id\":1}]"),
        DEFAULT_TASKS_KEY,
        RecordingRenderer::default(),
        StepClock::new(),
    );
    assert!(c.tasks().is_empty());
}

#[test]
fn loads_data_written_by_a_browser_session() {
    let raw = r#"[
        {"id":1708059600123,"text":"Call mom","completed":false,"createdAt":"2024-02-16T05:00:00.123Z","priority":"high"},
        {"id":1708059600000,"text":"Buy milk","completed":true,"createdAt":"2024-02-16T05:00:00.000Z","priority":"low"},
        {"id":1708059600000,"text":"duplicate","completed":false,"createdAt":"2024-02-16T05:00:00.000Z","priority":"low"}
    ]"#;
    let c = TaskListController::new(
        MemoryStore::with_entry(DEFAULT_TASKS_KEY, raw),
        DEFAULT_TASKS_KEY,
        RecordingRenderer::default(),
        StepClock::new(),
    );
    assert_eq!(texts(&c), vec!["Call mom", "Buy milk"]);
    assert_eq!(c.tasks()[0].priority, Priority::High);
    assert_eq!(
        c.tasks()[0].created_at.timestamp_millis(),
        1708059600123
    );
}

#[test]
fn file_store_rejects_path_like_keys() {
    let temp = tempdir().expect("tempdir");
    let store = FileStore::open(temp.path()).expect("open store");
    assert!(store.path_for("../escape").is_err());
    assert!(store.path_for("").is_err());
    assert!(store.path_for("tasks").is_ok());
}
