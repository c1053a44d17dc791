use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::task::Task;

pub const DEFAULT_TASKS_KEY: &str = "tasks";

/// Key-value string storage the task collection is persisted into.
pub trait KeyValueStore {
    fn load(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn save(&mut self, key: &str, value: &str) -> anyhow::Result<()>;
}

/// Stores each key as `<key>.json` inside a data directory.
#[derive(Debug)]
pub struct FileStore {
    pub data_dir: PathBuf,
}

impl FileStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        info!(data_dir = %data_dir.display(), "opened file store");
        Ok(Self { data_dir })
    }

    pub fn path_for(&self, key: &str) -> anyhow::Result<PathBuf> {
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            return Err(anyhow!("invalid storage key: {key:?}"));
        }
        Ok(self.data_dir.join(format!("{key}.json")))
    }
}

impl KeyValueStore for FileStore {
    #[tracing::instrument(skip(self))]
    fn load(&self, key: &str) -> anyhow::Result<Option<String>> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(raw) => {
                debug!(file = %path.display(), bytes = raw.len(), "loaded value");
                Ok(Some(raw))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(file = %path.display(), "no stored value");
                Ok(None)
            }
            Err(err) => Err(err).with_context(|| format!("failed reading {}", path.display())),
        }
    }

    #[tracing::instrument(skip(self, value))]
    fn save(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        let path = self.path_for(key)?;
        debug!(file = %path.display(), bytes = value.len(), "saving value atomically");

        let mut temp = NamedTempFile::new_in(&self.data_dir)?;
        temp.write_all(value.as_bytes())?;
        temp.flush()?;
        temp.persist(&path)
            .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

        Ok(())
    }
}

/// In-process store; contents are lost when it is dropped.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(key: &str, value: &str) -> Self {
        let mut store = Self::new();
        store.entries.insert(key.to_string(), value.to_string());
        store
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }
}

impl KeyValueStore for MemoryStore {
    fn load(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn save(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

pub fn encode_tasks(tasks: &[Task]) -> anyhow::Result<String> {
    serde_json::to_string(tasks).context("failed to serialize tasks")
}

pub fn decode_tasks(raw: &str) -> anyhow::Result<Vec<Task>> {
    let tasks: Vec<Task> = serde_json::from_str(raw).context("failed to parse stored tasks")?;

    let mut seen = HashSet::with_capacity(tasks.len());
    let before = tasks.len();
    let kept: Vec<Task> = tasks.into_iter().filter(|t| seen.insert(t.id)).collect();
    if kept.len() != before {
        warn!(
            before,
            after = kept.len(),
            "dropped tasks with duplicate ids"
        );
    }

    Ok(kept)
}

/// Absent, unreadable or malformed data all load as an empty collection.
#[tracing::instrument(skip(store))]
pub fn load_tasks<S: KeyValueStore + ?Sized>(store: &S, key: &str) -> Vec<Task> {
    let raw = match store.load(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => {
            info!("no saved tasks; starting empty");
            return vec![];
        }
        Err(err) => {
            warn!(error = %format!("{err:#}"), "failed to read saved tasks; starting empty");
            return vec![];
        }
    };

    match decode_tasks(&raw) {
        Ok(tasks) => {
            info!(count = tasks.len(), "loaded saved tasks");
            tasks
        }
        Err(err) => {
            warn!(error = %format!("{err:#}"), "saved tasks are corrupt; starting empty");
            vec![]
        }
    }
}

#[tracing::instrument(skip(store, tasks), fields(count = tasks.len()))]
pub fn save_tasks<S: KeyValueStore + ?Sized>(
    store: &mut S,
    key: &str,
    tasks: &[Task],
) -> anyhow::Result<()> {
    let payload = encode_tasks(tasks)?;
    store
        .save(key, &payload)
        .with_context(|| format!("failed to save tasks under key {key:?}"))
}
