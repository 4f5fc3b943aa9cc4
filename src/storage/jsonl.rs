//! JSONL storage
//!
//! Tasks live in `.taskdeps/tasks.jsonl` and dependency edges in
//! `.taskdeps/dependencies.jsonl`, one JSON object per line, sorted by ID
//! so diffs stay small.
//!
//! Writes go to a temp file that is renamed over the original. Because the
//! rename swaps the inode, locks are taken on a sibling `.lock` file rather
//! than the data file: an exclusive lock spans the whole
//! read-modify-write, readers take a shared lock.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::domain::{Task, TaskId};

/// A lock-protected JSONL file of `T` records
#[derive(Debug, Clone)]
pub(crate) struct JsonlFile {
    path: PathBuf,
}

impl JsonlFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("lock")
    }

    fn temp_path(&self) -> PathBuf {
        self.path.with_extension("jsonl.tmp")
    }

    /// Opens (creating if needed) the lock file
    fn open_lock(&self) -> Result<File> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let lock_path = self.lock_path();
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .with_context(|| format!("Failed to open lock file: {}", lock_path.display()))
    }

    /// Reads all records under a shared lock
    pub fn read_all<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let lock = self.open_lock()?;
        lock.lock_shared()
            .with_context(|| format!("Failed to acquire read lock on {}", self.path.display()))?;

        // Lock is released when `lock` is dropped
        self.read_unlocked()
    }

    fn read_unlocked<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;
        let reader = BufReader::new(file);
        let mut records = Vec::new();

        for (line_num, line) in reader.lines().enumerate() {
            let line = line.with_context(|| {
                format!("Failed to read line {} of {}", line_num + 1, self.path.display())
            })?;

            if line.trim().is_empty() {
                continue;
            }

            let record: T = serde_json::from_str(&line).with_context(|| {
                format!(
                    "Failed to parse record at line {} of {}",
                    line_num + 1,
                    self.path.display()
                )
            })?;
            records.push(record);
        }

        Ok(records)
    }

    fn write_unlocked<T: Serialize>(&self, records: &[T]) -> Result<()> {
        let temp_path = self.temp_path();

        {
            let file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp_path)
                .with_context(|| format!("Failed to create temp file: {}", temp_path.display()))?;

            let mut writer = BufWriter::new(&file);
            for record in records {
                let line = serde_json::to_string(record).context("Failed to serialize record")?;
                writeln!(writer, "{}", line).context("Failed to write record")?;
            }
            writer.flush().context("Failed to flush records")?;
            file.sync_all().context("Failed to sync records")?;
        }

        // Atomic rename
        fs::rename(&temp_path, &self.path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                temp_path.display(),
                self.path.display()
            )
        })
    }

    /// Runs `f` over the current records under an exclusive lock
    ///
    /// The records are written back only if `f` succeeds.
    pub fn modify<T, R, E>(&self, f: impl FnOnce(&mut Vec<T>) -> Result<R, E>) -> Result<R, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<anyhow::Error>,
    {
        let lock = self.open_lock()?;
        lock.lock_exclusive()
            .with_context(|| format!("Failed to acquire write lock on {}", self.path.display()))?;

        let mut records = self.read_unlocked()?;
        let result = f(&mut records)?;
        self.write_unlocked(&records)?;

        drop(lock);
        Ok(result)
    }
}

/// Store for task records
pub struct TaskStore {
    file: JsonlFile,
}

impl TaskStore {
    /// Creates a new task store at the given path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: JsonlFile::new(path),
        }
    }

    /// Creates the default store for a project
    pub fn for_project(project_root: &Path) -> Self {
        Self::new(project_root.join(".taskdeps").join("tasks.jsonl"))
    }

    /// Returns the path to the store file
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Reads all tasks from the store
    pub fn read_all(&self) -> Result<HashMap<TaskId, Task>> {
        let tasks: Vec<Task> = self.file.read_all()?;
        Ok(tasks.into_iter().map(|t| (t.id.clone(), t)).collect())
    }

    /// Reads tasks for a specific project
    pub fn read_for_project(&self, project: &str) -> Result<HashMap<TaskId, Task>> {
        let all = self.read_all()?;
        Ok(all
            .into_iter()
            .filter(|(_, task)| task.in_project(project))
            .collect())
    }

    /// Adds a new task, failing if the ID is already taken
    pub fn insert(&self, task: &Task) -> Result<()> {
        self.file.modify(|tasks: &mut Vec<Task>| {
            if tasks.iter().any(|t| t.id == task.id) {
                anyhow::bail!("Task already exists: {}", task.id);
            }
            tasks.push(task.clone());
            tasks.sort_by(|a, b| a.id.cmp(&b.id));
            Ok(())
        })
    }

    /// Replaces an existing task
    pub fn update(&self, task: &Task) -> Result<()> {
        self.file.modify(|tasks: &mut Vec<Task>| {
            let slot = tasks
                .iter_mut()
                .find(|t| t.id == task.id)
                .ok_or_else(|| anyhow::anyhow!("Task not found: {}", task.id))?;
            *slot = task.clone();
            Ok(())
        })
    }

    /// Removes a task by ID
    pub fn remove(&self, task_id: &TaskId) -> Result<bool> {
        self.file.modify(|tasks: &mut Vec<Task>| {
            let before = tasks.len();
            tasks.retain(|t| &t.id != task_id);
            Ok(tasks.len() != before)
        })
    }
}
