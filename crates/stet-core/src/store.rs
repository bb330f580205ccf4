use crate::clock::{format_date, parse_date};
use crate::error::{StoreError, StoreResult};
use crate::model::{HistoryTask, JournalEntry, Task, TaskDefinition};
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use time::{Date, OffsetDateTime};
use tracing::{debug, info};

mod migration;

/// Handle to the local SQLite database. Cloning shares the connection.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        info!(path = %path.display(), "Opened store");
        Self::bootstrap(conn)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::bootstrap(Connection::open_in_memory()?)
    }

    fn bootstrap(mut conn: Connection) -> StoreResult<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migration::apply(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> StoreResult<T>) -> StoreResult<T> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        f(&conn)
    }

    /// Active, non-deleted tasks in creation order, flagged completed when a
    /// history row exists for `date`.
    pub fn load_today_tasks(&self, date: Date) -> StoreResult<Vec<Task>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT d.id, d.title, d.description,
                        EXISTS (SELECT 1 FROM task_history h
                                WHERE h.task_id = d.id AND h.completed_date = ?1)
                 FROM task_definitions d
                 WHERE d.active = 1 AND d.deleted = 0
                 ORDER BY d.created_at ASC, d.rowid ASC",
            )?;
            let rows = stmt.query_map(params![format_date(date)], |row| {
                Ok(Task {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    description: row.get(2)?,
                    completed: row.get(3)?,
                })
            })?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }

    pub fn set_completion(&self, task_id: &str, date: Date, completed: bool) -> StoreResult<()> {
        let day = format_date(date);
        self.with_conn(|conn| {
            if completed {
                conn.execute(
                    "INSERT INTO task_history (id, task_id, completed_date)
                     VALUES (?1, ?2, ?3)
                     ON CONFLICT (task_id, completed_date) DO NOTHING",
                    params![new_id(), task_id, day],
                )?;
            } else {
                conn.execute(
                    "DELETE FROM task_history WHERE task_id = ?1 AND completed_date = ?2",
                    params![task_id, day],
                )?;
            }
            debug!(task_id, date = %day, completed, "Completion stored");
            Ok(())
        })
    }

    pub fn list_task_definitions(&self) -> StoreResult<Vec<TaskDefinition>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, title, description, active, created_at
                 FROM task_definitions
                 WHERE deleted = 0
                 ORDER BY created_at ASC, rowid ASC",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(TaskDefinition {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    description: row.get(2)?,
                    active: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }

    pub fn add_task_definition(
        &self,
        title: &str,
        description: &str,
    ) -> StoreResult<TaskDefinition> {
        let definition = TaskDefinition {
            id: new_id(),
            title: title.to_string(),
            description: description.to_string(),
            active: true,
            created_at: now_seconds(),
        };
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO task_definitions (id, title, description, active, deleted, created_at)
                 VALUES (?1, ?2, ?3, 1, 0, ?4)",
                params![
                    definition.id,
                    definition.title,
                    definition.description,
                    definition.created_at
                ],
            )?;
            Ok(())
        })?;
        info!(task_id = %definition.id, "Task definition added");
        Ok(definition)
    }

    pub fn set_task_active(&self, id: &str, active: bool) -> StoreResult<()> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE task_definitions SET active = ?1 WHERE id = ?2 AND deleted = 0",
                params![active, id],
            )?;
            ensure_found(changed, "task", id)
        })
    }

    pub fn soft_delete_task(&self, id: &str) -> StoreResult<()> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE task_definitions SET deleted = 1 WHERE id = ?1 AND deleted = 0",
                params![id],
            )?;
            ensure_found(changed, "task", id)
        })?;
        info!(task_id = id, "Task definition deleted");
        Ok(())
    }

    pub fn load_or_create_journal_entry(&self, date: Date) -> StoreResult<JournalEntry> {
        let day = format_date(date);
        self.with_conn(|conn| {
            let existing = conn
                .query_row(
                    "SELECT id, content, updated_at FROM journal_entries WHERE entry_date = ?1",
                    params![day],
                    |row| {
                        Ok(JournalEntry {
                            id: row.get(0)?,
                            entry_date: date,
                            content: row.get(1)?,
                            updated_at: row.get(2)?,
                        })
                    },
                )
                .optional()?;
            if let Some(entry) = existing {
                return Ok(entry);
            }

            let entry = JournalEntry {
                id: new_id(),
                entry_date: date,
                content: String::new(),
                updated_at: now_seconds(),
            };
            conn.execute(
                "INSERT INTO journal_entries (id, entry_date, content, updated_at)
                 VALUES (?1, ?2, '', ?3)",
                params![entry.id, day, entry.updated_at],
            )?;
            debug!(date = %day, "Journal entry created");
            Ok(entry)
        })
    }

    pub fn update_journal_content(&self, id: &str, content: &str) -> StoreResult<()> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE journal_entries SET content = ?1, updated_at = ?2 WHERE id = ?3",
                params![content, now_seconds(), id],
            )?;
            ensure_found(changed, "journal entry", id)
        })
    }

    /// Every journal entry, newest date first.
    pub fn list_journal_entries(&self) -> StoreResult<Vec<JournalEntry>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, entry_date, content, updated_at
                 FROM journal_entries
                 ORDER BY entry_date DESC",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })?;
            let mut entries = Vec::new();
            for row in rows {
                let (id, day, content, updated_at) = row?;
                let entry_date = parse_date(&day).ok_or(StoreError::InvalidDate(day))?;
                entries.push(JournalEntry {
                    id,
                    entry_date,
                    content,
                    updated_at,
                });
            }
            Ok(entries)
        })
    }

    /// `(task_id, date)` pairs completed within `from..=to`.
    pub fn completions_in_range(&self, from: Date, to: Date) -> StoreResult<Vec<(String, Date)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT task_id, completed_date FROM task_history
                 WHERE completed_date >= ?1 AND completed_date <= ?2
                 ORDER BY completed_date ASC",
            )?;
            let rows = stmt.query_map(params![format_date(from), format_date(to)], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            let mut completions = Vec::new();
            for row in rows {
                let (task_id, day) = row?;
                let date = parse_date(&day).ok_or(StoreError::InvalidDate(day))?;
                completions.push((task_id, date));
            }
            Ok(completions)
        })
    }

    /// Active tasks with their completion dates within `from..=to`.
    pub fn load_history(&self, from: Date, to: Date) -> StoreResult<Vec<HistoryTask>> {
        let mut tasks: Vec<HistoryTask> = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, title FROM task_definitions
                 WHERE active = 1 AND deleted = 0
                 ORDER BY created_at ASC, rowid ASC",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(HistoryTask {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    completions: BTreeSet::new(),
                })
            })?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })?;

        let index: HashMap<String, usize> = tasks
            .iter()
            .enumerate()
            .map(|(position, task)| (task.id.clone(), position))
            .collect();
        for (task_id, date) in self.completions_in_range(from, to)? {
            if let Some(&position) = index.get(&task_id) {
                tasks[position].completions.insert(date);
            }
        }
        Ok(tasks)
    }
}

fn ensure_found(changed: usize, entity: &'static str, id: &str) -> StoreResult<()> {
    if changed == 0 {
        return Err(StoreError::NotFound {
            entity,
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Random 128-bit identifier rendered as lowercase hex.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn now_seconds() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use time::macros::date;

    fn store() -> Store {
        Store::open_in_memory().unwrap()
    }

    #[test]
    fn double_toggle_leaves_no_history_rows() {
        let store = store();
        let task = store.add_task_definition("Stretch", "").unwrap();
        let day = date!(2024 - 05 - 01);

        store.set_completion(&task.id, day, true).unwrap();
        assert!(store.load_today_tasks(day).unwrap()[0].completed);
        store.set_completion(&task.id, day, false).unwrap();

        let tasks = store.load_today_tasks(day).unwrap();
        assert!(!tasks[0].completed);
        assert!(store.completions_in_range(day, day).unwrap().is_empty());
    }

    #[test]
    fn heat_map_toggle_creates_and_removes_one_row() {
        let store = store();
        let task = store.add_task_definition("Read", "").unwrap();
        let day = date!(2024 - 02 - 29);

        store.set_completion(&task.id, day, true).unwrap();
        store.set_completion(&task.id, day, true).unwrap();
        let rows = store.completions_in_range(day, day).unwrap();
        assert_eq!(rows, vec![(task.id.clone(), day)]);

        store.set_completion(&task.id, day, false).unwrap();
        assert!(store.completions_in_range(day, day).unwrap().is_empty());
    }

    #[test]
    fn today_tasks_skip_inactive_and_deleted() {
        let store = store();
        let keep = store.add_task_definition("Keep", "desc").unwrap();
        let paused = store.add_task_definition("Paused", "").unwrap();
        let gone = store.add_task_definition("Gone", "").unwrap();
        store.set_task_active(&paused.id, false).unwrap();
        store.soft_delete_task(&gone.id).unwrap();

        let tasks = store.load_today_tasks(date!(2024 - 01 - 01)).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, keep.id);
        assert_eq!(tasks[0].description, "desc");

        let definitions = store.list_task_definitions().unwrap();
        let ids: Vec<&str> = definitions.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec![keep.id.as_str(), paused.id.as_str()]);
        assert!(!definitions[1].active);
    }

    #[test]
    fn updates_to_unknown_ids_are_not_found() {
        let store = store();
        assert!(matches!(
            store.set_task_active("missing", true),
            Err(StoreError::NotFound { .. })
        ));
        assert!(matches!(
            store.soft_delete_task("missing"),
            Err(StoreError::NotFound { .. })
        ));
        assert!(matches!(
            store.update_journal_content("missing", "x"),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn journal_entry_is_created_once_per_day() {
        let store = store();
        let day = date!(2024 - 07 - 04);
        let first = store.load_or_create_journal_entry(day).unwrap();
        store.update_journal_content(&first.id, "hello").unwrap();
        let second = store.load_or_create_journal_entry(day).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.content, "hello");
    }

    #[test]
    fn journal_entries_list_newest_first() {
        let store = store();
        store.load_or_create_journal_entry(date!(2023 - 07 - 04)).unwrap();
        store.load_or_create_journal_entry(date!(2024 - 07 - 04)).unwrap();
        store.load_or_create_journal_entry(date!(2024 - 01 - 10)).unwrap();

        let dates: Vec<Date> = store
            .list_journal_entries()
            .unwrap()
            .into_iter()
            .map(|entry| entry.entry_date)
            .collect();
        assert_eq!(
            dates,
            vec![
                date!(2024 - 07 - 04),
                date!(2024 - 01 - 10),
                date!(2023 - 07 - 04)
            ]
        );
    }

    #[test]
    fn history_only_includes_dates_in_range() {
        let store = store();
        let task = store.add_task_definition("Walk", "").unwrap();
        store.set_completion(&task.id, date!(2024 - 03 - 01), true).unwrap();
        store.set_completion(&task.id, date!(2024 - 03 - 05), true).unwrap();
        store.set_completion(&task.id, date!(2024 - 03 - 09), true).unwrap();

        let history = store
            .load_history(date!(2024 - 03 - 02), date!(2024 - 03 - 08))
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(
            history[0].completions.iter().copied().collect::<Vec<_>>(),
            vec![date!(2024 - 03 - 05)]
        );
    }

    #[test]
    fn open_creates_parent_directory() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("data.db");
        let store = Store::open(&path).unwrap();
        store.add_task_definition("Persisted", "").unwrap();
        drop(store);

        let reopened = Store::open(&path).unwrap();
        assert_eq!(reopened.list_task_definitions().unwrap().len(), 1);
    }

    #[test]
    fn ids_are_128_bit_hex() {
        let id = new_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|ch| ch.is_ascii_hexdigit()));
    }
}
