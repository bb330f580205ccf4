use super::*;

/// Ordered schema steps; the position of a step plus one is the
/// `user_version` it leaves the database at.
const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS task_definitions (
        id          TEXT PRIMARY KEY,
        title       TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        active      INTEGER NOT NULL DEFAULT 1,
        deleted     INTEGER NOT NULL DEFAULT 0,
        created_at  INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS task_history (
        id             TEXT PRIMARY KEY,
        task_id        TEXT NOT NULL REFERENCES task_definitions(id),
        completed_date TEXT NOT NULL,
        UNIQUE (task_id, completed_date)
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS journal_entries (
        id         TEXT PRIMARY KEY,
        entry_date TEXT NOT NULL UNIQUE,
        content    TEXT NOT NULL DEFAULT '',
        updated_at INTEGER NOT NULL
    );
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_task_history_date ON task_history (completed_date);
    "#,
];

pub(super) fn schema_version() -> u32 {
    MIGRATIONS.len() as u32
}

pub(super) fn apply(conn: &mut Connection) -> StoreResult<u32> {
    let current: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    let target = schema_version();
    if current >= target {
        return Ok(current);
    }

    let tx = conn.transaction()?;
    for (index, sql) in MIGRATIONS.iter().enumerate().skip(current as usize) {
        debug!(step = index + 1, "Applying store migration");
        tx.execute_batch(sql)?;
    }
    tx.pragma_update(None, "user_version", target)?;
    tx.commit()?;
    info!(from = current, to = target, "Store schema migrated");
    Ok(target)
}
