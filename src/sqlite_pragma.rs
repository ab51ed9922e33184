//! Connection tuning shared by every SQLite handle the crate opens.

use rusqlite::Connection;
use std::time::Duration;

/// Apply WAL journaling, NORMAL sync and a busy timeout.
///
/// The busy timeout bounds how long a fold waits for another writer's
/// lock before failing with `SQLITE_BUSY`.
pub fn apply_optimized_pragmas(conn: &Connection, busy_timeout: Duration) -> rusqlite::Result<()> {
    conn.busy_timeout(busy_timeout)?;
    // journal_mode reports the resulting mode as a row
    let mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    log::debug!("SQLite journal_mode={}", mode);
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wal_enabled_on_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let conn = Connection::open(dir.path().join("p.db")).unwrap();
        apply_optimized_pragmas(&conn, Duration::from_millis(100)).unwrap();

        let mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0)).unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }
}
