//! Table definitions, created on first use.
//!
//! - `transactions` - append-only log of coerced rows
//! - `agg_stats` - one cumulative snapshot per batch label (UPSERT on `load_batch`)
//! - `ingested_files` - ledger of completed batches (INSERT ... DO NOTHING)

use rusqlite::Connection;

const CREATE_TRANSACTIONS: &str = r#"
CREATE TABLE IF NOT EXISTS transactions (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    batch_label TEXT NOT NULL,
    row_index   INTEGER NOT NULL,
    measure     REAL,
    observed_at TEXT,
    payload     TEXT NOT NULL,
    ingested_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_transactions_batch ON transactions(batch_label, row_index);
"#;

const CREATE_AGG_STATS: &str = r#"
CREATE TABLE IF NOT EXISTS agg_stats (
    load_batch   TEXT PRIMARY KEY,
    cum_count    INTEGER NOT NULL,
    cum_avg      REAL NOT NULL,
    cum_min      REAL,
    cum_max      REAL,
    version      INTEGER NOT NULL,
    last_updated TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_agg_stats_version ON agg_stats(version);
"#;

const CREATE_INGESTED_FILES: &str = r#"
CREATE TABLE IF NOT EXISTS ingested_files (
    batch_name TEXT PRIMARY KEY,
    loaded_at  TEXT NOT NULL
);
"#;

pub fn create_tables(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(CREATE_TRANSACTIONS)?;
    conn.execute_batch(CREATE_AGG_STATS)?;
    conn.execute_batch(CREATE_INGESTED_FILES)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_tables_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        create_tables(&conn).unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
                 AND name IN ('transactions', 'agg_stats', 'ingested_files')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 3);
    }
}
