//! Database schema and migrations.

use anyhow::Result;
use rusqlite::Connection;

/// Run all pending migrations.
pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS schedules (
            id TEXT PRIMARY KEY,
            url TEXT NOT NULL,
            frequency TEXT NOT NULL,
            day_of_week INTEGER NOT NULL,
            time_of_day TEXT NOT NULL,
            timezone TEXT NOT NULL,
            starts_at TEXT,
            ends_at TEXT,
            score_threshold REAL NOT NULL DEFAULT 80,
            recipients_json TEXT NOT NULL DEFAULT '[]',
            enabled INTEGER NOT NULL DEFAULT 1,
            last_run_at TEXT,
            next_run_at TEXT,
            consecutive_failures INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS run_records (
            id TEXT PRIMARY KEY,
            schedule_id TEXT NOT NULL,
            window_key TEXT NOT NULL,
            status TEXT NOT NULL,
            error TEXT,
            score REAL,
            started_at TEXT NOT NULL,
            finished_at TEXT,
            FOREIGN KEY (schedule_id) REFERENCES schedules(id) ON DELETE CASCADE
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_run_records_window
            ON run_records(schedule_id, window_key);

        CREATE TABLE IF NOT EXISTS scan_results (
            id TEXT PRIMARY KEY,
            schedule_id TEXT NOT NULL,
            score REAL NOT NULL,
            issue_count INTEGER NOT NULL,
            critical_count INTEGER NOT NULL DEFAULT 0,
            serious_count INTEGER NOT NULL DEFAULT 0,
            moderate_count INTEGER NOT NULL DEFAULT 0,
            minor_count INTEGER NOT NULL DEFAULT 0,
            aa_compliance REAL NOT NULL,
            aaa_compliance REAL NOT NULL,
            performance_score REAL,
            previous_id TEXT,
            score_delta REAL,
            created_at TEXT NOT NULL,
            FOREIGN KEY (schedule_id) REFERENCES schedules(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_scan_results_schedule
            ON scan_results(schedule_id, created_at);

        CREATE TABLE IF NOT EXISTS alerts (
            id TEXT PRIMARY KEY,
            schedule_id TEXT NOT NULL,
            alert_type TEXT NOT NULL,
            severity TEXT NOT NULL,
            message TEXT NOT NULL,
            current_value REAL,
            previous_value REAL,
            threshold REAL,
            resolved INTEGER NOT NULL DEFAULT 0,
            resolved_at TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY (schedule_id) REFERENCES schedules(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_alerts_schedule
            ON alerts(schedule_id, alert_type, created_at);

        CREATE INDEX IF NOT EXISTS idx_schedules_due
            ON schedules(enabled, next_run_at);",
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrate_creates_tables() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();

        // Verify tables exist by querying them
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM schedules", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM run_records", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM alerts", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap(); // Should not error
    }

    #[test]
    fn test_window_uniqueness_enforced() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();

        conn.execute(
            "INSERT INTO run_records (id, schedule_id, window_key, status, started_at)
             VALUES ('r1', 's1', 'w1', 'running', datetime('now'))",
            [],
        )
        .unwrap();

        let dup = conn.execute(
            "INSERT INTO run_records (id, schedule_id, window_key, status, started_at)
             VALUES ('r2', 's1', 'w1', 'running', datetime('now'))",
            [],
        );
        assert!(dup.is_err());
    }
}
