//! Schema creation. Idempotent; runs on every open.

use rusqlite::Connection;

pub fn init(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS identities (
             id          INTEGER PRIMARY KEY AUTOINCREMENT,
             name        TEXT NOT NULL,
             roll_number TEXT NOT NULL UNIQUE,
             encoding    BLOB NOT NULL,
             created_at  TEXT NOT NULL
         );

         CREATE TABLE IF NOT EXISTS attendance (
             id          INTEGER PRIMARY KEY AUTOINCREMENT,
             identity_id INTEGER NOT NULL REFERENCES identities(id),
             timestamp   TEXT NOT NULL
         );

         CREATE INDEX IF NOT EXISTS idx_attendance_identity_timestamp
             ON attendance(identity_id, timestamp);",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init(&conn).unwrap();
        init(&conn).unwrap();

        let indexes: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master
                 WHERE type = 'index' AND name = 'idx_attendance_identity_timestamp'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(indexes, 1);
    }
}
