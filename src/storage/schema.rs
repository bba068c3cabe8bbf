//! SQL for the record table.

/// SQLite schema: a single `records` table mapping an integer key to a text value.
pub(crate) const SQLITE_INIT: &str = r"
CREATE TABLE IF NOT EXISTS records (
    key INTEGER PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
);
";

/// Key of the row every freshly created file is seeded with.
pub(crate) const BOOTSTRAP_KEY: i64 = 1;

/// Seeds the bootstrap row; a no-op when the key already exists.
pub(crate) const SEED_RECORD: &str = "INSERT OR IGNORE INTO records (key, value) VALUES (?, ?)";

pub(crate) const SELECT_RECORD: &str = "SELECT value FROM records WHERE key = ?";
