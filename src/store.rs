//! SQLite backed storage for hashed URL rules.

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{params_from_iter, Connection, Result as SqlResult, Row};
use thiserror::Error;

use crate::models::RuleRecord;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Store lock poisoned")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Rows are upserted in batches of this size.
const BLOCK_SIZE: usize = 1000;

/// The rule tables the store keeps, one per rule origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleTable {
    Feed,
    Block,
    Allow,
}

impl RuleTable {
    fn name(&self) -> &'static str {
        match self {
            RuleTable::Feed => "feed_rule",
            RuleTable::Block => "block_rule",
            RuleTable::Allow => "allow_rule",
        }
    }
}

/// Anything rule hashes can be matched against.
///
/// Kept as a trait so checkers can be tested against in-memory fakes.
pub trait RuleSource: Send + Sync {
    /// Find rules whose hash is in the given set.
    ///
    /// A `limit` of None returns every match.
    fn find_matches(&self, hashes: &[String], limit: Option<usize>) -> Result<Vec<RuleRecord>>;
}

/// Database connection wrapper holding all three rule tables.
pub struct SqliteRuleStore {
    conn: Mutex<Connection>,
}

impl SqliteRuleStore {
    /// Open or create a database at the specified path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = SqliteRuleStore {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let store = SqliteRuleStore {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.lock()?;
        for table in ["feed_rule", "block_rule", "allow_rule"] {
            conn.execute_batch(&format!(
                r#"
CREATE TABLE IF NOT EXISTS {table} (
    id INTEGER PRIMARY KEY,
    hash TEXT NOT NULL,
    rule TEXT NOT NULL UNIQUE,
    tags TEXT NOT NULL DEFAULT '[]'
);

CREATE INDEX IF NOT EXISTS idx_{table}_hash ON {table}(hash);
"#
            ))?;
        }
        Ok(())
    }

    /// Find rules in one table whose hash is in the given set.
    pub fn find_matches(
        &self,
        table: RuleTable,
        hashes: &[String],
        limit: Option<usize>,
    ) -> Result<Vec<RuleRecord>> {
        if hashes.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; hashes.len()].join(", ");
        // SQLite treats LIMIT -1 as no limit
        let limit = limit.map(|limit| limit as i64).unwrap_or(-1);

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT hash, rule, tags FROM {} WHERE hash IN ({placeholders}) LIMIT {limit}",
            table.name(),
        ))?;

        let records = stmt
            .query_map(params_from_iter(hashes.iter()), Self::row_to_record)?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(records)
    }

    /// Insert or update rules in bulk, in batches.
    ///
    /// The rule text is the unique key; re-registering a rule replaces its
    /// hash and tags. Returns the number of rows written.
    pub fn bulk_upsert(&self, table: RuleTable, records: &[RuleRecord]) -> Result<usize> {
        let mut conn = self.lock()?;
        let mut written = 0;

        for block in records.chunks(BLOCK_SIZE) {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(&format!(
                    "INSERT INTO {} (hash, rule, tags) VALUES (?, ?, ?)
                     ON CONFLICT(rule) DO UPDATE SET hash = excluded.hash, tags = excluded.tags",
                    table.name(),
                ))?;

                for record in block {
                    let tags = serde_json::to_string(&record.tags)?;
                    written += stmt.execute((&record.hash, &record.rule, tags))?;
                }
            }
            tx.commit()?;
        }

        Ok(written)
    }

    /// Remove every rule from one table, for a full resync.
    pub fn delete_all(&self, table: RuleTable) -> Result<usize> {
        let conn = self.lock()?;
        let deleted = conn.execute(&format!("DELETE FROM {}", table.name()), [])?;
        Ok(deleted)
    }

    /// Get the number of rules in one table.
    pub fn count(&self, table: RuleTable) -> Result<i64> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!("SELECT COUNT(*) FROM {}", table.name()))?;
        let count = stmt.query_row([], |row| row.get(0))?;
        Ok(count)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn row_to_record(row: &Row) -> rusqlite::Result<RuleRecord> {
        let tags_json: String = row.get(2)?;
        let tags = serde_json::from_str(&tags_json).unwrap_or_default();

        Ok(RuleRecord {
            hash: row.get(0)?,
            rule: row.get(1)?,
            tags,
        })
    }
}

/// One table of a shared store, viewed as a [`RuleSource`].
pub struct TableSource {
    store: Arc<SqliteRuleStore>,
    table: RuleTable,
}

impl TableSource {
    pub fn new(store: Arc<SqliteRuleStore>, table: RuleTable) -> Self {
        TableSource { store, table }
    }
}

impl RuleSource for TableSource {
    fn find_matches(&self, hashes: &[String], limit: Option<usize>) -> Result<Vec<RuleRecord>> {
        self.store.find_matches(self.table, hashes, limit)
    }
}
