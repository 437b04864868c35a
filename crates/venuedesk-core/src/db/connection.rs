//! Database connection management

use crate::error::Result;
use libsql::{Builder, Connection, Database as LibSqlDatabase};
use std::path::Path;

use super::migrations;

const BEST_EFFORT_PRAGMAS: [&str; 2] = [
    "PRAGMA synchronous = NORMAL",
    "PRAGMA busy_timeout = 5000",
];

/// Local libSQL database holding the mirrored CRM records
pub struct Database {
    _db: LibSqlDatabase,
    conn: Connection,
}

impl Database {
    /// Open a local database at the given path, creating it if it doesn't exist
    ///
    /// Runs migrations automatically.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let db = Builder::new_local(&path_str).build().await?;
        Self::init(db).await
    }

    /// Open a throwaway in-memory database
    pub async fn open_in_memory() -> Result<Self> {
        let db = Builder::new_local(":memory:").build().await?;
        Self::init(db).await
    }

    async fn init(db: LibSqlDatabase) -> Result<Self> {
        let conn = db.connect()?;
        let database = Self { _db: db, conn };
        database.configure().await?;
        database.migrate().await?;
        Ok(database)
    }

    /// Apply connection pragmas. Only `foreign_keys` is mandatory; the rest
    /// are tuning that in-memory databases may reject.
    async fn configure(&self) -> Result<()> {
        // journal_mode answers with a row, so it goes through `query`
        self.conn.query("PRAGMA journal_mode = WAL", ()).await.ok();
        for pragma in BEST_EFFORT_PRAGMAS {
            if let Err(error) = self.conn.execute(pragma, ()).await {
                tracing::debug!(pragma, "Pragma not applied: {error}");
            }
        }
        self.conn.execute("PRAGMA foreign_keys = ON", ()).await?;
        Ok(())
    }

    async fn migrate(&self) -> Result<()> {
        migrations::run(&self.conn).await
    }

    /// Get a reference to the underlying connection
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }
}
