//! Entity repository implementation shared by all syncable kinds

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT/OFFSET

use std::marker::PhantomData;

use libsql::{Connection, Row, Rows, Value};
use rust_decimal::Decimal;

use super::entity::{read_text, SyncEntity, FIELD_OFFSET};
use crate::error::{Error, Result};
use crate::models::{
    LocalId, Opportunity, OpportunityFields, OpportunityStatus, Record, RemoteId, Task, TaskFields,
};
use crate::util::unix_millis_now;

/// Result of an upsert keyed on the remote link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted(LocalId),
    Updated(LocalId),
}

impl UpsertOutcome {
    pub const fn local_id(self) -> LocalId {
        match self {
            Self::Inserted(id) | Self::Updated(id) => id,
        }
    }

    pub const fn is_insert(self) -> bool {
        matches!(self, Self::Inserted(_))
    }
}

/// libSQL store for one entity kind
pub struct LibSqlEntityStore<'a, F> {
    conn: &'a Connection,
    _fields: PhantomData<F>,
}

impl<'a, F: SyncEntity> LibSqlEntityStore<'a, F> {
    /// Create a new store with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self {
            conn,
            _fields: PhantomData,
        }
    }

    fn select_sql(tail: &str) -> String {
        format!(
            "SELECT id, remote_id, created_at, updated_at, {} FROM {} {tail}",
            F::COLUMNS.join(", "),
            F::table()
        )
    }

    /// Parse a record from a row produced by [`Self::select_sql`]
    fn parse_record(row: &Row) -> Result<Record<F>> {
        let id: String = row.get(0)?;
        Ok(Record {
            id: id
                .parse()
                .map_err(|_| Error::Database(format!("invalid local id '{id}'")))?,
            remote_id: read_text(row, 1)?.and_then(RemoteId::new),
            created_at: row.get(2)?,
            updated_at: row.get(3)?,
            fields: F::from_row(row, FIELD_OFFSET)?,
        })
    }

    async fn collect(mut rows: Rows) -> Result<Vec<Record<F>>> {
        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(Self::parse_record(&row)?);
        }
        Ok(records)
    }

    /// Insert a locally created, unlinked record
    pub async fn insert_local(&self, fields: F) -> Result<Record<F>> {
        let record = Record::new(fields);
        let placeholders = vec!["?"; 4 + F::COLUMNS.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} (id, remote_id, created_at, updated_at, {}) VALUES ({placeholders})",
            F::table(),
            F::COLUMNS.join(", ")
        );

        let mut values = vec![
            Value::Text(record.id.as_str()),
            Value::Null,
            Value::Integer(record.created_at),
            Value::Integer(record.updated_at),
        ];
        values.extend(record.fields.to_values()?);

        self.conn.execute(&sql, values).await?;
        Ok(record)
    }

    /// Get a record by local id
    pub async fn get(&self, id: &LocalId) -> Result<Option<Record<F>>> {
        let rows = self
            .conn
            .query(&Self::select_sql("WHERE id = ?"), [id.as_str()])
            .await?;
        Ok(Self::collect(rows).await?.into_iter().next())
    }

    /// Get the record linked to a remote id
    pub async fn get_by_remote_id(&self, remote_id: &RemoteId) -> Result<Option<Record<F>>> {
        let rows = self
            .conn
            .query(&Self::select_sql("WHERE remote_id = ?"), [remote_id.as_str()])
            .await?;
        Ok(Self::collect(rows).await?.into_iter().next())
    }

    /// Overwrite the syncable fields of a record
    pub async fn update_fields(&self, id: &LocalId, fields: &F) -> Result<Record<F>> {
        let assignments = F::COLUMNS
            .iter()
            .map(|column| format!("{column} = ?"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE {} SET {assignments}, updated_at = ? WHERE id = ?",
            F::table()
        );

        let mut values = fields.to_values()?;
        values.push(Value::Integer(unix_millis_now()));
        values.push(Value::Text(id.as_str()));

        let rows = self.conn.execute(&sql, values).await?;
        if rows == 0 {
            return Err(Error::not_found(F::KIND, id));
        }

        self.get(id)
            .await?
            .ok_or_else(|| Error::not_found(F::KIND, id))
    }

    /// Hard delete a record, returning what was removed
    pub async fn delete(&self, id: &LocalId) -> Result<Record<F>> {
        let record = self
            .get(id)
            .await?
            .ok_or_else(|| Error::not_found(F::KIND, id))?;

        let sql = format!("DELETE FROM {} WHERE id = ?", F::table());
        let rows = self.conn.execute(&sql, [id.as_str()]).await?;
        if rows == 0 {
            return Err(Error::not_found(F::KIND, id));
        }

        Ok(record)
    }

    /// One page in stable `(created_at, id)` order
    pub async fn list_page(&self, limit: usize, offset: usize) -> Result<Vec<Record<F>>> {
        let rows = self
            .conn
            .query(
                &Self::select_sql("ORDER BY created_at ASC, id ASC LIMIT ? OFFSET ?"),
                libsql::params![limit as i64, offset as i64],
            )
            .await?;
        Self::collect(rows).await
    }

    /// Every record of this kind, fetched page by page
    pub async fn list_all(&self, page_size: usize) -> Result<Vec<Record<F>>> {
        let page_size = page_size.max(1);
        let mut records = Vec::new();
        let mut offset = 0usize;

        loop {
            let batch = self.list_page(page_size, offset).await?;
            let count = batch.len();
            records.extend(batch);

            if count < page_size {
                break;
            }
            offset += count;
        }

        Ok(records)
    }

    /// Records that have never been linked to a remote resource
    pub async fn select_unlinked(&self, page_size: usize) -> Result<Vec<Record<F>>> {
        let page_size = page_size.max(1);
        let sql = Self::select_sql(
            "WHERE remote_id IS NULL ORDER BY created_at ASC, id ASC LIMIT ? OFFSET ?",
        );
        let mut records = Vec::new();
        let mut offset = 0usize;

        loop {
            let rows = self
                .conn
                .query(&sql, libsql::params![page_size as i64, offset as i64])
                .await?;
            let batch = Self::collect(rows).await?;
            let count = batch.len();
            records.extend(batch);

            if count < page_size {
                break;
            }
            offset += count;
        }

        Ok(records)
    }

    /// Insert or update the row owning `remote_id` in a single statement.
    ///
    /// A UNIQUE violation that still surfaces (another writer linked the
    /// same remote id between statements) is turned into an update.
    pub async fn upsert_by_remote_id(
        &self,
        remote_id: &RemoteId,
        fields: &F,
    ) -> Result<UpsertOutcome> {
        let candidate = LocalId::new();
        let now = unix_millis_now();
        let placeholders = vec!["?"; 4 + F::COLUMNS.len()].join(", ");
        let updates = F::COLUMNS
            .iter()
            .map(|column| format!("{column} = excluded.{column}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {table} (id, remote_id, created_at, updated_at, {columns})
             VALUES ({placeholders})
             ON CONFLICT(remote_id) DO UPDATE SET {updates}, updated_at = excluded.updated_at
             RETURNING id",
            table = F::table(),
            columns = F::COLUMNS.join(", "),
        );

        let mut values = vec![
            Value::Text(candidate.as_str()),
            Value::Text(remote_id.as_str().to_string()),
            Value::Integer(now),
            Value::Integer(now),
        ];
        values.extend(fields.to_values()?);

        let returned = match self.conn.query(&sql, values).await {
            Ok(mut rows) => match rows.next().await {
                Ok(Some(row)) => row.get::<String>(0)?,
                Ok(None) => {
                    return Err(Error::Database(format!(
                        "upsert of {} {remote_id} returned no row",
                        F::KIND
                    )))
                }
                Err(error) => return self.recover_upsert(remote_id, fields, error.into()).await,
            },
            Err(error) => return self.recover_upsert(remote_id, fields, error.into()).await,
        };

        let local_id: LocalId = returned
            .parse()
            .map_err(|_| Error::Database(format!("invalid local id '{returned}'")))?;
        if local_id == candidate {
            Ok(UpsertOutcome::Inserted(local_id))
        } else {
            Ok(UpsertOutcome::Updated(local_id))
        }
    }

    async fn recover_upsert(
        &self,
        remote_id: &RemoteId,
        fields: &F,
        error: Error,
    ) -> Result<UpsertOutcome> {
        if !error.is_unique_violation() {
            return Err(error);
        }

        tracing::debug!(
            kind = %F::KIND,
            remote_id = %remote_id,
            "Upsert raced on remote id; updating existing row"
        );
        let existing = self
            .get_by_remote_id(remote_id)
            .await?
            .ok_or(error)?;
        self.update_fields(&existing.id, fields).await?;
        Ok(UpsertOutcome::Updated(existing.id))
    }

    /// Record the remote id returned by an outbound create
    pub async fn mark_linked(&self, id: &LocalId, remote_id: &RemoteId) -> Result<()> {
        let sql = format!(
            "UPDATE {} SET remote_id = ?, updated_at = ? WHERE id = ?",
            F::table()
        );
        let result = self
            .conn
            .execute(
                &sql,
                libsql::params![remote_id.as_str(), unix_millis_now(), id.as_str()],
            )
            .await;

        match result {
            Ok(0) => Err(Error::not_found(F::KIND, id)),
            Ok(_) => Ok(()),
            Err(error) => {
                let error = Error::from(error);
                if error.is_unique_violation() {
                    Err(Error::RemoteIdTaken {
                        kind: F::KIND,
                        remote_id: remote_id.to_string(),
                    })
                } else {
                    Err(error)
                }
            }
        }
    }

    /// Local ids starting with `prefix`, newest first
    pub async fn find_by_id_prefix(&self, prefix: &str, limit: usize) -> Result<Vec<String>> {
        let prefix = prefix.trim();
        if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_hexdigit() || c == '-') {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT id FROM {} WHERE id LIKE ? ORDER BY created_at DESC LIMIT ?",
            F::table()
        );
        let mut rows = self
            .conn
            .query(
                &sql,
                libsql::params![format!("{}%", prefix.to_ascii_lowercase()), limit as i64],
            )
            .await?;

        let mut ids = Vec::new();
        while let Some(row) = rows.next().await? {
            ids.push(row.get::<String>(0)?);
        }
        Ok(ids)
    }
}

impl LibSqlEntityStore<'_, OpportunityFields> {
    /// Move an inquiry through the pipeline, optionally updating its value
    pub async fn update_opportunity_status(
        &self,
        id: &LocalId,
        status: OpportunityStatus,
        monetary_value: Option<Decimal>,
    ) -> Result<Opportunity> {
        let value = monetary_value.map_or(Value::Null, |value| Value::Text(value.to_string()));
        let rows = self
            .conn
            .execute(
                "UPDATE opportunities
                 SET status = ?, monetary_value = COALESCE(?, monetary_value), updated_at = ?
                 WHERE id = ?",
                vec![
                    Value::Text(status.as_str().to_string()),
                    value,
                    Value::Integer(unix_millis_now()),
                    Value::Text(id.as_str()),
                ],
            )
            .await?;
        if rows == 0 {
            return Err(Error::not_found(OpportunityFields::KIND, id));
        }

        self.get(id)
            .await?
            .ok_or_else(|| Error::not_found(OpportunityFields::KIND, id))
    }
}

impl LibSqlEntityStore<'_, TaskFields> {
    /// Toggle task completion
    pub async fn set_task_completed(&self, id: &LocalId, completed: bool) -> Result<Task> {
        let rows = self
            .conn
            .execute(
                "UPDATE tasks SET completed = ?, updated_at = ? WHERE id = ?",
                libsql::params![i64::from(completed), unix_millis_now(), id.as_str()],
            )
            .await?;
        if rows == 0 {
            return Err(Error::not_found(TaskFields::KIND, id));
        }

        self.get(id)
            .await?
            .ok_or_else(|| Error::not_found(TaskFields::KIND, id))
    }
}
