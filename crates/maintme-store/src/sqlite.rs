//! SQLite-backed subscriber store.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Params, Row};
use tracing::{debug, info, warn};

use maintme_core::{
    Condition, ConditionId, Credentials, Filter, FilterId, MaintmeError, MaintmeResult, Store,
    Subscriber, SubscriberId,
};

const SUBSCRIBER_COLUMNS: &str = "id, email, github_id, github_login, github_token, \
     filter_default_discard, last_created_at, next_poll_at, active";

const CONDITION_COLUMNS: &str = "id, filter_id, negate, type, payload_action, payload_issue_label, \
     payload_issue_milestone_title, payload_issue_title_regexp, payload_issue_body_regexp, \
     compare_public, public, organization_id, repository_id";

/// SQLite store for subscribers and their rules.
///
/// Filters and conditions are always returned in id order, which is their
/// creation order.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> MaintmeResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path.as_ref()).map_err(db_err("open"))?;
        info!(path = %path.as_ref().display(), "Opened subscriber database");
        Self::with_connection(conn)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> MaintmeResult<Self> {
        let conn = Connection::open_in_memory().map_err(db_err("open"))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> MaintmeResult<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self, operation: &'static str) -> MaintmeResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| MaintmeError::store(operation, "connection lock poisoned"))
    }

    fn init_schema(&self) -> MaintmeResult<()> {
        let conn = self.conn("init_schema")?;
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email TEXT NOT NULL,
                github_id INTEGER NOT NULL UNIQUE,
                github_login TEXT NOT NULL,
                github_token TEXT,
                filter_default_discard INTEGER NOT NULL DEFAULT 0,
                last_created_at TEXT NOT NULL,
                next_poll_at TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                deactivated_reason TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_users_active ON users(active);

            CREATE TABLE IF NOT EXISTS filters (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id),
                on_match_discard INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_filters_user ON filters(user_id);

            CREATE TABLE IF NOT EXISTS conditions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                filter_id INTEGER NOT NULL REFERENCES filters(id) ON DELETE CASCADE,
                negate INTEGER NOT NULL DEFAULT 0,
                type TEXT NOT NULL DEFAULT '',
                payload_action TEXT NOT NULL DEFAULT '',
                payload_issue_label TEXT NOT NULL DEFAULT '',
                payload_issue_milestone_title TEXT NOT NULL DEFAULT '',
                payload_issue_title_regexp TEXT NOT NULL DEFAULT '',
                payload_issue_body_regexp TEXT NOT NULL DEFAULT '',
                compare_public INTEGER NOT NULL DEFAULT 0,
                public INTEGER NOT NULL DEFAULT 0,
                organization_id INTEGER NOT NULL DEFAULT 0,
                repository_id INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_conditions_filter ON conditions(filter_id);
        "#,
        )
        .map_err(db_err("init_schema"))?;
        Ok(())
    }

    /// Record a GitHub login, creating the subscriber on first login.
    ///
    /// Logging in again refreshes email, login and token and reactivates a
    /// subscriber whose previous token was rejected.
    pub fn github_login(
        &self,
        email: &str,
        github_id: i64,
        github_login: &str,
        credentials: &Credentials,
    ) -> MaintmeResult<SubscriberId> {
        let conn = self.conn("github_login")?;
        let now = timestamp(Utc::now());

        let existing: Option<SubscriberId> = conn
            .query_row(
                "SELECT id FROM users WHERE github_id = ?1",
                params![github_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err("github_login"))?;

        if let Some(id) = existing {
            conn.execute(
                "UPDATE users SET email = ?1, github_login = ?2, github_token = ?3, \
                 active = 1, deactivated_reason = NULL, updated_at = ?4 WHERE id = ?5",
                params![email, github_login, credentials.token(), now, id],
            )
            .map_err(db_err("github_login"))?;
            debug!(subscriber_id = id, github_login, "Refreshed subscriber login");
            return Ok(id);
        }

        let epoch = timestamp(DateTime::<Utc>::UNIX_EPOCH);
        conn.execute(
            "INSERT INTO users (email, github_id, github_login, github_token, \
             last_created_at, next_poll_at, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?5, ?6, ?6)",
            params![email, github_id, github_login, credentials.token(), epoch, now],
        )
        .map_err(db_err("github_login"))?;

        let id = conn.last_insert_rowid();
        info!(subscriber_id = id, github_login, "Created subscriber");
        Ok(id)
    }

    /// Get a subscriber by id.
    pub fn subscriber(&self, id: SubscriberId) -> MaintmeResult<Option<Subscriber>> {
        let conn = self.conn("subscriber")?;
        conn.query_row(
            &format!("SELECT {} FROM users WHERE id = ?1", SUBSCRIBER_COLUMNS),
            params![id],
            row_to_subscriber,
        )
        .optional()
        .map_err(db_err("subscriber"))
    }

    /// Update the subscriber's settings. Only the default-discard flag is
    /// writable; the poll state belongs to the poller.
    pub fn update_subscriber(&self, subscriber: &Subscriber) -> MaintmeResult<()> {
        let conn = self.conn("update_subscriber")?;
        conn.execute(
            "UPDATE users SET filter_default_discard = ?1, updated_at = ?2 WHERE id = ?3",
            params![
                subscriber.filter_default_discard,
                timestamp(Utc::now()),
                subscriber.id
            ],
        )
        .map_err(db_err("update_subscriber"))?;
        Ok(())
    }

    /// Create an empty filter for a subscriber.
    pub fn create_filter(
        &self,
        subscriber_id: SubscriberId,
        on_match_discard: bool,
    ) -> MaintmeResult<FilterId> {
        let conn = self.conn("create_filter")?;
        let now = timestamp(Utc::now());
        conn.execute(
            "INSERT INTO filters (user_id, on_match_discard, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?3)",
            params![subscriber_id, on_match_discard, now],
        )
        .map_err(db_err("create_filter"))?;
        Ok(conn.last_insert_rowid())
    }

    /// Get a filter with its conditions.
    pub fn filter(&self, id: FilterId) -> MaintmeResult<Option<Filter>> {
        let conn = self.conn("filter")?;
        let filter = conn
            .query_row(
                "SELECT id, user_id, on_match_discard FROM filters WHERE id = ?1",
                params![id],
                row_to_filter,
            )
            .optional()
            .map_err(db_err("filter"))?;

        match filter {
            Some(mut filter) => {
                filter.conditions = filter_conditions(&conn, filter.id)?;
                Ok(Some(filter))
            }
            None => Ok(None),
        }
    }

    /// Update a filter's action. Conditions are managed separately.
    pub fn update_filter(&self, filter: &Filter) -> MaintmeResult<()> {
        let conn = self.conn("update_filter")?;
        conn.execute(
            "UPDATE filters SET on_match_discard = ?1, updated_at = ?2 WHERE id = ?3",
            params![filter.on_match_discard, timestamp(Utc::now()), filter.id],
        )
        .map_err(db_err("update_filter"))?;
        Ok(())
    }

    /// A subscriber's filters with their conditions, in creation order.
    pub fn subscriber_filters(&self, subscriber_id: SubscriberId) -> MaintmeResult<Vec<Filter>> {
        let conn = self.conn("subscriber_filters")?;
        let mut filters = query_all(
            &conn,
            "SELECT id, user_id, on_match_discard FROM filters WHERE user_id = ?1 ORDER BY id",
            params![subscriber_id],
            row_to_filter,
        )
        .map_err(db_err("subscriber_filters"))?;

        for filter in &mut filters {
            filter.conditions = filter_conditions(&conn, filter.id)?;
        }
        Ok(filters)
    }

    /// Get a condition by id.
    pub fn condition(&self, id: ConditionId) -> MaintmeResult<Option<Condition>> {
        let conn = self.conn("condition")?;
        conn.query_row(
            &format!("SELECT {} FROM conditions WHERE id = ?1", CONDITION_COLUMNS),
            params![id],
            row_to_condition,
        )
        .optional()
        .map_err(db_err("condition"))
    }

    /// Add a condition to `condition.filter_id`. The condition's own id is
    /// ignored; the assigned id is returned.
    pub fn create_condition(&self, condition: &Condition) -> MaintmeResult<ConditionId> {
        let conn = self.conn("create_condition")?;
        conn.execute(
            "INSERT INTO conditions (filter_id, negate, type, payload_action, payload_issue_label, \
             payload_issue_milestone_title, payload_issue_title_regexp, payload_issue_body_regexp, \
             compare_public, public, organization_id, repository_id) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                condition.filter_id,
                condition.negate,
                condition.event_type,
                condition.payload_action,
                condition.payload_issue_label,
                condition.payload_issue_milestone_title,
                condition.payload_issue_title_regexp,
                condition.payload_issue_body_regexp,
                condition.compare_public,
                condition.public,
                condition.organization_id,
                condition.repository_id,
            ],
        )
        .map_err(db_err("create_condition"))?;
        Ok(conn.last_insert_rowid())
    }

    /// Delete a condition, provided it belongs to one of the subscriber's
    /// filters. Returns whether a condition was deleted.
    pub fn delete_condition(
        &self,
        subscriber_id: SubscriberId,
        condition_id: ConditionId,
    ) -> MaintmeResult<bool> {
        let conn = self.conn("delete_condition")?;
        let deleted = conn
            .execute(
                "DELETE FROM conditions WHERE id = ?1 \
                 AND filter_id IN (SELECT id FROM filters WHERE user_id = ?2)",
                params![condition_id, subscriber_id],
            )
            .map_err(db_err("delete_condition"))?;
        Ok(deleted > 0)
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn list_active_subscribers(&self) -> MaintmeResult<Vec<Subscriber>> {
        let conn = self.conn("list_active_subscribers")?;
        query_all(
            &conn,
            &format!(
                "SELECT {} FROM users WHERE active = 1 ORDER BY id",
                SUBSCRIBER_COLUMNS
            ),
            [],
            row_to_subscriber,
        )
        .map_err(db_err("list_active_subscribers"))
    }

    async fn load_filters(&self, subscriber_id: SubscriberId) -> MaintmeResult<Vec<Filter>> {
        self.subscriber_filters(subscriber_id)
            .map_err(|e| e.for_subscriber(subscriber_id))
    }

    async fn commit_poll_result(
        &self,
        subscriber_id: SubscriberId,
        last_seen_created_at: DateTime<Utc>,
        next_poll_at: DateTime<Utc>,
    ) -> MaintmeResult<()> {
        let conn = self.conn("commit_poll_result")?;
        // timestamps share one fixed-width format, so text order is time order
        let updated = conn
            .execute(
                "UPDATE users SET last_created_at = MAX(last_created_at, ?1), next_poll_at = ?2, \
                 updated_at = ?3 WHERE id = ?4",
                params![
                    timestamp(last_seen_created_at),
                    timestamp(next_poll_at),
                    timestamp(Utc::now()),
                    subscriber_id
                ],
            )
            .map_err(|e| db_err("commit_poll_result")(e).for_subscriber(subscriber_id))?;

        if updated == 0 {
            return Err(
                MaintmeError::store("commit_poll_result", "no such subscriber")
                    .for_subscriber(subscriber_id),
            );
        }
        Ok(())
    }

    async fn deactivate_subscriber(&self, subscriber_id: SubscriberId, reason: &str) -> MaintmeResult<()> {
        let conn = self.conn("deactivate_subscriber")?;
        conn.execute(
            "UPDATE users SET active = 0, deactivated_reason = ?1, updated_at = ?2 WHERE id = ?3",
            params![reason, timestamp(Utc::now()), subscriber_id],
        )
        .map_err(|e| db_err("deactivate_subscriber")(e).for_subscriber(subscriber_id))?;
        warn!(subscriber_id, reason, "Subscriber deactivated");
        Ok(())
    }
}

fn db_err(operation: &'static str) -> impl Fn(rusqlite::Error) -> MaintmeError {
    move |e| MaintmeError::Store {
        message: e.to_string(),
        code: maintme_core::ErrorCode::DbOperationFailed,
        operation,
        subscriber_id: None,
        source: Some(Box::new(e)),
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_subscriber(row: &Row<'_>) -> rusqlite::Result<Subscriber> {
    let token: Option<String> = row.get(4)?;
    Ok(Subscriber {
        id: row.get(0)?,
        email: row.get(1)?,
        github_id: row.get(2)?,
        github_login: row.get(3)?,
        credentials: token.filter(|t| !t.is_empty()).map(Credentials::new),
        filter_default_discard: row.get(5)?,
        last_seen_created_at: parse_timestamp(row, 6)?,
        next_poll_at: parse_timestamp(row, 7)?,
        active: row.get(8)?,
    })
}

fn row_to_filter(row: &Row<'_>) -> rusqlite::Result<Filter> {
    Ok(Filter {
        id: row.get(0)?,
        subscriber_id: row.get(1)?,
        on_match_discard: row.get(2)?,
        conditions: Vec::new(),
    })
}

fn row_to_condition(row: &Row<'_>) -> rusqlite::Result<Condition> {
    Ok(Condition {
        id: row.get(0)?,
        filter_id: row.get(1)?,
        negate: row.get(2)?,
        event_type: row.get(3)?,
        payload_action: row.get(4)?,
        payload_issue_label: row.get(5)?,
        payload_issue_milestone_title: row.get(6)?,
        payload_issue_title_regexp: row.get(7)?,
        payload_issue_body_regexp: row.get(8)?,
        compare_public: row.get(9)?,
        public: row.get(10)?,
        organization_id: row.get(11)?,
        repository_id: row.get(12)?,
    })
}

fn filter_conditions(conn: &Connection, filter_id: FilterId) -> MaintmeResult<Vec<Condition>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM conditions WHERE filter_id = ?1 ORDER BY id",
            CONDITION_COLUMNS
        ),
        params![filter_id],
        row_to_condition,
    )
    .map_err(db_err("load_conditions"))
}

fn query_all<T, P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
    map: fn(&Row<'_>) -> rusqlite::Result<T>,
) -> rusqlite::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, map)?;
    rows.collect()
}
