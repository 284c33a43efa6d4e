use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::Context;
use async_trait::async_trait;
use shared::domain::{
    ActionId, ActionRecord, CueMatchType, NewAction, NewTrigger, NewTriggerWithActions,
    TriggerId, TriggerKey, TriggerRecord,
};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite, SqliteConnection,
};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} not found: {detail}")]
    NotFound { entity: &'static str, detail: String },
    #[error("trigger already exists: {0}")]
    Conflict(String),
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    fn trigger_not_found(trigger_id: TriggerId) -> Self {
        Self::NotFound {
            entity: "trigger",
            detail: format!("id {}", trigger_id.0),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Durable trigger/action configuration.
///
/// Triggers own their actions: deleting a trigger deletes its actions, and
/// actions are listed in insertion order.
#[async_trait]
pub trait TriggerStore: Send + Sync {
    async fn create_trigger(&self, trigger: NewTrigger) -> StoreResult<TriggerRecord>;
    async fn delete_trigger(&self, trigger_id: TriggerId) -> StoreResult<()>;
    /// Exact match on all four fields of the key.
    async fn find_trigger(&self, key: &TriggerKey) -> StoreResult<TriggerRecord>;
    async fn get_trigger(&self, trigger_id: TriggerId) -> StoreResult<TriggerRecord>;
    async fn list_triggers_with_actions(&self) -> StoreResult<Vec<TriggerRecord>>;
    async fn set_trigger_enabled(
        &self,
        trigger_id: TriggerId,
        enabled: bool,
    ) -> StoreResult<TriggerRecord>;
    /// Deletes everything and inserts `triggers` in one transaction.
    async fn replace_all(&self, triggers: Vec<NewTriggerWithActions>) -> StoreResult<usize>;
    async fn add_action(&self, trigger_id: TriggerId, action: NewAction)
        -> StoreResult<ActionRecord>;
    async fn remove_action(&self, action_id: ActionId) -> StoreResult<()>;
    async fn health_check(&self) -> StoreResult<()>;
}

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let in_memory = database_url.starts_with("sqlite::memory:");
        let mut connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool_options = if in_memory {
            // Each connection to an in-memory URL opens a separate database.
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            connect_options = connect_options.journal_mode(SqliteJournalMode::Wal);
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = pool_options
            .connect_with(connect_options)
            .await
            .with_context(|| format!("failed to open sqlite database '{database_url}'"))?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to apply mapping migrations")?;

        info!(%database_url, "mapping store ready");
        Ok(Self { pool })
    }
}

#[async_trait]
impl TriggerStore for Storage {
    async fn create_trigger(&self, trigger: NewTrigger) -> StoreResult<TriggerRecord> {
        let mut conn = self.pool.acquire().await?;
        let id = insert_trigger(&mut conn, &trigger).await?;
        debug!(trigger_id = id.0, cue_name = %trigger.cue_name, "trigger created");

        Ok(TriggerRecord {
            id,
            hotcue_type: trigger.hotcue_type,
            cue_color: trigger.cue_color,
            decks: trigger.decks,
            cue_name: trigger.cue_name,
            enabled: trigger.enabled,
            cue_match_type: trigger.cue_match_type,
            actions: Vec::new(),
        })
    }

    async fn delete_trigger(&self, trigger_id: TriggerId) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        let actions = sqlx::query("DELETE FROM actions WHERE trigger_id = ?")
            .bind(trigger_id.0)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let triggers = sqlx::query("DELETE FROM triggers WHERE id = ?")
            .bind(trigger_id.0)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if triggers == 0 {
            return Err(StoreError::trigger_not_found(trigger_id));
        }

        tx.commit().await?;
        debug!(trigger_id = trigger_id.0, actions, "trigger deleted");
        Ok(())
    }

    async fn find_trigger(&self, key: &TriggerKey) -> StoreResult<TriggerRecord> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(
            "SELECT id, hotcue_type, cue_color, decks, cue_name, enabled, cue_match_type
             FROM triggers
             WHERE cue_name = ? AND cue_color = ? AND hotcue_type = ? AND cue_match_type = ?",
        )
        .bind(&key.cue_name)
        .bind(key.cue_color)
        .bind(key.hotcue_type)
        .bind(key.cue_match_type.as_str())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::NotFound {
            entity: "trigger",
            detail: describe_key(key),
        })?;

        let mut trigger = trigger_from_row(&row)?;
        trigger.actions = load_actions(&mut tx, trigger.id).await?;
        tx.commit().await?;
        Ok(trigger)
    }

    async fn get_trigger(&self, trigger_id: TriggerId) -> StoreResult<TriggerRecord> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(
            "SELECT id, hotcue_type, cue_color, decks, cue_name, enabled, cue_match_type
             FROM triggers
             WHERE id = ?",
        )
        .bind(trigger_id.0)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::trigger_not_found(trigger_id))?;

        let mut trigger = trigger_from_row(&row)?;
        trigger.actions = load_actions(&mut tx, trigger.id).await?;
        tx.commit().await?;
        Ok(trigger)
    }

    async fn list_triggers_with_actions(&self) -> StoreResult<Vec<TriggerRecord>> {
        // Both reads share one transaction so a concurrent replace_all is
        // either fully visible or not at all.
        let mut tx = self.pool.begin().await?;
        let trigger_rows = sqlx::query(
            "SELECT id, hotcue_type, cue_color, decks, cue_name, enabled, cue_match_type
             FROM triggers
             ORDER BY id ASC",
        )
        .fetch_all(&mut *tx)
        .await?;
        let action_rows = sqlx::query(
            "SELECT id, trigger_id, app_id, action_type, action_args
             FROM actions
             ORDER BY trigger_id ASC, id ASC",
        )
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        let mut triggers = trigger_rows
            .iter()
            .map(trigger_from_row)
            .collect::<StoreResult<Vec<_>>>()?;
        let positions: HashMap<TriggerId, usize> = triggers
            .iter()
            .enumerate()
            .map(|(position, trigger)| (trigger.id, position))
            .collect();
        for row in &action_rows {
            let action = action_from_row(row)?;
            if let Some(&position) = positions.get(&action.trigger_id) {
                triggers[position].actions.push(action);
            }
        }
        Ok(triggers)
    }

    async fn set_trigger_enabled(
        &self,
        trigger_id: TriggerId,
        enabled: bool,
    ) -> StoreResult<TriggerRecord> {
        let updated = sqlx::query("UPDATE triggers SET enabled = ? WHERE id = ?")
            .bind(enabled)
            .bind(trigger_id.0)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if updated == 0 {
            return Err(StoreError::trigger_not_found(trigger_id));
        }
        self.get_trigger(trigger_id).await
    }

    async fn replace_all(&self, triggers: Vec<NewTriggerWithActions>) -> StoreResult<usize> {
        let mut tx = self.pool.begin().await?;

        let removed_actions = sqlx::query("DELETE FROM actions")
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let removed_triggers = sqlx::query("DELETE FROM triggers")
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let mut inserted_actions = 0usize;
        for entry in &triggers {
            let trigger_id = insert_trigger(&mut tx, &entry.trigger).await?;
            for action in &entry.actions {
                insert_action(&mut tx, trigger_id, action).await?;
                inserted_actions += 1;
            }
        }

        tx.commit().await?;
        info!(
            removed_triggers,
            removed_actions,
            inserted_triggers = triggers.len(),
            inserted_actions,
            "mapping configuration replaced"
        );
        Ok(triggers.len())
    }

    async fn add_action(
        &self,
        trigger_id: TriggerId,
        action: NewAction,
    ) -> StoreResult<ActionRecord> {
        let mut tx = self.pool.begin().await?;
        let exists = sqlx::query("SELECT 1 FROM triggers WHERE id = ?")
            .bind(trigger_id.0)
            .fetch_optional(&mut *tx)
            .await?
            .is_some();
        if !exists {
            return Err(StoreError::trigger_not_found(trigger_id));
        }

        let action_id = insert_action(&mut tx, trigger_id, &action).await?;
        tx.commit().await?;
        debug!(trigger_id = trigger_id.0, action_id = action_id.0, "action added");

        Ok(ActionRecord {
            id: action_id,
            trigger_id,
            app_id: action.app_id,
            action_type: action.action_type,
            action_args: action.action_args,
        })
    }

    async fn remove_action(&self, action_id: ActionId) -> StoreResult<()> {
        let removed = sqlx::query("DELETE FROM actions WHERE id = ?")
            .bind(action_id.0)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if removed == 0 {
            return Err(StoreError::NotFound {
                entity: "action",
                detail: format!("id {}", action_id.0),
            });
        }
        debug!(action_id = action_id.0, "action removed");
        Ok(())
    }

    async fn health_check(&self) -> StoreResult<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}

async fn insert_trigger(conn: &mut SqliteConnection, trigger: &NewTrigger) -> StoreResult<TriggerId> {
    let row = sqlx::query(
        "INSERT INTO triggers (hotcue_type, cue_color, decks, cue_name, enabled, cue_match_type)
         VALUES (?, ?, ?, ?, ?, ?)
         RETURNING id",
    )
    .bind(trigger.hotcue_type)
    .bind(trigger.cue_color)
    .bind(trigger.decks)
    .bind(&trigger.cue_name)
    .bind(trigger.enabled)
    .bind(trigger.cue_match_type.as_str())
    .fetch_one(&mut *conn)
    .await
    .map_err(|err| conflict_or_database(err, &trigger.key()))?;
    Ok(TriggerId(row.try_get::<i64, _>(0)?))
}

async fn insert_action(
    conn: &mut SqliteConnection,
    trigger_id: TriggerId,
    action: &NewAction,
) -> StoreResult<ActionId> {
    let row = sqlx::query(
        "INSERT INTO actions (trigger_id, app_id, action_type, action_args)
         VALUES (?, ?, ?, ?)
         RETURNING id",
    )
    .bind(trigger_id.0)
    .bind(&action.app_id)
    .bind(&action.action_type)
    .bind(&action.action_args)
    .fetch_one(&mut *conn)
    .await?;
    Ok(ActionId(row.try_get::<i64, _>(0)?))
}

async fn load_actions(
    conn: &mut SqliteConnection,
    trigger_id: TriggerId,
) -> StoreResult<Vec<ActionRecord>> {
    let rows = sqlx::query(
        "SELECT id, trigger_id, app_id, action_type, action_args
         FROM actions
         WHERE trigger_id = ?
         ORDER BY id ASC",
    )
    .bind(trigger_id.0)
    .fetch_all(&mut *conn)
    .await?;
    rows.iter().map(action_from_row).collect()
}

fn trigger_from_row(row: &SqliteRow) -> StoreResult<TriggerRecord> {
    let match_type: String = row.try_get("cue_match_type")?;
    let cue_match_type = CueMatchType::from_str(&match_type)
        .map_err(|err| StoreError::Corrupt(err.to_string()))?;

    Ok(TriggerRecord {
        id: TriggerId(row.try_get("id")?),
        hotcue_type: row.try_get("hotcue_type")?,
        cue_color: row.try_get("cue_color")?,
        decks: row.try_get("decks")?,
        cue_name: row.try_get("cue_name")?,
        enabled: row.try_get("enabled")?,
        cue_match_type,
        actions: Vec::new(),
    })
}

fn action_from_row(row: &SqliteRow) -> StoreResult<ActionRecord> {
    Ok(ActionRecord {
        id: ActionId(row.try_get("id")?),
        trigger_id: TriggerId(row.try_get("trigger_id")?),
        app_id: row.try_get("app_id")?,
        action_type: row.try_get("action_type")?,
        action_args: row.try_get("action_args")?,
    })
}

fn conflict_or_database(err: sqlx::Error, key: &TriggerKey) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return StoreError::Conflict(describe_key(key));
        }
    }
    StoreError::Database(err)
}

fn describe_key(key: &TriggerKey) -> String {
    format!(
        "cueName='{}' cueColor={:#x} hotcueType={:#x} cueMatchType={}",
        key.cue_name, key.cue_color, key.hotcue_type, key.cue_match_type
    )
}

pub fn ensure_sqlite_parent_dir_exists(database_url: &str) -> anyhow::Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
