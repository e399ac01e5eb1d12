use chrono::Utc;
use rusqlite::{OptionalExtension, Row};

use crate::db::Database;
use crate::error::EngineError;
use crate::models::{Bot, BotVersion, Manifest};

const BOT_COLUMNS: &str =
    "id, name, capabilities, manifest, system_prompt, memory_strategy, version_id, created_at, updated_at";
const BOT_REDUCED_COLUMNS: &str = "id, name, capabilities";

const VERSION_COLUMNS: &str =
    "id, bot_id, capabilities, manifest, system_prompt, memory_strategy, created_at";
const VERSION_REDUCED_COLUMNS: &str = "id, bot_id, capabilities";

#[derive(Clone)]
pub struct BotStore {
    db: Database,
}

impl BotStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn save(&self, bot: &Bot) -> Result<(), EngineError> {
        let b = bot.clone();
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "INSERT INTO bots (id, name, capabilities, manifest, system_prompt, memory_strategy, version_id, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                     ON CONFLICT(id) DO UPDATE SET
                       name = excluded.name,
                       capabilities = excluded.capabilities,
                       manifest = excluded.manifest,
                       system_prompt = excluded.system_prompt,
                       memory_strategy = excluded.memory_strategy,
                       version_id = excluded.version_id,
                       updated_at = excluded.updated_at",
                    rusqlite::params![
                        b.id,
                        b.name,
                        serde_json::to_string(&b.capabilities).unwrap_or_else(|_| "[]".into()),
                        b.manifest.as_ref().and_then(|m| serde_json::to_string(m).ok()),
                        b.system_prompt,
                        b.memory_strategy,
                        b.version_id,
                        b.created_at.timestamp_millis(),
                        b.updated_at.timestamp_millis(),
                    ],
                )?;
                Ok(())
            })
            .await
    }

    /// Load a bot. Falls back to `id, name, capabilities` when the table
    /// predates the optional columns.
    pub async fn get(&self, bot_id: &str) -> Result<Option<Bot>, EngineError> {
        match self.query_one(bot_id, BOT_COLUMNS, row_to_bot).await {
            Err(e) if e.is_schema_mismatch() => {
                tracing::warn!(
                    "[BotStore] bots table is missing optional columns ({}), using reduced field set",
                    e
                );
                self.query_one(bot_id, BOT_REDUCED_COLUMNS, row_to_reduced_bot)
                    .await
            }
            other => other,
        }
    }

    pub async fn list(&self) -> Result<Vec<Bot>, EngineError> {
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM bots ORDER BY created_at DESC",
                    BOT_COLUMNS
                ))?;
                let rows = stmt
                    .query_map([], |row| Ok(row_to_bot(row)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    /// Returns whether a bot was removed.
    pub async fn delete(&self, bot_id: &str) -> Result<bool, EngineError> {
        let id = bot_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let removed = conn.execute("DELETE FROM bots WHERE id = ?1", rusqlite::params![id])?;
                Ok(removed > 0)
            })
            .await
    }

    /// Pin (or unpin) the version a bot runs with.
    pub async fn set_version(
        &self,
        bot_id: &str,
        version_id: Option<&str>,
    ) -> Result<(), EngineError> {
        let id = bot_id.to_string();
        let version = version_id.map(|v| v.to_string());
        let now = Utc::now().timestamp_millis();
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "UPDATE bots SET version_id = ?1, updated_at = ?2 WHERE id = ?3",
                    rusqlite::params![version, now, id],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn save_version(&self, version: &BotVersion) -> Result<(), EngineError> {
        let v = version.clone();
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "INSERT INTO bot_versions (id, bot_id, capabilities, manifest, system_prompt, memory_strategy, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     ON CONFLICT(id) DO UPDATE SET
                       capabilities = excluded.capabilities,
                       manifest = excluded.manifest,
                       system_prompt = excluded.system_prompt,
                       memory_strategy = excluded.memory_strategy",
                    rusqlite::params![
                        v.id,
                        v.bot_id,
                        v.capabilities.as_ref().and_then(|c| serde_json::to_string(c).ok()),
                        v.manifest.as_ref().and_then(|m| serde_json::to_string(m).ok()),
                        v.system_prompt,
                        v.memory_strategy,
                        v.created_at.timestamp_millis(),
                    ],
                )?;
                Ok(())
            })
            .await
    }

    /// Load a bot version. Degrades to `id, bot_id, capabilities` when
    /// optional columns are absent, and to `None` when versions are not
    /// stored at all.
    pub async fn get_version(&self, version_id: &str) -> Result<Option<BotVersion>, EngineError> {
        let full = self
            .query_version(version_id, VERSION_COLUMNS, row_to_version)
            .await;
        let err = match full {
            Err(e) if e.is_schema_mismatch() => e,
            other => return other,
        };

        tracing::warn!(
            "[BotStore] bot_versions table is missing optional columns ({}), using reduced field set",
            err
        );
        match self
            .query_version(version_id, VERSION_REDUCED_COLUMNS, row_to_reduced_version)
            .await
        {
            Err(e) if e.is_schema_mismatch() => {
                tracing::warn!("[BotStore] bot versions unavailable ({}), ignoring pin", e);
                Ok(None)
            }
            other => other,
        }
    }

    async fn query_one(
        &self,
        bot_id: &str,
        columns: &'static str,
        map: fn(&Row<'_>) -> Bot,
    ) -> Result<Option<Bot>, EngineError> {
        let id = bot_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let mut stmt =
                    conn.prepare(&format!("SELECT {} FROM bots WHERE id = ?1", columns))?;
                stmt.query_row(rusqlite::params![id], |row| Ok(map(row)))
                    .optional()
            })
            .await
    }

    async fn query_version(
        &self,
        version_id: &str,
        columns: &'static str,
        map: fn(&Row<'_>) -> BotVersion,
    ) -> Result<Option<BotVersion>, EngineError> {
        let id = version_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM bot_versions WHERE id = ?1",
                    columns
                ))?;
                stmt.query_row(rusqlite::params![id], |row| Ok(map(row)))
                    .optional()
            })
            .await
    }
}

fn parse_list(raw: Option<String>) -> Vec<String> {
    raw.and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default()
}

fn parse_manifest(raw: Option<String>) -> Option<Manifest> {
    raw.and_then(|s| serde_json::from_str(&s).ok())
}

fn row_to_bot(row: &Row<'_>) -> Bot {
    let created_ms: i64 = row.get(7).unwrap_or(0);
    let updated_ms: i64 = row.get(8).unwrap_or(0);

    Bot {
        id: row.get(0).unwrap_or_default(),
        name: row.get(1).unwrap_or_default(),
        capabilities: parse_list(row.get(2).unwrap_or(None)),
        manifest: parse_manifest(row.get(3).unwrap_or(None)),
        system_prompt: row.get(4).unwrap_or(None),
        memory_strategy: row.get(5).unwrap_or(None),
        version_id: row.get(6).unwrap_or(None),
        created_at: chrono::DateTime::from_timestamp_millis(created_ms)
            .unwrap_or_else(Utc::now),
        updated_at: chrono::DateTime::from_timestamp_millis(updated_ms)
            .unwrap_or_else(Utc::now),
    }
}

fn row_to_reduced_bot(row: &Row<'_>) -> Bot {
    Bot::new(
        row.get(0).unwrap_or_default(),
        row.get(1).unwrap_or_default(),
        parse_list(row.get(2).unwrap_or(None)),
    )
}

fn row_to_version(row: &Row<'_>) -> BotVersion {
    let created_ms: i64 = row.get(6).unwrap_or(0);
    let capabilities: Option<String> = row.get(2).unwrap_or(None);

    BotVersion {
        id: row.get(0).unwrap_or_default(),
        bot_id: row.get(1).unwrap_or_default(),
        capabilities: capabilities.and_then(|s| serde_json::from_str(&s).ok()),
        manifest: parse_manifest(row.get(3).unwrap_or(None)),
        system_prompt: row.get(4).unwrap_or(None),
        memory_strategy: row.get(5).unwrap_or(None),
        created_at: chrono::DateTime::from_timestamp_millis(created_ms)
            .unwrap_or_else(Utc::now),
    }
}

fn row_to_reduced_version(row: &Row<'_>) -> BotVersion {
    let capabilities: Option<String> = row.get(2).unwrap_or(None);
    let mut version = BotVersion::new(row.get(0).unwrap_or_default(), row.get(1).unwrap_or_default());
    version.capabilities = capabilities.and_then(|s| serde_json::from_str(&s).ok());
    version
}
