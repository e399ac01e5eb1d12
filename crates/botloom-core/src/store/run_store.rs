use chrono::Utc;
use rusqlite::{OptionalExtension, Row};

use crate::db::Database;
use crate::error::EngineError;
use crate::models::{Run, RunStatus, StepRequest, TranscriptEntry};

const RUN_COLUMNS: &str =
    "id, bot_id, version_id, triggered_by, status, steps, output, created_at, started_at, finished_at";
const RUN_REDUCED_COLUMNS: &str = "id, bot_id, status";

#[derive(Clone)]
pub struct RunStore {
    db: Database,
}

impl RunStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn create(&self, run: &Run) -> Result<(), EngineError> {
        let r = run.clone();
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "INSERT INTO runs (id, bot_id, version_id, triggered_by, status, steps, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    rusqlite::params![
                        r.id,
                        r.bot_id,
                        r.version_id,
                        r.triggered_by,
                        r.status.as_str(),
                        serde_json::to_string(&r.steps).unwrap_or_else(|_| "[]".into()),
                        r.created_at.timestamp_millis(),
                    ],
                )?;
                Ok(())
            })
            .await
    }

    /// Load a run, degrading to `id, bot_id, status` on older schemas.
    pub async fn get(&self, run_id: &str) -> Result<Option<Run>, EngineError> {
        match self.query_one(run_id, RUN_COLUMNS, row_to_run).await {
            Err(e) if e.is_schema_mismatch() => {
                tracing::warn!(
                    "[RunStore] runs table is missing optional columns ({}), using reduced field set",
                    e
                );
                self.query_one(run_id, RUN_REDUCED_COLUMNS, row_to_reduced_run)
                    .await
            }
            other => other,
        }
    }

    pub async fn list_by_bot(&self, bot_id: &str) -> Result<Vec<Run>, EngineError> {
        let id = bot_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM runs WHERE bot_id = ?1 ORDER BY created_at DESC",
                    RUN_COLUMNS
                ))?;
                let rows = stmt
                    .query_map(rusqlite::params![id], |row| Ok(row_to_run(row)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    /// Move a queued run to `running`. Returns `false` when the run was not
    /// queued any more, i.e. another executor claimed it first.
    pub async fn mark_running(&self, run_id: &str) -> Result<bool, EngineError> {
        let id = run_id.to_string();
        let now = Utc::now().timestamp_millis();
        let result = self
            .db
            .with_conn_async({
                let id = id.clone();
                move |conn| {
                    conn.execute(
                        "UPDATE runs SET status = ?1, started_at = ?2 WHERE id = ?3 AND status = ?4",
                        rusqlite::params![
                            RunStatus::Running.as_str(),
                            now,
                            id,
                            RunStatus::Queued.as_str()
                        ],
                    )
                }
            })
            .await;

        let updated = match result {
            Err(e) if e.is_schema_mismatch() => {
                self.update_status(id, RunStatus::Running, Some(RunStatus::Queued))
                    .await?
            }
            other => other?,
        };
        Ok(updated > 0)
    }

    /// Status-only write used when a full `finish` could not be persisted.
    pub async fn mark_failed(&self, run_id: &str) -> Result<(), EngineError> {
        self.update_status(run_id.to_string(), RunStatus::Failed, None)
            .await
            .map(|_| ())
    }

    /// Persist the terminal state of a run. When the output/transcript
    /// columns are missing only the status is written.
    pub async fn finish(
        &self,
        run_id: &str,
        status: RunStatus,
        output: Option<&str>,
        transcript: &[TranscriptEntry],
    ) -> Result<(), EngineError> {
        let id = run_id.to_string();
        let output = output.map(|o| o.to_string());
        let transcript = serde_json::to_string(transcript).unwrap_or_else(|_| "[]".into());
        let now = Utc::now().timestamp_millis();

        let result = self
            .db
            .with_conn_async({
                let id = id.clone();
                move |conn| {
                    conn.execute(
                        "UPDATE runs SET status = ?1, output = ?2, transcript = ?3, finished_at = ?4 WHERE id = ?5",
                        rusqlite::params![status.as_str(), output, transcript, now, id],
                    )?;
                    Ok(())
                }
            })
            .await;

        match result {
            Err(e) if e.is_schema_mismatch() => {
                tracing::warn!(
                    "[RunStore] runs table is missing result columns ({}), persisting status only",
                    e
                );
                self.update_status(id, status, None).await.map(|_| ())
            }
            other => other,
        }
    }

    /// Load the persisted transcript of a finished run.
    pub async fn transcript(&self, run_id: &str) -> Result<Vec<TranscriptEntry>, EngineError> {
        let id = run_id.to_string();
        let raw: Option<Option<String>> = self
            .db
            .with_conn_async(move |conn| {
                conn.query_row(
                    "SELECT transcript FROM runs WHERE id = ?1",
                    rusqlite::params![id],
                    |row| row.get(0),
                )
                .optional()
            })
            .await?;

        Ok(raw
            .flatten()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default())
    }

    async fn update_status(
        &self,
        id: String,
        status: RunStatus,
        expected: Option<RunStatus>,
    ) -> Result<usize, EngineError> {
        self.db
            .with_conn_async(move |conn| match expected {
                Some(expected) => conn.execute(
                    "UPDATE runs SET status = ?1 WHERE id = ?2 AND status = ?3",
                    rusqlite::params![status.as_str(), id, expected.as_str()],
                ),
                None => conn.execute(
                    "UPDATE runs SET status = ?1 WHERE id = ?2",
                    rusqlite::params![status.as_str(), id],
                ),
            })
            .await
    }

    async fn query_one(
        &self,
        run_id: &str,
        columns: &'static str,
        map: fn(&Row<'_>) -> Run,
    ) -> Result<Option<Run>, EngineError> {
        let id = run_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let mut stmt =
                    conn.prepare(&format!("SELECT {} FROM runs WHERE id = ?1", columns))?;
                stmt.query_row(rusqlite::params![id], |row| Ok(map(row)))
                    .optional()
            })
            .await
    }
}

fn parse_status(raw: String) -> RunStatus {
    RunStatus::from_str(&raw).unwrap_or(RunStatus::Queued)
}

fn row_to_run(row: &Row<'_>) -> Run {
    let steps: Option<String> = row.get(5).unwrap_or(None);
    let created_ms: i64 = row.get(7).unwrap_or(0);
    let started_ms: Option<i64> = row.get(8).unwrap_or(None);
    let finished_ms: Option<i64> = row.get(9).unwrap_or(None);

    Run {
        id: row.get(0).unwrap_or_default(),
        bot_id: row.get(1).unwrap_or_default(),
        version_id: row.get(2).unwrap_or(None),
        triggered_by: row.get(3).unwrap_or(None),
        status: parse_status(row.get(4).unwrap_or_default()),
        steps: steps
            .and_then(|s| serde_json::from_str::<Vec<StepRequest>>(&s).ok())
            .unwrap_or_default(),
        output: row.get(6).unwrap_or(None),
        created_at: chrono::DateTime::from_timestamp_millis(created_ms)
            .unwrap_or_else(Utc::now),
        started_at: started_ms.and_then(chrono::DateTime::from_timestamp_millis),
        finished_at: finished_ms.and_then(chrono::DateTime::from_timestamp_millis),
    }
}

fn row_to_reduced_run(row: &Row<'_>) -> Run {
    let mut run = Run::new(
        row.get(0).unwrap_or_default(),
        row.get(1).unwrap_or_default(),
        Vec::new(),
    );
    run.status = parse_status(row.get(2).unwrap_or_default());
    run
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Bot, TranscriptKind};
    use crate::store::BotStore;

    async fn setup() -> (Database, RunStore) {
        let db = Database::open_in_memory().unwrap();
        BotStore::new(db.clone())
            .save(&Bot::new("b1".into(), "Helper".into(), vec!["llm".into()]))
            .await
            .unwrap();
        (db.clone(), RunStore::new(db))
    }

    #[tokio::test]
    async fn test_create_and_finish_run() {
        let (_db, store) = setup().await;
        let mut run = Run::new(
            "r1".into(),
            "b1".into(),
            vec![StepRequest::new("llm", serde_json::json!({"prompt": "hi"}))],
        );
        run.triggered_by = Some("test".into());
        store.create(&run).await.unwrap();

        assert!(store.mark_running("r1").await.unwrap());
        assert!(!store.mark_running("r1").await.unwrap());
        let loaded = store.get("r1").await.unwrap().unwrap();
        assert_eq!(loaded.status, RunStatus::Running);
        assert!(loaded.started_at.is_some());
        assert_eq!(loaded.steps.len(), 1);

        let transcript = vec![TranscriptEntry::system("done")];
        store
            .finish("r1", RunStatus::Succeeded, Some("hello"), &transcript)
            .await
            .unwrap();

        let loaded = store.get("r1").await.unwrap().unwrap();
        assert_eq!(loaded.status, RunStatus::Succeeded);
        assert_eq!(loaded.output.as_deref(), Some("hello"));
        assert!(loaded.finished_at.is_some());

        let saved = store.transcript("r1").await.unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].kind, TranscriptKind::System);

        assert_eq!(store.list_by_bot("b1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_finish_with_legacy_schema() {
        let (db, store) = setup().await;
        db.execute_batch(
            "ALTER TABLE runs DROP COLUMN transcript; ALTER TABLE runs DROP COLUMN output;",
        )
        .unwrap();

        store
            .create(&Run::new("r1".into(), "b1".into(), vec![]))
            .await
            .unwrap();
        store
            .finish("r1", RunStatus::Failed, Some("ignored"), &[])
            .await
            .unwrap();

        let loaded = store.get("r1").await.unwrap().unwrap();
        assert_eq!(loaded.status, RunStatus::Failed);
        assert!(loaded.output.is_none());
    }

    #[tokio::test]
    async fn test_mark_running_with_legacy_schema_is_conditional() {
        let (db, store) = setup().await;
        db.execute_batch("ALTER TABLE runs DROP COLUMN started_at;")
            .unwrap();
        store
            .create(&Run::new("r1".into(), "b1".into(), vec![]))
            .await
            .unwrap();

        assert!(store.mark_running("r1").await.unwrap());
        assert!(!store.mark_running("r1").await.unwrap());
        store.mark_failed("r1").await.unwrap();
        assert_eq!(
            store.get("r1").await.unwrap().unwrap().status,
            RunStatus::Failed
        );
    }
}
