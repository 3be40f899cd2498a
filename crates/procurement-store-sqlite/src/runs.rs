use anyhow::{anyhow, Context, Result};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::SqliteStore;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum IngestRunOutcome {
    Completed,
    Failed,
}

impl IngestRunOutcome {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Audit entry for one processed source file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewIngestRun {
    pub source_path: String,
    pub source_kind: String,
    pub sha256: Option<String>,
    pub started_at: String,
    pub finished_at: String,
    pub outcome: IngestRunOutcome,
    pub error: Option<String>,
    pub counts: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IngestRun {
    pub id: String,
    #[serde(flatten)]
    pub run: NewIngestRun,
}

impl SqliteStore {
    /// # Errors
    /// Returns an error when the run cannot be serialized or written.
    pub fn record_ingest_run(&mut self, run: &NewIngestRun) -> Result<IngestRun> {
        let id = Ulid::new().to_string();
        let counts_json =
            serde_json::to_string(&run.counts).context("failed to serialize ingest counts")?;

        let tx = self.conn.transaction().context("failed to start transaction")?;
        tx.execute(
            "INSERT INTO ingest_runs(
                id, source_path, source_kind, sha256, started_at, finished_at, outcome, error,
                counts_json
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                id,
                run.source_path,
                run.source_kind,
                run.sha256,
                run.started_at,
                run.finished_at,
                run.outcome.as_str(),
                run.error,
                counts_json,
            ],
        )
        .context("failed to insert ingest run")?;
        tx.commit().context("failed to commit ingest run")?;

        Ok(IngestRun { id, run: run.clone() })
    }

    /// Most recent runs first.
    ///
    /// # Errors
    /// Returns an error when the query fails or a stored row cannot be decoded.
    pub fn list_ingest_runs(&self, limit: u32) -> Result<Vec<IngestRun>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, source_path, source_kind, sha256, started_at, finished_at, outcome,
                        error, counts_json
                 FROM ingest_runs
                 ORDER BY started_at DESC, id DESC
                 LIMIT ?1",
            )
            .context("failed to prepare ingest run listing")?;
        let mut rows = stmt.query(params![i64::from(limit)])?;
        let mut runs = Vec::new();

        while let Some(row) = rows.next()? {
            let outcome_raw: String = row.get(6)?;
            let counts_json: String = row.get(8)?;
            runs.push(IngestRun {
                id: row.get(0)?,
                run: NewIngestRun {
                    source_path: row.get(1)?,
                    source_kind: row.get(2)?,
                    sha256: row.get(3)?,
                    started_at: row.get(4)?,
                    finished_at: row.get(5)?,
                    outcome: IngestRunOutcome::parse(&outcome_raw)
                        .ok_or_else(|| anyhow!("unknown ingest outcome: {outcome_raw}"))?,
                    error: row.get(7)?,
                    counts: serde_json::from_str(&counts_json)
                        .context("failed to deserialize ingest counts")?,
                },
            });
        }

        Ok(runs)
    }
}
