use std::path::Path;

use anyhow::{anyhow, Context, Result};
use procurement_core::{
    ApprovalTarget, Contract, ContractStatus, Purchase, PurchaseArtifacts, PurchaseRequest,
    PurchaseStatus, RecordId, RequestArtifacts, RequestStatus,
};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

mod entities;
mod query;
mod runs;

pub use entities::StoredEntity;
pub use query::{Page, PageRequest, RecordFilter, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use runs::{IngestRun, IngestRunOutcome, NewIngestRun};

const LATEST_SCHEMA_VERSION: i64 = 1;

const CREATE_SCHEMA_MIGRATIONS_SQL: &str = r"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at TEXT NOT NULL
);
";

const MIGRATION_001_SQL: &str = r"
CREATE TABLE IF NOT EXISTS purchase_requests (
  id TEXT PRIMARY KEY,
  request_number INTEGER NOT NULL UNIQUE,
  inner_id TEXT,
  creation_date TEXT,
  name TEXT,
  title TEXT,
  cfo TEXT,
  customer TEXT,
  budget_amount REAL,
  currency TEXT,
  requires_purchase INTEGER CHECK (requires_purchase IN (0, 1)),
  is_planned INTEGER CHECK (is_planned IN (0, 1)),
  prepared_by TEXT,
  state TEXT,
  status TEXT NOT NULL CHECK (status IN (
    'PROJECT','ON_COORDINATION','ON_APPROVAL','NOT_COORDINATED','NOT_APPROVED',
    'APPROVED','PURCHASE_CREATED','SPECIFICATION_CREATED'
  )),
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS purchases (
  id TEXT PRIMARY KEY,
  inner_id TEXT NOT NULL UNIQUE,
  purchase_number TEXT,
  purchase_request_id TEXT,
  creation_date TEXT,
  name TEXT,
  title TEXT,
  cfo TEXT,
  budget_amount REAL,
  currency TEXT,
  purchase_method TEXT,
  prepared_by TEXT,
  state TEXT,
  status TEXT NOT NULL CHECK (status IN (
    'PROJECT','ON_COORDINATION','ON_APPROVAL','NOT_COORDINATED','NOT_APPROVED',
    'APPROVED','CONTRACT_CREATED'
  )),
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL,
  FOREIGN KEY (purchase_request_id) REFERENCES purchase_requests(id) ON DELETE SET NULL
);

CREATE TABLE IF NOT EXISTS contracts (
  id TEXT PRIMARY KEY,
  inner_id TEXT NOT NULL UNIQUE,
  kind TEXT CHECK (kind IN ('contract','specification')),
  contract_number TEXT,
  purchase_request_id TEXT,
  purchase_id TEXT,
  creation_date TEXT,
  name TEXT,
  title TEXT,
  cfo TEXT,
  budget_amount REAL,
  currency TEXT,
  supplier TEXT,
  prepared_by TEXT,
  state TEXT,
  status TEXT NOT NULL CHECK (status IN (
    'PROJECT','ON_COORDINATION','ON_REVISION','NOT_COORDINATED','COORDINATED',
    'ON_SIGNING','SIGNED','CANCELLED'
  )),
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL,
  FOREIGN KEY (purchase_request_id) REFERENCES purchase_requests(id) ON DELETE SET NULL,
  FOREIGN KEY (purchase_id) REFERENCES purchases(id) ON DELETE SET NULL
);

CREATE TABLE IF NOT EXISTS plan_items (
  id TEXT PRIMARY KEY,
  subject_key TEXT NOT NULL UNIQUE,
  subject TEXT NOT NULL,
  plan_year INTEGER,
  cfo TEXT,
  company TEXT,
  planned_amount REAL,
  currency TEXT,
  planned_date TEXT,
  purchase_method TEXT,
  is_planned INTEGER CHECK (is_planned IN (0, 1)),
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS approvals (
  id TEXT PRIMARY KEY,
  target TEXT NOT NULL CHECK (target IN ('purchase_request','purchase')),
  document_key TEXT NOT NULL,
  stage TEXT NOT NULL,
  role TEXT NOT NULL,
  assignee TEXT,
  assignment_date TEXT,
  completion_date TEXT,
  completion_result TEXT,
  days_in_work INTEGER,
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL,
  UNIQUE (target, document_key, stage, role)
);

CREATE TABLE IF NOT EXISTS preparers (
  id TEXT PRIMARY KEY,
  name_key TEXT NOT NULL UNIQUE,
  full_name TEXT NOT NULL,
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS ingest_runs (
  id TEXT PRIMARY KEY,
  source_path TEXT NOT NULL,
  source_kind TEXT NOT NULL,
  sha256 TEXT,
  started_at TEXT NOT NULL,
  finished_at TEXT NOT NULL,
  outcome TEXT NOT NULL CHECK (outcome IN ('completed','failed')),
  error TEXT,
  counts_json TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_purchase_requests_status ON purchase_requests(status);
CREATE INDEX IF NOT EXISTS idx_purchases_request ON purchases(purchase_request_id);
CREATE INDEX IF NOT EXISTS idx_purchases_status ON purchases(status);
CREATE INDEX IF NOT EXISTS idx_contracts_request ON contracts(purchase_request_id);
CREATE INDEX IF NOT EXISTS idx_contracts_purchase ON contracts(purchase_id);
CREATE INDEX IF NOT EXISTS idx_contracts_status ON contracts(status);
CREATE INDEX IF NOT EXISTS idx_approvals_document ON approvals(target, document_key);
CREATE INDEX IF NOT EXISTS idx_ingest_runs_started ON ingest_runs(started_at);
";

pub struct SqliteStore {
    conn: Connection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaStatus {
    pub current_version: i64,
    pub target_version: i64,
    pub pending_versions: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ForeignKeyViolation {
    pub table: String,
    pub rowid: i64,
    pub parent: String,
    pub fk_index: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IntegrityReport {
    pub quick_check_ok: bool,
    pub quick_check_message: String,
    pub foreign_key_violations: Vec<ForeignKeyViolation>,
    pub schema_status: SchemaStatus,
}

/// Row counts per table, reported by `db integrity-check` and the health route.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableCounts {
    pub purchase_requests: i64,
    pub purchases: i64,
    pub contracts: i64,
    pub plan_items: i64,
    pub approvals: i64,
    pub preparers: i64,
    pub ingest_runs: i64,
}

impl SqliteStore {
    /// Open a SQLite-backed procurement store and configure required runtime pragmas.
    ///
    /// # Errors
    /// Returns an error when the database cannot be opened or pragmas cannot be applied.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite database at {}", path.display()))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to configure sqlite pragmas")?;

        Ok(Self { conn })
    }

    /// Report current and target schema versions plus pending migrations.
    ///
    /// # Errors
    /// Returns an error when schema metadata cannot be read or initialized.
    pub fn schema_status(&self) -> Result<SchemaStatus> {
        self.conn
            .execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .context("failed to apply schema_migrations table")?;
        let current_version = current_schema_version(&self.conn)?;
        let pending_versions = if current_version < LATEST_SCHEMA_VERSION {
            ((current_version + 1)..=LATEST_SCHEMA_VERSION).collect::<Vec<_>>()
        } else {
            Vec::new()
        };

        Ok(SchemaStatus { current_version, target_version: LATEST_SCHEMA_VERSION, pending_versions })
    }

    /// Apply all forward migrations up to the latest supported schema version.
    ///
    /// # Errors
    /// Returns an error when a migration step fails or the database is newer than this build.
    pub fn migrate(&mut self) -> Result<()> {
        self.conn
            .execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .context("failed to apply schema_migrations table")?;

        let version = current_schema_version(&self.conn)?;
        if version > LATEST_SCHEMA_VERSION {
            return Err(anyhow!(
                "unsupported schema version {version}; expected {LATEST_SCHEMA_VERSION}"
            ));
        }

        if version < 1 {
            let tx = self.conn.transaction().context("failed to start migration v1 transaction")?;
            tx.execute_batch(MIGRATION_001_SQL).context("failed to apply migration v1")?;
            let now = now_rfc3339()?;
            tx.execute(
                "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
                params![1_i64, now],
            )
            .context("failed to record migration version 1")?;
            tx.commit().context("failed to commit migration v1")?;
        }

        Ok(())
    }

    /// Run quick-check, foreign-key-check, and schema status health probes.
    ///
    /// # Errors
    /// Returns an error when any integrity probe query fails.
    pub fn integrity_check(&self) -> Result<IntegrityReport> {
        let quick_check_message: String = self
            .conn
            .query_row("PRAGMA quick_check", [], |row| row.get::<_, String>(0))
            .context("failed to run PRAGMA quick_check")?;

        let mut stmt = self
            .conn
            .prepare("PRAGMA foreign_key_check")
            .context("failed to prepare PRAGMA foreign_key_check")?;
        let rows = stmt.query_map([], |row| {
            Ok(ForeignKeyViolation {
                table: row.get(0)?,
                rowid: row.get(1)?,
                parent: row.get(2)?,
                fk_index: row.get(3)?,
            })
        })?;

        let mut foreign_key_violations = Vec::new();
        for row in rows {
            foreign_key_violations.push(row?);
        }

        let schema_status = self.schema_status()?;
        Ok(IntegrityReport {
            quick_check_ok: quick_check_message == "ok",
            quick_check_message,
            foreign_key_violations,
            schema_status,
        })
    }

    /// # Errors
    /// Returns an error when any count query fails.
    pub fn table_counts(&self) -> Result<TableCounts> {
        Ok(TableCounts {
            purchase_requests: self.count_rows("purchase_requests")?,
            purchases: self.count_rows("purchases")?,
            contracts: self.count_rows("contracts")?,
            plan_items: self.count_rows("plan_items")?,
            approvals: self.count_rows("approvals")?,
            preparers: self.count_rows("preparers")?,
            ingest_runs: self.count_rows("ingest_runs")?,
        })
    }

    fn count_rows(&self, table: &str) -> Result<i64> {
        self.conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .with_context(|| format!("failed to count rows in {table}"))
    }

    /// Evidence for the request status cascade: linked specifications and purchases.
    ///
    /// A specification counts when it points at the request directly or through
    /// one of the request's purchases.
    ///
    /// # Errors
    /// Returns an error when the lookup queries fail.
    pub fn request_artifacts(&self, request: &PurchaseRequest) -> Result<RequestArtifacts> {
        let id = request.id.to_string();
        let specification_exists = self
            .conn
            .query_row(
                "SELECT EXISTS(
                    SELECT 1 FROM contracts
                    WHERE kind = 'specification'
                      AND (purchase_request_id = ?1
                           OR purchase_id IN (SELECT id FROM purchases WHERE purchase_request_id = ?1))
                )",
                params![id],
                |row| row.get::<_, i64>(0),
            )
            .context("failed to look up specifications for request")?
            == 1;
        let purchase_exists = self
            .conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM purchases WHERE purchase_request_id = ?1)",
                params![id],
                |row| row.get::<_, i64>(0),
            )
            .context("failed to look up purchases for request")?
            == 1;

        Ok(RequestArtifacts { specification_exists, purchase_exists })
    }

    /// # Errors
    /// Returns an error when the lookup query fails.
    pub fn purchase_artifacts(&self, purchase: &Purchase) -> Result<PurchaseArtifacts> {
        let contract_exists = self
            .conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM contracts WHERE purchase_id = ?1)",
                params![purchase.id.to_string()],
                |row| row.get::<_, i64>(0),
            )
            .context("failed to look up contracts for purchase")?
            == 1;
        Ok(PurchaseArtifacts { contract_exists })
    }

    /// # Errors
    /// Returns an error when the status write fails or the request no longer exists.
    pub fn set_request_status(&mut self, id: RecordId, status: RequestStatus) -> Result<()> {
        self.write_status(PurchaseRequest::TABLE, id, status.as_str())
    }

    /// # Errors
    /// Returns an error when the status write fails or the purchase no longer exists.
    pub fn set_purchase_status(&mut self, id: RecordId, status: PurchaseStatus) -> Result<()> {
        self.write_status(Purchase::TABLE, id, status.as_str())
    }

    /// # Errors
    /// Returns an error when the status write fails or the contract no longer exists.
    pub fn set_contract_status(&mut self, id: RecordId, status: ContractStatus) -> Result<()> {
        self.write_status(Contract::TABLE, id, status.as_str())
    }

    fn write_status(&mut self, table: &str, id: RecordId, status: &str) -> Result<()> {
        let tx = self.conn.transaction().context("failed to start transaction")?;
        let now = now_rfc3339()?;
        let updated = tx
            .execute(
                &format!("UPDATE {table} SET status = ?2, updated_at = ?3 WHERE id = ?1"),
                params![id.to_string(), status, now],
            )
            .with_context(|| format!("failed to write status for {table} {id}"))?;
        if updated == 0 {
            return Err(anyhow!("{table} {id} not found"));
        }
        tx.commit().context("failed to commit status write")?;
        Ok(())
    }

    /// Approval records of one document, in stage order.
    ///
    /// # Errors
    /// Returns an error when the query fails or a stored row cannot be decoded.
    pub fn approvals_for(
        &self,
        target: ApprovalTarget,
        document_key: &str,
    ) -> Result<Vec<procurement_core::Approval>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT * FROM approvals
                 WHERE target = ?1 AND document_key = ?2
                 ORDER BY assignment_date ASC, stage ASC, role ASC",
            )
            .context("failed to prepare approvals query")?;
        let mut rows = stmt.query(params![target.as_str(), document_key])?;
        let mut approvals = Vec::new();
        while let Some(row) = rows.next()? {
            approvals.push(<procurement_core::Approval as StoredEntity>::from_row(row)?);
        }
        Ok(approvals)
    }
}

fn current_schema_version(conn: &Connection) -> Result<i64> {
    let version = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", [], |row| {
            row.get::<_, i64>(0)
        })
        .context("failed to read current schema version")?;
    Ok(version)
}

fn now_rfc3339() -> Result<String> {
    rfc3339(OffsetDateTime::now_utc())
}

fn rfc3339(value: OffsetDateTime) -> Result<String> {
    value
        .format(&time::format_description::well_known::Rfc3339)
        .context("failed to format RFC3339 timestamp")
}

#[cfg(test)]
mod tests {
    use procurement_core::{
        upsert, Approval, ApprovalDraft, ApprovalFields, ApprovalKey, ContractDraft,
        ContractFields, ContractKind, PlanItem, PlanItemDraft, PlanItemFields, PurchaseDraft,
        PurchaseFields, RequestDraft, RequestFields, UpsertOutcome,
    };
    use time::macros::datetime;

    use super::*;

    fn open_migrated() -> Result<SqliteStore> {
        let mut store = SqliteStore::open(Path::new(":memory:"))?;
        store.migrate()?;
        Ok(store)
    }

    fn request_draft(number: i64, name: &str) -> RequestDraft {
        RequestDraft {
            request_number: number,
            fields: RequestFields {
                name: Some(name.to_string()),
                cfo: Some("ЦФО Логистика".to_string()),
                creation_date: Some(datetime!(2024-05-20 14:05:09)),
                budget_amount: Some(125_000.5),
                requires_purchase: Some(true),
                ..RequestFields::default()
            },
        }
    }

    // Test IDs: TDB-001
    #[test]
    fn migrate_is_idempotent_and_reports_version() -> Result<()> {
        let mut store = SqliteStore::open(Path::new(":memory:"))?;
        let before = store.schema_status()?;
        assert_eq!(before.current_version, 0);
        assert_eq!(before.pending_versions, vec![1]);

        store.migrate()?;
        store.migrate()?;
        let after = store.schema_status()?;
        assert_eq!(after.current_version, LATEST_SCHEMA_VERSION);
        assert!(after.pending_versions.is_empty());
        Ok(())
    }

    // Test IDs: TDB-002
    #[test]
    fn schema_rejects_unknown_status_and_duplicate_keys() -> Result<()> {
        let mut store = open_migrated()?;
        upsert::<PurchaseRequest, _>(&mut store, request_draft(10, "Бумага"))?;

        let bad_status = store.conn.execute(
            "UPDATE purchase_requests SET status = 'SIGNED' WHERE request_number = 10",
            [],
        );
        assert!(bad_status.is_err());

        let duplicate = store.conn.execute(
            "INSERT INTO purchase_requests(id, request_number, status, created_at, updated_at)
             VALUES (?1, 10, 'PROJECT', 'x', 'x')",
            params![RecordId::new().to_string()],
        );
        assert!(duplicate.is_err());
        Ok(())
    }

    // Test IDs: TDB-003
    #[test]
    fn request_round_trips_through_upsert() -> Result<()> {
        let mut store = open_migrated()?;
        let created = upsert::<PurchaseRequest, _>(&mut store, request_draft(10, "Бумага"))?;
        assert_eq!(created.outcome, UpsertOutcome::Created);

        let loaded: PurchaseRequest = store
            .get(created.record.id)?
            .ok_or_else(|| anyhow!("request should be stored"))?;
        assert_eq!(loaded, created.record);

        let again = upsert::<PurchaseRequest, _>(&mut store, request_draft(10, "Бумага"))?;
        assert_eq!(again.outcome, UpsertOutcome::Unchanged);

        let renamed = upsert::<PurchaseRequest, _>(&mut store, request_draft(10, "Картон"))?;
        assert_eq!(renamed.outcome, UpsertOutcome::Updated);
        assert_eq!(renamed.diff.fields(), &["name"]);
        assert_eq!(store.table_counts()?.purchase_requests, 1);
        Ok(())
    }

    // Test IDs: TDB-004
    #[test]
    fn status_writes_survive_later_upserts() -> Result<()> {
        let mut store = open_migrated()?;
        let created = upsert::<PurchaseRequest, _>(&mut store, request_draft(11, "Стулья"))?;
        store.set_request_status(created.record.id, RequestStatus::Approved)?;

        let updated = upsert::<PurchaseRequest, _>(&mut store, request_draft(11, "Кресла"))?;
        assert_eq!(updated.outcome, UpsertOutcome::Updated);
        let loaded: PurchaseRequest = store
            .get(created.record.id)?
            .ok_or_else(|| anyhow!("request should be stored"))?;
        assert_eq!(loaded.status, RequestStatus::Approved);
        assert_eq!(loaded.fields.name.as_deref(), Some("Кресла"));

        assert!(store.set_request_status(RecordId::new(), RequestStatus::Approved).is_err());
        Ok(())
    }

    // Test IDs: TDB-005
    #[test]
    fn artifacts_follow_links_between_documents() -> Result<()> {
        let mut store = open_migrated()?;
        let request = upsert::<PurchaseRequest, _>(&mut store, request_draft(12, "Сервер"))?.record;
        assert_eq!(store.request_artifacts(&request)?, RequestArtifacts::default());

        let purchase = upsert::<Purchase, _>(
            &mut store,
            PurchaseDraft {
                inner_id: "P-1".to_string(),
                fields: PurchaseFields {
                    purchase_request_id: Some(request.id),
                    ..PurchaseFields::default()
                },
            },
        )?
        .record;
        assert!(store.request_artifacts(&request)?.purchase_exists);
        assert!(!store.purchase_artifacts(&purchase)?.contract_exists);

        upsert::<Contract, _>(
            &mut store,
            ContractDraft {
                inner_id: "S-1".to_string(),
                fields: ContractFields {
                    kind: Some(ContractKind::Specification),
                    purchase_id: Some(purchase.id),
                    ..ContractFields::default()
                },
            },
        )?;
        assert_eq!(
            store.request_artifacts(&request)?,
            RequestArtifacts { specification_exists: true, purchase_exists: true }
        );
        assert!(store.purchase_artifacts(&purchase)?.contract_exists);
        Ok(())
    }

    // Test IDs: TDB-006
    #[test]
    fn approvals_are_keyed_by_document_stage_and_role() -> Result<()> {
        let mut store = open_migrated()?;
        let draft = |role: &str, completed: Option<time::PrimitiveDateTime>| ApprovalDraft {
            key: ApprovalKey {
                target: ApprovalTarget::PurchaseRequest,
                document_key: "12".to_string(),
                stage: "Утверждение заявки".to_string(),
                role: role.to_string(),
            },
            fields: ApprovalFields {
                assignment_date: Some(datetime!(2024-06-01 09:00:00)),
                completion_date: completed,
                ..ApprovalFields::default()
            },
        };

        upsert::<Approval, _>(&mut store, draft("Директор", None))?;
        upsert::<Approval, _>(&mut store, draft("Бухгалтер", None))?;
        let completed =
            upsert::<Approval, _>(&mut store, draft("Директор", Some(datetime!(2024-06-02 10:00:00))))?;
        assert_eq!(completed.outcome, UpsertOutcome::Updated);
        assert_eq!(completed.diff.fields(), &["completion_date"]);

        let approvals = store.approvals_for(ApprovalTarget::PurchaseRequest, "12")?;
        assert_eq!(approvals.len(), 2);
        assert!(store.approvals_for(ApprovalTarget::Purchase, "12")?.is_empty());
        Ok(())
    }

    // Test IDs: TDB-007
    #[test]
    fn plan_item_keys_are_case_insensitive_in_store() -> Result<()> {
        let mut store = open_migrated()?;
        let draft = |subject: &str| PlanItemDraft {
            subject: subject.to_string(),
            fields: PlanItemFields { plan_year: Some(2025), ..PlanItemFields::default() },
        };
        upsert::<PlanItem, _>(&mut store, draft("Поставка бумаги"))?;
        let second = upsert::<PlanItem, _>(&mut store, draft("ПОСТАВКА  бумаги"))?;
        assert_eq!(second.outcome, UpsertOutcome::Updated);
        assert_eq!(store.table_counts()?.plan_items, 1);
        Ok(())
    }

    // Test IDs: TDB-008
    #[test]
    fn integrity_check_reports_clean_database() -> Result<()> {
        let store = open_migrated()?;

        let report = store.integrity_check()?;
        assert!(report.quick_check_ok);
        assert!(report.foreign_key_violations.is_empty());
        assert_eq!(report.schema_status.current_version, 1);
        Ok(())
    }
}
