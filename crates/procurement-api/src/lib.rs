use std::path::PathBuf;

use anyhow::Result;
use procurement_core::{
    Approval, ApprovalTarget, ContractDraft, EntityKind, KernelError, PlanItemDraft, Purchase,
    PurchaseDraft, PurchaseRequest, RecordId, RequestDraft, UpsertOutcome,
};
use procurement_ingest::{run_batch, BatchReport, IngestManifest, StatusPassReport};
use procurement_store_sqlite::{
    IngestRun, IntegrityReport, Page, PageRequest, RecordFilter, SchemaStatus, SqliteStore,
    StoredEntity, TableCounts,
};
use serde::{Deserialize, Serialize};

pub const API_CONTRACT_VERSION: &str = "api.v1";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MigrateResult {
    pub dry_run: bool,
    pub current_version: i64,
    pub target_version: i64,
    pub would_apply_versions: Vec<i64>,
    pub after_version: Option<i64>,
    pub up_to_date: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DatabaseCheck {
    pub integrity: IntegrityReport,
    pub counts: TableCounts,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpsertResult<E> {
    pub outcome: UpsertOutcome,
    pub changed_fields: Vec<&'static str>,
    pub record: E,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeleteResult {
    pub kind: EntityKind,
    pub id: RecordId,
}

/// Draft checks applied before a write from outside the ingestion pipeline.
pub trait DraftValidation {
    /// # Errors
    /// Returns [`KernelError::Validation`] when the natural key is unusable.
    fn validate(&self) -> Result<(), KernelError>;
}

impl DraftValidation for RequestDraft {
    fn validate(&self) -> Result<(), KernelError> {
        if self.request_number <= 0 {
            return Err(KernelError::Validation(format!(
                "request_number must be positive, got {}",
                self.request_number
            )));
        }
        Ok(())
    }
}

impl DraftValidation for PurchaseDraft {
    fn validate(&self) -> Result<(), KernelError> {
        require_text("inner_id", &self.inner_id)
    }
}

impl DraftValidation for ContractDraft {
    fn validate(&self) -> Result<(), KernelError> {
        require_text("inner_id", &self.inner_id)
    }
}

impl DraftValidation for PlanItemDraft {
    fn validate(&self) -> Result<(), KernelError> {
        require_text("subject", &self.subject)
    }
}

fn require_text(field: &str, value: &str) -> Result<(), KernelError> {
    if value.trim().is_empty() {
        return Err(KernelError::Validation(format!("{field} must not be blank")));
    }
    Ok(())
}

/// Documents whose workflow approvals are imported from the approval reports.
pub trait ApprovalDocument: StoredEntity {
    fn approval_key(&self) -> (ApprovalTarget, String);
}

impl ApprovalDocument for PurchaseRequest {
    fn approval_key(&self) -> (ApprovalTarget, String) {
        (ApprovalTarget::PurchaseRequest, self.request_number.to_string())
    }
}

impl ApprovalDocument for Purchase {
    fn approval_key(&self) -> (ApprovalTarget, String) {
        (ApprovalTarget::Purchase, self.inner_id.clone())
    }
}

/// Facade shared by the `procure` CLI and the HTTP service.
///
/// Every call opens its own store; write paths migrate first.
#[derive(Debug, Clone)]
pub struct ProcurementApi {
    db_path: PathBuf,
}

impl ProcurementApi {
    #[must_use]
    pub fn new(db_path: PathBuf) -> Self {
        Self { db_path }
    }

    fn open_store(&self) -> Result<SqliteStore> {
        SqliteStore::open(&self.db_path)
    }

    fn ready_store(&self) -> Result<SqliteStore> {
        let mut store = self.open_store()?;
        store.migrate()?;
        Ok(store)
    }

    /// Inspect schema status without mutating data.
    ///
    /// # Errors
    /// Returns an error when the `SQLite` database cannot be opened or queried.
    pub fn schema_status(&self) -> Result<SchemaStatus> {
        let store = self.open_store()?;
        store.schema_status()
    }

    /// Apply pending migrations, or return planned versions for dry-run mode.
    ///
    /// # Errors
    /// Returns an error when migration planning or execution fails.
    pub fn migrate(&self, dry_run: bool) -> Result<MigrateResult> {
        let mut store = self.open_store()?;
        let before = store.schema_status()?;
        if dry_run {
            return Ok(MigrateResult {
                dry_run: true,
                current_version: before.current_version,
                target_version: before.target_version,
                would_apply_versions: before.pending_versions,
                after_version: None,
                up_to_date: None,
            });
        }

        let planned_versions = before.pending_versions;
        store.migrate()?;
        let after = store.schema_status()?;
        Ok(MigrateResult {
            dry_run: false,
            current_version: before.current_version,
            target_version: before.target_version,
            would_apply_versions: planned_versions,
            after_version: Some(after.current_version),
            up_to_date: Some(after.pending_versions.is_empty()),
        })
    }

    /// Counts stay zero until the schema is current.
    ///
    /// # Errors
    /// Returns an error when the integrity pragmas or the row counts fail.
    pub fn integrity_check(&self) -> Result<DatabaseCheck> {
        let store = self.open_store()?;
        let integrity = store.integrity_check()?;
        let counts = if integrity.schema_status.pending_versions.is_empty() {
            store.table_counts()?
        } else {
            TableCounts::default()
        };
        Ok(DatabaseCheck { integrity, counts })
    }

    /// # Errors
    /// Returns an error when the store cannot be opened or counted.
    pub fn table_counts(&self) -> Result<TableCounts> {
        self.ready_store()?.table_counts()
    }

    /// Run one ingestion batch. Per-file failures are reported, not returned.
    ///
    /// # Errors
    /// Returns an error only when the store cannot be opened or migrated.
    pub fn ingest(&self, manifest: &IngestManifest) -> Result<BatchReport> {
        let mut store = self.ready_store()?;
        tracing::info!(
            "ingest batch: {} sources, recompute_statuses={}",
            manifest.sources.len(),
            manifest.recompute_statuses
        );
        Ok(run_batch(&mut store, &manifest.sources, manifest.recompute_statuses))
    }

    /// # Errors
    /// Returns an error when the store cannot be opened or a listing fails.
    pub fn recompute_statuses(&self) -> Result<StatusPassReport> {
        let mut store = self.ready_store()?;
        Ok(procurement_ingest::recompute_statuses(&mut store)?)
    }

    /// # Errors
    /// Returns an error when the query fails.
    pub fn list<E: StoredEntity>(
        &self,
        filter: &RecordFilter,
        page: PageRequest,
    ) -> Result<Page<E>> {
        self.ready_store()?.list::<E>(filter, page)
    }

    /// # Errors
    /// Returns [`KernelError::NotFound`] when no record carries `id`.
    pub fn get<E: StoredEntity>(&self, id: RecordId) -> Result<E> {
        self.ready_store()?.get::<E>(id)?.ok_or_else(|| not_found(E::KIND, &id.to_string()))
    }

    /// # Errors
    /// Returns [`KernelError::NotFound`] when no request carries `number`.
    pub fn request_by_number(&self, number: i64) -> Result<PurchaseRequest> {
        self.ready_store()?
            .find_by_natural_key::<PurchaseRequest>(&number)?
            .ok_or_else(|| not_found(EntityKind::PurchaseRequest, &number.to_string()))
    }

    /// Create or merge one record by natural key, like an ingested row.
    ///
    /// # Errors
    /// Returns [`KernelError::Validation`] for an unusable draft, or a store error.
    pub fn upsert<E>(&self, draft: E::Draft) -> Result<UpsertResult<E>>
    where
        E: StoredEntity,
        E::Draft: DraftValidation,
    {
        draft.validate()?;
        let mut store = self.ready_store()?;
        let reconciled = procurement_core::upsert::<E, _>(&mut store, draft)?;
        Ok(UpsertResult {
            outcome: reconciled.outcome,
            changed_fields: reconciled.diff.fields().to_vec(),
            record: reconciled.record,
        })
    }

    /// # Errors
    /// Returns [`KernelError::NotFound`] when no record carries `id`.
    pub fn delete<E: StoredEntity>(&self, id: RecordId) -> Result<DeleteResult> {
        let mut store = self.ready_store()?;
        if !store.delete::<E>(id)? {
            return Err(not_found(E::KIND, &id.to_string()));
        }
        tracing::info!("deleted {} {}", E::KIND.as_str(), id);
        Ok(DeleteResult { kind: E::KIND, id })
    }

    /// Approval records of one document, in stage order.
    ///
    /// # Errors
    /// Returns [`KernelError::NotFound`] when no document carries `id`.
    pub fn approvals<E: ApprovalDocument>(&self, id: RecordId) -> Result<Vec<Approval>> {
        let store = self.ready_store()?;
        let document =
            store.get::<E>(id)?.ok_or_else(|| not_found(E::KIND, &id.to_string()))?;
        let (target, document_key) = document.approval_key();
        store.approvals_for(target, &document_key)
    }

    /// Most recent ingest runs first.
    ///
    /// # Errors
    /// Returns an error when the run log cannot be read.
    pub fn ingest_runs(&self, limit: u32) -> Result<Vec<IngestRun>> {
        self.ready_store()?.list_ingest_runs(limit)
    }
}

fn not_found(kind: EntityKind, key: &str) -> anyhow::Error {
    anyhow::Error::new(KernelError::NotFound(format!("{} {key}", kind.as_str())))
}

/// The [`KernelError`] carried by `err`, if any.
#[must_use]
pub fn kernel_error(err: &anyhow::Error) -> Option<&KernelError> {
    err.downcast_ref::<KernelError>()
}
