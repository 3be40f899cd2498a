//! Per-file ingestion and batch ordering.
//!
//! A file is decoded, its header located, and every data row mapped and
//! reconciled on its own. Row failures are counted and logged; file failures
//! are recorded in the report and the ingest-run log. Nothing aborts a batch.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use procurement_core::{
    upsert, Approval, ApprovalTarget, Contract, ContractKind, DocumentKind, EntityKind, PlanItem,
    Preparer, Purchase, PurchaseRequest, UpsertOutcome,
};
use procurement_store_sqlite::{IngestRunOutcome, NewIngestRun, SqliteStore, StoredEntity};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::classify::{classify, is_blank_row};
use crate::columns::{locate_header, ColumnMap, FieldSpec};
use crate::decoder::{open_sheet, Sheet};
use crate::error::IngestError;
use crate::fields;
use crate::mapping::{
    map_approval, map_contract, map_plan_item, map_preparer, map_purchase, map_request,
    RowContext, RowSkip,
};
use crate::status_pass::{recompute_statuses, StatusPassReport};

/// Source families, declared in the order a batch processes them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Documents,
    RequestApprovals,
    PurchaseApprovals,
    PlanItems,
}

impl SourceKind {
    pub const ALL: [Self; 4] =
        [Self::Documents, Self::RequestApprovals, Self::PurchaseApprovals, Self::PlanItems];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Documents => "documents",
            Self::RequestApprovals => "request_approvals",
            Self::PurchaseApprovals => "purchase_approvals",
            Self::PlanItems => "plan_items",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value.trim())
    }

    #[must_use]
    pub fn catalog(self) -> &'static [FieldSpec] {
        match self {
            Self::Documents => fields::DOCUMENTS,
            Self::RequestApprovals => fields::REQUEST_APPROVALS,
            Self::PurchaseApprovals => fields::PURCHASE_APPROVALS,
            Self::PlanItems => fields::PLAN_ITEMS,
        }
    }

    /// Fields without which no row of the sheet can produce a record.
    #[must_use]
    pub fn mandatory(self) -> &'static [&'static str] {
        match self {
            Self::Documents => &[fields::DOCUMENT_KIND],
            Self::RequestApprovals | Self::PurchaseApprovals => {
                &[fields::DOCUMENT_NUMBER, fields::STAGE]
            }
            Self::PlanItems => &[fields::SUBJECT],
        }
    }
}

impl Display for SourceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One already-located input file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceFile {
    pub kind: SourceKind,
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,
}

impl FromStr for SourceFile {
    type Err = IngestError;

    /// `kind=path`, as given on the command line.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (kind, path) = raw
            .split_once('=')
            .ok_or_else(|| IngestError::InvalidSource(format!("expected kind=path, got {raw}")))?;
        let kind = SourceKind::parse(kind)
            .ok_or_else(|| IngestError::InvalidSource(format!("unknown source kind: {kind}")))?;
        let path = path.trim();
        if path.is_empty() {
            return Err(IngestError::InvalidSource(format!("missing path in {raw}")));
        }
        Ok(Self { kind, path: PathBuf::from(path), sheet: None })
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntityCounts {
    pub created: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub skipped: u64,
    pub errors: u64,
}

impl EntityCounts {
    pub fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Created => self.created += 1,
            UpsertOutcome::Updated => self.updated += 1,
            UpsertOutcome::Unchanged => self.unchanged += 1,
        }
    }

    pub fn absorb(&mut self, other: &Self) {
        self.created += other.created;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
        self.skipped += other.skipped;
        self.errors += other.errors;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileReport {
    pub kind: SourceKind,
    pub path: String,
    pub sheet: Option<String>,
    pub header_row: Option<usize>,
    pub sha256: Option<String>,
    pub counts: BTreeMap<EntityKind, EntityCounts>,
    /// Documents rows whose discriminator matched no known kind.
    pub unclassified_rows: u64,
    pub error: Option<String>,
}

impl FileReport {
    fn new(source: &SourceFile) -> Self {
        Self {
            kind: source.kind,
            path: source.path.display().to_string(),
            sheet: None,
            header_row: None,
            sha256: None,
            counts: BTreeMap::new(),
            unclassified_rows: 0,
            error: None,
        }
    }

    fn entity(&mut self, kind: EntityKind) -> &mut EntityCounts {
        self.counts.entry(kind).or_default()
    }

    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BatchReport {
    pub files: Vec<FileReport>,
    pub totals: BTreeMap<EntityKind, EntityCounts>,
    pub failed_files: u64,
    pub statuses: Option<StatusPassReport>,
    pub status_error: Option<String>,
}

/// Ingest every source in declared kind order, then optionally recompute statuses.
///
/// Sources of the same kind keep their input order.
pub fn run_batch(store: &mut SqliteStore, sources: &[SourceFile], recompute: bool) -> BatchReport {
    let mut ordered: Vec<&SourceFile> = sources.iter().collect();
    ordered.sort_by_key(|source| source.kind);

    let mut report = BatchReport::default();
    for source in ordered {
        let file = ingest_file(store, source);
        if !file.succeeded() {
            report.failed_files += 1;
        }
        for (kind, counts) in &file.counts {
            report.totals.entry(*kind).or_default().absorb(counts);
        }
        report.files.push(file);
    }

    if recompute {
        match recompute_statuses(store) {
            Ok(statuses) => report.statuses = Some(statuses),
            Err(err) => {
                tracing::warn!("status recomputation failed: {}", err);
                report.status_error = Some(err.to_string());
            }
        }
    }

    tracing::info!(
        "batch finished: {} files, {} failed",
        report.files.len(),
        report.failed_files
    );
    report
}

/// Ingest one file and record the attempt in the ingest-run log.
///
/// Failures are reported in the returned [`FileReport`], never propagated.
pub fn ingest_file(store: &mut SqliteStore, source: &SourceFile) -> FileReport {
    let started_at = timestamp();
    let mut report = FileReport::new(source);

    let outcome = file_sha256(&source.path).and_then(|sha256| {
        report.sha256 = Some(sha256);
        process_file(store, source, &mut report)
    });
    if let Err(err) = outcome {
        tracing::warn!("failed to ingest {}: {}", source.path.display(), err);
        report.error = Some(err.to_string());
    }

    let run = NewIngestRun {
        source_path: report.path.clone(),
        source_kind: source.kind.as_str().to_string(),
        sha256: report.sha256.clone(),
        started_at,
        finished_at: timestamp(),
        outcome: if report.succeeded() {
            IngestRunOutcome::Completed
        } else {
            IngestRunOutcome::Failed
        },
        error: report.error.clone(),
        counts: serde_json::to_value(&report.counts).unwrap_or_default(),
    };
    if let Err(err) = store.record_ingest_run(&run) {
        tracing::warn!("failed to record ingest run for {}: {:#}", report.path, err);
    }

    for (kind, counts) in &report.counts {
        tracing::info!(
            "{} [{}] {}: created={} updated={} unchanged={} skipped={} errors={}",
            report.path,
            source.kind,
            kind.as_str(),
            counts.created,
            counts.updated,
            counts.unchanged,
            counts.skipped,
            counts.errors
        );
    }
    report
}

fn timestamp() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default()
}

fn file_sha256(path: &Path) -> Result<String, IngestError> {
    let io_error = |source| IngestError::Io { path: path.to_path_buf(), source };
    let mut file = File::open(path).map_err(io_error)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0_u8; 64 * 1024];
    loop {
        let read = file.read(&mut buffer).map_err(io_error)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

fn process_file(
    store: &mut SqliteStore,
    source: &SourceFile,
    report: &mut FileReport,
) -> Result<(), IngestError> {
    let sheet = open_sheet(&source.path, source.sheet.as_deref())?;
    report.sheet = Some(sheet.name.clone());

    let (header_row, columns) =
        locate_header(sheet.rows.len(), |row| sheet.header_texts(row), source.kind.catalog());
    if let Some(missing) = source.kind.mandatory().iter().find(|field| !columns.contains(field)) {
        return Err(IngestError::HeaderNotFound(format!(
            "no {missing} column in {} [{}]",
            source.path.display(),
            sheet.name
        )));
    }
    report.header_row = Some(header_row);

    let data_rows: Vec<usize> = (header_row + 1..sheet.rows.len())
        .filter(|row| !is_blank_row(&sheet.rows[*row]))
        .collect();

    match source.kind {
        SourceKind::Documents => ingest_documents(store, &sheet, &columns, &data_rows, report),
        SourceKind::RequestApprovals => {
            ingest_approvals(store, &sheet, &columns, &data_rows, ApprovalTarget::PurchaseRequest, report);
        }
        SourceKind::PurchaseApprovals => {
            ingest_approvals(store, &sheet, &columns, &data_rows, ApprovalTarget::Purchase, report);
        }
        SourceKind::PlanItems => {
            for &row in &data_rows {
                let context = RowContext::new(&sheet, row, &columns);
                apply::<PlanItem>(store, report, row, map_plan_item(&context));
            }
        }
    }
    Ok(())
}

/// Documents rows are reconciled kind by kind (requests, purchases, then
/// contracts and specifications) so links to rows of the same file resolve.
fn ingest_documents(
    store: &mut SqliteStore,
    sheet: &Sheet,
    columns: &ColumnMap,
    data_rows: &[usize],
    report: &mut FileReport,
) {
    let mut by_kind: BTreeMap<DocumentKind, Vec<usize>> = BTreeMap::new();
    for &row in data_rows {
        let context = RowContext::new(sheet, row, columns);
        if let Some(preparer) = map_preparer(&context) {
            apply::<Preparer>(store, report, row, Ok(preparer));
        }
        let discriminator = context.cell(fields::DOCUMENT_KIND);
        match discriminator.and_then(classify) {
            Some(kind) => by_kind.entry(kind).or_default().push(row),
            None => {
                tracing::debug!("row {} skipped: {}", row + 1, RowSkip::UnknownKind);
                report.unclassified_rows += 1;
            }
        }
    }

    for &row in rows_of(&by_kind, DocumentKind::PurchaseRequest) {
        let context = RowContext::new(sheet, row, columns);
        apply::<PurchaseRequest>(store, report, row, map_request(&context));
    }
    for &row in rows_of(&by_kind, DocumentKind::Purchase) {
        let context = RowContext::new(sheet, row, columns);
        let draft = map_purchase(&context, &*store);
        apply::<Purchase>(store, report, row, draft);
    }

    let mut contract_rows: Vec<(usize, ContractKind)> = rows_of(&by_kind, DocumentKind::Contract)
        .iter()
        .map(|row| (*row, ContractKind::Contract))
        .chain(
            rows_of(&by_kind, DocumentKind::Specification)
                .iter()
                .map(|row| (*row, ContractKind::Specification)),
        )
        .collect();
    contract_rows.sort_unstable_by_key(|(row, _)| *row);
    for (row, kind) in contract_rows {
        let context = RowContext::new(sheet, row, columns);
        let draft = map_contract(&context, kind, &*store);
        apply::<Contract>(store, report, row, draft);
    }
}

fn rows_of(by_kind: &BTreeMap<DocumentKind, Vec<usize>>, kind: DocumentKind) -> &[usize] {
    by_kind.get(&kind).map(Vec::as_slice).unwrap_or_default()
}

fn ingest_approvals(
    store: &mut SqliteStore,
    sheet: &Sheet,
    columns: &ColumnMap,
    data_rows: &[usize],
    target: ApprovalTarget,
    report: &mut FileReport,
) {
    for &row in data_rows {
        let context = RowContext::new(sheet, row, columns);
        apply::<Approval>(store, report, row, map_approval(&context, target));
    }
}

/// Reconcile one mapped row and tally the outcome under its entity kind.
fn apply<E: StoredEntity>(
    store: &mut SqliteStore,
    report: &mut FileReport,
    row: usize,
    mapped: Result<E::Draft, RowSkip>,
) {
    let counts = report.entity(E::KIND);
    let draft = match mapped {
        Ok(draft) => draft,
        Err(skip) => {
            tracing::warn!("row {} skipped for {}: {}", row + 1, E::KIND.as_str(), skip);
            counts.skipped += 1;
            return;
        }
    };
    match upsert::<E, SqliteStore>(store, draft) {
        Ok(reconciled) => counts.record(reconciled.outcome),
        Err(err) => {
            tracing::warn!("row {} failed for {}: {}", row + 1, E::KIND.as_str(), err);
            counts.errors += 1;
        }
    }
}
