//! Spreadsheet ingestion for the procurement kernel: decoding, column
//! resolution, typed cell parsing, row mapping, batch ordering and the
//! status recomputation pass.

pub mod cells;
pub mod classify;
pub mod columns;
pub mod decoder;
mod error;
pub mod fields;
mod manifest;
pub mod mapping;
mod pipeline;
mod status_pass;

#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;

pub use columns::{ColumnMap, MatchStrategy, Polarity, ResolvedColumn};
pub use decoder::{open_sheet, Cell, Sheet};
pub use error::IngestError;
pub use manifest::IngestManifest;
pub use pipeline::{
    ingest_file, run_batch, BatchReport, EntityCounts, FileReport, SourceFile, SourceKind,
};
pub use status_pass::{recompute_statuses, StatusCounts, StatusPassReport};

#[cfg(test)]
mod tests {
    use std::path::Path;

    use procurement_core::{
        Contract, ContractStatus, EntityKind, Purchase, PurchaseRequest, RequestStatus,
    };
    use procurement_store_sqlite::{IngestRunOutcome, SqliteStore};

    use super::*;
    use crate::fixtures::{text_rows, write_xlsx, FixtureCell};

    const DOCUMENT_HEADER: &[&str] = &[
        "Вид документа",
        "Внутренний номер",
        "Номер",
        "Дата создания",
        "Сумма бюджета",
        "Not required for purchase",
        "Подготовил",
        "Состояние",
        "Основание",
        "Закупочная процедура",
    ];

    fn store() -> anyhow::Result<SqliteStore> {
        let mut store = SqliteStore::open(Path::new(":memory:"))?;
        store.migrate()?;
        Ok(store)
    }

    fn documents(path: &Path) -> anyhow::Result<()> {
        write_xlsx(
            path,
            "Документы",
            &text_rows(&[
                &["Выгрузка документов"],
                DOCUMENT_HEADER,
                &["Договор", "C-1", "Д-15", "05.03.2024", "", "", "Петров Б.", "Согласование договора - Этап 1: На согласовании", "Заявка на закупку № 1024", "P-7"],
                &["Заявка на закупку", "R-1024", "1024", "01.03.2024 10:00", "1 500,50", "yes", "Иванова А.", "", "", ""],
                &["", "", "", "", "", "", "", "", "", ""],
                &["Закупочная процедура", "P-7", "ЗП-7", "03.03.2024", "", "", "Иванова А.", "", "Заявка на закупку № 1024", ""],
                &["Служебная записка", "X-1", "", "", "", "", "Сидорова В.", "", "", ""],
                &["Заявка на закупку", "R-X", "б/н", "", "", "", "", "", "", ""],
            ]),
        )
    }

    fn request_approvals(path: &Path) -> anyhow::Result<()> {
        write_xlsx(
            path,
            "Отчет",
            &[
                vec![
                    FixtureCell::text("Номер заявки"),
                    FixtureCell::text("Этап"),
                    FixtureCell::text("Исполнитель"),
                    FixtureCell::text("Дата назначения"),
                    FixtureCell::text("Дата выполнения"),
                ],
                vec![
                    FixtureCell::Number(1024.0),
                    FixtureCell::text("Утверждение заявки"),
                    FixtureCell::text("Иванова А."),
                    FixtureCell::Number(45_353.375),
                    FixtureCell::Blank,
                ],
            ],
        )
    }

    #[test]
    fn documents_ingest_links_rows_and_is_idempotent() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("documents.xlsx");
        documents(&path)?;
        let mut store = store()?;
        let source = SourceFile { kind: SourceKind::Documents, path: path.clone(), sheet: None };

        let first = ingest_file(&mut store, &source);
        assert_eq!(first.error, None);
        assert_eq!(first.header_row, Some(1));
        assert_eq!(first.unclassified_rows, 1);
        let requests = first.counts[&EntityKind::PurchaseRequest];
        assert_eq!((requests.created, requests.skipped), (1, 1));
        assert_eq!(first.counts[&EntityKind::Purchase].created, 1);
        assert_eq!(first.counts[&EntityKind::Contract].created, 1);
        let preparers = first.counts[&EntityKind::Preparer];
        assert_eq!((preparers.created, preparers.unchanged), (3, 1));

        let request = store.find_by_natural_key::<PurchaseRequest>(&1024)?;
        let request_id = request.as_ref().map(|request| request.id);
        assert_eq!(request.as_ref().and_then(|r| r.fields.requires_purchase), Some(false));
        assert_eq!(request.and_then(|r| r.fields.budget_amount), Some(1500.5));
        let purchase = store.find_by_natural_key::<Purchase>(&"P-7".to_string())?;
        assert_eq!(purchase.as_ref().and_then(|p| p.fields.purchase_request_id), request_id);
        let contract = store.find_by_natural_key::<Contract>(&"C-1".to_string())?;
        assert_eq!(
            contract.map(|c| (c.fields.purchase_request_id, c.fields.purchase_id)),
            Some((request_id, purchase.map(|p| p.id)))
        );

        let second = ingest_file(&mut store, &source);
        for counts in second.counts.values() {
            assert_eq!((counts.created, counts.updated), (0, 0));
        }
        assert_eq!(second.sha256, first.sha256);

        let runs = store.list_ingest_runs(10)?;
        assert_eq!(runs.len(), 2);
        assert!(runs.iter().all(|run| run.run.outcome == IngestRunOutcome::Completed));
        Ok(())
    }

    #[test]
    fn batch_orders_sources_and_recomputes_statuses() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let documents_path = dir.path().join("documents.xlsx");
        let approvals_path = dir.path().join("approvals.xlsx");
        documents(&documents_path)?;
        request_approvals(&approvals_path)?;
        let mut store = store()?;

        let sources = vec![
            SourceFile {
                kind: SourceKind::RequestApprovals,
                path: approvals_path,
                sheet: Some("отчет".to_string()),
            },
            SourceFile { kind: SourceKind::Documents, path: documents_path, sheet: None },
            SourceFile {
                kind: SourceKind::PlanItems,
                path: dir.path().join("plan.csv"),
                sheet: None,
            },
        ];
        let report = run_batch(&mut store, &sources, true);

        let kinds: Vec<_> = report.files.iter().map(|file| file.kind).collect();
        assert_eq!(
            kinds,
            vec![SourceKind::Documents, SourceKind::RequestApprovals, SourceKind::PlanItems]
        );
        assert_eq!(report.failed_files, 1);
        assert!(report.files[2].error.as_deref().is_some_and(|err| err.contains("plan.csv")));
        assert_eq!(report.totals[&EntityKind::Approval].created, 1);

        let statuses = report.statuses.unwrap_or_default();
        assert_eq!(statuses.contracts.changed, 1);
        let request = store.find_by_natural_key::<PurchaseRequest>(&1024)?;
        assert_eq!(request.map(|r| r.status), Some(RequestStatus::PurchaseCreated));
        let contract = store.find_by_natural_key::<Contract>(&"C-1".to_string())?;
        assert_eq!(contract.map(|c| c.status), Some(ContractStatus::OnCoordination));
        Ok(())
    }

    #[test]
    fn sheets_without_mandatory_columns_fail_the_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("approvals.xlsx");
        write_xlsx(&path, "Отчет", &text_rows(&[&["Номер заявки", "Исполнитель"], &["1024", "Иванова А."]]))?;
        let mut store = store()?;

        let report = ingest_file(
            &mut store,
            &SourceFile { kind: SourceKind::RequestApprovals, path, sheet: None },
        );
        assert!(report.error.as_deref().is_some_and(|err| err.contains("stage")));
        let runs = store.list_ingest_runs(1)?;
        assert_eq!(runs.first().map(|run| run.run.outcome), Some(IngestRunOutcome::Failed));
        Ok(())
    }

    #[test]
    fn source_arguments_parse_kind_and_path() {
        let parsed: Result<SourceFile, _> = "purchase_approvals=/exports/p.xls".parse();
        assert_eq!(
            parsed.ok(),
            Some(SourceFile {
                kind: SourceKind::PurchaseApprovals,
                path: "/exports/p.xls".into(),
                sheet: None,
            })
        );
        assert!(matches!("invoices=a.xlsx".parse::<SourceFile>(), Err(IngestError::InvalidSource(_))));
        assert!(matches!("documents".parse::<SourceFile>(), Err(IngestError::InvalidSource(_))));
    }
}
