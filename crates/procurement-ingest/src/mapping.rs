//! Row-to-draft mappers. Each reads resolved columns only; a column the
//! resolver did not find leaves its field unset.

use procurement_core::{
    ApprovalDraft, ApprovalFields, ApprovalKey, ApprovalTarget, ContractDraft, ContractFields,
    ContractKind, PlanItemDraft, PlanItemFields, PreparerDraft, Purchase, PurchaseDraft,
    PurchaseFields, PurchaseRequest, RecordId, RequestDraft, RequestFields,
};
use procurement_store_sqlite::SqliteStore;
use time::PrimitiveDateTime;

use crate::cells::{parse_bool, parse_date, parse_decimal, parse_int, parse_text};
use crate::classify::extract_request_number;
use crate::columns::ColumnMap;
use crate::decoder::{Cell, Sheet};
use crate::fields;

/// Why a data row produced no draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RowSkip {
    #[error("missing or unparseable {0}")]
    MissingKey(&'static str),
    #[error("unknown document kind")]
    UnknownKind,
}

/// Natural-key lookups used to fill secondary links. A miss leaves the link unset.
pub trait LinkLookup {
    fn request_id(&self, request_number: i64) -> Option<RecordId>;
    fn purchase_id(&self, inner_id: &str) -> Option<RecordId>;
}

impl LinkLookup for SqliteStore {
    fn request_id(&self, request_number: i64) -> Option<RecordId> {
        self.find_id_by_key::<PurchaseRequest>(&request_number).unwrap_or_else(|err| {
            tracing::warn!("request link lookup failed for {}: {:#}", request_number, err);
            None
        })
    }

    fn purchase_id(&self, inner_id: &str) -> Option<RecordId> {
        self.find_id_by_key::<Purchase>(&inner_id.to_string()).unwrap_or_else(|err| {
            tracing::warn!("purchase link lookup failed for {}: {:#}", inner_id, err);
            None
        })
    }
}

/// One data row viewed through the sheet's column map.
#[derive(Debug, Clone, Copy)]
pub struct RowContext<'a> {
    sheet: &'a Sheet,
    row: usize,
    columns: &'a ColumnMap,
}

impl<'a> RowContext<'a> {
    #[must_use]
    pub fn new(sheet: &'a Sheet, row: usize, columns: &'a ColumnMap) -> Self {
        Self { sheet, row, columns }
    }

    #[must_use]
    pub fn row(&self) -> usize {
        self.row
    }

    #[must_use]
    pub fn cell(&self, field: &str) -> Option<&'a Cell> {
        self.columns.get(field).map(|column| self.sheet.cell(self.row, column.index))
    }

    #[must_use]
    pub fn text(&self, field: &str) -> Option<String> {
        self.cell(field).and_then(parse_text)
    }

    #[must_use]
    pub fn int(&self, field: &str) -> Option<i64> {
        self.cell(field).and_then(parse_int)
    }

    #[must_use]
    pub fn decimal(&self, field: &str) -> Option<f64> {
        self.cell(field).and_then(parse_decimal)
    }

    #[must_use]
    pub fn date(&self, field: &str) -> Option<PrimitiveDateTime> {
        self.cell(field).and_then(parse_date)
    }

    /// Boolean read under the polarity of the alias that matched the header.
    #[must_use]
    pub fn flag(&self, field: &str) -> Option<bool> {
        let column = self.columns.get(field)?;
        parse_bool(self.sheet.cell(self.row, column.index), column.polarity)
    }
}

/// # Errors
/// Returns [`RowSkip::MissingKey`] when the request number is absent or not an integer.
pub fn map_request(row: &RowContext<'_>) -> Result<RequestDraft, RowSkip> {
    let request_number = row.int(fields::NUMBER).ok_or(RowSkip::MissingKey(fields::NUMBER))?;
    Ok(RequestDraft {
        request_number,
        fields: RequestFields {
            inner_id: row.text(fields::INNER_ID),
            creation_date: row.date(fields::CREATION_DATE),
            name: row.text(fields::NAME),
            title: row.text(fields::TITLE),
            cfo: row.text(fields::CFO),
            customer: row.text(fields::CUSTOMER),
            budget_amount: row.decimal(fields::BUDGET_AMOUNT),
            currency: row.text(fields::CURRENCY),
            requires_purchase: row.flag(fields::REQUIRES_PURCHASE),
            is_planned: row.flag(fields::IS_PLANNED),
            prepared_by: row.text(fields::PREPARED_BY),
            state: row.text(fields::STATE),
        },
    })
}

fn linked_request(row: &RowContext<'_>, links: &impl LinkLookup) -> Option<RecordId> {
    let number = extract_request_number(row.cell(fields::REQUEST_REFERENCE)?)?;
    links.request_id(number)
}

/// # Errors
/// Returns [`RowSkip::MissingKey`] when the inner id is absent.
pub fn map_purchase(
    row: &RowContext<'_>,
    links: &impl LinkLookup,
) -> Result<PurchaseDraft, RowSkip> {
    let inner_id = row.text(fields::INNER_ID).ok_or(RowSkip::MissingKey(fields::INNER_ID))?;
    Ok(PurchaseDraft {
        inner_id,
        fields: PurchaseFields {
            purchase_number: row.text(fields::NUMBER),
            purchase_request_id: linked_request(row, links),
            creation_date: row.date(fields::CREATION_DATE),
            name: row.text(fields::NAME),
            title: row.text(fields::TITLE),
            cfo: row.text(fields::CFO),
            budget_amount: row.decimal(fields::BUDGET_AMOUNT),
            currency: row.text(fields::CURRENCY),
            purchase_method: row.text(fields::PURCHASE_METHOD),
            prepared_by: row.text(fields::PREPARED_BY),
            state: row.text(fields::STATE),
        },
    })
}

/// Contracts and specifications share one draft type, told apart by `kind`.
///
/// # Errors
/// Returns [`RowSkip::MissingKey`] when the inner id is absent.
pub fn map_contract(
    row: &RowContext<'_>,
    kind: ContractKind,
    links: &impl LinkLookup,
) -> Result<ContractDraft, RowSkip> {
    let inner_id = row.text(fields::INNER_ID).ok_or(RowSkip::MissingKey(fields::INNER_ID))?;
    let purchase_id = row
        .text(fields::PURCHASE_REFERENCE)
        .and_then(|reference| links.purchase_id(&reference));
    Ok(ContractDraft {
        inner_id,
        fields: ContractFields {
            kind: Some(kind),
            contract_number: row.text(fields::NUMBER),
            purchase_request_id: linked_request(row, links),
            purchase_id,
            creation_date: row.date(fields::CREATION_DATE),
            name: row.text(fields::NAME),
            title: row.text(fields::TITLE),
            cfo: row.text(fields::CFO),
            budget_amount: row.decimal(fields::BUDGET_AMOUNT),
            currency: row.text(fields::CURRENCY),
            supplier: row.text(fields::SUPPLIER),
            prepared_by: row.text(fields::PREPARED_BY),
            state: row.text(fields::STATE),
        },
    })
}

/// The person named in the prepared-by column, collected from every row.
#[must_use]
pub fn map_preparer(row: &RowContext<'_>) -> Option<PreparerDraft> {
    row.text(fields::PREPARED_BY).map(|full_name| PreparerDraft { full_name })
}

/// Approval rows key on the document they belong to. Request reports may
/// carry the number inside reference text, so both forms are accepted.
///
/// # Errors
/// Returns [`RowSkip::MissingKey`] when the document key or the stage is absent.
pub fn map_approval(row: &RowContext<'_>, target: ApprovalTarget) -> Result<ApprovalDraft, RowSkip> {
    let document_key = match target {
        ApprovalTarget::PurchaseRequest => row
            .cell(fields::DOCUMENT_NUMBER)
            .and_then(extract_request_number)
            .map(|number| number.to_string()),
        ApprovalTarget::Purchase => row.text(fields::DOCUMENT_NUMBER),
    }
    .ok_or(RowSkip::MissingKey(fields::DOCUMENT_NUMBER))?;
    let stage = row.text(fields::STAGE).ok_or(RowSkip::MissingKey(fields::STAGE))?;

    Ok(ApprovalDraft {
        key: ApprovalKey {
            target,
            document_key,
            stage,
            role: row.text(fields::ROLE).unwrap_or_default(),
        },
        fields: ApprovalFields {
            assignee: row.text(fields::ASSIGNEE),
            assignment_date: row.date(fields::ASSIGNMENT_DATE),
            completion_date: row.date(fields::COMPLETION_DATE),
            completion_result: row.text(fields::COMPLETION_RESULT),
            days_in_work: row.int(fields::DAYS_IN_WORK),
        },
    })
}

/// # Errors
/// Returns [`RowSkip::MissingKey`] when the purchase subject is absent.
pub fn map_plan_item(row: &RowContext<'_>) -> Result<PlanItemDraft, RowSkip> {
    let subject = row.text(fields::SUBJECT).ok_or(RowSkip::MissingKey(fields::SUBJECT))?;
    Ok(PlanItemDraft {
        subject,
        fields: PlanItemFields {
            plan_year: row.int(fields::PLAN_YEAR),
            cfo: row.text(fields::CFO),
            company: row.text(fields::COMPANY),
            planned_amount: row.decimal(fields::PLANNED_AMOUNT),
            currency: row.text(fields::CURRENCY),
            planned_date: row.date(fields::PLANNED_DATE),
            purchase_method: row.text(fields::PURCHASE_METHOD),
            is_planned: row.flag(fields::IS_PLANNED),
        },
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use time::macros::datetime;

    use super::*;
    use crate::columns::ColumnMap;

    struct FixedLinks {
        requests: BTreeMap<i64, RecordId>,
        purchases: BTreeMap<String, RecordId>,
    }

    impl LinkLookup for FixedLinks {
        fn request_id(&self, request_number: i64) -> Option<RecordId> {
            self.requests.get(&request_number).copied()
        }

        fn purchase_id(&self, inner_id: &str) -> Option<RecordId> {
            self.purchases.get(inner_id).copied()
        }
    }

    fn sheet(rows: &[&[&str]]) -> Sheet {
        Sheet {
            name: "Документы".to_string(),
            rows: rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|value| {
                            if value.is_empty() {
                                Cell::Blank
                            } else {
                                Cell::Text((*value).to_string())
                            }
                        })
                        .collect()
                })
                .collect(),
        }
    }

    #[test]
    fn request_rows_map_typed_fields_and_inverted_flags() -> anyhow::Result<()> {
        let sheet = sheet(&[
            &["Вид документа", "Номер", "Дата создания", "Сумма бюджета", "Not required for purchase"],
            &["Заявка на закупку", "1024", "01.03.2024 10:00", "1 500,50", "yes"],
            &["Заявка на закупку", "1025", "", "", ""],
            &["Заявка на закупку", "б/н", "", "", ""],
        ]);
        let columns = ColumnMap::build(&sheet.header_texts(0), fields::DOCUMENTS);

        let first = map_request(&RowContext::new(&sheet, 1, &columns))?;
        assert_eq!(first.request_number, 1024);
        assert_eq!(first.fields.creation_date, Some(datetime!(2024-03-01 10:00)));
        assert_eq!(first.fields.budget_amount, Some(1500.5));
        assert_eq!(first.fields.requires_purchase, Some(false));
        assert_eq!(first.fields.is_planned, None);
        assert_eq!(first.fields.cfo, None);

        let second = map_request(&RowContext::new(&sheet, 2, &columns))?;
        assert_eq!(second.fields.requires_purchase, Some(true));

        assert_eq!(
            map_request(&RowContext::new(&sheet, 3, &columns)).map(|draft| draft.request_number),
            Err(RowSkip::MissingKey(fields::NUMBER))
        );
        Ok(())
    }

    #[test]
    fn decorated_flag_header_reads_values_as_written() -> anyhow::Result<()> {
        let sheet = sheet(&[
            &["Вид документа", "Номер", "Требуется закупка (да/нет)"],
            &["Заявка на закупку", "1", "Да"],
            &["Заявка на закупку", "2", "Нет"],
        ]);
        let columns = ColumnMap::build(&sheet.header_texts(0), fields::DOCUMENTS);

        let first = map_request(&RowContext::new(&sheet, 1, &columns))?;
        assert_eq!(first.fields.requires_purchase, Some(true));
        let second = map_request(&RowContext::new(&sheet, 2, &columns))?;
        assert_eq!(second.fields.requires_purchase, Some(false));
        Ok(())
    }

    #[test]
    fn contract_rows_resolve_links_by_natural_key() -> anyhow::Result<()> {
        let request_id = RecordId::new();
        let purchase_id = RecordId::new();
        let links = FixedLinks {
            requests: BTreeMap::from([(1024, request_id)]),
            purchases: BTreeMap::from([("P-7".to_string(), purchase_id)]),
        };
        let sheet = sheet(&[
            &["Вид документа", "Внутренний номер", "Основание", "Закупочная процедура", "Контрагент"],
            &["Договор", "C-1", "Заявка на закупку № 1024 от 01.03.2024", "P-7", "ООО Ромашка"],
            &["Спецификация", "C-2", "Заявка на закупку № 9999", "P-404", ""],
            &["Договор", "", "", "", ""],
        ]);
        let columns = ColumnMap::build(&sheet.header_texts(0), fields::DOCUMENTS);

        let linked =
            map_contract(&RowContext::new(&sheet, 1, &columns), ContractKind::Contract, &links)?;
        assert_eq!(linked.fields.purchase_request_id, Some(request_id));
        assert_eq!(linked.fields.purchase_id, Some(purchase_id));
        assert_eq!(linked.fields.supplier.as_deref(), Some("ООО Ромашка"));

        let unresolved =
            map_contract(&RowContext::new(&sheet, 2, &columns), ContractKind::Specification, &links)?;
        assert_eq!(unresolved.fields.kind, Some(ContractKind::Specification));
        assert_eq!(unresolved.fields.purchase_request_id, None);
        assert_eq!(unresolved.fields.purchase_id, None);

        assert_eq!(
            map_contract(&RowContext::new(&sheet, 3, &columns), ContractKind::Contract, &links)
                .map(|draft| draft.inner_id),
            Err(RowSkip::MissingKey(fields::INNER_ID))
        );
        Ok(())
    }

    #[test]
    fn approval_rows_key_on_document_and_default_missing_role() -> anyhow::Result<()> {
        let sheet = sheet(&[
            &["Номер заявки", "Этап", "Исполнитель", "Дата назначения", "Дата выполнения", "Результат"],
            &["Заявка на закупку № 1024", "Утверждение", "Иванова А.", "02.03.2024", "", ""],
            &["1024", "", "Петров Б.", "", "", ""],
        ]);
        let columns = ColumnMap::build(&sheet.header_texts(0), fields::REQUEST_APPROVALS);

        let draft =
            map_approval(&RowContext::new(&sheet, 1, &columns), ApprovalTarget::PurchaseRequest)?;
        assert_eq!(
            draft.key,
            ApprovalKey {
                target: ApprovalTarget::PurchaseRequest,
                document_key: "1024".to_string(),
                stage: "Утверждение".to_string(),
                role: String::new(),
            }
        );
        assert_eq!(draft.fields.assignee.as_deref(), Some("Иванова А."));
        assert_eq!(draft.fields.assignment_date, Some(datetime!(2024-03-02 0:00)));
        assert_eq!(draft.fields.completion_date, None);

        assert_eq!(
            map_approval(&RowContext::new(&sheet, 2, &columns), ApprovalTarget::PurchaseRequest)
                .map(|draft| draft.key),
            Err(RowSkip::MissingKey(fields::STAGE))
        );
        Ok(())
    }

    #[test]
    fn preparers_and_plan_items_read_their_own_columns() -> anyhow::Result<()> {
        let sheet = sheet(&[
            &["Предмет закупки", "Год", "Плановая сумма", "Внеплановая", "Подготовил"],
            &["  Канцелярские   товары ", "2024", "120000", "", "Сидорова В."],
        ]);
        let plan_columns = ColumnMap::build(&sheet.header_texts(0), fields::PLAN_ITEMS);
        let item = map_plan_item(&RowContext::new(&sheet, 1, &plan_columns))?;
        assert_eq!(item.subject_key(), "канцелярские товары");
        assert_eq!(item.fields.plan_year, Some(2024));
        assert_eq!(item.fields.planned_amount, Some(120_000.0));
        assert_eq!(item.fields.is_planned, Some(true));

        let document_columns = ColumnMap::build(&sheet.header_texts(0), fields::DOCUMENTS);
        assert_eq!(
            map_preparer(&RowContext::new(&sheet, 1, &document_columns)),
            Some(PreparerDraft { full_name: "Сидорова В.".to_string() })
        );
        Ok(())
    }
}
