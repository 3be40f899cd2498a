use anyhow::{anyhow, Context, Result};
use procurement_core::{
    local_datetime, Approval, ApprovalFields, ApprovalKey, ApprovalTarget, Contract,
    ContractFields, ContractKind, ContractStatus, Entity, KernelError, PlanItem, PlanItemFields,
    Preparer, Purchase, PurchaseFields, PurchaseRequest, PurchaseStatus, RecordId, Repository,
    RequestFields, RequestStatus,
};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, OptionalExtension, Row};
use time::PrimitiveDateTime;

use crate::{now_rfc3339, SqliteStore};

/// Table mapping for an entity persisted by [`SqliteStore`].
///
/// `COLUMNS` lists every column written by both insert and update, natural
/// key included. `status` and the audit timestamps are handled separately so
/// an upsert can never overwrite a derived status.
pub trait StoredEntity: Entity {
    const TABLE: &'static str;
    const KEY_COLUMNS: &'static [&'static str];
    const COLUMNS: &'static [&'static str];
    const SEARCH_COLUMNS: &'static [&'static str];
    const ORDER_BY: &'static str;
    const HAS_STATUS: bool;

    fn id(&self) -> RecordId;

    fn key_values(key: &Self::Key) -> Vec<Value>;

    /// Values aligned with `COLUMNS`.
    ///
    /// # Errors
    /// Returns an error when a date cannot be rendered.
    fn column_values(&self) -> Result<Vec<Value>>;

    fn status_value(&self) -> Option<&'static str>;

    /// # Errors
    /// Returns an error when a stored value cannot be decoded.
    fn from_row(row: &Row<'_>) -> Result<Self>;
}

impl<E: StoredEntity> Repository<E> for SqliteStore {
    fn find_by_key(&self, key: &E::Key) -> Result<Option<E>, KernelError> {
        self.find_by_natural_key::<E>(key).map_err(store_error)
    }

    fn insert(&mut self, record: &E) -> Result<(), KernelError> {
        self.insert_record(record).map_err(store_error)
    }

    fn update(&mut self, record: &E) -> Result<(), KernelError> {
        self.update_record(record).map_err(store_error)
    }
}

fn store_error(err: anyhow::Error) -> KernelError {
    KernelError::Store(format!("{err:#}"))
}

impl SqliteStore {
    /// # Errors
    /// Returns an error when the lookup fails or the row cannot be decoded.
    pub fn find_by_natural_key<E: StoredEntity>(&self, key: &E::Key) -> Result<Option<E>> {
        let predicate = E::KEY_COLUMNS
            .iter()
            .enumerate()
            .map(|(index, column)| format!("{column} = ?{}", index + 1))
            .collect::<Vec<_>>()
            .join(" AND ");
        let sql = format!("SELECT * FROM {} WHERE {predicate}", E::TABLE);
        let mut stmt = self.conn.prepare(&sql).with_context(|| format!("failed to prepare {sql}"))?;
        let mut rows = stmt.query(params_from_iter(E::key_values(key)))?;
        match rows.next()? {
            Some(row) => Ok(Some(E::from_row(row)?)),
            None => Ok(None),
        }
    }

    /// Surrogate id of the record holding `key`, used to resolve links.
    ///
    /// # Errors
    /// Returns an error when the lookup fails.
    pub fn find_id_by_key<E: StoredEntity>(&self, key: &E::Key) -> Result<Option<RecordId>> {
        let predicate = E::KEY_COLUMNS
            .iter()
            .enumerate()
            .map(|(index, column)| format!("{column} = ?{}", index + 1))
            .collect::<Vec<_>>()
            .join(" AND ");
        let raw: Option<String> = self
            .conn
            .query_row(
                &format!("SELECT id FROM {} WHERE {predicate}", E::TABLE),
                params_from_iter(E::key_values(key)),
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("failed to look up {} id", E::TABLE))?;
        raw.map(|raw| parse_record_id(&raw)).transpose()
    }

    fn insert_record<E: StoredEntity>(&mut self, record: &E) -> Result<()> {
        let mut columns = vec!["id"];
        columns.extend_from_slice(E::COLUMNS);
        let mut values = vec![Value::Text(record.id().to_string())];
        values.extend(record.column_values()?);
        if let Some(status) = record.status_value() {
            columns.push("status");
            values.push(Value::Text(status.to_string()));
        }
        let now = now_rfc3339()?;
        columns.extend(["created_at", "updated_at"]);
        values.push(Value::Text(now.clone()));
        values.push(Value::Text(now));

        let placeholders =
            (1..=columns.len()).map(|index| format!("?{index}")).collect::<Vec<_>>().join(", ");
        let sql = format!(
            "INSERT INTO {}({}) VALUES ({placeholders})",
            E::TABLE,
            columns.join(", ")
        );

        let tx = self.conn.transaction().context("failed to start transaction")?;
        tx.execute(&sql, params_from_iter(values))
            .with_context(|| format!("failed to insert into {}", E::TABLE))?;
        tx.commit().context("failed to commit insert")?;
        Ok(())
    }

    fn update_record<E: StoredEntity>(&mut self, record: &E) -> Result<()> {
        let assignments = E::COLUMNS
            .iter()
            .enumerate()
            .map(|(index, column)| format!("{column} = ?{}", index + 2))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE {} SET {assignments}, updated_at = ?{} WHERE id = ?1",
            E::TABLE,
            E::COLUMNS.len() + 2
        );
        let mut values = vec![Value::Text(record.id().to_string())];
        values.extend(record.column_values()?);
        values.push(Value::Text(now_rfc3339()?));

        let tx = self.conn.transaction().context("failed to start transaction")?;
        let updated = tx
            .execute(&sql, params_from_iter(values))
            .with_context(|| format!("failed to update {}", E::TABLE))?;
        if updated == 0 {
            return Err(anyhow!("{} {} not found", E::TABLE, record.id()));
        }
        tx.commit().context("failed to commit update")?;
        Ok(())
    }
}

fn text(value: Option<&String>) -> Value {
    value.map_or(Value::Null, |value| Value::Text(value.clone()))
}

fn date(value: Option<PrimitiveDateTime>) -> Result<Value> {
    value
        .map(|value| {
            local_datetime::format(value)
                .map(Value::Text)
                .context("failed to format local timestamp")
        })
        .transpose()
        .map(|value| value.unwrap_or(Value::Null))
}

fn link(value: Option<RecordId>) -> Value {
    value.map_or(Value::Null, |id| Value::Text(id.to_string()))
}

fn read_date(row: &Row<'_>, column: &str) -> Result<Option<PrimitiveDateTime>> {
    let raw: Option<String> = row.get(column)?;
    raw.map(|raw| {
        local_datetime::parse(&raw).with_context(|| format!("invalid {column} timestamp: {raw}"))
    })
    .transpose()
}

fn read_link(row: &Row<'_>, column: &str) -> Result<Option<RecordId>> {
    let raw: Option<String> = row.get(column)?;
    raw.map(|raw| parse_record_id(&raw)).transpose()
}

fn read_id(row: &Row<'_>) -> Result<RecordId> {
    let raw: String = row.get("id")?;
    parse_record_id(&raw)
}

pub(crate) fn parse_record_id(raw: &str) -> Result<RecordId> {
    RecordId::parse(raw).map_err(|err| anyhow!("{err}"))
}

impl StoredEntity for PurchaseRequest {
    const TABLE: &'static str = "purchase_requests";
    const KEY_COLUMNS: &'static [&'static str] = &["request_number"];
    const COLUMNS: &'static [&'static str] = &[
        "request_number",
        "inner_id",
        "creation_date",
        "name",
        "title",
        "cfo",
        "customer",
        "budget_amount",
        "currency",
        "requires_purchase",
        "is_planned",
        "prepared_by",
        "state",
    ];
    const SEARCH_COLUMNS: &'static [&'static str] = &["name", "title", "customer", "inner_id"];
    const ORDER_BY: &'static str = "request_number DESC";
    const HAS_STATUS: bool = true;

    fn id(&self) -> RecordId {
        self.id
    }

    fn key_values(key: &i64) -> Vec<Value> {
        vec![Value::Integer(*key)]
    }

    fn column_values(&self) -> Result<Vec<Value>> {
        let fields = &self.fields;
        Ok(vec![
            Value::Integer(self.request_number),
            text(fields.inner_id.as_ref()),
            date(fields.creation_date)?,
            text(fields.name.as_ref()),
            text(fields.title.as_ref()),
            text(fields.cfo.as_ref()),
            text(fields.customer.as_ref()),
            Value::from(fields.budget_amount),
            text(fields.currency.as_ref()),
            Value::from(fields.requires_purchase),
            Value::from(fields.is_planned),
            text(fields.prepared_by.as_ref()),
            text(fields.state.as_ref()),
        ])
    }

    fn status_value(&self) -> Option<&'static str> {
        Some(self.status.as_str())
    }

    fn from_row(row: &Row<'_>) -> Result<Self> {
        let status_raw: String = row.get("status")?;
        Ok(Self {
            id: read_id(row)?,
            request_number: row.get("request_number")?,
            fields: RequestFields {
                inner_id: row.get("inner_id")?,
                creation_date: read_date(row, "creation_date")?,
                name: row.get("name")?,
                title: row.get("title")?,
                cfo: row.get("cfo")?,
                customer: row.get("customer")?,
                budget_amount: row.get("budget_amount")?,
                currency: row.get("currency")?,
                requires_purchase: row.get("requires_purchase")?,
                is_planned: row.get("is_planned")?,
                prepared_by: row.get("prepared_by")?,
                state: row.get("state")?,
            },
            status: RequestStatus::parse(&status_raw)
                .ok_or_else(|| anyhow!("unknown request status: {status_raw}"))?,
        })
    }
}

impl StoredEntity for Purchase {
    const TABLE: &'static str = "purchases";
    const KEY_COLUMNS: &'static [&'static str] = &["inner_id"];
    const COLUMNS: &'static [&'static str] = &[
        "inner_id",
        "purchase_number",
        "purchase_request_id",
        "creation_date",
        "name",
        "title",
        "cfo",
        "budget_amount",
        "currency",
        "purchase_method",
        "prepared_by",
        "state",
    ];
    const SEARCH_COLUMNS: &'static [&'static str] =
        &["name", "title", "inner_id", "purchase_number"];
    const ORDER_BY: &'static str = "creation_date DESC, inner_id ASC";
    const HAS_STATUS: bool = true;

    fn id(&self) -> RecordId {
        self.id
    }

    fn key_values(key: &String) -> Vec<Value> {
        vec![Value::Text(key.clone())]
    }

    fn column_values(&self) -> Result<Vec<Value>> {
        let fields = &self.fields;
        Ok(vec![
            Value::Text(self.inner_id.clone()),
            text(fields.purchase_number.as_ref()),
            link(fields.purchase_request_id),
            date(fields.creation_date)?,
            text(fields.name.as_ref()),
            text(fields.title.as_ref()),
            text(fields.cfo.as_ref()),
            Value::from(fields.budget_amount),
            text(fields.currency.as_ref()),
            text(fields.purchase_method.as_ref()),
            text(fields.prepared_by.as_ref()),
            text(fields.state.as_ref()),
        ])
    }

    fn status_value(&self) -> Option<&'static str> {
        Some(self.status.as_str())
    }

    fn from_row(row: &Row<'_>) -> Result<Self> {
        let status_raw: String = row.get("status")?;
        Ok(Self {
            id: read_id(row)?,
            inner_id: row.get("inner_id")?,
            fields: PurchaseFields {
                purchase_number: row.get("purchase_number")?,
                purchase_request_id: read_link(row, "purchase_request_id")?,
                creation_date: read_date(row, "creation_date")?,
                name: row.get("name")?,
                title: row.get("title")?,
                cfo: row.get("cfo")?,
                budget_amount: row.get("budget_amount")?,
                currency: row.get("currency")?,
                purchase_method: row.get("purchase_method")?,
                prepared_by: row.get("prepared_by")?,
                state: row.get("state")?,
            },
            status: PurchaseStatus::parse(&status_raw)
                .ok_or_else(|| anyhow!("unknown purchase status: {status_raw}"))?,
        })
    }
}

impl StoredEntity for Contract {
    const TABLE: &'static str = "contracts";
    const KEY_COLUMNS: &'static [&'static str] = &["inner_id"];
    const COLUMNS: &'static [&'static str] = &[
        "inner_id",
        "kind",
        "contract_number",
        "purchase_request_id",
        "purchase_id",
        "creation_date",
        "name",
        "title",
        "cfo",
        "budget_amount",
        "currency",
        "supplier",
        "prepared_by",
        "state",
    ];
    const SEARCH_COLUMNS: &'static [&'static str] =
        &["name", "title", "inner_id", "contract_number", "supplier"];
    const ORDER_BY: &'static str = "creation_date DESC, inner_id ASC";
    const HAS_STATUS: bool = true;

    fn id(&self) -> RecordId {
        self.id
    }

    fn key_values(key: &String) -> Vec<Value> {
        vec![Value::Text(key.clone())]
    }

    fn column_values(&self) -> Result<Vec<Value>> {
        let fields = &self.fields;
        Ok(vec![
            Value::Text(self.inner_id.clone()),
            fields.kind.map_or(Value::Null, |kind| Value::Text(kind.as_str().to_string())),
            text(fields.contract_number.as_ref()),
            link(fields.purchase_request_id),
            link(fields.purchase_id),
            date(fields.creation_date)?,
            text(fields.name.as_ref()),
            text(fields.title.as_ref()),
            text(fields.cfo.as_ref()),
            Value::from(fields.budget_amount),
            text(fields.currency.as_ref()),
            text(fields.supplier.as_ref()),
            text(fields.prepared_by.as_ref()),
            text(fields.state.as_ref()),
        ])
    }

    fn status_value(&self) -> Option<&'static str> {
        Some(self.status.as_str())
    }

    fn from_row(row: &Row<'_>) -> Result<Self> {
        let status_raw: String = row.get("status")?;
        let kind_raw: Option<String> = row.get("kind")?;
        let kind = kind_raw
            .map(|raw| {
                ContractKind::parse(&raw).ok_or_else(|| anyhow!("unknown contract kind: {raw}"))
            })
            .transpose()?;
        Ok(Self {
            id: read_id(row)?,
            inner_id: row.get("inner_id")?,
            fields: ContractFields {
                kind,
                contract_number: row.get("contract_number")?,
                purchase_request_id: read_link(row, "purchase_request_id")?,
                purchase_id: read_link(row, "purchase_id")?,
                creation_date: read_date(row, "creation_date")?,
                name: row.get("name")?,
                title: row.get("title")?,
                cfo: row.get("cfo")?,
                budget_amount: row.get("budget_amount")?,
                currency: row.get("currency")?,
                supplier: row.get("supplier")?,
                prepared_by: row.get("prepared_by")?,
                state: row.get("state")?,
            },
            status: ContractStatus::parse(&status_raw)
                .ok_or_else(|| anyhow!("unknown contract status: {status_raw}"))?,
        })
    }
}

impl StoredEntity for PlanItem {
    const TABLE: &'static str = "plan_items";
    const KEY_COLUMNS: &'static [&'static str] = &["subject_key"];
    const COLUMNS: &'static [&'static str] = &[
        "subject_key",
        "subject",
        "plan_year",
        "cfo",
        "company",
        "planned_amount",
        "currency",
        "planned_date",
        "purchase_method",
        "is_planned",
    ];
    const SEARCH_COLUMNS: &'static [&'static str] = &["subject", "company"];
    const ORDER_BY: &'static str = "plan_year DESC, subject_key ASC";
    const HAS_STATUS: bool = false;

    fn id(&self) -> RecordId {
        self.id
    }

    fn key_values(key: &String) -> Vec<Value> {
        vec![Value::Text(key.clone())]
    }

    fn column_values(&self) -> Result<Vec<Value>> {
        let fields = &self.fields;
        Ok(vec![
            Value::Text(self.subject_key.clone()),
            Value::Text(self.subject.clone()),
            Value::from(fields.plan_year),
            text(fields.cfo.as_ref()),
            text(fields.company.as_ref()),
            Value::from(fields.planned_amount),
            text(fields.currency.as_ref()),
            date(fields.planned_date)?,
            text(fields.purchase_method.as_ref()),
            Value::from(fields.is_planned),
        ])
    }

    fn status_value(&self) -> Option<&'static str> {
        None
    }

    fn from_row(row: &Row<'_>) -> Result<Self> {
        Ok(Self {
            id: read_id(row)?,
            subject_key: row.get("subject_key")?,
            subject: row.get("subject")?,
            fields: PlanItemFields {
                plan_year: row.get("plan_year")?,
                cfo: row.get("cfo")?,
                company: row.get("company")?,
                planned_amount: row.get("planned_amount")?,
                currency: row.get("currency")?,
                planned_date: read_date(row, "planned_date")?,
                purchase_method: row.get("purchase_method")?,
                is_planned: row.get("is_planned")?,
            },
        })
    }
}

impl StoredEntity for Approval {
    const TABLE: &'static str = "approvals";
    const KEY_COLUMNS: &'static [&'static str] = &["target", "document_key", "stage", "role"];
    const COLUMNS: &'static [&'static str] = &[
        "target",
        "document_key",
        "stage",
        "role",
        "assignee",
        "assignment_date",
        "completion_date",
        "completion_result",
        "days_in_work",
    ];
    const SEARCH_COLUMNS: &'static [&'static str] = &["stage", "role", "assignee"];
    const ORDER_BY: &'static str = "document_key ASC, assignment_date ASC";
    const HAS_STATUS: bool = false;

    fn id(&self) -> RecordId {
        self.id
    }

    fn key_values(key: &ApprovalKey) -> Vec<Value> {
        vec![
            Value::Text(key.target.as_str().to_string()),
            Value::Text(key.document_key.clone()),
            Value::Text(key.stage.clone()),
            Value::Text(key.role.clone()),
        ]
    }

    fn column_values(&self) -> Result<Vec<Value>> {
        let mut values = Self::key_values(&self.key);
        let fields = &self.fields;
        values.extend([
            text(fields.assignee.as_ref()),
            date(fields.assignment_date)?,
            date(fields.completion_date)?,
            text(fields.completion_result.as_ref()),
            Value::from(fields.days_in_work),
        ]);
        Ok(values)
    }

    fn status_value(&self) -> Option<&'static str> {
        None
    }

    fn from_row(row: &Row<'_>) -> Result<Self> {
        let target_raw: String = row.get("target")?;
        Ok(Self {
            id: read_id(row)?,
            key: ApprovalKey {
                target: ApprovalTarget::parse(&target_raw)
                    .ok_or_else(|| anyhow!("unknown approval target: {target_raw}"))?,
                document_key: row.get("document_key")?,
                stage: row.get("stage")?,
                role: row.get("role")?,
            },
            fields: ApprovalFields {
                assignee: row.get("assignee")?,
                assignment_date: read_date(row, "assignment_date")?,
                completion_date: read_date(row, "completion_date")?,
                completion_result: row.get("completion_result")?,
                days_in_work: row.get("days_in_work")?,
            },
        })
    }
}

impl StoredEntity for Preparer {
    const TABLE: &'static str = "preparers";
    const KEY_COLUMNS: &'static [&'static str] = &["name_key"];
    const COLUMNS: &'static [&'static str] = &["name_key", "full_name"];
    const SEARCH_COLUMNS: &'static [&'static str] = &["full_name"];
    const ORDER_BY: &'static str = "name_key ASC";
    const HAS_STATUS: bool = false;

    fn id(&self) -> RecordId {
        self.id
    }

    fn key_values(key: &String) -> Vec<Value> {
        vec![Value::Text(key.clone())]
    }

    fn column_values(&self) -> Result<Vec<Value>> {
        Ok(vec![Value::Text(self.name_key.clone()), Value::Text(self.full_name.clone())])
    }

    fn status_value(&self) -> Option<&'static str> {
        None
    }

    fn from_row(row: &Row<'_>) -> Result<Self> {
        Ok(Self {
            id: read_id(row)?,
            name_key: row.get("name_key")?,
            full_name: row.get("full_name")?,
        })
    }
}
