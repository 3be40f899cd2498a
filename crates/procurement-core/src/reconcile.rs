use std::fmt::Debug;

use serde::{Deserialize, Serialize};

use crate::model::{
    Approval, ApprovalDraft, ApprovalFields, ApprovalKey, Contract, ContractDraft,
    ContractFields, ContractStatus, PlanItem, PlanItemDraft, PlanItemFields, Preparer,
    PreparerDraft, Purchase, PurchaseDraft, PurchaseFields, PurchaseRequest, PurchaseStatus,
    RequestDraft, RequestFields, RequestStatus,
};
use crate::vocabulary::normalize_key;
use crate::{KernelError, RecordId};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    PurchaseRequest,
    Purchase,
    Contract,
    PlanItem,
    Approval,
    Preparer,
}

impl EntityKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PurchaseRequest => "purchase_request",
            Self::Purchase => "purchase",
            Self::Contract => "contract",
            Self::PlanItem => "plan_item",
            Self::Approval => "approval",
            Self::Preparer => "preparer",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Created,
    Updated,
    Unchanged,
}

impl UpsertOutcome {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Unchanged => "unchanged",
        }
    }
}

/// Names of the fields a merge overwrote, in declaration order.
#[derive(Debug, Clone, Default, Serialize, Eq, PartialEq)]
pub struct FieldDiff(Vec<&'static str>);

impl FieldDiff {
    pub fn record(&mut self, field: &'static str) {
        self.0.push(field);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn fields(&self) -> &[&'static str] {
        &self.0
    }
}

/// A stored entity type that can be reconciled against drafts by natural key.
pub trait Entity: Clone + Debug {
    type Key: Clone + Debug + Eq;
    type Draft: Debug;

    const KIND: EntityKind;

    fn natural_key(&self) -> Self::Key;

    fn draft_key(draft: &Self::Draft) -> Self::Key;

    /// Build a new record with a fresh id and the initial status.
    fn from_draft(draft: Self::Draft) -> Self;

    /// Overwrite every field the draft carries that differs from the stored value.
    fn merge_draft(&mut self, draft: &Self::Draft) -> FieldDiff;
}

/// Persistence seam consumed by [`upsert`].
pub trait Repository<E: Entity> {
    /// # Errors
    /// Returns [`KernelError::Store`] when the lookup fails.
    fn find_by_key(&self, key: &E::Key) -> Result<Option<E>, KernelError>;

    /// # Errors
    /// Returns [`KernelError::Store`] when the record cannot be written.
    fn insert(&mut self, record: &E) -> Result<(), KernelError>;

    /// # Errors
    /// Returns [`KernelError::Store`] when the record cannot be written.
    fn update(&mut self, record: &E) -> Result<(), KernelError>;
}

#[derive(Debug, Clone)]
pub struct Reconciled<E> {
    pub outcome: UpsertOutcome,
    pub diff: FieldDiff,
    pub record: E,
}

/// Match `draft` to a stored record by natural key and persist only real changes.
///
/// # Errors
/// Propagates repository failures.
pub fn upsert<E, R>(repository: &mut R, draft: E::Draft) -> Result<Reconciled<E>, KernelError>
where
    E: Entity,
    R: Repository<E> + ?Sized,
{
    let key = E::draft_key(&draft);
    match repository.find_by_key(&key)? {
        None => {
            let record = E::from_draft(draft);
            repository.insert(&record)?;
            Ok(Reconciled { outcome: UpsertOutcome::Created, diff: FieldDiff::default(), record })
        }
        Some(mut record) => {
            let diff = record.merge_draft(&draft);
            if diff.is_empty() {
                return Ok(Reconciled { outcome: UpsertOutcome::Unchanged, diff, record });
            }
            repository.update(&record)?;
            Ok(Reconciled { outcome: UpsertOutcome::Updated, diff, record })
        }
    }
}

fn merge_field<T>(
    name: &'static str,
    stored: &mut Option<T>,
    incoming: Option<&T>,
    diff: &mut FieldDiff,
) where
    T: Clone + PartialEq,
{
    let Some(incoming) = incoming else {
        return;
    };
    if stored.as_ref() != Some(incoming) {
        *stored = Some(incoming.clone());
        diff.record(name);
    }
}

macro_rules! merge_fields {
    ($stored:expr, $incoming:expr, $diff:expr; $($field:ident),+ $(,)?) => {
        $(merge_field(stringify!($field), &mut $stored.$field, $incoming.$field.as_ref(), $diff);)+
    };
}

fn merge_request_fields(stored: &mut RequestFields, incoming: &RequestFields) -> FieldDiff {
    let mut diff = FieldDiff::default();
    merge_fields!(stored, incoming, &mut diff;
        inner_id, creation_date, name, title, cfo, customer, budget_amount, currency,
        requires_purchase, is_planned, prepared_by, state);
    diff
}

fn merge_purchase_fields(stored: &mut PurchaseFields, incoming: &PurchaseFields) -> FieldDiff {
    let mut diff = FieldDiff::default();
    merge_fields!(stored, incoming, &mut diff;
        purchase_number, purchase_request_id, creation_date, name, title, cfo, budget_amount,
        currency, purchase_method, prepared_by, state);
    diff
}

fn merge_contract_fields(stored: &mut ContractFields, incoming: &ContractFields) -> FieldDiff {
    let mut diff = FieldDiff::default();
    merge_fields!(stored, incoming, &mut diff;
        kind, contract_number, purchase_request_id, purchase_id, creation_date, name, title, cfo,
        budget_amount, currency, supplier, prepared_by, state);
    diff
}

fn merge_plan_item_fields(stored: &mut PlanItemFields, incoming: &PlanItemFields) -> FieldDiff {
    let mut diff = FieldDiff::default();
    merge_fields!(stored, incoming, &mut diff;
        plan_year, cfo, company, planned_amount, currency, planned_date, purchase_method,
        is_planned);
    diff
}

fn merge_approval_fields(stored: &mut ApprovalFields, incoming: &ApprovalFields) -> FieldDiff {
    let mut diff = FieldDiff::default();
    merge_fields!(stored, incoming, &mut diff;
        assignee, assignment_date, completion_date, completion_result, days_in_work);
    diff
}

impl Entity for PurchaseRequest {
    type Key = i64;
    type Draft = RequestDraft;

    const KIND: EntityKind = EntityKind::PurchaseRequest;

    fn natural_key(&self) -> i64 {
        self.request_number
    }

    fn draft_key(draft: &RequestDraft) -> i64 {
        draft.request_number
    }

    fn from_draft(draft: RequestDraft) -> Self {
        Self {
            id: RecordId::new(),
            request_number: draft.request_number,
            fields: draft.fields,
            status: RequestStatus::Project,
        }
    }

    fn merge_draft(&mut self, draft: &RequestDraft) -> FieldDiff {
        merge_request_fields(&mut self.fields, &draft.fields)
    }
}

impl Entity for Purchase {
    type Key = String;
    type Draft = PurchaseDraft;

    const KIND: EntityKind = EntityKind::Purchase;

    fn natural_key(&self) -> String {
        self.inner_id.clone()
    }

    fn draft_key(draft: &PurchaseDraft) -> String {
        draft.inner_id.clone()
    }

    fn from_draft(draft: PurchaseDraft) -> Self {
        Self {
            id: RecordId::new(),
            inner_id: draft.inner_id,
            fields: draft.fields,
            status: PurchaseStatus::Project,
        }
    }

    fn merge_draft(&mut self, draft: &PurchaseDraft) -> FieldDiff {
        merge_purchase_fields(&mut self.fields, &draft.fields)
    }
}

impl Entity for Contract {
    type Key = String;
    type Draft = ContractDraft;

    const KIND: EntityKind = EntityKind::Contract;

    fn natural_key(&self) -> String {
        self.inner_id.clone()
    }

    fn draft_key(draft: &ContractDraft) -> String {
        draft.inner_id.clone()
    }

    fn from_draft(draft: ContractDraft) -> Self {
        Self {
            id: RecordId::new(),
            inner_id: draft.inner_id,
            fields: draft.fields,
            status: ContractStatus::Project,
        }
    }

    fn merge_draft(&mut self, draft: &ContractDraft) -> FieldDiff {
        merge_contract_fields(&mut self.fields, &draft.fields)
    }
}

impl Entity for PlanItem {
    type Key = String;
    type Draft = PlanItemDraft;

    const KIND: EntityKind = EntityKind::PlanItem;

    fn natural_key(&self) -> String {
        self.subject_key.clone()
    }

    fn draft_key(draft: &PlanItemDraft) -> String {
        draft.subject_key()
    }

    fn from_draft(draft: PlanItemDraft) -> Self {
        Self {
            id: RecordId::new(),
            subject_key: draft.subject_key(),
            subject: draft.subject.trim().to_string(),
            fields: draft.fields,
        }
    }

    fn merge_draft(&mut self, draft: &PlanItemDraft) -> FieldDiff {
        let mut diff = merge_plan_item_fields(&mut self.fields, &draft.fields);
        let subject = draft.subject.trim();
        if self.subject != subject {
            self.subject = subject.to_string();
            diff.record("subject");
        }
        diff
    }
}

impl Entity for Approval {
    type Key = ApprovalKey;
    type Draft = ApprovalDraft;

    const KIND: EntityKind = EntityKind::Approval;

    fn natural_key(&self) -> ApprovalKey {
        self.key.clone()
    }

    fn draft_key(draft: &ApprovalDraft) -> ApprovalKey {
        draft.key.clone()
    }

    fn from_draft(draft: ApprovalDraft) -> Self {
        Self { id: RecordId::new(), key: draft.key, fields: draft.fields }
    }

    fn merge_draft(&mut self, draft: &ApprovalDraft) -> FieldDiff {
        merge_approval_fields(&mut self.fields, &draft.fields)
    }
}

impl Entity for Preparer {
    type Key = String;
    type Draft = PreparerDraft;

    const KIND: EntityKind = EntityKind::Preparer;

    fn natural_key(&self) -> String {
        self.name_key.clone()
    }

    fn draft_key(draft: &PreparerDraft) -> String {
        normalize_key(&draft.full_name)
    }

    fn from_draft(draft: PreparerDraft) -> Self {
        Self {
            id: RecordId::new(),
            name_key: normalize_key(&draft.full_name),
            full_name: draft.full_name.trim().to_string(),
        }
    }

    fn merge_draft(&mut self, draft: &PreparerDraft) -> FieldDiff {
        let mut diff = FieldDiff::default();
        let full_name = draft.full_name.trim();
        if self.full_name != full_name {
            self.full_name = full_name.to_string();
            diff.record("full_name");
        }
        diff
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use proptest::prelude::*;
    use time::macros::datetime;

    use super::*;

    #[derive(Default)]
    struct MemoryRepository {
        requests: BTreeMap<i64, PurchaseRequest>,
        writes: usize,
    }

    impl Repository<PurchaseRequest> for MemoryRepository {
        fn find_by_key(&self, key: &i64) -> Result<Option<PurchaseRequest>, KernelError> {
            Ok(self.requests.get(key).cloned())
        }

        fn insert(&mut self, record: &PurchaseRequest) -> Result<(), KernelError> {
            if self.requests.contains_key(&record.request_number) {
                return Err(KernelError::Store(format!(
                    "duplicate request number {}",
                    record.request_number
                )));
            }
            self.requests.insert(record.request_number, record.clone());
            self.writes += 1;
            Ok(())
        }

        fn update(&mut self, record: &PurchaseRequest) -> Result<(), KernelError> {
            self.requests.insert(record.request_number, record.clone());
            self.writes += 1;
            Ok(())
        }
    }

    fn request_draft(number: i64, name: Option<&str>, amount: Option<f64>) -> RequestDraft {
        RequestDraft {
            request_number: number,
            fields: RequestFields {
                name: name.map(str::to_string),
                budget_amount: amount,
                creation_date: Some(datetime!(2024-01-15 10:00:00)),
                ..RequestFields::default()
            },
        }
    }

    #[test]
    fn first_upsert_creates_with_initial_status() -> Result<(), KernelError> {
        let mut repository = MemoryRepository::default();
        let reconciled = upsert(&mut repository, request_draft(7, Some("Бумага"), Some(100.0)))?;

        assert_eq!(reconciled.outcome, UpsertOutcome::Created);
        assert_eq!(reconciled.record.status, RequestStatus::Project);
        assert_eq!(repository.requests.len(), 1);
        Ok(())
    }

    #[test]
    fn changed_fields_are_listed_and_persisted_once() -> Result<(), KernelError> {
        let mut repository = MemoryRepository::default();
        upsert(&mut repository, request_draft(7, Some("Бумага"), Some(100.0)))?;

        let reconciled = upsert(&mut repository, request_draft(7, Some("Картон"), Some(100.0)))?;
        assert_eq!(reconciled.outcome, UpsertOutcome::Updated);
        assert_eq!(reconciled.diff.fields(), &["name"]);
        assert_eq!(repository.writes, 2);
        assert_eq!(
            repository.requests.get(&7).and_then(|r| r.fields.name.clone()).as_deref(),
            Some("Картон")
        );
        Ok(())
    }

    #[test]
    fn absent_draft_fields_never_clear_stored_values() -> Result<(), KernelError> {
        let mut repository = MemoryRepository::default();
        upsert(&mut repository, request_draft(7, Some("Бумага"), Some(100.0)))?;

        let reconciled = upsert(&mut repository, request_draft(7, None, None))?;
        assert_eq!(reconciled.outcome, UpsertOutcome::Unchanged);
        let stored = repository
            .requests
            .get(&7)
            .unwrap_or_else(|| panic!("request 7 should be stored"));
        assert_eq!(stored.fields.name.as_deref(), Some("Бумага"));
        assert_eq!(stored.fields.budget_amount, Some(100.0));
        assert_eq!(repository.writes, 1);
        Ok(())
    }

    #[test]
    fn merge_never_touches_status() {
        let mut stored = PurchaseRequest::from_draft(request_draft(9, Some("A"), None));
        stored.status = RequestStatus::Approved;
        let diff = stored.merge_draft(&request_draft(9, Some("B"), None));
        assert_eq!(diff.fields(), &["name"]);
        assert_eq!(stored.status, RequestStatus::Approved);
    }

    #[test]
    fn plan_item_and_preparer_keys_ignore_case() {
        let draft = PlanItemDraft {
            subject: "Канцтовары".to_string(),
            fields: PlanItemFields::default(),
        };
        let mut item = PlanItem::from_draft(draft);
        let respelled = PlanItemDraft {
            subject: "  КАНЦТОВАРЫ".to_string(),
            fields: PlanItemFields::default(),
        };
        assert_eq!(PlanItem::draft_key(&respelled), item.natural_key());
        assert_eq!(item.merge_draft(&respelled).fields(), &["subject"]);

        let preparer = Preparer::from_draft(PreparerDraft { full_name: "Иванов И.И. ".to_string() });
        assert_eq!(
            Preparer::draft_key(&PreparerDraft { full_name: "иванов и.и.".to_string() }),
            preparer.natural_key()
        );
        assert_eq!(preparer.full_name, "Иванов И.И.");
    }

    proptest! {
        #[test]
        fn upserting_the_same_rows_twice_changes_nothing(
            rows in prop::collection::vec(
                (1_i64..50, prop::option::of("[a-z]{1,8}"), prop::option::of(0_u32..10_000)),
                1..30,
            )
        ) {
            let mut repository = MemoryRepository::default();
            let drafts: Vec<RequestDraft> = rows
                .iter()
                .map(|(number, name, amount)| {
                    request_draft(*number, name.as_deref(), amount.map(f64::from))
                })
                .collect();

            for draft in &drafts {
                upsert(&mut repository, draft.clone())
                    .unwrap_or_else(|err| panic!("first pass failed: {err}"));
            }
            let snapshot = repository.requests.clone();

            for draft in &drafts {
                let reconciled = upsert(&mut repository, draft.clone())
                    .unwrap_or_else(|err| panic!("second pass failed: {err}"));
                prop_assert_ne!(reconciled.outcome, UpsertOutcome::Created);
            }

            let distinct: std::collections::BTreeSet<i64> =
                rows.iter().map(|(number, _, _)| *number).collect();
            prop_assert_eq!(repository.requests.len(), distinct.len());
            prop_assert_eq!(repository.requests, snapshot);
        }
    }
}
