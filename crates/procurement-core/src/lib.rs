//! Domain model, reconciliation engine and status derivation rules for the
//! procurement workflow kernel.
//!
//! Nothing in this crate performs I/O. Persistence is reached through the
//! [`Repository`] seam and the status engine works on plain slices.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use ulid::Ulid;

mod model;
mod reconcile;
mod status;
pub mod vocabulary;

pub use model::{
    Approval, ApprovalDraft, ApprovalFields, ApprovalKey, ApprovalTarget, Contract, ContractDraft,
    ContractFields, ContractKind, ContractStatus, DocumentKind, PlanItem, PlanItemDraft,
    PlanItemFields, Preparer, PreparerDraft, Purchase, PurchaseDraft, PurchaseFields,
    PurchaseRequest, PurchaseStatus, RequestDraft, RequestFields, RequestStatus,
};
pub use reconcile::{
    upsert, Entity, EntityKind, FieldDiff, Reconciled, Repository, UpsertOutcome,
};
pub use status::{
    approval_signals, classify_approval, derive_contract_status, derive_purchase_status,
    derive_request_status, first_signal, first_text_match, is_final_stage, status_transition,
    ApprovalClass, PurchaseArtifacts, RequestArtifacts, Signal, TextPattern, TextRule,
    CONTRACT_RULES, PURCHASE_CASCADE, REQUEST_CASCADE,
};

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum KernelError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("store error: {0}")]
    Store(String),
}

/// Surrogate identifier shared by every stored entity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct RecordId(pub Ulid);

impl RecordId {
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Parse the canonical ULID text form.
    ///
    /// # Errors
    /// Returns [`KernelError::Validation`] when `raw` is not a ULID.
    pub fn parse(raw: &str) -> Result<Self, KernelError> {
        Ulid::from_string(raw.trim())
            .map(Self)
            .map_err(|err| KernelError::Validation(format!("invalid record id {raw}: {err}")))
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Second-precision local timestamps as written by the source system.
///
/// Spreadsheet exports carry no offset, so every date column is a
/// [`time::PrimitiveDateTime`] stored as `YYYY-MM-DDTHH:MM:SS`.
pub mod local_datetime {
    use time::format_description::BorrowedFormatItem;
    use time::macros::format_description;
    use time::PrimitiveDateTime;

    pub const FORMAT: &[BorrowedFormatItem<'static>] =
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");

    /// # Errors
    /// Returns an error when the value cannot be rendered with [`FORMAT`].
    pub fn format(value: PrimitiveDateTime) -> Result<String, time::error::Format> {
        value.format(FORMAT)
    }

    /// # Errors
    /// Returns an error when `raw` does not follow [`FORMAT`].
    pub fn parse(raw: &str) -> Result<PrimitiveDateTime, time::error::Parse> {
        PrimitiveDateTime::parse(raw, FORMAT)
    }

    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};
        use time::PrimitiveDateTime;

        /// # Errors
        /// Propagates formatting failures as serializer errors.
        #[allow(clippy::ref_option)]
        pub fn serialize<S>(
            value: &Option<PrimitiveDateTime>,
            serializer: S,
        ) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match value {
                Some(value) => {
                    let text = super::format(*value).map_err(serde::ser::Error::custom)?;
                    serializer.serialize_some(&text)
                }
                None => serializer.serialize_none(),
            }
        }

        /// # Errors
        /// Returns a deserializer error when the text is not a local timestamp.
        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<PrimitiveDateTime>, D::Error>
        where
            D: Deserializer<'de>,
        {
            let raw: Option<String> = Option::deserialize(deserializer)?;
            raw.map(|value| super::parse(&value).map_err(serde::de::Error::custom)).transpose()
        }
    }
}
