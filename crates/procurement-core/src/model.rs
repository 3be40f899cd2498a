use serde::{Deserialize, Serialize};
use time::PrimitiveDateTime;

use crate::vocabulary::normalize_key;
use crate::RecordId;

macro_rules! status_vocabulary {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name {
            #[default]
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            #[must_use]
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }

            #[must_use]
            pub fn parse(value: &str) -> Option<Self> {
                match value {
                    $($text => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

status_vocabulary! {
    /// Lifecycle of a purchase request.
    RequestStatus {
        Project => "PROJECT",
        OnCoordination => "ON_COORDINATION",
        OnApproval => "ON_APPROVAL",
        NotCoordinated => "NOT_COORDINATED",
        NotApproved => "NOT_APPROVED",
        Approved => "APPROVED",
        PurchaseCreated => "PURCHASE_CREATED",
        SpecificationCreated => "SPECIFICATION_CREATED",
    }
}

status_vocabulary! {
    PurchaseStatus {
        Project => "PROJECT",
        OnCoordination => "ON_COORDINATION",
        OnApproval => "ON_APPROVAL",
        NotCoordinated => "NOT_COORDINATED",
        NotApproved => "NOT_APPROVED",
        Approved => "APPROVED",
        ContractCreated => "CONTRACT_CREATED",
    }
}

status_vocabulary! {
    /// Lifecycle of a contract or specification, derived from its workflow state text.
    ContractStatus {
        Project => "PROJECT",
        OnCoordination => "ON_COORDINATION",
        OnRevision => "ON_REVISION",
        NotCoordinated => "NOT_COORDINATED",
        Coordinated => "COORDINATED",
        OnSigning => "ON_SIGNING",
        Signed => "SIGNED",
        Cancelled => "CANCELLED",
    }
}

/// Document kind carried by the discriminator column of a documents export.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    PurchaseRequest,
    Purchase,
    Contract,
    Specification,
}

impl DocumentKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PurchaseRequest => "purchase_request",
            Self::Purchase => "purchase",
            Self::Contract => "contract",
            Self::Specification => "specification",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ContractKind {
    Contract,
    Specification,
}

impl ContractKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Contract => "contract",
            Self::Specification => "specification",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "contract" => Some(Self::Contract),
            "specification" => Some(Self::Specification),
            _ => None,
        }
    }
}

/// Which document family an approval row belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalTarget {
    PurchaseRequest,
    Purchase,
}

impl ApprovalTarget {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PurchaseRequest => "purchase_request",
            Self::Purchase => "purchase",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "purchase_request" => Some(Self::PurchaseRequest),
            "purchase" => Some(Self::Purchase),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RequestFields {
    #[serde(default)]
    pub inner_id: Option<String>,
    #[serde(default, with = "crate::local_datetime::option")]
    pub creation_date: Option<PrimitiveDateTime>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub cfo: Option<String>,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub budget_amount: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub requires_purchase: Option<bool>,
    #[serde(default)]
    pub is_planned: Option<bool>,
    #[serde(default)]
    pub prepared_by: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PurchaseRequest {
    pub id: RecordId,
    pub request_number: i64,
    #[serde(flatten)]
    pub fields: RequestFields,
    pub status: RequestStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestDraft {
    pub request_number: i64,
    #[serde(flatten)]
    pub fields: RequestFields,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PurchaseFields {
    #[serde(default)]
    pub purchase_number: Option<String>,
    #[serde(default)]
    pub purchase_request_id: Option<RecordId>,
    #[serde(default, with = "crate::local_datetime::option")]
    pub creation_date: Option<PrimitiveDateTime>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub cfo: Option<String>,
    #[serde(default)]
    pub budget_amount: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub purchase_method: Option<String>,
    #[serde(default)]
    pub prepared_by: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Purchase {
    pub id: RecordId,
    pub inner_id: String,
    #[serde(flatten)]
    pub fields: PurchaseFields,
    pub status: PurchaseStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PurchaseDraft {
    pub inner_id: String,
    #[serde(flatten)]
    pub fields: PurchaseFields,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ContractFields {
    #[serde(default)]
    pub kind: Option<ContractKind>,
    #[serde(default)]
    pub contract_number: Option<String>,
    #[serde(default)]
    pub purchase_request_id: Option<RecordId>,
    #[serde(default)]
    pub purchase_id: Option<RecordId>,
    #[serde(default, with = "crate::local_datetime::option")]
    pub creation_date: Option<PrimitiveDateTime>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub cfo: Option<String>,
    #[serde(default)]
    pub budget_amount: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub supplier: Option<String>,
    #[serde(default)]
    pub prepared_by: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

/// A contract or a specification under a framework contract.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Contract {
    pub id: RecordId,
    pub inner_id: String,
    #[serde(flatten)]
    pub fields: ContractFields,
    pub status: ContractStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContractDraft {
    pub inner_id: String,
    #[serde(flatten)]
    pub fields: ContractFields,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PlanItemFields {
    #[serde(default)]
    pub plan_year: Option<i64>,
    #[serde(default)]
    pub cfo: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub planned_amount: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default, with = "crate::local_datetime::option")]
    pub planned_date: Option<PrimitiveDateTime>,
    #[serde(default)]
    pub purchase_method: Option<String>,
    #[serde(default)]
    pub is_planned: Option<bool>,
}

/// Purchase-plan line keyed by its subject, compared case-insensitively.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanItem {
    pub id: RecordId,
    pub subject_key: String,
    pub subject: String,
    #[serde(flatten)]
    pub fields: PlanItemFields,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanItemDraft {
    pub subject: String,
    #[serde(flatten)]
    pub fields: PlanItemFields,
}

impl PlanItemDraft {
    #[must_use]
    pub fn subject_key(&self) -> String {
        normalize_key(&self.subject)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ApprovalKey {
    pub target: ApprovalTarget,
    /// Request number for request approvals, inner id for purchase approvals.
    pub document_key: String,
    pub stage: String,
    pub role: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApprovalFields {
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default, with = "crate::local_datetime::option")]
    pub assignment_date: Option<PrimitiveDateTime>,
    #[serde(default, with = "crate::local_datetime::option")]
    pub completion_date: Option<PrimitiveDateTime>,
    #[serde(default)]
    pub completion_result: Option<String>,
    #[serde(default)]
    pub days_in_work: Option<i64>,
}

/// One participant's assignment on one stage of one document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Approval {
    pub id: RecordId,
    #[serde(flatten)]
    pub key: ApprovalKey,
    #[serde(flatten)]
    pub fields: ApprovalFields,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApprovalDraft {
    #[serde(flatten)]
    pub key: ApprovalKey,
    #[serde(flatten)]
    pub fields: ApprovalFields,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Preparer {
    pub id: RecordId,
    pub name_key: String,
    pub full_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PreparerDraft {
    pub full_name: String,
}
