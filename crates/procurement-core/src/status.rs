//! Status derivation: ordered first-match-wins rule tables over workflow
//! state text and approval records.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::model::{Approval, ContractStatus, PurchaseStatus, RequestStatus};
use crate::vocabulary::{
    contains_any, normalize_text, FINAL_STAGE_MARKERS, NEGATIVE_OUTCOMES, POSITIVE_OUTCOMES,
};

/// Predicate over normalized state text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextPattern {
    Exact(&'static str),
    Contains(&'static str),
    /// Substring whose alphabetic ends are not glued to neighbouring letters.
    Token(&'static str),
    /// First pattern matches and the second does not.
    Unless(&'static TextPattern, &'static TextPattern),
}

impl TextPattern {
    #[must_use]
    pub fn matches(&self, normalized: &str) -> bool {
        match self {
            Self::Exact(expected) => normalized == *expected,
            Self::Contains(needle) => normalized.contains(needle),
            Self::Token(token) => contains_token(normalized, token),
            Self::Unless(positive, negative) => {
                positive.matches(normalized) && !negative.matches(normalized)
            }
        }
    }
}

fn contains_token(haystack: &str, token: &str) -> bool {
    let check_before = token.chars().next().is_some_and(char::is_alphabetic);
    let check_after = token.chars().next_back().is_some_and(char::is_alphabetic);
    haystack.match_indices(token).any(|(start, _)| {
        let glued_before = check_before
            && haystack[..start].chars().next_back().is_some_and(char::is_alphabetic);
        let glued_after = check_after
            && haystack[start + token.len()..].chars().next().is_some_and(char::is_alphabetic);
        !glued_before && !glued_after
    })
}

#[derive(Debug, Clone, Copy)]
pub struct TextRule<S: 'static> {
    pub pattern: TextPattern,
    pub status: S,
}

pub const CONTRACT_RULES: &[TextRule<ContractStatus>] = &[
    TextRule {
        pattern: TextPattern::Exact(
            "согласование договора - этап 1: согласован, синхронизация: исполнен",
        ),
        status: ContractStatus::Signed,
    },
    TextRule {
        pattern: TextPattern::Exact(
            "согласование договора - этап 1: согласован, синхронизация: на исполнении",
        ),
        status: ContractStatus::OnSigning,
    },
    TextRule {
        pattern: TextPattern::Exact("согласование договора - этап 1: согласован"),
        status: ContractStatus::Coordinated,
    },
    TextRule { pattern: TextPattern::Contains("аннулирован"), status: ContractStatus::Cancelled },
    TextRule {
        pattern: TextPattern::Unless(
            &TextPattern::Token("подписан"),
            &TextPattern::Token("не подписан"),
        ),
        status: ContractStatus::Signed,
    },
    TextRule {
        pattern: TextPattern::Contains("не согласован"),
        status: ContractStatus::NotCoordinated,
    },
    TextRule { pattern: TextPattern::Contains("на доработке"), status: ContractStatus::OnRevision },
    TextRule {
        pattern: TextPattern::Unless(
            &TextPattern::Contains("на согласовании"),
            &TextPattern::Token(": согласован"),
        ),
        status: ContractStatus::OnCoordination,
    },
    TextRule { pattern: TextPattern::Token(": согласован"), status: ContractStatus::Coordinated },
    TextRule { pattern: TextPattern::Contains("на подписании"), status: ContractStatus::OnSigning },
];

/// Evaluate `rules` in order against `text` after normalization.
#[must_use]
pub fn first_text_match<S: Copy>(rules: &[TextRule<S>], text: &str) -> Option<S> {
    let normalized = normalize_text(text);
    if normalized.is_empty() {
        return None;
    }
    rules.iter().find(|rule| rule.pattern.matches(&normalized)).map(|rule| rule.status)
}

#[must_use]
pub fn derive_contract_status(state: Option<&str>) -> Option<ContractStatus> {
    state.and_then(|text| first_text_match(CONTRACT_RULES, text))
}

#[must_use]
pub fn is_final_stage(stage: &str) -> bool {
    contains_any(&normalize_text(stage), FINAL_STAGE_MARKERS)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalClass {
    NotApproved,
    NotCoordinated,
    Active { final_stage: bool },
    CompletedPositive { final_stage: bool },
    Inconclusive,
}

/// Classify one approval record by its completion text and dates.
///
/// Negative outcomes win regardless of dates. A record that is assigned but
/// not completed is active; a completed record with an empty or positive
/// result counts as a completed approval.
#[must_use]
pub fn classify_approval(approval: &Approval) -> ApprovalClass {
    let final_stage = is_final_stage(&approval.key.stage);
    let result = approval.fields.completion_result.as_deref().map(normalize_text).unwrap_or_default();

    if contains_any(&result, NEGATIVE_OUTCOMES) {
        return if final_stage { ApprovalClass::NotApproved } else { ApprovalClass::NotCoordinated };
    }

    match (approval.fields.assignment_date, approval.fields.completion_date) {
        (Some(_), None) => ApprovalClass::Active { final_stage },
        (_, Some(_)) if result.is_empty() || contains_any(&result, POSITIVE_OUTCOMES) => {
            ApprovalClass::CompletedPositive { final_stage }
        }
        _ => ApprovalClass::Inconclusive,
    }
}

/// Evidence collected for one document before a cascade picks its status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    SpecificationExists,
    PurchaseExists,
    ContractExists,
    NotApproved,
    NotCoordinated,
    FinalApprovalCompleted,
    FinalApprovalActive,
    ApprovalActive,
}

#[must_use]
pub fn approval_signals(approvals: &[Approval]) -> BTreeSet<Signal> {
    let mut signals = BTreeSet::new();
    for approval in approvals {
        match classify_approval(approval) {
            ApprovalClass::NotApproved => {
                signals.insert(Signal::NotApproved);
            }
            ApprovalClass::NotCoordinated => {
                signals.insert(Signal::NotCoordinated);
            }
            ApprovalClass::Active { final_stage } => {
                signals.insert(Signal::ApprovalActive);
                if final_stage {
                    signals.insert(Signal::FinalApprovalActive);
                }
            }
            ApprovalClass::CompletedPositive { final_stage: true } => {
                signals.insert(Signal::FinalApprovalCompleted);
            }
            ApprovalClass::CompletedPositive { final_stage: false }
            | ApprovalClass::Inconclusive => {}
        }
    }
    signals
}

pub const REQUEST_CASCADE: &[(Signal, RequestStatus)] = &[
    (Signal::SpecificationExists, RequestStatus::SpecificationCreated),
    (Signal::PurchaseExists, RequestStatus::PurchaseCreated),
    (Signal::NotApproved, RequestStatus::NotApproved),
    (Signal::NotCoordinated, RequestStatus::NotCoordinated),
    (Signal::FinalApprovalCompleted, RequestStatus::Approved),
    (Signal::FinalApprovalActive, RequestStatus::OnApproval),
    (Signal::ApprovalActive, RequestStatus::OnCoordination),
];

pub const PURCHASE_CASCADE: &[(Signal, PurchaseStatus)] = &[
    (Signal::ContractExists, PurchaseStatus::ContractCreated),
    (Signal::NotApproved, PurchaseStatus::NotApproved),
    (Signal::NotCoordinated, PurchaseStatus::NotCoordinated),
    (Signal::FinalApprovalCompleted, PurchaseStatus::Approved),
    (Signal::FinalApprovalActive, PurchaseStatus::OnApproval),
    (Signal::ApprovalActive, PurchaseStatus::OnCoordination),
];

#[must_use]
pub fn first_signal<S: Copy>(cascade: &[(Signal, S)], signals: &BTreeSet<Signal>) -> Option<S> {
    cascade.iter().find(|(signal, _)| signals.contains(signal)).map(|(_, status)| *status)
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct RequestArtifacts {
    pub specification_exists: bool,
    pub purchase_exists: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct PurchaseArtifacts {
    pub contract_exists: bool,
}

#[must_use]
pub fn derive_request_status(
    approvals: &[Approval],
    artifacts: RequestArtifacts,
) -> Option<RequestStatus> {
    let mut signals = approval_signals(approvals);
    if artifacts.specification_exists {
        signals.insert(Signal::SpecificationExists);
    }
    if artifacts.purchase_exists {
        signals.insert(Signal::PurchaseExists);
    }
    first_signal(REQUEST_CASCADE, &signals)
}

#[must_use]
pub fn derive_purchase_status(
    approvals: &[Approval],
    artifacts: PurchaseArtifacts,
) -> Option<PurchaseStatus> {
    let mut signals = approval_signals(approvals);
    if artifacts.contract_exists {
        signals.insert(Signal::ContractExists);
    }
    first_signal(PURCHASE_CASCADE, &signals)
}

/// The status to write, if any: only a derived value that differs from `current`.
#[must_use]
pub fn status_transition<S: Copy + PartialEq>(current: S, derived: Option<S>) -> Option<S> {
    derived.filter(|status| *status != current)
}
