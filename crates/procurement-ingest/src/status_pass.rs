//! Status recomputation pass: contracts, then purchases, then requests.
//!
//! Each document is derived and written on its own; a failure is counted and
//! the pass moves on. Nothing is written when the derived status matches.

use std::fmt::Debug;

use procurement_core::{
    derive_contract_status, derive_purchase_status, derive_request_status, status_transition,
    ApprovalTarget, Contract, Purchase, PurchaseRequest,
};
use procurement_store_sqlite::SqliteStore;
use serde::{Deserialize, Serialize};

use crate::error::IngestError;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusCounts {
    pub examined: u64,
    pub changed: u64,
    pub unchanged: u64,
    /// No rule or signal applied; the stored status stays.
    pub undetermined: u64,
    pub errors: u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusPassReport {
    pub contracts: StatusCounts,
    pub purchases: StatusCounts,
    pub requests: StatusCounts,
}

impl StatusPassReport {
    #[must_use]
    pub fn changed(&self) -> u64 {
        self.contracts.changed + self.purchases.changed + self.requests.changed
    }
}

/// Derive and persist every document status.
///
/// # Errors
/// Returns an error only when a document listing cannot be read.
pub fn recompute_statuses(store: &mut SqliteStore) -> Result<StatusPassReport, IngestError> {
    let mut report = StatusPassReport::default();

    for contract in store.list_all::<Contract>()? {
        let derived = Ok(derive_contract_status(contract.fields.state.as_deref()));
        settle(&mut report.contracts, &contract.inner_id, contract.status, derived, |status| {
            store.set_contract_status(contract.id, status)
        });
    }

    for purchase in store.list_all::<Purchase>()? {
        let derived = store
            .approvals_for(ApprovalTarget::Purchase, &purchase.inner_id)
            .and_then(|approvals| {
                let artifacts = store.purchase_artifacts(&purchase)?;
                Ok(derive_purchase_status(&approvals, artifacts))
            });
        settle(&mut report.purchases, &purchase.inner_id, purchase.status, derived, |status| {
            store.set_purchase_status(purchase.id, status)
        });
    }

    for request in store.list_all::<PurchaseRequest>()? {
        let key = request.request_number.to_string();
        let derived = store.approvals_for(ApprovalTarget::PurchaseRequest, &key).and_then(
            |approvals| {
                let artifacts = store.request_artifacts(&request)?;
                Ok(derive_request_status(&approvals, artifacts))
            },
        );
        settle(&mut report.requests, &key, request.status, derived, |status| {
            store.set_request_status(request.id, status)
        });
    }

    tracing::info!(
        "status pass: contracts changed={} purchases changed={} requests changed={}",
        report.contracts.changed,
        report.purchases.changed,
        report.requests.changed
    );
    Ok(report)
}

fn settle<S, W>(
    counts: &mut StatusCounts,
    document: &str,
    current: S,
    derived: anyhow::Result<Option<S>>,
    write: W,
) where
    S: Copy + PartialEq + Debug,
    W: FnOnce(S) -> anyhow::Result<()>,
{
    counts.examined += 1;
    let derived = match derived {
        Ok(Some(status)) => status,
        Ok(None) => {
            counts.undetermined += 1;
            return;
        }
        Err(err) => {
            tracing::warn!("status derivation failed for {}: {:#}", document, err);
            counts.errors += 1;
            return;
        }
    };

    match status_transition(current, Some(derived)) {
        None => counts.unchanged += 1,
        Some(status) => match write(status) {
            Ok(()) => {
                tracing::debug!("{} status {:?} -> {:?}", document, current, status);
                counts.changed += 1;
            }
            Err(err) => {
                tracing::warn!("status write failed for {}: {:#}", document, err);
                counts.errors += 1;
            }
        },
    }
}
