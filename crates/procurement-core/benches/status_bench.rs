use criterion::{black_box, criterion_group, criterion_main, Criterion};
use procurement_core::{
    derive_contract_status, derive_request_status, Approval, ApprovalFields, ApprovalKey,
    ApprovalTarget, RecordId, RequestArtifacts,
};
use time::macros::datetime;

const STATES: &[&str] = &[
    "Согласование договора - Этап 1: Согласован, Синхронизация: Исполнен",
    "Согласование договора - Этап 1: На согласовании",
    "Согласование договора - Этап 2: Не согласован",
    "Договор подписан",
    "Договор на доработке у инициатора",
    "Черновик",
];

fn mk_approval(index: usize) -> Approval {
    let stage = if index % 5 == 0 { "Утверждение заявки" } else { "Согласование ЦФО" };
    Approval {
        id: RecordId::new(),
        key: ApprovalKey {
            target: ApprovalTarget::PurchaseRequest,
            document_key: (index / 8).to_string(),
            stage: stage.to_string(),
            role: format!("role-{index}"),
        },
        fields: ApprovalFields {
            assignee: Some("bench".to_string()),
            assignment_date: Some(datetime!(2024-04-01 08:00:00)),
            completion_date: (index % 3 != 0).then_some(datetime!(2024-04-02 12:00:00)),
            completion_result: (index % 7 == 0).then(|| "Согласован".to_string()),
            days_in_work: Some(1),
        },
    }
}

fn bench_contract_rules(c: &mut Criterion) {
    c.bench_function("contract_status_rules_6000_states", |b| {
        b.iter(|| {
            for _ in 0..1_000 {
                for state in STATES {
                    black_box(derive_contract_status(Some(black_box(state))));
                }
            }
        });
    });
}

fn bench_request_cascade(c: &mut Criterion) {
    let approvals = (0..1_000).map(mk_approval).collect::<Vec<_>>();

    c.bench_function("request_cascade_125_documents", |b| {
        b.iter(|| {
            for chunk in approvals.chunks(8) {
                black_box(derive_request_status(chunk, RequestArtifacts::default()));
            }
        });
    });
}

criterion_group!(status_benches, bench_contract_rules, bench_request_cascade);
criterion_main!(status_benches);
