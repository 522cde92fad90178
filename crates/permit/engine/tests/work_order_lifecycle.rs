//! Work-order transitions gated by linked permits

mod common;

use common::*;
use permit_engine::ReadinessStage;
use permit_storage::{IntentLog, IntentState};
use permit_types::{
    ApprovalStatus, ChecklistItem, CompletionReport, HistoryAction, NewPermit, PartUsage,
    PermitError, PermitId, PermitStatus, UserId, WorkOrder, WorkOrderId, WorkOrderStatus,
};
use std::collections::BTreeSet;

/// Link `permits`, approve and assign; the work order ends up `assigned`
async fn assigned_work_order(h: &Harness, permits: &[&PermitId]) -> WorkOrder {
    let wo = h
        .seed_work_order(
            WorkOrder::new(tenant(), "Replace conveyor bracket")
                .with_requested_by(UserId::new("rita")),
        )
        .await;
    for permit_id in permits {
        h.work_orders
            .link_permit(&technician(), &wo.id, permit_id)
            .await
            .unwrap();
    }
    h.work_orders
        .approve_work_order(&plant_manager(), &wo.id, Some("Go ahead".into()))
        .await
        .unwrap();
    h.work_orders
        .assign_work_order(&plant_manager(), &wo.id, vec![UserId::new("tess")])
        .await
        .unwrap()
}

#[tokio::test]
async fn start_activates_approved_permits() {
    let h = Harness::new();
    let permit = h.approved_permit(hot_work_permit()).await;
    let wo = assigned_work_order(&h, &[&permit.id]).await;
    assert_eq!(wo.status, WorkOrderStatus::Assigned);

    // Scenario 4
    let wo = h
        .work_orders
        .start_work_order(&technician(), &wo.id)
        .await
        .unwrap();
    assert_eq!(wo.status, WorkOrderStatus::InProgress);
    assert!(wo.started_at.is_some());
    assert_eq!(h.stored_work_order(&wo.id).await.status, WorkOrderStatus::InProgress);

    let stored = h.stored_permit(&permit.id).await;
    assert_eq!(stored.status, PermitStatus::Active);
    let started: Vec<_> = stored
        .history
        .iter()
        .filter(|e| matches!(e.action, HistoryAction::WorkOrderStarted { .. }))
        .collect();
    assert_eq!(started.len(), 1);

    // Nothing left half-applied
    assert!(h.storage.pending(&tenant()).await.unwrap().is_empty());
}

#[tokio::test]
async fn complete_blocked_by_open_isolation_step() {
    let h = Harness::new();
    let permit = h
        .approved_permit(hot_work_permit().with_isolation_step("Remove combustibles"))
        .await;
    let wo = assigned_work_order(&h, &[&permit.id]).await;
    let wo = h
        .work_orders
        .start_work_order(&technician(), &wo.id)
        .await
        .unwrap();

    // Scenario 5
    let err = h
        .work_orders
        .complete_work_order(&technician(), &wo.id, CompletionReport::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PermitError::NotReady(_)));
    assert_eq!(err.status_code(), 409);
    assert!(err.to_string().contains("incomplete isolation"));
    assert_eq!(
        h.stored_work_order(&wo.id).await.status,
        WorkOrderStatus::InProgress
    );
    assert_eq!(h.stored_permit(&permit.id).await.status, PermitStatus::Active);

    // Finish the checklist and complete
    h.permits
        .complete_isolation_step(&technician(), &permit.id, 0, None)
        .await
        .unwrap();
    let report = CompletionReport {
        parts_used: vec![PartUsage {
            part_id: "bracket-7".into(),
            quantity: 2,
        }],
        checklist: vec![ChecklistItem {
            label: "Area swept".into(),
            done: true,
        }],
        signature: Some("tess".into()),
        notes: None,
    };
    let wo = h
        .work_orders
        .complete_work_order(&technician(), &wo.id, report.clone())
        .await
        .unwrap();
    assert_eq!(wo.status, WorkOrderStatus::Completed);
    assert_eq!(wo.completion, Some(report));

    let stored = h.stored_permit(&permit.id).await;
    assert_eq!(stored.status, PermitStatus::Closed);
    assert!(matches!(
        stored.history.last().map(|e| &e.action),
        Some(HistoryAction::WorkOrderCompleted { .. })
    ));
}

#[tokio::test]
async fn start_refused_while_permit_pending() {
    let h = Harness::new();
    let pending = h
        .permits
        .create_permit(&technician(), hot_work_permit())
        .await
        .unwrap();
    let wo = h
        .seed_work_order(WorkOrder::new(tenant(), "Weld rail"))
        .await;
    h.work_orders
        .link_permit(&technician(), &wo.id, &pending.id)
        .await
        .unwrap();

    // Approval of the work order itself is gated at the start stage
    let err = h
        .work_orders
        .approve_work_order(&plant_manager(), &wo.id, None)
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 409);
    assert!(err.to_string().contains(&pending.permit_number));

    let stored = h.stored_work_order(&wo.id).await;
    assert_eq!(stored.approval_status, ApprovalStatus::Pending);
}

#[tokio::test]
async fn missing_linked_permit_is_not_found() {
    let h = Harness::new();
    let mut wo = WorkOrder::new(tenant(), "Ghost permit");
    wo.permits.insert(PermitId::new("vanished"));
    let wo = h.seed_work_order(wo).await;

    let err = h
        .work_orders
        .approve_work_order(&plant_manager(), &wo.id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, PermitError::LinkedPermitsMissing { .. }));
    assert_eq!(err.status_code(), 404);
}

#[tokio::test]
async fn required_permit_type_must_be_linked() {
    let h = Harness::new();
    let permit = h.approved_permit(hot_work_permit()).await;
    let wo = h
        .seed_work_order(
            WorkOrder::new(tenant(), "Tank entry").with_required_permit_type("confined_space"),
        )
        .await;
    h.work_orders
        .link_permit(&technician(), &wo.id, &permit.id)
        .await
        .unwrap();

    let err = h
        .work_orders
        .approve_work_order(&plant_manager(), &wo.id, None)
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 409);
    assert!(err.to_string().contains("confined_space"));

    let report = h
        .work_orders
        .gate()
        .ensure_readiness(
            &tenant(),
            &[permit.id.clone()],
            &BTreeSet::from(["hot_work".to_string()]),
            ReadinessStage::Start,
        )
        .await
        .unwrap();
    assert!(report.is_ok());
}

#[tokio::test]
async fn unknown_work_order_is_not_found() {
    let h = Harness::new();
    let err = h
        .work_orders
        .start_work_order(&technician(), &WorkOrderId::new("nope"))
        .await
        .unwrap_err();
    assert!(matches!(err, PermitError::WorkOrderNotFound(_)));
    assert_eq!(err.status_code(), 404);
}

#[tokio::test]
async fn transition_table_is_enforced() {
    let h = Harness::new();
    let wo = h
        .seed_work_order(WorkOrder::new(tenant(), "Paint railings"))
        .await;

    // Not approved yet
    let err = h
        .work_orders
        .assign_work_order(&plant_manager(), &wo.id, vec![UserId::new("tess")])
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 409);

    // Cannot start before assignment
    let err = h
        .work_orders
        .start_work_order(&technician(), &wo.id)
        .await
        .unwrap_err();
    assert!(matches!(err, PermitError::InvalidTransition { .. }));

    // Malformed assignee list is a validation error
    let err = h
        .work_orders
        .assign_work_order(&plant_manager(), &wo.id, vec![UserId::new(" ")])
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 400);

    h.work_orders
        .approve_work_order(&plant_manager(), &wo.id, None)
        .await
        .unwrap();
    let wo = h
        .work_orders
        .assign_work_order(
            &plant_manager(),
            &wo.id,
            vec![UserId::new("tess"), UserId::new(" tess "), UserId::new("tom")],
        )
        .await
        .unwrap();
    assert_eq!(wo.assignees, vec![UserId::new("tess"), UserId::new("tom")]);
    assert_eq!(h.notifier.delivered_to("tom").len(), 1);

    let wo = h
        .work_orders
        .cancel_work_order(&plant_manager(), &wo.id, Some("Budget cut".into()))
        .await
        .unwrap();
    assert_eq!(wo.status, WorkOrderStatus::Cancelled);
    assert_eq!(wo.cancellation_reason.as_deref(), Some("Budget cut"));

    let err = h
        .work_orders
        .cancel_work_order(&plant_manager(), &wo.id, None)
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 409);
}

#[tokio::test]
async fn rejection_records_the_decider() {
    let h = Harness::new();
    let wo = h
        .seed_work_order(
            WorkOrder::new(tenant(), "Repaint").with_requested_by(UserId::new("rita")),
        )
        .await;

    let wo = h
        .work_orders
        .reject_work_order(&plant_manager(), &wo.id, Some("Not this quarter".into()))
        .await
        .unwrap();
    assert_eq!(wo.approval_status, ApprovalStatus::Rejected);
    assert_eq!(wo.approved_by, Some(UserId::new("pat")));
    assert_eq!(wo.approval_notes.as_deref(), Some("Not this quarter"));
    assert!(h
        .notifier
        .delivered_to("rita")
        .iter()
        .any(|m| m.ends_with("was rejected")));

    let audit = h.audit.entries();
    assert_eq!(audit.last().unwrap().action, "workorder.reject");
}

#[tokio::test]
async fn link_and_unlink_keep_both_sides_consistent() {
    let h = Harness::new();
    let permit = h
        .permits
        .create_permit(&technician(), NewPermit::new("cold_work", "Swap filter"))
        .await
        .unwrap();
    let wo = h.seed_work_order(WorkOrder::new(tenant(), "Filter")).await;
    let other = h.seed_work_order(WorkOrder::new(tenant(), "Other")).await;

    let linked = h
        .work_orders
        .link_permit(&technician(), &wo.id, &permit.id)
        .await
        .unwrap();
    assert!(linked.permits.contains(&permit.id));
    assert_eq!(
        h.stored_permit(&permit.id).await.work_order,
        Some(wo.id.clone())
    );

    // Idempotent on the same pair
    let again = h
        .work_orders
        .link_permit(&technician(), &wo.id, &permit.id)
        .await
        .unwrap();
    assert_eq!(again.permits.len(), 1);

    // Already owned by another work order
    let err = h
        .work_orders
        .link_permit(&technician(), &other.id, &permit.id)
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 400);

    let unlinked = h
        .work_orders
        .unlink_permit(&technician(), &wo.id, &permit.id)
        .await
        .unwrap();
    assert!(unlinked.permits.is_empty());
    let stored = h.stored_permit(&permit.id).await;
    assert_eq!(stored.work_order, None);
    let actions: Vec<&str> = stored.history.iter().map(|e| e.action.name()).collect();
    assert_eq!(
        actions,
        vec!["created", "work-order-linked", "work-order-unlinked"]
    );

    let err = h
        .work_orders
        .unlink_permit(&technician(), &wo.id, &permit.id)
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 400);
}

#[tokio::test]
async fn failed_second_write_leaves_a_replayable_intent() {
    let h = Harness::new();
    let permit = h.approved_permit(hot_work_permit()).await;
    let wo = assigned_work_order(&h, &[&permit.id]).await;

    h.flaky.fail_work_order_saves(true);
    let err = h
        .work_orders
        .start_work_order(&technician(), &wo.id)
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 500);
    assert_eq!(err.public_message(), "Internal server error");

    // Permit written, work order not
    assert_eq!(h.stored_permit(&permit.id).await.status, PermitStatus::Active);
    assert_eq!(
        h.stored_work_order(&wo.id).await.status,
        WorkOrderStatus::Assigned
    );
    let pending = h.storage.pending(&tenant()).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].transition, "start");
    assert_eq!(pending[0].state, IntentState::Pending);

    h.flaky.fail_work_order_saves(false);
    let applied = h
        .work_orders
        .replay_pending_intents(&technician())
        .await
        .unwrap();
    assert_eq!(applied, 1);
    assert_eq!(
        h.stored_work_order(&wo.id).await.status,
        WorkOrderStatus::InProgress
    );
    assert!(h.storage.pending(&tenant()).await.unwrap().is_empty());

    // Replaying again has nothing to do
    let applied = h
        .work_orders
        .replay_pending_intents(&technician())
        .await
        .unwrap();
    assert_eq!(applied, 0);
}

#[tokio::test]
async fn replay_never_reverts_a_later_cancel() {
    let h = Harness::new();
    let permit = h.approved_permit(hot_work_permit()).await;
    let wo = assigned_work_order(&h, &[&permit.id]).await;

    h.flaky.fail_work_order_saves(true);
    h.work_orders
        .start_work_order(&technician(), &wo.id)
        .await
        .unwrap_err();
    h.flaky.fail_work_order_saves(false);

    let cancelled = h
        .work_orders
        .cancel_work_order(&plant_manager(), &wo.id, Some("Line shut down".into()))
        .await
        .unwrap();
    assert_eq!(cancelled.status, WorkOrderStatus::Cancelled);

    let applied = h
        .work_orders
        .replay_pending_intents(&technician())
        .await
        .unwrap();
    assert_eq!(applied, 0);
    let stored = h.stored_work_order(&wo.id).await;
    assert_eq!(stored.status, WorkOrderStatus::Cancelled);
    assert_eq!(stored.cancellation_reason.as_deref(), Some("Line shut down"));
    assert!(h.storage.pending(&tenant()).await.unwrap().is_empty());
}

#[tokio::test]
async fn replay_keeps_permit_writes_made_after_the_failure() {
    let h = Harness::new();
    let permit = h
        .approved_permit(hot_work_permit().with_isolation_step("Lock out feeder"))
        .await;
    let wo = assigned_work_order(&h, &[&permit.id]).await;

    // First write of the pair fails; nothing lands
    h.flaky.fail_permit_saves(&permit.id, true);
    h.work_orders
        .start_work_order(&technician(), &wo.id)
        .await
        .unwrap_err();
    h.flaky.fail_permit_saves(&permit.id, false);
    assert_eq!(h.stored_permit(&permit.id).await.status, PermitStatus::Approved);

    h.permits
        .complete_isolation_step(&technician(), &permit.id, 0, Some("Tagged".into()))
        .await
        .unwrap();

    let applied = h
        .work_orders
        .replay_pending_intents(&technician())
        .await
        .unwrap();
    assert_eq!(applied, 0);

    let stored = h.stored_permit(&permit.id).await;
    assert_eq!(stored.status, PermitStatus::Approved);
    assert!(stored.isolation_complete());
    assert!(matches!(
        stored.history.last().map(|e| &e.action),
        Some(HistoryAction::IsolationStepCompleted { index: 0 })
    ));
    assert_eq!(
        h.stored_work_order(&wo.id).await.status,
        WorkOrderStatus::Assigned
    );

    // The transition itself can simply be retried
    let wo = h
        .work_orders
        .start_work_order(&technician(), &wo.id)
        .await
        .unwrap();
    assert_eq!(wo.status, WorkOrderStatus::InProgress);
    assert_eq!(h.stored_permit(&permit.id).await.status, PermitStatus::Active);
}

#[tokio::test]
async fn link_refused_when_another_work_order_lists_the_permit() {
    let h = Harness::new();
    let permit = h
        .permits
        .create_permit(&technician(), NewPermit::new("cold_work", "Swap filter"))
        .await
        .unwrap();
    // Listed by a work order while the permit's back-reference is unset
    let mut owner = WorkOrder::new(tenant(), "Owner");
    owner.permits.insert(permit.id.clone());
    let owner = h.seed_work_order(owner).await;
    let other = h.seed_work_order(WorkOrder::new(tenant(), "Other")).await;

    let err = h
        .work_orders
        .link_permit(&technician(), &other.id, &permit.id)
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 400);
    assert!(err.to_string().contains(&owner.id.to_string()));
    assert!(h.stored_work_order(&other.id).await.permits.is_empty());
    assert_eq!(h.stored_permit(&permit.id).await.work_order, None);
}

#[tokio::test]
async fn start_without_permits_is_allowed() {
    let h = Harness::new();
    let wo = assigned_work_order(&h, &[]).await;
    let wo = h
        .work_orders
        .start_work_order(&technician(), &wo.id)
        .await
        .unwrap();
    assert_eq!(wo.status, WorkOrderStatus::InProgress);
    assert!(h.storage.pending(&tenant()).await.unwrap().is_empty());
}

#[tokio::test]
async fn completion_report_is_validated_before_anything_else() {
    let h = Harness::new();
    let report = CompletionReport {
        parts_used: vec![PartUsage {
            part_id: "".into(),
            quantity: 1,
        }],
        ..CompletionReport::default()
    };
    let err = h
        .work_orders
        .complete_work_order(&technician(), &WorkOrderId::new("nope"), report)
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 400);
}
