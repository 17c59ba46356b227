//! Integration tests for flow-entry reconciliation on a single controller.
//!
//! These tests drive a running manager and event loop against a recording
//! flow programmer and check:
//! - install fan-out over container flows and identity conflicts
//! - in-place and decoupled modify, including rollback
//! - group removal, device notifications and container mode
//!
//! Run with: `cargo test --test reconciliation_integration`

mod common;

use std::sync::Arc;

use common::*;
use flowrules::container::ContainerView;
use flowrules::model::{Action, ContainerFlow, Flow, Match, MatchField, Status, StatusCode, UpdateType};
use flowrules::telemetry::TelemetryEvent;
use flowrules::DispatchMode;

fn vlan(id: u16) -> ContainerFlow {
    ContainerFlow::new(Match::new().with(MatchField::DlVlan(id)))
}

fn tenant(flows: Vec<ContainerFlow>) -> ContainerView {
    let view = ContainerView::new("tenant");
    view.set_container_flows(flows);
    view
}

// ============================================================================
// Install
// ============================================================================

#[tokio::test]
async fn test_install_is_idempotent() {
    let h = Harness::start();
    let web = drop_entry("sw1", "web", tcp_dst(80));

    let first = h.frm.install_flow_entry(&web, DispatchMode::Sync).await;
    assert!(first.is_success());
    assert_eq!(first.request_id(), 1);

    let second = h.frm.install_flow_entry(&web, DispatchMode::Sync).await;
    assert!(second.is_success());
    assert_eq!(second.description(), "Entry is already installed");
    assert_eq!(h.programmer.count(CallKind::Add), 1);

    assert!(h.frm.with_database(|db| db.is_consistent()));
    h.stop().await;
}

#[tokio::test]
async fn test_install_fans_out_over_container_flows() {
    let h = Harness::start_in(tenant(vec![vlan(10), vlan(20), vlan(30)]));
    let ssh = drop_entry("sw1", "ssh", tcp_dst(22)).with_group("admin");

    let status = h.frm.install_flow_entry(&ssh, DispatchMode::Sync).await;
    assert!(status.is_success());
    assert_eq!(h.programmer.count(CallKind::Add), 3);

    let installed = h.frm.installed_entries_for_node(&node("sw1"));
    assert_eq!(installed.len(), 3);
    assert!(installed.iter().all(|e| e.original() == &ssh));
    assert!(installed
        .iter()
        .all(|e| e.install().flow().matching().field(flowrules::model::MatchType::DlVlan).is_some()));

    assert_eq!(h.frm.flow_entries_for_group("admin"), vec![ssh.clone()]);
    assert_eq!(h.frm.installed_flow_entries_for_group("admin").len(), 3);
    h.stop().await;
}

#[tokio::test]
async fn test_entry_outside_every_container_flow_conflicts() {
    let h = Harness::start_in(tenant(vec![vlan(10), vlan(20)]));
    let stray = drop_entry("sw1", "stray", Match::new().with(MatchField::DlVlan(99)));

    assert!(h.frm.check_flow_entry_conflict(&stray));
    let status = h.frm.install_flow_entry(&stray, DispatchMode::Sync).await;
    assert_eq!(status.code(), StatusCode::Conflict);
    assert_eq!(h.programmer.count(CallKind::Add), 0);
    h.stop().await;
}

#[tokio::test]
async fn test_same_match_and_priority_conflicts() {
    let h = Harness::start();
    let a = drop_entry("sw1", "a", tcp_dst(80));
    let b = entry("sw1", "b", tcp_dst(80), vec![Action::Controller]);

    assert!(h.frm.install_flow_entry(&a, DispatchMode::Sync).await.is_success());
    let status = h.frm.install_flow_entry(&b, DispatchMode::Sync).await;
    assert_eq!(status.code(), StatusCode::Conflict);
    assert_eq!(h.frm.original_entry(&b), Some(a));
    h.stop().await;
}

#[tokio::test]
async fn test_device_failure_is_reported_and_not_recorded() {
    let h = Harness::start();
    h.programmer
        .fail_call(CallKind::Add, 0, Status::new(StatusCode::InternalError, "table full"));

    let status = h
        .frm
        .install_flow_entry(&drop_entry("sw1", "web", tcp_dst(80)), DispatchMode::Sync)
        .await;
    assert_eq!(status.code(), StatusCode::InternalError);
    assert_eq!(status.description(), "table full");
    assert!(h.frm.installed_entries_for_node(&node("sw1")).is_empty());
    h.stop().await;
}

#[tokio::test]
async fn test_validation_rejects_foreign_ports_and_flooding() {
    let h = Harness::start_in(ContainerView::new("tenant"));

    let foreign = entry("sw1", "x", tcp_dst(80), vec![Action::Output(node("sw2").port(1))]);
    let status = h.frm.install_flow_entry(&foreign, DispatchMode::Sync).await;
    assert_eq!(status.code(), StatusCode::BadRequest);

    let flood = entry("sw1", "y", tcp_dst(80), vec![Action::Flood]);
    let status = h.frm.install_flow_entry(&flood, DispatchMode::Sync).await;
    assert_eq!(status.code(), StatusCode::BadRequest);

    assert!(h.programmer.calls().is_empty());
    h.stop().await;
}

// ============================================================================
// Remove
// ============================================================================

#[tokio::test]
async fn test_uninstall_removes_every_variant() {
    let h = Harness::start_in(tenant(vec![vlan(10), vlan(20)]));
    let ssh = drop_entry("sw1", "ssh", tcp_dst(22));
    assert!(h.frm.install_flow_entry(&ssh, DispatchMode::Sync).await.is_success());

    let status = h.frm.uninstall_flow_entry(&ssh, DispatchMode::Sync).await;
    assert!(status.is_success());
    assert_eq!(h.programmer.count(CallKind::Remove), 2);
    assert!(h.frm.installed_entries_for_node(&node("sw1")).is_empty());
    assert!(h.frm.original_entry(&ssh).is_none());

    let again = h.frm.uninstall_flow_entry(&ssh, DispatchMode::Sync).await;
    assert_eq!(again.description(), "Entry is not installed");
    h.stop().await;
}

#[tokio::test]
async fn test_group_removal_reports_holdouts() {
    let h = Harness::start();
    for (name, port) in [("a", 80), ("b", 81)] {
        let e = drop_entry("sw1", name, tcp_dst(port)).with_group("web");
        assert!(h.frm.install_flow_entry(&e, DispatchMode::Sync).await.is_success());
    }
    h.programmer
        .fail_call(CallKind::Remove, 0, Status::new(StatusCode::InternalError, "device busy"));

    let status = h.frm.uninstall_flow_entry_group("web", DispatchMode::Sync).await;
    assert_eq!(status.code(), StatusCode::InternalError);
    assert_eq!(status.description(), "Not all the flows were removed: device busy");
    assert_eq!(h.frm.flow_entries_for_group("web").len(), 1);
    h.stop().await;
}

#[tokio::test]
async fn test_group_removal_rejects_reserved_names() {
    let h = Harness::start();
    let empty = h.frm.uninstall_flow_entry_group("", DispatchMode::Sync).await;
    assert_eq!(empty.code(), StatusCode::BadRequest);

    let internal = h
        .frm
        .uninstall_flow_entry_group(flowrules::static_flows::INTERNAL_STATIC_FLOW_GROUP, DispatchMode::Sync)
        .await;
    assert_eq!(internal.code(), StatusCode::BadRequest);
    h.stop().await;
}

// ============================================================================
// Modify
// ============================================================================

#[tokio::test]
async fn test_modify_in_place_when_variants_pair_up() {
    let h = Harness::start();
    let current = drop_entry("sw1", "web", tcp_dst(80));
    assert!(h.frm.install_flow_entry(&current, DispatchMode::Sync).await.is_success());

    let updated = entry("sw1", "web", tcp_dst(80), vec![Action::Controller]);
    let status = h.frm.modify_flow_entry(&current, &updated, DispatchMode::Sync).await;
    assert!(status.is_success());
    assert_eq!(h.programmer.count(CallKind::Modify), 1);
    assert_eq!(h.programmer.count(CallKind::Remove), 0);
    assert_eq!(h.frm.original_entry(&current), Some(updated));
    assert!(h.telemetry.contains(|e| matches!(e, TelemetryEvent::ModifiedInPlace { variants: 1, .. })));
    h.stop().await;
}

#[tokio::test]
async fn test_modify_decoupled_when_variant_count_changes() {
    let h = Harness::start_in(tenant(vec![vlan(10), vlan(20)]));
    let current = drop_entry("sw1", "ssh", tcp_dst(22));
    assert!(h.frm.install_flow_entry(&current, DispatchMode::Sync).await.is_success());

    let narrowed = drop_entry("sw1", "ssh", tcp_dst(22).with(MatchField::DlVlan(10)));
    let status = h.frm.modify_flow_entry(&current, &narrowed, DispatchMode::Sync).await;
    assert!(status.is_success());
    assert_eq!(h.programmer.count(CallKind::Remove), 2);
    assert_eq!(h.programmer.count(CallKind::Add), 3);

    let installed = h.frm.installed_entries_for_node(&node("sw1"));
    assert_eq!(installed.len(), 1);
    assert_eq!(installed[0].original(), &narrowed);
    assert!(h.telemetry.contains(|e| matches!(
        e,
        TelemetryEvent::ModifyDecoupled {
            removed: 2,
            added: 1,
            ..
        }
    )));
    h.stop().await;
}

#[tokio::test]
async fn test_failed_modify_rolls_back_earlier_pairs() {
    let h = Harness::start_in(tenant(vec![vlan(10), vlan(20)]));
    let current = drop_entry("sw1", "ssh", tcp_dst(22));
    assert!(h.frm.install_flow_entry(&current, DispatchMode::Sync).await.is_success());
    h.programmer
        .fail_call(CallKind::Modify, 1, Status::new(StatusCode::InternalError, "rejected"));

    let updated = entry("sw1", "ssh", tcp_dst(22), vec![Action::Controller]);
    let status = h.frm.modify_flow_entry(&current, &updated, DispatchMode::Sync).await;
    assert_eq!(status.code(), StatusCode::InternalError);
    assert_eq!(status.description(), "rejected");

    // Pair 0 modified, pair 1 rejected, pair 0 restored.
    assert_eq!(h.programmer.count(CallKind::Modify), 3);
    let installed = h.frm.installed_entries_for_node(&node("sw1"));
    assert_eq!(installed.len(), 2);
    assert!(installed.iter().all(|e| e.install().flow().actions() == [Action::Drop]));
    assert!(h.telemetry.contains(|e| matches!(e, TelemetryEvent::ModifyRolledBack { restored: 1, .. })));
    h.stop().await;
}

#[tokio::test]
async fn test_failed_rollback_is_unrecoverable() {
    let h = Harness::start_in(tenant(vec![vlan(10), vlan(20)]));
    let current = drop_entry("sw1", "ssh", tcp_dst(22));
    assert!(h.frm.install_flow_entry(&current, DispatchMode::Sync).await.is_success());
    h.programmer.fail_call(CallKind::Modify, 1, Status::from(StatusCode::InternalError));
    h.programmer.fail_call(CallKind::Modify, 2, Status::from(StatusCode::InternalError));

    let updated = entry("sw1", "ssh", tcp_dst(22), vec![Action::Controller]);
    let status = h.frm.modify_flow_entry(&current, &updated, DispatchMode::Sync).await;
    assert_eq!(status.code(), StatusCode::InternalError);
    assert_eq!(status.description(), "Flow recovery failed ! Unrecoverable Error");
    assert!(h.telemetry.contains(|e| matches!(e, TelemetryEvent::ModifyUnrecoverable { .. })));
    h.stop().await;
}

#[tokio::test]
async fn test_modify_guards() {
    let h = Harness::start();
    let a = drop_entry("sw1", "a", tcp_dst(80));
    let b = drop_entry("sw1", "b", tcp_dst(81));
    assert!(h.frm.install_flow_entry(&a, DispatchMode::Sync).await.is_success());
    assert!(h.frm.install_flow_entry(&b, DispatchMode::Sync).await.is_success());

    let same = h.frm.modify_flow_entry(&a, &a, DispatchMode::Sync).await;
    assert_eq!(same.description(), "Modify skipped as flows are the same");

    let renamed = drop_entry("sw1", "other", tcp_dst(80));
    let status = h.frm.modify_flow_entry(&a, &renamed, DispatchMode::Sync).await;
    assert_eq!(status.code(), StatusCode::NotAcceptable);

    // Moving `a` onto `b`'s match would take over b's identity.
    let onto_b = drop_entry("sw1", "a", tcp_dst(81));
    let status = h.frm.modify_flow_entry(&a, &onto_b, DispatchMode::Sync).await;
    assert_eq!(status.code(), StatusCode::Conflict);
    assert_eq!(h.programmer.count(CallKind::Modify), 0);
    h.stop().await;
}

#[tokio::test]
async fn test_modify_or_add() {
    let h = Harness::start();
    let web = drop_entry("sw1", "web", tcp_dst(80));

    assert!(h.frm.modify_or_add_flow_entry(&web, DispatchMode::Sync).await.is_success());
    assert_eq!(h.programmer.count(CallKind::Add), 1);

    let updated = entry("sw1", "web", tcp_dst(80), vec![Action::Controller]);
    assert!(h.frm.modify_or_add_flow_entry(&updated, DispatchMode::Sync).await.is_success());
    assert_eq!(h.programmer.count(CallKind::Modify), 1);
    h.stop().await;
}

// ============================================================================
// Output ports
// ============================================================================

#[tokio::test]
async fn test_output_port_editing() {
    let h = Harness::start();
    let sw1 = node("sw1");
    let web = entry("sw1", "web", tcp_dst(80), vec![Action::Output(sw1.port(1))]);
    assert!(h.frm.install_flow_entry(&web, DispatchMode::Sync).await.is_success());

    let status = h.frm.add_output_port(&sw1, "web", &[sw1.port(2)]).await;
    assert!(status.is_success());
    let stored = h.frm.original_entry(&web).expect("stored entry");
    assert_eq!(stored.flow().output_ports().count(), 2);

    assert!(h.frm.remove_output_port(&sw1, "web", &[sw1.port(1)]).await.is_success());
    assert_eq!(h.frm.output_port(&sw1, "web"), Some(sw1.port(2)));

    assert!(h.frm.replace_output_port(&sw1, "web", &sw1.port(3)).await.is_success());
    assert_eq!(h.frm.output_port(&sw1, "web"), Some(sw1.port(3)));

    let missing = h.frm.add_output_port(&sw1, "nope", &[sw1.port(4)]).await;
    assert_eq!(missing.code(), StatusCode::NotFound);
    h.stop().await;
}

// ============================================================================
// Device notifications
// ============================================================================

#[tokio::test]
async fn test_node_down_purges_entries() {
    let h = Harness::start();
    let web = drop_entry("sw1", "web", tcp_dst(80));
    let other = drop_entry("sw2", "web", tcp_dst(80));
    assert!(h.frm.install_flow_entry(&web, DispatchMode::Sync).await.is_success());
    assert!(h.frm.install_flow_entry(&other, DispatchMode::Sync).await.is_success());

    h.frm.on_node_down(node("sw1"));
    wait_until(|| h.frm.installed_entries_for_node(&node("sw1")).is_empty()).await;

    assert!(h.frm.original_entry(&web).is_none());
    assert_eq!(h.frm.installed_entries_for_node(&node("sw2")).len(), 1);
    assert_eq!(h.programmer.count(CallKind::Remove), 0);
    assert!(h.telemetry.contains(|e| matches!(e, TelemetryEvent::NodePurged { entries: 1, .. })));
    h.stop().await;
}

#[tokio::test]
async fn test_device_error_report_notifies_listeners() {
    let h = Harness::start();
    let listener = Arc::new(RecordingListener::default());
    h.frm.add_listener(listener.clone());

    let web = drop_entry("sw1", "web", tcp_dst(80));
    let status = h.frm.install_flow_entry(&web, DispatchMode::Async).await;
    let request_id = status.request_id();

    h.frm
        .on_device_error(node("sw1"), request_id, Some("table full".to_string()));
    wait_until(|| !listener.failures.lock().is_empty()).await;

    assert_eq!(listener.failures.lock()[0], (request_id, "table full".to_string()));
    assert!(h.frm.installed_entries_for_node(&node("sw1")).is_empty());
    h.stop().await;
}

#[tokio::test]
async fn test_flow_removed_by_device() {
    let h = Harness::start();
    let listener = Arc::new(RecordingListener::default());
    h.frm.add_listener(listener.clone());

    let web = drop_entry("sw1", "web", tcp_dst(80));
    assert!(h.frm.install_flow_entry(&web, DispatchMode::Sync).await.is_success());

    h.frm
        .on_flow_removed(node("sw1"), Flow::new(tcp_dst(80), vec![Action::Drop]));
    wait_until(|| !listener.removals.lock().is_empty()).await;

    assert_eq!(listener.removals.lock()[0], (web.clone(), StatusCode::Gone));
    assert!(h.frm.original_entry(&web).is_none());
    h.stop().await;
}

#[tokio::test]
async fn test_port_removal_drops_dependent_entries() {
    let h = Harness::start();
    let sw1 = node("sw1");
    let uses_2 = entry("sw1", "a", tcp_dst(80), vec![Action::Output(sw1.port(2))]);
    let uses_3 = entry("sw1", "b", tcp_dst(81), vec![Action::Output(sw1.port(3))]);
    assert!(h.frm.install_flow_entry(&uses_2, DispatchMode::Sync).await.is_success());
    assert!(h.frm.install_flow_entry(&uses_3, DispatchMode::Sync).await.is_success());

    h.frm.on_port_update(sw1.port(2), UpdateType::Removed);
    wait_until(|| h.frm.installed_entries_for_node(&sw1).len() == 1).await;
    assert_eq!(h.frm.original_entry(&uses_3), Some(uses_3));
    h.stop().await;
}

#[tokio::test]
async fn test_barrier_passthrough() {
    let h = Harness::start();
    let status = h
        .frm
        .solicit_status_response(&node("sw1"), DispatchMode::Sync)
        .await;
    assert!(status.is_success());
    assert_eq!(h.programmer.count(CallKind::Barrier), 1);
    h.stop().await;
}

// ============================================================================
// Container flows and container mode
// ============================================================================

#[tokio::test]
async fn test_container_flow_change_reinstalls_entries() {
    let h = Harness::start_in(tenant(vec![vlan(10)]));
    let ssh = drop_entry("sw1", "ssh", tcp_dst(22));
    assert!(h.frm.install_flow_entry(&ssh, DispatchMode::Sync).await.is_success());
    assert_eq!(h.frm.installed_entries_for_node(&node("sw1")).len(), 1);

    h.frm.container_flow_updated(None, &vlan(20), UpdateType::Added);
    wait_until(|| {
        h.telemetry
            .contains(|e| matches!(e, TelemetryEvent::ContainerFlowsReconciled { .. }))
    })
    .await;

    assert!(h.telemetry.contains(|e| matches!(
        e,
        TelemetryEvent::ContainerFlowsReconciled {
            reinstalled: 1,
            failed: 0
        }
    )));
    assert_eq!(h.frm.installed_entries_for_node(&node("sw1")).len(), 2);
    assert_eq!(h.programmer.count(CallKind::Remove), 1);
    h.stop().await;
}

#[tokio::test]
async fn test_container_mode_parks_and_restores_entries() {
    let h = Harness::start();
    let user = drop_entry("sw1", "user", tcp_dst(80));
    let internal = drop_entry("sw1", "__internal__", tcp_dst(81)).with_internal(true);
    assert!(h.frm.install_flow_entry(&user, DispatchMode::Sync).await.is_success());
    assert!(h.frm.install_flow_entry(&internal, DispatchMode::Sync).await.is_success());

    h.frm.container_mode_updated(UpdateType::Added).await;
    assert!(h.frm.container().in_container_mode());
    assert_eq!(h.frm.inactive_flow_entries(), vec![user.clone()]);
    assert!(h.frm.original_entry(&user).is_none());
    assert!(h.frm.original_entry(&internal).is_some());

    let refused = h
        .frm
        .install_flow_entry(&drop_entry("sw1", "late", tcp_dst(82)), DispatchMode::Sync)
        .await;
    assert_eq!(refused.code(), StatusCode::NotAcceptable);
    let group = h.frm.uninstall_flow_entry_group("any", DispatchMode::Sync).await;
    assert_eq!(group.code(), StatusCode::NotAcceptable);

    h.frm.container_mode_updated(UpdateType::Removed).await;
    assert!(!h.frm.container().in_container_mode());
    assert!(h.frm.inactive_flow_entries().is_empty());
    assert_eq!(h.frm.original_entry(&user), Some(user));
    h.stop().await;
}

#[tokio::test]
async fn test_stop_parks_entries_and_refuses_installs() {
    let h = Harness::start();
    let web = drop_entry("sw1", "web", tcp_dst(80));
    assert!(h.frm.install_flow_entry(&web, DispatchMode::Sync).await.is_success());

    h.frm.stop().await;
    assert!(h.frm.is_stopping());
    assert_eq!(h.frm.inactive_flow_entries(), vec![web.clone()]);
    assert!(h.frm.installed_entries_for_node(&node("sw1")).is_empty());

    let refused = h.frm.install_flow_entry(&web, DispatchMode::Sync).await;
    assert_eq!(refused.code(), StatusCode::NotAcceptable);
    h.stop().await;
}

#[tokio::test]
async fn test_stopping_manager_refuses_every_change() {
    let h = Harness::start();
    let web = drop_entry("sw1", "web", tcp_dst(80)).with_group("web");
    assert!(h.frm.install_flow_entry(&web, DispatchMode::Sync).await.is_success());

    h.frm.stop().await;
    let calls = h.programmer.calls().len();

    let punted = entry("sw1", "web", tcp_dst(80), vec![Action::Controller]).with_group("web");
    let statuses = [
        h.frm.uninstall_flow_entry(&web, DispatchMode::Sync).await,
        h.frm.modify_flow_entry(&web, &punted, DispatchMode::Sync).await,
        h.frm.uninstall_flow_entry_group("web", DispatchMode::Sync).await,
    ];
    for status in statuses {
        assert_eq!(status.code(), StatusCode::NotAcceptable);
        assert_eq!(status.description(), "Forwarding rules manager is stopping");
    }
    assert_eq!(h.programmer.calls().len(), calls);
    h.stop().await;
}
