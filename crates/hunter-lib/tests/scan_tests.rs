//! Integration tests for scan orchestration against stubbed upstreams

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use hunter_lib::cache::ResponseCache;
use hunter_lib::detection::Thresholds;
use hunter_lib::inventory::InventoryStore;
use hunter_lib::models::{PowerState, RunStatus, Source, SourceId, SourceSpec, SourceKind, VmSnapshot, VmStatus};
use hunter_lib::registry::SourceRegistry;
use hunter_lib::runs::RunLedger;
use hunter_lib::scan::{ScanOrchestrator, ScanOutcome};
use hunter_lib::sources::ConnectionConfig;

fn orchestrator() -> ScanOrchestrator {
    ScanOrchestrator::new(
        Arc::new(SourceRegistry::new()),
        Arc::new(InventoryStore::new()),
        Arc::new(RunLedger::new()),
        Arc::new(ResponseCache::new()),
        Thresholds::default(),
    )
}

fn hypervisor_spec(name: &str, endpoint: String) -> SourceSpec {
    SourceSpec {
        name: name.into(),
        kind: SourceKind::Hypervisor,
        enabled: true,
        connection: ConnectionConfig {
            endpoint: Some(endpoint),
            user: Some("scanner".into()),
            password: Some("hunter2".into()),
            ..Default::default()
        },
    }
}

fn storage_spec(name: &str, endpoint: String) -> SourceSpec {
    SourceSpec {
        name: name.into(),
        kind: SourceKind::StorageMonitor,
        enabled: true,
        connection: ConnectionConfig {
            endpoint: Some(endpoint),
            ..Default::default()
        },
    }
}

fn source_ref(orchestrator: &ScanOrchestrator, id: SourceId) -> Source {
    orchestrator.sources().get(id).expect("source")
}

#[tokio::test]
async fn test_zombie_vm_classified_through_full_scan() {
    let mut server = mockito::Server::new_async().await;
    let boot = (Utc::now() - chrono::Duration::days(45)).to_rfc3339();
    let _mock = server
        .mock("GET", "/api/vms")
        .with_status(200)
        .with_body(
            serde_json::json!({
                "vms": [{
                    "uuid": "u1",
                    "name": "forgotten",
                    "power_state": "poweredOff",
                    "boot_time": boot,
                }]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let orchestrator = orchestrator();
    let source = orchestrator
        .sources()
        .add(hypervisor_spec("vcenter-prod", server.url()));

    let report = orchestrator.run_scan(Some(source.id)).await;

    assert!(report.ok);
    assert_eq!(report.results.len(), 1);
    assert!(matches!(
        report.results[0].outcome,
        ScanOutcome::Success { synced: 1, .. }
    ));

    let run = orchestrator.runs().get(report.results[0].run_id).unwrap();
    assert_eq!(run.status, RunStatus::Success);
    assert_eq!(run.message, "1 VMs");

    let record = orchestrator.inventory().get(source.id, "u1").unwrap();
    assert_eq!(record.status, VmStatus::Idle);
    assert_eq!(record.idle_score, Some(1.0));
}

#[tokio::test]
async fn test_failing_source_does_not_abort_sibling() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/api/vms")
        .with_status(200)
        .with_body(
            serde_json::json!({
                "vms": [{"id": "lun-1", "name": "backup", "read_kbps": 1.0, "write_kbps": 2.0}]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let orchestrator = orchestrator();
    // Nothing listens here; the fetch fails at the transport layer
    let broken = orchestrator
        .sources()
        .add(hypervisor_spec("vcenter-dead", "http://127.0.0.1:9".into()));
    let healthy = orchestrator
        .sources()
        .add(storage_spec("stormon-prod", server.url()));

    // Seed the broken source with a record stale enough to look missing
    let stale_seen = Utc::now() - chrono::Duration::days(30);
    let mut snapshot = VmSnapshot::new("old-vm", "old-vm");
    snapshot.power_state = PowerState::PoweredOn;
    orchestrator
        .inventory()
        .upsert(&source_ref(&orchestrator, broken.id), snapshot, stale_seen)
        .unwrap();

    let report = orchestrator.run_scan(None).await;
    assert!(report.ok);
    assert_eq!(report.results.len(), 2);

    let broken_result = report
        .results
        .iter()
        .find(|result| result.source_id == broken.id)
        .unwrap();
    match &broken_result.outcome {
        ScanOutcome::Failed { error } => assert!(error.contains("transport error")),
        other => panic!("expected failure, got {other:?}"),
    }
    let failed_run = orchestrator.runs().get(broken_result.run_id).unwrap();
    assert_eq!(failed_run.status, RunStatus::Failed);
    assert!(failed_run.message.contains("transport error"));

    // Classification skipped on failure: the stale record is held at its
    // last-known status instead of flipping to missing
    let held = orchestrator.inventory().get(broken.id, "old-vm").unwrap();
    assert_eq!(held.status, VmStatus::Active);
    assert_eq!(held.idle_score, None);

    // The sibling synced and was classified
    let healthy_result = report
        .results
        .iter()
        .find(|result| result.source_id == healthy.id)
        .unwrap();
    assert!(matches!(
        healthy_result.outcome,
        ScanOutcome::Success { synced: 1, .. }
    ));
    let record = orchestrator.inventory().get(healthy.id, "lun-1").unwrap();
    assert!(record.last_observed_at.is_some());
    assert!(record.idle_score.is_some());
}

#[tokio::test]
async fn test_unknown_source_reports_not_found() {
    let orchestrator = orchestrator();
    let report = orchestrator.run_scan(Some(99)).await;

    assert!(!report.ok);
    assert!(report.error.unwrap().contains("99"));
    assert!(report.results.is_empty());
    assert!(orchestrator.runs().is_empty());
}

#[tokio::test]
async fn test_disabled_source_is_not_scanned() {
    let orchestrator = orchestrator();
    let mut spec = hypervisor_spec("paused", "http://127.0.0.1:9".into());
    spec.enabled = false;
    let source = orchestrator.sources().add(spec);

    // Designated scan of a disabled source: not found
    let report = orchestrator.run_scan(Some(source.id)).await;
    assert!(!report.ok);

    // Sweep skips it entirely
    let report = orchestrator.run_scan(None).await;
    assert!(report.ok);
    assert!(report.results.is_empty());
}

#[tokio::test]
async fn test_cache_hit_avoids_second_upstream_call() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/api/vms")
        .with_status(200)
        .with_body(serde_json::json!({"vms": [{"id": "lun-1", "name": "a"}]}).to_string())
        .expect(1)
        .create_async()
        .await;

    let orchestrator = orchestrator();
    let source = orchestrator
        .sources()
        .add(storage_spec("stormon-prod", server.url()));

    let first = orchestrator.run_scan(Some(source.id)).await;
    let second = orchestrator.run_scan(Some(source.id)).await;

    assert!(first.ok && second.ok);
    assert!(matches!(
        second.results[0].outcome,
        ScanOutcome::Success { synced: 1, .. }
    ));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_expired_cache_falls_through_to_fetch() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/api/vms")
        .with_status(200)
        .with_body(serde_json::json!({"vms": []}).to_string())
        .expect(2)
        .create_async()
        .await;

    let orchestrator = orchestrator().with_cache_ttl(Duration::from_millis(5));
    let source = orchestrator
        .sources()
        .add(storage_spec("stormon-prod", server.url()));

    orchestrator.run_scan(Some(source.id)).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    orchestrator.run_scan(Some(source.id)).await;

    mock.assert_async().await;
}

#[tokio::test]
async fn test_empty_fetch_still_ages_stale_records_into_missing() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/api/vms")
        .with_status(200)
        .with_body(serde_json::json!({"vms": []}).to_string())
        .create_async()
        .await;

    let orchestrator = orchestrator();
    let source = orchestrator
        .sources()
        .add(storage_spec("stormon-prod", server.url()));

    // Last observed 10 days ago with a 7-day staleness window
    let stale_seen = Utc::now() - chrono::Duration::days(10);
    let mut snapshot = VmSnapshot::new("gone-vm", "gone-vm");
    snapshot.power_state = PowerState::PoweredOn;
    snapshot.cpu_usage_percent = Some(0.1);
    orchestrator
        .inventory()
        .upsert(&source_ref(&orchestrator, source.id), snapshot, stale_seen)
        .unwrap();

    let report = orchestrator.run_scan(Some(source.id)).await;

    assert!(report.ok);
    match &report.results[0].outcome {
        ScanOutcome::Success {
            synced,
            reclassified,
        } => {
            assert_eq!(*synced, 0);
            assert_eq!(*reclassified, 1);
        }
        other => panic!("expected success, got {other:?}"),
    }
    let run = orchestrator.runs().get(report.results[0].run_id).unwrap();
    assert_eq!(run.message, "0 VMs");

    // Stale despite low CPU: missing wins over metric evidence
    let record = orchestrator.inventory().get(source.id, "gone-vm").unwrap();
    assert_eq!(record.status, VmStatus::Missing);
    assert_eq!(record.idle_score, Some(1.0));
}

#[tokio::test]
async fn test_remove_source_cascades_to_inventory_and_runs() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/api/vms")
        .with_status(200)
        .with_body(serde_json::json!({"vms": [{"id": "lun-1", "name": "a"}]}).to_string())
        .create_async()
        .await;

    let orchestrator = orchestrator();
    let source = orchestrator
        .sources()
        .add(storage_spec("stormon-prod", server.url()));
    orchestrator.run_scan(Some(source.id)).await;

    assert_eq!(orchestrator.inventory().len(), 1);
    assert_eq!(orchestrator.runs().len(), 1);

    orchestrator.remove_source(source.id).expect("removed");
    assert!(orchestrator.inventory().is_empty());
    assert!(orchestrator.runs().is_empty());
    assert!(orchestrator.sources().is_empty());
}
