use std::fs;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::Notify;

use crate::resources::{Bundle, DeviceStatus};
use crate::sync::{Destination, PatientOutcome, SyncSettings, Synchronizer, TickOutcome};
use crate::testing::{
    connection, make_temp_dir, session, three_samples, FakeFhir, FakeIdentity, FakeVendor, LoginGate,
};

fn settings(output_dir: PathBuf) -> SyncSettings {
    SyncSettings {
        fhir_patient_id: String::new(),
        output_dir,
    }
}

fn with_token() -> FakeIdentity {
    FakeIdentity {
        token: Some("identity-token-abcdef".to_string()),
    }
}

fn without_token() -> FakeIdentity {
    FakeIdentity { token: None }
}

#[tokio::test]
async fn uploads_full_bundle_when_server_has_no_prior_observation() {
    // Arrange
    let vendor = FakeVendor::new(vec![connection("P1", 2)]).with_series("P1", three_samples());
    let sync = Synchronizer::new(
        vendor,
        with_token(),
        FakeFhir::default(),
        session(),
        settings(PathBuf::from("unused-output")),
    );

    // Act
    let report = sync.tick().await;

    // Assert
    assert_eq!(report.outcome, TickOutcome::Completed);
    assert_eq!(report.destination, Some(Destination::FhirServer));
    assert_eq!(report.patients.len(), 1);
    assert_eq!(report.patients[0].outcome, PatientOutcome::Uploaded(3));
    assert_eq!(report.patients[0].device.status, DeviceStatus::Active);

    let uploads = sync.fhir().uploaded();
    assert_eq!(uploads.len(), 1);
    let values: Vec<f64> = uploads[0].iter().map(|o| o.value_quantity.value).collect();
    assert_eq!(values, vec![90.0, 250.0, 55.0]);
    for observation in &uploads[0] {
        assert_eq!(observation.code.coding[0].code, "14745-4");
        assert_eq!(observation.subject.reference, "Patient/P1");
        assert_eq!(observation.reference_range[0].low.value, 70.0);
        assert_eq!(observation.reference_range[0].high.value, 180.0);
    }
}

#[tokio::test]
async fn valid_ticket_is_reused_on_next_tick() {
    let vendor = FakeVendor::new(vec![connection("P1", 2)]).with_series("P1", three_samples());
    let sync = Synchronizer::new(
        vendor,
        with_token(),
        FakeFhir::default(),
        session(),
        settings(PathBuf::from("unused-output")),
    );

    sync.tick().await;
    sync.tick().await;

    assert_eq!(sync.vendor().logins(), 1);
    assert_eq!(sync.vendor().connection_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn expired_ticket_triggers_login_every_tick() {
    let mut vendor = FakeVendor::new(vec![connection("P1", 2)]).with_series("P1", three_samples());
    vendor.ticket_expires = 0;
    let sync = Synchronizer::new(
        vendor,
        with_token(),
        FakeFhir::default(),
        session(),
        settings(PathBuf::from("unused-output")),
    );

    sync.tick().await;
    sync.tick().await;

    assert_eq!(sync.vendor().logins(), 2);
}

#[tokio::test]
async fn failed_login_aborts_before_connections() {
    let mut vendor = FakeVendor::new(vec![connection("P1", 2)]).with_series("P1", three_samples());
    vendor.login_ok = false;
    let sync = Synchronizer::new(
        vendor,
        with_token(),
        FakeFhir::default(),
        session(),
        settings(PathBuf::from("unused-output")),
    );

    let report = sync.tick().await;

    assert!(matches!(report.outcome, TickOutcome::LoginFailed(_)));
    assert!(report.patients.is_empty());
    assert_eq!(sync.vendor().connection_calls.load(Ordering::SeqCst), 0);
    assert!(sync.fhir().uploaded().is_empty());
}

#[tokio::test]
async fn empty_connection_list_is_reported_separately() {
    let sync = Synchronizer::new(
        FakeVendor::new(Vec::new()),
        with_token(),
        FakeFhir::default(),
        session(),
        settings(PathBuf::from("unused-output")),
    );

    let report = sync.tick().await;

    assert_eq!(report.outcome, TickOutcome::NoConnections);
}

#[tokio::test]
async fn one_failing_patient_does_not_stop_the_others() {
    // Arrange
    let vendor = FakeVendor::new(vec![connection("P1", 2), connection("P2", 2), connection("P3", 0)])
        .with_series("P1", three_samples())
        .with_series("P3", three_samples());
    let sync = Synchronizer::new(
        vendor,
        with_token(),
        FakeFhir::default(),
        session(),
        settings(PathBuf::from("unused-output")),
    );

    // Act
    let report = sync.tick().await;

    // Assert
    assert_eq!(report.outcome, TickOutcome::Completed);
    let outcomes: Vec<&PatientOutcome> = report.patients.iter().map(|p| &p.outcome).collect();
    assert_eq!(outcomes[0], &PatientOutcome::Uploaded(3));
    assert!(matches!(outcomes[1], PatientOutcome::SeriesUnavailable(_)));
    assert_eq!(outcomes[2], &PatientOutcome::Uploaded(3));
    assert_eq!(report.patients[2].device.status, DeviceStatus::Inactive);
    assert_eq!(sync.vendor().series_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn rejected_upload_is_reported_and_tick_completes() {
    let vendor = FakeVendor::new(vec![connection("P1", 2)]).with_series("P1", three_samples());
    let fhir = FakeFhir {
        reject_uploads: true,
        ..FakeFhir::default()
    };
    let sync = Synchronizer::new(vendor, with_token(), fhir, session(), settings(PathBuf::from("unused-output")));

    let report = sync.tick().await;

    assert_eq!(report.outcome, TickOutcome::Completed);
    assert!(matches!(report.patients[0].outcome, PatientOutcome::UploadFailed(_)));
}

#[tokio::test]
async fn missing_identity_token_writes_bundle_to_disk() {
    // Arrange
    let dir = make_temp_dir("local-save");
    let vendor = FakeVendor::new(vec![connection("P1", 2)]).with_series("P1", three_samples());
    let sync = Synchronizer::new(
        vendor,
        without_token(),
        FakeFhir::default(),
        session(),
        SyncSettings {
            fhir_patient_id: "fhir-42".to_string(),
            output_dir: dir.clone(),
        },
    );

    // Act
    let report = sync.tick().await;

    // Assert
    assert_eq!(report.destination, Some(Destination::LocalFiles));
    assert!(sync.fhir().uploaded().is_empty());
    assert!(sync.fhir().queried.lock().expect("lock").is_empty());

    let PatientOutcome::Saved(path) = &report.patients[0].outcome else {
        panic!("expected a saved bundle, got {:?}", report.patients[0].outcome);
    };
    assert!(path.starts_with(&dir));
    let bundle: Bundle = serde_json::from_slice(&fs::read(path).expect("read bundle")).expect("parse bundle");
    assert_eq!(bundle.kind, "transaction");
    assert_eq!(bundle.entry.len(), 3);
    assert_eq!(bundle.entry[0].resource.subject.reference, "Patient/fhir-42");

    let _ = fs::remove_dir_all(dir);
}

#[tokio::test]
async fn every_patient_gets_its_own_bundle_file_in_one_tick() {
    // Arrange
    let dir = make_temp_dir("local-save-many");
    let vendor = FakeVendor::new(vec![connection("P1", 2), connection("P2", 2)])
        .with_series("P1", three_samples())
        .with_series("P2", three_samples());
    let sync = Synchronizer::new(vendor, without_token(), FakeFhir::default(), session(), settings(dir.clone()));

    // Act
    let report = sync.tick().await;

    // Assert
    let saved: Vec<PathBuf> = report
        .patients
        .iter()
        .map(|patient| match &patient.outcome {
            PatientOutcome::Saved(path) => path.clone(),
            other => panic!("expected a saved bundle, got {other:?}"),
        })
        .collect();
    assert_eq!(saved.len(), 2);
    assert_ne!(saved[0], saved[1]);

    let on_disk = fs::read_dir(&dir).expect("read dir").count();
    assert_eq!(on_disk, 2);

    let subjects: Vec<String> = saved
        .iter()
        .map(|path| {
            let bundle: Bundle = serde_json::from_slice(&fs::read(path).expect("read bundle")).expect("parse bundle");
            assert_eq!(bundle.entry.len(), 3);
            bundle.entry[0].resource.subject.reference.clone()
        })
        .collect();
    assert_eq!(subjects, vec!["Patient/P1".to_string(), "Patient/P2".to_string()]);

    let _ = fs::remove_dir_all(dir);
}

#[tokio::test]
async fn overlapping_tick_is_skipped() {
    // Arrange
    let gate = Arc::new(LoginGate {
        entered: Notify::new(),
        release: Notify::new(),
    });
    let mut vendor = FakeVendor::new(vec![connection("P1", 2)]).with_series("P1", three_samples());
    vendor.gate = Some(gate.clone());
    let sync = Arc::new(Synchronizer::new(
        vendor,
        with_token(),
        FakeFhir::default(),
        session(),
        settings(PathBuf::from("unused-output")),
    ));

    // Act
    let first = tokio::spawn({
        let sync = sync.clone();
        async move { sync.tick().await }
    });
    gate.entered.notified().await;
    let second = sync.tick().await;
    gate.release.notify_one();
    let first = first.await.expect("first tick");

    // Assert
    assert_eq!(second.outcome, TickOutcome::Skipped);
    assert_eq!(first.outcome, TickOutcome::Completed);
    assert_eq!(sync.vendor().logins(), 1);
}
