//! End-to-end attestation rounds through the engine.

use base64::Engine as _;

use tpmtool_core::{Device, DeviceStore, Difference, Nonce, ResultKind};

use crate::common::{quote, Harness, PUBLIC_KEY, SCAN};

#[tokio::test]
async fn identical_registers_are_ok() {
    let h = Harness::new();
    let device = h.device(Some(quote(&[(0, "aa"), (1, "bb")]))).await;
    h.verifier.push_document(quote(&[(0, "aa"), (1, "bb")]));

    let result = h
        .engine
        .attest(Some(device.id), Some(SCAN), &Nonce::generate())
        .await
        .unwrap();

    assert_eq!(result.kind, ResultKind::Ok);
    assert!(result.differences.is_none());
    assert!(result.failure_reason.is_none());
    assert!(result.quote_document.contains("\"PCRValues\""));
    assert_eq!(result.device.unwrap().id, device.id);
}

#[tokio::test]
async fn changed_register_is_reported() {
    let h = Harness::new();
    let device = h.device(Some(quote(&[(0, "aa"), (1, "bb")]))).await;
    h.verifier.push_document(quote(&[(0, "aa"), (1, "cc")]));

    let result = h
        .engine
        .attest(Some(device.id), Some(SCAN), &Nonce::generate())
        .await
        .unwrap();

    assert_eq!(result.kind, ResultKind::Changed);
    let differences = result.differences.as_ref().unwrap();
    assert_eq!(differences.indices(), vec![1]);
    assert_eq!(differences.get(1), Some(&Difference::new("bb", "cc")));
    assert!(!result.quote_document.is_empty(), "new quote kept for acceptance");
}

#[tokio::test]
async fn two_field_scan_fails_without_touching_baseline() {
    let h = Harness::new();
    let baseline = quote(&[(0, "aa")]);
    let device = h.device(Some(baseline.clone())).await;

    let result = h
        .engine
        .attest(Some(device.id), Some("c2ln|bXNn"), &Nonce::generate())
        .await
        .unwrap();

    assert_eq!(result.kind, ResultKind::Failed);
    assert_eq!(result.failure_reason.as_deref(), Some("Invalid data"));
    assert!(result.differences.is_none());
    assert!(h.verifier.calls().is_empty(), "verifier must not run");

    let stored = h.store.get_by_id(device.id).await.unwrap().unwrap();
    assert_eq!(stored.baseline, baseline);
}

#[tokio::test]
async fn accepted_changes_become_the_replayed_baseline() {
    let h = Harness::new();
    let device = h.device(Some(quote(&[(0, "aa"), (1, "bb")]))).await;
    h.verifier.push_document(quote(&[(0, "aa"), (1, "cc")]));

    let result = h
        .engine
        .attest(Some(device.id), Some(SCAN), &Nonce::generate())
        .await
        .unwrap();
    assert_eq!(result.kind, ResultKind::Changed);

    let accepted = h.engine.accept_changes(&result).await.unwrap().unwrap();
    assert_eq!(accepted.baseline, result.quote_document);

    let replay = h.engine.view_last_result(device.id).await.unwrap();
    assert_eq!(replay.kind, ResultKind::Replay);
    assert_eq!(replay.quote_document, result.quote_document);
    let replayed_device = replay.device.clone().unwrap();
    assert!(replayed_device.last_success.unwrap() > 1_700_000_000);

    // the replay is read-only and still matches the stored baseline
    assert!(h.engine.accept_changes(&replay).await.unwrap().is_none());
    let stored = h.store.get_by_id(device.id).await.unwrap().unwrap();
    assert_eq!(stored.baseline, replay.quote_document);
}

#[tokio::test]
async fn first_attestation_is_never_ok() {
    let h = Harness::new();
    let device = h.device(None).await;
    h.verifier.push_document(quote(&[(0, "aa"), (7, "ff")]));

    let result = h
        .engine
        .attest(Some(device.id), Some(SCAN), &Nonce::generate())
        .await
        .unwrap();

    assert_eq!(result.kind, ResultKind::Changed);
    let differences = result.differences.unwrap();
    assert_eq!(differences.get(0), Some(&Difference::new("", "aa")));
    assert_eq!(differences.get(7), Some(&Difference::new("", "ff")));
}

#[tokio::test]
async fn first_attestation_with_empty_selection_is_changed() {
    let h = Harness::new();
    let device = h.device(None).await;
    h.verifier.push_document(quote(&[]));

    let result = h
        .engine
        .attest(Some(device.id), Some(SCAN), &Nonce::generate())
        .await
        .unwrap();

    assert_eq!(result.kind, ResultKind::Changed);
    assert!(result.differences.unwrap().is_empty());
}

#[tokio::test]
async fn verifier_receives_decoded_inputs() {
    let h = Harness::new();
    let device = h.device(None).await;
    h.verifier.push_document(quote(&[(0, "aa")]));
    let nonce = Nonce::custom("AAECAwQF1737936000");

    h.engine
        .attest(Some(device.id), Some(" c2ln | bXNn |cGNy\n"), &nonce)
        .await
        .unwrap();

    let calls = h.verifier.calls();
    assert_eq!(calls.len(), 1);
    let call = &calls[0];
    let key = base64::engine::general_purpose::STANDARD
        .decode(PUBLIC_KEY)
        .unwrap();
    assert_eq!(call.public_key, key);
    assert_eq!(call.signature, b"sig");
    assert_eq!(call.message, b"msg");
    assert_eq!(call.pcr_digest, b"pcr");
    assert_eq!(call.nonce, b"AAECAwQF1737936000");
}

#[tokio::test]
async fn verification_failure_is_failed() {
    let h = Harness::new();
    let device = h.device(Some(quote(&[(0, "aa")]))).await;
    h.verifier.push_failure("signature mismatch");

    let result = h
        .engine
        .attest(Some(device.id), Some(SCAN), &Nonce::generate())
        .await
        .unwrap();

    assert_eq!(result.kind, ResultKind::Failed);
    assert!(result
        .failure_reason
        .as_deref()
        .unwrap()
        .contains("signature mismatch"));
    assert!(result.quote_document.is_empty());
    assert!(h.engine.accept_changes(&result).await.unwrap().is_none());
}

#[tokio::test]
async fn corrupt_baseline_is_failed() {
    let h = Harness::new();
    let device = h.device(Some("{\"PCRValues\":{}}".to_string())).await;
    h.verifier.push_document(quote(&[(0, "aa")]));

    let result = h
        .engine
        .attest(Some(device.id), Some(SCAN), &Nonce::generate())
        .await
        .unwrap();

    assert_eq!(result.kind, ResultKind::Failed);
    assert!(result
        .failure_reason
        .unwrap()
        .starts_with("Malformed quote"));
}

#[tokio::test]
async fn missing_selection_or_scan() {
    let h = Harness::new();
    let device = h.device(None).await;

    let none = h.engine.attest(None, Some(SCAN), &Nonce::generate()).await.unwrap();
    assert_eq!(none.kind, ResultKind::Failed);
    assert_eq!(none.failure_reason.as_deref(), Some("No device selected"));

    let aborted = h
        .engine
        .attest(Some(device.id), None, &Nonce::generate())
        .await
        .unwrap();
    assert_eq!(aborted.failure_reason.as_deref(), Some("Scan failed"));

    let gone = h.engine.attest(Some(99), Some(SCAN), &Nonce::generate()).await.unwrap();
    assert_eq!(gone.kind, ResultKind::Failed);
    assert!(gone.device.is_none());
}

#[tokio::test]
async fn accept_after_device_deleted_is_an_error() {
    let h = Harness::new();
    let device = h.device(None).await;
    h.verifier.push_document(quote(&[(0, "aa")]));

    let result = h
        .engine
        .attest(Some(device.id), Some(SCAN), &Nonce::generate())
        .await
        .unwrap();
    h.store.delete(&device).await.unwrap();

    let err = h.engine.accept_changes(&result).await.unwrap_err();
    assert!(err.is_input_error());
}

#[tokio::test]
async fn accept_keeps_edits_made_during_review() {
    let h = Harness::new();
    let device = h.device(None).await;
    h.verifier.push_document(quote(&[(0, "aa")]));

    let result = h
        .engine
        .attest(Some(device.id), Some(SCAN), &Nonce::generate())
        .await
        .unwrap();

    let mut renamed = device.clone();
    renamed.name = "core router".into();
    h.store.update(&renamed).await.unwrap();

    let accepted = h.engine.accept_changes(&result).await.unwrap().unwrap();
    assert_eq!(accepted.name, "core router");
    assert_eq!(accepted.baseline, result.quote_document);
}

#[tokio::test]
async fn envelope_is_decoded_before_stored_key() {
    let h = Harness::new();
    let device = h
        .store
        .insert(Device::new("router", "not base64!"))
        .await
        .unwrap();

    let bad_scan = h
        .engine
        .attest(Some(device.id), Some("c2ln|bXNn"), &Nonce::generate())
        .await
        .unwrap();
    assert_eq!(bad_scan.failure_reason.as_deref(), Some("Invalid data"));

    let good_scan = h
        .engine
        .attest(Some(device.id), Some(SCAN), &Nonce::generate())
        .await
        .unwrap();
    assert_eq!(good_scan.kind, ResultKind::Failed);
    assert_eq!(good_scan.failure_reason.as_deref(), Some("Invalid public key value"));
    assert!(h.verifier.calls().is_empty());
}

#[tokio::test]
async fn unpadded_scan_fields_are_accepted() {
    let h = Harness::new();
    let device = h.device(None).await;
    h.verifier.push_document(quote(&[(0, "aa")]));

    let result = h
        .engine
        .attest(Some(device.id), Some("c2lnYQ|bXNn|cGNyMQ"), &Nonce::generate())
        .await
        .unwrap();

    assert_eq!(result.kind, ResultKind::Changed);
    let call = &h.verifier.calls()[0];
    assert_eq!(call.signature, b"siga");
    assert_eq!(call.pcr_digest, b"pcr1");
}
