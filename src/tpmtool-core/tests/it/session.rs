//! Session flow: select, attest, review, accept.

use tpmtool_core::{DeviceManager, ResultKind, Session};

use crate::common::{quote, Harness, PUBLIC_KEY, SCAN};

#[tokio::test]
async fn first_use_then_steady_state() {
    let h = Harness::new();
    let manager = DeviceManager::new(h.engine.store());
    manager.add_device("edge router", PUBLIC_KEY).await.unwrap();

    let mut session = Session::new(h.engine.clone());
    session.refresh(&manager.list_devices().await.unwrap());
    assert!(session.selected().is_some());

    let registers = quote(&[(0, "aa"), (1, "bb")]);
    h.verifier.push_document(registers.clone());
    h.verifier.push_document(registers);

    let first_nonce = session.nonce().clone();
    let result = session.attest(Some(SCAN)).await.unwrap();
    assert_eq!(result.kind, ResultKind::Changed);
    assert_ne!(session.nonce(), &first_nonce);

    let accepted = session.accept_last().await.unwrap().unwrap();
    assert!(accepted.has_baseline());
    assert!(session.last_result().is_none());

    let result = session.attest(Some(SCAN)).await.unwrap();
    assert_eq!(result.kind, ResultKind::Ok);

    // an OK result is not a trust decision
    assert!(session.accept_last().await.unwrap().is_none());
    assert_eq!(session.last_result().unwrap().kind, ResultKind::Ok);

    let calls = h.verifier.calls();
    assert_eq!(calls[0].nonce, first_nonce.as_bytes());
    assert_ne!(calls[0].nonce, calls[1].nonce);
}

#[tokio::test]
async fn replay_is_not_acceptable() {
    let h = Harness::new();
    let device = h.device(Some(quote(&[(0, "aa")]))).await;

    let mut session = Session::new(h.engine.clone());
    session.select(&device);

    let replay = session.view_last_result().await.unwrap();
    assert_eq!(replay.kind, ResultKind::Replay);
    assert_eq!(replay.quote_document, device.baseline);

    assert!(session.accept_last().await.unwrap().is_none());
    session.dismiss();
    assert!(session.last_result().is_none());
}

#[tokio::test]
async fn deleted_selection_is_dropped_on_refresh() {
    let h = Harness::new();
    let manager = DeviceManager::new(h.engine.store());
    let first = manager.add_device("a", PUBLIC_KEY).await.unwrap();
    let second = manager.add_device("b", PUBLIC_KEY).await.unwrap();

    let mut session = Session::new(h.engine.clone());
    let mut updates = manager.subscribe();
    session.select(&second);

    manager.delete_device(second.id).await.unwrap();
    updates.changed().await.unwrap();
    let devices = updates.borrow_and_update().clone();
    session.refresh(&devices);

    assert_eq!(session.selected(), Some(first.id));
}

#[tokio::test]
async fn failed_attempt_keeps_nonce_fresh_and_baseline_intact() {
    let h = Harness::new();
    let baseline = quote(&[(0, "aa")]);
    let device = h.device(Some(baseline.clone())).await;

    let mut session = Session::new(h.engine.clone());
    session.select(&device);
    let before = session.nonce().clone();

    let result = session.attest(Some("not|base64!|x")).await.unwrap();
    assert_eq!(result.kind, ResultKind::Failed);
    assert_ne!(session.nonce(), &before);

    assert!(session.accept_last().await.unwrap().is_none());
    let replay = session.view_last_result().await.unwrap();
    assert_eq!(replay.quote_document, baseline);
}
