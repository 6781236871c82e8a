//! Bridge session and controller tests against a fake websockify server

use std::sync::Arc;
use std::time::Duration;

use a8s_gateway::bridge::controller;
use a8s_gateway::bridge::session::{BridgeOptions, BridgePhase, BridgeSession};
use a8s_gateway::models::connection::ConnectionStatus;
use a8s_gateway::store::connection::VmConnectionStore;
use tokio::sync::{oneshot, watch};

use crate::common::{eventually, FakeVncServer, ADDRESS, DESKTOP_HEIGHT, DESKTOP_WIDTH};

async fn wait_for_phase(session: &BridgeSession, wanted: BridgePhase) {
    let mut rx = session.subscribe();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|phase| *phase == wanted))
        .await
        .expect("phase not reached in time")
        .unwrap();
}

#[tokio::test]
async fn test_session_reaches_ready() {
    let server = FakeVncServer::start().await;
    let session = BridgeSession::mount(&BridgeOptions::new(server.origin()), ADDRESS);

    wait_for_phase(&session, BridgePhase::Ready).await;
    assert_eq!(
        session.transitions(),
        vec![BridgePhase::Validating, BridgePhase::Loading, BridgePhase::Ready]
    );

    {
        let viewport = session.viewport();
        let viewport = viewport.read().unwrap();
        assert_eq!(viewport.framebuffer_size(), (DESKTOP_WIDTH, DESKTOP_HEIGHT));
        assert_eq!(viewport.pixel(0, 0), Some(0x0011_2233));
        assert_eq!(viewport.pixel(3, 1), Some(0x0011_2233));
    }

    let expected = format!("open /{}/websockify binary", ADDRESS);
    assert_eq!(server.events().first(), Some(&expected));

    session.unmount().await;
    assert!(eventually(|| server.events().contains(&"closed".to_string())).await);
}

#[tokio::test]
async fn test_session_unmount_before_connect_is_quiet() {
    let server = FakeVncServer::start().await;
    let session = BridgeSession::mount(&BridgeOptions::new(server.origin()), ADDRESS);
    session.unmount().await;
}

#[tokio::test]
async fn test_refused_connection_ends_in_transport_error() {
    let options = BridgeOptions::new(url::Url::parse("http://127.0.0.1:9").unwrap());
    let session = BridgeSession::mount(&options, ADDRESS);

    let mut rx = session.subscribe();
    let phase = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|p| p.is_terminal()))
        .await
        .unwrap()
        .unwrap()
        .clone();
    match phase {
        BridgePhase::Error(failure) => assert_eq!(failure.kind.as_str(), "transport"),
        other => panic!("unexpected phase {:?}", other),
    }

    let transitions = session.transitions();
    assert_eq!(transitions.len(), 3);
    assert_eq!(transitions[1], BridgePhase::Loading);
}

#[tokio::test]
async fn test_controller_closes_previous_session_before_reopening() {
    let server = FakeVncServer::start().await;
    let store = Arc::new(VmConnectionStore::new());
    let (status_tx, status_rx) = watch::channel(None);
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let handle = tokio::spawn(controller::run(
        BridgeOptions::new(server.origin()),
        store.clone(),
        status_tx,
        Box::pin(async move {
            let _ = stop_rx.await;
        }),
    ));

    store.open_connection(ADDRESS, "claude", "d-1", None).unwrap();
    assert!(eventually(|| store.read().status == ConnectionStatus::Connected).await);
    assert_eq!(status_rx.borrow().as_ref().unwrap().attempt, 1);

    // Same deployment again: a fresh attempt remounts the session
    store.open_connection(ADDRESS, "claude", "d-1", None).unwrap();
    assert!(eventually(|| {
        status_rx
            .borrow()
            .as_ref()
            .is_some_and(|s| s.attempt == 2 && s.phase == BridgePhase::Ready)
    })
    .await);
    assert_eq!(store.read().status, ConnectionStatus::Connected);

    let opened = format!("open /{}/websockify binary", ADDRESS);
    assert_eq!(
        server.events(),
        vec![
            opened.clone(),
            "ready".to_string(),
            "closed".to_string(),
            opened,
            "ready".to_string(),
        ]
    );

    let _ = stop_tx.send(());
    handle.await.unwrap();
    assert!(status_rx.borrow().is_none());
}

#[tokio::test]
async fn test_controller_ignores_status_changes() {
    let server = FakeVncServer::start().await;
    let store = Arc::new(VmConnectionStore::new());
    let (status_tx, status_rx) = watch::channel(None);
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let handle = tokio::spawn(controller::run(
        BridgeOptions::new(server.origin()),
        store.clone(),
        status_tx,
        Box::pin(async move {
            let _ = stop_rx.await;
        }),
    ));

    store.open_connection(ADDRESS, "claude", "d-1", None).unwrap();
    assert!(eventually(|| store.read().status == ConnectionStatus::Connected).await);

    // Reporting progress for the current attempt does not remount
    store.mark_connected("d-1", 1);
    tokio::time::sleep(Duration::from_millis(200)).await;
    let opens = server
        .events()
        .iter()
        .filter(|e| e.starts_with("open"))
        .count();
    assert_eq!(opens, 1);
    assert_eq!(status_rx.borrow().as_ref().unwrap().attempt, 1);

    let _ = stop_tx.send(());
    handle.await.unwrap();
}
