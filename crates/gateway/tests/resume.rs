//! Resume-within-grace: unacked frames replay in order, no duplicates.

use std::sync::Arc;

use meridian_core::WorkerName;
use meridian_gateway::{
    GatewayConfig, SessionManager, Transport, WorkerCatalog, accept_connection, duplex,
};
use meridian_protocol::{Ack, Frame, HelloPayload, Message};
use pretty_assertions::assert_eq;

fn manager() -> Arc<SessionManager> {
    let config = GatewayConfig {
        worker_tokens: vec!["tok".into()],
        ..GatewayConfig::default()
    };
    let (manager, _events) = SessionManager::new(config, Arc::new(WorkerCatalog::new()));
    manager
}

fn hello(worker: &str) -> HelloPayload {
    HelloPayload {
        token: "tok".into(),
        worker_name: WorkerName::new(worker).unwrap(),
        capabilities: vec![],
        packages: vec![],
        queue: "default".into(),
        prior_session_id: None,
        resume_token: None,
        last_acked_seq: None,
    }
}

#[tokio::test]
async fn resume_replays_only_unacked_frames_in_order() {
    let manager = manager();

    // First connection.
    let (server_side, mut worker_side) = duplex(64);
    let server = tokio::spawn(accept_connection(Arc::clone(&manager), server_side));

    worker_side
        .send(Frame::new(1, Message::Hello(hello("w1"))))
        .await
        .unwrap();
    let reply = worker_side.recv().await.unwrap().unwrap();
    let Message::HelloAck(ack) = reply.message else {
        panic!("expected hello_ack");
    };
    let session_id = ack.session_id;
    let resume_token = ack.resume_token;

    // The server sends ten messages (seqs 2..=11 on this session).
    let session = manager
        .session_for(&WorkerName::new("w1").unwrap())
        .unwrap();
    for _ in 0..10 {
        session.send(Message::Ping).await.unwrap();
    }
    let mut seen = Vec::new();
    for _ in 0..10 {
        seen.push(worker_side.recv().await.unwrap().unwrap().seq);
    }
    assert_eq!(seen, (2..=11).collect::<Vec<u64>>());

    // The worker acknowledges through seq 6, then the transport drops.
    worker_side
        .send(Frame::with_ack(2, Ack::cumulative(6), Message::Ack))
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(30)).await;
    drop(worker_side);
    server.await.unwrap().unwrap();
    assert_eq!(session.outstanding().await, 5);

    // Reconnect within grace with the prior session id and resume token.
    let (server_side, mut worker_side) = duplex(64);
    let server = tokio::spawn(accept_connection(Arc::clone(&manager), server_side));

    let mut resume_hello = hello("w1");
    resume_hello.prior_session_id = Some(session_id);
    resume_hello.resume_token = Some(resume_token);
    resume_hello.last_acked_seq = Some(6);
    worker_side
        .send(Frame::new(3, Message::Hello(resume_hello)))
        .await
        .unwrap();

    // Replays 7..=11 in original order, then the fresh hello_ack (seq 12).
    let mut received = Vec::new();
    for _ in 0..6 {
        received.push(worker_side.recv().await.unwrap().unwrap());
    }
    let seqs: Vec<u64> = received.iter().map(|f| f.seq).collect();
    assert_eq!(seqs, vec![7, 8, 9, 10, 11, 12]);
    assert!(
        received[..5]
            .iter()
            .all(|f| matches!(f.message, Message::Ping)),
        "replays keep their original payloads"
    );
    let Message::HelloAck(ack) = &received[5].message else {
        panic!("expected hello_ack after replay");
    };
    assert_eq!(ack.session_id, session_id);

    drop(worker_side);
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn expired_session_cannot_resume() {
    let manager = manager();

    let (server_side, mut worker_side) = duplex(64);
    let server = tokio::spawn(accept_connection(Arc::clone(&manager), server_side));
    worker_side
        .send(Frame::new(1, Message::Hello(hello("w1"))))
        .await
        .unwrap();
    let reply = worker_side.recv().await.unwrap().unwrap();
    let Message::HelloAck(ack) = reply.message else {
        panic!("expected hello_ack");
    };
    drop(worker_side);
    server.await.unwrap().unwrap();

    // Grace expires; the session record is destroyed.
    let later = chrono::Utc::now() + chrono::Duration::seconds(600);
    let expired = manager.sweep_expired(later, chrono::Duration::seconds(60));
    assert_eq!(expired.len(), 1);

    // A reconnect with the stale session id falls back to a fresh session.
    let (server_side, mut worker_side) = duplex(64);
    let server = tokio::spawn(accept_connection(Arc::clone(&manager), server_side));
    let mut resume_hello = hello("w1");
    resume_hello.prior_session_id = Some(ack.session_id);
    resume_hello.resume_token = Some(ack.resume_token);
    resume_hello.last_acked_seq = Some(1);
    worker_side
        .send(Frame::new(1, Message::Hello(resume_hello)))
        .await
        .unwrap();

    let reply = worker_side.recv().await.unwrap().unwrap();
    let Message::HelloAck(fresh) = reply.message else {
        panic!("expected hello_ack");
    };
    assert_ne!(fresh.session_id, ack.session_id);

    drop(worker_side);
    server.await.unwrap().unwrap();
}
