//! End-to-end tests driving the real dispatcher over loopback UDP,
//! exercising the request/session/transfer flow against an in-process
//! client using plain UDP sockets.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::watch;

use tftp_rs::config::Config;
use tftp_rs::packet::Packet;

const BLOCK_SIZE: usize = 512;

/// Grab a free loopback port, start the real dispatcher bound to it, and
/// return the listen address plus a shutdown handle.
async fn start_server(dir: std::path::PathBuf) -> (SocketAddr, watch::Sender<bool>) {
    let probe = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = probe.local_addr().unwrap();
    drop(probe);

    let cfg = Config {
        address: addr.ip(),
        port: addr.port(),
        dir,
        timeout: Duration::from_millis(150),
        max_retries: 3,
        ..Config::default()
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        let _ = tftp_rs::server::run(cfg, shutdown_rx).await;
    });

    // Give the listener a moment to bind.
    tokio::time::sleep(Duration::from_millis(50)).await;
    (addr, shutdown_tx)
}

fn rrq(filename: &str) -> Vec<u8> {
    Packet::Request {
        filename: filename.into(),
        mode: "octet".into(),
        is_write: false,
        opts: vec![],
    }
    .serialise()
}

fn wrq(filename: &str) -> Vec<u8> {
    Packet::Request {
        filename: filename.into(),
        mode: "octet".into(),
        is_write: true,
        opts: vec![],
    }
    .serialise()
}

fn ack(block: u16) -> Vec<u8> {
    Packet::Ack { block }.serialise()
}

fn data(block: u16, payload: &[u8]) -> Vec<u8> {
    Packet::Data {
        block,
        payload: payload.to_vec(),
    }
    .serialise()
}

async fn recv_packet(sock: &UdpSocket) -> (Packet, SocketAddr) {
    let mut buf = vec![0u8; 4 + BLOCK_SIZE];
    let (n, from) = tokio::time::timeout(Duration::from_secs(5), sock.recv_from(&mut buf))
        .await
        .expect("timed out waiting for packet")
        .unwrap();
    (Packet::parse(&buf[..n]).unwrap(), from)
}

#[tokio::test]
async fn rrq_zero_byte_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("empty.bin"), b"").unwrap();
    let (server_addr, shutdown) = start_server(dir.path().to_path_buf()).await;

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client.send_to(&rrq("empty.bin"), server_addr).await.unwrap();

    let (pkt, session_addr) = recv_packet(&client).await;
    assert_eq!(
        pkt,
        Packet::Data {
            block: 1,
            payload: vec![]
        }
    );

    client.send_to(&ack(1), session_addr).await.unwrap();
    let _ = shutdown.send(true);
}

#[tokio::test]
async fn rrq_multi_block_with_exact_multiple_final_empty_block() {
    let dir = tempfile::tempdir().unwrap();
    let content = vec![0x42u8; BLOCK_SIZE * 2];
    std::fs::write(dir.path().join("two_blocks.bin"), &content).unwrap();
    let (server_addr, shutdown) = start_server(dir.path().to_path_buf()).await;

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client
        .send_to(&rrq("two_blocks.bin"), server_addr)
        .await
        .unwrap();

    let mut received = Vec::new();
    let mut session_addr = None;
    for expected_block in 1u16..=3 {
        let (pkt, from) = recv_packet(&client).await;
        session_addr = Some(from);
        match pkt {
            Packet::Data { block, payload } => {
                assert_eq!(block, expected_block);
                if expected_block <= 2 {
                    assert_eq!(payload.len(), BLOCK_SIZE);
                } else {
                    assert!(payload.is_empty());
                }
                received.extend_from_slice(&payload);
                client.send_to(&ack(block), from).await.unwrap();
            }
            other => panic!("expected DATA, got {other:?}"),
        }
    }
    assert_eq!(received, content);
    assert!(session_addr.is_some());

    let _ = shutdown.send(true);
}

#[tokio::test]
async fn retransmits_after_timeout_then_exits_on_timeout_budget() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("small.bin"), b"x").unwrap();
    let (server_addr, shutdown) = start_server(dir.path().to_path_buf()).await;

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client.send_to(&rrq("small.bin"), server_addr).await.unwrap();

    // Never ACK: the same DATA{block=1} must arrive at least twice before
    // the session gives up (retransmission on timeout, ).
    let (first, _) = recv_packet(&client).await;
    let (second, _) = recv_packet(&client).await;
    assert_eq!(first, second);

    let _ = shutdown.send(true);
}

#[tokio::test]
async fn stale_duplicate_ack_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let content = vec![0x7Fu8; BLOCK_SIZE + 10];
    std::fs::write(dir.path().join("dup_ack.bin"), &content).unwrap();
    let (server_addr, shutdown) = start_server(dir.path().to_path_buf()).await;

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client.send_to(&rrq("dup_ack.bin"), server_addr).await.unwrap();

    let (first, from) = recv_packet(&client).await;
    assert_eq!(first, Packet::Data { block: 1, payload: content[..BLOCK_SIZE].to_vec() });

    // Send a stale ACK{0} interleaved with the correct ACK{1}: the stale
    // one must be ignored and the transfer must still advance.
    client.send_to(&ack(0), from).await.unwrap();
    client.send_to(&ack(1), from).await.unwrap();

    let (second, _) = recv_packet(&client).await;
    assert_eq!(
        second,
        Packet::Data {
            block: 2,
            payload: content[BLOCK_SIZE..].to_vec()
        }
    );

    let _ = shutdown.send(true);
}

#[tokio::test]
async fn wrq_short_block_upload() {
    let dir = tempfile::tempdir().unwrap();
    let (server_addr, shutdown) = start_server(dir.path().to_path_buf()).await;

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client
        .send_to(&wrq("uploaded.bin"), server_addr)
        .await
        .unwrap();

    let (pkt, session_addr) = recv_packet(&client).await;
    assert_eq!(pkt, Packet::Ack { block: 0 });

    client
        .send_to(&data(1, b"hello"), session_addr)
        .await
        .unwrap();

    let (pkt, _) = recv_packet(&client).await;
    assert_eq!(pkt, Packet::Ack { block: 1 });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        std::fs::read(dir.path().join("uploaded.bin")).unwrap(),
        b"hello"
    );

    let _ = shutdown.send(true);
}

#[tokio::test]
async fn peer_error_terminates_session_without_further_packets() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("err.bin"), vec![0u8; BLOCK_SIZE * 2]).unwrap();
    let (server_addr, shutdown) = start_server(dir.path().to_path_buf()).await;

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client.send_to(&rrq("err.bin"), server_addr).await.unwrap();

    let (first, from) = recv_packet(&client).await;
    assert!(matches!(first, Packet::Data { block: 1, .. }));

    client
        .send_to(&Packet::Error { code: 1, message: "nope".into() }.serialise(), from)
        .await
        .unwrap();

    // No further packet should arrive on this session.
    let mut buf = vec![0u8; 4 + BLOCK_SIZE];
    let result = tokio::time::timeout(Duration::from_millis(400), client.recv_from(&mut buf)).await;
    assert!(result.is_err(), "session should not send anything after a peer ERROR");

    let _ = shutdown.send(true);
}
