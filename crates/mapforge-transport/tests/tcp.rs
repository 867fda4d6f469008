//! Integration tests for the TCP transport.
//!
//! These spin up real sockets on loopback and verify that frames actually
//! flow between a hosting transport and joined transports, and that
//! connection death is reported exactly once.

use std::time::Duration;

use mapforge_transport::{TcpTransport, TransportError, TransportPoll};

/// Polls `transport` until `pred` is satisfied by the accumulated results,
/// or panics after ~2 seconds.
async fn poll_until(
    transport: &mut TcpTransport,
    pred: impl Fn(&TransportPoll) -> bool,
) -> TransportPoll {
    let mut acc = TransportPoll::default();
    for _ in 0..200 {
        let p = transport.poll();
        acc.connected.extend(p.connected);
        acc.packets.extend(p.packets);
        acc.dropped.extend(p.dropped);
        if pred(&acc) {
            return acc;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within deadline");
}

#[tokio::test]
async fn test_accept_and_exchange_frames() {
    let mut host = TcpTransport::listen("127.0.0.1:0").await.unwrap();
    let addr = host.local_addr().unwrap().to_string();

    let (mut client, host_link) =
        TcpTransport::connect(&addr, Duration::from_secs(2)).await.unwrap();

    let accepted =
        poll_until(&mut host, |p| !p.connected.is_empty()).await;
    let client_conn = accepted.connected[0];

    // Client → host.
    client.send_to(host_link, b"join please".to_vec());
    let got = poll_until(&mut host, |p| !p.packets.is_empty()).await;
    assert_eq!(got.packets[0].0, client_conn);
    assert_eq!(got.packets[0].1, b"join please");

    // Host → client.
    host.send_to(client_conn, b"welcome".to_vec());
    let got = poll_until(&mut client, |p| !p.packets.is_empty()).await;
    assert_eq!(got.packets[0].1, b"welcome");
}

#[tokio::test]
async fn test_send_all_except_skips_originator() {
    let mut host = TcpTransport::listen("127.0.0.1:0").await.unwrap();
    let addr = host.local_addr().unwrap().to_string();

    let (mut client_a, _) =
        TcpTransport::connect(&addr, Duration::from_secs(2)).await.unwrap();
    let (mut client_b, _) =
        TcpTransport::connect(&addr, Duration::from_secs(2)).await.unwrap();

    let accepted =
        poll_until(&mut host, |p| p.connected.len() == 2).await;
    let first = accepted.connected[0];

    host.send_all_except(first, b"echo");

    // Exactly one of the two clients receives the frame.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let a = client_a.poll();
    let b = client_b.poll();
    assert_eq!(a.packets.len() + b.packets.len(), 1);
}

#[tokio::test]
async fn test_client_disconnect_reported_once() {
    let mut host = TcpTransport::listen("127.0.0.1:0").await.unwrap();
    let addr = host.local_addr().unwrap().to_string();

    let (mut client, _) =
        TcpTransport::connect(&addr, Duration::from_secs(2)).await.unwrap();
    let accepted =
        poll_until(&mut host, |p| !p.connected.is_empty()).await;
    let client_conn = accepted.connected[0];

    client.shutdown();

    let got = poll_until(&mut host, |p| !p.dropped.is_empty()).await;
    assert_eq!(got.dropped, vec![client_conn]);

    // No further drop reports for the same connection.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let later = host.poll();
    assert!(later.dropped.is_empty());
}

#[tokio::test]
async fn test_local_close_flushes_then_ends_connection() {
    let mut host = TcpTransport::listen("127.0.0.1:0").await.unwrap();
    let addr = host.local_addr().unwrap().to_string();

    let (mut client, _) =
        TcpTransport::connect(&addr, Duration::from_secs(2)).await.unwrap();
    let accepted =
        poll_until(&mut host, |p| !p.connected.is_empty()).await;
    let client_conn = accepted.connected[0];

    // Queue a final frame (a rejection, in session terms), then close.
    host.send_to(client_conn, b"rejected: bad password".to_vec());
    host.close(client_conn);

    // The queued frame arrives before the stream ends.
    let got = poll_until(&mut client, |p| !p.packets.is_empty()).await;
    assert_eq!(got.packets[0].1, b"rejected: bad password");

    // The client then observes the host-side close as a drop.
    poll_until(&mut client, |p| !p.dropped.is_empty()).await;

    // The host never reports its own locally initiated close as a drop.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(host.poll().dropped.is_empty());
    assert_eq!(host.connection_count(), 0);
}

#[tokio::test]
async fn test_connect_refused_is_an_error() {
    // Bind then immediately drop a listener so the port is (very likely)
    // unoccupied when we dial it.
    let probe = TcpTransport::listen("127.0.0.1:0").await.unwrap();
    let addr = probe.local_addr().unwrap().to_string();
    drop(probe);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let result = TcpTransport::connect(&addr, Duration::from_secs(1)).await;
    assert!(matches!(
        result,
        Err(TransportError::ConnectFailed(_) | TransportError::ConnectTimeout { .. })
    ));
}
