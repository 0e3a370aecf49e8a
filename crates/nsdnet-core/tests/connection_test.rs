//! Integration tests for `Connection` and the device proxies, driven by a
//! scripted server on the far end of an in-memory pipe (and, for the TCP
//! path, a loopback listener).
#![allow(clippy::unwrap_used)]

use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf,
    WriteHalf,
};
use tokio::net::TcpListener;

use nsdnet_core::{
    Connection, ConnectionConfig, ConnectionState, CoreError, DeviceAddress, DeviceProxy,
    NsdNetProxy, Overflow, Position2dProxy, QueuePolicy, ServerErrorKind, kind,
};

// ── Helpers ─────────────────────────────────────────────────────────

struct FakeServer<S> {
    reader: BufReader<ReadHalf<S>>,
    writer: WriteHalf<S>,
}

impl<S: AsyncRead + AsyncWrite> FakeServer<S> {
    fn new(stream: S) -> Self {
        let (read, write) = tokio::io::split(stream);
        Self {
            reader: BufReader::new(read),
            writer: write,
        }
    }

    async fn send(&mut self, data: &[u8]) {
        self.writer.write_all(data).await.unwrap();
        self.writer.flush().await.unwrap();
    }

    async fn line(&mut self) -> String {
        let mut line = String::new();
        self.reader.read_line(&mut line).await.unwrap();
        line
    }

    async fn payload(&mut self, len: usize) -> Vec<u8> {
        let mut buf = vec![0; len];
        self.reader.read_exact(&mut buf).await.unwrap();
        buf
    }

    /// Greet and register the client, refusing the first `busy` ids offered.
    async fn accept(&mut self, busy: usize) -> String {
        self.send(b"greetings stage nsdnet 0001\n").await;
        for _ in 0..busy {
            self.line().await;
            self.send(b"error clientidinuse taken\n").await;
        }
        let greeting = self.line().await;
        self.send(b"registered\n").await;
        greeting
    }
}

fn config() -> ConnectionConfig {
    ConnectionConfig {
        client_id: "robot1".into(),
        ..ConnectionConfig::default()
    }
}

async fn connected_with(
    config: ConnectionConfig,
) -> (Connection, FakeServer<tokio::io::DuplexStream>) {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let mut server = FakeServer::new(server);
    let (conn, _) = tokio::join!(Connection::from_stream(client, &config), server.accept(0));
    (conn.unwrap(), server)
}

async fn connected() -> (Connection, FakeServer<tokio::io::DuplexStream>) {
    connected_with(config()).await
}

/// Register the messaging proxy at `index` and consume its subscribe line.
async fn nsdnet_proxy<S: AsyncRead + AsyncWrite>(
    conn: &mut Connection,
    server: &mut FakeServer<S>,
    index: u16,
) -> NsdNetProxy {
    let proxy: NsdNetProxy = conn.register(index).unwrap();
    assert_eq!(server.line().await, format!("@1:{index} subscribe\n"));
    proxy
}

/// Keep reading until at least `frames` frames have been applied.
async fn read_frames(conn: &mut Connection, frames: usize) {
    let mut total = 0;
    while total < frames {
        total += conn.read().await.unwrap();
    }
}

// ── Transport client ────────────────────────────────────────────────

#[tokio::test]
async fn test_property_answer_is_cached() {
    let (mut conn, mut server) = connected().await;
    let proxy = nsdnet_proxy(&mut conn, &mut server, 0).await;

    proxy.request_property("self.id").unwrap();
    assert_eq!(server.line().await, "@1:0 propget self.id\n");
    assert_eq!(proxy.property(), None, "nothing cached before read");

    server.send(b"@1:0 propval self.id client-42\n").await;
    assert_eq!(conn.read().await.unwrap(), 1);

    let value = proxy.property().unwrap();
    assert_eq!(value.key, "self.id");
    assert_eq!(value.value, "client-42");
}

#[tokio::test]
async fn test_property_last_write_wins() {
    let (mut conn, mut server) = connected().await;
    let proxy = nsdnet_proxy(&mut conn, &mut server, 0).await;

    server
        .send(b"@1:0 propval self.index 1\n@1:0 propval self.index 2\n@1:0 propval self.index 3\n")
        .await;
    read_frames(&mut conn, 3).await;

    assert_eq!(proxy.property().unwrap().value, "3");
}

#[tokio::test]
async fn test_messages_pop_in_arrival_order() {
    let (mut conn, mut server) = connected().await;
    let proxy = nsdnet_proxy(&mut conn, &mut server, 0).await;

    server
        .send(b"@1:0 msgbin peer 1\na@1:0 msgbin peer 1\nb@1:0 msgtext peer\nc\n")
        .await;
    read_frames(&mut conn, 3).await;

    assert_eq!(proxy.receive_message_count(), 3);
    let popped: Vec<String> = std::iter::from_fn(|| proxy.receive_message())
        .map(|m| m.text().into_owned())
        .collect();
    assert_eq!(popped, ["a", "b", "c"]);
    assert!(proxy.receive_message().is_none());
    assert_eq!(proxy.receive_message_count(), 0);
}

#[tokio::test]
async fn test_client_list_is_replaced() {
    let (mut conn, mut server) = connected().await;
    let proxy = nsdnet_proxy(&mut conn, &mut server, 0).await;
    assert!(proxy.client_list().is_empty());

    proxy.request_client_list().unwrap();
    assert_eq!(server.line().await, "@1:0 listclients\n");

    server.send(b"@1:0 listclients robot1 robot2 robot3\n").await;
    read_frames(&mut conn, 1).await;
    let before = proxy.client_list();
    assert_eq!(before.len(), 3);

    server.send(b"@1:0 listclients robot2\n").await;
    read_frames(&mut conn, 1).await;
    let after = proxy.client_list();
    assert_eq!(after.as_slice(), ["robot2".to_owned()]);
    assert_eq!(before.len(), 3, "an old snapshot is unaffected by new answers");
}

#[tokio::test]
async fn test_empty_client_list_is_an_answer() {
    let (mut conn, mut server) = connected().await;
    let proxy = nsdnet_proxy(&mut conn, &mut server, 0).await;
    assert_eq!(proxy.client_list_answer(), None);

    proxy.request_client_list().unwrap();
    assert_eq!(server.line().await, "@1:0 listclients\n");
    server.send(b"@1:0 listclients\n").await;
    read_frames(&mut conn, 1).await;

    let answer = proxy.client_list_answer().unwrap();
    assert!(answer.is_empty());
    assert!(proxy.client_list().is_empty());
}

#[tokio::test]
async fn test_read_after_peer_close_fails_but_keeps_applied_frames() {
    let (mut conn, mut server) = connected().await;
    let proxy = nsdnet_proxy(&mut conn, &mut server, 0).await;

    server.send(b"@1:0 msgbin peer 4\nlast").await;
    drop(server);

    let err = loop {
        if let Err(e) = conn.read().await {
            break e;
        }
    };
    assert!(
        matches!(err, CoreError::Transport { ref reason } if reason.contains("closed by peer")),
        "got {err:?}"
    );
    assert_eq!(conn.state(), ConnectionState::Failed);
    assert_eq!(proxy.receive_message_count(), 1);
    assert_eq!(proxy.receive_message().unwrap().text(), "last");

    assert!(conn.peek(), "a failed link reports pending so read surfaces it");
    assert!(matches!(
        conn.read().await,
        Err(CoreError::Transport { .. })
    ));
    assert!(matches!(
        proxy.send_message("anyone?"),
        Err(CoreError::NotConnected)
    ));
}

#[tokio::test]
async fn test_protocol_violation_is_reported_as_the_reason() {
    let (mut conn, mut server) = connected().await;
    let _proxy = nsdnet_proxy(&mut conn, &mut server, 0).await;

    server.send(b"@1:0 msgbin peer lots\n").await;
    let err = loop {
        if let Err(e) = conn.read().await {
            break e;
        }
    };
    let CoreError::Transport { reason } = err else {
        panic!("expected a transport error, got {err:?}");
    };
    assert!(reason.contains("invalid msgbin length"), "{reason}");
    assert_eq!(conn.state(), ConnectionState::Failed);

    let Err(CoreError::Transport { reason: again }) = conn.read().await else {
        panic!("a failed connection keeps failing");
    };
    assert_eq!(again, reason);
}

#[tokio::test]
async fn test_non_utf8_text_message_keeps_the_link_up() {
    let (mut conn, mut server) = connected().await;
    let proxy = nsdnet_proxy(&mut conn, &mut server, 0).await;

    server
        .send(b"@1:0 msgtext peer\ncaf\xe9\n@1:0 propval self.id ok\n")
        .await;
    read_frames(&mut conn, 2).await;

    assert_eq!(conn.state(), ConnectionState::Connected);
    let msg = proxy.receive_message().unwrap();
    assert_eq!(msg.source, "peer");
    assert_eq!(&msg.payload[..], b"caf\xe9");
    assert_eq!(proxy.property().unwrap().value, "ok");
}

#[tokio::test]
async fn test_peek_is_idempotent_and_never_applies() {
    let (mut conn, mut server) = connected().await;
    let proxy = nsdnet_proxy(&mut conn, &mut server, 0).await;

    for _ in 0..5 {
        assert!(!conn.peek());
    }

    server.send(b"@1:0 propval self.id client-42\n").await;
    while !conn.peek() {
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    for _ in 0..5 {
        assert!(conn.peek());
        assert_eq!(proxy.property(), None);
    }

    conn.read().await.unwrap();
    assert!(!conn.peek());
    assert!(proxy.property().is_some());
}

#[tokio::test]
async fn test_frames_for_unknown_addresses_are_dropped() {
    let (mut conn, mut server) = connected().await;
    let proxy = nsdnet_proxy(&mut conn, &mut server, 0).await;

    server
        .send(b"@1:7 propval self.id stranger\n@4:0 pose 1 2 3\n@1:0 propval self.id mine\n")
        .await;
    read_frames(&mut conn, 3).await;

    assert_eq!(proxy.property().unwrap().value, "mine");
}

#[tokio::test]
async fn test_server_errors_are_recorded() {
    let (mut conn, mut server) = connected().await;
    let proxy = nsdnet_proxy(&mut conn, &mut server, 0).await;

    server
        .send(b"@1:0 error propertynotexist self.colour\n")
        .await;
    read_frames(&mut conn, 1).await;

    let err = proxy.last_error().unwrap();
    assert_eq!(err.kind, ServerErrorKind::PropertyNotExist);
    assert_eq!(err.message, "self.colour");
}

// ── Registration ────────────────────────────────────────────────────

#[tokio::test]
async fn test_duplicate_address_is_rejected() {
    let (mut conn, mut server) = connected().await;
    let _first = nsdnet_proxy(&mut conn, &mut server, 0).await;
    let _second = nsdnet_proxy(&mut conn, &mut server, 1).await;
    let _pose: Position2dProxy = conn.register(0).unwrap();

    let again = conn.register::<NsdNetProxy>(0);
    assert!(matches!(
        again,
        Err(CoreError::DuplicateAddress { address }) if address == DeviceAddress::new(kind::NSDNET, 0)
    ));

    let addresses: Vec<String> = conn.addresses().map(|a| a.to_string()).collect();
    assert_eq!(addresses, ["1:0", "1:1", "4:0"]);
}

#[tokio::test]
async fn test_unregister_detaches_the_proxy() {
    let (mut conn, mut server) = connected().await;
    let proxy = nsdnet_proxy(&mut conn, &mut server, 0).await;

    conn.unregister(proxy.address()).unwrap();
    assert_eq!(server.line().await, "@1:0 unsubscribe\n");

    assert!(matches!(
        proxy.request_property("self.id"),
        Err(CoreError::StaleProxy { .. })
    ));
    assert!(matches!(
        conn.unregister(proxy.address()),
        Err(CoreError::NotRegistered { .. })
    ));

    // The address is free again.
    let _fresh = nsdnet_proxy(&mut conn, &mut server, 0).await;
}

#[tokio::test]
async fn test_close_says_bye_and_stales_proxies() {
    let (mut conn, mut server) = connected().await;
    let proxy = nsdnet_proxy(&mut conn, &mut server, 0).await;
    let state = conn.watch_state();

    conn.close().await;
    assert_eq!(server.line().await, "bye\n");
    assert_eq!(*state.borrow(), ConnectionState::Closed);

    assert!(matches!(
        proxy.send_message("hello"),
        Err(CoreError::StaleProxy { .. })
    ));
    assert!(!proxy.handle().is_attached());
}

#[tokio::test]
async fn test_drop_releases_proxies() {
    let (mut conn, mut server) = connected().await;
    let proxy = nsdnet_proxy(&mut conn, &mut server, 0).await;

    drop(conn);
    assert!(matches!(
        proxy.request_client_list(),
        Err(CoreError::StaleProxy { .. })
    ));
}

// ── Messaging ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_send_writes_binary_frames() {
    let (mut conn, mut server) = connected().await;
    let proxy = nsdnet_proxy(&mut conn, &mut server, 0).await;

    proxy.send_message("Hello World 0").unwrap();
    assert_eq!(server.line().await, "@1:0 msgbin * 13\n");
    assert_eq!(server.payload(13).await, b"Hello World 0");

    proxy.send_message_to("robot2", vec![0u8, 1, 2]).unwrap();
    assert_eq!(server.line().await, "@1:0 msgbin robot2 3\n");
    assert_eq!(server.payload(3).await, [0u8, 1, 2]);

    assert!(matches!(
        proxy.send_message_to("not an id", "x"),
        Err(CoreError::InvalidRequest { .. })
    ));
}

#[tokio::test]
async fn test_full_queue_drops_oldest() {
    let config = ConnectionConfig {
        queue: QueuePolicy {
            capacity: 2,
            overflow: Overflow::DropOldest,
        },
        ..config()
    };
    let (mut conn, mut server) = connected_with(config).await;
    let proxy = nsdnet_proxy(&mut conn, &mut server, 0).await;

    server
        .send(b"@1:0 msgtext p\none\n@1:0 msgtext p\ntwo\n@1:0 msgtext p\nthree\n")
        .await;
    read_frames(&mut conn, 3).await;

    assert_eq!(proxy.receive_message_count(), 2);
    assert_eq!(proxy.dropped_message_count(), 1);
    assert_eq!(proxy.receive_message().unwrap().text(), "two");
    assert_eq!(proxy.receive_message().unwrap().text(), "three");
}

// ── Telemetry ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_position_proxy_caches_pose_and_sends_speed() {
    let (mut conn, mut server) = connected().await;
    let pose: Position2dProxy = conn.register(0).unwrap();
    assert_eq!(server.line().await, "@4:0 subscribe\n");
    assert_eq!(pose.x_pos(), None);

    server.send(b"@4:0 pose 1.5 -2 0.25\n").await;
    read_frames(&mut conn, 1).await;
    assert_eq!(pose.x_pos(), Some(1.5));
    assert_eq!(pose.y_pos(), Some(-2.0));
    assert_eq!(pose.yaw(), Some(0.25));

    pose.set_speed(0.5, -1.25).unwrap();
    assert_eq!(server.line().await, "@4:0 speed 0.5 -1.25\n");

    assert!(matches!(
        pose.set_speed(f64::INFINITY, 0.0),
        Err(CoreError::InvalidRequest { .. })
    ));
}

#[tokio::test]
async fn test_proxies_share_one_connection() {
    let (mut conn, mut server) = connected().await;
    let messages = nsdnet_proxy(&mut conn, &mut server, 0).await;
    let pose: Position2dProxy = conn.register(0).unwrap();
    assert_eq!(server.line().await, "@4:0 subscribe\n");

    server
        .send(b"@4:0 pose 3 4 0\n@1:0 msgtext robot2\nhi\n")
        .await;
    read_frames(&mut conn, 2).await;

    assert_eq!(pose.x_pos(), Some(3.0));
    assert_eq!(messages.receive_message().unwrap().source, "robot2");
}

// ── TCP ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_tcp_connect_retries_busy_client_id() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut server = FakeServer::new(stream);
        let greeting = server.accept(1).await;
        (server, greeting)
    });

    let config = ConnectionConfig {
        host: "127.0.0.1".into(),
        port,
        ..config()
    };
    let mut conn = Connection::connect(&config).await.unwrap();
    let (mut server, greeting) = server.await.unwrap();

    assert_eq!(greeting, "greetings robot1_ nsdnet 0001\n");
    assert_eq!(conn.client_id(), "robot1_");
    assert_eq!(conn.state(), ConnectionState::Connected);

    let proxy = nsdnet_proxy(&mut conn, &mut server, 2).await;
    server.send(b"@1:2 propval self.index 2\n").await;
    read_frames(&mut conn, 1).await;
    assert_eq!(proxy.property().unwrap().value, "2");
}

#[tokio::test]
async fn test_tcp_connect_refused() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let config = ConnectionConfig {
        host: "127.0.0.1".into(),
        port,
        ..config()
    };
    let err = Connection::connect(&config).await.err().unwrap();
    assert!(
        matches!(err, CoreError::ConnectionFailed { transient: true, .. }),
        "got {err:?}"
    );
}

#[tokio::test]
async fn test_wrong_protocol_version_fails_to_connect() {
    let (client, server) = tokio::io::duplex(1024);
    let mut server = FakeServer::new(server);
    let cfg = config();
    let (conn, ()) = tokio::join!(Connection::from_stream(client, &cfg), async {
        server.send(b"greetings stage nsdnet 0002\n").await;
    });
    assert!(matches!(
        conn.err().unwrap(),
        CoreError::ConnectionFailed { .. }
    ));
}
