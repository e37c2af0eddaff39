//! 使用真实 TCP 监听端的端到端测试

use std::time::Duration;

use tcpmux::{
    CharacterDelimited, ConnectionConfig, ConnectionEvent, EventKind, FactoryConfig,
    LengthPrefixed, TcpFactory,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// 把连接的所有事件转发到通道
fn forward(config: ConnectionConfig) -> (ConnectionConfig, mpsc::UnboundedReceiver<ConnectionEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut config = config;
    for kind in EventKind::ALL {
        let tx = tx.clone();
        config = config.on(kind, move |_, event| {
            let _ = tx.send(event.clone());
        });
    }
    (config, rx)
}

async fn next_of(rx: &mut mpsc::UnboundedReceiver<ConnectionEvent>, kind: EventKind) -> ConnectionEvent {
    timeout(WAIT, async {
        loop {
            let event = rx.recv().await.expect("event channel closed");
            if event.kind() == kind {
                return event;
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {}", kind))
}

fn fast_retry() -> FactoryConfig {
    FactoryConfig::new().with_retry_interval(Duration::from_millis(50))
}

#[tokio::test]
async fn test_line_protocol_round_trip_and_reconnect() {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let factory = TcpFactory::new(fast_retry()).unwrap();
    let (config, mut events) = forward(ConnectionConfig::new(
        "server1",
        "127.0.0.1",
        port,
        CharacterDelimited::lines(),
    ));
    factory.register(config).await.unwrap();
    factory.start().await;

    let (mut socket, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    next_of(&mut events, EventKind::Connected).await;

    socket.write_all(b"hello\nwor").await.unwrap();
    socket.write_all(b"ld\n").await.unwrap();

    let mut received = Vec::new();
    for _ in 0..2 {
        if let ConnectionEvent::Receive(frame) = next_of(&mut events, EventKind::Receive).await {
            received.push(frame.data.to_string());
        }
    }
    assert_eq!(received, ["hello", "world"]);

    assert!(factory.write("server1", "ping\n").await);
    let mut buf = [0u8; 5];
    timeout(WAIT, socket.read_exact(&mut buf)).await.unwrap().unwrap();
    assert_eq!(&buf, b"ping\n");

    let state = factory.state("server1").await.unwrap();
    assert_eq!(state.total_bytes_received, 12);
    assert_eq!(state.total_bytes_sent, 5);

    // 服务端关闭后自动重连
    drop(socket);
    next_of(&mut events, EventKind::End).await;
    match next_of(&mut events, EventKind::RetryScheduled).await {
        ConnectionEvent::RetryScheduled { retry_count, .. } => assert_eq!(retry_count, 1),
        other => panic!("unexpected event {:?}", other),
    }

    let (_socket, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    next_of(&mut events, EventKind::Connected).await;
    assert_eq!(factory.state("server1").await.unwrap().retry_count, 0);

    factory.destroy().await;
}

#[tokio::test]
async fn test_length_prefixed_frames_over_tcp() {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let factory = TcpFactory::new(fast_retry()).unwrap();
    let (config, mut events) =
        forward(ConnectionConfig::new("binary", "127.0.0.1", port, LengthPrefixed));
    factory.register(config).await.unwrap();
    factory.connect("binary").await;

    let (mut socket, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    let mut stream = LengthPrefixed::encode(b"first");
    stream.extend_from_slice(&LengthPrefixed::encode(b"second"));
    for byte in stream {
        socket.write_all(&[byte]).await.unwrap();
    }

    for expected in [&b"first"[..], b"second"] {
        match next_of(&mut events, EventKind::Receive).await {
            ConnectionEvent::Receive(frame) => {
                assert_eq!(frame.data.as_bytes().map(|b| b.as_ref()), Some(expected));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    factory.disconnect("binary").await;
    next_of(&mut events, EventKind::ConnectionClosed).await;

    let mut buf = [0u8; 1];
    let read = timeout(WAIT, socket.read(&mut buf)).await.unwrap().unwrap();
    assert_eq!(read, 0);
}

#[tokio::test]
async fn test_refused_connection_reports_retryable_error() {
    init_tracing();
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };

    let factory = TcpFactory::new(FactoryConfig::new().with_retry_interval(Duration::from_secs(30))).unwrap();
    let (config, mut events) = forward(ConnectionConfig::new(
        "nobody",
        "127.0.0.1",
        port,
        CharacterDelimited::lines(),
    ));
    factory.register(config).await.unwrap();
    factory.connect("nobody").await;

    match next_of(&mut events, EventKind::Error).await {
        ConnectionEvent::Error(error) => assert!(error.is_retryable()),
        other => panic!("unexpected event {:?}", other),
    }
    next_of(&mut events, EventKind::RetryScheduled).await;

    let state = factory.state("nobody").await.unwrap();
    assert!(!state.is_connected);
    assert!(state.last_error.is_some());

    factory.destroy().await;
}
