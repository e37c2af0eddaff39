//! 多服务器连接示例
//!
//! 同时维护四条连接，每条使用不同的分帧策略。目标主机不可达时可以观察到
//! 自动重连日志；按 Ctrl+C 或等待 60 秒后退出。

use std::time::Duration;

use tcpmux::{
    ByteDelimited, CharacterDelimited, ConnectionConfig, FactoryConfig, FrameDelimiter,
    JsonDocument, LengthPrefixed, TcpFactory,
};
use tracing::{error, info};

fn server<D: FrameDelimiter>(name: &'static str, hostname: &str, port: u16, delimiter: D) -> ConnectionConfig {
    ConnectionConfig::new(name, hostname, port, delimiter)
        .on_connected(move |_| info!("✅ Connected: {}", name))
        .on_disconnected(move |_, error| {
            info!("❌ Disconnected: {} {}", name, error.map(|e| e.to_string()).unwrap_or_default())
        })
        .on_receive(move |_, frame| info!("📦 Data from {}: {}", name, frame.data))
        .on_error(move |_, error| error!("🚨 Error in {}: {}", name, error))
        .on_retry_scheduled(move |_, delay, retry_count| {
            info!("🔄 Retry scheduled for {} in {:?} (attempt {})", name, delay, retry_count)
        })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    info!("🚀 启动多服务器 TCP 客户端");

    let factory = TcpFactory::builder()
        .config(FactoryConfig::new().with_retry_interval(Duration::from_secs(5)))
        .connection(server("server1", "localhost", 8080, CharacterDelimited::lines()))
        .connection(server("api-server", "api.example.com", 9090, JsonDocument))
        .connection(server("binary-server", "binary.example.com", 7777, ByteDelimited(0x20)))
        .connection(server("custom-server", "custom.example.com", 5555, LengthPrefixed))
        .build()?;

    factory.start().await;

    // 连接建立后发送一些数据
    let writer = factory.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(2)).await;

        writer.write("server1", "Hello, server!\n").await;
        let ping = serde_json::json!({ "action": "ping", "timestamp": chrono::Utc::now().timestamp_millis() });
        writer.write("api-server", ping.to_string()).await;
        writer.write("binary-server", &b"Hello World "[..]).await;

        // 自定义协议：4 字节长度 + 1 字节类型 + 数据
        let mut message = vec![1u8];
        message.extend_from_slice(b"test");
        let sent = writer.write("custom-server", LengthPrefixed::encode(&message)).await;
        info!("custom-server write accepted: {}", sent);
    });

    // 定期打印连接状态
    let monitor = factory.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(10));
        loop {
            interval.tick().await;
            let mut states: Vec<_> = monitor.states().await.into_iter().collect();
            states.sort_by(|a, b| a.0.cmp(&b.0));

            info!("📊 Connection States:");
            for (name, state) in states {
                info!(
                    "  {}: {} Connected: {}, Retries: {}, Bytes RX: {}, Bytes TX: {}",
                    name,
                    if state.is_connected { "🟢" } else { "🔴" },
                    state.is_connected,
                    state.retry_count,
                    state.total_bytes_received,
                    state.total_bytes_sent
                );
            }
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = tokio::time::sleep(Duration::from_secs(60)) => {}
    }

    info!("🛑 Shutting down...");
    factory.destroy().await;
    Ok(())
}
