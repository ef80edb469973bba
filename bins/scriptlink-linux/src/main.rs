use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use scriptlink_core::SessionSlot;
use scriptlink_server::{FileServerConfig, FileServerSession, MqttConfig, MqttSession, QoS};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,scriptlink_server=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("scriptlink demo server starting...");

    // Configuration from environment
    let bind_addr: SocketAddr = std::env::var("SCRIPTLINK_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8080".into())
        .parse()?;
    let base_dir = PathBuf::from(
        std::env::var("SCRIPTLINK_BASE_DIR").unwrap_or_else(|_| "www".into()),
    );
    std::fs::create_dir_all(&base_dir)?;

    // One registration point per subsystem: starting a new session displaces
    // (and tears down) the previous one.
    let httpd_slot: SessionSlot<FileServerSession> = SessionSlot::new();
    let mqtt_slot: SessionSlot<MqttSession> = SessionSlot::new();

    let config = FileServerConfig {
        bind_addr,
        base_dir,
        ..Default::default()
    };
    let server = FileServerSession::start(config).await?;
    if let Some(previous) = httpd_slot.install(server) {
        let _ = previous.stop().await;
    }

    tracing::info!("🚀 scriptlink server ready!");
    tracing::info!("Try these commands:");
    tracing::info!("   curl http://localhost:{}/", bind_addr.port());
    tracing::info!(
        "   curl --data-binary @file.txt http://localhost:{}/upload/file.txt",
        bind_addr.port()
    );
    tracing::info!(
        "   curl http://localhost:{}/delete/file.txt",
        bind_addr.port()
    );

    // Optional MQTT binding
    if let Ok(broker_host) = std::env::var("SCRIPTLINK_MQTT_HOST") {
        let config = MqttConfig {
            broker_host,
            ..Default::default()
        };
        let session = MqttSession::start(config);
        if let Ok(topic) = std::env::var("SCRIPTLINK_MQTT_TOPIC") {
            session.subscribe(&topic, QoS::AtMostOnce).await?;
            tracing::info!("subscribed to {}", topic);
        }
        if let Some(previous) = mqtt_slot.install(session) {
            let _ = previous.stop().await;
        }
    }

    // Steady-state event loop: poll both channels without ever blocking on
    // them, hand each event to the "script" (here: the log) as JSON.
    let mut poll_interval = tokio::time::interval(Duration::from_millis(50));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C, shutting down...");
                break;
            }
            _ = poll_interval.tick() => {
                while let Some(event) = httpd_slot.with(|s| s.poll()).flatten() {
                    tracing::info!("httpd event: {}", event.to_json());
                }
                while let Some(event) = mqtt_slot.with(|s| s.poll()).flatten() {
                    tracing::info!("mqtt event: {}", event.to_json());
                }
            }
        }
    }

    if let Some(session) = mqtt_slot.take() {
        let released = session.stop().await;
        if released > 0 {
            tracing::debug!("released {} unconsumed mqtt events", released);
        }
    }
    if let Some(session) = httpd_slot.take() {
        let released = session.stop().await;
        if released > 0 {
            tracing::debug!("released {} unconsumed httpd events", released);
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
