//! Connects to a gateway, keeps the connection alive and logs what
//! happens until Ctrl-C.
//!
//! ```text
//! ROCKETLINK_URL=wss://gateway.example/ws ROCKETLINK_TOKEN=... \
//! RUST_LOG=rocketlink=debug cargo run -p ping-client
//! ```

use rocketlink::prelude::*;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

const URL_VAR: &str = "ROCKETLINK_URL";
const TOKEN_VAR: &str = "ROCKETLINK_TOKEN";

/// Payload of the gateway's `2000` notice event.
#[derive(Debug, Deserialize)]
struct Notice {
    text: String,
}

/// Logs lifecycle events.
struct LogObserver;

impl SocketObserver for LogObserver {
    fn on_opened(&self) {
        tracing::info!("gateway connection open");
    }

    fn on_closed(&self, info: &CloseInfo) {
        tracing::info!(code = info.code, reason = %info.reason, "gateway connection closed");
    }

    fn on_errored(&self, error: &str) {
        tracing::warn!(%error, "gateway connection failed");
    }

    fn on_initialized(&self, version: i32) {
        tracing::info!(version, "gateway session ready");
    }
}

fn settings_from(url: Option<String>, token: Option<String>) -> Option<SocketSettings> {
    let url = url.filter(|u| !u.trim().is_empty())?;
    Some(SocketSettings::new(url, token.unwrap_or_default()))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let Some(settings) = settings_from(
        std::env::var(URL_VAR).ok(),
        std::env::var(TOKEN_VAR).ok(),
    ) else {
        eprintln!("set {URL_VAR} (and optionally {TOKEN_VAR})");
        std::process::exit(2);
    };

    let socket = Socket::builder(SocketConfig::new(settings))
        .observer(LogObserver)
        .on(InboundEvent::Unknown(2000), |payload| {
            if let Some(notice) = payload.data_as::<Notice>()? {
                tracing::info!(text = %notice.text, "notice");
            }
            Ok(())
        })
        .build();

    socket.connect()?;
    tokio::signal::ctrl_c().await?;

    socket.shutdown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_requires_url() {
        assert!(settings_from(None, Some("t".into())).is_none());
        assert!(settings_from(Some("  ".into()), None).is_none());
    }

    #[test]
    fn test_settings_from_defaults_token_to_empty() {
        let settings = settings_from(Some("ws://localhost:9000".into()), None).unwrap();
        assert_eq!(settings.url, "ws://localhost:9000");
        assert_eq!(settings.token(), None);
    }
}
