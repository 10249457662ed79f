//! Network infrastructure — implements `TcpProbe` using `spawn_blocking`.

use std::time::Duration;

use anyhow::Result;

use crate::application::ports::TcpProbe;

/// How long one connection attempt may take before it reads as "not open".
const CONNECT_TIMEOUT: Duration = Duration::from_secs(8);

/// Production implementation that performs real connection attempts.
pub struct TokioTcpProbe;

impl TcpProbe for TokioTcpProbe {
    async fn check_tcp(&self, host: &str, port: u16) -> Result<bool> {
        let addr = format!("{host}:{port}");
        let open = tokio::task::spawn_blocking(move || {
            let addr: std::net::SocketAddr = addr
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid address {addr}: {e}"))?;
            Ok::<bool, anyhow::Error>(
                // The connection is only an observation; it closes on drop.
                std::net::TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT).is_ok(),
            )
        })
        .await
        .map_err(|e| anyhow::anyhow!("spawn_blocking panicked: {e}"))??;
        Ok(open)
    }
}
