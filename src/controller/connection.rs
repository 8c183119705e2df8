//! TCP links to the controller.
//!
//! The reference rig uses one connection on the command port for both directions:
//! commands come in, force telemetry goes out. That connection is split into owned
//! halves so the command listener and the telemetry sender never share a handle.
//! A dedicated telemetry port can be configured instead.

use crate::config::ControllerConfig;
use crate::error::{AppResult, DaqError};
use crate::error_recovery::{retry, RetryPolicy};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::info;

/// Inbound byte stream (commands or velocity).
pub type InboundStream = Box<dyn AsyncRead + Send + Unpin>;

/// Outbound byte stream (telemetry).
pub type OutboundStream = Box<dyn AsyncWrite + Send + Unpin>;

/// The streams the loops consume, one owner each.
pub struct ControllerLinks {
    /// Command frames, read by the command listener
    pub commands: InboundStream,
    /// Force telemetry, written by the telemetry sender
    pub telemetry: OutboundStream,
    /// Shear-velocity frames, read by the velocity loop
    pub velocity: Option<InboundStream>,
}

impl ControllerLinks {
    /// Build from already-open streams (tests, alternative transports).
    pub fn from_streams(
        commands: impl AsyncRead + Send + Unpin + 'static,
        telemetry: impl AsyncWrite + Send + Unpin + 'static,
        velocity: Option<InboundStream>,
    ) -> Self {
        Self {
            commands: Box::new(commands),
            telemetry: Box::new(telemetry),
            velocity,
        }
    }

    /// Dial every configured controller port.
    pub async fn connect(config: &ControllerConfig) -> AppResult<Self> {
        let policy = RetryPolicy {
            max_attempts: config.connect_attempts,
            backoff_delay: Duration::from_millis(config.connect_backoff_ms),
        };

        let command_stream =
            connect_with_retry(&config.command_addr(), config.connect_timeout(), &policy).await?;

        let (commands, telemetry): (InboundStream, OutboundStream) = match config.telemetry_addr() {
            Some(addr) => {
                let telemetry_stream =
                    connect_with_retry(&addr, config.connect_timeout(), &policy).await?;
                (Box::new(command_stream), Box::new(telemetry_stream))
            }
            None => {
                let (read_half, write_half) = command_stream.into_split();
                (Box::new(read_half), Box::new(write_half))
            }
        };

        let velocity: Option<InboundStream> = match config.velocity_addr() {
            Some(addr) => Some(Box::new(
                connect_with_retry(&addr, config.connect_timeout(), &policy).await?,
            )),
            None => None,
        };

        Ok(Self {
            commands,
            telemetry,
            velocity,
        })
    }
}

/// Connect to `addr`, bounding each attempt by `connect_timeout` and retrying per `policy`.
pub async fn connect_with_retry(
    addr: &str,
    connect_timeout: Duration,
    policy: &RetryPolicy,
) -> AppResult<TcpStream> {
    let stream = retry(policy, "controller connect", move || async move {
        match timeout(connect_timeout, TcpStream::connect(addr)).await {
            Ok(result) => result,
            Err(_) => Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("no answer within {} ms", connect_timeout.as_millis()),
            )),
        }
    })
    .await
    .map_err(|source| DaqError::Connection {
        addr: addr.to_string(),
        source,
    })?;

    stream.set_nodelay(true)?;
    info!(addr, "Connected to controller");
    Ok(stream)
}
