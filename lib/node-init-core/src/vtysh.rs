//! Routing daemon control socket client
//!
//! FRR daemons expose a vty socket per daemon under a run directory. The
//! protocol is a single command terminated by a NUL byte, answered by a
//! response that is terminated by a NUL byte as well. Every call opens its own
//! connection.

use crate::{NodeInitError, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tracing::debug;

/// Daemons with a known vty socket
pub const KNOWN_DAEMONS: &[&str] = &[
    "babeld", "bfdd", "bgpd", "eigrpd", "fabricd", "isisd", "ldpd", "nhrpd", "ospf6d", "ospfd",
    "pbrd", "pimd", "ripd", "ripngd", "sharpd", "staticd", "vrrpd", "zebra",
];

pub const DEFAULT_RUN_DIR: &str = "/var/run/frr";

const TERMINATOR: u8 = 0;

/// Control socket settings
#[derive(Clone, Debug)]
pub struct VtyConfig {
    /// Directory holding the `<daemon>.vty` sockets
    pub run_dir: PathBuf,
    /// Daemon names commands may be sent to
    pub daemons: Vec<String>,
    /// Upper bound for one connect/send/receive round trip
    pub timeout: Duration,
}

impl Default for VtyConfig {
    fn default() -> Self {
        Self {
            run_dir: PathBuf::from(DEFAULT_RUN_DIR),
            daemons: KNOWN_DAEMONS.iter().map(|d| d.to_string()).collect(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Frame a command for the wire
pub fn encode_command(command: &str) -> Option<Vec<u8>> {
    if command.as_bytes().contains(&TERMINATOR) {
        return None;
    }
    let mut frame = Vec::with_capacity(command.len() + 1);
    frame.extend_from_slice(command.as_bytes());
    frame.push(TERMINATOR);
    Some(frame)
}

/// Read one NUL terminated response and strip the terminator.
///
/// Returns `None` if the stream ends before the terminator shows up.
pub async fn read_response<R>(reader: R) -> std::io::Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut response = Vec::new();
    reader.read_until(TERMINATOR, &mut response).await?;

    match response.pop() {
        Some(TERMINATOR) => Ok(Some(response)),
        _ => Ok(None),
    }
}

/// One-shot client for routing daemon control sockets
#[derive(Clone, Debug)]
pub struct VtyshClient {
    config: VtyConfig,
}

impl VtyshClient {
    pub fn new(config: VtyConfig) -> Self {
        Self { config }
    }

    /// Socket path of a daemon from the allow-list
    pub fn socket_path(&self, daemon: &str) -> Result<PathBuf> {
        if !self.config.daemons.iter().any(|known| known == daemon) {
            return Err(NodeInitError::UnknownDaemon(daemon.to_string()));
        }
        Ok(self.config.run_dir.join(format!("{}.vty", daemon)))
    }

    /// Send `command` to `daemon` and return the raw response payload
    pub async fn send(&self, daemon: &str, command: &str) -> Result<Vec<u8>> {
        let path = self.socket_path(daemon)?;
        debug!("Sending {:?} to {}", command, path.display());

        let result = tokio::time::timeout(self.config.timeout, Self::round_trip(&path, command)).await;
        match result {
            Ok(response) => response,
            Err(_) => Err(NodeInitError::Protocol {
                path,
                reason: format!("no response within {:?}", self.config.timeout),
            }),
        }
    }

    async fn round_trip(path: &Path, command: &str) -> Result<Vec<u8>> {
        let protocol = |reason: String| NodeInitError::Protocol {
            path: path.to_path_buf(),
            reason,
        };

        let frame = encode_command(command)
            .ok_or_else(|| protocol("command contains a NUL byte".to_string()))?;

        let mut stream = UnixStream::connect(path)
            .await
            .map_err(|source| NodeInitError::Connect {
                path: path.to_path_buf(),
                source,
            })?;

        stream
            .write_all(&frame)
            .await
            .map_err(|e| protocol(format!("write failed: {}", e)))?;

        let response = read_response(&mut stream)
            .await
            .map_err(|e| protocol(format!("read failed: {}", e)))?
            .ok_or_else(|| protocol("connection closed before response terminator".to_string()))?;

        debug!("Received {} bytes from {}", response.len(), path.display());
        Ok(response)
    }
}
