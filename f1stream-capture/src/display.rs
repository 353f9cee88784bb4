//! Per-session virtual X display.
//!
//! Display ids come from a monotonic counter starting at 99 (low enough
//! to stay clear of any display a developer might already have running
//! locally, high enough that collisions with it are unlikely).

use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio::process::{Child, Command};
use tracing::{debug, warn};

const FIRST_DISPLAY_ID: u32 = 99;
const SOCKET_POLL_TIMEOUT: Duration = Duration::from_secs(5);
const SOCKET_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct DisplayAllocator {
    next: AtomicU32,
}

impl Default for DisplayAllocator {
    fn default() -> Self {
        Self { next: AtomicU32::new(FIRST_DISPLAY_ID) }
    }
}

impl DisplayAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&self) -> u32 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DisplayError {
    #[error("failed to spawn Xvfb: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("Xvfb socket for display {0} did not appear within {1:?}")]
    SocketTimeout(u32, Duration),
}

/// A running `Xvfb` instance bound to one display id. Killed on drop via
/// `kill_on_drop`, but callers that need deterministic teardown ordering
/// should call `shutdown` explicitly first.
pub struct XvfbHandle {
    pub display_id: u32,
    child: Child,
}

impl XvfbHandle {
    pub async fn spawn(display_id: u32) -> Result<Self, DisplayError> {
        let mut cmd = Command::new("Xvfb");
        cmd.arg(format!(":{display_id}"))
            .args(["-screen", "0", "1280x720x24", "-nolisten", "tcp"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(DisplayError::Spawn)?;
        debug!(display_id, "spawned Xvfb");

        wait_for_socket(display_id).await?;
        Ok(Self { display_id, child })
    }

    pub fn display_name(&self) -> String {
        format!(":{}", self.display_id)
    }

    pub async fn shutdown(mut self) {
        if let Err(e) = self.child.kill().await {
            warn!(display_id = self.display_id, error = %e, "failed to kill Xvfb");
        }
    }
}

async fn wait_for_socket(display_id: u32) -> Result<(), DisplayError> {
    let socket_path = format!("/tmp/.X11-unix/X{display_id}");
    let deadline = tokio::time::Instant::now() + SOCKET_POLL_TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if Path::new(&socket_path).exists() {
            return Ok(());
        }
        tokio::time::sleep(SOCKET_POLL_INTERVAL).await;
    }
    Err(DisplayError::SocketTimeout(display_id, SOCKET_POLL_TIMEOUT))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocator_starts_at_99_and_increments() {
        let alloc = DisplayAllocator::new();
        assert_eq!(alloc.allocate(), 99);
        assert_eq!(alloc.allocate(), 100);
        assert_eq!(alloc.allocate(), 101);
    }
}
