//! Network reachability probe.
//!
//! Hosts without a platform connectivity signal can feed the engine's
//! `is_online` flag from periodic TCP connects to the backend.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::engine::EngineHandle;

/// Timeout for one reachability check.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Returns true if a TCP connection to `target` (`host:port`) succeeds.
pub async fn is_reachable(target: &str) -> bool {
    matches!(
        tokio::time::timeout(PROBE_TIMEOUT, TcpStream::connect(target)).await,
        Ok(Ok(_))
    )
}

/// Spawns a task that reports reachability changes of `target` to the engine.
///
/// The task ends when the engine stops.
pub fn spawn_reachability_probe(
    handle: EngineHandle,
    target: String,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut last = None;
        loop {
            let reachable = is_reachable(&target).await;
            trace!(%target, reachable, "Reachability check");
            if last != Some(reachable) {
                debug!(%target, reachable, "Reachability changed");
                if handle.set_online(reachable).await.is_err() {
                    return;
                }
                last = Some(reachable);
            }
            tokio::time::sleep(interval).await;
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reachable_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = listener.local_addr().unwrap().to_string();
        assert!(is_reachable(&target).await);
    }

    #[tokio::test]
    async fn test_closed_port_is_unreachable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = listener.local_addr().unwrap().to_string();
        drop(listener);
        assert!(!is_reachable(&target).await);
    }
}
