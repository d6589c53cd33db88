//! Connection supervisor
//!
//! Owns the socket lifecycle: the connect/retry loop, the best-effort
//! version handshake, and the teardown on link loss. Retries on a short
//! fixed backoff forever; the agent is expected to appear quickly, so
//! exponential backoff would only delay recovery.

use std::sync::Arc;

use bytes::Bytes;
use tokio::net::UnixStream;

use crate::buffer::{OutboundBuffer, OutboundMessage};
use crate::callbacks::CallbackRegistry;
use crate::state::{LinkState, SharedState};

pub(crate) async fn run(
    shared: Arc<SharedState>,
    buffer: Arc<OutboundBuffer>,
    registry: Arc<CallbackRegistry>,
    hello: Bytes,
) {
    while !shared.shutdown.is_cancelled() {
        shared.set_link_state(LinkState::Connecting);

        let stream = match UnixStream::connect(&shared.config.socket_path).await {
            Ok(stream) => stream,
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                // Fatal: retrying cannot help, the process lacks access
                tracing::error!(
                    path = %shared.config.socket_path.display(),
                    "Permission denied on agent socket, giving up"
                );
                shared.set_link_state(LinkState::Disconnected);
                return;
            }
            Err(e) => {
                tracing::trace!(
                    path = %shared.config.socket_path.display(),
                    "Agent unavailable: {}, retrying",
                    e
                );
                tokio::select! {
                    _ = shared.shutdown.cancelled() => break,
                    _ = tokio::time::sleep(shared.config.retry_backoff) => {}
                }
                continue;
            }
        };

        tracing::info!(path = %shared.config.socket_path.display(), "Connected to agent");

        let (read_half, write_half) = stream.into_split();
        // Per-connection token: cancelled on teardown so the receiver never
        // stays parked on a reader whose peer only half-closed
        let conn_token = shared.shutdown.child_token();
        *shared.reader.lock().expect("reader lock poisoned") =
            Some((read_half, conn_token.clone()));
        *shared.writer.lock().await = Some(write_half);
        shared.clear_agent_version();

        // Announce the application; backlog queued while disconnected drains
        // ahead of it in FIFO order
        buffer.push(OutboundMessage::Signal(hello.clone())).await;

        // The "started" notification fires once the agent announces its
        // version, or when this timer expires (agents < 1.8.0 never do)
        start_handshake_timer(&shared, &registry);

        shared.set_link_state(LinkState::Linked);

        // Block until the sender or receiver reports link loss
        let stopping = tokio::select! {
            _ = shared.shutdown.cancelled() => true,
            _ = shared.link_lost_reported() => false,
        };

        // State flips before the timer is cancelled so a timer that already
        // raced past its sleep observes the dead link and stays silent
        shared.set_link_state(LinkState::Disconnected);
        shared.cancel_handshake_timer();
        conn_token.cancel();
        shared.drop_transport().await;
        shared.clear_agent_version();
        registry.fire_agent_status("stopped").await;

        if stopping {
            break;
        }
        tracing::info!("Lost link to agent, reconnecting");
    }
    tracing::debug!("Supervisor task exiting");
}

fn start_handshake_timer(shared: &Arc<SharedState>, registry: &Arc<CallbackRegistry>) {
    let timeout = shared.config.handshake_timeout;
    let timer_shared = Arc::clone(shared);
    let timer_registry = Arc::clone(registry);
    let timer = tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        complete_handshake(&timer_shared, &timer_registry, true).await;
    });

    let mut handshake = shared.handshake.lock().expect("handshake lock poisoned");
    handshake.completed = false;
    if let Some(stale) = handshake.timer.replace(timer) {
        stale.abort();
    }
}

/// Mark the handshake finished and fire the "started" notification.
///
/// Invoked by the receiver when the agent announces its version, and by the
/// handshake timer when it never does. Exactly one "started" fires per
/// connection regardless of which path wins. When invoked from the timer
/// itself (`timed_out`), the timer handle is dropped rather than aborted so
/// the timer task is not cancelled out from under its own callback.
pub(crate) async fn complete_handshake(
    shared: &SharedState,
    registry: &CallbackRegistry,
    timed_out: bool,
) {
    let first_completion = {
        let mut handshake = shared.handshake.lock().expect("handshake lock poisoned");
        if handshake.completed {
            false
        } else if timed_out && shared.link_state() != LinkState::Linked {
            // The timer raced past its sleep while the supervisor was
            // tearing the connection down; stay silent for a dead link
            false
        } else {
            handshake.completed = true;
            let timer = handshake.timer.take();
            if let Some(timer) = timer {
                if !timed_out {
                    timer.abort();
                }
            }
            true
        }
    };

    if first_completion {
        tracing::debug!(timed_out, "Handshake complete");
        registry.fire_agent_status("started").await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;

    fn fixtures() -> (Arc<SharedState>, Arc<CallbackRegistry>, Arc<OutboundBuffer>) {
        let buffer = Arc::new(OutboundBuffer::new(4));
        let shared = Arc::new(SharedState::new(ClientConfig::new("testapp")));
        let registry = Arc::new(CallbackRegistry::new(
            "testapp".to_string(),
            Arc::clone(&buffer),
            None,
            None,
        ));
        (shared, registry, buffer)
    }

    #[tokio::test]
    async fn test_handshake_completes_only_once() {
        let (shared, registry, _buffer) = fixtures();

        complete_handshake(&shared, &registry, false).await;
        assert!(shared.handshake.lock().unwrap().completed);

        // Second completion is a no-op
        complete_handshake(&shared, &registry, true).await;
        assert!(shared.handshake.lock().unwrap().completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_started_when_no_version_arrives() {
        let (shared, registry, _buffer) = fixtures();
        shared.set_link_state(LinkState::Linked);

        start_handshake_timer(&shared, &registry);
        assert!(!shared.handshake.lock().unwrap().completed);

        tokio::time::sleep(shared.config.handshake_timeout * 2).await;
        tokio::task::yield_now().await;
        assert!(shared.handshake.lock().unwrap().completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_firing_after_teardown_stays_silent() {
        let (shared, registry, _buffer) = fixtures();
        shared.set_link_state(LinkState::Linked);
        start_handshake_timer(&shared, &registry);

        // Teardown flips the state but loses the abort race with the timer
        shared.set_link_state(LinkState::Disconnected);

        tokio::time::sleep(shared.config.handshake_timeout * 2).await;
        tokio::task::yield_now().await;
        assert!(!shared.handshake.lock().unwrap().completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_never_completes() {
        let (shared, registry, _buffer) = fixtures();

        start_handshake_timer(&shared, &registry);
        shared.cancel_handshake_timer();

        tokio::time::sleep(shared.config.handshake_timeout * 2).await;
        tokio::task::yield_now().await;
        assert!(!shared.handshake.lock().unwrap().completed);
    }
}
