//! Shared connection state
//!
//! One owned state struct is passed by reference (via `Arc`) into each
//! background task at spawn time; no state lives outside it. Link
//! transitions are published through a watch channel so that every waiter is
//! woken on every `Linked`/`Disconnected` broadcast, and every wait point
//! also observes the shutdown token.

use std::sync::Mutex;

use semver::Version;
use tokio::io::AsyncWriteExt;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;

/// Connection state, owned exclusively by the supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// No live transport
    Disconnected,
    /// A connect attempt is in flight
    Connecting,
    /// The socket is live and traffic may flow
    Linked,
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkState::Disconnected => write!(f, "disconnected"),
            LinkState::Connecting => write!(f, "connecting"),
            LinkState::Linked => write!(f, "linked"),
        }
    }
}

/// Handshake progress for the current connection
#[derive(Debug, Default)]
pub(crate) struct Handshake {
    /// Whether the "started" notification has fired for this connection
    pub completed: bool,
    /// Timer forcing completion when the agent never announces a version
    pub timer: Option<JoinHandle<()>>,
}

/// State shared between the supervisor, sender, receiver and drainer tasks
pub(crate) struct SharedState {
    /// SDK configuration
    pub config: ClientConfig,

    /// Link state broadcast: transitions wake every waiter
    pub link: watch::Sender<LinkState>,

    /// Wakes the supervisor exactly once per established connection when the
    /// link is reported lost
    link_lost: Notify,

    /// Read half of the live socket, parked for the receiver to take,
    /// paired with a token the supervisor cancels when this connection is
    /// torn down. The receiver watches the token so a write-side failure
    /// also unparks a read blocked on a half-closed socket.
    pub reader: Mutex<Option<(OwnedReadHalf, CancellationToken)>>,

    /// Write half of the live socket. One write lock shared by the sender
    /// and the capability gate's synchronous writes, so frames never
    /// interleave on the wire. Never held across a read.
    pub writer: tokio::sync::Mutex<Option<OwnedWriteHalf>>,

    /// Version announced by the connected agent; `None` until the handshake
    /// signal arrives and reset on every disconnection
    agent_version: Mutex<Option<Version>>,

    /// Handshake progress for the current connection
    pub handshake: Mutex<Handshake>,

    /// Single-fire shutdown flag observed by every task
    pub shutdown: CancellationToken,
}

impl SharedState {
    pub fn new(config: ClientConfig) -> Self {
        let (link, _) = watch::channel(LinkState::Disconnected);
        Self {
            config,
            link,
            link_lost: Notify::new(),
            reader: Mutex::new(None),
            writer: tokio::sync::Mutex::new(None),
            agent_version: Mutex::new(None),
            handshake: Mutex::new(Handshake::default()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Current link state
    pub fn link_state(&self) -> LinkState {
        *self.link.borrow()
    }

    /// Publish a link state transition, waking every waiter
    pub fn set_link_state(&self, state: LinkState) {
        self.link.send_replace(state);
    }

    /// Wait until the link is up. Returns `false` if shutdown was requested
    /// while waiting.
    pub async fn wait_linked(&self) -> bool {
        let mut rx = self.link.subscribe();
        tokio::select! {
            _ = self.shutdown.cancelled() => false,
            linked = rx.wait_for(|s| *s == LinkState::Linked) => linked.is_ok(),
        }
    }

    /// Report that the live transport failed (write error, read error, or
    /// end-of-stream).
    ///
    /// Only the first report per connection flips the state and wakes the
    /// supervisor; duplicates from the other task are suppressed so a stale
    /// wakeup can never tear down the next connection.
    pub fn report_link_lost(&self) {
        let flipped = self.link.send_if_modified(|s| {
            if *s == LinkState::Linked {
                *s = LinkState::Disconnected;
                true
            } else {
                false
            }
        });
        if flipped {
            self.link_lost.notify_one();
        }
    }

    /// Wait for a link-loss report (supervisor only)
    pub async fn link_lost_reported(&self) {
        self.link_lost.notified().await;
    }

    /// Version announced by the connected agent, if any
    pub fn agent_version(&self) -> Option<Version> {
        self.agent_version
            .lock()
            .expect("version lock poisoned")
            .clone()
    }

    /// Store the agent version announced during the handshake
    pub fn set_agent_version(&self, version: Version) {
        *self.agent_version.lock().expect("version lock poisoned") = Some(version);
    }

    /// Forget the agent version (on disconnect, so an upgraded agent
    /// re-negotiates)
    pub fn clear_agent_version(&self) {
        *self.agent_version.lock().expect("version lock poisoned") = None;
    }

    /// Write one framed message through the shared write lock.
    ///
    /// Fails with `NotConnected`-kind I/O error when there is no live
    /// transport; the caller decides whether to retry (sender) or surface
    /// the failure (capability gate).
    pub async fn write_frame(&self, frame: &[u8]) -> std::io::Result<()> {
        let mut writer = self.writer.lock().await;
        match writer.as_mut() {
            Some(w) => w.write_all(frame).await,
            None => Err(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "no live transport",
            )),
        }
    }

    /// Drop both socket halves, closing the connection
    pub async fn drop_transport(&self) {
        self.reader.lock().expect("reader lock poisoned").take();
        self.writer.lock().await.take();
    }

    /// Cancel a pending handshake timer, if any
    pub fn cancel_handshake_timer(&self) {
        let timer = self
            .handshake
            .lock()
            .expect("handshake lock poisoned")
            .timer
            .take();
        if let Some(timer) = timer {
            timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shared() -> SharedState {
        SharedState::new(ClientConfig::new("testapp"))
    }

    #[tokio::test]
    async fn test_link_lost_only_fires_from_linked() {
        let state = shared();
        state.set_link_state(LinkState::Linked);

        state.report_link_lost();
        assert_eq!(state.link_state(), LinkState::Disconnected);

        // Second report is suppressed: the waiter below must time out
        state.report_link_lost();
        state.link_lost_reported().await; // consumes the single notification
        let second = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            state.link_lost_reported(),
        )
        .await;
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn test_wait_linked_observes_shutdown() {
        let state = std::sync::Arc::new(shared());
        let waiter = {
            let state = std::sync::Arc::clone(&state);
            tokio::spawn(async move { state.wait_linked().await })
        };
        state.shutdown.cancel();
        assert!(!waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_version_reset() {
        let state = shared();
        state.set_agent_version(Version::parse("1.8.0").unwrap());
        assert!(state.agent_version().is_some());
        state.clear_agent_version();
        assert!(state.agent_version().is_none());
    }

    #[tokio::test]
    async fn test_write_frame_without_transport_fails() {
        let state = shared();
        let err = state.write_frame(b"{}\n").await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotConnected);
    }
}
