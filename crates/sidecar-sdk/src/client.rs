//! Public SDK client
//!
//! One [`AgentClient`] owns the whole machinery: the shared connection
//! state, the outbound buffer, the callback registry, and the four
//! background tasks (supervisor, sender, drainer, receiver) spawned by
//! [`AgentClient::start`]. No state outlives the instance, and a stopped
//! instance never restarts.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;

use sidecar_protocol::envelope;

use crate::buffer::{self, OutboundBuffer, OutboundMessage};
use crate::callbacks::{CallbackRegistry, CommandCallback, StatusCallback};
use crate::capability;
use crate::config::ClientConfig;
use crate::error::SdkError;
use crate::state::{LinkState, SharedState};
use crate::{receiver, sender, supervisor, SDK_VERSION};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Idle,
    Started,
    Stopped,
}

/// Client for exchanging structured messages with the co-located agent.
///
/// Construct with an application name and optional status callbacks, then
/// call [`start`](Self::start). Messages sent while the agent is absent or
/// restarting are buffered (bounded, drop-oldest); the connection is
/// supervised and re-established automatically.
pub struct AgentClient {
    shared: Arc<SharedState>,
    buffer: Arc<OutboundBuffer>,
    registry: Arc<CallbackRegistry>,
    hello: bytes::Bytes,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
    lifecycle: Lifecycle,
}

impl AgentClient {
    /// Create a new client.
    ///
    /// `on_agent_status` receives `"started"`, `"stopping"` and `"stopped"`;
    /// `on_connection_status` receives the agent's upstream connectivity
    /// transitions (`"connected"` / `"disconnected"`). Both are optional.
    pub fn new(
        config: ClientConfig,
        on_agent_status: Option<StatusCallback>,
        on_connection_status: Option<StatusCallback>,
    ) -> Self {
        let hello = envelope::hello_frame(&config.name, SDK_VERSION)
            .expect("hello frame serialization should not fail");
        let buffer = Arc::new(OutboundBuffer::new(config.max_buffered_msgs));
        let registry = Arc::new(CallbackRegistry::new(
            config.name.clone(),
            Arc::clone(&buffer),
            on_agent_status,
            on_connection_status,
        ));
        let shared = Arc::new(SharedState::new(config));

        Self {
            shared,
            buffer,
            registry,
            hello,
            tasks: Vec::new(),
            lifecycle: Lifecycle::Idle,
        }
    }

    /// Spawn the background tasks and begin connecting to the agent.
    ///
    /// A stopped instance cannot be restarted; calling `start` again is a
    /// logged no-op.
    pub fn start(&mut self) {
        match self.lifecycle {
            Lifecycle::Started => {
                tracing::warn!("start() called on a running client, ignoring");
                return;
            }
            Lifecycle::Stopped => {
                tracing::warn!("start() called on a stopped client; instances do not restart");
                return;
            }
            Lifecycle::Idle => {}
        }
        self.lifecycle = Lifecycle::Started;

        self.tasks.push((
            "supervisor",
            tokio::spawn(supervisor::run(
                Arc::clone(&self.shared),
                Arc::clone(&self.buffer),
                Arc::clone(&self.registry),
                self.hello.clone(),
            )),
        ));
        self.tasks.push((
            "sender",
            tokio::spawn(sender::run(
                Arc::clone(&self.shared),
                Arc::clone(&self.buffer),
            )),
        ));
        self.tasks.push((
            "drainer",
            tokio::spawn(buffer::run_drainer(
                Arc::clone(&self.buffer),
                self.shared.shutdown.clone(),
            )),
        ));
        self.tasks.push((
            "receiver",
            tokio::spawn(receiver::run(
                Arc::clone(&self.shared),
                Arc::clone(&self.registry),
            )),
        ));
    }

    /// Stop the background tasks and tear down the connection.
    ///
    /// Each task is joined with a bounded timeout so `stop` stays safe under
    /// a wedged agent; tasks still running after the timeout are aborted.
    pub async fn stop(&mut self) {
        if self.lifecycle != Lifecycle::Started {
            return;
        }
        self.lifecycle = Lifecycle::Stopped;

        // Wake every suspension point: condition waiters via the token, the
        // drainer via the overflow signal, and a parked dequeue via the
        // sentinel. Cancel any pending handshake timer.
        self.shared.shutdown.cancel();
        self.shared.cancel_handshake_timer();
        self.buffer.signal_overflow();
        self.buffer.push_shutdown();

        for (name, mut handle) in self.tasks.drain(..) {
            let joined = tokio::time::timeout(self.shared.config.join_timeout, &mut handle).await;
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(task = name, "Task failed during stop: {}", e),
                Err(_) => {
                    tracing::warn!(task = name, "Task did not stop within timeout, aborting");
                    handle.abort();
                }
            }
        }
    }

    /// Send a message to the agent.
    ///
    /// The payload must serialize to a JSON object. While the agent is
    /// unreachable the message is buffered; once the buffer is full the
    /// oldest messages are discarded, and under sustained overflow this call
    /// waits for space.
    pub async fn send<T: Serialize>(
        &self,
        msg: &T,
        channel: Option<&str>,
    ) -> Result<(), SdkError> {
        let payload = serde_json::to_value(msg)?;
        if !payload.is_object() {
            return Err(SdkError::InvalidArgument(format!(
                "msg must serialize to a JSON object but {} was given",
                json_kind(&payload)
            )));
        }
        if let Some(channel) = channel {
            if channel.is_empty() {
                return Err(SdkError::InvalidArgument(
                    "channel must be a non-empty string".to_string(),
                ));
            }
        }

        self.buffer
            .push(OutboundMessage::Data {
                payload,
                channel: channel.map(String::from),
            })
            .await;
        Ok(())
    }

    /// Register a callback for a command type received from the agent.
    ///
    /// Registering the same command type again overwrites the previous
    /// callback.
    pub fn subscribe(&self, cmd_type: &str, callback: CommandCallback) -> Result<(), SdkError> {
        self.registry.subscribe(cmd_type, callback)
    }

    /// Invoke a named remote procedure on the agent.
    ///
    /// Synchronous contract: requires an agent that announced version
    /// >= 1.8.0 and a live link. The frame bypasses the outbound buffer and
    /// the call fails fast instead of buffering. Trap the error and retry
    /// after the agent-status callback reports `"started"`.
    pub async fn call_agent<T: Serialize>(
        &self,
        cmd: &str,
        args: Option<&T>,
    ) -> Result<(), SdkError> {
        if cmd.is_empty() {
            return Err(SdkError::InvalidArgument(
                "cmd must be a non-empty string".to_string(),
            ));
        }

        let args = match args {
            Some(args) => {
                let value = serde_json::to_value(args)?;
                if !value.is_object() {
                    return Err(SdkError::InvalidArgument(format!(
                        "args must serialize to a JSON object but {} was given",
                        json_kind(&value)
                    )));
                }
                value
            }
            None => Value::Object(serde_json::Map::new()),
        };

        capability::call_remote(&self.shared, cmd, args).await
    }

    /// Current connection state
    pub fn link_state(&self) -> LinkState {
        self.shared.link_state()
    }

    /// Version announced by the connected agent, if any
    pub fn agent_version(&self) -> Option<semver::Version> {
        self.shared.agent_version()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a bool",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
