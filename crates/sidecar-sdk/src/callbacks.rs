//! Callback registry and safe invocation
//!
//! Every user-supplied callback (status, connection, and command callbacks)
//! runs behind a guard: a failure result or a panic is converted into an
//! outbound error signal instead of terminating the background task that
//! invoked it, so a misbehaving callback stays observable by the agent.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use serde_json::Value;

use sidecar_protocol::envelope;

use crate::buffer::{OutboundBuffer, OutboundMessage};
use crate::error::SdkError;

/// A failure raised by a user callback, reported to the agent as an error
/// signal carrying the failure kind and message
#[derive(Debug, Clone)]
pub struct CallbackError {
    kind: String,
    message: String,
}

impl CallbackError {
    /// Create a callback error with an application-defined kind
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Failure kind, e.g. "ValueError"
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Human-readable failure message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for CallbackError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Callback invoked on agent status transitions ("started", "stopping",
/// "stopped") and on upstream connection transitions ("connected",
/// "disconnected")
pub type StatusCallback = Arc<dyn Fn(&str) -> Result<(), CallbackError> + Send + Sync>;

/// Callback invoked with the parameters of a subscribed command
pub type CommandCallback = Arc<dyn Fn(Value) -> Result<(), CallbackError> + Send + Sync>;

/// Maps command names to wrapped callbacks and owns the status callbacks
pub(crate) struct CallbackRegistry {
    app_name: String,
    buffer: Arc<OutboundBuffer>,
    agent_status: Option<StatusCallback>,
    connection_status: Option<StatusCallback>,
    commands: Mutex<HashMap<String, CommandCallback>>,
}

impl CallbackRegistry {
    pub fn new(
        app_name: String,
        buffer: Arc<OutboundBuffer>,
        agent_status: Option<StatusCallback>,
        connection_status: Option<StatusCallback>,
    ) -> Self {
        Self {
            app_name,
            buffer,
            agent_status,
            connection_status,
            commands: Mutex::new(HashMap::new()),
        }
    }

    /// Register a callback for a command type. Last registration wins;
    /// registrations are never removed.
    pub fn subscribe(&self, cmd_type: &str, callback: CommandCallback) -> Result<(), SdkError> {
        if cmd_type.is_empty() {
            return Err(SdkError::InvalidArgument(
                "cmd_type must be a non-empty string".to_string(),
            ));
        }
        self.commands
            .lock()
            .expect("registry lock poisoned")
            .insert(cmd_type.to_string(), callback);
        Ok(())
    }

    /// Invoke the agent-status callback, if set
    pub async fn fire_agent_status(&self, status: &str) {
        if let Some(cb) = &self.agent_status {
            self.invoke_guarded(|| cb(status)).await;
        }
    }

    /// Invoke the connection-status callback, if set
    pub async fn fire_connection_status(&self, status: &str) {
        if let Some(cb) = &self.connection_status {
            self.invoke_guarded(|| cb(status)).await;
        }
    }

    /// Invoke the callback registered for `name` with the command
    /// parameters. Commands without a registration are silently ignored.
    pub async fn dispatch_command(&self, name: &str, args: Value) {
        let callback = {
            let commands = self.commands.lock().expect("registry lock poisoned");
            commands.get(name).cloned()
        };
        match callback {
            Some(cb) => self.invoke_guarded(|| cb(args)).await,
            None => tracing::debug!(command = name, "No subscription for command, ignoring"),
        }
    }

    /// Run a callback, converting failures and panics into an outbound
    /// error signal
    async fn invoke_guarded<F>(&self, f: F)
    where
        F: FnOnce() -> Result<(), CallbackError>,
    {
        let result = match catch_unwind(AssertUnwindSafe(f)) {
            Ok(result) => result,
            Err(payload) => Err(CallbackError::new("panic", panic_message(&*payload))),
        };

        if let Err(err) = result {
            tracing::warn!(kind = err.kind(), msg = err.message(), "Callback failed");
            match envelope::error_frame(&self.app_name, err.kind(), err.message()) {
                Ok(frame) => {
                    self.buffer.push(OutboundMessage::Signal(frame)).await;
                }
                Err(e) => tracing::error!("Failed to encode error signal: {}", e),
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "callback panicked".to_string()
    }
}
