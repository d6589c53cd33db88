//! Receiver and inbound dispatcher
//!
//! Reads the socket, decodes newline-delimited frames, and routes signal
//! frames (status/version) and data frames (commands) to the registered
//! handlers. End-of-stream or a read error means the agent closed the
//! connection: the loss is reported to the supervisor and the task parks
//! until the link is re-established.

use std::sync::Arc;

use futures::StreamExt;
use semver::Version;
use tokio_util::codec::FramedRead;

use sidecar_protocol::{FrameCodec, InboundFrame, Signal};

use crate::callbacks::CallbackRegistry;
use crate::state::SharedState;
use crate::supervisor;

pub(crate) async fn run(shared: Arc<SharedState>, registry: Arc<CallbackRegistry>) {
    loop {
        if !shared.wait_linked().await {
            break;
        }

        let taken = shared.reader.lock().expect("reader lock poisoned").take();
        let Some((reader, conn_token)) = taken else {
            // Raced with a teardown; report and wait for the next link
            shared.report_link_lost();
            continue;
        };

        let mut frames = FramedRead::new(reader, FrameCodec::new());
        loop {
            let item = tokio::select! {
                _ = shared.shutdown.cancelled() => {
                    tracing::debug!("Receiver task exiting");
                    return;
                }
                // Teardown elsewhere (e.g. a sender write failure) must
                // unpark this read even if the peer left its write side open
                _ = conn_token.cancelled() => {
                    tracing::debug!("Connection torn down, dropping stale reader");
                    break;
                }
                item = frames.next() => item,
            };

            match item {
                Some(Ok(frame)) => dispatch(&shared, &registry, frame).await,
                Some(Err(e)) => {
                    tracing::debug!("Read from agent failed: {}", e);
                    break;
                }
                None => {
                    tracing::debug!("Agent closed the connection");
                    break;
                }
            }
        }

        shared.report_link_lost();
    }
    tracing::debug!("Receiver task exiting");
}

async fn dispatch(shared: &SharedState, registry: &CallbackRegistry, frame: InboundFrame) {
    match frame {
        InboundFrame::Signal(Signal::AgentStatus(status)) => {
            registry.fire_agent_status(&status).await;
        }
        InboundFrame::Signal(Signal::ConnectionStatus(status)) => {
            registry.fire_connection_status(&status).await;
        }
        InboundFrame::Signal(Signal::Handshake { version }) => {
            match Version::parse(&version) {
                Ok(parsed) => shared.set_agent_version(parsed),
                Err(e) => {
                    tracing::warn!(version = %version, "Agent announced unparseable version: {}", e);
                }
            }
            supervisor::complete_handshake(shared, registry, false).await;
        }
        InboundFrame::Signal(Signal::Unknown) => {
            // Unrecognized signal keys are ignored for forward compatibility
        }
        InboundFrame::Command { name, args } => {
            registry.dispatch_command(&name, args).await;
        }
    }
}
