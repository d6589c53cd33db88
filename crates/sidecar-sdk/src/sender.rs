//! Sender task
//!
//! Drains the outbound buffer and writes framed messages through the live
//! socket. Delivery is at-least-once across reconnects: a message whose
//! write fails is retried verbatim once the link is re-established, and is
//! never reordered relative to other queued messages.

use std::sync::Arc;

use sidecar_protocol::envelope;

use crate::buffer::{Entry, OutboundBuffer, OutboundMessage};
use crate::state::SharedState;

pub(crate) async fn run(shared: Arc<SharedState>, buffer: Arc<OutboundBuffer>) {
    'consume: loop {
        let entry = tokio::select! {
            _ = shared.shutdown.cancelled() => break,
            entry = buffer.pop() => entry,
        };

        let msg = match entry {
            Entry::Shutdown => break,
            Entry::Message(msg) => msg,
        };

        let frame = match &msg {
            // Signal payloads are pre-encoded and already framed
            OutboundMessage::Signal(bytes) => bytes.clone(),
            OutboundMessage::Data { payload, channel } => {
                match envelope::data_frame(&shared.config.name, payload, channel.as_deref()) {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::error!("Failed to encode data frame, dropping message: {}", e);
                        continue;
                    }
                }
            }
        };

        // Retry the same frame until it is written or shutdown is requested
        loop {
            if !shared.wait_linked().await {
                break 'consume;
            }
            match shared.write_frame(&frame).await {
                Ok(()) => break,
                Err(e) => {
                    tracing::debug!("Write to agent failed: {}, waiting for relink", e);
                    shared.report_link_lost();
                }
            }
        }
    }
    tracing::debug!("Sender task exiting");
}
