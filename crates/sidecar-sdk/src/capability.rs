//! Capability gate for version-dependent operations
//!
//! Remote calls are only supported by agents that announce their protocol
//! version (>= 1.8.0). The gate fails fast: it distinguishes an agent that
//! never announced a version from one that announced an insufficient one,
//! and it never blocks or buffers when the link is down.

use semver::Version;
use serde_json::Value;

use sidecar_protocol::envelope;

use crate::error::SdkError;
use crate::state::{LinkState, SharedState};

/// Minimum agent version supporting remote calls (the first version that
/// announces itself via the handshake signal)
pub(crate) fn min_call_agent_version() -> Version {
    Version::new(1, 8, 0)
}

/// Check the preconditions for a synchronous remote call
pub(crate) fn check_remote_call(
    shared: &SharedState,
    required: &Version,
) -> Result<(), SdkError> {
    match shared.agent_version() {
        None => Err(SdkError::UnknownAgentVersion {
            required: required.clone(),
        }),
        Some(current) if current < *required => Err(SdkError::AgentVersionTooLow {
            required: required.clone(),
            current,
        }),
        Some(_) => {
            if shared.link_state() != LinkState::Linked {
                return Err(SdkError::NotConnected);
            }
            Ok(())
        }
    }
}

/// Invoke a named remote procedure on the agent.
///
/// Bypasses the outbound buffer: the frame is written synchronously through
/// the shared write lock, so the call either reaches the live socket now or
/// fails.
pub(crate) async fn call_remote(
    shared: &SharedState,
    cmd: &str,
    args: Value,
) -> Result<(), SdkError> {
    check_remote_call(shared, &min_call_agent_version())?;

    let frame = envelope::call_frame(&shared.config.name, cmd, args)?;
    match shared.write_frame(&frame).await {
        Ok(()) => Ok(()),
        Err(e) => {
            tracing::debug!("Remote call write failed: {}", e);
            shared.report_link_lost();
            Err(SdkError::NotConnected)
        }
    }
}
