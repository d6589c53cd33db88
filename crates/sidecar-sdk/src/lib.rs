//! sidecar-sdk: Embeddable client for the sidecar agent channel
//!
//! The SDK lets an application exchange structured messages with a
//! co-located agent process over a local stream socket, tolerating the agent
//! being absent, slow, or restarting.
//!
//! After constructing an [`AgentClient`] it is possible to:
//!
//! - **Send** JSON payloads to the agent; while the agent is unreachable
//!   messages are held in a bounded buffer with a drop-oldest policy.
//! - **Subscribe** callbacks that fire when the agent forwards a command of
//!   a particular type to the application.
//! - **Call** named remote procedures on the agent synchronously, guarded by
//!   the negotiated agent version.
//!
//! Connection supervision runs in the background: the SDK reconnects forever
//! on a short fixed backoff, re-announces itself after every reconnect, and
//! reports lifecycle transitions through optional status callbacks.

pub mod buffer;
pub mod callbacks;
pub mod capability;
pub mod client;
pub mod config;
pub mod error;
pub mod receiver;
pub mod sender;
pub mod state;
pub mod supervisor;

pub use callbacks::{CallbackError, CommandCallback, StatusCallback};
pub use client::AgentClient;
pub use config::ClientConfig;
pub use error::SdkError;
pub use state::LinkState;

/// SDK version announced to the agent in the hello frame
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");
