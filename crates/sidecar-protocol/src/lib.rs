//! sidecar-protocol: Wire protocol for the sidecar agent channel
//!
//! This crate defines the newline-delimited JSON protocol spoken between an
//! application embedding the SDK and the co-located agent process over a
//! local stream socket.

pub mod codec;
pub mod envelope;
pub mod error;
pub mod frame;

pub use codec::FrameCodec;
pub use envelope::{call_frame, data_frame, error_frame, hello_frame};
pub use error::ProtocolError;
pub use frame::{InboundFrame, Signal};
