//! Inbound frame model
//!
//! Every frame is a JSON object carrying exactly one of two top-level keys:
//!
//! - `"signal"`: SDK/agent control information (status, version, error)
//! - `"data"`: a command bound for the application, shaped as an object
//!   with exactly one key (the command name)
//!
//! Anything else is treated as malformed and dropped by the caller. Unknown
//! signal keys decode to [`Signal::Unknown`] so that newer agents remain
//! interoperable with older SDKs.

use serde_json::Value;

/// A decoded frame received from the agent
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Control information from the agent
    Signal(Signal),

    /// A command for the application, dispatched by subscription name
    Command {
        /// Command name (the single top-level key of the data object)
        name: String,
        /// Command parameters
        args: Value,
    },
}

/// Control signals recognized by the SDK
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    /// Agent lifecycle status change (e.g. "stopping")
    AgentStatus(String),

    /// Upstream connectivity status change ("connected" / "disconnected")
    ConnectionStatus(String),

    /// Version announcement sent by agents >= 1.8.0 right after connect
    Handshake {
        /// Agent protocol version, e.g. "1.8.0"
        version: String,
    },

    /// Any other signal key; ignored for forward compatibility
    Unknown,
}

impl InboundFrame {
    /// Parse one newline-delimited frame body.
    ///
    /// Returns `None` for anything that is not a well-formed frame: invalid
    /// JSON, non-object payloads, unexpected top-level keys, or data objects
    /// that do not have exactly one key. Compatibility across agent versions
    /// takes priority over strictness, so malformed input is dropped rather
    /// than reported.
    pub fn parse(line: &[u8]) -> Option<Self> {
        let value: Value = serde_json::from_slice(line).ok()?;
        let obj = value.as_object()?;

        if let Some(signal) = obj.get("signal") {
            return Some(InboundFrame::Signal(parse_signal(signal)?));
        }

        if let Some(data) = obj.get("data") {
            let cmd = data.as_object()?;
            if cmd.len() != 1 {
                return None;
            }
            let (name, args) = cmd.iter().next()?;
            return Some(InboundFrame::Command {
                name: name.clone(),
                args: args.clone(),
            });
        }

        None
    }
}

fn parse_signal(signal: &Value) -> Option<Signal> {
    let obj = signal.as_object()?;

    if let Some(status) = obj.get("agentstatus") {
        return Some(Signal::AgentStatus(status.as_str()?.to_string()));
    }

    if let Some(status) = obj.get("connectionstatus") {
        return Some(Signal::ConnectionStatus(status.as_str()?.to_string()));
    }

    if let Some(init) = obj.get("sdkinit") {
        let version = init.get("version")?.as_str()?.to_string();
        return Some(Signal::Handshake { version });
    }

    Some(Signal::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_agent_status() {
        let frame = InboundFrame::parse(br#"{"signal": {"agentstatus": "stopping"}}"#).unwrap();
        assert_eq!(
            frame,
            InboundFrame::Signal(Signal::AgentStatus("stopping".to_string()))
        );
    }

    #[test]
    fn test_parse_connection_status() {
        let frame =
            InboundFrame::parse(br#"{"signal": {"connectionstatus": "disconnected"}}"#).unwrap();
        assert_eq!(
            frame,
            InboundFrame::Signal(Signal::ConnectionStatus("disconnected".to_string()))
        );
    }

    #[test]
    fn test_parse_handshake() {
        let frame = InboundFrame::parse(br#"{"signal": {"sdkinit": {"version": "1.8.0"}}}"#)
            .unwrap();
        assert_eq!(
            frame,
            InboundFrame::Signal(Signal::Handshake {
                version: "1.8.0".to_string()
            })
        );
    }

    #[test]
    fn test_unknown_signal_is_preserved_as_unknown() {
        let frame = InboundFrame::parse(br#"{"signal": {"somethingnew": 42}}"#).unwrap();
        assert_eq!(frame, InboundFrame::Signal(Signal::Unknown));
    }

    #[test]
    fn test_parse_command() {
        let frame = InboundFrame::parse(br#"{"data": {"echo": {"content": "hi"}}}"#).unwrap();
        assert_eq!(
            frame,
            InboundFrame::Command {
                name: "echo".to_string(),
                args: json!({"content": "hi"}),
            }
        );
    }

    #[test]
    fn test_multi_key_command_is_malformed() {
        assert!(InboundFrame::parse(br#"{"data": {"a": 1, "b": 2}}"#).is_none());
        assert!(InboundFrame::parse(br#"{"data": {}}"#).is_none());
    }

    #[test]
    fn test_invalid_json_is_dropped() {
        assert!(InboundFrame::parse(b"not json").is_none());
        assert!(InboundFrame::parse(b"[1, 2, 3]").is_none());
        assert!(InboundFrame::parse(br#"{"neither": {}}"#).is_none());
    }
}
