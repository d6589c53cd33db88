//! Outbound frame envelopes
//!
//! Builders for the frames the SDK writes to the agent. Each returns the
//! complete wire representation: compact JSON terminated by `\n`, ready to
//! be written through the socket as-is.

use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;

use crate::error::ProtocolError;

/// Application identity carried by every outbound frame
#[derive(Debug, Serialize)]
struct SdkClientTag<'a> {
    name: &'a str,
}

#[derive(Debug, Serialize)]
struct HelloBody<'a> {
    name: &'a str,
    status: &'a str,
    version: &'a str,
}

#[derive(Debug, Serialize)]
struct HelloFrame<'a> {
    signal: HelloSignal<'a>,
}

#[derive(Debug, Serialize)]
struct HelloSignal<'a> {
    sdkclient: HelloBody<'a>,
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    name: &'a str,
    error: ErrorDetail<'a>,
}

#[derive(Debug, Serialize)]
struct ErrorDetail<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    msg: &'a str,
}

#[derive(Debug, Serialize)]
struct ErrorFrame<'a> {
    signal: ErrorSignal<'a>,
}

#[derive(Debug, Serialize)]
struct ErrorSignal<'a> {
    sdkclient: ErrorBody<'a>,
}

#[derive(Debug, Serialize)]
struct CallBody<'a> {
    name: &'a str,
    call: Value,
}

#[derive(Debug, Serialize)]
struct CallFrame<'a> {
    signal: CallSignal<'a>,
}

#[derive(Debug, Serialize)]
struct CallSignal<'a> {
    sdkclient: CallBody<'a>,
}

#[derive(Debug, Serialize)]
struct DataEnvelope<'a> {
    sdkclient: SdkClientTag<'a>,
    payload: &'a Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    channel: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct DataFrame<'a> {
    data: DataEnvelope<'a>,
}

fn to_line<T: Serialize>(frame: &T) -> Result<Bytes, ProtocolError> {
    let mut buf = serde_json::to_vec(frame)?;
    buf.push(b'\n');
    Ok(Bytes::from(buf))
}

/// Build the hello signal announcing the application to the agent.
///
/// Sent once per established connection, before any buffered traffic.
pub fn hello_frame(name: &str, sdk_version: &str) -> Result<Bytes, ProtocolError> {
    to_line(&HelloFrame {
        signal: HelloSignal {
            sdkclient: HelloBody {
                name,
                status: "connected",
                version: sdk_version,
            },
        },
    })
}

/// Build an error signal reporting a failed user callback to the agent.
pub fn error_frame(name: &str, kind: &str, msg: &str) -> Result<Bytes, ProtocolError> {
    to_line(&ErrorFrame {
        signal: ErrorSignal {
            sdkclient: ErrorBody {
                name,
                error: ErrorDetail { kind, msg },
            },
        },
    })
}

/// Build a remote-call signal invoking a named command on the agent.
pub fn call_frame(name: &str, cmd: &str, args: Value) -> Result<Bytes, ProtocolError> {
    let mut call = serde_json::Map::new();
    call.insert(cmd.to_string(), args);
    to_line(&CallFrame {
        signal: CallSignal {
            sdkclient: CallBody {
                name,
                call: Value::Object(call),
            },
        },
    })
}

/// Build a data frame carrying an application payload, with an optional
/// routing channel.
pub fn data_frame(
    name: &str,
    payload: &Value,
    channel: Option<&str>,
) -> Result<Bytes, ProtocolError> {
    to_line(&DataFrame {
        data: DataEnvelope {
            sdkclient: SdkClientTag { name },
            payload,
            channel,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hello_frame_shape() {
        let frame = hello_frame("testapp", "0.1.0").unwrap();
        assert_eq!(
            frame.as_ref(),
            br#"{"signal":{"sdkclient":{"name":"testapp","status":"connected","version":"0.1.0"}}}
"#
        );
    }

    #[test]
    fn test_data_frame_without_channel() {
        let frame = data_frame("testapp", &json!({"test_metric": "test data"}), None).unwrap();
        assert_eq!(
            frame.as_ref(),
            br#"{"data":{"sdkclient":{"name":"testapp"},"payload":{"test_metric":"test data"}}}
"#
        );
    }

    #[test]
    fn test_data_frame_with_channel() {
        let frame = data_frame(
            "testapp",
            &json!({"test_metric": "test data"}),
            Some("test"),
        )
        .unwrap();
        assert_eq!(
            frame.as_ref(),
            br#"{"data":{"sdkclient":{"name":"testapp"},"payload":{"test_metric":"test data"},"channel":"test"}}
"#
        );
    }

    #[test]
    fn test_error_frame_shape() {
        let frame = error_frame("testapp", "ValueError", "boom").unwrap();
        let value: Value = serde_json::from_slice(&frame).unwrap();
        assert_eq!(
            value,
            json!({"signal": {"sdkclient": {"name": "testapp", "error": {"type": "ValueError", "msg": "boom"}}}})
        );
        assert_eq!(frame.last(), Some(&b'\n'));
    }

    #[test]
    fn test_call_frame_shape() {
        let frame = call_frame("testapp", "reboot", json!({"delay": 5})).unwrap();
        let value: Value = serde_json::from_slice(&frame).unwrap();
        assert_eq!(
            value,
            json!({"signal": {"sdkclient": {"name": "testapp", "call": {"reboot": {"delay": 5}}}}})
        );
    }
}
