//! OCPP-J wire envelope.
//!
//! Every message travels as a JSON array:
//!
//! ```text
//! CALL:       [2, "<unique id>", "<action>", {payload}]
//! CALLRESULT: [3, "<unique id>", {payload}]
//! CALLERROR:  [4, "<unique id>", "<code>", "<description>", {details}]
//! ```

use crate::error::{CallErrorCode, OcppError, OcppResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A request sent by either side.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub unique_id: String,
    pub action: String,
    pub payload: Value,
}

impl Call {
    /// Build a call with a fresh v4 unique id.
    pub fn new<T: Serialize>(action: impl Into<String>, payload: T) -> OcppResult<Self> {
        Ok(Self {
            unique_id: Uuid::new_v4().to_string(),
            action: action.into(),
            payload: serde_json::to_value(payload)?,
        })
    }

    /// Deserialize the payload into a typed struct.
    pub fn payload_as<T: for<'de> Deserialize<'de>>(&self) -> OcppResult<T> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

/// A successful response, echoing the call's unique id.
#[derive(Debug, Clone, PartialEq)]
pub struct CallResult {
    pub unique_id: String,
    pub payload: Value,
}

impl CallResult {
    pub fn new<T: Serialize>(unique_id: impl Into<String>, payload: T) -> OcppResult<Self> {
        Ok(Self {
            unique_id: unique_id.into(),
            payload: serde_json::to_value(payload)?,
        })
    }

    pub fn payload_as<T: for<'de> Deserialize<'de>>(&self) -> OcppResult<T> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

/// A failed response, echoing the call's unique id.
#[derive(Debug, Clone, PartialEq)]
pub struct CallError {
    pub unique_id: String,
    pub code: CallErrorCode,
    pub description: String,
    pub details: Value,
}

impl CallError {
    pub fn new(
        unique_id: impl Into<String>,
        code: CallErrorCode,
        description: impl Into<String>,
    ) -> Self {
        Self {
            unique_id: unique_id.into(),
            code,
            description: description.into(),
            details: Value::Object(Default::default()),
        }
    }
}

/// Any OCPP-J message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Call(Call),
    CallResult(CallResult),
    CallError(CallError),
}

impl Message {
    pub fn unique_id(&self) -> &str {
        match self {
            Message::Call(m) => &m.unique_id,
            Message::CallResult(m) => &m.unique_id,
            Message::CallError(m) => &m.unique_id,
        }
    }

    /// Serialize to the wire array form.
    pub fn to_wire(&self) -> OcppResult<String> {
        let frame: Frame = self.clone().into();
        Ok(serde_json::to_string(&frame)?)
    }

    /// Parse a wire array.
    pub fn from_wire(raw: &str) -> OcppResult<Self> {
        let frame: Frame = serde_json::from_str(raw).map_err(|e| OcppError::ProtocolViolation(
            format!("unparseable OCPP-J frame: {e}"),
        ))?;
        frame.try_into()
    }
}

/// Raw array framing. Untagged tuple variants serialize as JSON arrays; the
/// variant order matters for deserialization (5-, 4-, then 3-element frames).
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum Frame {
    CallError(u8, String, String, String, Value),
    Call(u8, String, String, Value),
    CallResult(u8, String, Value),
}

impl From<Message> for Frame {
    fn from(message: Message) -> Self {
        match message {
            Message::Call(m) => Frame::Call(2, m.unique_id, m.action, m.payload),
            Message::CallResult(m) => Frame::CallResult(3, m.unique_id, m.payload),
            Message::CallError(m) => Frame::CallError(
                4,
                m.unique_id,
                m.code.as_str().to_string(),
                m.description,
                m.details,
            ),
        }
    }
}

impl TryFrom<Frame> for Message {
    type Error = OcppError;

    fn try_from(frame: Frame) -> OcppResult<Self> {
        match frame {
            Frame::Call(tag, unique_id, action, payload) => {
                if tag != 2 {
                    return Err(OcppError::InvalidMessageType(tag));
                }
                Ok(Message::Call(Call { unique_id, action, payload }))
            }
            Frame::CallResult(tag, unique_id, payload) => {
                if tag != 3 {
                    return Err(OcppError::InvalidMessageType(tag));
                }
                Ok(Message::CallResult(CallResult { unique_id, payload }))
            }
            Frame::CallError(tag, unique_id, code, description, details) => {
                if tag != 4 {
                    return Err(OcppError::InvalidMessageType(tag));
                }
                Ok(Message::CallError(CallError {
                    unique_id,
                    code: CallErrorCode::parse(&code),
                    description,
                    details,
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn call_serializes_as_array() {
        let call = Call {
            unique_id: "19223201".to_string(),
            action: "Heartbeat".to_string(),
            payload: json!({}),
        };
        let wire = Message::Call(call).to_wire().unwrap();
        assert_eq!(wire, r#"[2,"19223201","Heartbeat",{}]"#);
    }

    #[test]
    fn call_result_round_trip() {
        let wire = r#"[3,"19223201",{"currentTime":"2025-06-01T08:00:00Z"}]"#;
        let message = Message::from_wire(wire).unwrap();
        match &message {
            Message::CallResult(result) => assert_eq!(result.unique_id, "19223201"),
            other => panic!("expected CallResult, got {other:?}"),
        }
        assert_eq!(Message::from_wire(&message.to_wire().unwrap()).unwrap(), message);
    }

    #[test]
    fn call_error_round_trip() {
        let error = CallError::new("abc", CallErrorCode::NotSupported, "profile disabled");
        let wire = Message::CallError(error.clone()).to_wire().unwrap();
        assert!(wire.starts_with(r#"[4,"abc","NotSupported""#));

        match Message::from_wire(&wire).unwrap() {
            Message::CallError(back) => {
                assert_eq!(back.code, CallErrorCode::NotSupported);
                assert_eq!(back.description, "profile disabled");
            }
            other => panic!("expected CallError, got {other:?}"),
        }
    }

    #[test]
    fn inbound_call_parses() {
        let wire = r#"[2,"42","RemoteStopTransaction",{"transactionId":77}]"#;
        match Message::from_wire(wire).unwrap() {
            Message::Call(call) => {
                assert_eq!(call.action, "RemoteStopTransaction");
                assert_eq!(call.payload["transactionId"], 77);
            }
            other => panic!("expected Call, got {other:?}"),
        }
    }

    #[test]
    fn wrong_tag_is_rejected() {
        assert!(Message::from_wire(r#"[7,"x","Action",{}]"#).is_err());
        assert!(Message::from_wire(r#"{"not":"an array"}"#).is_err());
    }

    #[test]
    fn fresh_unique_ids_differ() {
        let a = Call::new("Heartbeat", json!({})).unwrap();
        let b = Call::new("Heartbeat", json!({})).unwrap();
        assert_ne!(a.unique_id, b.unique_id);
    }
}
