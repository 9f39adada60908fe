//! OCPP error codes and the shared protocol error type.

use thiserror::Error;

/// Protocol-level errors shared across the voltsim crates.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OcppError {
    /// Wire message type id outside {2, 3, 4}.
    #[error("invalid message type id: {0}")]
    InvalidMessageType(u8),

    /// JSON (de)serialization failure.
    #[error("json error: {0}")]
    Json(String),

    /// Message violates the OCPP framing rules.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Payload field fails a constraint check.
    #[error("constraint violation on {field}: {detail}")]
    Constraint { field: String, detail: String },

    /// Outbound call was not answered within the timeout bound.
    #[error("connection timeout waiting for {action}")]
    Timeout { action: String },

    /// Connection was closed while calls were pending.
    #[error("connection closed")]
    ConnectionClosed,

    /// The remote side answered with a CALLERROR.
    #[error("call error {code}: {description}")]
    CallFailed { code: CallErrorCode, description: String },

    /// Anything that should never happen.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for OcppError {
    fn from(err: serde_json::Error) -> Self {
        OcppError::Json(err.to_string())
    }
}

/// Result alias for protocol operations.
pub type OcppResult<T> = Result<T, OcppError>;

/// CALLERROR codes defined by OCPP 1.6-J section 4.2.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum CallErrorCode {
    /// Action is not known by the receiver.
    NotImplemented,
    /// Action is recognized but not supported.
    NotSupported,
    /// Receiver failed to process an otherwise valid action.
    InternalError,
    /// Payload is incomplete.
    ProtocolError,
    /// A security issue prevented the receiver from completing the action.
    SecurityError,
    /// Payload is syntactically incorrect for the action.
    FormationViolation,
    /// A field carries an invalid value.
    PropertyConstraintViolation,
    /// A field violates occurrence constraints.
    OccurrenceConstraintViolation,
    /// A field violates data type constraints.
    TypeConstraintViolation,
    /// Any other error.
    GenericError,
}

impl CallErrorCode {
    /// Wire spelling of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            CallErrorCode::NotImplemented => "NotImplemented",
            CallErrorCode::NotSupported => "NotSupported",
            CallErrorCode::InternalError => "InternalError",
            CallErrorCode::ProtocolError => "ProtocolError",
            CallErrorCode::SecurityError => "SecurityError",
            CallErrorCode::FormationViolation => "FormationViolation",
            CallErrorCode::PropertyConstraintViolation => "PropertyConstraintViolation",
            CallErrorCode::OccurrenceConstraintViolation => "OccurrenceConstraintViolation",
            CallErrorCode::TypeConstraintViolation => "TypeConstraintViolation",
            CallErrorCode::GenericError => "GenericError",
        }
    }

    /// Parse the wire spelling; unknown codes map to `GenericError`.
    pub fn parse(code: &str) -> Self {
        match code {
            "NotImplemented" => CallErrorCode::NotImplemented,
            "NotSupported" => CallErrorCode::NotSupported,
            "InternalError" => CallErrorCode::InternalError,
            "ProtocolError" => CallErrorCode::ProtocolError,
            "SecurityError" => CallErrorCode::SecurityError,
            "FormationViolation" => CallErrorCode::FormationViolation,
            "PropertyConstraintViolation" => CallErrorCode::PropertyConstraintViolation,
            "OccurrenceConstraintViolation" => CallErrorCode::OccurrenceConstraintViolation,
            "TypeConstraintViolation" => CallErrorCode::TypeConstraintViolation,
            _ => CallErrorCode::GenericError,
        }
    }
}

impl std::fmt::Display for CallErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_error_code_round_trip() {
        for code in [
            CallErrorCode::NotImplemented,
            CallErrorCode::NotSupported,
            CallErrorCode::InternalError,
            CallErrorCode::ProtocolError,
            CallErrorCode::SecurityError,
            CallErrorCode::FormationViolation,
            CallErrorCode::PropertyConstraintViolation,
            CallErrorCode::OccurrenceConstraintViolation,
            CallErrorCode::TypeConstraintViolation,
            CallErrorCode::GenericError,
        ] {
            assert_eq!(CallErrorCode::parse(code.as_str()), code);
        }
    }

    #[test]
    fn unknown_code_maps_to_generic() {
        assert_eq!(CallErrorCode::parse("NoSuchCode"), CallErrorCode::GenericError);
    }

    #[test]
    fn error_display() {
        let err = OcppError::Timeout { action: "MeterValues".to_string() };
        assert_eq!(err.to_string(), "connection timeout waiting for MeterValues");

        let err = OcppError::Constraint {
            field: "connectorId".to_string(),
            detail: "unknown connector 9".to_string(),
        };
        assert!(err.to_string().contains("connectorId"));
    }

    #[test]
    fn json_error_conversion() {
        let json_err = serde_json::from_str::<u32>("not json").unwrap_err();
        assert!(matches!(OcppError::from(json_err), OcppError::Json(_)));
    }
}
