//! # voltsim-types
//!
//! Foundational OCPP 1.6-J data model shared by the voltsim crates:
//! connector statuses, measurands and sampled values, charging profiles,
//! the JSON-array wire envelope, and the OCPP error code taxonomy.

pub mod error;
pub mod measurand;
pub mod message;
pub mod v16;

pub use error::{CallErrorCode, OcppError, OcppResult};
pub use message::{Call, CallError, CallResult, Message};

pub use chrono::{DateTime, Utc};

/// Identification token presented by a driver (RFID tag, app token).
pub type IdToken = String;

/// OCPP message type identifier carried as the first wire-array element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Call = 2,
    CallResult = 3,
    CallError = 4,
}

impl TryFrom<u8> for MessageType {
    type Error = OcppError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            2 => Ok(MessageType::Call),
            3 => Ok(MessageType::CallResult),
            4 => Ok(MessageType::CallError),
            other => Err(OcppError::InvalidMessageType(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_from_wire_id() {
        assert_eq!(MessageType::try_from(2).unwrap(), MessageType::Call);
        assert_eq!(MessageType::try_from(3).unwrap(), MessageType::CallResult);
        assert_eq!(MessageType::try_from(4).unwrap(), MessageType::CallError);
        assert!(MessageType::try_from(0).is_err());
        assert!(MessageType::try_from(5).is_err());
    }
}
