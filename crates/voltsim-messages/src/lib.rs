//! # voltsim-messages
//!
//! OCPP 1.6-J action payloads for everything the station engine receives
//! from or emits to the CSMS, plus payload constraint validation.
//!
//! Each payload type implements [`OcppAction`], binding the wire action name
//! to its response type so call sites cannot pair a request with the wrong
//! response.

pub mod v16;
pub mod validation;

use serde::{de::DeserializeOwned, Serialize};
use voltsim_types::{Call, CallResult, OcppResult};

/// A typed OCPP action payload.
pub trait OcppAction: Serialize + DeserializeOwned + Send + Sync {
    /// Action name as it appears in the CALL frame.
    const ACTION_NAME: &'static str;
    /// Payload type of the matching CALLRESULT.
    type Response: OcppResponse;

    /// Check payload field constraints beyond what serde enforces.
    fn validate(&self) -> OcppResult<()> {
        Ok(())
    }
}

/// Marker for CALLRESULT payloads.
pub trait OcppResponse: Serialize + DeserializeOwned + Send + Sync {}

/// Wrap a typed request into a CALL frame with a fresh unique id.
pub fn to_call<T: OcppAction>(request: &T) -> OcppResult<Call> {
    Call::new(T::ACTION_NAME, request)
}

/// Extract the typed response from a CALLRESULT frame.
pub fn from_call_result<T: OcppAction>(result: &CallResult) -> OcppResult<T::Response> {
    result.payload_as()
}
