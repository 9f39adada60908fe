//! Engine error type and its mapping onto the wire CALLERROR taxonomy.

use crate::features::FeatureProfile;
use thiserror::Error;
use voltsim_types::{CallErrorCode, OcppError};

/// Failures produced by the session engine.
#[derive(Error, Debug)]
pub enum StationError {
    /// The command needs a feature profile the station does not advertise.
    #[error("command {action} requires the {profile} feature profile")]
    FeatureDisabled { action: &'static str, profile: FeatureProfile },

    /// Action name not known to the dispatcher.
    #[error("action {0} is not implemented")]
    NotImplemented(String),

    /// `powerDivider` unset or not positive while computing power-derived
    /// measurands.
    #[error("power divider is unset or zero while handling {command}")]
    PowerDivider { command: &'static str },

    /// Connector index outside the station's arena.
    #[error("unknown connector {0}")]
    UnknownConnector(u32),

    /// Operation needs a live transaction and the connector has none.
    #[error("no active transaction on connector {connector_id}")]
    NoTransaction { connector_id: u32 },

    /// No connector carries the referenced transaction.
    #[error("no transaction with id {0}")]
    UnknownTransaction(i32),

    /// Payload could not be deserialized for the action.
    #[error("malformed payload for {action}: {detail}")]
    Payload { action: String, detail: String },

    /// Station template is unusable.
    #[error("template error: {0}")]
    Template(String),

    /// Protocol-level failure (transport, constraint, framing).
    #[error(transparent)]
    Protocol(#[from] OcppError),
}

impl StationError {
    /// CALLERROR code this failure surfaces as.
    pub fn call_error_code(&self) -> CallErrorCode {
        match self {
            StationError::FeatureDisabled { .. } => CallErrorCode::NotSupported,
            StationError::NotImplemented(_) => CallErrorCode::NotImplemented,
            StationError::PowerDivider { .. } => CallErrorCode::InternalError,
            StationError::UnknownConnector(_) => CallErrorCode::PropertyConstraintViolation,
            StationError::NoTransaction { .. } | StationError::UnknownTransaction(_) => {
                CallErrorCode::OccurrenceConstraintViolation
            }
            StationError::Payload { .. } => CallErrorCode::FormationViolation,
            StationError::Template(_) => CallErrorCode::InternalError,
            StationError::Protocol(OcppError::Constraint { .. }) => {
                CallErrorCode::PropertyConstraintViolation
            }
            StationError::Protocol(_) => CallErrorCode::InternalError,
        }
    }
}

/// Result alias for engine operations.
pub type StationResult<T> = Result<T, StationError>;
