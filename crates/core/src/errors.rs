use thiserror::Error;

use crate::flows::FlowTransitionError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum IntentError {
    #[error("unknown asset `{0}`")]
    UnknownAsset(String),
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("incomplete intent request: {0}")]
    IncompleteRequest(String),
    #[error("insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: String, available: String },
    #[error("no liquidity: the solver bus returned no quotes")]
    NoLiquidity,
    #[error("no viable quote option")]
    NoViableOption,
    #[error("signing failure: {0}")]
    SigningError(String),
    #[error("transport failure: {0}")]
    TransportError(String),
    #[error("remote call timed out: {0}")]
    Timeout(String),
    #[error("storage registration failed: {0}")]
    RegistrationError(String),
    #[error("settlement rejected: {0}")]
    SettlementRejected(String),
    #[error("serialization failure: {0}")]
    Serialization(String),
    #[error("operation cancelled before {0}")]
    Cancelled(String),
    #[error(transparent)]
    InvalidTransition(#[from] FlowTransitionError),
}

impl IntentError {
    /// Stable snake_case code for progress events, CLI outcomes and HTTP bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownAsset(_) => "unknown_asset",
            Self::InvalidAmount(_) => "invalid_amount",
            Self::IncompleteRequest(_) => "incomplete_request",
            Self::InsufficientBalance { .. } => "insufficient_balance",
            Self::NoLiquidity => "no_liquidity",
            Self::NoViableOption => "no_viable_option",
            Self::SigningError(_) => "signing_error",
            Self::TransportError(_) => "transport_error",
            Self::Timeout(_) => "timeout",
            Self::RegistrationError(_) => "registration_error",
            Self::SettlementRejected(_) => "settlement_rejected",
            Self::Serialization(_) => "serialization",
            Self::Cancelled(_) => "cancelled",
            Self::InvalidTransition(_) => "invalid_transition",
        }
    }

    /// Precondition failures abort before any remote side effect.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::UnknownAsset(_)
                | Self::InvalidAmount(_)
                | Self::IncompleteRequest(_)
                | Self::InsufficientBalance { .. }
        )
    }

    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<serde_json::Error> for IntentError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The settlement service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl From<IntentError> for InterfaceError {
    fn from(value: IntentError) -> Self {
        let message = value.to_string();
        let correlation_id = "unassigned".to_owned();
        match value {
            IntentError::UnknownAsset(_)
            | IntentError::InvalidAmount(_)
            | IntentError::IncompleteRequest(_)
            | IntentError::InsufficientBalance { .. }
            | IntentError::NoLiquidity
            | IntentError::NoViableOption
            | IntentError::Cancelled(_) => Self::BadRequest { message, correlation_id },
            IntentError::TransportError(_)
            | IntentError::Timeout(_)
            | IntentError::RegistrationError(_)
            | IntentError::SettlementRejected(_) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
            IntentError::SigningError(_)
            | IntentError::Serialization(_)
            | IntentError::InvalidTransition(_) => Self::Internal { message, correlation_id },
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{IntentError, InterfaceError};

    #[test]
    fn precondition_error_maps_to_bad_request() {
        let interface = IntentError::UnknownAsset("DOGE".to_owned()).into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest { ref correlation_id, .. } if correlation_id == "req-1"
        ));
        assert_eq!(
            interface.user_message(),
            "The request could not be processed. Check inputs and try again."
        );
    }

    #[test]
    fn timeout_maps_to_service_unavailable() {
        let interface =
            IntentError::Timeout("quote after 5s".to_owned()).into_interface("req-2");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(interface.correlation_id(), "req-2");
    }

    #[test]
    fn signing_error_maps_to_internal() {
        let interface =
            IntentError::SigningError("bad key".to_owned()).into_interface("req-3");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "An unexpected internal error occurred.");
    }

    #[test]
    fn kinds_are_stable_and_preconditions_are_flagged() {
        let insufficient = IntentError::InsufficientBalance {
            required: "2".to_owned(),
            available: "1".to_owned(),
        };
        assert_eq!(insufficient.kind(), "insufficient_balance");
        assert!(insufficient.is_precondition());

        assert_eq!(IntentError::NoLiquidity.kind(), "no_liquidity");
        assert!(!IntentError::NoLiquidity.is_precondition());
        assert!(!IntentError::TransportError("reset".to_owned()).is_precondition());
    }
}
