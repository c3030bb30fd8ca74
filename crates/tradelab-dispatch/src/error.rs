//! Error types for event dispatch.
//!
//! [`DispatchError`] is what [`crate::Dispatcher::dispatch`] returns. Version
//! conflicts never appear here directly: the retry loop absorbs them and only
//! reports [`DispatchError::RetriesExhausted`] once its budget is spent.

use tradelab_market::DomainError;
use tradelab_store::StoreError;
use tradelab_types::{ExchangeFormat, FieldError, SessionFormat};

/// Errors returned by the dispatcher and its handlers.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Neither the message nor the attachments carried a required id.
    #[error("{event_type:?} event carries no {field}")]
    MissingIdentifier {
        /// Name of the missing field.
        field: &'static str,
        /// Event type of the envelope.
        event_type: String,
    },

    /// The entity named by the envelope has no record in the store.
    #[error("no record for {key}")]
    RecordNotFound {
        /// The store key that was looked up.
        key: String,
    },

    /// No trader variant is registered for the configured format pair.
    #[error("no trader variant for session format {session_format} and exchange format {exchange_format}")]
    UnknownTraderVariant {
        /// The configured session format.
        session_format: SessionFormat,
        /// The configured exchange format.
        exchange_format: ExchangeFormat,
    },

    /// The category tag does not name a handler.
    #[error("unknown event category {0:?}")]
    UnknownEventCategory(String),

    /// The stored (or requested) role is not offered by the trader variant.
    #[error("role {role:?} is not available to {variant} traders")]
    UnknownRole {
        /// Name of the trader variant.
        variant: &'static str,
        /// The rejected role name.
        role: String,
    },

    /// An identifier or coerced field had the wrong type.
    #[error("invalid field: {0}")]
    InvalidField(#[from] FieldError),

    /// The entity rejected the event.
    #[error("domain error: {0}")]
    Domain(DomainError),

    /// The store backend failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A stored payload could not be decoded into its entity.
    #[error("corrupt record {key}: {reason}")]
    CorruptRecord {
        /// The store key of the record.
        key: String,
        /// What failed to decode.
        reason: String,
    },

    /// An entity snapshot could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Every attempt lost the compare-and-swap race.
    #[error("gave up on {key} after {attempts} conflicting attempts")]
    RetriesExhausted {
        /// The contended store key.
        key: String,
        /// Number of attempts made.
        attempts: u32,
    },
}

impl From<DomainError> for DispatchError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::UnknownTraderVariant {
                session_format,
                exchange_format,
            } => Self::UnknownTraderVariant {
                session_format,
                exchange_format,
            },
            DomainError::UnknownRole { variant, role } => Self::UnknownRole { variant, role },
            other => Self::Domain(other),
        }
    }
}

impl DispatchError {
    /// Map a field lookup failure for an identifier: an absent field is a
    /// missing identifier, a malformed one an invalid field.
    pub(crate) fn identifier(field: &'static str, event_type: &str, err: FieldError) -> Self {
        match err {
            FieldError::Missing(_) => Self::MissingIdentifier {
                field,
                event_type: event_type.to_owned(),
            },
            invalid @ FieldError::Invalid { .. } => Self::InvalidField(invalid),
        }
    }

    pub(crate) fn missing(field: &'static str, event_type: &str) -> Self {
        Self::MissingIdentifier {
            field,
            event_type: event_type.to_owned(),
        }
    }
}
