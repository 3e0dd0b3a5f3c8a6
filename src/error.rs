//! Unified error handling for backchat.
//!
//! This module provides the centralized error taxonomy for the client
//! runtime. Registration-time contract violations fail fast at the call
//! site; transport failures are transient and retried by the receive loop;
//! listener failures never surface here at all - they are re-emitted as
//! `InternalException` events by the dispatcher.

use crate::event::EventKind;
use thiserror::Error;

/// Errors that can occur in the client runtime.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The argument is not usable for the requested operation, e.g.
    /// registering a listener against a reserved event kind that is never
    /// dispatched.
    #[error("invalid argument: {0}")]
    ArgumentInvalid(String),

    /// The callback's shape does not match the declared contract for the
    /// event kind. Carries the human-readable expected signature.
    #[error("listener signature mismatch for {kind:?}: expected {expected}")]
    SignatureMismatch {
        kind: EventKind,
        expected: &'static str,
    },

    /// The exact callback instance is already registered for this kind.
    #[error("callback already registered for {0:?}")]
    DuplicateRegistration(EventKind),

    /// No such callback is registered for this kind.
    #[error("no callback registered for {0:?}")]
    NotFound(EventKind),

    #[error("transport already connected")]
    AlreadyConnected,

    #[error("transport not connected")]
    NotConnected,

    /// The component was permanently disposed.
    #[error("transport disposed")]
    Disposed,

    /// Submitted to (or still pending on) a disposed action queue.
    #[error("action queue disposed")]
    QueueDisposed,

    /// A websocket-level failure. Transient: the receive loop retries these
    /// with a fixed backoff and no ceiling. Surfaced directly only from the
    /// initial `connect` handshake.
    #[error("transport failure: {0}")]
    Transport(String),

    /// A branch that is unreachable by construction. Not a designed error
    /// path.
    #[error("internal consistency violation: {0}")]
    InternalConsistency(&'static str),
}

impl ClientError {
    /// Get a static error code string for log labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ArgumentInvalid(_) => "argument_invalid",
            Self::SignatureMismatch { .. } => "signature_mismatch",
            Self::DuplicateRegistration(_) => "duplicate_registration",
            Self::NotFound(_) => "not_found",
            Self::AlreadyConnected => "already_connected",
            Self::NotConnected => "not_connected",
            Self::Disposed => "disposed",
            Self::QueueDisposed => "queue_disposed",
            Self::Transport(_) => "transport_failure",
            Self::InternalConsistency(_) => "internal_consistency",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes() {
        assert_eq!(ClientError::AlreadyConnected.error_code(), "already_connected");
        assert_eq!(ClientError::QueueDisposed.error_code(), "queue_disposed");
        assert_eq!(
            ClientError::InternalConsistency("x").error_code(),
            "internal_consistency"
        );
    }

    #[test]
    fn signature_mismatch_names_the_expected_shape() {
        let err = ClientError::SignatureMismatch {
            kind: EventKind::MessageStarToggled,
            expected: "MessageStarToggled(Message, User, u32, u32)",
        };
        let rendered = err.to_string();
        assert!(rendered.contains("MessageStarToggled(Message, User, u32, u32)"));
    }
}
