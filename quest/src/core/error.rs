//! Failure kinds carried through `anyhow` chains.
//!
//! Components attach a [`Failure`] to the errors they return so the engine
//! can branch on the kind via `err.downcast_ref::<Failure>()` without every
//! call site growing its own error enum.

use std::fmt;

/// Classification of component failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// A required credential or collaborator setting is absent.
    ConfigurationMissing,
    /// The model provider did not answer within the configured timeout.
    UpstreamTimeout,
    /// The model provider answered with a non-retryable error.
    UpstreamError,
    /// The sandbox runner was unreachable or returned a malformed body.
    RunnerError,
    /// An optional external tool is not installed (informational).
    ToolUnavailable,
    /// Source or test text could not be parsed.
    ParseFailure,
    /// A payload failed runtime schema validation.
    ValidationFailure,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::ConfigurationMissing => "configuration-missing",
            FailureKind::UpstreamTimeout => "upstream-timeout",
            FailureKind::UpstreamError => "upstream-error",
            FailureKind::RunnerError => "runner-error",
            FailureKind::ToolUnavailable => "tool-unavailable",
            FailureKind::ParseFailure => "parse-failure",
            FailureKind::ValidationFailure => "validation-failure",
        }
    }
}

/// Typed error payload for `anyhow` chains.
#[derive(Debug, Clone)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Kind of the first `Failure` in an `anyhow` chain, if any.
    pub fn kind_of(err: &anyhow::Error) -> Option<FailureKind> {
        err.chain()
            .find_map(|cause| cause.downcast_ref::<Failure>())
            .map(|failure| failure.kind)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

impl std::error::Error for Failure {}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn kind_survives_anyhow_context_wrapping() {
        let err: anyhow::Error = Failure::new(FailureKind::UpstreamTimeout, "60s elapsed").into();
        let wrapped = Err::<(), _>(err)
            .context("complete draft prompt")
            .unwrap_err();

        assert_eq!(Failure::kind_of(&wrapped), Some(FailureKind::UpstreamTimeout));
    }

    #[test]
    fn kind_of_is_none_for_untyped_errors() {
        let err = anyhow::anyhow!("plain error");
        assert_eq!(Failure::kind_of(&err), None);
    }
}
