//! Core error types.

use crate::blocker::TransitionBlockerList;
use thiserror::Error;

/// Errors from the workflow engine.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid definition: {reason}")]
    InvalidDefinition { reason: String },

    #[error("{reason}")]
    Logic { reason: String },

    #[error("transition '{transition}' is not defined for workflow '{workflow}' (subject '{subject}')")]
    UndefinedTransition {
        subject: String,
        transition: String,
        workflow: String,
    },

    #[error("transition '{transition}' is not enabled for workflow '{workflow}' (subject '{subject}'): {}", describe_blockers(.blockers))]
    NotEnabledTransition {
        subject: String,
        transition: String,
        workflow: String,
        blockers: TransitionBlockerList,
    },

    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    #[error("invalid channel: {channel}")]
    InvalidChannel { channel: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    pub(crate) fn invalid_definition(reason: impl Into<String>) -> Self {
        CoreError::InvalidDefinition {
            reason: reason.into(),
        }
    }

    pub(crate) fn logic(reason: impl Into<String>) -> Self {
        CoreError::Logic {
            reason: reason.into(),
        }
    }

    /// Returns the blockers carried by a `NotEnabledTransition` error.
    pub fn blockers(&self) -> Option<&TransitionBlockerList> {
        match self {
            CoreError::NotEnabledTransition { blockers, .. } => Some(blockers),
            _ => None,
        }
    }

    /// Returns a stable error code for programmatic matching.
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::InvalidDefinition { .. } => "INVALID_DEFINITION",
            CoreError::Logic { .. } => "LOGIC_ERROR",
            CoreError::UndefinedTransition { .. } => "UNDEFINED_TRANSITION",
            CoreError::NotEnabledTransition { .. } => "TRANSITION_NOT_ENABLED",
            CoreError::InvalidArgument { .. } => "INVALID_ARGUMENT",
            CoreError::InvalidChannel { .. } => "INVALID_CHANNEL",
            CoreError::Json(_) => "BAD_REQUEST",
            CoreError::Yaml(_) => "BAD_REQUEST",
            CoreError::Io(_) => "IO_ERROR",
        }
    }
}

fn describe_blockers(blockers: &TransitionBlockerList) -> String {
    if blockers.is_empty() {
        return "no blockers reported".to_string();
    }
    blockers
        .iter()
        .map(|b| b.message())
        .collect::<Vec<_>>()
        .join("; ")
}
