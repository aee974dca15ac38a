//! Rule construction and evaluation errors.

use crate::kind::RuleKind;

/// Errors raised by rule configuration or evaluation.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    /// The rule's parameters are unusable. Surfaced to whoever stores or updates the rule.
    #[error("invalid {kind} rule: {reason}")]
    InvalidConfig { kind: RuleKind, reason: String },

    /// A script rule names a plugin that is not registered.
    #[error("unknown script '{0}'")]
    UnknownScript(String),

    /// The rule failed while handling a message.
    #[error("rule evaluation failed: {0}")]
    Evaluation(String),
}

impl RuleError {
    pub(crate) fn invalid(kind: RuleKind, reason: impl Into<String>) -> Self {
        RuleError::InvalidConfig {
            kind,
            reason: reason.into(),
        }
    }
}

/// Result alias for rule operations.
pub type Result<T> = std::result::Result<T, RuleError>;
