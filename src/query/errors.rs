#![forbid(unsafe_code)]

use std::fmt;

use thiserror::Error;

/// Structured errors raised while lowering a graph-pattern query to algebra.
///
/// Every variant is fatal for the query being translated: the translator
/// aborts and no partial plan is returned.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// Expression or pattern shape with no algebra mapping.
    #[error("unsupported {construct} in `{expr}`")]
    UnsupportedConstruct {
        /// Short name of the construct (`null literal`, `MOD`, ...).
        construct: &'static str,
        /// Canonical source text of the offending expression.
        expr: String,
    },
    /// The connection-consumption loop cannot make progress.
    #[error("unsatisfiable pattern: {detail}")]
    UnsatisfiablePattern {
        /// What could not be connected.
        detail: String,
    },
    /// Internal bookkeeping invariant did not hold.
    #[error("invalid planner state: {detail}")]
    InvalidState {
        /// Description of the violated invariant.
        detail: String,
    },
}

impl PlanError {
    /// Builds an [`PlanError::UnsupportedConstruct`] for an expression.
    pub fn unsupported(construct: &'static str, expr: impl fmt::Display) -> Self {
        PlanError::UnsupportedConstruct {
            construct,
            expr: expr.to_string(),
        }
    }

    /// Builds an [`PlanError::UnsatisfiablePattern`].
    pub fn unsatisfiable(detail: impl Into<String>) -> Self {
        PlanError::UnsatisfiablePattern {
            detail: detail.into(),
        }
    }

    /// Builds an [`PlanError::InvalidState`].
    pub fn invalid_state(detail: impl Into<String>) -> Self {
        PlanError::InvalidState {
            detail: detail.into(),
        }
    }

    /// Returns a machine-readable code for the error variant.
    pub fn code(&self) -> &'static str {
        match self {
            PlanError::UnsupportedConstruct { .. } => "UnsupportedConstruct",
            PlanError::UnsatisfiablePattern { .. } => "UnsatisfiablePattern",
            PlanError::InvalidState { .. } => "InvalidState",
        }
    }
}

/// Convenience wrapper that formats planning errors with their codes.
pub struct PlanErrorWithCode<'a>(pub &'a PlanError);

impl fmt::Display for PlanErrorWithCode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.0.code(), self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_prefix_matches_variant() {
        let err = PlanError::unsupported("null literal", "n.age = null");
        assert_eq!(err.code(), "UnsupportedConstruct");
        assert_eq!(
            PlanErrorWithCode(&err).to_string(),
            "[UnsupportedConstruct] unsupported null literal in `n.age = null`"
        );
        let err = PlanError::invalid_state("no column for variable 'x'");
        assert_eq!(
            PlanErrorWithCode(&err).to_string(),
            "[InvalidState] invalid planner state: no column for variable 'x'"
        );
    }
}
