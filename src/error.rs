//! Crate-level error type and pipeline stages.

use std::fmt;

use thiserror::Error;

use crate::query::errors::{PlanError, PlanErrorWithCode};

/// Result alias used by the public translation API.
pub type Result<T, E = TranslateError> = std::result::Result<T, E>;

/// Pipeline state in which a translation failed.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Stage {
    /// Variable registration, connectivity grouping and constraint linking.
    Partition,
    /// Seeding and growing each connection group's plan.
    GroupTranslation,
    /// Joining group pairs through two-group constraints.
    ConstraintJoin,
    /// Cross-product of the remaining unrelated groups.
    CrossProduct,
    /// Constraints applied once a single plan remains.
    ResidualConstraints,
    /// Grouping key materialization and the GROUP operator.
    GroupBy,
    /// Projection column preparation and materialization.
    Projection,
    /// Sort key materialization and the SORT operator.
    OrderBy,
    /// The final PROJECT operator.
    FinalProjection,
    /// LIMIT/OFFSET.
    Slice,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Partition => "partition",
            Stage::GroupTranslation => "group translation",
            Stage::ConstraintJoin => "constraint join",
            Stage::CrossProduct => "cross product",
            Stage::ResidualConstraints => "residual constraints",
            Stage::GroupBy => "group by",
            Stage::Projection => "projection",
            Stage::OrderBy => "order by",
            Stage::FinalProjection => "final projection",
            Stage::Slice => "slice",
        };
        f.write_str(name)
    }
}

/// Errors surfaced to callers of the translator.
#[derive(Debug, Error)]
pub enum TranslateError {
    /// A planning error raised in a specific pipeline state.
    #[error("translation failed during {stage}: {}", PlanErrorWithCode(.source))]
    Plan {
        /// Pipeline state that raised the error.
        stage: Stage,
        /// Underlying planning error.
        #[source]
        source: PlanError,
    },
    /// The query document could not be decoded.
    #[error("invalid query document: {0}")]
    Decode(#[from] serde_json::Error),
}

impl TranslateError {
    /// Returns the pipeline state for planning errors.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            TranslateError::Plan { stage, .. } => Some(*stage),
            TranslateError::Decode(_) => None,
        }
    }

    /// Returns the underlying planning error, if any.
    pub fn plan_error(&self) -> Option<&PlanError> {
        match self {
            TranslateError::Plan { source, .. } => Some(source),
            TranslateError::Decode(_) => None,
        }
    }
}

/// Attaches the pipeline stage to a planning result.
pub(crate) trait StageExt<T> {
    fn at(self, stage: Stage) -> Result<T>;
}

impl<T> StageExt<T> for std::result::Result<T, PlanError> {
    fn at(self, stage: Stage) -> Result<T> {
        self.map_err(|source| TranslateError::Plan { stage, source })
    }
}
