//! Compiler from graph-pattern queries to a positional-column graph algebra.
//!
//! A [`Translator`] takes an already-parsed [`GraphQuery`] and produces the
//! algebra text executed by the graph storage engine, together with the
//! operator tree, the output schema, an explain tree and a plan hash.

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod logging;
pub mod query;

pub use config::TranslatorConfig;
pub use error::{Result, Stage, TranslateError};
pub use query::ast::GraphQuery;
pub use query::errors::PlanError;
pub use query::{PlanExplain, PlannerOutput, QueryBuilder, Translator};
