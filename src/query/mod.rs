#![forbid(unsafe_code)]

//! Graph-pattern query translation.
//!
//! This module lowers a parsed graph-pattern query to the positional-column
//! algebra executed by the storage engine: pattern partitioning, constraint
//! placement, join ordering, and schema-tracked plan construction.

/// Aggregate extraction for GROUP.
pub mod aggregate;

/// Operator tree of the target algebra.
///
/// Serializes plans to algebra text and builds explain trees and plan hashes.
pub mod algebra;

/// Static analysis of expressions.
pub mod analyze;

/// Abstract syntax tree (AST) for graph-pattern queries.
///
/// Defines the query structure handed over by the front end.
pub mod ast;

/// Query builder for programmatic query construction.
///
/// Provides a fluent API for building queries without writing raw AST.
pub mod builder;

/// Expression materialization as plan columns.
pub mod columns;

/// Expression compilation to algebra-expression text.
pub mod compile;

/// Filter constraints: classification, linkage and placement.
pub mod constraint;

/// Structured planning errors.
pub mod errors;

/// Connectivity grouping of the pattern graph.
pub mod partition;

/// Translation orchestration.
///
/// Drives the pipeline from pattern partitioning to the final SLICE.
pub mod planner;

/// Variable registry.
pub mod registry;

/// Positional column schema.
pub mod schema;

pub use builder::QueryBuilder;

/// Translation output with explanation capabilities.
pub use algebra::PlanExplain;
pub use planner::{PlannerOutput, Translator};
