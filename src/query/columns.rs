#![forbid(unsafe_code)]

//! Materialization of expressions as plan columns.

use tracing::debug;

use crate::config::TranslatorConfig;
use crate::query::{
    algebra::{AlgebraOp, AlgebraPlan},
    analyze::ExpressionInfo,
    ast::Expr,
    compile::compile,
    errors::PlanError,
    schema::Schema,
};

/// Column that already holds the value of `expr`, if any.
///
/// Property accesses reuse their attribute column, bare references their
/// variable column, and anything else an alias keyed by its canonical text.
pub fn existing_column(expr: &Expr, schema: &Schema) -> Option<usize> {
    match expr {
        Expr::PropAccess { var, prop } => schema
            .attribute_index(var, prop)
            .or_else(|| schema.alias_position(&expr.to_string())),
        Expr::VarRef { name } => schema
            .variable_index(name)
            .or_else(|| schema.alias_position(name)),
        _ => schema.alias_position(&expr.to_string()),
    }
}

/// Ensures the value of an analyzed expression is available as a column and
/// returns its position.
///
/// Missing attribute and label columns are fetched first. If no existing
/// column holds the value, an `EXTEND` computes it into a new column. The
/// column is aliased with `alias` when given.
pub fn add_expression_column(
    info: &ExpressionInfo,
    plan: &mut AlgebraPlan,
    alias: Option<&str>,
    config: &TranslatorConfig,
) -> Result<usize, PlanError> {
    info.add_missing_columns(plan, &config.attribute_scope);
    let col = match existing_column(info.expr(), &plan.schema) {
        Some(col) => col,
        None => {
            let expr = compile(info.expr(), &plan.schema, None)?;
            debug!(source = %info.expr(), %expr, "extending plan with computed column");
            plan.wrap(AlgebraOp::Extend {
                result_type: config.extend_result_type.clone(),
                expr,
            });
            plan.schema.add_expression_column()
        }
    };
    if let Some(alias) = alias {
        plan.schema.set_alias(alias, col)?;
    }
    Ok(col)
}
