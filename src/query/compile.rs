#![forbid(unsafe_code)]

//! Lowers expression trees to algebra-expression text.
//!
//! Column references resolve against one schema, or two for join predicates:
//! a reference satisfied by the right schema is offset by the left schema's
//! width, matching the column layout of the joined result.

use std::fmt::Write as _;

use crate::query::{
    ast::{BinaryOp, Expr, UnaryOp},
    errors::PlanError,
    schema::Schema,
};

/// Formats a decimal with at least one digit on each side of the point and
/// at most two decimals (`5` -> `5.0`, `2.345` -> `2.35`, `0.1` -> `0.1`).
pub fn format_decimal(value: f64) -> String {
    let mut text = format!("{value:.2}");
    if text.ends_with('0') {
        text.pop();
    }
    text
}

/// Algebra spelling of a binary operator; `MOD` has none.
fn algebra_symbol(op: BinaryOp) -> Option<&'static str> {
    match op {
        BinaryOp::Mod => None,
        other => Some(other.symbol()),
    }
}

/// Compiles `expr` against `left`, and `right` for join predicates.
pub fn compile(expr: &Expr, left: &Schema, right: Option<&Schema>) -> Result<String, PlanError> {
    let mut out = String::new();
    Compiler { left, right }.emit(expr, &mut out)?;
    Ok(out)
}

struct Compiler<'a> {
    left: &'a Schema,
    right: Option<&'a Schema>,
}

impl Compiler<'_> {
    /// Resolves through `lookup` on the left schema, then the right one.
    fn resolve(&self, lookup: impl Fn(&Schema) -> Option<usize>) -> Option<usize> {
        lookup(self.left).or_else(|| {
            self.right
                .and_then(|right| lookup(right).map(|idx| self.left.len() + idx))
        })
    }

    /// Alias lookups never cross into the right input of a join.
    fn alias(&self, key: &str) -> Option<usize> {
        match self.right {
            None => self
                .left
                .alias_position(key)
                .or_else(|| self.left.aggregate_index(key)),
            Some(_) => None,
        }
    }

    fn emit(&self, expr: &Expr, out: &mut String) -> Result<(), PlanError> {
        match expr {
            Expr::VarRef { name } => {
                let col = self
                    .resolve(|schema| schema.variable_index(name))
                    .or_else(|| self.alias(name))
                    .ok_or_else(|| {
                        PlanError::invalid_state(format!("no column or alias for '{name}'"))
                    })?;
                let _ = write!(out, "%{col}");
            }
            Expr::PropAccess { var, prop } => {
                let col = self
                    .resolve(|schema| schema.attribute_index(var, prop))
                    .or_else(|| self.alias(&expr.to_string()))
                    .ok_or_else(|| {
                        PlanError::invalid_state(format!("attribute {var}.{prop} not materialized"))
                    })?;
                let _ = write!(out, "%{col}");
            }
            Expr::Int { value } => {
                let _ = write!(out, "{value}");
            }
            Expr::Decimal { value } => out.push_str(&format_decimal(*value)),
            Expr::Str { value } => {
                let _ = write!(out, "'{value}'");
            }
            Expr::Bool { value } => out.push_str(if *value { "TRUE" } else { "FALSE" }),
            Expr::Null => return Err(PlanError::unsupported("null literal", expr)),
            Expr::Binary { op, lhs, rhs } => {
                let symbol =
                    algebra_symbol(*op).ok_or_else(|| PlanError::unsupported("MOD", expr))?;
                out.push_str("( ");
                self.emit(lhs, out)?;
                let _ = write!(out, " ) {symbol} ( ");
                self.emit(rhs, out)?;
                out.push_str(" )");
            }
            Expr::Unary { op, expr: inner } => {
                out.push_str(match op {
                    UnaryOp::Neg => "-( ",
                    UnaryOp::Not => "NOT ( ",
                });
                self.emit(inner, out)?;
                out.push_str(" )");
            }
            Expr::Aggregate { .. } => {
                // Aggregates were computed by GROUP; only their result column is referenced.
                let key = expr.to_string();
                let col = self.alias(&key).ok_or_else(|| {
                    PlanError::invalid_state(format!("aggregate {key} was not computed"))
                })?;
                let _ = write!(out, "%{col}");
            }
            Expr::HasLabel { var, label } => {
                let col = self.label_column(var)?;
                let _ = write!(out, "%{col} = '{label}'");
            }
            Expr::EdgeLabel { var } => {
                let col = self.label_column(var)?;
                let _ = write!(out, "%{col}");
            }
            Expr::Call { func, .. } => return Err(PlanError::unsupported(func.name(), expr)),
        }
        Ok(())
    }

    fn label_column(&self, var: &str) -> Result<usize, PlanError> {
        self.resolve(|schema| schema.label_index(var))
            .ok_or_else(|| PlanError::invalid_state(format!("label of '{var}' not materialized")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::ast::{AggregateKind, Builtin};

    fn left() -> Schema {
        let mut schema = Schema::new();
        schema.add_variable_column("n");
        schema.add_attribute_column("n", "age");
        schema.add_label_column("n");
        schema
    }

    fn right() -> Schema {
        let mut schema = Schema::new();
        schema.add_variable_column("m");
        schema.add_attribute_column("m", "age");
        schema
    }

    #[test]
    fn decimals_keep_one_to_two_fraction_digits() {
        assert_eq!(format_decimal(5.0), "5.0");
        assert_eq!(format_decimal(0.1), "0.1");
        assert_eq!(format_decimal(2.25), "2.25");
        assert_eq!(format_decimal(-3.5), "-3.5");
        assert_eq!(format_decimal(1234.0), "1234.0");
    }

    #[test]
    fn operators_are_fully_parenthesized() {
        let expr = Expr::or(
            Expr::not(Expr::has_label("n", "Person")),
            Expr::ge(
                Expr::neg(Expr::prop("n", "age")),
                Expr::decimal(2.5),
            ),
        );
        let text = compile(&expr, &left(), None).expect("compile succeeds");
        assert_eq!(text, "( NOT ( %2 = 'Person' ) ) OR ( ( -( %1 ) ) >= ( 2.5 ) )");
    }

    #[test]
    fn join_predicates_offset_right_columns() {
        let expr = Expr::lt(Expr::prop("n", "age"), Expr::prop("m", "age"));
        let text = compile(&expr, &left(), Some(&right())).expect("compile succeeds");
        assert_eq!(text, "( %1 ) < ( %4 )");
        let refs = Expr::eq(Expr::var("m"), Expr::var("n"));
        let text = compile(&refs, &left(), Some(&right())).expect("compile succeeds");
        assert_eq!(text, "( %3 ) = ( %0 )");
    }

    #[test]
    fn aggregates_resolve_to_their_result_column() {
        let mut schema = left();
        let col = schema.add_aggregate_column(AggregateKind::Max, "n.age");
        let expr = Expr::binary(
            BinaryOp::Sub,
            Expr::aggregate(AggregateKind::Max, Expr::prop("n", "age")),
            Expr::int(1),
        );
        let text = compile(&expr, &schema, None).expect("compile succeeds");
        assert_eq!(text, format!("( %{col} ) - ( 1 )"));

        let missing = Expr::count_all();
        match compile(&missing, &schema, None) {
            Err(PlanError::InvalidState { detail }) => assert!(detail.contains("COUNT(*)")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn aliases_resolve_only_without_a_second_input() {
        let mut schema = left();
        schema.set_alias("years", 1).expect("alias set");
        let expr = Expr::gt(Expr::var("years"), Expr::int(3));
        assert_eq!(
            compile(&expr, &schema, None).expect("compile succeeds"),
            "( %1 ) > ( 3 )"
        );
        match compile(&expr, &schema, Some(&right())) {
            Err(PlanError::InvalidState { .. }) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn unsupported_constructs_fail_fast() {
        let null_cmp = Expr::eq(Expr::prop("n", "age"), Expr::Null);
        match compile(&null_cmp, &left(), None) {
            Err(PlanError::UnsupportedConstruct { construct, .. }) => {
                assert_eq!(construct, "null literal")
            }
            other => panic!("unexpected result: {other:?}"),
        }
        let modulo = Expr::binary(BinaryOp::Mod, Expr::prop("n", "age"), Expr::int(2));
        match compile(&modulo, &left(), None) {
            Err(PlanError::UnsupportedConstruct { construct, expr }) => {
                assert_eq!(construct, "MOD");
                assert_eq!(expr, "n.age % 2");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        let degree = Expr::call(Builtin::OutDegree, vec![Expr::var("n")]);
        match compile(&degree, &left(), None) {
            Err(PlanError::UnsupportedConstruct { construct, .. }) => {
                assert_eq!(construct, "out_degree")
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
